
#[cfg(test)]
mod tests {
    use super::test_data::setup_ordered_split;
    use orf::{EvalPoint, OrderedForest, OrderedForestParamsBuilder, OrfError};

    fn fit_forest(inference: bool) -> (OrderedForest<orf::grid::GridForest>, ndarray::Array2<f64>) {
        let (x, y, x_test) = setup_ordered_split(400, 21);
        let params = OrderedForestParamsBuilder::new()
            .n_trees(40)
            .n_iter(10)
            .split_try(5)
            .max_features(1.0)
            .honesty(inference)
            .replace(!inference)
            .inference(inference)
            .n_threads(2)
            .build()
            .unwrap();
        let forest = OrderedForest::fit(x.view(), y.view(), &params).unwrap();
        (forest, x_test)
    }

    #[test]
    fn test_effects_sum_to_zero_for_every_eval_point() {
        let (forest, x_test) = fit_forest(false);
        for eval_point in [EvalPoint::Mean, EvalPoint::AtMean, EvalPoint::AtMedian] {
            let margins = forest.margin(Some(x_test.view()), eval_point, 0.1).unwrap();
            assert_eq!(margins.effects.dim(), (3, 3));
            assert_eq!(margins.eval_point, eval_point);
            for row in margins.effects.outer_iter() {
                assert!(row.sum().abs() < 1e-9);
            }
            assert!(margins.p_values.is_none());
        }
    }

    #[test]
    fn test_larger_covariate_shifts_mass_upwards() {
        let (forest, x_test) = fit_forest(false);
        let margins = forest.margin(Some(x_test.view()), EvalPoint::Mean, 0.5).unwrap();
        // the latent index increases in the first covariate
        assert!(margins.effects[[0, 2]] > margins.effects[[0, 0]]);
    }

    #[test]
    fn test_inference_outputs() {
        let (forest, _) = fit_forest(true);
        let margins = forest.margin(None, EvalPoint::Mean, 0.1).unwrap();
        let variances = margins.variances.unwrap();
        let std_errors = margins.std_errors.unwrap();
        let t_values = margins.t_values.unwrap();
        let p_values = margins.p_values.unwrap();
        assert_eq!(variances.dim(), (3, 3));
        assert!(variances.iter().all(|&v| v >= 0.0));
        for ((&v, &se), (&t, &p)) in variances
            .iter()
            .zip(std_errors.iter())
            .zip(t_values.iter().zip(p_values.iter()))
        {
            assert!((se * se - v).abs() < 1e-12);
            assert!(t.is_finite());
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_constant_covariate_is_rejected() {
        let (forest, mut x_test) = fit_forest(false);
        x_test.column_mut(1).fill(0.5);
        let res = forest.margin(Some(x_test.view()), EvalPoint::AtMean, 0.1);
        assert!(matches!(res, Err(OrfError::ConstantCovariate { covariate: 1 })));
    }

    #[test]
    fn test_window_out_of_range() {
        let (forest, _) = fit_forest(false);
        for window in [0.0, 1.5] {
            assert!(matches!(
                forest.margin(None, EvalPoint::Mean, window),
                Err(OrfError::InvalidParameter(_))
            ));
        }
    }
}
