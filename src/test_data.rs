use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Seeded synthetic ordered outcome with three classes.
///
/// Covariates are uniform on (-2, 2); the latent index is the sum of the
/// first two columns plus uniform noise, cut at -1 and 1. With `p >= 3` the
/// last column is a 0/1 dummy shifting the latent index by 0.5.
pub fn ordered_data(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Array2::from_shape_fn((n, p), |_| rng.gen_range(-2.0..2.0));
    if p >= 3 {
        x.column_mut(p - 1)
            .mapv_inplace(|v| if v > 0.0 { 1.0 } else { 0.0 });
    }

    let y = Array1::from_shape_fn(n, |i| {
        let row = x.row(i);
        let mut latent = row.iter().take(2).sum::<f64>() + rng.gen_range(-1.0..1.0);
        if p >= 3 {
            latent += 0.5 * row[p - 1];
        }
        if latent < -1.0 {
            1.0
        } else if latent < 1.0 {
            2.0
        } else {
            3.0
        }
    });
    (x, y)
}
