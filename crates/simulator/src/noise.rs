//! Gaussian sensor noise. Grounded on `crates/node/src/sim.rs`'s
//! `approx_std_normal`/`gaussian` pair (Irwin-Hall sum-of-12-uniforms
//! approximation over `fastrand`, chosen there specifically to avoid an
//! extra dependency) — reused verbatim rather than pulled in from
//! `rand_distr`, since `fastrand` is already the workspace's one random
//! source and this barn model needs nothing `rand_distr::Normal` would add.

/// Approximate a sample from N(0,1): sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
pub fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}
