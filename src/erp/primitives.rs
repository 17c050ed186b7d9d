//! Reference ERPs
//!
//! A handful of elementary random procedures used by the tests and demos.
//! Each comes with a process-wide shared handle, so every call site that uses
//! e.g. [`flip_erp`] refers to the same ERP identity, and a `#[track_caller]`
//! wrapper that resolves a non-structural choice at the caller's location.
//!
//! Densities come from `statrs`, sampling from `rand_distr`. Parameters that
//! are missing or out of range produce `NaN`/`-inf` densities rather than
//! panics; the engine records whatever the ERP reports.

use std::sync::OnceLock;

use rand::{Rng, RngCore};
use rand_distr::{Bernoulli, Distribution, Normal, Uniform, WeightedIndex};
use statrs::distribution::{self as stats, Continuous, Discrete};

use super::traits::{ChoiceValue, Erp, ErpHandle};
use crate::context;

fn param(params: &[f64], index: usize, default: f64) -> f64 {
    params.get(index).copied().unwrap_or(default)
}

fn normal_log_density(x: f64, mean: f64, std_dev: f64) -> f64 {
    stats::Normal::new(mean, std_dev)
        .map(|normal| normal.ln_pdf(x))
        .unwrap_or(f64::NEG_INFINITY)
}

/// Largest magnitude an `i64` bound can have and still pass through `f64`
/// parameters unchanged
pub const MAX_EXACT_INT: i64 = 1 << 53;

/// Bernoulli choice with parameter `[p]`
///
/// Proposes the opposite value with certainty.
#[derive(Clone, Debug, Default)]
pub struct Flip;

impl Erp for Flip {
    fn name(&self) -> &str {
        "flip"
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> ChoiceValue {
        let heads = Bernoulli::new(param(params, 0, 0.5))
            .map(|coin| coin.sample(rng))
            .unwrap_or(false);
        ChoiceValue::Bool(heads)
    }

    fn log_density(&self, value: &ChoiceValue, params: &[f64]) -> f64 {
        match (value.as_bool(), stats::Bernoulli::new(param(params, 0, 0.5))) {
            (Some(heads), Ok(coin)) => coin.ln_pmf(u64::from(heads)),
            _ => f64::NEG_INFINITY,
        }
    }

    fn proposal_sample(
        &self,
        current: &ChoiceValue,
        _params: &[f64],
        _rng: &mut dyn RngCore,
    ) -> ChoiceValue {
        ChoiceValue::Bool(!current.as_bool().unwrap_or(false))
    }

    fn proposal_log_density(&self, from: &ChoiceValue, to: &ChoiceValue, _params: &[f64]) -> f64 {
        match (from.as_bool(), to.as_bool()) {
            (Some(a), Some(b)) if a != b => 0.0,
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Normal choice with parameters `[mean, std_dev]`
///
/// Proposes by Gaussian drift around the current value with standard deviation
/// `proposal_scale * std_dev`. The kernel is symmetric.
#[derive(Clone, Debug)]
pub struct Gaussian {
    /// Drift width relative to the prior standard deviation
    pub proposal_scale: f64,
}

impl Default for Gaussian {
    fn default() -> Self {
        Self {
            proposal_scale: 0.5,
        }
    }
}

impl Gaussian {
    /// Create a Gaussian ERP with the given relative drift width
    pub fn new(proposal_scale: f64) -> Self {
        assert!(proposal_scale > 0.0, "Proposal scale must be positive");
        Self { proposal_scale }
    }

    fn drift_width(&self, params: &[f64]) -> f64 {
        self.proposal_scale * param(params, 1, 1.0)
    }
}

impl Erp for Gaussian {
    fn name(&self) -> &str {
        "gaussian"
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> ChoiceValue {
        let mean = param(params, 0, 0.0);
        let std_dev = param(params, 1, 1.0);
        let x = Normal::new(mean, std_dev)
            .map(|normal| normal.sample(rng))
            .unwrap_or(f64::NAN);
        ChoiceValue::F64(x)
    }

    fn log_density(&self, value: &ChoiceValue, params: &[f64]) -> f64 {
        match value.as_f64() {
            Some(x) => normal_log_density(x, param(params, 0, 0.0), param(params, 1, 1.0)),
            None => f64::NEG_INFINITY,
        }
    }

    fn proposal_sample(
        &self,
        current: &ChoiceValue,
        params: &[f64],
        rng: &mut dyn RngCore,
    ) -> ChoiceValue {
        let center = current.as_f64().unwrap_or(0.0);
        let x = Normal::new(center, self.drift_width(params))
            .map(|normal| normal.sample(rng))
            .unwrap_or(f64::NAN);
        ChoiceValue::F64(x)
    }

    fn proposal_log_density(&self, from: &ChoiceValue, to: &ChoiceValue, params: &[f64]) -> f64 {
        match (from.as_f64(), to.as_f64()) {
            (Some(a), Some(b)) => normal_log_density(b, a, self.drift_width(params)),
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Continuous uniform choice with parameters `[low, high]`
#[derive(Clone, Debug, Default)]
pub struct UniformReal;

impl Erp for UniformReal {
    fn name(&self) -> &str {
        "uniform"
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> ChoiceValue {
        let low = param(params, 0, 0.0);
        let high = param(params, 1, 1.0);
        if !(low < high && (high - low).is_finite()) {
            return ChoiceValue::F64(low);
        }
        ChoiceValue::F64(Uniform::new_inclusive(low, high).sample(rng))
    }

    fn log_density(&self, value: &ChoiceValue, params: &[f64]) -> f64 {
        let uniform = stats::Uniform::new(param(params, 0, 0.0), param(params, 1, 1.0));
        match (value.as_f64(), uniform) {
            (Some(x), Ok(uniform)) => uniform.ln_pdf(x),
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Discrete uniform choice over the inclusive integer range `[low, high]`
#[derive(Clone, Debug, Default)]
pub struct UniformInt;

impl UniformInt {
    fn bounds(params: &[f64]) -> (i64, i64) {
        (param(params, 0, 0.0) as i64, param(params, 1, 1.0) as i64)
    }
}

impl Erp for UniformInt {
    fn name(&self) -> &str {
        "uniform_int"
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> ChoiceValue {
        let (low, high) = Self::bounds(params);
        if high < low {
            return ChoiceValue::I64(low);
        }
        ChoiceValue::I64(rng.gen_range(low..=high))
    }

    fn log_density(&self, value: &ChoiceValue, params: &[f64]) -> f64 {
        let Some(k) = value.as_i64() else {
            return f64::NEG_INFINITY;
        };
        let (low, high) = Self::bounds(params);
        let narrow = high.checked_sub(low).and_then(|w| w.checked_add(1)).is_some();
        match stats::DiscreteUniform::new(low, high) {
            Ok(uniform) if narrow => uniform.ln_pmf(k),
            // statrs sizes the support in i64, which overflows on the widest ranges
            Ok(_) if (low..=high).contains(&k) => -(high.abs_diff(low) as f64 + 1.0).ln(),
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Categorical choice over indices, parameters are unnormalised weights
#[derive(Clone, Debug, Default)]
pub struct Categorical;

impl Erp for Categorical {
    fn name(&self) -> &str {
        "categorical"
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> ChoiceValue {
        let index = WeightedIndex::new(params)
            .map(|dist| dist.sample(rng))
            .unwrap_or(0);
        ChoiceValue::Usize(index)
    }

    fn log_density(&self, value: &ChoiceValue, params: &[f64]) -> f64 {
        match (value.as_usize(), stats::Categorical::new(params)) {
            (Some(index), Ok(categorical)) => categorical.ln_pmf(index as u64),
            _ => f64::NEG_INFINITY,
        }
    }
}

static FLIP: OnceLock<ErpHandle> = OnceLock::new();
static GAUSSIAN: OnceLock<ErpHandle> = OnceLock::new();
static UNIFORM_REAL: OnceLock<ErpHandle> = OnceLock::new();
static UNIFORM_INT: OnceLock<ErpHandle> = OnceLock::new();
static CATEGORICAL: OnceLock<ErpHandle> = OnceLock::new();

/// Shared [`Flip`] handle
pub fn flip_erp() -> ErpHandle {
    FLIP.get_or_init(|| ErpHandle::new(Flip)).clone()
}

/// Shared [`Gaussian`] handle with the default drift width
pub fn gaussian_erp() -> ErpHandle {
    GAUSSIAN.get_or_init(|| ErpHandle::new(Gaussian::default())).clone()
}

/// Shared [`UniformReal`] handle
pub fn uniform_erp() -> ErpHandle {
    UNIFORM_REAL.get_or_init(|| ErpHandle::new(UniformReal)).clone()
}

/// Shared [`UniformInt`] handle
pub fn uniform_int_erp() -> ErpHandle {
    UNIFORM_INT.get_or_init(|| ErpHandle::new(UniformInt)).clone()
}

/// Shared [`Categorical`] handle
pub fn categorical_erp() -> ErpHandle {
    CATEGORICAL.get_or_init(|| ErpHandle::new(Categorical)).clone()
}

/// Coin flip with success probability `p`
#[track_caller]
pub fn flip(p: f64) -> bool {
    context::sample(&flip_erp(), &[p])
        .as_bool()
        .unwrap_or(false)
}

/// Normal draw
#[track_caller]
pub fn gaussian(mean: f64, std_dev: f64) -> f64 {
    context::sample(&gaussian_erp(), &[mean, std_dev])
        .as_f64()
        .unwrap_or(f64::NAN)
}

/// Uniform real draw from `[low, high]`
#[track_caller]
pub fn uniform(low: f64, high: f64) -> f64 {
    context::sample(&uniform_erp(), &[low, high])
        .as_f64()
        .unwrap_or(f64::NAN)
}

/// Uniform integer draw from `[low, high]`
///
/// # Panics
///
/// Panics if either bound exceeds [`MAX_EXACT_INT`] in magnitude, since ERP
/// parameters are carried as `f64`.
#[track_caller]
pub fn uniform_int(low: i64, high: i64) -> i64 {
    assert!(
        low.abs_diff(0) <= MAX_EXACT_INT as u64 && high.abs_diff(0) <= MAX_EXACT_INT as u64,
        "Integer bounds must be within 2^53 in magnitude"
    );
    context::sample(&uniform_int_erp(), &[low as f64, high as f64])
        .as_i64()
        .unwrap_or(low)
}

/// Index drawn with probability proportional to `weights`
#[track_caller]
pub fn categorical(weights: &[f64]) -> usize {
    context::sample(&categorical_erp(), weights)
        .as_usize()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    #[test]
    fn test_flip_density_and_proposal() {
        let erp = Flip;
        let p = [0.25];
        assert!((erp.log_density(&ChoiceValue::Bool(true), &p) - 0.25_f64.ln()).abs() < 1e-12);
        assert!((erp.log_density(&ChoiceValue::Bool(false), &p) - 0.75_f64.ln()).abs() < 1e-12);

        let mut rng = StdRng::seed_from_u64(3);
        let proposed = erp.proposal_sample(&ChoiceValue::Bool(true), &p, &mut rng);
        assert_eq!(proposed, ChoiceValue::Bool(false));
        assert_eq!(
            erp.proposal_log_density(&ChoiceValue::Bool(true), &proposed, &p),
            0.0
        );
        assert_eq!(
            erp.proposal_log_density(&ChoiceValue::Bool(true), &ChoiceValue::Bool(true), &p),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_gaussian_density_at_mean() {
        let erp = Gaussian::default();
        let lp = erp.log_density(&ChoiceValue::F64(0.0), &[0.0, 1.0]);
        assert!((lp + 0.5 * (2.0 * PI).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_kernel_symmetric() {
        let erp = Gaussian::new(0.3);
        let params = [1.0, 2.0];
        let a = ChoiceValue::F64(0.7);
        let b = ChoiceValue::F64(-1.9);
        assert_eq!(
            erp.proposal_log_density(&a, &b, &params),
            erp.proposal_log_density(&b, &a, &params)
        );
    }

    #[test]
    #[should_panic(expected = "Proposal scale must be positive")]
    fn test_gaussian_rejects_bad_scale() {
        let _ = Gaussian::new(0.0);
    }

    #[test]
    fn test_uniform_int_support() {
        let erp = UniformInt;
        let params = [1.0, 3.0];
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let k = erp.sample(&params, &mut rng).as_i64().unwrap();
            assert!((1..=3).contains(&k));
        }
        assert!((erp.log_density(&ChoiceValue::I64(2), &params) - (1.0_f64 / 3.0).ln()).abs() < 1e-12);
        assert_eq!(erp.log_density(&ChoiceValue::I64(4), &params), f64::NEG_INFINITY);
    }

    #[test]
    fn test_uniform_int_full_range_density() {
        let erp = UniformInt;
        let params = [i64::MIN as f64, i64::MAX as f64];
        let lp = erp.log_density(&ChoiceValue::I64(0), &params);
        assert!((lp + 64.0 * 2.0_f64.ln()).abs() < 1e-9);

        let mut rng = StdRng::seed_from_u64(12);
        assert!(erp.sample(&params, &mut rng).as_i64().is_some());
    }

    #[test]
    fn test_uniform_int_exact_bounds() {
        let edge = MAX_EXACT_INT;
        assert_eq!(uniform_int(edge, edge), edge);
        assert_eq!(uniform_int(-edge, -edge), -edge);
    }

    #[test]
    #[should_panic(expected = "Integer bounds must be within 2^53 in magnitude")]
    fn test_uniform_int_rejects_inexact_bounds() {
        let _ = uniform_int(MAX_EXACT_INT + 1, MAX_EXACT_INT + 1);
    }

    #[test]
    fn test_flip_sampling_frequency() {
        let erp = Flip;
        let mut rng = StdRng::seed_from_u64(4);
        let heads = (0..2000)
            .filter(|_| erp.sample(&[0.8], &mut rng) == ChoiceValue::Bool(true))
            .count();
        assert!((1400..1800).contains(&heads));
        assert_eq!(erp.log_density(&ChoiceValue::Bool(true), &[1.5]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_uniform_real_density() {
        let erp = UniformReal;
        assert!((erp.log_density(&ChoiceValue::F64(0.2), &[0.0, 0.5]) - 2.0_f64.ln()).abs() < 1e-12);
        assert_eq!(
            erp.log_density(&ChoiceValue::F64(0.7), &[0.0, 0.5]),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_categorical_density() {
        let erp = Categorical;
        let weights = [1.0, 3.0];
        assert!((erp.log_density(&ChoiceValue::Usize(1), &weights) - 0.75_f64.ln()).abs() < 1e-12);
        assert_eq!(erp.log_density(&ChoiceValue::Usize(2), &weights), f64::NEG_INFINITY);
    }

    #[test]
    fn test_shared_handles_are_stable() {
        assert_eq!(flip_erp(), flip_erp());
        assert_ne!(flip_erp(), gaussian_erp());
    }

    #[test]
    fn test_wrappers_sample_without_trace() {
        let x = uniform(2.0, 3.0);
        assert!((2.0..=3.0).contains(&x));
        let k = uniform_int(5, 5);
        assert_eq!(k, 5);
        assert_eq!(categorical(&[0.0, 1.0]), 1);
    }
}
