//! Core ERP traits
//!
//! This module defines the `Erp` capability set the trace engine consumes,
//! the `ChoiceValue` type that records store, and `ErpHandle`, the shared
//! reference whose identity decides whether a stored record may be reused.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Distribution parameters, in the order the ERP documents them
pub type Params = Vec<f64>;

/// Value of a single choice point
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChoiceValue {
    /// Real value
    F64(f64),
    /// Signed integer value
    I64(i64),
    /// Index into a finite set
    Usize(usize),
    /// Boolean value
    Bool(bool),
}

impl ChoiceValue {
    /// Get the value as f64, if it is real
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as i64, if it is a signed integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as usize, if it is an index
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Usize(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as bool, if it is boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::F64(_) => "f64",
            Self::I64(_) => "i64",
            Self::Usize(_) => "usize",
            Self::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for ChoiceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F64(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::Usize(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ChoiceValue {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<i64> for ChoiceValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<usize> for ChoiceValue {
    fn from(v: usize) -> Self {
        Self::Usize(v)
    }
}

impl From<bool> for ChoiceValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Elementary random procedure
///
/// The capability set the trace engine needs from a distribution. ERPs are
/// leaves: their methods must not issue choices of their own through the
/// execution context.
///
/// The default proposal kernel is an independence sampler that redraws from
/// the prior, so implementors only need `sample` and `log_density`.
pub trait Erp: Send + Sync + fmt::Debug {
    /// Short name for logs and summaries
    fn name(&self) -> &str;

    /// Draw a value given parameters
    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> ChoiceValue;

    /// Log-density of `value` under `params`
    fn log_density(&self, value: &ChoiceValue, params: &[f64]) -> f64;

    /// Draw a proposed replacement for `current`
    fn proposal_sample(
        &self,
        _current: &ChoiceValue,
        params: &[f64],
        rng: &mut dyn RngCore,
    ) -> ChoiceValue {
        self.sample(params, rng)
    }

    /// Log-density of proposing `to` when the current value is `from`
    fn proposal_log_density(&self, _from: &ChoiceValue, to: &ChoiceValue, params: &[f64]) -> f64 {
        self.log_density(to, params)
    }
}

/// Shared reference to an ERP
///
/// Equality is identity: two handles are equal only if they point at the same
/// ERP object, regardless of the object's state.
#[derive(Clone)]
pub struct ErpHandle(Arc<dyn Erp>);

impl ErpHandle {
    /// Wrap an ERP in a new handle
    pub fn new<E: Erp + 'static>(erp: E) -> Self {
        Self(Arc::new(erp))
    }

    /// Wrap an already shared ERP
    pub fn from_arc(erp: Arc<dyn Erp>) -> Self {
        Self(erp)
    }

    /// Whether both handles refer to the same ERP object
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl std::ops::Deref for ErpHandle {
    type Target = dyn Erp;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for ErpHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for ErpHandle {}

impl fmt::Debug for ErpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErpHandle({:?} @ {:p})", self.0, Arc::as_ptr(&self.0) as *const ())
    }
}
