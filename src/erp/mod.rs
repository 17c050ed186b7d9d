//! Elementary random procedures
//!
//! This module provides the `Erp` capability set consumed by the trace engine
//! and a few reference implementations.

pub mod primitives;
pub mod traits;

pub mod prelude {
    pub use super::primitives::*;
    pub use super::traits::*;
}
