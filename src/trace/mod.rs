//! Trace engine
//!
//! Records, configuration, and the [`RandomExecutionTrace`](engine::RandomExecutionTrace)
//! that ties them to a stochastic computation.

pub mod config;
pub mod engine;
pub mod record;
pub(crate) mod state;

pub mod prelude {
    pub use super::config::*;
    pub use super::engine::*;
    pub use super::record::*;
}
