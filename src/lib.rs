//! # mh-trace
//!
//! Execution traces for structural Metropolis-Hastings inference over
//! stochastic programs written as ordinary Rust closures.
//!
//! A computation issues random choices through [`context`] functions (or the
//! typed wrappers in [`erp::primitives`]). While a [`RandomExecutionTrace`]
//! runs it, every choice is keyed by a structural [`Address`] derived from the
//! call path, so re-running the computation after one choice changes reuses
//! every other choice that is still reached.
//!
//! ## Core Concepts
//!
//! - **Addresses**: call-site locations, nested scopes, and loop counters
//!   identify a choice across runs
//! - **Records**: the value, parameters, and density of each choice, reused
//!   while the ERP and structural flag still match
//! - **Proposals**: a single-site change plus the forward and reverse
//!   densities needed for the acceptance ratio
//!
//! ## Quick Start
//!
//! ```rust
//! use mh_trace::prelude::*;
//!
//! let mut trace = RandomExecutionTrace::with_config(
//!     || {
//!         let mu = gaussian(0.0, 10.0);
//!         observe(&gaussian_erp(), &[mu, 1.0], 3.0);
//!         mu
//!     },
//!     TraceConfig::default().with_seed(42),
//! )?;
//!
//! for _ in 0..100 {
//!     let site = trace.free_var_names(true, true)[0].clone();
//!     let proposal = trace.propose_change(&site)?;
//!     if proposal.log_acceptance_ratio(&trace) >= 0.0 {
//!         trace = proposal.trace;
//!     }
//! }
//! assert!(trace.return_value().is_some());
//! # Ok::<(), mh_trace::error::TraceError>(())
//! ```

pub mod address;
pub mod context;
pub mod diagnostics;
pub mod erp;
pub mod error;
pub mod trace;

pub use address::Address;
pub use trace::engine::{new_trace, Proposal, RandomExecutionTrace};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::address::*;
    pub use crate::context::*;
    pub use crate::diagnostics::*;
    pub use crate::erp::prelude::*;
    pub use crate::error::*;
    pub use crate::trace::prelude::*;
}
