//! Execution context
//!
//! Choice points inside a stochastic computation find their home trace through
//! a thread-local stack of active runs. `update()` pushes its run for the
//! duration of the computation and pops it afterwards; a drop guard pops it
//! if the computation unwinds. Nested runs (a trace updated from inside
//! another trace's computation) push on top and see only their own state.
//!
//! Every function here degrades gracefully when no trace is active: choices
//! are drawn directly from their ERP and everything else is a no-op.

use std::cell::RefCell;

use rand::rngs::StdRng;
use tracing::warn;

use crate::address::{Address, AddressContext, SiteId};
use crate::erp::traits::{ChoiceValue, ErpHandle};
use crate::error::{TraceError, TraceResult};
use crate::trace::record::ChoiceRequest;
use crate::trace::state::TraceState;

thread_local! {
    static ACTIVE_RUNS: RefCell<Vec<ActiveRun>> = const { RefCell::new(Vec::new()) };
}

/// A run in progress: the trace's state plus the call path and random stream
pub(crate) struct ActiveRun {
    state: TraceState,
    address: AddressContext,
    rng: StdRng,
    strict: bool,
    fault: Option<TraceError>,
}

impl ActiveRun {
    pub(crate) fn new(state: TraceState, rng: StdRng, strict: bool) -> Self {
        Self {
            state,
            address: AddressContext::new(),
            rng,
            strict,
            fault: None,
        }
    }

    /// Hand back the state, the advanced random stream, and the first fault
    pub(crate) fn into_parts(self) -> (TraceState, StdRng, Option<TraceError>) {
        (self.state, self.rng, self.fault)
    }

    fn resolve(&mut self, skip_frames: usize, site: SiteId, request: &ChoiceRequest<'_>) -> ChoiceValue {
        let address = self.address.current_address(skip_frames, site);
        if self.state.is_visited(&address) {
            if self.strict {
                self.fault
                    .get_or_insert_with(|| TraceError::AddressCollision(address.clone()));
            } else {
                warn!(%address, "address visited more than once in a single run");
            }
        }
        self.state.lookup(address, request, &mut self.rng)
    }
}

fn with_active_run<R>(f: impl FnOnce(&mut ActiveRun) -> R) -> Option<R> {
    ACTIVE_RUNS.with(|runs| runs.borrow_mut().last_mut().map(f))
}

/// Keeps a run installed as the active one until finished or dropped
pub(crate) struct ActiveRunGuard {
    depth: usize,
    finished: bool,
}

impl ActiveRunGuard {
    /// Make `run` the active run, saving whatever was active before
    pub(crate) fn install(run: ActiveRun) -> Self {
        let depth = ACTIVE_RUNS.with(|runs| {
            let mut runs = runs.borrow_mut();
            runs.push(run);
            runs.len()
        });
        Self {
            depth,
            finished: false,
        }
    }

    /// Remove the run and restore the previously active one
    pub(crate) fn finish(mut self) -> TraceResult<ActiveRun> {
        self.finished = true;
        let depth = self.depth;
        ACTIVE_RUNS.with(|runs| {
            let mut runs = runs.borrow_mut();
            let found = runs.len();
            if found != depth {
                runs.truncate(depth.saturating_sub(1).min(found));
                return Err(TraceError::ContextCorrupted {
                    expected: depth,
                    found,
                });
            }
            runs.pop().ok_or(TraceError::ContextCorrupted {
                expected: depth,
                found,
            })
        })
    }
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let depth = self.depth;
        let _ = ACTIVE_RUNS.try_with(|runs| {
            if let Ok(mut runs) = runs.try_borrow_mut() {
                runs.truncate(depth.saturating_sub(1));
            }
        });
    }
}

/// Pops a call level when dropped
struct ScopeGuard {
    depth: Option<usize>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(depth) = self.depth {
            with_active_run(|run| run.address.truncate(depth - 1));
        }
    }
}

fn enter_scope(site: SiteId) -> ScopeGuard {
    let depth = with_active_run(|run| {
        run.address.enter(site);
        run.address.depth()
    });
    ScopeGuard { depth }
}

/// Whether a trace is currently running on this thread
pub fn is_tracing() -> bool {
    ACTIVE_RUNS.with(|runs| !runs.borrow().is_empty())
}

/// Resolve a choice point at the caller's location
///
/// With an active trace, the choice is looked up at the address formed by the
/// current call path minus the innermost `skip_frames` levels. Without one,
/// the value is drawn directly from `erp` and `conditioned` is ignored.
#[track_caller]
pub fn resolve_choice(
    erp: &ErpHandle,
    params: &[f64],
    structural: bool,
    skip_frames: usize,
    conditioned: Option<ChoiceValue>,
) -> ChoiceValue {
    let site = SiteId::caller();
    let request = ChoiceRequest {
        erp,
        params,
        structural,
        conditioned: conditioned.as_ref(),
    };
    with_active_run(|run| run.resolve(skip_frames, site, &request))
        .unwrap_or_else(|| erp.sample(params, &mut rand::thread_rng()))
}

/// Non-structural choice
#[track_caller]
pub fn sample(erp: &ErpHandle, params: &[f64]) -> ChoiceValue {
    resolve_choice(erp, params, false, 0, None)
}

/// Structural choice: its value may change the shape of later control flow
#[track_caller]
pub fn sample_structural(erp: &ErpHandle, params: &[f64]) -> ChoiceValue {
    resolve_choice(erp, params, true, 0, None)
}

/// Observed choice clamped to `value`
#[track_caller]
pub fn observe(erp: &ErpHandle, params: &[f64], value: impl Into<ChoiceValue>) -> ChoiceValue {
    resolve_choice(erp, params, false, 0, Some(value.into()))
}

/// Increment the loop counter of the call level `skip_frames` above the innermost
pub fn bump_loop_counter(skip_frames: usize) {
    with_active_run(|run| run.address.increment_loop_counter(skip_frames));
}

/// Mark the start of a loop iteration in the innermost call level
pub fn loop_tick() {
    bump_loop_counter(0);
}

/// Add a soft log-likelihood term to the active trace
pub fn factor(log_weight: f64) {
    with_active_run(|run| run.state.add_factor(log_weight));
}

/// Add a hard constraint to the active trace
pub fn condition(satisfied: bool) {
    with_active_run(|run| run.state.condition_on(satisfied));
}

/// Address a choice made at the caller's location would get
#[track_caller]
pub fn current_address(skip_frames: usize) -> Option<Address> {
    let site = SiteId::caller();
    with_active_run(|run| run.address.current_address(skip_frames, site))
}

/// Run `body` as a nested call level entered from the caller's location
#[track_caller]
pub fn scope<R>(body: impl FnOnce() -> R) -> R {
    let _guard = enter_scope(SiteId::caller());
    body()
}

/// Run `body` as a nested call level identified by `name`
pub fn named_scope<R>(name: &str, body: impl FnOnce() -> R) -> R {
    let _guard = enter_scope(SiteId::named(name));
    body()
}

/// Run `body` `n` times in its own call level, one loop tick per iteration
#[track_caller]
pub fn repeat<R>(n: usize, mut body: impl FnMut(usize) -> R) -> Vec<R> {
    let _guard = enter_scope(SiteId::caller());
    (0..n)
        .map(|i| {
            loop_tick();
            body(i)
        })
        .collect()
}
