//! Random execution traces
//!
//! A [`RandomExecutionTrace`] owns the records of one full execution of a
//! stochastic computation. [`update`](RandomExecutionTrace::update) re-runs the
//! computation so every choice point is re-derived against the stored records,
//! and [`propose_change`](RandomExecutionTrace::propose_change) builds the
//! candidate trace and transition densities a Metropolis-Hastings step needs.
//!
//! # Example
//!
//! ```rust
//! use mh_trace::prelude::*;
//!
//! let mut trace = RandomExecutionTrace::with_config(
//!     || {
//!         let x = uniform_int(1, 3);
//!         condition(x != 2);
//!         x
//!     },
//!     TraceConfig::default().with_seed(7),
//! )?;
//!
//! assert!(trace.conditions_satisfied());
//! let address = trace.free_var_names(true, true)[0].clone();
//! let proposal = trace.propose_change(&address)?;
//! let log_alpha = proposal.log_acceptance_ratio(&trace);
//! assert!(!log_alpha.is_nan());
//! # Ok::<(), mh_trace::error::TraceError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, debug_span, info};

use super::config::TraceConfig;
use super::record::{ChoiceRequest, RandomVariableRecord};
use super::state::TraceState;
use crate::address::Address;
use crate::context::{ActiveRun, ActiveRunGuard};
use crate::diagnostics::{RecordSummary, RunStats, TraceSummary};
use crate::erp::traits::{ChoiceValue, ErpHandle};
use crate::error::{TraceError, TraceResult};

/// A stochastic computation: invoked once per run
pub type Computation<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Execution trace of a stochastic computation
///
/// Cloning copies the random stream as well, so a clone replays the same
/// draws; use [`fork`](Self::fork) for an independent copy.
#[derive(Clone)]
pub struct RandomExecutionTrace<T> {
    computation: Computation<T>,
    config: TraceConfig,
    state: TraceState,
    rng: StdRng,
    return_value: Option<T>,
}

impl<T> RandomExecutionTrace<T> {
    /// Create a trace with default configuration
    ///
    /// With `rejection_init`, the computation is run until its hard constraints
    /// hold, giving up after the default retry budget.
    pub fn new<F>(computation: F, rejection_init: bool) -> TraceResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_config(
            computation,
            TraceConfig::default().with_rejection_init(rejection_init),
        )
    }

    /// Create a trace with explicit configuration
    pub fn with_config<F>(computation: F, config: TraceConfig) -> TraceResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_computation(Arc::new(computation), config)
    }

    /// Create a trace around an already shared computation
    pub fn from_computation(computation: Computation<T>, config: TraceConfig) -> TraceResult<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut trace = Self {
            computation,
            config,
            state: TraceState::default(),
            rng,
            return_value: None,
        };
        if trace.config.rejection_init {
            trace.rejection_initialize()?;
        }
        Ok(trace)
    }

    fn rejection_initialize(&mut self) -> TraceResult<()> {
        let mut attempts = 0;
        loop {
            if let Some(max) = self.config.max_rejection_attempts {
                if attempts >= max {
                    return Err(TraceError::UnsatisfiableConditioning { attempts });
                }
            }
            attempts += 1;
            self.state.clear();
            self.update()?;
            if self.state.conditions_satisfied {
                if attempts > 1 {
                    info!(attempts, "rejection initialisation satisfied conditions");
                }
                return Ok(());
            }
        }
    }

    /// Re-run the computation and re-derive a consistent trace
    ///
    /// Records reached by the run are reused where their kind still matches;
    /// records it no longer reaches are reclaimed. A computation that panics
    /// leaves this trace without records or return value; the execution
    /// context is restored either way.
    pub fn update(&mut self) -> TraceResult<()> {
        let _span = debug_span!("update", records = self.state.records.len()).entered();

        let mut state = std::mem::take(&mut self.state);
        self.return_value = None;
        state.begin_run();
        let guard = ActiveRunGuard::install(ActiveRun::new(
            state,
            self.rng.clone(),
            self.config.strict_addressing,
        ));
        let value = (self.computation)();
        let (mut state, rng, fault) = guard.finish()?.into_parts();

        state.finish_run();
        debug!(
            log_prob = state.log_prob,
            new_log_prob = state.new_log_prob,
            old_log_prob = state.old_log_prob,
            created = state.stats.created,
            reclaimed = state.stats.reclaimed,
            satisfied = state.conditions_satisfied,
            "run complete"
        );

        self.state = state;
        self.rng = rng;
        self.return_value = Some(value);

        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolve a choice at an explicit address
    ///
    /// This is the operation every choice point of a running computation goes
    /// through; calling it directly scores the choice against this trace
    /// outside of any run.
    pub fn lookup(
        &mut self,
        address: Address,
        erp: &ErpHandle,
        params: &[f64],
        structural: bool,
        conditioned: Option<ChoiceValue>,
    ) -> ChoiceValue {
        let request = ChoiceRequest {
            erp,
            params,
            structural,
            conditioned: conditioned.as_ref(),
        };
        self.state.lookup(address, &request, &mut self.rng)
    }

    /// Add a soft log-likelihood term
    pub fn add_factor(&mut self, log_weight: f64) {
        self.state.add_factor(log_weight);
    }

    /// Add a hard constraint
    pub fn condition_on(&mut self, satisfied: bool) {
        self.state.condition_on(satisfied);
    }

    /// Addresses of unobserved choices of the requested kinds, in address order
    pub fn free_var_names(&self, structural: bool, nonstructural: bool) -> Vec<Address> {
        let mut names: Vec<Address> = self
            .state
            .records
            .iter()
            .filter(|(_, record)| {
                !record.is_conditioned()
                    && ((structural && record.is_structural())
                        || (nonstructural && !record.is_structural()))
            })
            .map(|(address, _)| address.clone())
            .collect();
        names.sort();
        names
    }

    /// Addresses this trace holds that `other` does not, in address order
    pub fn var_diff(&self, other: &Self) -> Vec<Address> {
        let mut names: Vec<Address> = self
            .state
            .records
            .keys()
            .filter(|address| !other.state.records.contains_key(*address))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Log-density carried by the addresses in [`var_diff`](Self::var_diff)
    pub fn lp_diff(&self, other: &Self) -> f64 {
        self.var_diff(other)
            .iter()
            .filter_map(|address| self.state.records.get(address))
            .map(|record| record.log_density())
            .sum()
    }

    /// Record stored at `address`
    pub fn get_record(&self, address: &Address) -> Option<&RandomVariableRecord> {
        self.state.records.get(address).map(|record| record.as_ref())
    }

    /// Whether the record at `address` was reached by the last run
    ///
    /// Unreached records are reclaimed when a run finishes, so after a run
    /// every stored record is active.
    pub fn is_active(&self, address: &Address) -> bool {
        self.state.records.contains_key(address)
    }

    /// All records, in no particular order
    pub fn records(&self) -> impl Iterator<Item = (&Address, &RandomVariableRecord)> {
        self.state
            .records
            .iter()
            .map(|(address, record)| (address, record.as_ref()))
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.state.records.len()
    }

    /// Whether the trace holds no records
    pub fn is_empty(&self) -> bool {
        self.state.records.is_empty()
    }

    /// Joint log-probability of the last run
    pub fn log_prob(&self) -> f64 {
        self.state.log_prob
    }

    /// Log-probability of records created by the last run
    pub fn new_log_prob(&self) -> f64 {
        self.state.new_log_prob
    }

    /// Log-probability of records reclaimed by the last run
    pub fn old_log_prob(&self) -> f64 {
        self.state.old_log_prob
    }

    /// Whether every hard constraint of the last run held
    pub fn conditions_satisfied(&self) -> bool {
        self.state.conditions_satisfied
    }

    /// Result of the last run, if any run has completed
    pub fn return_value(&self) -> Option<&T> {
        self.return_value.as_ref()
    }

    /// Counters of the last run
    pub fn last_run_stats(&self) -> &RunStats {
        &self.state.stats
    }

    /// Configuration in effect
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Serialisable snapshot of the bookkeeping
    pub fn summary(&self) -> TraceSummary {
        let mut records: Vec<(&Address, &RandomVariableRecord)> = self.records().collect();
        records.sort_by(|a, b| a.0.cmp(b.0));

        let free = |structural: bool| {
            records
                .iter()
                .filter(|(_, r)| !r.is_conditioned() && r.is_structural() == structural)
                .count()
        };

        TraceSummary {
            log_prob: self.log_prob(),
            new_log_prob: self.new_log_prob(),
            old_log_prob: self.old_log_prob(),
            conditions_satisfied: self.conditions_satisfied(),
            structural: free(true),
            nonstructural: free(false),
            conditioned: records.iter().filter(|(_, r)| r.is_conditioned()).count(),
            last_run: self.state.stats.clone(),
            records: records
                .iter()
                .map(|(address, record)| RecordSummary {
                    address: address.to_string(),
                    erp: record.erp().name().to_string(),
                    value: record.value().to_string(),
                    log_density: record.log_density(),
                    structural: record.is_structural(),
                    conditioned: record.is_conditioned(),
                })
                .collect(),
        }
    }
}

impl<T: Clone> RandomExecutionTrace<T> {
    /// Independent copy with its own random stream
    ///
    /// Records are shared until either trace changes one. Forking advances
    /// this trace's stream, so successive forks draw differently.
    pub fn fork(&mut self) -> Self {
        let seed: u64 = self.rng.gen();
        Self {
            computation: Arc::clone(&self.computation),
            config: self.config.clone(),
            state: self.state.clone(),
            rng: StdRng::seed_from_u64(seed),
            return_value: self.return_value.clone(),
        }
    }

    /// Propose a change to the choice at `address`
    ///
    /// Draws a new value from the record's proposal kernel on a fork of this
    /// trace and re-runs the computation so dependent choices follow. The
    /// forward density includes every choice the move created; the reverse
    /// density includes every choice it reclaimed. This trace's records are
    /// left untouched.
    pub fn propose_change(&mut self, address: &Address) -> TraceResult<Proposal<T>> {
        match self.state.records.get(address) {
            None => return Err(TraceError::MissingAddress(address.clone())),
            Some(record) if record.is_conditioned() => {
                return Err(TraceError::ConditionedAddress(address.clone()))
            }
            Some(_) => {}
        }

        let mut next = self.fork();
        let record = next
            .state
            .records
            .get_mut(address)
            .map(Arc::make_mut)
            .ok_or_else(|| TraceError::MissingAddress(address.clone()))?;

        let current = record.value().clone();
        let erp = record.erp().clone();
        let proposed = erp.proposal_sample(&current, record.params(), &mut next.rng);
        let mut forward_log_prob = erp.proposal_log_density(&current, &proposed, record.params());
        let mut reverse_log_prob = erp.proposal_log_density(&proposed, &current, record.params());
        record.set_value(proposed);

        next.update()?;
        forward_log_prob += next.new_log_prob();
        reverse_log_prob += next.old_log_prob();

        debug!(
            %address,
            forward_log_prob,
            reverse_log_prob,
            log_prob = next.log_prob(),
            "proposal evaluated"
        );

        Ok(Proposal {
            trace: next,
            forward_log_prob,
            reverse_log_prob,
        })
    }
}

impl<T> fmt::Debug for RandomExecutionTrace<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomExecutionTrace")
            .field("records", &self.state.records.len())
            .field("log_prob", &self.state.log_prob)
            .field("new_log_prob", &self.state.new_log_prob)
            .field("old_log_prob", &self.state.old_log_prob)
            .field("conditions_satisfied", &self.state.conditions_satisfied)
            .finish_non_exhaustive()
    }
}

/// Create a trace with rejection initialisation and default configuration
pub fn new_trace<T, F>(computation: F) -> TraceResult<RandomExecutionTrace<T>>
where
    F: Fn() -> T + Send + Sync + 'static,
{
    RandomExecutionTrace::new(computation, true)
}

/// Candidate trace and transition densities from [`RandomExecutionTrace::propose_change`]
#[derive(Clone, Debug)]
pub struct Proposal<T> {
    /// The re-run candidate
    pub trace: RandomExecutionTrace<T>,
    /// Log-density of making this move
    pub forward_log_prob: f64,
    /// Log-density of the reverse move
    pub reverse_log_prob: f64,
}

impl<T> Proposal<T> {
    /// Log Metropolis-Hastings ratio of moving from `current` to this candidate
    pub fn log_acceptance_ratio(&self, current: &RandomExecutionTrace<T>) -> f64 {
        (self.trace.log_prob() - current.log_prob()) + self.reverse_log_prob
            - self.forward_log_prob
    }

    /// Split into `(trace, forward_log_prob, reverse_log_prob)`
    pub fn into_parts(self) -> (RandomExecutionTrace<T>, f64, f64) {
        (self.trace, self.forward_log_prob, self.reverse_log_prob)
    }
}
