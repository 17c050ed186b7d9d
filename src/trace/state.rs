//! Record store and per-run accumulators
//!
//! `TraceState` is the part of a trace that a run mutates. During `update()`
//! it is moved into the execution context so choice points anywhere in the
//! computation can reach it, and moved back when the run finishes.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::RngCore;
use tracing::trace;

use super::record::{ChoiceRequest, RandomVariableRecord, Resolution};
use crate::address::Address;
use crate::diagnostics::RunStats;
use crate::erp::traits::ChoiceValue;

fn fresh_record(request: &ChoiceRequest<'_>, rng: &mut dyn RngCore) -> RandomVariableRecord {
    let value = match request.conditioned {
        Some(observed) => observed.clone(),
        None => request.erp.sample(request.params, rng),
    };
    RandomVariableRecord::new(
        request.erp.clone(),
        request.params.to_vec(),
        value,
        request.structural,
        request.conditioned.is_some(),
    )
}

/// Records are shared between a trace and its proposal snapshots and copied
/// only when one side changes them.
pub(crate) type RecordMap = HashMap<Address, Arc<RandomVariableRecord>>;

#[derive(Clone, Debug, Default)]
pub(crate) struct TraceState {
    pub(crate) records: RecordMap,
    /// Addresses reached in the current run. Liveness lives here rather than
    /// on the records so a run over shared records does not copy them.
    pub(crate) visited: HashSet<Address>,
    pub(crate) log_prob: f64,
    pub(crate) new_log_prob: f64,
    pub(crate) old_log_prob: f64,
    pub(crate) conditions_satisfied: bool,
    pub(crate) stats: RunStats,
}

impl TraceState {
    /// Reset accumulators and mark every record inactive
    pub(crate) fn begin_run(&mut self) {
        self.log_prob = 0.0;
        self.new_log_prob = 0.0;
        self.conditions_satisfied = true;
        self.visited.clear();
        self.stats = RunStats::default();
    }

    pub(crate) fn is_visited(&self, address: &Address) -> bool {
        self.visited.contains(address)
    }

    /// Resolve a choice at `address`, reusing the stored record when its kind matches
    pub(crate) fn lookup(
        &mut self,
        address: Address,
        request: &ChoiceRequest<'_>,
        rng: &mut dyn RngCore,
    ) -> ChoiceValue {
        if self.visited.contains(&address) {
            self.stats.revisits += 1;
        }

        let resolution;
        let record = match self.records.entry(address.clone()) {
            Entry::Occupied(slot) => {
                resolution = Resolution::classify(Some(slot.get()), request);
                let slot = slot.into_mut();
                match resolution {
                    Resolution::Reuse => {}
                    Resolution::Reparameterize => Arc::make_mut(slot).reparameterize(request.params),
                    Resolution::Fresh(_) => *slot = Arc::new(fresh_record(request, rng)),
                }
                slot
            }
            Entry::Vacant(slot) => {
                resolution = Resolution::classify(None, request);
                slot.insert(Arc::new(fresh_record(request, rng)))
            }
        };

        match resolution {
            Resolution::Fresh(reason) => {
                trace!(
                    %address,
                    erp = request.erp.name(),
                    ?reason,
                    value = %record.value(),
                    log_density = record.log_density(),
                    "created record"
                );
                self.new_log_prob += record.log_density();
                self.stats.created += 1;
            }
            Resolution::Reparameterize => self.stats.reparameterized += 1,
            Resolution::Reuse => self.stats.reused += 1,
        }

        self.log_prob += record.log_density();
        let value = record.value().clone();
        self.visited.insert(address);
        value
    }

    pub(crate) fn add_factor(&mut self, log_weight: f64) {
        self.log_prob += log_weight;
        self.stats.factors += 1;
    }

    pub(crate) fn condition_on(&mut self, satisfied: bool) {
        self.conditions_satisfied = self.conditions_satisfied && satisfied;
    }

    /// Reclaim every record the run did not reach
    pub(crate) fn finish_run(&mut self) {
        let visited = std::mem::take(&mut self.visited);
        let mut old_log_prob = 0.0;
        let mut reclaimed = 0;

        self.records.retain(|address, record| {
            if visited.contains(address) {
                true
            } else {
                trace!(%address, log_density = record.log_density(), "reclaimed record");
                old_log_prob += record.log_density();
                reclaimed += 1;
                false
            }
        });

        self.old_log_prob = old_log_prob;
        self.stats.reclaimed = reclaimed;
    }

    /// Drop all records, as rejection initialisation does before each attempt
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.visited.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressContext, SiteId};
    use crate::erp::primitives::Gaussian;
    use crate::erp::traits::ErpHandle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn address(line: u32) -> Address {
        AddressContext::new().current_address(
            0,
            SiteId::Source {
                file: "state.rs",
                line,
                column: 1,
            },
        )
    }

    fn request<'a>(erp: &'a ErpHandle, params: &'a [f64]) -> ChoiceRequest<'a> {
        ChoiceRequest {
            erp,
            params,
            structural: false,
            conditioned: None,
        }
    }

    #[test]
    fn test_lookup_creates_then_reuses() {
        let erp = ErpHandle::new(Gaussian::default());
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = TraceState::default();

        state.begin_run();
        let first = state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        state.finish_run();
        assert_eq!(state.stats.created, 1);
        assert!((state.log_prob - state.new_log_prob).abs() < 1e-12);

        state.begin_run();
        let second = state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        state.finish_run();
        assert_eq!(first, second);
        assert_eq!(state.stats.reused, 1);
        assert_eq!(state.new_log_prob, 0.0);
        assert_eq!(state.old_log_prob, 0.0);
    }

    #[test]
    fn test_reparameterize_keeps_value() {
        let erp = ErpHandle::new(Gaussian::default());
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = TraceState::default();

        state.begin_run();
        let first = state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        state.finish_run();

        state.begin_run();
        let second = state.lookup(address(1), &request(&erp, &[3.0, 1.0]), &mut rng);
        state.finish_run();

        assert_eq!(first, second);
        assert_eq!(state.stats.reparameterized, 1);
        let expected = erp.log_density(&second, &[3.0, 1.0]);
        assert!((state.log_prob - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unvisited_records_are_reclaimed() {
        let erp = ErpHandle::new(Gaussian::default());
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = TraceState::default();

        state.begin_run();
        state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        state.lookup(address(2), &request(&erp, &[0.0, 1.0]), &mut rng);
        state.finish_run();
        let dropped = state.records[&address(2)].log_density();

        state.begin_run();
        state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        state.finish_run();

        assert_eq!(state.records.len(), 1);
        assert!(!state.records.contains_key(&address(2)));
        assert!((state.old_log_prob - dropped).abs() < 1e-12);
        assert_eq!(state.stats.reclaimed, 1);
    }

    #[test]
    fn test_factor_and_condition() {
        let mut state = TraceState::default();
        state.begin_run();
        assert!(state.conditions_satisfied);
        state.add_factor(-1.5);
        state.add_factor(0.5);
        state.condition_on(true);
        state.condition_on(false);
        state.condition_on(true);
        assert!((state.log_prob + 1.0).abs() < 1e-12);
        assert!(!state.conditions_satisfied);
        assert_eq!(state.stats.factors, 2);
    }

    #[test]
    fn test_revisit_is_counted() {
        let erp = ErpHandle::new(Gaussian::default());
        let mut rng = StdRng::seed_from_u64(8);
        let mut state = TraceState::default();

        state.begin_run();
        state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        assert!(state.is_visited(&address(1)));
        state.lookup(address(1), &request(&erp, &[0.0, 1.0]), &mut rng);
        assert_eq!(state.stats.revisits, 1);
    }
}
