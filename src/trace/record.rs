//! Random-variable records
//!
//! A record is the persisted state of one choice point. Whether a stored
//! record can serve a new request is decided by [`Resolution::classify`].

use crate::erp::traits::{ChoiceValue, ErpHandle, Params};

/// State of one choice point
///
/// `log_density` is always the density of `value` under `params`; the only
/// mutators keep it that way.
#[derive(Clone, Debug)]
pub struct RandomVariableRecord {
    erp: ErpHandle,
    params: Params,
    value: ChoiceValue,
    log_density: f64,
    conditioned: bool,
    structural: bool,
}

impl RandomVariableRecord {
    /// Create a record for `value`, computing its density
    pub fn new(
        erp: ErpHandle,
        params: Params,
        value: ChoiceValue,
        structural: bool,
        conditioned: bool,
    ) -> Self {
        let log_density = erp.log_density(&value, &params);
        Self {
            erp,
            params,
            value,
            log_density,
            conditioned,
            structural,
        }
    }

    /// The ERP this choice was drawn from
    pub fn erp(&self) -> &ErpHandle {
        &self.erp
    }

    /// Parameters in effect at the last evaluation
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Current value
    pub fn value(&self) -> &ChoiceValue {
        &self.value
    }

    /// Log-density of the current value under the current parameters
    pub fn log_density(&self) -> f64 {
        self.log_density
    }

    /// Whether the value is clamped by an observation
    pub fn is_conditioned(&self) -> bool {
        self.conditioned
    }

    /// Whether this choice can change the shape of later control flow
    pub fn is_structural(&self) -> bool {
        self.structural
    }

    /// Keep the value, adopt new parameters, and rescore
    pub fn reparameterize(&mut self, params: &[f64]) {
        self.params = params.to_vec();
        self.log_density = self.erp.log_density(&self.value, &self.params);
    }

    /// Replace the value and rescore under the prior
    pub fn set_value(&mut self, value: ChoiceValue) {
        self.value = value;
        self.log_density = self.erp.log_density(&self.value, &self.params);
    }
}

/// A choice-point request as issued by a running computation
#[derive(Clone, Copy, Debug)]
pub struct ChoiceRequest<'a> {
    pub erp: &'a ErpHandle,
    pub params: &'a [f64],
    pub structural: bool,
    pub conditioned: Option<&'a ChoiceValue>,
}

/// Why a stored record could not be reused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// Nothing stored at the address
    Missing,
    /// The request names a different ERP
    DistributionChanged,
    /// The structural flag differs
    StructureChanged,
    /// An observation was supplied and disagrees with the stored value
    ObservationChanged,
}

/// Outcome of matching a request against the stored record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Reuse as is
    Reuse,
    /// Reuse the value, rescoring under new parameters
    Reparameterize,
    /// Discard and create a fresh record
    Fresh(StaleReason),
}

impl Resolution {
    /// Decide how a request is served by what is stored
    pub fn classify(existing: Option<&RandomVariableRecord>, request: &ChoiceRequest<'_>) -> Self {
        let record = match existing {
            None => return Self::Fresh(StaleReason::Missing),
            Some(record) => record,
        };

        let same_erp = record.erp.same_as(request.erp);
        let same_structure = record.structural == request.structural;
        let observation_agrees = match request.conditioned {
            None => true,
            Some(observed) => *observed == record.value,
        };

        match (same_erp, same_structure, observation_agrees) {
            (false, _, _) => Self::Fresh(StaleReason::DistributionChanged),
            (true, false, _) => Self::Fresh(StaleReason::StructureChanged),
            (true, true, false) => Self::Fresh(StaleReason::ObservationChanged),
            (true, true, true) if record.params.as_slice() != request.params => {
                Self::Reparameterize
            }
            (true, true, true) => Self::Reuse,
        }
    }

    /// Whether the stored record is kept
    pub fn reuses(&self) -> bool {
        !matches!(self, Self::Fresh(_))
    }
}
