// crates/workload-trust-core/src/model/report.rs
// ============================================================================
// Module: Instance Trust Reports
// Description: Per-rule results and the aggregated instance trust report.
// Purpose: Capture verification outcomes in a persistable wire shape.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`InstanceTrustReport`] aggregates one [`RuleResult`] per applied rule.
//! Invariants:
//! - `trusted` is the conjunction of every result; no results means untrusted.
//! - Reports are built once and never mutated by the core.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::model::manifest::InstanceManifest;
use crate::model::rules::Fault;
use crate::model::rules::Rule;
use crate::model::rules::RuleOutcome;

// ============================================================================
// SECTION: Policy Names
// ============================================================================

/// Policy name reported for VM image flavors.
pub const VM_POLICY_NAME: &str = "Intel VM Policy";
/// Policy name reported for container image flavors.
pub const CONTAINER_POLICY_NAME: &str = "Intel Container Policy";

// ============================================================================
// SECTION: Rule Result
// ============================================================================

/// Outcome of one rule evaluated against one flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Rule that was applied.
    pub rule: Rule,
    /// Identifier of the flavor the rule came from.
    pub flavor_id: String,
    /// Faults explaining an untrusted result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<Fault>,
    /// Whether the rule held.
    pub trusted: bool,
}

impl RuleResult {
    /// Builds a result from a rule and its outcome.
    #[must_use]
    pub fn new(rule: Rule, flavor_id: impl Into<String>, outcome: RuleOutcome) -> Self {
        Self {
            rule,
            flavor_id: flavor_id.into(),
            faults: outcome.faults,
            trusted: outcome.trusted,
        }
    }
}

// ============================================================================
// SECTION: Instance Trust Report
// ============================================================================

/// Aggregated verification outcome for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTrustReport {
    /// Manifest that was evaluated.
    pub instance_manifest: InstanceManifest,
    /// Policy applied to the manifest.
    pub policy_name: String,
    /// Per-rule results in evaluation order.
    pub results: Vec<RuleResult>,
    /// Overall trust decision.
    pub trusted: bool,
}

impl InstanceTrustReport {
    /// Builds a report, deriving the overall decision from the results.
    #[must_use]
    pub fn new(
        instance_manifest: InstanceManifest,
        policy_name: impl Into<String>,
        results: Vec<RuleResult>,
    ) -> Self {
        let trusted = aggregate_trust(&results);
        Self {
            instance_manifest,
            policy_name: policy_name.into(),
            results,
            trusted,
        }
    }

    /// Returns the faults of every untrusted result.
    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.results.iter().flat_map(|result| result.faults.iter())
    }
}

/// Conjunction of result decisions; an empty set is untrusted.
#[must_use]
pub fn aggregate_trust(results: &[RuleResult]) -> bool {
    !results.is_empty() && results.iter().all(|result| result.trusted)
}
