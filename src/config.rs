//! Run configuration.
//!
//! Every tuning constant of the engine lives in [`SolverConfig`], which is passed explicitly
//! through [`crate::instance::Context`]. Nothing reads process-wide state, so parallel runs with
//! different tunings never interfere.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights of the truck cost function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Multiplies the squared waiting time
    pub waiting: f64,
    /// Multiplies the empty driving time
    pub empty_driving: f64,
    /// Paid once per active truck
    pub fixed_truck: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        CostWeights {
            waiting: 30.0,
            empty_driving: 60.0,
            fixed_truck: 100_000.0,
        }
    }
}

/// Legal working-day durations, in hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationRules {
    /// Trucks leaving the depot before this hour work an early-start day
    pub early_start_cutoff: f64,
    pub early_max_duration: f64,
    pub early_max_duration_with_waiting: f64,
    pub max_duration: f64,
    pub max_duration_with_waiting: f64,
    /// Waiting time from which the longer cap applies
    pub waiting_allowance: f64,
    /// Both halves of a split day must exceed this; shorter days are padded with waiting
    pub min_duration_split: f64,
    /// Cap used by [`DurationCap::Fixed`]
    pub fixed_max_duration: f64,
    /// Loading time contained in each shipment, excluded from driving time
    pub loading_time: f64,
}

impl Default for DurationRules {
    fn default() -> Self {
        DurationRules {
            early_start_cutoff: 1.25,
            early_max_duration: 11.0,
            early_max_duration_with_waiting: 11.25,
            max_duration: 13.5,
            max_duration_with_waiting: 14.0,
            waiting_allowance: 1.0,
            min_duration_split: 7.0,
            fixed_max_duration: 13.5,
            loading_time: 1.0,
        }
    }
}

/// Thresholds of the "good enough to freeze" truck predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficiencyRules {
    pub max_empty_driving: f64,
    pub max_waiting: f64,
    pub min_duration: f64,
}

impl Default for EfficiencyRules {
    fn default() -> Self {
        EfficiencyRules {
            max_empty_driving: 1.0,
            max_waiting: 2.0,
            min_duration: 10.0,
        }
    }
}

/// Hour thresholds deciding when an insertion is priced as the new end (or start) of the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurchargeRules {
    /// Shipments appended after this hour pay the pull-in drive
    pub late_shipment_start: f64,
    /// Shipments prepended before this hour pay the pull-out drive
    pub early_shipment_start: f64,
    /// Day length above which the midday rule applies
    pub long_day: f64,
    pub midday: f64,
    /// Realized end before which a fresh truck is priced by its pull-out drive
    pub inactive_end_cutoff: f64,
}

impl Default for SurchargeRules {
    fn default() -> Self {
        SurchargeRules {
            late_shipment_start: 14.0,
            early_shipment_start: 7.0,
            long_day: 11.0,
            midday: 12.0,
            inactive_end_cutoff: 10.0,
        }
    }
}

/// Order in which requests are fed to the construction heuristic.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityKey {
    /// Latest start ascending, ties by window width ascending
    LatestStartThenWidth,
    LatestStart,
    EarliestStart,
}

/// Where a request may be inserted on an active truck.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InsertionSide {
    AfterOnly,
    BeforeAndAfter,
}

/// Duration bound enforced while inserting.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DurationCap {
    /// Depends on the truck's start hour and waiting time
    StartDependent,
    Fixed,
    Unbounded,
}

/// How ties between equally cheap active trucks are broken.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    Deterministic,
    RandomCost,
    RandomCostAndDistance,
}

/// How a fresh truck is priced when it is activated for a request.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InactivePricing {
    /// Always the drive from the depot to the request's start
    PullOut,
    /// Pull-out for early requests, pull-in otherwise
    CutoffDependent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionPolicy {
    pub priority: PriorityKey,
    pub insertion: InsertionSide,
    pub duration_cap: DurationCap,
    pub tie_break: TieBreak,
    pub inactive_pricing: InactivePricing,
    /// How much earlier than its window a request may be reached and still count as compatible.
    /// The default is large enough to never prune; waiting is priced by the cost instead.
    pub max_waiting_time: f64,
    /// Time-shift trucks and reassign depots after construction
    pub post_process: bool,
}

impl Default for ConstructionPolicy {
    fn default() -> Self {
        ConstructionPolicy {
            priority: PriorityKey::LatestStartThenWidth,
            insertion: InsertionSide::BeforeAndAfter,
            duration_cap: DurationCap::StartDependent,
            tie_break: TieBreak::RandomCostAndDistance,
            inactive_pricing: InactivePricing::CutoffDependent,
            max_waiting_time: 100.0,
            post_process: true,
        }
    }
}

impl ConstructionPolicy {
    /// First-found ties, after-only insertion, no surprises.
    pub fn deterministic() -> Self {
        ConstructionPolicy {
            insertion: InsertionSide::AfterOnly,
            tie_break: TieBreak::Deterministic,
            inactive_pricing: InactivePricing::PullOut,
            max_waiting_time: 1.5,
            ..Self::default()
        }
    }
}

/// Iteration and time budgets of the local-search strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudgets {
    pub restarts: usize,
    pub list_rounds: usize,
    pub list_swaps_per_round: usize,
    pub list_max_stale_rounds: usize,
    pub fix_iterations: usize,
    /// Fix-and-refill stops once fewer requests than this remain pending
    pub fix_min_pending: usize,
    pub continuous_iterations: usize,
    /// Acceptance temperature factor of the continuous fix-and-refill
    pub cooling: f64,
    /// Wall-clock limit in seconds, checked between runs
    pub time_limit: Option<f64>,
}

impl Default for SearchBudgets {
    fn default() -> Self {
        SearchBudgets {
            restarts: 100,
            list_rounds: 5,
            list_swaps_per_round: 100,
            list_max_stale_rounds: 100,
            fix_iterations: 50,
            fix_min_pending: 30,
            continuous_iterations: 50,
            cooling: 0.7,
            time_limit: None,
        }
    }
}

/// Complete configuration of a solver run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub cost: CostWeights,
    pub duration: DurationRules,
    pub efficiency: EfficiencyRules,
    pub surcharges: SurchargeRules,
    pub construction: ConstructionPolicy,
    pub search: SearchBudgets,
    pub seed: u64,
}

impl SolverConfig {
    /// Load a JSON configuration file; absent fields take their default value.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SolverError::io(path, e))?;
        let config: SolverConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("cost.waiting", self.cost.waiting),
            ("cost.empty_driving", self.cost.empty_driving),
            ("cost.fixed_truck", self.cost.fixed_truck),
        ];
        for (name, value) in weights {
            if !(value.is_finite() && value > 0.0) {
                return Err(SolverError::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }

        let rules = &self.duration;
        let caps = [
            rules.early_max_duration,
            rules.early_max_duration_with_waiting,
            rules.max_duration,
            rules.max_duration_with_waiting,
            rules.fixed_max_duration,
        ];
        if caps.iter().any(|&cap| cap <= rules.min_duration_split) {
            return Err(SolverError::InvalidConfig(format!(
                "every duration cap must exceed min_duration_split ({})",
                rules.min_duration_split
            )));
        }
        if rules.early_max_duration_with_waiting < rules.early_max_duration
            || rules.max_duration_with_waiting < rules.max_duration
        {
            return Err(SolverError::InvalidConfig(
                "caps with waiting allowance cannot be shorter than the plain caps".to_string(),
            ));
        }
        if self.construction.max_waiting_time < 0.0 {
            return Err(SolverError::InvalidConfig("construction.max_waiting_time cannot be negative".to_string()));
        }
        if !(self.search.cooling > 0.0) {
            return Err(SolverError::InvalidConfig(format!("search.cooling must be positive, got {}", self.search.cooling)));
        }
        if let Some(limit) = self.search.time_limit {
            if !(limit > 0.0) {
                return Err(SolverError::InvalidConfig(format!("search.time_limit must be positive, got {}", limit)));
            }
        }
        Ok(())
    }
}
