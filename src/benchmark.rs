//! Benchmarking and experimentation module for VSPTW.
//!
//! Runs strategies over several seeds, collects per-run results and aggregates them.

use crate::config::SolverConfig;
use crate::heuristics::construction::*;
use crate::heuristics::fix_and_refill::{RandomizedSearchAndFix, RandomizedSearchAndFixContinuous};
use crate::heuristics::local_search::*;
use crate::error::{Result, SolverError};
use crate::instance::{Context, Instance};
use crate::schedule::Schedule;
use crate::shipment::ShipmentRequest;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Solving strategies selectable from the command line
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// A single construction
    Construction,
    /// Randomized multi-restart
    Randomized,
    /// Swap hill-climbing over the insertion order
    List,
    /// Freeze good trucks and rebuild the rest
    Fix,
    /// Probabilistic freezing
    FixContinuous,
}

impl Strategy {
    pub fn all() -> [Strategy; 5] {
        [
            Strategy::Construction,
            Strategy::Randomized,
            Strategy::List,
            Strategy::Fix,
            Strategy::FixContinuous,
        ]
    }

    /// Run the strategy with the tuning of `ctx`, seeded with `seed`.
    pub fn run(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>], seed: u64) -> Schedule {
        let config = SolverConfig { seed, ..ctx.config.clone() };
        match self {
            Strategy::Construction => {
                let heuristic = SequentialInsertion::from_config(&config);
                let order = order_requests(requests, heuristic.policy.priority);
                heuristic.construct(ctx, &ConstructionJob::new(&order), seed)
            }
            Strategy::Randomized => RandomizedSearch::from_config(&config).improve(ctx, requests),
            Strategy::List => ListSearch::from_config(&config).improve(ctx, requests),
            Strategy::Fix => RandomizedSearchAndFix::from_config(&config).improve(ctx, requests),
            Strategy::FixContinuous => RandomizedSearchAndFixContinuous::from_config(&config).improve(ctx, requests),
        }
    }
}

/// Result of running a single strategy once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub strategy: String,
    pub instance: String,
    pub seed: u64,
    pub cost: f64,
    pub trucks: usize,
    pub drivers: usize,
    pub unplaced: usize,
    pub feasible: bool,
    /// Computation time in seconds
    pub time: f64,
}

/// Aggregated statistics for a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatistics {
    pub strategy: String,
    pub runs: usize,
    pub num_complete: usize,
    pub best_cost: f64,
    pub mean_cost: f64,
    /// Sample standard deviation, 0 for a single run
    pub std_cost: f64,
    pub mean_trucks: f64,
    pub mean_time: f64,
}

/// Benchmarking engine
pub struct Benchmark {
    seeds: Vec<u64>,
    results: Vec<RunResult>,
}

impl Benchmark {
    pub fn new(seeds: Vec<u64>) -> Self {
        Benchmark { seeds, results: Vec::new() }
    }

    /// Seeds `first, first + 1, ...`
    pub fn with_seed_count(first: u64, count: usize) -> Self {
        Self::new((0..count as u64).map(|i| first + i).collect())
    }

    /// Run every strategy once per seed on `instance`.
    pub fn run(&mut self, instance: &Instance, config: &SolverConfig, strategies: &[Strategy], progress: Option<&ProgressBar>) {
        let ctx = instance.context(config);
        log::info!("Running benchmark on instance: {}", instance.name);
        let seeds = self.seeds.clone();
        for strategy in strategies {
            for &seed in &seeds {
                let schedule = strategy.run(&ctx, &instance.requests, seed);
                self.record_result(&ctx, &instance.name, seed, &schedule);
                if let Some(bar) = progress {
                    bar.inc(1);
                }
            }
        }
    }

    /// Record a result
    pub fn record_result(&mut self, ctx: &Context<'_>, instance: &str, seed: u64, schedule: &Schedule) {
        self.results.push(RunResult {
            strategy: schedule.algorithm.clone(),
            instance: instance.to_string(),
            seed,
            cost: schedule.total_cost(ctx),
            trucks: schedule.num_trucks(),
            drivers: schedule.num_drivers(ctx),
            unplaced: schedule.unplaced.len(),
            feasible: schedule.is_feasible(ctx),
            time: schedule.computation_time,
        });
    }

    /// Compute statistics for each strategy, cheapest mean first
    pub fn compute_statistics(&self) -> Vec<StrategyStatistics> {
        let mut by_strategy: BTreeMap<&str, Vec<&RunResult>> = BTreeMap::new();
        for result in &self.results {
            by_strategy.entry(result.strategy.as_str()).or_default().push(result);
        }

        let mut statistics = Vec::new();
        for (strategy, results) in by_strategy {
            let costs: Vec<f64> = results.iter().filter(|r| r.feasible).map(|r| r.cost).collect();
            if costs.is_empty() {
                continue;
            }
            let trucks: Vec<f64> = results.iter().map(|r| r.trucks as f64).collect();
            let times: Vec<f64> = results.iter().map(|r| r.time).collect();
            let std_cost = if costs.len() > 1 { Statistics::std_dev(costs.iter()) } else { 0.0 };

            statistics.push(StrategyStatistics {
                strategy: strategy.to_string(),
                runs: results.len(),
                num_complete: results.iter().filter(|r| r.feasible && r.unplaced == 0).count(),
                best_cost: costs.iter().cloned().fold(f64::INFINITY, f64::min),
                mean_cost: Statistics::mean(costs.iter()),
                std_cost,
                mean_trucks: Statistics::mean(trucks.iter()),
                mean_time: Statistics::mean(times.iter()),
            });
        }

        statistics.sort_by(|a, b| a.mean_cost.total_cmp(&b.mean_cost));
        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SolverError::io(path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush().map_err(|e| SolverError::io(path, e))?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SolverError::io(path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }
        writer.flush().map_err(|e| SolverError::io(path, e))?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("       VSPTW Benchmark Report\n");
        report.push_str("========================================\n\n");

        report.push_str(&"-".repeat(96));
        report.push('\n');
        report.push_str(&format!(
            "{:<34} {:>9} {:>14} {:>14} {:>10} {:>7} {:>8}\n",
            "Strategy", "Complete", "Best", "Mean", "Std", "Trucks", "Time"
        ));
        report.push_str(&"-".repeat(96));
        report.push('\n');

        for stat in self.compute_statistics() {
            report.push_str(&format!(
                "{:<34} {:>9} {:>14.2} {:>14.2} {:>10.2} {:>7.1} {:>8.3}\n",
                stat.strategy,
                format!("{}/{}", stat.num_complete, stat.runs),
                stat.best_cost,
                stat.mean_cost,
                stat.std_cost,
                stat.mean_trucks,
                stat.mean_time
            ));
        }

        report.push_str(&"-".repeat(96));
        report.push('\n');
        report
    }

    /// Get all results
    pub fn results(&self) -> &[RunResult] {
        &self.results
    }
}
