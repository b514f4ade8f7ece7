//! Exact solvers module.
//!
//! An exact solver works on a time-expanded network: each request is discretized into a few
//! candidate realizations, and an arc links two realizations when one truck can serve them in
//! sequence with little enough waiting. This build ships no MIP backend, so
//! [`UnavailableExactSolver`] builds the network and reports that it cannot go further.

use crate::error::{Result, SolverError};
use crate::instance::Context;
use crate::schedule::Schedule;
use crate::shipment::{Shipment, ShipmentRequest, TIME_EPS};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ExactConfig {
    /// Time limit in seconds
    pub time_limit: f64,
    /// MIP gap tolerance
    pub mip_gap: f64,
    /// Number of threads (0 = automatic)
    pub threads: i32,
    pub verbose: bool,
    /// Spacing of the candidate start times
    pub interval_minutes: f64,
    /// Most candidate start times per request
    pub max_copies: usize,
    /// Longest idle gap an arc may bridge, in hours
    pub max_waiting_time: f64,
}

impl Default for ExactConfig {
    fn default() -> Self {
        ExactConfig {
            time_limit: 3600.0,
            mip_gap: 1e-6,
            threads: 0,
            verbose: false,
            interval_minutes: 15.0,
            max_copies: 5,
            max_waiting_time: 1.5,
        }
    }
}

/// Result of exact solving
#[derive(Debug, Clone)]
pub struct ExactResult {
    pub schedule: Schedule,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub gap: f64,
    /// Whether optimality was proven
    pub optimal: bool,
    pub status: String,
    pub nodes_explored: i64,
}

pub trait ExactSolver {
    fn solve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>], config: &ExactConfig) -> Result<ExactResult>;
    fn name(&self) -> &str;
}

/// Candidate realizations and the arcs allowed between them.
#[derive(Debug, Clone)]
pub struct TimeExpandedNetwork {
    pub nodes: Vec<Shipment>,
    /// `(from, to)` node indices: `to` can follow `from` on one truck
    pub arcs: Vec<(usize, usize)>,
}

impl TimeExpandedNetwork {
    /// Discretize every request and connect realizations of distinct requests whose idle gap lies
    /// in `[0, max_waiting_time]`.
    pub fn build(ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>], config: &ExactConfig, max_waiting_time: f64) -> Self {
        let nodes: Vec<Shipment> = requests
            .iter()
            .flat_map(|r| r.discretize(config.interval_minutes, config.max_copies))
            .collect();

        let mut arcs = Vec::new();
        for (i, from) in nodes.iter().enumerate() {
            for (j, to) in nodes.iter().enumerate() {
                if from.request_id() == to.request_id() {
                    continue;
                }
                let arrival = from.end_time() + ctx.drive(from.end_location, to.start_location);
                let gap = to.start_time() - arrival;
                if gap >= -TIME_EPS && gap <= max_waiting_time + TIME_EPS {
                    arcs.push((i, j));
                }
            }
        }
        TimeExpandedNetwork { nodes, arcs }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// Node indices realizing `request_id`.
    pub fn copies_of(&self, request_id: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.request_id() == request_id)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Stands in for a MIP backend in builds that have none.
#[derive(Debug, Clone, Default)]
pub struct UnavailableExactSolver;

impl ExactSolver for UnavailableExactSolver {
    fn solve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>], config: &ExactConfig) -> Result<ExactResult> {
        let network = TimeExpandedNetwork::build(ctx, requests, config, config.max_waiting_time);
        log::info!(
            "Time-expanded network: {} nodes, {} arcs, {} depots",
            network.num_nodes(),
            network.num_arcs(),
            ctx.depots.len()
        );
        Err(SolverError::ExactUnavailable("no MIP backend in this build".to_string()))
    }

    fn name(&self) -> &str {
        "Exact"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::instance::{Depot, DriveTimes, Location};

    #[test]
    fn test_network_arcs_respect_waiting() {
        let times = DriveTimes::uniform(&["D", "X", "Y"], 0.5);
        let depots = vec![Depot { location: Location(0), capacity: 1 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let requests = vec![
            Arc::new(ShipmentRequest::new("A", 8.0, 8.5, 9.0, Location(1), Location(2), "IB").unwrap()),
            Arc::new(ShipmentRequest::fixed("B", 10.0, 11.0, Location(2), Location(1), "OB").unwrap()),
        ];
        let exact = ExactConfig { interval_minutes: 30.0, ..ExactConfig::default() };

        let network = TimeExpandedNetwork::build(&ctx, &requests, &exact, 1.0);
        assert_eq!(network.copies_of("A").len(), 2);
        assert_eq!(network.copies_of("B").len(), 1);
        // A at 8.0 ends 9.0, idles 1.0 before B; A at 8.5 idles 0.5
        assert_eq!(network.num_arcs(), 2);
        assert!(network.arcs.iter().all(|&(from, to)| network.nodes[from].request_id() == "A"
            && network.nodes[to].request_id() == "B"));

        let tight = TimeExpandedNetwork::build(&ctx, &requests, &exact, 0.75);
        assert_eq!(tight.num_arcs(), 1);
    }

    #[test]
    fn test_unavailable_solver_reports_error() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let depots = vec![Depot { location: Location(0), capacity: 1 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let result = UnavailableExactSolver.solve(&ctx, &[], &ExactConfig::default());
        assert!(matches!(result, Err(SolverError::ExactUnavailable(_))));
    }

    #[test]
    fn test_arc_waiting_is_tighter_than_construction() {
        let exact = ExactConfig::default();
        assert_eq!(exact.max_waiting_time, 1.5);
        assert!(exact.max_waiting_time < SolverConfig::default().construction.max_waiting_time);
    }
}
