//! VSPTW Solver Library
//!
//! A heuristic solver for the multi-depot Vehicle Scheduling Problem with Time Windows: assign
//! time-windowed shipments to trucks housed at capacity-limited depots, fixing a start time for
//! each, so that the fleet, the empty driving and the (squared) waiting are as small as possible.
//!
//! # Features
//!
//! - One configurable sequential-insertion construction (request order, insertion side,
//!   duration cap, tie-break and fresh-truck pricing are policies)
//! - Post-processing: time shifting of shipments and depot reassignment
//! - Improvement strategies: randomized multi-restart, order swapping, fix-and-refill
//! - Driver-change repair, schedule checks, CSV/JSON export and SVG timelines
//!
//! # Example
//!
//! ```no_run
//! use vsptw_solver::config::SolverConfig;
//! use vsptw_solver::instance::Instance;
//! use vsptw_solver::heuristics::local_search::{LocalSearch, RandomizedSearch};
//!
//! // Load instance
//! let instance = Instance::from_files("matrix.csv", "depots.csv", "shipments.csv").unwrap();
//! let config = SolverConfig::default();
//! let ctx = instance.context(&config);
//!
//! // Best of many randomized constructions
//! let schedule = RandomizedSearch::from_config(&config).improve(&ctx, &instance.requests);
//!
//! println!("Schedule cost: {:.2} with {} trucks", schedule.total_cost(&ctx), schedule.num_trucks());
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod shipment;
pub mod truck;
pub mod schedule;
pub mod check;
pub mod heuristics;
pub mod exact;
pub mod export;
pub mod benchmark;
pub mod visualization;

pub use config::SolverConfig;
pub use error::{Result, SolverError};
pub use instance::{Context, Depot, DriveTimes, Instance, Location};
pub use schedule::Schedule;
pub use shipment::{Shipment, ShipmentRequest};
pub use truck::Truck;
