//! Fix-and-refill strategies.
//!
//! Both strategies construct on a shrinking pool of pending requests: the good trucks of each
//! round are frozen and keep their depot capacity, and only the rest is rebuilt.

use super::construction::{order_requests, ConstructionHeuristic, ConstructionJob, SequentialInsertion};
use super::local_search::LocalSearch;
use crate::config::{ConstructionPolicy, DurationCap, SolverConfig};
use crate::instance::Context;
use crate::schedule::Schedule;
use crate::shipment::ShipmentRequest;
use crate::truck::Truck;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;

/// Drop from `pending` every request served by `truck`.
fn release(pending: &mut Vec<Arc<ShipmentRequest>>, truck: &Truck) {
    let served: HashSet<&str> = truck.shipments().iter().map(|s| s.request_id()).collect();
    pending.retain(|r| !served.contains(r.id.as_str()));
}

/// Freeze splittable or efficient trucks, rebuild the rest.
#[derive(Debug, Clone)]
pub struct RandomizedSearchAndFix {
    pub construction: SequentialInsertion,
    pub iterations: usize,
    /// Stop refilling once fewer requests than this are pending
    pub min_pending: usize,
    pub seed: u64,
}

impl RandomizedSearchAndFix {
    /// The construction runs without a duration cap, whatever `construction` says: a splittable
    /// day is longer than any single-driver cap, so a capped construction never produces one.
    pub fn new(construction: SequentialInsertion, iterations: usize, seed: u64) -> Self {
        RandomizedSearchAndFix { construction: Self::uncapped(construction), iterations, min_pending: 30, seed }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        RandomizedSearchAndFix {
            construction: Self::uncapped(SequentialInsertion::from_config(config)),
            iterations: config.search.fix_iterations,
            min_pending: config.search.fix_min_pending,
            seed: config.seed,
        }
    }

    fn uncapped(construction: SequentialInsertion) -> SequentialInsertion {
        SequentialInsertion::new(ConstructionPolicy { duration_cap: DurationCap::Unbounded, ..construction.policy })
    }

    fn worth_keeping(ctx: &Context<'_>, truck: &Truck) -> bool {
        truck.is_splittable(ctx) || truck.is_efficient(ctx)
    }
}

impl LocalSearch for RandomizedSearchAndFix {
    fn improve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>]) -> Schedule {
        let start = std::time::Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut pending = order_requests(requests, self.construction.policy.priority);
        let mut frozen: Vec<Truck> = Vec::new();
        let mut iterations = 0;

        loop {
            let job = ConstructionJob::new(&pending).with_frozen(&frozen);
            let schedule = self.construction.construct(ctx, &job, rng.gen());
            iterations += 1;

            let before = frozen.len();
            for truck in schedule.trucks {
                if Self::worth_keeping(ctx, &truck) {
                    release(&mut pending, &truck);
                    frozen.push(truck);
                }
            }
            log::debug!(
                "{} iteration {}: froze {} trucks, {} requests pending",
                self.name(),
                iterations,
                frozen.len() - before,
                pending.len()
            );

            if pending.is_empty() || pending.len() < self.min_pending || iterations >= self.iterations {
                break;
            }
        }

        let job = ConstructionJob::new(&pending).with_frozen(&frozen);
        let rest = self.construction.construct(ctx, &job, rng.gen());
        let mut result = Schedule::from_trucks(frozen, Vec::new(), self.name()).merge(rest);
        result.post_improve_depots(ctx);

        result.algorithm = self.name().to_string();
        result.computation_time = start.elapsed().as_secs_f64();
        result.iterations = Some(iterations);
        log::info!(
            "{}: {:.2} with {} trucks after {} iterations",
            self.name(),
            result.total_cost(ctx),
            result.num_trucks(),
            iterations
        );
        result
    }

    fn name(&self) -> &str {
        "RandomizedSearchAndFix"
    }
}

/// Probability of keeping a truck whose cost exceeds the fixed truck cost by `excess`.
pub fn accept_probability(excess: f64, cooling: f64, iteration: usize) -> f64 {
    if excess <= 0.0 {
        1.0
    } else {
        (-excess / (cooling * iteration as f64)).exp()
    }
}

/// Keep each truck with a probability that decays with its variable cost and grows over time.
#[derive(Debug, Clone)]
pub struct RandomizedSearchAndFixContinuous {
    pub construction: SequentialInsertion,
    pub max_iterations: usize,
    pub cooling: f64,
    pub seed: u64,
}

impl RandomizedSearchAndFixContinuous {
    pub fn new(construction: SequentialInsertion, max_iterations: usize, seed: u64) -> Self {
        RandomizedSearchAndFixContinuous { construction, max_iterations, cooling: 0.7, seed }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        RandomizedSearchAndFixContinuous {
            construction: SequentialInsertion::from_config(config),
            max_iterations: config.search.continuous_iterations,
            cooling: config.search.cooling,
            seed: config.seed,
        }
    }
}

impl LocalSearch for RandomizedSearchAndFixContinuous {
    fn improve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>]) -> Schedule {
        let start = std::time::Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut pending = order_requests(requests, self.construction.policy.priority);
        let mut kept: Vec<Truck> = Vec::new();
        let mut iterations = 0;
        let fixed = ctx.config.cost.fixed_truck;

        for iteration in 1..=self.max_iterations {
            if pending.is_empty() {
                break;
            }
            iterations = iteration;
            let job = ConstructionJob::new(&pending).with_frozen(&kept);
            let schedule = self.construction.construct(ctx, &job, rng.gen());

            for truck in schedule.trucks {
                let p = accept_probability(truck.total_cost(ctx) - fixed, self.cooling, iteration);
                if rng.gen::<f64>() < p {
                    release(&mut pending, &truck);
                    kept.push(truck);
                }
            }
            log::debug!("{} iteration {}: {} trucks kept, {} pending", self.name(), iteration, kept.len(), pending.len());
        }

        if !pending.is_empty() {
            log::warn!("{}: {} requests left unplaced", self.name(), pending.len());
        }
        let mut result = Schedule::from_trucks(kept, pending, self.name());
        result.computation_time = start.elapsed().as_secs_f64();
        result.iterations = Some(iterations);
        result
    }

    fn name(&self) -> &str {
        "RandomizedSearchAndFixContinuous"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_schedule;
    use crate::instance::{Depot, DriveTimes, Location};

    fn create_test_instance() -> (DriveTimes, Vec<Depot>, Vec<Arc<ShipmentRequest>>) {
        let mut times = DriveTimes::uniform(&["D", "X", "Y"], 0.5);
        times.set(Location(0), Location(1), 0.25);
        times.set(Location(1), Location(0), 0.25);
        let depots = vec![Depot { location: Location(0), capacity: 10 }];
        let requests = (0..20)
            .map(|i| {
                let es = 2.0 + (i % 10) as f64 * 1.2;
                let (from, to) = if i % 2 == 0 { (Location(1), Location(2)) } else { (Location(2), Location(1)) };
                Arc::new(ShipmentRequest::new(format!("T{}", i), es, es + 1.0, es + 1.75, from, to, "IB").unwrap())
            })
            .collect();
        (times, depots, requests)
    }

    #[test]
    fn test_accept_probability() {
        assert_eq!(accept_probability(0.0, 0.7, 1), 1.0);
        assert_eq!(accept_probability(-5.0, 0.7, 3), 1.0);
        let early = accept_probability(1.4, 0.7, 1);
        let late = accept_probability(1.4, 0.7, 10);
        assert!((early - (-2.0f64).exp()).abs() < 1e-12);
        assert!(late > early);
    }

    #[test]
    fn test_fix_and_refill_covers_every_request() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let mut search = RandomizedSearchAndFix::new(SequentialInsertion::default(), 5, 9);
        search.min_pending = 5;
        let schedule = search.improve(&ctx, &requests);

        let report = check_schedule(&ctx, &requests, &schedule);
        assert!(report.is_valid(), "{}", report);
        assert!(schedule.num_trucks() <= 10);
        assert!(schedule.iterations.unwrap() <= 5);
        assert!(schedule.total_cost(&ctx).is_finite());
    }

    /// Eight back-to-back legs between the depot and X, 4.0 to 19.5: one truck, two drivers.
    fn create_relay_day() -> (DriveTimes, Vec<Depot>, Vec<Arc<ShipmentRequest>>) {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let (d, x) = (Location(0), Location(1));
        let depots = vec![Depot { location: d, capacity: 10 }];
        let requests = (0..8)
            .map(|i| {
                let start = 4.0 + 2.0 * i as f64;
                let (from, to) = if i % 2 == 0 { (d, x) } else { (x, d) };
                Arc::new(ShipmentRequest::fixed(format!("L{}", i), start, start + 1.5, from, to, "OB").unwrap())
            })
            .collect();
        (times, depots, requests)
    }

    #[test]
    fn test_relay_day_is_frozen_as_two_shifts() {
        let (times, depots, requests) = create_relay_day();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let search = RandomizedSearchAndFix::from_config(&config);
        assert_eq!(search.construction.policy.duration_cap, DurationCap::Unbounded);
        let schedule = search.improve(&ctx, &requests);

        let report = check_schedule(&ctx, &requests, &schedule);
        assert!(report.is_complete(), "{}", report);
        assert!(schedule.trucks.iter().any(|t| t.is_splittable(&ctx)));
        assert!(schedule.trucks.iter().all(|t| t.is_splittable(&ctx) || t.is_efficient(&ctx)));

        // a capped day stops before the last leg and leaves no legal relief point
        let order = order_requests(&requests, search.construction.policy.priority);
        let capped = SequentialInsertion::default().construct(&ctx, &ConstructionJob::new(&order), 1);
        assert!(capped.trucks.iter().all(|t| !t.is_splittable(&ctx)));
    }

    #[test]
    fn test_new_lifts_the_duration_cap() {
        let search = RandomizedSearchAndFix::new(SequentialInsertion::deterministic(), 3, 1);
        assert_eq!(search.construction.policy.duration_cap, DurationCap::Unbounded);
        assert_eq!(search.construction.policy.tie_break, SequentialInsertion::deterministic().policy.tie_break);
    }

    #[test]
    fn test_fix_and_refill_is_reproducible() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let search = RandomizedSearchAndFix::from_config(&config);

        let first = search.improve(&ctx, &requests);
        let second = search.improve(&ctx, &requests);
        assert_eq!(first.total_cost(&ctx), second.total_cost(&ctx));
        // Fewer than 30 requests: a single freezing round
        assert_eq!(first.iterations, Some(1));
    }

    #[test]
    fn test_continuous_reports_leftovers() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let search = RandomizedSearchAndFixContinuous::new(SequentialInsertion::default(), 3, 4);
        let schedule = search.improve(&ctx, &requests);
        let report = check_schedule(&ctx, &requests, &schedule);
        assert!(report.is_valid(), "{}", report);
        assert_eq!(schedule.num_shipments() + schedule.unplaced.len(), requests.len());
    }

    #[test]
    fn test_continuous_accepts_everything_when_cooling_is_infinite() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let mut search = RandomizedSearchAndFixContinuous::new(SequentialInsertion::default(), 10, 4);
        search.cooling = f64::INFINITY;
        let schedule = search.improve(&ctx, &requests);
        let single = SequentialInsertion::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let order = order_requests(&requests, single.policy.priority);
        let reference = single.construct(&ctx, &ConstructionJob::new(&order), rng.gen());

        assert_eq!(schedule.num_trucks(), reference.num_trucks());
        assert_eq!(schedule.unplaced.len(), reference.unplaced.len());
    }
}
