//! Improvement strategies built on repeated construction.
//!
//! Every strategy treats [`SequentialInsertion`] as a black box and improves on it by
//! re-running it with other seeds, other request orders or a reduced request pool:
//! - randomized multi-restart with a small fleet-size frontier
//! - swap hill-climbing over the insertion order

use super::construction::{order_requests, ConstructionHeuristic, ConstructionJob, SequentialInsertion};
use crate::config::SolverConfig;
use crate::instance::Context;
use crate::schedule::Schedule;
use crate::shipment::ShipmentRequest;
use indicatif::ProgressBar;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for schedule improvement methods
pub trait LocalSearch {
    fn improve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>]) -> Schedule;
    fn name(&self) -> &str;
}

/// Best schedule of a multi-restart run, plus the best ones using one and two more trucks.
#[derive(Debug, Clone)]
pub struct Frontier {
    pub best: Schedule,
    pub one_more_truck: Option<Schedule>,
    pub two_more_trucks: Option<Schedule>,
    /// Runs actually performed
    pub runs: usize,
}

impl Frontier {
    /// Reduce runs given in index order; ties keep the lowest index.
    fn from_runs(runs: Vec<(f64, Schedule)>) -> Option<Frontier> {
        let count = runs.len();
        let best_index = Self::cheapest(&runs, |_| true)?;
        let fleet = runs[best_index].1.num_trucks();
        let one_more = Self::cheapest(&runs, |s| s.num_trucks() == fleet + 1);
        let two_more = Self::cheapest(&runs, |s| s.num_trucks() == fleet + 2);

        let mut slots: Vec<Option<Schedule>> = runs.into_iter().map(|(_, s)| Some(s)).collect();
        let best = slots[best_index].take()?;
        Some(Frontier {
            best,
            one_more_truck: one_more.and_then(|i| slots[i].take()),
            two_more_trucks: two_more.and_then(|i| slots[i].take()),
            runs: count,
        })
    }

    fn cheapest(runs: &[(f64, Schedule)], keep: impl Fn(&Schedule) -> bool) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, (cost, schedule)) in runs.iter().enumerate() {
            if keep(schedule) && best.map_or(true, |(_, c)| *cost < c) {
                best = Some((i, *cost));
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Randomized multi-restart
///
/// Runs the construction `restarts + 1` times in parallel, each run with its own seed drawn
/// from `seed`, and keeps the cheapest schedule.
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    pub construction: SequentialInsertion,
    pub restarts: usize,
    pub seed: u64,
    /// Seconds after which no new run is started
    pub time_limit: Option<f64>,
}

impl RandomizedSearch {
    pub fn new(construction: SequentialInsertion, restarts: usize, seed: u64) -> Self {
        RandomizedSearch { construction, restarts, seed, time_limit: None }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        RandomizedSearch {
            construction: SequentialInsertion::from_config(config),
            restarts: config.search.restarts,
            seed: config.seed,
            time_limit: config.search.time_limit,
        }
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Run every restart and return the cost/fleet-size frontier.
    pub fn search(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>], progress: Option<&ProgressBar>) -> Frontier {
        let start = Instant::now();
        let deadline = self.time_limit.map(|s| start + Duration::from_secs_f64(s));
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..=self.restarts).map(|_| rng.gen()).collect();
        let order = order_requests(requests, self.construction.policy.priority);

        let runs: Vec<Option<(f64, Schedule)>> = seeds
            .par_iter()
            .enumerate()
            .map(|(i, &seed)| {
                if i > 0 && deadline.map_or(false, |d| Instant::now() >= d) {
                    return None;
                }
                let schedule = self.construction.construct(ctx, &ConstructionJob::new(&order), seed);
                if let Some(bar) = progress {
                    bar.inc(1);
                }
                Some((schedule.total_cost(ctx), schedule))
            })
            .collect();

        let performed: Vec<(f64, Schedule)> = runs.into_iter().flatten().collect();
        if performed.len() <= self.restarts {
            log::info!("Time limit reached after {} of {} runs", performed.len(), self.restarts + 1);
        }

        let mut frontier = match Frontier::from_runs(performed) {
            Some(frontier) => frontier,
            // Unreachable in practice: run 0 ignores the deadline
            None => Frontier { best: Schedule::new(self.name()), one_more_truck: None, two_more_trucks: None, runs: 0 },
        };
        let elapsed = start.elapsed().as_secs_f64();
        for schedule in std::iter::once(&mut frontier.best)
            .chain(frontier.one_more_truck.as_mut())
            .chain(frontier.two_more_trucks.as_mut())
        {
            schedule.algorithm = self.name().to_string();
            schedule.computation_time = elapsed;
            schedule.iterations = Some(frontier.runs);
        }

        log::info!(
            "{}: best {:.2} with {} trucks over {} runs",
            self.name(),
            frontier.best.total_cost(ctx),
            frontier.best.num_trucks(),
            frontier.runs
        );
        frontier
    }
}

impl LocalSearch for RandomizedSearch {
    fn improve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>]) -> Schedule {
        self.search(ctx, requests, None).best
    }

    fn name(&self) -> &str {
        "RandomizedSearch"
    }
}

/// Swap hill-climbing over the insertion order
///
/// Exchanges two random positions of the request order and reconstructs; the swap is kept if
/// the cost does not increase and undone otherwise.
#[derive(Debug, Clone)]
pub struct ListSearch {
    pub construction: SequentialInsertion,
    pub rounds: usize,
    pub swaps_per_round: usize,
    /// Rounds without strict improvement tolerated before stopping
    pub max_stale_rounds: usize,
    pub seed: u64,
}

impl ListSearch {
    pub fn new(construction: SequentialInsertion, rounds: usize, swaps_per_round: usize, seed: u64) -> Self {
        ListSearch { construction, rounds, swaps_per_round, max_stale_rounds: 100, seed }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        ListSearch {
            construction: SequentialInsertion::from_config(config),
            rounds: config.search.list_rounds,
            swaps_per_round: config.search.list_swaps_per_round,
            max_stale_rounds: config.search.list_max_stale_rounds,
            seed: config.seed,
        }
    }
}

impl LocalSearch for ListSearch {
    fn improve(&self, ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>]) -> Schedule {
        let start = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order = order_requests(requests, self.construction.policy.priority);

        let mut best = self.construction.construct(ctx, &ConstructionJob::new(&order), rng.gen());
        let mut best_cost = best.total_cost(ctx);
        let n = order.len();
        let mut iterations = 1;

        if n >= 2 {
            let mut stale = 0;
            for round in 0..self.rounds {
                let mut improved = false;
                for _ in 0..self.swaps_per_round {
                    let i = rng.gen_range(0..n);
                    let mut j = rng.gen_range(0..n - 1);
                    if j >= i {
                        j += 1;
                    }
                    order.swap(i, j);

                    let candidate = self.construction.construct(ctx, &ConstructionJob::new(&order), rng.gen());
                    let cost = candidate.total_cost(ctx);
                    iterations += 1;
                    if cost <= best_cost {
                        improved |= cost < best_cost;
                        best = candidate;
                        best_cost = cost;
                    } else {
                        order.swap(i, j);
                    }
                }

                log::debug!("{} round {}: best {:.2}", self.name(), round + 1, best_cost);
                if improved {
                    stale = 0;
                } else {
                    stale += 1;
                    if stale > self.max_stale_rounds {
                        break;
                    }
                }
            }
        }

        best.algorithm = self.name().to_string();
        best.computation_time = start.elapsed().as_secs_f64();
        best.iterations = Some(iterations);
        best
    }

    fn name(&self) -> &str {
        "ListSearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_schedule;
    use crate::config::ConstructionPolicy;
    use crate::instance::{Depot, DriveTimes, Location};

    fn create_test_instance() -> (DriveTimes, Vec<Depot>, Vec<Arc<ShipmentRequest>>) {
        let times = DriveTimes::uniform(&["D1", "D2", "X", "Y", "Z"], 0.5);
        let depots = vec![
            Depot { location: Location(0), capacity: 4 },
            Depot { location: Location(1), capacity: 4 },
        ];
        let places = [Location(2), Location(3), Location(4)];
        let requests = (0..15)
            .map(|i| {
                let es = 3.0 + (i * 7 % 15) as f64 * 0.8;
                let from = places[i % 3];
                let to = places[(i + 1) % 3];
                let tag = if i % 2 == 0 { "IB" } else { "OB" };
                Arc::new(ShipmentRequest::new(format!("S{}", i), es, es + 1.5, es + 2.0, from, to, tag).unwrap())
            })
            .collect();
        (times, depots, requests)
    }

    #[test]
    fn test_randomized_search_keeps_cheapest_run() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let search = RandomizedSearch::new(SequentialInsertion::default(), 9, 11);

        let frontier = search.search(&ctx, &requests, None);
        assert_eq!(frontier.runs, 10);
        let best_cost = frontier.best.total_cost(&ctx);

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let order = order_requests(&requests, search.construction.policy.priority);
        for _ in 0..10 {
            let seed: u64 = rng.gen();
            let run = search.construction.construct(&ctx, &ConstructionJob::new(&order), seed);
            assert!(best_cost <= run.total_cost(&ctx) + 1e-6);
        }

        let fleet = frontier.best.num_trucks();
        if let Some(one_more) = &frontier.one_more_truck {
            assert_eq!(one_more.num_trucks(), fleet + 1);
        }
        if let Some(two_more) = &frontier.two_more_trucks {
            assert_eq!(two_more.num_trucks(), fleet + 2);
        }
        assert!(check_schedule(&ctx, &requests, &frontier.best).is_valid());
    }

    #[test]
    fn test_randomized_search_is_reproducible() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let search = RandomizedSearch::new(SequentialInsertion::default(), 7, 3);

        let first = search.improve(&ctx, &requests);
        let second = search.improve(&ctx, &requests);
        assert_eq!(first.total_cost(&ctx), second.total_cost(&ctx));
        assert_eq!(first.num_trucks(), second.num_trucks());
        assert_eq!(first.algorithm, "RandomizedSearch");
    }

    #[test]
    fn test_time_limit_still_runs_once() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let search = RandomizedSearch::new(SequentialInsertion::default(), 50, 3).with_time_limit(1e-9);

        let frontier = search.search(&ctx, &requests, None);
        assert!(frontier.runs >= 1);
        assert!(frontier.best.num_shipments() + frontier.best.unplaced.len() == requests.len());
    }

    #[test]
    fn test_list_search_never_worse_than_start() {
        let (times, depots, requests) = create_test_instance();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let search = ListSearch::new(SequentialInsertion::default(), 2, 20, 5);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let order = order_requests(&requests, search.construction.policy.priority);
        let initial = search.construction.construct(&ctx, &ConstructionJob::new(&order), rng.gen());

        let improved = search.improve(&ctx, &requests);
        assert!(improved.total_cost(&ctx) <= initial.total_cost(&ctx));
        assert_eq!(improved.iterations, Some(41));
        assert!(check_schedule(&ctx, &requests, &improved).is_valid());
    }

    #[test]
    fn test_list_search_single_request() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let depots = vec![Depot { location: Location(0), capacity: 1 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let requests = vec![Arc::new(
            ShipmentRequest::new("A", 8.0, 9.0, 10.0, Location(1), Location(1), "IB").unwrap(),
        )];

        let search = ListSearch::new(SequentialInsertion::new(ConstructionPolicy::deterministic()), 3, 10, 1);
        let schedule = search.improve(&ctx, &requests);
        assert_eq!(schedule.num_trucks(), 1);
        assert_eq!(schedule.iterations, Some(1));
    }
}
