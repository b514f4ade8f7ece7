use crate::config::{ConstructionPolicy, DurationCap, InactivePricing, InsertionSide, PriorityKey, SolverConfig, TieBreak};
use crate::instance::{Context, Location};
use crate::schedule::Schedule;
use crate::shipment::{Shipment, ShipmentRequest, TIME_EPS};
use crate::truck::Truck;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Costs closer than this are considered equal when breaking ties.
const COST_TIE_EPS: f64 = 1e-9;

pub trait ConstructionHeuristic: Send + Sync {
    fn construct(&self, ctx: &Context<'_>, job: &ConstructionJob<'_>, seed: u64) -> Schedule;
    fn name(&self) -> &str;
}

/// What a construction run works on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructionJob<'a> {
    /// Requests in insertion order
    pub order: &'a [Arc<ShipmentRequest>],
    /// Partial trucks that stay open for insertion and come back in the result
    pub seeded: &'a [Truck],
    /// Trucks kept elsewhere; they only use up depot capacity
    pub frozen: &'a [Truck],
}

impl<'a> ConstructionJob<'a> {
    pub fn new(order: &'a [Arc<ShipmentRequest>]) -> Self {
        ConstructionJob { order, seeded: &[], frozen: &[] }
    }

    pub fn with_seeded(mut self, seeded: &'a [Truck]) -> Self {
        self.seeded = seeded;
        self
    }

    pub fn with_frozen(mut self, frozen: &'a [Truck]) -> Self {
        self.frozen = frozen;
        self
    }
}

/// Sort requests into insertion priority. The sort is stable, so equal keys keep input order.
pub fn order_requests(requests: &[Arc<ShipmentRequest>], key: PriorityKey) -> Vec<Arc<ShipmentRequest>> {
    let mut ordered = requests.to_vec();
    match key {
        PriorityKey::LatestStartThenWidth => {
            ordered.sort_by_key(|r| (OrderedFloat(r.latest_start_time), OrderedFloat(r.window_width())))
        }
        PriorityKey::LatestStart => ordered.sort_by_key(|r| OrderedFloat(r.latest_start_time)),
        PriorityKey::EarliestStart => ordered.sort_by_key(|r| OrderedFloat(r.earliest_start_time)),
    }
    ordered
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    After,
    Before,
}

/// A candidate position for the request currently being inserted.
#[derive(Debug, Clone, Copy)]
struct Placement {
    truck: usize,
    start: f64,
    cost: f64,
}

/// Sequential cheapest insertion over a fixed fleet.
///
/// Requests are taken one by one in the given order. Each goes to the active truck where it
/// is cheapest to append (or, depending on the policy, prepend), otherwise it opens the cheapest
/// idle truck, otherwise it is reported unplaced. The policy selects the insertion sides, the
/// duration cap, the tie-breaking and the pricing of idle trucks.
#[derive(Debug, Clone)]
pub struct SequentialInsertion {
    pub policy: ConstructionPolicy,
}

impl SequentialInsertion {
    pub fn new(policy: ConstructionPolicy) -> Self {
        SequentialInsertion { policy }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.construction.clone())
    }

    pub fn deterministic() -> Self {
        Self::new(ConstructionPolicy::deterministic())
    }

    /// Start time at which `request` can follow the truck's last shipment, if any.
    fn fits_after(&self, ctx: &Context<'_>, truck: &Truck, request: &ShipmentRequest) -> Option<f64> {
        let last = truck.last()?;
        let arrival = last.end_time() + ctx.drive(last.end_location, request.start_location);
        let reachable = request.earliest_start_time - self.policy.max_waiting_time - TIME_EPS <= arrival
            && arrival <= request.latest_start_time + TIME_EPS;
        reachable.then(|| arrival.max(request.earliest_start_time))
    }

    /// Start time at which `request` can precede the truck's first shipment, if any.
    fn fits_before(&self, ctx: &Context<'_>, truck: &Truck, request: &ShipmentRequest) -> Option<f64> {
        if self.policy.insertion != InsertionSide::BeforeAndAfter {
            return None;
        }
        let first = truck.first()?;
        let drive = ctx.drive(request.end_location, first.start_location);
        let reachable = request.earliest_end_time + drive <= first.start_time() + TIME_EPS
            && first.start_time() <= request.latest_end_time + drive + self.policy.max_waiting_time + TIME_EPS;
        reachable.then(|| (first.start_time() - drive - request.length()).min(request.latest_start_time))
    }

    fn realization(&self, ctx: &Context<'_>, truck: &Truck, request: &ShipmentRequest) -> Option<(Side, f64)> {
        self.fits_after(ctx, truck, request)
            .map(|start| (Side::After, start))
            .or_else(|| self.fits_before(ctx, truck, request).map(|start| (Side::Before, start)))
    }

    pub fn is_compatible(&self, ctx: &Context<'_>, truck: &Truck, request: &ShipmentRequest) -> bool {
        self.realization(ctx, truck, request).is_some()
    }

    /// The realization of `request` on an active `truck`: appended as early as possible, or
    /// else prepended as late as possible.
    ///
    /// # Panics
    ///
    /// Panics when the request fits on neither side of the truck.
    pub fn cheapest_realization(&self, ctx: &Context<'_>, truck: &Truck, request: &Arc<ShipmentRequest>) -> Shipment {
        match self.realization(ctx, truck, request) {
            Some((_, start)) => Shipment::from_request(request, start),
            None => panic!("shipment {} is not compatible with truck {}", request.id, truck.id),
        }
    }

    fn duration_cap(&self, ctx: &Context<'_>, truck: &Truck) -> f64 {
        match self.policy.duration_cap {
            DurationCap::StartDependent => truck.max_duration(ctx),
            DurationCap::Fixed => ctx.config.duration.fixed_max_duration,
            DurationCap::Unbounded => f64::INFINITY,
        }
    }

    /// Marginal cost of adding `shipment` on `side` of an active truck.
    fn insertion_cost(&self, ctx: &Context<'_>, truck: &Truck, shipment: &Shipment, side: Side, duration_with: f64) -> f64 {
        let weights = &ctx.config.cost;
        let rules = &ctx.config.surcharges;
        let start = shipment.start_time();

        match (side, truck.first(), truck.last()) {
            (Side::After, _, Some(last)) => {
                let drive = ctx.drive(last.end_location, shipment.start_location);
                let gap = start - last.end_time() - drive;
                let mut cost = weights.waiting * gap + weights.empty_driving * drive;
                if start > rules.late_shipment_start || (duration_with > rules.long_day && start > rules.midday) {
                    cost += weights.empty_driving * ctx.drive(shipment.end_location, truck.home_depot);
                }
                cost
            }
            (Side::Before, Some(first), _) => {
                let drive = ctx.drive(shipment.end_location, first.start_location);
                let gap = first.start_time() - shipment.end_time() - drive;
                if start < rules.early_shipment_start || (duration_with > rules.long_day && start < rules.midday) {
                    weights.waiting * gap
                        + weights.empty_driving * drive
                        + weights.empty_driving * ctx.drive(truck.home_depot, shipment.start_location)
                } else {
                    f64::INFINITY
                }
            }
            _ => f64::INFINITY,
        }
    }

    fn active_candidates(&self, ctx: &Context<'_>, trucks: &[Truck], request: &Arc<ShipmentRequest>) -> Vec<Placement> {
        let mut candidates = Vec::new();
        for (i, truck) in trucks.iter().enumerate().filter(|(_, t)| t.is_active()) {
            let (side, start) = match self.realization(ctx, truck, request) {
                Some(found) => found,
                None => continue,
            };
            let shipment = Shipment::from_request(request, start);
            let duration_with = truck.duration_with(ctx, &shipment);
            if duration_with >= self.duration_cap(ctx, truck) {
                continue;
            }
            let cost = self.insertion_cost(ctx, truck, &shipment, side, duration_with);
            candidates.push(Placement { truck: i, start, cost });
        }
        candidates
    }

    fn break_tie(
        &self,
        ctx: &Context<'_>,
        trucks: &[Truck],
        request: &ShipmentRequest,
        candidates: Vec<Placement>,
        rng: &mut ChaCha8Rng,
    ) -> Option<Placement> {
        let min_cost = candidates.iter().map(|p| OrderedFloat(p.cost)).min()?.0;
        let ties: Vec<Placement> = candidates
            .into_iter()
            .filter(|p| p.cost == min_cost || (p.cost - min_cost).abs() <= COST_TIE_EPS)
            .collect();

        match self.policy.tie_break {
            TieBreak::Deterministic => ties.first().copied(),
            TieBreak::RandomCost => ties.choose(rng).copied(),
            TieBreak::RandomCostAndDistance => {
                let distance = |p: &Placement| ctx.drive(trucks[p.truck].home_depot, request.end_location);
                let nearest = ties.iter().map(|p| OrderedFloat(distance(p))).min()?.0;
                let closest: Vec<Placement> =
                    ties.iter().copied().filter(|p| distance(p) - nearest <= COST_TIE_EPS).collect();
                closest.choose(rng).copied()
            }
        }
    }

    /// Cheapest idle truck for `request`, realized at its earliest start.
    fn inactive_placement(&self, ctx: &Context<'_>, trucks: &[Truck], request: &ShipmentRequest) -> Option<Placement> {
        let start = request.earliest_start_time;
        let end = start + request.length();
        let mut scored: Vec<Location> = Vec::new();
        let mut best: Option<Placement> = None;

        for (i, truck) in trucks.iter().enumerate().filter(|(_, t)| !t.is_active()) {
            let depot = truck.home_depot;
            if scored.contains(&depot) {
                continue;
            }
            scored.push(depot);

            let pull = match self.policy.inactive_pricing {
                InactivePricing::PullOut => ctx.drive(depot, request.start_location),
                InactivePricing::CutoffDependent => {
                    if end < ctx.config.surcharges.inactive_end_cutoff {
                        ctx.drive(depot, request.start_location)
                    } else {
                        ctx.drive(request.end_location, depot)
                    }
                }
            };
            let cost = ctx.config.cost.fixed_truck + ctx.config.cost.empty_driving * pull;
            if best.map_or(true, |b| cost < b.cost) {
                best = Some(Placement { truck: i, start, cost });
            }
        }
        best
    }

    fn place(
        &self,
        ctx: &Context<'_>,
        trucks: &[Truck],
        request: &Arc<ShipmentRequest>,
        rng: &mut ChaCha8Rng,
    ) -> Option<Placement> {
        let candidates = self.active_candidates(ctx, trucks, request);
        if !candidates.is_empty() {
            return self.break_tie(ctx, trucks, request, candidates, rng);
        }
        self.inactive_placement(ctx, trucks, request)
    }

    /// Seeded trucks first, then one idle truck per remaining unit of depot capacity.
    fn open_fleet(&self, ctx: &Context<'_>, job: &ConstructionJob<'_>) -> Vec<Truck> {
        let mut trucks: Vec<Truck> = job.seeded.to_vec();
        let mut next_id = job.seeded.len() + job.frozen.len() + 1;
        for depot in ctx.depots {
            let used = job
                .seeded
                .iter()
                .chain(job.frozen.iter())
                .filter(|t| t.home_depot == depot.location)
                .count();
            for _ in used..depot.capacity {
                trucks.push(Truck::new(next_id, depot.location));
                next_id += 1;
            }
        }
        trucks
    }
}

impl Default for SequentialInsertion {
    fn default() -> Self {
        Self::new(ConstructionPolicy::default())
    }
}

impl ConstructionHeuristic for SequentialInsertion {
    fn construct(&self, ctx: &Context<'_>, job: &ConstructionJob<'_>, seed: u64) -> Schedule {
        let start = std::time::Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut trucks = self.open_fleet(ctx, job);
        let mut unplaced = Vec::new();

        for request in job.order {
            match self.place(ctx, &trucks, request, &mut rng) {
                Some(placement) => {
                    let shipment = Shipment::from_request(request, placement.start);
                    trucks[placement.truck].add_shipment(shipment);
                }
                None => {
                    log::debug!("No truck can take shipment {}", request.id);
                    unplaced.push(Arc::clone(request));
                }
            }
        }

        let mut schedule = Schedule::from_trucks(trucks, unplaced, self.name());
        if self.policy.post_process {
            schedule.shift_trucks(ctx);
            schedule.post_improve_depots(ctx);
        }
        schedule.computation_time = start.elapsed().as_secs_f64();
        schedule
    }

    fn name(&self) -> &str {
        "SequentialInsertion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_schedule;
    use crate::instance::{Depot, DriveTimes};

    /// D is the depot; V exists so that C starts somewhere A's end cannot reach in time.
    fn create_scenario() -> (DriveTimes, Vec<Depot>, Vec<Arc<ShipmentRequest>>) {
        let mut times = DriveTimes::uniform(&["D", "X", "Y", "Z", "W", "V"], 0.5);
        let d = Location(0);
        for other in times.locations().collect::<Vec<_>>() {
            if other != d {
                times.set(d, other, 0.2);
                times.set(other, d, 0.2);
            }
        }
        let loc = |name: &str| times.location(name).unwrap();
        let requests = vec![
            Arc::new(ShipmentRequest::new("A", 8.0, 8.5, 9.0, loc("X"), loc("Y"), "IB").unwrap()),
            Arc::new(ShipmentRequest::new("B", 10.0, 10.5, 11.0, loc("Y"), loc("Z"), "OB").unwrap()),
            Arc::new(ShipmentRequest::new("C", 9.0, 9.2, 10.0, loc("V"), loc("W"), "OB").unwrap()),
        ];
        let depots = vec![Depot { location: d, capacity: 1 }];
        (times, depots, requests)
    }

    fn create_day(times: &DriveTimes) -> Vec<Arc<ShipmentRequest>> {
        let x = times.location("X").unwrap();
        let y = times.location("Y").unwrap();
        (0..12)
            .map(|i| {
                let es = 4.0 + i as f64 * 0.75;
                let (from, to) = if i % 2 == 0 { (x, y) } else { (y, x) };
                let tag = if i % 3 == 0 { "IB" } else { "OB" };
                Arc::new(ShipmentRequest::new(format!("R{}", i), es, es + 1.0, es + 1.5, from, to, tag).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_scenario_unreachable_request_is_unplaced() {
        let (times, depots, requests) = create_scenario();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        for heuristic in [SequentialInsertion::deterministic(), SequentialInsertion::default()] {
            let order = order_requests(&requests, heuristic.policy.priority);
            let schedule = heuristic.construct(&ctx, &ConstructionJob::new(&order), 42);

            assert_eq!(schedule.num_trucks(), 1);
            let ids: Vec<&str> = schedule.trucks[0].shipments().iter().map(|s| s.request_id()).collect();
            assert_eq!(ids, vec!["A", "B"]);
            assert_eq!(schedule.unplaced.len(), 1);
            assert_eq!(schedule.unplaced[0].id, "C");
        }
    }

    #[test]
    fn test_priority_order() {
        let (_, _, requests) = create_scenario();
        let ids = |v: Vec<Arc<ShipmentRequest>>| v.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(order_requests(&requests, PriorityKey::LatestStartThenWidth)), vec!["A", "C", "B"]);
        assert_eq!(ids(order_requests(&requests, PriorityKey::EarliestStart)), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let times = DriveTimes::uniform(&["D1", "D2", "X", "Y"], 0.5);
        let depots = vec![
            Depot { location: Location(0), capacity: 3 },
            Depot { location: Location(1), capacity: 3 },
        ];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let order = order_requests(&create_day(&times), PriorityKey::LatestStartThenWidth);
        let heuristic = SequentialInsertion::default();

        let first = heuristic.construct(&ctx, &ConstructionJob::new(&order), 7);
        let second = heuristic.construct(&ctx, &ConstructionJob::new(&order), 7);
        assert_eq!(first.num_trucks(), second.num_trucks());
        for (a, b) in first.trucks.iter().zip(second.trucks.iter()) {
            assert_eq!(a.home_depot, b.home_depot);
            let sa: Vec<(String, f64)> = a.shipments().iter().map(|s| (s.id.clone(), s.start_time())).collect();
            let sb: Vec<(String, f64)> = b.shipments().iter().map(|s| (s.id.clone(), s.start_time())).collect();
            assert_eq!(sa, sb);
        }
        assert_eq!(first.total_cost(&ctx), second.total_cost(&ctx));
    }

    #[test]
    fn test_every_request_once_and_in_window() {
        let times = DriveTimes::uniform(&["D1", "D2", "X", "Y"], 0.5);
        let depots = vec![
            Depot { location: Location(0), capacity: 2 },
            Depot { location: Location(1), capacity: 1 },
        ];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let requests = create_day(&times);
        let order = order_requests(&requests, PriorityKey::LatestStartThenWidth);

        for seed in 0..5 {
            let schedule = SequentialInsertion::default().construct(&ctx, &ConstructionJob::new(&order), seed);
            let report = check_schedule(&ctx, &requests, &schedule);
            assert!(report.is_valid(), "{}", report);
            assert!(schedule.num_trucks() <= 3);
            assert!(schedule.total_cost(&ctx).is_finite());
        }
    }

    #[test]
    fn test_long_gap_stays_on_one_truck() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let x = Location(1);
        let depots = vec![Depot { location: Location(0), capacity: 2 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let requests = vec![
            Arc::new(ShipmentRequest::fixed("A", 6.0, 10.0, x, x, "IB").unwrap()),
            Arc::new(ShipmentRequest::fixed("B", 12.0, 16.0, x, x, "OB").unwrap()),
        ];
        let order = order_requests(&requests, PriorityKey::LatestStartThenWidth);

        // two idle hours cost 120, far less than a second truck
        let schedule = SequentialInsertion::default().construct(&ctx, &ConstructionJob::new(&order), 3);
        assert_eq!(schedule.num_trucks(), 1);
        assert!(schedule.unplaced.is_empty());
        assert!(schedule.is_feasible(&ctx));
        assert!((schedule.total_cost(&ctx) - 100_180.0).abs() < 1e-6);

        let strict = SequentialInsertion::deterministic();
        assert_eq!(strict.policy.max_waiting_time, 1.5);
        let split = strict.construct(&ctx, &ConstructionJob::new(&order), 3);
        assert_eq!(split.num_trucks(), 2);
        assert!(split.unplaced.is_empty());
    }

    #[test]
    fn test_frozen_trucks_use_capacity() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let x = Location(1);
        let depots = vec![Depot { location: Location(0), capacity: 2 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let requests = vec![
            Arc::new(ShipmentRequest::new("P", 8.0, 8.0, 12.0, x, x, "IB").unwrap()),
            Arc::new(ShipmentRequest::new("Q", 9.0, 9.0, 13.0, x, x, "OB").unwrap()),
        ];
        let frozen = vec![Truck::new(1, Location(0))];
        let heuristic = SequentialInsertion::deterministic();

        let free = heuristic.construct(&ctx, &ConstructionJob::new(&requests), 1);
        assert_eq!(free.num_trucks(), 2);
        assert!(free.unplaced.is_empty());

        let reserved = heuristic.construct(&ctx, &ConstructionJob::new(&requests).with_frozen(&frozen), 1);
        assert_eq!(reserved.num_trucks(), 1);
        assert_eq!(reserved.unplaced.len(), 1);
        assert_eq!(reserved.unplaced[0].id, "Q");
    }

    #[test]
    fn test_insertion_before_first_shipment() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let x = Location(1);
        let depots = vec![Depot { location: Location(0), capacity: 1 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let fixed = Arc::new(ShipmentRequest::fixed("S", 8.0, 12.0, x, x, "OB").unwrap());
        let seeded = vec![Truck::with_shipments(1, Location(0), vec![Shipment::from_request(&fixed, 8.0)])];
        let early = vec![Arc::new(ShipmentRequest::new("R", 5.0, 6.0, 6.5, x, x, "IB").unwrap())];

        let both_sides = SequentialInsertion::new(ConstructionPolicy {
            tie_break: TieBreak::Deterministic,
            ..ConstructionPolicy::default()
        });
        let schedule = both_sides.construct(&ctx, &ConstructionJob::new(&early).with_seeded(&seeded), 3);
        assert!(schedule.unplaced.is_empty());
        let ids: Vec<&str> = schedule.trucks[0].shipments().iter().map(|s| s.request_id()).collect();
        assert_eq!(ids, vec!["R", "S"]);
        assert!((schedule.trucks[0].shipments()[0].start_time() - 6.0).abs() < 1e-9);

        let after_only = SequentialInsertion::deterministic();
        let schedule = after_only.construct(&ctx, &ConstructionJob::new(&early).with_seeded(&seeded), 3);
        assert_eq!(schedule.unplaced.len(), 1);
        assert_eq!(schedule.trucks[0].len(), 1);
    }

    #[test]
    fn test_duration_cap_blocks_insertion() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let x = Location(1);
        let depots = vec![Depot { location: Location(0), capacity: 2 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);

        let requests = vec![
            Arc::new(ShipmentRequest::new("L1", 5.0, 5.0, 12.0, x, x, "IB").unwrap()),
            Arc::new(ShipmentRequest::new("L2", 12.0, 12.0, 19.0, x, x, "OB").unwrap()),
        ];
        let capped = SequentialInsertion::deterministic().construct(&ctx, &ConstructionJob::new(&requests), 0);
        assert_eq!(capped.num_trucks(), 2);

        let unbounded = SequentialInsertion::new(ConstructionPolicy {
            duration_cap: DurationCap::Unbounded,
            ..ConstructionPolicy::deterministic()
        });
        let long = unbounded.construct(&ctx, &ConstructionJob::new(&requests), 0);
        assert_eq!(long.num_trucks(), 1);
        assert!(long.trucks[0].is_too_long(&ctx));
    }

    #[test]
    fn test_compatibility_check() {
        let (times, depots, requests) = create_scenario();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let heuristic = SequentialInsertion::deterministic();
        let truck = Truck::with_shipments(1, Location(0), vec![Shipment::from_request(&requests[0], 8.0)]);

        assert!(heuristic.is_compatible(&ctx, &truck, &requests[1]));
        assert!(!heuristic.is_compatible(&ctx, &truck, &requests[2]));
        let realized = heuristic.cheapest_realization(&ctx, &truck, &requests[1]);
        assert!((realized.start_time() - 10.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "not compatible")]
    fn test_incompatible_realization_panics() {
        let (times, depots, requests) = create_scenario();
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let truck = Truck::with_shipments(1, Location(0), vec![Shipment::from_request(&requests[0], 8.0)]);
        SequentialInsertion::deterministic().cheapest_realization(&ctx, &truck, &requests[2]);
    }
}
