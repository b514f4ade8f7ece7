//! A single vehicle-day: a home depot and a time-ordered sequence of shipments.
//!
//! Every derived quantity (start, end, duration, waiting, costs, legality) is computed on demand
//! from the shipment sequence and the drive-time oracle; nothing is cached. Queries on an
//! inactive (empty) truck return zero, `false` or an empty set.

use crate::instance::{Context, Location};
use crate::shipment::{Shipment, TIME_EPS};

#[derive(Debug, Clone)]
pub struct Truck {
    pub id: usize,
    pub home_depot: Location,
    /// Sorted ascending by start time
    shipments: Vec<Shipment>,
}

impl Truck {
    pub fn new(id: usize, home_depot: Location) -> Self {
        Truck { id, home_depot, shipments: Vec::new() }
    }

    /// Build a truck from shipments in any order.
    pub fn with_shipments(id: usize, home_depot: Location, shipments: Vec<Shipment>) -> Self {
        let mut truck = Truck::new(id, home_depot);
        for shipment in shipments {
            truck.add_shipment(shipment);
        }
        truck
    }

    pub fn shipments(&self) -> &[Shipment] {
        &self.shipments
    }

    pub fn first(&self) -> Option<&Shipment> {
        self.shipments.first()
    }

    pub fn last(&self) -> Option<&Shipment> {
        self.shipments.last()
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        !self.shipments.is_empty()
    }

    /// Insert keeping the sequence sorted; equal start times keep insertion order.
    pub fn add_shipment(&mut self, shipment: Shipment) {
        let position = self.shipments.partition_point(|s| s.start_time() <= shipment.start_time());
        self.shipments.insert(position, shipment);
    }

    pub fn remove_ith_shipment(&mut self, i: usize) -> Shipment {
        self.shipments.remove(i)
    }

    /// Remove the shipment realizing `request_id`, if present.
    pub fn remove_shipment(&mut self, request_id: &str) -> Option<Shipment> {
        let position = self.shipments.iter().position(|s| s.request_id() == request_id)?;
        Some(self.shipments.remove(position))
    }

    pub fn into_shipments(self) -> Vec<Shipment> {
        self.shipments
    }

    /// Returns `false` when `depot` already is the home depot.
    pub fn change_depot(&mut self, depot: Location) -> bool {
        if depot == self.home_depot {
            log::debug!("Truck {} is already based at depot #{}", self.id, depot.0);
            return false;
        }
        self.home_depot = depot;
        true
    }

    /// Pull-out start: first shipment start minus the drive from the depot.
    pub fn start_time(&self, ctx: &Context<'_>) -> f64 {
        match self.shipments.first() {
            Some(first) => first.start_time() - ctx.drive(self.home_depot, first.start_location),
            None => 0.0,
        }
    }

    /// Pull-in end: last shipment end plus the drive back to the depot.
    pub fn end_time(&self, ctx: &Context<'_>) -> f64 {
        match self.shipments.last() {
            Some(last) => last.end_time() + ctx.drive(last.end_location, self.home_depot),
            None => 0.0,
        }
    }

    pub fn duration(&self, ctx: &Context<'_>) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        self.end_time(ctx) - self.start_time(ctx)
    }

    /// Duration the truck would have with `shipment` added.
    pub fn duration_with(&self, ctx: &Context<'_>, shipment: &Shipment) -> f64 {
        let (first, last) = match (self.shipments.first(), self.shipments.last()) {
            (Some(first), Some(last)) => {
                let first = if shipment.start_time() < first.start_time() { shipment } else { first };
                let last = if shipment.start_time() >= last.start_time() { shipment } else { last };
                (first, last)
            }
            _ => (shipment, shipment),
        };
        ctx.drive(self.home_depot, first.start_location)
            + (last.end_time() - first.start_time())
            + ctx.drive(last.end_location, self.home_depot)
    }

    /// Pull-out, repositioning drives and pull-in.
    pub fn empty_driving_time(&self, ctx: &Context<'_>) -> f64 {
        let (first, last) = match (self.shipments.first(), self.shipments.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };
        let between: f64 = self
            .shipments
            .windows(2)
            .map(|pair| ctx.drive(pair[0].end_location, pair[1].start_location))
            .sum();
        ctx.drive(self.home_depot, first.start_location) + between + ctx.drive(last.end_location, self.home_depot)
    }

    /// Idle time between consecutive shipments, without the short-day padding.
    pub fn gap_waiting_time(&self, ctx: &Context<'_>) -> f64 {
        self.shipments
            .windows(2)
            .map(|pair| pair[1].start_time() - pair[0].end_time() - ctx.drive(pair[0].end_location, pair[1].start_location))
            .sum()
    }

    /// Idle time between shipments; a day shorter than the minimum split duration counts the
    /// missing hours as waiting too.
    pub fn waiting_time(&self, ctx: &Context<'_>) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        let min_duration = ctx.config.duration.min_duration_split;
        let duration = self.duration(ctx);
        let mut waiting = self.gap_waiting_time(ctx);
        if duration < min_duration {
            waiting += min_duration - duration;
        }
        waiting
    }

    pub fn waiting_cost(&self, ctx: &Context<'_>) -> f64 {
        let waiting = self.waiting_time(ctx);
        ctx.config.cost.waiting * waiting * waiting
    }

    pub fn empty_driving_cost(&self, ctx: &Context<'_>) -> f64 {
        ctx.config.cost.empty_driving * self.empty_driving_time(ctx)
    }

    pub fn total_cost(&self, ctx: &Context<'_>) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        ctx.config.cost.fixed_truck + self.empty_driving_cost(ctx) + self.waiting_cost(ctx)
    }

    /// Legal day length: early starters get a shorter day, and some waiting buys a little extra.
    pub fn max_duration(&self, ctx: &Context<'_>) -> f64 {
        let rules = &ctx.config.duration;
        if !self.is_active() {
            return rules.max_duration;
        }
        let relaxed = self.waiting_time(ctx) >= rules.waiting_allowance;
        if self.start_time(ctx) < rules.early_start_cutoff {
            if relaxed {
                rules.early_max_duration_with_waiting
            } else {
                rules.early_max_duration
            }
        } else if relaxed {
            rules.max_duration_with_waiting
        } else {
            rules.max_duration
        }
    }

    pub fn is_too_long(&self, ctx: &Context<'_>) -> bool {
        self.is_active() && self.duration(ctx) > self.max_duration(ctx)
    }

    pub fn is_too_short(&self, ctx: &Context<'_>) -> bool {
        self.is_active() && self.duration(ctx) < ctx.config.duration.min_duration_split
    }

    /// Every consecutive pair leaves enough time to drive between them.
    pub fn is_feasible(&self, ctx: &Context<'_>) -> bool {
        self.shipments.windows(2).all(|pair| {
            pair[0].end_time() + ctx.drive(pair[0].end_location, pair[1].start_location) <= pair[1].start_time() + TIME_EPS
        })
    }

    /// Times at which the truck is at its home depot between shipments.
    pub fn relief_points(&self) -> Vec<f64> {
        let mut points = Vec::new();
        for shipment in &self.shipments {
            if shipment.start_location == self.home_depot {
                points.push(shipment.start_time());
            }
            if shipment.end_location == self.home_depot {
                points.push(shipment.end_time());
            }
        }
        points
    }

    /// Relief points leaving a legal driver shift on both sides.
    pub fn split_relief_points(&self, ctx: &Context<'_>) -> Vec<f64> {
        if !self.is_active() {
            return Vec::new();
        }
        let min_duration = ctx.config.duration.min_duration_split;
        let start = self.start_time(ctx);
        let end = self.end_time(ctx);
        self.relief_points()
            .into_iter()
            .filter(|&p| p - start > min_duration && end - p > min_duration)
            .collect()
    }

    pub fn is_splittable(&self, ctx: &Context<'_>) -> bool {
        !self.split_relief_points(ctx).is_empty()
    }

    /// Little empty driving, little waiting and a long but legal day.
    pub fn is_efficient(&self, ctx: &Context<'_>) -> bool {
        if !self.is_active() {
            return false;
        }
        let rules = &ctx.config.efficiency;
        let duration = self.duration(ctx);
        self.empty_driving_time(ctx) < rules.max_empty_driving
            && self.waiting_time(ctx) < rules.max_waiting
            && rules.min_duration < duration
            && duration < self.max_duration(ctx)
    }

    /// Hours behind the wheel: all driving, shipment time minus loading.
    pub fn driving_time(&self, ctx: &Context<'_>) -> f64 {
        let shipment_hours: f64 = self.shipments.iter().map(|s| s.length()).sum();
        let loading = self.shipments.len() as f64 * ctx.config.duration.loading_time;
        self.empty_driving_time(ctx) + shipment_hours - loading
    }

    /// Depot, shipment ids, depot.
    pub fn trip(&self, ctx: &Context<'_>) -> Vec<String> {
        let depot = ctx.name(self.home_depot).to_string();
        let mut trip = Vec::with_capacity(self.shipments.len() + 2);
        trip.push(depot.clone());
        trip.extend(self.shipments.iter().map(|s| s.id.clone()));
        trip.push(depot);
        trip
    }

    /// Cut the day at `point`: shipments starting before it go to the first truck.
    /// Returns `None` when either side would be empty.
    pub fn split_at(&self, point: f64, ids: (usize, usize)) -> Option<(Truck, Truck)> {
        let cut = self.shipments.partition_point(|s| s.start_time() < point - TIME_EPS);
        if cut == 0 || cut == self.shipments.len() {
            return None;
        }
        let left = Truck { id: ids.0, home_depot: self.home_depot, shipments: self.shipments[..cut].to_vec() };
        let right = Truck { id: ids.1, home_depot: self.home_depot, shipments: self.shipments[cut..].to_vec() };
        Some((left, right))
    }

    /// Walk backwards and push each shipment as late as its successor and its own window allow.
    pub fn shift_forward(&mut self, ctx: &Context<'_>) {
        if self.shipments.len() < 2 {
            return;
        }
        for i in (0..self.shipments.len() - 1).rev() {
            let right_start = self.shipments[i + 1].start_time();
            let right_location = self.shipments[i + 1].start_location;
            let left = &mut self.shipments[i];
            let drive = ctx.drive(left.end_location, right_location);
            if right_start - (left.end_time() + drive) <= TIME_EPS {
                continue;
            }
            let window = left.request().map(|r| (r.latest_end_time, r.length()));
            if let Some((latest_end, length)) = window {
                let new_start = (right_start - drive).min(latest_end) - length;
                if new_start > left.start_time() {
                    left.set_start_time(new_start);
                }
            }
        }
    }

    /// Walk forwards and pull each shipment as early as its predecessor and its own window allow.
    pub fn shift_backward(&mut self, ctx: &Context<'_>) {
        for i in 1..self.shipments.len() {
            let left_end = self.shipments[i - 1].end_time();
            let left_location = self.shipments[i - 1].end_location;
            let right = &mut self.shipments[i];
            let reachable = left_end + ctx.drive(left_location, right.start_location);
            if right.start_time() - reachable <= TIME_EPS {
                continue;
            }
            if let Some(earliest) = right.request().map(|r| r.earliest_start_time) {
                let new_start = reachable.max(earliest);
                if new_start < right.start_time() {
                    right.set_start_time(new_start);
                }
            }
        }
    }

    /// One-line summary with location names.
    pub fn describe(&self, ctx: &Context<'_>) -> String {
        let ids: Vec<&str> = self.shipments.iter().map(|s| s.id.as_str()).collect();
        let mut line = format!(
            "Truck {:3} @ {:<10} {:6.2} - {:6.2} ({:5.2}h) cost {:10.2} | {}",
            self.id,
            ctx.name(self.home_depot),
            self.start_time(ctx),
            self.end_time(ctx),
            self.duration(ctx),
            self.total_cost(ctx),
            ids.join(", ")
        );
        if !self.is_feasible(ctx) {
            line.push_str("  <--- not feasible");
        }
        if self.is_too_long(ctx) {
            line.push_str("  <--- too long");
        }
        line
    }
}
