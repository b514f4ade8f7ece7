//! Schedule representation and aggregate evaluation.
//!
//! A [`Schedule`] is the set of active trucks produced by one run, plus the requests that could
//! not be placed. It owns the cross-truck post-processing: depot reassignment, day splitting
//! and merging.

use crate::instance::{Context, Location};
use crate::shipment::ShipmentRequest;
use crate::truck::Truck;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::sync::Arc;

/// The outcome of a construction or search run
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Active trucks only
    pub trucks: Vec<Truck>,
    /// Requests no truck could take
    pub unplaced: Vec<Arc<ShipmentRequest>>,
    /// Algorithm that generated this schedule
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Schedule {
    pub fn new(algorithm: &str) -> Self {
        Schedule { algorithm: algorithm.to_string(), ..Default::default() }
    }

    /// Keep the active trucks and renumber them from 1.
    pub fn from_trucks(trucks: Vec<Truck>, unplaced: Vec<Arc<ShipmentRequest>>, algorithm: &str) -> Self {
        let mut schedule = Schedule {
            trucks: trucks.into_iter().filter(|t| t.is_active()).collect(),
            unplaced,
            algorithm: algorithm.to_string(),
            ..Default::default()
        };
        schedule.renumber();
        schedule
    }

    pub fn renumber(&mut self) {
        for (i, truck) in self.trucks.iter_mut().enumerate() {
            truck.id = i + 1;
        }
    }

    pub fn num_trucks(&self) -> usize {
        self.trucks.len()
    }

    pub fn num_shipments(&self) -> usize {
        self.trucks.iter().map(|t| t.len()).sum()
    }

    pub fn is_feasible(&self, ctx: &Context<'_>) -> bool {
        self.trucks.iter().all(|t| t.is_feasible(ctx))
    }

    /// Sum of truck costs, or infinity when any truck is infeasible.
    pub fn total_cost(&self, ctx: &Context<'_>) -> f64 {
        if !self.is_feasible(ctx) {
            return f64::INFINITY;
        }
        self.trucks.iter().map(|t| t.total_cost(ctx)).sum()
    }

    pub fn total_duration(&self, ctx: &Context<'_>) -> f64 {
        self.trucks.iter().map(|t| t.duration(ctx)).sum()
    }

    pub fn total_waiting_time(&self, ctx: &Context<'_>) -> f64 {
        self.trucks.iter().map(|t| t.waiting_time(ctx)).sum()
    }

    pub fn total_empty_driving_time(&self, ctx: &Context<'_>) -> f64 {
        self.trucks.iter().map(|t| t.empty_driving_time(ctx)).sum()
    }

    pub fn shipment_hours(&self) -> f64 {
        self.trucks.iter().flat_map(|t| t.shipments()).map(|s| s.length()).sum()
    }

    /// Two drivers for each splittable truck, one otherwise.
    pub fn num_drivers(&self, ctx: &Context<'_>) -> usize {
        self.trucks.iter().map(|t| if t.is_splittable(ctx) { 2 } else { 1 }).sum()
    }

    pub fn avg_driver_day(&self, ctx: &Context<'_>) -> f64 {
        let drivers = self.num_drivers(ctx);
        if drivers == 0 {
            return 0.0;
        }
        self.total_duration(ctx) / drivers as f64
    }

    pub fn short_trucks(&self, ctx: &Context<'_>) -> usize {
        self.trucks.iter().filter(|t| t.is_too_short(ctx)).count()
    }

    /// Trucks exceeding their legal day that no driver change can rescue.
    pub fn too_long_unsplittable(&self, ctx: &Context<'_>) -> Vec<&Truck> {
        self.trucks.iter().filter(|t| t.is_too_long(ctx) && !t.is_splittable(ctx)).collect()
    }

    /// Active trucks per depot of the context, in depot order.
    pub fn trucks_per_depot(&self, ctx: &Context<'_>) -> Vec<(Location, usize)> {
        ctx.depots
            .iter()
            .map(|d| (d.location, self.trucks.iter().filter(|t| t.home_depot == d.location).count()))
            .collect()
    }

    fn percentage(part: f64, whole: f64) -> f64 {
        if whole > 0.0 {
            100.0 * part / whole
        } else {
            0.0
        }
    }

    /// Share of truck time spent waiting (padding of short days included).
    pub fn waiting_percentage(&self, ctx: &Context<'_>) -> f64 {
        Self::percentage(self.total_waiting_time(ctx), self.total_duration(ctx))
    }

    pub fn empty_driving_percentage(&self, ctx: &Context<'_>) -> f64 {
        Self::percentage(self.total_empty_driving_time(ctx), self.total_duration(ctx))
    }

    /// Share of truck time not spent on a shipment.
    pub fn inefficiency_percentage(&self, ctx: &Context<'_>) -> f64 {
        let duration = self.total_duration(ctx);
        Self::percentage(duration - self.shipment_hours(), duration)
    }

    /// Move early-starting trucks to the depot closest to their first and last shipment.
    ///
    /// Depot capacity is not rechecked.
    pub fn post_improve_depots(&mut self, ctx: &Context<'_>) {
        let cutoff = ctx.config.duration.early_start_cutoff;
        for truck in self.trucks.iter_mut() {
            if !truck.is_active() || truck.start_time(ctx) >= cutoff {
                continue;
            }
            let (first, last) = match (truck.first(), truck.last()) {
                (Some(first), Some(last)) => (first.start_location, last.end_location),
                _ => continue,
            };
            let score = |depot: Location| ctx.drive(depot, first) + ctx.drive(last, depot);
            let current = score(truck.home_depot);
            let best = ctx.depots.iter().map(|d| d.location).min_by_key(|&d| OrderedFloat(score(d)));
            if let Some(best) = best {
                if score(best) < current && truck.change_depot(best) {
                    log::debug!(
                        "Truck {} moved to depot {} ({:.2}h -> {:.2}h of pull-out and pull-in)",
                        truck.id,
                        ctx.name(best),
                        current,
                        score(best)
                    );
                }
            }
        }
    }

    /// Shift every non-splittable truck forward then backward.
    pub fn shift_trucks(&mut self, ctx: &Context<'_>) {
        for truck in self.trucks.iter_mut().filter(|t| !t.is_splittable(ctx)) {
            truck.shift_forward(ctx);
            truck.shift_backward(ctx);
        }
    }

    /// One truck per driver shift: every splittable truck is cut at its first split relief point.
    pub fn split(&self, ctx: &Context<'_>) -> Schedule {
        let mut trucks = Vec::with_capacity(self.trucks.len());
        for truck in &self.trucks {
            let halves = truck
                .split_relief_points(ctx)
                .first()
                .and_then(|&point| truck.split_at(point, (0, 0)));
            match halves {
                Some((left, right)) => {
                    trucks.push(left);
                    trucks.push(right);
                }
                None => trucks.push(truck.clone()),
            }
        }
        let mut schedule = Schedule {
            trucks,
            unplaced: self.unplaced.clone(),
            algorithm: self.algorithm.clone(),
            computation_time: self.computation_time,
            iterations: self.iterations,
        };
        schedule.renumber();
        schedule
    }

    /// Union of both truck sets and both unplaced lists.
    pub fn merge(mut self, other: Schedule) -> Schedule {
        self.trucks.extend(other.trucks);
        self.unplaced.extend(other.unplaced);
        self.computation_time += other.computation_time;
        self.renumber();
        self
    }

    pub fn metrics(&self, ctx: &Context<'_>) -> ScheduleMetrics {
        ScheduleMetrics {
            algorithm: self.algorithm.clone(),
            total_cost: self.total_cost(ctx),
            feasible: self.is_feasible(ctx),
            num_trucks: self.num_trucks(),
            num_drivers: self.num_drivers(ctx),
            num_shipments: self.num_shipments(),
            num_unplaced: self.unplaced.len(),
            total_duration: self.total_duration(ctx),
            shipment_hours: self.shipment_hours(),
            total_waiting_time: self.total_waiting_time(ctx),
            total_empty_driving_time: self.total_empty_driving_time(ctx),
            waiting_percentage: self.waiting_percentage(ctx),
            empty_driving_percentage: self.empty_driving_percentage(ctx),
            inefficiency_percentage: self.inefficiency_percentage(ctx),
            avg_driver_day: self.avg_driver_day(ctx),
            short_trucks: self.short_trucks(ctx),
            too_long_unsplittable: self.too_long_unsplittable(ctx).iter().map(|t| t.id).collect(),
            trucks_per_depot: self
                .trucks_per_depot(ctx)
                .into_iter()
                .map(|(depot, count)| (ctx.name(depot).to_string(), count))
                .collect(),
            computation_time: self.computation_time,
            iterations: self.iterations,
        }
    }
}

/// Summary figures of a schedule, as printed and exported
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleMetrics {
    pub algorithm: String,
    pub total_cost: f64,
    pub feasible: bool,
    pub num_trucks: usize,
    pub num_drivers: usize,
    pub num_shipments: usize,
    pub num_unplaced: usize,
    pub total_duration: f64,
    pub shipment_hours: f64,
    pub total_waiting_time: f64,
    pub total_empty_driving_time: f64,
    pub waiting_percentage: f64,
    pub empty_driving_percentage: f64,
    pub inefficiency_percentage: f64,
    pub avg_driver_day: f64,
    pub short_trucks: usize,
    pub too_long_unsplittable: Vec<usize>,
    pub trucks_per_depot: Vec<(String, usize)>,
    pub computation_time: f64,
    pub iterations: Option<usize>,
}

impl std::fmt::Display for ScheduleMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schedule ({})", self.algorithm)?;
        writeln!(f, "  Cost: {:.2}", self.total_cost)?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Trucks: {} ({} drivers)", self.num_trucks, self.num_drivers)?;
        writeln!(f, "  Shipments: {} placed, {} unplaced", self.num_shipments, self.num_unplaced)?;
        writeln!(f, "  Hours: {:.2} on duty, {:.2} on shipments", self.total_duration, self.shipment_hours)?;
        writeln!(f, "  Waiting: {:.2}h ({:.1}%)", self.total_waiting_time, self.waiting_percentage)?;
        writeln!(f, "  Empty driving: {:.2}h ({:.1}%)", self.total_empty_driving_time, self.empty_driving_percentage)?;
        writeln!(f, "  Inefficiency: {:.1}%", self.inefficiency_percentage)?;
        writeln!(f, "  Avg driver day: {:.2}h", self.avg_driver_day)?;
        writeln!(f, "  Short days: {}", self.short_trucks)?;
        if !self.too_long_unsplittable.is_empty() {
            writeln!(f, "  Too long without relief: {:?}", self.too_long_unsplittable)?;
        }
        for (depot, count) in &self.trucks_per_depot {
            writeln!(f, "  Depot {}: {} trucks", depot, count)?;
        }
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        Ok(())
    }
}
