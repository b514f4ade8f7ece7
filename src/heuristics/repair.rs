use super::construction::{order_requests, ConstructionHeuristic, ConstructionJob, SequentialInsertion};
use crate::config::{ConstructionPolicy, InsertionSide, SolverConfig};
use crate::instance::Context;
use crate::schedule::Schedule;
use crate::shipment::ShipmentRequest;
use crate::truck::Truck;
use std::sync::Arc;

/// Dissolves trucks that run over their legal day and have no relief point for a driver
/// change, then re-inserts their requests around the remaining trucks.
#[derive(Debug, Clone)]
pub struct DriverChangeRepair {
    pub construction: SequentialInsertion,
    pub seed: u64,
}

impl DriverChangeRepair {
    /// Re-insertion only appends, whatever the insertion side of `policy`.
    pub fn new(policy: ConstructionPolicy, seed: u64) -> Self {
        let policy = ConstructionPolicy { insertion: InsertionSide::AfterOnly, ..policy };
        DriverChangeRepair { construction: SequentialInsertion::new(policy), seed }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.construction.clone(), config.seed)
    }

    pub fn name(&self) -> &str {
        "DriverChangeRepair"
    }

    pub fn repair(&self, ctx: &Context<'_>, schedule: &Schedule) -> Schedule {
        let (broken, kept): (Vec<&Truck>, Vec<&Truck>) =
            schedule.trucks.iter().partition(|t| t.is_too_long(ctx) && !t.is_splittable(ctx));
        if broken.is_empty() {
            return schedule.clone();
        }

        let mut released: Vec<Arc<ShipmentRequest>> = Vec::new();
        let mut literals = Vec::new();
        for truck in &broken {
            for shipment in truck.shipments() {
                match shipment.request() {
                    Some(request) => released.push(Arc::clone(request)),
                    None => literals.push(shipment.id.clone()),
                }
            }
        }
        if !literals.is_empty() {
            log::warn!("{}: literal shipments cannot be re-inserted: {}", self.name(), literals.join(", "));
        }
        log::info!("{}: dissolving {} trucks, re-inserting {} requests", self.name(), broken.len(), released.len());

        let kept: Vec<Truck> = kept.into_iter().cloned().collect();
        let order = order_requests(&released, self.construction.policy.priority);
        let job = ConstructionJob::new(&order).with_seeded(&kept);
        let mut result = self.construction.construct(ctx, &job, self.seed);

        result.unplaced.extend(schedule.unplaced.iter().cloned());
        result.algorithm = format!("{}+{}", schedule.algorithm, self.name());
        result.computation_time += schedule.computation_time;
        result.iterations = schedule.iterations;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_schedule;
    use crate::config::DurationCap;
    use crate::instance::{Depot, DriveTimes, Location};

    #[test]
    fn test_too_long_truck_is_dissolved() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let x = Location(1);
        let depots = vec![Depot { location: Location(0), capacity: 2 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let requests = vec![
            Arc::new(ShipmentRequest::new("L1", 5.0, 5.0, 12.0, x, x, "IB").unwrap()),
            Arc::new(ShipmentRequest::new("L2", 12.0, 12.0, 19.0, x, x, "OB").unwrap()),
        ];

        let unbounded = SequentialInsertion::new(ConstructionPolicy {
            duration_cap: DurationCap::Unbounded,
            ..ConstructionPolicy::deterministic()
        });
        let long = unbounded.construct(&ctx, &ConstructionJob::new(&requests), 0);
        assert_eq!(long.too_long_unsplittable(&ctx).len(), 1);

        let repaired = DriverChangeRepair::new(ConstructionPolicy::deterministic(), 0).repair(&ctx, &long);
        assert_eq!(repaired.num_trucks(), 2);
        assert!(repaired.too_long_unsplittable(&ctx).is_empty());
        assert!(check_schedule(&ctx, &requests, &repaired).is_complete());
        assert_eq!(repaired.algorithm, "SequentialInsertion+DriverChangeRepair");
    }

    #[test]
    fn test_sound_schedule_is_untouched() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let x = Location(1);
        let depots = vec![Depot { location: Location(0), capacity: 1 }];
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &depots, &config);
        let requests = vec![Arc::new(ShipmentRequest::new("A", 8.0, 9.0, 12.0, x, x, "IB").unwrap())];

        let schedule = SequentialInsertion::deterministic().construct(&ctx, &ConstructionJob::new(&requests), 0);
        let repaired = DriverChangeRepair::from_config(&config).repair(&ctx, &schedule);
        assert_eq!(repaired.algorithm, schedule.algorithm);
        assert_eq!(repaired.num_trucks(), 1);
    }
}
