//! Independent validation of a schedule against its instance.

use crate::instance::Context;
use crate::schedule::Schedule;
use crate::shipment::ShipmentRequest;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything wrong with a schedule; empty lists mean it is valid.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    /// Requests neither scheduled nor reported unplaced
    pub missing: Vec<String>,
    /// Requests scheduled (or reported) more than once
    pub duplicated: Vec<String>,
    /// Shipments whose start lies outside the request window
    pub out_of_window: Vec<String>,
    /// Ids of trucks breaking the adjacency rule
    pub infeasible_trucks: Vec<usize>,
    /// Requests reported unplaced
    pub unplaced: Vec<String>,
}

impl CheckReport {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
            && self.duplicated.is_empty()
            && self.out_of_window.is_empty()
            && self.infeasible_trucks.is_empty()
    }

    /// Valid and nothing left unplaced.
    pub fn is_complete(&self) -> bool {
        self.is_valid() && self.unplaced.is_empty()
    }
}

impl std::fmt::Display for CheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_complete() {
            return writeln!(f, "Schedule check: OK");
        }
        writeln!(f, "Schedule check:")?;
        if !self.missing.is_empty() {
            writeln!(f, "  Missing: {}", self.missing.join(", "))?;
        }
        if !self.duplicated.is_empty() {
            writeln!(f, "  Duplicated: {}", self.duplicated.join(", "))?;
        }
        if !self.out_of_window.is_empty() {
            writeln!(f, "  Outside window: {}", self.out_of_window.join(", "))?;
        }
        if !self.infeasible_trucks.is_empty() {
            writeln!(f, "  Infeasible trucks: {:?}", self.infeasible_trucks)?;
        }
        if !self.unplaced.is_empty() {
            writeln!(f, "  Unplaced: {}", self.unplaced.join(", "))?;
        }
        Ok(())
    }
}

/// Check coverage, window containment and feasibility of `schedule` for `requests`.
pub fn check_schedule(ctx: &Context<'_>, requests: &[Arc<ShipmentRequest>], schedule: &Schedule) -> CheckReport {
    let mut report = CheckReport::default();

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for truck in &schedule.trucks {
        for shipment in truck.shipments() {
            *seen.entry(shipment.request_id()).or_insert(0) += 1;
            if !shipment.in_window() {
                report.out_of_window.push(shipment.id.clone());
            }
        }
        if !truck.is_feasible(ctx) {
            report.infeasible_trucks.push(truck.id);
        }
    }
    for request in &schedule.unplaced {
        *seen.entry(request.id.as_str()).or_insert(0) += 1;
        report.unplaced.push(request.id.clone());
    }

    for request in requests {
        match seen.get(request.id.as_str()) {
            None => report.missing.push(request.id.clone()),
            Some(&count) if count > 1 => report.duplicated.push(request.id.clone()),
            Some(_) => {}
        }
    }

    if !report.is_valid() {
        log::warn!(
            "Schedule '{}' failed its check: {} missing, {} duplicated, {} outside window, {} infeasible trucks",
            schedule.algorithm,
            report.missing.len(),
            report.duplicated.len(),
            report.out_of_window.len(),
            report.infeasible_trucks.len()
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::instance::{DriveTimes, Location};
    use crate::shipment::Shipment;
    use crate::truck::Truck;

    fn create_requests() -> Vec<Arc<ShipmentRequest>> {
        let x = Location(1);
        vec![
            Arc::new(ShipmentRequest::new("A", 8.0, 8.5, 9.0, x, x, "IB").unwrap()),
            Arc::new(ShipmentRequest::new("B", 10.0, 10.5, 11.0, x, x, "OB").unwrap()),
            Arc::new(ShipmentRequest::new("C", 12.0, 12.0, 13.0, x, x, "OB").unwrap()),
        ]
    }

    #[test]
    fn test_valid_schedule() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &[], &config);
        let requests = create_requests();

        let truck = Truck::with_shipments(
            1,
            Location(0),
            vec![Shipment::from_request(&requests[0], 8.0), Shipment::from_request(&requests[1], 10.0)],
        );
        let schedule = Schedule::from_trucks(vec![truck], vec![Arc::clone(&requests[2])], "test");
        let report = check_schedule(&ctx, &requests, &schedule);
        assert!(report.is_valid());
        assert!(!report.is_complete());
        assert_eq!(report.unplaced, vec!["C".to_string()]);
    }

    #[test]
    fn test_problems_are_reported() {
        let times = DriveTimes::uniform(&["D", "X"], 0.5);
        let config = SolverConfig::default();
        let ctx = Context::new(&times, &[], &config);
        let requests = create_requests();

        let first = Truck::with_shipments(
            1,
            Location(0),
            vec![Shipment::from_request(&requests[0], 9.0), Shipment::from_request(&requests[1], 9.5)],
        );
        let second = Truck::with_shipments(2, Location(0), vec![Shipment::from_request(&requests[1], 10.0)]);
        let schedule = Schedule::from_trucks(vec![first, second], Vec::new(), "test");

        let report = check_schedule(&ctx, &requests, &schedule);
        assert!(!report.is_valid());
        assert_eq!(report.missing, vec!["C".to_string()]);
        assert_eq!(report.duplicated, vec!["B".to_string()]);
        assert_eq!(report.out_of_window, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(report.infeasible_trucks, vec![1]);
        assert!(format!("{}", report).contains("Missing: C"));
    }
}
