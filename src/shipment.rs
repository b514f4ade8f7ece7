//! Shipment requests and their scheduled realizations.
//!
//! A [`ShipmentRequest`] is the immutable input task: a start window plus a rigid length.
//! A [`Shipment`] is one concrete placement of a request at a chosen start time. Realizations
//! share their request through an `Arc`, never through a copy.

use crate::error::{Result, SolverError};
use crate::instance::Location;
use serde::Serialize;
use std::sync::Arc;

/// Tolerance (in hours) used by every time comparison.
pub const TIME_EPS: f64 = 1e-6;

/// A time-windowed transport task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentRequest {
    pub id: String,
    pub earliest_start_time: f64,
    pub latest_start_time: f64,
    pub earliest_end_time: f64,
    /// Always `earliest_end_time + (latest_start_time - earliest_start_time)`
    pub latest_end_time: f64,
    pub start_location: Location,
    pub end_location: Location,
    /// Free-form type tag; contains "IB" for inbound and "OB" for outbound tasks
    pub tag: String,
}

impl ShipmentRequest {
    pub fn new(
        id: impl Into<String>,
        earliest_start_time: f64,
        latest_start_time: f64,
        earliest_end_time: f64,
        start_location: Location,
        end_location: Location,
        tag: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let invalid = |reason: String| SolverError::InvalidWindow { id: id.clone(), reason };

        if !(earliest_start_time.is_finite() && latest_start_time.is_finite() && earliest_end_time.is_finite()) {
            return Err(invalid("times must be finite".to_string()));
        }
        if latest_start_time + TIME_EPS < earliest_start_time {
            return Err(invalid(format!(
                "latest start {} precedes earliest start {}",
                latest_start_time, earliest_start_time
            )));
        }
        if earliest_end_time + TIME_EPS < earliest_start_time {
            return Err(invalid(format!(
                "earliest end {} precedes earliest start {}",
                earliest_end_time, earliest_start_time
            )));
        }

        let latest_start_time = latest_start_time.max(earliest_start_time);
        Ok(ShipmentRequest {
            latest_end_time: earliest_end_time + (latest_start_time - earliest_start_time),
            id,
            earliest_start_time,
            latest_start_time,
            earliest_end_time,
            start_location,
            end_location,
            tag: tag.into(),
        })
    }

    /// A task that must start exactly at `start_time`.
    pub fn fixed(
        id: impl Into<String>,
        start_time: f64,
        end_time: f64,
        start_location: Location,
        end_location: Location,
        tag: impl Into<String>,
    ) -> Result<Self> {
        Self::new(id, start_time, start_time, end_time, start_location, end_location, tag)
    }

    /// Duration of the task, identical for every start time in the window.
    #[inline]
    pub fn length(&self) -> f64 {
        self.earliest_end_time - self.earliest_start_time
    }

    #[inline]
    pub fn window_width(&self) -> f64 {
        self.latest_start_time - self.earliest_start_time
    }

    pub fn is_inbound(&self) -> bool {
        self.tag.contains("IB")
    }

    pub fn is_outbound(&self) -> bool {
        self.tag.contains("OB")
    }

    /// Whether `start_time` lies in the start window.
    pub fn admits_start(&self, start_time: f64) -> bool {
        self.earliest_start_time - TIME_EPS <= start_time && start_time <= self.latest_start_time + TIME_EPS
    }

    /// Candidate realizations spread over the start window, as consumed by a time-expanded
    /// network model.
    ///
    /// Starts are placed every `interval_minutes`; when that would exceed `max_copies`, the
    /// window is instead divided evenly into `max_copies` starts. With a single copy, outbound
    /// tasks take their latest start and everything else its earliest start.
    pub fn discretize(self: &Arc<Self>, interval_minutes: f64, max_copies: usize) -> Vec<Shipment> {
        let width = self.window_width();
        let max_copies = max_copies.max(1);

        let starts: Vec<f64> = if max_copies == 1 || width <= TIME_EPS {
            let start = if max_copies == 1 && self.is_outbound() {
                self.latest_start_time
            } else {
                self.earliest_start_time
            };
            vec![start]
        } else {
            let step = (interval_minutes / 60.0).max(TIME_EPS);
            let natural = (width / step + TIME_EPS).floor() as usize + 1;
            if natural <= max_copies {
                (0..natural).map(|k| self.earliest_start_time + k as f64 * step).collect()
            } else {
                let step = width / (max_copies - 1) as f64;
                (0..max_copies).map(|k| self.earliest_start_time + k as f64 * step).collect()
            }
        };

        starts
            .into_iter()
            .enumerate()
            .map(|(k, start)| {
                let mut shipment = Shipment::from_request(self, start);
                shipment.id = format!("{}.{}", self.id, k + 1);
                shipment
            })
            .collect()
    }
}

/// A request realized at a concrete start time, or a free-standing literal task.
#[derive(Debug, Clone)]
pub struct Shipment {
    pub id: String,
    start_time: f64,
    end_time: f64,
    pub start_location: Location,
    pub end_location: Location,
    pub tag: String,
    request: Option<Arc<ShipmentRequest>>,
}

impl Shipment {
    pub fn from_request(request: &Arc<ShipmentRequest>, start_time: f64) -> Self {
        Shipment {
            id: request.id.clone(),
            start_time,
            end_time: start_time + request.length(),
            start_location: request.start_location,
            end_location: request.end_location,
            tag: request.tag.clone(),
            request: Some(Arc::clone(request)),
        }
    }

    /// A task with fixed times and no originating request.
    pub fn literal(
        id: impl Into<String>,
        start_time: f64,
        end_time: f64,
        start_location: Location,
        end_location: Location,
        tag: impl Into<String>,
    ) -> Self {
        Shipment {
            id: id.into(),
            start_time,
            end_time,
            start_location,
            end_location,
            tag: tag.into(),
            request: None,
        }
    }

    #[inline]
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    #[inline]
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Move the shipment rigidly: the end follows the start.
    pub fn set_start_time(&mut self, start_time: f64) {
        let length = match &self.request {
            Some(request) => request.length(),
            None => self.end_time - self.start_time,
        };
        self.start_time = start_time;
        self.end_time = start_time + length;
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn request(&self) -> Option<&Arc<ShipmentRequest>> {
        self.request.as_ref()
    }

    /// Id of the originating request, or the shipment's own id for literals.
    pub fn request_id(&self) -> &str {
        match &self.request {
            Some(request) => &request.id,
            None => &self.id,
        }
    }

    /// Whether the start lies in the request's window; literals always do.
    pub fn in_window(&self) -> bool {
        self.request.as_ref().map_or(true, |r| r.admits_start(self.start_time))
    }
}

impl std::fmt::Display for Shipment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{:.2} - {:.2}]", self.id, self.start_time, self.end_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, es: f64, ls: f64, ee: f64) -> Arc<ShipmentRequest> {
        Arc::new(ShipmentRequest::new(id, es, ls, ee, Location(0), Location(1), "IB").unwrap())
    }

    #[test]
    fn test_latest_end_is_derived() {
        let req = request("A", 8.0, 8.5, 9.0);
        assert!((req.latest_end_time - 9.5).abs() < 1e-12);
        assert!((req.length() - 1.0).abs() < 1e-12);
        assert!(req.is_inbound());
        assert!(!req.is_outbound());
    }

    #[test]
    fn test_invalid_windows_are_rejected() {
        assert!(ShipmentRequest::new("X", 9.0, 8.0, 10.0, Location(0), Location(1), "OB").is_err());
        assert!(ShipmentRequest::new("X", 9.0, 9.5, 8.0, Location(0), Location(1), "OB").is_err());
        assert!(ShipmentRequest::new("X", f64::NAN, 9.5, 10.0, Location(0), Location(1), "OB").is_err());
    }

    #[test]
    fn test_duration_is_rigid() {
        let req = request("A", 8.0, 10.0, 11.5);
        let mut ship = Shipment::from_request(&req, 8.0);
        for start in [8.0, 8.7, 9.25, 10.0] {
            ship.set_start_time(start);
            assert!((ship.end_time() - ship.start_time() - req.length()).abs() < 1e-12);
            assert!(ship.in_window());
        }
        ship.set_start_time(10.5);
        assert!(!ship.in_window());
    }

    #[test]
    fn test_literal_shift_keeps_length() {
        let mut ship = Shipment::literal("L", 5.0, 7.0, Location(0), Location(0), "");
        ship.set_start_time(6.0);
        assert_eq!(ship.end_time(), 8.0);
        assert_eq!(ship.request_id(), "L");
        assert!(ship.request().is_none());
        assert!(ship.in_window());
    }

    #[test]
    fn test_realizations_share_request() {
        let req = request("A", 8.0, 8.5, 9.0);
        let first = Shipment::from_request(&req, 8.0);
        let second = Shipment::from_request(&req, 8.5);
        assert!(Arc::ptr_eq(first.request().unwrap(), second.request().unwrap()));
        assert_eq!(Arc::strong_count(&req), 3);
    }

    #[test]
    fn test_discretize_window() {
        let req = request("A", 8.0, 9.0, 10.0);

        let copies = req.discretize(20.0, 5);
        assert_eq!(copies.len(), 4);
        assert_eq!(copies[0].id, "A.1");
        assert!((copies[3].start_time() - 9.0).abs() < 1e-9);
        assert!(copies.iter().all(|s| s.in_window() && s.request_id() == "A"));

        let capped = req.discretize(5.0, 3);
        assert_eq!(capped.len(), 3);
        assert!((capped[1].start_time() - 8.5).abs() < 1e-9);

        let outbound = Arc::new(ShipmentRequest::new("B", 8.0, 9.0, 10.0, Location(0), Location(1), "OB").unwrap());
        let single = outbound.discretize(20.0, 1);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].start_time(), 9.0);
    }
}
