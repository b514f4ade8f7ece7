//! Module for loading and representing VSPTW instances.
//!
//! An instance is a drive-time matrix between named locations, a list of depots with their
//! truck capacity, and the shipment requests of one operating day. Location names are interned
//! into dense [`Location`] indices when the matrix is loaded, so every drive-time lookup during
//! the search is a plain array access.

use crate::config::SolverConfig;
use crate::error::{Result, SolverError};
use crate::shipment::ShipmentRequest;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Interned location index into a [`DriveTimes`] matrix.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Location(pub usize);

/// Driving times (hours) between every pair of known locations.
#[derive(Debug, Clone)]
pub struct DriveTimes {
    names: Vec<String>,
    index: HashMap<String, Location>,
    /// Row-major `n x n` matrix
    times: Vec<f64>,
}

impl DriveTimes {
    /// Every pair at `hours`, except a location to itself which is 0.
    pub fn uniform<S: AsRef<str>>(names: &[S], hours: f64) -> Self {
        let names: Vec<String> = names.iter().map(|s| s.as_ref().to_string()).collect();
        let n = names.len();
        let mut times = vec![hours; n * n];
        for i in 0..n {
            times[i * n + i] = 0.0;
        }
        let index = names.iter().enumerate().map(|(i, name)| (name.clone(), Location(i))).collect();
        DriveTimes { names, index, times }
    }

    /// Build from explicit rows; `rows[i][j]` is the time from `names[i]` to `names[j]`.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = names.len();
        let mut index = HashMap::with_capacity(n);
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), Location(i)).is_some() {
                return Err(SolverError::InvalidConfig(format!("location '{}' is listed twice", name)));
            }
        }
        if rows.len() != n {
            return Err(SolverError::MatrixShape { row: "<matrix>".to_string(), found: rows.len(), expected: n });
        }

        let mut times = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(SolverError::MatrixShape { row: names[i].clone(), found: row.len(), expected: n });
            }
            for (j, value) in row.into_iter().enumerate() {
                if !(value.is_finite() && value >= 0.0) {
                    return Err(SolverError::InvalidDriveTime { from: names[i].clone(), to: names[j].clone(), value });
                }
                times.push(value);
            }
        }

        Ok(DriveTimes { names, index, times })
    }

    /// Parse a matrix CSV: the header is `Location,<name>,<name>,...` and each row starts with
    /// the origin name. Rows may come in any order but every header location needs one.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let names: Vec<String> = reader.headers()?.iter().skip(1).map(|s| s.to_string()).collect();
        let n = names.len();
        let position: HashMap<&str, usize> = names.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

        let mut rows: Vec<Option<Vec<f64>>> = vec![None; n];
        for record in reader.records() {
            let record = record?;
            let origin = record.get(0).unwrap_or_default().to_string();
            let i = *position.get(origin.as_str()).ok_or_else(|| SolverError::UnknownLocation(origin.clone()))?;
            if record.len() != n + 1 {
                return Err(SolverError::MatrixShape { row: origin, found: record.len().saturating_sub(1), expected: n });
            }
            let mut row = Vec::with_capacity(n);
            for (j, cell) in record.iter().skip(1).enumerate() {
                let value: f64 = cell.parse().map_err(|_| SolverError::InvalidDriveTime {
                    from: origin.clone(),
                    to: names[j].clone(),
                    value: f64::NAN,
                })?;
                row.push(value);
            }
            rows[i] = Some(row);
        }

        let mut complete = Vec::with_capacity(n);
        for (i, row) in rows.into_iter().enumerate() {
            complete.push(row.ok_or_else(|| SolverError::MatrixShape { row: names[i].clone(), found: 0, expected: n })?);
        }

        Self::from_rows(names, complete)
    }

    /// Override a single entry.
    pub fn set(&mut self, from: Location, to: Location, hours: f64) {
        let n = self.names.len();
        self.times[from.0 * n + to.0] = hours;
    }

    /// Driving time from `from` to `to`, in hours.
    #[inline]
    pub fn drive(&self, from: Location, to: Location) -> f64 {
        self.times[from.0 * self.names.len() + to.0]
    }

    pub fn lookup(&self, name: &str) -> Option<Location> {
        self.index.get(name).copied()
    }

    pub fn location(&self, name: &str) -> Result<Location> {
        self.lookup(name).ok_or_else(|| SolverError::UnknownLocation(name.to_string()))
    }

    pub fn name(&self, location: Location) -> &str {
        &self.names[location.0]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> {
        (0..self.names.len()).map(Location)
    }
}

/// A depot and the number of trucks based there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depot {
    pub location: Location,
    pub capacity: usize,
}

/// Read-only view shared by every cost, feasibility and search call of a run.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub drive: &'a DriveTimes,
    pub depots: &'a [Depot],
    pub config: &'a SolverConfig,
}

impl<'a> Context<'a> {
    pub fn new(drive: &'a DriveTimes, depots: &'a [Depot], config: &'a SolverConfig) -> Self {
        Context { drive, depots, config }
    }

    #[inline]
    pub fn drive(&self, from: Location, to: Location) -> f64 {
        self.drive.drive(from, to)
    }

    pub fn name(&self, location: Location) -> &'a str {
        self.drive.name(location)
    }
}

#[derive(Debug, Deserialize)]
struct RequestRecord {
    shipment_id: String,
    earliest_start_time: f64,
    latest_start_time: f64,
    earliest_end_time: f64,
    #[serde(default)]
    latest_end_time: Option<f64>,
    start_location: String,
    end_location: String,
    #[serde(rename = "type", default)]
    tag: String,
}

#[derive(Debug, Deserialize)]
struct FixedRecord {
    shipment_id: String,
    start_time: f64,
    end_time: f64,
    start_location: String,
    end_location: String,
    #[serde(rename = "type", default)]
    tag: String,
}

#[derive(Debug, Deserialize)]
struct DepotRecord {
    #[serde(alias = "Depot")]
    depot: String,
    #[serde(alias = "Trucks")]
    capacity: usize,
}

/// A complete VSPTW instance
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub drive_times: DriveTimes,
    pub depots: Vec<Depot>,
    /// Requests in input order
    pub requests: Vec<Arc<ShipmentRequest>>,
}

impl Instance {
    /// Assemble an instance, rejecting duplicate request ids and duplicate depots.
    pub fn new(
        name: impl Into<String>,
        drive_times: DriveTimes,
        depots: Vec<Depot>,
        requests: Vec<ShipmentRequest>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for request in &requests {
            if !seen.insert(request.id.clone()) {
                return Err(SolverError::DuplicateRequest(request.id.clone()));
            }
            for location in [request.start_location, request.end_location] {
                if location.0 >= drive_times.len() {
                    return Err(SolverError::UnknownLocation(format!("#{}", location.0)));
                }
            }
        }

        let mut depot_seen = HashSet::new();
        for depot in &depots {
            if depot.location.0 >= drive_times.len() {
                return Err(SolverError::MissingDepot(format!("#{}", depot.location.0)));
            }
            if !depot_seen.insert(depot.location) {
                return Err(SolverError::InvalidConfig(format!(
                    "depot '{}' is listed twice",
                    drive_times.name(depot.location)
                )));
            }
        }

        Ok(Instance {
            name: name.into(),
            drive_times,
            depots,
            requests: requests.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load an instance from its three CSV files: drive-time matrix, depots, time-windowed shipments.
    pub fn from_files<P: AsRef<Path>>(matrix: P, depots: P, shipments: P) -> Result<Self> {
        let drive_times = DriveTimes::from_csv(matrix.as_ref())?;
        let depots = Self::read_depots(&drive_times, depots.as_ref())?;

        let mut requests = Vec::new();
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(shipments.as_ref())?;
        for record in reader.deserialize() {
            let record: RequestRecord = record?;
            let request = ShipmentRequest::new(
                record.shipment_id,
                record.earliest_start_time,
                record.latest_start_time,
                record.earliest_end_time,
                drive_times.location(&record.start_location)?,
                drive_times.location(&record.end_location)?,
                record.tag,
            )?;
            if let Some(given) = record.latest_end_time {
                if (given - request.latest_end_time).abs() > 0.01 {
                    log::warn!(
                        "Shipment {}: latest end {} in file, {} derived from the window; using the derived value",
                        request.id, given, request.latest_end_time
                    );
                }
            }
            requests.push(request);
        }

        log::info!("Loaded {} shipments, {} depots, {} locations", requests.len(), depots.len(), drive_times.len());
        Self::new(Self::name_from_path(shipments.as_ref()), drive_times, depots, requests)
    }

    /// Load shipments with fixed start and end times; each becomes a zero-width request.
    pub fn from_fixed_files<P: AsRef<Path>>(matrix: P, depots: P, shipments: P) -> Result<Self> {
        let drive_times = DriveTimes::from_csv(matrix.as_ref())?;
        let depots = Self::read_depots(&drive_times, depots.as_ref())?;

        let mut requests = Vec::new();
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(shipments.as_ref())?;
        for record in reader.deserialize() {
            let record: FixedRecord = record?;
            requests.push(ShipmentRequest::fixed(
                record.shipment_id,
                record.start_time,
                record.end_time,
                drive_times.location(&record.start_location)?,
                drive_times.location(&record.end_location)?,
                record.tag,
            )?);
        }

        Self::new(Self::name_from_path(shipments.as_ref()), drive_times, depots, requests)
    }

    fn read_depots(drive_times: &DriveTimes, path: &Path) -> Result<Vec<Depot>> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let mut depots = Vec::new();
        for record in reader.deserialize() {
            let record: DepotRecord = record?;
            let location = drive_times.lookup(&record.depot).ok_or(SolverError::MissingDepot(record.depot))?;
            depots.push(Depot { location, capacity: record.capacity });
        }
        Ok(depots)
    }

    fn name_from_path(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "instance".to_string())
    }

    pub fn context<'a>(&'a self, config: &'a SolverConfig) -> Context<'a> {
        Context::new(&self.drive_times, &self.depots, config)
    }

    pub fn request(&self, id: &str) -> Option<&Arc<ShipmentRequest>> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn total_capacity(&self) -> usize {
        self.depots.iter().map(|d| d.capacity).sum()
    }

    /// Sum of request lengths
    pub fn input_hours(&self) -> f64 {
        self.requests.iter().map(|r| r.length()).sum()
    }

    pub fn statistics(&self) -> InstanceStatistics {
        let n = self.requests.len();
        let widths: Vec<f64> = self.requests.iter().map(|r| r.window_width()).collect();
        let avg_window_width = if n > 0 { widths.iter().sum::<f64>() / n as f64 } else { 0.0 };
        let max_window_width = widths.iter().cloned().fold(0.0, f64::max);

        let earliest_start = self.requests.iter().map(|r| r.earliest_start_time).fold(f64::INFINITY, f64::min);
        let latest_end = self.requests.iter().map(|r| r.latest_end_time).fold(f64::NEG_INFINITY, f64::max);

        let mut drives = Vec::new();
        for a in self.drive_times.locations() {
            for b in self.drive_times.locations() {
                if a != b {
                    drives.push(self.drive_times.drive(a, b));
                }
            }
        }
        let avg_drive_time = if drives.is_empty() { 0.0 } else { drives.iter().sum::<f64>() / drives.len() as f64 };
        let max_drive_time = drives.iter().cloned().fold(0.0, f64::max);

        InstanceStatistics {
            name: self.name.clone(),
            num_requests: n,
            num_inbound: self.requests.iter().filter(|r| r.is_inbound()).count(),
            num_outbound: self.requests.iter().filter(|r| r.is_outbound()).count(),
            num_depots: self.depots.len(),
            total_capacity: self.total_capacity(),
            num_locations: self.drive_times.len(),
            input_hours: self.input_hours(),
            avg_window_width,
            max_window_width,
            earliest_start: if n > 0 { earliest_start } else { 0.0 },
            latest_end: if n > 0 { latest_end } else { 0.0 },
            avg_drive_time,
            max_drive_time,
        }
    }
}

/// Statistics about a VSPTW instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_requests: usize,
    pub num_inbound: usize,
    pub num_outbound: usize,
    pub num_depots: usize,
    pub total_capacity: usize,
    pub num_locations: usize,
    pub input_hours: f64,
    pub avg_window_width: f64,
    pub max_window_width: f64,
    pub earliest_start: f64,
    pub latest_end: f64,
    pub avg_drive_time: f64,
    pub max_drive_time: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Shipments: {} ({} inbound, {} outbound)", self.num_requests, self.num_inbound, self.num_outbound)?;
        writeln!(f, "  Depots: {} (total capacity: {} trucks)", self.num_depots, self.total_capacity)?;
        writeln!(f, "  Locations: {}", self.num_locations)?;
        writeln!(f, "  Input hours: {:.2}", self.input_hours)?;
        writeln!(f, "  Avg window width: {:.2}h (max {:.2}h)", self.avg_window_width, self.max_window_width)?;
        writeln!(f, "  Horizon: {:.2} - {:.2}", self.earliest_start, self.latest_end)?;
        writeln!(f, "  Avg drive time: {:.2}h", self.avg_drive_time)?;
        writeln!(f, "  Max drive time: {:.2}h", self.max_drive_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("vsptw-instance-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_uniform_drive_times() {
        let mut times = DriveTimes::uniform(&["D", "X", "Y"], 0.5);
        let d = times.location("D").unwrap();
        let x = times.location("X").unwrap();
        assert_eq!(times.drive(d, d), 0.0);
        assert_eq!(times.drive(d, x), 0.5);
        times.set(d, x, 0.2);
        assert_eq!(times.drive(d, x), 0.2);
        assert_eq!(times.drive(x, d), 0.5);
        assert_eq!(times.name(x), "X");
        assert!(times.location("Z").is_err());
    }

    #[test]
    fn test_from_rows_rejects_bad_shape() {
        let names = vec!["A".to_string(), "B".to_string()];
        assert!(DriveTimes::from_rows(names.clone(), vec![vec![0.0, 1.0]]).is_err());
        assert!(DriveTimes::from_rows(names.clone(), vec![vec![0.0, 1.0], vec![1.0]]).is_err());
        assert!(DriveTimes::from_rows(names, vec![vec![0.0, -1.0], vec![1.0, 0.0]]).is_err());
    }

    #[test]
    fn test_load_from_files() {
        let matrix = write_temp("matrix.csv", "Location,D,X,Y\nX,0.5,0,0.75\nD,0,0.25,0.25\nY,0.25,0.75,0\n");
        let depots = write_temp("depots.csv", "depot,capacity\nD,2\n");
        let shipments = write_temp(
            "shipments.csv",
            "shipment_id,earliest_start_time,latest_start_time,earliest_end_time,latest_end_time,start_location,end_location,type\n\
             S1,8.0,8.5,9.0,9.5,X,Y,IB\n\
             S2,10.0,11.0,12.0,13.0,Y,X,OB\n",
        );

        let instance = Instance::from_files(&matrix, &depots, &shipments).unwrap();
        assert_eq!(instance.requests.len(), 2);
        assert_eq!(instance.total_capacity(), 2);
        let d = instance.drive_times.location("D").unwrap();
        let x = instance.drive_times.location("X").unwrap();
        assert_eq!(instance.drive_times.drive(x, d), 0.5);
        assert_eq!(instance.drive_times.drive(d, x), 0.25);
        assert_eq!(instance.depots[0].location, d);
        assert!((instance.input_hours() - 3.0).abs() < 1e-9);

        let stats = instance.statistics();
        assert_eq!(stats.num_inbound, 1);
        assert_eq!(stats.num_outbound, 1);
        assert!((stats.avg_window_width - 0.75).abs() < 1e-9);
        assert!(format!("{}", stats).contains("Shipments: 2"));
    }

    #[test]
    fn test_unknown_location_is_reported() {
        let matrix = write_temp("matrix2.csv", "Location,D,X\nD,0,1\nX,1,0\n");
        let depots = write_temp("depots2.csv", "Depot,Trucks\nD,1\n");
        let shipments = write_temp(
            "shipments2.csv",
            "shipment_id,earliest_start_time,latest_start_time,earliest_end_time,start_location,end_location,type\n\
             S1,8.0,8.5,9.0,X,Q,IB\n",
        );
        match Instance::from_files(&matrix, &depots, &shipments) {
            Err(SolverError::UnknownLocation(name)) => assert_eq!(name, "Q"),
            other => panic!("expected unknown location, got {:?}", other.map(|i| i.name)),
        }
    }

    #[test]
    fn test_fixed_shipments_become_zero_width() {
        let matrix = write_temp("matrix3.csv", "Location,D,X\nD,0,1\nX,1,0\n");
        let depots = write_temp("depots3.csv", "Depot,Trucks\nD,1\n");
        let shipments = write_temp(
            "shipments3.csv",
            "shipment_id,start_time,end_time,start_location,end_location,type\nF1,6.0,8.5,D,X,OB\n",
        );
        let instance = Instance::from_fixed_files(&matrix, &depots, &shipments).unwrap();
        let request = instance.request("F1").unwrap();
        assert_eq!(request.window_width(), 0.0);
        assert!((request.length() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_requests_are_rejected() {
        let times = DriveTimes::uniform(&["D", "X"], 1.0);
        let x = times.location("X").unwrap();
        let requests = vec![
            ShipmentRequest::new("A", 8.0, 9.0, 10.0, x, x, "IB").unwrap(),
            ShipmentRequest::new("A", 9.0, 9.0, 10.0, x, x, "IB").unwrap(),
        ];
        let depots = vec![Depot { location: times.location("D").unwrap(), capacity: 1 }];
        assert!(matches!(
            Instance::new("dup", times, depots, requests),
            Err(SolverError::DuplicateRequest(_))
        ));
    }
}
