//! Schedule export: one CSV row per scheduled shipment, and a JSON report.

use crate::check::{check_schedule, CheckReport};
use crate::error::{Result, SolverError};
use crate::instance::Context;
use crate::schedule::{Schedule, ScheduleMetrics};
use crate::shipment::ShipmentRequest;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Decimal hours as `HH:MM`; hours past midnight keep counting (25:30).
pub fn format_hours(hours: f64) -> String {
    let span = chrono::Duration::minutes((hours.abs() * 60.0).round() as i64);
    let sign = if hours < 0.0 && span.num_minutes() > 0 { "-" } else { "" };
    format!("{}{:02}:{:02}", sign, span.num_hours(), span.num_minutes() % 60)
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRow {
    pub truck: usize,
    pub depot: String,
    pub truck_start: String,
    pub truck_end: String,
    pub shipment_id: String,
    pub request_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub start: String,
    pub end: String,
    pub start_location: String,
    pub end_location: String,
    #[serde(rename = "type")]
    pub tag: String,
}

pub fn schedule_rows(ctx: &Context<'_>, schedule: &Schedule) -> Vec<ShipmentRow> {
    let mut rows = Vec::with_capacity(schedule.num_shipments());
    for truck in &schedule.trucks {
        let truck_start = format_hours(truck.start_time(ctx));
        let truck_end = format_hours(truck.end_time(ctx));
        for shipment in truck.shipments() {
            rows.push(ShipmentRow {
                truck: truck.id,
                depot: ctx.name(truck.home_depot).to_string(),
                truck_start: truck_start.clone(),
                truck_end: truck_end.clone(),
                shipment_id: shipment.id.clone(),
                request_id: shipment.request_id().to_string(),
                start_time: shipment.start_time(),
                end_time: shipment.end_time(),
                start: format_hours(shipment.start_time()),
                end: format_hours(shipment.end_time()),
                start_location: ctx.name(shipment.start_location).to_string(),
                end_location: ctx.name(shipment.end_location).to_string(),
                tag: shipment.tag.clone(),
            });
        }
    }
    rows
}

pub fn write_schedule_csv<P: AsRef<Path>>(ctx: &Context<'_>, schedule: &Schedule, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SolverError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in schedule_rows(ctx, schedule) {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| SolverError::io(path, e))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct TruckReport {
    pub id: usize,
    pub depot: String,
    pub start: String,
    pub end: String,
    pub duration: f64,
    pub max_duration: f64,
    pub cost: f64,
    pub waiting_time: f64,
    pub empty_driving_time: f64,
    pub splittable: bool,
    pub efficient: bool,
    pub trip: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub instance: String,
    pub generated_at: String,
    pub metrics: ScheduleMetrics,
    pub check: CheckReport,
    pub trucks: Vec<TruckReport>,
    pub unplaced: Vec<String>,
}

pub fn build_report(
    ctx: &Context<'_>,
    instance: &str,
    requests: &[Arc<ShipmentRequest>],
    schedule: &Schedule,
) -> ScheduleReport {
    let trucks = schedule
        .trucks
        .iter()
        .map(|t| TruckReport {
            id: t.id,
            depot: ctx.name(t.home_depot).to_string(),
            start: format_hours(t.start_time(ctx)),
            end: format_hours(t.end_time(ctx)),
            duration: t.duration(ctx),
            max_duration: t.max_duration(ctx),
            cost: t.total_cost(ctx),
            waiting_time: t.waiting_time(ctx),
            empty_driving_time: t.empty_driving_time(ctx),
            splittable: t.is_splittable(ctx),
            efficient: t.is_efficient(ctx),
            trip: t.trip(ctx),
        })
        .collect();

    ScheduleReport {
        instance: instance.to_string(),
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        metrics: schedule.metrics(ctx),
        check: check_schedule(ctx, requests, schedule),
        trucks,
        unplaced: schedule.unplaced.iter().map(|r| r.id.clone()).collect(),
    }
}

pub fn write_json_report<P: AsRef<Path>>(report: &ScheduleReport, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|e| SolverError::io(path, e))
}
