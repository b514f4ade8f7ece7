//! Visualization utilities for VSPTW schedules.
//!
//! Generates an SVG timeline with one row per truck, and exports the drawn segments for
//! external plotting.

use crate::instance::Context;
use crate::schedule::Schedule;
use crate::shipment::TIME_EPS;
use crate::truck::Truck;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;
#[cfg(feature = "resvg")]
use resvg::render;
#[cfg(feature = "resvg")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "resvg")]
use resvg::usvg;
#[cfg(feature = "resvg")]
use resvg::usvg::TreeParsing;
#[cfg(feature = "resvg")]
use resvg::FitTo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    PullOut,
    Shipment,
    Empty,
    Waiting,
    PullIn,
}

impl SegmentKind {
    fn class(&self) -> &'static str {
        match self {
            SegmentKind::PullOut | SegmentKind::PullIn => "pull",
            SegmentKind::Shipment => "shipment",
            SegmentKind::Empty => "empty",
            SegmentKind::Waiting => "waiting",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SegmentKind::PullOut => "pull-out",
            SegmentKind::Shipment => "shipment",
            SegmentKind::Empty => "empty",
            SegmentKind::Waiting => "waiting",
            SegmentKind::PullIn => "pull-in",
        }
    }
}

/// One stretch of a truck's day.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start: f64,
    pub end: f64,
    /// Shipment id for shipments, empty otherwise
    pub label: String,
    /// Inbound shipments are drawn in another colour
    pub inbound: bool,
}

/// Split a truck's day into consecutive segments from pull-out to pull-in.
pub fn truck_segments(ctx: &Context<'_>, truck: &Truck) -> Vec<Segment> {
    let segment = |kind, start, end| Segment { kind, start, end, label: String::new(), inbound: false };
    let (first, last) = match (truck.first(), truck.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Vec::new(),
    };

    let mut segments = vec![segment(SegmentKind::PullOut, truck.start_time(ctx), first.start_time())];
    for (i, shipment) in truck.shipments().iter().enumerate() {
        if i > 0 {
            let previous = &truck.shipments()[i - 1];
            let arrival = previous.end_time() + ctx.drive(previous.end_location, shipment.start_location);
            if arrival - previous.end_time() > TIME_EPS {
                segments.push(segment(SegmentKind::Empty, previous.end_time(), arrival));
            }
            if shipment.start_time() - arrival > TIME_EPS {
                segments.push(segment(SegmentKind::Waiting, arrival, shipment.start_time()));
            }
        }
        segments.push(Segment {
            kind: SegmentKind::Shipment,
            start: shipment.start_time(),
            end: shipment.end_time(),
            label: shipment.id.clone(),
            inbound: shipment.tag.contains("IB"),
        });
    }
    segments.push(segment(SegmentKind::PullIn, last.end_time(), truck.end_time(ctx)));
    segments
}

/// SVG visualization generator
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Height of one truck row
    pub row_height: f64,
    /// Margin
    pub margin: f64,
    /// Room left of the time axis for truck labels
    pub label_width: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 1200.0,
            row_height: 22.0,
            margin: 40.0,
            label_width: 110.0,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn height(&self, rows: usize) -> f64 {
        2.0 * self.margin + 40.0 + rows.max(1) as f64 * self.row_height
    }

    /// Gantt-style timeline of a schedule.
    pub fn generate_timeline_svg(&self, ctx: &Context<'_>, schedule: &Schedule, title: &str) -> String {
        let height = self.height(schedule.trucks.len());
        let first_hour = schedule.trucks.iter().map(|t| t.start_time(ctx)).fold(f64::INFINITY, f64::min);
        let last_hour = schedule.trucks.iter().map(|t| t.end_time(ctx)).fold(f64::NEG_INFINITY, f64::max);
        let (first_hour, last_hour) = if first_hour.is_finite() && last_hour.is_finite() {
            (first_hour.floor(), last_hour.ceil().max(first_hour.floor() + 1.0))
        } else {
            (0.0, 24.0)
        };

        let left = self.margin + self.label_width;
        let scale = (self.width - left - self.margin) / (last_hour - first_hour);
        let x = |hour: f64| left + (hour - first_hour) * scale;
        let top = self.margin + 30.0;

        let mut svg = String::new();
        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .shipment {{ fill: #3498db; stroke: #2c3e50; stroke-width: 1; }}
    .inbound {{ fill: #2ecc71; stroke: #27ae60; stroke-width: 1; }}
    .pull {{ fill: #95a5a6; }}
    .empty {{ fill: #e67e22; }}
    .waiting {{ fill: #f5b7b1; }}
    .grid {{ stroke: #bdc3c7; stroke-width: 1; }}
    .label {{ font-family: Arial; font-size: 10px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width, height, self.width, height
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">{} | {} | Cost: {:.2} | Trucks: {} | Unplaced: {}</text>
"##,
            self.margin,
            title,
            schedule.algorithm,
            schedule.total_cost(ctx),
            schedule.num_trucks(),
            schedule.unplaced.len()
        ));

        let bottom = top + schedule.trucks.len().max(1) as f64 * self.row_height;
        let mut hour = first_hour;
        while hour <= last_hour + TIME_EPS {
            svg.push_str(&format!(
                r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="grid"/>
<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                x(hour),
                top - 5.0,
                x(hour),
                bottom,
                x(hour),
                top - 10.0,
                hour
            ));
            hour += 1.0;
        }

        for (row, truck) in schedule.trucks.iter().enumerate() {
            let y = top + row as f64 * self.row_height;
            let bar = self.row_height * 0.7;
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label">{} @ {}</text>
"##,
                self.margin,
                y + bar,
                truck.id,
                ctx.name(truck.home_depot)
            ));

            for segment in truck_segments(ctx, truck) {
                let class = if segment.kind == SegmentKind::Shipment && segment.inbound {
                    "inbound"
                } else {
                    segment.kind.class()
                };
                let (height, offset) = match segment.kind {
                    SegmentKind::Shipment => (bar, 0.0),
                    _ => (bar / 3.0, bar / 3.0),
                };
                svg.push_str(&format!(
                    r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" class="{}"><title>{} {} {:.2}-{:.2}</title></rect>
"##,
                    x(segment.start),
                    y + offset,
                    ((segment.end - segment.start) * scale).max(0.5),
                    height,
                    class,
                    segment.kind.label(),
                    segment.label,
                    segment.start,
                    segment.end
                ));
            }
        }

        svg.push_str("</svg>\n");
        svg
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Save SVG as PNG, natively with the `resvg` feature, otherwise through an external
    /// converter: `rsvg-convert`, then `magick convert`, then `inkscape`.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        #[cfg(feature = "resvg")]
        {
            let opt = usvg::Options::default();
            let rtree = usvg::Tree::from_str(svg, &opt)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("usvg parse error: {}", e)))?;
            let width = self.width as u32;
            let height = svg
                .split_once("height=\"")
                .and_then(|(_, rest)| rest.split_once('"'))
                .and_then(|(value, _)| value.parse::<f64>().ok())
                .unwrap_or(800.0) as u32;
            let mut pixmap = Pixmap::new(width.max(1), height.max(1))
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "Failed to create pixmap"))?;
            render(&rtree, FitTo::Original, Transform::default(), pixmap.as_mut())
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "resvg render failed"))?;
            pixmap
                .save_png(path)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("save_png failed: {}", e)))?;
            return Ok(());
        }

        Self::convert_externally(svg, path)
    }

    fn convert_externally(svg: &str, path: &Path) -> std::io::Result<()> {
        let tmp_svg = path.with_extension("svg.tmp");
        {
            let mut f = File::create(&tmp_svg)?;
            f.write_all(svg.as_bytes())?;
        }
        let input = tmp_svg.to_string_lossy().to_string();
        let output = path.to_string_lossy().to_string();

        let attempts: [(&str, Vec<&str>); 3] = [
            ("rsvg-convert", vec!["-o", output.as_str(), input.as_str()]),
            ("magick", vec!["convert", input.as_str(), output.as_str()]),
            ("inkscape", vec![input.as_str(), "--export-type=png", "--export-filename", output.as_str()]),
        ];
        for (program, args) in attempts.iter() {
            if let Ok(status) = Command::new(program).args(args).status() {
                if status.success() {
                    let _ = std::fs::remove_file(&tmp_svg);
                    return Ok(());
                }
            }
            log::debug!("{} could not convert {}", program, input);
        }

        let _ = std::fs::remove_file(&tmp_svg);
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "No SVG->PNG converter succeeded (tried resvg, rsvg-convert, magick, inkscape)",
        ))
    }

    /// Export the timeline segments as CSV text for external plotting.
    pub fn export_plot_data(&self, ctx: &Context<'_>, schedule: &Schedule) -> String {
        let mut data = String::from("truck,depot,kind,start,end,label\n");
        for truck in &schedule.trucks {
            for segment in truck_segments(ctx, truck) {
                data.push_str(&format!(
                    "{},{},{},{:.4},{:.4},{}\n",
                    truck.id,
                    ctx.name(truck.home_depot),
                    segment.kind.label(),
                    segment.start,
                    segment.end,
                    segment.label
                ));
            }
        }
        data
    }
}
