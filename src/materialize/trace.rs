//! GPX trace parsing into per-point rows.
//!
//! Track points are read straight from the XML event stream so each `<time>`
//! keeps the offset it was written with.

use chrono::{DateTime, NaiveDateTime, Timelike};
use rusqlite::types::ToSql;
use rusqlite::Row;
use tracing::debug;
use xml::reader::{EventReader, XmlEvent};

use crate::error::{Error, Result};
use crate::store::TableRow;

/// One GPS fix of an exercise route.
///
/// `time` is the wall-clock time of the fix as written in the GPX, truncated
/// to whole seconds, with its offset dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct TracePoint {
    pub record_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub time: NaiveDateTime,
}

impl TableRow for TracePoint {
    const TABLE: &'static str = "trace_points";
    const COLUMNS: &'static [&'static str] = &["record_id", "latitude", "longitude", "time"];
    // Two exercises can share a timestamp (e.g. a multisport split), so the
    // key includes the owning exercise.
    const KEY: &'static [&'static str] = &["record_id", "time"];
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS trace_points (
            record_id INTEGER NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            time TEXT NOT NULL,
            PRIMARY KEY (record_id, time)
        );
        CREATE INDEX IF NOT EXISTS idx_trace_points_time ON trace_points(time);
    "#;

    fn to_params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.record_id as &dyn ToSql,
            &self.latitude as &dyn ToSql,
            &self.longitude as &dyn ToSql,
            &self.time as &dyn ToSql,
        ]
    }

    fn key_params(&self) -> Vec<&dyn ToSql> {
        vec![&self.record_id as &dyn ToSql, &self.time as &dyn ToSql]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record_id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            time: row.get(3)?,
        })
    }
}

/// A `<trkpt>` being read.
struct OpenPoint {
    latitude: f64,
    longitude: f64,
    time: String,
}

/// Flatten a GPX document's tracks and segments into points owned by `record_id`.
///
/// Points without a usable timestamp cannot be matched to photos and are
/// skipped. Routes (`<rte>`) and waypoints are ignored.
pub fn parse_trace(payload: &str, record_id: i64) -> Result<Vec<TracePoint>> {
    let mut path: Vec<String> = Vec::new();
    let mut open: Option<OpenPoint> = None;
    let mut seen_root = false;
    let mut points = Vec::new();
    let mut untimed = 0;

    for event in EventReader::new(payload.as_bytes()) {
        match event.map_err(|e| Error::Trace(e.to_string()))? {
            XmlEvent::StartElement { name, attributes, .. } => {
                if path.is_empty() {
                    if name.local_name != "gpx" {
                        return Err(Error::Trace(format!(
                            "expected a <gpx> document, found <{}>",
                            name.local_name
                        )));
                    }
                    seen_root = true;
                }
                path.push(name.local_name);

                if in_track_point(&path) {
                    let coordinate = |key: &str| -> Result<f64> {
                        attributes
                            .iter()
                            .find(|a| a.name.local_name == key)
                            .and_then(|a| a.value.trim().parse().ok())
                            .ok_or_else(|| Error::Trace(format!("trkpt without a valid {key}")))
                    };
                    open = Some(OpenPoint {
                        latitude: coordinate("lat")?,
                        longitude: coordinate("lon")?,
                        time: String::new(),
                    });
                }
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                if let (Some(point), Some("time")) = (open.as_mut(), path.last().map(String::as_str)) {
                    if path.len() >= 2 && in_track_point(&path[..path.len() - 1]) {
                        point.time.push_str(&text);
                    }
                }
            }
            XmlEvent::EndElement { .. } => {
                if in_track_point(&path) {
                    if let Some(point) = open.take() {
                        match wall_clock(point.time.trim()) {
                            Some(time) => points.push(TracePoint {
                                record_id,
                                latitude: point.latitude,
                                longitude: point.longitude,
                                time,
                            }),
                            None => untimed += 1,
                        }
                    }
                }
                path.pop();
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(Error::Trace("empty GPX document".to_string()));
    }
    if untimed > 0 {
        debug!(record_id, untimed, "Skipped GPX points without a timestamp");
    }
    Ok(points)
}

fn in_track_point(path: &[String]) -> bool {
    matches!(
        path,
        [.., trk, seg, pt] if trk == "trk" && seg == "trkseg" && pt == "trkpt"
    )
}

/// Wall-clock time of an xsd:dateTime as written, at whole-second precision.
///
/// The offset, if any, is discarded rather than applied.
fn wall_clock(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    let local = match DateTime::parse_from_rfc3339(text) {
        Ok(dt) => dt.naive_local(),
        Err(_) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?,
    };
    local.with_nanosecond(0)
}
