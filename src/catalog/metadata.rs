use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{path_key, ImageRecord};
use crate::error::Result;

/// Batch metadata extraction for the catalog.
///
/// Implementations return one record per input path. A field missing from a
/// file leaves that column empty; it must not fail the batch.
pub trait MetadataExtractor {
    fn extract(&mut self, paths: &[PathBuf]) -> Result<Vec<ImageRecord>>;
}

/// Reads capture time, GPS position and lens from embedded EXIF.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract(&mut self, paths: &[PathBuf]) -> Result<Vec<ImageRecord>> {
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            records.push(read_exif(path)?);
        }
        debug!(files = paths.len(), "Extracted EXIF metadata");
        Ok(records)
    }
}

/// Read the catalog fields of one file. Files without EXIF yield an empty record.
pub fn read_exif(path: &Path) -> Result<ImageRecord> {
    let mut record = ImageRecord::empty(path_key(path));

    let mut bufreader = BufReader::new(File::open(path)?);
    let exif = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(path = %path.display(), "No EXIF data: {}", e);
            return Ok(record);
        }
    };

    // CreateDate, falling back to the original capture time
    record.created = exif_datetime(&exif, exif::Tag::DateTimeDigitized)
        .or_else(|| exif_datetime(&exif, exif::Tag::DateTimeOriginal));

    record.lat = gps_coordinate(&exif, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, 'S');
    record.long = gps_coordinate(&exif, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, 'W');

    if let Some(field) = exif.get_field(exif::Tag::LensModel, exif::In::PRIMARY) {
        record.lens = Some(field.display_value().to_string().trim_matches('"').to_string());
    }

    Ok(record)
}

fn exif_datetime(exif: &exif::Exif, tag: exif::Tag) -> Option<NaiveDateTime> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    let exif::Value::Ascii(ref values) = field.value else {
        return None;
    };
    let dt = exif::DateTime::from_ascii(values.first()?).ok()?;

    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?.and_hms_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
    )
}

/// Signed decimal degrees; `negative` is the hemisphere letter (S or W).
fn gps_coordinate(
    exif: &exif::Exif,
    value_tag: exif::Tag,
    ref_tag: exif::Tag,
    negative: char,
) -> Option<f64> {
    let field = exif.get_field(value_tag, exif::In::PRIMARY)?;
    let exif::Value::Rational(ref vals) = field.value else {
        return None;
    };
    if vals.len() < 3 || vals[..3].iter().any(|r| r.denom == 0) {
        return None;
    }

    let degrees = dms_to_decimal(
        vals[0].num as f64 / vals[0].denom as f64,
        vals[1].num as f64 / vals[1].denom as f64,
        vals[2].num as f64 / vals[2].denom as f64,
    );

    let hemisphere = exif
        .get_field(ref_tag, exif::In::PRIMARY)
        .map(|f| f.display_value().to_string())
        .unwrap_or_default();

    Some(if hemisphere.contains(negative) { -degrees } else { degrees })
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
