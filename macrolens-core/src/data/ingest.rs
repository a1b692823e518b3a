//! Raw series ingest: sort, dedupe, window and validate provider output.
//!
//! Providers return whatever the upstream API produced. Before a series is
//! cached or aligned it must be strictly increasing by date, unique per date,
//! inside the requested window, and carry a usable close on every point.

use super::provider::DataError;
use crate::domain::PricePoint;
use chrono::NaiveDate;

/// Cleaned series plus counts of what was dropped.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub points: Vec<PricePoint>,
    pub duplicates_dropped: usize,
    pub out_of_window: usize,
    pub unusable_close: usize,
}

impl IngestResult {
    pub fn dropped(&self) -> usize {
        self.duplicates_dropped + self.out_of_window + self.unusable_close
    }
}

/// Ingest a raw series for the window `[start, end]`.
///
/// Sorting is stable, so among points sharing a date the first one delivered
/// wins. Returns `ValidationError` when nothing usable remains.
pub fn ingest(
    mut points: Vec<PricePoint>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<IngestResult, DataError> {
    let before = points.len();
    points.retain(|p| p.date >= start && p.date <= end);
    let out_of_window = before - points.len();

    let before = points.len();
    points.retain(PricePoint::has_usable_close);
    let unusable_close = before - points.len();

    points.sort_by_key(|p| p.date);
    let before = points.len();
    points.dedup_by_key(|p| p.date);
    let duplicates_dropped = before - points.len();

    if points.is_empty() {
        return Err(DataError::ValidationError(format!(
            "no usable points in window {start}..{end}"
        )));
    }

    Ok(IngestResult {
        points,
        duplicates_dropped,
        out_of_window,
        unusable_close,
    })
}
