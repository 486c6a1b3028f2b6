use rusqlite::types::ToSql;
use rusqlite::Row;
use std::path::PathBuf;
use tracing::{info, warn};

use super::trace::{parse_trace, TracePoint};
use crate::accesslink::{ExerciseRecord, FetchedExercise, TransactionSession};
use crate::error::Result;
use crate::store::{TabularStore, TableRow};

impl TableRow for ExerciseRecord {
    const TABLE: &'static str = "exercises";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "transaction_id",
        "start_time",
        "utc_offset",
        "has_trace",
        "category",
    ];
    const KEY: &'static [&'static str] = &["id"];
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY,
            transaction_id INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            utc_offset INTEGER NOT NULL,
            has_trace INTEGER NOT NULL,
            category TEXT NOT NULL
        );
    "#;

    fn to_params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.id as &dyn ToSql,
            &self.transaction_id as &dyn ToSql,
            &self.start_time as &dyn ToSql,
            &self.utc_offset as &dyn ToSql,
            &self.has_trace as &dyn ToSql,
            &self.category as &dyn ToSql,
        ]
    }

    fn key_params(&self) -> Vec<&dyn ToSql> {
        vec![&self.id as &dyn ToSql]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            start_time: row.get(2)?,
            utc_offset: row.get(3)?,
            has_trace: row.get(4)?,
            category: row.get(5)?,
        })
    }
}

/// Stages exercises and their route points into the two exercise tables.
pub struct ExerciseMaterializer {
    records: TabularStore<ExerciseRecord>,
    points: TabularStore<TracePoint>,
}

impl ExerciseMaterializer {
    pub fn new(records_path: impl Into<PathBuf>, points_path: impl Into<PathBuf>) -> Self {
        Self {
            records: TabularStore::new(records_path),
            points: TabularStore::new(points_path),
        }
    }

    pub fn records(&self) -> &TabularStore<ExerciseRecord> {
        &self.records
    }

    pub fn points(&self) -> &TabularStore<TracePoint> {
        &self.points
    }

    /// Stage one exercise and its parsed trace. Returns the number of points staged.
    pub fn add(&mut self, exercise: &FetchedExercise) -> Result<usize> {
        let points = match exercise.trace.as_deref() {
            Some(payload) => parse_trace(payload, exercise.record.id)?,
            None => Vec::new(),
        };
        let staged = points.len();

        self.records.stage(exercise.record.clone());
        self.points.stage_all(points);
        Ok(staged)
    }

    /// Persist everything staged. Returns rows added as `(exercises, points)`.
    pub fn flush(&mut self) -> Result<(usize, usize)> {
        let records = self.records.flush()?;
        let points = self.points.flush()?;
        Ok((records, points))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExerciseSyncReport {
    pub transactions: usize,
    pub exercises_fetched: usize,
    pub exercises_added: usize,
    pub points_added: usize,
}

/// Pull every pending exercise through `session` into `sink`.
///
/// Each window is flushed to disk before the session commits it, since a
/// committed window cannot be fetched again.
pub fn sync_exercises(
    session: &mut TransactionSession,
    sink: &mut ExerciseMaterializer,
) -> Result<ExerciseSyncReport> {
    let mut report = ExerciseSyncReport::default();

    let outcome = session.for_each_transaction(|client| {
        for item in client.records() {
            let exercise = item?;
            sink.add(&exercise)?;
            report.exercises_fetched += 1;
        }

        let (exercises, points) = sink.flush()?;
        report.exercises_added += exercises;
        report.points_added += points;
        report.transactions += 1;
        Ok(())
    });

    match outcome {
        Ok(_) => {
            info!(
                transactions = report.transactions,
                fetched = report.exercises_fetched,
                exercises = report.exercises_added,
                points = report.points_added,
                "Exercise sync complete"
            );
            Ok(report)
        }
        Err(e) => {
            warn!(
                transactions = report.transactions,
                exercises = report.exercises_added,
                points = report.points_added,
                "Exercise sync stopped early: {}",
                e
            );
            Err(e)
        }
    }
}
