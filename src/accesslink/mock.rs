//! Scripted in-memory AccessLink used by the session and pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::NaiveDate;

use super::api::{AccessLinkApi, Fetched};
use super::models::ExerciseRecord;
use crate::error::{Error, Result};

#[derive(Default)]
struct Script {
    /// Answers to successive `create_transaction` calls. Once drained, the
    /// provider reports `fallback_open` forever.
    opens: VecDeque<Fetched<i64>>,
    fallback_open: Option<i64>,
    listings: HashMap<i64, Vec<String>>,
    exercises: HashMap<String, ExerciseRecord>,
    traces: HashMap<String, String>,
    failing_fetch: Option<String>,
    failing_commits: usize,
}

#[derive(Default)]
pub(crate) struct Calls {
    pub opens: usize,
    pub lists: Vec<i64>,
    pub fetches: Vec<String>,
    pub traces: Vec<String>,
    pub commits: Vec<i64>,
}

#[derive(Default)]
pub(crate) struct MockAccessLink {
    script: Mutex<Script>,
    pub calls: Mutex<Calls>,
}

impl MockAccessLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open succeeds with a fresh id, as a provider that never registers commits.
    pub fn endless() -> Self {
        let mock = Self::new();
        mock.script.lock().unwrap().fallback_open = Some(1000);
        mock
    }

    pub fn with_open(self, answer: Fetched<i64>) -> Self {
        self.script.lock().unwrap().opens.push_back(answer);
        self
    }

    pub fn with_listing(self, transaction_id: i64, locators: &[&str]) -> Self {
        self.script
            .lock()
            .unwrap()
            .listings
            .insert(transaction_id, locators.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_exercise(self, locator: &str, record: ExerciseRecord, trace: Option<&str>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script.exercises.insert(locator.to_string(), record);
            if let Some(trace) = trace {
                script.traces.insert(locator.to_string(), trace.to_string());
            }
        }
        self
    }

    pub fn failing_fetch(self, locator: &str) -> Self {
        self.script.lock().unwrap().failing_fetch = Some(locator.to_string());
        self
    }

    pub fn failing_commits(self, count: usize) -> Self {
        self.script.lock().unwrap().failing_commits = count;
        self
    }

    pub fn opens(&self) -> usize {
        self.calls.lock().unwrap().opens
    }

    pub fn commits(&self) -> Vec<i64> {
        self.calls.lock().unwrap().commits.clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.calls.lock().unwrap().fetches.clone()
    }

    pub fn lists(&self) -> Vec<i64> {
        self.calls.lock().unwrap().lists.clone()
    }

    pub fn traces(&self) -> Vec<String> {
        self.calls.lock().unwrap().traces.clone()
    }
}

fn status(operation: &'static str, code: u16) -> Error {
    Error::Remote {
        operation,
        status: Some(code),
        message: "scripted failure".to_string(),
    }
}

impl AccessLinkApi for MockAccessLink {
    fn create_transaction(&self) -> Result<Fetched<i64>> {
        let mut calls = self.calls.lock().unwrap();
        calls.opens += 1;

        let mut script = self.script.lock().unwrap();
        if let Some(answer) = script.opens.pop_front() {
            return Ok(answer);
        }
        match script.fallback_open {
            Some(id) => Ok(Fetched::Data(id + calls.opens as i64)),
            None => Ok(Fetched::NoContent),
        }
    }

    fn list_exercises(&self, transaction_id: i64) -> Result<Vec<String>> {
        self.calls.lock().unwrap().lists.push(transaction_id);
        let script = self.script.lock().unwrap();
        Ok(script.listings.get(&transaction_id).cloned().unwrap_or_default())
    }

    fn get_exercise(&self, locator: &str) -> Result<ExerciseRecord> {
        self.calls.lock().unwrap().fetches.push(locator.to_string());
        let script = self.script.lock().unwrap();
        if script.failing_fetch.as_deref() == Some(locator) {
            return Err(status("fetch", 500));
        }
        script
            .exercises
            .get(locator)
            .cloned()
            .ok_or_else(|| status("fetch", 404))
    }

    fn get_gpx(&self, locator: &str) -> Result<Fetched<String>> {
        self.calls.lock().unwrap().traces.push(locator.to_string());
        let script = self.script.lock().unwrap();
        Ok(match script.traces.get(locator) {
            Some(trace) => Fetched::Data(trace.clone()),
            None => Fetched::NoContent,
        })
    }

    fn commit_transaction(&self, transaction_id: i64) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        let mut script = self.script.lock().unwrap();
        if script.failing_commits > 0 {
            script.failing_commits -= 1;
            return Err(status("commit", 503));
        }
        calls.commits.push(transaction_id);
        Ok(())
    }
}

pub(crate) fn exercise(id: i64, transaction_id: i64) -> ExerciseRecord {
    ExerciseRecord {
        id,
        transaction_id,
        start_time: NaiveDate::from_ymd_opt(2023, 1, 22)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        utc_offset: 120,
        has_trace: true,
        category: "WALKING".to_string(),
    }
}
