use std::sync::Arc;
use tracing::{debug, info};

use super::api::{AccessLinkApi, Fetched};
use super::models::ExerciseRecord;
use crate::error::{Error, Result};

/// One transaction window and how far it has been consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    id: Option<i64>,
    references: Vec<String>,
    cursor: usize,
    listed: bool,
}

impl Transaction {
    /// Provider-allocated id; `None` until the window is opened.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Exercise locators listed for this window.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Number of locators already fetched.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.references.len() - self.cursor
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "Transaction({})", id),
            None => write!(f, "Transaction(unopened)"),
        }
    }
}

/// An exercise summary and its GPX payload, fetched in the same step.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedExercise {
    pub record: ExerciseRecord,
    /// `None` when the sport has no route.
    pub trace: Option<String>,
}

/// Drives a single transaction window end to end: open, list, fetch, commit.
pub struct TransactionClient {
    api: Arc<dyn AccessLinkApi>,
    transaction: Transaction,
}

impl TransactionClient {
    pub fn new(api: Arc<dyn AccessLinkApi>) -> Self {
        Self {
            api,
            transaction: Transaction::default(),
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }

    /// Ask the provider for a window.
    ///
    /// Once an id has been allocated it is returned again without another
    /// remote call: the provider keeps the same window until it is committed.
    pub fn open(&mut self) -> Result<Fetched<i64>> {
        if let Some(id) = self.transaction.id {
            return Ok(Fetched::Data(id));
        }

        let answer = self.api.create_transaction()?;
        if let Fetched::Data(id) = answer {
            debug!(transaction_id = id, "Opened transaction");
            self.transaction.id = Some(id);
        }
        Ok(answer)
    }

    /// List the window's exercise locators. The list may be empty.
    ///
    /// Only the first successful call asks the provider; later calls return
    /// the same list and leave the cursor where it is.
    pub fn list_references(&mut self) -> Result<&[String]> {
        let id = self
            .transaction
            .id
            .ok_or(Error::InvalidState("cannot list a transaction that was not opened"))?;

        if self.transaction.listed {
            return Ok(&self.transaction.references);
        }

        self.transaction.references = self.api.list_exercises(id)?;
        self.transaction.cursor = 0;
        self.transaction.listed = true;

        info!(
            transaction_id = id,
            exercises = self.transaction.references.len(),
            "Listed transaction"
        );
        Ok(&self.transaction.references)
    }

    pub fn fetch(&self, locator: &str) -> Result<ExerciseRecord> {
        self.api.get_exercise(locator)
    }

    /// GPX payload for `locator`, `None` when the sport carries no route.
    pub fn fetch_trace(&self, locator: &str) -> Result<Option<String>> {
        Ok(self.api.get_gpx(locator)?.into_option())
    }

    /// Tell the provider the window is consumed.
    ///
    /// On failure the window must be assumed to still be held by us.
    pub fn commit(&mut self) -> Result<()> {
        let id = self
            .transaction
            .id
            .ok_or(Error::InvalidState("cannot commit a transaction that was not opened"))?;

        self.api.commit_transaction(id)?;
        info!(
            transaction_id = id,
            fetched = self.transaction.cursor,
            listed = self.transaction.references.len(),
            "Committed transaction"
        );
        Ok(())
    }

    /// Lazily fetch the remaining exercises, one exercise + GPX pair per step.
    ///
    /// The stream starts at the current cursor and never rewinds. A failed
    /// step ends the stream without advancing, so the failed locator and
    /// everything after it are still untouched.
    pub fn records(&mut self) -> RecordStream<'_> {
        RecordStream {
            client: self,
            failed: false,
        }
    }

    fn fetch_pair(&self, locator: &str) -> Result<FetchedExercise> {
        let record = self.fetch(locator)?;
        let trace = self.fetch_trace(locator)?;
        Ok(FetchedExercise { record, trace })
    }
}

/// Single-pass stream over a transaction's exercises. See [`TransactionClient::records`].
pub struct RecordStream<'a> {
    client: &'a mut TransactionClient,
    failed: bool,
}

impl Iterator for RecordStream<'_> {
    type Item = Result<FetchedExercise>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let transaction = &self.client.transaction;
        let locator = transaction.references.get(transaction.cursor)?.clone();

        match self.client.fetch_pair(&locator) {
            Ok(exercise) => {
                self.client.transaction.cursor += 1;
                Some(Ok(exercise))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.client.transaction.remaining()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accesslink::mock::{exercise, MockAccessLink};

    fn scripted() -> Arc<MockAccessLink> {
        Arc::new(
            MockAccessLink::new()
                .with_open(Fetched::Data(123))
                .with_listing(123, &["a.com", "b.com"])
                .with_exercise("a.com", exercise(1, 123), Some("<gpx/>a"))
                .with_exercise("b.com", exercise(2, 123), Some("<gpx/>b")),
        )
    }

    #[test]
    fn test_iterates_exercise_and_trace_pairs() {
        let api = scripted();
        let mut client = TransactionClient::new(api.clone());

        assert_eq!(client.open().unwrap(), Fetched::Data(123));
        assert_eq!(client.list_references().unwrap().len(), 2);

        let fetched: Vec<FetchedExercise> = client.records().map(|r| r.unwrap()).collect();

        assert_eq!(
            fetched,
            vec![
                FetchedExercise { record: exercise(1, 123), trace: Some("<gpx/>a".to_string()) },
                FetchedExercise { record: exercise(2, 123), trace: Some("<gpx/>b".to_string()) },
            ]
        );
        assert_eq!(client.transaction().cursor(), 2);
        assert_eq!(client.records().count(), 0);
    }

    #[test]
    fn test_open_is_not_repeated_once_allocated() {
        let api = scripted();
        let mut client = TransactionClient::new(api.clone());

        client.open().unwrap();
        assert_eq!(client.open().unwrap(), Fetched::Data(123));
        assert_eq!(api.opens(), 1);
    }

    #[test]
    fn test_no_data_leaves_transaction_unopened() {
        let api = Arc::new(MockAccessLink::new().with_open(Fetched::NoContent));
        let mut client = TransactionClient::new(api);

        assert!(client.open().unwrap().is_no_content());
        assert_eq!(client.transaction().id(), None);
        assert!(matches!(client.list_references(), Err(Error::InvalidState(_))));
        assert!(matches!(client.commit(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_missing_trace_is_none() {
        let api = Arc::new(
            MockAccessLink::new()
                .with_open(Fetched::Data(7))
                .with_listing(7, &["yoga"])
                .with_exercise("yoga", exercise(9, 7), None),
        );
        let mut client = TransactionClient::new(api);
        client.open().unwrap();
        client.list_references().unwrap();

        let fetched = client.records().next().unwrap().unwrap();
        assert_eq!(fetched.trace, None);
    }

    #[test]
    fn test_partial_consumption_leaves_rest_untouched() {
        let api = scripted();
        let mut client = TransactionClient::new(api.clone());
        client.open().unwrap();
        client.list_references().unwrap();

        let first = client.records().next().unwrap().unwrap();
        assert_eq!(first.record.id, 1);
        assert_eq!(api.fetches(), vec!["a.com".to_string()]);
        assert_eq!(client.transaction().remaining(), 1);

        // A new stream resumes at the cursor rather than rewinding.
        let rest: Vec<_> = client.records().map(|r| r.unwrap().record.id).collect();
        assert_eq!(rest, vec![2]);
    }

    #[test]
    fn test_failed_fetch_ends_stream_without_advancing() {
        let api = Arc::new(
            MockAccessLink::new()
                .with_open(Fetched::Data(5))
                .with_listing(5, &["a.com", "b.com"])
                .with_exercise("a.com", exercise(1, 5), None)
                .with_exercise("b.com", exercise(2, 5), None)
                .failing_fetch("a.com"),
        );
        let mut client = TransactionClient::new(api.clone());
        client.open().unwrap();
        client.list_references().unwrap();

        let mut stream = client.records();
        assert!(matches!(stream.next(), Some(Err(Error::Remote { status: Some(500), .. }))));
        assert!(stream.next().is_none());
        assert_eq!(client.transaction().cursor(), 0);
        assert_eq!(api.fetches(), vec!["a.com".to_string()]);
        // The GPX of a failed summary is never requested.
        assert!(api.traces().is_empty());
    }

    #[test]
    fn test_relisting_keeps_cursor_and_list() {
        let api = scripted();
        let mut client = TransactionClient::new(api.clone());
        client.open().unwrap();
        client.list_references().unwrap();
        client.records().next().unwrap().unwrap();
        assert_eq!(client.transaction().cursor(), 1);

        assert_eq!(client.list_references().unwrap(), ["a.com", "b.com"]);
        assert_eq!(client.transaction().cursor(), 1);
        assert_eq!(api.lists(), vec![123]);

        let rest: Vec<_> = client.records().map(|r| r.unwrap().record.id).collect();
        assert_eq!(rest, vec![2]);
        assert_eq!(api.fetches(), vec!["a.com".to_string(), "b.com".to_string()]);
        assert_eq!(api.traces(), vec!["a.com".to_string(), "b.com".to_string()]);
    }

    #[test]
    fn test_commit_reports_window_id() {
        let api = scripted();
        let mut client = TransactionClient::new(api.clone());
        client.open().unwrap();
        client.list_references().unwrap();
        client.commit().unwrap();

        assert_eq!(api.commits(), vec![123]);
        assert_eq!(client.transaction().to_string(), "Transaction(123)");
    }
}
