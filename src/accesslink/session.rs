use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use super::api::{AccessLinkApi, Fetched};
use super::transaction::{Transaction, TransactionClient};
use super::DEFAULT_RETRY_LIMIT;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No window is held.
    Idle,
    /// A window is held and has not been committed yet.
    Open,
    /// The retry ceiling has been reached; no further windows are opened.
    Exhausted,
}

/// Bounds repeated transaction acquisition for one credential pair.
///
/// Every successful open counts against `retry_limit`, so a provider that
/// never registers commits cannot keep the sync looping forever.
pub struct TransactionSession {
    api: Arc<dyn AccessLinkApi>,
    retry_count: u32,
    retry_limit: u32,
    active: Option<TransactionClient>,
    committed: Vec<Transaction>,
}

impl TransactionSession {
    pub fn new(api: Arc<dyn AccessLinkApi>) -> Self {
        Self::with_retry_limit(api, DEFAULT_RETRY_LIMIT)
    }

    pub fn with_retry_limit(api: Arc<dyn AccessLinkApi>, retry_limit: u32) -> Self {
        Self {
            api,
            retry_count: 0,
            retry_limit,
            active: None,
            committed: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Open
        } else if self.retry_count >= self.retry_limit {
            SessionState::Exhausted
        } else {
            SessionState::Idle
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn active(&self) -> Option<&TransactionClient> {
        self.active.as_ref()
    }

    /// Windows committed by this session, oldest first.
    pub fn committed(&self) -> &[Transaction] {
        &self.committed
    }

    /// Start a fresh retry budget, e.g. for the next scheduled sync.
    pub fn reset_retry_budget(&mut self) {
        self.retry_count = 0;
    }

    /// Commit the active window, if any.
    ///
    /// Windows are committed even when nothing was listed or fetched: the
    /// provider keeps an uncommitted window allocated. If the commit fails
    /// the window stays active and is retried on the next call.
    pub fn commit_active(&mut self) -> Result<()> {
        let Some(mut client) = self.active.take() else {
            return Ok(());
        };

        if let Err(e) = client.commit() {
            self.active = Some(client);
            return Err(e);
        }

        self.committed.push(client.into_transaction());
        Ok(())
    }

    /// Commit whatever is active and open the next window.
    ///
    /// Returns `Ok(None)` when the provider has no more data, which is the
    /// normal end of a sync. Returns [`Error::RetryLimitExceeded`] once
    /// `retry_limit` windows have been opened.
    pub fn next_transaction(&mut self) -> Result<Option<&mut TransactionClient>> {
        self.commit_active()?;

        if self.retry_count >= self.retry_limit {
            warn!(
                limit = self.retry_limit,
                committed = self.committed.len(),
                "Transaction retry limit reached"
            );
            return Err(Error::RetryLimitExceeded {
                limit: self.retry_limit,
            });
        }

        let mut client = TransactionClient::new(Arc::clone(&self.api));
        match client.open()? {
            Fetched::NoContent => {
                info!(committed = self.committed.len(), "No new exercise data available");
                return Ok(None);
            }
            Fetched::Data(_) => self.retry_count += 1,
        }

        // Held before listing so a failed listing still gets committed later.
        let client = self.active.insert(client);
        client.list_references()?;
        Ok(Some(client))
    }

    /// Run `consume` on every window until the provider runs dry.
    ///
    /// Each window is committed after `consume` returns `Ok`; an error from
    /// `consume` stops the loop and leaves that window active.
    pub fn for_each_transaction<F>(&mut self, mut consume: F) -> Result<usize>
    where
        F: FnMut(&mut TransactionClient) -> Result<()>,
    {
        let mut processed = 0;
        while let Some(client) = self.next_transaction()? {
            consume(client)?;
            processed += 1;
        }
        Ok(processed)
    }
}

/// Identifies the credential pair a session belongs to.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    access_token: String,
    user_id: String,
}

impl SessionKey {
    pub fn new(access_token: &str, user_id: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

pub type SharedSession = Arc<Mutex<TransactionSession>>;

/// One [`TransactionSession`] per credential pair, created on first use.
///
/// Callers for the same pair get the same session and serialize on its
/// mutex; sessions for different pairs are independent.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `key`, built with `make` the first time it is asked for.
    pub fn session<F>(&self, key: SessionKey, make: F) -> SharedSession
    where
        F: FnOnce() -> TransactionSession,
    {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sessions
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(make()))),
        )
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
