use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use super::models::ExerciseRecord;
use crate::config::AccessLinkConfig;
use crate::error::{Error, Result};

/// Outcome of a provider call that may legitimately return nothing.
///
/// `NoContent` is a success (HTTP 204), never an error: no pending
/// transaction, or no GPX for an indoor sport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Data(T),
    NoContent,
}

impl<T> Fetched<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Fetched::Data(value) => Some(value),
            Fetched::NoContent => None,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, Fetched::NoContent)
    }
}

/// The exercise-transaction endpoints of AccessLink.
pub trait AccessLinkApi: Send + Sync {
    /// Open a transaction window. `NoContent` when there is no new data.
    fn create_transaction(&self) -> Result<Fetched<i64>>;

    /// Locators of the exercises in an open window, in provider order.
    fn list_exercises(&self, transaction_id: i64) -> Result<Vec<String>>;

    fn get_exercise(&self, locator: &str) -> Result<ExerciseRecord>;

    /// GPX payload of an exercise. `NoContent` for sports without a route.
    fn get_gpx(&self, locator: &str) -> Result<Fetched<String>>;

    /// Mark the window as consumed so the provider can release it.
    fn commit_transaction(&self, transaction_id: i64) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TransactionLocation {
    #[serde(rename = "transaction-id")]
    transaction_id: i64,
}

#[derive(Debug, Deserialize)]
struct ExerciseList {
    #[serde(default)]
    exercises: Vec<String>,
}

const JSON: &str = "application/json";
const GPX: &str = "application/gpx+xml";

/// Blocking HTTP implementation of [`AccessLinkApi`].
pub struct HttpAccessLink {
    agent: ureq::Agent,
    base_url: String,
    user_id: String,
    access_token: String,
}

impl HttpAccessLink {
    pub fn new(base_url: &str, user_id: &str, access_token: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        Self {
            agent,
            base_url: base_url.to_string(),
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    pub fn from_config(config: &AccessLinkConfig) -> Result<Self> {
        let (token, user) = config.credentials().ok_or_else(|| {
            Error::Configuration("accesslink.access_token and accesslink.user_id must be set".to_string())
        })?;

        Ok(Self::new(
            &config.base_url,
            user,
            token,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    fn transactions_url(&self) -> String {
        form_url(&[&self.base_url, "users", &self.user_id, "exercise-transactions"])
    }

    fn transaction_url(&self, transaction_id: i64) -> String {
        form_url(&[&self.transactions_url(), &transaction_id.to_string()])
    }

    fn send(&self, operation: &'static str, request: ureq::Request) -> Result<ureq::Response> {
        debug!(operation, url = request.url(), "AccessLink request");

        request
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .call()
            .map_err(|e| remote_error(operation, e))
    }
}

impl AccessLinkApi for HttpAccessLink {
    fn create_transaction(&self) -> Result<Fetched<i64>> {
        let request = self.agent.post(&self.transactions_url()).set("Accept", JSON);
        let response = self.send("open", request)?;

        if response.status() == 204 {
            return Ok(Fetched::NoContent);
        }

        let location: TransactionLocation = read_json(response)?;
        Ok(Fetched::Data(location.transaction_id))
    }

    fn list_exercises(&self, transaction_id: i64) -> Result<Vec<String>> {
        let request = self
            .agent
            .get(&self.transaction_url(transaction_id))
            .set("Accept", JSON);
        let response = self.send("list", request)?;

        if response.status() == 204 {
            return Ok(Vec::new());
        }

        let list: ExerciseList = read_json(response)?;
        Ok(list.exercises)
    }

    fn get_exercise(&self, locator: &str) -> Result<ExerciseRecord> {
        let request = self.agent.get(locator).set("Accept", JSON);
        let response = self.send("fetch", request)?;
        read_json(response)
    }

    fn get_gpx(&self, locator: &str) -> Result<Fetched<String>> {
        let request = self.agent.get(&form_url(&[locator, "gpx"])).set("Accept", GPX);
        let response = self.send("fetch trace", request)?;

        if response.status() == 204 {
            return Ok(Fetched::NoContent);
        }

        Ok(Fetched::Data(read_body(response)?))
    }

    fn commit_transaction(&self, transaction_id: i64) -> Result<()> {
        let request = self.agent.put(&self.transaction_url(transaction_id));
        self.send("commit", request)?;
        Ok(())
    }
}

/// Whole response body. `Response::into_string` caps bodies at 10 MB, which
/// a long exercise's GPX can exceed.
fn read_body(response: ureq::Response) -> Result<String> {
    let mut body = String::new();
    response.into_reader().read_to_string(&mut body)?;
    Ok(body)
}

fn read_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T> {
    Ok(serde_json::from_str(&read_body(response)?)?)
}

fn remote_error(operation: &'static str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(status, response) => Error::Remote {
            operation,
            status: Some(status),
            message: response.status_text().to_string(),
        },
        ureq::Error::Transport(transport) => Error::Remote {
            operation,
            status: None,
            message: transport.to_string(),
        },
    }
}

/// Join URL parts with single slashes, whatever slashes the parts carry.
pub(crate) fn form_url(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
