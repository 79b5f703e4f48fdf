use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::clock::Clock;
use crate::domain::UnitState;
use crate::error::CollectorError;

pub trait ApiClient {
    /// GET `url` and decode the body as JSON. A blank body decodes to `Value::Null`.
    fn get_json(&self, url: &str) -> Result<Value, CollectorError>;
}

impl<T: ApiClient + ?Sized> ApiClient for &T {
    fn get_json(&self, url: &str) -> Result<Value, CollectorError> {
        (**self).get_json(url)
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub token_header: String,
    pub token: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
}

impl HttpApiClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, CollectorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("txn-collector/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CollectorError::InvalidHeader {
                    name: USER_AGENT.to_string(),
                    message: err.to_string(),
                })?,
        );
        let name = HeaderName::from_bytes(settings.token_header.as_bytes()).map_err(|err| {
            CollectorError::InvalidHeader {
                name: settings.token_header.clone(),
                message: err.to_string(),
            }
        })?;
        let mut token =
            HeaderValue::from_str(&settings.token).map_err(|err| CollectorError::InvalidHeader {
                name: settings.token_header.clone(),
                message: err.to_string(),
            })?;
        token.set_sensitive(true);
        headers.insert(name, token);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| CollectorError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CollectorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "API request failed".to_string());
        Err(CollectorError::HttpStatus { status, message })
    }
}

impl ApiClient for HttpApiClient {
    fn get_json(&self, url: &str) -> Result<Value, CollectorError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| CollectorError::Http(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| CollectorError::Decode(err.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| CollectorError::Decode(err.to_string()))
    }
}

/// Bounded retries with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// One initial attempt plus `max_retries`, capped at `u32::MAX`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success {
        items: Vec<Map<String, Value>>,
        attempts: u32,
    },
    Empty {
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Payload(usize),
    Empty,
    Transport(String),
}

/// Diagnostic record of a single request; not kept past the executor.
#[derive(Debug, Clone)]
pub struct FetchAttempt<'a> {
    pub unit: &'a str,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

pub struct FetchExecutor<'a, C: ApiClient> {
    client: &'a C,
    policy: RetryPolicy,
    clock: &'a dyn Clock,
}

impl<'a, C: ApiClient> FetchExecutor<'a, C> {
    pub fn new(client: &'a C, policy: RetryPolicy, clock: &'a dyn Clock) -> Self {
        Self {
            client,
            policy,
            clock,
        }
    }

    /// Runs one unit to a terminal state. Only unhandled payload shapes are returned as `Err`.
    pub fn fetch(
        &self,
        url: &str,
        unit: &str,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, CollectorError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(unit, attempt, state = ?UnitState::InFlight, "dispatching request");
            sink.event(ProgressEvent::Attempt {
                unit: unit.to_string(),
                attempt,
                max_attempts,
            });

            let error = match self.client.get_json(url) {
                Ok(value) => {
                    let items = classify_payload(unit, value)?;
                    let (outcome, state) = match &items {
                        Some(items) => (AttemptOutcome::Payload(items.len()), UnitState::Success),
                        None => (AttemptOutcome::Empty, UnitState::Empty),
                    };
                    let record = FetchAttempt {
                        unit,
                        attempt,
                        outcome,
                    };
                    debug!(?record, ?state, "attempt finished");
                    return Ok(match items {
                        Some(items) => {
                            sink.event(ProgressEvent::UnitSucceeded {
                                unit: unit.to_string(),
                                records: items.len(),
                            });
                            FetchOutcome::Success {
                                items,
                                attempts: attempt,
                            }
                        }
                        None => {
                            sink.event(ProgressEvent::UnitEmpty {
                                unit: unit.to_string(),
                            });
                            FetchOutcome::Empty { attempts: attempt }
                        }
                    });
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            let record = FetchAttempt {
                unit,
                attempt,
                outcome: AttemptOutcome::Transport(error.to_string()),
            };
            warn!(?record, state = ?UnitState::Failed, "attempt failed");

            if attempt >= max_attempts {
                debug!(unit, state = ?UnitState::Exhausted, "giving up");
                sink.event(ProgressEvent::UnitExhausted {
                    unit: unit.to_string(),
                    attempts: attempt,
                    reason: error.to_string(),
                });
                return Ok(FetchOutcome::Exhausted {
                    attempts: attempt,
                    reason: error.to_string(),
                });
            }
            sink.event(ProgressEvent::RetryScheduled {
                unit: unit.to_string(),
                delay: self.policy.delay,
                reason: error.to_string(),
            });
            self.clock.sleep(self.policy.delay);
        }
    }
}

/// `Ok(None)` for an empty answer, `Ok(Some(items))` for a list of objects.
pub fn classify_payload(
    unit: &str,
    value: Value,
) -> Result<Option<Vec<Map<String, Value>>>, CollectorError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.is_empty() => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Array(items) if items.is_empty() => Ok(None),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(CollectorError::UnexpectedPayload {
                    query: unit.to_string(),
                    message: format!("item {index} is {}, expected an object", kind(&other)),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        other => Err(CollectorError::UnexpectedPayload {
            query: unit.to_string(),
            message: format!("body is {}, expected an array", kind(&other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
