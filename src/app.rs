use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::config::CollectorConfig;
use crate::domain::{Record, UnitState, WorkItem};
use crate::enrich::enrich;
use crate::error::CollectorError;
use crate::fetch::{ApiClient, FetchExecutor, FetchOutcome};
use crate::store::{ArtifactReport, ArtifactStore};
use crate::throttle::Throttle;
use crate::url_builder::build_url;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Success { records: usize },
    Empty,
    Exhausted { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: String,
    pub dimension: Option<String>,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub units: Vec<UnitReport>,
    pub records: usize,
    pub artifact: Option<ArtifactReport>,
    pub persist_error: Option<String>,
}

impl QueryReport {
    pub fn failed(&self) -> bool {
        self.persist_error.is_some()
            || self
                .units
                .iter()
                .any(|unit| matches!(unit.status, UnitStatus::Exhausted { .. }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub queries: Vec<QueryReport>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.queries.iter().any(QueryReport::failed)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactReport> {
        self.queries.iter().filter_map(|query| query.artifact.as_ref())
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted { queries: usize, units: usize },
    UnitStarted { unit: String },
    Throttle { delay: Duration },
    Attempt { unit: String, attempt: u32, max_attempts: u32 },
    RetryScheduled { unit: String, delay: Duration, reason: String },
    UnitSucceeded { unit: String, records: usize },
    UnitEmpty { unit: String },
    UnitExhausted { unit: String, attempts: u32, reason: String },
    ArtifactWritten(ArtifactReport),
    ArtifactSkipped { query: String },
    ArtifactFailed { query: String, reason: String },
    RunFailed { reason: String },
    RunFinished { elapsed: Duration },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::RunStarted { queries, units } => {
                write!(f, "🚀 starting collection: {queries} queries, {units} units")
            }
            ProgressEvent::UnitStarted { unit } => write!(f, "🔍 {unit}"),
            ProgressEvent::Throttle { delay } => {
                write!(f, "⏳ pausing {}s between queries", delay.as_secs())
            }
            ProgressEvent::Attempt {
                unit,
                attempt,
                max_attempts,
            } => write!(f, "ℹ️  querying {unit} (attempt {attempt}/{max_attempts})"),
            ProgressEvent::RetryScheduled {
                unit,
                delay,
                reason,
            } => write!(
                f,
                "⏳ {unit} failed ({reason}); retrying in {}s",
                delay.as_secs()
            ),
            ProgressEvent::UnitSucceeded { unit, records } => {
                write!(f, "✅ {unit} - {records} records fetched")
            }
            ProgressEvent::UnitEmpty { unit } => write!(f, "⚠️  {unit} returned no data"),
            ProgressEvent::UnitExhausted {
                unit,
                attempts,
                reason,
            } => write!(f, "❌ {unit} failed after {attempts} attempts: {reason}"),
            ProgressEvent::ArtifactWritten(report) => write!(
                f,
                "💾 {} - {} records ({:.2} MB)",
                report.path,
                report.records,
                report.megabytes()
            ),
            ProgressEvent::ArtifactSkipped { query } => {
                write!(f, "➖ {query}: no records, no artifact written")
            }
            ProgressEvent::ArtifactFailed { query, reason } => {
                write!(f, "❌ could not save {query}: {reason}")
            }
            ProgressEvent::RunFailed { reason } => write!(f, "💥 run aborted: {reason}"),
            ProgressEvent::RunFinished { elapsed } => {
                write!(f, "⌛ finished in {:.2} seconds", elapsed.as_secs_f64())
            }
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Emits `RunFinished` when dropped, so the duration is reported on every exit path.
struct RunTimer<'a> {
    started: Instant,
    sink: &'a dyn ProgressSink,
}

impl<'a> RunTimer<'a> {
    fn start(sink: &'a dyn ProgressSink) -> Self {
        Self {
            started: Instant::now(),
            sink,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for RunTimer<'_> {
    fn drop(&mut self) {
        self.sink.event(ProgressEvent::RunFinished {
            elapsed: self.started.elapsed(),
        });
    }
}

/// Every unit's label and request URL, in run order, without touching the network.
pub fn plan_urls(config: &CollectorConfig) -> Result<Vec<(String, String)>, CollectorError> {
    config
        .catalog
        .iter()
        .flat_map(|item| item.units())
        .map(|unit| {
            build_url(&config.base_url, unit.descriptor, unit.dimension)
                .map(|url| (unit.label(), url))
        })
        .collect()
}

pub struct Collector<C: ApiClient, K: Clock> {
    config: CollectorConfig,
    client: C,
    clock: K,
    store: ArtifactStore,
}

impl<C: ApiClient, K: Clock> Collector<C, K> {
    pub fn new(config: CollectorConfig, client: C, clock: K) -> Self {
        let store = ArtifactStore::new(config.output_dir.clone());
        Self {
            config,
            client,
            clock,
            store,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Runs every work item in catalog order. Unit and artifact failures are
    /// recorded in the report; only unhandled errors end the run early.
    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunReport, CollectorError> {
        let timer = RunTimer::start(sink);
        sink.event(ProgressEvent::RunStarted {
            queries: self.config.catalog.len(),
            units: self.config.unit_count(),
        });

        let executor = FetchExecutor::new(&self.client, self.config.retry, &self.clock);
        let mut throttle = Throttle::new(self.config.request_delay);
        let mut queries = Vec::with_capacity(self.config.catalog.len());
        for item in &self.config.catalog {
            match self.run_item(item, &executor, &mut throttle, sink) {
                Ok(report) => queries.push(report),
                Err(err) => {
                    sink.event(ProgressEvent::RunFailed {
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
            }
        }

        Ok(RunReport {
            queries,
            elapsed_secs: timer.elapsed().as_secs_f64(),
        })
    }

    fn run_item(
        &self,
        item: &WorkItem,
        executor: &FetchExecutor<'_, C>,
        throttle: &mut Throttle,
        sink: &dyn ProgressSink,
    ) -> Result<QueryReport, CollectorError> {
        let descriptor = item.descriptor();
        let mut records: Vec<Record> = Vec::new();
        let mut units = Vec::new();

        for unit in item.units() {
            throttle.pace(&self.clock, sink);
            let label = unit.label();
            sink.event(ProgressEvent::UnitStarted {
                unit: label.clone(),
            });
            let url = build_url(&self.config.base_url, unit.descriptor, unit.dimension)?;
            debug!(unit = %label, %url, state = ?UnitState::Pending, "built request url");

            let (attempts, status) = match executor.fetch(&url, &label, sink)? {
                FetchOutcome::Success { items, attempts } => {
                    let count = items.len();
                    records.extend(enrich(items, &descriptor.id, &self.clock));
                    (attempts, UnitStatus::Success { records: count })
                }
                FetchOutcome::Empty { attempts } => (attempts, UnitStatus::Empty),
                FetchOutcome::Exhausted { attempts, reason } => {
                    (attempts, UnitStatus::Exhausted { reason })
                }
            };
            units.push(UnitReport {
                unit: label,
                dimension: unit.dimension.map(|value| value.to_string()),
                attempts,
                status,
            });
        }

        let (artifact, persist_error) = self.persist(&descriptor.artifact, &records, sink);
        Ok(QueryReport {
            query: descriptor.id.to_string(),
            units,
            records: records.len(),
            artifact,
            persist_error,
        })
    }

    fn persist(
        &self,
        name: &str,
        records: &[Record],
        sink: &dyn ProgressSink,
    ) -> (Option<ArtifactReport>, Option<String>) {
        match self.store.write(name, records) {
            Ok(Some(report)) => {
                sink.event(ProgressEvent::ArtifactWritten(report.clone()));
                (Some(report), None)
            }
            Ok(None) => {
                sink.event(ProgressEvent::ArtifactSkipped {
                    query: name.to_string(),
                });
                (None, None)
            }
            Err(err) => {
                sink.event(ProgressEvent::ArtifactFailed {
                    query: name.to_string(),
                    reason: err.to_string(),
                });
                (None, Some(err.to_string()))
            }
        }
    }
}
