use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::{DimensionValue, QueryDescriptor, QueryId, WorkItem};
use crate::error::CollectorError;
use crate::fetch::{HttpSettings, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "txn-collector.json";
pub const DEFAULT_OUTPUT_DIR: &str = "data";
pub const DEFAULT_TOKEN_HEADER: &str = "token";
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_REQUEST_DELAY_SECS: u64 = 30;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const ENV_TOKEN: &str = "API_TOKEN";
pub const ENV_BASE_URL: &str = "API_BASE_URL";
pub const ENV_DIMENSIONS: &str = "API_DIMENSIONS";

pub const SCHEMA_VERSION: u32 = 1;

const MATERIAL_TRANSACTIONS: &str = "System.MaterialTransactions.List.View1";
const DEFAULT_ORDERBY: &str = "ctxn_transaction_date desc";
const DEFAULT_TAKE: u64 = 30000;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token_header: Option<String>,
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub request_delay_secs: Option<u64>,
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub dimensions: Option<Vec<String>>,
    #[serde(default)]
    pub queries: Option<Vec<QueryEntry>>,
}

/// A bare name queries the material transactions view with the default ordering and page size.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum QueryEntry {
    Shorthand(String),
    Detailed(QueryEntryObject),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryEntryObject {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub orderby: Option<String>,
    #[serde(default)]
    pub take: Option<u64>,
    #[serde(default)]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub expand_by_dimension: bool,
}

/// Values that take precedence over the config file: environment first, CLI on top.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub dimensions: Option<Vec<String>>,
    pub output_dir: Option<Utf8PathBuf>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            token: non_blank(ENV_TOKEN).map(|value| value.trim().to_string()),
            base_url: non_blank(ENV_BASE_URL).map(|value| value.trim().to_string()),
            dimensions: non_blank(ENV_DIMENSIONS).map(|value| split_list(&value)),
            output_dir: None,
        }
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Immutable settings for a whole run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub base_url: String,
    pub http: HttpSettings,
    pub output_dir: Utf8PathBuf,
    pub retry: RetryPolicy,
    pub request_delay: Duration,
    pub catalog: Vec<WorkItem>,
}

impl CollectorConfig {
    pub fn unit_count(&self) -> usize {
        self.catalog.iter().map(|item| item.units().len()).sum()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `txn-collector.json` when it exists, then applies `overrides`.
    pub fn resolve(
        path: Option<&str>,
        overrides: Overrides,
    ) -> Result<CollectorConfig, CollectorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let file = if path.is_none() && !config_path.exists() {
            ConfigFile::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| CollectorError::ConfigRead(config_path.clone()))?;
            serde_json::from_str::<ConfigFile>(&content)
                .map_err(|err| CollectorError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(file, overrides)
    }

    pub fn resolve_config(
        file: ConfigFile,
        overrides: Overrides,
    ) -> Result<CollectorConfig, CollectorError> {
        let schema_version = file.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(CollectorError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {SCHEMA_VERSION}"
            )));
        }

        let token = overrides
            .token
            .ok_or(CollectorError::MissingSetting(ENV_TOKEN))?;
        let base_url = overrides
            .base_url
            .or(file.base_url)
            .filter(|value| !value.trim().is_empty())
            .ok_or(CollectorError::MissingSetting(ENV_BASE_URL))?;
        reqwest::Url::parse(&base_url).map_err(|err| {
            CollectorError::ConfigParse(format!("invalid base URL {base_url:?}: {err}"))
        })?;

        let dimensions = overrides
            .dimensions
            .or(file.dimensions)
            .unwrap_or_default()
            .iter()
            .map(|value| value.parse::<DimensionValue>())
            .collect::<Result<Vec<_>, _>>()?;

        let entries = file.queries.unwrap_or_else(default_queries);
        let descriptors = entries
            .into_iter()
            .map(resolve_query)
            .collect::<Result<Vec<_>, _>>()?;
        let catalog = build_catalog(descriptors, &dimensions)?;

        let retry = RetryPolicy {
            max_retries: file.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            delay: Duration::from_secs(file.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS)),
        };

        Ok(CollectorConfig {
            base_url,
            http: HttpSettings {
                token_header: file
                    .token_header
                    .unwrap_or_else(|| DEFAULT_TOKEN_HEADER.to_string()),
                token,
                timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            },
            output_dir: overrides
                .output_dir
                .or(file.output_dir)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_OUTPUT_DIR)),
            retry,
            request_delay: Duration::from_secs(
                file.request_delay_secs
                    .unwrap_or(DEFAULT_REQUEST_DELAY_SECS),
            ),
            catalog,
        })
    }
}

fn resolve_query(entry: QueryEntry) -> Result<QueryDescriptor, CollectorError> {
    let entry = match entry {
        QueryEntry::Shorthand(name) => QueryEntryObject {
            name,
            endpoint: MATERIAL_TRANSACTIONS.to_string(),
            orderby: Some(DEFAULT_ORDERBY.to_string()),
            take: Some(DEFAULT_TAKE),
            params: IndexMap::new(),
            output: None,
            expand_by_dimension: false,
        },
        QueryEntry::Detailed(obj) => obj,
    };
    let id: QueryId = entry.name.parse()?;
    if entry.endpoint.trim().is_empty() {
        return Err(CollectorError::InvalidQuery(format!("{id} has an empty endpoint")));
    }
    let artifact = match entry.output {
        Some(output) => output.parse::<QueryId>()?.to_string(),
        None => id.to_string(),
    };
    Ok(QueryDescriptor {
        id,
        endpoint: entry.endpoint.trim().to_string(),
        orderby: entry.orderby,
        take: entry.take,
        params: entry.params,
        artifact,
        expand_by_dimension: entry.expand_by_dimension,
    })
}

/// Tags each descriptor and checks the catalog before any request is made.
pub fn build_catalog(
    descriptors: Vec<QueryDescriptor>,
    dimensions: &[DimensionValue],
) -> Result<Vec<WorkItem>, CollectorError> {
    let mut ids = HashSet::new();
    let mut artifacts = HashSet::new();
    let mut catalog = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if !ids.insert(descriptor.id.clone()) {
            return Err(CollectorError::InvalidQuery(format!(
                "duplicate query name {}",
                descriptor.id
            )));
        }
        if !artifacts.insert(descriptor.artifact.clone()) {
            return Err(CollectorError::InvalidQuery(format!(
                "duplicate output artifact {}",
                descriptor.artifact
            )));
        }
        let item = if descriptor.expand_by_dimension {
            if dimensions.is_empty() {
                return Err(CollectorError::MissingDimension(descriptor.id.to_string()));
            }
            WorkItem::DimensionExpanded {
                descriptor,
                values: dimensions.to_vec(),
            }
        } else {
            if descriptor.uses_placeholder() {
                return Err(CollectorError::UnexpectedPlaceholder(
                    descriptor.id.to_string(),
                ));
            }
            WorkItem::Simple { descriptor }
        };
        catalog.push(item);
    }
    Ok(catalog)
}

pub fn default_queries() -> Vec<QueryEntry> {
    let entry = |name: &str, filter: &str| {
        QueryEntry::Detailed(QueryEntryObject {
            name: name.to_string(),
            endpoint: MATERIAL_TRANSACTIONS.to_string(),
            orderby: Some(DEFAULT_ORDERBY.to_string()),
            take: Some(DEFAULT_TAKE),
            params: IndexMap::from([("where".to_string(), filter.to_string())]),
            output: None,
            expand_by_dimension: false,
        })
    };
    vec![
        entry(
            "Consulta_1",
            "ctxn_movement_type ilike '261%25%' and (ctxn_transaction_date > current_date - 120) \
             and ctxn_warehouse_code ilike '1145' and not (ctxn_primary_uom_code ilike 'Und'",
        ),
        entry(
            "Consulta_2",
            "ctxn_movement_type ilike '261%25%' and (ctxn_transaction_date > current_date - 120) \
             and ctxn_warehouse_code ilike '1145' and ctxn_primary_uom_code ilike 'Und'",
        ),
        entry(
            "Consulta_3",
            "ctxn_movement_type ilike '261%25%' and (ctxn_transaction_date > current_date - 120) \
             and ctxn_warehouse_code ilike '1290'",
        ),
    ]
}
