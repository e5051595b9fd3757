//! HTTP broker client speaking the SQL task API.
//!
//! Submission and explain both `POST` a JSON SQL query to the task endpoint;
//! explain wraps the statement in `EXPLAIN PLAN FOR`.

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::{debug, info},
};

use cadence_config::BrokerConfig;

use crate::{
    Context, Error, Result,
    broker::{BrokerClient, SqlTaskStatus, StatementAttributes},
    types::SqlQuery,
};

/// Longest response body quoted in an error.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// One row of an explain response.
#[derive(Debug, Deserialize)]
struct ExplainRow {
    /// JSON document, usually embedded as a string.
    #[serde(rename = "ATTRIBUTES")]
    attributes: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainAttributes {
    statement_type: String,
    #[serde(default)]
    target_data_source: Option<Value>,
}

/// [`BrokerClient`] over HTTP with a per-request timeout.
pub struct HttpBrokerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBrokerClient {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::submission("failed to build broker HTTP client", e))?;
        Ok(Self {
            client,
            endpoint: join_url(&config.url, &config.task_path),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_sql<T: DeserializeOwned>(&self, query: &SqlQuery, what: &str) -> Result<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(query)
            .send()
            .await
            .map_err(|e| Error::submission(format!("{what} request to {} failed", self.endpoint), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::submission(format!("{what} response could not be read"), e))?;

        if !status.is_success() {
            return Err(Error::submission(
                format!("{what} rejected with HTTP {status}"),
                excerpt(&body),
            ));
        }

        serde_json::from_str(&body).with_context(|| format!("invalid {what} response"))
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn submit_task(&self, query: &SqlQuery) -> Result<SqlTaskStatus> {
        info!(endpoint = %self.endpoint, "submitting sql task");
        let status: SqlTaskStatus = self.post_sql(query, "task submission").await?;
        debug!(task_id = %status.task_id, state = ?status.state, "sql task submitted");
        Ok(status)
    }

    async fn explain_plan_for(&self, query: &SqlQuery) -> Result<Vec<StatementAttributes>> {
        let explain = query.explain();
        debug!(endpoint = %self.endpoint, query = %explain.query, "requesting explain plan");
        let rows: Vec<ExplainRow> = self.post_sql(&explain, "explain").await?;
        rows.into_iter().map(parse_attributes).collect()
    }
}

fn parse_attributes(row: ExplainRow) -> Result<StatementAttributes> {
    let attributes: ExplainAttributes = match row.attributes {
        Value::String(raw) => {
            serde_json::from_str(&raw).context("invalid ATTRIBUTES in explain response")?
        },
        other => serde_json::from_value(other)?,
    };
    Ok(StatementAttributes {
        statement_kind: attributes.statement_type,
        target_resource: attributes.target_data_source.and_then(target_name),
    })
}

/// Target datasource may be a plain name or a table object.
fn target_name(value: Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name),
        Value::Object(map) => ["tableName", "name"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn excerpt(body: &str) -> String {
    let mut text: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        text.push('…');
    }
    text
}
