//! Downstream target connectors.
//!
//! A [`TargetConnector`] answers the two probe questions of the sender
//! state machine (is the endpoint alive, does the schema exist) and ships
//! serialized payloads. Both shipping and probing go over one reqwest
//! client identifying itself as `Nagflux`.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::SendError;

const USER_AGENT: &str = "Nagflux";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// One downstream HTTP endpoint.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Name used in logs, metrics labels and pause flags.
    fn target_name(&self) -> &str;

    /// Whether the endpoint answers at all.
    async fn is_alive(&self) -> bool;

    /// Whether the database / template the records address exists.
    async fn schema_exists(&self) -> bool;

    /// Ship one newline-delimited payload.
    async fn send(&self, payload: &str) -> Result<(), SendError>;
}

fn classify_status(status: StatusCode) -> Result<(), SendError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(SendError::Rejected)
    } else {
        Err(SendError::HttpStatus { status })
    }
}

fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Connector to a line-protocol time-series database.
pub struct InfluxConnector {
    name: String,
    base_url: String,
    database: String,
    write_url: String,
    client: reqwest::Client,
}

impl InfluxConnector {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        database: impl Into<String>,
        credentials: Option<(String, String)>,
    ) -> Result<Self, reqwest::Error> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        let database = database.into();
        let mut write_url = format!("{base_url}/write?db={database}&precision=ms");
        if let Some((user, password)) = &credentials {
            write_url.push_str(&format!("&u={user}&p={password}"));
        }
        Ok(Self {
            name: name.into(),
            base_url,
            database,
            write_url,
            client: build_client()?,
        })
    }
}

#[async_trait]
impl TargetConnector for InfluxConnector {
    fn target_name(&self) -> &str {
        &self.name
    }

    async fn is_alive(&self) -> bool {
        let url = format!("{}/ping", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(target_name = %self.name, error = %error, "alive probe failed");
                false
            }
        }
    }

    async fn schema_exists(&self) -> bool {
        let url = format!("{}/query", self.base_url);
        let request = self.client.get(&url).query(&[("q", "SHOW DATABASES")]);
        match request.send().await {
            Ok(response) if response.status().is_success() => response
                .text()
                .await
                .map(|body| body.contains(&format!("\"{}\"", self.database)))
                .unwrap_or(false),
            Ok(_) | Err(_) => false,
        }
    }

    async fn send(&self, payload: &str) -> Result<(), SendError> {
        let response = self
            .client
            .post(&self.write_url)
            .body(payload.to_string())
            .send()
            .await?;
        classify_status(response.status())
    }
}

/// Connector to a document-index search engine.
pub struct ElasticConnector {
    name: String,
    base_url: String,
    index: String,
    client: reqwest::Client,
}

impl ElasticConnector {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        index: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let base_url = base_url.into();
        Ok(Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.into(),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl TargetConnector for ElasticConnector {
    fn target_name(&self) -> &str {
        &self.name
    }

    async fn is_alive(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(target_name = %self.name, error = %error, "alive probe failed");
                false
            }
        }
    }

    async fn schema_exists(&self) -> bool {
        let url = format!("{}/_template/{}", self.base_url, self.index);
        match self.client.head(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn send(&self, payload: &str) -> Result<(), SendError> {
        let url = format!("{}/_bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload.to_string())
            .send()
            .await?;
        classify_status(response.status())?;

        // A bulk request can succeed as a whole while rejecting items.
        let body: serde_json::Value = response.json().await?;
        if body
            .get("errors")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
        {
            return Err(SendError::Rejected);
        }
        Ok(())
    }
}
