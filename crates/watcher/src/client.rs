//! Blocking-query list calls against the Nomad HTTP API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::NomadConfig;
use crate::error::WatchError;

/// The list endpoints the watchers poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Allocations,
    Evaluations,
    Jobs,
    Nodes,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Allocations => "allocations",
            Endpoint::Evaluations => "evaluations",
            Endpoint::Jobs => "jobs",
            Endpoint::Nodes => "nodes",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Endpoint::Allocations => "/v1/allocations",
            Endpoint::Evaluations => "/v1/evaluations",
            Endpoint::Jobs => "/v1/jobs",
            Endpoint::Nodes => "/v1/nodes",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One response of a list endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub items: Vec<Value>,
    /// Raft index the listing reflects (`X-Nomad-Index`).
    pub index: u64,
}

/// A list endpoint that supports blocking queries.
#[async_trait]
pub trait ListApi: Send + Sync {
    /// Return once the endpoint's index exceeds `index`, or after `wait`.
    async fn list(&self, endpoint: Endpoint, index: u64, wait: Duration) -> Result<Listing, WatchError>;
}

/// reqwest-backed Nomad client.
#[derive(Debug, Clone)]
pub struct NomadClient {
    config: NomadConfig,
    client: reqwest::Client,
}

impl NomadClient {
    pub fn new(config: NomadConfig, wait: Duration) -> Result<Self, WatchError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(NomadConfig::request_timeout(wait))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ListApi for NomadClient {
    async fn list(&self, endpoint: Endpoint, index: u64, wait: Duration) -> Result<Listing, WatchError> {
        let url = format!("{}{}", self.config.address.trim_end_matches('/'), endpoint.path());

        let mut query: Vec<(&str, String)> = vec![
            ("index", index.to_string()),
            ("wait", format!("{}s", wait.as_secs().max(1))),
        ];
        if let Some(region) = &self.config.region {
            query.push(("region", region.clone()));
        }
        if let Some(namespace) = &self.config.namespace {
            query.push(("namespace", namespace.clone()));
        }

        let mut request = self.client.get(&url).query(&query);
        if let Some(token) = &self.config.token {
            request = request.header("X-Nomad-Token", token);
        }

        debug!(endpoint = %endpoint, index, "blocking query");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WatchError::Status {
                endpoint: endpoint.as_str(),
                status: status.as_u16(),
                body,
            });
        }

        let new_index = response
            .headers()
            .get("X-Nomad-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or(WatchError::Index(endpoint.as_str()))?;

        let items: Vec<Value> = response.json().await?;
        Ok(Listing {
            items,
            index: new_index,
        })
    }
}
