use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const CATALOG_BASE: &str = "https://pokeapi.co/api/v2/pokemon";
pub const CATALOG_SIZE: u32 = 890;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("catalog request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("catalog returned status {0}")]
    Status(StatusCode),
    #[error("catalog record malformed: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

pub trait CatalogService: Send + Sync {
    fn record(&self, id: u32) -> Result<RawRecord, FetchError>;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawRecord {
    pub id: i64,
    pub name: String,
    pub sprites: RawSprites,
    pub types: Vec<RawTypeSlot>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawSprites {
    pub front_default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawTypeSlot {
    #[serde(default)]
    pub slot: Option<i64>,
    #[serde(rename = "type")]
    pub kind: RawNamed,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawNamed {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: CATALOG_BASE.to_string(),
            user_agent: format!("pokedex-tui/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            http_client: None,
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        if config.user_agent.trim().is_empty() {
            anyhow::bail!("catalog client user agent required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn record_url(&self, id: u32) -> String {
        format!("{}/{}", self.base_url, id)
    }
}

impl CatalogService for Client {
    fn record(&self, id: u32) -> Result<RawRecord, FetchError> {
        let response = self
            .http
            .get(self.record_url(id))
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(FetchError::Transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.bytes().map_err(FetchError::Transport)?;
        Ok(serde_json::from_slice(&body)?)
    }
}
