use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use plinko_core::{
    DropOutcome, PlinkoError, PlinkoResult, RiskLevel, SeedHistoryEntry, Settings, Totals, VerifyInput,
};

pub mod client;
pub mod store;

pub use client::AdminClient;
pub use store::SqliteStore;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DropApiRequest {
    pub bet: Option<f64>,
    pub risk: Option<RiskLevel>,
    pub rows: Option<u8>,
}

impl From<DropApiRequest> for plinko_core::DropRequest {
    fn from(req: DropApiRequest) -> Self {
        Self {
            bet: req.bet,
            risk: req.risk,
            rows: req.rows,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DropResponse {
    pub outcome: DropOutcome,
    pub balance: f64,
    /// Commitment and counters for the next drop.
    pub server_seed_hash: String,
    pub nonce: u64,
    pub drop_index: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionView {
    pub balance: f64,
    pub settings: Settings,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub drop_index: u64,
    pub totals: Totals,
    pub autoplay_running: bool,
    pub digest_backend: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommitmentResponse {
    pub server_seed_hash: String,
    pub nonce: u64,
    pub drop_index: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientSeedRequest {
    pub client_seed: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AutoplayRequest {
    pub drops: u32,
    #[serde(default)]
    pub bet: Option<f64>,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub rows: Option<u8>,
    #[serde(default)]
    pub stop_on_profit: Option<f64>,
    #[serde(default)]
    pub stop_on_loss: Option<f64>,
}

impl From<AutoplayRequest> for plinko_core::AutoplayPlan {
    fn from(req: AutoplayRequest) -> Self {
        Self {
            drops: req.drops,
            request: plinko_core::DropRequest {
                bet: req.bet,
                risk: req.risk,
                rows: req.rows,
            },
            stop_on_profit: req.stop_on_profit,
            stop_on_loss: req.stop_on_loss,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AutoplayResponse {
    pub running: bool,
}

/// Verification input. Counters are taken as text (JSON numbers are
/// accepted too) and validated by the core.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyRequest {
    pub server_seed: String,
    pub client_seed: String,
    #[serde(deserialize_with = "text_or_number")]
    pub nonce: String,
    #[serde(deserialize_with = "text_or_number")]
    pub drop_index: String,
    #[serde(deserialize_with = "text_or_number")]
    pub rows: String,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub server_seed_hash: Option<String>,
}

impl VerifyRequest {
    pub fn into_input(self) -> PlinkoResult<VerifyInput> {
        let mut input = VerifyInput::parse(
            &self.server_seed,
            &self.client_seed,
            &self.nonce,
            &self.drop_index,
            &self.rows,
        )?;
        input.risk = self.risk;
        input.server_seed_hash = self.server_seed_hash;
        Ok(input)
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RotateResponse {
    pub revealed: SeedHistoryEntry,
    pub server_seed_hash: String,
}

/// One row of the drop log.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DropLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub drop_index: u64,
    pub nonce: u64,
    pub client_seed: String,
    pub server_seed_hash: String,
    pub risk: RiskLevel,
    pub rows: u8,
    pub slot: usize,
    pub multiplier: f64,
    pub bet: f64,
    pub win: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error")]
    Internal,
}

impl From<PlinkoError> for ApiError {
    fn from(err: PlinkoError) -> Self {
        match err {
            PlinkoError::Validation(_) | PlinkoError::InsufficientBalance { .. } => {
                ApiError::Invalid(err.to_string())
            }
            PlinkoError::Configuration(msg) => ApiError::Config(msg),
            PlinkoError::Persistence(_) => ApiError::Internal,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
