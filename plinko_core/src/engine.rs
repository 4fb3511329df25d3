use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commitment::verify_commitment;
use crate::digest::{select_digester, DigestPreference, Digester};
use crate::error::{PlinkoError, PlinkoResult};
use crate::paytable::{Paytable, RiskLevel};
use crate::resolver::{resolve, Direction, Resolution};
use crate::rng::DropSeeds;
use crate::state::GameState;

pub struct EngineParams {
    pub paytable: Paytable,
    pub digester: Box<dyn Digester>,
}

impl EngineParams {
    pub fn new(paytable: Paytable, digester: Box<dyn Digester>) -> Self {
        Self { paytable, digester }
    }

    /// Built-in tables and the probed digest backend.
    pub fn standard() -> PlinkoResult<Self> {
        Ok(Self::new(
            Paytable::standard()?,
            select_digester(DigestPreference::Auto),
        ))
    }
}

/// Per-drop overrides; anything left `None` comes from the session settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropRequest {
    pub bet: Option<f64>,
    pub risk: Option<RiskLevel>,
    pub rows: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOutcome {
    pub drop_index: u64,
    pub nonce: u64,
    pub risk: RiskLevel,
    pub rows: u8,
    pub slot: usize,
    pub multiplier: f64,
    pub bet: f64,
    pub win: f64,
    pub path: Vec<Direction>,
    pub client_seed: String,
    pub server_seed_hash: String,
    pub played_at: DateTime<Utc>,
}

pub fn validate_bet(bet: f64, balance: f64) -> PlinkoResult<()> {
    if !bet.is_finite() || bet <= 0.0 {
        return Err(PlinkoError::Validation(format!(
            "bet must be a positive amount, got {bet}"
        )));
    }
    if bet > balance {
        return Err(PlinkoError::InsufficientBalance { balance, bet });
    }
    Ok(())
}

/// Resolve a drop from explicit seeds and price it.
pub fn drop_with_seeds(
    seeds: &DropSeeds,
    params: &EngineParams,
    risk: RiskLevel,
    rows: u8,
) -> PlinkoResult<(Resolution, f64)> {
    params.paytable.table(risk, rows)?;
    let resolution = resolve(params.digester.as_ref(), seeds, rows);
    let multiplier = params.paytable.payout(risk, rows, resolution.slot)?;
    Ok((resolution, multiplier))
}

/// Plays one drop against the session. Every check runs before any state
/// changes, so an error leaves balance, counters and history untouched.
pub fn drop_once(
    state: &mut GameState,
    params: &EngineParams,
    request: &DropRequest,
) -> PlinkoResult<DropOutcome> {
    let risk = request.risk.unwrap_or(state.settings.risk);
    let rows = request.rows.unwrap_or(state.settings.rows);
    let bet = request.bet.unwrap_or(state.settings.bet);

    params.paytable.table(risk, rows)?;
    validate_bet(bet, state.balance)?;

    let seeds = state.seeds.snapshot();
    let (resolution, multiplier) = drop_with_seeds(&seeds, params, risk, rows)?;
    state.seeds.advance(&seeds)?;

    let win = bet * multiplier;
    state.balance += win - bet;

    let outcome = DropOutcome {
        drop_index: seeds.drop_index,
        nonce: seeds.nonce,
        risk,
        rows,
        slot: resolution.slot,
        multiplier,
        bet,
        win,
        path: resolution.path,
        client_seed: seeds.client_seed,
        server_seed_hash: state.seeds.server_seed_hash().to_string(),
        played_at: Utc::now(),
    };
    debug!(
        drop_index = outcome.drop_index,
        nonce = outcome.nonce,
        slot = outcome.slot,
        multiplier = outcome.multiplier,
        "drop resolved"
    );
    state.record(outcome.clone());
    Ok(outcome)
}

/// A drop to recompute from revealed material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyInput {
    pub seeds: DropSeeds,
    pub rows: u8,
    /// Look up the multiplier too.
    pub risk: Option<RiskLevel>,
    /// Check the revealed seed against this commitment too.
    pub server_seed_hash: Option<String>,
}

impl VerifyInput {
    pub fn new(seeds: DropSeeds, rows: u8) -> Self {
        Self {
            seeds,
            rows,
            risk: None,
            server_seed_hash: None,
        }
    }

    /// Builds input from untrusted text fields.
    pub fn parse(
        server_seed: &str,
        client_seed: &str,
        nonce: &str,
        drop_index: &str,
        rows: &str,
    ) -> PlinkoResult<Self> {
        let nonce = parse_counter("nonce", nonce)?;
        let drop_index = parse_counter("drop index", drop_index)?;
        let rows: u8 = rows
            .trim()
            .parse()
            .map_err(|_| PlinkoError::Validation(format!("rows must be a number, got '{rows}'")))?;
        Ok(Self::new(
            DropSeeds::new(server_seed, client_seed, nonce, drop_index),
            rows,
        ))
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn with_commitment(mut self, server_seed_hash: impl Into<String>) -> Self {
        self.server_seed_hash = Some(server_seed_hash.into());
        self
    }
}

fn parse_counter(name: &str, raw: &str) -> PlinkoResult<u64> {
    raw.trim().parse().map_err(|_| {
        PlinkoError::Validation(format!(
            "{name} must be a non-negative integer, got '{raw}'"
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub slot: usize,
    pub path: Vec<Direction>,
    pub multiplier: Option<f64>,
    pub server_seed_hash: String,
    pub commitment_matches: Option<bool>,
}

/// Read-only recomputation of a drop.
pub fn verify_drop(params: &EngineParams, input: &VerifyInput) -> PlinkoResult<Verification> {
    if input.rows == 0 {
        return Err(PlinkoError::Validation("rows must be at least 1".into()));
    }
    let resolution = resolve(params.digester.as_ref(), &input.seeds, input.rows);
    let multiplier = match input.risk {
        Some(risk) => Some(params.paytable.payout(risk, input.rows, resolution.slot)?),
        None => None,
    };
    let commitment_matches = input
        .server_seed_hash
        .as_deref()
        .map(|hash| verify_commitment(&input.seeds.server_seed, hash));

    Ok(Verification {
        slot: resolution.slot,
        path: resolution.path,
        multiplier,
        server_seed_hash: input.seeds.server_seed_hash_hex(),
        commitment_matches,
    })
}

/// Does a recorded outcome replay exactly under its revealed server seed?
pub fn verify_outcome(params: &EngineParams, outcome: &DropOutcome, server_seed: &str) -> bool {
    if !verify_commitment(server_seed, &outcome.server_seed_hash) {
        return false;
    }
    let seeds = DropSeeds::new(
        server_seed,
        outcome.client_seed.as_str(),
        outcome.nonce,
        outcome.drop_index,
    );
    match drop_with_seeds(&seeds, params, outcome.risk, outcome.rows) {
        Ok((resolution, multiplier)) => {
            resolution.slot == outcome.slot
                && resolution.path == outcome.path
                && multiplier == outcome.multiplier
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::SoftwareDigester;
    use crate::seeds::{RngSeedSource, SeedSource};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> EngineParams {
        EngineParams::new(Paytable::standard().unwrap(), Box::new(SoftwareDigester))
    }

    fn state() -> GameState {
        let source: Box<dyn SeedSource> = Box::new(RngSeedSource(StdRng::seed_from_u64(1)));
        GameState::new(source)
    }

    #[test]
    fn test_drop_deterministic() {
        let params = params();
        let seeds = DropSeeds::new("server", "client", 1, 1);
        let a = drop_with_seeds(&seeds, &params, RiskLevel::Medium, 12).unwrap();
        let b = drop_with_seeds(&seeds, &params, RiskLevel::Medium, 12).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_drop_settles_balance_and_counters() {
        let params = params();
        let mut state = state();
        let out = drop_once(&mut state, &params, &DropRequest::default()).unwrap();
        assert_eq!((out.nonce, out.drop_index), (0, 0));
        assert_eq!(out.win, out.bet * out.multiplier);
        assert!((state.balance - (1000.0 + out.win - out.bet)).abs() < 1e-9);
        assert_eq!((state.seeds.nonce(), state.seeds.drop_index()), (1, 1));
        assert_eq!(state.history.front(), Some(&out));
        assert_eq!(state.totals.drops, 1);
    }

    #[test]
    fn test_failed_drop_is_noop() {
        let params = params();
        let mut state = state();
        let before = state.to_saved();

        let missing_table = DropRequest {
            rows: Some(20),
            ..DropRequest::default()
        };
        assert!(matches!(
            drop_once(&mut state, &params, &missing_table),
            Err(PlinkoError::Configuration(_))
        ));

        let too_big = DropRequest {
            bet: Some(5000.0),
            ..DropRequest::default()
        };
        assert!(matches!(
            drop_once(&mut state, &params, &too_big),
            Err(PlinkoError::InsufficientBalance { .. })
        ));

        let negative = DropRequest {
            bet: Some(-1.0),
            ..DropRequest::default()
        };
        assert!(drop_once(&mut state, &params, &negative)
            .unwrap_err()
            .is_validation());

        assert_eq!(state.to_saved(), before);
    }

    #[test]
    fn test_verify_parse_rejects_non_numeric() {
        assert!(matches!(
            VerifyInput::parse("s", "c", "abc", "0", "8"),
            Err(PlinkoError::Validation(_))
        ));
        assert!(matches!(
            VerifyInput::parse("s", "c", "0", "-1", "8"),
            Err(PlinkoError::Validation(_))
        ));
        assert!(VerifyInput::parse("s", "c", " 3 ", "4", "8").is_ok());
    }

    #[test]
    fn test_verify_pinned() {
        let params = params();
        let input = VerifyInput::parse("s", "c", "0", "0", "8")
            .unwrap()
            .with_risk(RiskLevel::Low)
            .with_commitment("043a718774c572bd8a25adbeb1bfcd5c0256ae11cecf9f9c3f925d0e52beaf89");
        let v = verify_drop(&params, &input).unwrap();
        assert_eq!(v.slot, 5);
        assert_eq!(v.multiplier, Some(1.0));
        assert_eq!(v.commitment_matches, Some(true));
    }

    #[test]
    fn test_history_entry_replays_after_rotation() {
        let params = params();
        let mut state = state();
        let out = drop_once(&mut state, &params, &DropRequest::default()).unwrap();
        let rotation = state.seeds.rotate(Utc::now());
        assert!(verify_outcome(&params, &out, &rotation.revealed.server_seed));
        assert!(!verify_outcome(&params, &out, "some-other-seed"));
    }
}
