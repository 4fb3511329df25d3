use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::DropOutcome;
use crate::error::{PlinkoError, PlinkoResult};
use crate::paytable::{RiskLevel, MAX_ROWS};
use crate::seeds::{SeedHistoryEntry, SeedManager, SeedSource, StoredSeeds};

/// Recent drops kept in the persisted record, newest first.
pub const HISTORY_LIMIT: usize = 100;

pub const DEFAULT_BALANCE: f64 = 1000.0;
pub const DEFAULT_BET: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub risk: RiskLevel,
    pub rows: u8,
    pub bet: f64,
    pub instant: bool,
    pub animation: bool,
    pub sound: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            risk: RiskLevel::Medium,
            rows: MAX_ROWS,
            bet: DEFAULT_BET,
            instant: false,
            animation: true,
            sound: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Totals {
    pub drops: u64,
    pub wagered: f64,
    pub returned: f64,
    pub biggest_win: f64,
    pub biggest_multiplier: f64,
}

impl Totals {
    pub fn profit(&self) -> f64 {
        self.returned - self.wagered
    }

    pub fn record(&mut self, outcome: &DropOutcome) {
        self.drops += 1;
        self.wagered += outcome.bet;
        self.returned += outcome.win;
        self.biggest_win = self.biggest_win.max(outcome.win);
        self.biggest_multiplier = self.biggest_multiplier.max(outcome.multiplier);
    }
}

/// The single persisted record. Every field defaults, unknown fields are
/// ignored, so older or newer saves load without error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SavedGame {
    pub balance: f64,
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_seed_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_seed: Option<String>,
    pub nonce: u64,
    pub drop_index: u64,
    pub history: Vec<DropOutcome>,
    pub totals: Totals,
    pub seed_history: Vec<SeedHistoryEntry>,
}

impl Default for SavedGame {
    fn default() -> Self {
        Self {
            balance: DEFAULT_BALANCE,
            settings: Settings::default(),
            server_seed: None,
            server_seed_hash: None,
            client_seed: None,
            nonce: 0,
            drop_index: 0,
            history: Vec::new(),
            totals: Totals::default(),
            seed_history: Vec::new(),
        }
    }
}

impl SavedGame {
    pub fn from_json(json: &str) -> PlinkoResult<Self> {
        serde_json::from_str(json).map_err(|e| PlinkoError::Persistence(format!("decode save: {e}")))
    }

    pub fn to_json(&self) -> PlinkoResult<String> {
        serde_json::to_string(self).map_err(|e| PlinkoError::Persistence(format!("encode save: {e}")))
    }

    /// Storage failures fall back to a fresh record; play is never blocked.
    pub fn load_or_default(loaded: PlinkoResult<Option<SavedGame>>) -> SavedGame {
        match loaded {
            Ok(Some(game)) => game,
            Ok(None) => SavedGame::default(),
            Err(err) => {
                warn!(error = %err, "could not load saved game, starting from defaults");
                SavedGame::default()
            }
        }
    }
}

/// Everything one player session owns. Passed explicitly to every engine call.
#[derive(Debug)]
pub struct GameState {
    pub balance: f64,
    pub settings: Settings,
    pub seeds: SeedManager,
    /// Newest first, at most [`HISTORY_LIMIT`] entries.
    pub history: VecDeque<DropOutcome>,
    pub totals: Totals,
}

impl GameState {
    pub fn new(source: Box<dyn SeedSource>) -> Self {
        Self::from_saved(SavedGame::default(), source)
    }

    pub fn from_saved(saved: SavedGame, source: Box<dyn SeedSource>) -> Self {
        let seeds = SeedManager::restore(
            StoredSeeds {
                server_seed: saved.server_seed,
                server_seed_hash: saved.server_seed_hash,
                client_seed: saved.client_seed,
                nonce: saved.nonce,
                drop_index: saved.drop_index,
                history: saved.seed_history,
            },
            source,
        );
        let mut history: VecDeque<DropOutcome> = saved.history.into();
        history.truncate(HISTORY_LIMIT);

        Self {
            balance: saved.balance,
            settings: saved.settings,
            seeds,
            history,
            totals: saved.totals,
        }
    }

    pub fn to_saved(&self) -> SavedGame {
        let stored = self.seeds.to_stored();
        SavedGame {
            balance: self.balance,
            settings: self.settings.clone(),
            server_seed: stored.server_seed,
            server_seed_hash: stored.server_seed_hash,
            client_seed: stored.client_seed,
            nonce: stored.nonce,
            drop_index: stored.drop_index,
            history: self.history.iter().cloned().collect(),
            totals: self.totals.clone(),
            seed_history: stored.history,
        }
    }

    pub fn record(&mut self, outcome: DropOutcome) {
        self.totals.record(&outcome);
        self.history.push_front(outcome);
        self.history.truncate(HISTORY_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::RngSeedSource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn source() -> Box<dyn SeedSource> {
        Box::new(RngSeedSource(StdRng::seed_from_u64(9)))
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let saved = SavedGame::from_json(r#"{"balance": 12.5, "risk": "high"}"#).unwrap();
        assert_eq!(saved.balance, 12.5);
        assert_eq!(saved.settings.risk, RiskLevel::High);
        assert_eq!(saved.settings.rows, MAX_ROWS);
        assert!(saved.settings.sound);
        assert!(saved.server_seed.is_none());
        assert!(saved.history.is_empty());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let saved = SavedGame::from_json(r#"{"theme": "dark", "nonce": 4}"#).unwrap();
        assert_eq!(saved.nonce, 4);
        assert_eq!(saved.balance, DEFAULT_BALANCE);
    }

    #[test]
    fn test_state_round_trip_is_lossless() {
        let mut state = GameState::new(source());
        state.balance = 321.0;
        state.settings.instant = true;
        state.seeds.set_client_seed("lucky");
        let saved = state.to_saved();
        let json = saved.to_json().unwrap();
        assert!(json.contains("\"serverSeedHash\""));
        assert!(json.contains("\"clientSeed\":\"lucky\""));

        let restored = GameState::from_saved(SavedGame::from_json(&json).unwrap(), source());
        assert_eq!(restored.to_saved(), saved);
    }

    #[test]
    fn test_load_or_default_recovers() {
        let game = SavedGame::load_or_default(Err(PlinkoError::Persistence("disk gone".into())));
        assert_eq!(game, SavedGame::default());
        let bad = SavedGame::from_json("{not json");
        assert!(matches!(bad, Err(PlinkoError::Persistence(_))));
    }
}
