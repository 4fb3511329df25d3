//! Server seed lifecycle: generation, commitment, rotation and the
//! nonce / drop-index counters.
//!
//! One [`SeedManager`] owns the current epoch. A drop reads a [`DropSeeds`]
//! snapshot, resolves against it, then calls [`SeedManager::advance`] with the
//! same snapshot. Rotation reveals the outgoing seed into the append-only
//! history and starts a new epoch at nonce 0; the drop index keeps counting.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::commitment::{commit, verify_commitment};
use crate::error::{PlinkoError, PlinkoResult};
use crate::rng::DropSeeds;

const SERVER_SEED_BYTES: usize = 32;
const CLIENT_SEED_BYTES: usize = 8;

/// Source of fresh seed strings.
pub trait SeedSource: Send + Sync {
    fn server_seed(&mut self) -> String;
    fn client_seed(&mut self) -> String;
}

/// Hex-encodes bytes drawn from any `RngCore`.
#[derive(Debug, Clone)]
pub struct RngSeedSource<R>(pub R);

impl<R: RngCore + Send + Sync> SeedSource for RngSeedSource<R> {
    fn server_seed(&mut self) -> String {
        let mut bytes = [0u8; SERVER_SEED_BYTES];
        self.0.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn client_seed(&mut self) -> String {
        let mut bytes = [0u8; CLIENT_SEED_BYTES];
        self.0.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

pub fn os_seed_source() -> Box<dyn SeedSource> {
    Box::new(RngSeedSource(OsRng))
}

/// A revealed server seed. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedHistoryEntry {
    pub server_seed: String,
    pub server_seed_hash: String,
    /// Drops resolved under this seed (its final nonce).
    #[serde(default)]
    pub drops: u64,
    pub revealed_at: DateTime<Utc>,
}

impl SeedHistoryEntry {
    pub fn verify(&self) -> bool {
        verify_commitment(&self.server_seed, &self.server_seed_hash)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    pub revealed: SeedHistoryEntry,
    pub server_seed_hash: String,
}

/// Seed fields as they come back from storage; anything may be missing.
#[derive(Debug, Clone, Default)]
pub struct StoredSeeds {
    pub server_seed: Option<String>,
    pub server_seed_hash: Option<String>,
    pub client_seed: Option<String>,
    pub nonce: u64,
    pub drop_index: u64,
    pub history: Vec<SeedHistoryEntry>,
}

pub struct SeedManager {
    server_seed: String,
    server_seed_hash: String,
    client_seed: String,
    nonce: u64,
    drop_index: u64,
    history: Vec<SeedHistoryEntry>,
    source: Box<dyn SeedSource>,
}

impl fmt::Debug for SeedManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the live server seed stays out of logs
        f.debug_struct("SeedManager")
            .field("server_seed_hash", &self.server_seed_hash)
            .field("client_seed", &self.client_seed)
            .field("nonce", &self.nonce)
            .field("drop_index", &self.drop_index)
            .field("history", &self.history.len())
            .finish()
    }
}

impl SeedManager {
    pub fn new(source: Box<dyn SeedSource>) -> Self {
        Self::restore(StoredSeeds::default(), source)
    }

    /// Rebuilds the manager from storage. A missing server seed starts a fresh
    /// epoch; a stored commitment that does not match its seed is recomputed.
    pub fn restore(stored: StoredSeeds, mut source: Box<dyn SeedSource>) -> Self {
        let (server_seed, nonce) = match stored.server_seed.filter(|s| !s.is_empty()) {
            Some(seed) => (seed, stored.nonce),
            None => (source.server_seed(), 0),
        };
        let server_seed_hash = commit(&server_seed);
        if let Some(stored_hash) = stored.server_seed_hash {
            if !stored_hash.eq_ignore_ascii_case(&server_seed_hash) {
                warn!(
                    stored = %stored_hash,
                    actual = %server_seed_hash,
                    "stored server seed hash did not match seed, recomputed"
                );
            }
        }
        let client_seed = stored
            .client_seed
            .unwrap_or_else(|| source.client_seed());

        Self {
            server_seed,
            server_seed_hash,
            client_seed,
            nonce,
            drop_index: stored.drop_index,
            history: stored.history,
            source,
        }
    }

    pub fn to_stored(&self) -> StoredSeeds {
        StoredSeeds {
            server_seed: Some(self.server_seed.clone()),
            server_seed_hash: Some(self.server_seed_hash.clone()),
            client_seed: Some(self.client_seed.clone()),
            nonce: self.nonce,
            drop_index: self.drop_index,
            history: self.history.clone(),
        }
    }

    /// Commitment to the live server seed.
    pub fn server_seed_hash(&self) -> &str {
        &self.server_seed_hash
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    pub fn set_client_seed(&mut self, client_seed: impl Into<String>) {
        self.client_seed = client_seed.into();
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn drop_index(&self) -> u64 {
        self.drop_index
    }

    pub fn history(&self) -> &[SeedHistoryEntry] {
        &self.history
    }

    /// Seed material for the next drop.
    pub fn snapshot(&self) -> DropSeeds {
        DropSeeds {
            server_seed: self.server_seed.clone(),
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
            drop_index: self.drop_index,
        }
    }

    /// Commits a drop resolved against `used`. Rejects snapshots that no
    /// longer describe the live state so no nonce is ever consumed twice.
    pub fn advance(&mut self, used: &DropSeeds) -> PlinkoResult<()> {
        if used.nonce != self.nonce
            || used.drop_index != self.drop_index
            || used.server_seed != self.server_seed
            || used.client_seed != self.client_seed
        {
            return Err(PlinkoError::Validation(format!(
                "stale seed snapshot (nonce {} / drop {}), live state is nonce {} / drop {}",
                used.nonce, used.drop_index, self.nonce, self.drop_index
            )));
        }
        self.nonce += 1;
        self.drop_index += 1;
        Ok(())
    }

    /// Reveals the current seed and starts a new epoch.
    pub fn rotate(&mut self, now: DateTime<Utc>) -> Rotation {
        let next_seed = self.source.server_seed();
        let next_hash = commit(&next_seed);

        let revealed = SeedHistoryEntry {
            server_seed: std::mem::replace(&mut self.server_seed, next_seed),
            server_seed_hash: std::mem::replace(&mut self.server_seed_hash, next_hash.clone()),
            drops: self.nonce,
            revealed_at: now,
        };
        self.history.push(revealed.clone());
        self.nonce = 0;

        info!(
            revealed_hash = %revealed.server_seed_hash,
            new_hash = %next_hash,
            drops = revealed.drops,
            "server seed rotated"
        );

        Rotation {
            revealed,
            server_seed_hash: next_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded(seed: u64) -> Box<dyn SeedSource> {
        Box::new(RngSeedSource(StdRng::seed_from_u64(seed)))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_init_generates_committed_seed() {
        let manager = SeedManager::new(seeded(1));
        let snap = manager.snapshot();
        assert_eq!(snap.server_seed.len(), 64);
        assert_eq!(manager.server_seed_hash(), commit(&snap.server_seed));
        assert_eq!(manager.client_seed().len(), 16);
        assert_eq!(manager.nonce(), 0);
        assert_eq!(manager.drop_index(), 0);
    }

    #[test]
    fn test_advance_and_stale_snapshot() {
        let mut manager = SeedManager::new(seeded(2));
        let snap = manager.snapshot();
        manager.advance(&snap).unwrap();
        assert_eq!((manager.nonce(), manager.drop_index()), (1, 1));

        // same snapshot again must not consume another nonce
        assert!(matches!(manager.advance(&snap), Err(PlinkoError::Validation(_))));
        assert_eq!((manager.nonce(), manager.drop_index()), (1, 1));
    }

    #[test]
    fn test_client_seed_change_invalidates_snapshot() {
        let mut manager = SeedManager::new(seeded(3));
        let snap = manager.snapshot();
        manager.set_client_seed("mine");
        assert!(manager.advance(&snap).is_err());
        assert_eq!(manager.snapshot().client_seed, "mine");
    }

    #[test]
    fn test_rotate_reveals_and_resets_nonce() {
        let mut manager = SeedManager::new(seeded(4));
        let old = manager.snapshot();
        let old_hash = manager.server_seed_hash().to_string();
        for _ in 0..3 {
            let s = manager.snapshot();
            manager.advance(&s).unwrap();
        }

        let rotation = manager.rotate(at(1_700_000_000));
        assert_eq!(rotation.revealed.server_seed, old.server_seed);
        assert_eq!(rotation.revealed.server_seed_hash, old_hash);
        assert_eq!(rotation.revealed.drops, 3);
        assert!(rotation.revealed.verify());
        assert_eq!(rotation.server_seed_hash, manager.server_seed_hash());
        assert_ne!(manager.snapshot().server_seed, old.server_seed);
        assert_eq!(manager.nonce(), 0);
        assert_eq!(manager.drop_index(), 3);
    }

    #[test]
    fn test_restore_resyncs_hash_and_keeps_counters() {
        let stored = StoredSeeds {
            server_seed: Some("abc".into()),
            server_seed_hash: Some("not-a-hash".into()),
            client_seed: Some("client".into()),
            nonce: 5,
            drop_index: 9,
            history: Vec::new(),
        };
        let manager = SeedManager::restore(stored, seeded(5));
        assert_eq!(manager.server_seed_hash(), commit("abc"));
        assert_eq!((manager.nonce(), manager.drop_index()), (5, 9));
        assert_eq!(manager.client_seed(), "client");
    }

    #[test]
    fn test_restore_without_seed_starts_fresh_epoch() {
        let stored = StoredSeeds {
            nonce: 12,
            drop_index: 40,
            ..StoredSeeds::default()
        };
        let manager = SeedManager::restore(stored, seeded(6));
        assert_eq!(manager.nonce(), 0);
        assert_eq!(manager.drop_index(), 40);
    }

    #[test]
    fn test_debug_hides_live_seed() {
        let manager = SeedManager::new(seeded(7));
        let seed = manager.snapshot().server_seed;
        assert!(!format!("{manager:?}").contains(&seed));
    }
}
