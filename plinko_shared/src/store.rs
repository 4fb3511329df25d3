use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use plinko_core::{DropOutcome, PlinkoError, PlinkoResult, RiskLevel, SavedGame};

use crate::DropLogEntry;

// DB schema is defined in migrations (see migrations/ folder)

fn storage_err(context: &str, err: impl std::fmt::Display) -> PlinkoError {
    PlinkoError::Persistence(format!("{context}: {err}"))
}

/// SQLite-backed storage for the saved game record and the drop log.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DropRow {
    id: i64,
    ts: DateTime<Utc>,
    drop_index: i64,
    nonce: i64,
    client_seed: String,
    server_seed_hash: String,
    risk: String,
    row_count: i64,
    slot: i64,
    multiplier: f64,
    bet: f64,
    win: f64,
}

impl TryFrom<DropRow> for DropLogEntry {
    type Error = PlinkoError;

    fn try_from(row: DropRow) -> Result<Self, Self::Error> {
        Ok(DropLogEntry {
            id: row.id,
            ts: row.ts,
            drop_index: row.drop_index as u64,
            nonce: row.nonce as u64,
            client_seed: row.client_seed,
            server_seed_hash: row.server_seed_hash,
            risk: RiskLevel::from_str(&row.risk)?,
            rows: u8::try_from(row.row_count).map_err(|e| storage_err("row count", e))?,
            slot: row.slot as usize,
            multiplier: row.multiplier,
            bet: row.bet,
            win: row.win,
        })
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> PlinkoResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| storage_err("database url", e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("connect", e))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> PlinkoResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| storage_err("migrate", e))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn load(&self) -> PlinkoResult<Option<SavedGame>> {
        let json: Option<String> = sqlx::query_scalar("SELECT record_json FROM saves WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("load save", e))?;
        json.as_deref().map(SavedGame::from_json).transpose()
    }

    /// Upserts the record. Refuses a write that would drop revealed seeds
    /// another writer already stored, since the seed history is append-only.
    pub async fn save(&self, game: &SavedGame) -> PlinkoResult<()> {
        if let Ok(Some(stored)) = self.load().await {
            if stored.seed_history.len() > game.seed_history.len() {
                return Err(PlinkoError::Persistence(format!(
                    "stored record has {} revealed seeds, refusing to overwrite with {}",
                    stored.seed_history.len(),
                    game.seed_history.len()
                )));
            }
        }
        let json = game.to_json()?;
        sqlx::query(
            "INSERT INTO saves (id, record_json, updated_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET record_json = excluded.record_json, updated_at = excluded.updated_at",
        )
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("write save", e))?;
        debug!(drop_index = game.drop_index, "game saved");
        Ok(())
    }

    pub async fn log_drop(&self, outcome: &DropOutcome) -> PlinkoResult<i64> {
        let result = sqlx::query(
            "INSERT INTO drops (ts, drop_index, nonce, client_seed, server_seed_hash, risk, row_count, slot, multiplier, bet, win) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(outcome.played_at)
        .bind(outcome.drop_index as i64)
        .bind(outcome.nonce as i64)
        .bind(&outcome.client_seed)
        .bind(&outcome.server_seed_hash)
        .bind(outcome.risk.as_str())
        .bind(i64::from(outcome.rows))
        .bind(outcome.slot as i64)
        .bind(outcome.multiplier)
        .bind(outcome.bet)
        .bind(outcome.win)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("log drop", e))?;
        Ok(result.last_insert_rowid())
    }

    /// Newest first.
    pub async fn recent_drops(&self, limit: i64) -> PlinkoResult<Vec<DropLogEntry>> {
        let rows = sqlx::query_as::<_, DropRow>("SELECT * FROM drops ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_err("read drops", e))?;
        rows.into_iter().map(DropLogEntry::try_from).collect()
    }

    /// Oldest first.
    pub async fn all_drops(&self) -> PlinkoResult<Vec<DropLogEntry>> {
        let rows = sqlx::query_as::<_, DropRow>("SELECT * FROM drops ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_err("read drops", e))?;
        rows.into_iter().map(DropLogEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinko_core::{drop_once, AcceleratedDigester, DropRequest, EngineParams, GameState, Paytable, SeedSource};

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStore::from_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let store = memory_store().await;
        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.recent_drops(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_round_trip_and_drop_log() {
        let store = memory_store().await;
        let source: Box<dyn SeedSource> = plinko_core::os_seed_source();
        let mut state = GameState::new(source);
        let params = EngineParams::new(Paytable::standard().unwrap(), Box::new(AcceleratedDigester));

        let first = drop_once(&mut state, &params, &DropRequest::default()).unwrap();
        let second = drop_once(&mut state, &params, &DropRequest::default()).unwrap();
        store.log_drop(&first).await.unwrap();
        store.log_drop(&second).await.unwrap();

        let saved = state.to_saved();
        store.save(&saved).await.unwrap();
        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));

        let recent = store.recent_drops(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].drop_index, 1);
        let all = store.all_drops().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].slot, first.slot);
        assert_eq!(all[0].multiplier, first.multiplier);
        assert_eq!(all[1].risk, second.risk);
    }

    #[tokio::test]
    async fn test_save_keeps_revealed_seeds() {
        let store = memory_store().await;
        let mut state = GameState::new(plinko_core::os_seed_source());
        let stale = state.to_saved();
        store.save(&stale).await.unwrap();

        state.seeds.rotate(Utc::now());
        store.save(&state.to_saved()).await.unwrap();

        let err = store.save(&stale).await.unwrap_err();
        assert!(matches!(err, PlinkoError::Persistence(_)));
        let stored = store.load().await.unwrap().unwrap();
        assert_eq!(stored.seed_history.len(), 1);
        assert_eq!(stored.server_seed_hash.as_deref(), Some(state.seeds.server_seed_hash()));
    }
}
