pub mod autoplay;
pub mod commitment;
pub mod digest;
pub mod engine;
pub mod error;
pub mod paytable;
pub mod resolver;
pub mod rng;
pub mod seeds;
pub mod state;

pub use crate::autoplay::{run_autoplay, Autoplay, AutoplayPlan, AutoplayReport, AutoplayStep, CancelToken, StopReason};
pub use crate::commitment::{commit, derive_hash_hex, verify_commitment};
pub use crate::digest::{
    conformance_failures, conformance_vectors, select_digester, AcceleratedDigester, DigestPreference, Digester,
    SoftwareDigester,
};
pub use crate::engine::{
    drop_once, drop_with_seeds, verify_drop, verify_outcome, DropOutcome, DropRequest, EngineParams, Verification,
    VerifyInput,
};
pub use crate::error::{PlinkoError, PlinkoResult};
pub use crate::paytable::{Paytable, PaytableEntry, RiskLevel, MAX_ROWS, MIN_ROWS};
pub use crate::resolver::{resolve, resolve_slot, Direction, Resolution};
pub use crate::rng::{derive_floats, DropSeeds, FloatStream, FLOATS_PER_DIGEST};
pub use crate::seeds::{os_seed_source, RngSeedSource, Rotation, SeedHistoryEntry, SeedManager, SeedSource};
pub use crate::state::{GameState, SavedGame, Settings, Totals, HISTORY_LIMIT};
