use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use plinko_core::DigestPreference;

#[derive(Parser, Debug, Clone)]
#[command(name = "plinko-server", about = "HTTP host for a provably-fair plinko session")]
pub struct ServerConfig {
    /// Database URL, default sqlite://plinko.db
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://plinko.db")]
    pub database_url: String,

    #[arg(long, env = "BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Bearer token for /admin routes
    #[arg(long, env = "API_KEY", default_value = "dev-key")]
    pub api_key: String,

    /// auto, accelerated or software
    #[arg(long, env = "DIGEST_BACKEND", default_value = "auto")]
    pub digest_backend: DigestPreference,

    /// JSON file with custom payout tables
    #[arg(long, env = "PAYOUT_TABLES")]
    pub payout_tables: Option<PathBuf>,

    /// Pause between autoplay drops
    #[arg(long, env = "AUTOPLAY_DELAY_MS", default_value_t = 0)]
    pub autoplay_delay_ms: u64,
}

impl ServerConfig {
    pub fn autoplay_delay(&self) -> Duration {
        Duration::from_millis(self.autoplay_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_flags() {
        let config = ServerConfig::try_parse_from([
            "plinko-server",
            "--database-url",
            "sqlite::memory:",
            "--digest-backend",
            "software",
            "--autoplay-delay-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(config.digest_backend, DigestPreference::Software);
        assert_eq!(config.autoplay_delay(), Duration::from_millis(250));
        assert!(config.payout_tables.is_none());
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(ServerConfig::try_parse_from(["plinko-server", "--digest-backend", "gpu"]).is_err());
    }
}
