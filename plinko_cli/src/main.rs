use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use plinko_core::{
    commit, select_digester, verify_commitment, verify_drop, DigestPreference, Direction, EngineParams, Paytable,
    RiskLevel, VerifyInput,
};
use plinko_shared::{AdminClient, SqliteStore};

#[derive(Parser)]
#[command(name = "plinko-cli", about = "Admin and verification CLI for plinko")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://plinko.db
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://plinko.db", global = true)]
    database_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute a drop from revealed seeds (offline)
    Verify {
        server_seed: String,
        client_seed: String,
        nonce: String,
        drop_index: String,
        rows: String,
        #[arg(long)]
        risk: Option<RiskLevel>,
        /// Also check the seed against this commitment
        #[arg(long)]
        server_seed_hash: Option<String>,
        #[arg(long, default_value = "auto")]
        backend: DigestPreference,
    },
    /// Check a revealed seed against a published commitment (offline)
    CheckCommitment { server_seed: String, commitment: String },
    /// Reveal the current server seed and commit to a new one, via the running server
    RotateSeed {
        #[arg(long, env = "PLINKO_SERVER_URL", default_value = "http://127.0.0.1:8080")]
        server_url: String,
        #[arg(long, env = "API_KEY", default_value = "dev-key")]
        api_key: String,
    },
    /// List revealed server seeds
    SeedHistory,
    /// View last N drops
    ViewLogs {
        #[arg(default_value_t = 20)]
        n: i64,
    },
    /// Export the drop log to CSV path
    ExportCsv { path: PathBuf },
}

fn path_string(path: &[Direction]) -> String {
    path.iter()
        .map(|d| match d {
            Direction::Left => 'L',
            Direction::Right => 'R',
        })
        .collect()
}

async fn open_store(url: &str) -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::connect(url)
        .await
        .with_context(|| format!("opening {url}"))?;
    debug!(url, "store opened");
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            server_seed,
            client_seed,
            nonce,
            drop_index,
            rows,
            risk,
            server_seed_hash,
            backend,
        } => {
            let mut input = VerifyInput::parse(&server_seed, &client_seed, &nonce, &drop_index, &rows)?;
            input.risk = risk;
            input.server_seed_hash = server_seed_hash;
            let params = EngineParams::new(Paytable::standard()?, select_digester(backend));
            let v = verify_drop(&params, &input)?;

            println!("slot        {}", v.slot);
            println!("path        {}", path_string(&v.path));
            if let Some(multiplier) = v.multiplier {
                println!("multiplier  {multiplier}x");
            }
            println!("seed hash   {}", v.server_seed_hash);
            match v.commitment_matches {
                Some(true) => println!("commitment  ok"),
                Some(false) => bail!("server seed does not match the given commitment"),
                None => {}
            }
        }
        Commands::CheckCommitment { server_seed, commitment } => {
            if !verify_commitment(&server_seed, &commitment) {
                bail!("mismatch: seed hashes to {}", commit(&server_seed));
            }
            println!("ok");
        }
        Commands::RotateSeed { server_url, api_key } => {
            // the server owns the live seed, rotating the stored record behind
            // its back would reveal a seed it keeps playing
            let rotation = AdminClient::new(&server_url, api_key)
                .rotate_seed()
                .await
                .with_context(|| format!("rotating seed on {server_url}"))?;
            println!(
                "Revealed server seed {} (hash {}, {} drops)",
                rotation.revealed.server_seed, rotation.revealed.server_seed_hash, rotation.revealed.drops
            );
            println!("New hash: {}", rotation.server_seed_hash);
        }
        Commands::SeedHistory => {
            let store = open_store(&cli.database_url).await?;
            let saved = store.load().await?.unwrap_or_default();
            if saved.seed_history.is_empty() {
                println!("No seeds revealed yet");
            }
            for (i, entry) in saved.seed_history.iter().enumerate() {
                println!(
                    "#{:>4} {} seed={} hash={} drops={} {}",
                    i,
                    entry.revealed_at.to_rfc3339(),
                    entry.server_seed,
                    entry.server_seed_hash,
                    entry.drops,
                    if entry.verify() { "ok" } else { "MISMATCH" }
                );
            }
        }
        Commands::ViewLogs { n } => {
            let store = open_store(&cli.database_url).await?;
            for d in store.recent_drops(n.max(1)).await? {
                println!(
                    "#{:>6} {} drop={} nonce={} seed={} hash={} {}/{} slot={} x{} bet={} win={}",
                    d.id,
                    d.ts.to_rfc3339(),
                    d.drop_index,
                    d.nonce,
                    d.client_seed,
                    d.server_seed_hash,
                    d.risk,
                    d.rows,
                    d.slot,
                    d.multiplier,
                    d.bet,
                    d.win
                );
            }
        }
        Commands::ExportCsv { path } => {
            let store = open_store(&cli.database_url).await?;
            let drops = store.all_drops().await?;
            let mut wtr = csv::Writer::from_path(&path)?;
            for d in &drops {
                wtr.serialize(d)?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", drops.len(), path.display());
        }
    }

    Ok(())
}
