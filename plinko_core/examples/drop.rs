use plinko_core::{verify_drop, DropSeeds, EngineParams, RiskLevel, VerifyInput};

fn main() -> Result<(), plinko_core::PlinkoError> {
    // Example end-to-end drop from explicit seeds
    let params = EngineParams::standard()?;
    let seeds = DropSeeds::new("example-server-seed", "example-client-seed", 0, 0);
    let input = VerifyInput::new(seeds.clone(), 16).with_risk(RiskLevel::High);
    let result = verify_drop(&params, &input)?;
    println!(
        "server_seed_hash={} slot={} multiplier={:?} path={:?}",
        seeds.server_seed_hash_hex(),
        result.slot,
        result.multiplier,
        result.path
    );
    Ok(())
}
