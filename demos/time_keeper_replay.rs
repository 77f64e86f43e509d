use bitpow::{create_genesis_block, ChainValidator, Miner, MinerBuilder, StopFlag, TimeKeeper, TimeKeeperConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let genesis = create_genesis_block();
    let origin = i64::from(genesis.block.header().timestamp);
    let config = TimeKeeperConfig::from_json(&format!(
        r#"{{"origin_time":{origin},"block_interval_secs":60,"window":9}}"#
    ))?;

    // Replay a chain whose blocks drift from 55s to 70s apart.
    let mut keeper = TimeKeeper::new(config.clone())?;
    keeper.push_init(0, origin, 1_000_000);
    keeper.init_stats()?;
    let mut time = origin;
    for n in 1..=40u32 {
        time += 55 + i64::from(n % 16);
        let difficulty = keeper.next_difficulty();
        keeper.push(n, time, difficulty)?;
        println!(
            "block={n:>3} time_error={:>5} current={:>9} next={:>9}",
            keeper.median_time_error(),
            keeper.current_difficulty(),
            keeper.next_difficulty()
        );
    }

    // Optionally mine and accept one real block (needs 128 MiB per thread).
    if std::env::var("BITPOW_MINE").is_ok() {
        let threads: usize = std::env::var("BITPOW_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let mut validator = ChainValidator::from_genesis(config, &genesis.block, 1)?;
        let mut template = genesis.to_full_block();
        template.block.block_proof.header.prev = genesis.block.id();
        template.block.block_proof.header.block_num = 1;
        template.block.block_proof.header.timestamp += 60;

        let miner: Miner = MinerBuilder::default().threads(threads).build_validated()?;
        let required = validator.time_keeper().next_difficulty();
        if let Some(found) = miner.mine(&template.block.block_proof, required, &StopFlag::new())? {
            template.block.block_proof = found;
            let pow = validator.accept(&template)?;
            println!("accepted block 1 with proof {pow} (difficulty {})", pow.difficulty());
        }
    }
    Ok(())
}
