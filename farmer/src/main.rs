use clap::Parser;
use farm_core::{
    chain::Chain,
    units::{fee_to_ether, gwei_to_wei, wei_to_gwei},
};
use farm_executors::price::CoingeckoPriceSource;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wrap_farmer::{accounts::load_accounts, config, orchestrator::Orchestrator};

/// Cycles each configured account between native and wrapped balance until
/// its score target is met, then optionally spends a gas budget on votes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Score at which each account starts winding down
    #[arg(long, env = "SCORE_TARGET")]
    score_target: Option<u64>,

    /// Vote points to buy for eligible accounts; 0 disables voting
    #[arg(long, env = "VOTE_SCORE_TARGET")]
    vote_score_target: Option<u64>,

    /// Floor for the sampled gas price, in gwei
    #[arg(long, env = "MIN_GAS_GWEI")]
    min_gas_gwei: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = config::get_config()?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "wrap_farmer=debug,farm_executors=debug,farm_core=info".into()
        }),
    );

    match config.log_format {
        config::LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        config::LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    if let Some(target) = cli.score_target {
        config.wrap.score_target = target;
    }
    if let Some(target) = cli.vote_score_target {
        config.vote.score_target = target;
    }
    if let Some(gwei) = cli.min_gas_gwei {
        config.wrap.min_gas_price = gwei_to_wei(gwei);
    }
    config.wrap.validate()?;

    let chain = config.chain.to_chain()?;
    tracing::info!(
        chain_id = chain.chain_id(),
        network = ?chain.network(),
        score_target = config.wrap.score_target,
        vote_score_target = config.vote.score_target,
        min_gas_gwei = wei_to_gwei(config.wrap.min_gas_price),
        "Chain initialized"
    );

    let accounts = load_accounts(&config.wallet.private_keys)?;
    let prices = CoingeckoPriceSource::new(config.price.clone())?;

    let runs = Orchestrator::new(&chain, &config.wrap, &config.vote, &prices)
        .run(accounts)
        .await?;

    let total_score: u64 = runs.iter().map(|run| run.score).sum();
    let total_fee: u128 = runs.iter().map(|run| run.fee).sum();
    tracing::info!(
        accounts = runs.len(),
        score = total_score,
        fee = fee_to_ether(total_fee),
        "All accounts processed"
    );

    Ok(())
}
