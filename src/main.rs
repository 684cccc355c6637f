use anyhow::bail;
use clap::{Parser, Subcommand};
use donation_leaderboard::{
    config::Config,
    contract::{EthLeaderboard, LedgerGateway, WriteOp},
    state::format_eth,
    sync::SyncController,
    tracker::TxStatus,
};
use log::info;
use std::{path::PathBuf, sync::Arc, time::Duration};
use web3::types::U256;

#[derive(Parser, Debug)]
#[clap(author, version, about = "On-chain donation leaderboard client", long_about = None)]
struct Cli {
    /// Config file
    #[clap(short = 'c', long = "config", default_value = "config.json")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bind a session and keep the local view in sync until ctrl-c
    Run,
    /// One-shot refresh, print round info and the ranked leaderboard
    Board,
    /// Donate to an organization for the current round
    Donate {
        /// organization id from the registry
        #[clap(long)]
        org: u64,

        /// donation amount in wei
        #[clap(long)]
        amount_wei: String,
    },
    /// Add funds to the shared reward pool
    FundPool {
        /// amount in wei
        #[clap(long)]
        amount_wei: String,
    },
    /// Start the next round (admin only, round must be endable)
    StartRound,
    /// Select the round winner and pay the reward (admin only)
    Payout,
    /// Withdraw accumulated donations for an organization
    Withdraw {
        /// organization id from the registry
        #[clap(long)]
        org: u64,
    },
    /// Print a config template
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Commands::ShowConfig = cli.command {
        Config::show();
        return Ok(());
    }

    let config = Config::parse_from_file(&cli.config)?;
    let gateway = Arc::new(EthLeaderboard::setup(&config, None)?);
    let controller = SyncController::new(
        gateway,
        config.registry(),
        Duration::from_secs(config.chain.opts.poll_interval),
    );

    let session = controller.bootstrap().await?;
    info!(
        "connected as {:?} on {} (chain {})",
        session.account, config.chain.name, session.chain_id
    );

    match cli.command {
        Commands::Run => {
            print_board(&controller).await;
            controller.start_poller();
            tokio::signal::ctrl_c().await?;
            controller.teardown().await;
        }
        Commands::Board => print_board(&controller).await,
        Commands::Donate { org, amount_wei } => {
            check_org(&controller, org)?;
            submit(&controller, WriteOp::Donate { org_id: org, amount: parse_wei(&amount_wei)? }).await?;
        }
        Commands::FundPool { amount_wei } => {
            submit(&controller, WriteOp::FundPool { amount: parse_wei(&amount_wei)? }).await?;
        }
        Commands::StartRound => submit(&controller, WriteOp::StartRound).await?,
        Commands::Payout => submit(&controller, WriteOp::SelectWinner).await?,
        Commands::Withdraw { org } => {
            check_org(&controller, org)?;
            submit(&controller, WriteOp::Withdraw { org_id: org }).await?;
        }
        Commands::ShowConfig => unreachable!(),
    }
    Ok(())
}

fn parse_wei(s: &str) -> anyhow::Result<U256> {
    U256::from_dec_str(s).map_err(|e| anyhow::anyhow!("bad wei amount {:?}: {:?}", s, e))
}

fn check_org<G: LedgerGateway + 'static>(controller: &SyncController<G>, org: u64) -> anyhow::Result<()> {
    if !controller.registry().contains(org) {
        bail!("org {} is not in the registry", org);
    }
    Ok(())
}

async fn submit<G: LedgerGateway + 'static>(
    controller: &SyncController<G>,
    op: WriteOp,
) -> anyhow::Result<()> {
    let kind = op.kind();
    let record = controller.execute(op).await?;
    match record.status() {
        TxStatus::Confirmed => {
            println!("{}: {}", kind, record.message());
            print_board(controller).await;
            Ok(())
        }
        _ => bail!("{}: {}", kind, record.message()),
    }
}

async fn print_board<G: LedgerGateway + 'static>(controller: &SyncController<G>) {
    if let Some(round) = controller.round_state().await {
        println!(
            "round {} | pool {} | reward {} | endable {}",
            round.round_id,
            format_eth(round.pool_balance),
            format_eth(round.reward),
            round.can_end
        );
    }
    for org in controller.leaderboard().await {
        println!("{:>2}. {:<24} {}", org.rank, org.name, format_eth(org.total_wei));
    }
}
