use clap::Parser;
use replay::{
    cli::{CLI, Subcommand},
    initializers::init_tracing,
    tasks::{run_stochastic, run_substate},
};
use tracing::info;

fn main() -> eyre::Result<()> {
    let CLI { opts, command } = CLI::parse();
    let cfg = opts.into_config()?;
    init_tracing(&cfg.log_level)?;
    let cfg = cfg.validate()?;

    match command {
        Subcommand::Substate { log } => run_substate(&cfg, log.as_deref())?,
        Subcommand::Stochastic {
            seed,
            accounts,
            txs_per_block,
        } => {
            let mut stochastic = cfg.stochastic.clone();
            stochastic.seed = seed.unwrap_or(stochastic.seed);
            stochastic.accounts = accounts.unwrap_or(stochastic.accounts);
            stochastic.txs_per_block = txs_per_block.unwrap_or(stochastic.txs_per_block);
            run_stochastic(&cfg, &stochastic)?
        }
    }

    info!("Replay finished");
    Ok(())
}
