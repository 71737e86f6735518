use bizpanel::cli::{Cli, Commands};
use bizpanel::{Config, load_config, run};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // `init` writes the config file, so there may be nothing to load yet
    let config = if matches!(cli.command, Some(Commands::Init)) {
        Config::default()
    } else {
        load_config(cli.config.as_deref())?
    };
    let worker_threads = config.general.worker_threads;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }

    let runtime = builder.build()?;
    runtime.block_on(run(cli, config))
}
