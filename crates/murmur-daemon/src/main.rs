mod cli;

use clap::Parser;
use cli::{
    handle_group, handle_identity, handle_signal, init_config, init_logging, resolve_paths,
    run_daemon, Cli, Commands,
};
use murmur_types::MurmurResult;

#[tokio::main]
async fn main() -> MurmurResult<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    let (config_path, data_dir) = resolve_paths(&cli);

    match cli.command {
        Commands::Run => {
            run_daemon(&config_path, &data_dir).await?;
        }
        Commands::Init { force } => {
            init_config(&config_path, &data_dir, force)?;
        }
        Commands::Identity { action } => {
            handle_identity(action)?;
        }
        Commands::Group { action } => {
            handle_group(&config_path, &data_dir, action).await?;
        }
        Commands::Signal {
            identity,
            group,
            context,
            signal,
        } => {
            handle_signal(&config_path, &data_dir, identity, group, context, signal).await?;
        }
    }

    Ok(())
}
