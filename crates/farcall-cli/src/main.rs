//! farcall CLI: serve, discover and call remote items.

mod cli;
mod cmd;
mod config;
mod ui;

use clap::Parser;
use cli::{Cli, Commands};

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let config = config::load_config(cli.config.as_deref());
    match cli.command {
        Commands::Serve(args) => cmd::serve::cmd_serve(config, args),
        Commands::Registry(args) => cmd::registry::cmd_registry(config, args),
        Commands::Call {
            locator,
            method,
            args,
        } => cmd::call::cmd_call(config, &locator, &method, args.as_deref()),
        Commands::Freeze { locator, file } => cmd::call::cmd_freeze(config, &locator, &file),
        Commands::Names { server } => cmd::call::cmd_names(config, &server),
    }
}
