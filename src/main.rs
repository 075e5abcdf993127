use clap::Parser;
use tracing_subscriber::EnvFilter;

use restack::cli::{self, Cli, Commands};
use restack::errors::RestackError;

fn init_logging(cli: &Cli) {
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(!cli.no_color).init();
    }
}

fn exit_code(e: &RestackError) -> i32 {
    match e {
        RestackError::Config(_) | RestackError::Yaml(_) => 2,
        RestackError::Container(_) | RestackError::Docker(_) => 3,
        RestackError::InvalidTarget(_) => 5,
        RestackError::Persistence(_) => 6,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Scan(args) => cli::scan::handle_scan(args, config).await,
        Commands::Serve(args) => cli::serve::handle_serve(args, config).await,
        Commands::Schedule(args) => cli::schedule::handle_schedule(args, config).await,
        Commands::Report(args) => cli::report::handle_report(args, config).await,
        Commands::Export(args) => cli::export::handle_export(args, config).await,
        Commands::Replay(args) => cli::replay::handle_replay(args, config).await,
        Commands::UpdateVulndb => cli::update_vulndb::handle_update_vulndb(config).await,
        Commands::Validate(args) => cli::validate::handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}
