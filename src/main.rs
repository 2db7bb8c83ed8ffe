//! query-control entry point.
//!
//! ## CLI Subcommands
//!
//! - `query-control` or `query-control run` - Serve JSON-lines requests on stdin (default)
//! - `query-control config show|defaults|validate` - Inspect configuration
//! - `query-control version` - Print the version

use std::process::ExitCode;
use std::sync::Arc;

use query_control::cli;
use query_control::config;
use query_control::protocol::{run_session, ControlHandler};
use query_control::shutdown::ShutdownResult;
use query_control::telemetry::init_logging;
use query_control::QueryControlService;
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => match run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("query-control: {}", e);
                ExitCode::FAILURE
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    cli::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    cli::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(cli::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "version" | "--version" | "-V" => {
            println!("query-control {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!(
        "query-control v{}

USAGE:
    query-control [COMMAND]

COMMANDS:
    run          Serve JSON-lines requests from stdin (default)
    config       Show, list defaults for, or validate configuration
    version      Show version information
    help         Show this help message

REQUEST EXAMPLES:
    {{\"op\":\"register\",\"queryId\":\"q1\",\"model\":\"sonnet\"}}
    {{\"op\":\"pause\",\"queryId\":\"q1\",\"executionContext\":{{\"step\":3}}}}
    {{\"op\":\"resume\",\"queryId\":\"q1\"}}
    {{\"op\":\"checkpoints\",\"queryId\":\"q1\",\"limit\":10,\"offset\":0}}

ENVIRONMENT:
    QUERY_CONTROL_STORE             memory | file (default: memory)
    QUERY_CONTROL_STORE_DIR         File backend root (default: ./checkpoints)
    QUERY_CONTROL_SHUTDOWN_TIMEOUT  Drain timeout in seconds (default: 30)
    QUERY_CONTROL_LOG_LEVEL         Tracing filter (default: info)
    QUERY_CONTROL_LOG_FORMAT        json | pretty (default: json)
    QUERY_CONTROL_CONFIG            Optional TOML config file

EXIT CODES:
    0  Success
    1  Failure
",
        env!("CARGO_PKG_VERSION")
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load();
    init_logging(&config.log_config())?;
    for w in &config.warnings {
        warn!(warning = %w, "configuration fell back to a default");
    }

    let service = Arc::new(QueryControlService::from_config(&config).await?);
    let handler = ControlHandler::new(service.clone());
    info!(
        store = %config.store,
        version = env!("CARGO_PKG_VERSION"),
        "query-control ready"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = run_session(&handler, stdin, stdout) => {
            let handled = result?;
            info!(handled, "input closed");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
        }
    }

    match service.shutdown(config.shutdown_timeout).await {
        ShutdownResult::Complete => Ok(()),
        ShutdownResult::Timeout { remaining } => {
            error!(remaining, "exiting with operations in flight");
            Ok(())
        }
    }
}
