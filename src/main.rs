// Entrypoint for the CLI application.
// - Keeps `main` small: parse options, route the command, build the
//   session and transport only when the command needs the API.
// - Usage errors exit 64, configuration errors 78, transport failures 1.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use htb_cli::api::{HttpOptions, HttpTransport, Session};
use htb_cli::cli::Cli;
use htb_cli::config::{self, ConfigError, SettlePolicy};
use htb_cli::dispatch::Dispatcher;
use htb_cli::render::{Render, View};
use htb_cli::router::{self, Invocation};
use htb_cli::ui::{self, Terminal};

const EX_USAGE: u8 = 64;
const EX_CONFIG: u8 = 78;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if err.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EX_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut terminal = Terminal::new();

    let invocation = match router::parse(&cli.command) {
        Ok(invocation) => invocation,
        Err(err) => {
            terminal.emit(View::Usage {
                reason: err.to_string(),
                usage: err.usage(),
            });
            return Ok(ExitCode::from(EX_USAGE));
        }
    };

    match invocation {
        Invocation::Help => {
            Cli::command().print_help()?;
            println!();
            Ok(ExitCode::SUCCESS)
        }
        Invocation::Login => {
            let env_file = env_file(&cli)?;
            let token = ui::prompt_token().context("Failed to read token")?;
            config::store_token(&env_file, &token)?;
            println!("Token saved to {}", env_file.display());
            Ok(ExitCode::SUCCESS)
        }
        Invocation::Api(command) => {
            let token = config::resolve_token(cli.token.as_deref(), || env_file(&cli))?;
            let session = Session::new(token, cli.api_url.as_str());
            tracing::debug!(?session, "session ready");
            let options = HttpOptions {
                insecure: cli.insecure,
                proxy: cli.proxy.clone(),
                timeout: Duration::from_secs(cli.timeout),
            };
            let transport = HttpTransport::new(session, &options)?;
            let settle = SettlePolicy {
                attempts: cli.settle_attempts,
                interval: Duration::from_millis(cli.settle_interval_ms),
            };

            let report = Dispatcher::new(&transport)
                .with_settle(settle)
                .run(&command, &mut terminal);
            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn env_file(cli: &Cli) -> Result<PathBuf, ConfigError> {
    match &cli.env_file {
        Some(path) => Ok(path.clone()),
        None => config::default_env_file(),
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the level from `error`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
