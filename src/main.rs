use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use remote_tasks::Args;
use remote_tasks::CallerClient;
use remote_tasks::CallerServer;
use remote_tasks::JobHandle;
use remote_tasks::ProgressReporter;
use remote_tasks::RunnerClient;
use remote_tasks::RunnerServer;
use remote_tasks::WorkResult;
use serde_json::json;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    #[clap(flatten)]
    args: Args,

    /// Send trace events to a tokio-console instead of logging them.
    /// Requires the `tokio-console` feature.
    #[clap(long)]
    tokio_console: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the countdown work for every Caller that connects.
    Serve {
        #[clap(long, default_value = "127.0.0.1:9810")]
        listen: SocketAddr,
    },

    /// Dial a Caller-host and run the countdown work for it.
    Provide {
        /// `host:port` of the Caller-host
        peer: String,
    },

    /// Dial a Runner-host, issue one job and print its progress and outcome.
    Call {
        /// `host:port` of the Runner-host
        peer: String,

        /// Job arguments, each a JSON value. The countdown work takes the
        /// number of steps and the milliseconds per step.
        #[clap(value_parser = parse_json)]
        arguments: Vec<Value>,
    },

    /// Accept Runners, distribute jobs among them and print their outcomes.
    Marshal {
        #[clap(long, default_value = "127.0.0.1:9810")]
        listen: SocketAddr,

        /// Number of identical jobs to issue.
        #[clap(long, default_value = "1")]
        jobs: usize,

        /// Job arguments, each a JSON value.
        #[clap(value_parser = parse_json)]
        arguments: Vec<Value>,
    },
}

fn parse_json(s: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(s)
}

pub fn main() -> Result<()> {
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;

    let run_result = tokio_runtime.block_on(async {
        let cli = Cli::parse();

        #[cfg(not(feature = "tokio-console"))]
        {
            if cli.tokio_console {
                anyhow::bail!(
                    "tokio-console not included. Build with tokio-console feature-flag."
                );
            }

            set_up_logger()?;
        }

        #[cfg(feature = "tokio-console")]
        if cli.tokio_console {
            console_subscriber::init();
        } else {
            set_up_logger()?;
        }

        run(cli.command, cli.args).await
    });

    tokio_runtime.shutdown_timeout(Duration::from_secs(10));

    run_result
}

async fn run(command: Command, args: Args) -> Result<()> {
    match command {
        Command::Serve { listen } => {
            let server = RunnerServer::bind(countdown, listen, args).await?;
            info!("Serving countdown jobs on {}", server.local_addr());
            tokio::signal::ctrl_c().await?;
            server.close().await;
        }
        Command::Provide { peer } => {
            let runner = RunnerClient::connect(countdown, peer, args);
            tokio::signal::ctrl_c().await?;
            runner.close().await;
        }
        Command::Call { peer, arguments } => {
            let caller = CallerClient::connect(peer, args);
            let handle = caller.call(arguments)?;
            print_outcome(handle).await;
            caller.close().await;
        }
        Command::Marshal {
            listen,
            jobs,
            arguments,
        } => {
            let caller = CallerServer::bind(listen, args).await?;
            info!(
                "Waiting for Runners on {} to run {jobs} job(s)",
                caller.local_addr()
            );
            let handles = (0..jobs)
                .map(|_| caller.call(arguments.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            futures::future::join_all(handles.into_iter().map(print_outcome)).await;
            caller.close().await;
        }
    }

    Ok(())
}

async fn print_outcome(handle: JobHandle) {
    let job_id = handle.job_id();
    let outcome = handle
        .with_progress(|payload| println!("{job_id}: progress {payload}"))
        .await;
    match outcome {
        Ok(value) => println!("{job_id}: resolved {value}"),
        Err(err) => println!("{job_id}: {err}"),
    }
}

/// Counts up to `arguments[0]` steps (default 4), sleeping `arguments[1]`
/// milliseconds (default 500) before each, reporting every step.
async fn countdown(arguments: Vec<Value>, progress: ProgressReporter) -> WorkResult {
    let number = |i: usize, default: u64| match arguments.get(i) {
        None => Ok(default),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| json!(format!("argument {i} must be a non-negative integer"))),
    };
    let steps = number(0, 4)?;
    let step_duration = Duration::from_millis(number(1, 500)?);

    for step in 1..=steps {
        tokio::time::sleep(step_duration).await;
        progress.report(step);
    }

    Ok(json!("success"))
}

/// Configure logger to use ISO-8601, of which rfc3339 is a subset. Install
/// global collector configured based on RUST_LOG env var. Accepted `RUST_LOG`
/// values are `trace`, `debug`, `info`, `warn`, and `error`.
fn set_up_logger() -> Result<()> {
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .finish(),
    )?;
    Ok(())
}
