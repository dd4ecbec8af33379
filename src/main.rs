use anyhow::Result;
use clap::Parser;
use easel::agent::Mode;
use easel::cli::{self, Cli, Commands, EXIT_FAILURE};
use easel::config::AppConfig;
use easel::credentials;
use easel::runner::{Progress, Runner};
use easel::runtime::{AgentRuntime, ProcessRuntime};
use easel::validate::{self, RunConfiguration, RunRequest};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Modes => {
            for mode in Mode::ALL {
                println!("  {:<10} {}", mode.as_str(), mode.description());
            }
        }

        Commands::Run {
            model,
            mode,
            message,
            workspace,
            timeout,
            verbose,
            output,
        } => {
            init_tracing(verbose);
            let app = AppConfig::from_env()?;
            let workspace = workspace.unwrap_or_else(|| app.default_workspace());
            let timeout = timeout.unwrap_or_else(|| app.default_timeout_secs.to_string());

            let request = RunRequest::new(workspace.to_string_lossy(), model, mode, message)
                .with_timeout(timeout)
                .with_verbose(verbose);

            let config = match prepare(&request) {
                Ok(config) => config,
                Err(e) if e.is_validation() => {
                    eprintln!("Invalid request: {}", e);
                    std::process::exit(EXIT_FAILURE);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(EXIT_FAILURE);
                }
            };

            let runtime = ProcessRuntime::from_config(&app)?;
            tracing::debug!("Agent command: {}", runtime.program());
            let (progress_tx, progress_rx) = mpsc::unbounded_channel();
            let runner = Runner::new(runtime)
                .with_release_grace(app.release_grace)
                .with_progress(progress_tx);
            tracing::debug!("Using {} runtime", runner.runtime().name());

            let interrupt = runner.interrupt_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nInterrupted, stopping agent...");
                    interrupt.cancel();
                }
            });
            let printer = tokio::spawn(print_progress(progress_rx));

            print_banner(&config);
            let result = runner.execute(config).await;
            drop(runner);
            let _ = printer.await;

            if let Err(e) =
                cli::print_result(&mut std::io::stdout(), &mut std::io::stderr(), &result, verbose)
            {
                tracing::warn!("Failed to print result: {}", e);
            }
            std::process::exit(cli::finish(&result, output.as_deref()));
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "easel=debug" } else { "easel=info" };
    let filter = std::env::var("EASEL_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Validate the request and check credentials before anything runs.
fn prepare(request: &RunRequest) -> easel::Result<RunConfiguration> {
    let config = validate::validate(request)?;
    if let Some(env_file) = credentials::load_env_file(config.workspace()) {
        tracing::debug!("Loaded environment from {:?}", env_file);
    }
    match credentials::ensure_api_key(config.model())? {
        Some(var) => tracing::debug!("Using credentials from {}", var),
        None => tracing::debug!("Provider {} needs no API key", config.model().provider()),
    }
    Ok(config)
}

fn print_banner(config: &RunConfiguration) {
    println!("Easel run");
    println!("  Workspace: {}", config.workspace().display());
    println!("  Model:     {}", config.model());
    println!("  Mode:      {}", config.mode());
    println!("  Timeout:   {}s", config.timeout_secs());
    println!();
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<Progress>) {
    while let Some(progress) = rx.recv().await {
        match progress {
            Progress::Step(step) => eprintln!("  [step] {}", step),
            Progress::Output(chunk) => println!("{}", chunk),
            Progress::Cancelling => eprintln!("  Cancelling agent..."),
            Progress::Started { .. } | Progress::Finished(_) => {}
        }
    }
}
