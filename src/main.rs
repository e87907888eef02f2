use clap::Parser;
use handshake_apply::config::ConfigError;
use handshake_apply::session::SessionError;
use handshake_apply::{
    AppConfig, FeedOutcome, Pipeline, RunError, StopSignal, capture_log, report, stop_signal,
};
use std::process::ExitCode;

mod args;
use args::{Args, Command, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let stop = watch_interrupts();

    let result = match args.command {
        Command::Apply(run) => apply(&run, stop).await,
        Command::Scrape(run) => scrape(&run, stop).await,
        Command::Reconstruct { input, output } => capture_log::reconstruct(&input, &output)
            .map(|count| println!("Wrote {} payloads to {}", count, output.display()))
            .map_err(RunError::from),
        Command::Inspect { file } => handshake_apply::inspect(&file).map(|outcome| print_jobs(&outcome)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Config(e)) => {
            eprintln!("Configuration error: {e}");
            ExitCode::from(1)
        }
        Err(RunError::Interrupted | RunError::Session(SessionError::Cancelled)) => {
            eprintln!("Interrupted.");
            ExitCode::from(130)
        }
        Err(e) => {
            ::log::error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(run: &RunArgs) -> Result<AppConfig, ConfigError> {
    let mut config = match &run.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    run.overlay(&mut config);
    Ok(config)
}

/// The first Ctrl-C stops the run and lets the browser close; a second one exits at once
fn watch_interrupts() -> StopSignal {
    let (handle, stop) = stop_signal();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            ::log::warn!("Ctrl-C handling unavailable: {}", e);
            return;
        }
        eprintln!("\nStopping, press Ctrl-C again to quit immediately.");
        handle.stop();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    stop
}

async fn scrape(run: &RunArgs, stop: StopSignal) -> Result<(), RunError> {
    let pipeline = Pipeline::new(load_config(run)?);
    println!("Note: a WebDriver server (e.g., ChromeDriver) must be running.");
    println!("Set WEBDRIVER_URL if not using {}", pipeline.config().webdriver_url);

    let outcome = pipeline.scrape(stop).await?;
    print_jobs(&outcome);
    Ok(())
}

async fn apply(run: &RunArgs, stop: StopSignal) -> Result<(), RunError> {
    let pipeline = Pipeline::new(load_config(run)?);
    let summary = pipeline.apply(stop).await?;
    ::log::info!("Run finished: {}", summary);
    Ok(())
}

fn print_jobs(outcome: &FeedOutcome) {
    match outcome {
        FeedOutcome::NoJobsFound => println!("No jobs found."),
        FeedOutcome::Jobs(result) => {
            for detail in result.details() {
                println!("{}", report::format_job(&detail.summary));
                println!(
                    "{}\n",
                    report::format_documents(detail.required_document_types.as_deref())
                );
            }
            println!(
                "{} jobs collected (feed reports {})",
                result.jobs.len(),
                result.total_count
            );
        }
    }
}
