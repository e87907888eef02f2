use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use handshake_apply::{AppConfig, FeedStrategy};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "handshake-apply")]
#[command(about = "Collects Handshake job postings and prepares tailored applications")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape the job feed and prepare an application for every job
    Apply(RunArgs),

    /// Scrape the job feed and print the jobs found
    Scrape(RunArgs),

    /// Rewrite a capture log as one pretty-printed JSON array
    Reconstruct {
        /// Capture log (JSON Lines or JSON array)
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },

    /// Print every job and required-documents list found in a capture file
    Inspect {
        file: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Authenticated job search page
    #[arg(long, env = "HANDSHAKE_JOBS_URL")]
    pub jobs_url: Option<String>,

    /// How to read the job feed
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    #[arg(long, env = "PYTHON_EXECUTABLE")]
    pub python: Option<String>,

    /// Resume generator script
    #[arg(long, env = "PYTHON_RESUME_SCRIPT")]
    pub resume_script: Option<String>,

    /// Where generated resumes are written
    #[arg(long, env = "RESUME_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Working directory of the resume generator
    #[arg(long, env = "RESUME_WORKING_DIR")]
    pub resume_working_dir: Option<PathBuf>,

    /// Mirror captured GraphQL payloads to this JSON Lines file
    #[arg(long, env = "CAPTURE_LOG")]
    pub capture_log: Option<PathBuf>,

    /// Give up waiting for login after this many seconds
    #[arg(long)]
    pub login_timeout: Option<u64>,

    /// Skip every randomized pause, including the review window
    #[arg(long)]
    pub no_pauses: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Active,
    Passive,
    Dom,
}

/// Convert from CLI argument strategy to internal strategy
pub fn convert_strategy(arg: StrategyArg) -> FeedStrategy {
    match arg {
        StrategyArg::Active => FeedStrategy::Active,
        StrategyArg::Passive => FeedStrategy::Passive,
        StrategyArg::Dom => FeedStrategy::Dom,
    }
}

impl RunArgs {
    /// Flags and environment variables win over the config file
    pub fn overlay(&self, config: &mut AppConfig) {
        if let Some(url) = &self.jobs_url {
            config.jobs_url = Some(url.clone());
        }
        if let Some(strategy) = self.strategy {
            config.strategy = convert_strategy(strategy);
        }
        if let Some(url) = self.webdriver_url.as_ref().filter(|u| !u.is_empty()) {
            config.webdriver_url = url.clone();
        }
        if self.headless {
            config.headless = true;
        }
        if let Some(python) = &self.python {
            config.python_executable = python.clone();
        }
        if let Some(script) = &self.resume_script {
            config.resume_script = Some(script.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.resume_output_dir = dir.clone();
        }
        if let Some(dir) = &self.resume_working_dir {
            config.resume_working_dir = Some(dir.clone());
        }
        if let Some(path) = &self.capture_log {
            config.capture_log = Some(path.clone());
        }
        if let Some(secs) = self.login_timeout {
            config.login_timeout_secs = Some(secs);
        }
        if self.no_pauses {
            config.pacing = handshake_apply::utils::Pacing::immediate();
        }
    }
}
