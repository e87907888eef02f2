//! Bridge to the external resume generator.
//!
//! The generator is a separate program speaking a one-shot JSON protocol: the
//! request goes to its stdin, exactly one JSON object comes back on stdout, and a
//! non-zero exit status means failure whatever it printed.

use crate::utils::sanitize_filename;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ResumeGenerationError {
    #[error("could not start resume generator `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("resume generator I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("resume generator exited with {}", .code.map_or("a signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit { code: Option<i32> },

    #[error("resume generator replied with malformed output: {0}")]
    Malformed(String),

    #[error("resume generator reported: {0}")]
    Reported(String),

    #[error("resume generator gave no reply within {0:?}")]
    TimedOut(Duration),
}

/// What the generator reads from stdin
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub job_description: String,
    pub job_title: String,
    pub company_name: String,
    pub output_path: PathBuf,
}

impl ResumeRequest {
    /// Output goes to `<output_dir>/<title>_<company>_<unix millis>.docx`
    pub fn new(description: &str, title: &str, company: &str, output_dir: &Path) -> Self {
        let file_name = format!(
            "{}_{}_{}.docx",
            sanitize_filename(title),
            sanitize_filename(company),
            chrono::Utc::now().timestamp_millis()
        );
        Self {
            job_description: description.to_string(),
            job_title: title.to_string(),
            company_name: company.to_string(),
            output_path: output_dir.join(file_name),
        }
    }
}

/// What the generator writes to stdout
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResumeReply {
    Failed {
        #[serde(alias = "errorMessage")]
        error: String,
    },
    Generated {
        #[serde(rename = "docxPath")]
        docx_path: PathBuf,
    },
}

/// Parse the generator's stdout into the path of the produced document
pub fn parse_reply(stdout: &[u8]) -> Result<PathBuf, ResumeGenerationError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Err(ResumeGenerationError::Malformed("no output".to_string()));
    }

    let reply: ResumeReply = serde_json::from_str(text)
        .map_err(|e| ResumeGenerationError::Malformed(format!("{e}: {text}")))?;

    match reply {
        ResumeReply::Failed { error } => Err(ResumeGenerationError::Reported(error)),
        ResumeReply::Generated { docx_path } if docx_path.as_os_str().is_empty() => Err(
            ResumeGenerationError::Malformed("empty docxPath".to_string()),
        ),
        ResumeReply::Generated { docx_path } => Ok(docx_path),
    }
}

/// Produces a tailored resume document for one job
#[allow(async_fn_in_trait)]
pub trait ResumeGenerator {
    async fn request_resume(&self, request: &ResumeRequest)
    -> Result<PathBuf, ResumeGenerationError>;
}

pub const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(180);

/// Runs `<program> <args..>` once per request, never two at a time
pub struct ResumeBridge {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    in_flight: Mutex<()>,
}

impl ResumeBridge {
    /// `python resume_generator.py`-style invocation
    pub fn new(program: impl Into<String>, script: impl Into<String>) -> Self {
        Self::with_args(program, vec![script.into()])
    }

    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: DEFAULT_RESUME_TIMEOUT,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Upper bound on one request, from spawn to exit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange(&self, request: &ResumeRequest) -> Result<PathBuf, ResumeGenerationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        ::log::debug!("Starting {} {:?}", self.program, self.args);
        let mut child = command
            .spawn()
            .map_err(|source| ResumeGenerationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let payload = serde_json::to_vec(request)
            .map_err(|e| ResumeGenerationError::Malformed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // The child quit without reading; its exit status tells why
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    ::log::debug!("Resume generator closed stdin early")
                }
                Err(e) => return Err(e.into()),
            }
            // Dropping stdin closes it so the child sees EOF
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ResumeGenerationError::NonZeroExit {
                code: output.status.code(),
            });
        }

        parse_reply(&output.stdout)
    }
}

impl ResumeGenerator for ResumeBridge {
    async fn request_resume(
        &self,
        request: &ResumeRequest,
    ) -> Result<PathBuf, ResumeGenerationError> {
        let _guard = self.in_flight.lock().await;

        // Dropping the exchange drops the child, and kill_on_drop reaps it
        let path = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| {
                ::log::warn!("Resume generator still running after {:?}, killing it", self.timeout);
                ResumeGenerationError::TimedOut(self.timeout)
            })??;
        ::log::info!("Resume generated at {}", path.display());
        Ok(path)
    }
}
