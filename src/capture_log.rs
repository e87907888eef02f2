//! Durable record of captured GraphQL payloads and the offline tools that read it back.

use serde::de::IgnoredAny;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CaptureError + '_ {
    move |source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Append-only JSON Lines file, one payload per line
pub struct CaptureLog {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl CaptureLog {
    /// Open (or create) the log for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;

        ::log::info!("Mirroring captured payloads to {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Append one payload as a single line. Single-line JSON is written verbatim.
    pub fn append(&mut self, payload: &str) -> Result<(), CaptureError> {
        let payload = payload.trim();
        let line = if serde_json::from_str::<IgnoredAny>(payload).is_err() {
            // Keep non-JSON text on one line as a JSON string
            serde_json::to_string(payload)?
        } else if payload.contains(['\n', '\r']) {
            serde_json::from_str::<Value>(payload)?.to_string()
        } else {
            payload.to_string()
        };
        writeln!(self.writer, "{line}").map_err(io_error(&self.path))?;
        self.writer.flush().map_err(io_error(&self.path))?;
        self.written += 1;
        Ok(())
    }
}

/// Split a capture file into its raw payload strings.
///
/// Accepts JSON Lines, a JSON array of strings, or a JSON array of objects
/// (the output of [`reconstruct`]).
pub fn parse_captures(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<Value>>(trimmed) {
            return items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
        }
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_captures(path: impl AsRef<Path>) -> Result<Vec<String>, CaptureError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    Ok(parse_captures(&content))
}

/// Parse every captured string on its own, skipping the ones that are not JSON
pub fn parse_payloads(captures: &[String]) -> Vec<Value> {
    captures
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                ::log::warn!("Skipping capture #{}: {}", index, e);
                None
            }
        })
        .collect()
}

/// Rewrite a capture file as one pretty-printed JSON array; returns the number of entries kept
pub fn reconstruct(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<usize, CaptureError> {
    let output = output.as_ref();
    let values = parse_payloads(&read_captures(input)?);
    let pretty = serde_json::to_string_pretty(&values)?;
    fs::write(output, pretty).map_err(io_error(output))?;
    ::log::info!("Wrote {} payloads to {}", values.len(), output.display());
    Ok(values.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "handshake-apply-{}-{}-{}",
            name,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    #[test]
    fn test_parse_array_of_strings() {
        let content = r#"["{\"data\":{\"a\":1}}", "not json"]"#;
        let captures = parse_captures(content);
        assert_eq!(captures, vec![r#"{"data":{"a":1}}"#, "not json"]);
        assert_eq!(parse_payloads(&captures).len(), 1);
    }

    #[test]
    fn test_parse_json_lines() {
        let content = "{\"data\":{\"a\":1}}\n\n{\"data\":{\"b\":2}}\n";
        let values = parse_payloads(&parse_captures(content));
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["data"]["b"], 2);
    }

    #[test]
    fn test_parse_pretty_array_of_objects() {
        let content = "[\n  {\"data\": {\"a\": 1}},\n  {\"data\": {\"b\": 2}}\n]";
        let captures = parse_captures(content);
        assert_eq!(captures.len(), 2);
        assert_eq!(parse_payloads(&captures)[0]["data"]["a"], 1);
    }

    #[test]
    fn test_append_then_reconstruct() {
        let log_path = scratch("capture.jsonl");
        let out_path = scratch("pretty.json");

        {
            let mut log = CaptureLog::open(&log_path).unwrap();
            log.append("{\n  \"data\": {\"jobSearch\": null}\n}").unwrap();
            log.append("<html>oops</html>").unwrap();
            log.append(r#"{"data":{"job":{"id":"1"}}}"#).unwrap();
            assert_eq!(log.written(), 3);
        }

        let lines = fs::read_to_string(&log_path).unwrap();
        assert_eq!(lines.lines().count(), 3);

        // The HTML line is kept as a JSON string, so all three entries parse
        let kept = reconstruct(&log_path, &out_path).unwrap();
        assert_eq!(kept, 3);

        let pretty: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
        assert_eq!(pretty[2]["data"]["job"]["id"], "1");
        assert_eq!(pretty[1], Value::String("<html>oops</html>".to_string()));

        let _ = fs::remove_file(log_path);
        let _ = fs::remove_file(out_path);
    }

    #[test]
    fn test_single_line_payload_kept_verbatim() {
        let log_path = scratch("verbatim.jsonl");
        let raw = r#"{"data":{"z":1,"a":12345678901234567890123}}"#;
        {
            let mut log = CaptureLog::open(&log_path).unwrap();
            log.append(raw).unwrap();
        }
        assert_eq!(fs::read_to_string(&log_path).unwrap(), format!("{raw}\n"));
        let _ = fs::remove_file(log_path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_captures(scratch("missing")).unwrap_err();
        assert!(matches!(err, CaptureError::Io { .. }));
    }
}
