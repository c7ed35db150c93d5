use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::build_command;
use crate::config::Config;
use crate::hwaccel::EncoderDetector;
use crate::models::Job;

/// Lines of ffmpeg output kept in the log when a conversion fails.
const FAILURE_LOG_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Completed { output_size: Option<u64> },
    Failed { message: String },
}

pub struct Transcoder {
    ffmpeg_path: PathBuf,
    output_dir: PathBuf,
    timeout: Option<Duration>,
    detector: Arc<EncoderDetector>,
}

async fn drain<R: AsyncRead + Unpin>(id: Uuid, reader: Option<R>) -> Vec<String> {
    let Some(reader) = reader else {
        return vec![];
    };

    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    let mut lines = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer).trim_end().to_owned();
                debug!(job_id = %id, "ffmpeg: {line}");
                lines.push(line);
            }
            Err(err) => {
                debug!(job_id = %id, "stopped reading ffmpeg output: {err}");
                break;
            }
        }
    }

    lines
}

/// Reads both pipes to the end before waiting, so ffmpeg never stalls on a
/// full pipe buffer.
async fn wait_for_exit(child: &mut Child, id: Uuid) -> std::io::Result<(ExitStatus, Vec<String>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (mut output, errors) = tokio::join!(drain(id, stdout), drain(id, stderr));
    output.extend(errors);

    let status = child.wait().await?;

    Ok((status, output))
}

impl Transcoder {
    pub fn new(config: &Config, detector: Arc<EncoderDetector>) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            output_dir: config.output_dir.clone(),
            timeout: config.transcode_timeout(),
            detector,
        }
    }

    pub fn detector(&self) -> &EncoderDetector {
        &self.detector
    }

    /// Converts one job. Every failure is folded into the returned outcome.
    pub async fn run(&self, job: &Job) -> TranscodeOutcome {
        match self.transcode(job).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(job_id = %job.id, "Error during file conversion: {err}");
                TranscodeOutcome::Failed {
                    message: format!("Conversion error: {err}"),
                }
            }
        }
    }

    async fn transcode(&self, job: &Job) -> std::io::Result<TranscodeOutcome> {
        fs::create_dir_all(&self.output_dir).await?;
        if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let encoder = if self.detector.enabled() {
            self.detector.detect().await
        } else {
            None
        };

        let arguments = build_command(job, &self.ffmpeg_path, encoder);

        info!(job_id = %job.id, "Executing FFmpeg command: {}", arguments.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&arguments[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (status, output) = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, wait_for_exit(&mut child, job.id)).await;
                match waited {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!(
                            job_id = %job.id,
                            "ffmpeg still running after {}s, killing it",
                            limit.as_secs()
                        );
                        if let Err(err) = child.kill().await {
                            warn!(job_id = %job.id, "failed to kill ffmpeg: {err}");
                        }
                        return Ok(TranscodeOutcome::Failed {
                            message: format!(
                                "ffmpeg conversion timed out after {}s",
                                limit.as_secs()
                            ),
                        });
                    }
                }
            }
            None => wait_for_exit(&mut child, job.id).await?,
        };

        if status.success() {
            info!(job_id = %job.id, "FFmpeg conversion completed successfully");

            let output_size = match fs::metadata(&job.output_path).await {
                Ok(metadata) => Some(metadata.len()),
                Err(_) => {
                    warn!(
                        job_id = %job.id,
                        path = %job.output_path.display(),
                        "ffmpeg exited cleanly but produced no output file"
                    );
                    None
                }
            };

            return Ok(TranscodeOutcome::Completed { output_size });
        }

        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| status.to_string());

        error!(job_id = %job.id, "FFmpeg conversion failed with exit code: {code}");
        let skip = output.len().saturating_sub(FAILURE_LOG_LINES);
        error!(job_id = %job.id, "FFmpeg output:\n{}", output[skip..].join("\n"));

        Ok(TranscodeOutcome::Failed {
            message: format!("FFmpeg conversion failed with exit code: {code}"),
        })
    }

    /// `ffmpeg -version` exits zero.
    pub async fn is_available(&self) -> bool {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(err) => {
                error!("FFmpeg not available: {err}");
                false
            }
        }
    }
}
