//! Upload validation and the read side of conversion jobs.
//!
//! The HTTP layer hands requests to [`ConversionService`]; everything here is
//! usable without a web server.

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatcher::ConversionDispatcher;
use crate::error::{Error, Result};
use crate::format::{Format, AUDIO_FORMATS, IMAGE_FORMATS, VIDEO_FORMATS};
use crate::hwaccel::EncoderDetector;
use crate::models::{file_extension, output_file_name, upload_path, Job, Quality, State};
use crate::processor::Transcoder;
use crate::store::JobStore;

/// Parameters accompanying an upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionRequest {
    #[serde(alias = "file_name")]
    pub filename: Option<String>,
    pub target_format: Option<String>,
    pub quality: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub status: State,
    pub original_file_name: String,
    pub converted_file_name: String,
    pub original_format: String,
    pub target_format: Format,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub original_file_size: u64,
    pub converted_file_size: Option<u64>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let download_url = match job.state {
            State::Completed => Some(format!("/api/files/download/{}", job.id)),
            _ => None,
        };

        Self {
            job_id: job.id,
            status: job.state,
            original_file_name: job.original_file_name.clone(),
            converted_file_name: job.output_file_name.clone(),
            original_format: job.original_format.clone(),
            target_format: job.target_format,
            created_at: job.created_at,
            completed_at: job.completed_at,
            download_url,
            error_message: job.error_message.clone(),
            original_file_size: job.source_size,
            converted_file_size: job.output_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportedFormats {
    pub video: Vec<Format>,
    pub audio: Vec<Format>,
    pub image: Vec<Format>,
}

pub fn supported_formats() -> SupportedFormats {
    SupportedFormats {
        video: VIDEO_FORMATS.to_vec(),
        audio: AUDIO_FORMATS.to_vec(),
        image: IMAGE_FORMATS.to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub ffmpeg_available: bool,
    pub gpu: Option<String>,
}

/// A finished output ready to be served.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

fn positive(name: &'static str, value: Option<u32>) -> Result<Option<u32>> {
    match value {
        Some(0) => Err(Error::InvalidParameter {
            name,
            reason: "must be greater than zero".to_owned(),
        }),
        other => Ok(other),
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| Error::NotFound(id.to_owned()))
}

#[derive(Clone)]
pub struct ConversionService {
    config: Arc<Config>,
    dispatcher: ConversionDispatcher,
}

impl ConversionService {
    pub fn new(config: Config) -> Self {
        let detector = Arc::new(EncoderDetector::new(&config));
        let transcoder = Arc::new(Transcoder::new(&config, detector));
        let dispatcher =
            ConversionDispatcher::new(JobStore::new(), transcoder, config.worker_count());

        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &ConversionDispatcher {
        &self.dispatcher
    }

    /// Validates the request, stores the upload and queues the conversion.
    ///
    /// No job exists unless this returns `Ok`.
    pub async fn start_conversion<S, B, E>(
        &self,
        request: ConversionRequest,
        body: S,
    ) -> Result<JobView>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let file_name = request
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(Error::MissingFileName)?
            .to_owned();

        if file_name.chars().any(char::is_control) {
            return Err(Error::InvalidParameter {
                name: "filename",
                reason: "must not contain control characters".to_owned(),
            });
        }

        let target_format: Format = match request.target_format.as_deref().map(str::trim) {
            None | Some("") => return Err(Error::MissingTargetFormat),
            Some(format) => format
                .parse()
                .map_err(|_| Error::UnsupportedFormat(format.to_owned()))?,
        };

        let width = positive("width", request.width)?;
        let height = positive("height", request.height)?;
        let bitrate = positive("bitrate", request.bitrate)?;

        info!(file = %file_name, target = %target_format, "Received conversion request");

        fs::create_dir_all(&self.config.upload_dir).await?;

        let id = Uuid::new_v4();
        let source_path = upload_path(&self.config.upload_dir, id, &file_name);

        let source_size = match self.save_upload(&source_path, body).await {
            Ok(0) => {
                let _ = fs::remove_file(&source_path).await;
                return Err(Error::EmptyFile);
            }
            Ok(size) => size,
            Err(err) => {
                // Partial uploads are never kept.
                let _ = fs::remove_file(&source_path).await;
                warn!(job_id = %id, "upload rejected: {err}");
                return Err(err);
            }
        };

        let output_name = output_file_name(&file_name, target_format);

        let job = Job {
            id,
            state: State::Pending,
            original_format: file_extension(&file_name),
            original_file_name: file_name,
            source_path,
            target_format,
            quality: Quality::parse_lenient(request.quality.as_deref()),
            width,
            height,
            bitrate,
            // one output file per job id
            output_path: self.config.output_dir.join(format!("{id}_{output_name}")),
            output_file_name: output_name,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            source_size,
            output_size: None,
        };

        let view = JobView::from(&job);
        self.dispatcher.submit(job);

        Ok(view)
    }

    async fn save_upload<S, B, E>(&self, path: &Path, mut body: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let limit = self.config.max_file_size_bytes();
        let mut file = fs::File::create(path).await?;
        let mut written: u64 = 0;

        while let Some(item) = body.next().await {
            let chunk = item.map_err(|e| Error::Upload(e.to_string()))?;
            let bytes = chunk.as_ref();

            written += bytes.len() as u64;
            if written > limit {
                return Err(Error::FileTooLarge {
                    limit: self.config.max_file_size.clone(),
                });
            }

            tokio::io::copy(&mut &bytes[..], &mut file).await?;
        }

        file.flush().await?;

        Ok(written)
    }

    pub fn status(&self, id: &str) -> Result<JobView> {
        let uuid = parse_id(id)?;

        self.dispatcher
            .fetch(&uuid)
            .map(|job| JobView::from(&job))
            .ok_or_else(|| Error::NotFound(id.to_owned()))
    }

    pub fn jobs(&self) -> Vec<JobView> {
        self.dispatcher.list().iter().map(JobView::from).collect()
    }

    /// Only completed jobs whose output is still on disk can be downloaded.
    pub async fn converted_file(&self, id: &str) -> Result<ConvertedFile> {
        let uuid = parse_id(id)?;

        let job = self
            .dispatcher
            .fetch(&uuid)
            .filter(|job| job.state == State::Completed)
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;

        let metadata = fs::metadata(&job.output_path)
            .await
            .map_err(|_| Error::NotFound(id.to_owned()))?;

        Ok(ConvertedFile {
            path: job.output_path,
            file_name: job.output_file_name,
            size: metadata.len(),
        })
    }

    pub async fn health(&self) -> HealthReport {
        let transcoder = self.dispatcher.transcoder();
        let ffmpeg_available = transcoder.is_available().await;

        let gpu = if ffmpeg_available {
            Some(transcoder.detector().status_line().await)
        } else {
            None
        };

        HealthReport {
            ffmpeg_available,
            gpu,
        }
    }

    /// No-op unless a retention period is configured.
    pub async fn purge_expired(&self) -> usize {
        match self.config.job_retention() {
            Some(max_age) => self.dispatcher.purge_expired(max_age).await,
            None => 0,
        }
    }
}
