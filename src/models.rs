use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::format::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Anything other than `low` or `high` (in any case) means medium.
    pub fn parse_lenient(value: Option<&str>) -> Quality {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Quality::Low,
            Some("high") => Quality::High,
            _ => Quality::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: State,
    pub to: State,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal job transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub state: State,
    pub original_file_name: String,
    pub original_format: String,
    pub source_path: PathBuf,
    pub target_format: Format,
    pub quality: Quality,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u32>,
    pub output_file_name: String,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub source_size: u64,
    pub output_size: Option<u64>,
}

impl Job {
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.state != State::Pending {
            return Err(TransitionError {
                from: self.state,
                to: State::Processing,
            });
        }

        self.state = State::Processing;
        Ok(())
    }

    pub fn complete(&mut self, output_size: Option<u64>) -> Result<(), TransitionError> {
        if self.state != State::Processing {
            return Err(TransitionError {
                from: self.state,
                to: State::Completed,
            });
        }

        self.state = State::Completed;
        self.output_size = output_size;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Allowed from `Pending` too, for jobs that never got a worker.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError {
                from: self.state,
                to: State::Failed,
            });
        }

        let message = message.into();
        self.state = State::Failed;
        self.error_message = Some(if message.is_empty() {
            "conversion failed".to_owned()
        } else {
            message
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn upload_path(upload_dir: &Path, id: Uuid, original_file_name: &str) -> PathBuf {
    let extension = file_extension(original_file_name);

    if extension.is_empty() {
        upload_dir.join(format!("{id}_original"))
    } else {
        upload_dir.join(format!("{id}_original.{extension}"))
    }
}

pub fn output_file_name(original_file_name: &str, target: Format) -> String {
    let base = Path::new(original_file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!("{base}_converted.{target}")
}

#[cfg(test)]
pub(crate) fn test_job(target_format: Format) -> Job {
    let id = Uuid::new_v4();

    Job {
        id,
        state: State::Pending,
        original_file_name: "clip.mov".to_owned(),
        original_format: "mov".to_owned(),
        source_path: PathBuf::from(format!("uploads/{id}_original.mov")),
        target_format,
        quality: Quality::Medium,
        width: None,
        height: None,
        bitrate: None,
        output_file_name: output_file_name("clip.mov", target_format),
        output_path: PathBuf::from("output").join(output_file_name("clip.mov", target_format)),
        created_at: Utc::now(),
        completed_at: None,
        error_message: None,
        source_size: 1024,
        output_size: None,
    }
}
