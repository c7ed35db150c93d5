use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ffmpeg_path: PathBuf,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    /// e.g. `100MB`, `512KB`, `2GB`
    pub max_file_size: String,
    pub gpu: GpuConfig,
    /// Upper bound on transcodes running at once; `None` means one per CPU.
    pub max_concurrent_jobs: Option<usize>,
    pub transcode_timeout_secs: Option<u64>,
    pub probe_timeout_secs: u64,
    /// Completed and failed jobs are kept forever when unset.
    pub expire_completed_jobs_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub enabled: bool,
    pub auto_detect: bool,
    /// `auto`, or one of `videotoolbox`, `nvidia`, `amd`, `intel`.
    pub preferred: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_detect: true,
            preferred: "auto".to_owned(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3600,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            upload_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./output"),
            max_file_size: "100MB".to_owned(),
            gpu: GpuConfig::default(),
            max_concurrent_jobs: None,
            transcode_timeout_secs: None,
            probe_timeout_secs: 15,
            expire_completed_jobs_after_secs: None,
        }
    }
}

impl Config {
    /// Reads the TOML file if one is given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&text)
                    .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?
            }
            None => Config::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|s| s.parse::<u16>().ok()) {
            self.port = port;
        }
        if let Some(host) = lookup("FFCONVERT_HOST") {
            self.host = host;
        }
        if let Some(path) = lookup("FFMPEG_PATH") {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("FFCONVERT_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FFCONVERT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("FFCONVERT_MAX_FILE_SIZE") {
            self.max_file_size = size;
        }
        if let Some(flag) = lookup("FFCONVERT_GPU_ENABLED").and_then(|s| parse_flag(&s)) {
            self.gpu.enabled = flag;
        }
        if let Some(flag) = lookup("FFCONVERT_GPU_AUTO_DETECT").and_then(|s| parse_flag(&s)) {
            self.gpu.auto_detect = flag;
        }
        if let Some(preferred) = lookup("FFCONVERT_GPU_PREFERRED") {
            self.gpu.preferred = preferred;
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        parse_file_size(&self.max_file_size)
    }

    pub fn worker_count(&self) -> usize {
        self.max_concurrent_jobs
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    pub fn transcode_timeout(&self) -> Option<Duration> {
        self.transcode_timeout_secs.map(Duration::from_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn job_retention(&self) -> Option<Duration> {
        self.expire_completed_jobs_after_secs.map(Duration::from_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses `<number>[KB|MB|GB]`. Anything unparsable means 100MB.
pub fn parse_file_size(size: &str) -> u64 {
    let size_re = Regex::new(r"(?i)^\s*(\d+)\s*(KB|MB|GB)?\s*$").unwrap();

    let Some(cap) = size_re.captures(size) else {
        return DEFAULT_MAX_FILE_SIZE;
    };

    let multiplier: u64 = match cap.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(unit) if unit == "KB" => 1024,
        Some(unit) if unit == "MB" => 1024 * 1024,
        Some(unit) if unit == "GB" => 1024 * 1024 * 1024,
        _ => 1,
    };

    cap[1]
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .unwrap_or(DEFAULT_MAX_FILE_SIZE)
}
