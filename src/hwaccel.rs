//! Hardware encoder discovery.
//!
//! The first time a video job needs an encoder, each candidate is tried with a
//! one second synthetic encode. The answer is cached for the lifetime of the
//! detector, which `main` creates once and shares.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwEncoder {
    VideoToolbox,
    Nvenc,
    Amf,
    Qsv,
}

/// First success wins.
pub const PROBE_ORDER: [HwEncoder; 4] = [
    HwEncoder::VideoToolbox,
    HwEncoder::Nvenc,
    HwEncoder::Amf,
    HwEncoder::Qsv,
];

impl HwEncoder {
    pub fn encoder_name(&self) -> &'static str {
        match self {
            HwEncoder::VideoToolbox => "h264_videotoolbox",
            HwEncoder::Nvenc => "h264_nvenc",
            HwEncoder::Amf => "h264_amf",
            HwEncoder::Qsv => "h264_qsv",
        }
    }

    /// Accepts vendor names as well as ffmpeg encoder names. `auto` is `None`.
    pub fn from_vendor(vendor: &str) -> Option<HwEncoder> {
        match vendor.trim().to_ascii_lowercase().as_str() {
            "apple" | "videotoolbox" | "h264_videotoolbox" => Some(HwEncoder::VideoToolbox),
            "nvidia" | "nvenc" | "h264_nvenc" => Some(HwEncoder::Nvenc),
            "amd" | "amf" | "h264_amf" => Some(HwEncoder::Amf),
            "intel" | "qsv" | "quicksync" | "h264_qsv" => Some(HwEncoder::Qsv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    NotTested,
    Unavailable,
    Encoder(HwEncoder),
}

pub struct EncoderDetector {
    ffmpeg_path: PathBuf,
    enabled: bool,
    auto_detect: bool,
    preferred: Option<HwEncoder>,
    probe_timeout: Duration,
    cache: OnceCell<Option<HwEncoder>>,
}

impl EncoderDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            enabled: config.gpu.enabled,
            auto_detect: config.gpu.auto_detect,
            preferred: HwEncoder::from_vendor(&config.gpu.preferred),
            probe_timeout: config.probe_timeout(),
            cache: OnceCell::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Probes on first call; every later or concurrent call sees the same answer.
    pub async fn detect(&self) -> Option<HwEncoder> {
        if !self.enabled {
            return None;
        }

        *self.cache.get_or_init(|| self.probe_all()).await
    }

    /// Reads the cache without probing.
    pub fn detection(&self) -> Detection {
        match self.cache.get() {
            None => Detection::NotTested,
            Some(None) => Detection::Unavailable,
            Some(Some(encoder)) => Detection::Encoder(*encoder),
        }
    }

    pub async fn status_line(&self) -> String {
        if !self.enabled {
            return "GPU acceleration disabled".to_owned();
        }

        match self.detect().await {
            Some(encoder) => format!("GPU acceleration enabled: {}", encoder.encoder_name()),
            None => "GPU acceleration not available".to_owned(),
        }
    }

    fn candidates(&self) -> Vec<HwEncoder> {
        let mut order: Vec<HwEncoder> = PROBE_ORDER.to_vec();

        if let Some(preferred) = self.preferred {
            order.retain(|encoder| *encoder != preferred);
            order.insert(0, preferred);
        }

        order
    }

    async fn probe_all(&self) -> Option<HwEncoder> {
        if !self.auto_detect {
            info!(preferred = ?self.preferred, "GPU auto-detection disabled");
            return self.preferred;
        }

        info!("Detecting GPU acceleration capabilities...");

        for encoder in self.candidates() {
            if self.probe(encoder).await {
                info!(encoder = encoder.encoder_name(), "GPU acceleration available");
                return Some(encoder);
            }
        }

        info!("No GPU acceleration available, falling back to CPU encoding");
        None
    }

    async fn probe(&self, encoder: HwEncoder) -> bool {
        let child = Command::new(&self.ffmpeg_path)
            .args([
                "-hide_banner",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=1:size=32x32:rate=1",
                "-c:v",
                encoder.encoder_name(),
                "-f",
                "null",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(err) => {
                debug!(encoder = encoder.encoder_name(), "probe failed to start: {err}");
                return false;
            }
        };

        // wait_with_output drains both pipes while waiting.
        match tokio::time::timeout(self.probe_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                debug!(
                    encoder = encoder.encoder_name(),
                    status = %output.status,
                    "probe finished"
                );
                output.status.success()
            }
            Ok(Err(err)) => {
                debug!(encoder = encoder.encoder_name(), "probe failed: {err}");
                false
            }
            Err(_) => {
                debug!(
                    encoder = encoder.encoder_name(),
                    "probe timed out after {:?}", self.probe_timeout
                );
                false
            }
        }
    }
}
