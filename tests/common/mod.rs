//! Shared fixtures for integration tests.
//!
//! Tests run against small shell scripts standing in for ffmpeg, so they do
//! not need a real installation. [`TestHarness`] owns a temp directory holding
//! the script, uploads and outputs.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use ffconvert::format::Format;
use ffconvert::models::{Job, Quality, State};
use ffconvert::Config;

/// Writes a file named after its last argument, like a real conversion.
pub const WRITES_OUTPUT: &str = r#"for last; do :; done
printf 'converted' > "$last"
exit 0"#;

/// Like [`WRITES_OUTPUT`], after holding on for a second.
pub const SLOW_WRITES_OUTPUT: &str = r#"sleep 1
for last; do :; done
printf 'converted' > "$last"
exit 0"#;

pub const EXITS_CLEAN_WITHOUT_OUTPUT: &str = "exit 0";

pub const FAILS: &str = r#"echo "Invalid data found when processing input" >&2
exit 1"#;

pub const HANGS: &str = "exec sleep 30";

pub struct TestHarness {
    pub dir: TempDir,
    pub config: Config,
}

impl TestHarness {
    /// Harness whose ffmpeg is a script with the given body.
    pub fn with_script(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ffmpeg = write_script(dir.path(), "ffmpeg", body);

        let mut config = Config::default();
        config.ffmpeg_path = ffmpeg;
        config.upload_dir = dir.path().join("uploads");
        config.output_dir = dir.path().join("output");
        config.gpu.enabled = false;

        Self { dir, config }
    }

    /// A pending job whose source is a small file inside the harness.
    pub fn job(&self, target: Format) -> Job {
        let id = Uuid::new_v4();
        std::fs::create_dir_all(&self.config.upload_dir).expect("create upload dir");
        let source_path = self.config.upload_dir.join(format!("{id}_original.mov"));
        std::fs::write(&source_path, b"not really a movie").expect("write source");

        let output_file_name = format!("clip_converted.{target}");

        Job {
            id,
            state: State::Pending,
            original_file_name: "clip.mov".to_owned(),
            original_format: "mov".to_owned(),
            source_path,
            target_format: target,
            quality: Quality::Medium,
            width: None,
            height: None,
            bitrate: None,
            output_path: self.config.output_dir.join(format!("{id}_{output_file_name}")),
            output_file_name,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            source_size: 18,
            output_size: None,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

/// Probe stand-in: records each call in `counter` and only accepts NVENC.
pub fn nvenc_only_probe(counter: &Path) -> String {
    format!(
        r#"echo "$*" >> "{}"
case "$*" in
  *h264_nvenc*) exit 0 ;;
esac
exit 1"#,
        counter.display()
    )
}

pub fn count_lines(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

/// Polls until `check` holds or five seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
