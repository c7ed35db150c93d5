#![cfg(unix)]

mod common;

use std::sync::Arc;

use common::*;
use ffconvert::hwaccel::{Detection, EncoderDetector, HwEncoder};

fn detector_with_probe(counter_name: &str) -> (TestHarness, std::path::PathBuf) {
    let mut harness = TestHarness::with_script("exit 1");
    let counter = harness.path(counter_name);
    harness.config.ffmpeg_path =
        write_script(harness.dir.path(), "probe-ffmpeg", &nvenc_only_probe(&counter));
    harness.config.gpu.enabled = true;
    (harness, counter)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_probe_sequence() {
    let (harness, counter) = detector_with_probe("probes.log");
    let detector = Arc::new(EncoderDetector::new(&harness.config));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let detector = detector.clone();
            tokio::spawn(async move { detector.detect().await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), Some(HwEncoder::Nvenc));
    }

    // videotoolbox fails, nvenc succeeds, nothing else is tried
    assert_eq!(count_lines(&counter), 2);
    assert_eq!(detector.detection(), Detection::Encoder(HwEncoder::Nvenc));

    // later calls hit the cache
    assert_eq!(detector.detect().await, Some(HwEncoder::Nvenc));
    assert_eq!(count_lines(&counter), 2);
}

#[tokio::test]
async fn preferred_vendor_is_probed_first() {
    let (mut harness, counter) = detector_with_probe("preferred.log");
    harness.config.gpu.preferred = "nvidia".to_owned();
    let detector = EncoderDetector::new(&harness.config);

    assert_eq!(detector.detect().await, Some(HwEncoder::Nvenc));
    assert_eq!(count_lines(&counter), 1);
}

#[tokio::test]
async fn no_working_encoder_means_software() {
    let mut harness = TestHarness::with_script("exit 1");
    harness.config.gpu.enabled = true;
    let detector = EncoderDetector::new(&harness.config);

    assert_eq!(detector.detection(), Detection::NotTested);
    assert_eq!(detector.detect().await, None);
    assert_eq!(detector.detection(), Detection::Unavailable);
    assert_eq!(detector.status_line().await, "GPU acceleration not available");
}

#[tokio::test]
async fn disabled_detection_never_probes() {
    let (mut harness, counter) = detector_with_probe("disabled.log");
    harness.config.gpu.enabled = false;
    let detector = EncoderDetector::new(&harness.config);

    assert_eq!(detector.detect().await, None);
    assert_eq!(detector.status_line().await, "GPU acceleration disabled");
    assert_eq!(count_lines(&counter), 0);
}
