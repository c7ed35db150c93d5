//! ffmpeg argument synthesis.
//!
//! `build_command` is a pure function of the job, the ffmpeg path and the
//! hardware encoder in effect, so the same inputs always give the same argv.

use std::path::Path;

use crate::format::{Format, MediaKind};
use crate::hwaccel::HwEncoder;
use crate::models::{Job, Quality};

/// Software x264 settings: (crf, preset).
fn software_quality(quality: Quality) -> (u8, &'static str) {
    match quality {
        Quality::Low => (28, "fast"),
        Quality::Medium => (23, "medium"),
        Quality::High => (18, "slow"),
    }
}

fn preset(quality: Quality) -> &'static str {
    software_quality(quality).1
}

fn quantizer(quality: Quality) -> u8 {
    software_quality(quality).0
}

/// Vendor-specific rate control flags for `encoder`.
fn hardware_parameters(encoder: HwEncoder, quality: Quality) -> Vec<String> {
    match encoder {
        HwEncoder::VideoToolbox => {
            let q = match quality {
                Quality::Low => 70,
                Quality::Medium => 80,
                Quality::High => 90,
            };
            vec!["-q:v".into(), q.to_string()]
        }
        HwEncoder::Nvenc => vec![
            "-preset".into(),
            preset(quality).into(),
            "-cq".into(),
            quantizer(quality).to_string(),
        ],
        HwEncoder::Amf => {
            let mode = match quality {
                Quality::Low => "speed",
                Quality::Medium => "balanced",
                Quality::High => "quality",
            };
            vec![
                "-quality".into(),
                mode.into(),
                "-rc".into(),
                "cqp".into(),
                "-qp_i".into(),
                quantizer(quality).to_string(),
                "-qp_p".into(),
                (quantizer(quality) + 2).to_string(),
            ]
        }
        HwEncoder::Qsv => vec![
            "-preset".into(),
            preset(quality).into(),
            "-global_quality".into(),
            quantizer(quality).to_string(),
        ],
    }
}

/// Audio codec muxed alongside video in each container.
fn container_audio_codec(format: Format) -> Option<&'static str> {
    match format {
        Format::Mp4 | Format::Mov | Format::Mkv => Some("aac"),
        Format::Avi => Some("mp3"),
        _ => None,
    }
}

fn audio_codec(format: Format) -> Option<&'static str> {
    match format {
        Format::Mp3 => Some("libmp3lame"),
        Format::Wav => Some("pcm_s16le"),
        Format::Flac => Some("flac"),
        Format::Aac => Some("aac"),
        _ => None,
    }
}

/// `-q:v` for mjpeg, where lower is better.
fn jpeg_quality(quality: Quality) -> u8 {
    match quality {
        Quality::High => 1,
        Quality::Medium => 2,
        Quality::Low => 5,
    }
}

fn push_scale(args: &mut Vec<String>, job: &Job) {
    if let (Some(width), Some(height)) = (job.width, job.height) {
        args.extend(["-s".to_owned(), format!("{width}x{height}")]);
    }
}

fn video_arguments(args: &mut Vec<String>, job: &Job, encoder: Option<HwEncoder>) {
    match encoder {
        Some(encoder) => {
            args.extend(["-c:v".to_owned(), encoder.encoder_name().to_owned()]);
            args.extend(hardware_parameters(encoder, job.quality));
            if let Some(codec) = container_audio_codec(job.target_format) {
                args.extend(["-c:a".to_owned(), codec.to_owned()]);
            }
        }
        None => {
            let (crf, preset) = software_quality(job.quality);
            args.extend([
                "-crf".to_owned(),
                crf.to_string(),
                "-preset".to_owned(),
                preset.to_owned(),
            ]);
            args.extend(["-c:v".to_owned(), "libx264".to_owned()]);
            if let Some(codec) = container_audio_codec(job.target_format) {
                args.extend(["-c:a".to_owned(), codec.to_owned()]);
            }
        }
    }

    push_scale(args, job);

    if let Some(bitrate) = job.bitrate {
        args.extend(["-b:v".to_owned(), format!("{bitrate}k")]);
    }
}

fn audio_arguments(args: &mut Vec<String>, job: &Job) {
    if let Some(codec) = audio_codec(job.target_format) {
        args.extend(["-c:a".to_owned(), codec.to_owned()]);
    }

    if let Some(bitrate) = job.bitrate {
        args.extend(["-b:a".to_owned(), format!("{bitrate}k")]);
    }
}

fn image_arguments(args: &mut Vec<String>, job: &Job) {
    push_scale(args, job);

    if matches!(job.target_format, Format::Jpg | Format::Jpeg) {
        args.extend(["-q:v".to_owned(), jpeg_quality(job.quality).to_string()]);
    }
}

/// Full argv for converting `job`, starting with the ffmpeg path itself.
///
/// `encoder` is the hardware encoder to use, which callers only pass when
/// hardware acceleration is enabled and detection found one.
pub fn build_command(job: &Job, ffmpeg_path: &Path, encoder: Option<HwEncoder>) -> Vec<String> {
    let mut args = vec![
        ffmpeg_path.to_string_lossy().into_owned(),
        "-i".to_owned(),
        job.source_path.to_string_lossy().into_owned(),
    ];

    match job.target_format.kind() {
        MediaKind::Video => video_arguments(&mut args, job, encoder),
        MediaKind::Audio => audio_arguments(&mut args, job),
        MediaKind::Image => image_arguments(&mut args, job),
        MediaKind::Unsupported => {}
    }

    args.push("-y".to_owned());
    args.push(job.output_path.to_string_lossy().into_owned());

    args
}
