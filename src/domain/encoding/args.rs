//! Argument grammar for every encoder/prober invocation the engine makes.

use std::path::Path;

use super::hardware::HardwareProfile;
use super::ladder::rung;
use crate::domain::hls::playlist::{manifest_name, SEGMENT_PREFIX};
use crate::domain::jobs::{OutputFormat, Resolution};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// File a progressive format is written to inside its output directory.
pub fn progressive_file_name(format: OutputFormat, resolution: Resolution) -> String {
    format!("{}.{}", resolution, format)
}

fn h264_args(resolution: Resolution, hardware: HardwareProfile) -> Vec<String> {
    let r = rung(resolution);
    let mut args = vec![
        "-c:v".to_string(),
        hardware.h264_encoder().to_string(),
        "-b:v".to_string(),
        format!("{}k", r.video_kbps),
        "-maxrate".to_string(),
        format!("{}k", r.video_kbps),
        "-bufsize".to_string(),
        format!("{}k", r.video_kbps * 2),
        "-r".to_string(),
        r.framerate.to_string(),
        "-g".to_string(),
        r.gop.to_string(),
    ];
    if hardware == HardwareProfile::Cpu {
        args.extend(strings(&["-preset", "veryfast"]));
    }
    args.extend(strings(&["-pix_fmt", "yuv420p"]));
    args.extend([
        "-vf".to_string(),
        format!("scale=-2:{}", resolution.height()),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", r.audio_kbps),
    ]);
    args
}

fn codec_args(format: OutputFormat, resolution: Resolution, hardware: HardwareProfile) -> Vec<String> {
    let r = rung(resolution);
    let (video, audio, extra): (&str, &str, &[&str]) = match format {
        OutputFormat::Hls | OutputFormat::Mp4 => return h264_args(resolution, hardware),
        OutputFormat::Webm => (
            "libvpx-vp9",
            "libopus",
            &["-deadline", "realtime", "-cpu-used", "8"][..],
        ),
        OutputFormat::Ogv => ("libtheora", "libvorbis", &[][..]),
    };
    let mut args = vec![
        "-c:v".to_string(),
        video.to_string(),
        "-b:v".to_string(),
        format!("{}k", r.video_kbps),
        "-r".to_string(),
        r.framerate.to_string(),
        "-g".to_string(),
        r.gop.to_string(),
    ];
    args.extend(strings(extra));
    args.extend([
        "-vf".to_string(),
        format!("scale=-2:{}", resolution.height()),
        "-c:a".to_string(),
        audio.to_string(),
        "-b:a".to_string(),
        format!("{}k", r.audio_kbps),
    ]);
    args
}

/// Batch encode of a retained source into `output_dir`.
pub fn vod_args(
    source: &Path,
    output_dir: &Path,
    format: OutputFormat,
    resolution: Resolution,
    hardware: HardwareProfile,
    segment_seconds: u32,
) -> Vec<String> {
    let mut args = strings(&["-hide_banner", "-y", "-i"]);
    args.push(path_arg(source));
    args.extend(codec_args(format, resolution, hardware));

    match format {
        OutputFormat::Hls => {
            let segment_pattern =
                output_dir.join(format!("{}-{}-%d.ts", SEGMENT_PREFIX, resolution));
            args.extend([
                "-f".to_string(),
                "hls".to_string(),
                "-hls_time".to_string(),
                segment_seconds.to_string(),
                "-hls_playlist_type".to_string(),
                "vod".to_string(),
                "-hls_segment_filename".to_string(),
                path_arg(&segment_pattern),
                path_arg(&output_dir.join(manifest_name(resolution))),
            ]);
        }
        OutputFormat::Mp4 => {
            args.extend(strings(&["-movflags", "+faststart", "-f", "mp4"]));
            args.push(path_arg(&output_dir.join(progressive_file_name(format, resolution))));
        }
        OutputFormat::Webm => {
            args.extend(strings(&["-f", "webm"]));
            args.push(path_arg(&output_dir.join(progressive_file_name(format, resolution))));
        }
        OutputFormat::Ogv => {
            args.extend(strings(&["-f", "ogg"]));
            args.push(path_arg(&output_dir.join(progressive_file_name(format, resolution))));
        }
    }
    args
}

/// Live ingest: listen for one RTMP publisher and multiplex HLS onto stdout.
///
/// `list_size` of 0 keeps every segment in the manifest.
pub fn live_args(
    rtmp_url: &str,
    resolution: Resolution,
    hardware: HardwareProfile,
    segment_seconds: u32,
    list_size: usize,
) -> Vec<String> {
    let mut args = strings(&["-hide_banner", "-listen", "1", "-i"]);
    args.push(rtmp_url.to_string());
    args.extend(h264_args(resolution, hardware));
    args.extend([
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        segment_seconds.to_string(),
        "-hls_list_size".to_string(),
        list_size.to_string(),
        "-hls_segment_type".to_string(),
        "mpegts".to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Single still frame from transport-stream bytes written to stdin.
pub fn snapshot_args(output: &Path) -> Vec<String> {
    let mut args = strings(&[
        "-hide_banner", "-y", "-f", "mpegts", "-i", "pipe:0", "-frames:v", "1", "-q:v", "2",
    ]);
    args.push(path_arg(output));
    args
}

/// Scale-and-crop a still to exactly `width`x`height`.
pub fn resize_args(input: &Path, output: &Path, width: u32, height: u32) -> Vec<String> {
    let mut args = strings(&["-hide_banner", "-y", "-i"]);
    args.push(path_arg(input));
    args.extend([
        "-vf".to_string(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
            w = width,
            h = height
        ),
        "-frames:v".to_string(),
        "1".to_string(),
        path_arg(output),
    ]);
    args
}

pub fn duration_probe_args(source: &Path) -> Vec<String> {
    let mut args = strings(&[
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]);
    args.push(path_arg(source));
    args
}

pub fn encoder_listing_args() -> Vec<String> {
    strings(&["-hide_banner", "-encoders"])
}

/// Encodes a fraction of a second of synthetic video with `profile`'s encoder, discarding the result.
pub fn encoder_trial_args(profile: HardwareProfile) -> Vec<String> {
    let mut args = strings(&[
        "-hide_banner",
        "-v",
        "error",
        "-f",
        "lavfi",
        "-i",
        "nullsrc=s=256x144:d=0.1",
        "-c:v",
    ]);
    args.push(profile.h264_encoder().to_string());
    args.extend(strings(&["-f", "null", "-"]));
    args
}
