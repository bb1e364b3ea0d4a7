//! Handheld target profile (H.264 Baseline / AAC in MP4) for ffmpeg.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Encoding settings for the handheld target.
///
/// Defaults match a 480x320 screen: letterboxed scale-and-pad, Baseline
/// 3.0 at 800 kbit/s, 64 kbit/s AAC at 22.05 kHz stereo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeProfile {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Colour of the padding bars.
    pub pad_color: String,
    /// Video encoder (default: libx264).
    pub video_codec: String,
    /// H.264 profile (default: baseline).
    pub video_profile: String,
    /// H.264 level (default: 3.0).
    pub video_level: String,
    /// Target video bitrate (default: 800k).
    pub video_bitrate: String,
    /// Bitrate ceiling (default: 1000k).
    pub max_rate: String,
    /// Rate control buffer size (default: 1000k).
    pub buffer_size: String,
    /// Audio encoder (default: aac).
    pub audio_codec: String,
    /// Audio bitrate (default: 64k).
    pub audio_bitrate: String,
    /// Audio sample rate in Hz (default: 22050).
    pub audio_sample_rate: u32,
    /// Audio channel count (default: 2).
    pub audio_channels: u32,
    /// ffmpeg muxer name (default: mp4).
    pub format: String,
    /// Output file extension without the dot (default: mp4).
    pub extension: String,
    /// Move the moov atom to the front for progressive playback.
    pub faststart: bool,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            width: 480,
            height: 320,
            pad_color: "black".to_string(),
            video_codec: "libx264".to_string(),
            video_profile: "baseline".to_string(),
            video_level: "3.0".to_string(),
            video_bitrate: "800k".to_string(),
            max_rate: "1000k".to_string(),
            buffer_size: "1000k".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "64k".to_string(),
            audio_sample_rate: 22050,
            audio_channels: 2,
            format: "mp4".to_string(),
            extension: "mp4".to_string(),
            faststart: true,
        }
    }
}

impl EncodeProfile {
    /// Video filter that scales into the target box preserving aspect ratio
    /// and pads the remainder.
    pub fn video_filter(&self) -> String {
        let (w, h) = (self.width, self.height);
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:{}",
            self.pad_color
        )
    }

    /// Build the full ffmpeg argument list for one conversion.
    ///
    /// Machine-readable progress goes to stdout (`-progress pipe:1`), the
    /// usual banner and stats lines to stderr. The output path is always the
    /// last argument.
    pub fn build_arguments(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = Vec::with_capacity(40);
        let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

        push(&["-i", &input.to_string_lossy()]);
        push(&["-vf", &self.video_filter()]);
        push(&[
            "-c:v",
            &self.video_codec,
            "-profile:v",
            &self.video_profile,
            "-level",
            &self.video_level,
        ]);
        push(&[
            "-b:v",
            &self.video_bitrate,
            "-maxrate",
            &self.max_rate,
            "-bufsize",
            &self.buffer_size,
        ]);
        push(&[
            "-c:a",
            &self.audio_codec,
            "-b:a",
            &self.audio_bitrate,
            "-ar",
            &self.audio_sample_rate.to_string(),
            "-ac",
            &self.audio_channels.to_string(),
        ]);
        push(&["-f", &self.format]);
        if self.faststart {
            push(&["-movflags", "+faststart"]);
        }
        push(&["-progress", "pipe:1"]);
        push(&["-y", &output.to_string_lossy()]);

        args
    }
}
