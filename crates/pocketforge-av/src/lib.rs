//! # pocketforge-av
//!
//! Encoder plumbing for pocketforge.
//!
//! This crate provides:
//! - Encoder discovery ([`locate_encoder`], [`check_tool`]) over configured
//!   paths, well-known install locations and `PATH`
//! - The handheld target profile and its ffmpeg argument list ([`EncodeProfile`])
//! - Process spawning with merged, line-oriented output ([`EncoderCommand`],
//!   [`EncoderBackend`], [`EncoderProcess`])
//! - An incremental parser turning ffmpeg output into [`ProgressEvent`]s
//!
//! ## Example
//!
//! ```
//! use pocketforge_av::{ProgressEvent, ProgressParser};
//!
//! let mut parser = ProgressParser::new();
//! parser.feed_line("  Duration: 00:00:10.00, start: 0.000000, bitrate: 800 kb/s");
//! let events = parser.feed_line("out_time_us=2500000");
//! assert_eq!(events, vec![ProgressEvent::PositionAdvanced(2.5)]);
//! ```

mod error;
pub mod process;
pub mod profile;
pub mod progress;
pub mod tools;

// Re-exports
pub use error::{Error, Result};
pub use process::{EncoderBackend, EncoderCommand, EncoderProcess, FfmpegBackend, SpawnedProcess};
pub use profile::EncodeProfile;
pub use progress::{parse_time_string, ProgressEvent, ProgressParser};
pub use tools::{check_tool, locate_encoder, ToolInfo, ToolsConfig};
