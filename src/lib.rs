//! Pocketforge - batch video conversion for handheld players
//!
//! This library crate exposes the conversion orchestrator and its supporting
//! pieces; the `pocketforge` binary is a thin CLI on top.

pub mod config;
pub mod conversion;
pub mod diagnostics;
pub mod state;

pub use config::Config;
pub use conversion::{ConvertError, Orchestrator};
pub use diagnostics::{DiagnosticEntry, Diagnostics, EntryKind};
pub use state::{JobStatus, ProgressSnapshot};
