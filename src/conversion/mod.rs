//! Batch conversion.
//!
//! An [`Orchestrator`] accepts one job at a time: an ordered list of input
//! files converted sequentially with the configured encode profile. A worker
//! task owns the running encoder process, turns its output into progress via
//! the parser, and publishes [`ProgressSnapshot`](crate::state::ProgressSnapshot)s.
//! Per-file failures and timeouts are recorded and the queue moves on;
//! cancellation stops the whole job.

mod job;
mod orchestrator;
mod worker;

pub use job::{
    display_name, ConversionJob, FileConversionState, FileFailure, FileOutcome, OutputNamer,
};
pub use orchestrator::{ConvertError, Orchestrator};
