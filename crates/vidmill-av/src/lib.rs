//! # vidmill-av
//!
//! Media probing and ffmpeg command planning library for vidmill.
//!
//! This crate provides functionality for:
//! - Probing media files into a stream/chapter metadata model (ffprobe)
//! - Planning argument vectors for the fixed catalogue of media operations
//! - Pure chapter-sequence editing (add/edit/split/remove)
//! - Executing one external process per command with timeout, cancellation,
//!   bounded output capture, and artifact verification
//!
//! ## Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use vidmill_av::plan::{build, BuildContext, Operation, OperationRequest};
//!
//! # fn example() -> vidmill_av::Result<()> {
//! let request = OperationRequest {
//!     inputs: vec![PathBuf::from("/media/show.mkv")],
//!     output_name: "clip".into(),
//!     operation: Operation::Trim {
//!         start: std::time::Duration::from_secs(10),
//!         end: std::time::Duration::from_secs(70),
//!     },
//! };
//! let out_dir = PathBuf::from("/media/out");
//! let plan = build(&request, &BuildContext::new(&out_dir))?;
//! println!("{} command(s)", plan.commands.len());
//! # Ok(())
//! # }
//! ```

mod error;

pub mod chapters;
pub mod exec;
pub mod media;
pub mod plan;
pub mod probe;
pub mod timecode;
pub mod tools;

// Re-exports
pub use error::{Error, Result};
pub use exec::{ExecutionResult, Outcome, ProcessExecutor};
pub use media::{ChapterEntry, MediaFileInfo, StreamInfo, StreamKind, TrackSelector};
pub use plan::{
    build, BuildContext, CommandPlan, Operation, OperationRequest, PlannedCommand,
};
pub use probe::Prober;
pub use tools::{check_tools, ToolInfo, ToolPaths, ToolsConfig};
