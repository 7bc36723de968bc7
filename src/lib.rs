//! hdelta: compressed binary diff/patch.
//!
//! A patch reproduces `new` from `old` as a sequence of copy and insert
//! operations. The operations are written into a compressed control stream
//! and a literal stream behind a small header. The encoder decodes every
//! patch it produces before returning it.
//!
//! The crate provides:
//! - In-memory `diff` / `patch` (`engine`)
//! - File-path `diff_file` / `patch_file` with bounded memory (`io`)
//! - A worker-pool task dispatcher (`dispatch`)
//! - The patch container format (`format`) and matchers (`matcher`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! let old = b"hello old world";
//! let new = b"hello new world";
//!
//! let delta = hdelta::diff(old, new).unwrap();
//! let restored = hdelta::patch(old, &delta).unwrap();
//! assert_eq!(restored, new);
//! ```

pub mod delta;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod format;
pub mod io;
pub mod matcher;
pub mod stream;

#[cfg(feature = "cli")]
pub mod cli;

pub use delta::{CodecConfig, CodecKind, DiffOptions, PatchOptions};
pub use dispatch::{Dispatcher, Output, Task, TaskHandle};
pub use engine::{diff, diff_spans, diff_with_options, inspect, patch, patch_with_options};
pub use error::{Error, Result};
pub use format::{Operation, PatchHeader};
pub use io::{
    DiffStats, PatchStats, diff_file, diff_file_with_stats, patch_file, patch_file_with_stats,
};
pub use stream::ByteSpan;
