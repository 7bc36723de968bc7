// Patch container format: header, frames, control records, varints.

pub mod control;
pub mod frame;
pub mod header;
pub mod varint;

pub use control::Operation;
pub use header::PatchHeader;
