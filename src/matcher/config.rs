// Matcher tuning parameters.

use crate::error::{Error, Result};
use crate::format::frame::MAX_FRAME_LEN;

/// Minimum copy score (length minus record cost) worth breaking an insert for.
pub const DEFAULT_MATCH_SCORE: u32 = 3;

/// Default streaming window and frame size (256 KiB).
pub const DEFAULT_STEP_MEM_SIZE: usize = 256 << 10;

/// Smallest accepted step size.
pub const MIN_STEP_MEM_SIZE: usize = 1 << 10;

/// Largest accepted step size; frames never exceed it.
pub const MAX_STEP_MEM_SIZE: usize = MAX_FRAME_LEN;

/// Default old-block width for the streaming index.
pub const DEFAULT_MATCH_BLOCK_SIZE: usize = 64;

pub const MIN_MATCH_BLOCK_SIZE: usize = 8;
pub const MAX_MATCH_BLOCK_SIZE: usize = 4096;

/// Matcher configuration shared by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Minimum score a copy needs before it replaces literal bytes.
    pub match_score: u32,
    /// Bytes of new held in memory at once by the streaming engine.
    pub step_mem_size: usize,
    /// Width of the old blocks indexed by the streaming engine.
    pub match_block_size: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_score: DEFAULT_MATCH_SCORE,
            step_mem_size: DEFAULT_STEP_MEM_SIZE,
            match_block_size: DEFAULT_MATCH_BLOCK_SIZE,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_STEP_MEM_SIZE..=MAX_STEP_MEM_SIZE).contains(&self.step_mem_size) {
            return Err(Error::InvalidArgument(format!(
                "step_mem_size {} outside {MIN_STEP_MEM_SIZE}..={MAX_STEP_MEM_SIZE}",
                self.step_mem_size
            )));
        }
        if !(MIN_MATCH_BLOCK_SIZE..=MAX_MATCH_BLOCK_SIZE).contains(&self.match_block_size) {
            return Err(Error::InvalidArgument(format!(
                "match_block_size {} outside {MIN_MATCH_BLOCK_SIZE}..={MAX_MATCH_BLOCK_SIZE}",
                self.match_block_size
            )));
        }
        if self.step_mem_size < 2 * self.match_block_size {
            return Err(Error::InvalidArgument(format!(
                "step_mem_size {} must hold two {}-byte blocks",
                self.step_mem_size, self.match_block_size
            )));
        }
        Ok(())
    }
}
