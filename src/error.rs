// Crate-wide error taxonomy.
//
// Every public operation returns `Result<T, Error>`. Variants separate bad
// input data, bad patches, encoder self-check failures and environment I/O so
// callers can tell them apart without parsing messages.

use std::fmt;
use std::io;

/// Which file an I/O failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRole {
    Old,
    New,
    Diff,
}

impl fmt::Display for IoRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Old => "old",
            Self::New => "new",
            Self::Diff => "diff",
        })
    }
}

/// Which stage of a stream's lifecycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStage {
    Open,
    OpenForWrite,
    Read,
    Write,
    Close,
    Verify,
}

impl fmt::Display for IoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::OpenForWrite => "open for write",
            Self::Read => "read",
            Self::Write => "write",
            Self::Close => "close",
            Self::Verify => "verify",
        })
    }
}

/// "open old file", "open diff file for write", ...
fn io_action(stage: &IoStage, role: &IoRole) -> String {
    match stage {
        IoStage::OpenForWrite => format!("open {role} file for write"),
        _ => format!("{stage} {role} file"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unusable caller input (empty path, zero step size, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The diff blob is too short to even probe for a header.
    #[error("invalid diff data: too short ({0} bytes)")]
    TooShort(usize),

    /// Header unparsable, or stream framing internally inconsistent.
    #[error("malformed patch: {0}")]
    MalformedPatch(String),

    /// The supplied old data does not have the size recorded in the header.
    #[error("old data size mismatch: patch expects {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// No decoder is available for the header's compression tag.
    #[error("unsupported diff compress type: {0}")]
    UnsupportedCodec(u8),

    /// Replaying an operation would leave the old or output bounds.
    #[error("patch apply failed: {0}")]
    Apply(String),

    /// The encoder could not produce a patch.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The freshly produced patch did not reproduce the new data.
    #[error("diff code error: {0}")]
    Corruption(String),

    /// Open/read/write/close failure on one of the files.
    #[error("{} failed: {source}", io_action(.stage, .role))]
    Io {
        role: IoRole,
        stage: IoStage,
        #[source]
        source: io::Error,
    },

    /// A dispatched task did not run to completion.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl Error {
    pub(crate) fn io(role: IoRole, stage: IoStage, source: io::Error) -> Self {
        Self::Io {
            role,
            stage,
            source,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPatch(msg.into())
    }

    pub(crate) fn apply(msg: impl Into<String>) -> Self {
        Self::Apply(msg.into())
    }

    /// True if the error describes a damaged or inapplicable patch.
    pub fn is_bad_patch(&self) -> bool {
        matches!(
            self,
            Self::TooShort(_)
                | Self::MalformedPatch(_)
                | Self::UnsupportedCodec(_)
                | Self::Apply(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_message_names_stage_and_role() {
        let err = Error::io(
            IoRole::Diff,
            IoStage::OpenForWrite,
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "open diff file for write failed: denied");

        let err = Error::io(IoRole::New, IoStage::Read, io::Error::other("eof"));
        assert_eq!(err.to_string(), "read new file failed: eof");
    }

    #[test]
    fn bad_patch_classification() {
        assert!(Error::malformed("x").is_bad_patch());
        assert!(Error::apply("x").is_bad_patch());
        assert!(Error::UnsupportedCodec(9).is_bad_patch());
        assert!(
            !Error::SizeMismatch {
                expected: 1,
                actual: 2
            }
            .is_bad_patch()
        );
        assert!(!Error::Corruption("x".into()).is_bad_patch());
    }
}
