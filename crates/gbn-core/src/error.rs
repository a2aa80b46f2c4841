use gbn_abstract::{MAX_SEQ, SeqOutOfRange};
use thiserror::Error;

/// Why an incoming byte sequence was rejected as a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame of {len} bytes is shorter than the {min}-byte minimum")]
    TooShort { len: usize, min: usize },
    #[error("checksum mismatch (residue {residue:#010x})")]
    ChecksumMismatch { residue: u32 },
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("data frame carries no sequence number")]
    MissingSeq,
    #[error("payload of {len} bytes exceeds the {max}-byte packet limit")]
    PayloadTooLong { len: usize, max: usize },
    #[error("sequence field {0} exceeds {MAX_SEQ}")]
    SeqOutOfRange(u8),
}

impl From<SeqOutOfRange> for FrameError {
    fn from(err: SeqOutOfRange) -> Self {
        FrameError::SeqOutOfRange(err.0)
    }
}

/// Contract breaches on the sending side. Admission gating keeps these from
/// happening in a correctly driven link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("send window is full ({outstanding} frames outstanding)")]
    Full { outstanding: usize },
    #[error("packet of {len} bytes exceeds the {max}-byte limit")]
    Oversized { len: usize, max: usize },
}
