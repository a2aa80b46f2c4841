use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest sequence number a frame can carry.
pub const MAX_SEQ: u8 = 7;

/// Size of the sequence space (`MAX_SEQ + 1`). All arithmetic wraps at this value.
pub const SEQ_SPACE: u8 = MAX_SEQ + 1;

/// Maximum number of unacknowledged frames. Must stay below `SEQ_SPACE`.
pub const WINDOW_SIZE: usize = MAX_SEQ as usize;

/// Maximum payload length of a single network-layer packet.
pub const PKT_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sequence number {0} is outside 0..={MAX_SEQ}")]
pub struct SeqOutOfRange(pub u8);

/// A sequence number in `[0, MAX_SEQ]` with modulo arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Seq(u8);

impl Seq {
    pub const ZERO: Seq = Seq(0);

    pub fn new(value: u8) -> Result<Self, SeqOutOfRange> {
        if value <= MAX_SEQ {
            Ok(Self(value))
        } else {
            Err(SeqOutOfRange(value))
        }
    }

    /// Reduce an arbitrary value into the sequence space.
    pub fn wrapping(value: usize) -> Self {
        Self((value % SEQ_SPACE as usize) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Slot index in a buffer of `SEQ_SPACE` entries.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn next(self) -> Self {
        self.advance(1)
    }

    pub fn prev(self) -> Self {
        self.advance(MAX_SEQ as usize)
    }

    pub fn advance(self, n: usize) -> Self {
        Self::wrapping(self.0 as usize + n % SEQ_SPACE as usize)
    }

    /// Number of steps forward from `self` to reach `later`.
    pub fn distance_to(self, later: Seq) -> usize {
        (later.0 as usize + SEQ_SPACE as usize - self.0 as usize) % SEQ_SPACE as usize
    }
}

impl TryFrom<u8> for Seq {
    type Error = SeqOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Seq::new(value)
    }
}

impl From<Seq> for u8 {
    fn from(seq: Seq) -> u8 {
        seq.0
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Circular interval test: true iff `b` lies in `[a, c)` walking forward from `a`.
///
/// The three clauses cover the unwrapped case and both wrapped layouts. A plain
/// `a <= b && b < c` misclassifies every window that straddles `MAX_SEQ -> 0`.
pub fn between(a: Seq, b: Seq, c: Seq) -> bool {
    let (a, b, c) = (a.0, b.0, c.0);
    ((a <= b) && (b < c)) || ((c < a) && (a <= b)) || ((b < c) && (c < a))
}
