use jiff::Timestamp;
use thiserror::Error;

/// A single violated settings constraint.
///
/// Validation never stops at the first problem; every violated constraint
/// is collected and reported together in [`Error::InvalidSettings`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("base epoch is ahead of current clock time: epoch={epoch}, now={now}")]
    EpochAhead { epoch: Timestamp, now: Timestamp },
    #[error("worker id bit length {bits}; expected 1..=15")]
    WorkerIdBitLength { bits: u8 },
    #[error("sequence bit length {bits}; expected 3..=21")]
    SequenceBitLength { bits: u8 },
    #[error("combined bit length {worker_bits} + {sequence_bits} exceeds 22")]
    BitBudgetExceeded { worker_bits: u8, sequence_bits: u8 },
    #[error("worker id {worker_id}; expected 1..=32767")]
    WorkerIdRange { worker_id: u16 },
    #[error("worker id {worker_id} does not fit in {bits} bits")]
    WorkerIdWidth { worker_id: u16, bits: u8 },
    #[error("sequence min {min}; values 0..=4 are reserved, expected at least 5")]
    SequenceMinReserved { min: u16 },
    #[error("sequence min {min} is not below sequence max {max}")]
    SequenceRangeInverted { min: u16, max: u32 },
    #[error("sequence max {max} does not fit in {bits} bits")]
    SequenceMaxWidth { max: u32, bits: u8 },
}

/// Errors returned by generator construction and ID generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid generator settings: {}", format_violations(.0))]
    InvalidSettings(Vec<Violation>),
    #[error("worker id {worker_id}; expected 0..={max}")]
    InvalidWorkerId { worker_id: u16, max: u16 },
    #[error("generator state lock is poisoned")]
    StatePoisoned,
}

impl Error {
    /// Whether this error cites the given violation.
    pub fn cites(&self, violation: &Violation) -> bool {
        match self {
            Error::InvalidSettings(violations) => violations.contains(violation),
            _ => false,
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
