/// Decomposed view of an encoded ID.
///
/// Produced by [`BitLayout::decode`] for tests and observability; the hot
/// path never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Milliseconds elapsed since the configured base epoch.
    pub tick: i64,
    pub worker_id: u16,
    /// The low-order field: a sequence number, or a turn-back index for
    /// IDs issued during a clock regression.
    pub sequence: u32,
}

/// Pure bit packing for a configured ID layout.
///
/// Bit positions, most to least significant:
/// `[1 unused sign bit][63-W-S bits tick][W bits worker id][S bits sequence]`
///
/// Encoding and decoding are exact inverses; no locking, no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitLayout {
    timestamp_shift: u8,
    worker_shift: u8,
    worker_mask: i64,
    sequence_mask: i64,
}

impl BitLayout {
    pub fn new(worker_id_bits: u8, sequence_bits: u8) -> Self {
        Self {
            timestamp_shift: worker_id_bits + sequence_bits,
            worker_shift: sequence_bits,
            worker_mask: (1 << worker_id_bits) - 1,
            sequence_mask: (1 << sequence_bits) - 1,
        }
    }

    pub fn encode(&self, tick: i64, worker_id: u16, sequence: u32) -> i64 {
        (tick << self.timestamp_shift)
            | ((worker_id as i64) << self.worker_shift)
            | sequence as i64
    }

    pub fn decode(&self, id: i64) -> IdParts {
        IdParts {
            tick: id >> self.timestamp_shift,
            worker_id: ((id >> self.worker_shift) & self.worker_mask) as u16,
            sequence: (id & self.sequence_mask) as u32,
        }
    }
}
