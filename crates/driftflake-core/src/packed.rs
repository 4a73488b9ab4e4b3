use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use jiff::Timestamp;
use modular_bitfield::prelude::*;
use std::fmt;
use std::sync::Mutex;

/// Epoch for packed IDs: 2010-11-04T01:42:54.657Z.
const PACKED_EPOCH_MS: i64 = 1_288_834_974_657;

const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;
const WORKER_ID_BITS: u32 = 10;

/// Maximum worker id a [`PackedSnowflake`] accepts.
pub const MAX_PACKED_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

const TIMESTAMP_AND_SEQUENCE_MASK: i64 = !(-1_i64 << (TIMESTAMP_BITS + SEQUENCE_BITS));

/// Fixed-layout view of a packed ID.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedId {
    /// 12 bits for sequence (resets every millisecond).
    pub sequence: B12,
    /// 41 bits for timestamp (milliseconds since the packed epoch).
    pub timestamp: B41,
    /// 10 bits for worker id (allows up to 1024 generators).
    pub worker_id: B10,
    #[skip]
    __: B1,
}

impl PackedId {
    /// Reinterprets a raw ID produced by [`PackedSnowflake::next_id`].
    pub fn from_raw(id: i64) -> Self {
        Self::from_bytes(id.to_le_bytes())
    }
}

impl fmt::Debug for PackedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedId")
            .field("timestamp", &self.timestamp())
            .field("sequence", &self.sequence())
            .field("worker_id", &self.worker_id())
            .finish()
    }
}

/// Fixed-layout snowflake generator with a single mixed state word.
///
/// The 41-bit timestamp and 12-bit sequence share one word, so issuing an
/// ID is a single increment: overflowing the sequence bleeds into the
/// timestamp, borrowing a future millisecond. Whenever the borrowed
/// timestamp runs ahead of the real clock, the generator waits briefly,
/// throttling issuance to the clock rate. The worker field is pre-shifted
/// at construction and OR-ed in on the way out.
///
/// Unlike [`Driftflake`], this generator has no configurable layout and no
/// drift budget; it trades flexibility for a minimal hot path.
///
/// [`Driftflake`]: crate::Driftflake
#[derive(Debug)]
pub struct PackedSnowflake<C: Clock> {
    worker_field: i64,
    clock: C,
    word: Mutex<i64>,
}

impl PackedSnowflake<SystemClock> {
    /// Creates a generator backed by the real system clock.
    pub fn new(worker_id: u16) -> Result<Self, Error> {
        Self::with_clock(worker_id, SystemClock)
    }
}

impl<C: Clock> PackedSnowflake<C> {
    pub fn with_clock(worker_id: u16, clock: C) -> Result<Self, Error> {
        if worker_id > MAX_PACKED_WORKER_ID {
            return Err(Error::InvalidWorkerId {
                worker_id,
                max: MAX_PACKED_WORKER_ID,
            });
        }

        let word = current_timestamp(&clock) << SEQUENCE_BITS;
        Ok(Self {
            worker_field: (worker_id as i64) << (TIMESTAMP_BITS + SEQUENCE_BITS),
            clock,
            word: Mutex::new(word),
        })
    }

    /// Produces the next unique ID.
    pub fn next_id(&self) -> Result<i64, Error> {
        let mut word = self.word.lock().map_err(|_| Error::StatePoisoned)?;

        *word += 1;
        let borrowed = *word >> SEQUENCE_BITS;
        if borrowed >= current_timestamp(&self.clock) {
            // The mixed word reached a millisecond the clock hasn't; wait
            // for the clock so issuance can't outrun it unboundedly.
            let target = Timestamp::from_millisecond(PACKED_EPOCH_MS + borrowed)
                .expect("borrowed timestamp maps to a valid timestamp");
            self.clock.wait_until(target);
        }

        Ok(self.worker_field | (*word & TIMESTAMP_AND_SEQUENCE_MASK))
    }
}

fn current_timestamp<C: Clock>(clock: &C) -> i64 {
    clock.now().as_millisecond() - PACKED_EPOCH_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::TestClock;
    use std::collections::HashSet;

    fn at(offset_ms: i64) -> Timestamp {
        Timestamp::from_millisecond(PACKED_EPOCH_MS + offset_ms).unwrap()
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = PackedSnowflake::with_clock(1, TestClock::new(at(5000))).unwrap();

        let first = generator.next_id().unwrap();
        let second = generator.next_id().unwrap();
        let third = generator.next_id().unwrap();

        assert!(first < second && second < third);
    }

    #[test]
    fn worker_id_is_embedded_in_every_id() {
        let generator = PackedSnowflake::with_clock(777, TestClock::new(at(5000))).unwrap();

        let id = PackedId::from_raw(generator.next_id().unwrap());

        assert_eq!(id.worker_id(), 777);
    }

    #[test]
    fn timestamp_field_reflects_the_seeded_clock() {
        let generator = PackedSnowflake::with_clock(1, TestClock::new(at(5000))).unwrap();

        let id = PackedId::from_raw(generator.next_id().unwrap());

        assert_eq!(id.timestamp(), 5000);
        assert_eq!(id.sequence(), 1);
    }

    #[test]
    fn sequence_overflow_borrows_the_next_millisecond() {
        let clock = TestClock::new(at(5000));
        let generator = PackedSnowflake::with_clock(1, clock.clone()).unwrap();

        // 2^12 increments roll the sequence over into the timestamp field.
        let ids: Vec<i64> = (0..4096).map(|_| generator.next_id().unwrap()).collect();

        let unique: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        let last = PackedId::from_raw(*ids.last().unwrap());
        assert_eq!(last.timestamp(), 5001);
        assert_eq!(last.sequence(), 0);
        // The throttle pulled the simulated clock along with the borrow.
        assert!(clock.now() >= at(5001));
    }

    #[test]
    fn worker_id_above_ten_bits_is_rejected() {
        let err = PackedSnowflake::with_clock(1024, TestClock::new(at(0))).unwrap_err();

        assert_eq!(
            err,
            Error::InvalidWorkerId {
                worker_id: 1024,
                max: 1023,
            }
        );
    }
}
