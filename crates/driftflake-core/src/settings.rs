use crate::error::{Error, Violation};
use crate::layout::BitLayout;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Highest admissible worker id (15 bits).
pub const MAX_WORKER_ID: u16 = 0x7FFF;

/// Sequence values below this are reserved: 0 for manual assignment,
/// 1..=4 for turn-back excursion indices.
pub const SEQUENCE_RESERVED_BAND: u16 = 5;

/// The worker-id and sequence fields together may occupy at most 22 bits,
/// leaving at least 41 bits of timestamp under the sign bit.
const MAX_COMBINED_BIT_LENGTH: u16 = 22;

/// Configures a [`Driftflake`] generator instance.
///
/// Settings are immutable once the generator is constructed; construction
/// validates every constraint eagerly and reports all violations at once.
///
/// [`Driftflake`]: crate::Driftflake
#[derive(Debug, Clone, Copy, TypedBuilder, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Absolute epoch the timestamp field counts milliseconds from.
    /// Must not be ahead of the clock at construction time.
    #[builder]
    pub base_epoch: Timestamp,
    /// Identifies this generator among concurrent generators, in the range
    /// `[1, 32767]`. Uniqueness across processes is the caller's
    /// responsibility; see [`derive_worker_id`] for a local fallback.
    ///
    /// [`derive_worker_id`]: crate::derive_worker_id
    #[builder]
    pub worker_id: u16,
    /// Width of the worker-id field, `[1, 15]` bits.
    #[builder(default = 6)]
    pub worker_id_bit_length: u8,
    /// Width of the sequence field, `[3, 21]` bits.
    #[builder(default = 6)]
    pub sequence_bit_length: u8,
    /// First sequence value handed out within a tick. Everything below it
    /// is reserved (see [`SEQUENCE_RESERVED_BAND`]).
    #[builder(default = 5)]
    pub sequence_min: u16,
    /// Last sequence value handed out within a tick before the generator
    /// advances its virtual clock.
    #[builder(default = 20)]
    pub sequence_max: u32,
    /// How many consecutive virtual-clock advances the generator may absorb
    /// before it pauses and resynchronizes with the real clock.
    #[builder(default = 2000)]
    pub top_over_cost_count: u32,
}

impl GeneratorSettings {
    /// Checks every constraint against the given current time and reports
    /// all violations together.
    pub fn validate(&self, now: Timestamp) -> Result<(), Error> {
        let mut violations = Vec::new();

        if self.base_epoch > now {
            violations.push(Violation::EpochAhead {
                epoch: self.base_epoch,
                now,
            });
        }

        let worker_bits_ok = (1..=15).contains(&self.worker_id_bit_length);
        if !worker_bits_ok {
            violations.push(Violation::WorkerIdBitLength {
                bits: self.worker_id_bit_length,
            });
        }

        let sequence_bits_ok = (3..=21).contains(&self.sequence_bit_length);
        if !sequence_bits_ok {
            violations.push(Violation::SequenceBitLength {
                bits: self.sequence_bit_length,
            });
        }

        if self.worker_id_bit_length as u16 + self.sequence_bit_length as u16
            > MAX_COMBINED_BIT_LENGTH
        {
            violations.push(Violation::BitBudgetExceeded {
                worker_bits: self.worker_id_bit_length,
                sequence_bits: self.sequence_bit_length,
            });
        }

        if self.worker_id < 1 || self.worker_id > MAX_WORKER_ID {
            violations.push(Violation::WorkerIdRange {
                worker_id: self.worker_id,
            });
        } else if worker_bits_ok && u32::from(self.worker_id) > field_cap(self.worker_id_bit_length)
        {
            violations.push(Violation::WorkerIdWidth {
                worker_id: self.worker_id,
                bits: self.worker_id_bit_length,
            });
        }

        if self.sequence_min < SEQUENCE_RESERVED_BAND {
            violations.push(Violation::SequenceMinReserved {
                min: self.sequence_min,
            });
        }
        if u32::from(self.sequence_min) >= self.sequence_max {
            violations.push(Violation::SequenceRangeInverted {
                min: self.sequence_min,
                max: self.sequence_max,
            });
        }
        if sequence_bits_ok && self.sequence_max > field_cap(self.sequence_bit_length) {
            violations.push(Violation::SequenceMaxWidth {
                max: self.sequence_max,
                bits: self.sequence_bit_length,
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidSettings(violations))
        }
    }

    /// The bit layout induced by the configured field widths.
    pub fn layout(&self) -> BitLayout {
        BitLayout::new(self.worker_id_bit_length, self.sequence_bit_length)
    }
}

fn field_cap(bits: u8) -> u32 {
    (1 << bits) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> Timestamp {
        Timestamp::from_millisecond(1_700_000_000_000).unwrap()
    }

    fn now() -> Timestamp {
        Timestamp::from_millisecond(1_700_000_001_000).unwrap()
    }

    #[test]
    fn builder_applies_documented_defaults() {
        let settings = GeneratorSettings::builder()
            .base_epoch(epoch())
            .worker_id(1)
            .build();

        assert_eq!(settings.worker_id_bit_length, 6);
        assert_eq!(settings.sequence_bit_length, 6);
        assert_eq!(settings.sequence_min, 5);
        assert_eq!(settings.sequence_max, 20);
        assert_eq!(settings.top_over_cost_count, 2000);
        assert!(settings.validate(now()).is_ok());
    }

    #[test]
    fn bit_budget_overflow_cites_the_specific_violation() {
        let settings = GeneratorSettings::builder()
            .base_epoch(epoch())
            .worker_id(1)
            .worker_id_bit_length(15)
            .sequence_bit_length(10)
            .build();

        let err = settings.validate(now()).unwrap_err();

        assert!(err.cites(&Violation::BitBudgetExceeded {
            worker_bits: 15,
            sequence_bits: 10,
        }));
    }

    #[test]
    fn validation_reports_every_violation_at_once() {
        let settings = GeneratorSettings::builder()
            .base_epoch(now())
            .worker_id(0)
            .worker_id_bit_length(15)
            .sequence_bit_length(10)
            .sequence_min(3)
            .build();

        let err = settings.validate(epoch()).unwrap_err();

        assert!(err.cites(&Violation::EpochAhead {
            epoch: now(),
            now: epoch(),
        }));
        assert!(err.cites(&Violation::BitBudgetExceeded {
            worker_bits: 15,
            sequence_bits: 10,
        }));
        assert!(err.cites(&Violation::WorkerIdRange { worker_id: 0 }));
        assert!(err.cites(&Violation::SequenceMinReserved { min: 3 }));
    }

    #[test]
    fn worker_id_must_fit_the_configured_width() {
        let settings = GeneratorSettings::builder()
            .base_epoch(epoch())
            .worker_id(64)
            .build();

        let err = settings.validate(now()).unwrap_err();

        assert!(err.cites(&Violation::WorkerIdWidth {
            worker_id: 64,
            bits: 6,
        }));
    }

    #[test]
    fn sequence_bounds_are_checked_against_each_other_and_the_width() {
        let inverted = GeneratorSettings::builder()
            .base_epoch(epoch())
            .worker_id(1)
            .sequence_min(20)
            .sequence_max(20)
            .build();
        assert!(inverted
            .validate(now())
            .unwrap_err()
            .cites(&Violation::SequenceRangeInverted { min: 20, max: 20 }));

        let too_wide = GeneratorSettings::builder()
            .base_epoch(epoch())
            .worker_id(1)
            .sequence_max(64)
            .build();
        assert!(too_wide
            .validate(now())
            .unwrap_err()
            .cites(&Violation::SequenceMaxWidth { max: 64, bits: 6 }));
    }

    #[test]
    fn out_of_range_bit_lengths_are_rejected() {
        let settings = GeneratorSettings::builder()
            .base_epoch(epoch())
            .worker_id(1)
            .worker_id_bit_length(0)
            .sequence_bit_length(22)
            .build();

        let err = settings.validate(now()).unwrap_err();

        assert!(err.cites(&Violation::WorkerIdBitLength { bits: 0 }));
        assert!(err.cites(&Violation::SequenceBitLength { bits: 22 }));
    }

    #[test]
    fn settings_bind_from_json() {
        let raw = r#"{
            "base_epoch": "2023-11-14T22:13:20Z",
            "worker_id": 3,
            "worker_id_bit_length": 10,
            "sequence_bit_length": 12,
            "sequence_min": 5,
            "sequence_max": 4095,
            "top_over_cost_count": 500
        }"#;

        let settings: GeneratorSettings = serde_json::from_str(raw).unwrap();

        assert_eq!(settings.base_epoch, epoch());
        assert_eq!(settings.worker_id, 3);
        assert_eq!(settings.sequence_max, 4095);
        assert!(settings.validate(now()).is_ok());
    }
}
