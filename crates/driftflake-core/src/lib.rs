//! Locally-generated, collision-resistant 64-bit IDs.
//!
//! The primary generator, [`Driftflake`], compensates for sequence bursts
//! by drifting a virtual clock ahead of the real one and for backward
//! clock jumps by replaying passed ticks with reserved sequence indices.
//! [`PackedSnowflake`] is a simpler fixed-layout alternative with a
//! single-word hot path.

mod clock;
pub mod error;
mod generator;
mod layout;
mod packed;
mod settings;
mod worker;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Violation};
pub use generator::Driftflake;
pub use layout::{BitLayout, IdParts};
pub use packed::{PackedId, PackedSnowflake, MAX_PACKED_WORKER_ID};
pub use settings::{GeneratorSettings, MAX_WORKER_ID, SEQUENCE_RESERVED_BAND};
pub use worker::derive_worker_id;
