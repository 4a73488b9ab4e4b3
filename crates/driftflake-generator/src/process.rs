//! Lazily-initialized process-wide generator.
//!
//! Intended for applications that want unique IDs without wiring a
//! generator through every call site. The worker id comes from the
//! [`WORKER_ID_ENV`] environment variable when set to a usable value,
//! otherwise it is derived from local machine identity.

use driftflake_core::{derive_worker_id, Driftflake, GeneratorSettings, SystemClock};
use jiff::Timestamp;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment variable overriding the process-default worker id.
pub const WORKER_ID_ENV: &str = "DRIFTFLAKE_WORKER_ID";

/// Epoch of the process-default generator: 2024-01-01T00:00:00Z.
const DEFAULT_EPOCH_MS: i64 = 1_704_067_200_000;

/// The default layout reserves 6 bits for the worker id.
const MAX_DEFAULT_WORKER_ID: u16 = 63;

static PROCESS_GENERATOR: OnceLock<Driftflake<SystemClock>> = OnceLock::new();

/// Returns the process-wide generator, initializing it on first use.
pub fn process_generator() -> &'static Driftflake<SystemClock> {
    PROCESS_GENERATOR.get_or_init(|| {
        let worker_id =
            worker_id_from_env().unwrap_or_else(|| derive_worker_id(MAX_DEFAULT_WORKER_ID));
        debug!(worker_id, "initializing process-default generator");

        let settings = GeneratorSettings::builder()
            .base_epoch(
                Timestamp::from_millisecond(DEFAULT_EPOCH_MS)
                    .expect("default epoch is a valid timestamp"),
            )
            .worker_id(worker_id)
            .build();
        Driftflake::new(settings).expect("default generator settings are valid")
    })
}

/// Produces the next ID from the process-wide generator.
pub fn next_id() -> i64 {
    process_generator()
        .next_id()
        .expect("process-default generator failed to produce the next id")
}

fn worker_id_from_env() -> Option<u16> {
    let raw = std::env::var(WORKER_ID_ENV).ok()?;
    match raw.parse::<u16>() {
        Ok(id) if (1..=MAX_DEFAULT_WORKER_ID).contains(&id) => Some(id),
        Ok(id) => {
            warn!(
                worker_id = id,
                max = MAX_DEFAULT_WORKER_ID,
                "worker id override out of range, deriving one instead"
            );
            None
        }
        Err(_) => {
            warn!(value = %raw, "unparseable worker id override, deriving one instead");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_next_id_produces_distinct_increasing_ids() {
        let first = next_id();
        let second = next_id();

        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn process_generator_worker_id_is_in_the_default_range() {
        let worker_id = process_generator().settings().worker_id;
        assert!((1..=MAX_DEFAULT_WORKER_ID).contains(&worker_id));
    }

    #[test]
    fn out_of_range_env_override_is_ignored() {
        std::env::set_var(WORKER_ID_ENV, "4000");
        assert_eq!(worker_id_from_env(), None);

        std::env::set_var(WORKER_ID_ENV, "not-a-number");
        assert_eq!(worker_id_from_env(), None);

        std::env::set_var(WORKER_ID_ENV, "17");
        assert_eq!(worker_id_from_env(), Some(17));

        std::env::remove_var(WORKER_ID_ENV);
    }
}
