pub mod process;

use driftflake_core::{Clock, Driftflake, PackedSnowflake};

/// Trait for components that hand out unique 64-bit IDs.
///
/// Implementations are pure sources that don't interact with storage.
/// The surrounding application consumes ID sources through this seam,
/// so generators can be swapped without touching call sites.
pub trait IdSource: Send + Sync + 'static {
    /// Produces the next ID.
    ///
    /// The returned value must be unique within this source.
    fn next_id(&self) -> i64;
}

impl<C: Clock + 'static> IdSource for Driftflake<C> {
    fn next_id(&self) -> i64 {
        // `IdSource` is intentionally infallible. Generator errors indicate
        // an unrecoverable state (a poisoned lock).
        Driftflake::next_id(self).expect("driftflake generator failed to produce the next id")
    }
}

impl<C: Clock + 'static> IdSource for PackedSnowflake<C> {
    fn next_id(&self) -> i64 {
        PackedSnowflake::next_id(self)
            .expect("packed snowflake generator failed to produce the next id")
    }
}
