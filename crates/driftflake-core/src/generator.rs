use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::layout::{BitLayout, IdParts};
use crate::settings::GeneratorSettings;
use jiff::Timestamp;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Turn-back excursion indices cycle through 1..=4, so up to four
/// overlapping clock regressions stay collision-free before an index is
/// reused. Index 0 remains reserved for manual assignment.
const TURNBACK_INDEX_MAX: u8 = 4;

#[derive(Debug)]
struct GeneratorState {
    /// Next sequence value to hand out within the current tick.
    current_seq: u32,
    /// Tick (real or virtually advanced) of the most recently issued ID.
    last_time_tick: i64,
    /// Whether the generator is currently running ahead of the real clock.
    is_over_cost: bool,
    over_cost_count_in_term: u32,
    gen_count_in_term: u64,
    term_index: u32,
    /// Tick the current backward-clock excursion replays; 0 means no
    /// excursion is in progress.
    turnback_time_tick: i64,
    turnback_index: u8,
}

/// Snowflake-style ID generator with drift compensation.
///
/// IDs pack a millisecond tick, a worker id and a per-tick sequence into a
/// positive `i64` (see [`BitLayout`]). Two conditions that would normally
/// stall or corrupt a snowflake generator are absorbed internally:
///
/// - **Sequence overflow**: when a tick's sequence space is spent, the
///   generator advances a virtual clock ahead of the real one ("over-cost"
///   mode) instead of blocking, and rejoins the real clock once it catches
///   up. A configurable drift budget bounds how far ahead it may run; once
///   spent, issuance throttles to the real clock rate.
/// - **Clock regression**: when the wall clock moves backward, the
///   generator replays already-passed ticks using a reserved low-order
///   index ("turn-back"), keeping IDs unique without waiting for the clock
///   to recover.
#[derive(Debug)]
pub struct Driftflake<C: Clock> {
    settings: GeneratorSettings,
    layout: BitLayout,
    base_ms: i64,
    clock: C,
    state: Mutex<GeneratorState>,
}

impl Driftflake<SystemClock> {
    /// Creates a generator backed by the real system clock.
    pub fn new(settings: GeneratorSettings) -> Result<Self, Error> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> Driftflake<C> {
    /// Creates a generator backed by the given clock.
    ///
    /// Settings are validated against the clock's current time; all
    /// violated constraints are reported together.
    pub fn with_clock(settings: GeneratorSettings, clock: C) -> Result<Self, Error> {
        let now = clock.now();
        settings.validate(now)?;

        let base_ms = settings.base_epoch.as_millisecond();
        let state = GeneratorState {
            current_seq: u32::from(settings.sequence_min),
            last_time_tick: now.as_millisecond() - base_ms,
            is_over_cost: false,
            over_cost_count_in_term: 0,
            gen_count_in_term: 0,
            term_index: 0,
            turnback_time_tick: 0,
            turnback_index: 0,
        };

        Ok(Self {
            settings,
            layout: settings.layout(),
            base_ms,
            clock,
            state: Mutex::new(state),
        })
    }

    /// Produces the next unique ID.
    ///
    /// Clock regressions and sequence overflow are expected operating
    /// conditions, not failures; the only error is a poisoned state lock.
    /// The one internal delay is the drift-budget resynchronization wait,
    /// which ends as soon as the real clock advances past the stalled
    /// virtual tick.
    pub fn next_id(&self) -> Result<i64, Error> {
        let mut state = self.state.lock().map_err(|_| Error::StatePoisoned)?;

        let id = if state.is_over_cost {
            self.next_over_cost_id(&mut state)
        } else {
            self.next_normal_id(&mut state)
        };

        Ok(id)
    }

    /// Decomposes an ID produced by this generator. Diagnostic only.
    pub fn decode(&self, id: i64) -> IdParts {
        self.layout.decode(id)
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    fn next_normal_id(&self, state: &mut GeneratorState) -> i64 {
        let now = self.current_tick();

        if now < state.last_time_tick {
            if state.turnback_time_tick < 1 {
                state.turnback_time_tick = state.last_time_tick - 1;
                state.turnback_index += 1;
                if state.turnback_index > TURNBACK_INDEX_MAX {
                    state.turnback_index = 1;
                }
                debug!(
                    now,
                    last_tick = state.last_time_tick,
                    index = state.turnback_index,
                    "clock regressed, opening turn-back excursion"
                );
            }
            return self.turnback_id(state);
        }

        // The real clock caught up with an open excursion.
        if state.turnback_time_tick > 0 {
            debug!(
                tick = state.turnback_time_tick,
                "closing turn-back excursion"
            );
            state.turnback_time_tick = 0;
        }

        if now > state.last_time_tick {
            state.last_time_tick = now;
            state.current_seq = u32::from(self.settings.sequence_min);
            return self.sequence_id(state);
        }

        if state.current_seq > self.settings.sequence_max {
            // This tick's sequence space is spent; advance the virtual
            // clock instead of blocking the caller.
            state.term_index += 1;
            state.last_time_tick += 1;
            state.current_seq = u32::from(self.settings.sequence_min);
            state.is_over_cost = true;
            state.over_cost_count_in_term = 1;
            state.gen_count_in_term = 1;
            debug!(
                virtual_tick = state.last_time_tick,
                term = state.term_index,
                "sequence exhausted, drifting ahead of the clock"
            );
            return self.sequence_id(state);
        }

        self.sequence_id(state)
    }

    fn next_over_cost_id(&self, state: &mut GeneratorState) -> i64 {
        let now = self.current_tick();

        if now > state.last_time_tick {
            debug!(
                tick = now,
                generated = state.gen_count_in_term,
                "clock caught up, leaving over-cost mode"
            );
            state.last_time_tick = now;
            state.current_seq = u32::from(self.settings.sequence_min);
            state.is_over_cost = false;
            state.over_cost_count_in_term = 0;
            state.gen_count_in_term = 0;
            return self.sequence_id(state);
        }

        if state.over_cost_count_in_term >= self.settings.top_over_cost_count {
            warn!(
                stalled_tick = state.last_time_tick,
                budget = self.settings.top_over_cost_count,
                "drift budget exhausted, waiting for the clock to advance"
            );
            state.last_time_tick = self.wait_for_tick_after(state.last_time_tick);
            state.current_seq = u32::from(self.settings.sequence_min);
            state.is_over_cost = false;
            state.over_cost_count_in_term = 0;
            state.gen_count_in_term = 0;
            return self.sequence_id(state);
        }

        if state.current_seq > self.settings.sequence_max {
            state.last_time_tick += 1;
            state.current_seq = u32::from(self.settings.sequence_min);
            state.over_cost_count_in_term += 1;
            state.gen_count_in_term += 1;
            return self.sequence_id(state);
        }

        state.gen_count_in_term += 1;
        self.sequence_id(state)
    }

    /// Emits an ID at the current tick and post-increments the sequence.
    fn sequence_id(&self, state: &mut GeneratorState) -> i64 {
        let id = self.layout.encode(
            state.last_time_tick,
            self.settings.worker_id,
            state.current_seq,
        );
        state.current_seq += 1;
        id
    }

    /// Emits an ID at the excursion tick using the reserved turn-back
    /// index, then walks the excursion one tick further into the past.
    fn turnback_id(&self, state: &mut GeneratorState) -> i64 {
        let id = self.layout.encode(
            state.turnback_time_tick,
            self.settings.worker_id,
            u32::from(state.turnback_index),
        );
        state.turnback_time_tick -= 1;
        id
    }

    /// Polls the clock until it reads strictly past `stalled`.
    ///
    /// Runs while the state lock is held: once the drift budget is spent,
    /// all callers serialize behind real-clock catch-up instead of racing
    /// the sequence state further ahead. The wait is unbounded but always
    /// resolves, since real time is monotonic non-decreasing (a concurrent
    /// regression is handled by the turn-back branch on a later call).
    fn wait_for_tick_after(&self, stalled: i64) -> i64 {
        loop {
            let tick = self.current_tick();
            if tick > stalled {
                return tick;
            }
            let target = Timestamp::from_millisecond(self.base_ms + stalled + 1)
                .expect("stalled tick maps to a valid timestamp");
            self.clock.wait_until(target);
        }
    }

    fn current_tick(&self) -> i64 {
        self.clock.now().as_millisecond() - self.base_ms
    }
}
