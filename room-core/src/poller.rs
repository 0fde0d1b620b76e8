//! Playback status poller
//!
//! Decides when to ask the playback provider for the current track again.
//! The poller is a plain state machine; the engine owns the actual timer and
//! re-arms it from the delay returned by [`Poller::poll_succeeded`].

use std::time::Duration;

use tracing::debug;

/// Default lower bound between two polls
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Not polling and nothing scheduled (initial state, or halted after a failure)
    Idle,
    /// A provider request is in flight
    Polling,
    /// Waiting for the current track to end
    Scheduled,
}

/// Why a poll was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    Mount,
    /// User acknowledged the "not playing" notice
    Ready,
    /// The scheduled timer fired
    Wake,
    /// Another component changed the queue or playback
    Refresh,
}

/// Delay until the next poll: time left in the track, but never less than `min_delay`.
///
/// Missing duration or progress (reported as `None`) and progress past the
/// end of the track all yield `min_delay`.
pub fn next_delay(duration_ms: Option<u64>, elapsed_ms: Option<u64>, min_delay: Duration) -> Duration {
    let remaining = match (duration_ms, elapsed_ms) {
        (Some(d), Some(e)) => d.saturating_sub(e),
        _ => 0,
    };
    Duration::from_millis(remaining).max(min_delay)
}

/// Playback poll state machine
#[derive(Debug)]
pub struct Poller {
    phase: PollPhase,
    /// Incremented on every poll start; results tagged with an older value are stale
    generation: u64,
    min_delay: Duration,
    /// Set after a failed poll until a poll succeeds again
    not_playing: bool,
}

impl Poller {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            phase: PollPhase::Idle,
            generation: 0,
            min_delay,
            not_playing: false,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Whether the "not playing" notice should be shown
    pub fn shows_not_playing(&self) -> bool {
        self.not_playing
    }

    /// Start a poll. Returns the generation to tag the request with, or
    /// `None` when a poll is already in flight.
    ///
    /// While halted after a failure only `Ready` (and `Refresh`) restart polling.
    pub fn begin(&mut self, trigger: PollTrigger) -> Option<u64> {
        if self.phase == PollPhase::Polling {
            debug!("Poll already in flight, ignoring {:?}", trigger);
            return None;
        }
        if self.not_playing && trigger == PollTrigger::Wake {
            debug!("Poller halted, ignoring scheduled wake");
            return None;
        }
        self.generation += 1;
        self.phase = PollPhase::Polling;
        debug!("Poll #{} started ({:?})", self.generation, trigger);
        Some(self.generation)
    }

    /// Check whether a result belongs to the poll currently in flight
    pub fn is_current(&self, generation: u64) -> bool {
        self.phase == PollPhase::Polling && generation == self.generation
    }

    /// Record a successful poll. Returns the delay to arm the timer with.
    pub fn poll_succeeded(&mut self, duration_ms: u64, progress_ms: u64) -> Duration {
        self.not_playing = false;
        self.phase = PollPhase::Scheduled;
        next_delay(Some(duration_ms), Some(progress_ms), self.min_delay)
    }

    /// Record a failed poll. Automatic polling halts until the next `Ready`.
    pub fn poll_failed(&mut self) {
        self.not_playing = true;
        self.phase = PollPhase::Idle;
    }

    /// Stop everything (unmount). Any in-flight result becomes stale.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.phase = PollPhase::Idle;
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}
