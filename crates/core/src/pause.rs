//! Process-wide scanner-halt state.
//!
//! Every target owns one flag; the collectors consult the boolean OR of all
//! of them each tick and skip enqueueing while any is set. This bounds
//! upstream memory growth while a downstream is unhealthy.

use dashmap::DashMap;

/// Per-target pause flags, OR-ed into one process-wide answer.
///
/// Setting a set flag or clearing a clear one is a no-op.
#[derive(Debug, Default)]
pub struct PauseState {
    flags: DashMap<String, bool>,
}

impl PauseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the pause flag of one target.
    pub fn set_pause(&self, target: &str, pause: bool) {
        self.flags.insert(target.to_string(), pause);
    }

    /// Whether any target currently asks the collectors to pause.
    pub fn is_any_target_on_pause(&self) -> bool {
        self.flags.iter().any(|entry| *entry.value())
    }
}
