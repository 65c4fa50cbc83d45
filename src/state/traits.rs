//! Traits shared by tickable states.

/// Creates presentation-ready captures of a state.
pub trait Snapshot {
    type Output;

    fn create_snapshot(&self) -> Self::Output;
}

/// Per-tick updates.
pub trait Update {
    /// Advances the state by `dt` seconds of wall time.
    fn update(&mut self, dt: f64);
}
