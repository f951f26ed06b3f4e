//! Per-event locator context.
//!
//! Everything that would be tempting to make a process-wide toggle lives
//! here instead, so two events located back to back (or on different
//! threads) can never see each other's state.

/// Damping oscillator start value.
const DAMP_START: f64 = 0.45;
/// Upper bound of the climb phase of the jiggle.
const DAMP_CEILING: f64 = 0.58984375 + (0.45 - 0.375);
/// Increment while climbing.
const DAMP_UP: f64 = 0.0390625;
/// Decrement when the ceiling is crossed.
const DAMP_DOWN: f64 = 0.21875;

/// Mutable per-event tuning state.
#[derive(Debug, Clone)]
pub struct LocatorContext {
    /// The source is outside every craton.
    pub tectonic: bool,
    /// Use the regional RSTT travel-time model where available.
    pub rstt: bool,
    /// Project residuals through the decorrelation basis.
    pub decorrelate: bool,
    /// Diagnostic verbosity, 0 = quiet.
    pub debug_level: u8,
    damp: f64,
}

impl Default for LocatorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LocatorContext {
    pub fn new() -> Self {
        Self {
            tectonic: false,
            rstt: false,
            decorrelate: false,
            debug_level: 0,
            damp: DAMP_START,
        }
    }

    /// Current damping factor; advances the jiggle for the next call. The
    /// oscillation breaks the cycle where a normal step and a damped step
    /// alternate forever.
    pub fn damp_factor(&mut self) -> f64 {
        let damp = self.damp;
        if self.damp <= DAMP_CEILING {
            self.damp += DAMP_UP;
        } else {
            self.damp -= DAMP_DOWN;
        }
        damp
    }
}
