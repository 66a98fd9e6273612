use std::cell::Cell;
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Monotonic elapsed-time source, in seconds since the source started.
pub trait ClockSource {
    fn elapsed_seconds(&self) -> f64;
}

impl<C: ClockSource + ?Sized> ClockSource for Rc<C> {
    fn elapsed_seconds(&self) -> f64 {
        (**self).elapsed_seconds()
    }
}

// ======================================
// === HOST CLOCK ===
// ======================================

pub struct MonotonicClock {
    #[cfg(not(target_arch = "wasm32"))]
    start: Instant,
    #[cfg(target_arch = "wasm32")]
    start_time_ms: f64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: Instant::now(),
            #[cfg(target_arch = "wasm32")]
            start_time_ms: Self::now_ms(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms() -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for MonotonicClock {
    fn elapsed_seconds(&self) -> f64 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed().as_secs_f64()
        }

        #[cfg(target_arch = "wasm32")]
        {
            (Self::now_ms() - self.start_time_ms) / 1000.0
        }
    }
}

/// Clock driven by hand. Share it through an `Rc` to step time from outside
/// the frame loop that owns it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl ClockSource for ManualClock {
    fn elapsed_seconds(&self) -> f64 {
        self.now.get()
    }
}

// ======================================
// === FRAME DELTA ===
// ======================================

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameClock {
    previous: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<f64> {
        self.previous
    }

    /// Returns `current - previous` and stores `current`. The first reading
    /// yields zero. Backwards or non-finite readings yield zero; a non-finite
    /// reading is not stored.
    pub fn advance(&mut self, current: f64) -> f32 {
        if !current.is_finite() {
            log::warn!("Clock returned non-finite time {current}, delta clamped to 0");
            return 0.0;
        }

        let delta = match self.previous {
            Some(previous) => current - previous,
            None => 0.0,
        };
        self.previous = Some(current);

        if delta < 0.0 {
            log::warn!("Clock went backwards by {:.6}s, delta clamped to 0", -delta);
            return 0.0;
        }
        delta as f32
    }
}
