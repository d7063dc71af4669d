//! Capabilities the engine drives but does not implement
//!
//! Rendering, pointer hardware, sound and pellet dispensers sit behind these
//! traits. The engine only decides *what* to show and *when*.

use std::rc::Rc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, NaiveDateTime};

use crate::stimulus::StimulusRef;

/// What should be on screen this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen<'a> {
    /// Start box waiting for the subject to touch it
    StartCue,
    Sample(&'a StimulusRef),
    /// Empty screen between sample and comparison, and between trials
    Blank,
    /// Comparison image plus the change / no-change buttons
    Comparison(&'a StimulusRef),
    /// Grey screen held after an incorrect choice
    Penalty,
}

/// Hit-test targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    StartBox,
    ChangeButton,
    NoChangeButton,
}

/// Axes the cursor may move along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axes {
    /// Up only, towards the start box
    Vertical,
    /// Left/right, towards the response buttons
    Horizontal,
}

pub trait DisplaySurface {
    fn show(&mut self, screen: Screen<'_>);
    fn present_frame(&mut self);
}

pub trait PointerDevice {
    /// Put the cursor back at its home position and restrict its movement
    fn recenter(&mut self, axes: Axes);
    fn collided_with(&mut self, region: Region) -> bool;
}

pub trait FeedbackDevice {
    fn play_feedback(&mut self, correct: bool);
    fn dispense_reward(&mut self);
}

pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin
    fn now_ms(&self) -> u64;
    /// Local wall-clock time, used for log dates and the daily credit check
    fn local_now(&self) -> NaiveDateTime;
}

/// The full set of collaborators one engine talks to
pub struct Rig {
    pub display: Box<dyn DisplaySurface>,
    pub pointer: Box<dyn PointerDevice>,
    pub feedback: Box<dyn FeedbackDevice>,
    pub clock: Rc<dyn Clock>,
}

/// Monotonic clock running `speed` times faster than real time
///
/// `speed = 1.0` is a plain wall clock; larger values let a simulated session
/// finish in minutes instead of hours.
#[derive(Debug, Clone)]
pub struct ScaledClock {
    started: Instant,
    wall_start: NaiveDateTime,
    speed: f64,
}

impl ScaledClock {
    pub fn new(speed: f64) -> Self {
        Self {
            started: Instant::now(),
            wall_start: chrono::Local::now().naive_local(),
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
        }
    }

    pub fn realtime() -> Self {
        Self::new(1.0)
    }
}

impl Clock for ScaledClock {
    fn now_ms(&self) -> u64 {
        (self.started.elapsed().as_secs_f64() * 1000.0 * self.speed) as u64
    }

    fn local_now(&self) -> NaiveDateTime {
        if self.speed == 1.0 {
            return chrono::Local::now().naive_local();
        }
        self.wall_start + ChronoDuration::milliseconds(self.now_ms() as i64)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<std::cell::Cell<u64>>,
    origin: NaiveDateTime,
}

impl ManualClock {
    pub fn new(origin: NaiveDateTime) -> Self {
        Self {
            now: Rc::new(std::cell::Cell::new(0)),
            origin,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.origin + ChronoDuration::milliseconds(self.now.get() as i64)
    }
}
