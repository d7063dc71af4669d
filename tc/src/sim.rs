//! Headless rig for running sessions without hardware
//!
//! The simulated display watches what the engine puts on screen, asks a
//! [`SubjectModel`] how to answer each comparison, and the simulated pointer
//! reports the chosen button once the model's reaction time has elapsed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::capability::{Axes, Clock, DisplaySurface, FeedbackDevice, PointerDevice, Region, Rig, Screen};
use crate::stimulus::StimulusRef;

/// How a subject answers one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Press a button `after_ms` into the response window
    Choose { correct: bool, after_ms: u64 },
    /// Let the response window run out
    Withhold,
}

impl Response {
    pub fn correct(after_ms: u64) -> Self {
        Self::Choose { correct: true, after_ms }
    }

    pub fn incorrect(after_ms: u64) -> Self {
        Self::Choose { correct: false, after_ms }
    }
}

pub trait SubjectModel {
    /// Decide the answer to a comparison; `changed` is what is on screen
    fn respond(&mut self, changed: bool) -> Response;
}

/// Subject answering correctly with probability `accuracy` and missing the
/// window with probability `miss_rate`
#[derive(Debug)]
pub struct RandomSubject {
    accuracy: f64,
    miss_rate: f64,
    rt_min_ms: u64,
    rt_max_ms: u64,
    rng: StdRng,
}

impl RandomSubject {
    pub fn new(accuracy: f64, miss_rate: f64, rt_min_ms: u64, rt_max_ms: u64, rng: StdRng) -> Self {
        Self {
            accuracy: accuracy.clamp(0.0, 1.0),
            miss_rate: miss_rate.clamp(0.0, 1.0),
            rt_min_ms: rt_min_ms.min(rt_max_ms),
            rt_max_ms: rt_max_ms.max(rt_min_ms),
            rng,
        }
    }
}

impl SubjectModel for RandomSubject {
    fn respond(&mut self, _changed: bool) -> Response {
        if self.rng.random_bool(self.miss_rate) {
            return Response::Withhold;
        }
        Response::Choose {
            correct: self.rng.random_bool(self.accuracy),
            after_ms: self.rng.random_range(self.rt_min_ms..=self.rt_max_ms),
        }
    }
}

/// Subject replaying a fixed list of answers, then `fallback` forever
#[derive(Debug, Clone)]
pub struct ScriptedSubject {
    script: VecDeque<Response>,
    fallback: Response,
}

impl ScriptedSubject {
    pub fn new(script: impl IntoIterator<Item = Response>, fallback: Response) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback,
        }
    }

    pub fn repeating(response: Response) -> Self {
        Self::new([], response)
    }
}

impl SubjectModel for ScriptedSubject {
    fn respond(&mut self, _changed: bool) -> Response {
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

/// Counters collected by the simulated devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub frames: u64,
    pub comparisons: u64,
    pub rewards: u64,
    pub correct_feedback: u64,
    pub incorrect_feedback: u64,
}

/// What the subject has seen during the current attempt
#[derive(Default)]
struct Attempt {
    sample: Option<StimulusRef>,
    comparison: Option<StimulusRef>,
    changed: bool,
    shown_at_ms: u64,
    response: Option<Response>,
    answered: bool,
}

struct SimState {
    model: Box<dyn SubjectModel>,
    attempt: Attempt,
    stats: SimStats,
}

type Shared = Rc<RefCell<SimState>>;

/// Read access to the simulation after the rig has been handed to an engine
#[derive(Clone)]
pub struct SimHandle {
    state: Shared,
}

impl SimHandle {
    pub fn stats(&self) -> SimStats {
        self.state.borrow().stats
    }
}

struct SimDisplay {
    state: Shared,
    clock: Rc<dyn Clock>,
}

impl DisplaySurface for SimDisplay {
    fn show(&mut self, screen: Screen<'_>) {
        let mut state = self.state.borrow_mut();
        match screen {
            Screen::Sample(stimulus) => state.attempt.sample = Some(stimulus.clone()),
            Screen::Comparison(stimulus) if state.attempt.comparison.is_none() => {
                let changed = state.attempt.sample.as_ref() != Some(stimulus);
                let response = state.model.respond(changed);
                debug!(%stimulus, changed, ?response, "SimDisplay::show: comparison");
                state.attempt.comparison = Some(stimulus.clone());
                state.attempt.changed = changed;
                state.attempt.shown_at_ms = self.clock.now_ms();
                state.attempt.response = Some(response);
                state.stats.comparisons += 1;
            }
            _ => {}
        }
    }

    fn present_frame(&mut self) {
        self.state.borrow_mut().stats.frames += 1;
    }
}

struct SimPointer {
    state: Shared,
    clock: Rc<dyn Clock>,
}

impl PointerDevice for SimPointer {
    fn recenter(&mut self, axes: Axes) {
        // Vertical recentering marks the start of a new attempt
        if axes == Axes::Vertical {
            self.state.borrow_mut().attempt = Attempt::default();
        }
    }

    fn collided_with(&mut self, region: Region) -> bool {
        let mut state = self.state.borrow_mut();
        let attempt = &mut state.attempt;
        match region {
            Region::StartBox => true,
            Region::ChangeButton | Region::NoChangeButton => {
                if attempt.answered {
                    return false;
                }
                let Some(Response::Choose { correct, after_ms }) = attempt.response else {
                    return false;
                };
                if self.clock.now_ms().saturating_sub(attempt.shown_at_ms) < after_ms {
                    return false;
                }
                let press_change = if correct { attempt.changed } else { !attempt.changed };
                let target = if press_change {
                    Region::ChangeButton
                } else {
                    Region::NoChangeButton
                };
                if region == target {
                    attempt.answered = true;
                    return true;
                }
                false
            }
        }
    }
}

struct SimFeedback {
    state: Shared,
}

impl FeedbackDevice for SimFeedback {
    fn play_feedback(&mut self, correct: bool) {
        let mut state = self.state.borrow_mut();
        if correct {
            state.stats.correct_feedback += 1;
        } else {
            state.stats.incorrect_feedback += 1;
        }
    }

    fn dispense_reward(&mut self) {
        self.state.borrow_mut().stats.rewards += 1;
    }
}

/// Build a headless rig answering through `model`
pub fn simulated_rig(model: Box<dyn SubjectModel>, clock: Rc<dyn Clock>) -> (Rig, SimHandle) {
    let state: Shared = Rc::new(RefCell::new(SimState {
        model,
        attempt: Attempt::default(),
        stats: SimStats::default(),
    }));
    let rig = Rig {
        display: Box::new(SimDisplay {
            state: state.clone(),
            clock: clock.clone(),
        }),
        pointer: Box::new(SimPointer {
            state: state.clone(),
            clock: clock.clone(),
        }),
        feedback: Box::new(SimFeedback { state: state.clone() }),
        clock,
    };
    (rig, SimHandle { state })
}
