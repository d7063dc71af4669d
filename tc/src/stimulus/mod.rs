//! Stimulus pool and selection rules
//!
//! The pool is reshuffled once per block; the selector turns trial numbers
//! and phase rules into pool positions.

mod pool;
mod selector;

pub use pool::{StimulusPool, StimulusRef};
pub use selector::{
    ComparisonContext, Selection, pick_comparison, pick_sample, pick_sample_for_repeat,
};
