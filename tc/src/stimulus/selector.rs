//! StimulusSelector - picks sample and comparison positions in the pool

use rand::Rng;
use tracing::debug;

use crate::phase::{ComparisonRule, SampleRule};

/// A position in the pool: entry index plus variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub variant: usize,
}

impl Selection {
    pub fn original(index: usize) -> Self {
        Self { index, variant: 0 }
    }
}

/// Trial facts a comparison rule may depend on
#[derive(Debug, Clone, Copy)]
pub struct ComparisonContext {
    /// Current block index (1-based once the first block has opened)
    pub block: u32,
    /// Variant the sample was drawn from
    pub sample_variant: usize,
}

fn effective_size(pool_size: usize, rule: SampleRule) -> usize {
    match rule {
        SampleRule::Sequential => pool_size,
        SampleRule::Window { size } => size.min(pool_size),
    }
}

/// Sample index for the `trial_number`-th trial (1-based) of a block
///
/// Walking the freshly shuffled pool in order uses every entry once before
/// any repeats.
pub fn pick_sample(trial_number: usize, pool_size: usize, rule: SampleRule) -> usize {
    let size = effective_size(pool_size, rule).max(1);
    trial_number.saturating_sub(1) % size
}

/// Sample index for a repeated (timed-out) trial: uniformly random, never
/// the index shown on the attempt that timed out
pub fn pick_sample_for_repeat<R: Rng + ?Sized>(
    previous: usize,
    pool_size: usize,
    rule: SampleRule,
    rng: &mut R,
) -> usize {
    let size = effective_size(pool_size, rule);
    debug!(previous, size, "pick_sample_for_repeat: called");
    if size < 2 {
        return previous;
    }
    pick_other(previous, size, rng)
}

/// Comparison for a changed trial; never the same image as the sample
pub fn pick_comparison<R: Rng + ?Sized>(
    sample: usize,
    pool_size: usize,
    rule: ComparisonRule,
    ctx: ComparisonContext,
    rng: &mut R,
) -> Selection {
    let selection = match rule {
        ComparisonRule::OtherStimulus => Selection::original(pick_other(sample, pool_size, rng)),
        ComparisonRule::OcclusionSwap => Selection {
            index: sample,
            variant: 1 - ctx.sample_variant.min(1),
        },
        ComparisonRule::DifficultyTier { tiers } => Selection {
            index: sample,
            variant: (ctx.block.saturating_sub(1) as usize) % tiers.max(1) + 1,
        },
    };
    debug!(sample, ?rule, ?selection, "pick_comparison: picked");
    selection
}

/// Uniform index in `0..size` other than `excluded`
fn pick_other<R: Rng + ?Sized>(excluded: usize, size: usize, rng: &mut R) -> usize {
    if size < 2 {
        return excluded;
    }
    let raw = rng.random_range(0..size - 1);
    if raw >= excluded { raw + 1 } else { raw }
}
