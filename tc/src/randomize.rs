//! Constraint-satisfying shuffles for per-block trial sequences
//!
//! Change/no-change sequences must not contain long runs of the same value,
//! otherwise a subject can score by persevering on one button. Every
//! arrangement that satisfies the run limit should be equally likely.
//!
//! Plain rejection sampling (shuffle, reject if a run is too long) is exact
//! but slow for tight limits: for a balanced 120-trial block with
//! `max_run = 3` only about 1 shuffle in 8,700 is acceptable. A handful of
//! rejection attempts is tried first, then the sequence is built one
//! position at a time. Each next value is drawn with probability
//! proportional to the number of valid completions it leaves, which is
//! again uniform over all valid arrangements. Multisets too large for the
//! completion table fall back to weighting by remaining counts among values
//! that keep the tail feasible.

use std::collections::HashMap;
use std::hash::Hash;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::error::{ControllerError, Result};

/// Rejection-sampling attempts before building the sequence directly
pub const MAX_SHUFFLE_ATTEMPTS: usize = 100;

/// Largest completion table the exact construction will allocate
const MAX_TABLE_STATES: usize = 1 << 18;

/// Uniformly shuffle `items` in place
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    items.shuffle(rng);
}

/// Length of the longest run of consecutive items with equal keys
pub fn longest_run_by<T, K, F>(items: &[T], key: F) -> usize
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<K> = None;
    for item in items {
        let k = key(item);
        if previous.as_ref() == Some(&k) {
            current += 1;
        } else {
            current = 1;
        }
        longest = longest.max(current);
        previous = Some(k);
    }
    longest
}

/// Permutation of `sequence` with no run of equal values longer than `max_run`
pub fn shuffle_with_max_run<T, R>(sequence: &[T], max_run: usize, rng: &mut R) -> Result<Vec<T>>
where
    T: Clone + Eq + Hash,
    R: Rng + ?Sized,
{
    shuffle_with_max_run_by(sequence, max_run, |item| item.clone(), rng)
}

/// Permutation of `sequence` where runs are measured on `key(item)`
///
/// Used for paired trial attributes (e.g. changed flag plus occlusion flag)
/// where only one component is run-constrained.
pub fn shuffle_with_max_run_by<T, K, F, R>(sequence: &[T], max_run: usize, key: F, rng: &mut R) -> Result<Vec<T>>
where
    T: Clone,
    K: Clone + Eq + Hash,
    F: Fn(&T) -> K,
    R: Rng + ?Sized,
{
    debug!(len = sequence.len(), max_run, "shuffle_with_max_run_by: called");
    if sequence.is_empty() {
        return Ok(Vec::new());
    }
    check_feasible(sequence, max_run, &key)?;

    let mut candidate = sequence.to_vec();
    for attempt in 1..=MAX_SHUFFLE_ATTEMPTS {
        candidate.shuffle(rng);
        if longest_run_by(&candidate, &key) <= max_run {
            debug!(attempt, "shuffle_with_max_run_by: accepted");
            return Ok(candidate);
        }
    }

    debug!(
        len = sequence.len(),
        max_run,
        attempts = MAX_SHUFFLE_ATTEMPTS,
        "shuffle_with_max_run_by: rejection sampling exhausted, constructing"
    );
    let constructed = construct(sequence, max_run, &key, rng)?;
    if longest_run_by(&constructed, &key) > max_run {
        return Err(ControllerError::config(format!(
            "could not arrange {} items with runs of at most {}",
            sequence.len(),
            max_run
        )));
    }
    Ok(constructed)
}

/// Reject multisets for which no valid arrangement exists
///
/// With `c` copies of the most frequent key among `n` items, the other
/// `n - c` items split the sequence into at most `n - c + 1` slots, each
/// holding up to `max_run` copies.
fn check_feasible<T, K, F>(sequence: &[T], max_run: usize, key: &F) -> Result<()>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    if max_run == 0 {
        return Err(ControllerError::config("max run length must be at least 1"));
    }
    let mut counts: HashMap<K, usize> = HashMap::new();
    for item in sequence {
        *counts.entry(key(item)).or_default() += 1;
    }
    let n = sequence.len();
    let most = counts.values().copied().max().unwrap_or(0);
    if most > max_run.saturating_mul(n - most + 1) {
        return Err(ControllerError::config(format!(
            "{} of {} items share one value; runs of at most {} are impossible",
            most, n, max_run
        )));
    }
    Ok(())
}

/// Number of valid completions per (remaining counts, last key, run length)
///
/// Counts are kept as `f64`; only their ratios matter for sampling.
struct Completions {
    radix: Vec<usize>,
    keys: usize,
    max_run: usize,
    table: Vec<f64>,
}

impl Completions {
    const UNKNOWN: f64 = -1.0;

    fn new(counts: &[usize], max_run: usize) -> Option<Self> {
        let radix: Vec<usize> = counts.iter().map(|c| c + 1).collect();
        let states = radix
            .iter()
            .try_fold(counts.len().checked_mul(max_run)?, |acc, &r| acc.checked_mul(r))?;
        if states > MAX_TABLE_STATES {
            return None;
        }
        Some(Self {
            radix,
            keys: counts.len(),
            max_run,
            table: vec![Self::UNKNOWN; states],
        })
    }

    fn index(&self, remaining: &[usize], last: usize, run: usize) -> usize {
        let position = remaining.iter().zip(&self.radix).fold(0, |acc, (&c, &r)| acc * r + c);
        (position * self.keys + last) * self.max_run + (run - 1)
    }

    fn count(&mut self, remaining: &mut [usize], last: usize, run: usize) -> f64 {
        if remaining.iter().all(|&c| c == 0) {
            return 1.0;
        }
        let index = self.index(remaining, last, run);
        if self.table[index] != Self::UNKNOWN {
            return self.table[index];
        }
        let mut total = 0.0;
        for next in 0..self.keys {
            if remaining[next] == 0 || (next == last && run >= self.max_run) {
                continue;
            }
            let next_run = if next == last { run + 1 } else { 1 };
            remaining[next] -= 1;
            total += self.count(remaining, next, next_run);
            remaining[next] += 1;
        }
        self.table[index] = total;
        total
    }
}

/// Whether `remaining` can still be arranged after a run of `run` copies of
/// key `last`
fn tail_feasible(remaining: &[usize], last: usize, run: usize, max_run: usize) -> bool {
    let total: usize = remaining.iter().sum();
    remaining.iter().enumerate().all(|(k, &c)| {
        let others = total - c;
        let capacity = if k == last {
            (max_run - run).saturating_add(max_run.saturating_mul(others))
        } else {
            max_run.saturating_mul(others + 1)
        };
        c <= capacity
    })
}

/// Index drawn with probability proportional to its weight
fn weighted_pick<R: Rng + ?Sized>(candidates: &[(usize, f64)], rng: &mut R) -> Option<usize> {
    let total: f64 = candidates.iter().map(|(_, w)| w).sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }
    let mut target = rng.random_range(0.0..total);
    for &(index, weight) in candidates {
        if target < weight {
            return Some(index);
        }
        target -= weight;
    }
    candidates.last().map(|&(index, _)| index)
}

/// Build a valid arrangement one position at a time
fn construct<T, K, F, R>(sequence: &[T], max_run: usize, key: &F, rng: &mut R) -> Result<Vec<T>>
where
    T: Clone,
    K: Clone + Eq + Hash,
    F: Fn(&T) -> K,
    R: Rng + ?Sized,
{
    let mut buckets: Vec<(K, Vec<T>)> = Vec::new();
    for item in sequence {
        let k = key(item);
        match buckets.iter_mut().find(|(bk, _)| *bk == k) {
            Some((_, items)) => items.push(item.clone()),
            None => buckets.push((k, vec![item.clone()])),
        }
    }
    for (_, items) in buckets.iter_mut() {
        items.shuffle(rng);
    }

    let mut remaining: Vec<usize> = buckets.iter().map(|(_, items)| items.len()).collect();
    let mut completions = Completions::new(&remaining, max_run);
    if completions.is_none() {
        warn!(
            len = sequence.len(),
            keys = buckets.len(),
            "Sequence too large for exact construction, weighting by remaining counts"
        );
    }

    let mut out = Vec::with_capacity(sequence.len());
    let mut last: Option<usize> = None;
    let mut run = 0;
    while out.len() < sequence.len() {
        let mut candidates: Vec<(usize, f64)> = Vec::with_capacity(buckets.len());
        for next in 0..buckets.len() {
            if remaining[next] == 0 || (last == Some(next) && run >= max_run) {
                continue;
            }
            let next_run = if last == Some(next) { run + 1 } else { 1 };
            remaining[next] -= 1;
            let weight = match completions.as_mut() {
                Some(table) => table.count(&mut remaining, next, next_run),
                None if tail_feasible(&remaining, next, next_run, max_run) => (remaining[next] + 1) as f64,
                None => 0.0,
            };
            remaining[next] += 1;
            if weight > 0.0 {
                candidates.push((next, weight));
            }
        }

        let pick = weighted_pick(&candidates, rng).ok_or_else(|| {
            ControllerError::config(format!(
                "no valid continuation after {} of {} items with runs of at most {}",
                out.len(),
                sequence.len(),
                max_run
            ))
        })?;
        let item = buckets[pick]
            .1
            .pop()
            .ok_or_else(|| ControllerError::config("sequence bucket exhausted"))?;
        out.push(item);
        remaining[pick] -= 1;
        run = if last == Some(pick) { run + 1 } else { 1 };
        last = Some(pick);
    }
    Ok(out)
}
