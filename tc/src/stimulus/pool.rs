//! StimulusPool - the per-phase list of stimulus images and their variants

use std::path::{Component, Path, PathBuf};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, Result};
use crate::randomize;

/// One image as shown on screen and named in the trial log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StimulusRef {
    /// Log name: path below the phase folder, without extension
    pub name: String,
    pub path: PathBuf,
}

impl StimulusRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for StimulusRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered stimulus entries; each entry holds the variants of one stimulus
/// (original first, then occluded or changed versions)
#[derive(Debug, Clone)]
pub struct StimulusPool {
    entries: Vec<Vec<StimulusRef>>,
}

impl StimulusPool {
    /// Build a pool from explicit entries
    pub fn from_entries(entries: Vec<Vec<StimulusRef>>) -> Result<Self> {
        if entries.len() < 2 {
            return Err(ControllerError::config(format!(
                "stimulus pool needs at least 2 entries, found {}",
                entries.len()
            )));
        }
        if entries.iter().any(|variants| variants.is_empty()) {
            return Err(ControllerError::config("stimulus entry without any image"));
        }
        Ok(Self { entries })
    }

    /// Load the pool by expanding one glob per variant below `root`
    ///
    /// Files of each variant are sorted by path and zipped by position, so
    /// `changed2/cat.jpg` pairs with `original/cat.jpg` as long as every
    /// folder holds the same file names.
    pub fn load(root: &Path, patterns: &[String]) -> Result<Self> {
        debug!(?root, ?patterns, "StimulusPool::load: called");
        let mut variant_files: Vec<Vec<PathBuf>> = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let full = root.join(pattern);
            let full = full.to_string_lossy();
            let paths = glob::glob(&full)
                .map_err(|e| ControllerError::config(format!("invalid stimulus pattern {}: {}", full, e)))?;
            let mut files = Vec::new();
            for entry in paths {
                let path = entry.map_err(|e| ControllerError::config(format!("unreadable stimulus path: {}", e)))?;
                if path.is_file() {
                    files.push(path);
                }
            }
            files.sort();
            if files.is_empty() {
                return Err(ControllerError::config(format!("no stimuli match {}", full)));
            }
            variant_files.push(files);
        }

        let count = variant_files.iter().map(Vec::len).min().unwrap_or(0);
        if variant_files.iter().any(|files| files.len() != count) {
            warn!(
                counts = ?variant_files.iter().map(Vec::len).collect::<Vec<_>>(),
                "Stimulus folders differ in size, extra files ignored"
            );
        }

        let entries = (0..count)
            .map(|i| {
                variant_files
                    .iter()
                    .map(|files| StimulusRef::new(stimulus_name(root, &files[i]), files[i].clone()))
                    .collect()
            })
            .collect();
        let pool = Self::from_entries(entries)?;
        info!(entries = pool.len(), variants = patterns.len(), "Loaded stimulus pool");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variant `variant` of entry `index`
    pub fn get(&self, index: usize, variant: usize) -> Result<&StimulusRef> {
        self.entries
            .get(index)
            .and_then(|variants| variants.get(variant))
            .ok_or_else(|| ControllerError::config(format!("no stimulus variant {} for entry {}", variant, index)))
    }

    /// Reorder entries uniformly; variants stay together
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        randomize::shuffle(&mut self.entries, rng);
    }
}

/// Name logged for a stimulus: the path below the phase folder, without
/// extension (`phase3_stimuli/occluded/cat.GIF` becomes `occluded/cat`)
fn stimulus_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    match parts.len() {
        0 => path.to_string_lossy().to_string(),
        1 => parts[0].clone(),
        _ => parts[1..].join("/"),
    }
}
