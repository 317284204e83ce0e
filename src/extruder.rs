//! Extruder index mapping
//!
//! Paint states on the color channel are 1-based filament indices. The
//! conversion remaps every painted index through an [`ExtruderMap`] built
//! from the package's filament declarations; an index with no mapping
//! entry aborts the run rather than guessing a filament. Both encodings
//! number filaments the same way, so the map built from declarations is
//! an identity bounded by the declared count.
//!
//! Bambu Studio declares filaments in `Metadata/project_settings.config`,
//! a JSON document with parallel per-filament arrays (`filament_colour`,
//! `filament_type`, `filament_settings_id`).

use std::collections::HashMap;
use tracing::{debug, warn};

/// Maps source filament indices to target extruder indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtruderMap {
    kind: MapKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MapKind {
    /// Every index maps to itself; used when the package declares no
    /// filament set at all
    Unbounded,
    /// Identity over `1..=count`, the declared filament set
    Bounded(u8),
    /// Caller-provided pairs
    Explicit(HashMap<u8, u8>),
}

impl ExtruderMap {
    /// Identity map with no upper bound
    pub fn unbounded() -> Self {
        Self {
            kind: MapKind::Unbounded,
        }
    }

    /// Identity map over the declared filament count
    pub fn identity(count: u8) -> Self {
        Self {
            kind: MapKind::Bounded(count),
        }
    }

    /// Explicit source-to-target pairs
    ///
    /// Targets above [`crate::segmentation::STATE_MAX`] are not caught
    /// here; they fail later when the segmentation code is encoded.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        Self {
            kind: MapKind::Explicit(pairs.into_iter().collect()),
        }
    }

    /// Build the map from a Bambu project settings document
    ///
    /// Counts entries in the first per-filament array found. A config
    /// that cannot be parsed, or has no filament arrays, yields the
    /// unbounded identity so packages without meaningful settings still
    /// convert.
    pub fn from_project_settings(json: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                warn!("cannot parse project settings, assuming identity mapping: {e}");
                return Self::unbounded();
            }
        };

        for key in ["filament_colour", "filament_type", "filament_settings_id"] {
            if let Some(entries) = value.get(key).and_then(|v| v.as_array()) {
                if entries.is_empty() {
                    continue;
                }
                let count = entries.len().min(u8::MAX as usize) as u8;
                debug!(key, count, "declared filament set");
                return Self::identity(count);
            }
        }

        debug!("project settings declare no filament set, assuming identity mapping");
        Self::unbounded()
    }

    /// Resolve a source filament index
    pub fn resolve(&self, source: u8) -> Option<u8> {
        match &self.kind {
            MapKind::Unbounded => Some(source),
            MapKind::Bounded(count) => (1..=*count).contains(&source).then_some(source),
            MapKind::Explicit(map) => map.get(&source).copied(),
        }
    }
}

impl Default for ExtruderMap {
    fn default() -> Self {
        Self::unbounded()
    }
}
