// src/labels.rs
//
// Canonicalization of free-text classification labels. Classifier class
// names and registry typologies arrive as a mess of abbreviations
// ("c", "res", "shop"); the synonym table in config maps them onto a small
// canonical set so voting compares like with like.

use crate::types::LabelConfig;
use std::collections::HashMap;

pub struct LabelCanonicalizer {
    lookup: HashMap<String, String>,
}

impl LabelCanonicalizer {
    /// Build the reverse lookup (synonym → canonical) from the config table.
    /// Canonical labels map to themselves, so already-clean input is a no-op.
    pub fn from_config(config: &LabelConfig) -> Self {
        let mut lookup = HashMap::new();
        for (canonical, synonyms) in &config.synonyms {
            let canonical = normalize(canonical);
            lookup.insert(canonical.clone(), canonical.clone());
            for synonym in synonyms {
                lookup.insert(normalize(synonym), canonical.clone());
            }
        }
        Self { lookup }
    }

    /// Map a raw label to its canonical form. Unknown labels pass through
    /// normalized (trimmed, lowercased) rather than being dropped; an
    /// unrecognized class is still a vote, just for itself.
    pub fn canonicalize(&self, raw: &str) -> String {
        let normalized = normalize(raw);
        self.lookup.get(&normalized).cloned().unwrap_or(normalized)
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}
