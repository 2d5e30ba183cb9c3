//! Centralized feature flags.
//!
//! Call sites consult a single `Features` container attached to `Config`
//! instead of threading individual booleans through every type.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// High-level lifecycle stage for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Experimental,
    Beta,
    Stable,
}

/// Unique features toggled via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// Render the agent-mode controls and allow multi-step agent runs.
    AgentMode,
    /// Resolve `@file <name>` mentions into attachments before sending.
    FileReferences,
    /// Allow editing tool-call arguments in the approval dialog when the
    /// server permits it.
    ApprovalEdits,
}

impl Feature {
    pub fn key(self) -> &'static str {
        self.info().key
    }

    pub fn stage(self) -> Stage {
        self.info().stage
    }

    pub fn default_enabled(self) -> bool {
        self.info().default_enabled
    }

    fn info(self) -> &'static FeatureSpec {
        FEATURES
            .iter()
            .find(|spec| spec.id == self)
            .unwrap_or_else(|| unreachable!("missing FeatureSpec for {:?}", self))
    }
}

/// Holds the effective set of enabled features.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    enabled: BTreeSet<Feature>,
}

impl Default for Features {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Features {
    /// Starts with built-in defaults.
    pub fn with_defaults() -> Self {
        let enabled = FEATURES
            .iter()
            .filter(|spec| spec.default_enabled)
            .map(|spec| spec.id)
            .collect();
        Self { enabled }
    }

    pub fn enabled(&self, f: Feature) -> bool {
        self.enabled.contains(&f)
    }

    pub fn enable(&mut self, f: Feature) -> &mut Self {
        self.enabled.insert(f);
        self
    }

    pub fn disable(&mut self, f: Feature) -> &mut Self {
        self.enabled.remove(&f);
        self
    }

    /// Apply a table of key -> bool toggles (e.g. from TOML).
    pub fn apply_map(&mut self, m: &BTreeMap<String, bool>) {
        for (k, v) in m {
            match feature_for_key(k) {
                Some(feat) => {
                    if *v {
                        self.enable(feat);
                    } else {
                        self.disable(feat);
                    }
                }
                None => {
                    tracing::warn!("unknown feature key in config: {k}");
                }
            }
        }
    }
}

fn feature_for_key(key: &str) -> Option<Feature> {
    FEATURES
        .iter()
        .find(|spec| spec.key == key)
        .map(|spec| spec.id)
}

/// Returns `true` if the provided string matches a known feature toggle key.
pub fn is_known_feature_key(key: &str) -> bool {
    feature_for_key(key).is_some()
}

/// Deserializable features table for TOML.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FeaturesToml {
    #[serde(flatten)]
    pub entries: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureSpec {
    pub id: Feature,
    pub key: &'static str,
    pub stage: Stage,
    pub default_enabled: bool,
}

pub const FEATURES: &[FeatureSpec] = &[
    FeatureSpec {
        id: Feature::AgentMode,
        key: "agent_mode",
        stage: Stage::Beta,
        default_enabled: true,
    },
    FeatureSpec {
        id: Feature::FileReferences,
        key: "file_references",
        stage: Stage::Stable,
        default_enabled: true,
    },
    FeatureSpec {
        id: Feature::ApprovalEdits,
        key: "approval_edits",
        stage: Stage::Experimental,
        default_enabled: true,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_agent_mode() {
        let features = Features::with_defaults();
        assert!(features.enabled(Feature::AgentMode));
        assert!(features.enabled(Feature::FileReferences));
    }

    #[test]
    fn apply_map_toggles_known_keys_and_ignores_unknown() {
        let mut features = Features::with_defaults();
        features.apply_map(&BTreeMap::from([
            ("agent_mode".to_string(), false),
            ("no_such_feature".to_string(), true),
        ]));
        assert!(!features.enabled(Feature::AgentMode));
        assert!(is_known_feature_key("file_references"));
        assert!(!is_known_feature_key("no_such_feature"));
    }
}
