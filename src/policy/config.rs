//! Detection configuration.
//!
//! Values are read from a [`ConfigSource`] at the start of every
//! invocation and never cached, so operators can change the field,
//! distance or cap without restarting the process.
//!
//! ## Keys
//!
//! | Key | Default | Notes |
//! |-----|---------|-------|
//! | `duplication.detection.field` | `dc.title` | `schema.element[.qualifier]` |
//! | `duplication.detection.edit-distance` | 8 | non-negative |
//! | `duplication.detection.maximum-duplicates` | 10 | `< 1` = unbounded |

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::canonical_hash_hex;
use crate::types::{FieldSelector, ResultCap};
use crate::{DEFAULT_MAX_EDIT_DISTANCE, DEFAULT_MAXIMUM_DUPLICATES};

/// Key for the compared field.
pub const FIELD_KEY: &str = "duplication.detection.field";

/// Key for the maximum edit distance.
pub const EDIT_DISTANCE_KEY: &str = "duplication.detection.edit-distance";

/// Key for the result cap.
pub const MAXIMUM_DUPLICATES_KEY: &str = "duplication.detection.maximum-duplicates";

/// A source of configuration properties.
pub trait ConfigSource: Send + Sync {
    /// Look up a property; `None` when unset.
    fn get(&self, key: &str) -> Option<String>;

    /// Look up an integer property, falling back to `default` when unset or malformed.
    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, default, "Ignoring malformed integer property");
                default
            }),
        }
    }
}

/// Reads properties from environment variables.
///
/// `duplication.detection.edit-distance` is read from
/// `DUPLICATION_DETECTION_EDIT_DISTANCE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    /// Environment variable name for a property key.
    pub fn env_name(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                '.' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_name(key)).ok()
    }
}

/// In-process properties that can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    properties: RwLock<BTreeMap<String, String>>,
}

impl StaticConfigSource {
    /// Create an empty source (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source from key/value pairs.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let properties = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            properties: RwLock::new(properties),
        }
    }

    /// Set a property; takes effect on the next invocation.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.write().insert(key.into(), value.into());
    }

    /// Remove a property.
    pub fn unset(&self, key: &str) {
        self.properties.write().remove(key);
    }
}

impl ConfigSource for StaticConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }
}

/// Immutable configuration snapshot for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Configured field selector, unparsed. `None` selects `dc.title`.
    pub field_selector: Option<String>,
    /// Maximum edit distance.
    pub max_distance: u32,
    /// Result cap.
    pub cap: ResultCap,
}

impl DetectionConfig {
    /// Read a fresh snapshot from `source`.
    pub fn load<C: ConfigSource + ?Sized>(source: &C) -> Self {
        let field_selector = source
            .get(FIELD_KEY)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let raw_distance = source.get_int(EDIT_DISTANCE_KEY, i64::from(DEFAULT_MAX_EDIT_DISTANCE));
        let max_distance = u32::try_from(raw_distance).unwrap_or_else(|_| {
            tracing::warn!(
                key = EDIT_DISTANCE_KEY,
                value = raw_distance,
                default = DEFAULT_MAX_EDIT_DISTANCE,
                "Edit distance out of range, using default"
            );
            DEFAULT_MAX_EDIT_DISTANCE
        });

        let cap = ResultCap::from_config(source.get_int(MAXIMUM_DUPLICATES_KEY, DEFAULT_MAXIMUM_DUPLICATES));

        Self {
            field_selector,
            max_distance,
            cap,
        }
    }

    /// Hash of the snapshot for diagnostics.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            field_selector: None,
            max_distance: DEFAULT_MAX_EDIT_DISTANCE,
            cap: ResultCap::default(),
        }
    }
}

/// Per-call overrides of the loaded configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionRequest {
    /// Field to compare instead of the configured one.
    pub field: Option<FieldSelector>,
    /// Edit distance instead of the configured one.
    pub max_distance: Option<u32>,
    /// Cap instead of the configured one.
    pub cap: Option<ResultCap>,
    /// Sample value instead of the subject's stored value.
    pub sample: Option<String>,
}

impl DetectionRequest {
    /// Request using configured values only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the field.
    pub fn with_field(mut self, field: FieldSelector) -> Self {
        self.field = Some(field);
        self
    }

    /// Override the edit distance.
    pub fn with_max_distance(mut self, max_distance: u32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    /// Override the cap.
    pub fn with_cap(mut self, cap: ResultCap) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Search for this value instead of the subject's stored one.
    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }
}
