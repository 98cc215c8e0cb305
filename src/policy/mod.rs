//! Detection policy: configuration and the classification rule table.

pub mod config;
pub mod rules;

pub use config::{ConfigSource, DetectionConfig, DetectionRequest, EnvConfigSource, StaticConfigSource};
pub use rules::{Rule, RULE_ORDER};
