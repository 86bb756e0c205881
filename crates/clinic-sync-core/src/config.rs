//! Replica configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How editing a visit treats the stock consumed by its previous
/// prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitEditPolicy {
    /// Return the previous prescription's units to stock, then deduct the
    /// new prescription.
    #[default]
    RestorePrevious,
    /// Deduct the new prescription in full without restoring the old one.
    /// Double-counts units that appear in both.
    ReapplyOnly,
}

/// Configuration for one replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    /// Durable-store key prefix.
    pub namespace: String,
    /// Replication channel shared by all replicas of the installation.
    pub channel_name: String,
    /// Length of the ApplyingRemote guard window, in milliseconds.
    pub debounce_ms: u64,
    /// Customer name recorded when a sale has none.
    pub walk_in_label: String,
    pub visit_edit_policy: VisitEditPolicy,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            namespace: "clinic_".to_string(),
            channel_name: "clinic-sync".to_string(),
            debounce_ms: 100,
            walk_in_label: "Walk-in Customer".to_string(),
            visit_edit_policy: VisitEditPolicy::default(),
        }
    }
}

impl ClinicConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn builder() -> ClinicConfigBuilder {
        ClinicConfigBuilder::new()
    }
}

/// Builder for [`ClinicConfig`].
pub struct ClinicConfigBuilder {
    config: ClinicConfig,
}

impl ClinicConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClinicConfig::default(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.config.channel_name = name.into();
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.debounce_ms = ms;
        self
    }

    pub fn walk_in_label(mut self, label: impl Into<String>) -> Self {
        self.config.walk_in_label = label.into();
        self
    }

    pub fn visit_edit_policy(mut self, policy: VisitEditPolicy) -> Self {
        self.config.visit_edit_policy = policy;
        self
    }

    pub fn build(self) -> ClinicConfig {
        self.config
    }
}

impl Default for ClinicConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClinicConfig::default();
        assert_eq!(config.namespace, "clinic_");
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.visit_edit_policy, VisitEditPolicy::RestorePrevious);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ClinicConfig::from_json(r#"{"debounce_ms": 250, "visit_edit_policy": "reapply_only"}"#)
                .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.visit_edit_policy, VisitEditPolicy::ReapplyOnly);
        assert_eq!(config.channel_name, "clinic-sync");
    }

    #[test]
    fn test_builder() {
        let config = ClinicConfig::builder()
            .namespace("branch2_")
            .walk_in_label("Counter Sale")
            .build();
        assert_eq!(config.namespace, "branch2_");
        assert_eq!(config.walk_in_label, "Counter Sale");
        assert_eq!(config.debounce_ms, 100);
    }
}
