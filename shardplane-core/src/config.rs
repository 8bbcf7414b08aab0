//! Namespace and distribution configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ElectionError, ElectionResult};

/// Identity and election parameters for one namespace.
///
/// A namespace is a logical partition of shards with an independent leader.
/// The election parameters are passed through to the elector factory; the
/// supervisor itself only interprets `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace name, unique within one manager.
    pub name: String,

    /// Lease key campaigned on in the consensus store.
    /// Defaults to `shardplane/leader/<name>` when unset.
    pub lease_key: Option<String>,

    /// Store session time-to-live. Bounds how long a crashed leader's lease
    /// lingers before another process can win it.
    pub lease_ttl: Duration,

    /// Interval between session keep-alives while campaigning.
    pub heartbeat_interval: Duration,
}

impl NamespaceConfig {
    /// Creates a config for `name` with default election parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lease_key: None,
            lease_ttl: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(1),
        }
    }

    pub fn with_lease_key(mut self, key: impl Into<String>) -> Self {
        self.lease_key = Some(key.into());
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// The lease key this namespace campaigns on.
    pub fn lease_key(&self) -> String {
        self.lease_key
            .clone()
            .unwrap_or_else(|| format!("shardplane/leader/{}", self.name))
    }

    /// Validates the identity fields the control plane interprets itself.
    ///
    /// The lease parameters are opaque here; whether they make sense for a
    /// particular store is the elector factory's call.
    pub fn validate(&self) -> ElectionResult<()> {
        if self.name.is_empty() {
            return Err(ElectionError::config("namespace name must not be empty"));
        }
        Ok(())
    }
}

/// The set of namespaces one manager supervises.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardDistributionConfig {
    pub namespaces: Vec<NamespaceConfig>,
}

impl ShardDistributionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: NamespaceConfig) -> Self {
        self.namespaces.push(namespace);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lease_key_derived_from_name() {
        let ns = NamespaceConfig::new("orders");
        assert_eq!(ns.lease_key(), "shardplane/leader/orders");

        let ns = ns.with_lease_key("custom/key");
        assert_eq!(ns.lease_key(), "custom/key");
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let ns = NamespaceConfig::new("");
        assert!(matches!(
            ns.validate(),
            Err(ElectionError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_ignores_lease_parameters() {
        // Opaque to the control plane; a factory may still reject them.
        let ns = NamespaceConfig::new("orders")
            .with_lease_ttl(Duration::ZERO)
            .with_heartbeat_interval(Duration::from_secs(5));
        assert!(ns.validate().is_ok());
    }

    #[test]
    fn test_valid_config_passes() {
        let ns = NamespaceConfig::new("orders");
        assert!(ns.validate().is_ok());
    }

    #[test]
    fn test_distribution_config_builder() {
        let cfg = ShardDistributionConfig::new()
            .with_namespace(NamespaceConfig::new("a"))
            .with_namespace(NamespaceConfig::new("b"));
        assert_eq!(cfg.namespaces.len(), 2);
    }
}
