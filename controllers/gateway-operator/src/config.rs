//! Operator configuration.
//!
//! Everything is read from environment variables; unset variables fall back to
//! the defaults below.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Controller name GatewayClasses must carry to be managed by this operator
pub const DEFAULT_CONTROLLER_NAME: &str = "stunner.l7mp.io/gateway-operator";

/// Annotation associating a Service with a Gateway (`<namespace>/<name>` or `<name>`)
pub const RELATED_GATEWAY_ANNOTATION: &str = "stunner.l7mp.io/related-gateway-name";

/// Annotation overriding the public address resolved for a Gateway
pub const PUBLIC_ADDRESS_ANNOTATION: &str = "stunner.l7mp.io/public-address";

/// Key of the rendered configuration inside the ConfigMap
pub const CONFIG_MAP_KEY: &str = "stunnerd.conf";

/// Version string written into the rendered configuration
pub const STUNNER_CONFIG_VERSION: &str = "v1alpha1";

const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_UPDATE_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Runtime configuration of the operator
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// GatewayClass controller name we own
    pub controller_name: String,
    /// Namespace to watch, `None` for all namespaces
    pub watch_namespace: Option<String>,
    /// Bind address of the health/metrics endpoint
    pub probe_addr: SocketAddr,
    /// Capacity of the update request channel
    pub update_channel_capacity: usize,
    /// Read-patch-write attempts before a conflict is handed back to the renderer
    pub conflict_retries: u32,
    /// First conflict backoff
    pub conflict_backoff_min: Duration,
    /// Maximum conflict backoff
    pub conflict_backoff_max: Duration,
    /// First delay before re-rendering after a failed write
    pub failure_backoff_min: Duration,
    /// Maximum delay before re-rendering after a failed write
    pub failure_backoff_max: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            watch_namespace: None,
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            update_channel_capacity: DEFAULT_UPDATE_CHANNEL_CAPACITY,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            conflict_backoff_min: Duration::from_millis(50),
            conflict_backoff_max: Duration::from_millis(800),
            failure_backoff_min: Duration::from_secs(1),
            failure_backoff_max: Duration::from_secs(60),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let controller_name = lookup("CONTROLLER_NAME")
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.controller_name);
        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|s| !s.is_empty());

        let probe_addr = lookup("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {e}")))?;

        let update_channel_capacity = match lookup("UPDATE_CHANNEL_CAPACITY") {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| ControllerError::InvalidConfig(format!(
                    "UPDATE_CHANNEL_CAPACITY must be a positive integer, got {v:?}"
                )))?,
            None => defaults.update_channel_capacity,
        };

        let conflict_retries = match lookup("CONFLICT_RETRIES") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| ControllerError::InvalidConfig(format!(
                    "CONFLICT_RETRIES must be a positive integer, got {v:?}"
                )))?,
            None => defaults.conflict_retries,
        };

        Ok(Self {
            controller_name,
            watch_namespace,
            probe_addr,
            update_channel_capacity,
            conflict_retries,
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.controller_name, DEFAULT_CONTROLLER_NAME);
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.probe_addr.port(), 8081);
        assert_eq!(config.update_channel_capacity, 256);
        assert_eq!(config.conflict_retries, 5);
    }

    #[test]
    fn test_overrides() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            ("CONTROLLER_NAME", "example.com/other"),
            ("WATCH_NAMESPACE", "stunner"),
            ("PROBE_ADDR", "127.0.0.1:9000"),
            ("CONFLICT_RETRIES", "2"),
        ]))
        .unwrap();
        assert_eq!(config.controller_name, "example.com/other");
        assert_eq!(config.watch_namespace.as_deref(), Some("stunner"));
        assert_eq!(config.probe_addr.port(), 9000);
        assert_eq!(config.conflict_retries, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = OperatorConfig::from_lookup(lookup_from(&[("UPDATE_CHANNEL_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
        let err = OperatorConfig::from_lookup(lookup_from(&[("PROBE_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
