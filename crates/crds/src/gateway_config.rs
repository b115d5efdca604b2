//! GatewayConfig CRD
//!
//! Dataplane-wide STUNner settings referenced from a GatewayClass: where the
//! rendered configuration is written, TURN authentication and logging.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default name of the ConfigMap holding the rendered dataplane configuration
pub const DEFAULT_STUNNER_CONFIG: &str = "stunnerd-config";

/// Default TURN realm
pub const DEFAULT_REALM: &str = "stunner.l7mp.io";

/// Default TURN authentication type
pub const DEFAULT_AUTH_TYPE: &str = "plaintext";

/// Default dataplane log level
pub const DEFAULT_LOG_LEVEL: &str = "all:INFO";

/// Default lower bound of the relay port range
pub const DEFAULT_MIN_PORT: i32 = 1 << 15;

/// Default upper bound of the relay port range
pub const DEFAULT_MAX_PORT: i32 = (1 << 16) - 1;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "stunner.l7mp.io",
    version = "v1alpha1",
    kind = "GatewayConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigSpec {
    /// Name of the ConfigMap the rendered configuration is written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stunner_config: Option<String>,

    /// TURN realm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Authentication type ("plaintext" or "longterm")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    /// Username for plaintext authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Password for plaintext authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Shared secret for longterm authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,

    /// Dataplane log level (e.g. "all:INFO")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Lower bound of the relay port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_port: Option<i32>,

    /// Upper bound of the relay port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_port: Option<i32>,
}

impl GatewayConfigSpec {
    /// ConfigMap name, falling back to the default
    pub fn stunner_config_name(&self) -> &str {
        self.stunner_config.as_deref().unwrap_or(DEFAULT_STUNNER_CONFIG)
    }

    /// Realm, falling back to the default
    pub fn realm(&self) -> &str {
        self.realm.as_deref().unwrap_or(DEFAULT_REALM)
    }

    /// Authentication type, falling back to the default
    pub fn auth_type(&self) -> &str {
        self.auth_type.as_deref().unwrap_or(DEFAULT_AUTH_TYPE)
    }

    /// Log level, falling back to the default
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Relay port range, falling back to the defaults
    pub fn port_range(&self) -> (i32, i32) {
        (
            self.min_port.unwrap_or(DEFAULT_MIN_PORT),
            self.max_port.unwrap_or(DEFAULT_MAX_PORT),
        )
    }
}
