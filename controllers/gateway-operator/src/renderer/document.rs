//! The rendered STUNner dataplane configuration.
//!
//! Only ordered collections are used, so serializing the same document twice
//! yields the same bytes.

use crate::config::{CONFIG_MAP_KEY, STUNNER_CONFIG_VERSION};
use crate::store::ObjectKey;
use crds::{AddressType, GatewayConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster type of route backends
pub const CLUSTER_TYPE_STRICT_DNS: &str = "STRICT_DNS";

/// Per-class output document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedConfig {
    /// Format version
    pub version: String,
    /// Admin section
    pub admin: AdminConfig,
    /// TURN authentication
    pub auth: AuthConfig,
    /// TURN listeners
    pub listeners: Vec<ListenerConfig>,
    /// Route backends
    pub clusters: Vec<ClusterConfig>,
}

/// Dataplane identity and logging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    /// Dataplane name
    pub name: String,
    /// Dataplane log level
    pub log_level: String,
}

/// TURN authentication settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// "plaintext" or "longterm"
    #[serde(rename = "type")]
    pub type_: String,
    /// TURN realm
    pub realm: String,
    /// Credentials matching the type
    pub credentials: BTreeMap<String, String>,
}

/// One TURN listener of the dataplane
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    /// `<namespace>/<gateway>/<listener>`
    pub name: String,
    /// Listener protocol
    pub protocol: String,
    /// Listener port
    pub port: i32,
    /// Lower bound of the relay port range
    pub min_relay_port: i32,
    /// Upper bound of the relay port range
    pub max_relay_port: i32,
    /// Resolved public address, absent when resolution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<PublicAddressConfig>,
    /// Public port, absent when resolution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_port: Option<i32>,
    /// Names of the clusters reachable through this listener
    #[serde(default)]
    pub routes: Vec<String>,
}

/// Externally reachable address of a listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicAddressConfig {
    /// Address type
    #[serde(rename = "type")]
    pub type_: AddressType,
    /// Address value
    pub value: String,
}

/// Backends reachable through one UDPRoute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// `<namespace>/<route>`
    pub name: String,
    /// Cluster type
    #[serde(rename = "type")]
    pub type_: String,
    /// Backend FQDNs, sorted
    pub endpoints: Vec<String>,
}

impl RenderedConfig {
    /// Empty document carrying the settings of `config`
    pub fn new(config: &GatewayConfig) -> Self {
        let spec = &config.spec;
        let mut credentials = BTreeMap::new();
        if spec.auth_type() == "longterm" {
            if let Some(secret) = &spec.shared_secret {
                credentials.insert("secret".to_string(), secret.clone());
            }
        } else {
            if let Some(user) = &spec.user_name {
                credentials.insert("username".to_string(), user.clone());
            }
            if let Some(password) = &spec.password {
                credentials.insert("password".to_string(), password.clone());
            }
        }

        Self {
            version: STUNNER_CONFIG_VERSION.to_string(),
            admin: AdminConfig {
                name: ObjectKey::of(config).map(|k| k.to_string()).unwrap_or_default(),
                log_level: spec.log_level().to_string(),
            },
            auth: AuthConfig {
                type_: spec.auth_type().to_string(),
                realm: spec.realm().to_string(),
                credentials,
            },
            listeners: Vec::new(),
            clusters: Vec::new(),
        }
    }

    /// Add a cluster unless one of the same name is already present
    pub fn add_cluster(&mut self, cluster: ClusterConfig) {
        if let Err(pos) = self.clusters.binary_search_by(|c| c.name.cmp(&cluster.name)) {
            self.clusters.insert(pos, cluster);
        }
    }

    /// ConfigMap data holding the serialized document
    pub fn to_config_map_data(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        Ok(BTreeMap::from([(CONFIG_MAP_KEY.to_string(), serde_json::to_string(self)?)]))
    }

    /// Parse the document back from ConfigMap data
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Option<Self> {
        data.get(CONFIG_MAP_KEY).and_then(|s| serde_json::from_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_defaults_and_plaintext_credentials() {
        let config = create_test_gateway_config("default", "default");
        let doc = RenderedConfig::new(&config);
        assert_eq!(doc.version, "v1alpha1");
        assert_eq!(doc.admin.name, "default/default");
        assert_eq!(doc.admin.log_level, "all:INFO");
        assert_eq!(doc.auth.type_, "plaintext");
        assert_eq!(doc.auth.credentials["username"], "user");
        assert_eq!(doc.auth.credentials["password"], "pass");
    }

    #[test]
    fn test_longterm_credentials() {
        let mut config = create_test_gateway_config("default", "default");
        config.spec.auth_type = Some("longterm".to_string());
        config.spec.shared_secret = Some("s3cr3t".to_string());
        let doc = RenderedConfig::new(&config);
        assert_eq!(doc.auth.credentials.len(), 1);
        assert_eq!(doc.auth.credentials["secret"], "s3cr3t");
    }

    #[test]
    fn test_clusters_sorted_and_unique() {
        let mut doc = RenderedConfig::new(&create_test_gateway_config("default", "default"));
        for name in ["default/b", "default/a", "default/b"] {
            doc.add_cluster(ClusterConfig {
                name: name.to_string(),
                type_: CLUSTER_TYPE_STRICT_DNS.to_string(),
                endpoints: vec![],
            });
        }
        let names: Vec<_> = doc.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["default/a", "default/b"]);
    }

    #[test]
    fn test_config_map_data_wire_shape() {
        let doc = RenderedConfig::new(&create_test_gateway_config("default", "default"));
        let data = doc.to_config_map_data().unwrap();
        let value: serde_json::Value = serde_json::from_str(&data["stunnerd.conf"]).unwrap();
        assert_eq!(value["admin"]["logLevel"], "all:INFO");
        assert_eq!(value["auth"]["type"], "plaintext");
        assert_eq!(RenderedConfig::from_config_map_data(&data), Some(doc));
    }
}
