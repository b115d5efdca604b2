//! Resource write-back client
//!
//! Narrow client used by the STUNner gateway operator to write results back to
//! the cluster: status subresource patches on Gateway API objects and the
//! ConfigMap carrying the rendered dataplane configuration.
//!
//! # Example
//!
//! ```no_run
//! use resource_client::{KubeClient, ResourceClient, TargetKind, TargetRef};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClient::new(kube::Client::try_default().await?, "stunner-gateway-operator");
//! let target = TargetRef::namespaced(TargetKind::Gateway, "stunner", "udp-gateway");
//! let rv = client.resource_version(&target).await?;
//! client.patch_status(&target, &rv, &serde_json::json!({"addresses": []})).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod client_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClient;
pub use client_trait::ResourceClient;
pub use error::ClientError;
pub use models::{ObjectStatus, TargetKind, TargetRef};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockResourceClient;
