//! STUNner Gateway CRD Definitions
//!
//! The Gateway API subset watched by the STUNner gateway operator
//! (GatewayClass, Gateway, UDPRoute) and the STUNner GatewayConfig.

pub mod condition;
pub mod gateway;
pub mod gateway_class;
pub mod gateway_config;
pub mod references;
pub mod udp_route;

pub use condition::*;
pub use gateway::*;
pub use gateway_class::*;
pub use gateway_config::*;
pub use references::*;
pub use udp_route::*;
