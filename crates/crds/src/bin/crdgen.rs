//! Prints the CRD manifests as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/crds.yaml`

use crds::{Gateway, GatewayClass, GatewayConfig, UDPRoute};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        GatewayClass::crd(),
        GatewayConfig::crd(),
        Gateway::crd(),
        UDPRoute::crd(),
    ];

    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
