//! Prints the NodeFeatureDiscovery CRD as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/nodefeaturediscovery.yaml`

use crds::NodeFeatureDiscovery;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crd = serde_yaml::to_string(&NodeFeatureDiscovery::crd())?;
    print!("{crd}");
    Ok(())
}
