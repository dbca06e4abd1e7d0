//! CRD YAML Generator
//!
//! This binary generates the Kubernetes CRD manifest for the Banana
//! resource served by the banana-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/bananas.yaml

use banana_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
