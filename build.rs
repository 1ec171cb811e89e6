use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let proto_dir = manifest_dir.join("proto");
    let protos: Vec<PathBuf> = ["account.proto", "catalog.proto", "order.proto"]
        .iter()
        .map(|name| proto_dir.join(name))
        .collect();

    for proto in &protos {
        if !proto.exists() {
            return Err(format!("Proto file not found: {}", proto.display()).into());
        }
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    // Servers are generated too; the test suite runs an in-process order service.
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&protos, &[proto_dir])?;

    Ok(())
}
