//! Build script for converge-status.
//!
//! Generates Rust bindings from the resource-status protobuf definition.
//!
//! If protoc is not available, the build uses the checked-in generated file.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Re-run if proto file changes
    println!("cargo:rerun-if-changed=proto/resourcestatus.proto");

    // Check if protoc is available
    let protoc_available = std::process::Command::new("protoc")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if protoc_available {
        tonic_build::configure()
            .build_client(true)
            .build_server(true)
            .out_dir("src/proto")
            .compile_protos(&["proto/resourcestatus.proto"], &["proto/"])?;
    } else {
        // Use the checked-in generated file
        println!("cargo:warning=protoc not found, using checked-in proto bindings");
    }

    Ok(())
}
