/*
 * Build script for compiling protobuf definitions using tonic-build.
 */

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Generated code is written next to the sources; make sure the directory exists
    std::fs::create_dir_all("src/generated")?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/generated")
        .compile_protos(&["proto/gol.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/gol.proto");

    Ok(())
}
