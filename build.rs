fn main() {
    // Gather build-time information (git hash, compiler, build time) for the
    // command-line tool's version output.
    built::write_built_file().expect("Failed to acquire build-time information");

    println!("cargo:rerun-if-changed=build.rs");
}
