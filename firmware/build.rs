use std::env;
use std::fs;
use std::path::PathBuf;

const PROTOCOL_FEATURES: [&str; 3] = ["SBUS", "SUMD", "IBUS"];

fn main() {
    // Linker script for the CH32V203 memory map
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::copy("memory.x", out.join("memory.x")).expect("memory.x copied to OUT_DIR");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    // The radio protocol is fixed at build time; SBUS wins over SUMD over IBUS
    let enabled: Vec<&str> = PROTOCOL_FEATURES
        .iter()
        .copied()
        .filter(|f| env::var_os(format!("CARGO_FEATURE_{}", f)).is_some())
        .collect();
    if enabled.len() > 1 {
        println!(
            "cargo:warning=several radio protocols enabled ({}), using {}",
            enabled.join(", "),
            enabled[0].to_lowercase()
        );
    }
}
