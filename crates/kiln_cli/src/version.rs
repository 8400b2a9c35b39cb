//! `kiln version`: report kiln and toolchain versions.

use std::error::Error;

use kiln_build::{ToolchainBuilder, MATURIN_VERSION_RANGE};

/// Prints the kiln version and the build tools that would be used.
pub fn run() -> Result<i32, Box<dyn Error>> {
    println!("kiln {}", env!("CARGO_PKG_VERSION"));
    match ToolchainBuilder::new().maturin() {
        Ok(path) => println!("maturin: {}", path.display()),
        Err(e) => {
            let ((a, b, c), (x, y, z)) = MATURIN_VERSION_RANGE;
            println!("maturin: unavailable ({e}); kiln needs >={a}.{b}.{c}, <{x}.{y}.{z}");
        }
    }
    match which::which("cargo") {
        Ok(path) => println!("cargo: {}", path.display()),
        Err(e) => println!("cargo: unavailable ({e})"),
    }
    Ok(0)
}
