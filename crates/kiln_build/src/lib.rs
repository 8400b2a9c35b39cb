//! The external build step.
//!
//! [`Builder`] is the boundary between the rebuild driver and whatever
//! compiles a target. [`ToolchainBuilder`] is the real implementation: it
//! runs `maturin develop` for projects and `cargo build` for synthesized
//! single-file projects, and reports the produced library together with the
//! tool's raw output.

#![warn(missing_docs)]

pub mod builder;
pub mod environment;
pub mod error;
pub mod toolchain;
pub mod warnings;

pub use builder::{BuildKind, BuildProduct, BuildRequest, Builder};
pub use environment::{site_packages_dirs, venv_site_packages};
pub use error::BuildError;
pub use toolchain::{parse_maturin_version, ToolchainBuilder, MATURIN_VERSION_RANGE};
pub use warnings::output_has_warnings;
