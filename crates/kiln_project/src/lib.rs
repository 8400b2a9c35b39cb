//! Recognizes native extension projects and locates import targets.
//!
//! A project is a directory with a `pyproject.toml` and a Cargo manifest.
//! [`resolve_project`] reads both files into a [`ProjectLayout`];
//! [`Discovery`] maps an import name and a list of search paths onto either
//! a project or a standalone `<module>.rs` file.

#![warn(missing_docs)]

pub mod discover;
pub mod error;
pub mod layout;
pub mod resolver;

pub use discover::{
    find_extension_module, find_installed_extension, find_project_above, find_standalone_file,
    load_dist_info, DiscoveredTarget, Discovery, DistInfoLink,
};
pub use error::ProjectError;
pub use layout::{find_cargo_manifest, is_maybe_project, resolve_project, ProjectLayout};
pub use resolver::ProjectResolver;
