//! Shared foundational types used across the kiln rebuild-on-load engine.
//!
//! This crate provides content hashing used for fingerprints and cache keys,
//! and an injectable view of the process environment so configuration
//! resolution can be tested without mutating global state.

#![warn(missing_docs)]

pub mod env;
pub mod hash;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use hash::{ContentHash, ContentHasher, ParseHashError};
