//! Rebuild-on-load for native extension modules.
//!
//! [`ImportHook::import`] maps an import name to a project or a standalone
//! source file, lets the [`Driver`] decide whether the target must be rebuilt,
//! and hands the resulting artifact to the [`Reconciler`], which binds it into
//! the [`ModuleRegistry`] through a [`Loader`].
//!
//! The driver is a small state machine (see [`DriverState`]) that checks the
//! cache without the lock, then again under the lock, so concurrent loads of
//! one stale target produce a single build.

#![warn(missing_docs)]

pub mod alias;
pub mod driver;
pub mod dylib;
pub mod error;
pub mod hook;
pub mod reconcile;
pub mod registry;
pub mod synth;

pub use alias::SessionDir;
pub use driver::{BuildOutcome, Driver, DriverObserver, DriverOptions, DriverState, NoopObserver};
pub use dylib::DylibLoader;
pub use error::HookError;
pub use hook::ImportHook;
pub use reconcile::Reconciler;
pub use registry::{Binding, LoadError, Loader, ModuleRegistry};
pub use synth::synthesize_project;
