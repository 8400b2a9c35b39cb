//! The rebuild decision state machine.
//!
//! Each load request walks
//! `FingerprintComputed -> CacheChecked -> LockAcquired -> CacheRechecked ->
//! Building -> Ready`, short-circuiting to `Ready` from either cache check.
//! The first check runs without the lock so that an up-to-date target never
//! waits on a build of the same target elsewhere. The second check, under the
//! lock, turns N concurrent requests for a stale target into one build.

use crate::error::HookError;
use kiln_build::{output_has_warnings, BuildRequest, Builder};
use kiln_cache::{
    BuildLock, CacheError, CacheRecord, CacheStore, Fingerprint, FingerprintEngine, Target,
    TargetIdentity,
};
use kiln_config::{BuildSettings, HookConfig, LockTimeoutPolicy};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A stage of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// The current fingerprint is known.
    FingerprintComputed,
    /// The cache was consulted without the lock and did not match.
    CacheChecked,
    /// The target's build lock is held.
    LockAcquired,
    /// The cache was consulted again under the lock and did not match.
    CacheRechecked,
    /// The external builder is running.
    Building,
    /// An up-to-date artifact is available.
    Ready,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FingerprintComputed => "fingerprint computed",
            Self::CacheChecked => "cache checked",
            Self::LockAcquired => "lock acquired",
            Self::CacheRechecked => "cache rechecked",
            Self::Building => "building",
            Self::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Notified on every state transition of every load request.
///
/// Called synchronously on the requesting thread, so an observer can widen
/// race windows in tests by sleeping.
pub trait DriverObserver: Send + Sync {
    /// `target` has entered `state`.
    fn on_transition(&self, target: &TargetIdentity, state: DriverState);
}

/// An observer that ignores every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DriverObserver for NoopObserver {
    fn on_transition(&self, _target: &TargetIdentity, _state: DriverState) {}
}

/// Knobs the driver reads from the resolved configuration.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Build tool flags; part of every fingerprint.
    pub settings: BuildSettings,
    /// Lock wait limit, `None` to wait indefinitely.
    pub lock_timeout: Option<Duration>,
    /// What to do when the lock wait times out.
    pub on_lock_timeout: LockTimeoutPolicy,
    /// Skip both cache checks.
    pub force_rebuild: bool,
    /// Report build warnings at warn level.
    pub show_warnings: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_config(&HookConfig::default())
    }
}

impl DriverOptions {
    /// Extracts the driver's options from a resolved configuration.
    pub fn from_config(config: &HookConfig) -> Self {
        Self {
            settings: config.settings.clone(),
            lock_timeout: config.lock_timeout(),
            on_lock_timeout: config.on_lock_timeout,
            force_rebuild: config.force_rebuild,
            show_warnings: config.show_warnings,
        }
    }
}

/// The result of a load request that reached `Ready`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    /// The library to load.
    pub artifact: PathBuf,
    /// Fingerprint the artifact corresponds to.
    pub fingerprint: Fingerprint,
    /// True if this request ran the builder.
    pub rebuilt: bool,
}

/// Decides whether a target needs rebuilding and coordinates the build.
pub struct Driver {
    engine: FingerprintEngine,
    store: CacheStore,
    builder: Arc<dyn Builder>,
    options: DriverOptions,
    observer: Arc<dyn DriverObserver>,
}

impl Driver {
    /// Creates a driver over `store` that builds with `builder`.
    pub fn new(
        engine: FingerprintEngine,
        store: CacheStore,
        builder: Arc<dyn Builder>,
        options: DriverOptions,
    ) -> Self {
        Self {
            engine,
            store,
            builder,
            options,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the transition observer.
    pub fn with_observer(mut self, observer: Arc<dyn DriverObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The cache this driver reads and writes.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The driver's options.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Runs one load request for `target` to `Ready`.
    ///
    /// `request` describes how to invoke the builder if a build is needed.
    /// A failed build leaves the cache record untouched.
    pub fn ensure_built(
        &self,
        target: &Target,
        request: &BuildRequest,
    ) -> Result<BuildOutcome, HookError> {
        let id = &target.identity;
        let name = target.module_name();

        let settings = &self.options.settings;
        let stamps = self.engine.scan(target)?;
        let fingerprint = self.engine.combine(target, &stamps, settings);
        self.transition(id, DriverState::FingerprintComputed);

        if self.options.force_rebuild {
            tracing::debug!("{name:?} will be rebuilt because: forcing rebuild");
        } else {
            tracing::debug!("checking whether {name:?} is up to date");
            match self.fresh_record(target, &fingerprint)? {
                Ok(record) => return Ok(self.ready(id, record, false)),
                Err(reason) => tracing::debug!("{name:?} will be rebuilt because: {reason}"),
            }
        }
        self.transition(id, DriverState::CacheChecked);

        let lock_path = self.store.lock_path(id);
        let guard = match BuildLock::acquire(&lock_path, self.options.lock_timeout) {
            Ok(guard) => guard,
            Err(CacheError::LockTimeout { path, waited })
                if self.options.on_lock_timeout == LockTimeoutPolicy::Recheck =>
            {
                tracing::warn!(
                    "timed out after {waited:?} waiting for {}, rechecking the cache",
                    path.display()
                );
                if let Ok(record) = self.fresh_record(target, &fingerprint)? {
                    return Ok(self.ready(id, record, false));
                }
                return Err(HookError::LockTimeout { path, waited });
            }
            Err(e) => return Err(e.into()),
        };
        self.transition(id, DriverState::LockAcquired);

        if !self.options.force_rebuild {
            if let Ok(record) = self.fresh_record(target, &fingerprint)? {
                tracing::debug!("{name:?} was built by another process while waiting");
                drop(guard);
                return Ok(self.ready(id, record, false));
            }
        }
        self.transition(id, DriverState::CacheRechecked);

        self.transition(id, DriverState::Building);
        tracing::info!("building {name:?}");
        let product = self
            .builder
            .build(request)
            .map_err(|e| HookError::build(name, e))?;

        let built = self.engine.after_build(target, settings, &stamps)?;
        let record = CacheRecord::new(
            target,
            built,
            product.artifact,
            settings.clone(),
            request.args(),
            product.output,
        );
        self.store.put(&record)?;
        drop(guard);

        if output_has_warnings(&record.build_output) {
            self.log_build_warnings(name, &record.build_output, true);
        }
        Ok(self.ready(id, record, true))
    }

    /// Returns the cached record if it matches `fingerprint`, otherwise the
    /// reason a rebuild is needed.
    fn fresh_record(
        &self,
        target: &Target,
        fingerprint: &Fingerprint,
    ) -> Result<Result<CacheRecord, &'static str>, HookError> {
        let Some(record) = self.store.get(&target.identity)? else {
            return Ok(Err("no cache record found"));
        };
        if record.fingerprint != *fingerprint {
            return Ok(Err("sources or settings changed since the last build"));
        }
        if !record.artifact.is_file() {
            return Ok(Err("previously built artifact is missing"));
        }
        Ok(Ok(record))
    }

    fn ready(&self, id: &TargetIdentity, record: CacheRecord, rebuilt: bool) -> BuildOutcome {
        if !rebuilt {
            tracing::debug!("{} is up to date ({})", id.module_name, record.artifact.display());
            if output_has_warnings(&record.build_output) {
                self.log_build_warnings(&id.module_name, &record.build_output, false);
            }
        }
        self.transition(id, DriverState::Ready);
        BuildOutcome {
            artifact: record.artifact,
            fingerprint: record.fingerprint,
            rebuilt,
        }
    }

    fn log_build_warnings(&self, name: &str, output: &str, is_fresh: bool) {
        let prefix = if is_fresh { "" } else { "the last " };
        if self.options.show_warnings {
            tracing::warn!("{prefix}build of {name:?} succeeded with warnings:\n{output}");
        } else {
            tracing::debug!("{prefix}build of {name:?} succeeded with warnings:\n{output}");
        }
    }

    fn transition(&self, id: &TargetIdentity, state: DriverState) {
        tracing::trace!(target_id = %id, %state, "driver transition");
        self.observer.on_transition(id, state);
    }
}
