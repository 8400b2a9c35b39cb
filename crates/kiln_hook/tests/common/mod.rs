//! Test doubles shared by the integration suites.

#![allow(dead_code)]

use kiln_build::{BuildError, BuildProduct, BuildRequest, Builder};
use kiln_cache::TargetIdentity;
use kiln_hook::{DriverObserver, DriverState, LoadError, Loader};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAILURE_OUTPUT: &str = "error[E0425]: cannot find value `x` in this scope\n";

/// Writes `<output_dir>/<module>.so` instead of compiling anything.
#[derive(Default)]
pub struct FakeBuilder {
    builds: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    writes_lockfile: AtomicBool,
    touch_during_build: Mutex<Option<(PathBuf, i64)>>,
    requests: Mutex<Vec<BuildRequest>>,
}

impl FakeBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let builder = Self::default();
        *builder.delay.lock().unwrap() = delay;
        Arc::new(builder)
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Creates `Cargo.lock` next to the manifest on every build, as cargo does.
    pub fn set_writes_lockfile(&self, on: bool) {
        self.writes_lockfile.store(on, Ordering::SeqCst);
    }

    /// Sets the mtime of `path` while the next builds run.
    pub fn touch_during_build(&self, path: &Path, secs: i64) {
        *self.touch_during_build.lock().unwrap() = Some((path.to_path_buf(), secs));
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Builder for FakeBuilder {
    fn build(&self, request: &BuildRequest) -> Result<BuildProduct, BuildError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        std::thread::sleep(delay);
        if let Some((path, secs)) = self.touch_during_build.lock().unwrap().take() {
            set_mtime(&path, secs);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BuildError::Failed {
                command: "fake build".to_string(),
                status: Some(101),
                output: FAILURE_OUTPUT.to_string(),
            });
        }
        let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        if self.writes_lockfile.load(Ordering::SeqCst) {
            if let Some(dir) = request.manifest_path.parent() {
                let lockfile = dir.join("Cargo.lock");
                if !lockfile.exists() {
                    fs::write(&lockfile, "version = 4\n").unwrap();
                }
            }
        }
        fs::create_dir_all(&request.output_dir).unwrap();
        let artifact = request.output_dir.join(format!("{}.so", request.module_name));
        fs::write(&artifact, format!("build {n}")).unwrap();
        Ok(BuildProduct {
            artifact,
            output: String::new(),
        })
    }
}

/// Module state owned by one load of a library.
#[derive(Debug)]
pub struct ModuleState {
    pub load_path: PathBuf,
    pub contents: String,
    pub counter: AtomicUsize,
}

/// A loaded mock module. Clones share state.
#[derive(Debug, Clone)]
pub struct MockModule(pub Arc<ModuleState>);

impl MockModule {
    pub fn bump(&self) -> usize {
        self.0.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.counter.load(Ordering::SeqCst)
    }
}

/// Mimics a platform loader: loading a path twice returns the first module.
#[derive(Default)]
pub struct MockLoader {
    loaded: Mutex<HashMap<PathBuf, MockModule>>,
    fail: AtomicBool,
}

impl MockLoader {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn distinct_loads(&self) -> usize {
        self.loaded.lock().unwrap().len()
    }
}

impl Loader for MockLoader {
    type Handle = MockModule;

    fn load(&self, _name: &str, path: &Path) -> Result<MockModule, LoadError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("undefined symbol: PyInit_fast".into());
        }
        let mut loaded = self.loaded.lock().unwrap();
        if let Some(existing) = loaded.get(path) {
            return Ok(existing.clone());
        }
        let module = MockModule(Arc::new(ModuleState {
            load_path: path.to_path_buf(),
            contents: fs::read_to_string(path)?,
            counter: AtomicUsize::new(0),
        }));
        loaded.insert(path.to_path_buf(), module.clone());
        Ok(module)
    }
}

/// Records every transition and optionally sleeps on entering one state.
#[derive(Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<DriverState>>,
    pause: Option<(DriverState, Duration)>,
}

impl RecordingObserver {
    pub fn pausing_at(state: DriverState, delay: Duration) -> Self {
        Self {
            transitions: Mutex::new(Vec::new()),
            pause: Some((state, delay)),
        }
    }

    pub fn take(&self) -> Vec<DriverState> {
        std::mem::take(&mut *self.transitions.lock().unwrap())
    }
}

impl DriverObserver for RecordingObserver {
    fn on_transition(&self, _target: &TargetIdentity, state: DriverState) {
        self.transitions.lock().unwrap().push(state);
        if let Some((at, delay)) = self.pause {
            if at == state {
                std::thread::sleep(delay);
            }
        }
    }
}

/// Creates a minimal project named `name` in `dir`.
pub fn write_project(dir: &Path, name: &str) {
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(
        dir.join("pyproject.toml"),
        "[build-system]\nrequires = [\"maturin>=1.5,<2.0\"]\nbuild-backend = \"maturin\"\n",
    )
    .unwrap();
    fs::write(
        dir.join("Cargo.toml"),
        format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
    )
    .unwrap();
    fs::write(dir.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
}

/// Sets the modification time of `path` to `secs` past the epoch.
pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(secs, 0)).unwrap();
}
