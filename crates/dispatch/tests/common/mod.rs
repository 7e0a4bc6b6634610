//! Shared test doubles for the dispatch integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use genpool_dispatch::prelude::*;
use genpool_dispatch::{BackendError, GenerationParams, PatternBackend};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use tempfile::TempDir;

/// Loader handing out the same backend for every device, except the listed
/// ranks which fail to initialize.
pub struct TestLoader {
    devices: usize,
    backend: Arc<dyn ComputeBackend>,
    failing: HashSet<u32>,
}

impl TestLoader {
    pub fn new(devices: usize, backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            devices,
            backend,
            failing: HashSet::new(),
        }
    }

    pub fn failing_on(mut self, rank: u32) -> Self {
        self.failing.insert(rank);
        self
    }
}

impl BackendLoader for TestLoader {
    fn device_count(&self) -> usize {
        self.devices
    }

    fn load(&self, device: DeviceId) -> Result<Arc<dyn ComputeBackend>, BackendError> {
        if self.failing.contains(&device.rank()) {
            return Err(BackendError::Load(format!("device {device} is broken")));
        }
        Ok(Arc::clone(&self.backend))
    }
}

/// Delegates to the pattern renderer, but fails for prompts containing
/// "fail" and panics for prompts containing "panic".
pub struct ScriptedBackend {
    inner: PatternBackend,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            inner: PatternBackend::new(DeviceId(0)),
        }
    }
}

impl ComputeBackend for ScriptedBackend {
    fn version(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        params: &GenerationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        if params.prompt.contains("panic") {
            panic!("scripted panic for {:?}", params.prompt);
        }
        if params.prompt.contains("fail") {
            return Err(BackendError::Generation("scripted failure".into()));
        }
        self.inner.generate(params, rng)
    }
}

/// Fails the first `failures` calls, then succeeds
pub struct FlakyBackend {
    inner: PatternBackend,
    remaining_failures: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: PatternBackend::new(DeviceId(0)),
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

impl ComputeBackend for FlakyBackend {
    fn version(&self) -> &str {
        "flaky"
    }

    fn generate(
        &self,
        params: &GenerationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::Generation("transient failure".into()));
        }
        self.inner.generate(params, rng)
    }
}

/// Blocks every generation until the returned sender fires or is dropped
pub struct GatedBackend {
    inner: PatternBackend,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedBackend {
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                inner: PatternBackend::new(DeviceId(0)),
                release: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl ComputeBackend for GatedBackend {
    fn version(&self) -> &str {
        "gated"
    }

    fn generate(
        &self,
        params: &GenerationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        // Either a message or a dropped sender lets the call through.
        let _ = self.release.lock().recv();
        self.inner.generate(params, rng)
    }
}

/// Returns a very large batch of small blobs, so publication takes a while
pub struct FloodBackend {
    images: usize,
    size: usize,
}

impl FloodBackend {
    pub fn new(images: usize, size: usize) -> Self {
        Self { images, size }
    }
}

impl ComputeBackend for FloodBackend {
    fn version(&self) -> &str {
        "flood"
    }

    fn generate(
        &self,
        _params: &GenerationParams,
        _rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        Ok(vec![vec![0x5a; self.size]; self.images])
    }
}

/// Loads fine but panics as soon as the worker asks for its version,
/// which happens on the worker's own task rather than the blocking pool.
pub struct UnversionedBackend;

impl ComputeBackend for UnversionedBackend {
    fn version(&self) -> &str {
        panic!("backend has no version")
    }

    fn generate(
        &self,
        _params: &GenerationParams,
        _rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        Ok(Vec::new())
    }
}

/// A fresh output directory with its store
pub fn output_store() -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ArtifactStore::new(dir.path());
    store.ensure_dir().expect("create output dir");
    (dir, store)
}

/// Pool config with short pauses and small images
pub fn fast_config() -> WorkerPoolConfig {
    WorkerPoolConfig::default().with_fault_cooldown(Duration::from_millis(10))
}

/// Small, valid request
pub fn small_request(prompt: &str, seed: i64) -> GenerateRequest {
    GenerateRequest::new(prompt)
        .with_size(256, 256)
        .with_seed(seed)
}

/// Poll `condition` until it holds, failing the test after 10s
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
