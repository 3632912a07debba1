//! Content-addressed caching of assembled operators.
//!
//! Every cache entry is addressed by a format version plus the MD5 of the
//! parameters that generated it, and lives under a configurable root:
//! `<root>/<kind>/<version>/<hash>.<ext>`. Writers publish entries with a
//! create-then-rename so a concurrent reader never observes a partial
//! file; published entries are immutable.

use crate::errors::{RegridError, RegridResult};
use crate::weights::WeightMatrix;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// The kinds of cached artifacts, each with its own namespace and format
/// version.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheKind {
    WeightMatrix,
    LegendreScalar,
    LegendreVector,
    Mask,
}

impl CacheKind {
    pub fn directory(&self) -> &'static str {
        match self {
            Self::WeightMatrix => "weights",
            Self::LegendreScalar => "legendre",
            Self::LegendreVector => "legendre-vector",
            Self::Mask => "masks",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::WeightMatrix => "mat",
            Self::LegendreScalar => "leg",
            Self::LegendreVector => "vleg",
            Self::Mask => "lsm",
        }
    }

    /// Bumped whenever the on-disk layout of the kind changes.
    pub fn version(&self) -> u32 {
        1
    }
}

/// An MD5 content address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates the identifying inputs of a cache entry into its key.
pub struct CacheKeyBuilder {
    context: md5::Context,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self {
            context: md5::Context::new(),
        }
    }

    pub fn add(&mut self, part: &str) -> &mut Self {
        self.context.consume(part.as_bytes());
        self.context.consume(b"\0");
        self
    }

    pub fn finish(self) -> CacheKey {
        CacheKey(format!("{:x}", self.context.compute()))
    }
}

/// How weight matrices are loaded back from the cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoaderKind {
    /// Read the raw dump from disk on every lookup.
    FileIo,
    /// Keep published matrices in a process-wide read-only registry,
    /// falling back to disk for entries published by other processes.
    Shared,
    /// No persistence; assemble every time.
    None,
}

impl LoaderKind {
    /// Select a loader by name. This is the whole registry of loaders.
    pub fn build(name: &str) -> RegridResult<Self> {
        match name {
            "file-io" => Ok(Self::FileIo),
            "shared" => Ok(Self::Shared),
            "none" => Ok(Self::None),
            other => Err(RegridError::NotImplemented {
                what: format!("interpolator loader '{}'", other),
            }),
        }
    }
}

/// Cache location and behaviour.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    root: PathBuf,
    strict: bool,
    loader: LoaderKind,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            strict: false,
            loader: LoaderKind::FileIo,
        }
    }

    /// A configuration that never touches the filesystem.
    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            strict: false,
            loader: LoaderKind::None,
        }
    }

    /// In strict mode a cache miss is fatal instead of triggering
    /// regeneration, for reproducibility-critical deployments.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_loader(mut self, loader: LoaderKind) -> Self {
        self.loader = loader;
        self
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn loader(&self) -> LoaderKind {
        self.loader
    }

    pub fn entry_path(&self, kind: CacheKind, key: &CacheKey) -> PathBuf {
        self.root
            .join(kind.directory())
            .join(kind.version().to_string())
            .join(format!("{}.{}", key.hex(), kind.extension()))
    }
}

/// Where a cached artifact came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    SharedHit,
    DiskHit,
    Assembled,
}

/// Write `payload` to `path`, atomically: the contents go to a temporary
/// file in the same directory which is then renamed into place.
pub fn atomic_write(path: &Path, payload: &[u8]) -> RegridResult<()> {
    let parent = path.parent().ok_or_else(|| RegridError::Error(format!(
        "cache path '{}' has no parent directory",
        path.display()
    )))?;
    fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(payload)?;
    temp.persist(path)
        .map_err(|err| RegridError::Io(err.error))?;
    Ok(())
}

fn shared_registry() -> &'static Mutex<HashMap<String, Arc<WeightMatrix>>> {
    static SHARED: OnceLock<Mutex<HashMap<String, Arc<WeightMatrix>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look a weight matrix up in the cache, assembling and publishing it on a
/// miss (unless strict mode forbids regeneration).
pub fn find_or_assemble(
    config: &CacheConfig,
    key: &CacheKey,
    assemble: impl FnOnce() -> RegridResult<WeightMatrix>,
) -> RegridResult<(Arc<WeightMatrix>, CacheOutcome)> {
    if config.loader() == LoaderKind::Shared {
        let registry = shared_registry().lock().expect("cache registry poisoned");
        if let Some(matrix) = registry.get(key.hex()) {
            debug!("weight matrix {} found in shared registry", key);
            return Ok((matrix.clone(), CacheOutcome::SharedHit));
        }
    }

    if config.loader() != LoaderKind::None {
        let path = config.entry_path(CacheKind::WeightMatrix, key);
        if path.exists() {
            debug!("loading weight matrix {} from {}", key, path.display());
            let mut file = fs::File::open(&path)?;
            let matrix = Arc::new(WeightMatrix::read_from(&mut file).map_err(|err| {
                RegridError::CacheCorrupt {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                }
            })?);
            publish_shared(config, key, &matrix);
            return Ok((matrix, CacheOutcome::DiskHit));
        }
    }

    if config.strict() {
        return Err(RegridError::CacheMiss {
            key: key.hex().to_string(),
        });
    }

    debug!("weight matrix {} not cached, assembling", key);
    let matrix = Arc::new(assemble()?);
    if config.loader() != LoaderKind::None {
        let path = config.entry_path(CacheKind::WeightMatrix, key);
        let mut payload = Vec::new();
        matrix.write_to(&mut payload)?;
        atomic_write(&path, &payload)?;
        debug!("weight matrix {} published to {}", key, path.display());
    }
    publish_shared(config, key, &matrix);
    Ok((matrix, CacheOutcome::Assembled))
}

fn publish_shared(config: &CacheConfig, key: &CacheKey, matrix: &Arc<WeightMatrix>) {
    if config.loader() == LoaderKind::Shared {
        shared_registry()
            .lock()
            .expect("cache registry poisoned")
            .insert(key.hex().to_string(), matrix.clone());
    }
}
