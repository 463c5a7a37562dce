//! Configuration documents: load, staleness detection, re-serialization, and
//! installation into the registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::SystemTime;

use figment::providers::{Format, Yaml};
use figment::Figment;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::registry::Registry;
use crate::tree::ConfigTree;

/// Text format of a backing file, chosen by extension at load/write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Yaml,
    Json,
}

impl SourceFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// A loaded configuration document.
///
/// The document owns exactly one root node, always a mapping at the top level
/// (one entry per section). Every [`ConfigTree`] handed out by the document
/// shares that root, so tree mutation mutates the document in place. The
/// originating path is optional; documents built in memory have none and
/// never report [`changed`](Self::changed).
#[derive(Debug)]
pub struct ConfigDocument {
    root: Arc<RwLock<Value>>,
    dirty: Arc<AtomicBool>,
    path: Option<PathBuf>,
    mtime: Option<SystemTime>,
    format: SourceFormat,
}

impl ConfigDocument {
    /// An in-memory document with an empty top-level mapping.
    pub fn empty() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Mapping(Mapping::new()))),
            dirty: Arc::new(AtomicBool::new(false)),
            path: None,
            mtime: None,
            format: SourceFormat::Yaml,
        }
    }

    /// An in-memory document parsed from YAML text. No path is recorded.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let value: Value = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<string>".to_string(),
            source,
        })?;
        Self::from_parts(value, None, None, SourceFormat::Yaml, "<string>")
    }

    /// Load a document from a file.
    ///
    /// `.json` files are parsed as JSON, everything else as YAML. The path
    /// and the file's modification timestamp are recorded in the same step.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let (value, mtime, format) = Self::read_source(path)?;
        info!(path = %path.display(), "loaded configuration document");
        Self::from_parts(
            value,
            Some(path.to_path_buf()),
            mtime,
            format,
            &path.display().to_string(),
        )
    }

    /// Load a document by merging YAML layers, later layers winning key by
    /// key. Missing layer files are skipped, so optional local overrides can
    /// sit at the end of the list. The result is an in-memory document: no
    /// single backing path, so [`changed`](Self::changed) stays `false`.
    pub fn load_layered<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Self> {
        let mut figment = Figment::new();
        for path in paths {
            figment = figment.merge(Yaml::file(path.as_ref()));
        }
        let value: Value = figment
            .extract()
            .map_err(|source| ConfigError::Layered(Box::new(source)))?;
        debug!(layers = paths.len(), "merged layered configuration");
        Self::from_parts(value, None, None, SourceFormat::Yaml, "<layered>")
    }

    fn from_parts(
        value: Value,
        path: Option<PathBuf>,
        mtime: Option<SystemTime>,
        format: SourceFormat,
        origin: &str,
    ) -> ConfigResult<Self> {
        if !value.is_mapping() {
            return Err(ConfigError::TopLevelNotMapping {
                path: origin.to_string(),
            });
        }
        Ok(Self {
            root: Arc::new(RwLock::new(value)),
            dirty: Arc::new(AtomicBool::new(false)),
            path,
            mtime,
            format,
        })
    }

    fn read_source(path: &Path) -> ConfigResult<(Value, Option<SystemTime>, SourceFormat)> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let format = SourceFormat::for_path(path);
        let value = match format {
            SourceFormat::Yaml => {
                serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            SourceFormat::Json => {
                serde_json::from_str(&text).map_err(|source| ConfigError::ParseJson {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        let mtime = fs::metadata(path).and_then(|meta| meta.modified()).ok();
        Ok((value, mtime, format))
    }

    fn write_root(&self) -> RwLockWriteGuard<'_, Value> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the backing file's modification timestamp has advanced since
    /// the last load or write. Always `false` for pathless documents; a
    /// vanished or unreadable backing file counts as changed.
    pub fn changed(&self) -> bool {
        let Some(path) = &self.path else { return false };
        let Some(recorded) = self.mtime else {
            return false;
        };
        match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(current) => current != recorded,
            Err(_) => true,
        }
    }

    /// Re-read the backing file, replace the root wholesale, and dispatch to
    /// the process-wide registry. Reload always re-installs, even if the
    /// file did not actually change. Existing [`ConfigTree`] wrappers observe
    /// the new tree.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let path = self.path.clone().ok_or(ConfigError::NoSource)?;
        let (value, mtime, _) = Self::read_source(&path)?;
        if !value.is_mapping() {
            return Err(ConfigError::TopLevelNotMapping {
                path: path.display().to_string(),
            });
        }
        *self.write_root() = value;
        self.mtime = mtime;
        self.dirty.store(false, Ordering::Relaxed);
        info!(path = %path.display(), "reloaded configuration document");
        self.install()
    }

    /// Serialize the root node back to text.
    ///
    /// Deterministic: mapping key order follows the order established when
    /// the document was constructed or loaded, not alphabetical order.
    pub fn dump(&self) -> ConfigResult<String> {
        self.render(self.format)
    }

    fn render(&self, format: SourceFormat) -> ConfigResult<String> {
        let snapshot = self.root().value();
        match format {
            SourceFormat::Yaml => serde_yaml::to_string(&snapshot).map_err(ConfigError::Serialize),
            SourceFormat::Json => {
                serde_json::to_string_pretty(&snapshot).map_err(ConfigError::SerializeJson)
            }
        }
    }

    /// Serialize and write to `path`, or to the document's own path when
    /// omitted. An explicit path becomes the document's path (and selects
    /// the output format by extension); the recorded modification timestamp
    /// is updated to match the just-written file.
    pub fn write(&mut self, path: Option<&Path>) -> ConfigResult<()> {
        let (target, format) = match path {
            Some(explicit) => (explicit.to_path_buf(), SourceFormat::for_path(explicit)),
            None => (self.path.clone().ok_or(ConfigError::NoSource)?, self.format),
        };
        let text = self.render(format)?;
        fs::write(&target, text).map_err(|source| ConfigError::Write {
            path: target.clone(),
            source,
        })?;
        // Path, timestamp, and format are recorded together, and only once
        // the file actually exists on disk.
        let mtime = fs::metadata(&target).and_then(|meta| meta.modified()).ok();
        self.path = Some(target.clone());
        self.mtime = mtime;
        self.format = format;
        self.dirty.store(false, Ordering::Relaxed);
        info!(path = %target.display(), "wrote configuration document");
        Ok(())
    }

    /// Explicit dispatch trigger against the process-wide registry.
    pub fn install(&self) -> ConfigResult<()> {
        Registry::global().dispatch(self)
    }

    /// Dispatch against an injected registry instead of the global one.
    pub fn install_into(&self, registry: &Registry) -> ConfigResult<()> {
        registry.dispatch(self)
    }

    /// The root of the value tree, wrapped for shared access.
    pub fn root(&self) -> ConfigTree {
        ConfigTree::new(Arc::clone(&self.root), Arc::clone(&self.dirty))
    }

    /// Keyed section lookup on the root mapping.
    pub fn get(&self, key: &str) -> Option<ConfigTree> {
        self.root().get(key)
    }

    /// Dotted-path lookup from the root.
    pub fn at(&self, path: &str) -> Option<ConfigTree> {
        self.root().at(path)
    }

    /// The originating path, if the document is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the in-memory tree has been mutated since the last
    /// load/reload/write.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }
}
