//! Persistent registry of named workspaces under a base directory.
//!
//! Layout under `<base_path>`:
//!
//! - `workspaces.json`: title -> `{description, path, ...extra}`, rewritten
//!   wholesale (temp file + rename) on every mutation.
//! - `workspaces.lock`: advisory lock held for each read-modify-write so
//!   concurrent processes never lose each other's updates.
//! - `current_workspace`: the selected title, only for persistent sessions.
//! - `<title>/`: one directory per workspace.
//!
//! Nothing here changes the process working directory. Callers receive a
//! [`WorkspaceScope`] and thread its path through every file operation.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::core::naming::is_safe_component;
use crate::io::config::CONFIG_FILE_NAME;
use crate::io::fs_util::replace_file;

pub const REGISTRY_FILE_NAME: &str = "workspaces.json";
const LOCK_FILE_NAME: &str = "workspaces.lock";
pub const CURRENT_FILE_NAME: &str = "current_workspace";

/// Names in the base directory that belong to the store itself.
const RESERVED_NAMES: [&str; 4] = [
    REGISTRY_FILE_NAME,
    LOCK_FILE_NAME,
    CURRENT_FILE_NAME,
    CONFIG_FILE_NAME,
];

const REGISTRY_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/workspaces.schema.json"
));

/// Folders created by [`WorkspaceStore::initialize_structure`].
pub const STANDARD_FOLDERS: [&str; 6] = [
    "Chat/History",
    "Studio/Content",
    "Automations/Connections",
    "Automations/Workflows",
    "Builder/Form",
    "Memory",
];

static REGISTRY_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(REGISTRY_SCHEMA).expect("registry schema should be valid JSON");
    jsonschema::validator_for(&schema).expect("registry schema should compile")
});

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace `{0}` already exists")]
    Duplicate(String),
    #[error("workspace `{0}` does not exist")]
    Unknown(String),
    #[error("invalid workspace title `{title}`: {reason}")]
    InvalidTitle { title: String, reason: &'static str },
    #[error("invalid folder `{folder}`: {reason}")]
    InvalidFolder { folder: String, reason: &'static str },
    #[error("`{0}` is a reserved workspace key")]
    ReservedKey(String),
    #[error("no workspace selected")]
    NoneSelected,
    #[error("{action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("workspace registry {} is invalid: {message}", path.display())]
    Registry { path: PathBuf, message: String },
    #[error("lock workspace registry {}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WorkspaceError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self + use<> {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

/// One registry record. Keys other than `description` and `path` survive
/// round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub description: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSummary {
    pub title: String,
    pub description: String,
}

/// Explicit handle for file operations inside one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceScope {
    pub title: String,
    pub path: PathBuf,
}

type Registry = BTreeMap<String, WorkspaceEntry>;

/// Registry of workspaces rooted at one base directory.
#[derive(Debug)]
pub struct WorkspaceStore {
    base_path: PathBuf,
    registry: Registry,
}

impl WorkspaceStore {
    /// Open (and create if needed) the store at `base_path`.
    ///
    /// Fails when the base directory cannot be created or the registry file
    /// is not valid; a damaged registry is never silently replaced.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .map_err(WorkspaceError::io("create base directory", &base_path))?;
        let base_path = base_path
            .canonicalize()
            .map_err(WorkspaceError::io("resolve base directory", &base_path))?;
        let registry = read_registry(&base_path.join(REGISTRY_FILE_NAME))?;
        for (title, entry) in &registry {
            if !entry.path.is_dir() {
                warn!(workspace = %title, path = %entry.path.display(), "workspace directory is missing");
            }
        }
        debug!(base = %base_path.display(), workspaces = registry.len(), "opened workspace store");
        Ok(Self {
            base_path,
            registry,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn registry_path(&self) -> PathBuf {
        self.base_path.join(REGISTRY_FILE_NAME)
    }

    /// Re-read the registry from disk, picking up other processes' changes.
    pub fn reload(&mut self) -> Result<(), WorkspaceError> {
        self.registry = read_registry(&self.registry_path())?;
        Ok(())
    }

    /// Register a new workspace and allocate its directory.
    pub fn create(&mut self, title: &str, description: &str) -> Result<WorkspaceScope, WorkspaceError> {
        validate_title(title)?;
        let _lock = RegistryLock::acquire(&self.base_path)?;
        let mut registry = read_registry(&self.registry_path())?;
        if registry.contains_key(title) {
            self.registry = registry;
            return Err(WorkspaceError::Duplicate(title.to_string()));
        }

        let path = self.base_path.join(title);
        let existed = path.exists();
        fs::create_dir_all(&path).map_err(WorkspaceError::io("create workspace directory", &path))?;
        registry.insert(
            title.to_string(),
            WorkspaceEntry {
                description: description.to_string(),
                path: path.clone(),
                extra: Map::new(),
            },
        );
        if let Err(err) = write_registry(&self.registry_path(), &registry) {
            if !existed && let Err(cleanup) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), err = %cleanup, "failed to roll back workspace directory");
            }
            return Err(err);
        }
        self.registry = registry;
        info!(workspace = %title, path = %path.display(), "created workspace");
        Ok(WorkspaceScope {
            title: title.to_string(),
            path,
        })
    }

    /// Remove the workspace directory tree, then its registry entry.
    ///
    /// If the tree cannot be removed the entry is kept. A directory that is
    /// already gone is tolerated.
    pub fn delete(&mut self, title: &str) -> Result<(), WorkspaceError> {
        let _lock = RegistryLock::acquire(&self.base_path)?;
        let mut registry = read_registry(&self.registry_path())?;
        let Some(entry) = registry.get(title) else {
            self.registry = registry;
            return Err(WorkspaceError::Unknown(title.to_string()));
        };

        if !entry.path.starts_with(&self.base_path) || entry.path == self.base_path {
            warn!(
                workspace = %title,
                path = %entry.path.display(),
                "workspace directory is outside the base directory; leaving it on disk"
            );
        } else {
            match fs::remove_dir_all(&entry.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!(workspace = %title, "workspace directory was already removed");
                }
                Err(err) => {
                    return Err(WorkspaceError::Io {
                        action: "remove workspace directory",
                        path: entry.path.clone(),
                        source: err,
                    });
                }
            }
        }

        registry.remove(title);
        write_registry(&self.registry_path(), &registry)?;
        self.registry = registry;
        info!(workspace = %title, "deleted workspace");
        Ok(())
    }

    /// All workspaces ordered by title.
    pub fn list(&self) -> Vec<WorkspaceSummary> {
        self.registry
            .iter()
            .map(|(title, entry)| WorkspaceSummary {
                title: title.clone(),
                description: entry.description.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.registry.contains_key(title)
    }

    pub fn get(&self, title: &str) -> Option<&WorkspaceEntry> {
        self.registry.get(title)
    }

    pub fn get_path(&self, title: &str) -> Option<&Path> {
        self.registry.get(title).map(|entry| entry.path.as_path())
    }

    pub fn scope(&self, title: &str) -> Result<WorkspaceScope, WorkspaceError> {
        let path = self
            .get_path(title)
            .ok_or_else(|| WorkspaceError::Unknown(title.to_string()))?;
        Ok(WorkspaceScope {
            title: title.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Set an extra state key on a workspace record.
    pub fn update_state(&mut self, title: &str, key: &str, value: Value) -> Result<(), WorkspaceError> {
        if key == "description" || key == "path" {
            return Err(WorkspaceError::ReservedKey(key.to_string()));
        }
        let _lock = RegistryLock::acquire(&self.base_path)?;
        let mut registry = read_registry(&self.registry_path())?;
        let Some(entry) = registry.get_mut(title) else {
            self.registry = registry;
            return Err(WorkspaceError::Unknown(title.to_string()));
        };
        entry.extra.insert(key.to_string(), value);
        write_registry(&self.registry_path(), &registry)?;
        self.registry = registry;
        debug!(workspace = %title, key, "updated workspace state");
        Ok(())
    }

    /// Create `folder` (a relative, possibly nested path) inside a workspace.
    pub fn create_folder(&self, title: &str, folder: &str) -> Result<PathBuf, WorkspaceError> {
        let root = self
            .get_path(title)
            .ok_or_else(|| WorkspaceError::Unknown(title.to_string()))?;
        let relative = validate_folder(folder)?;
        let path = root.join(relative);
        fs::create_dir_all(&path).map_err(WorkspaceError::io("create folder", &path))?;
        info!(workspace = %title, folder, "created folder");
        Ok(path)
    }

    /// Create the standard folder layout inside a workspace.
    pub fn initialize_structure(&self, title: &str) -> Result<(), WorkspaceError> {
        for folder in STANDARD_FOLDERS {
            self.create_folder(title, folder)?;
        }
        Ok(())
    }
}

/// A store plus the explicit "current workspace" pointer.
#[derive(Debug)]
pub struct Session {
    store: WorkspaceStore,
    current: Option<String>,
    persist_current: bool,
}

impl Session {
    /// Session whose pointer lives only in memory.
    pub fn new(store: WorkspaceStore) -> Self {
        Self {
            store,
            current: None,
            persist_current: false,
        }
    }

    /// Session whose pointer is stored in `<base>/current_workspace` so that
    /// separate invocations share it. A pointer to an unknown workspace is
    /// dropped.
    pub fn persistent(store: WorkspaceStore) -> Result<Self, WorkspaceError> {
        let pointer_path = store.base_path().join(CURRENT_FILE_NAME);
        let current = match fs::read_to_string(&pointer_path) {
            Ok(contents) => Some(contents.trim().to_string()).filter(|title| !title.is_empty()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(WorkspaceError::Io {
                    action: "read current workspace",
                    path: pointer_path,
                    source: err,
                });
            }
        };
        let mut session = Self {
            store,
            current: None,
            persist_current: true,
        };
        match current {
            Some(title) if session.store.contains(&title) => session.current = Some(title),
            Some(title) => {
                warn!(workspace = %title, "current workspace no longer exists; clearing");
                session.set_current(None)?;
            }
            None => {}
        }
        Ok(session)
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut WorkspaceStore {
        &mut self.store
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_scope(&self) -> Option<WorkspaceScope> {
        self.current
            .as_deref()
            .and_then(|title| self.store.scope(title).ok())
    }

    /// Scope for `title`, or for the current workspace when `title` is `None`.
    pub fn resolve(&self, title: Option<&str>) -> Result<WorkspaceScope, WorkspaceError> {
        match title.or(self.current.as_deref()) {
            Some(title) => self.store.scope(title),
            None => Err(WorkspaceError::NoneSelected),
        }
    }

    /// Path of `title`, or of the current workspace when `title` is `None`.
    pub fn get_path(&self, title: Option<&str>) -> Option<PathBuf> {
        self.resolve(title).ok().map(|scope| scope.path)
    }

    /// Create a workspace and make it current.
    ///
    /// If the pointer cannot be written the new workspace is removed again.
    pub fn create(&mut self, title: &str, description: &str) -> Result<WorkspaceScope, WorkspaceError> {
        let scope = self.store.create(title, description)?;
        if let Err(err) = self.set_current(Some(title)) {
            if let Err(cleanup) = self.store.delete(title) {
                warn!(workspace = %title, err = %cleanup, "failed to roll back workspace");
            }
            return Err(err);
        }
        Ok(scope)
    }

    /// Make an existing workspace current.
    pub fn select(&mut self, title: &str) -> Result<WorkspaceScope, WorkspaceError> {
        if !self.store.contains(title) {
            self.store.reload()?;
        }
        let scope = self.store.scope(title)?;
        self.set_current(Some(title))?;
        info!(workspace = %title, "selected workspace");
        Ok(scope)
    }

    /// Delete a workspace; clears the pointer only if it pointed there.
    pub fn delete(&mut self, title: &str) -> Result<(), WorkspaceError> {
        self.store.delete(title)?;
        if self.current.as_deref() == Some(title) {
            self.set_current(None)?;
        }
        Ok(())
    }

    fn set_current(&mut self, title: Option<&str>) -> Result<(), WorkspaceError> {
        if self.persist_current {
            let pointer_path = self.store.base_path().join(CURRENT_FILE_NAME);
            match title {
                Some(title) => replace_file(&pointer_path, format!("{title}\n").as_bytes())
                    .map_err(WorkspaceError::io("write current workspace", &pointer_path))?,
                None => match fs::remove_file(&pointer_path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        return Err(WorkspaceError::Io {
                            action: "clear current workspace",
                            path: pointer_path,
                            source: err,
                        });
                    }
                },
            }
        }
        self.current = title.map(str::to_string);
        Ok(())
    }
}

/// Exclusive advisory lock on `<base>/workspaces.lock`, released on drop.
struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    fn acquire(base_path: &Path) -> Result<Self, WorkspaceError> {
        let path = base_path.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| WorkspaceError::Lock {
                path: path.clone(),
                source,
            })?;
        FileExt::lock_exclusive(&file).map_err(|source| WorkspaceError::Lock { path, source })?;
        Ok(Self { _file: file })
    }
}

pub fn validate_title(title: &str) -> Result<(), WorkspaceError> {
    let reason = if title.trim().is_empty() {
        Some("title must not be empty")
    } else if title.trim() != title {
        Some("title must not start or end with whitespace")
    } else if title.starts_with('.') {
        Some("title must not start with `.`")
    } else if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(title))
    {
        Some("title is reserved for store metadata")
    } else if !is_safe_component(title) {
        Some("title must be a single path component without control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(WorkspaceError::InvalidTitle {
            title: title.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_folder(folder: &str) -> Result<&Path, WorkspaceError> {
    let invalid = |reason| WorkspaceError::InvalidFolder {
        folder: folder.to_string(),
        reason,
    };
    let path = Path::new(folder);
    if folder.trim().is_empty() {
        return Err(invalid("folder must not be empty"));
    }
    if !path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(invalid("folder must be a relative path inside the workspace"));
    }
    Ok(path)
}

fn read_registry(path: &Path) -> Result<Registry, WorkspaceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Registry::new()),
        Err(err) => {
            return Err(WorkspaceError::Io {
                action: "read workspace registry",
                path: path.to_path_buf(),
                source: err,
            });
        }
    };
    let registry_error = |message: String| WorkspaceError::Registry {
        path: path.to_path_buf(),
        message,
    };
    let value: Value = serde_json::from_str(&contents).map_err(|err| registry_error(err.to_string()))?;
    if !REGISTRY_VALIDATOR.is_valid(&value) {
        let messages = REGISTRY_VALIDATOR
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(registry_error(messages.join("; ")));
    }
    serde_json::from_value(value).map_err(|err| registry_error(err.to_string()))
}

fn write_registry(path: &Path, registry: &Registry) -> Result<(), WorkspaceError> {
    let mut buf = serde_json::to_string_pretty(registry).map_err(|err| WorkspaceError::Registry {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    buf.push('\n');
    replace_file(path, buf.as_bytes()).map_err(WorkspaceError::io("write workspace registry", path))
}
