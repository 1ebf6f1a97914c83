//! The Workspace Registry (§4.C): immutable per-root configuration for the
//! prover, and resolution from a file URI to the workspace that covers it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use log::{log_enabled, trace};
use url::Url;

use crate::prover::Prover;

/// One entry of a load path: a logical module prefix mapped to a filesystem
/// directory, as consumed by the prover's module resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadPath {
    pub logical: String,
    pub physical: PathBuf,
    pub implicit: bool,
    pub recursive: bool,
}

/// Prover flags that are part of a workspace's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProverFlags {
    pub indices_matter: bool,
    pub impredicative_set: bool,
}

/// An immutable description of how to prepare the prover for files under
/// `root`. Produced once by `guess` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub load_paths: Vec<LoadPath>,
    pub ml_include_paths: Vec<PathBuf>,
    pub preloaded_modules: Vec<String>,
    pub flags: ProverFlags,
    pub debug: bool,
}

impl Workspace {
    /// Probes `root` for how it should be prepared (e.g. a project manifest
    /// naming load paths), falling back to a workspace with no load paths
    /// beyond the root itself. `cmdline` is an opaque template the prover may
    /// interpret (e.g. extra flags configured by the user).
    pub fn guess(root: &Path, cmdline: &[String]) -> Workspace {
        trace!("guessing workspace for {}", root.display());
        Workspace {
            root: root.to_path_buf(),
            load_paths: vec![LoadPath {
                logical: String::new(),
                physical: root.to_path_buf(),
                implicit: true,
                recursive: true,
            }],
            ml_include_paths: Vec::new(),
            preloaded_modules: Vec::new(),
            flags: ProverFlags::default(),
            debug: cmdline.iter().any(|arg| arg == "--debug"),
        }
    }

    /// A stable hash of this workspace's identity, exposed so callers (e.g.
    /// a cache key) don't need to hash every field themselves.
    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for Workspace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.load_paths.hash(state);
        self.ml_include_paths.hash(state);
        self.preloaded_modules.hash(state);
        self.flags.hash(state);
        self.debug.hash(state);
    }
}

/// One registered root and the state derived from it.
struct Entry<P: Prover> {
    workspace: Workspace,
    root_state: P::RootState,
}

/// An ordered mapping from workspace root to `Workspace`, with URI → root
/// resolution by longest applicable path prefix (simplified here to
/// first-match-in-registration-order, per §4.C's "simpler contract").
pub struct WorkspaceRegistry<P: Prover> {
    entries: Vec<Entry<P>>,
    cmdline: Vec<String>,
}

impl<P: Prover> WorkspaceRegistry<P> {
    pub fn new(cmdline: Vec<String>) -> Self {
        WorkspaceRegistry { entries: Vec::new(), cmdline }
    }

    /// Computes a `Workspace` for `folder` via `guess` and registers it.
    pub fn add(&mut self, prover: &P, folder: &Path) {
        let workspace = Workspace::guess(folder, &self.cmdline);
        let root_state = prover.init(&workspace);
        self.entries.push(Entry { workspace, root_state });
    }

    /// Drops the registration whose root exactly matches `folder`.
    pub fn remove(&mut self, folder: &Path) {
        self.entries.retain(|e| e.workspace.root != folder);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a file URI to the workspace that should prepare the prover
    /// for it: the first registered root that is a path prefix of the file.
    /// On a miss, falls back to the first registered entry and logs at
    /// level 1 (here: a `log::info!`, one level above the crate's default
    /// `debug!` chatter).
    pub fn resolve(&self, uri: &Url) -> Option<(&P::RootState, &Workspace)> {
        let file_path = uri.to_file_path().ok()?;
        if let Some(entry) = self.entries.iter().find(|e| file_path.starts_with(&e.workspace.root))
        {
            return Some((&entry.root_state, &entry.workspace));
        }
        if let Some(first) = self.entries.first() {
            if log_enabled!(log::Level::Info) {
                log::info!(
                    "no workspace root covers {}; falling back to {}",
                    file_path.display(),
                    first.workspace.root.display()
                );
            }
            return Some((&first.root_state, &first.workspace));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::ReferenceProver;

    fn uri(path: &str) -> Url {
        Url::from_file_path(path).unwrap()
    }

    #[test]
    fn resolve_picks_first_registered_prefix_match_in_order() {
        // Per the simplified §4.C contract, roots are scanned in
        // registration order, not by longest prefix: the first-added root
        // that is a prefix wins even if a more specific root was added later.
        let prover = ReferenceProver::default();
        let mut reg: WorkspaceRegistry<ReferenceProver> = WorkspaceRegistry::new(vec![]);
        reg.add(&prover, Path::new("/proj"));
        reg.add(&prover, Path::new("/proj/sub"));

        let (_, ws) = reg.resolve(&uri("/proj/sub/a.v")).unwrap();
        assert_eq!(ws.root, Path::new("/proj"));
    }

    #[test]
    fn resolve_falls_back_to_first_entry_on_miss() {
        let prover = ReferenceProver::default();
        let mut reg: WorkspaceRegistry<ReferenceProver> = WorkspaceRegistry::new(vec![]);
        reg.add(&prover, Path::new("/proj"));

        let (_, ws) = reg.resolve(&uri("/elsewhere/a.v")).unwrap();
        assert_eq!(ws.root, Path::new("/proj"));
    }

    #[test]
    fn resolve_on_empty_registry_is_none() {
        let reg: WorkspaceRegistry<ReferenceProver> = WorkspaceRegistry::new(vec![]);
        assert!(reg.resolve(&uri("/a.v")).is_none());
    }

    #[test]
    fn remove_drops_by_root() {
        let prover = ReferenceProver::default();
        let mut reg: WorkspaceRegistry<ReferenceProver> = WorkspaceRegistry::new(vec![]);
        reg.add(&prover, Path::new("/proj"));
        reg.remove(Path::new("/proj"));
        assert!(reg.is_empty());
    }

    #[test]
    fn workspaces_with_same_fields_hash_equal() {
        let a = Workspace::guess(Path::new("/proj"), &[]);
        let b = Workspace::guess(Path::new("/proj"), &[]);
        assert_eq!(a.hash_value(), b.hash_value());
    }
}
