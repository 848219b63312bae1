//! Path canonicalization for move-graph identity.
//!
//! Cycle detection must never rely on string equality: a mapped drive and
//! its UNC share, or a symlink and its target, are one physical location.
//! `CanonicalPaths` interns every raw path to a stable node id, resolving
//! aliases and symlinks once per validation pass, and remembers which raw
//! spellings collapsed together so the validator can warn about them.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Resolves a textual path to an aliased equivalent.
///
/// On Windows the production resolver maps drive letters to their network
/// share (`WNetGetConnectionW`); elsewhere there is nothing to resolve and
/// the no-op default applies. Tests inject a table-backed resolver.
pub trait AliasResolver: Send + Sync {
    /// The alias-expanded form of `path`, or `None` when no alias applies.
    fn resolve(&self, path: &Path) -> Option<PathBuf>;
}

/// Default resolver: no drive mappings known.
pub struct NoAliasResolver;

impl AliasResolver for NoAliasResolver {
    fn resolve(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// Prefix-substitution resolver backed by an explicit mapping table.
pub struct TableAliasResolver {
    mappings: Vec<(PathBuf, PathBuf)>,
}

impl TableAliasResolver {
    pub fn new(mappings: Vec<(PathBuf, PathBuf)>) -> Self {
        Self { mappings }
    }
}

impl AliasResolver for TableAliasResolver {
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        for (prefix, target) in &self.mappings {
            if let Ok(rest) = path.strip_prefix(prefix) {
                return Some(target.join(rest));
            }
        }
        None
    }
}

/// An alias discovered during interning: two raw spellings, one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAlias {
    pub raw: PathBuf,
    pub first_seen_as: PathBuf,
}

/// Interner mapping raw paths to canonical node ids.
pub struct CanonicalPaths {
    resolver: Arc<dyn AliasResolver>,
    /// canonical path -> (node id, first raw spelling seen)
    ids: HashMap<PathBuf, (usize, PathBuf)>,
    /// node id -> canonical path, for display
    display: Vec<PathBuf>,
    /// raw path -> node id, so repeated lookups stay cheap
    cache: HashMap<PathBuf, usize>,
    aliases: Vec<DiscoveredAlias>,
}

impl CanonicalPaths {
    pub fn new(resolver: Arc<dyn AliasResolver>) -> Self {
        Self {
            resolver,
            ids: HashMap::new(),
            display: Vec::new(),
            cache: HashMap::new(),
            aliases: Vec::new(),
        }
    }

    /// Intern `raw`, returning its canonical node id.
    pub fn intern(&mut self, raw: &Path) -> usize {
        if let Some(&id) = self.cache.get(raw) {
            return id;
        }

        let canonical = self.canonicalize(raw);
        let next_id = self.display.len();
        let (id, first_raw) = match self.ids.get(&canonical) {
            Some((id, first)) => (*id, Some(first.clone())),
            None => {
                self.ids.insert(canonical.clone(), (next_id, raw.to_path_buf()));
                self.display.push(canonical);
                (next_id, None)
            }
        };

        if let Some(first) = first_raw {
            if first != raw {
                self.aliases.push(DiscoveredAlias {
                    raw: raw.to_path_buf(),
                    first_seen_as: first,
                });
            }
        }

        self.cache.insert(raw.to_path_buf(), id);
        id
    }

    /// The canonical display path for a node id.
    pub fn display_path(&self, id: usize) -> &Path {
        &self.display[id]
    }

    /// Aliases discovered so far, in interning order.
    pub fn discovered_aliases(&self) -> &[DiscoveredAlias] {
        &self.aliases
    }

    /// Resolve a raw path to its stable identity.
    ///
    /// Steps: lexically normalize, expand a drive/share alias if the
    /// resolver knows one, then resolve symlinks and reparse points via the
    /// filesystem when the path exists. Nonexistent paths keep their
    /// normalized form so validation can still reason about them.
    fn canonicalize(&self, raw: &Path) -> PathBuf {
        let normalized = normalize_lexically(raw);
        let aliased = self
            .resolver
            .resolve(&normalized)
            .map(|p| normalize_lexically(&p))
            .unwrap_or(normalized);

        match std::fs::canonicalize(&aliased) {
            Ok(resolved) => resolved,
            Err(_) => aliased,
        }
    }
}

/// Collapse `.` and `..` components and drop trailing separators without
/// touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}
