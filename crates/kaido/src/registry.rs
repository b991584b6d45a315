//! Backend registry with longest-prefix dispatch.
//!
//! Every [`Location`](crate::Location) operation asks the registry which
//! backend serves it. Prefixes are matched by length: if `mem://a` and
//! `mem://ab` are both registered, `mem://ab/x` goes to `mem://ab`. Input
//! that matches no prefix belongs to the local file system, and the empty
//! input resolves to the invalid sentinel.
//!
//! The registry is an ordinary value. Construct one at startup and share it
//! behind an `Arc`; tests build isolated registries of their own.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::backends::invalid::{INVALID_PREFIX, InvalidFs};
use crate::backends::local::{LOCAL_PREFIX, LocalFs};
use crate::types::RegisteredBackend;

/// Process-scoped map from scheme prefix to backend.
///
/// `resolve` takes the read lock; `register` and `unregister` take the
/// write lock.
pub struct Registry {
    backends: RwLock<BTreeMap<String, Arc<dyn Backend>>>,
    local: Arc<dyn Backend>,
    invalid: Arc<dyn Backend>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("prefixes", &self.backends.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry with the default local backend and the invalid sentinel.
    pub fn new() -> Self {
        Self::with_local(LocalFs::default())
    }

    /// Registry with a custom local backend.
    pub fn with_local(local: LocalFs) -> Self {
        let local: Arc<dyn Backend> = Arc::new(local);
        let invalid: Arc<dyn Backend> = Arc::new(InvalidFs);

        let mut backends = BTreeMap::new();
        backends.insert(LOCAL_PREFIX.to_string(), Arc::clone(&local));
        backends.insert(INVALID_PREFIX.to_string(), Arc::clone(&invalid));

        Self {
            backends: RwLock::new(backends),
            local,
            invalid,
        }
    }

    /// Bind `backend` under its prefix, replacing any previous binding.
    ///
    /// Returns the replaced backend, if any.
    ///
    /// # Panics
    ///
    /// If the backend reports an empty prefix.
    pub fn register(&self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        let prefix = backend.prefix().to_string();
        assert!(
            !prefix.is_empty(),
            "backend {:?} has an empty prefix",
            backend.name()
        );

        let previous = self.backends.write().insert(prefix.clone(), backend);
        tracing::debug!(%prefix, replaced = previous.is_some(), "registered backend");
        previous
    }

    /// Remove `backend` if it is still the one bound under its prefix.
    ///
    /// A backend that has already been replaced leaves the newer binding in
    /// place. The local and invalid backends cannot be unregistered.
    pub fn unregister(&self, backend: &dyn Backend) -> bool {
        let prefix = backend.prefix();
        if Self::is_permanent(prefix) {
            return false;
        }

        let mut backends = self.backends.write();
        let same = backends.get(prefix).is_some_and(|bound| {
            std::ptr::addr_eq(Arc::as_ptr(bound), std::ptr::from_ref(backend))
        });
        if same {
            backends.remove(prefix);
            tracing::debug!(%prefix, "unregistered backend");
        }
        same
    }

    /// Remove whatever backend is bound under `prefix`.
    pub fn unregister_prefix(&self, prefix: &str) -> Option<Arc<dyn Backend>> {
        if Self::is_permanent(prefix) {
            return None;
        }
        let removed = self.backends.write().remove(prefix);
        if removed.is_some() {
            tracing::debug!(%prefix, "unregistered backend");
        }
        removed
    }

    fn is_permanent(prefix: &str) -> bool {
        prefix == LOCAL_PREFIX || prefix == INVALID_PREFIX
    }

    /// Find the backend for `location` and the backend-relative path.
    ///
    /// A prefix only claims input where it ends on a segment boundary, so
    /// `mem://a` serves `mem://a/x` but never `mem://ab/x`.
    pub fn resolve(&self, location: &str) -> (Arc<dyn Backend>, String) {
        if location.is_empty() {
            return (Arc::clone(&self.invalid), String::new());
        }

        let backends = self.backends.read();
        let best = backends
            .iter()
            .filter(|(prefix, backend)| owns(prefix, backend.separator(), location))
            .max_by_key(|(prefix, _)| prefix.len());

        let (backend, relative) = match best {
            Some((prefix, backend)) => (Arc::clone(backend), &location[prefix.len()..]),
            None => (Arc::clone(&self.local), location),
        };
        tracing::trace!(location, prefix = backend.prefix(), relative, "resolved");
        (backend, relative.to_string())
    }

    /// Backend bound under exactly `prefix`.
    pub fn get(&self, prefix: &str) -> Option<Arc<dyn Backend>> {
        self.backends.read().get(prefix).cloned()
    }

    /// True if something is bound under exactly `prefix`.
    pub fn is_registered(&self, prefix: &str) -> bool {
        self.backends.read().contains_key(prefix)
    }

    /// All bindings, sorted by prefix.
    pub fn backends(&self) -> Vec<RegisteredBackend> {
        self.backends
            .read()
            .iter()
            .map(|(prefix, backend)| RegisteredBackend {
                prefix: prefix.clone(),
                name: backend.name().to_string(),
            })
            .collect()
    }

    pub fn local(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.local)
    }

    pub fn invalid(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.invalid)
    }
}

/// True if `prefix` covers `location` up to a segment boundary.
fn owns(prefix: &str, separator: char, location: &str) -> bool {
    match location.strip_prefix(prefix) {
        Some(rest) => {
            rest.is_empty() || rest.starts_with(separator) || prefix.ends_with(separator)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryFs;
    use crate::config::MemoryFsConfig;

    fn memory(id: &str) -> Arc<MemoryFs> {
        Arc::new(MemoryFs::new(MemoryFsConfig::default().with_id(id)))
    }

    #[test]
    fn empty_input_resolves_to_invalid() {
        let registry = Registry::new();
        let (backend, rel) = registry.resolve("");
        assert_eq!(backend.prefix(), INVALID_PREFIX);
        assert!(rel.is_empty());
    }

    #[test]
    fn unmatched_input_goes_to_local_verbatim() {
        let registry = Registry::new();
        let (backend, rel) = registry.resolve("~/notes/todo.md");
        assert_eq!(backend.prefix(), LOCAL_PREFIX);
        assert_eq!(rel, "~/notes/todo.md");

        let (backend, rel) = registry.resolve("file:///etc/hosts");
        assert_eq!(backend.prefix(), LOCAL_PREFIX);
        assert_eq!(rel, "/etc/hosts");
    }

    #[test]
    fn longest_prefix_wins() {
        let registry = Registry::new();
        registry.register(memory("a"));
        registry.register(memory("ab"));

        let (backend, rel) = registry.resolve("mem://ab/x");
        assert_eq!(backend.prefix(), "mem://ab");
        assert_eq!(rel, "/x");

        let (backend, rel) = registry.resolve("mem://a/x");
        assert_eq!(backend.prefix(), "mem://a");
        assert_eq!(rel, "/x");
    }

    #[test]
    fn prefix_must_end_on_segment_boundary() {
        let registry = Registry::new();
        let a = memory("a");
        a.seed_files([("b/x", "belongs to a")]).unwrap();
        registry.register(a.clone());

        let (backend, rel) = registry.resolve("mem://ab/x");
        assert_eq!(backend.prefix(), LOCAL_PREFIX);
        assert_eq!(rel, "mem://ab/x");
        assert!(backend.read_all(&rel).is_err());

        let (backend, rel) = registry.resolve("mem://a");
        assert_eq!(backend.prefix(), "mem://a");
        assert!(rel.is_empty());

        let (backend, rel) = registry.resolve("file://relative/x");
        assert_eq!(backend.prefix(), LOCAL_PREFIX);
        assert_eq!(rel, "relative/x");
    }

    #[test]
    fn closing_longer_sibling_does_not_alias_shorter_one() {
        let registry = Registry::new();
        let one = memory("t-1");
        let ten = memory("t-10");
        one.seed_files([("0/f", "one")]).unwrap();
        registry.register(one.clone());
        registry.register(ten.clone());
        assert!(registry.unregister(ten.as_ref()));

        let (backend, _) = registry.resolve("mem://t-10/f");
        assert_eq!(backend.prefix(), LOCAL_PREFIX);
    }

    #[test]
    fn register_replaces_and_unregister_checks_identity() {
        let registry = Registry::new();
        let first = memory("same");
        let second = memory("same");

        assert!(registry.register(first.clone()).is_none());
        assert!(registry.register(second.clone()).is_some());

        // The stale instance must not remove its replacement.
        assert!(!registry.unregister(first.as_ref()));
        assert!(registry.is_registered("mem://same"));

        assert!(registry.unregister(second.as_ref()));
        assert!(!registry.is_registered("mem://same"));
        assert!(!registry.unregister(second.as_ref()));
    }

    #[test]
    fn permanent_backends_stay() {
        let registry = Registry::new();
        assert!(registry.unregister_prefix(LOCAL_PREFIX).is_none());
        assert!(!registry.unregister(registry.invalid().as_ref()));

        let prefixes: Vec<_> = registry.backends().into_iter().map(|b| b.prefix).collect();
        assert_eq!(prefixes, vec![LOCAL_PREFIX, INVALID_PREFIX]);
    }

    #[test]
    #[should_panic(expected = "empty prefix")]
    fn empty_prefix_panics() {
        struct Nameless;
        impl Backend for Nameless {
            fn prefix(&self) -> &str {
                ""
            }
            fn name(&self) -> &str {
                "nameless"
            }
            fn stat(&self, _: &str) -> crate::FsResult<crate::FileInfo> {
                unreachable!()
            }
            fn list_dir_info(
                &self,
                _: &str,
                _: crate::backend::ListCallback<'_>,
                _: &[&str],
                _: &tokio_util::sync::CancellationToken,
            ) -> crate::FsResult<()> {
                unreachable!()
            }
            fn read_all(&self, _: &str) -> crate::FsResult<Vec<u8>> {
                unreachable!()
            }
            fn open_reader(&self, _: &str) -> crate::FsResult<Box<dyn crate::FileReader>> {
                unreachable!()
            }
            fn make_dir(&self, _: &str, _: crate::Permissions) -> crate::FsResult<()> {
                unreachable!()
            }
            fn write_all(&self, _: &str, _: &[u8], _: crate::Permissions) -> crate::FsResult<()> {
                unreachable!()
            }
            fn append(&self, _: &str, _: &[u8], _: crate::Permissions) -> crate::FsResult<()> {
                unreachable!()
            }
            fn open_writer(
                &self,
                _: &str,
                _: crate::Permissions,
            ) -> crate::FsResult<Box<dyn crate::FileWriter>> {
                unreachable!()
            }
            fn open_append_writer(
                &self,
                _: &str,
                _: crate::Permissions,
            ) -> crate::FsResult<Box<dyn crate::FileWriter>> {
                unreachable!()
            }
            fn open_read_writer(
                &self,
                _: &str,
                _: crate::Permissions,
            ) -> crate::FsResult<Box<dyn crate::FileReadWriter>> {
                unreachable!()
            }
            fn remove(&self, _: &str) -> crate::FsResult<()> {
                unreachable!()
            }
        }

        Registry::new().register(Arc::new(Nameless));
    }
}
