//! Path resolution over the synthetic tree.

use super::tree::{global_system_file, metrics_file};
use super::{Dir, Node, RootDir};
use crate::metrics::MetricsCollector;
use crate::store::SessionStore;
use llmfs_common::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The mounted filesystem: the session tree at `/` plus the process-wide
/// `/system` and `/metrics` files.
///
/// The two process-wide files resolve by path but are not part of the root
/// listing, which only ever shows `new` and live sessions.
pub struct Namespace {
    root: Arc<RootDir>,
    mounts: Vec<Node>,
}

impl Namespace {
    pub fn new(
        store: Arc<SessionStore>,
        metrics: Arc<MetricsCollector>,
        cancel: CancellationToken,
    ) -> Self {
        let mounts = vec![
            Node::File(Arc::new(global_system_file(store.backend().clone()))),
            Node::File(Arc::new(metrics_file(metrics))),
        ];
        Self {
            root: Arc::new(RootDir::new(store, cancel)),
            mounts,
        }
    }

    pub fn root(&self) -> Node {
        Node::Dir(self.root.clone())
    }

    /// Resolve a slash-separated path. Empty components are ignored, so
    /// `""`, `"/"` and `"//"` all name the root.
    pub fn resolve(&self, path: &str) -> Result<Node> {
        let mut components = path.split('/').filter(|c| !c.is_empty());

        let Some(first) = components.next() else {
            return Ok(self.root());
        };
        if first == "." || first == ".." {
            return Err(Error::NotFound(path.to_string()));
        }

        let mut node = match self.mounts.iter().find(|m| m.name() == first) {
            Some(mount) => mount.clone(),
            None => self.root.lookup(first)?,
        };

        for component in components {
            node = match node {
                Node::Dir(dir) => dir.lookup(component)?,
                Node::File(_) => {
                    return Err(Error::NotFound(format!("{path}: not a directory")));
                }
            };
        }
        Ok(node)
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("mounts", &self.mounts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionSettings;
    use crate::store::tests::MockBackend;
    use crate::vfs::tree::tests::read_all;
    use crate::vfs::{mode, File, NodeKind};
    use llmfs_backend::Backend;

    fn namespace(backend: Arc<MockBackend>) -> (Arc<SessionStore>, Arc<MetricsCollector>, Namespace) {
        let metrics = Arc::new(MetricsCollector::new());
        backend.set_metrics_callback(metrics.callback());
        let store = Arc::new(SessionStore::new(backend, SessionSettings::default()));
        let ns = Namespace::new(store.clone(), metrics.clone(), CancellationToken::new());
        (store, metrics, ns)
    }

    fn file(ns: &Namespace, path: &str) -> Arc<dyn File> {
        match ns.resolve(path).unwrap() {
            Node::File(f) => f,
            Node::Dir(_) => panic!("{path} is a directory"),
        }
    }

    #[test]
    fn test_resolve_root_variants() {
        let (_, _, ns) = namespace(MockBackend::echo());
        for path in ["", "/", "//"] {
            let stat = ns.resolve(path).unwrap().stat().unwrap();
            assert_eq!(stat.kind, NodeKind::Dir);
        }
    }

    #[test]
    fn test_resolve_session_paths() {
        let (store, _, ns) = namespace(MockBackend::echo());
        let id = store.create();

        assert!(ns.resolve(&format!("/{id}")).unwrap().is_dir());
        assert_eq!(read_all(&*file(&ns, &format!("/{id}/model"))), "claude-sonnet-4-20250514\n");
        assert_eq!(read_all(&*file(&ns, &format!("{id}//temperature/"))), "0.70\n");

        assert!(ns.resolve("/99/model").unwrap_err().is_not_found());
        assert!(ns.resolve(&format!("/{id}/nope")).unwrap_err().is_not_found());
        assert!(ns.resolve(&format!("/{id}/model/x")).unwrap_err().is_not_found());
        assert!(ns.resolve("/../etc").unwrap_err().is_not_found());
    }

    #[test]
    fn test_global_files_hidden_from_listing() {
        let (_, _, ns) = namespace(MockBackend::echo());
        let Node::Dir(root) = ns.root() else {
            panic!("root is a directory");
        };
        let names: Vec<_> = root
            .children()
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["new"]);

        assert!(ns.resolve("/system").is_ok());
        assert_eq!(file(&ns, "/metrics").stat().unwrap().mode, mode::READ_ONLY);
    }

    #[tokio::test]
    async fn test_global_system_prompt_is_session_fallback() {
        let backend = MockBackend::echo();
        let (store, _, ns) = namespace(backend.clone());
        let system = file(&ns, "/system");

        assert_eq!(read_all(&*system), "");
        system.write(b"  Be kind.\n", 0).await.unwrap();
        assert_eq!(read_all(&*system), "Be kind.\n");
        assert_eq!(backend.system_prompt(), "Be kind.");

        // Session-level prompt stays independent
        let id = store.create();
        assert_eq!(read_all(&*file(&ns, &format!("/{id}/system"))), "");
    }

    #[tokio::test]
    async fn test_metrics_reflect_asks() {
        let (store, _, ns) = namespace(MockBackend::echo());
        assert_eq!(read_all(&*file(&ns, "/metrics")), "requests: 0\n");

        let id = store.create();
        let ask = file(&ns, &format!("/{id}/ask"));
        ask.write(b"one", 0).await.unwrap();
        ask.write(b"two", 0).await.unwrap();

        let report = read_all(&*file(&ns, "/metrics"));
        assert!(report.starts_with("requests: 2\n"));
        assert!(report.contains("total_tokens: 10\n"));

        let err = file(&ns, "/metrics").write(b"0", 0).await.unwrap_err();
        assert!(err.is_permission());
    }
}
