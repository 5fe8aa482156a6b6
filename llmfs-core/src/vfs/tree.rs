//! Root directory, clone file and per-session directories.

use super::{dir_stat, mode, read_at, Dir, File, Node, NodeKind, Stat, VirtualFile};
use crate::metrics::MetricsCollector;
use crate::session::{format_thinking, parse_temperature, parse_thinking, Session};
use crate::store::SessionStore;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use llmfs_backend::Backend;
use llmfs_common::util::newline_terminated;
use llmfs_common::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Leaf files present in every session directory.
pub const SESSION_FILES: [&str; 8] = [
    "ask",
    "context",
    "ctl",
    "model",
    "temperature",
    "system",
    "thinking",
    "prefill",
];

const CLONE_FILE: &str = "new";

/// Session directories are named by the canonical decimal id only.
fn parse_session_name(name: &str) -> Option<u64> {
    name.parse::<u64>()
        .ok()
        .filter(|id| id.to_string() == name)
}

fn decode(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::InvalidInput("value is not valid UTF-8".into()))
}

// ============================================================================
// Root
// ============================================================================

/// `/`: the clone file plus one directory per live session.
pub struct RootDir {
    store: Arc<SessionStore>,
    cancel: CancellationToken,
}

impl RootDir {
    /// `cancel` is the parent of every ask issued through the tree.
    pub fn new(store: Arc<SessionStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    fn session_dir(&self, id: u64) -> Node {
        Node::Dir(Arc::new(SessionDir::new(
            id,
            self.store.clone(),
            self.cancel.clone(),
        )))
    }
}

impl Dir for RootDir {
    fn name(&self) -> &str {
        "/"
    }

    fn stat(&self) -> Result<Stat> {
        Ok(dir_stat("/"))
    }

    fn lookup(&self, name: &str) -> Result<Node> {
        if name == CLONE_FILE {
            return Ok(Node::File(Arc::new(CloneFile::new(self.store.clone()))));
        }
        let id = parse_session_name(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.store.get(id)?;
        Ok(self.session_dir(id))
    }

    fn children(&self) -> Result<Vec<Node>> {
        let mut ids = self.store.list_sessions();
        ids.sort_unstable();

        let mut nodes = Vec::with_capacity(ids.len() + 1);
        nodes.push(Node::File(Arc::new(CloneFile::new(self.store.clone()))));
        nodes.extend(ids.into_iter().map(|id| self.session_dir(id)));
        Ok(nodes)
    }
}

// ============================================================================
// Clone file
// ============================================================================

/// `/new`: reading from offset zero creates a session and yields its id.
pub struct CloneFile {
    store: Arc<SessionStore>,
}

impl CloneFile {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl File for CloneFile {
    fn name(&self) -> &str {
        CLONE_FILE
    }

    fn stat(&self) -> Result<Stat> {
        Ok(Stat {
            name: CLONE_FILE.to_string(),
            size: 0,
            mode: mode::READ_ONLY,
            kind: NodeKind::File,
        })
    }

    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        // A zero-length read could not carry the id back.
        if offset > 0 || buf.is_empty() {
            return Ok(0);
        }
        let id = self.store.create();
        Ok(read_at(format!("{id}\n").as_bytes(), buf, 0))
    }

    async fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(Error::Permission("new is read-only".into()))
    }
}

// ============================================================================
// Session directory
// ============================================================================

/// `/<id>`: the eight control files of one session.
pub struct SessionDir {
    id: u64,
    name: String,
    store: Arc<SessionStore>,
    cancel: CancellationToken,
}

impl SessionDir {
    pub fn new(id: u64, store: Arc<SessionStore>, cancel: CancellationToken) -> Self {
        Self {
            id,
            name: id.to_string(),
            store,
            cancel,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Dir for SessionDir {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat(&self) -> Result<Stat> {
        self.store.get(self.id)?;
        Ok(dir_stat(&self.name))
    }

    fn lookup(&self, name: &str) -> Result<Node> {
        self.store.get(self.id)?;
        session_file(&self.store, self.id, name, &self.cancel)
            .map(|file| Node::File(Arc::new(file)))
            .ok_or_else(|| Error::NotFound(format!("{}/{}", self.name, name)))
    }

    fn children(&self) -> Result<Vec<Node>> {
        self.store.get(self.id)?;
        Ok(SESSION_FILES
            .iter()
            .filter_map(|name| session_file(&self.store, self.id, name, &self.cancel))
            .map(|file| Node::File(Arc::new(file)))
            .collect())
    }
}

/// Content function reading one session, re-resolved on every call.
fn content<F>(
    store: &Arc<SessionStore>,
    id: u64,
    f: F,
) -> impl Fn() -> Result<String> + Send + Sync + 'static
where
    F: Fn(&Session) -> Result<String> + Send + Sync + 'static,
{
    let store = Arc::clone(store);
    move || f(&*store.get(id)?)
}

/// Apply function decoding the written value and handing it to one session.
fn setter<F>(
    store: &Arc<SessionStore>,
    id: u64,
    f: F,
) -> impl Fn(&[u8]) -> Result<()> + Send + Sync + 'static
where
    F: Fn(&Session, &str) -> Result<()> + Send + Sync + 'static,
{
    let store = Arc::clone(store);
    move |bytes| {
        let session = store.get(id)?;
        f(&*session, decode(bytes)?)
    }
}

fn session_file(
    store: &Arc<SessionStore>,
    id: u64,
    name: &str,
    cancel: &CancellationToken,
) -> Option<VirtualFile> {
    let file = match name {
        "ask" => VirtualFile::new(name, mode::READ_WRITE)
            .with_content(content(store, id, |s| Ok(newline_terminated(s.last_result()))))
            .with_apply(ask_apply(store, id, cancel)),
        "context" => VirtualFile::new(name, mode::READ_ONLY)
            .with_content(content(store, id, |s| Ok(newline_terminated(s.history_json()?)))),
        "ctl" => VirtualFile::new(name, mode::WRITE_ONLY).with_sync_apply(ctl_apply(store, id)),
        "model" => VirtualFile::new(name, mode::READ_WRITE)
            .with_content(content(store, id, |s| Ok(format!("{}\n", s.model()))))
            .with_sync_apply(setter(store, id, |s, v| s.set_model(v))),
        "temperature" => VirtualFile::new(name, mode::READ_WRITE)
            .with_content(content(store, id, |s| Ok(format!("{:.2}\n", s.temperature()))))
            .with_sync_apply(setter(store, id, |s, v| {
                s.set_temperature(parse_temperature(v)?)
            })),
        "system" => VirtualFile::new(name, mode::READ_WRITE)
            .with_content(content(store, id, |s| Ok(newline_terminated(s.system_prompt()))))
            .with_sync_apply(setter(store, id, |s, v| s.set_system_prompt(v))),
        "thinking" => VirtualFile::new(name, mode::READ_WRITE)
            .with_content(content(store, id, |s| {
                Ok(format!("{}\n", format_thinking(s.thinking_tokens())))
            }))
            .with_sync_apply(setter(store, id, |s, v| {
                s.set_thinking_tokens(parse_thinking(v)?)
            })),
        "prefill" => VirtualFile::new(name, mode::READ_WRITE)
            .with_content(content(store, id, |s| Ok(newline_terminated(s.prefill()))))
            .with_sync_apply(setter(store, id, |s, v| s.set_prefill(v))),
        _ => return None,
    };
    Some(file)
}

fn ctl_apply(
    store: &Arc<SessionStore>,
    id: u64,
) -> impl Fn(&[u8]) -> Result<()> + Send + Sync + 'static {
    let store = Arc::clone(store);
    move |bytes| {
        store.get(id)?;
        match decode(bytes)?.trim() {
            "reset" => store.reset(id),
            "close" => store.close(id),
            other => return Err(Error::InvalidInput(format!("unknown command: {other}"))),
        }
        Ok(())
    }
}

/// Writes to `ask` block until the backend answers. Backend failures are
/// not reported to the writer; they become the next read of `ask`.
fn ask_apply(
    store: &Arc<SessionStore>,
    id: u64,
    cancel: &CancellationToken,
) -> impl Fn(Vec<u8>) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
    let store = Arc::clone(store);
    let cancel = cancel.clone();
    move |bytes: Vec<u8>| -> BoxFuture<'static, Result<()>> {
        let store = Arc::clone(&store);
        let cancel = cancel.child_token();
        Box::pin(async move {
            store.get(id)?;
            let prompt = decode(&bytes)?.trim();
            if prompt.is_empty() {
                return Ok(());
            }
            match store.ask(id, prompt, &cancel).await {
                Ok(_) => Ok(()),
                Err(e @ (Error::NotFound(_) | Error::Closed(_))) => Err(e),
                Err(_) => Ok(()),
            }
        })
    }
}

// ============================================================================
// Process-wide files
// ============================================================================

/// `/system`: the backend's global system prompt.
pub(crate) fn global_system_file(backend: Arc<dyn Backend>) -> VirtualFile {
    let reader = Arc::clone(&backend);
    VirtualFile::new("system", mode::READ_WRITE)
        .with_content(move || Ok(newline_terminated(reader.system_prompt())))
        .with_sync_apply(move |bytes| {
            let prompt = decode(bytes)?.trim();
            backend.set_system_prompt(prompt);
            tracing::info!(chars = prompt.chars().count(), "Global system prompt updated");
            Ok(())
        })
}

/// `/metrics`: aggregate backend usage report.
pub(crate) fn metrics_file(metrics: Arc<MetricsCollector>) -> VirtualFile {
    VirtualFile::new("metrics", mode::READ_ONLY).with_content(move || Ok(metrics.report()))
}
