//! Generic leaf file built from a content function and an apply function.

use super::{mode, read_at, File, NodeKind, Stat};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use llmfs_common::{Error, Result};
use std::future::Future;
use std::sync::Arc;

type Synthesize = Arc<dyn Fn() -> Result<String> + Send + Sync>;
type Apply = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A file whose content is synthesized on every read and whose writes are
/// handed to an apply function as one whole value.
///
/// Without a content function reads return end-of-data; without an apply
/// function writes fail with [`Error::Permission`].
#[derive(Clone)]
pub struct VirtualFile {
    name: String,
    mode: u32,
    synthesize: Option<Synthesize>,
    apply: Option<Apply>,
}

impl VirtualFile {
    pub fn new(name: impl Into<String>, mode: u32) -> Self {
        Self {
            name: name.into(),
            mode,
            synthesize: None,
            apply: None,
        }
    }

    pub fn with_content<F>(mut self, synthesize: F) -> Self
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        self.synthesize = Some(Arc::new(synthesize));
        self
    }

    pub fn with_apply<F, Fut>(mut self, apply: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.apply = Some(Arc::new(
            move |bytes| -> BoxFuture<'static, Result<()>> { Box::pin(apply(bytes)) },
        ));
        self
    }

    /// Like [`with_apply`](Self::with_apply) for apply functions that never wait.
    pub fn with_sync_apply<F>(self, apply: F) -> Self
    where
        F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
    {
        self.with_apply(move |bytes| std::future::ready(apply(&bytes)))
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Freshly synthesized content.
    pub fn content(&self) -> Result<String> {
        match &self.synthesize {
            Some(synthesize) => synthesize(),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl File for VirtualFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat(&self) -> Result<Stat> {
        Ok(Stat {
            name: self.name.clone(),
            size: self.content()?.len() as u64,
            mode: self.mode,
            kind: NodeKind::File,
        })
    }

    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if !mode::readable(self.mode) {
            return Ok(0);
        }
        let content = self.content()?;
        Ok(read_at(content.as_bytes(), buf, offset))
    }

    async fn write(&self, buf: &[u8], _offset: u64) -> Result<usize> {
        let Some(apply) = &self.apply else {
            return Err(Error::Permission(format!("{} is read-only", self.name)));
        };
        apply(buf.to_vec()).await?;
        Ok(buf.len())
    }
}

impl std::fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFile")
            .field("name", &self.name)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("writable", &self.apply.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_content_recomputed_per_read() {
        let value = Arc::new(Mutex::new("first\n".to_string()));
        let source = value.clone();
        let file = VirtualFile::new("model", mode::READ_WRITE)
            .with_content(move || Ok(source.lock().unwrap().clone()));

        let mut buf = [0u8; 64];
        let n = file.read(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"first\n");

        *value.lock().unwrap() = "second value\n".into();
        assert_eq!(file.stat().unwrap().size, 13);
        let n = file.read(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"second value\n");
    }

    #[test]
    fn test_partial_reads_until_eof() {
        let file = VirtualFile::new("x", mode::READ_ONLY).with_content(|| Ok("abcdef".into()));
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        let mut offset = 0u64;
        loop {
            let n = file.read(&mut buf, offset).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            offset += n as u64;
        }
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn test_write_without_apply_is_permission_error() {
        let file = VirtualFile::new("context", mode::READ_ONLY).with_content(|| Ok("[]\n".into()));
        let err = file.write(b"x", 0).await.unwrap_err();
        assert!(err.is_permission());
    }

    #[tokio::test]
    async fn test_write_passes_bytes_to_apply() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let file = VirtualFile::new("ctl", mode::WRITE_ONLY).with_sync_apply(move |bytes| {
            sink.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        });

        assert_eq!(file.write(b"reset\n", 0).await.unwrap(), 6);
        assert_eq!(seen.lock().unwrap().as_slice(), b"reset\n");

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf, 0).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_error_propagates() {
        let file = VirtualFile::new("temperature", mode::READ_WRITE)
            .with_sync_apply(|_| Err(Error::InvalidInput("nope".into())));
        assert!(file.write(b"9", 0).await.unwrap_err().is_invalid_input());
    }
}
