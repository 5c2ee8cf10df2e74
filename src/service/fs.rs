// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem access bound to the calling identity.
//!
//! Handles are obtained through [`FsProvider::get`], which tags them with
//! the effective user of the current impersonation context and registers
//! them for release when that context ends.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::engine_core::errors::HandlerError;
use crate::engine_core::principal::ShortName;
use crate::identity::context::ImpersonationContext;
use crate::identity::resources::ScopedResource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub name: String,
    pub is_dir: bool,
    pub len: u64,
}

/// Serves paths relative to `root`; `/` maps to the root itself.
#[derive(Debug, Clone)]
pub struct FsProvider {
    root: PathBuf,
    open_handles: Arc<AtomicUsize>,
}

impl FsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handles not yet released.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Open a handle for the current call's effective user.
    pub fn get(&self) -> Result<Arc<FsHandle>, HandlerError> {
        let context = ImpersonationContext::current().ok_or_else(|| {
            HandlerError::IoFailure("no impersonation context is active".to_string())
        })?;

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(FsHandle {
            root: self.root.clone(),
            user: context.effective_user().clone(),
            open: AtomicBool::new(true),
            open_handles: Arc::clone(&self.open_handles),
        });
        if let Err(e) = context.resources().register(handle.clone()) {
            handle.close();
            return Err(HandlerError::IoFailure(e.to_string()));
        }
        debug!("Opened filesystem handle as {}", handle.user);
        Ok(handle)
    }
}

#[derive(Debug)]
pub struct FsHandle {
    root: PathBuf,
    user: ShortName,
    open: AtomicBool,
    open_handles: Arc<AtomicUsize>,
}

impl FsHandle {
    pub fn user(&self) -> &ShortName {
        &self.user
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        if was_open {
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        was_open
    }

    /// Resolve `path` under the root, following links, and refuse anything
    /// that lands outside it.
    async fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        if !self.is_open() {
            return Err(io::Error::other(format!(
                "filesystem handle for '{}' is closed",
                self.user
            )));
        }
        let root = tokio::fs::canonicalize(&self.root).await?;
        let full = tokio::fs::canonicalize(root.join(path.trim_start_matches('/'))).await?;
        if !full.starts_with(&root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("'{}' resolves outside the served root", path),
            ));
        }
        Ok(full)
    }

    pub async fn status(&self, path: &str) -> io::Result<FileStatus> {
        let full = self.resolve(path).await?;
        let meta = tokio::fs::metadata(&full).await?;
        // Named as requested, not after the link target
        let name = Path::new(path.trim_end_matches('/'))
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(FileStatus {
            name,
            is_dir: meta.is_dir(),
            len: meta.len(),
        })
    }

    /// Immediate children of a directory, unordered. Links are classified
    /// by their target, as `status` does; a dangling link is a plain entry.
    pub async fn list_status(&self, path: &str) -> io::Result<Vec<FileStatus>> {
        let full = self.resolve(path).await?;
        let mut dir = tokio::fs::read_dir(&full).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(_) => entry.metadata().await?,
            };
            entries.push(FileStatus {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                len: meta.len(),
            });
        }
        Ok(entries)
    }
}

impl ScopedResource for FsHandle {
    fn describe(&self) -> String {
        format!("fs:{} as {}", self.root.display(), self.user)
    }

    fn release(&self) -> io::Result<()> {
        if self.close() {
            debug!("Closed {}", self.describe());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_core::models::SessionId;
    use crate::engine_core::principal::Principal;
    use crate::identity::keytab::Keytab;
    use crate::identity::login::LoginIdentity;

    fn context() -> Arc<ImpersonationContext> {
        let server = Principal::new("runas/host@EXAMPLE.COM");
        let keytab = Keytab::from_entries([(server.clone(), vec![1u8; 32])]).unwrap();
        let login = Arc::new(LoginIdentity::new(server, Arc::new(keytab)).unwrap());
        let caller = Principal::new("alice@EXAMPLE.COM");
        let short = caller.short_name().unwrap();
        Arc::new(ImpersonationContext::proxied(
            SessionId::generate(),
            caller,
            short,
            login,
        ))
    }

    #[tokio::test]
    async fn test_get_requires_context() {
        let fs = FsProvider::new("/");
        assert!(matches!(fs.get(), Err(HandlerError::IoFailure(_))));
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_handle_is_tagged_and_closed_at_teardown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"x").unwrap();
        let fs = FsProvider::new(dir.path());
        let ctx = context();

        let handle = Arc::clone(&ctx).scope(async { fs.get() }).await.unwrap();
        assert_eq!(handle.user().as_str(), "alice");
        assert_eq!(fs.open_handles(), 1);
        assert_eq!(ctx.resources().len(), 1);
        assert!(handle.status("/a").await.unwrap().len == 1);

        assert!(ctx.release().is_empty());
        assert_eq!(fs.open_handles(), 0);
        assert!(!handle.is_open());
        assert!(handle.status("/a").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_links_cannot_escape_root() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        std::fs::create_dir(root.path().join("inner")).unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("out")).unwrap();
        std::os::unix::fs::symlink(root.path().join("inner"), root.path().join("in")).unwrap();

        let fs = FsProvider::new(root.path());
        let ctx = context();
        let handle = Arc::clone(&ctx).scope(async { fs.get() }).await.unwrap();

        for path in ["/out", "/out/secret"] {
            let err = handle.list_status(path).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::PermissionDenied, "{path}");
            assert!(handle.status(path).await.is_err());
        }

        let linked = handle.status("/in").await.unwrap();
        assert_eq!(linked.name, "in");
        assert!(linked.is_dir);
        assert!(handle.list_status("/in").await.unwrap().is_empty());

        // A listing agrees with `status` on what a link points at
        let mut entries = handle.list_status("/").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let dirs: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();
        assert_eq!(dirs, vec![("in", true), ("inner", true), ("out", true)]);

        ctx.release();
    }
}
