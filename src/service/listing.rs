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

//! The `list` operation.

use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::path::{Component, Path};
use tracing::info;

use crate::engine_core::constants::methods;
use crate::engine_core::errors::HandlerError;
use crate::engine_core::models::ListParams;
use crate::engine_core::traits::RequestHandler;
use crate::identity::context::ImpersonationContext;
use crate::service::fs::{FileStatus, FsProvider};

pub struct ListingService {
    fs: FsProvider,
}

fn validate_path(path: &str) -> Result<(), HandlerError> {
    if path.is_empty() {
        return Err(HandlerError::InvalidArgument("path is empty".to_string()));
    }
    if !path.starts_with('/') {
        return Err(HandlerError::InvalidArgument(format!(
            "path '{}' is not absolute",
            path
        )));
    }
    if path.contains('\0') {
        return Err(HandlerError::InvalidArgument(
            "path contains a NUL byte".to_string(),
        ));
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(HandlerError::InvalidArgument(format!(
            "path '{}' contains '..'",
            path
        )));
    }
    Ok(())
}

fn io_error(path: &str, e: io::Error) -> HandlerError {
    match e.kind() {
        io::ErrorKind::NotFound => HandlerError::NotFound(path.to_string()),
        _ => HandlerError::IoFailure(format!("{}: {}", path, e)),
    }
}

fn render(entries: &[FileStatus]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.name);
        if entry.is_dir {
            out.push('/');
        }
        out.push('\n');
    }
    out
}

impl ListingService {
    pub fn new(fs: FsProvider) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &FsProvider {
        &self.fs
    }

    /// Entries of `path` sorted by name, one per line, directories marked
    /// with a trailing `/`. A regular file lists only itself.
    pub async fn list(&self, path: &str) -> Result<String, HandlerError> {
        validate_path(path)?;
        if let Some(context) = ImpersonationContext::current() {
            info!("Running as {}", context);
        }

        let fs = self.fs.get()?;
        let status = fs.status(path).await.map_err(|e| io_error(path, e))?;
        let entries = if status.is_dir {
            let mut children = fs.list_status(path).await.map_err(|e| io_error(path, e))?;
            children.sort_by(|a, b| a.name.cmp(&b.name));
            children
        } else {
            vec![status]
        };
        Ok(render(&entries))
    }
}

#[async_trait]
impl RequestHandler for ListingService {
    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, HandlerError> {
        match operation {
            methods::LIST => {
                let params: ListParams = serde_json::from_value(payload)
                    .map_err(|e| HandlerError::InvalidArgument(format!("bad list params: {}", e)))?;
                self.list(&params.path).await.map(Value::String)
            }
            other => Err(HandlerError::UnknownOperation(other.to_string())),
        }
    }
}
