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

//! Client transport that carries the caller's login identity.
//!
//! Wraps an authenticated client transport and runs every operation on it
//! inside [`LoginIdentity::scope`], so the wrapped transport finds its
//! credential no matter which task or thread the caller is on.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine_core::errors::TransportError;
use crate::engine_core::traits::ClientTransport;
use crate::identity::login::LoginIdentity;

pub struct IdentityTransport<T> {
    inner: T,
    login: Arc<LoginIdentity>,
}

impl<T: ClientTransport> IdentityTransport<T> {
    pub fn new(inner: T, login: Arc<LoginIdentity>) -> Self {
        Self { inner, login }
    }

    pub fn login(&self) -> &LoginIdentity {
        &self.login
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: ClientTransport> ClientTransport for IdentityTransport<T> {
    /// On failure the wrapped transport is closed before the error is
    /// returned, so nothing stays half open.
    async fn open(&mut self) -> Result<(), TransportError> {
        let login = Arc::clone(&self.login);
        let inner = &mut self.inner;
        let result = login
            .scope(async {
                match inner.open().await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        if let Err(close_err) = inner.close().await {
                            warn!("Failed to close transport after failed open: {}", close_err);
                        }
                        Err(e)
                    }
                }
            })
            .await;
        if result.is_ok() {
            debug!("Transport opened as {}", login.principal());
        }
        result
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let login = Arc::clone(&self.login);
        login.scope(self.inner.close()).await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if !self.inner.is_open() {
            return Err(TransportError::NotOpen);
        }
        let login = Arc::clone(&self.login);
        login.scope(self.inner.send(payload)).await
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        if !self.inner.is_open() {
            return Err(TransportError::NotOpen);
        }
        let login = Arc::clone(&self.login);
        login.scope(self.inner.recv()).await
    }
}
