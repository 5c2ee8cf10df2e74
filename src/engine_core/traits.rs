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

//! Collaborator contracts.
//!
//! The dispatcher and the identity-carrying transport depend only on these
//! traits, never on the concrete handshake mechanism, codec or handler.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::engine_core::errors::{HandlerError, TransportError};
use crate::engine_core::models::{RpcRequest, SessionId};
use crate::engine_core::principal::Principal;

/// State exposed by a transport that ran a secured handshake.
pub trait AuthenticatedSession: Send + Sync {
    fn handshake_complete(&self) -> bool;

    /// The principal verified by the handshake, if it completed.
    fn verified_principal(&self) -> Option<&Principal>;

    fn peer_addr(&self) -> Option<SocketAddr>;

    fn session_id(&self) -> SessionId;
}

/// Server-side view of the transport a call arrived on.
pub trait Transport: Send + Sync {
    /// Short type label used in errors and logs
    fn kind(&self) -> &'static str;

    /// `Some` only for transports that carry an authenticated session.
    fn as_authenticated(&self) -> Option<&dyn AuthenticatedSession> {
        None
    }
}

/// Client-side transport lifecycle.
#[async_trait]
pub trait ClientTransport: Send {
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Closing an already closed transport is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Next message from the peer; `TransportError::Closed` on EOF.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;
}

/// Transport-agnostic invocation of one RPC request.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, request: &RpcRequest) -> Result<serde_json::Value, HandlerError>;
}

/// The business operation. Identity is ambient, never a parameter.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError>;
}
