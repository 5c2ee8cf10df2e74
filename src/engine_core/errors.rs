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

//! Error taxonomy.
//!
//! Impersonation failures and handler failures are separate enums so a
//! handler's error kind survives the trip through the dispatcher untouched.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine_core::models::{RpcError, RpcErrorKind};

/// A principal that cannot be reduced to a short name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed principal '{principal}': {reason}")]
pub struct MalformedPrincipalError {
    pub principal: String,
    pub reason: &'static str,
}

/// Errors raised by a request handler (or the processor routing to it).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// The processor has no route for the requested method
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl HandlerError {
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            HandlerError::NotFound(_) => RpcErrorKind::NotFound,
            HandlerError::InvalidArgument(_) => RpcErrorKind::InvalidArgument,
            HandlerError::IoFailure(_) => RpcErrorKind::IoFailure,
            HandlerError::UnknownOperation(_) => RpcErrorKind::UnknownOperation,
        }
    }
}

/// Outcome of a failed dispatch.
///
/// Everything except `Handler` is raised by the impersonation machinery
/// before the handler runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unexpected non-authenticated transport: {transport}")]
    ProtocolMismatch { transport: &'static str },

    #[error("Unauthenticated: no verified principal bound to this session")]
    Unauthenticated,

    #[error(transparent)]
    MalformedPrincipal(#[from] MalformedPrincipalError),

    #[error("Impersonation of '{user}' denied: {reason}")]
    ImpersonationDenied { user: String, reason: String },

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl DispatchError {
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            DispatchError::ProtocolMismatch { .. } => RpcErrorKind::ProtocolMismatch,
            DispatchError::Unauthenticated => RpcErrorKind::Unauthenticated,
            DispatchError::MalformedPrincipal(_) => RpcErrorKind::MalformedPrincipal,
            DispatchError::ImpersonationDenied { .. } => RpcErrorKind::ImpersonationDenied,
            DispatchError::Handler(e) => e.kind(),
        }
    }

    /// True when the handler never ran for this call.
    pub fn is_pre_dispatch(&self) -> bool {
        !matches!(self, DispatchError::Handler(_))
    }

    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(self.kind(), self.to_string())
    }
}

/// Transport-level failures. These end the connection, never a single call.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Frame failed integrity check")]
    Protection,

    #[error("Connection closed by peer")]
    Closed,

    #[error("Transport is not open")]
    NotOpen,

    #[error("No login identity is active in this scope")]
    NoLoginIdentity,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures establishing a login identity.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Failed to read keytab {path}: {source}")]
    KeytabRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid keytab {path}: {reason}")]
    KeytabInvalid { path: PathBuf, reason: String },

    #[error("Keytab has no entry for principal {0}")]
    MissingPrincipal(String),

    #[error("Cannot pick a default principal: keytab holds {0} entries")]
    AmbiguousPrincipal(usize),

    #[error(transparent)]
    Malformed(#[from] MalformedPrincipalError),

    #[error("Failed to resolve local hostname: {0}")]
    Hostname(String),
}

/// Startup and configuration failures of the binaries and the server.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors seen by RPC callers.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a typed error
    #[error("{kind}: {message}")]
    Rpc { kind: RpcErrorKind, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Remote error kind, if the server produced one.
    pub fn rpc_kind(&self) -> Option<RpcErrorKind> {
        match self {
            ClientError::Rpc { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// A resource that failed to release at context teardown. Logged, never raised.
#[derive(Error, Debug)]
#[error("Could not release {resource} held for '{user}': {source}")]
pub struct CleanupWarning {
    pub resource: String,
    pub user: String,
    #[source]
    pub source: std::io::Error,
}
