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

//! Domain models for runas-rpc.
//!
//! Pure data structures for the RPC wire format and session bookkeeping.
//! Free of I/O side effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::engine_core::constants::rpc;

/// Newtype wrapper around Uuid for type-safe session identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generate a new random SessionId
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SessionId)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0.to_string()
    }
}

impl TryFrom<String> for SessionId {
    type Error = uuid::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Uuid::parse_str(&s).map(SessionId)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire-visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RpcErrorKind {
    ProtocolMismatch,
    Unauthenticated,
    MalformedPrincipal,
    ImpersonationDenied,
    NotFound,
    InvalidArgument,
    IoFailure,
    UnknownOperation,
    Parse,
    Internal,
}

impl RpcErrorKind {
    pub fn code(self) -> i32 {
        match self {
            RpcErrorKind::ProtocolMismatch => rpc::ERROR_PROTOCOL_MISMATCH,
            RpcErrorKind::Unauthenticated => rpc::ERROR_UNAUTHENTICATED,
            RpcErrorKind::MalformedPrincipal => rpc::ERROR_MALFORMED_PRINCIPAL,
            RpcErrorKind::ImpersonationDenied => rpc::ERROR_IMPERSONATION_DENIED,
            RpcErrorKind::NotFound => rpc::ERROR_NOT_FOUND,
            RpcErrorKind::InvalidArgument => rpc::ERROR_INVALID_ARGUMENT,
            RpcErrorKind::IoFailure => rpc::ERROR_IO_FAILURE,
            RpcErrorKind::UnknownOperation => rpc::ERROR_METHOD_NOT_FOUND,
            RpcErrorKind::Parse => rpc::ERROR_PARSE,
            RpcErrorKind::Internal => rpc::ERROR_INTERNAL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RpcErrorKind::ProtocolMismatch => "ProtocolMismatch",
            RpcErrorKind::Unauthenticated => "Unauthenticated",
            RpcErrorKind::MalformedPrincipal => "MalformedPrincipal",
            RpcErrorKind::ImpersonationDenied => "ImpersonationDenied",
            RpcErrorKind::NotFound => "NotFound",
            RpcErrorKind::InvalidArgument => "InvalidArgument",
            RpcErrorKind::IoFailure => "IOFailure",
            RpcErrorKind::UnknownOperation => "UnknownOperation",
            RpcErrorKind::Parse => "Parse",
            RpcErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub kind: RpcErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: rpc::VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    /// `None` only when the request could not be parsed far enough to read its id
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: rpc::VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, error: RpcError) -> Self {
        Self {
            jsonrpc: rpc::VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(err),
            (Some(value), None) => Ok(value),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }
}

/// Parameters of the `list` operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub path: String,
}
