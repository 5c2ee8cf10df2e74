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

//! Typed RPC client over any [`ClientTransport`].

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine_core::constants::methods;
use crate::engine_core::errors::ClientError;
use crate::engine_core::models::{RpcRequest, RpcResponse};
use crate::engine_core::traits::ClientTransport;

pub struct RpcClient<T> {
    transport: T,
    next_id: u64,
}

impl<T: ClientTransport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: 1,
        }
    }

    pub async fn open(&mut self) -> Result<(), ClientError> {
        Ok(self.transport.open().await?)
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        Ok(self.transport.close().await?)
    }

    /// One request, one response. Calls on a client are strictly sequential.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest::new(id, method, params);
        let body = serde_json::to_vec(&request).map_err(|e| ClientError::Transport(e.into()))?;
        debug!("Calling {} (id {})", method, id);
        self.transport.send(Bytes::from(body)).await?;

        let frame = self.transport.recv().await?;
        let response: RpcResponse = serde_json::from_slice(&frame)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        if let Some(got) = response.id {
            if got != id {
                return Err(ClientError::MalformedResponse(format!(
                    "response id {} does not match request id {}",
                    got, id
                )));
            }
        }
        response.into_result().map_err(|e| ClientError::Rpc {
            kind: e.kind,
            message: e.message,
        })
    }

    /// Directory listing: one `name\n` line per entry, directories end in `/`.
    pub async fn list(&mut self, path: &str) -> Result<String, ClientError> {
        match self.call(methods::LIST, json!({ "path": path })).await? {
            Value::String(listing) => Ok(listing),
            other => Err(ClientError::MalformedResponse(format!(
                "expected a string listing, got {}",
                other
            ))),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
