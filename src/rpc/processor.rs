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

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::engine_core::constants::rpc;
use crate::engine_core::errors::HandlerError;
use crate::engine_core::models::RpcRequest;
use crate::engine_core::traits::{Processor, RequestHandler};

/// Routes a decoded request to a [`RequestHandler`] by method name.
pub struct HandlerProcessor<H> {
    handler: H,
}

impl<H: RequestHandler> HandlerProcessor<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<H: RequestHandler> Processor for HandlerProcessor<H> {
    async fn process(&self, request: &RpcRequest) -> Result<Value, HandlerError> {
        if request.jsonrpc != rpc::VERSION {
            return Err(HandlerError::InvalidArgument(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            )));
        }
        debug!("Processing request {} ({})", request.id, request.method);
        self.handler
            .invoke(&request.method, request.params.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, HandlerError> {
            match operation {
                "echo" => Ok(payload),
                other => Err(HandlerError::UnknownOperation(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_routes_by_method() {
        let processor = HandlerProcessor::new(Echo);
        let out = processor
            .process(&RpcRequest::new(1, "echo", json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(out, json!({"x": 1}));

        let err = processor
            .process(&RpcRequest::new(2, "rm", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnknownOperation(m) if m == "rm"));
    }

    #[tokio::test]
    async fn test_rejects_wrong_version() {
        let mut request = RpcRequest::new(1, "echo", Value::Null);
        request.jsonrpc = "1.0".to_string();
        let err = HandlerProcessor::new(Echo).process(&request).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArgument(_)));
    }
}
