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

//! TCP accept loop and per-connection workers.
//!
//! One task per connection, admitted by a semaphore sized `max_workers`.
//! Connections beyond capacity wait for a permit. A worker handles the
//! calls of its connection strictly one after another; an error on one
//! connection ends only that worker.

use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::engine_core::errors::ServiceError;
use crate::engine_core::models::{RpcError, RpcErrorKind, RpcRequest, RpcResponse};
use crate::engine_core::traits::Processor;
use crate::identity::login::LoginIdentity;
use crate::rpc::dispatcher::ImpersonatingDispatcher;
use crate::transport::sasl::SaslServerTransport;

pub struct RpcServer<P> {
    listener: TcpListener,
    login: Arc<LoginIdentity>,
    dispatcher: Arc<ImpersonatingDispatcher<P>>,
    workers: Arc<Semaphore>,
    handshake_timeout: Duration,
    idle_timeout: Duration,
}

impl<P: Processor + 'static> RpcServer<P> {
    pub async fn bind(
        config: &ServerConfig,
        login: Arc<LoginIdentity>,
        dispatcher: ImpersonatingDispatcher<P>,
    ) -> Result<Self, ServiceError> {
        if config.max_workers == 0 {
            return Err(ServiceError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        let listener = TcpListener::bind(config.listen_addr()).await?;
        info!(
            "Listening on {} as {} (mode={}, workers={})",
            listener.local_addr()?,
            login.principal(),
            dispatcher.mode(),
            config.max_workers
        );
        Ok(Self {
            listener,
            login,
            dispatcher: Arc::new(dispatcher),
            workers: Arc::new(Semaphore::new(config.max_workers)),
            handshake_timeout: config.handshake_timeout(),
            idle_timeout: config.idle_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServiceError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> Arc<ImpersonatingDispatcher<P>> {
        Arc::clone(&self.dispatcher)
    }

    /// Accept until `shutdown` fires, then cancel in-flight calls and wait
    /// for every worker to finish its teardown.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let tracker = TaskTracker::new();

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                },
            };

            let worker = Worker {
                login: Arc::clone(&self.login),
                dispatcher: Arc::clone(&self.dispatcher),
                handshake_timeout: self.handshake_timeout,
                idle_timeout: self.idle_timeout,
                shutdown: shutdown.child_token(),
            };
            let workers = Arc::clone(&self.workers);
            let span = info_span!("connection", peer = %peer);
            tracker.spawn(
                async move {
                    let _permit = tokio::select! {
                        _ = worker.shutdown.cancelled() => return,
                        permit = workers.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return,
                        },
                    };
                    worker.run(stream, peer).await;
                }
                .instrument(span),
            );
        }

        tracker.close();
        info!("Shutting down, waiting for {} workers", tracker.len());
        tracker.wait().await;
        Ok(())
    }
}

struct Worker<P> {
    login: Arc<LoginIdentity>,
    dispatcher: Arc<ImpersonatingDispatcher<P>>,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    shutdown: CancellationToken,
}

impl<P: Processor> Worker<P> {
    async fn run(self, stream: TcpStream, peer: SocketAddr) {
        let accept = SaslServerTransport::accept(stream, Some(peer), &self.login);
        let mut transport = match tokio::time::timeout(self.handshake_timeout, accept).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                warn!("Handshake failed: {}", e);
                return;
            }
            Err(_) => {
                warn!("Handshake timed out after {:?}", self.handshake_timeout);
                return;
            }
        };

        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = tokio::time::timeout(self.idle_timeout, transport.recv()) => frame,
            };
            let frame = match frame {
                Err(_) => {
                    info!("Closing connection idle for {:?}", self.idle_timeout);
                    break;
                }
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    debug!("Peer closed the connection");
                    break;
                }
                Ok(Err(e)) => {
                    warn!("Connection error: {}", e);
                    break;
                }
            };

            let response = match serde_json::from_slice::<RpcRequest>(&frame) {
                Ok(request) => {
                    // Dropping the dispatch future on shutdown still tears the context down
                    let result = tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        result = self.dispatcher.dispatch(&transport, &request) => result,
                    };
                    match result {
                        Ok(value) => RpcResponse::success(request.id, value),
                        Err(e) => RpcResponse::failure(Some(request.id), e.to_rpc_error()),
                    }
                }
                Err(e) => RpcResponse::failure(None, RpcError::new(RpcErrorKind::Parse, e.to_string())),
            };

            let body = match serde_json::to_vec(&response) {
                Ok(body) => body,
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    break;
                }
            };
            if let Err(e) = transport.send(&body).await {
                warn!("Failed to send response: {}", e);
                break;
            }
        }
        let lived = Utc::now() - transport.established_at();
        debug!(
            principal = %transport.principal(),
            established_at = %transport.established_at(),
            duration_ms = lived.num_milliseconds(),
            "Session ended"
        );
    }
}
