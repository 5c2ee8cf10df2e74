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

//! Impersonating dispatcher.
//!
//! Every call is executed inside an [`ImpersonationContext`] derived from
//! the principal the connection authenticated as:
//!
//! 1. the transport must carry an authenticated session
//! 2. the session must have a verified principal
//! 3. the principal is reduced to a short name and, in proxied mode, checked
//!    against the proxy policy
//! 4. the processor runs with the context current
//! 5. resources acquired under the context are released on every exit path,
//!    including cancellation and panics
//!
//! Failures in steps 1-3 never reach the processor.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine_core::errors::DispatchError;
use crate::engine_core::models::RpcRequest;
use crate::engine_core::traits::{Processor, Transport};
use crate::identity::context::{ImpersonationContext, ImpersonationMode};
use crate::identity::login::LoginIdentity;
use crate::identity::proxy::ProxyAuthorizer;

/// Live dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    contexts_created: AtomicU64,
    contexts_released: AtomicU64,
    handler_invocations: AtomicU64,
    rejected: AtomicU64,
    cleanup_warnings: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub contexts_created: u64,
    pub contexts_released: u64,
    pub handler_invocations: u64,
    pub rejected: u64,
    pub cleanup_warnings: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            contexts_created: self.contexts_created.load(Ordering::SeqCst),
            contexts_released: self.contexts_released.load(Ordering::SeqCst),
            handler_invocations: self.handler_invocations.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            cleanup_warnings: self.cleanup_warnings.load(Ordering::SeqCst),
        }
    }
}

/// Tears the context down when dropped, whichever way the call ended.
struct ContextGuard {
    context: Arc<ImpersonationContext>,
    stats: Arc<DispatchStats>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let warnings = self.context.release();
        self.stats
            .cleanup_warnings
            .fetch_add(warnings.len() as u64, Ordering::SeqCst);
        self.stats.contexts_released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ImpersonatingDispatcher<P> {
    inner: P,
    login: Arc<LoginIdentity>,
    mode: ImpersonationMode,
    authorizer: Arc<dyn ProxyAuthorizer>,
    stats: Arc<DispatchStats>,
}

impl<P: Processor> ImpersonatingDispatcher<P> {
    pub fn new(
        inner: P,
        login: Arc<LoginIdentity>,
        mode: ImpersonationMode,
        authorizer: Arc<dyn ProxyAuthorizer>,
    ) -> Self {
        Self {
            inner,
            login,
            mode,
            authorizer,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn mode(&self) -> ImpersonationMode {
        self.mode
    }

    pub fn login(&self) -> &LoginIdentity {
        &self.login
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Run one call as the identity `transport` authenticated.
    ///
    /// The processor's errors come back as `DispatchError::Handler` with their
    /// kind intact.
    pub async fn dispatch(
        &self,
        transport: &dyn Transport,
        request: &RpcRequest,
    ) -> Result<Value, DispatchError> {
        let context = match self.build_context(transport) {
            Ok(context) => Arc::new(context),
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::SeqCst);
                warn!(
                    target: "audit",
                    transport = transport.kind(),
                    method = %request.method,
                    kind = %e.kind(),
                    "Call rejected before dispatch: {}",
                    e
                );
                return Err(e);
            }
        };

        self.stats.contexts_created.fetch_add(1, Ordering::SeqCst);
        let guard = ContextGuard {
            context: Arc::clone(&context),
            stats: Arc::clone(&self.stats),
        };

        self.stats.handler_invocations.fetch_add(1, Ordering::SeqCst);
        let result = Arc::clone(&context)
            .scope(self.inner.process(request))
            .await
            .map_err(DispatchError::Handler);
        drop(guard);

        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(e) => e.kind().to_string(),
        };
        info!(
            target: "audit",
            session_id = %context.session_id(),
            principal = %context.principal(),
            effective_user = %context.effective_user(),
            mode = %context.mode(),
            method = %request.method,
            outcome = %outcome,
            "Call dispatched"
        );
        result
    }

    fn build_context(&self, transport: &dyn Transport) -> Result<ImpersonationContext, DispatchError> {
        let session = transport
            .as_authenticated()
            .ok_or(DispatchError::ProtocolMismatch {
                transport: transport.kind(),
            })?;

        if !session.handshake_complete() {
            return Err(DispatchError::Unauthenticated);
        }
        let principal = session
            .verified_principal()
            .ok_or(DispatchError::Unauthenticated)?
            .clone();
        let short_name = principal.short_name()?;

        match self.mode {
            ImpersonationMode::Proxied => {
                let remote = session.peer_addr().map(|addr| addr.ip());
                self.authorizer
                    .authorize(&self.login, &short_name, remote)
                    .map_err(|reason| DispatchError::ImpersonationDenied {
                        user: short_name.to_string(),
                        reason,
                    })?;
                Ok(ImpersonationContext::proxied(
                    session.session_id(),
                    principal,
                    short_name,
                    Arc::clone(&self.login),
                ))
            }
            ImpersonationMode::Advisory => Ok(ImpersonationContext::advisory(
                session.session_id(),
                principal,
                short_name,
                Arc::clone(&self.login),
            )),
        }
    }
}
