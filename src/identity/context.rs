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

//! Per-call impersonation context.
//!
//! A context binds the effective identity of exactly one RPC call. It is made
//! current with [`ImpersonationContext::scope`], which uses task-local
//! storage, so concurrent calls on other connections (other tasks) never see
//! it and it cannot outlive the future it scopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use crate::engine_core::errors::CleanupWarning;
use crate::engine_core::models::SessionId;
use crate::engine_core::principal::{Principal, ShortName};
use crate::identity::login::LoginIdentity;
use crate::identity::resources::ResourceScope;

tokio::task_local! {
    static CURRENT: Arc<ImpersonationContext>;
}

/// How the dispatcher turns a verified principal into a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpersonationMode {
    /// Delegated identity under the login identity's authority
    Proxied,
    /// Caller recorded for bookkeeping, call runs as the login identity
    Advisory,
}

impl ImpersonationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ImpersonationMode::Proxied => "proxied",
            ImpersonationMode::Advisory => "advisory",
        }
    }
}

impl FromStr for ImpersonationMode {
    type Err = String;

    /// Strict: there is no fallback mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proxied" | "proxy" => Ok(ImpersonationMode::Proxied),
            "advisory" => Ok(ImpersonationMode::Advisory),
            other => Err(format!(
                "unknown impersonation mode '{}', expected 'proxied' or 'advisory'",
                other
            )),
        }
    }
}

impl fmt::Display for ImpersonationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct ImpersonationContext {
    mode: ImpersonationMode,
    session_id: SessionId,
    principal: Principal,
    remote_user: ShortName,
    login: Arc<LoginIdentity>,
    resources: ResourceScope,
}

impl ImpersonationContext {
    /// Delegated context. Proxy authorization must already have passed.
    pub fn proxied(
        session_id: SessionId,
        principal: Principal,
        remote_user: ShortName,
        login: Arc<LoginIdentity>,
    ) -> Self {
        Self::build(ImpersonationMode::Proxied, session_id, principal, remote_user, login)
    }

    pub fn advisory(
        session_id: SessionId,
        principal: Principal,
        remote_user: ShortName,
        login: Arc<LoginIdentity>,
    ) -> Self {
        Self::build(ImpersonationMode::Advisory, session_id, principal, remote_user, login)
    }

    fn build(
        mode: ImpersonationMode,
        session_id: SessionId,
        principal: Principal,
        remote_user: ShortName,
        login: Arc<LoginIdentity>,
    ) -> Self {
        Self {
            mode,
            session_id,
            principal,
            remote_user,
            login,
            resources: ResourceScope::new(),
        }
    }

    pub fn mode(&self) -> ImpersonationMode {
        self.mode
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The caller's full verified principal.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The caller's short name, whatever the mode.
    pub fn remote_user(&self) -> &ShortName {
        &self.remote_user
    }

    /// Identity that resource acquisitions are performed as.
    pub fn effective_user(&self) -> &ShortName {
        match self.mode {
            ImpersonationMode::Proxied => &self.remote_user,
            ImpersonationMode::Advisory => self.login.short_name(),
        }
    }

    /// The login identity whose authority the call runs under.
    pub fn real_user(&self) -> &LoginIdentity {
        &self.login
    }

    pub fn resources(&self) -> &ResourceScope {
        &self.resources
    }

    /// Release every resource acquired under this context.
    pub fn release(&self) -> Vec<CleanupWarning> {
        self.resources.release_all(self.effective_user().as_str())
    }

    /// Run `fut` with `self` as the current context.
    pub async fn scope<F: Future>(self: Arc<Self>, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Context of the call currently executing on this task, if any.
    pub fn current() -> Option<Arc<ImpersonationContext>> {
        CURRENT.try_with(Arc::clone).ok()
    }
}

impl fmt::Display for ImpersonationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ImpersonationMode::Proxied => write!(
                f,
                "{} (auth:PROXY) via {}",
                self.remote_user,
                self.login.principal()
            ),
            ImpersonationMode::Advisory => write!(
                f,
                "{} (auth:ADVISORY for {})",
                self.login.principal(),
                self.remote_user
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keytab::Keytab;

    fn login() -> Arc<LoginIdentity> {
        let principal = Principal::new("runas/host@EXAMPLE.COM");
        let keytab = Keytab::from_entries([(principal.clone(), vec![1u8; 32])]).unwrap();
        Arc::new(LoginIdentity::new(principal, Arc::new(keytab)).unwrap())
    }

    fn context(mode: ImpersonationMode) -> ImpersonationContext {
        let principal = Principal::new("alice/laptop@EXAMPLE.COM");
        let short = principal.short_name().unwrap();
        match mode {
            ImpersonationMode::Proxied => {
                ImpersonationContext::proxied(SessionId::generate(), principal, short, login())
            }
            ImpersonationMode::Advisory => {
                ImpersonationContext::advisory(SessionId::generate(), principal, short, login())
            }
        }
    }

    #[test]
    fn test_mode_parsing_is_strict() {
        assert_eq!("Proxied".parse::<ImpersonationMode>(), Ok(ImpersonationMode::Proxied));
        assert_eq!(" advisory ".parse::<ImpersonationMode>(), Ok(ImpersonationMode::Advisory));
        assert!("".parse::<ImpersonationMode>().is_err());
        assert!("high".parse::<ImpersonationMode>().is_err());
    }

    #[test]
    fn test_effective_user_by_mode() {
        let proxied = context(ImpersonationMode::Proxied);
        assert_eq!(proxied.effective_user().as_str(), "alice");

        let advisory = context(ImpersonationMode::Advisory);
        assert_eq!(advisory.effective_user().as_str(), "runas");
        assert_eq!(advisory.remote_user().as_str(), "alice");
    }

    #[tokio::test]
    async fn test_current_only_inside_scope() {
        let ctx = Arc::new(context(ImpersonationMode::Proxied));
        assert!(ImpersonationContext::current().is_none());

        let seen = Arc::clone(&ctx)
            .scope(async {
                ImpersonationContext::current().map(|c| c.effective_user().to_string())
            })
            .await;

        assert_eq!(seen.as_deref(), Some("alice"));
        assert!(ImpersonationContext::current().is_none());
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit_context() {
        let ctx = Arc::new(context(ImpersonationMode::Proxied));
        let leaked = ctx
            .scope(async {
                tokio::spawn(async { ImpersonationContext::current().is_some() })
                    .await
                    .unwrap()
            })
            .await;
        assert!(!leaked);
    }
}
