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

//! The process's own login identity.
//!
//! A `LoginIdentity` is built once at startup and passed around as an
//! `Arc`. Code that must run "as" the login identity enters
//! [`LoginIdentity::scope`]; code that needs the identity of whoever is
//! running reads [`LoginIdentity::current`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::engine_core::constants::sasl;
use crate::engine_core::errors::IdentityError;
use crate::engine_core::principal::{Principal, ShortName};
use crate::identity::keytab::{Keytab, SecretKey};

tokio::task_local! {
    static LOGIN: Arc<LoginIdentity>;
}

#[derive(Debug)]
pub struct LoginIdentity {
    principal: Principal,
    short_name: ShortName,
    key: SecretKey,
    keytab: Arc<Keytab>,
}

impl LoginIdentity {
    /// Establish an identity from a keytab that must hold `principal`.
    pub fn new(principal: Principal, keytab: Arc<Keytab>) -> Result<Self, IdentityError> {
        let short_name = principal.short_name()?;
        let key = keytab
            .key_for(&principal)
            .cloned()
            .ok_or_else(|| IdentityError::MissingPrincipal(principal.to_string()))?;
        Ok(Self {
            principal,
            short_name,
            key,
            keytab,
        })
    }

    /// Server login: expands `_HOST` to the local canonical hostname.
    pub fn login_from_keytab(principal: &str, keytab_path: &Path) -> Result<Self, IdentityError> {
        let principal = if principal.contains(sasl::HOST_PLACEHOLDER) {
            expand_host_placeholder(principal, &local_canonical_hostname()?)
        } else {
            principal.to_string()
        };
        let keytab = Arc::new(Keytab::load(keytab_path)?);
        let identity = Self::new(Principal::new(principal), keytab)?;
        info!(
            "Logged in as {} using keytab {}",
            identity.principal,
            keytab_path.display()
        );
        Ok(identity)
    }

    /// Client login: with no principal given, the keytab must hold exactly one.
    pub fn login_default(principal: Option<&str>, keytab_path: &Path) -> Result<Self, IdentityError> {
        let keytab = Arc::new(Keytab::load(keytab_path)?);
        let principal = match principal {
            Some(p) => Principal::new(p),
            None => keytab.default_principal()?.clone(),
        };
        Self::new(principal, keytab)
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn short_name(&self) -> &ShortName {
        &self.short_name
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    /// Credential store this identity was established from. On the server it
    /// doubles as the verifier database for incoming handshakes.
    pub fn keytab(&self) -> &Keytab {
        &self.keytab
    }

    /// Run `fut` with this identity as the active login identity.
    pub async fn scope<F: Future>(self: &Arc<Self>, fut: F) -> F::Output {
        LOGIN.scope(Arc::clone(self), fut).await
    }

    /// The login identity of the enclosing [`LoginIdentity::scope`], if any.
    pub fn current() -> Option<Arc<LoginIdentity>> {
        LOGIN.try_with(Arc::clone).ok()
    }
}

/// Replace `_HOST` in the instance component with a lower-cased hostname.
pub fn expand_host_placeholder(principal: &str, hostname: &str) -> String {
    let (name, realm) = match principal.split_once('@') {
        Some((name, realm)) => (name, Some(realm)),
        None => (principal, None),
    };
    let name = match name.split_once('/') {
        Some((primary, instance)) if instance == sasl::HOST_PLACEHOLDER => {
            format!("{}/{}", primary, hostname.to_lowercase())
        }
        _ => name.to_string(),
    };
    match realm {
        Some(realm) => format!("{}@{}", name, realm),
        None => name,
    }
}

pub fn local_canonical_hostname() -> Result<String, IdentityError> {
    whoami::fallible::hostname()
        .map(|h| h.to_lowercase())
        .map_err(|e| IdentityError::Hostname(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keytab_for(principals: &[&str]) -> Arc<Keytab> {
        Arc::new(
            Keytab::from_entries(
                principals
                    .iter()
                    .map(|p| (Principal::new(*p), vec![7u8; 32])),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_host_expansion() {
        assert_eq!(
            expand_host_placeholder("runas/_HOST@EXAMPLE.COM", "Node1.Example.com"),
            "runas/node1.example.com@EXAMPLE.COM"
        );
        assert_eq!(
            expand_host_placeholder("alice@EXAMPLE.COM", "node1"),
            "alice@EXAMPLE.COM"
        );
    }

    #[test]
    fn test_login_requires_keytab_entry() {
        let keytab = keytab_for(&["alice@EXAMPLE.COM"]);
        let err = LoginIdentity::new(Principal::new("bob@EXAMPLE.COM"), keytab).unwrap_err();
        assert!(matches!(err, IdentityError::MissingPrincipal(_)));
    }

    #[test]
    fn test_login_rejects_malformed_principal() {
        let keytab = keytab_for(&["alice"]);
        let err = LoginIdentity::new(Principal::new("alice"), keytab).unwrap_err();
        assert!(matches!(err, IdentityError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_scope_sets_current_identity() {
        let login = Arc::new(
            LoginIdentity::new(
                Principal::new("alice@EXAMPLE.COM"),
                keytab_for(&["alice@EXAMPLE.COM"]),
            )
            .unwrap(),
        );

        assert!(LoginIdentity::current().is_none());
        let inside = login
            .scope(async { LoginIdentity::current().map(|l| l.short_name().to_string()) })
            .await;
        assert_eq!(inside.as_deref(), Some("alice"));
        assert!(LoginIdentity::current().is_none());
    }
}
