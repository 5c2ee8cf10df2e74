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

//! Proxy authorization: which users a login identity may impersonate, and
//! from which hosts.
//!
//! ```yaml
//! proxy_users:
//!   runas:
//!     users: ["alice", "bob"]
//!     hosts: ["10.0.0.5", "*"]
//! ```
//!
//! Fail-closed: a login identity without a rule may impersonate nobody.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info};

use crate::engine_core::errors::ServiceError;
use crate::engine_core::principal::ShortName;
use crate::identity::login::LoginIdentity;

const WILDCARD: &str = "*";

pub trait ProxyAuthorizer: Send + Sync {
    /// `Err` carries the denial reason reported to the caller.
    fn authorize(
        &self,
        real_user: &LoginIdentity,
        user: &ShortName,
        remote: Option<IpAddr>,
    ) -> Result<(), String>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyRule {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl ProxyRule {
    fn allows_user(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == WILDCARD || u == user)
    }

    fn allows_host(&self, remote: Option<IpAddr>) -> bool {
        self.hosts.iter().any(|h| {
            h == WILDCARD
                || match (h.parse::<IpAddr>(), remote) {
                    (Ok(allowed), Some(addr)) => allowed == canonical(addr),
                    _ => false,
                }
        })
    }
}

/// IPv4-mapped IPv6 peers compare equal to their IPv4 form.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(addr),
        v4 => v4,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyUserPolicy {
    #[serde(default)]
    proxy_users: HashMap<String, ProxyRule>,
}

impl ProxyUserPolicy {
    /// Empty policy, every delegation is denied.
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Configuration(format!(
                "Failed to read proxy policy {}: {}",
                path.display(),
                e
            ))
        })?;
        let policy = Self::from_yaml(&content)?;
        info!(
            "Loaded proxy policy from {} ({} rules)",
            path.display(),
            policy.proxy_users.len()
        );
        Ok(policy)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ServiceError> {
        let policy: Self = serde_yaml_ng::from_str(content)
            .map_err(|e| ServiceError::Configuration(format!("Invalid proxy policy: {}", e)))?;
        for (real, rule) in &policy.proxy_users {
            for host in &rule.hosts {
                if host != WILDCARD && host.parse::<IpAddr>().is_err() {
                    return Err(ServiceError::Configuration(format!(
                        "Proxy rule for '{}' has invalid host '{}': expected an IP address or '*'",
                        real, host
                    )));
                }
            }
        }
        Ok(policy)
    }

    pub fn with_rule(mut self, real_user: &str, rule: ProxyRule) -> Self {
        self.proxy_users.insert(real_user.to_string(), rule);
        self
    }
}

impl ProxyAuthorizer for ProxyUserPolicy {
    fn authorize(
        &self,
        real_user: &LoginIdentity,
        user: &ShortName,
        remote: Option<IpAddr>,
    ) -> Result<(), String> {
        let real = real_user.short_name().as_str();
        let rule = self
            .proxy_users
            .get(real)
            .ok_or_else(|| format!("'{}' is not configured as a proxy user", real))?;

        if !rule.allows_user(user.as_str()) {
            return Err(format!("'{}' is not allowed to impersonate '{}'", real, user));
        }
        if !rule.allows_host(remote) {
            let host = remote.map_or_else(|| "unknown".to_string(), |a| a.to_string());
            return Err(format!("Unauthorized connection for super-user '{}' from {}", real, host));
        }

        debug!("Proxy authorization granted: {} -> {}", real, user);
        Ok(())
    }
}
