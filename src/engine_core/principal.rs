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

//! Authenticated principals and their short names.
//!
//! A [`Principal`] is an opaque string handed over by the authentication
//! mechanism. It is only parsed when a short name is needed, so a malformed
//! principal fails the call that needs it rather than the handshake.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine_core::errors::MalformedPrincipalError;

/// Verified identity string of the form `primary[/instance]@realm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

/// The parsed pieces of a well-formed principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalParts<'a> {
    pub primary: &'a str,
    pub instance: Option<&'a str>,
    pub realm: &'a str,
}

impl Principal {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> Result<PrincipalParts<'_>, MalformedPrincipalError> {
        let malformed = |reason| MalformedPrincipalError {
            principal: self.0.clone(),
            reason,
        };

        if self.0.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(malformed("contains whitespace or control characters"));
        }

        let (name, realm) = self
            .0
            .split_once('@')
            .ok_or_else(|| malformed("missing @realm"))?;
        if realm.is_empty() {
            return Err(malformed("empty realm"));
        }
        if realm.contains('@') {
            return Err(malformed("more than one '@'"));
        }

        let (primary, instance) = match name.split_once('/') {
            Some((primary, instance)) => {
                if instance.is_empty() {
                    return Err(malformed("empty instance"));
                }
                if instance.contains('/') {
                    return Err(malformed("more than one '/'"));
                }
                (primary, Some(instance))
            }
            None => (name, None),
        };
        if primary.is_empty() {
            return Err(malformed("empty primary"));
        }

        Ok(PrincipalParts {
            primary,
            instance,
            realm,
        })
    }

    /// Strip `/instance` and `@realm`.
    pub fn short_name(&self) -> Result<ShortName, MalformedPrincipalError> {
        self.parts().map(|p| ShortName(p.primary.to_string()))
    }

    /// `primary/instance` (or just `primary`), the service name a client asks for.
    pub fn service_name(&self) -> Result<String, MalformedPrincipalError> {
        let p = self.parts()?;
        Ok(match p.instance {
            Some(instance) => format!("{}/{}", p.primary, instance),
            None => p.primary.to_string(),
        })
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bare user component of a principal, used for impersonation and logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortName(String);

impl ShortName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_strips_instance_and_realm() {
        let p = Principal::new("accumulo/node1.example.com@EXAMPLE.COM");
        assert_eq!(p.short_name().unwrap().as_str(), "accumulo");
        assert_eq!(p.service_name().unwrap(), "accumulo/node1.example.com");

        let user = Principal::new("alice@EXAMPLE.COM");
        assert_eq!(user.short_name().unwrap().as_str(), "alice");
        assert_eq!(user.parts().unwrap().instance, None);
    }

    #[test]
    fn test_malformed_principals() {
        for raw in [
            "alice",
            "alice@",
            "@EXAMPLE.COM",
            "/host@EXAMPLE.COM",
            "svc/@EXAMPLE.COM",
            "a/b/c@EXAMPLE.COM",
            "a@b@C",
            "al ice@EXAMPLE.COM",
            "",
        ] {
            let err = Principal::new(raw).short_name().unwrap_err();
            assert_eq!(err.principal, raw);
        }
    }

    #[test]
    fn test_missing_realm_reason() {
        let err = Principal::new("svc/host").short_name().unwrap_err();
        assert_eq!(err.reason, "missing @realm");
    }
}
