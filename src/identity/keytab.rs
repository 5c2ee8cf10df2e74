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

//! Keytab: principal/secret pairs loaded from YAML.
//!
//! ```yaml
//! entries:
//!   - principal: alice@EXAMPLE.COM
//!     key: 00112233445566778899aabbccddeeff
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::engine_core::constants::sasl;
use crate::engine_core::errors::IdentityError;
use crate::engine_core::principal::Principal;

#[derive(Deserialize)]
struct KeytabFile {
    #[serde(default)]
    entries: Vec<KeytabFileEntry>,
}

#[derive(Deserialize)]
struct KeytabFileEntry {
    principal: String,
    key: String,
}

/// Shared secret of one principal. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<{} bytes redacted>)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct Keytab {
    source: Option<PathBuf>,
    entries: HashMap<Principal, SecretKey>,
}

impl Keytab {
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let content = std::fs::read_to_string(path).map_err(|source| IdentityError::KeytabRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut keytab = Self::from_yaml(&content).map_err(|e| match e {
            IdentityError::KeytabInvalid { reason, .. } => IdentityError::KeytabInvalid {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        keytab.source = Some(path.to_path_buf());
        debug!("Loaded {} keytab entries from {}", keytab.len(), path.display());
        Ok(keytab)
    }

    pub fn from_yaml(content: &str) -> Result<Self, IdentityError> {
        let invalid = |reason: String| IdentityError::KeytabInvalid {
            path: PathBuf::from("<inline>"),
            reason,
        };

        let file: KeytabFile = serde_yaml_ng::from_str(content).map_err(|e| invalid(e.to_string()))?;
        let mut pairs = Vec::with_capacity(file.entries.len());
        for entry in file.entries {
            let key = hex::decode(entry.key.trim())
                .map_err(|e| invalid(format!("key for {} is not hex: {}", entry.principal, e)))?;
            pairs.push((Principal::new(entry.principal), key));
        }
        Self::from_entries(pairs)
    }

    pub fn from_entries<I>(entries: I) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = (Principal, Vec<u8>)>,
    {
        let mut map = HashMap::new();
        for (principal, key) in entries {
            if key.len() < sasl::MIN_KEY_LENGTH {
                return Err(IdentityError::KeytabInvalid {
                    path: PathBuf::from("<inline>"),
                    reason: format!(
                        "key for {} is {} bytes, need at least {}",
                        principal,
                        key.len(),
                        sasl::MIN_KEY_LENGTH
                    ),
                });
            }
            map.insert(principal, SecretKey(key));
        }
        Ok(Self {
            source: None,
            entries: map,
        })
    }

    pub fn key_for(&self, principal: &Principal) -> Option<&SecretKey> {
        self.entries.get(principal)
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.entries.keys()
    }

    /// The only principal in the keytab, for callers that did not name one.
    pub fn default_principal(&self) -> Result<&Principal, IdentityError> {
        let mut iter = self.entries.keys();
        match (iter.next(), iter.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(IdentityError::AmbiguousPrincipal(self.entries.len())),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY: &str = "00112233445566778899aabbccddeeff";

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "entries:\n  - principal: alice@EXAMPLE.COM\n    key: {KEY}\n  - principal: runas/host@EXAMPLE.COM\n    key: {KEY}{KEY}"
        )
        .unwrap();

        let keytab = Keytab::load(file.path()).unwrap();
        assert_eq!(keytab.len(), 2);
        assert_eq!(keytab.source(), Some(file.path()));
        assert_eq!(
            keytab
                .key_for(&Principal::new("runas/host@EXAMPLE.COM"))
                .unwrap()
                .as_bytes()
                .len(),
            32
        );
        assert!(matches!(
            keytab.default_principal(),
            Err(IdentityError::AmbiguousPrincipal(2))
        ));
    }

    #[test]
    fn test_short_keys_rejected() {
        let err = Keytab::from_yaml("entries:\n  - principal: a@B\n    key: 0011\n").unwrap_err();
        assert!(matches!(err, IdentityError::KeytabInvalid { .. }));
    }

    #[test]
    fn test_non_hex_key_rejected() {
        let err = Keytab::from_yaml("entries:\n  - principal: a@B\n    key: not-hex\n").unwrap_err();
        assert!(err.to_string().contains("not hex"));
    }

    #[test]
    fn test_missing_file() {
        let err = Keytab::load(Path::new("/nonexistent/runas.keytab")).unwrap_err();
        assert!(matches!(err, IdentityError::KeytabRead { .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keytab = Keytab::from_yaml(&format!(
            "entries:\n  - principal: alice@EXAMPLE.COM\n    key: {KEY}\n"
        ))
        .unwrap();
        let printed = format!("{:?}", keytab);
        assert!(!printed.contains(KEY));
        assert_eq!(
            keytab.default_principal().unwrap().as_str(),
            "alice@EXAMPLE.COM"
        );
    }
}
