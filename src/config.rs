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

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine_core::constants::{config as keys, defaults};
use crate::engine_core::errors::ServiceError;
use crate::identity::context::ImpersonationMode;

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ServiceError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ServiceError::Configuration(format!("{}: {}", name, e))),
        _ => Ok(None),
    }
}

fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn missing(what: &str, env_name: &str, flag: &str) -> ServiceError {
    ServiceError::Configuration(format!("{} is required (set {} or pass {})", what, env_name, flag))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub principal: Option<String>,
    pub keytab: Option<PathBuf>,
    /// No default: the operator must pick one
    pub impersonation_mode: Option<ImpersonationMode>,
    pub fs_root: PathBuf,
    pub max_workers: usize,
    pub handshake_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub proxy_policy: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let base = Self::default();
        Ok(Self {
            bind_addr: lookup(keys::ENV_BIND_ADDR).unwrap_or(base.bind_addr),
            port: parse_var(&lookup, keys::ENV_PORT)?.unwrap_or(base.port),
            principal: lookup(keys::ENV_PRINCIPAL),
            keytab: lookup(keys::ENV_KEYTAB).map(PathBuf::from),
            impersonation_mode: parse_var(&lookup, keys::ENV_IMPERSONATION_MODE)?,
            fs_root: lookup(keys::ENV_FS_ROOT)
                .map(PathBuf::from)
                .unwrap_or(base.fs_root),
            max_workers: parse_var(&lookup, keys::ENV_MAX_WORKERS)?.unwrap_or(base.max_workers),
            handshake_timeout_secs: parse_var(&lookup, keys::ENV_HANDSHAKE_TIMEOUT_SECS)?
                .unwrap_or(base.handshake_timeout_secs),
            idle_timeout_secs: parse_var(&lookup, keys::ENV_IDLE_TIMEOUT_SECS)?
                .unwrap_or(base.idle_timeout_secs),
            proxy_policy: lookup(keys::ENV_PROXY_POLICY).map(PathBuf::from),
            log_level: lookup(keys::ENV_LOG_LEVEL).unwrap_or(base.log_level),
            log_format: lookup(keys::ENV_LOG_FORMAT).unwrap_or(base.log_format),
        })
    }

    pub fn mode(&self) -> Result<ImpersonationMode, ServiceError> {
        self.impersonation_mode
            .ok_or_else(|| missing("Impersonation mode", keys::ENV_IMPERSONATION_MODE, "--mode"))
    }

    pub fn principal(&self) -> Result<&str, ServiceError> {
        self.principal
            .as_deref()
            .ok_or_else(|| missing("Server principal", keys::ENV_PRINCIPAL, "--principal"))
    }

    pub fn keytab(&self) -> Result<&PathBuf, ServiceError> {
        self.keytab
            .as_ref()
            .ok_or_else(|| missing("Keytab", keys::ENV_KEYTAB, "--keytab"))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// How long an authenticated connection may sit between calls.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Everything a server needs before it may bind.
    pub fn validate(&self) -> Result<(), ServiceError> {
        self.mode()?;
        self.principal()?;
        self.keytab()?;
        if self.max_workers == 0 {
            return Err(ServiceError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ServiceError::Configuration(
                "handshake timeout must be at least 1 second".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ServiceError::Configuration(
                "idle timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::BIND_ADDR.to_string(),
            port: defaults::PORT,
            principal: None,
            keytab: None,
            impersonation_mode: None,
            fs_root: PathBuf::from(defaults::FS_ROOT),
            max_workers: defaults::MAX_WORKERS,
            handshake_timeout_secs: defaults::HANDSHAKE_TIMEOUT_SECS,
            idle_timeout_secs: defaults::IDLE_TIMEOUT_SECS,
            proxy_policy: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_host: Option<String>,
    pub port: u16,
    pub service_primary: Option<String>,
    /// Defaults to the server host
    pub service_instance: Option<String>,
    pub principal: Option<String>,
    pub keytab: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let base = Self::default();
        Ok(Self {
            server_host: lookup(keys::ENV_SERVER_HOST),
            port: parse_var(&lookup, keys::ENV_PORT)?.unwrap_or(base.port),
            service_primary: lookup(keys::ENV_SERVICE_PRIMARY),
            service_instance: lookup(keys::ENV_SERVICE_INSTANCE),
            principal: lookup(keys::ENV_CLIENT_PRINCIPAL),
            keytab: lookup(keys::ENV_CLIENT_KEYTAB).map(PathBuf::from),
            // The client logs quietly unless asked
            log_level: lookup(keys::ENV_LOG_LEVEL).unwrap_or(base.log_level),
            log_format: lookup(keys::ENV_LOG_FORMAT).unwrap_or(base.log_format),
        })
    }

    pub fn server_host(&self) -> Result<&str, ServiceError> {
        self.server_host
            .as_deref()
            .ok_or_else(|| missing("Server host", keys::ENV_SERVER_HOST, "--host"))
    }

    pub fn service_primary(&self) -> Result<&str, ServiceError> {
        self.service_primary
            .as_deref()
            .ok_or_else(|| missing("Service primary", keys::ENV_SERVICE_PRIMARY, "--service-primary"))
    }

    pub fn service_instance(&self) -> Result<&str, ServiceError> {
        match self.service_instance.as_deref() {
            Some(instance) => Ok(instance),
            None => self.server_host(),
        }
    }

    pub fn keytab(&self) -> Result<&PathBuf, ServiceError> {
        self.keytab
            .as_ref()
            .ok_or_else(|| missing("Client keytab", keys::ENV_CLIENT_KEYTAB, "--keytab"))
    }

    pub fn server_addr(&self) -> Result<String, ServiceError> {
        Ok(format!("{}:{}", self.server_host()?, self.port))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: None,
            port: defaults::PORT,
            service_primary: None,
            service_instance: None,
            principal: None,
            keytab: None,
            log_level: "warn".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_server_defaults() {
        let cfg = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 7911);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:7911");
        assert_eq!(cfg.max_workers, defaults::MAX_WORKERS);
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(defaults::IDLE_TIMEOUT_SECS));
        assert!(cfg.impersonation_mode.is_none());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_server_from_env_values() {
        let cfg = ServerConfig::from_lookup(lookup(&[
            (keys::ENV_PORT, "9000"),
            (keys::ENV_PRINCIPAL, "runas/_HOST@EXAMPLE.COM"),
            (keys::ENV_KEYTAB, "/etc/runas.keytab"),
            (keys::ENV_IMPERSONATION_MODE, "advisory"),
            (keys::ENV_MAX_WORKERS, "4"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.mode().unwrap(), ImpersonationMode::Advisory);
        assert_eq!(cfg.max_workers, 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[(keys::ENV_IMPERSONATION_MODE, "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains(keys::ENV_IMPERSONATION_MODE));

        let err = ServerConfig::from_lookup(lookup(&[(keys::ENV_PORT, "many")])).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_client_instance_defaults_to_host() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            (keys::ENV_SERVER_HOST, "node1.example.com"),
            (keys::ENV_SERVICE_PRIMARY, "runas"),
        ]))
        .unwrap();
        assert_eq!(cfg.service_instance().unwrap(), "node1.example.com");
        assert_eq!(cfg.server_addr().unwrap(), "node1.example.com:7911");
        assert!(cfg.keytab().is_err());
    }
}
