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

//! runas-rpc Constants - Single source of truth for all configuration values.
//!
//! This module centralizes error codes, defaults, environment variable names
//! and transport limits so the server, client and tests agree on them.

/// JSON-RPC 2.0 Error Codes
pub mod rpc {
    /// Wrong transport type reached the dispatcher (custom code)
    pub const ERROR_PROTOCOL_MISMATCH: i32 = -32010;
    /// No verified principal bound to the session (custom code)
    pub const ERROR_UNAUTHENTICATED: i32 = -32011;
    /// Principal could not be reduced to a short name (custom code)
    pub const ERROR_MALFORMED_PRINCIPAL: i32 = -32012;
    /// Proxy authorization refused the delegation (custom code)
    pub const ERROR_IMPERSONATION_DENIED: i32 = -32013;
    /// Handler: path or object does not exist (custom code)
    pub const ERROR_NOT_FOUND: i32 = -32020;
    /// Handler: argument rejected (custom code)
    pub const ERROR_INVALID_ARGUMENT: i32 = -32021;
    /// Handler: underlying I/O failed (custom code)
    pub const ERROR_IO_FAILURE: i32 = -32022;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;

    pub const VERSION: &str = "2.0";
}

/// RPC operation names
pub mod methods {
    pub const LIST: &str = "list";
}

/// Security negotiation
pub mod sasl {
    /// The only mechanism the reference handshake speaks
    pub const MECHANISM: &str = "KEYTAB-HMAC-SHA256";
    /// Quality of protection: integrity + confidentiality
    pub const QOP_AUTH_CONF: &str = "auth-conf";
    /// Placeholder replaced by the canonical local hostname in server principals
    pub const HOST_PLACEHOLDER: &str = "_HOST";
    /// Nonce length in bytes for both handshake sides
    pub const NONCE_LENGTH: usize = 32;
    /// Minimum keytab secret length in bytes
    pub const MIN_KEY_LENGTH: usize = 16;
    pub const LABEL_CLIENT_PROOF: &[u8] = b"runas client proof";
    pub const LABEL_SERVER_PROOF: &[u8] = b"runas server proof";
    pub const LABEL_CLIENT_TO_SERVER: &[u8] = b"runas c2s";
    pub const LABEL_SERVER_TO_CLIENT: &[u8] = b"runas s2c";
}

/// Server and client defaults
pub mod defaults {
    /// Well-known service port
    pub const PORT: u16 = 7911;
    pub const BIND_ADDR: &str = "0.0.0.0";
    pub const FS_ROOT: &str = "/";
    pub const MAX_WORKERS: usize = 64;
    pub const HANDSHAKE_TIMEOUT_SECS: u64 = 30;
    /// Silence allowed between calls on an established connection
    pub const IDLE_TIMEOUT_SECS: u64 = 300;
    pub const LIST_PATH: &str = "/";
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_BIND_ADDR: &str = "RUNAS_BIND_ADDR";
    pub const ENV_PORT: &str = "RUNAS_PORT";
    pub const ENV_PRINCIPAL: &str = "RUNAS_PRINCIPAL";
    pub const ENV_KEYTAB: &str = "RUNAS_KEYTAB";
    pub const ENV_IMPERSONATION_MODE: &str = "RUNAS_IMPERSONATION_MODE";
    pub const ENV_FS_ROOT: &str = "RUNAS_FS_ROOT";
    pub const ENV_MAX_WORKERS: &str = "RUNAS_MAX_WORKERS";
    pub const ENV_HANDSHAKE_TIMEOUT_SECS: &str = "RUNAS_HANDSHAKE_TIMEOUT_SECS";
    pub const ENV_IDLE_TIMEOUT_SECS: &str = "RUNAS_IDLE_TIMEOUT_SECS";
    pub const ENV_PROXY_POLICY: &str = "RUNAS_PROXY_POLICY";
    pub const ENV_SERVER_HOST: &str = "RUNAS_SERVER_HOST";
    pub const ENV_SERVICE_PRIMARY: &str = "RUNAS_SERVICE_PRIMARY";
    pub const ENV_SERVICE_INSTANCE: &str = "RUNAS_SERVICE_INSTANCE";
    pub const ENV_CLIENT_PRINCIPAL: &str = "RUNAS_CLIENT_PRINCIPAL";
    pub const ENV_CLIENT_KEYTAB: &str = "RUNAS_CLIENT_KEYTAB";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed frame body size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    /// Maximum size of a frame header block
    pub const MAX_HEADER_SIZE_BYTES: usize = 4096;
}
