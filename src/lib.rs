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

//! runas-rpc: RPC calls executed as the authenticated caller.
//!
//! A server authenticates each connection with a keytab-backed handshake,
//! then runs every call inside an impersonation context derived from the
//! caller's verified principal. Resources the handler acquires under that
//! context are released when the call ends, however it ends.

pub mod config;
pub mod engine_core;
pub mod identity;
pub mod rpc;
pub mod service;
pub mod transport;
pub mod utils;
