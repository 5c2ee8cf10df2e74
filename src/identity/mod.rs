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

//! Identity bookkeeping.
//!
//! Login identities, per-call impersonation contexts, the resources acquired
//! under them, and the policy deciding who may impersonate whom.

pub mod context;
pub mod keytab;
pub mod login;
pub mod proxy;
pub mod resources;

pub use context::{ImpersonationContext, ImpersonationMode};
pub use login::LoginIdentity;
