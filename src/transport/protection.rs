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

//! `auth-conf` frame protection.
//!
//! After the handshake each direction gets its own ChaCha20-Poly1305 key,
//! derived with HKDF-SHA256 from the shared principal key and both nonces.
//! The AEAD nonce is the per-direction frame counter, so a replayed,
//! reordered or dropped frame fails to open.

use bytes::Bytes;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::hkdf;

use crate::engine_core::constants::sasl;
use crate::engine_core::errors::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

struct Direction {
    key: LessSafeKey,
    counter: u64,
}

impl Direction {
    fn derive(prk: &hkdf::Prk, label: &'static [u8]) -> Result<Self, TransportError> {
        let info = [label];
        let okm = prk
            .expand(&info, &aead::CHACHA20_POLY1305)
            .map_err(|_| TransportError::Handshake("key derivation failed".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(UnboundKey::from(okm)),
            counter: 0,
        })
    }

    fn next_nonce(&mut self) -> Result<Nonce, TransportError> {
        let mut nonce = [0u8; aead::NONCE_LEN];
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter = self.counter.checked_add(1).ok_or(TransportError::Protection)?;
        Ok(Nonce::assume_unique_for_key(nonce))
    }
}

/// Sealing and opening state of one authenticated connection.
pub struct SecurityLayer {
    outbound: Direction,
    inbound: Direction,
}

impl SecurityLayer {
    pub fn derive(
        side: Side,
        shared_key: &[u8],
        server_nonce: &[u8],
        client_nonce: &[u8],
    ) -> Result<Self, TransportError> {
        let mut salt = Vec::with_capacity(server_nonce.len() + client_nonce.len());
        salt.extend_from_slice(server_nonce);
        salt.extend_from_slice(client_nonce);
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &salt).extract(shared_key);

        let c2s = Direction::derive(&prk, sasl::LABEL_CLIENT_TO_SERVER)?;
        let s2c = Direction::derive(&prk, sasl::LABEL_SERVER_TO_CLIENT)?;
        let (outbound, inbound) = match side {
            Side::Client => (c2s, s2c),
            Side::Server => (s2c, c2s),
        };
        Ok(Self { outbound, inbound })
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Bytes, TransportError> {
        let nonce = self.outbound.next_nonce()?;
        let mut buf = plaintext.to_vec();
        self.outbound
            .key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut buf)
            .map_err(|_| TransportError::Protection)?;
        Ok(Bytes::from(buf))
    }

    pub fn open(&mut self, frame: &[u8]) -> Result<Bytes, TransportError> {
        let nonce = self.inbound.next_nonce()?;
        let mut buf = frame.to_vec();
        let plaintext = self
            .inbound
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| TransportError::Protection)?;
        Ok(Bytes::copy_from_slice(plaintext))
    }
}

impl std::fmt::Debug for SecurityLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityLayer")
            .field("sent", &self.outbound.counter)
            .field("received", &self.inbound.counter)
            .finish()
    }
}
