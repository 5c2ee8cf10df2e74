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

//! `KEYTAB-HMAC-SHA256` authenticated transports.
//!
//! Mutual challenge-response over the per-principal key both sides hold in
//! their keytabs:
//!
//! 1. client `initiate { mechanism, principal, service, qop }`
//! 2. server `challenge { server_nonce }`
//! 3. client `response { client_nonce, proof }`
//! 4. server `complete { qop, proof }`, or `rejected { reason }` at any step
//!
//! Proofs are HMAC-SHA256 over a role label, both nonces, the principal and
//! the service name. Once complete, every frame is sealed by a
//! [`SecurityLayer`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::engine_core::constants::sasl;
use crate::engine_core::errors::TransportError;
use crate::engine_core::models::SessionId;
use crate::engine_core::principal::Principal;
use crate::engine_core::traits::{AuthenticatedSession, ClientTransport, Transport};
use crate::identity::login::LoginIdentity;
use crate::transport::codec::FrameCodec;
use crate::transport::protection::{SecurityLayer, Side};

type HmacSha256 = Hmac<Sha256>;

/// Reason sent to clients for every server-side rejection.
const GENERIC_REJECTION: &str = "authentication failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    Initiate {
        mechanism: String,
        principal: Principal,
        service: String,
        qop: Vec<String>,
    },
    Challenge {
        server_nonce: String,
    },
    Response {
        client_nonce: String,
        proof: String,
    },
    Complete {
        qop: String,
        proof: String,
    },
    Rejected {
        reason: String,
    },
}

impl HandshakeMessage {
    fn name(&self) -> &'static str {
        match self {
            HandshakeMessage::Initiate { .. } => "initiate",
            HandshakeMessage::Challenge { .. } => "challenge",
            HandshakeMessage::Response { .. } => "response",
            HandshakeMessage::Complete { .. } => "complete",
            HandshakeMessage::Rejected { .. } => "rejected",
        }
    }
}

/// Inputs both proofs are computed over.
struct Transcript<'a> {
    server_nonce: &'a [u8],
    client_nonce: &'a [u8],
    principal: &'a Principal,
    service: &'a str,
}

impl Transcript<'_> {
    fn mac(&self, key: &[u8], label: &[u8]) -> Result<HmacSha256, TransportError> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        mac.update(label);
        mac.update(self.server_nonce);
        mac.update(self.client_nonce);
        mac.update(self.principal.as_str().as_bytes());
        mac.update(&[0]);
        mac.update(self.service.as_bytes());
        Ok(mac)
    }

    fn proof(&self, key: &[u8], label: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(self.mac(key, label)?.finalize().into_bytes().to_vec())
    }

    /// Constant-time comparison
    fn verify(&self, key: &[u8], label: &[u8], proof: &[u8]) -> Result<bool, TransportError> {
        Ok(self.mac(key, label)?.verify_slice(proof).is_ok())
    }
}

fn random_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; sasl::NONCE_LENGTH];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, String> {
    STANDARD
        .decode(value)
        .map_err(|e| format!("{} is not valid base64: {}", name, e))
}

async fn send_message<S>(
    framed: &mut Framed<S, FrameCodec>,
    message: &HandshakeMessage,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)?;
    framed.send(Bytes::from(body)).await
}

async fn recv_message<S>(framed: &mut Framed<S, FrameCodec>) -> Result<HandshakeMessage, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(frame) => {
            let frame = frame?;
            serde_json::from_slice(&frame)
                .map_err(|e| TransportError::Handshake(format!("Unreadable handshake message: {}", e)))
        }
        None => Err(TransportError::Closed),
    }
}

enum Failure {
    /// Refused by policy; the client is told only that authentication failed
    Reject(String),
    Transport(TransportError),
}

impl From<TransportError> for Failure {
    fn from(e: TransportError) -> Self {
        Failure::Transport(e)
    }
}

/// Run the server half of the handshake on a fresh connection.
///
/// Returns the verified client principal and the negotiated protection.
pub async fn server_handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    login: &LoginIdentity,
) -> Result<(Principal, SecurityLayer), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match negotiate_server(framed, login).await {
        Ok(outcome) => Ok(outcome),
        Err(Failure::Reject(reason)) => {
            warn!("Rejecting handshake: {}", reason);
            let rejected = HandshakeMessage::Rejected {
                reason: GENERIC_REJECTION.to_string(),
            };
            if let Err(e) = send_message(framed, &rejected).await {
                debug!("Could not deliver rejection: {}", e);
            }
            Err(TransportError::AuthenticationFailed(reason))
        }
        Err(Failure::Transport(e)) => Err(e),
    }
}

async fn negotiate_server<S>(
    framed: &mut Framed<S, FrameCodec>,
    login: &LoginIdentity,
) -> Result<(Principal, SecurityLayer), Failure>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let own_service = login
        .principal()
        .service_name()
        .map_err(|e| Failure::Transport(TransportError::Handshake(e.to_string())))?;

    let (principal, service, qop) = match recv_message(framed).await? {
        HandshakeMessage::Initiate {
            mechanism,
            principal,
            service,
            qop,
        } => {
            if mechanism != sasl::MECHANISM {
                return Err(Failure::Reject(format!("unsupported mechanism '{}'", mechanism)));
            }
            (principal, service, qop)
        }
        other => {
            return Err(Failure::Reject(format!(
                "expected initiate, got {}",
                other.name()
            )))
        }
    };
    if service != own_service {
        return Err(Failure::Reject(format!(
            "client asked for service '{}', this server is '{}'",
            service, own_service
        )));
    }
    if !qop.iter().any(|q| q == sasl::QOP_AUTH_CONF) {
        return Err(Failure::Reject(format!(
            "client does not offer qop '{}'",
            sasl::QOP_AUTH_CONF
        )));
    }
    let key = login
        .keytab()
        .key_for(&principal)
        .ok_or_else(|| Failure::Reject(format!("unknown principal '{}'", principal)))?
        .clone();

    let server_nonce = random_nonce();
    send_message(
        framed,
        &HandshakeMessage::Challenge {
            server_nonce: STANDARD.encode(&server_nonce),
        },
    )
    .await?;

    let (client_nonce, proof) = match recv_message(framed).await? {
        HandshakeMessage::Response {
            client_nonce,
            proof,
        } => (
            decode_field("client_nonce", &client_nonce).map_err(Failure::Reject)?,
            decode_field("proof", &proof).map_err(Failure::Reject)?,
        ),
        other => {
            return Err(Failure::Reject(format!(
                "expected response, got {}",
                other.name()
            )))
        }
    };
    if client_nonce.len() != sasl::NONCE_LENGTH {
        return Err(Failure::Reject(format!(
            "client nonce is {} bytes, expected {}",
            client_nonce.len(),
            sasl::NONCE_LENGTH
        )));
    }

    let transcript = Transcript {
        server_nonce: &server_nonce,
        client_nonce: &client_nonce,
        principal: &principal,
        service: &service,
    };
    if !transcript.verify(key.as_bytes(), sasl::LABEL_CLIENT_PROOF, &proof)? {
        return Err(Failure::Reject(format!("bad proof for '{}'", principal)));
    }

    let server_proof = transcript.proof(key.as_bytes(), sasl::LABEL_SERVER_PROOF)?;
    send_message(
        framed,
        &HandshakeMessage::Complete {
            qop: sasl::QOP_AUTH_CONF.to_string(),
            proof: STANDARD.encode(server_proof),
        },
    )
    .await?;

    let layer = SecurityLayer::derive(Side::Server, key.as_bytes(), &server_nonce, &client_nonce)?;
    Ok((principal, layer))
}

/// Run the client half of the handshake as `login` against `service`.
pub async fn client_handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    login: &LoginIdentity,
    service: &str,
) -> Result<SecurityLayer, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_message(
        framed,
        &HandshakeMessage::Initiate {
            mechanism: sasl::MECHANISM.to_string(),
            principal: login.principal().clone(),
            service: service.to_string(),
            qop: vec![sasl::QOP_AUTH_CONF.to_string()],
        },
    )
    .await?;

    let server_nonce = match recv_message(framed).await? {
        HandshakeMessage::Challenge { server_nonce } => {
            decode_field("server_nonce", &server_nonce).map_err(TransportError::Handshake)?
        }
        HandshakeMessage::Rejected { reason } => {
            return Err(TransportError::AuthenticationFailed(reason))
        }
        other => {
            return Err(TransportError::Handshake(format!(
                "expected challenge, got {}",
                other.name()
            )))
        }
    };

    let client_nonce = random_nonce();
    let transcript = Transcript {
        server_nonce: &server_nonce,
        client_nonce: &client_nonce,
        principal: login.principal(),
        service,
    };
    let key = login.key().as_bytes();
    send_message(
        framed,
        &HandshakeMessage::Response {
            client_nonce: STANDARD.encode(&client_nonce),
            proof: STANDARD.encode(transcript.proof(key, sasl::LABEL_CLIENT_PROOF)?),
        },
    )
    .await?;

    match recv_message(framed).await? {
        HandshakeMessage::Complete { qop, proof } => {
            if qop != sasl::QOP_AUTH_CONF {
                return Err(TransportError::Handshake(format!(
                    "server selected unsupported qop '{}'",
                    qop
                )));
            }
            let proof = decode_field("proof", &proof).map_err(TransportError::Handshake)?;
            if !transcript.verify(key, sasl::LABEL_SERVER_PROOF, &proof)? {
                return Err(TransportError::AuthenticationFailed(
                    "server failed to prove its identity".to_string(),
                ));
            }
        }
        HandshakeMessage::Rejected { reason } => {
            return Err(TransportError::AuthenticationFailed(reason))
        }
        other => {
            return Err(TransportError::Handshake(format!(
                "expected complete, got {}",
                other.name()
            )))
        }
    }

    SecurityLayer::derive(Side::Client, key, &server_nonce, &client_nonce)
}

/// Server end of an authenticated connection.
///
/// Only constructed by a completed handshake, so the principal is always
/// bound.
pub struct SaslServerTransport<S> {
    framed: Framed<S, FrameCodec>,
    layer: SecurityLayer,
    principal: Principal,
    peer_addr: Option<SocketAddr>,
    session_id: SessionId,
    established_at: DateTime<Utc>,
}

impl<S> SaslServerTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub async fn accept(
        stream: S,
        peer_addr: Option<SocketAddr>,
        login: &LoginIdentity,
    ) -> Result<Self, TransportError> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let (principal, layer) = server_handshake(&mut framed, login).await?;
        let session_id = SessionId::generate();
        info!(
            session_id = %session_id,
            principal = %principal,
            peer = ?peer_addr,
            "Handshake complete (qop={})",
            sasl::QOP_AUTH_CONF
        );
        Ok(Self {
            framed,
            layer,
            principal,
            peer_addr,
            session_id,
            established_at: Utc::now(),
        })
    }

    /// Next unsealed message, `None` once the peer hangs up.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.framed.next().await {
            Some(frame) => self.layer.open(&frame?).map(Some),
            None => Ok(None),
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let sealed = self.layer.seal(payload)?;
        self.framed.send(sealed).await
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// When the handshake completed.
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

impl<S> Transport for SaslServerTransport<S>
where
    S: Send + Sync,
{
    fn kind(&self) -> &'static str {
        "sasl"
    }

    fn as_authenticated(&self) -> Option<&dyn AuthenticatedSession> {
        Some(self)
    }
}

impl<S> AuthenticatedSession for SaslServerTransport<S>
where
    S: Send + Sync,
{
    fn handshake_complete(&self) -> bool {
        true
    }

    fn verified_principal(&self) -> Option<&Principal> {
        Some(&self.principal)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn session_id(&self) -> SessionId {
        self.session_id
    }
}

struct ClientSession {
    framed: Framed<TcpStream, FrameCodec>,
    layer: SecurityLayer,
}

/// Client end over TCP.
///
/// The credential is looked up from the ambient login identity when the
/// transport opens, so `open` must run inside [`LoginIdentity::scope`].
pub struct SaslClientTransport {
    addr: String,
    service: String,
    session: Option<ClientSession>,
}

impl SaslClientTransport {
    pub fn new(addr: impl Into<String>, service_primary: &str, service_instance: &str) -> Self {
        Self {
            addr: addr.into(),
            service: format!("{}/{}", service_primary, service_instance),
            session: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

#[async_trait]
impl ClientTransport for SaslClientTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }
        let login = LoginIdentity::current().ok_or(TransportError::NoLoginIdentity)?;
        let stream = TcpStream::connect(&self.addr).await?;
        let mut framed = Framed::new(stream, FrameCodec::new());
        let layer = client_handshake(&mut framed, &login, &self.service).await?;
        debug!("Authenticated to {} as {}", self.service, login.principal());
        self.session = Some(ClientSession { framed, layer });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.session.take() {
            Some(mut session) => session.framed.close().await,
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotOpen)?;
        let sealed = session.layer.seal(&payload)?;
        session.framed.send(sealed).await
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotOpen)?;
        match session.framed.next().await {
            Some(frame) => session.layer.open(&frame?),
            None => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keytab::Keytab;
    use std::sync::Arc;
    use tokio::io::{duplex, DuplexStream};

    const SERVER: &str = "runas/node1@EXAMPLE.COM";
    const CLIENT: &str = "alice/laptop@EXAMPLE.COM";

    fn identities(client_key: u8) -> (LoginIdentity, LoginIdentity) {
        let server_keytab = Arc::new(
            Keytab::from_entries([
                (Principal::new(SERVER), vec![1u8; 32]),
                (Principal::new(CLIENT), vec![2u8; 32]),
            ])
            .unwrap(),
        );
        let client_keytab =
            Arc::new(Keytab::from_entries([(Principal::new(CLIENT), vec![client_key; 32])]).unwrap());
        (
            LoginIdentity::new(Principal::new(SERVER), server_keytab).unwrap(),
            LoginIdentity::new(Principal::new(CLIENT), client_keytab).unwrap(),
        )
    }

    fn framed_pair() -> (Framed<DuplexStream, FrameCodec>, Framed<DuplexStream, FrameCodec>) {
        let (a, b) = duplex(64 * 1024);
        (
            Framed::new(a, FrameCodec::new()),
            Framed::new(b, FrameCodec::new()),
        )
    }

    #[tokio::test]
    async fn test_mutual_handshake_and_protected_exchange() {
        let (server_login, client_login) = identities(2);
        let (mut server_io, mut client_io) = framed_pair();

        let (server, client) = tokio::join!(
            server_handshake(&mut server_io, &server_login),
            client_handshake(&mut client_io, &client_login, "runas/node1"),
        );
        let (principal, mut server_layer) = server.unwrap();
        let mut client_layer = client.unwrap();
        assert_eq!(principal.as_str(), CLIENT);

        let sealed = client_layer.seal(b"ping").unwrap();
        assert_eq!(&server_layer.open(&sealed).unwrap()[..], b"ping");
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected_generically() {
        let (server_login, client_login) = identities(5);
        let (mut server_io, mut client_io) = framed_pair();

        let (server, client) = tokio::join!(
            server_handshake(&mut server_io, &server_login),
            client_handshake(&mut client_io, &client_login, "runas/node1"),
        );
        match server {
            Err(TransportError::AuthenticationFailed(reason)) => assert!(reason.contains("bad proof")),
            other => panic!("unexpected server outcome: {:?}", other.map(|(p, _)| p)),
        }
        match client {
            Err(TransportError::AuthenticationFailed(reason)) => assert_eq!(reason, GENERIC_REJECTION),
            other => panic!("unexpected client outcome: {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_wrong_service_is_rejected() {
        let (server_login, client_login) = identities(2);
        let (mut server_io, mut client_io) = framed_pair();

        let (server, client) = tokio::join!(
            server_handshake(&mut server_io, &server_login),
            client_handshake(&mut client_io, &client_login, "runas/othernode"),
        );
        assert!(matches!(server, Err(TransportError::AuthenticationFailed(_))));
        assert!(matches!(client, Err(TransportError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_client_open_requires_login_scope() {
        let mut transport = SaslClientTransport::new("127.0.0.1:1", "runas", "node1");
        assert!(matches!(
            transport.open().await,
            Err(TransportError::NoLoginIdentity)
        ));
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send(Bytes::from_static(b"x")).await,
            Err(TransportError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_forged_or_reordered_client_messages_never_authenticate() {
        let (server_login, _) = identities(2);
        let initiate = HandshakeMessage::Initiate {
            mechanism: sasl::MECHANISM.to_string(),
            principal: Principal::new(CLIENT),
            service: "runas/node1".to_string(),
            qop: vec![sasl::QOP_AUTH_CONF.to_string()],
        };
        let forged = HandshakeMessage::Response {
            client_nonce: STANDARD.encode([9u8; 32]),
            proof: STANDARD.encode([0u8; 32]),
        };

        for script in [
            vec![forged.clone(), initiate.clone()],
            vec![initiate.clone(), forged.clone()],
        ] {
            let (mut server_io, mut client_io) = framed_pair();
            for msg in &script {
                send_message(&mut client_io, msg).await.unwrap();
            }
            let outcome = server_handshake(&mut server_io, &server_login).await;
            assert!(outcome.is_err());
        }
    }

    #[tokio::test]
    async fn test_accepted_session_records_peer_and_start() {
        let (server_login, client_login) = identities(2);
        let (server_io, client_io) = duplex(64 * 1024);
        let mut client_io = Framed::new(client_io, FrameCodec::new());
        let peer: SocketAddr = "10.0.0.7:5000".parse().unwrap();
        let before = Utc::now();

        let (server, client) = tokio::join!(
            SaslServerTransport::accept(server_io, Some(peer), &server_login),
            client_handshake(&mut client_io, &client_login, "runas/node1"),
        );
        let server = server.unwrap();
        client.unwrap();

        assert_eq!(server.principal().as_str(), CLIENT);
        assert_eq!(server.peer_addr(), Some(peer));
        assert!(server.established_at() >= before);
        assert!(server.established_at() <= Utc::now());
    }

    #[test]
    fn test_handshake_message_wire_shape() {
        let msg = HandshakeMessage::Rejected {
            reason: "nope".to_string(),
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["type"], "rejected");
        assert_eq!(wire["reason"], "nope");
    }
}
