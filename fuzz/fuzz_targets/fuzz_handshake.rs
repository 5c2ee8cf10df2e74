// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use bytes::Bytes;
use futures::SinkExt;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::Framed;

use runas_rpc::engine_core::principal::Principal;
use runas_rpc::identity::keytab::Keytab;
use runas_rpc::identity::login::LoginIdentity;
use runas_rpc::transport::codec::FrameCodec;
use runas_rpc::transport::sasl::{server_handshake, HandshakeMessage};

/// What a hostile client controls during the handshake.
#[derive(Debug, Arbitrary)]
struct HandshakeInput {
    mechanism: String,
    principal: String,
    service: String,
    qop: Vec<String>,
    client_nonce: String,
    proof: String,
    /// Send the response before the initiate
    reorder: bool,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(input) = HandshakeInput::arbitrary(&mut unstructured) else {
        return;
    };

    let server = Principal::new("runas/localhost@EXAMPLE.COM");
    let client = Principal::new("alice@EXAMPLE.COM");
    let Ok(keytab) = Keytab::from_entries([(server.clone(), vec![3u8; 32]), (client, vec![4u8; 32])])
    else {
        return;
    };
    let Ok(login) = LoginIdentity::new(server, Arc::new(keytab)) else {
        return;
    };

    let mut frames = vec![
        HandshakeMessage::Initiate {
            mechanism: input.mechanism,
            principal: Principal::new(input.principal),
            service: input.service,
            qop: input.qop,
        },
        HandshakeMessage::Response {
            client_nonce: input.client_nonce,
            proof: input.proof,
        },
    ];
    if input.reorder {
        frames.reverse();
    }

    let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };
    rt.block_on(async move {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let mut client = Framed::new(client_io, FrameCodec::new());
        for frame in &frames {
            if let Ok(body) = serde_json::to_vec(frame) {
                let _ = client.send(Bytes::from(body)).await;
            }
        }

        // Forged input must never complete the handshake.
        let mut server = Framed::new(server_io, FrameCodec::new());
        let outcome =
            tokio::time::timeout(Duration::from_secs(1), server_handshake(&mut server, &login)).await;
        assert!(!matches!(outcome, Ok(Ok(_))));
        drop(client);
    });
});
