// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use runas_rpc::engine_core::models::{RpcRequest, RpcResponse};
use runas_rpc::transport::sasl::HandshakeMessage;

fuzz_target!(|data: &[u8]| {
    // Everything a peer can put on the wire before or after the handshake.
    let _ = serde_json::from_slice::<RpcRequest>(data);
    let _ = serde_json::from_slice::<RpcResponse>(data);
    let _ = serde_json::from_slice::<HandshakeMessage>(data);
});
