// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use runas_rpc::transport::codec::FrameCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // No byte sequence may panic the frame decoder.
    let mut codec = FrameCodec::new();
    let mut buffer = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buffer) {}
});
