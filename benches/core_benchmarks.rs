use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use runas_rpc::engine_core::principal::Principal;
use runas_rpc::transport::codec::FrameCodec;
use runas_rpc::transport::protection::{SecurityLayer, Side};
use tokio_util::codec::Decoder;

fn bench_codec_decode(c: &mut Criterion) {
    let mut codec = FrameCodec::new();
    let data = b"Content-Length: 62\r\n\r\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"list\",\"params\":{\"path\":\"/\"}}";

    c.bench_function("codec_decode_list", |b| {
        b.iter(|| {
            let mut src = BytesMut::from(&data[..]);
            let _ = codec.decode(black_box(&mut src));
        })
    });
}

fn bench_short_name(c: &mut Criterion) {
    let principal = Principal::new("alice/laptop.example.com@EXAMPLE.COM");

    c.bench_function("principal_short_name", |b| {
        b.iter(|| {
            let _ = black_box(&principal).short_name();
        })
    });
}

fn bench_seal_open(c: &mut Criterion) {
    let key = [7u8; 32];
    let server_nonce = [1u8; 32];
    let client_nonce = [2u8; 32];
    let payload = vec![0x5a_u8; 1024];

    c.bench_function("security_layer_seal_open_1k", |b| {
        b.iter_batched(
            || {
                let client =
                    SecurityLayer::derive(Side::Client, &key, &server_nonce, &client_nonce);
                let server =
                    SecurityLayer::derive(Side::Server, &key, &server_nonce, &client_nonce);
                (client, server)
            },
            |(client, server)| {
                if let (Ok(mut client), Ok(mut server)) = (client, server) {
                    if let Ok(sealed) = client.seal(black_box(&payload)) {
                        let _ = server.open(&sealed);
                    }
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_codec_decode, bench_short_name, bench_seal_open);
criterion_main!(benches);
