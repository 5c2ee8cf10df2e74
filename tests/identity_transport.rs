mod common;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};

use runas_rpc::engine_core::errors::TransportError;
use runas_rpc::engine_core::traits::ClientTransport;
use runas_rpc::identity::login::LoginIdentity;
use runas_rpc::transport::IdentityTransport;

/// Records which login identity was ambient for each operation.
#[derive(Default)]
struct Recorder {
    fail_open: bool,
    open: bool,
    closes: usize,
    seen: Arc<Mutex<Vec<(&'static str, Option<String>)>>>,
}

impl Recorder {
    fn note(&self, op: &'static str) {
        let who = LoginIdentity::current().map(|l| l.principal().to_string());
        self.seen.lock().unwrap().push((op, who));
    }
}

#[async_trait]
impl ClientTransport for Recorder {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.note("open");
        // Stand-in for a half-established connection
        self.open = true;
        if self.fail_open {
            return Err(TransportError::AuthenticationFailed("no ticket".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.note("close");
        if self.open {
            self.closes += 1;
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn send(&mut self, _payload: Bytes) -> Result<(), TransportError> {
        self.note("send");
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.note("recv");
        Ok(Bytes::from_static(b"{}"))
    }
}

const ALICE: &str = "alice@EXAMPLE.COM";

#[tokio::test]
async fn test_every_operation_runs_as_login_identity() {
    let recorder = Recorder::default();
    let seen = Arc::clone(&recorder.seen);
    let mut transport = IdentityTransport::new(recorder, common::login(ALICE, &[]));

    assert!(LoginIdentity::current().is_none());
    transport.open().await.unwrap();
    transport.send(Bytes::from_static(b"{}")).await.unwrap();
    transport.recv().await.unwrap();
    transport.close().await.unwrap();
    assert!(LoginIdentity::current().is_none());

    let seen = seen.lock().unwrap();
    let ops: Vec<_> = seen.iter().map(|(op, _)| *op).collect();
    assert_eq!(ops, vec!["open", "send", "recv", "close"]);
    assert!(seen.iter().all(|(_, who)| who.as_deref() == Some(ALICE)));
}

#[tokio::test]
async fn test_failed_open_closes_inner_transport() {
    let recorder = Recorder {
        fail_open: true,
        ..Recorder::default()
    };
    let mut transport = IdentityTransport::new(recorder, common::login(ALICE, &[]));

    let err = transport.open().await.unwrap_err();
    assert!(matches!(err, TransportError::AuthenticationFailed(_)));
    assert!(!transport.is_open());
    assert_eq!(transport.inner().closes, 1);
}

#[tokio::test]
async fn test_double_close_is_noop() {
    let mut transport = IdentityTransport::new(Recorder::default(), common::login(ALICE, &[]));
    transport.open().await.unwrap();
    transport.close().await.unwrap();
    transport.close().await.unwrap();
    assert_eq!(transport.inner().closes, 1);
}

#[tokio::test]
async fn test_io_before_open_is_refused() {
    let mut transport = IdentityTransport::new(Recorder::default(), common::login(ALICE, &[]));
    assert!(matches!(
        transport.send(Bytes::from_static(b"{}")).await,
        Err(TransportError::NotOpen)
    ));
    assert!(matches!(transport.recv().await, Err(TransportError::NotOpen)));
    assert!(transport.inner().seen.lock().unwrap().is_empty());
}
