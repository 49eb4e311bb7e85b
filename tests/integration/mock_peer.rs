//! Scripted in-memory peer for integration tests.
//!
//! Wraps the test half of a [`mem::pair`] with the peer side of the
//! UserService codec: it decodes the requests the transport wrote and
//! answers with encoded results or pushes.

use std::time::Duration;

use async_io_mini::Timer;
use esprpc::rpc::codec::Codec;
use esprpc::rpc::envelope::{Envelope, PUSH_ID};
use esprpc::service::user::{self, User, UserResponse, UserStatus};
use esprpc::transport::mem::{self, MemPeer};
use esprpc::transport::MemTransport;
use esprpc::{Delivery, RpcTransport, TransportConfig, Value};

pub struct Peer {
    pub mem: MemPeer,
    codec: Codec,
}

/// Transport with the UserService codec over an in-memory link.
pub fn user_transport(config: TransportConfig) -> (MemTransport, Peer) {
    let (link, mem) = mem::pair(Delivery::Message);
    let codec = Codec::new(&user::schema());
    (
        RpcTransport::new(link, codec.clone(), config),
        Peer { mem, codec },
    )
}

/// Short connect timeout so failures surface quickly.
pub fn fast_config() -> TransportConfig {
    TransportConfig {
        connect_timeout_ms: 500,
        ..TransportConfig::default()
    }
}

#[allow(dead_code)]
impl Peer {
    /// Wait for the next envelope the transport wrote.
    pub async fn next_request(&self) -> Envelope {
        loop {
            if let Some(bytes) = self.mem.next_written() {
                return Envelope::parse(&bytes).expect("client wrote a malformed envelope");
            }
            Timer::after(Duration::from_millis(1)).await;
        }
    }

    pub fn args(&self, req: &Envelope) -> Vec<Value> {
        self.codec
            .decode_args(req.method_id, &req.payload)
            .expect("request arguments decode")
    }

    pub fn reply(&self, req: &Envelope, value: &Value) {
        let payload = self
            .codec
            .encode_result(req.method_id, value)
            .expect("result encodes");
        self.deliver(Envelope::new(req.method_id, req.correlation_id, payload));
    }

    pub fn push(&self, method_id: u8, value: &Value) {
        let payload = self
            .codec
            .encode_result(method_id, value)
            .expect("push encodes");
        self.deliver(Envelope::new(method_id, PUSH_ID, payload));
    }

    pub fn deliver(&self, envelope: Envelope) {
        self.mem.deliver(envelope.encode().expect("envelope encodes"));
    }

    /// Answer every request with `handler`'s value, forever.  Requests the
    /// handler returns `None` for go unanswered.
    pub async fn serve(&self, handler: impl Fn(u8, Vec<Value>) -> Option<Value>) {
        loop {
            let req = self.next_request().await;
            if req.is_push() {
                continue;
            }
            if let Some(value) = handler(req.method_id, self.args(&req)) {
                self.reply(&req, &value);
            }
        }
    }
}

/// Give the receive and dispatch loops time to drain.
pub async fn settle() {
    Timer::after(Duration::from_millis(20)).await;
}

pub fn response(id: i32, name: &str) -> Value {
    (&UserResponse {
        id,
        name: name.into(),
        email: format!("{name}@example.com"),
        status: UserStatus::Active,
    })
        .into()
}

pub fn user(id: i32, name: &str) -> User {
    User {
        id,
        name: name.into(),
        email: None,
        status: UserStatus::Active,
        tags: vec!["test".into()],
    }
}
