//! Byte-stream transport end to end over an in-process serial pipe.
//!
//! The "device" side is a channel feeding the link's reader thread plus a
//! shared buffer capturing what the transport wrote.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use esprpc::rpc::codec::Codec;
use esprpc::rpc::envelope::Envelope;
use esprpc::rpc::stream::{StreamDecoder, wrap};
use esprpc::service::user::{self, GET_USER, UserResponse};
use esprpc::transport::SerialTransport;
use esprpc::transport::serial::SerialLink;
use esprpc::{ConnectionState, Framing, RpcTransport, TransportConfig, Value};
use futures_lite::future;

use crate::mock_peer::response;

// ── Pipe halves ──────────────────────────────────────────────

struct PipeReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Device {
    tx: mpsc::Sender<Vec<u8>>,
    written: Capture,
    decoder: StreamDecoder,
    queued: VecDeque<Envelope>,
    framing: Framing,
    codec: Codec,
}

impl Device {
    async fn next_request(&mut self) -> Envelope {
        loop {
            let bytes: Vec<u8> = self.written.0.borrow_mut().drain(..).collect();
            self.queued.extend(self.decoder.feed(&bytes));
            if let Some(env) = self.queued.pop_front() {
                return env;
            }
            Timer::after(Duration::from_millis(1)).await;
        }
    }

    /// Send `bytes` one byte per read.
    fn trickle(&self, bytes: &[u8]) {
        for b in bytes {
            self.tx.send(vec![*b]).unwrap();
        }
    }

    fn framed_reply(&self, req: &Envelope, value: &Value) -> Vec<u8> {
        let payload = self.codec.encode_result(req.method_id, value).unwrap();
        let frame = Envelope::new(req.method_id, req.correlation_id, payload)
            .encode()
            .unwrap();
        wrap(&frame, &self.framing)
    }
}

fn serial_setup(framing: &Framing) -> (SerialTransport, Device) {
    let (tx, rx) = mpsc::channel();
    let written = Capture::default();
    let link = SerialLink::from_port(
        PipeReader {
            rx,
            pending: Vec::new(),
        },
        written.clone(),
    );
    let config = TransportConfig::default().with_framing(framing.clone());
    let transport = RpcTransport::new(link, Codec::new(&user::schema()), config);
    let device = Device {
        tx,
        written,
        decoder: StreamDecoder::new(framing, 4096),
        queued: VecDeque::new(),
        framing: framing.clone(),
        codec: Codec::new(&user::schema()),
    };
    (transport, device)
}

#[test]
fn call_over_noisy_byte_stream() {
    let framing = Framing::from_markers("$", "\r\n").unwrap();
    let (t, mut dev) = serial_setup(&framing);
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let (result, ()) = future::zip(t.call(GET_USER, &[Value::from(7)], None), async {
            let req = dev.next_request().await;
            assert_eq!(req.method_id, GET_USER);
            assert_eq!(dev.decoder.suffix_mismatches(), 0);

            dev.trickle(b"boot: ok\r\n");
            dev.trickle(&dev.framed_reply(&req, &response(7, "serial")));
        })
        .await;

        assert_eq!(UserResponse::try_from(result.unwrap()).unwrap().name, "serial");
    }));
}

#[test]
fn outgoing_frames_carry_markers() {
    let framing = Framing::from_markers("\x02", "\x03").unwrap();
    let (t, dev) = serial_setup(&framing);

    future::block_on(t.connect()).unwrap();
    t.send_stream_request(user::PING, &[]).unwrap();

    assert_eq!(*dev.written.0.borrow(), [0x02, user::PING, 0, 0, 0, 0, 0x03]);
    t.disconnect();
}

#[test]
fn several_frames_in_one_chunk() {
    let framing = Framing::from_markers("$", "#").unwrap();
    let (t, mut dev) = serial_setup(&framing);
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let (args_a, args_b) = ([Value::from(1)], [Value::from(2)]);
        let a = t.call(GET_USER, &args_a, None);
        let b = t.call(GET_USER, &args_b, None);
        let responder = async {
            let ra = dev.next_request().await;
            let rb = dev.next_request().await;
            let mut burst = dev.framed_reply(&rb, &response(2, "two"));
            burst.extend(dev.framed_reply(&ra, &response(1, "one")));
            dev.tx.send(burst).unwrap();
        };

        let ((ra, rb), ()) = future::zip(future::zip(a, b), responder).await;
        assert_eq!(UserResponse::try_from(ra.unwrap()).unwrap().name, "one");
        assert_eq!(UserResponse::try_from(rb.unwrap()).unwrap().name, "two");
    }));
}

#[test]
fn port_eof_disconnects() {
    let framing = Framing::default();
    let (t, dev) = serial_setup(&framing);
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);
        drop(dev);
        Timer::after(Duration::from_millis(50)).await;
        assert_eq!(t.state(), ConnectionState::Disconnected);
    }));
}
