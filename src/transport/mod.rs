//! RPC transport engine: correlation, dispatch and the receive loop.
//!
//! One [`RpcTransport`] owns one physical [`Link`] plus the per-instance
//! state that sits on top of it: the correlation table, the subscription
//! registry and (for byte-stream links) the reassembly decoder.  Everything
//! runs on a single execution context; shared state lives in `Cell` and
//! `RefCell` fields and no borrow is held across an `.await`.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  RpcTransport::run()                                         │
//!  │                                                              │
//!  │  ┌──────────────┐   Channel<Envelope>   ┌─────────────────┐  │
//!  │  │ receive loop │ ────────────────────▶ │ dispatch loop   │  │
//!  │  │ poll link    │                       │ corr != 0: call │  │
//!  │  │ reassemble   │                       │ corr == 0: push │  │
//!  │  └──────────────┘                       └─────────────────┘  │
//!  │         ▲                                        │           │
//!  │         │ Link::poll_event        Signal::signal │           │
//!  │         │                                        ▼           │
//!  │  ┌──────────────┐                       ┌─────────────────┐  │
//!  │  │ Link         │ ◀──── Link::send ──── │ call() futures  │  │
//!  │  └──────────────┘                       └─────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A call is settled exactly once by whichever of {matching response,
//! deadline, disconnect, drop of the call future} removes its table entry
//! first.

pub mod ble;
pub mod link;
pub mod mem;
pub mod serial;
pub mod ws;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;
use log::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::rpc::codec::Codec;
use crate::rpc::correlation::CorrelationTable;
use crate::rpc::envelope::{Envelope, PUSH_ID};
use crate::rpc::stream::{StreamDecoder, wrap};
use crate::rpc::subscriptions::SubscriptionRegistry;
use crate::rpc::value::Value;

pub use link::{Delivery, Link, LinkEvent};

/// Inbound envelope queue depth between the receive and dispatch loops.
const INBOUND_DEPTH: usize = 16;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// RPC transport over one physical link.
pub struct RpcTransport<L: Link> {
    link: RefCell<L>,
    codec: Codec,
    config: TransportConfig,
    state: Cell<ConnectionState>,
    /// Bumped on every successful connect so a stale `run()` can tell.
    session: Cell<u32>,
    calls: RefCell<CorrelationTable>,
    subscriptions: RefCell<SubscriptionRegistry>,
    decoder: RefCell<StreamDecoder>,
    inbound: Channel<NoopRawMutex, Envelope, INBOUND_DEPTH>,
}

pub type WsTransport = RpcTransport<ws::WsLink>;
pub type SerialTransport = RpcTransport<serial::SerialLink>;
pub type BleTransport<P> = RpcTransport<ble::GattLink<P>>;
pub type MemTransport = RpcTransport<mem::MemLink>;

impl<L: Link> RpcTransport<L> {
    pub fn new(mut link: L, codec: Codec, config: TransportConfig) -> Self {
        link.configure(&config);
        let decoder = StreamDecoder::new(&config.framing, config.max_stream_buffer);
        Self {
            link: RefCell::new(link),
            codec,
            config,
            state: Cell::new(ConnectionState::Disconnected),
            session: Cell::new(0),
            calls: RefCell::new(CorrelationTable::new()),
            subscriptions: RefCell::new(SubscriptionRegistry::new()),
            decoder: RefCell::new(decoder),
            inbound: Channel::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    /// Calls registered and not yet settled.
    pub fn pending_calls(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ── Connection lifecycle ─────────────────────────────────

    /// Open the link and wait for its ready signal.
    ///
    /// Resolves once `Ready` is observed.  A close before ready fails with
    /// its reason and code.  An error signal starts a grace window for a
    /// more specific close to arrive; if none does, a generic failure is
    /// reported.  The whole wait is capped by `connect_timeout_ms`.
    pub async fn connect(&self) -> Result<()> {
        match self.state.get() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting => {
                return Err(Error::Connection("connect already in progress".into()));
            }
            ConnectionState::Disconnected => {}
        }

        self.state.set(ConnectionState::Connecting);
        self.decoder.borrow_mut().reset();
        // Frames a stale receive loop queued after the last teardown.
        while self.inbound.try_receive().is_ok() {}

        let opened = self.link.borrow_mut().open();
        if let Err(e) = opened {
            warn!("RPC[{}]: open failed: {}", self.describe(), e);
            self.state.set(ConnectionState::Disconnected);
            return Err(Error::Connection(e.to_string()));
        }

        let timeout = self.config.connect_timeout();
        let result = future::or(self.await_ready(), async {
            Timer::after(timeout).await;
            Err(Error::Connection(format!(
                "no ready signal within {}ms",
                self.config.connect_timeout_ms
            )))
        })
        .await;

        match &result {
            Ok(()) => {
                self.session.set(self.session.get().wrapping_add(1));
                self.state.set(ConnectionState::Connected);
                info!("RPC[{}]: connected", self.describe());
            }
            Err(e) => {
                warn!("RPC[{}]: {}", self.describe(), e);
                self.link.borrow_mut().close();
                self.state.set(ConnectionState::Disconnected);
            }
        }
        result
    }

    async fn await_ready(&self) -> Result<()> {
        let mut grace_until: Option<Instant> = None;
        loop {
            let event = self.link.borrow_mut().poll_event();
            match event {
                Some(LinkEvent::Ready) => return Ok(()),
                Some(LinkEvent::Closed { reason, code }) => {
                    return Err(Error::Connection(link::close_description(&reason, code)));
                }
                Some(LinkEvent::Error(msg)) => {
                    debug!("RPC[{}]: error before ready: {}", self.describe(), msg);
                    grace_until.get_or_insert_with(|| Instant::now() + self.config.error_grace());
                }
                Some(LinkEvent::Data(bytes)) => {
                    debug!("RPC[{}]: dropping {} bytes before ready", self.describe(), bytes.len());
                }
                None => {
                    if grace_until.is_some_and(|t| Instant::now() >= t) {
                        return Err(Error::Connection(self.describe()));
                    }
                    Timer::after(self.config.poll_interval()).await;
                }
            }
        }
    }

    /// Close the link and fail every outstanding call with `Disconnected`.
    ///
    /// Subscriptions are kept, so a later `connect()` resumes delivery to
    /// the same callbacks.  Writes already handed to the link are not
    /// retracted.
    pub fn disconnect(&self) {
        if self.state.get() == ConnectionState::Disconnected {
            return;
        }
        info!("RPC[{}]: disconnecting", self.describe());
        self.link.borrow_mut().close();
        self.teardown();
    }

    fn teardown(&self) {
        self.state.set(ConnectionState::Disconnected);
        let failed = self.calls.borrow_mut().fail_all(&Error::Disconnected);
        if failed > 0 {
            info!("RPC: failed {} pending calls on disconnect", failed);
        }
        self.decoder.borrow_mut().reset();
        while self.inbound.try_receive().is_ok() {}
    }

    // ── Outbound ─────────────────────────────────────────────

    /// Issue a request and wait for its response.
    ///
    /// The timeout is `timeout`, else the method's default, else the
    /// transport default.  Dropping the returned future before it settles
    /// removes the pending entry; a response arriving later is ignored.
    pub async fn call(
        &self,
        method_id: u8,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let payload = self.codec.encode(method_id, args)?;
        let timeout = timeout
            .or_else(|| self.codec.timeout_of(method_id))
            .unwrap_or_else(|| self.config.default_timeout());

        let (id, slot) = self
            .calls
            .borrow_mut()
            .register(method_id, Instant::now() + timeout);
        let _guard = PendingGuard {
            calls: &self.calls,
            id,
        };

        self.transmit(method_id, id, payload)?;

        let expired = async {
            Timer::after(timeout).await;
            if self.calls.borrow_mut().evict(id) {
                debug!("RPC: call {} (method {}) timed out", id, method_id);
                Err(Error::Timeout {
                    method_id,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            } else {
                // Settled in the same tick the timer fired.
                slot.wait().await
            }
        };
        future::or(slot.wait(), expired).await
    }

    /// Fire-and-forget request with correlation id 0.  Nothing is
    /// registered; only an immediate send failure is observable.
    pub fn send_stream_request(&self, method_id: u8, args: &[Value]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let payload = self.codec.encode(method_id, args)?;
        self.transmit(method_id, PUSH_ID, payload)
    }

    fn transmit(&self, method_id: u8, correlation_id: u16, payload: Vec<u8>) -> Result<()> {
        let frame = Envelope::new(method_id, correlation_id, payload).encode()?;
        let mut link = self.link.borrow_mut();
        let bytes = match link.delivery() {
            Delivery::Message => frame,
            Delivery::ByteStream => wrap(&frame, &self.config.framing),
        };
        link.send(&bytes)?;
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────

    /// Route push frames for `method_id` to `cb`, replacing any earlier
    /// callback.  Returns `true` if one was replaced.
    pub fn subscribe(&self, method_id: u8, cb: impl Fn(Value) + 'static) -> bool {
        self.subscriptions
            .borrow_mut()
            .subscribe(method_id, Rc::new(cb))
    }

    pub fn unsubscribe(&self, method_id: u8) -> bool {
        self.subscriptions.borrow_mut().unsubscribe(method_id)
    }

    pub fn is_subscribed(&self, method_id: u8) -> bool {
        self.subscriptions.borrow().contains(method_id)
    }

    // ── Inbound ──────────────────────────────────────────────

    /// Drive the receive and dispatch loops until the link closes or the
    /// transport is disconnected.  Start it after `connect()` succeeds.
    pub async fn run(&self) {
        if !self.is_connected() {
            debug!("RPC[{}]: run() while not connected", self.describe());
            return;
        }
        let session = self.session.get();
        future::or(self.receive_loop(session), self.dispatch_loop()).await;
    }

    /// Spawn `run()` on a local executor.
    pub fn spawn<'a, const C: usize>(&'a self, executor: &LocalExecutor<'a, C>)
    where
        L: 'a,
    {
        executor.spawn(self.run()).detach();
    }

    async fn receive_loop(&self, session: u32) {
        loop {
            if !self.is_current(session) {
                return;
            }
            let event = self.link.borrow_mut().poll_event();
            match event {
                None => {
                    Timer::after(self.config.poll_interval()).await;
                }
                Some(LinkEvent::Data(bytes)) => {
                    for envelope in self.reassemble(&bytes) {
                        // A callback may disconnect while this chunk is
                        // still being queued.
                        if !self.is_current(session) {
                            return;
                        }
                        self.inbound.send(envelope).await;
                    }
                    future::yield_now().await;
                }
                Some(LinkEvent::Closed { reason, code }) => {
                    warn!(
                        "RPC[{}]: link closed: {}",
                        self.describe(),
                        link::close_description(&reason, code)
                    );
                    self.link.borrow_mut().close();
                    self.teardown();
                    return;
                }
                Some(LinkEvent::Error(msg)) => {
                    warn!("RPC[{}]: link error: {}", self.describe(), msg);
                }
                Some(LinkEvent::Ready) => {}
            }
        }
    }

    fn is_current(&self, session: u32) -> bool {
        self.is_connected() && self.session.get() == session
    }

    fn reassemble(&self, bytes: &[u8]) -> Vec<Envelope> {
        let delivery = self.link.borrow().delivery();
        match delivery {
            Delivery::ByteStream => self.decoder.borrow_mut().feed(bytes),
            Delivery::Message => match Envelope::parse(bytes) {
                Some(envelope) => vec![envelope],
                None => {
                    debug!("RPC: dropping malformed {}-byte unit", bytes.len());
                    Vec::new()
                }
            },
        }
    }

    async fn dispatch_loop(&self) {
        loop {
            let envelope = self.inbound.receive().await;
            self.dispatch(&envelope);
        }
    }

    /// Route one envelope.  Decode failures drop the frame and nothing else.
    fn dispatch(&self, envelope: &Envelope) {
        let method_id = envelope.method_id;

        if envelope.is_push() {
            let Some(cb) = self.subscriptions.borrow().get(method_id) else {
                debug!("RPC: no subscriber for push on method {}", method_id);
                return;
            };
            match self.codec.decode(method_id, &envelope.payload) {
                Ok(value) => cb(value),
                Err(e) => warn!("RPC: dropping push for method {}: {}", method_id, e),
            }
            return;
        }

        let id = envelope.correlation_id;
        if !self.calls.borrow().contains(id) {
            debug!("RPC: no pending call {} (method {}), dropping", id, method_id);
            return;
        }
        match self.codec.decode(method_id, &envelope.payload) {
            Ok(value) => {
                self.calls.borrow_mut().settle(id, Ok(value));
            }
            Err(e) => warn!("RPC: dropping response {} for method {}: {}", id, method_id, e),
        }
    }

    fn describe(&self) -> String {
        self.link.borrow().describe()
    }
}

impl<L: Link> Drop for RpcTransport<L> {
    fn drop(&mut self) {
        if self.state.get() != ConnectionState::Disconnected {
            self.link.get_mut().close();
        }
    }
}

/// Removes a call's table entry if its future is dropped unsettled.
struct PendingGuard<'a> {
    calls: &'a RefCell<CorrelationTable>,
    id: u16,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let Ok(mut calls) = self.calls.try_borrow_mut() else {
            return;
        };
        if calls.evict(self.id) {
            debug!("RPC: call {} abandoned", self.id);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
