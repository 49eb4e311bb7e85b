//! In-memory link pair.
//!
//! [`MemLink`] is handed to the transport; its [`MemPeer`] stays with the
//! test (or loopback harness) to inject events and collect what the
//! transport wrote.  Both halves share one queue, so they must live on the
//! same thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::LinkError;

use super::link::{Delivery, Link, LinkEvent};

struct Shared {
    inbound: VecDeque<LinkEvent>,
    written: VecDeque<Vec<u8>>,
    open: bool,
    available: bool,
    auto_ready: bool,
    opens: u32,
}

/// Transport-side half.
pub struct MemLink {
    shared: Rc<RefCell<Shared>>,
    delivery: Delivery,
}

/// Test-side half.
#[derive(Clone)]
pub struct MemPeer {
    shared: Rc<RefCell<Shared>>,
}

/// Create a connected link/peer pair.
pub fn pair(delivery: Delivery) -> (MemLink, MemPeer) {
    let shared = Rc::new(RefCell::new(Shared {
        inbound: VecDeque::new(),
        written: VecDeque::new(),
        open: false,
        available: true,
        auto_ready: true,
        opens: 0,
    }));
    (
        MemLink {
            shared: shared.clone(),
            delivery,
        },
        MemPeer { shared },
    )
}

impl Link for MemLink {
    fn delivery(&self) -> Delivery {
        self.delivery
    }

    fn describe(&self) -> String {
        match self.delivery {
            Delivery::Message => "memory link (message)".into(),
            Delivery::ByteStream => "memory link (byte stream)".into(),
        }
    }

    fn open(&mut self) -> Result<(), LinkError> {
        let mut s = self.shared.borrow_mut();
        if !s.available {
            return Err(LinkError::Unavailable("memory link".into()));
        }
        s.open = true;
        s.opens += 1;
        if s.auto_ready {
            s.inbound.push_back(LinkEvent::Ready);
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.shared.borrow_mut().inbound.pop_front()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let mut s = self.shared.borrow_mut();
        if !s.open {
            return Err(LinkError::NotOpen);
        }
        s.written.push_back(data.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.shared.borrow_mut();
        s.open = false;
        s.inbound.clear();
    }
}

impl MemPeer {
    /// Queue an arbitrary event for the transport.
    pub fn push(&self, event: LinkEvent) {
        self.shared.borrow_mut().inbound.push_back(event);
    }

    /// Queue inbound bytes.
    pub fn deliver(&self, bytes: impl Into<Vec<u8>>) {
        self.push(LinkEvent::Data(bytes.into()));
    }

    pub fn ready(&self) {
        self.push(LinkEvent::Ready);
    }

    pub fn error(&self, msg: &str) {
        self.push(LinkEvent::Error(msg.into()));
    }

    pub fn close(&self, reason: &str, code: Option<i32>) {
        self.push(LinkEvent::closed(reason, code));
    }

    /// Oldest write not yet taken.
    pub fn next_written(&self) -> Option<Vec<u8>> {
        self.shared.borrow_mut().written.pop_front()
    }

    /// Drain every write so far.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        self.shared.borrow_mut().written.drain(..).collect()
    }

    pub fn is_open(&self) -> bool {
        self.shared.borrow().open
    }

    /// Number of times the transport opened the link.
    pub fn opens(&self) -> u32 {
        self.shared.borrow().opens
    }

    /// When off, `open()` does not queue `Ready` by itself.
    pub fn set_auto_ready(&self, on: bool) {
        self.shared.borrow_mut().auto_ready = on;
    }

    /// When off, `open()` fails as if the device did not exist.
    pub fn set_available(&self, on: bool) {
        self.shared.borrow_mut().available = on;
    }
}
