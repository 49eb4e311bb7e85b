//! WebSocket link: one envelope per binary message.
//!
//! `open()` performs the TCP connect and the HTTP upgrade, then switches
//! the stream to non-blocking so `poll_event` never stalls the executor.
//! Connection outcomes are reported the way a browser socket reports them:
//!
//! - handshake done: `Ready`
//! - peer close frame: `Closed { reason, code }`, with a standard
//!   description when the peer sent no reason
//! - refused, unreachable, DNS or handshake failure: `Error` followed by
//!   `Closed` with code 1006

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::client::Request;
use tungstenite::{Message, WebSocket};

use crate::config::TransportConfig;
use crate::error::LinkError;

use super::link::{Delivery, Link, LinkEvent};

/// Close code for a connection that dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when the close frame carried no status.
const NO_STATUS: u16 = 1005;

/// Default bound on TCP connect plus upgrade, until `configure` runs.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Standard description of a WebSocket close code.
pub fn close_code_message(code: u16) -> &'static str {
    match code {
        1000 => "normal closure",
        1001 => "endpoint going away",
        1002 => "protocol error",
        1003 => "unsupported data type",
        1005 => "no status received",
        1006 => "abnormal closure (connection refused, network unreachable or DNS failure)",
        1007 => "invalid payload data",
        1008 => "policy violation",
        1009 => "message too big",
        1010 => "mandatory extension missing",
        1011 => "internal server error",
        1015 => "TLS handshake failure",
        _ => "unknown error",
    }
}

fn closed(code: u16, reason: &str) -> LinkEvent {
    let reason = reason.trim();
    let reason = if reason.is_empty() {
        close_code_message(code)
    } else {
        reason
    };
    LinkEvent::closed(reason, Some(i32::from(code)))
}

pub struct WsLink {
    url: String,
    handshake_timeout: Duration,
    socket: Option<WebSocket<TcpStream>>,
    pending: VecDeque<LinkEvent>,
}

impl WsLink {
    /// Link to a `ws://host[:port]/path` endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            socket: None,
            pending: VecDeque::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Blocking connect + upgrade, bounded by `handshake_timeout` per step.
    fn handshake(&self, request: Request) -> Result<WebSocket<TcpStream>, String> {
        let host = request
            .uri()
            .host()
            .ok_or_else(|| format!("no host in {}", self.url))?
            .trim_matches(|c| c == '[' || c == ']')
            .to_owned();
        let port = request.uri().port_u16().unwrap_or(80);

        let addrs = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| format!("resolving {host}: {e}"))?;
        let mut last_err = format!("{host} did not resolve");
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.handshake_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = format!("{addr}: {e}"),
            }
        }
        let stream = stream.ok_or(last_err)?;

        let io = |e: std::io::Error| e.to_string();
        stream.set_nodelay(true).map_err(io)?;
        stream.set_read_timeout(Some(self.handshake_timeout)).map_err(io)?;
        stream.set_write_timeout(Some(self.handshake_timeout)).map_err(io)?;

        let (socket, _response) = tungstenite::client(request, stream).map_err(|e| e.to_string())?;

        let stream = socket.get_ref();
        stream.set_read_timeout(None).map_err(io)?;
        stream.set_write_timeout(None).map_err(io)?;
        stream.set_nonblocking(true).map_err(io)?;
        Ok(socket)
    }

    fn fail(&mut self, error: String) -> LinkEvent {
        self.socket = None;
        self.pending.push_back(closed(ABNORMAL_CLOSURE, ""));
        LinkEvent::Error(error)
    }
}

impl Link for WsLink {
    fn delivery(&self) -> Delivery {
        Delivery::Message
    }

    fn describe(&self) -> String {
        format!("websocket {}", self.url)
    }

    fn configure(&mut self, config: &TransportConfig) {
        self.handshake_timeout = config.connect_timeout();
    }

    fn open(&mut self) -> Result<(), LinkError> {
        self.close();
        let request = self.url.as_str().into_client_request().map_err(|e| {
            debug!("RPC[ws]: bad url {}: {}", self.url, e);
            LinkError::Unavailable(format!("websocket endpoint {}", self.url))
        })?;
        if request.uri().scheme_str() != Some("ws") {
            return Err(LinkError::Unavailable(format!(
                "{} (only plain ws:// is supported)",
                self.url
            )));
        }

        match self.handshake(request) {
            Ok(socket) => {
                info!("RPC[ws]: connected to {}", self.url);
                self.socket = Some(socket);
                self.pending.push_back(LinkEvent::Ready);
            }
            Err(e) => {
                warn!("RPC[ws]: {}: {}", self.url, e);
                let event = self.fail(e);
                self.pending.push_front(event);
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        let socket = self.socket.as_mut()?;
        match socket.read() {
            Ok(Message::Binary(data)) => Some(LinkEvent::Data(data.to_vec())),
            Ok(Message::Close(frame)) => {
                // Push out the queued close reply before dropping the stream.
                let _ = socket.flush();
                self.socket = None;
                Some(match frame {
                    Some(f) => closed(u16::from(f.code), f.reason.as_str()),
                    None => closed(NO_STATUS, ""),
                })
            }
            Ok(Message::Text(text)) => {
                debug!("RPC[ws]: ignoring {}-byte text message", text.len());
                None
            }
            // Pings are answered by the protocol layer on the next read.
            Ok(_) => None,
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) =>
            {
                None
            }
            Err(e) => Some(self.fail(e.to_string())),
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let socket = self.socket.as_mut().ok_or(LinkError::NotOpen)?;
        match socket.send(Message::binary(data.to_vec())) {
            Ok(()) => Ok(()),
            // Queued; the rest goes out with the next read or send.
            Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(LinkError::Io(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
            debug!("RPC[ws]: closed {}", self.url);
        }
        self.pending.clear();
    }
}

// ── Tests ────────────────────────────────────────────────────
