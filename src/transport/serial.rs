//! Serial byte-stream link.
//!
//! The device (or any reader/writer pair) carries a continuous byte stream
//! with no message boundaries.  A dedicated reader thread reads the port
//! and forwards raw chunks over a channel; `poll_event` drains that channel
//! without blocking.  Frame recovery happens in the transport's stream
//! decoder, and prefix/suffix markers are added on send.
//!
//! Devices are opened in raw mode at the configured baud rate.  Their
//! reader wakes every [`READ_POLL`] to check a stop flag, so `close()`
//! joins it and the next `open()` owns the port alone.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::LinkError;

use super::link::{Delivery, Link, LinkEvent};

const READ_BUF_SIZE: usize = 1024;

/// Read timeout on device ports; bounds how long `close()` waits.
pub const READ_POLL: Duration = Duration::from_millis(50);

const DEFAULT_BAUD: u32 = 115_200;

type PortReader = Box<dyn Read + Send>;
type PortWriter = Box<dyn Write>;

enum Source {
    /// Opened from a device path on every `open()`.
    Device { path: String, baud_rate: u32 },
    /// Already-open halves, consumed by the first `open()`.
    Port(Option<(PortReader, PortWriter)>),
}

struct Reader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct SerialLink {
    source: Source,
    writer: Option<PortWriter>,
    rx: Option<Receiver<LinkEvent>>,
    reader: Option<Reader>,
    ready_pending: bool,
}

impl SerialLink {
    /// Link over a device node such as `/dev/ttyUSB0`.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_source(Source::Device {
            path: path.into(),
            baud_rate: DEFAULT_BAUD,
        })
    }

    /// Link over an already-open reader/writer pair.  It can be opened
    /// once; the reader moves into the reader thread.
    pub fn from_port(reader: impl Read + Send + 'static, writer: impl Write + 'static) -> Self {
        Self::with_source(Source::Port(Some((Box::new(reader), Box::new(writer)))))
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            writer: None,
            rx: None,
            reader: None,
            ready_pending: false,
        }
    }

    /// Baud rate used for the next device open.  `None` for port links.
    pub fn baud_rate(&self) -> Option<u32> {
        match self.source {
            Source::Device { baud_rate, .. } => Some(baud_rate),
            Source::Port(_) => None,
        }
    }

    fn take_port(&mut self) -> Result<(PortReader, PortWriter), LinkError> {
        match &mut self.source {
            Source::Device { path, baud_rate } => {
                let port = serialport::new(path.as_str(), *baud_rate)
                    .timeout(READ_POLL)
                    .open()
                    .map_err(|e| match e.kind() {
                        serialport::ErrorKind::NoDevice
                        | serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                            LinkError::Unavailable(format!("serial device {path}"))
                        }
                        _ => LinkError::Io(format!("{path}: {e}")),
                    })?;
                let reader = port
                    .try_clone()
                    .map_err(|e| LinkError::Io(format!("{path}: {e}")))?;
                Ok((Box::new(reader), Box::new(port)))
            }
            Source::Port(port) => port
                .take()
                .ok_or_else(|| LinkError::Unavailable("serial port (already consumed)".into())),
        }
    }
}

/// Read loop; ends on EOF, read error, stop request, or when the link side
/// of the channel is gone.
fn read_loop(mut reader: PortReader, tx: &mpsc::Sender<LinkEvent>, stop: &AtomicBool) {
    let mut buf = [0u8; READ_BUF_SIZE];
    while !stop.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(LinkEvent::closed("serial port closed", None));
                return;
            }
            Ok(n) => {
                if stop.load(Ordering::Acquire) {
                    return;
                }
                if tx.send(LinkEvent::Data(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                let _ = tx.send(LinkEvent::closed(e.to_string(), e.raw_os_error()));
                return;
            }
        }
    }
}

impl Link for SerialLink {
    fn delivery(&self) -> Delivery {
        Delivery::ByteStream
    }

    fn describe(&self) -> String {
        match &self.source {
            Source::Device { path, .. } => format!("serial {path}"),
            Source::Port(_) => "serial port".into(),
        }
    }

    fn configure(&mut self, config: &TransportConfig) {
        if let Source::Device { baud_rate, .. } = &mut self.source {
            *baud_rate = config.baud_rate;
        }
    }

    fn open(&mut self) -> Result<(), LinkError> {
        self.close();
        let (reader, writer) = self.take_port()?;
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("serial-rx".into())
            .spawn(move || read_loop(reader, &tx, &flag))?;

        match self.baud_rate() {
            Some(baud) => info!("RPC[serial]: opened {} at {} baud", self.describe(), baud),
            None => info!("RPC[serial]: opened {}", self.describe()),
        }
        self.writer = Some(writer);
        self.rx = Some(rx);
        self.reader = Some(Reader { stop, handle });
        // The port is usable as soon as it is open.
        self.ready_pending = true;
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        if std::mem::take(&mut self.ready_pending) {
            return Some(LinkEvent::Ready);
        }
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                Some(LinkEvent::closed("serial reader stopped", None))
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::NotOpen)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.writer.take().is_some() {
            debug!("RPC[serial]: closed {}", self.describe());
        }
        self.rx = None;
        self.ready_pending = false;

        let Some(reader) = self.reader.take() else {
            return;
        };
        reader.stop.store(true, Ordering::Release);
        // Device reads time out, so the thread is gone within READ_POLL.
        // A caller-supplied reader may block indefinitely; it is left to
        // finish on its own.
        if matches!(self.source, Source::Device { .. }) && reader.handle.join().is_err() {
            warn!("RPC[serial]: reader thread panicked");
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ────────────────────────────────────────────────────
