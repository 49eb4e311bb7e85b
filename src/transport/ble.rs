//! BLE RPC link: binary RPC over GATT write/notify.
//!
//! The client writes request frames to the TX characteristic (write
//! without response) and the peer answers with notifications on the RX
//! characteristic.  Each notification carries exactly one envelope, so
//! this is a message-delivery link.
//!
//! The platform BLE stack sits behind [`GattPeripheral`], one connected
//! peripheral per link.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                   | Perms       |
//! |----------------|----------------------------------------|-------------|
//! | Service        | `0000e530-1212-efde-1523-785feabcd123` |             |
//! | RPC TX         | `0000e531-1212-efde-1523-785feabcd123` | Write       |
//! | RPC RX         | `0000e532-1212-efde-1523-785feabcd123` | Notify      |

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::error::LinkError;

use super::link::{Delivery, Link, LinkEvent};

// ── Constants ────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x0000e530_1212_efde_1523_785feabcd123;
pub const CHAR_RPC_TX: u128 = 0x0000e531_1212_efde_1523_785feabcd123;
pub const CHAR_RPC_RX: u128 = 0x0000e532_1212_efde_1523_785feabcd123;

/// Format a 128-bit UUID in its canonical hyphenated form.
pub fn uuid_string(uuid: u128) -> String {
    let hex = format!("{uuid:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// ── Peripheral port ──────────────────────────────────────────

/// Event reported by the platform BLE stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    Notification { characteristic: u128, value: Vec<u8> },
    Disconnected { reason: String },
}

/// Platform BLE central operations against one peripheral.
pub trait GattPeripheral {
    /// Connect and discover `service`.  `LinkError::Unavailable` when the
    /// host has no BLE adapter.
    fn connect(&mut self, service: u128) -> Result<(), LinkError>;

    /// Enable notifications on `characteristic`.
    fn start_notify(&mut self, characteristic: u128) -> Result<(), LinkError>;

    fn write_without_response(&mut self, characteristic: u128, data: &[u8])
    -> Result<(), LinkError>;

    /// Next queued event, non-blocking.
    fn poll(&mut self) -> Option<GattEvent>;

    fn disconnect(&mut self);

    /// Device name or address for logs.
    fn name(&self) -> String;
}

// ── Link ─────────────────────────────────────────────────────

pub struct GattLink<P: GattPeripheral> {
    peripheral: P,
    connected: bool,
    pending: VecDeque<LinkEvent>,
}

impl<P: GattPeripheral> GattLink<P> {
    pub fn new(peripheral: P) -> Self {
        Self {
            peripheral,
            connected: false,
            pending: VecDeque::new(),
        }
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }
}

impl<P: GattPeripheral> Link for GattLink<P> {
    fn delivery(&self) -> Delivery {
        Delivery::Message
    }

    fn describe(&self) -> String {
        format!("ble {}", self.peripheral.name())
    }

    fn open(&mut self) -> Result<(), LinkError> {
        self.peripheral.connect(SERVICE_UUID)?;
        if let Err(e) = self.peripheral.start_notify(CHAR_RPC_RX) {
            self.peripheral.disconnect();
            return Err(e);
        }
        info!("RPC[ble]: connected to {}", self.peripheral.name());
        self.connected = true;
        self.pending.clear();
        self.pending.push_back(LinkEvent::Ready);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if !self.connected {
            return None;
        }
        loop {
            match self.peripheral.poll()? {
                GattEvent::Notification {
                    characteristic,
                    value,
                } if characteristic == CHAR_RPC_RX => return Some(LinkEvent::Data(value)),
                GattEvent::Notification { characteristic, .. } => {
                    debug!(
                        "RPC[ble]: ignoring notification on {}",
                        uuid_string(characteristic)
                    );
                }
                GattEvent::Disconnected { reason } => {
                    warn!("RPC[ble]: peripheral disconnected: {}", reason);
                    self.connected = false;
                    return Some(LinkEvent::closed(reason, None));
                }
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotOpen);
        }
        self.peripheral.write_without_response(CHAR_RPC_TX, data)
    }

    fn close(&mut self) {
        if self.connected {
            self.peripheral.disconnect();
            self.connected = false;
        }
        self.pending.clear();
    }
}

// ── Tests ────────────────────────────────────────────────────
