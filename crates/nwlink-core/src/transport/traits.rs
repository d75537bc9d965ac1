//! Block transport abstraction.
//!
//! Defines the `DfuTransport` trait for addressed block reads and writes,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

use crate::model::MemorySegment;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Invalid DfuSe memory layout: {0:?}")]
    InvalidMemoryLayout(String),

    #[error("Write failed at 0x{address:08X}: {message}")]
    WriteFailed { address: u32, message: String },

    #[error("Read failed at 0x{address:08X}: {message}")]
    ReadFailed { address: u32, message: String },

    #[error("Short read at 0x{address:08X}: expected {expected} bytes, got {actual}")]
    ShortRead {
        address: u32,
        expected: usize,
        actual: usize,
    },

    #[error("DFU error status {status} in state {state}")]
    DfuStatus { status: u8, state: u8 },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Abstract block transport to a connected calculator.
///
/// Every call is a blocking request/response. Implementations do not retry.
pub trait DfuTransport: Send + Sync {
    /// Read `length` bytes starting at `address`.
    fn read_block(&self, address: u32, length: u32) -> Result<Vec<u8>, TransportError>;

    /// Write `data` starting at `address`.
    fn write_block(&self, address: u32, data: &[u8]) -> Result<(), TransportError>;

    /// Memory map reported by the device when it was opened.
    fn memory_segments(&self) -> Vec<MemorySegment>;

    /// USB product string reported by the device.
    fn product_name(&self) -> String;
}

impl<T: DfuTransport + ?Sized> DfuTransport for &T {
    fn read_block(&self, address: u32, length: u32) -> Result<Vec<u8>, TransportError> {
        (**self).read_block(address, length)
    }

    fn write_block(&self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_block(address, data)
    }

    fn memory_segments(&self) -> Vec<MemorySegment> {
        (**self).memory_segments()
    }

    fn product_name(&self) -> String {
        (**self).product_name()
    }
}
