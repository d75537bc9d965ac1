//! nusb-based DfuSe transport implementation.

use std::num::NonZeroU8;
use std::thread;
use std::time::{Duration, Instant};

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::dfuse::{DfuStatus, parse_memory_layout};
use super::traits::{DfuTransport, TransportError};
use crate::model::MemorySegment;
use crate::protocol::constants::*;

const LANGUAGE_US_ENGLISH: u16 = 0x0409;
const DFU_INTERFACE: u8 = 0;

/// nusb-based DfuSe transport.
pub struct NusbTransport {
    interface: Interface,
    transfer_size: u16,
    timeout: Duration,
    product: String,
    segments: Vec<MemorySegment>,
}

enum Direction {
    Read,
    Write,
}

impl Direction {
    fn error(&self, address: u32, message: impl ToString) -> TransportError {
        match self {
            Direction::Read => TransportError::ReadFailed {
                address,
                message: message.to_string(),
            },
            Direction::Write => TransportError::WriteFailed {
                address,
                message: message.to_string(),
            },
        }
    }

    /// Map a failed control transfer. nusb cancels a transfer whose timeout
    /// expires, so `Cancelled` is reported as a timeout.
    fn transfer_error(
        &self,
        address: u32,
        err: TransferError,
        timeout: Duration,
    ) -> TransportError {
        match err {
            TransferError::Cancelled => TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            TransferError::Disconnected => TransportError::Disconnected,
            other => self.error(address, other),
        }
    }
}

impl NusbTransport {
    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    /// Use a different DfuSe transfer size (must match the device's wTransferSize).
    pub fn with_transfer_size(mut self, transfer_size: u16) -> Self {
        self.transfer_size = transfer_size.max(1);
        self
    }

    /// Use a different per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();
        let product = device_info.product_string().unwrap_or_default().to_string();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            product = %product,
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device.claim_interface(DFU_INTERFACE).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface: DFU_INTERFACE,
                message: e.to_string(),
            }
        })?;

        let timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS);

        // Each alt setting of the DFU interface names one memory region.
        let mut string_indices: Vec<NonZeroU8> = Vec::new();
        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == DFU_INTERFACE {
                    for alt in iface.alt_settings() {
                        if let Some(index) = alt.string_index() {
                            string_indices.push(index);
                        }
                    }
                }
            }
        }

        let mut segments = Vec::new();
        for index in string_indices {
            let layout = match device
                .get_string_descriptor(index, LANGUAGE_US_ENGLISH, timeout)
                .wait()
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(index = index.get(), error = %e, "Could not read alt setting name");
                    continue;
                }
            };
            match parse_memory_layout(&layout) {
                Ok(parsed) => segments.extend(parsed),
                Err(e) => debug!(layout = %layout, error = %e, "Skipping alt setting"),
            }
        }

        info!(segments = segments.len(), "Device opened successfully");

        Ok(Self {
            interface,
            transfer_size: DEFAULT_TRANSFER_SIZE,
            timeout,
            product,
            segments,
        })
    }

    fn control_out(&self, request: u8, value: u16, data: &[u8]) -> Result<(), TransferError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value,
                    index: DFU_INTERFACE as u16,
                    data,
                },
                self.timeout,
            )
            .wait()
    }

    fn control_in(&self, request: u8, value: u16, length: u16) -> Result<Vec<u8>, TransferError> {
        self.interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value,
                    index: DFU_INTERFACE as u16,
                    length,
                },
                self.timeout,
            )
            .wait()
    }

    fn get_status(&self, dir: &Direction, address: u32) -> Result<DfuStatus, TransportError> {
        let bytes = self
            .control_in(DFU_GETSTATUS, 0, DfuStatus::SIZE as u16)
            .map_err(|e| dir.transfer_error(address, e, self.timeout))?;
        DfuStatus::from_bytes(&bytes).ok_or_else(|| dir.error(address, "short GETSTATUS reply"))
    }

    /// Poll GETSTATUS until the device leaves its busy states, for at most
    /// one request timeout.
    fn wait_while_busy(&self, dir: &Direction, address: u32) -> Result<DfuStatus, TransportError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let status = self.get_status(dir, address)?;
            if status.is_error() {
                if let Err(e) = self.control_out(DFU_CLRSTATUS, 0, &[]) {
                    warn!(error = %e, "CLRSTATUS after error status failed");
                }
                return Err(TransportError::DfuStatus {
                    status: status.status,
                    state: status.state,
                });
            }
            if !status.is_busy() {
                return Ok(status);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            let poll = Duration::from_millis(status.poll_timeout_ms as u64);
            thread::sleep(poll.min(deadline - now));
        }
    }

    /// Return the device to dfuIDLE.
    fn abort_to_idle(&self, dir: &Direction, address: u32) -> Result<(), TransportError> {
        self.control_out(DFU_ABORT, 0, &[])
            .map_err(|e| dir.transfer_error(address, e, self.timeout))?;
        let status = self.get_status(dir, address)?;
        if status.is_error() {
            self.control_out(DFU_CLRSTATUS, 0, &[])
                .map_err(|e| dir.transfer_error(address, e, self.timeout))?;
        }
        Ok(())
    }

    fn set_address(&self, dir: &Direction, address: u32) -> Result<(), TransportError> {
        let mut command = [0u8; 5];
        command[0] = DFUSE_SET_ADDRESS;
        command[1..].copy_from_slice(&address.to_le_bytes());
        self.control_out(DFU_DNLOAD, 0, &command)
            .map_err(|e| dir.transfer_error(address, e, self.timeout))?;
        self.wait_while_busy(dir, address)?;
        Ok(())
    }
}

impl DfuTransport for NusbTransport {
    #[instrument(skip_all, fields(address = %format!("0x{:08X}", address), length))]
    fn read_block(&self, address: u32, length: u32) -> Result<Vec<u8>, TransportError> {
        let dir = Direction::Read;
        let expected = length as usize;
        let transfer = self.transfer_size as usize;

        self.abort_to_idle(&dir, address)?;
        self.set_address(&dir, address)?;
        self.abort_to_idle(&dir, address)?;

        let mut data = Vec::with_capacity(expected);
        let mut block = DFUSE_FIRST_DATA_BLOCK;
        while data.len() < expected {
            let want = (expected - data.len()).min(transfer);
            let chunk = self
                .control_in(DFU_UPLOAD, block, want as u16)
                .map_err(|e| dir.transfer_error(address, e, self.timeout))?;
            data.extend_from_slice(&chunk[..chunk.len().min(want)]);
            if chunk.len() < want {
                break;
            }
            block = block
                .checked_add(1)
                .ok_or_else(|| dir.error(address, "block number overflow"))?;
        }

        self.abort_to_idle(&dir, address)?;

        if data.len() < expected {
            return Err(TransportError::ShortRead {
                address,
                expected,
                actual: data.len(),
            });
        }
        debug!(bytes_read = data.len(), "Read complete");
        Ok(data)
    }

    #[instrument(skip_all, fields(address = %format!("0x{:08X}", address), len = data.len()))]
    fn write_block(&self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        let dir = Direction::Write;

        self.abort_to_idle(&dir, address)?;
        self.set_address(&dir, address)?;

        let mut block = DFUSE_FIRST_DATA_BLOCK;
        for chunk in data.chunks(self.transfer_size as usize) {
            self.control_out(DFU_DNLOAD, block, chunk)
                .map_err(|e| dir.transfer_error(address, e, self.timeout))?;
            self.wait_while_busy(&dir, address)?;
            block = block
                .checked_add(1)
                .ok_or_else(|| dir.error(address, "block number overflow"))?;
        }

        self.abort_to_idle(&dir, address)?;
        debug!(bytes_written = data.len(), "Write complete");
        Ok(())
    }

    fn memory_segments(&self) -> Vec<MemorySegment> {
        self.segments.clone()
    }

    fn product_name(&self) -> String {
        self.product.clone()
    }
}
