//! Mock block transport for testing.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use super::traits::{DfuTransport, TransportError};
use crate::model::MemorySegment;

/// Mock transport backed by a sparse memory image.
pub struct MockTransport {
    /// Mapped regions keyed by start address.
    memory: Arc<Mutex<BTreeMap<u32, Vec<u8>>>>,
    /// Captured reads as (address, length).
    read_log: Arc<Mutex<Vec<(u32, u32)>>>,
    /// Captured writes as (address, data).
    write_log: Arc<Mutex<Vec<(u32, Vec<u8>)>>>,
    /// Addresses whose reads fail.
    failing_reads: Arc<Mutex<HashSet<u32>>>,
    /// Simulated descriptor data.
    segments: Vec<MemorySegment>,
    product: String,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            memory: Arc::new(Mutex::new(BTreeMap::new())),
            read_log: Arc::new(Mutex::new(Vec::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            failing_reads: Arc::new(Mutex::new(HashSet::new())),
            segments: Vec::new(),
            product: "NumWorks Calculator".to_string(),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Map `data` at `address`.
    pub fn map(&self, address: u32, data: &[u8]) {
        self.memory.lock().unwrap().insert(address, data.to_vec());
    }

    /// Make every read starting at `address` fail.
    pub fn fail_reads_at(&self, address: u32) {
        self.failing_reads.lock().unwrap().insert(address);
    }

    /// Get all captured reads.
    pub fn get_reads(&self) -> Vec<(u32, u32)> {
        self.read_log.lock().unwrap().clone()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<(u32, Vec<u8>)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Set the reported memory map.
    pub fn set_segments(&mut self, segments: Vec<MemorySegment>) {
        self.segments = segments;
    }

    /// Set the reported product string.
    pub fn set_product(&mut self, product: &str) {
        self.product = product.to_string();
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if *self.connected.lock().unwrap() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DfuTransport for MockTransport {
    fn read_block(&self, address: u32, length: u32) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        self.read_log.lock().unwrap().push((address, length));

        if self.failing_reads.lock().unwrap().contains(&address) {
            return Err(TransportError::ReadFailed {
                address,
                message: "injected failure".into(),
            });
        }

        let memory = self.memory.lock().unwrap();
        let (start, data) = memory
            .range(..=address)
            .next_back()
            .ok_or(TransportError::ReadFailed {
                address,
                message: "unmapped".into(),
            })?;
        let offset = (address - start) as usize;
        let end = offset + length as usize;
        data.get(offset..end)
            .map(<[u8]>::to_vec)
            .ok_or(TransportError::ReadFailed {
                address,
                message: "unmapped".into(),
            })
    }

    fn write_block(&self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        self.check_connected()?;
        self.write_log.lock().unwrap().push((address, data.to_vec()));
        Ok(())
    }

    fn memory_segments(&self) -> Vec<MemorySegment> {
        self.segments.clone()
    }

    fn product_name(&self) -> String {
        self.product.clone()
    }
}
