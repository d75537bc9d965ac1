//! Device session - sequences block reads into a platform info snapshot and
//! drives storage backup/install on top of it.
//!
//! A [`DeviceSession`] owns its transport; nothing about the connection is
//! global, so several sessions can coexist. Calls on one session must not
//! overlap since the transport carries one transfer at a time.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::diagnostic::Diagnostic;
use crate::events::{SessionEvent, SessionObserver, SessionPhase, TracingObserver};
use crate::model::{DeviceModel, MemorySegment, classify_model};
use crate::platform_info::{DecodeError, ExecutionMode, HeaderKind, PlatformInfo, StorageRegion};
use crate::protocol::constants::*;
use crate::slot_info::SlotInfo;
use crate::storage::{CodecError, StorageCodec};
use crate::transport::{DfuTransport, NusbTransport, TransportError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Storage codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Device platform info has no valid magic")]
    InvalidPlatformInfo,

    #[error("Device platform info reports no storage region")]
    NoStorageRegion,

    #[error("Storage region 0x{address:08X}+{size} exceeds the address space")]
    StorageRegionOverflow { address: u32, size: u32 },

    #[error("Encoded storage is {encoded} bytes, device capacity is {capacity}")]
    SizeMismatch { encoded: usize, capacity: u32 },
}

/// Configuration for opening a device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
    /// DfuSe transfer size in bytes.
    pub transfer_size: u16,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Report modified hardware as its official model.
    pub exclude_modded: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vendor_id: NUMWORKS_VENDOR_ID,
            product_id: NUMWORKS_PRODUCT_ID,
            transfer_size: DEFAULT_TRANSFER_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            exclude_modded: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Open the configured device over USB.
    pub fn open_transport(&self) -> Result<NusbTransport, TransportError> {
        Ok(NusbTransport::open_with_ids(self.vendor_id, self.product_id)?
            .with_transfer_size(self.transfer_size)
            .with_timeout(std::time::Duration::from_millis(self.timeout_ms)))
    }
}

/// One connected device and the observer following it.
pub struct DeviceSession<T: DfuTransport, O: SessionObserver = TracingObserver> {
    transport: T,
    observer: Arc<O>,
}

impl<T: DfuTransport> DeviceSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }
}

impl<T: DfuTransport, O: SessionObserver> DeviceSession<T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(transport: T, observer: Arc<O>) -> Self {
        Self {
            transport,
            observer,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    fn link(&self) -> ObservableTransport<'_, T, O> {
        ObservableTransport {
            inner: &self.transport,
            observer: &self.observer,
        }
    }

    fn report(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            self.emit(SessionEvent::Diagnostic(*diagnostic));
        }
    }

    /// Classify the connected hardware from its reported memory map.
    pub fn classify_model(&self, exclude_modded: bool) -> DeviceModel {
        let segments: Vec<MemorySegment> = self.transport.memory_segments();
        classify_model(&segments, &self.transport.product_name(), exclude_modded)
    }

    /// Read and merge everything the device says about its firmware.
    #[instrument(skip(self))]
    pub fn introspect(&self) -> Result<PlatformInfo, SessionError> {
        let link = self.link();

        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::SlotProbe,
        });
        let slot = SlotInfo::decode(&link.read_block(SLOT_INFO_ADDRESS, SLOT_INFO_LEN)?)?;

        if !slot.magic_valid {
            self.emit(SessionEvent::PhaseChanged {
                to: SessionPhase::LegacyPlatformInfo,
            });
            let data = link.read_block(LEGACY_PLATFORM_INFO_ADDRESS, PLATFORM_INFO_READ_LEN)?;
            let info = PlatformInfo::decode(&data, ExecutionMode::Legacy, HeaderKind::Kernel)?;
            self.report(&info.diagnostics);
            info!(
                valid = info.magic_valid,
                version = %info.firmware_version,
                "Legacy platform info"
            );
            return Ok(info);
        }

        self.report(&slot.diagnostics);
        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::BootloaderHeaders,
        });

        let userland = link.read_block(slot.userland_header_addr, PLATFORM_INFO_READ_LEN)?;
        let mut info =
            PlatformInfo::decode(&userland, ExecutionMode::Bootloader, HeaderKind::Userland)?;
        let kernel = link.read_block(slot.kernel_header_addr, PLATFORM_INFO_READ_LEN)?;
        let kernel = PlatformInfo::decode(&kernel, ExecutionMode::Bootloader, HeaderKind::Kernel)?;

        if !info.magic_valid {
            warn!(
                address = %format!("0x{:08X}", slot.userland_header_addr),
                "Userland header has no valid magic"
            );
            return Ok(PlatformInfo::default());
        }

        // The userland header never carries a commit hash.
        info.commit_hash = kernel.commit_hash;
        info.diagnostics.extend(kernel.diagnostics);
        self.report(&info.diagnostics);
        info.diagnostics = slot
            .diagnostics
            .iter()
            .copied()
            .chain(info.diagnostics)
            .collect();
        info.active_slot = Some(slot);

        info!(
            version = %info.firmware_version,
            commit = %info.commit_hash,
            slot = ?info.active_slot.as_ref().and_then(|s| s.slot_name.as_deref()),
            "Bootloader platform info"
        );
        Ok(info)
    }

    /// Read the storage region and hand it to `codec`.
    #[instrument(skip_all)]
    pub fn backup<C: StorageCodec>(&self, codec: &C) -> Result<C::Image, SessionError> {
        let info = self.introspect()?;
        let region = storage_region_of(&info)?;
        let length = span(region, STORAGE_FRAMING_LEN)?;

        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::Backup,
        });
        let data = self.link().read_block(region.address, length)?;
        let image = codec.decode(&data, info.alt_fork_installed())?;

        self.emit(SessionEvent::Complete);
        Ok(image)
    }

    /// Encode `image` with `codec` and write it over the storage region.
    #[instrument(skip_all)]
    pub fn install<C: StorageCodec>(
        &self,
        codec: &C,
        image: &C::Image,
    ) -> Result<(), SessionError> {
        let info = self.introspect()?;
        let region = storage_region_of(&info)?;
        span(region, 0)?;

        let encoded = codec.encode(image, region.size, info.alt_fork_installed())?;
        if encoded.len() > region.size as usize {
            return Err(SessionError::SizeMismatch {
                encoded: encoded.len(),
                capacity: region.size,
            });
        }

        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::Install,
        });
        self.link().write_block(region.address, &encoded)?;

        self.emit(SessionEvent::Complete);
        Ok(())
    }
}

fn storage_region_of(info: &PlatformInfo) -> Result<StorageRegion, SessionError> {
    if !info.magic_valid {
        return Err(SessionError::InvalidPlatformInfo);
    }
    info.storage_region.ok_or(SessionError::NoStorageRegion)
}

/// Length of a transfer covering `region` plus `extra` trailing bytes. The
/// whole transfer must end inside the 32-bit address space.
fn span(region: StorageRegion, extra: u32) -> Result<u32, SessionError> {
    region
        .size
        .checked_add(extra)
        .filter(|length| u64::from(region.address) + u64::from(*length) <= 1 << 32)
        .ok_or(SessionError::StorageRegionOverflow {
            address: region.address,
            size: region.size,
        })
}

/// Read the connected device's platform info.
pub fn introspect<T: DfuTransport>(transport: &T) -> Result<PlatformInfo, SessionError> {
    DeviceSession::new(transport).introspect()
}

/// Back up the device's storage through `codec`.
pub fn backup_storage<T: DfuTransport, C: StorageCodec>(
    transport: &T,
    codec: &C,
) -> Result<C::Image, SessionError> {
    DeviceSession::new(transport).backup(codec)
}

/// Install `image` as the device's storage through `codec`.
pub fn install_storage<T: DfuTransport, C: StorageCodec>(
    transport: &T,
    codec: &C,
    image: &C::Image,
) -> Result<(), SessionError> {
    DeviceSession::new(transport).install(codec, image)
}

/// Transport wrapper that emits block events.
struct ObservableTransport<'a, T: DfuTransport, O: SessionObserver> {
    inner: &'a T,
    observer: &'a Arc<O>,
}

impl<T: DfuTransport, O: SessionObserver> DfuTransport for ObservableTransport<'_, T, O> {
    fn read_block(&self, address: u32, length: u32) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read_block(address, length);
        if let Ok(data) = &res {
            self.observer.on_event(&SessionEvent::BlockRead {
                address,
                length: data.len(),
            });
        }
        res
    }

    fn write_block(&self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        let res = self.inner.write_block(address, data);
        if res.is_ok() {
            self.observer.on_event(&SessionEvent::BlockWritten {
                address,
                length: data.len(),
            });
        }
        res
    }

    fn memory_segments(&self) -> Vec<MemorySegment> {
        self.inner.memory_segments()
    }

    fn product_name(&self) -> String {
        self.inner.product_name()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::NullObserver;
    use crate::storage::{RawImage, RawStorageCodec};
    use crate::transport::MockTransport;

    const KERNEL_ADDR: u32 = 0x9000_0008;
    const USERLAND_ADDR: u32 = 0x9001_0000;
    const STORAGE_ADDR: u32 = 0x2400_0000;
    const STORAGE_SIZE: u32 = 0x40;

    fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn slot_record(kernel: u32, userland: u32) -> Vec<u8> {
        let mut data = vec![0; 16];
        put(&mut data, 0, &SLOT_INFO_MAGIC.to_be_bytes());
        put(&mut data, 4, &kernel.to_le_bytes());
        put(&mut data, 8, &userland.to_le_bytes());
        put(&mut data, 12, &SLOT_INFO_MAGIC.to_be_bytes());
        data
    }

    fn kernel_header(commit: &str) -> Vec<u8> {
        let mut data = vec![0; PLATFORM_INFO_READ_LEN as usize];
        put(&mut data, 0, &PLATFORM_INFO_MAGIC.to_be_bytes());
        put(&mut data, 0x04, b"3.1.0");
        put(&mut data, 0x0C, commit.as_bytes());
        put(&mut data, 0x14, &PLATFORM_INFO_MAGIC.to_be_bytes());
        data
    }

    fn userland_header(with_alt_fork: bool) -> Vec<u8> {
        let mut data = vec![0; PLATFORM_INFO_READ_LEN as usize];
        put(&mut data, 0, &USERLAND_HEADER_MAGIC.to_be_bytes());
        put(&mut data, 0x04, b"3.1.0");
        put(&mut data, 0x0C, &STORAGE_ADDR.to_le_bytes());
        put(&mut data, 0x10, &STORAGE_SIZE.to_le_bytes());
        put(&mut data, 0x14, &0x9001_0000u32.to_le_bytes());
        put(&mut data, 0x18, &0x9040_0000u32.to_le_bytes());
        put(&mut data, 0x1C, &0x2000_0000u32.to_le_bytes());
        put(&mut data, 0x20, &0x2004_0000u32.to_le_bytes());
        put(&mut data, 0x24, &USERLAND_HEADER_MAGIC.to_be_bytes());
        if with_alt_fork {
            put(&mut data, 0x50, &ALT_FORK_MAGIC.to_be_bytes());
            put(&mut data, 0x54, b"1.0.0");
            put(&mut data, 0x68, &ALT_FORK_MAGIC.to_be_bytes());
        }
        data
    }

    fn bootloader_device(with_alt_fork: bool) -> MockTransport {
        let mock = MockTransport::new();
        mock.map(SLOT_INFO_ADDRESS, &slot_record(KERNEL_ADDR, USERLAND_ADDR));
        mock.map(KERNEL_ADDR, &kernel_header("c0ffee42"));
        mock.map(USERLAND_ADDR, &userland_header(with_alt_fork));
        let storage: Vec<u8> = (0..STORAGE_SIZE + STORAGE_FRAMING_LEN)
            .map(|i| i as u8)
            .collect();
        mock.map(STORAGE_ADDR, &storage);
        mock
    }

    fn legacy_device() -> MockTransport {
        let mock = MockTransport::new();
        mock.map(SLOT_INFO_ADDRESS, &[0; 16]);
        let mut record = vec![0; PLATFORM_INFO_READ_LEN as usize];
        put(&mut record, 0, &PLATFORM_INFO_MAGIC.to_be_bytes());
        put(&mut record, 0x04, b"12.4.0");
        put(&mut record, 0x0C, b"1a2b3c4d");
        put(&mut record, 0x14, &STORAGE_ADDR.to_le_bytes());
        put(&mut record, 0x18, &STORAGE_SIZE.to_le_bytes());
        mock.map(LEGACY_PLATFORM_INFO_ADDRESS, &record);
        mock
    }

    #[derive(Default)]
    struct RecordingObserver(Mutex<Vec<SessionEvent>>);

    impl SessionObserver for RecordingObserver {
        fn on_event(&self, event: &SessionEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    /// Codec that records the fork flag and emits a fixed-size image.
    struct FixedCodec {
        encoded_len: usize,
        seen_alt_fork: Mutex<Option<bool>>,
    }

    impl FixedCodec {
        fn new(encoded_len: usize) -> Self {
            Self {
                encoded_len,
                seen_alt_fork: Mutex::new(None),
            }
        }
    }

    impl StorageCodec for FixedCodec {
        type Image = usize;

        fn decode(&self, data: &[u8], alt_fork_installed: bool) -> Result<usize, CodecError> {
            *self.seen_alt_fork.lock().unwrap() = Some(alt_fork_installed);
            Ok(data.len())
        }

        fn encode(
            &self,
            _image: &usize,
            _max_size: u32,
            alt_fork_installed: bool,
        ) -> Result<Vec<u8>, CodecError> {
            *self.seen_alt_fork.lock().unwrap() = Some(alt_fork_installed);
            Ok(vec![0xAA; self.encoded_len])
        }
    }

    #[test]
    fn test_bootloader_introspection_merges_headers() {
        let mock = bootloader_device(false);
        let info = introspect(&mock).unwrap();

        assert!(info.magic_valid);
        assert_eq!(info.mode, Some(ExecutionMode::Bootloader));
        assert_eq!(info.commit_hash, "c0ffee42");
        assert_eq!(
            info.storage_region,
            Some(StorageRegion {
                address: STORAGE_ADDR,
                size: STORAGE_SIZE
            })
        );
        assert!(info.external_memory.is_some());
        let slot = info.active_slot.unwrap();
        assert_eq!(slot.slot_name.as_deref(), Some("A"));
        assert!(info.diagnostics.is_empty());

        assert_eq!(
            mock.get_reads(),
            vec![
                (SLOT_INFO_ADDRESS, SLOT_INFO_LEN),
                (USERLAND_ADDR, PLATFORM_INFO_READ_LEN),
                (KERNEL_ADDR, PLATFORM_INFO_READ_LEN),
            ]
        );
    }

    #[test]
    fn test_kernel_diagnostics_are_carried_over() {
        let mock = bootloader_device(false);
        let mut kernel = kernel_header("c0ffee42");
        put(&mut kernel, 0x14, &[0, 0, 0, 0]);
        mock.map(KERNEL_ADDR, &kernel);

        let observer = Arc::new(RecordingObserver::default());
        let session = DeviceSession::with_observer(&mock, observer.clone());
        let info = session.introspect().unwrap();
        assert_eq!(info.diagnostics.len(), 1);
        assert_eq!(info.commit_hash, "c0ffee42");

        let events = observer.0.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Diagnostic(Diagnostic::StructuralWarning { .. })
        )));
        let reads = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::BlockRead { .. }))
            .count();
        assert_eq!(reads, 3);
    }

    #[test]
    fn test_legacy_introspection_reads_once_more() {
        let mock = legacy_device();
        let info = introspect(&mock).unwrap();

        assert!(info.magic_valid);
        assert!(info.is_legacy_layout);
        assert_eq!(info.mode, Some(ExecutionMode::Legacy));
        assert_eq!(info.commit_hash, "1a2b3c4d");
        assert_eq!(info.active_slot, None);
        assert_eq!(
            mock.get_reads(),
            vec![
                (SLOT_INFO_ADDRESS, SLOT_INFO_LEN),
                (LEGACY_PLATFORM_INFO_ADDRESS, PLATFORM_INFO_READ_LEN),
            ]
        );
    }

    #[test]
    fn test_invalid_userland_header_yields_invalid_record() {
        let mock = bootloader_device(false);
        mock.map(USERLAND_ADDR, &[0; PLATFORM_INFO_READ_LEN as usize]);
        let info = introspect(&mock).unwrap();
        assert_eq!(info, PlatformInfo::default());
    }

    #[test]
    fn test_transport_failure_propagates() {
        let mock = bootloader_device(false);
        mock.fail_reads_at(KERNEL_ADDR);
        assert!(matches!(
            introspect(&mock),
            Err(SessionError::Transport(TransportError::ReadFailed { address, .. }))
                if address == KERNEL_ADDR
        ));
    }

    #[test]
    fn test_backup_reads_region_plus_framing() {
        let mock = bootloader_device(true);
        let codec = FixedCodec::new(0);
        let len = backup_storage(&mock, &codec).unwrap();

        assert_eq!(len, (STORAGE_SIZE + STORAGE_FRAMING_LEN) as usize);
        assert_eq!(*codec.seen_alt_fork.lock().unwrap(), Some(true));
        assert_eq!(
            mock.get_reads().last(),
            Some(&(STORAGE_ADDR, STORAGE_SIZE + STORAGE_FRAMING_LEN))
        );
    }

    #[test]
    fn test_raw_backup_then_install_round_trips() {
        let mock = bootloader_device(false);
        let image = backup_storage(&mock, &RawStorageCodec).unwrap();
        assert_eq!(image.0.len(), STORAGE_SIZE as usize);

        install_storage(&mock, &RawStorageCodec, &image).unwrap();
        let writes = mock.get_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, STORAGE_ADDR);
        assert_eq!(writes[0].1, image.0);
    }

    #[test]
    fn test_install_rejects_oversized_image_without_writing() {
        let mock = bootloader_device(false);
        let codec = FixedCodec::new(STORAGE_SIZE as usize + 1);
        let result = install_storage(&mock, &codec, &0);

        assert!(matches!(
            result,
            Err(SessionError::SizeMismatch { encoded, capacity })
                if encoded == STORAGE_SIZE as usize + 1 && capacity == STORAGE_SIZE
        ));
        assert!(mock.get_writes().is_empty());
        assert_eq!(*codec.seen_alt_fork.lock().unwrap(), Some(false));
    }

    #[test]
    fn test_install_codec_failure_writes_nothing() {
        let mock = bootloader_device(false);
        let image = RawImage(vec![0; STORAGE_SIZE as usize + 1]);
        assert!(matches!(
            install_storage(&mock, &RawStorageCodec, &image),
            Err(SessionError::Codec(CodecError::ImageTooLarge { .. }))
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_backup_needs_valid_platform_info() {
        let mock = MockTransport::new();
        mock.map(SLOT_INFO_ADDRESS, &[0; 16]);
        mock.map(LEGACY_PLATFORM_INFO_ADDRESS, &[0; PLATFORM_INFO_READ_LEN as usize]);
        assert!(matches!(
            backup_storage(&mock, &RawStorageCodec),
            Err(SessionError::InvalidPlatformInfo)
        ));
    }

    #[test]
    fn test_backup_rejects_region_at_address_space_end() {
        let mock = bootloader_device(false);
        let mut header = userland_header(false);
        put(&mut header, 0x10, &0xFFFF_FFFCu32.to_le_bytes());
        mock.map(USERLAND_ADDR, &header);

        assert!(matches!(
            backup_storage(&mock, &RawStorageCodec),
            Err(SessionError::StorageRegionOverflow {
                address: STORAGE_ADDR,
                size: 0xFFFF_FFFC
            })
        ));
        assert_eq!(mock.get_reads().len(), 3);
    }

    #[test]
    fn test_backup_rejects_region_wrapping_past_address_space() {
        let mock = bootloader_device(false);
        let mut header = userland_header(false);
        put(&mut header, 0x0C, &0xFFFF_FFF0u32.to_le_bytes());
        put(&mut header, 0x10, &0x10u32.to_le_bytes());
        mock.map(USERLAND_ADDR, &header);

        assert!(matches!(
            backup_storage(&mock, &RawStorageCodec),
            Err(SessionError::StorageRegionOverflow {
                address: 0xFFFF_FFF0,
                size: 0x10
            })
        ));
        // Without the framing bytes the region ends exactly at the top.
        install_storage(&mock, &RawStorageCodec, &RawImage(vec![1, 2, 3])).unwrap();
        assert_eq!(mock.get_writes().len(), 1);
        assert_eq!(mock.get_reads().len(), 6);
    }

    #[test]
    fn test_install_rejects_region_past_address_space() {
        let mock = bootloader_device(false);
        let mut header = userland_header(false);
        put(&mut header, 0x0C, &0xFFFF_FF00u32.to_le_bytes());
        put(&mut header, 0x10, &0x200u32.to_le_bytes());
        mock.map(USERLAND_ADDR, &header);

        assert!(matches!(
            install_storage(&mock, &RawStorageCodec, &RawImage(vec![1, 2, 3])),
            Err(SessionError::StorageRegionOverflow { .. })
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_slot_diagnostics_are_kept_in_the_record() {
        let kernel_addr = 0x9100_0008;
        let mock = bootloader_device(false);
        mock.map(SLOT_INFO_ADDRESS, &slot_record(kernel_addr, USERLAND_ADDR));
        mock.map(kernel_addr, &kernel_header("c0ffee42"));

        let observer = Arc::new(RecordingObserver::default());
        let info = DeviceSession::with_observer(&mock, observer.clone())
            .introspect()
            .unwrap();

        let unresolved = Diagnostic::UnresolvedSlot {
            base: 0x9100_0000,
        };
        assert_eq!(info.diagnostics, vec![unresolved]);
        assert_eq!(info.active_slot.as_ref().unwrap().slot_name, None);
        assert!(info.to_string().contains("0x91000000"));

        let dump = toml::to_string_pretty(&info).unwrap();
        assert!(dump.contains("unresolved_slot"), "{dump}");

        // Reported once, not again when merged into the record.
        let events = observer.0.lock().unwrap();
        let reported = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Diagnostic(_)))
            .count();
        assert_eq!(reported, 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let observer = Arc::new(NullObserver);
        let legacy = DeviceSession::with_observer(legacy_device(), observer.clone());
        let slotted = DeviceSession::with_observer(bootloader_device(false), observer);

        assert!(legacy.introspect().unwrap().is_legacy_layout);
        assert!(slotted.introspect().unwrap().active_slot.is_some());
        assert_eq!(legacy.transport().get_reads().len(), 2);
        assert_eq!(slotted.transport().get_reads().len(), 3);
    }

    #[test]
    fn test_session_classifies_model() {
        let mut mock = MockTransport::new();
        mock.set_segments(vec![
            MemorySegment::new(0x0800_0000, 0x0801_0000),
            MemorySegment::new(0x9000_0000, 0x9080_0000),
        ]);
        let session = DeviceSession::new(mock);
        assert_eq!(session.classify_model(false), DeviceModel::Model0110);
    }

    #[test]
    fn test_session_classifies_by_product_name() {
        let mut mock = MockTransport::new();
        mock.set_segments(vec![MemorySegment::new(0x0800_0000, 0x0810_0000)]);
        mock.set_product("Upsilon Bootloader");
        let session = DeviceSession::new(mock);
        assert_eq!(session.classify_model(false), DeviceModel::Model0110);
        assert_eq!(session.classify_model(true), DeviceModel::Model0110);

        let mut mock = MockTransport::new();
        mock.set_segments(vec![MemorySegment::new(0x0800_0000, 0x0810_0000)]);
        mock.set_product("Upsilon Calculator");
        assert_eq!(
            DeviceSession::new(mock).classify_model(false),
            DeviceModel::Model0100
        );
    }

    #[test]
    fn test_config_default_keeps_modded_labels() {
        assert!(!SessionConfig::default().exclude_modded);
    }

    #[test]
    fn test_config_defaults_and_partial_toml() {
        let config: SessionConfig = toml::from_str("exclude_modded = true\n").unwrap();
        assert!(config.exclude_modded);
        assert_eq!(config.vendor_id, NUMWORKS_VENDOR_ID);
        assert_eq!(config.transfer_size, DEFAULT_TRANSFER_SIZE);

        let text = toml::to_string_pretty(&config).unwrap();
        let back: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
