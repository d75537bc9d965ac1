//! nwlink-core: calculator introspection and storage transfer over DfuSe.
//!
//! This crate identifies a connected calculator's hardware variant, decodes
//! the firmware metadata it keeps in memory, and backs up or installs its
//! user storage through a pluggable codec.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Magic values, fixed addresses, bounds-checked field readers
//! - **Model**: Hardware classification from the reported memory map
//! - **Platform Info / Slot Info**: Pure decoders for the on-device records
//! - **Transport**: Block read/write abstraction (nusb DfuSe, mock)
//! - **Storage**: Codec seam for the storage blob
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Orchestrates reads into one snapshot, backup and install
//!
//! # Example
//!
//! ```no_run
//! use nwlink_core::session::{DeviceSession, SessionConfig};
//! use nwlink_core::storage::RawStorageCodec;
//!
//! let transport = SessionConfig::default().open_transport().expect("no device");
//! let session = DeviceSession::new(transport);
//! let info = session.introspect().expect("introspection failed");
//! println!("{info}");
//! let storage = session.backup(&RawStorageCodec).expect("backup failed");
//! println!("{} bytes of storage", storage.0.len());
//! ```

pub mod diagnostic;
pub mod events;
pub mod model;
pub mod platform_info;
pub mod protocol;
pub mod session;
pub mod slot_info;
pub mod storage;
pub mod transport;

// Re-exports for convenience
pub use diagnostic::{Diagnostic, RecordKind};
pub use events::{NullObserver, SessionEvent, SessionObserver, SessionPhase, TracingObserver};
pub use model::{DeviceModel, MemorySegment, classify_model};
pub use platform_info::{
    AltFork, DecodeError, ExecutionMode, ExternalMemory, HeaderKind, PlatformInfo, StockFork,
    StorageRegion, decode_platform_info,
};
pub use session::{
    DeviceSession, SessionConfig, SessionError, backup_storage, install_storage, introspect,
};
pub use slot_info::SlotInfo;
pub use storage::{CodecError, RawImage, RawStorageCodec, StorageCodec};
pub use transport::{DfuTransport, MockTransport, NusbTransport, TransportError};
