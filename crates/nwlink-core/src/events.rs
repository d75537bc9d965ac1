//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front-end) to follow a session's block
//! transfers and findings without tight coupling to the core logic.

use std::fmt;

use crate::diagnostic::Diagnostic;

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Reading the boot slot table.
    SlotProbe,
    /// Reading bootloader-resident kernel and userland headers.
    BootloaderHeaders,
    /// Reading the legacy platform info record.
    LegacyPlatformInfo,
    /// Reading the storage region.
    Backup,
    /// Writing the storage region.
    Install,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::SlotProbe => write!(f, "Slot Probe"),
            SessionPhase::BootloaderHeaders => write!(f, "Bootloader Headers"),
            SessionPhase::LegacyPlatformInfo => write!(f, "Legacy Platform Info"),
            SessionPhase::Backup => write!(f, "Backup"),
            SessionPhase::Install => write!(f, "Install"),
        }
    }
}

/// Events emitted by a device session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Phase entered.
    PhaseChanged { to: SessionPhase },
    /// Block read completed.
    BlockRead { address: u32, length: usize },
    /// Block write completed.
    BlockWritten { address: u32, length: usize },
    /// Non-fatal decoding finding.
    Diagnostic(Diagnostic),
    /// Operation finished successfully.
    Complete,
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait SessionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::PhaseChanged { to } => {
                tracing::info!(phase = %to, "Phase changed");
            }
            SessionEvent::BlockRead { address, length } => {
                tracing::debug!(
                    address = %format!("0x{:08X}", address),
                    len = length,
                    "Block read"
                );
            }
            SessionEvent::BlockWritten { address, length } => {
                tracing::debug!(
                    address = %format!("0x{:08X}", address),
                    len = length,
                    "Block written"
                );
            }
            SessionEvent::Diagnostic(diagnostic) => {
                tracing::warn!("{}", diagnostic);
            }
            SessionEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
