//! Non-fatal findings produced while decoding device records.

use std::fmt;

use serde::Serialize;

/// A degradation noticed during decoding. The decode still succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A trailing sentinel did not repeat the record's leading magic.
    StructuralWarning {
        record: RecordKind,
        offset: usize,
        expected: u32,
        actual: Option<u32>,
    },
    /// The slot table decoded but its base address is not a known slot.
    UnresolvedSlot { base: u32 },
}

/// Which on-device record a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SlotInfo,
    KernelHeader,
    UserlandHeader,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::SlotInfo => write!(f, "slot info"),
            RecordKind::KernelHeader => write!(f, "kernel header"),
            RecordKind::UserlandHeader => write!(f, "userland header"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::StructuralWarning {
                record,
                offset,
                expected,
                actual: Some(actual),
            } => write!(
                f,
                "{record}: trailing magic at 0x{offset:02X} is 0x{actual:08X}, expected 0x{expected:08X}"
            ),
            Diagnostic::StructuralWarning {
                record,
                offset,
                expected,
                actual: None,
            } => write!(
                f,
                "{record}: trailing magic at 0x{offset:02X} missing, expected 0x{expected:08X}"
            ),
            Diagnostic::UnresolvedSlot { base } => {
                write!(f, "slot base 0x{base:08X} matches no known slot")
            }
        }
    }
}
