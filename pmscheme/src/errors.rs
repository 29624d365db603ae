// SPDX-License-Identifier: MIT

use core::fmt;

use pmio::errors::*;

/// Unified error type for scheme scanners.
///
/// `Structural` and `Checksum` both mean "this medium does not carry this
/// table format" — the caller is expected to try the other scheme. The
/// remaining variants abort recognition outright. A skippable entry is
/// never an error; it is handled inside the scan loop.
#[derive(Debug, Clone)]
pub enum ScanError {
    Io(MediumError),
    Structural(&'static str),
    Checksum(&'static str),
    Bounds(&'static str),
    Corrupt(&'static str),
}

impl ScanError {
    pub fn msg(&self) -> &'static str {
        match self {
            ScanError::Io(e) => e.msg(),
            ScanError::Structural(msg) => msg,
            ScanError::Checksum(msg) => msg,
            ScanError::Bounds(msg) => msg,
            ScanError::Corrupt(msg) => msg,
        }
    }

    /// True when the failure only means "not this format, try another".
    #[inline]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ScanError::Structural(_) | ScanError::Checksum(_))
    }
}

impl From<MediumError> for ScanError {
    fn from(e: MediumError) -> Self {
        ScanError::Io(e)
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

pub type ScanResult<T = ()> = Result<T, ScanError>;
