// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for medium operations.
pub type MediumResult<T = ()> = core::result::Result<T, MediumError>;

/// Error type for medium operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumError {
    Other(&'static str),
    OutOfBounds,
    NotOpen,
    Busy,
    Unsupported,
}

impl MediumError {
    pub fn msg(&self) -> &'static str {
        match self {
            MediumError::Other(msg) => msg,
            MediumError::OutOfBounds => "Out of bounds",
            MediumError::NotOpen => "Medium not open",
            MediumError::Busy => "Medium already open",
            MediumError::Unsupported => "Unsupported operation",
        }
    }
}

impl From<&'static str> for MediumError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        MediumError::Other(msg)
    }
}

impl fmt::Display for MediumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}
