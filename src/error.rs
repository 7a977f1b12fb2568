//! Error types surfaced by the public API.
//!
//! Plain enums with hand-written `Display`/`Error` impls: no `thiserror`
//! is pulled in for two small, stable error sets.

use core::fmt;

/// Failure modes of [`crate::extend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendError {
    /// The process does not exist.
    UnknownProcess,
    /// No backing-store block is free, or the process already holds
    /// `MAX_PAGES` pages.
    OutOfSpace,
}

impl fmt::Display for ExtendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProcess => write!(f, "extend: unknown process"),
            Self::OutOfSpace => write!(f, "extend: out of space (no free block or page slot)"),
        }
    }
}

impl std::error::Error for ExtendError {}

/// Failure modes of [`crate::syslog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyslogError {
    /// The process does not exist.
    UnknownProcess,
    /// `[addr, addr + len)` is not entirely within the process's reserved
    /// virtual range.
    InvalidArgument,
}

impl fmt::Display for SyslogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProcess => write!(f, "syslog: unknown process"),
            Self::InvalidArgument => write!(f, "syslog: range outside the process's reserved address space"),
        }
    }
}

impl std::error::Error for SyslogError {}
