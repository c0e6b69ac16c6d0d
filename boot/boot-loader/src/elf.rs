//! # ELF image handling

pub mod loader;
pub mod parser;

use boot_services::{ClaimError, DeviceError};

/// How an image load attempt failed.
///
/// Only [`NotExecutable`](LoadError::NotExecutable) is a soft failure (the
/// stream simply is not an ELF image); everything else means the load began
/// against an accepted header and cannot be retried safely.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No executable image at any probed offset.
    #[error("stream contains no executable image")]
    NotExecutable,
    /// The accepted header, or its program-header table, is malformed.
    #[error("executable header or program-header table is malformed")]
    InvalidFormat,
    /// The physical allocator refused a segment's destination range.
    #[error("segment destination claim failed")]
    ClaimFailed(#[from] ClaimError),
    /// A segment's file bytes could not be read in full.
    #[error("segment read failed")]
    ReadFailed(#[source] DeviceError),
}

impl LoadError {
    /// Whether this failure must abort the whole boot sequence.
    ///
    /// A fatal load may already have claimed and partially populated
    /// physical memory; advancing to another candidate on top of that state
    /// is not safe.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotExecutable)
    }
}
