// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod errors;
mod macros;
mod session;
pub mod stats;

// Backend modules
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std_io;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::Medium;
    pub use super::MediumExt;
    pub use super::MediumStructExt;
    pub use super::errors::*;
    pub use super::session::MediumSession;
    pub use super::stats::*;

    #[cfg(feature = "mem")]
    pub use super::mem::MemMedium;

    #[cfg(feature = "std")]
    pub use super::std_io::FileMedium;
}

pub use session::MediumSession;

// Internal use
use errors::*;

/// Maximum size of internal scratch buffer (used for struct reads).
/// 4 KiB = typical page size and the largest native block size in use.
pub const SCRATCH_BUF_SIZE: usize = 4096;

/// Block-medium accessor trait.
///
/// Exposes the geometry of a block-addressable medium together with a
/// synchronous positioned read. The content is untrusted; implementations
/// must bounds-check every access and never panic on a bad offset.
///
/// Reads are only serviced between `open` and `close`. Use
/// [`MediumSession`] to tie the close to scope exit.
pub trait Medium {
    /// Native block size in bytes.
    fn block_size(&self) -> u64;

    /// Total size of the medium in bytes.
    fn total_size(&self) -> u64;

    /// Whether the medium carries any recognizable formatting at all.
    fn is_formatted(&self) -> bool;

    /// Whether the medium accepts writes.
    fn is_writable(&self) -> bool;

    /// Acquires the medium for reading. Fails with `Busy` when already held.
    fn open(&mut self) -> MediumResult;

    /// Releases the medium. Idempotent.
    fn close(&mut self);

    /// Reads `buf.len()` bytes into `buf` from `offset` (absolute).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> MediumResult;
}

/// Extension helpers for `Medium`.
///
/// LBA-granular reads with overflow-checked offset math, plus
/// endian-explicit primitive reads.
pub trait MediumExt: Medium {
    /// Offset = LBA * block size (with overflow-check).
    #[inline]
    fn lba_offset(&self, lba: u64) -> MediumResult<u64> {
        lba.checked_mul(self.block_size())
            .ok_or(MediumError::OutOfBounds)
    }

    /// Reads `buf.len()` bytes starting at an LBA.
    #[inline]
    fn read_lba(&mut self, lba: u64, buf: &mut [u8]) -> MediumResult {
        let off = self.lba_offset(lba)?;
        self.read_at(off, buf)
    }

    // Implements read helpers for primitive types (u16, u32, u64)
    medium_impl_primitive_reads!(u16, u32, u64);
}

impl<T: Medium + ?Sized> MediumExt for T {}

/// Extension trait for reading on-disk structs using zerocopy.
pub trait MediumStructExt: Medium {
    /// Reads a struct of type `T` from the given byte offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> MediumResult<T> {
        let size = core::mem::size_of::<T>();
        assert!(size <= SCRATCH_BUF_SIZE, "read_struct: type too large");
        let mut buf = [0u8; SCRATCH_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| MediumError::Other("read_struct failed"))
    }

    /// Reads a struct of type `T` from the start of an LBA.
    fn read_struct_lba<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        lba: u64,
    ) -> MediumResult<T> {
        let off = self.lba_offset(lba)?;
        self.read_struct::<T>(off)
    }
}

impl<T: Medium + ?Sized> MediumStructExt for T {}
