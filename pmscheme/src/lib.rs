// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;

#[macro_use]
mod macros;

pub mod errors;
/// Mixed-endian GUID conversion helpers.
pub mod uuid;

/// Legacy Apple partition-map scanner.
#[cfg(feature = "alloc")]
pub mod apple;
/// Partition descriptors, tables and the injected factory seam.
#[cfg(feature = "alloc")]
pub mod descriptor;
/// GUID partition-table scanner.
#[cfg(feature = "alloc")]
pub mod guid;
/// Well-known GUID partition types.
#[cfg(feature = "alloc")]
pub mod kinds;
/// Re-probe reconciliation and the published-table handle.
#[cfg(feature = "alloc")]
pub mod reconcile;

pub use errors::{ScanError, ScanResult};

#[cfg(feature = "alloc")]
pub use descriptor::{Partition, PartitionFactory, PartitionTable, SchemeKind};
#[cfg(feature = "alloc")]
pub use reconcile::{Reconciled, reconcile};
#[cfg(feature = "std")]
pub use reconcile::SchemeHandle;

/// Asks each scheme in turn whether it recognizes the medium.
///
/// A structural or checksum failure only means "not this format", so the
/// next scheme is tried; any other failure aborts recognition. This is
/// the one retry policy the scanners themselves do not contain.
#[cfg(feature = "alloc")]
pub fn scan_any<M: pmio::Medium + ?Sized>(medium: &mut M) -> ScanResult<PartitionTable> {
    match guid::scan(medium) {
        Ok(table) => Ok(table),
        Err(e) if e.is_mismatch() => apple::scan(medium),
        Err(e) => Err(e),
    }
}
