// SPDX-License-Identifier: MIT

//! Re-probe reconciliation.
//!
//! A re-scan produces a complete fresh table; this module merges it with
//! the published one so that partitions whose identity is unchanged keep
//! their descriptor (consumers holding a reference are not disturbed),
//! vanished partitions are retired rather than destroyed, and added
//! partitions never collide with a live location.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{sync::Arc, vec::Vec};
#[cfg(feature = "std")]
use std::sync::Arc;

use crate::descriptor::{Partition, PartitionTable};

/// Result of merging a fresh scan with the published table.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub table: PartitionTable,
    /// Descriptors present before but absent from the fresh scan. Their
    /// teardown is the caller's business and is naturally deferred: each
    /// lives until the last consumer drops its reference.
    pub retired: Vec<Arc<Partition>>,
}

/// Whether a published descriptor and a fresh one are the same partition.
///
/// The identity key is the (location, base, size, block size) quadruple;
/// matching on it keeps the published descriptor alive across re-scans.
#[inline]
fn same_identity(a: &Partition, b: &Partition) -> bool {
    a.index == b.index && a.base == b.base && a.size == b.size && a.block_size == b.block_size
}

/// Merges `fresh` with `published`.
///
/// Both tables are walked in ascending base order, pairing entries the
/// way a re-read of the same map pairs with its previous read. The merged
/// table carries the fresh scan's metadata.
pub fn reconcile(published: &PartitionTable, fresh: PartitionTable) -> Reconciled {
    let mut old: Vec<Arc<Partition>> = published.partitions.clone();
    let mut new: Vec<Arc<Partition>> = fresh.partitions.clone();
    old.sort_by_key(|p| p.base);
    new.sort_by_key(|p| p.base);

    let mut next_location = old
        .iter()
        .chain(new.iter())
        .map(|p| p.index)
        .max()
        .unwrap_or(0);

    let mut merged: Vec<Arc<Partition>> = Vec::with_capacity(new.len());
    let mut retired: Vec<Arc<Partition>> = Vec::new();

    let mut i = 0;
    let mut j = 0;
    loop {
        match (old.get(i), new.get(j)) {
            (None, None) => break,
            (Some(_), None) => {
                // Vanished from the fresh scan: retire, teardown deferred.
                retired.push(old[i].clone());
                i += 1;
            }
            (None, Some(_)) => {
                merged.push(new[j].clone());
                j += 1;
            }
            (Some(o), Some(n)) if o.base < n.base => {
                retired.push(old[i].clone());
                i += 1;
            }
            (Some(o), Some(n)) if o.base > n.base => {
                merged.push(new[j].clone());
                j += 1;
            }
            (Some(o), Some(n)) => {
                // Same base: the same partition, re-read. Keep the
                // published descriptor when nothing observable changed.
                if same_identity(o, n) && o.name == n.name {
                    merged.push(old[i].clone());
                } else {
                    merged.push(new[j].clone());
                }
                i += 1;
                j += 1;
            }
        }
    }

    // Added partitions must not collide with a live location.
    let mut seen: Vec<u32> = Vec::with_capacity(merged.len());
    for slot in merged.iter_mut() {
        if seen.contains(&slot.index) {
            next_location += 1;
            let mut relocated = (**slot).clone();
            relocated.index = next_location;
            *slot = Arc::new(relocated);
        }
        seen.push(slot.index);
    }

    // Restore scan order.
    merged.sort_by_key(|p| p.index);

    Reconciled {
        table: PartitionTable {
            scheme: fresh.scheme,
            disk_guid: fresh.disk_guid,
            driver_descriptor: fresh.driver_descriptor,
            partitions: merged,
        },
        retired,
    }
}

#[cfg(feature = "std")]
pub use handle::SchemeHandle;

#[cfg(feature = "std")]
mod handle {
    use super::{Reconciled, reconcile};
    use crate::descriptor::PartitionTable;
    use std::sync::{Arc, Mutex};

    /// Holder of the published table for one medium.
    ///
    /// The lock guards only the get/swap of the `Arc`; readers outside it
    /// see either the old or the new table in full. A scan failure never
    /// reaches `publish`/`reprobe`, so a failed re-probe leaves the
    /// published table authoritative and unchanged.
    #[derive(Debug, Default)]
    pub struct SchemeHandle {
        published: Mutex<Option<Arc<PartitionTable>>>,
    }

    impl SchemeHandle {
        pub fn new() -> Self {
            Self::default()
        }

        /// Valid once the first scan has been published.
        pub fn is_valid(&self) -> bool {
            self.lock().is_some()
        }

        /// The currently published table, if any.
        pub fn current(&self) -> Option<Arc<PartitionTable>> {
            self.lock().clone()
        }

        /// Publishes the first successful scan.
        pub fn publish(&self, table: PartitionTable) -> Arc<PartitionTable> {
            let table = Arc::new(table);
            *self.lock() = Some(table.clone());
            table
        }

        /// Merges a fresh successful re-scan with the published table and
        /// swaps the result in. Behaves like `publish` before the first
        /// publication.
        pub fn reprobe(&self, fresh: PartitionTable) -> Reconciled {
            let mut guard = self.lock();
            let reconciled = match guard.as_ref() {
                Some(published) => reconcile(published, fresh),
                None => Reconciled {
                    table: fresh,
                    retired: Vec::new(),
                },
            };
            *guard = Some(Arc::new(reconciled.table.clone()));
            reconciled
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<PartitionTable>>> {
            // A poisoned lock only means a panic elsewhere; the table
            // itself is always swapped whole.
            self.published.lock().unwrap_or_else(|e| e.into_inner())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SchemeKind;

    fn part(index: u32, base: u64, size: u64, name: &str) -> Partition {
        Partition {
            base,
            size,
            block_size: 512,
            name: name.into(),
            index,
            type_hint: "Apple_HFS".into(),
            writable: true,
            uuid: None,
            attributes: None,
        }
    }

    fn table(parts: Vec<Partition>) -> PartitionTable {
        let mut t = PartitionTable::new(SchemeKind::Apple);
        for p in parts {
            t.push(p);
        }
        t
    }

    #[test]
    fn unchanged_partitions_keep_identity() {
        let published = table(vec![part(1, 512, 4096, "map"), part(2, 8192, 4096, "a")]);
        let fresh = table(vec![part(1, 512, 4096, "map"), part(2, 8192, 4096, "a")]);

        let out = reconcile(&published, fresh);
        assert!(out.retired.is_empty());
        assert_eq!(out.table.len(), 2);
        for (old, merged) in published.partitions.iter().zip(out.table.partitions.iter()) {
            assert!(Arc::ptr_eq(old, merged));
        }
    }

    #[test]
    fn vanished_partitions_are_retired_not_destroyed() {
        let published = table(vec![part(1, 512, 4096, "map"), part(2, 8192, 4096, "gone")]);
        let fresh = table(vec![part(1, 512, 4096, "map")]);

        let held = published.partitions[1].clone();
        let out = reconcile(&published, fresh);

        assert_eq!(out.table.len(), 1);
        assert_eq!(out.retired.len(), 1);
        assert!(Arc::ptr_eq(&out.retired[0], &published.partitions[1]));
        // A consumer still holding the descriptor keeps it alive.
        assert_eq!(held.name, "gone");
    }

    #[test]
    fn changed_geometry_adopts_fresh_descriptor() {
        let published = table(vec![part(1, 512, 4096, "map"), part(2, 8192, 4096, "a")]);
        let fresh = table(vec![part(1, 512, 4096, "map"), part(2, 8192, 16384, "a")]);

        let out = reconcile(&published, fresh);
        assert_eq!(out.table.len(), 2);
        let merged = out.table.by_location(2).unwrap();
        assert_eq!(merged.size, 16384);
        assert!(!Arc::ptr_eq(merged, &published.partitions[1]));
    }

    #[test]
    fn location_collisions_are_relocated() {
        // Old location 2 lives at base 8192; the fresh scan reuses
        // location 2 for a different base.
        let published = table(vec![part(1, 512, 4096, "map"), part(2, 8192, 4096, "a")]);
        let fresh = table(vec![
            part(1, 512, 4096, "map"),
            part(2, 8192, 4096, "a"),
            part(2, 32768, 4096, "b"),
        ]);

        let out = reconcile(&published, fresh);
        assert_eq!(out.table.len(), 3);

        let mut locations: Vec<u32> = out.table.partitions.iter().map(|p| p.index).collect();
        locations.sort_unstable();
        locations.dedup();
        assert_eq!(locations.len(), 3, "locations must be unique");
        // The collider moved past the maximum.
        assert!(out.table.partitions.iter().any(|p| p.index == 3));
    }

    #[cfg(feature = "std")]
    #[test]
    fn handle_keeps_published_table_on_failed_rescan() {
        let handle = SchemeHandle::new();
        assert!(!handle.is_valid());

        let first = handle.publish(table(vec![part(1, 512, 4096, "map")]));
        assert!(handle.is_valid());

        // A failed re-scan produces no table, so nothing reaches the
        // handle; the published table stays authoritative.
        let current = handle.current().unwrap();
        assert!(Arc::ptr_eq(&first, &current));
    }

    #[cfg(feature = "std")]
    #[test]
    fn handle_swaps_whole_tables() {
        let handle = SchemeHandle::new();
        handle.publish(table(vec![part(1, 512, 4096, "map"), part(2, 8192, 4096, "a")]));

        let reader_view = handle.current().unwrap();

        let out = handle.reprobe(table(vec![part(1, 512, 4096, "map")]));
        assert_eq!(out.retired.len(), 1);

        // The reader still sees its complete old table.
        assert_eq!(reader_view.len(), 2);
        // New readers see the merged one.
        assert_eq!(handle.current().unwrap().len(), 1);
    }
}
