// SPDX-License-Identifier: MIT

//! Legacy Apple partition-map scanner.
//!
//! The map has no single header: block 0 optionally carries a driver
//! descriptor whose declared block size overrides the scanning
//! granularity, and the entry chain itself names how many entries exist.
//! The loop bound is therefore discovered in flight, and mixed-granularity
//! media (2048-byte descriptors over 512-byte entries) get special
//! handling inherited from old pressed CDs.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;
#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::ToString, vec};

use bitflags::bitflags;
use pmio::prelude::*;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::descriptor::{Partition, PartitionTable, SchemeKind};
use crate::errors::*;

/// "ER", the driver-descriptor signature.
pub const DRIVER_SIGNATURE: u16 = 0x4552;
/// "PM", the per-entry signature.
pub const ENTRY_SIGNATURE: u16 = 0x504D;
/// Map entries are always 512 bytes on disk.
pub const ENTRY_SIZE: u64 = 512;
/// Granularity forced for driver-image entries in legacy mixed mode.
pub const LEGACY_DRIVER_BLOCK_SIZE: u64 = 2048;

/// The entry type naming the map itself, plus the historical misspelling
/// found on some pressed CDs, accepted as equivalent.
pub const MAP_TYPES: [&str; 3] = [
    "Apple_partition_map",
    "Apple_Partition_Map",
    "Apple_patition_map",
];

/// Driver-image types stored at 2048-byte granularity on legacy mixed
/// media, at every 4th map index.
pub const DRIVER_TYPES: [&str; 6] = [
    "Apple_Driver",
    "Apple_Driver43",
    "Apple_Driver43_CD",
    "Apple_Driver_ATA",
    "Apple_Driver_ATAPI",
    "Apple_Patches",
];

/// Free-space bookkeeping entries, never published.
pub const FREE_TYPE: &str = "Apple_Free";

/// The one entry type known to invalidate the whole map.
pub const CORRUPT_TYPE: &str = "CD_ROM_Mode_1";

bitflags! {
    /// Status flags of a map entry (big-endian u32 on disk).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapEntryFlags: u32 {
        const VALID     = 0x0000_0001;
        const ALLOCATED = 0x0000_0002;
        const IN_USE    = 0x0000_0004;
        const BOOTABLE  = 0x0000_0008;
        const READABLE  = 0x0000_0010;
        const WRITABLE  = 0x0000_0020;
    }
}

/// Block 0 driver descriptor, big-endian storage. Optional: its absence
/// just leaves the scanning granularity at the medium's native size.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone)]
#[repr(C, packed)]
pub struct DriverDescriptorRaw {
    pub signature: u16,
    pub declared_block_size: u16,
    pub declared_block_count: u32,
    pub device_type: u16,
    pub device_id: u16,
    pub driver_data: u32,
    pub driver_count: u16,
    pub reserved: [u8; 494],
}

impl DriverDescriptorRaw {
    #[inline]
    pub fn has_valid_signature(&self) -> bool {
        u16::from_be(self.signature) == DRIVER_SIGNATURE
    }

    #[inline]
    pub fn block_size(&self) -> u64 {
        u16::from_be(self.declared_block_size) as u64
    }
}

/// On-disk map entry, big-endian storage.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone)]
#[repr(C, packed)]
pub struct MapEntryRaw {
    pub signature: u16,
    pub signature_pad: u16,
    pub map_entry_count: u32,
    pub physical_start: u32,
    pub physical_count: u32,
    pub name: [u8; 32],
    pub entry_type: [u8; 32],
    pub logical_start: u32,
    pub logical_count: u32,
    pub flags: u32,
    pub reserved: [u8; 420],
}

/// Entry with fields in host order.
#[derive(Copy, Clone, Debug)]
pub struct MapEntry {
    pub signature: u16,
    pub map_entry_count: u32,
    pub physical_start: u32,
    pub physical_count: u32,
    pub name: [u8; 32],
    pub entry_type: [u8; 32],
    pub flags: MapEntryFlags,
}

impl MapEntryRaw {
    pub fn to_aligned(&self) -> MapEntry {
        MapEntry {
            signature: u16::from_be(self.signature),
            map_entry_count: u32::from_be(self.map_entry_count),
            physical_start: u32::from_be(self.physical_start),
            physical_count: u32::from_be(self.physical_count),
            name: self.name,
            entry_type: self.entry_type,
            flags: MapEntryFlags::from_bits_retain(u32::from_be(self.flags)),
        }
    }

    pub fn from_aligned(e: &MapEntry) -> Self {
        Self {
            signature: e.signature.to_be(),
            signature_pad: 0,
            map_entry_count: e.map_entry_count.to_be(),
            physical_start: e.physical_start.to_be(),
            physical_count: e.physical_count.to_be(),
            name: e.name,
            entry_type: e.entry_type,
            logical_start: 0,
            logical_count: e.physical_count.to_be(),
            flags: e.flags.bits().to_be(),
            reserved: [0u8; 420],
        }
    }
}

/// NUL-trimmed ASCII field decoding; a field that is not valid UTF-8
/// decodes as empty and matches nothing.
fn ascii_field(field: &[u8; 32]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).unwrap_or("")
}

impl MapEntry {
    #[inline]
    pub fn type_str(&self) -> &str {
        ascii_field(&self.entry_type)
    }

    #[inline]
    pub fn name_str(&self) -> &str {
        ascii_field(&self.name)
    }

    /// Whether this entry is the map's own (authoritative) entry.
    #[inline]
    pub fn is_map_entry(&self) -> bool {
        MAP_TYPES.contains(&self.type_str())
    }
}

#[inline]
fn is_driver_type(ty: &str) -> bool {
    DRIVER_TYPES.contains(&ty)
}

/// Extension point: an entry that invalidates the whole map. The one
/// known case is the legacy mode-1 CD type.
fn is_entry_corrupt(entry: &MapEntry, _index: u32) -> bool {
    entry.type_str() == CORRUPT_TYPE
}

/// Scans `medium` for a legacy Apple partition map.
///
/// Returns the complete table or the reason this medium does not carry
/// one; a driver-descriptor block alone is not sufficient evidence. The
/// medium is closed on every exit path.
pub fn scan<M: Medium + ?Sized>(medium: &mut M) -> ScanResult<PartitionTable> {
    if !medium.is_formatted() {
        return Err(ScanError::Structural("APM: medium is not formatted"));
    }
    let media_block_size = medium.block_size();
    if media_block_size == 0 || media_block_size % ENTRY_SIZE != 0 {
        return Err(ScanError::Structural("APM: unsupported block size"));
    }

    let mut session = MediumSession::open(medium)?;
    let total_size = session.total_size();
    let media_writable = session.is_writable();

    // One window, one medium block wide (a block is at least one entry).
    let buffer_size = media_block_size.max(ENTRY_SIZE);
    let mut buffer = vec![0u8; buffer_size as usize];
    let mut buffer_read_at: u64 = 0;
    session.read_at(0, &mut buffer)?;

    let mut table = PartitionTable::new(SchemeKind::Apple);

    // Block 0: optional driver descriptor overrides the granularity.
    let mut map_block_size = media_block_size;
    let descriptor = DriverDescriptorRaw::read_from_bytes(&buffer[..ENTRY_SIZE as usize])
        .map_err(|_| ScanError::Structural("APM: malformed driver descriptor"))?;
    if descriptor.has_valid_signature() {
        map_block_size = descriptor.block_size();
        table.driver_descriptor = true;
    }

    // Legacy mixed layout: a 2048-byte descriptor over entries packed at
    // 512 bytes. Probe byte offset 512 for an entry signature.
    let mut legacy_mixed = false;
    if map_block_size == LEGACY_DRIVER_BLOCK_SIZE {
        let probe = if buffer_size >= 2 * ENTRY_SIZE {
            u16::from_be_bytes([buffer[512], buffer[513]])
        } else {
            buffer_read_at = ENTRY_SIZE;
            session.read_at(buffer_read_at, &mut buffer)?;
            u16::from_be_bytes([buffer[0], buffer[1]])
        };
        if probe == ENTRY_SIGNATURE {
            map_block_size = ENTRY_SIZE;
            legacy_mixed = true;
        }
    }

    // Walk the entries. The loop bound is provisional until the map's own
    // entry is seen; its declared count is authoritative.
    let mut entry_count: u64 = 1;
    let mut map_proof: u64 = 0;
    let mut index: u64 = 1;

    while index <= entry_count {
        let entry_offset = index
            .checked_mul(map_block_size)
            .ok_or(ScanError::Bounds("APM: entry offset overflow"))?;
        let entry_end = entry_offset
            .checked_add(ENTRY_SIZE)
            .ok_or(ScanError::Bounds("APM: entry offset overflow"))?;
        if entry_end > total_size {
            return Err(ScanError::Io(MediumError::OutOfBounds));
        }

        // Re-read only when the needed entry falls outside the window.
        let window_end = buffer_read_at
            .checked_add(buffer_size)
            .ok_or(ScanError::Bounds("APM: window offset overflow"))?;
        if entry_end > window_end {
            buffer_read_at = entry_offset;
            session.read_at(buffer_read_at, &mut buffer)?;
        }
        let rel = (entry_offset - buffer_read_at) as usize;
        let entry = MapEntryRaw::read_from_bytes(&buffer[rel..rel + ENTRY_SIZE as usize])
            .map_err(|_| ScanError::Structural("APM: malformed entry"))?
            .to_aligned();

        if entry.signature != ENTRY_SIGNATURE {
            return Err(ScanError::Structural("APM: missing entry signature"));
        }

        let ty = entry.type_str();

        if entry.is_map_entry() {
            entry_count = entry.map_entry_count as u64;
            map_proof = entry.physical_count as u64;
        } else if entry_count == 1 {
            // No authoritative entry seen yet; trust this one for now.
            entry_count = entry.map_entry_count as u64;
        }

        // Driver images on legacy mixed media sit at 2048-byte
        // granularity at every 4th index.
        let mut entry_block_size = map_block_size;
        if legacy_mixed && index % 4 == 0 && is_driver_type(ty) {
            entry_block_size = LEGACY_DRIVER_BLOCK_SIZE;
        }

        if is_entry_corrupt(&entry, index as u32) {
            return Err(ScanError::Corrupt("APM: corrupt entry type"));
        }

        // Invalid entries are skipped, not fatal: zero extent, a start at
        // or past the end of the medium, or an extent that does not fit
        // in byte arithmetic at all.
        let extent = (entry.physical_start as u64)
            .checked_mul(entry_block_size)
            .zip((entry.physical_count as u64).checked_mul(entry_block_size));
        let Some((base, size)) = extent else {
            index += 1;
            continue;
        };
        if size == 0 || base >= total_size {
            index += 1;
            continue;
        }

        // Clip to the end of the medium.
        let size = size.min(total_size - base);

        // Free space is internal bookkeeping, never published.
        if ty == FREE_TYPE {
            index += 1;
            continue;
        }

        // The map itself, and entries flagged valid without an explicit
        // writable flag, are read-only regardless of the medium.
        let read_only = entry.is_map_entry()
            || entry.flags & (MapEntryFlags::WRITABLE | MapEntryFlags::VALID)
                == MapEntryFlags::VALID;

        let name = entry.name_str();
        table.push(Partition {
            base,
            size,
            block_size: media_block_size,
            name: if name.is_empty() {
                Partition::fallback_name(index as u32)
            } else {
                name.to_string()
            },
            index: index as u32,
            type_hint: ty.to_string(),
            writable: media_writable && !read_only,
            uuid: None,
            attributes: None,
        });

        index += 1;
    }

    // A driver descriptor alone is not a map.
    if map_proof == 0 {
        return Err(ScanError::Structural("APM: no partition map entry"));
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field32(s: &str) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        buf
    }

    fn entry(ty: &str, name: &str, start: u32, count: u32, map_entries: u32) -> MapEntry {
        MapEntry {
            signature: ENTRY_SIGNATURE,
            map_entry_count: map_entries,
            physical_start: start,
            physical_count: count,
            name: field32(name),
            entry_type: field32(ty),
            flags: MapEntryFlags::VALID | MapEntryFlags::ALLOCATED | MapEntryFlags::WRITABLE,
        }
    }

    fn put_entry(img: &mut [u8], offset: usize, e: &MapEntry) {
        let raw = MapEntryRaw::from_aligned(e);
        img[offset..offset + 512].copy_from_slice(raw.as_bytes());
    }

    fn put_driver_descriptor(img: &mut [u8], block_size: u16, block_count: u32) {
        img[0..2].copy_from_slice(&DRIVER_SIGNATURE.to_be_bytes());
        img[2..4].copy_from_slice(&block_size.to_be_bytes());
        img[4..8].copy_from_slice(&block_count.to_be_bytes());
    }

    /// Plain 512-byte map: the map entry at block 1, partitions after it.
    fn plain_image(total: usize, entries: &[MapEntry]) -> Vec<u8> {
        let mut img = vec![0u8; total];
        put_driver_descriptor(&mut img, 512, (total / 512) as u32);
        for (i, e) in entries.iter().enumerate() {
            put_entry(&mut img, (i + 1) * 512, e);
        }
        img
    }

    #[test]
    fn map_with_two_partitions() {
        let mut img = plain_image(
            2 << 20,
            &[
                entry("Apple_partition_map", "Apple", 1, 63, 3),
                entry("Apple_HFS", "Macintosh HD", 64, 1024, 3),
                entry("Apple_UNIX_SVR2", "Swap", 1088, 512, 3),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512).with_writable(true);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.scheme, SchemeKind::Apple);
        assert!(table.driver_descriptor);
        assert_eq!(table.len(), 3);

        // The map's own entry is published read-only.
        let map = &table.partitions[0];
        assert_eq!(map.type_hint, "Apple_partition_map");
        assert_eq!(map.base, 512);
        assert_eq!(map.size, 63 * 512);
        assert!(!map.writable);

        let hfs = &table.partitions[1];
        assert_eq!(hfs.name, "Macintosh HD");
        assert_eq!(hfs.base, 64 * 512);
        assert_eq!(hfs.size, 1024 * 512);
        assert_eq!(hfs.index, 2);
        assert!(hfs.writable);
    }

    #[test]
    fn free_space_is_never_published() {
        let mut img = plain_image(
            2 << 20,
            &[
                entry("Apple_partition_map", "Apple", 1, 63, 3),
                entry("Apple_Free", "Extra", 64, 128, 3),
                entry("Apple_HFS", "Files", 192, 256, 3),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.partitions.iter().all(|p| p.type_hint != FREE_TYPE));
        // The free entry still consumed ordinal 2.
        assert_eq!(table.partitions[1].index, 3);
    }

    #[test]
    fn valid_without_writable_flag_is_read_only() {
        let mut locked = entry("Apple_HFS", "Locked", 64, 64, 2);
        locked.flags = MapEntryFlags::VALID | MapEntryFlags::ALLOCATED;
        let mut img = plain_image(
            1 << 20,
            &[entry("Apple_partition_map", "Apple", 1, 63, 2), locked],
        );
        let mut medium = MemMedium::new(&mut img, 512).with_writable(true);

        let table = scan(&mut medium).unwrap();
        assert!(!table.partitions[1].writable);
    }

    #[test]
    fn misspelled_map_type_is_authoritative() {
        let mut img = plain_image(
            1 << 20,
            &[
                entry("Apple_patition_map", "Apple", 1, 7, 2),
                entry("Apple_HFS", "CD Files", 8, 100, 2),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512).with_writable(true);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.partitions[0].writable);
    }

    #[test]
    fn empty_name_gets_untitled() {
        let mut img = plain_image(
            1 << 20,
            &[
                entry("Apple_partition_map", "", 1, 7, 2),
                entry("Apple_HFS", "", 8, 100, 2),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.partitions[0].name, "Untitled 1");
        assert_eq!(table.partitions[1].name, "Untitled 2");
    }

    #[test]
    fn oversized_partition_is_clipped() {
        let total = 1 << 20;
        let total_blocks = (total / 512) as u32;
        let mut img = plain_image(
            total,
            &[
                entry("Apple_partition_map", "Apple", 1, 7, 2),
                entry("Apple_HFS", "Big", 1024, total_blocks, 2),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512);

        let table = scan(&mut medium).unwrap();
        let big = &table.partitions[1];
        assert_eq!(big.base, 1024 * 512);
        assert_eq!(big.size, total as u64 - 1024 * 512);
    }

    #[test]
    fn zero_length_and_out_of_range_entries_are_skipped() {
        let total = 1 << 20;
        let past_end = (total / 512) as u32 + 100;
        let mut img = plain_image(
            total,
            &[
                entry("Apple_partition_map", "Apple", 1, 7, 4),
                entry("Apple_HFS", "Empty", 64, 0, 4),
                entry("Apple_HFS", "Beyond", past_end, 10, 4),
                entry("Apple_HFS", "Good", 64, 64, 4),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.partitions[1].name, "Good");
        assert_eq!(table.partitions[1].index, 4);
    }

    #[test]
    fn corrupt_entry_aborts_the_scan() {
        let mut img = plain_image(
            1 << 20,
            &[
                entry("Apple_partition_map", "Apple", 1, 7, 2),
                entry("CD_ROM_Mode_1", "Bad", 8, 100, 2),
            ],
        );
        let mut medium = MemMedium::new(&mut img, 512);

        assert!(matches!(scan(&mut medium), Err(ScanError::Corrupt(_))));
        // Closed despite the abort.
        assert!(medium.open().is_ok());
    }

    #[test]
    fn driver_descriptor_alone_is_not_a_map() {
        let mut img = vec![0u8; 1 << 20];
        put_driver_descriptor(&mut img, 512, 2048);
        // Entries carry signatures but none is map-typed.
        put_entry(&mut img, 512, &entry("Apple_HFS", "A", 8, 100, 2));
        put_entry(&mut img, 1024, &entry("Apple_HFS", "B", 108, 100, 2));
        let mut medium = MemMedium::new(&mut img, 512);

        assert!(matches!(
            scan(&mut medium),
            Err(ScanError::Structural("APM: no partition map entry"))
        ));
    }

    #[test]
    fn missing_entry_signature_fails() {
        let mut img = vec![0u8; 1 << 20];
        put_driver_descriptor(&mut img, 512, 2048);
        let mut medium = MemMedium::new(&mut img, 512);

        assert!(matches!(
            scan(&mut medium),
            Err(ScanError::Structural("APM: missing entry signature"))
        ));
    }

    /// Property: a 2048 descriptor with a valid entry at byte offset 512
    /// is walked at 512-byte granularity; without it, at 2048.
    #[test]
    fn legacy_mixed_mode_detection() {
        // Mixed: entries every 512 bytes.
        let mut img = vec![0u8; 4 << 20];
        put_driver_descriptor(&mut img, 2048, 2048);
        put_entry(&mut img, 512, &entry("Apple_partition_map", "Apple", 1, 63, 2));
        put_entry(&mut img, 1024, &entry("Apple_HFS", "CD", 64, 512, 2));
        let mut medium = MemMedium::new(&mut img, 2048);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.len(), 2);
        // Bases computed at 512-byte granularity.
        assert_eq!(table.partitions[0].base, 512);
        assert_eq!(table.partitions[1].base, 64 * 512);

        // Not mixed: entries every 2048 bytes.
        let mut img = vec![0u8; 4 << 20];
        put_driver_descriptor(&mut img, 2048, 2048);
        put_entry(&mut img, 2048, &entry("Apple_partition_map", "Apple", 1, 63, 2));
        put_entry(&mut img, 4096, &entry("Apple_HFS", "CD", 64, 512, 2));
        let mut medium = MemMedium::new(&mut img, 2048);

        let table = scan(&mut medium).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.partitions[0].base, 2048);
        assert_eq!(table.partitions[1].base, 64 * 2048);
    }

    /// In mixed mode every 4th entry holding a driver image is addressed
    /// at 2048-byte granularity for its extent.
    #[test]
    fn legacy_mixed_driver_entries_use_2048() {
        let mut img = vec![0u8; 8 << 20];
        put_driver_descriptor(&mut img, 2048, 4096);
        put_entry(&mut img, 512, &entry("Apple_partition_map", "Apple", 1, 63, 4));
        put_entry(&mut img, 1024, &entry("Apple_HFS", "CD", 256, 512, 4));
        put_entry(&mut img, 1536, &entry("Apple_Free", "", 768, 16, 4));
        // Index 4: a driver image.
        put_entry(&mut img, 2048, &entry("Apple_Driver43", "Macintosh", 100, 16, 4));
        let mut medium = MemMedium::new(&mut img, 2048);

        let table = scan(&mut medium).unwrap();
        let driver = table.by_location(4).unwrap();
        assert_eq!(driver.base, 100 * 2048);
        assert_eq!(driver.size, 16 * 2048);

        // Non-driver entries stayed at 512.
        assert_eq!(table.by_location(2).unwrap().base, 256 * 512);
    }

    /// The window is only re-read when an entry falls outside it: with a
    /// 2048-byte medium block over 512-byte entries, one read covers
    /// block 0 plus three entries.
    #[test]
    fn window_is_reused_across_entries() {
        let mut img = vec![0u8; 8 << 20];
        put_driver_descriptor(&mut img, 2048, 4096);
        put_entry(&mut img, 512, &entry("Apple_partition_map", "Apple", 1, 63, 4));
        put_entry(&mut img, 1024, &entry("Apple_HFS", "A", 256, 128, 4));
        put_entry(&mut img, 1536, &entry("Apple_HFS", "B", 384, 128, 4));
        put_entry(&mut img, 2048, &entry("Apple_HFS", "C", 512, 128, 4));
        let mut medium = MemMedium::new(&mut img, 2048);
        let mut counter = ReadCounter::new(&mut medium);

        let table = scan(&mut counter).unwrap();
        assert_eq!(table.len(), 4);
        // Initial window (block 0 + entries 1..3), then one re-read for
        // entry 4. The offset-512 probe was served from the window.
        assert_eq!(counter.snapshot().reads, 2);
    }

    #[test]
    fn unformatted_media_and_odd_block_sizes_fail() {
        let mut img = vec![0u8; 1 << 20];

        let mut unformatted = MemMedium::new(&mut img, 512).with_formatted(false);
        assert!(matches!(scan(&mut unformatted), Err(ScanError::Structural(_))));

        let mut odd = MemMedium::new(&mut img, 768);
        assert!(matches!(scan(&mut odd), Err(ScanError::Structural(_))));
    }
}
