// SPDX-License-Identifier: MIT

//! GUID partition-table scanner.
//!
//! Recognition order: protective legacy block at block 0, table header at
//! LBA 1, entry array wherever the header points. Every declared size is
//! range-checked before use and both CRCs must match; the medium content
//! is untrusted.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;
#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec};

use pmio::prelude::*;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::descriptor::{Partition, PartitionTable, SchemeKind};
use crate::errors::*;
use crate::uuid;

pub const GUID_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GUID_HEADER_LBA: u64 = 1;
/// Defined header region; everything past it is reserved.
pub const GUID_MIN_HEADER_SIZE: u32 = 92;
pub const GUID_MIN_ENTRY_SIZE: u32 = 128;
pub const GUID_MAX_ENTRY_SIZE: u32 = u16::MAX as u32;
pub const GUID_MAX_ENTRY_COUNT: u32 = u16::MAX as u32;

/// Size of the legacy protective block, and the granularity every
/// supported medium block size must be a multiple of.
pub const PROTECTIVE_BLOCK_SIZE: u64 = 512;
pub const PROTECTIVE_SIGNATURE: u16 = 0xAA55;
/// System-type byte marking "protective GUID table" in a legacy record.
pub const PROTECTIVE_SYSTEM_TYPE: u8 = 0xEE;

/// One of the four legacy partition records in block 0.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ProtectiveRecord {
    pub boot_flag: u8,
    pub chs_first: [u8; 3],
    pub system_type: u8,
    pub chs_last: [u8; 3],
    pub first_lba: u32,
    pub sector_count: u32,
}

/// Block 0 of a GUID-partitioned medium: a legacy-style block whose only
/// job is to carry one protective record.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone)]
#[repr(C, packed)]
pub struct ProtectiveBlock {
    pub boot_code: [u8; 446],
    pub records: [ProtectiveRecord; 4],
    pub signature: [u8; 2],
}

impl ProtectiveBlock {
    #[inline]
    pub fn has_valid_signature(&self) -> bool {
        u16::from_le_bytes(self.signature) == PROTECTIVE_SIGNATURE
    }

    /// Index of the single protective record, if there is exactly one.
    pub fn protective_index(&self) -> Option<u32> {
        // Copy out of the packed block before borrowing.
        let records = self.records;
        let mut found = None;
        for (i, rec) in records.iter().enumerate() {
            if rec.system_type == PROTECTIVE_SYSTEM_TYPE {
                if found.is_some() {
                    return None;
                }
                found = Some(i as u32 + 1);
            }
        }
        found
    }
}

/// On-disk table header, little-endian storage.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct GuidHeaderRaw {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub reserved: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: [u8; 16],
    pub entry_lba: u64,
    pub entry_count: u32,
    pub entry_size: u32,
    pub entry_array_crc32: u32,
}

/// Header with fields in host order.
#[derive(Copy, Clone, Debug)]
pub struct GuidHeader {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: [u8; 16],
    pub entry_lba: u64,
    pub entry_count: u32,
    pub entry_size: u32,
    pub entry_array_crc32: u32,
}

impl GuidHeaderRaw {
    pub fn to_aligned(&self) -> GuidHeader {
        GuidHeader {
            signature: self.signature,
            revision: u32::from_le(self.revision),
            header_size: u32::from_le(self.header_size),
            header_crc32: u32::from_le(self.header_crc32),
            current_lba: u64::from_le(self.current_lba),
            backup_lba: u64::from_le(self.backup_lba),
            first_usable_lba: u64::from_le(self.first_usable_lba),
            last_usable_lba: u64::from_le(self.last_usable_lba),
            disk_guid: self.disk_guid,
            entry_lba: u64::from_le(self.entry_lba),
            entry_count: u32::from_le(self.entry_count),
            entry_size: u32::from_le(self.entry_size),
            entry_array_crc32: u32::from_le(self.entry_array_crc32),
        }
    }

    pub fn from_aligned(h: &GuidHeader) -> Self {
        Self {
            signature: h.signature,
            revision: h.revision.to_le(),
            header_size: h.header_size.to_le(),
            header_crc32: h.header_crc32.to_le(),
            reserved: 0,
            current_lba: h.current_lba.to_le(),
            backup_lba: h.backup_lba.to_le(),
            first_usable_lba: h.first_usable_lba.to_le(),
            last_usable_lba: h.last_usable_lba.to_le(),
            disk_guid: h.disk_guid,
            entry_lba: h.entry_lba.to_le(),
            entry_count: h.entry_count.to_le(),
            entry_size: h.entry_size.to_le(),
            entry_array_crc32: h.entry_array_crc32.to_le(),
        }
    }
}

impl GuidHeader {
    /// Checks run before the checksum: signature and declared header size.
    pub fn validate_header(&self, block_size: u64) -> ScanResult<()> {
        if &self.signature != GUID_SIGNATURE {
            return Err(ScanError::Structural("GUID: missing header signature"));
        }
        if self.header_size < GUID_MIN_HEADER_SIZE || self.header_size as u64 > block_size {
            return Err(ScanError::Structural("GUID: header size out of range"));
        }
        Ok(())
    }

    /// Checks run after the checksum: declared entry-array geometry.
    pub fn validate_entry_geometry(&self) -> ScanResult<()> {
        if self.entry_size < GUID_MIN_ENTRY_SIZE || self.entry_size > GUID_MAX_ENTRY_SIZE {
            return Err(ScanError::Structural("GUID: entry size out of range"));
        }
        if self.entry_count == 0 || self.entry_count > GUID_MAX_ENTRY_COUNT {
            return Err(ScanError::Structural("GUID: entry count out of range"));
        }
        Ok(())
    }
}

/// On-disk table entry, little-endian storage. Declared entries may be
/// larger; the defined region is this prefix.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct GuidEntryRaw {
    pub type_guid: [u8; 16],
    pub instance_guid: [u8; 16],
    pub first_lba: u64,
    pub last_lba: u64,
    pub attributes: u64,
    pub name: [u16; 36],
}

/// Entry with fields in host order and GUIDs in display order.
#[derive(Copy, Clone, Debug)]
pub struct GuidEntry {
    pub type_guid: [u8; 16],
    pub instance_guid: [u8; 16],
    pub first_lba: u64,
    pub last_lba: u64,
    pub attributes: u64,
    pub name: [u16; 36],
}

impl GuidEntryRaw {
    pub fn to_aligned(&self) -> GuidEntry {
        let mut name = self.name;
        for unit in &mut name {
            *unit = u16::from_le(*unit);
        }
        GuidEntry {
            type_guid: uuid::unswapped(self.type_guid),
            instance_guid: uuid::unswapped(self.instance_guid),
            first_lba: u64::from_le(self.first_lba),
            last_lba: u64::from_le(self.last_lba),
            attributes: u64::from_le(self.attributes),
            name,
        }
    }

    pub fn from_aligned(e: &GuidEntry) -> Self {
        let mut name = e.name;
        for unit in &mut name {
            *unit = unit.to_le();
        }
        Self {
            type_guid: uuid::unswapped(e.type_guid),
            instance_guid: uuid::unswapped(e.instance_guid),
            first_lba: e.first_lba.to_le(),
            last_lba: e.last_lba.to_le(),
            attributes: e.attributes.to_le(),
            name,
        }
    }
}

impl GuidEntry {
    #[inline]
    pub fn is_used(&self) -> bool {
        !uuid::is_nil(&self.type_guid)
    }
}

/// Best-effort UTF-16LE name decoding: stops at the first NUL, replaces
/// every illegal unit with `/`.
fn decode_name(units: &[u16; 36]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    char::decode_utf16(units[..end].iter().copied())
        .map(|r| r.unwrap_or('/'))
        .collect()
}

/// Extension point: a corrupt entry invalidates the whole map. No entry
/// is currently known to; mirrors the scheme's historical behavior.
#[allow(unused_variables)]
fn is_entry_corrupt(entry: &GuidEntry, index: u32) -> bool {
    false
}

/// An invalid entry is skipped without failing recognition: placeholders
/// (zero extent) and entries leaving the confines of the medium.
fn is_entry_invalid(entry: &GuidEntry, total_size: u64, block_size: u64) -> bool {
    if entry.first_lba == entry.last_lba {
        return true;
    }
    let Some(end) = entry_extent(entry, block_size) else {
        return true;
    };
    end.1 > total_size
}

/// (base, end) in bytes, None on arithmetic overflow or inverted range.
fn entry_extent(entry: &GuidEntry, block_size: u64) -> Option<(u64, u64)> {
    let base = entry.first_lba.checked_mul(block_size)?;
    let blocks = entry.last_lba.checked_sub(entry.first_lba)?.checked_add(1)?;
    let size = blocks.checked_mul(block_size)?;
    Some((base, base.checked_add(size)?))
}

/// Scans `medium` for a GUID partition table.
///
/// Returns the complete, validated table or the reason this medium does
/// not carry one. No partial table ever escapes; the medium is closed on
/// every exit path.
pub fn scan<M: Medium + ?Sized>(medium: &mut M) -> ScanResult<PartitionTable> {
    if !medium.is_formatted() {
        return Err(ScanError::Structural("GUID: medium is not formatted"));
    }
    let block_size = medium.block_size();
    if block_size == 0 || block_size % PROTECTIVE_BLOCK_SIZE != 0 {
        return Err(ScanError::Structural("GUID: unsupported block size"));
    }

    let mut session = MediumSession::open(medium)?;
    let total_size = session.total_size();
    let writable = session.is_writable();

    // Block 0: the protective legacy block.
    let mut block = vec![0u8; block_size as usize];
    session.read_lba(0, &mut block)?;

    let protective = ProtectiveBlock::read_from_bytes(&block[..PROTECTIVE_BLOCK_SIZE as usize])
        .map_err(|_| ScanError::Structural("GUID: malformed protective block"))?;
    if !protective.has_valid_signature() {
        return Err(ScanError::Structural("GUID: missing protective signature"));
    }
    // Exactly one protective record; zero or several means another format.
    if protective.protective_index().is_none() {
        return Err(ScanError::Structural("GUID: no single protective record"));
    }

    // LBA 1: the table header.
    session.read_lba(GUID_HEADER_LBA, &mut block)?;
    let header = GuidHeaderRaw::read_from_bytes(&block[..GUID_MIN_HEADER_SIZE as usize])
        .map_err(|_| ScanError::Structural("GUID: malformed header"))?
        .to_aligned();
    header.validate_header(block_size)?;

    // Header checksum, computed with the stored checksum field zeroed.
    let mut scratch = block[..header.header_size as usize].to_vec();
    scratch[16..20].fill(0);
    if crc32fast::hash(&scratch) != header.header_crc32 {
        return Err(ScanError::Checksum("GUID: header checksum mismatch"));
    }

    header.validate_entry_geometry()?;

    let mut table = PartitionTable::new(SchemeKind::Guid);
    table.disk_guid = Some(uuid::unparse(&uuid::unswapped(header.disk_guid)));

    // Entry array, read as a whole, rounded up to a block multiple.
    let entry_bytes = (header.entry_count as u64)
        .checked_mul(header.entry_size as u64)
        .ok_or(ScanError::Bounds("GUID: entry array length overflow"))?;
    let buffer_len = entry_bytes
        .checked_add(block_size - 1)
        .map(|n| (n / block_size) * block_size)
        .ok_or(ScanError::Bounds("GUID: entry array length overflow"))?;

    let entry_offset = header
        .entry_lba
        .checked_mul(block_size)
        .ok_or(ScanError::Bounds("GUID: entry array offset overflow"))?;

    let mut entries = vec![0u8; buffer_len as usize];
    session.read_at(entry_offset, &mut entries)?;

    if crc32fast::hash(&entries[..entry_bytes as usize]) != header.entry_array_crc32 {
        return Err(ScanError::Checksum("GUID: entry array checksum mismatch"));
    }

    let entry_size = header.entry_size as usize;
    for index in 1..=header.entry_count {
        let off = (index as usize - 1) * entry_size;
        let entry = GuidEntryRaw::read_from_bytes(&entries[off..off + GUID_MIN_ENTRY_SIZE as usize])
            .map_err(|_| ScanError::Structural("GUID: malformed entry"))?
            .to_aligned();

        if !entry.is_used() {
            continue;
        }
        if is_entry_corrupt(&entry, index) {
            return Err(ScanError::Corrupt("GUID: corrupt entry"));
        }
        if is_entry_invalid(&entry, total_size, block_size) {
            continue;
        }

        // Checked by is_entry_invalid above.
        let (base, end) = entry_extent(&entry, block_size)
            .ok_or(ScanError::Bounds("GUID: entry extent overflow"))?;

        let name = decode_name(&entry.name);
        table.push(Partition {
            base,
            size: end - base,
            block_size,
            name: if name.is_empty() {
                Partition::fallback_name(index)
            } else {
                name
            },
            index,
            type_hint: uuid::unparse(&entry.type_guid),
            writable,
            uuid: Some(uuid::unparse(&entry.instance_guid)),
            attributes: Some(entry.attributes),
        });
    }

    Ok(table)
}
