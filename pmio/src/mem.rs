// SPDX-License-Identifier: MIT

use crate::{Medium, MediumError, MediumResult};

/// In-memory implementation of `Medium`.
///
/// Useful for tests and RAM-backed disk images. Geometry defaults to
/// formatted and read-only; builders adjust both.
#[derive(Debug)]
pub struct MemMedium<'a> {
    buffer: &'a mut [u8],
    block_size: u64,
    formatted: bool,
    writable: bool,
    opened: bool,
}

impl<'a> MemMedium<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [u8], block_size: u64) -> Self {
        Self {
            buffer,
            block_size,
            formatted: true,
            writable: false,
            opened: false,
        }
    }

    #[inline]
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    #[inline]
    pub fn with_formatted(mut self, formatted: bool) -> Self {
        self.formatted = formatted;
        self
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> MediumResult {
        let end = offset
            .checked_add(len as u64)
            .ok_or(MediumError::OutOfBounds)?;
        if end > self.buffer.len() as u64 {
            return Err(MediumError::OutOfBounds);
        }
        Ok(())
    }
}

impl<'a> Medium for MemMedium<'a> {
    #[inline]
    fn block_size(&self) -> u64 {
        self.block_size
    }

    #[inline]
    fn total_size(&self) -> u64 {
        self.buffer.len() as u64
    }

    #[inline]
    fn is_formatted(&self) -> bool {
        self.formatted
    }

    #[inline]
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn open(&mut self) -> MediumResult {
        if self.opened {
            return Err(MediumError::Busy);
        }
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> MediumResult {
        if !self.opened {
            return Err(MediumError::NotOpen);
        }
        self.check_bounds(offset, buf.len())?;
        let src = &self.buffer[offset as usize..offset as usize + buf.len()];
        buf.copy_from_slice(src);
        Ok(())
    }
}
