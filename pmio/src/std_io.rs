// SPDX-License-Identifier: MIT

use std::io::{Error, Read, Seek, SeekFrom};

use crate::{Medium, MediumError, MediumResult};

/// Medium over any `Read + Seek`, typically a disk image file.
///
/// Geometry is declared by the caller; a plain file knows its length but
/// not the block size of the device it was imaged from.
#[derive(Debug)]
pub struct FileMedium<'a, T: Read + Seek> {
    io: &'a mut T,
    block_size: u64,
    total_size: u64,
    formatted: bool,
    writable: bool,
    opened: bool,
}

impl<'a, T: Read + Seek> FileMedium<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T, block_size: u64, total_size: u64) -> Self {
        Self {
            io,
            block_size,
            total_size,
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
}

impl<'a, T: Read + Seek> Medium for FileMedium<'a, T> {
    #[inline]
    fn block_size(&self) -> u64 {
        self.block_size
    }

    #[inline]
    fn total_size(&self) -> u64 {
        self.total_size
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

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> MediumResult {
        if !self.opened {
            return Err(MediumError::NotOpen);
        }
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(MediumError::OutOfBounds)?;
        if end > self.total_size {
            return Err(MediumError::OutOfBounds);
        }
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }
}

impl From<Error> for MediumError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked_str: &'static str = Box::leak(e.to_string().into_boxed_str());
        MediumError::Other(leaked_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::io::Write;
    use tempfile::tempfile;

    #[test]
    fn read_from_file() {
        let mut file = tempfile().unwrap();
        file.write_all(&[0u8; 1024]).unwrap();
        file.seek(SeekFrom::Start(100)).unwrap();
        file.write_all(&[9, 8, 7, 6]).unwrap();

        let mut medium = FileMedium::new(&mut file, 512, 1024);
        medium.open().unwrap();

        let mut out = [0u8; 4];
        medium.read_at(100, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn declared_size_bounds_reads() {
        let mut file = tempfile().unwrap();
        file.write_all(&[0u8; 2048]).unwrap();

        let mut medium = FileMedium::new(&mut file, 512, 1024);
        medium.open().unwrap();

        let mut out = [0u8; 512];
        assert!(medium.read_at(512, &mut out).is_ok());
        assert_eq!(
            medium.read_at(1024, &mut out),
            Err(MediumError::OutOfBounds)
        );
    }

    #[test]
    fn short_file_read_fails() {
        let mut file = tempfile().unwrap();
        file.write_all(&[0u8; 100]).unwrap();

        // Declared larger than the backing file: the read itself errors.
        let mut medium = FileMedium::new(&mut file, 512, 4096);
        medium.open().unwrap();

        let mut out = [0u8; 512];
        assert!(medium.read_at(0, &mut out).is_err());
    }
}
