// SPDX-License-Identifier: MIT

use crate::{Medium, MediumResult};

/// Simple read counters, no_std friendly.
#[derive(Clone, Copy, Default, Debug)]
pub struct ReadStats {
    pub reads: u64,
    pub read_bytes: u64,
    pub max_read: u64,
}

impl ReadStats {
    #[inline]
    pub fn reset(&mut self) {
        *self = ReadStats::default();
    }
}

/// Transparent read-instrumentation wrapper.
///
/// Forwards everything to the inner medium and counts reads on the way
/// through. Used to observe how many device reads a scan actually issues.
pub struct ReadCounter<'a, M: Medium + ?Sized> {
    inner: &'a mut M,
    pub stats: ReadStats,
}

impl<'a, M: Medium + ?Sized> ReadCounter<'a, M> {
    #[inline]
    pub fn new(inner: &'a mut M) -> Self {
        Self {
            inner,
            stats: ReadStats::default(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> ReadStats {
        self.stats
    }

    #[inline]
    pub fn into_inner(self) -> &'a mut M {
        self.inner
    }
}

impl<'a, M: Medium + ?Sized> Medium for ReadCounter<'a, M> {
    #[inline]
    fn block_size(&self) -> u64 {
        self.inner.block_size()
    }

    #[inline]
    fn total_size(&self) -> u64 {
        self.inner.total_size()
    }

    #[inline]
    fn is_formatted(&self) -> bool {
        self.inner.is_formatted()
    }

    #[inline]
    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    #[inline]
    fn open(&mut self) -> MediumResult {
        self.inner.open()
    }

    #[inline]
    fn close(&mut self) {
        self.inner.close()
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> MediumResult {
        self.stats.reads += 1;
        self.stats.read_bytes += buf.len() as u64;
        if self.stats.max_read < buf.len() as u64 {
            self.stats.max_read = buf.len() as u64;
        }
        self.inner.read_at(offset, buf)
    }
}

#[cfg(all(test, feature = "mem"))]
mod tests {
    use crate::prelude::*;

    #[test]
    fn counts_reads() {
        let mut buf = [0u8; 1024];
        let mut medium = MemMedium::new(&mut buf, 512);
        let mut counter = ReadCounter::new(&mut medium);
        counter.open().unwrap();

        let mut out = [0u8; 512];
        counter.read_lba(0, &mut out).unwrap();
        counter.read_lba(1, &mut out).unwrap();
        let mut small = [0u8; 2];
        counter.read_at(4, &mut small).unwrap();

        let stats = counter.snapshot();
        assert_eq!(stats.reads, 3);
        assert_eq!(stats.read_bytes, 1026);
        assert_eq!(stats.max_read, 512);
    }
}
