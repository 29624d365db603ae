// SPDX-License-Identifier: MIT

use crate::Medium;
use crate::errors::*;
use core::ops::{Deref, DerefMut};

/// Scoped acquisition of a medium.
///
/// Opens the medium on construction and closes it exactly once when the
/// session is dropped, whichever way the enclosing scope exits. A scanner
/// holds the session for the whole scan; the `&mut` borrow keeps the scan
/// exclusive for its duration.
#[derive(Debug)]
pub struct MediumSession<'a, M: Medium + ?Sized> {
    medium: &'a mut M,
}

impl<'a, M: Medium + ?Sized> MediumSession<'a, M> {
    pub fn open(medium: &'a mut M) -> MediumResult<Self> {
        medium.open()?;
        Ok(Self { medium })
    }
}

impl<'a, M: Medium + ?Sized> Deref for MediumSession<'a, M> {
    type Target = M;

    #[inline]
    fn deref(&self) -> &M {
        self.medium
    }
}

impl<'a, M: Medium + ?Sized> DerefMut for MediumSession<'a, M> {
    #[inline]
    fn deref_mut(&mut self) -> &mut M {
        self.medium
    }
}

impl<'a, M: Medium + ?Sized> Drop for MediumSession<'a, M> {
    fn drop(&mut self) {
        self.medium.close();
    }
}
