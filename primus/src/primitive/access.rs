//! Buffer access states.
//!
//! The data of a [`Primitive`] may only be read or written while an access
//! state has been declared with [`Primitive::lock`]. Locking yields a [`Lock`]
//! guard that dereferences to the primitive and restores [`Access::None`] when
//! dropped, including on early returns and unwinding. Reading data requires a
//! readable state and writing data requires a writable state; violations are
//! programmer errors and panic.

use std::ops::{Deref, DerefMut};

use crate::primitive::Primitive;

/// Declared access to the data of a primitive.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Access {
    #[default]
    None,
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn is_readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Scoped access to a primitive.
///
/// See [`Primitive::lock`].
#[derive(Debug)]
pub struct Lock<'a> {
    primitive: &'a mut Primitive,
}

impl<'a> Lock<'a> {
    pub(in crate::primitive) fn new(primitive: &'a mut Primitive, access: Access) -> Self {
        assert!(access != Access::None, "locked primitive without access");
        assert!(
            primitive.access == Access::None,
            "primitive already locked with {:?} access",
            primitive.access
        );
        primitive.access = access;
        Lock { primitive }
    }

    pub fn access(&self) -> Access {
        self.primitive.access
    }
}

impl<'a> Deref for Lock<'a> {
    type Target = Primitive;

    fn deref(&self) -> &Self::Target {
        self.primitive
    }
}

impl<'a> DerefMut for Lock<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.primitive
    }
}

impl<'a> Drop for Lock<'a> {
    fn drop(&mut self) {
        self.primitive.access = Access::None;
    }
}

pub(in crate::primitive) fn expect_readable(access: Access) {
    assert!(
        access.is_readable(),
        "read from primitive with {:?} access",
        access
    );
}

pub(in crate::primitive) fn expect_writable(access: Access) {
    assert!(
        access.is_writable(),
        "write to primitive with {:?} access",
        access
    );
}
