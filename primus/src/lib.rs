//! **Primus** is a library for device-independent geometry storage.
//!
//! A [`Primitive`] stores vertex data described by a [`VertexFormat`] and an
//! optional buffer of 16-bit indices, converting elements between typed values
//! and compact stored encodings. Primitives also provide the CPU-side work a
//! renderer needs before drawing skinned or translucent geometry: packing and
//! splitting bone references to fit a skinning palette and sorting triangles by
//! distance.
//!
//! Please note that versions in the `0.0.*` series are experimental and
//! unstable! Use exact version constraints when specifying a dependency to
//! avoid spurious breakage.
//!
//! [`Primitive`]: crate::primitive::Primitive
//! [`VertexFormat`]: crate::format::VertexFormat
#![allow(unknown_lints)] // Allow clippy lints.

pub mod encoding;
pub mod format;
pub mod index;
pub mod primitive;

pub mod prelude {
    //! Re-exports commonly used types and traits.
    //!
    //! Importing the contents of this module is recommended when loading or
    //! sorting primitives, as typed vertex data is read and written through
    //! the `VertexValue` trait.

    pub use crate::encoding::VertexValue as _;
    pub use crate::format::{Attribute, DataFormat, VertexFormat};
    pub use crate::primitive::{Access, Primitive, PrimitiveType, SortBuffer};
}

pub use crate::encoding::Value;
pub use crate::format::FormatError;
pub use crate::primitive::{Limits, PrimitiveError};
