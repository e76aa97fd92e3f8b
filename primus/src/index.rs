//! Index narrowing and triangle iteration.
//!
//! Primitives store _flat_ index buffers of 16-bit indices, implicitly grouped
//! by the arity of the [`PrimitiveType`]. Callers supply 32-bit indices, which
//! are narrowed with [`narrow`]. Narrowing never truncates silently: an index
//! that does not fit 16 bits or that names a vertex beyond the vertex buffer is
//! rejected.
//!
//! [`PrimitiveType`]: crate::primitive::PrimitiveType

use itertools::Itertools;

use crate::primitive::PrimitiveError;

/// Narrows a 32-bit index into a 16-bit index.
///
/// # Errors
///
/// Returns `IndexOverflow` if the index does not fit 16 bits and
/// `IndexOutOfBounds` if it names a vertex at or beyond `vertex_count`.
/// Overflow is checked first.
pub fn narrow(index: u32, vertex_count: usize) -> Result<u16, PrimitiveError> {
    let narrowed = num::cast::<u32, u16>(index).ok_or(PrimitiveError::IndexOverflow)?;
    if usize::from(narrowed) < vertex_count {
        Ok(narrowed)
    }
    else {
        Err(PrimitiveError::IndexOutOfBounds)
    }
}

/// Gets an iterator over the triangles of a flat triangular index buffer.
///
/// Trailing indices that do not form a complete triangle are ignored.
pub fn triangles<I>(indices: I) -> impl Iterator<Item = [u16; 3]>
where
    I: IntoIterator<Item = u16>,
{
    indices.into_iter().tuples().map(|(a, b, c)| [a, b, c])
}
