//! Geometry primitives.
//!
//! This module provides [`Primitive`], the device-independent storage of a
//! drawable piece of geometry: a vertex buffer described by a [`VertexFormat`]
//! and an optional index buffer of 16-bit indices. Both buffers live in a
//! single byte _arena_ owned by the primitive. Each populated attribute slot
//! occupies a tightly packed array of `vertex_count` elements in its stored
//! [`DataFormat`], followed by the index array. Slot offsets are computed when
//! the format is assigned with [`Primitive::set_format`].
//!
//! # Access
//!
//! Vertex and index data can only be read or written while an [`Access`] state
//! is held via [`Primitive::lock`]. The returned [`Lock`] dereferences to the
//! primitive and releases the access state when dropped. Accessing data in the
//! wrong state is a programmer error and panics.
//!
//! # Conversions
//!
//! Data is read and written as any [`VertexValue`] and converted element-wise
//! into the stored [`DataFormat`] of an attribute (see the [`encoding`]
//! module). Quantized positions and texture coordinates are mapped into their
//! final range with scale/bias vectors, which [`Primitive::position`] and
//! [`Primitive::texture_coordinate`] apply. The integer channels of
//! [normalized][`Attribute::is_normalized`] attributes, such as colors and
//! bone weights, are mapped through `[0, 1]` (or `[-1, 1]` for signed channels)
//! instead, so that a weight of `0.5` is stored as `128` in an 8-bit channel
//! and a color channel of `255` is read as `1.0` by a floating-point value.
//!
//! # Examples
//!
//! Creating an indexed triangle:
//!
//! ```rust
//! # extern crate nalgebra;
//! # extern crate primus;
//! #
//! use nalgebra::Point3;
//! use primus::format::{Attribute, DataFormat, VertexFormat};
//! use primus::primitive::{Access, Primitive, PrimitiveType};
//!
//! let mut format = VertexFormat::new();
//! format.add_position(DataFormat::Vector3x32).unwrap();
//!
//! let mut primitive = Primitive::new(PrimitiveType::TriangleList);
//! primitive.set_format(format, 3, 3).unwrap();
//! {
//!     let mut primitive = primitive.lock(Access::Write);
//!     primitive
//!         .set_vertex_data(
//!             Attribute::Position,
//!             0,
//!             &[
//!                 Point3::new(0.0f32, 0.0, 0.0),
//!                 Point3::new(1.0, 0.0, 0.0),
//!                 Point3::new(0.0, 1.0, 0.0),
//!             ],
//!         )
//!         .unwrap();
//!     primitive.set_indices(0, &[0, 1, 2]).unwrap();
//! }
//! assert_eq!(1, primitive.triangle_count());
//! ```
//!
//! [`encoding`]: crate::encoding

pub mod access;
mod bone;
mod sort;

use derivative::Derivative;
use nalgebra::{Point2, Point3, Vector3, Vector4};
use std::mem;
use std::ops::Range;
use thiserror::Error;

use crate::encoding::{self, Value, VertexValue};
use crate::format::{Attribute, DataFormat, FormatError, VertexFormat, ATTRIBUTE_COUNT};
use crate::index;
use crate::primitive::access::{expect_readable, expect_writable};

pub use crate::primitive::access::{Access, Lock};
pub use crate::primitive::sort::SortBuffer;

const INDEX_SIZE: usize = mem::size_of::<u16>();

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum PrimitiveError {
    #[error("vertex count is zero")]
    VertexCountZero,
    #[error("vertex count {count} exceeds the limit of {limit}")]
    VertexCountExceeded { count: usize, limit: usize },
    #[error("index count {count} exceeds the limit of {limit}")]
    IndexCountExceeded { count: usize, limit: usize },
    #[error("index buffer conflicts with arity")]
    IndexUnaligned,
    #[error("index overflow")]
    IndexOverflow,
    #[error("index into vertex data out of bounds")]
    IndexOutOfBounds,
    #[error("range out of bounds")]
    RangeOutOfBounds,
    #[error("attribute {0:?} not found")]
    AttributeNotFound(Attribute),
    #[error("source data conflicts with data format")]
    DataUnaligned,
    #[error("failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },
    #[error("bone indices already packed")]
    BonesPacked,
    #[error("no bone has positive weight")]
    BonesUnweighted,
    #[error("bone count {count} exceeds the limit of {limit}")]
    BoneCountExceeded { count: usize, limit: usize },
    #[error("bone index {0} out of bounds")]
    BoneIndexOverflow(usize),
    #[error("topology is not an indexed triangle list")]
    TopologyUnsupported,
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Topology of a primitive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveType {
    /// Gets the number of indices that each element of an index buffer of this
    /// type must be a multiple of.
    pub fn arity(self) -> usize {
        match self {
            PrimitiveType::TriangleList => 3,
            PrimitiveType::LineList => 2,
            _ => 1,
        }
    }
}

/// Capacity limits of a primitive.
///
/// The defaults are determined by 16-bit indices: at most `u16::MAX + 1`
/// vertices and `u16::MAX` indices. The used bone count is limited by the
/// width of bone indices.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Limits {
    /// Largest index value. Limits both the vertex count and the index count.
    pub max_index: u16,
    /// Largest number of used bones.
    pub max_bones: u8,
}

impl Limits {
    pub fn max_vertices(&self) -> usize {
        usize::from(self.max_index) + 1
    }

    pub fn max_indices(&self) -> usize {
        usize::from(self.max_index)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_index: u16::MAX,
            max_bones: u8::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BoneState {
    Unpacked,
    Packed,
}

/// CPU-side storage of vertex and index data.
///
/// See the module documentation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Primitive {
    primitive_type: PrimitiveType,
    limits: Limits,
    format: VertexFormat,
    vertex_count: usize,
    index_count: usize,
    #[derivative(Debug = "ignore")]
    data: Vec<u8>,
    offsets: [Option<usize>; ATTRIBUTE_COUNT],
    index_offset: usize,
    vertex_scale_bias: Vector4<f32>,
    texture_scale_bias: Vector4<f32>,
    bound_min: Point3<f32>,
    bound_max: Point3<f32>,
    bound_radius: f32,
    vertex_range: Range<usize>,
    index_range: Range<usize>,
    used_bones: Vec<u8>,
    bones: BoneState,
    access: Access,
}

impl Primitive {
    pub fn new(primitive_type: PrimitiveType) -> Self {
        Primitive::with_limits(primitive_type, Limits::default())
    }

    pub fn with_limits(primitive_type: PrimitiveType, limits: Limits) -> Self {
        Primitive {
            primitive_type,
            limits,
            format: VertexFormat::new(),
            vertex_count: 0,
            index_count: 0,
            data: Vec::new(),
            offsets: [None; ATTRIBUTE_COUNT],
            index_offset: 0,
            vertex_scale_bias: default_vertex_scale_bias(),
            texture_scale_bias: default_texture_scale_bias(),
            bound_min: Point3::origin(),
            bound_max: Point3::origin(),
            bound_radius: 0.0,
            vertex_range: 0..0,
            index_range: 0..0,
            used_bones: Vec::new(),
            bones: BoneState::Unpacked,
            access: Access::None,
        }
    }

    /// Declares access to the data of the primitive.
    ///
    /// The access state is restored to [`Access::None`] when the returned
    /// [`Lock`] is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is already locked or if `access` is
    /// [`Access::None`].
    pub fn lock(&mut self, access: Access) -> Lock<'_> {
        Lock::new(self, access)
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Destroys any existing storage and allocates buffers for the given
    /// format, vertex count, and index count.
    ///
    /// An index count of zero creates a non-indexed primitive. Ranges are reset
    /// to the full extents of the buffers, scale/bias vectors are reset, and
    /// used bones are cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the vertex count is zero, if either count exceeds
    /// the [`Limits`] of the primitive, if the index count is not a multiple
    /// of the arity of the [`PrimitiveType`], or if allocation fails. The
    /// primitive is left empty on error.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is locked.
    pub fn set_format(
        &mut self,
        format: VertexFormat,
        vertex_count: usize,
        index_count: usize,
    ) -> Result<(), PrimitiveError> {
        assert!(
            self.access == Access::None,
            "reformatted primitive with {:?} access",
            self.access
        );
        self.destroy();
        if vertex_count == 0 {
            return Err(PrimitiveError::VertexCountZero);
        }
        if vertex_count > self.limits.max_vertices() {
            return Err(PrimitiveError::VertexCountExceeded {
                count: vertex_count,
                limit: self.limits.max_vertices(),
            });
        }
        if index_count > self.limits.max_indices() {
            return Err(PrimitiveError::IndexCountExceeded {
                count: index_count,
                limit: self.limits.max_indices(),
            });
        }
        if index_count % self.primitive_type.arity() != 0 {
            return Err(PrimitiveError::IndexUnaligned);
        }

        let mut offsets = [None; ATTRIBUTE_COUNT];
        let mut size = 0;
        for (attribute, data_format) in format.attributes() {
            offsets[attribute.slot()] = Some(size);
            size += data_format.size() * vertex_count;
        }
        let index_offset = size;
        size += index_count * INDEX_SIZE;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| PrimitiveError::OutOfMemory { bytes: size })?;
        data.resize(size, 0);
        log::debug!(
            "allocated {} bytes for {} vertices ({} bytes each) and {} indices",
            size,
            vertex_count,
            format.vertex_size(),
            index_count,
        );

        self.format = format;
        self.vertex_count = vertex_count;
        self.index_count = index_count;
        self.data = data;
        self.offsets = offsets;
        self.index_offset = index_offset;
        self.vertex_range = 0..vertex_count;
        self.index_range = 0..index_count;
        Ok(())
    }

    fn destroy(&mut self) {
        *self = Primitive::with_limits(self.primitive_type, self.limits);
    }

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }

    /// Gets the number of triangles described by the primitive.
    ///
    /// This is zero for point and line primitives.
    pub fn triangle_count(&self) -> usize {
        let count = if self.is_indexed() {
            self.index_count
        }
        else {
            self.vertex_count
        };
        match self.primitive_type {
            PrimitiveType::TriangleList => count / 3,
            PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan => count.saturating_sub(2),
            _ => 0,
        }
    }

    /// Writes typed elements into the vertex data of an attribute starting at
    /// vertex `start`.
    ///
    /// Elements are converted from the data format of `T` into the stored data
    /// format of the attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute is not present or if the elements
    /// exceed the vertex buffer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for writing.
    pub fn set_vertex_data<T>(
        &mut self,
        attribute: Attribute,
        start: usize,
        values: &[T],
    ) -> Result<(), PrimitiveError>
    where
        T: VertexValue,
    {
        expect_writable(self.access);
        let (format, offset) = self.attribute_offset(attribute)?;
        self.expect_vertices(start, values.len())?;
        let size = format.size();
        for (n, value) in values.iter().enumerate() {
            let at = offset + ((start + n) * size);
            let value = rescale(attribute, T::FORMAT, format, value.into_value());
            encoding::encode(format, value, &mut self.data[at..at + size]);
        }
        Ok(())
    }

    /// Reads typed elements from the vertex data of an attribute starting at
    /// vertex `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute is not present or if the elements
    /// exceed the vertex buffer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn vertex_data<T>(
        &self,
        attribute: Attribute,
        start: usize,
        values: &mut [T],
    ) -> Result<(), PrimitiveError>
    where
        T: VertexValue,
    {
        expect_readable(self.access);
        let (format, offset) = self.attribute_offset(attribute)?;
        self.expect_vertices(start, values.len())?;
        let size = format.size();
        for (n, value) in values.iter_mut().enumerate() {
            let at = offset + ((start + n) * size);
            let decoded = encoding::decode(format, &self.data[at..at + size]);
            *value = T::from_value(rescale(attribute, format, T::FORMAT, decoded));
        }
        Ok(())
    }

    /// Writes raw elements encoded in `source` into the vertex data of an
    /// attribute starting at vertex `start`.
    ///
    /// The number of elements is determined by the length of `bytes`. This is
    /// used to load quantized data along with
    /// [`set_vertex_scale_bias`][`Primitive::set_vertex_scale_bias`].
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute is not present, if the length of
    /// `bytes` is not a multiple of the size of `source`, or if the elements
    /// exceed the vertex buffer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for writing.
    pub fn set_vertex_bytes(
        &mut self,
        attribute: Attribute,
        start: usize,
        source: DataFormat,
        bytes: &[u8],
    ) -> Result<(), PrimitiveError> {
        expect_writable(self.access);
        let (format, offset) = self.attribute_offset(attribute)?;
        let width = source.size();
        if width == 0 || bytes.len() % width != 0 {
            return Err(PrimitiveError::DataUnaligned);
        }
        self.expect_vertices(start, bytes.len() / width)?;
        let size = format.size();
        let convert = converter(attribute);
        for (n, element) in bytes.chunks_exact(width).enumerate() {
            let at = offset + ((start + n) * size);
            convert(source, element, format, &mut self.data[at..at + size]);
        }
        Ok(())
    }

    /// Reads raw elements of an attribute starting at vertex `start`, converted
    /// into the data format `target`.
    ///
    /// The number of elements is determined by the length of `bytes`. This is
    /// the inverse of [`set_vertex_bytes`][`Primitive::set_vertex_bytes`].
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute is not present, if the length of
    /// `bytes` is not a multiple of the size of `target`, or if the elements
    /// exceed the vertex buffer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn vertex_bytes_as(
        &self,
        attribute: Attribute,
        start: usize,
        target: DataFormat,
        bytes: &mut [u8],
    ) -> Result<(), PrimitiveError> {
        expect_readable(self.access);
        let (format, offset) = self.attribute_offset(attribute)?;
        let width = target.size();
        if width == 0 || bytes.len() % width != 0 {
            return Err(PrimitiveError::DataUnaligned);
        }
        self.expect_vertices(start, bytes.len() / width)?;
        let size = format.size();
        let convert = converter(attribute);
        for (n, element) in bytes.chunks_exact_mut(width).enumerate() {
            let at = offset + ((start + n) * size);
            convert(format, &self.data[at..at + size], target, element);
        }
        Ok(())
    }

    /// Gets the raw vertex data of an attribute in its stored data format.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute is not present.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn vertex_bytes(&self, attribute: Attribute) -> Result<&[u8], PrimitiveError> {
        expect_readable(self.access);
        let (format, offset) = self.attribute_offset(attribute)?;
        Ok(&self.data[offset..offset + (format.size() * self.vertex_count)])
    }

    /// Writes a universal value into the vertex data of an attribute.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for writing.
    pub fn set_value(
        &mut self,
        attribute: Attribute,
        vertex: usize,
        value: Value,
    ) -> Result<(), PrimitiveError> {
        self.set_vertex_data(attribute, vertex, &[value])
    }

    /// Reads a universal value from the vertex data of an attribute.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn value(&self, attribute: Attribute, vertex: usize) -> Result<Value, PrimitiveError> {
        expect_readable(self.access);
        let (format, offset) = self.attribute_offset(attribute)?;
        self.expect_vertices(vertex, 1)?;
        let value = self.decode_unchecked(format, offset, vertex);
        Ok(rescale(attribute, format, <Value as VertexValue>::FORMAT, value))
    }

    /// Gets the dequantized position of a vertex.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn position(&self, vertex: usize) -> Result<Point3<f32>, PrimitiveError> {
        expect_readable(self.access);
        self.expect_vertices(vertex, 1)?;
        Ok(self.positions()?.get(vertex))
    }

    /// Gets the dequantized texture coordinates of a vertex in a layer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn texture_coordinate(
        &self,
        layer: usize,
        vertex: usize,
    ) -> Result<Point2<f32>, PrimitiveError> {
        let attribute = Attribute::texture(layer).ok_or(FormatError::TextureLayerOverflow)?;
        let [u, v, ..] = self.value(attribute, vertex)?;
        let scale_bias = &self.texture_scale_bias;
        Ok(Point2::new(
            (u * scale_bias.x) + scale_bias.z,
            (v * scale_bias.y) + scale_bias.w,
        ))
    }

    /// Writes 32-bit indices into the index buffer starting at index `start`.
    ///
    /// All indices are validated before any are written.
    ///
    /// # Errors
    ///
    /// Returns an error if an index does not fit 16 bits, if an index names a
    /// vertex beyond the vertex buffer, or if the indices exceed the index
    /// buffer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for writing.
    pub fn set_indices(&mut self, start: usize, indices: &[u32]) -> Result<(), PrimitiveError> {
        expect_writable(self.access);
        for index in indices.iter() {
            index::narrow(*index, self.vertex_count)?;
        }
        self.expect_indices(start, indices.len())?;
        for (n, index) in indices.iter().enumerate() {
            let index = index::narrow(*index, self.vertex_count)?;
            self.set_index_unchecked(start + n, index);
        }
        Ok(())
    }

    /// Reads indices starting at index `start` as 32-bit indices.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn indices(&self, start: usize, indices: &mut [u32]) -> Result<(), PrimitiveError> {
        expect_readable(self.access);
        self.expect_indices(start, indices.len())?;
        for (n, index) in indices.iter_mut().enumerate() {
            *index = u32::from(self.index_unchecked(start + n));
        }
        Ok(())
    }

    /// Gets the raw 16-bit little-endian index buffer.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn index_bytes(&self) -> &[u8] {
        expect_readable(self.access);
        &self.data[self.index_offset..]
    }

    pub fn vertex_range(&self) -> Range<usize> {
        self.vertex_range.clone()
    }

    pub fn set_vertex_range_begin(&mut self, begin: usize) -> Result<(), PrimitiveError> {
        if begin <= self.vertex_range.end {
            self.vertex_range.start = begin;
            Ok(())
        }
        else {
            Err(PrimitiveError::RangeOutOfBounds)
        }
    }

    pub fn set_vertex_range_end(&mut self, end: usize) -> Result<(), PrimitiveError> {
        if (self.vertex_range.start..=self.vertex_count).contains(&end) {
            self.vertex_range.end = end;
            Ok(())
        }
        else {
            Err(PrimitiveError::RangeOutOfBounds)
        }
    }

    pub fn index_range(&self) -> Range<usize> {
        self.index_range.clone()
    }

    pub fn set_index_range_begin(&mut self, begin: usize) -> Result<(), PrimitiveError> {
        if begin <= self.index_range.end {
            self.index_range.start = begin;
            Ok(())
        }
        else {
            Err(PrimitiveError::RangeOutOfBounds)
        }
    }

    pub fn set_index_range_end(&mut self, end: usize) -> Result<(), PrimitiveError> {
        if (self.index_range.start..=self.index_count).contains(&end) {
            self.index_range.end = end;
            Ok(())
        }
        else {
            Err(PrimitiveError::RangeOutOfBounds)
        }
    }

    /// Sets the scale/bias vector of positions.
    ///
    /// The vector is `(scale, bias_x, bias_y, bias_z)` and dequantizes stored
    /// positions as `raw * scale + bias`.
    pub fn set_vertex_scale_bias(&mut self, scale_bias: Vector4<f32>) {
        self.vertex_scale_bias = scale_bias;
    }

    pub fn vertex_scale_bias(&self) -> &Vector4<f32> {
        &self.vertex_scale_bias
    }

    /// Sets the scale/bias vector of texture coordinates.
    ///
    /// The vector is `(scale_u, scale_v, bias_u, bias_v)` and dequantizes
    /// stored texture coordinates as `raw * scale + bias`.
    pub fn set_texture_scale_bias(&mut self, scale_bias: Vector4<f32>) {
        self.texture_scale_bias = scale_bias;
    }

    pub fn texture_scale_bias(&self) -> &Vector4<f32> {
        &self.texture_scale_bias
    }

    /// Stores a precomputed bounding box and radius.
    pub fn set_bound(&mut self, min: Point3<f32>, max: Point3<f32>, radius: f32) {
        self.bound_min = min;
        self.bound_max = max;
        self.bound_radius = radius;
    }

    pub fn bound_min(&self) -> &Point3<f32> {
        &self.bound_min
    }

    pub fn bound_max(&self) -> &Point3<f32> {
        &self.bound_max
    }

    pub fn bound_radius(&self) -> f32 {
        self.bound_radius
    }

    /// Computes the center of the bounding box of all positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive has no positions.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn center(&self) -> Result<Point3<f32>, PrimitiveError> {
        expect_readable(self.access);
        let positions = self.positions()?;
        let first = positions.get(0);
        let (min, max) = (1..self.vertex_count)
            .map(|vertex| positions.get(vertex))
            .fold((first.coords, first.coords), |(min, max), position| {
                (min.inf(&position.coords), max.sup(&position.coords))
            });
        Ok(nalgebra::center(&Point3::from(min), &Point3::from(max)))
    }

    /// Gets the number of bytes used by the primitive and its buffers.
    pub fn memory_used(&self) -> usize {
        mem::size_of::<Self>() + self.data.len()
    }

    fn attribute_offset(
        &self,
        attribute: Attribute,
    ) -> Result<(DataFormat, usize), PrimitiveError> {
        self.offsets[attribute.slot()]
            .map(|offset| (self.format.data_format(attribute), offset))
            .ok_or(PrimitiveError::AttributeNotFound(attribute))
    }

    fn expect_vertices(&self, start: usize, count: usize) -> Result<(), PrimitiveError> {
        start
            .checked_add(count)
            .filter(|end| *end <= self.vertex_count)
            .map(|_| ())
            .ok_or(PrimitiveError::RangeOutOfBounds)
    }

    fn expect_indices(&self, start: usize, count: usize) -> Result<(), PrimitiveError> {
        start
            .checked_add(count)
            .filter(|end| *end <= self.index_count)
            .map(|_| ())
            .ok_or(PrimitiveError::RangeOutOfBounds)
    }

    fn expect_triangles(&self) -> Result<(), PrimitiveError> {
        if self.primitive_type == PrimitiveType::TriangleList && self.is_indexed() {
            Ok(())
        }
        else {
            Err(PrimitiveError::TopologyUnsupported)
        }
    }

    fn decode_unchecked(&self, format: DataFormat, offset: usize, vertex: usize) -> Value {
        let size = format.size();
        let at = offset + (vertex * size);
        encoding::decode(format, &self.data[at..at + size])
    }

    fn encode_unchecked(&mut self, format: DataFormat, offset: usize, vertex: usize, value: Value) {
        let size = format.size();
        let at = offset + (vertex * size);
        encoding::encode(format, value, &mut self.data[at..at + size]);
    }

    fn index_unchecked(&self, n: usize) -> u16 {
        let at = self.index_offset + (n * INDEX_SIZE);
        u16::from_le_bytes([self.data[at], self.data[at + 1]])
    }

    fn set_index_unchecked(&mut self, n: usize, index: u16) {
        let at = self.index_offset + (n * INDEX_SIZE);
        self.data[at..at + INDEX_SIZE].copy_from_slice(&index.to_le_bytes());
    }

    fn index_data(&self) -> &[u8] {
        &self.data[self.index_offset..]
    }

    fn index_values(&self) -> impl '_ + Iterator<Item = u16> {
        self.index_data()
            .chunks_exact(INDEX_SIZE)
            .map(|index| u16::from_le_bytes([index[0], index[1]]))
    }

    fn index_data_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.index_offset..]
    }

    fn positions(&self) -> Result<Positions<'_>, PrimitiveError> {
        let (format, offset) = self.attribute_offset(Attribute::Position)?;
        Ok(Positions {
            primitive: self,
            format,
            offset,
        })
    }
}

/// Dequantizing reader of the positions of a primitive.
struct Positions<'a> {
    primitive: &'a Primitive,
    format: DataFormat,
    offset: usize,
}

impl<'a> Positions<'a> {
    fn get(&self, vertex: usize) -> Point3<f32> {
        let [x, y, z, _] = self
            .primitive
            .decode_unchecked(self.format, self.offset, vertex);
        let scale_bias = &self.primitive.vertex_scale_bias;
        Point3::new(x, y, z) * scale_bias.x
            + Vector3::new(scale_bias.y, scale_bias.z, scale_bias.w)
    }
}

/// Maps a value decoded from `from` into a value to be encoded into `to`.
///
/// Values of normalized attributes pass through their normalized range.
pub(in crate::primitive) fn rescale(
    attribute: Attribute,
    from: DataFormat,
    to: DataFormat,
    value: Value,
) -> Value {
    if attribute.is_normalized() && from != to {
        encoding::denormalize(to, encoding::normalize(from, value))
    }
    else {
        value
    }
}

fn converter(attribute: Attribute) -> fn(DataFormat, &[u8], DataFormat, &mut [u8]) {
    if attribute.is_normalized() {
        encoding::convert_normalized
    }
    else {
        encoding::convert
    }
}

fn default_vertex_scale_bias() -> Vector4<f32> {
    Vector4::new(1.0, 0.0, 0.0, 0.0)
}

fn default_texture_scale_bias() -> Vector4<f32> {
    Vector4::new(1.0, 1.0, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::{Point2, Point3, Vector4};

    use crate::encoding;
    use crate::format::{Attribute, DataFormat, VertexFormat};
    use crate::primitive::{Access, Limits, Primitive, PrimitiveError, PrimitiveType};

    fn positions(format: DataFormat) -> VertexFormat {
        let mut vertex = VertexFormat::new();
        vertex.add_position(format).unwrap();
        vertex
    }

    #[test]
    fn reject_invalid_counts() {
        let format = positions(DataFormat::Vector3x32);
        let mut primitive = Primitive::new(PrimitiveType::TriangleList);

        assert_eq!(
            Err(PrimitiveError::VertexCountZero),
            primitive.set_format(format, 0, 3)
        );
        assert_eq!(
            Err(PrimitiveError::VertexCountExceeded {
                count: 70000,
                limit: 65536,
            }),
            primitive.set_format(format, 70000, 3),
        );
        assert_eq!(
            Err(PrimitiveError::IndexUnaligned),
            primitive.set_format(format, 3, 4)
        );
        assert_eq!(
            Err(PrimitiveError::IndexCountExceeded {
                count: 65538,
                limit: 65535,
            }),
            primitive.set_format(format, 3, 65538),
        );
        assert_eq!(0, primitive.vertex_count());
        assert!(primitive.set_format(format, 65536, 65534).is_err());
        assert!(primitive.set_format(format, 65536, 65532).is_ok());
    }

    #[test]
    fn restrict_counts_with_limits() {
        let format = positions(DataFormat::Vector3x32);
        let mut primitive = Primitive::with_limits(
            PrimitiveType::LineList,
            Limits {
                max_index: 255,
                ..Limits::default()
            },
        );

        assert!(primitive.set_format(format, 257, 0).is_err());
        assert!(primitive.set_format(format, 256, 256).is_err());
        assert_eq!(
            Err(PrimitiveError::IndexUnaligned),
            primitive.set_format(format, 256, 3)
        );
        assert!(primitive.set_format(format, 256, 254).is_ok());
    }

    #[test]
    fn memory_used_sums_buffers() {
        let mut format = positions(DataFormat::Vector3x32);
        format.add_diffuse(DataFormat::Vector4x8).unwrap();
        let mut primitive = Primitive::new(PrimitiveType::TriangleList);
        let empty = primitive.memory_used();
        primitive.set_format(format, 10, 12).unwrap();

        assert_eq!(empty + (10 * 12) + (10 * 4) + (12 * 2), primitive.memory_used());
        assert_eq!(0..10, primitive.vertex_range());
        assert_eq!(0..12, primitive.index_range());
    }

    #[test]
    fn round_trip_vertex_data() {
        let values = [
            [1.0f32, 2.0, 3.0, 4.0],
            [-8.25, 100.5, 0.4, 17.0],
            [250.0, 31.0, 6.6, 0.0],
        ];
        for format in [
            DataFormat::Scalar8,
            DataFormat::Scalar16,
            DataFormat::Scalar32,
            DataFormat::Vector2x16,
            DataFormat::Vector3x8,
            DataFormat::Vector3x32,
            DataFormat::Vector4x8,
            DataFormat::Vector4x16,
            DataFormat::Vector4x32,
            DataFormat::Packed555,
        ] {
            let mut vertex = VertexFormat::new();
            vertex.add_tangent(format).unwrap();
            let mut primitive = Primitive::new(PrimitiveType::PointList);
            primitive.set_format(vertex, values.len(), 0).unwrap();
            let mut primitive = primitive.lock(Access::ReadWrite);
            primitive
                .set_vertex_data(Attribute::Tangent, 0, &values)
                .unwrap();
            let mut read = [[0.0f32; 4]; 3];
            primitive
                .vertex_data(Attribute::Tangent, 0, &mut read)
                .unwrap();

            for (value, read) in values.iter().zip(read.iter()) {
                for n in 0..format.components() {
                    // Clamp into the channel range before comparing.
                    let mut expected = [0u8; 16];
                    encoding::encode(format, *value, &mut expected);
                    let expected = encoding::decode(format, &expected);
                    assert_eq!(expected[n], read[n]);
                    if format.channel_size() == 4 {
                        assert_eq!(value[n], read[n]);
                    }
                }
                for n in format.components()..4 {
                    assert_eq!(0.0, read[n]);
                }
            }
        }
    }

    #[test]
    fn narrowing_vertex_data_is_bounded() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x16), 1, 0)
            .unwrap();
        let mut primitive = primitive.lock(Access::ReadWrite);
        let position = Point3::new(10.3f32, -200.7, 3.5);
        primitive
            .set_vertex_data(Attribute::Position, 0, &[position])
            .unwrap();

        let read = primitive.position(0).unwrap();
        assert_abs_diff_eq!(position, read, epsilon = 0.5);
    }

    #[test]
    fn dequantize_scene_data() {
        let mut format = positions(DataFormat::Vector3x16);
        format
            .add_texture_coordinate(DataFormat::Vector2x8)
            .unwrap();
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive.set_format(format, 2, 0).unwrap();
        primitive.set_vertex_scale_bias(Vector4::new(0.5, 1.0, 2.0, 3.0));
        primitive.set_texture_scale_bias(Vector4::new(0.25, 0.5, 0.0, 1.0));

        let positions = [-4i16, 8, 0, 2, 2, 2]
            .iter()
            .flat_map(|channel| channel.to_le_bytes())
            .collect::<Vec<_>>();
        let mut primitive = primitive.lock(Access::ReadWrite);
        primitive
            .set_vertex_bytes(Attribute::Position, 0, DataFormat::Vector3x16, &positions)
            .unwrap();
        primitive
            .set_vertex_bytes(Attribute::TexCoord(0), 0, DataFormat::Vector2x8, &[4, 2, 8, 0])
            .unwrap();

        assert_eq!(Point3::new(-1.0, 6.0, 3.0), primitive.position(0).unwrap());
        assert_eq!(Point3::new(2.0, 3.0, 4.0), primitive.position(1).unwrap());
        assert_eq!(Point2::new(1.0, 2.0), primitive.texture_coordinate(0, 0).unwrap());
        assert_eq!(Point2::new(2.0, 1.0), primitive.texture_coordinate(0, 1).unwrap());
        assert_eq!(
            positions.as_slice(),
            primitive.vertex_bytes(Attribute::Position).unwrap()
        );
    }

    #[test]
    fn convert_raw_data_between_formats() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 1, 0)
            .unwrap();
        let mut primitive = primitive.lock(Access::ReadWrite);
        primitive
            .set_vertex_bytes(Attribute::Position, 0, DataFormat::Vector2x8, &[7, 9])
            .unwrap();

        assert_eq!([7.0, 9.0, 0.0, 0.0], primitive.value(Attribute::Position, 0).unwrap());
        assert_eq!(
            Err(PrimitiveError::DataUnaligned),
            primitive.set_vertex_bytes(Attribute::Position, 0, DataFormat::Vector2x8, &[7]),
        );
    }

    #[test]
    fn read_raw_data_in_requested_format() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 2, 0)
            .unwrap();
        let mut primitive = primitive.lock(Access::ReadWrite);
        primitive
            .set_vertex_data(
                Attribute::Position,
                0,
                &[[1.0f32, -2.5, 300.0], [4.0, -5.0, 6.4]],
            )
            .unwrap();

        let mut bytes = [0u8; 6];
        primitive
            .vertex_bytes_as(Attribute::Position, 1, DataFormat::Vector3x16, &mut bytes)
            .unwrap();
        let channels = bytes
            .chunks_exact(2)
            .map(|channel| i16::from_le_bytes([channel[0], channel[1]]))
            .collect::<Vec<_>>();
        assert_eq!(vec![4, -5, 6], channels);
        assert_eq!(
            Err(PrimitiveError::DataUnaligned),
            primitive.vertex_bytes_as(
                Attribute::Position,
                0,
                DataFormat::Vector3x16,
                &mut bytes[..5]
            ),
        );
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.vertex_bytes_as(Attribute::Position, 2, DataFormat::Vector3x16, &mut bytes),
        );
    }

    #[test]
    fn normalize_color_channels() {
        let mut format = positions(DataFormat::Vector3x32);
        format.add_diffuse(DataFormat::Vector4x8).unwrap();
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive.set_format(format, 2, 0).unwrap();
        let mut primitive = primitive.lock(Access::ReadWrite);
        primitive
            .set_vertex_data(Attribute::Diffuse, 0, &[[1.0f32, 0.5, 0.0, 1.0]])
            .unwrap();
        primitive
            .set_vertex_data(Attribute::Diffuse, 1, &[[255u8, 51, 0, 255]])
            .unwrap();

        let mut bytes = [0u8; 8];
        primitive
            .vertex_bytes_as(Attribute::Diffuse, 0, DataFormat::Vector4x8, &mut bytes)
            .unwrap();
        assert_eq!([255, 128, 0, 255, 255, 51, 0, 255], bytes);

        let color = primitive.value(Attribute::Diffuse, 1).unwrap();
        assert_abs_diff_eq!(1.0, color[0]);
        assert_abs_diff_eq!(0.2, color[1], epsilon = 1.0e-6);

        let mut colors = [[0u8; 4]; 2];
        primitive
            .vertex_data(Attribute::Diffuse, 0, &mut colors)
            .unwrap();
        assert_eq!([[255, 128, 0, 255], [255, 51, 0, 255]], colors);

        let mut colors = [0u8; 16];
        primitive
            .vertex_bytes_as(Attribute::Diffuse, 1, DataFormat::Vector4x32, &mut colors)
            .unwrap();
        assert_eq!(&1.0f32.to_le_bytes(), &colors[..4]);
    }

    #[test]
    fn reject_missing_attribute_and_overrun() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 2, 0)
            .unwrap();
        let mut primitive = primitive.lock(Access::Write);

        assert_eq!(
            Err(PrimitiveError::AttributeNotFound(Attribute::Normal)),
            primitive.set_vertex_data(Attribute::Normal, 0, &[[0.0f32; 3]]),
        );
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.set_vertex_data(Attribute::Position, 1, &[[0.0f32; 3]; 2]),
        );
    }

    #[test]
    fn set_and_get_indices() {
        let mut primitive = Primitive::new(PrimitiveType::TriangleList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 100, 6)
            .unwrap();
        let mut primitive = primitive.lock(Access::ReadWrite);
        primitive.set_indices(0, &[0, 1, 2, 99, 98, 97]).unwrap();

        let mut indices = [0u32; 3];
        primitive.indices(3, &mut indices).unwrap();
        assert_eq!([99, 98, 97], indices);
        assert_eq!(12, primitive.index_bytes().len());
        assert_eq!(&[99, 0], &primitive.index_bytes()[6..8]);
    }

    #[test]
    fn reject_lossy_indices() {
        let mut primitive = Primitive::new(PrimitiveType::TriangleList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 100, 3)
            .unwrap();
        let mut primitive = primitive.lock(Access::ReadWrite);

        assert_eq!(
            Err(PrimitiveError::IndexOverflow),
            primitive.set_indices(0, &[0, 1, 70000])
        );
        assert_eq!(
            Err(PrimitiveError::IndexOutOfBounds),
            primitive.set_indices(0, &[0, 1, 100])
        );
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.set_indices(1, &[0, 1, 2])
        );
        // Nothing is written when validation fails.
        let mut indices = [7u32; 3];
        primitive.indices(0, &mut indices).unwrap();
        assert_eq!([0, 0, 0], indices);
    }

    #[test]
    fn bounded_ranges() {
        let mut primitive = Primitive::new(PrimitiveType::TriangleList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 10, 9)
            .unwrap();

        primitive.set_vertex_range_end(6).unwrap();
        primitive.set_vertex_range_begin(2).unwrap();
        assert_eq!(2..6, primitive.vertex_range());
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.set_vertex_range_begin(7)
        );
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.set_vertex_range_end(1)
        );
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.set_vertex_range_end(11)
        );

        primitive.set_index_range_begin(3).unwrap();
        assert_eq!(
            Err(PrimitiveError::RangeOutOfBounds),
            primitive.set_index_range_end(10)
        );
        assert_eq!(3..9, primitive.index_range());
    }

    #[test]
    fn center_of_positions() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 3, 0)
            .unwrap();
        primitive.set_bound(Point3::new(-9.0, -9.0, -9.0), Point3::new(9.0, 9.0, 9.0), 15.6);
        let mut primitive = primitive.lock(Access::ReadWrite);
        primitive
            .set_vertex_data(
                Attribute::Position,
                0,
                &[
                    Point3::new(-1.0f32, 0.0, 4.0),
                    Point3::new(3.0, 2.0, 0.0),
                    Point3::new(1.0, -2.0, 2.0),
                ],
            )
            .unwrap();

        assert_eq!(Point3::new(1.0, 0.0, 2.0), primitive.center().unwrap());
        assert_eq!(15.6, primitive.bound_radius());
    }

    #[test]
    fn count_triangles() {
        let format = positions(DataFormat::Vector3x32);
        let mut primitive = Primitive::new(PrimitiveType::TriangleList);
        primitive.set_format(format, 9, 0).unwrap();
        assert_eq!(3, primitive.triangle_count());

        let mut primitive = Primitive::new(PrimitiveType::TriangleStrip);
        primitive.set_format(format, 4, 6).unwrap();
        assert_eq!(4, primitive.triangle_count());

        let mut primitive = Primitive::new(PrimitiveType::LineStrip);
        primitive.set_format(format, 4, 0).unwrap();
        assert_eq!(0, primitive.triangle_count());
    }

    #[test]
    #[should_panic]
    fn reject_read_without_lock() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 1, 0)
            .unwrap();
        let _ = primitive.position(0);
    }

    #[test]
    #[should_panic]
    fn reject_write_with_read_lock() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        primitive
            .set_format(positions(DataFormat::Vector3x32), 1, 0)
            .unwrap();
        let mut primitive = primitive.lock(Access::Read);
        let _ = primitive.set_vertex_data(Attribute::Position, 0, &[[0.0f32; 3]]);
    }

    #[test]
    #[should_panic]
    fn reject_reformat_while_locked() {
        let mut primitive = Primitive::new(PrimitiveType::PointList);
        let mut primitive = primitive.lock(Access::Write);
        let _ = primitive.set_format(positions(DataFormat::Vector3x32), 1, 0);
    }
}
