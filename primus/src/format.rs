//! Vertex formats.
//!
//! A [`VertexFormat`] describes which per-vertex attributes a primitive stores
//! and the [`DataFormat`] (encoding) of each. Attributes are addressed by
//! [`Attribute`] _slots_. There are sixteen slots, and each slot stores a
//! four-bit data format code, so an entire format packs into a single `u64`.
//! Queries and updates of a slot are constant-time shifts and masks.
//!
//! Data formats describe a component count (scalar or 2, 3, or 4 component
//! vectors) and a channel precision. 8-bit channels are unsigned integers,
//! 16-bit channels are signed integers, and 32-bit channels are floating-point.
//! There is also a packed encoding with three 5-bit unsigned channels.
//! Quantized data is mapped back into floating-point values using the
//! scale/bias vectors of a [`Primitive`].
//!
//! # Examples
//!
//! Describing a skinned and textured vertex:
//!
//! ```rust
//! use primus::format::{DataFormat, VertexFormat};
//!
//! let mut format = VertexFormat::new();
//! format
//!     .add_position(DataFormat::Vector3x32)
//!     .and_then(|format| format.add_normal(DataFormat::Vector3x16))
//!     .and_then(|format| format.add_texture_coordinate(DataFormat::Vector2x32))
//!     .and_then(|format| format.add_weights(DataFormat::Scalar32))
//!     .and_then(|format| format.add_bone_indices(DataFormat::Vector2x8))
//!     .unwrap();
//!
//! assert_eq!(12 + 6 + 8 + 4 + 2, format.vertex_size());
//! assert_eq!(1, format.texture_coordinates());
//! ```
//!
//! [`Primitive`]: crate::primitive::Primitive

use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Maximum number of texture coordinate layers.
pub const MAX_TEXTURE_LAYERS: usize = 8;

/// Number of attribute slots in a [`VertexFormat`].
pub const ATTRIBUTE_COUNT: usize = 8 + MAX_TEXTURE_LAYERS;

const SLOT_BITS: u32 = 4;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum FormatError {
    #[error("attribute {0:?} is already present")]
    AttributeConflict(Attribute),
    #[error("transformed positions conflict with positions and normals")]
    TransformConflict,
    #[error("texture coordinate layers exceed the limit of {}", MAX_TEXTURE_LAYERS)]
    TextureLayerOverflow,
    #[error("data format of attribute {0:?} is absent")]
    DataFormatNone(Attribute),
}

/// Per-vertex attribute slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Attribute {
    Position,
    /// Position that has already been projected into screen space.
    TransformedPosition,
    Normal,
    Diffuse,
    Specular,
    Tangent,
    Weights,
    BoneIndices,
    /// Texture coordinates of the given layer.
    TexCoord(u8),
}

impl Attribute {
    /// Gets the texture coordinate attribute of a layer or `None` if the layer
    /// exceeds [`MAX_TEXTURE_LAYERS`].
    pub fn texture(layer: usize) -> Option<Self> {
        (layer < MAX_TEXTURE_LAYERS).then(|| Attribute::TexCoord(layer as u8))
    }

    /// Gets the slot of the attribute in `0..ATTRIBUTE_COUNT`.
    ///
    /// # Panics
    ///
    /// Panics if the attribute is a texture coordinate layer beyond
    /// [`MAX_TEXTURE_LAYERS`].
    pub fn slot(self) -> usize {
        match self {
            Attribute::Position => 0,
            Attribute::TransformedPosition => 1,
            Attribute::Normal => 2,
            Attribute::Diffuse => 3,
            Attribute::Specular => 4,
            Attribute::Tangent => 5,
            Attribute::Weights => 6,
            Attribute::BoneIndices => 7,
            Attribute::TexCoord(layer) => {
                let layer = usize::from(layer);
                assert!(
                    layer < MAX_TEXTURE_LAYERS,
                    "texture coordinate layer {} out of bounds",
                    layer
                );
                8 + layer
            }
        }
    }

    /// Returns `true` if the attribute holds unit quantities, in which case
    /// its integer channels are normalized when converted.
    ///
    /// Colors and bone weights are normalized.
    pub fn is_normalized(self) -> bool {
        matches!(
            self,
            Attribute::Diffuse | Attribute::Specular | Attribute::Weights
        )
    }

    pub fn from_slot(slot: usize) -> Option<Self> {
        Some(match slot {
            0 => Attribute::Position,
            1 => Attribute::TransformedPosition,
            2 => Attribute::Normal,
            3 => Attribute::Diffuse,
            4 => Attribute::Specular,
            5 => Attribute::Tangent,
            6 => Attribute::Weights,
            7 => Attribute::BoneIndices,
            _ => return Attribute::texture(slot.checked_sub(8)?),
        })
    }
}

/// Numeric encoding of an attribute.
///
/// The name describes the component count and the bit width of each channel.
/// 8-bit channels are `u8`, 16-bit channels are `i16`, and 32-bit channels are
/// `f32`. `Packed555` stores three 5-bit unsigned channels in a `u16`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum DataFormat {
    #[default]
    None = 0,
    Scalar8,
    Scalar16,
    Scalar32,
    Vector2x8,
    Vector2x16,
    Vector2x32,
    Vector3x8,
    Vector3x16,
    Vector3x32,
    Vector4x8,
    Vector4x16,
    Vector4x32,
    Packed555,
}

impl DataFormat {
    const FORMATS: [DataFormat; 14] = [
        DataFormat::None,
        DataFormat::Scalar8,
        DataFormat::Scalar16,
        DataFormat::Scalar32,
        DataFormat::Vector2x8,
        DataFormat::Vector2x16,
        DataFormat::Vector2x32,
        DataFormat::Vector3x8,
        DataFormat::Vector3x16,
        DataFormat::Vector3x32,
        DataFormat::Vector4x8,
        DataFormat::Vector4x16,
        DataFormat::Vector4x32,
        DataFormat::Packed555,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        DataFormat::FORMATS.get(usize::from(code)).copied()
    }

    /// Gets the number of components.
    pub fn components(self) -> usize {
        match self {
            DataFormat::None => 0,
            DataFormat::Scalar8 | DataFormat::Scalar16 | DataFormat::Scalar32 => 1,
            DataFormat::Vector2x8 | DataFormat::Vector2x16 | DataFormat::Vector2x32 => 2,
            DataFormat::Vector3x8
            | DataFormat::Vector3x16
            | DataFormat::Vector3x32
            | DataFormat::Packed555 => 3,
            DataFormat::Vector4x8 | DataFormat::Vector4x16 | DataFormat::Vector4x32 => 4,
        }
    }

    /// Gets the size of a single channel in bytes.
    ///
    /// The channels of `Packed555` are not byte addressable, so this is zero
    /// for that format.
    pub fn channel_size(self) -> usize {
        match self {
            DataFormat::None | DataFormat::Packed555 => 0,
            DataFormat::Scalar8
            | DataFormat::Vector2x8
            | DataFormat::Vector3x8
            | DataFormat::Vector4x8 => 1,
            DataFormat::Scalar16
            | DataFormat::Vector2x16
            | DataFormat::Vector3x16
            | DataFormat::Vector4x16 => 2,
            DataFormat::Scalar32
            | DataFormat::Vector2x32
            | DataFormat::Vector3x32
            | DataFormat::Vector4x32 => 4,
        }
    }

    /// Gets the size of an element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataFormat::Packed555 => 2,
            _ => self.components() * self.channel_size(),
        }
    }

    pub fn is_none(self) -> bool {
        self == DataFormat::None
    }
}

/// Alignment of whole vertices.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Alignment {
    #[default]
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
}

impl Alignment {
    pub fn bytes(self) -> usize {
        self as usize
    }

    fn align(self, size: usize) -> usize {
        let n = self.bytes();
        (size + n - 1) / n * n
    }
}

/// Bit-packed description of vertex attributes and their data formats.
///
/// Equality and hashing only consider the data formats of the slots; the
/// alignment is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct VertexFormat {
    slots: u64,
    alignment: Alignment,
}

impl VertexFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn add_position(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::Position, format)
    }

    pub fn add_transformed_position(
        &mut self,
        format: DataFormat,
    ) -> Result<&mut Self, FormatError> {
        self.add(Attribute::TransformedPosition, format)
    }

    pub fn add_normal(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::Normal, format)
    }

    pub fn add_diffuse(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::Diffuse, format)
    }

    pub fn add_specular(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::Specular, format)
    }

    pub fn add_tangent(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::Tangent, format)
    }

    pub fn add_weights(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::Weights, format)
    }

    pub fn add_bone_indices(&mut self, format: DataFormat) -> Result<&mut Self, FormatError> {
        self.add(Attribute::BoneIndices, format)
    }

    /// Adds the next texture coordinate layer.
    ///
    /// Layers are always added contiguously starting at layer zero.
    ///
    /// # Errors
    ///
    /// Returns an error if all [`MAX_TEXTURE_LAYERS`] layers are populated.
    pub fn add_texture_coordinate(
        &mut self,
        format: DataFormat,
    ) -> Result<&mut Self, FormatError> {
        let attribute = Attribute::texture(self.texture_coordinates())
            .ok_or(FormatError::TextureLayerOverflow)?;
        self.add(attribute, format)
    }

    /// Populates the slot of an attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is already populated, if `format` is
    /// `DataFormat::None`, or if the attribute conflicts with transformed
    /// positions.
    pub fn add(
        &mut self,
        attribute: Attribute,
        format: DataFormat,
    ) -> Result<&mut Self, FormatError> {
        if format.is_none() {
            return Err(FormatError::DataFormatNone(attribute));
        }
        if self.has(attribute) {
            return Err(FormatError::AttributeConflict(attribute));
        }
        self.set_data_format(attribute, format)?;
        Ok(self)
    }

    /// Gets the data format of an attribute.
    pub fn data_format(&self, attribute: Attribute) -> DataFormat {
        let code = (self.slots >> (attribute.slot() as u32 * SLOT_BITS)) & SLOT_MASK;
        // Codes are only ever written from `DataFormat`s.
        DataFormat::from_code(code as u8).unwrap_or_default()
    }

    /// Sets the data format of an attribute, replacing any previous format.
    ///
    /// Setting `DataFormat::None` clears the slot. Unlike the `add_*`
    /// functions, this does not require texture layers to be contiguous.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute conflicts with transformed positions.
    pub fn set_data_format(
        &mut self,
        attribute: Attribute,
        format: DataFormat,
    ) -> Result<(), FormatError> {
        if !format.is_none() {
            let conflict = match attribute {
                Attribute::TransformedPosition => {
                    self.has(Attribute::Position) || self.has(Attribute::Normal)
                }
                Attribute::Position | Attribute::Normal => {
                    self.has(Attribute::TransformedPosition)
                }
                _ => false,
            };
            if conflict {
                return Err(FormatError::TransformConflict);
            }
        }
        let shift = attribute.slot() as u32 * SLOT_BITS;
        self.slots = (self.slots & !(SLOT_MASK << shift)) | (u64::from(format.code()) << shift);
        Ok(())
    }

    pub fn has(&self, attribute: Attribute) -> bool {
        !self.data_format(attribute).is_none()
    }

    /// Gets the number of contiguous texture coordinate layers starting at
    /// layer zero.
    pub fn texture_coordinates(&self) -> usize {
        (0..MAX_TEXTURE_LAYERS)
            .take_while(|layer| self.has(Attribute::TexCoord(*layer as u8)))
            .count()
    }

    /// Gets the size of a vertex in bytes, rounded up to the alignment.
    pub fn vertex_size(&self) -> usize {
        self.alignment
            .align(self.attributes().map(|(_, format)| format.size()).sum())
    }

    /// Gets an iterator over the populated attributes in slot order.
    pub fn attributes(&self) -> impl '_ + Iterator<Item = (Attribute, DataFormat)> {
        (0..ATTRIBUTE_COUNT)
            .filter_map(Attribute::from_slot)
            .map(move |attribute| (attribute, self.data_format(attribute)))
            .filter(|(_, format)| !format.is_none())
    }

    pub fn is_empty(&self) -> bool {
        self.slots == 0
    }
}

impl Eq for VertexFormat {}

impl Hash for VertexFormat {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.slots.hash(state);
    }
}

impl PartialEq for VertexFormat {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots
    }
}
