//! Bone packing and splitting.
//!
//! Skinned primitives reference bones of a skeleton through the
//! [`Attribute::BoneIndices`] attribute. Skinning palettes are small, so a
//! primitive is _packed_ to reference a dense range of palette indices and
//! records the skeleton indices of the bones it actually uses. A primitive that
//! still uses too many bones is split into two sets of triangles, each of which
//! can be [extracted][`Primitive::extract`] into its own primitive.
//!
//! # Influences
//!
//! A vertex has one influence per component of its bone indices. Stored weights
//! apply to the leading influences, the influence following them receives the
//! remaining weight `1 - sum`, and any later influences receive no weight.
//! Without weights, the first influence has full weight. Integer weights are
//! normalized, so an 8-bit weight of `255` is a weight of `1.0`.

use ahash::{AHashMap, AHashSet};
use arrayvec::ArrayVec;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::encoding::{Value, VertexValue};
use crate::format::Attribute;
use crate::index;
use crate::primitive::access::{expect_readable, expect_writable};
use crate::primitive::{
    rescale, Access, BoneState, Primitive, PrimitiveError, PrimitiveType,
};

pub(in crate::primitive) const MAX_INFLUENCES: usize = 4;

/// Bone indices and weights of a vertex.
pub(in crate::primitive) type Influences = ArrayVec<(usize, f32), MAX_INFLUENCES>;

impl Primitive {
    /// Returns `true` if the bone indices have been packed or the used bones
    /// have been recorded.
    pub fn is_packed(&self) -> bool {
        self.bones == BoneState::Packed
    }

    /// Gets the skeleton indices of the used bones.
    ///
    /// Packed bone indices refer to positions in this list.
    pub fn used_bones(&self) -> &[u8] {
        &self.used_bones
    }

    pub fn used_bone_count(&self) -> usize {
        self.used_bones.len()
    }

    /// Records the used bones of a primitive whose bone indices are already
    /// packed.
    ///
    /// Bone indices are neither scanned nor rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of bones exceeds the [`Limits`] of the
    /// primitive.
    ///
    /// [`Limits`]: crate::primitive::Limits
    pub fn set_used_bones(&mut self, bones: &[u8]) -> Result<(), PrimitiveError> {
        let limit = usize::from(self.limits.max_bones);
        if bones.len() > limit {
            return Err(PrimitiveError::BoneCountExceeded {
                count: bones.len(),
                limit,
            });
        }
        self.used_bones = bones.to_vec();
        self.bones = BoneState::Packed;
        Ok(())
    }

    /// Packs bone indices into a dense range.
    ///
    /// Every bone referenced by an influence with positive weight is recorded
    /// in the sorted list of [used bones][`Primitive::used_bones`] and each
    /// such influence is rewritten to the position of its bone in that list.
    /// Influences without weight are rewritten to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the bones have already been packed or recorded, if
    /// the primitive has no bone indices, if a bone index exceeds `u8::MAX`, if
    /// no influence has positive weight, or if the number of used bones
    /// exceeds the [`Limits`] of the primitive. The primitive is not modified
    /// on error.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading and writing.
    ///
    /// [`Limits`]: crate::primitive::Limits
    pub fn pack_bones(&mut self) -> Result<(), PrimitiveError> {
        expect_readable(self.access);
        expect_writable(self.access);
        if self.is_packed() {
            return Err(PrimitiveError::BonesPacked);
        }
        let (format, offset) = self.attribute_offset(Attribute::BoneIndices)?;
        let influences = (0..self.vertex_count)
            .map(|vertex| self.influences(vertex))
            .collect::<Result<Vec<_>, _>>()?;
        let used = influences
            .iter()
            .flatten()
            .filter(|(_, weight)| *weight > 0.0)
            .map(|(index, _)| {
                u8::try_from(*index).map_err(|_| PrimitiveError::BoneIndexOverflow(*index))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sorted()
            .dedup()
            .collect::<Vec<_>>();
        if used.is_empty() {
            return Err(PrimitiveError::BonesUnweighted);
        }
        let limit = usize::from(self.limits.max_bones);
        if used.len() > limit {
            return Err(PrimitiveError::BoneCountExceeded {
                count: used.len(),
                limit,
            });
        }

        let mut palette = [0u8; 256];
        for (n, bone) in used.iter().enumerate() {
            palette[usize::from(*bone)] = n as u8;
        }
        for (vertex, influences) in influences.iter().enumerate() {
            let mut value = self.decode_unchecked(format, offset, vertex);
            for (component, (index, weight)) in value.iter_mut().zip(influences.iter()) {
                *component = if *weight > 0.0 {
                    f32::from(palette[*index])
                }
                else {
                    0.0
                };
            }
            self.encode_unchecked(format, offset, vertex, value);
        }
        log::debug!(
            "packed {} used bones for {} vertices",
            used.len(),
            self.vertex_count
        );
        self.used_bones = used;
        self.bones = BoneState::Packed;
        Ok(())
    }

    /// Partitions triangles into a set that references at most `max_bones`
    /// bones and a set of the remaining triangles.
    ///
    /// Triangles are chosen greedily: the triangle that adds the fewest bones
    /// not yet referenced by the first set is moved into it, with ties resolved
    /// in favor of the earliest triangle, until the next triangle would exceed
    /// `max_bones`. The remaining triangles keep their original order. This
    /// is not an optimal partition.
    ///
    /// Bone indices are expected to be packed.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive is not an indexed triangle list or has
    /// no bone indices.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn find_split(&self, max_bones: usize) -> Result<(Vec<usize>, Vec<usize>), PrimitiveError> {
        expect_readable(self.access);
        self.expect_triangles()?;
        let bones = (0..self.vertex_count)
            .map(|vertex| {
                self.influences(vertex).map(|influences| {
                    influences
                        .into_iter()
                        .filter(|(_, weight)| *weight > 0.0)
                        .map(|(index, _)| index)
                        .collect::<SmallVec<[usize; MAX_INFLUENCES]>>()
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let triangles = index::triangles(self.index_values())
            .map(|triangle| {
                triangle
                    .iter()
                    .flat_map(|vertex| bones[usize::from(*vertex)].iter().copied())
                    .unique()
                    .collect::<SmallVec<[usize; 3 * MAX_INFLUENCES]>>()
            })
            .collect::<Vec<_>>();

        let mut included = AHashSet::new();
        let mut first = Vec::new();
        let mut second = (0..triangles.len()).collect::<Vec<_>>();
        loop {
            let candidate = second
                .iter()
                .enumerate()
                .map(|(position, triangle)| {
                    let count = triangles[*triangle]
                        .iter()
                        .filter(|bone| !included.contains(*bone))
                        .count();
                    (position, count)
                })
                .min_by_key(|(_, count)| *count);
            match candidate {
                Some((position, count)) if included.len() + count <= max_bones => {
                    let triangle = second.remove(position);
                    included.extend(triangles[triangle].iter().copied());
                    first.push(triangle);
                }
                _ => break,
            }
        }
        if first.is_empty() && !second.is_empty() {
            log::warn!(
                "no triangle fits within {} bones; {} triangles left unsplit",
                max_bones,
                second.len()
            );
        }
        Ok((first, second))
    }

    /// Copies triangles into a new primitive.
    ///
    /// The new primitive has the same format, limits, scale/bias, and bound.
    /// Its vertices are the vertices referenced by `triangles` in order of
    /// first use. If the bones of this primitive are packed, then the new
    /// primitive is packed again and its used bones are mapped back through the
    /// used bones of this primitive, so that they are skeleton indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive is not an indexed triangle list, if a
    /// triangle is out of bounds, or if `triangles` is empty. If the bones of
    /// this primitive are packed, then packing the new primitive may also fail
    /// (see [`Primitive::pack_bones`]).
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading.
    pub fn extract(&self, triangles: &[usize]) -> Result<Primitive, PrimitiveError> {
        expect_readable(self.access);
        self.expect_triangles()?;
        let faces = index::triangles(self.index_values()).collect::<Vec<_>>();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(triangles.len() * 3);
        let mut remap = AHashMap::new();
        for triangle in triangles.iter() {
            let face = faces.get(*triangle).ok_or(PrimitiveError::RangeOutOfBounds)?;
            for vertex in face.iter().copied() {
                let next = vertices.len();
                let index = *remap.entry(vertex).or_insert_with(|| {
                    vertices.push(vertex);
                    next
                });
                indices.push(index as u16);
            }
        }

        let mut primitive = Primitive::with_limits(PrimitiveType::TriangleList, self.limits);
        primitive.set_format(self.format, vertices.len(), indices.len())?;
        for (attribute, format) in self.format.attributes() {
            let (_, source) = self.attribute_offset(attribute)?;
            let (_, target) = primitive.attribute_offset(attribute)?;
            let size = format.size();
            for (n, vertex) in vertices.iter().copied().enumerate() {
                let from = source + (usize::from(vertex) * size);
                let to = target + (n * size);
                primitive.data[to..to + size].copy_from_slice(&self.data[from..from + size]);
            }
        }
        for (n, index) in indices.iter().copied().enumerate() {
            primitive.set_index_unchecked(n, index);
        }
        primitive.vertex_scale_bias = self.vertex_scale_bias;
        primitive.texture_scale_bias = self.texture_scale_bias;
        primitive.set_bound(self.bound_min, self.bound_max, self.bound_radius);

        if self.is_packed() {
            primitive.lock(Access::ReadWrite).pack_bones()?;
            primitive.used_bones = primitive
                .used_bones
                .iter()
                .map(|bone| {
                    self.used_bones
                        .get(usize::from(*bone))
                        .copied()
                        .ok_or_else(|| PrimitiveError::BoneIndexOverflow(usize::from(*bone)))
                })
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(primitive)
    }

    /// Reads the influences of a vertex.
    ///
    /// Negative bone indices are read as zero.
    pub(in crate::primitive) fn influences(
        &self,
        vertex: usize,
    ) -> Result<Influences, PrimitiveError> {
        let (format, offset) = self.attribute_offset(Attribute::BoneIndices)?;
        let indices = self.decode_unchecked(format, offset, vertex);
        let mut weights = [0.0f32; MAX_INFLUENCES];
        match self.attribute_offset(Attribute::Weights) {
            Ok((format, offset)) => {
                let stored = rescale(
                    Attribute::Weights,
                    format,
                    <Value as VertexValue>::FORMAT,
                    self.decode_unchecked(format, offset, vertex),
                );
                let k = format.components().min(MAX_INFLUENCES);
                weights[..k].copy_from_slice(&stored[..k]);
                if k < MAX_INFLUENCES {
                    weights[k] = 1.0 - stored[..k].iter().sum::<f32>();
                }
            }
            Err(_) => {
                weights[0] = 1.0;
            }
        }
        Ok(indices
            .iter()
            .zip(weights)
            .take(format.components())
            .map(|(index, weight)| (index.max(0.0) as usize, weight))
            .collect())
    }
}
