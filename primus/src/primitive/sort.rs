//! Triangle sorting.
//!
//! Triangles of an indexed triangle list can be reordered by their distance
//! from a reference point, which is typically used to draw translucent
//! geometry in a consistent order. Distances are computed from a single point
//! per triangle: the average of its vertices in world space. Each sort is
//! stable and rewrites the entire index buffer.
//!
//! Sorting uses a caller-owned [`SortBuffer`] for scratch space, so that one
//! buffer can be reused to sort many primitives without allocating.
//!
//! # Examples
//!
//! ```rust
//! # extern crate nalgebra;
//! # extern crate primus;
//! #
//! use nalgebra::{Matrix4, Point3};
//! use primus::format::{Attribute, DataFormat, VertexFormat};
//! use primus::primitive::{Access, Primitive, PrimitiveType, SortBuffer};
//!
//! let mut format = VertexFormat::new();
//! format.add_position(DataFormat::Vector3x32).unwrap();
//! let mut primitive = Primitive::new(PrimitiveType::TriangleList);
//! primitive.set_format(format, 4, 6).unwrap();
//!
//! let mut buffer = SortBuffer::new();
//! let mut primitive = primitive.lock(Access::ReadWrite);
//! primitive
//!     .set_vertex_data(
//!         Attribute::Position,
//!         0,
//!         &[
//!             Point3::new(0.0f32, 0.0, 0.0),
//!             Point3::new(1.0, 0.0, 0.0),
//!             Point3::new(0.0, 1.0, 0.0),
//!             Point3::new(1.0, 1.0, 0.0),
//!         ],
//!     )
//!     .unwrap();
//! primitive.set_indices(0, &[0, 1, 2, 2, 1, 3]).unwrap();
//! primitive
//!     .sort_back_to_front(
//!         &mut buffer,
//!         &Point3::new(0.0, 0.0, 10.0),
//!         &Matrix4::identity(),
//!         &[],
//!     )
//!     .unwrap();
//! ```

use decorum::N32;
use nalgebra::{Matrix4, Point3, Vector3};
use std::cmp::Reverse;

use crate::format::Attribute;
use crate::index;
use crate::primitive::access::{expect_readable, expect_writable};
use crate::primitive::{Positions, Primitive, PrimitiveError};

/// Reusable scratch space for sorting triangles.
///
/// The buffer grows on demand and never shrinks.
#[derive(Clone, Debug, Default)]
pub struct SortBuffer {
    // Triangle order followed by a copy of the index buffer.
    integers: Vec<u32>,
    distances: Vec<f32>,
}

impl SortBuffer {
    pub fn new() -> Self {
        SortBuffer::default()
    }

    /// Reserves space for sorting `triangles` triangles with `indices` indices.
    pub fn reserve(&mut self, triangles: usize, indices: usize) {
        self.integers.clear();
        self.distances.clear();
        self.integers.reserve(triangles + indices);
        self.distances.reserve(triangles);
    }

    /// Gets the number of triangles of an indexed triangle list that can be
    /// sorted without allocating.
    pub fn capacity(&self) -> usize {
        self.distances.capacity().min(self.integers.capacity() / 4)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Direction {
    Ascending,
    Descending,
}

impl Primitive {
    /// Sorts triangles by ascending distance from `reference`.
    ///
    /// If the primitive has both weights and bone indices and `bones` is not
    /// empty, then each vertex is skinned by the transforms of its first two
    /// influences with weights `w` and `1 - w`. Otherwise, vertices are
    /// transformed by `model`. `bones` is indexed by packed bone indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive is not an indexed triangle list, has
    /// no positions, or references a bone beyond `bones`.
    ///
    /// # Panics
    ///
    /// Panics if the primitive is not locked for reading and writing.
    pub fn sort_front_to_back(
        &mut self,
        buffer: &mut SortBuffer,
        reference: &Point3<f32>,
        model: &Matrix4<f32>,
        bones: &[Matrix4<f32>],
    ) -> Result<(), PrimitiveError> {
        self.sort_by_distance(buffer, reference, model, bones, Direction::Ascending)
    }

    /// Sorts triangles by descending distance from `reference`.
    ///
    /// See [`Primitive::sort_front_to_back`].
    pub fn sort_back_to_front(
        &mut self,
        buffer: &mut SortBuffer,
        reference: &Point3<f32>,
        model: &Matrix4<f32>,
        bones: &[Matrix4<f32>],
    ) -> Result<(), PrimitiveError> {
        self.sort_by_distance(buffer, reference, model, bones, Direction::Descending)
    }

    /// Sorts triangles by ascending distance from the
    /// [center][`Primitive::center`] of the primitive in model space.
    pub fn sort_inside_out(&mut self, buffer: &mut SortBuffer) -> Result<(), PrimitiveError> {
        self.sort_from_center(buffer, Direction::Ascending)
    }

    /// Sorts triangles by descending distance from the
    /// [center][`Primitive::center`] of the primitive in model space.
    pub fn sort_outside_in(&mut self, buffer: &mut SortBuffer) -> Result<(), PrimitiveError> {
        self.sort_from_center(buffer, Direction::Descending)
    }

    fn sort_from_center(
        &mut self,
        buffer: &mut SortBuffer,
        direction: Direction,
    ) -> Result<(), PrimitiveError> {
        expect_writable(self.access);
        let center = self.center()?;
        self.sort_by_distance(buffer, &center, &Matrix4::identity(), &[], direction)
    }

    fn sort_by_distance(
        &mut self,
        buffer: &mut SortBuffer,
        reference: &Point3<f32>,
        model: &Matrix4<f32>,
        bones: &[Matrix4<f32>],
        direction: Direction,
    ) -> Result<(), PrimitiveError> {
        expect_readable(self.access);
        expect_writable(self.access);
        self.expect_triangles()?;
        let count = self.index_count / 3;
        log::trace!("sorting {} triangles ({:?})", count, direction);

        buffer.reserve(count, self.index_count);
        let skinned = self.format.has(Attribute::Weights)
            && self.format.has(Attribute::BoneIndices)
            && !bones.is_empty();
        let positions = self.positions()?;
        for triangle in index::triangles(self.index_values()) {
            let mut sum = Vector3::zeros();
            for vertex in triangle.iter().map(|vertex| usize::from(*vertex)) {
                sum += if skinned {
                    self.skin(&positions, vertex, bones)?
                }
                else {
                    positions.get(vertex).coords
                };
            }
            let point = if skinned {
                Point3::from(sum / 3.0)
            }
            else {
                model.transform_point(&Point3::from(sum / 3.0))
            };
            buffer
                .distances
                .push(nalgebra::distance_squared(reference, &point));
        }

        buffer.integers.extend(0..(count as u32));
        buffer
            .integers
            .extend(self.index_values().map(u32::from));
        let (order, indices) = buffer.integers.split_at_mut(count);
        let distances = &buffer.distances;
        match direction {
            Direction::Ascending => {
                order.sort_by_key(|triangle| key(distances[*triangle as usize]));
            }
            Direction::Descending => {
                order.sort_by_key(|triangle| Reverse(key(distances[*triangle as usize])));
            }
        }
        let target = self.index_data_mut();
        for (n, triangle) in order.iter().enumerate() {
            let source = (*triangle as usize) * 3;
            for (k, index) in indices[source..source + 3].iter().enumerate() {
                let at = ((n * 3) + k) * 2;
                target[at..at + 2].copy_from_slice(&(*index as u16).to_le_bytes());
            }
        }
        Ok(())
    }

    fn skin(
        &self,
        positions: &Positions<'_>,
        vertex: usize,
        bones: &[Matrix4<f32>],
    ) -> Result<Vector3<f32>, PrimitiveError> {
        let position = positions.get(vertex);
        let influences = self.influences(vertex)?;
        let weight = if influences.len() > 1 {
            influences[0].1
        }
        else {
            1.0
        };
        influences
            .iter()
            .zip([weight, 1.0 - weight])
            .filter(|(_, weight)| *weight != 0.0)
            .try_fold(Vector3::zeros(), |sum, ((index, _), weight)| {
                let bone = bones
                    .get(*index)
                    .ok_or(PrimitiveError::BoneIndexOverflow(*index))?;
                Ok(sum + (bone.transform_point(&position).coords * weight))
            })
    }
}

// NaN distances are ordered as the farthest.
fn key(distance: f32) -> N32 {
    N32::from_inner(if distance.is_nan() {
        f32::INFINITY
    }
    else {
        distance
    })
}
