//! Element encodings and conversions.
//!
//! Every element stored in a primitive is converted through a _universal
//! value_, a [`Value`] with four `f32` components. Decoding an element fills
//! the components present in its [`DataFormat`] and leaves the remaining
//! components zero. Encoding an element discards components beyond its
//! [`DataFormat`].
//!
//! Decoding does not normalize integer channels: an 8-bit channel holding `200`
//! decodes to `200.0`. Quantized positions and texture coordinates are mapped
//! into their final range with scale/bias vectors instead (see
//! [`Primitive::position`]). Attributes that hold unit quantities, such as
//! colors and bone weights, are [normalized][`normalize`] by the primitive.
//! Encoding into an integer channel rounds to the nearest integer and clamps
//! into the range of the channel, so the error of a narrowing conversion is at
//! most half a quantization step for values within that range.
//!
//! Multi-byte channels are little-endian.
//!
//! [`Primitive::position`]: crate::primitive::Primitive::position

mod value;

use crate::format::DataFormat;

pub use crate::encoding::value::{Channel, VertexValue};

/// Universal element value.
pub type Value = [f32; 4];

const PACKED_CHANNEL_MAX: f32 = 31.0;

/// Decodes an element from the leading bytes of `bytes`.
///
/// # Panics
///
/// Panics if `bytes` is shorter than the size of `format`.
pub fn decode(format: DataFormat, bytes: &[u8]) -> Value {
    let mut value = [0.0; 4];
    match format {
        DataFormat::None => {}
        DataFormat::Packed555 => {
            let packed = u16::from_le_bytes([bytes[0], bytes[1]]);
            for (n, component) in value.iter_mut().take(3).enumerate() {
                *component = f32::from((packed >> (10 - (5 * n))) & 0x1f);
            }
        }
        _ => {
            let width = format.channel_size();
            for (component, channel) in value
                .iter_mut()
                .zip(bytes[..format.size()].chunks_exact(width))
            {
                *component = match width {
                    1 => f32::from(channel[0]),
                    2 => f32::from(i16::from_le_bytes([channel[0], channel[1]])),
                    _ => f32::from_le_bytes([channel[0], channel[1], channel[2], channel[3]]),
                };
            }
        }
    }
    value
}

/// Encodes an element into the leading bytes of `bytes`.
///
/// # Panics
///
/// Panics if `bytes` is shorter than the size of `format`.
pub fn encode(format: DataFormat, value: Value, bytes: &mut [u8]) {
    match format {
        DataFormat::None => {}
        DataFormat::Packed555 => {
            let packed = value
                .iter()
                .take(3)
                .enumerate()
                .fold(0u16, |packed, (n, component)| {
                    let channel = num::clamp(component.round(), 0.0, PACKED_CHANNEL_MAX) as u16;
                    packed | (channel << (10 - (5 * n)))
                });
            bytes[..2].copy_from_slice(&packed.to_le_bytes());
        }
        _ => {
            let width = format.channel_size();
            for (component, channel) in value
                .iter()
                .zip(bytes[..format.size()].chunks_exact_mut(width))
            {
                match width {
                    1 => {
                        channel[0] = u8::from_component(*component);
                    }
                    2 => {
                        channel.copy_from_slice(&i16::from_component(*component).to_le_bytes());
                    }
                    _ => {
                        channel.copy_from_slice(&component.to_le_bytes());
                    }
                }
            }
        }
    }
}

/// Converts an element from one data format into another.
pub fn convert(from: DataFormat, source: &[u8], to: DataFormat, target: &mut [u8]) {
    if from == to {
        let size = from.size();
        target[..size].copy_from_slice(&source[..size]);
    }
    else {
        encode(to, decode(from, source), target);
    }
}

/// Converts an element from one data format into another, mapping integer
/// channels through their normalized range.
///
/// See [`normalize`].
pub fn convert_normalized(from: DataFormat, source: &[u8], to: DataFormat, target: &mut [u8]) {
    if from == to {
        convert(from, source, to, target);
    }
    else {
        encode(to, denormalize(to, normalize(from, decode(from, source))), target);
    }
}

/// Maps the decoded integer channels of a value into `[0, 1]` for unsigned
/// channels or `[-1, 1]` for signed channels.
///
/// Floating-point channels are unchanged.
pub fn normalize(format: DataFormat, value: Value) -> Value {
    let max = channel_max(format);
    value.map(|component| (component / max).max(-1.0))
}

/// Maps a normalized value back into the integer range of a data format.
///
/// This is the inverse of [`normalize`]. The result is expected to be
/// [encoded][`encode`], which rounds and clamps.
pub fn denormalize(format: DataFormat, value: Value) -> Value {
    let max = channel_max(format);
    value.map(|component| component * max)
}

fn channel_max(format: DataFormat) -> f32 {
    match format {
        DataFormat::Packed555 => PACKED_CHANNEL_MAX,
        _ => match format.channel_size() {
            1 => f32::from(u8::MAX),
            2 => f32::from(i16::MAX),
            _ => 1.0,
        },
    }
}

/// Gets the quantization step of a data format.
///
/// This is the largest difference between adjacent representable values and
/// is zero for floating-point formats.
pub fn quantum(format: DataFormat) -> f32 {
    match format.channel_size() {
        4 => 0.0,
        _ if format.is_none() => 0.0,
        _ => 1.0,
    }
}
