use nalgebra::{Point2, Point3, Vector2, Vector3, Vector4};

use crate::encoding::Value;
use crate::format::DataFormat;

/// Typed element that can be read from and written to a primitive.
///
/// Each implementor has a fixed [`DataFormat`]. Writing converts the element
/// from this format into the stored format of an attribute and reading converts
/// it back, both through the universal [`Value`].
pub trait VertexValue: Copy {
    const FORMAT: DataFormat;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Self;
}

/// Channel of an array element.
///
/// Conversions from `f32` round and clamp exactly as encoding does.
pub trait Channel: Copy + Default {
    const WIDTH: usize;

    fn into_component(self) -> f32;

    fn from_component(component: f32) -> Self;
}

impl Channel for u8 {
    const WIDTH: usize = 1;

    fn into_component(self) -> f32 {
        f32::from(self)
    }

    fn from_component(component: f32) -> Self {
        num::clamp(component.round(), 0.0, f32::from(u8::MAX)) as u8
    }
}

impl Channel for i16 {
    const WIDTH: usize = 2;

    fn into_component(self) -> f32 {
        f32::from(self)
    }

    fn from_component(component: f32) -> Self {
        num::clamp(component.round(), f32::from(i16::MIN), f32::from(i16::MAX)) as i16
    }
}

impl Channel for f32 {
    const WIDTH: usize = 4;

    fn into_component(self) -> f32 {
        self
    }

    fn from_component(component: f32) -> Self {
        component
    }
}

const fn array_format(width: usize, n: usize) -> DataFormat {
    match (width, n) {
        (1, 1) => DataFormat::Scalar8,
        (1, 2) => DataFormat::Vector2x8,
        (1, 3) => DataFormat::Vector3x8,
        (1, 4) => DataFormat::Vector4x8,
        (2, 1) => DataFormat::Scalar16,
        (2, 2) => DataFormat::Vector2x16,
        (2, 3) => DataFormat::Vector3x16,
        (2, 4) => DataFormat::Vector4x16,
        (4, 1) => DataFormat::Scalar32,
        (4, 2) => DataFormat::Vector2x32,
        (4, 3) => DataFormat::Vector3x32,
        (4, 4) => DataFormat::Vector4x32,
        _ => DataFormat::None,
    }
}

macro_rules! impl_vertex_value_array {
    (lengths => $($n:expr),*$(,)?) => (
        $(
            impl<T> VertexValue for [T; $n]
            where
                T: Channel,
            {
                const FORMAT: DataFormat = array_format(T::WIDTH, $n);

                fn into_value(self) -> Value {
                    let mut value = [0.0; 4];
                    for (component, channel) in value.iter_mut().zip(self) {
                        *component = channel.into_component();
                    }
                    value
                }

                fn from_value(value: Value) -> Self {
                    let mut array = [T::default(); $n];
                    for (channel, component) in array.iter_mut().zip(value) {
                        *channel = T::from_component(component);
                    }
                    array
                }
            }
        )*
    );
}
impl_vertex_value_array!(lengths => 2, 3, 4);

impl<T> VertexValue for T
where
    T: Channel,
{
    const FORMAT: DataFormat = array_format(T::WIDTH, 1);

    fn into_value(self) -> Value {
        [self.into_component(), 0.0, 0.0, 0.0]
    }

    fn from_value(value: Value) -> Self {
        T::from_component(value[0])
    }
}

impl VertexValue for Point2<f32> {
    const FORMAT: DataFormat = DataFormat::Vector2x32;

    fn into_value(self) -> Value {
        [self.x, self.y, 0.0, 0.0]
    }

    fn from_value(value: Value) -> Self {
        Point2::new(value[0], value[1])
    }
}

impl VertexValue for Point3<f32> {
    const FORMAT: DataFormat = DataFormat::Vector3x32;

    fn into_value(self) -> Value {
        [self.x, self.y, self.z, 0.0]
    }

    fn from_value(value: Value) -> Self {
        Point3::new(value[0], value[1], value[2])
    }
}

impl VertexValue for Vector2<f32> {
    const FORMAT: DataFormat = DataFormat::Vector2x32;

    fn into_value(self) -> Value {
        [self.x, self.y, 0.0, 0.0]
    }

    fn from_value(value: Value) -> Self {
        Vector2::new(value[0], value[1])
    }
}

impl VertexValue for Vector3<f32> {
    const FORMAT: DataFormat = DataFormat::Vector3x32;

    fn into_value(self) -> Value {
        [self.x, self.y, self.z, 0.0]
    }

    fn from_value(value: Value) -> Self {
        Vector3::new(value[0], value[1], value[2])
    }
}

impl VertexValue for Vector4<f32> {
    const FORMAT: DataFormat = DataFormat::Vector4x32;

    fn into_value(self) -> Value {
        self.into()
    }

    fn from_value(value: Value) -> Self {
        Vector4::from(value)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use crate::encoding::VertexValue;

    #[test]
    fn integer_values_round_and_clamp() {
        assert_eq!([1u8, 255, 0], <[u8; 3]>::from_value([1.4, 512.0, -3.0, 0.0]));
        assert_eq!([-2i16, 7], <[i16; 2]>::from_value([-2.4, 6.6, 0.0, 0.0]));
        assert_eq!(200u8, u8::from_value([200.2, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn integer_values_decode() {
        assert_eq!([3.0, 250.0, 0.0, 0.0], [3u8, 250].into_value());
        assert_eq!([-300.0, 0.0, 9.0, 0.0], [-300i16, 0, 9].into_value());
    }

    #[test]
    fn points_discard_extra_components() {
        let point = Point3::<f32>::from_value([1.0, 2.0, 3.0, 4.0]);

        assert_eq!(Point3::new(1.0, 2.0, 3.0), point);
        assert_eq!([1.0, 2.0, 3.0, 0.0], point.into_value());
    }
}
