use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::{Matrix4, Point3};
use primus::format::{Attribute, DataFormat, VertexFormat};
use primus::primitive::{Access, Primitive, PrimitiveType, SortBuffer};

const RESOLUTION: usize = 64;

// Creates a grid of quadrilaterals in the plane y = 0 that rises along z, so
// that every triangle is at a distinct distance from the viewer.
fn grid() -> Primitive {
    let mut format = VertexFormat::new();
    format.add_position(DataFormat::Vector3x16).unwrap();
    let width = RESOLUTION + 1;
    let mut primitive = Primitive::new(PrimitiveType::TriangleList);
    primitive
        .set_format(format, width * width, RESOLUTION * RESOLUTION * 6)
        .unwrap();
    {
        let mut primitive = primitive.lock(Access::Write);
        let positions = (0..width)
            .flat_map(|z| (0..width).map(move |x| [x as i16, (x + z) as i16, z as i16]))
            .collect::<Vec<_>>();
        primitive
            .set_vertex_data(Attribute::Position, 0, &positions)
            .unwrap();
        let indices = (0..RESOLUTION)
            .flat_map(|z| (0..RESOLUTION).map(move |x| (z * width) + x))
            .flat_map(|a| {
                let (b, c, d) = (a + 1, a + width, a + width + 1);
                [a, c, b, b, c, d]
            })
            .map(|index| index as u32)
            .collect::<Vec<_>>();
        primitive.set_indices(0, &indices).unwrap();
    }
    primitive
}

fn sort((mut primitive, mut buffer): (Primitive, SortBuffer)) {
    primitive
        .lock(Access::ReadWrite)
        .sort_back_to_front(
            &mut buffer,
            &Point3::new(32.0, 200.0, -50.0),
            &Matrix4::identity(),
            &[],
        )
        .unwrap();
}

fn benchmark(criterion: &mut Criterion) {
    criterion.bench_function("sort-back-to-front", move |bencher| {
        bencher.iter_batched(
            || (grid(), SortBuffer::new()),
            sort,
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
