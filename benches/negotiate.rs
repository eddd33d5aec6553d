use criterion::{black_box, criterion_group, criterion_main, Criterion};
use surfscale::{negotiate, Resolution, SizeExpr, SurfaceFormat};

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse iw*a/2+8", |b| {
        b.iter(|| SizeExpr::parse(black_box("iw*a/2+8")).unwrap())
    });
}

fn bench_negotiate(c: &mut Criterion) {
    let w = SizeExpr::parse("iw/2").unwrap();
    let h = SizeExpr::parse("ih/2").unwrap();

    c.bench_function("negotiate 1080p half", |b| {
        b.iter(|| {
            negotiate(
                black_box(Resolution::FHD_1080P),
                &w,
                &h,
                SurfaceFormat::Nv12,
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_parse, bench_negotiate);
criterion_main!(benches);
