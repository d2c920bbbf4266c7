use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::DynamicImage;
use ui_autopilot::hash::{BlockMeanHash, DctHash, HashAlgorithm, SnapshotHasher, normalized_distance};
use ui_autopilot::snapshot::MockFramebuffer;

fn screen() -> DynamicImage {
    let mut fb = MockFramebuffer::with_color(1170, 2532, [245, 245, 245]);
    for row in 0..12 {
        fb.draw_rect(40, 120 + row * 180, 1090, 140, [255, 255, 255]);
        fb.draw_text(80, 180 + row * 180, "Settings item", [20, 20, 20], [255, 255, 255]);
    }
    DynamicImage::ImageRgb8(fb.to_image())
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let image = screen();

    c.bench_function("blockhash_16", |b| {
        let algorithm = BlockMeanHash::default();
        b.iter(|| algorithm.hash_image(black_box(&image)))
    });

    c.bench_function("phash_dct", |b| b.iter(|| DctHash.hash_image(black_box(&image))));

    c.bench_function("fingerprint_all", |b| {
        let hasher = SnapshotHasher::default();
        b.iter(|| hasher.hash_image(black_box(&image)))
    });

    let a = SnapshotHasher::default().hash_image(&image);
    let hash = a.get("blockhash").unwrap_or_default().to_string();
    c.bench_function("normalized_distance", |b| {
        b.iter(|| normalized_distance(black_box(&hash), black_box(&hash)))
    });
}

criterion_group!(benches, benchmark_fingerprint);
criterion_main!(benches);
