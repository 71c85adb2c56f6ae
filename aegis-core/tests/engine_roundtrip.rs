//! The bundled engine driven through the image carrier.

mod common;

use std::path::Path;
use std::sync::Arc;

use aegis_core::carrier::CarrierKind;
use aegis_core::engine::{render_payload, PayloadBitmap, PayloadShape};
use aegis_core::{CarrierAdapter, DcQimEngine};
use common::*;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

const PAYLOAD: &str = "ID: A1B2C3D4";

/// Smooth ramps keep the median pre-filter from moving block means.
fn textured(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (40 + x * 160 / width) as u8,
            (50 + y * 150 / height) as u8,
            (60 + (x + y) * 120 / (width + height)) as u8,
        ])
    })
}

/// Fraction of `expected`'s set bits that are set in `recovered`, and the
/// same for its clear bits.
fn recall(expected: &PayloadBitmap, recovered: &PayloadBitmap) -> (f64, f64) {
    assert_eq!(expected.shape(), recovered.shape());
    let (mut set, mut set_hit, mut clear, mut clear_hit) = (0usize, 0usize, 0usize, 0usize);
    for (e, r) in expected.bits().iter().zip(recovered.bits()) {
        if *e {
            set += 1;
            set_hit += usize::from(*r);
        } else {
            clear += 1;
            clear_hit += usize::from(!*r);
        }
    }
    (set_hit as f64 / set as f64, clear_hit as f64 / clear as f64)
}

fn load_evidence(path: &Path) -> PayloadBitmap {
    PayloadBitmap::from_image(&image::open(path).unwrap().to_luma8())
}

#[tokio::test]
async fn test_real_engine_recovers_payload_bits() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("photo.png");
    let output = dir.path().join("photo_protected.png");
    write_png(&input, &textured(1920, 1080));

    let ctx = context(Arc::new(DcQimEngine::new()), Arc::new(ScriptedRasterizer::new(1)));
    let carrier = ctx.carrier(CarrierKind::Image);
    assert!(carrier.embed(&input, &output, PAYLOAD, "secret").await.unwrap());

    let expected = render_payload(PAYLOAD, PayloadShape::for_surface(1920, 1080));
    assert!(expected.count_ones() > 0);

    let evidence = carrier
        .extract(&output, "secret", Some(&dir.path().join("right.png")))
        .await
        .unwrap()
        .unwrap();
    let (set, clear) = recall(&expected, &load_evidence(&evidence));
    assert!(set >= 0.95, "set-bit recall {set:.3}");
    assert!(clear >= 0.95, "clear-bit recall {clear:.3}");

    let evidence = carrier
        .extract(&output, "not-the-key", Some(&dir.path().join("wrong.png")))
        .await
        .unwrap()
        .unwrap();
    let (wrong_set, _) = recall(&expected, &load_evidence(&evidence));
    assert!(wrong_set < 0.6, "wrong key set-bit recall {wrong_set:.3}");
}

#[tokio::test]
async fn test_real_engine_survives_width_normalization() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("small.png");
    let output = dir.path().join("small_protected.png");
    write_png(&input, &textured(960, 720));

    let ctx = context(Arc::new(DcQimEngine::new()), Arc::new(ScriptedRasterizer::new(1)));
    let carrier = ctx.carrier(CarrierKind::Image);
    assert!(carrier.embed(&input, &output, PAYLOAD, "secret").await.unwrap());

    let marked = image::open(&output).unwrap();
    assert_eq!((marked.width(), marked.height()), (1920, 1440));

    let evidence = carrier.extract(&output, "secret", None).await.unwrap().unwrap();
    let expected = render_payload(PAYLOAD, PayloadShape::for_surface(1920, 1440));
    let (set, clear) = recall(&expected, &load_evidence(&evidence));
    assert!(set >= 0.95, "set-bit recall {set:.3}");
    assert!(clear >= 0.95, "clear-bit recall {clear:.3}");
}
