// Watermark compositing order and placement tests

use image::{Rgba, RgbaImage};
use imgpipe::watermark::{composite_watermark, resolve, Anchor, Dimensions, Placement, Shadow};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// 20x20, red left half, blue right half
fn two_tone() -> RgbaImage {
    RgbaImage::from_fn(20, 20, |x, _| if x < 10 { RED } else { BLUE })
}

#[test]
fn test_sharp_layer_is_drawn_over_shadow() {
    let base = RgbaImage::from_pixel(80, 60, WHITE);
    let shadow = Shadow {
        blur_radius: 1.0,
        offset_x: 10,
        offset_y: 0,
    };

    let result = composite_watermark(&base, &two_tone(), Placement::new(10.0, 10.0), Some(shadow));

    // The shadow's red half lies under the sharp blue half here
    assert_eq!(*result.get_pixel(25, 15), BLUE);
    assert_eq!(*result.get_pixel(15, 15), RED);
    // Beyond the sharp layer only the shadow's blue half shows
    let shadow_only = result.get_pixel(35, 20);
    assert!(shadow_only[2] > 200 && shadow_only[0] < 60);
    assert_eq!(*result.get_pixel(2, 2), WHITE);
}

#[test]
fn test_zero_radius_shadow_is_skipped() {
    let base = RgbaImage::from_pixel(80, 60, WHITE);
    let shadow = Shadow {
        blur_radius: 0.0,
        offset_x: 10,
        offset_y: 10,
    };

    let result = composite_watermark(&base, &two_tone(), Placement::new(0.0, 0.0), Some(shadow));
    assert_eq!(*result.get_pixel(25, 25), WHITE);
    assert_eq!(result, composite_watermark(&base, &two_tone(), Placement::new(0.0, 0.0), None));
}

#[test]
fn test_content_past_the_edge_is_cropped() {
    let base = RgbaImage::from_pixel(30, 30, WHITE);
    let placement = resolve(
        Dimensions::of(&base),
        Dimensions::new(20, 20),
        Anchor::SouthEast,
        -5,
        -5,
    );
    assert_eq!(placement, Placement::new(15.0, 15.0));

    let result = composite_watermark(&base, &two_tone(), placement, None);
    assert_eq!(result.dimensions(), (30, 30));
    assert_eq!(*result.get_pixel(16, 16), RED);
    assert_eq!(*result.get_pixel(29, 29), BLUE);
    assert_eq!(*result.get_pixel(14, 14), WHITE);
}
