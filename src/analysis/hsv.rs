use image::Rgb;

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub hue: f32,
    pub saturation: u8,
    pub value: u8,
}

pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> Hsv {
    let [r, g, b] = pixel.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);

    let saturation = if max == 0 {
        0
    } else {
        ((delta * 255.0) / f32::from(max)).round() as u8
    };

    let hue = if delta == 0.0 {
        0.0
    } else {
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        let raw = if max == pixel.0[0] {
            60.0 * ((g - b) / delta)
        } else if max == pixel.0[1] {
            60.0 * ((b - r) / delta) + 120.0
        } else {
            60.0 * ((r - g) / delta) + 240.0
        };
        if raw < 0.0 {
            raw + 360.0
        } else {
            raw
        }
    };

    Hsv {
        hue,
        saturation,
        value: max,
    }
}
