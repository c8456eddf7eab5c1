//! RGB to hue/saturation/brightness conversion

/// Color in the form the lights accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    /// Degrees, 0-359
    pub hue: u16,
    /// Percent, 0-100
    pub saturation: u8,
    /// Percent, 0-100
    pub brightness: u8,
}

impl Hsv {
    pub fn new(hue: u16, saturation: u8, brightness: u8) -> Self {
        Self {
            hue,
            saturation,
            brightness,
        }
    }
}

/// Convert 8-bit RGB to HSV.
///
/// Hue uses the six-sector formula with ties resolved red, then green, then
/// blue. All three components are rounded to the nearest integer; a hue
/// that rounds up to 360 wraps to 0.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        // `%` keeps the sign of the dividend
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    Hsv {
        hue: (hue.round() as u16) % 360,
        saturation: (saturation * 100.0).round() as u8,
        brightness: (max * 100.0).round() as u8,
    }
}
