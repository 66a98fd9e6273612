use crate::error::ColorParseError;

/// Linear RGB color. Hex literals are authored in sRGB and converted on parse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rgb` or `#rrggbb`. Anything else, including a `0x` prefix
    /// after the hash, is rejected.
    pub fn from_hex(literal: &str) -> Result<Self, ColorParseError> {
        let malformed = || ColorParseError::Malformed(literal.to_string());

        let digits = literal.strip_prefix('#').ok_or_else(malformed)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| malformed())
        };

        let (r, g, b) = match digits.len() {
            3 => (channel(0..1)? * 17, channel(1..2)? * 17, channel(2..3)? * 17),
            6 => (channel(0..2)?, channel(2..4)?, channel(4..6)?),
            _ => return Err(malformed()),
        };

        Ok(Self::from_srgb8(r, g, b))
    }

    pub fn from_srgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: srgb_to_linear(r),
            g: srgb_to_linear(g),
            b: srgb_to_linear(b),
        }
    }

    pub fn scaled(self, intensity: f32) -> Self {
        Self::rgb(self.r * intensity, self.g * intensity, self.b * intensity)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: f64::from(self.r),
            g: f64::from(self.g),
            b: f64::from(self.b),
            a: 1.0,
        }
    }
}

fn srgb_to_linear(channel: u8) -> f32 {
    let c = f32::from(channel) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
