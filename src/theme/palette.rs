//! Color palettes and shade generation from a base color.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ThemeError;

pub const SHADES: [u16; 10] = [50, 100, 200, 300, 400, 500, 600, 700, 800, 900];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub id: String,
    pub name: String,
    /// shade ("50" .. "900") → hex
    pub colors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Hsl {
    h: f64,
    s: f64,
    l: f64,
}

pub fn parse_hex(input: &str) -> Result<(u8, u8, u8), ThemeError> {
    let hex = input.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return Err(ThemeError::InvalidColor(input.to_string()));
    }
    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => return Err(ThemeError::InvalidColor(input.to_string())),
    };
    let channel = |i: usize| {
        u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| ThemeError::InvalidColor(input.to_string()))
    };
    Ok((channel(0)?, channel(2)?, channel(4)?))
}

fn to_hex((r, g, b): (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn rgb_to_hsl((r, g, b): (u8, u8, u8)) -> Hsl {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return Hsl { h: 0.0, s: 0.0, l };
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    Hsl { h: h / 6.0, s, l }
}

fn hsl_to_rgb(hsl: Hsl) -> (u8, u8, u8) {
    if hsl.s == 0.0 {
        let v = (hsl.l * 255.0).round() as u8;
        return (v, v, v);
    }
    let q = if hsl.l < 0.5 {
        hsl.l * (1.0 + hsl.s)
    } else {
        hsl.l + hsl.s - hsl.l * hsl.s
    };
    let p = 2.0 * hsl.l - q;
    let hue = |mut t: f64| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    (
        channel(hue(hsl.h + 1.0 / 3.0)),
        channel(hue(hsl.h)),
        channel(hue(hsl.h - 1.0 / 3.0)),
    )
}

/// Ten shades around `base`, with the base itself at 500
pub fn generate_palette(name: &str, base: &str) -> Result<Palette, ThemeError> {
    let rgb = parse_hex(base)?;
    let hsl = rgb_to_hsl(rgb);

    let mut colors = BTreeMap::new();
    for shade in SHADES {
        let hex = if shade == 500 {
            to_hex(rgb)
        } else {
            // 50 is near white, 900 near black; lightness moves linearly away from the base.
            let target = if shade < 500 {
                hsl.l + (0.97 - hsl.l) * (500 - shade) as f64 / 450.0
            } else {
                hsl.l - (hsl.l - 0.08) * (shade - 500) as f64 / 400.0
            };
            to_hex(hsl_to_rgb(Hsl { l: target, ..hsl }))
        };
        colors.insert(shade.to_string(), hex);
    }

    Ok(Palette {
        id: name.to_ascii_lowercase().replace(' ', "-"),
        name: name.to_string(),
        colors,
    })
}

/// Palettes offered when no remote palette list is available
pub fn builtin_palettes() -> Vec<Palette> {
    [("Ocean", "#2563eb"), ("Forest", "#16a34a"), ("Sunset", "#ea580c"), ("Violet", "#7c3aed")]
        .iter()
        .filter_map(|(name, base)| generate_palette(name, base).ok())
        .collect()
}
