//! A minimal paragraph layout: nominal glyphs, default advances and
//! run reordering by embedding level.
//!
//! No substitution or positioning tables are applied.

use ttf_parser::GlyphId;
use unicode_properties::{GeneralCategory, UnicodeGeneralCategory};
use unicode_script::{Script, UnicodeScript};

use crate::abi::raqm_glyph_t;
use crate::Direction;

/// A font as seen by the layout.
pub struct LayoutFont<'a> {
    pub handle: u32,
    pub face: ttf_parser::Face<'a>,
    pub x_scale: i32,
    pub y_scale: i32,
}

impl LayoutFont<'_> {
    fn upem(&self) -> i64 {
        i64::from(self.face.units_per_em())
    }

    fn scale(&self, value: i64, scale: i32) -> i32 {
        (value * i64::from(scale) / self.upem()) as i32
    }
}

/// Lays out `text`, where `fonts[i]` is the font of the `i`-th character.
///
/// Glyphs are returned in visual order.
pub fn layout(text: &str, fonts: &[&LayoutFont], direction: Direction) -> Vec<raqm_glyph_t> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    debug_assert_eq!(chars.len(), fonts.len());

    let vertical = !direction.is_horizontal();
    let levels = if vertical {
        vec![0; chars.len()]
    } else {
        resolve_levels(&chars, direction)
    };

    let mut glyphs = Vec::with_capacity(chars.len());
    for (((cluster, c), font), level) in chars.iter().zip(fonts).zip(&levels) {
        let c = if level % 2 == 1 {
            unicode_bidi_mirroring::get_mirrored(*c).unwrap_or(*c)
        } else {
            *c
        };

        let glyph_id = font.face.glyph_index(c).unwrap_or(GlyphId(0));
        let zero_width = matches!(
            c.general_category(),
            GeneralCategory::NonspacingMark | GeneralCategory::EnclosingMark
        );

        let mut glyph = raqm_glyph_t {
            index: u32::from(glyph_id.0),
            cluster: *cluster as u32,
            font: font.handle,
            ..raqm_glyph_t::default()
        };

        if !zero_width {
            if vertical {
                let advance = font
                    .face
                    .glyph_ver_advance(glyph_id)
                    .map(i64::from)
                    .unwrap_or_else(|| font.upem());
                glyph.y_advance = -font.scale(advance, font.y_scale);
            } else {
                let advance = font.face.glyph_hor_advance(glyph_id).map(i64::from).unwrap_or(0);
                glyph.x_advance = font.scale(advance, font.x_scale);
            }
        }

        glyphs.push(glyph);
    }

    reorder(&mut glyphs, &levels);
    glyphs
}

fn is_rtl_script(script: Script) -> bool {
    matches!(
        script,
        Script::Arabic
            | Script::Hebrew
            | Script::Syriac
            | Script::Thaana
            | Script::Nko
            | Script::Samaritan
            | Script::Mandaic
            | Script::Adlam
    )
}

// Some(true) for strong right-to-left, Some(false) for strong left-to-right.
fn strong_direction(c: char) -> Option<bool> {
    match c.script() {
        Script::Common | Script::Inherited | Script::Unknown => None,
        script => Some(is_rtl_script(script)),
    }
}

fn resolve_levels(chars: &[(usize, char)], direction: Direction) -> Vec<u8> {
    let strong: Vec<Option<bool>> = chars.iter().map(|(_, c)| strong_direction(*c)).collect();

    let base_rtl = match direction {
        Direction::RightToLeft => true,
        Direction::LeftToRight => false,
        _ => strong.iter().flatten().next().copied().unwrap_or(false),
    };

    // Neutrals take the direction of their surroundings when both sides
    // agree and the paragraph direction otherwise.
    let mut resolved = strong.clone();
    let mut i = 0;
    while i < resolved.len() {
        if resolved[i].is_some() {
            i += 1;
            continue;
        }

        let start = i;
        while i < resolved.len() && resolved[i].is_none() {
            i += 1;
        }

        let before = if start == 0 { base_rtl } else { resolved[start - 1].unwrap_or(base_rtl) };
        let after = strong.get(i).copied().flatten().unwrap_or(base_rtl);
        let rtl = if before == after { before } else { base_rtl };
        for slot in &mut resolved[start..i] {
            *slot = Some(rtl);
        }
    }

    resolved
        .into_iter()
        .map(|rtl| match (base_rtl, rtl.unwrap_or(base_rtl)) {
            (false, false) => 0,
            (false, true) => 1,
            (true, true) => 1,
            (true, false) => 2,
        })
        .collect()
}

// From the highest level down to the lowest odd one, reverse every
// maximal run at that level or higher.
fn reorder<T>(items: &mut [T], levels: &[u8]) {
    let max = match levels.iter().max() {
        Some(max) => *max,
        None => return,
    };

    let lowest_odd = match levels.iter().filter(|l| *l % 2 == 1).min() {
        Some(min) => *min,
        None if max > 0 => 1,
        None => return,
    };

    // Levels follow the items while reversing.
    let mut levels = levels.to_vec();
    for level in (lowest_odd..=max).rev() {
        let mut i = 0;
        while i < levels.len() {
            if levels[i] < level {
                i += 1;
                continue;
            }

            let start = i;
            while i < levels.len() && levels[i] >= level {
                i += 1;
            }

            items[start..i].reverse();
            levels[start..i].reverse();
        }
    }
}
