use core::fmt::Write;

use bitflags::bitflags;

use crate::abi::{self, raqm_glyph_t, NativeModule};
use crate::resource::FontId;
use crate::session::GlyphArray;
use crate::{Result, Shaper};

bitflags! {
    /// Marks parts of a glyph record that could not be mapped back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GlyphFlags: u32 {
        /// The record's font handle is not one of the request's fonts.
        const UNRESOLVED_FONT = 0x0000_0001;
        /// The record's cluster is not a character boundary of the text.
        const UNRESOLVED_CLUSTER = 0x0000_0002;
    }
}

bitflags! {
    /// Flags used by [`serialize`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SerializeFlags: u32 {
        /// Do not serialize glyph cluster.
        const NO_CLUSTERS = 0x0000_0001;
        /// Do not serialize glyph offsets and advances.
        const NO_POSITIONS = 0x0000_0002;
        /// Do not serialize glyph advances, offsets will reflect absolute
        /// glyph positions.
        const NO_ADVANCES = 0x0000_0004;
        /// Do not serialize the font index.
        const NO_FONTS = 0x0000_0008;
    }
}

/// A decoded glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphEntry {
    /// Glyph index in the font.
    pub glyph_id: u32,
    /// Horizontal advance.
    pub x_advance: i32,
    /// Vertical advance.
    pub y_advance: i32,
    /// Horizontal offset.
    pub x_offset: i32,
    /// Vertical offset.
    pub y_offset: i32,
    /// Byte offset of the source text this glyph belongs to.
    pub cluster: u32,
    /// The character at `cluster`.
    pub source_char: Option<char>,
    /// Position of the glyph's font in the request's font list.
    pub font_index: Option<usize>,
    /// What could not be resolved.
    pub flags: GlyphFlags,
}

impl GlyphEntry {
    /// Checks that both the font and the source character were resolved.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns the font index with the `-1` sentinel for unresolved fonts.
    #[inline]
    pub fn font_index_or_sentinel(&self) -> isize {
        self.font_index.map(|i| i as isize).unwrap_or(-1)
    }

    fn from_record(record: &raqm_glyph_t, fonts: &[FontId], text: &str) -> Self {
        let mut flags = GlyphFlags::empty();

        let font_index = fonts.iter().position(|id| id.to_raw() == record.font);
        if font_index.is_none() {
            flags |= GlyphFlags::UNRESOLVED_FONT;
        }

        let source_char = text
            .get(record.cluster as usize..)
            .and_then(|tail| tail.chars().next());
        if source_char.is_none() {
            flags |= GlyphFlags::UNRESOLVED_CLUSTER;
        }

        GlyphEntry {
            glyph_id: record.index,
            x_advance: record.x_advance,
            y_advance: record.y_advance,
            x_offset: record.x_offset,
            y_offset: record.y_offset,
            cluster: record.cluster,
            source_char,
            font_index,
            flags,
        }
    }
}

impl<M: NativeModule> Shaper<M> {
    /// Decodes a glyph array.
    ///
    /// `fonts` defines the font indices, `text` is the session text.
    /// Records are returned in native order; records that cannot be mapped
    /// back are flagged instead of failing the decode.
    pub fn decode(&self, glyphs: &GlyphArray<'_>, fonts: &[FontId], text: &str) -> Result<Vec<GlyphEntry>> {
        if glyphs.is_empty() {
            return Ok(Vec::new());
        }

        let size = glyphs.len() * abi::GLYPH_RECORD_SIZE;
        let bytes = self.memory.read_bytes(glyphs.ptr(), size)?;

        let mut entries = Vec::with_capacity(glyphs.len() as usize);
        for chunk in bytes.chunks_exact(abi::GLYPH_RECORD_SIZE as usize) {
            let record: raqm_glyph_t = bytemuck::pod_read_unaligned(chunk);
            let entry = GlyphEntry::from_record(&record.swap_le(), fonts, text);
            if !entry.is_resolved() {
                log::warn!(
                    "glyph {} at cluster {} is unresolved: {:?}",
                    entry.glyph_id,
                    entry.cluster,
                    entry.flags
                );
            }

            entries.push(entry);
        }

        log::debug!("decoded {} glyph(s)", entries.len());
        Ok(entries)
    }
}

/// Serializes glyphs into the `hb-shape` text format.
///
/// Glyphs look like `gid=cluster@x_offset,y_offset+x_advance,y_advance#font`
/// and are separated by `|`. Unresolved fonts are written as `#-1`.
pub fn serialize(glyphs: &[GlyphEntry], flags: SerializeFlags) -> String {
    let mut s = String::with_capacity(glyphs.len() * 16);
    let mut x = 0;
    let mut y = 0;
    for (i, glyph) in glyphs.iter().enumerate() {
        if i > 0 {
            s.push('|');
        }

        write!(&mut s, "{}", glyph.glyph_id).unwrap_or_default();

        if !flags.contains(SerializeFlags::NO_CLUSTERS) {
            write!(&mut s, "={}", glyph.cluster).unwrap_or_default();
        }

        if !flags.contains(SerializeFlags::NO_POSITIONS) {
            let x_offset = x + glyph.x_offset;
            let y_offset = y + glyph.y_offset;
            if x_offset != 0 || y_offset != 0 {
                write!(&mut s, "@{},{}", x_offset, y_offset).unwrap_or_default();
            }

            if flags.contains(SerializeFlags::NO_ADVANCES) {
                x += glyph.x_advance;
                y += glyph.y_advance;
            } else {
                write!(&mut s, "+{}", glyph.x_advance).unwrap_or_default();
                if glyph.y_advance != 0 {
                    write!(&mut s, ",{}", glyph.y_advance).unwrap_or_default();
                }
            }
        }

        if !flags.contains(SerializeFlags::NO_FONTS) {
            write!(&mut s, "#{}", glyph.font_index_or_sentinel()).unwrap_or_default();
        }
    }

    s
}
