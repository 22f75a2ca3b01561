//! Builds minimal TrueType binaries for tests.
//!
//! The fonts carry only `cmap`, `head`, `hhea`, `hmtx` and `maxp`, which is
//! enough for a face to resolve nominal glyphs and horizontal advances.

#![allow(dead_code)]

use std::collections::BTreeMap;

pub struct TestFont {
    units_per_em: u16,
    advances: BTreeMap<char, u16>,
}

impl TestFont {
    /// An empty font with only `.notdef`.
    pub fn new(units_per_em: u16) -> Self {
        TestFont {
            units_per_em,
            advances: BTreeMap::new(),
        }
    }

    /// Printable ASCII, `é`, the Hebrew letters and a combining acute accent,
    /// all with the same advance.
    pub fn latin(units_per_em: u16, advance: u16) -> Self {
        let chars = ('\u{20}'..='\u{7E}')
            .chain(['\u{E9}', '\u{301}'])
            .chain('\u{5D0}'..='\u{5EA}');

        let mut font = Self::new(units_per_em);
        for c in chars {
            font = font.glyph(c, advance);
        }

        font
    }

    /// Adds or replaces the glyph for `c`.
    pub fn glyph(mut self, c: char, advance: u16) -> Self {
        self.advances.insert(c, advance);
        self
    }

    /// Removes the glyph for `c`.
    pub fn without(mut self, c: char) -> Self {
        self.advances.remove(&c);
        self
    }

    /// Glyphs are numbered in code point order after `.notdef`.
    pub fn glyph_id(&self, c: char) -> Option<u16> {
        let index = self.advances.keys().position(|k| *k == c)?;
        Some(index as u16 + 1)
    }

    pub fn glyph_count(&self) -> u16 {
        self.advances.len() as u16 + 1
    }

    pub fn build(&self) -> Vec<u8> {
        let tables: [(&[u8; 4], Vec<u8>); 5] = [
            (b"cmap", self.cmap()),
            (b"head", self.head()),
            (b"hhea", self.hhea()),
            (b"hmtx", self.hmtx()),
            (b"maxp", self.maxp()),
        ];

        let mut font = Vec::new();
        font.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        font.extend_from_slice(&(tables.len() as u16).to_be_bytes());
        // searchRange, entrySelector, rangeShift
        font.extend_from_slice(&64u16.to_be_bytes());
        font.extend_from_slice(&2u16.to_be_bytes());
        font.extend_from_slice(&16u16.to_be_bytes());

        let mut offset = 12 + 16 * tables.len();
        for (tag, data) in &tables {
            font.extend_from_slice(*tag);
            font.extend_from_slice(&checksum(data).to_be_bytes());
            font.extend_from_slice(&(offset as u32).to_be_bytes());
            font.extend_from_slice(&(data.len() as u32).to_be_bytes());
            offset += padded(data.len());
        }

        for (_, data) in &tables {
            font.extend_from_slice(data);
            font.resize(padded(font.len()), 0);
        }

        font
    }

    fn cmap(&self) -> Vec<u8> {
        let groups = self.advances.len() as u32;
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        // Windows, Unicode full repertoire.
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&10u16.to_be_bytes());
        data.extend_from_slice(&12u32.to_be_bytes());

        data.extend_from_slice(&12u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&(16 + 12 * groups).to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&groups.to_be_bytes());
        for (gid, c) in self.advances.keys().enumerate() {
            let c = *c as u32;
            data.extend_from_slice(&c.to_be_bytes());
            data.extend_from_slice(&c.to_be_bytes());
            data.extend_from_slice(&(gid as u32 + 1).to_be_bytes());
        }

        data
    }

    fn head(&self) -> Vec<u8> {
        let mut data = vec![0; 54];
        data[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        data[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
        data[18..20].copy_from_slice(&self.units_per_em.to_be_bytes());
        // indexToLocFormat stays 0.
        data
    }

    fn hhea(&self) -> Vec<u8> {
        let mut data = vec![0; 36];
        data[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        let ascender = (self.units_per_em / 5 * 4) as i16;
        let descender = -((self.units_per_em / 5) as i16);
        data[4..6].copy_from_slice(&ascender.to_be_bytes());
        data[6..8].copy_from_slice(&descender.to_be_bytes());
        data[34..36].copy_from_slice(&self.glyph_count().to_be_bytes());
        data
    }

    fn hmtx(&self) -> Vec<u8> {
        // .notdef gets a full em.
        let advances = std::iter::once(self.units_per_em).chain(self.advances.values().copied());
        let mut data = Vec::new();
        for advance in advances {
            data.extend_from_slice(&advance.to_be_bytes());
            data.extend_from_slice(&0i16.to_be_bytes());
        }

        data
    }

    fn maxp(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0000_5000u32.to_be_bytes());
        data.extend_from_slice(&self.glyph_count().to_be_bytes());
        data
    }
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}
