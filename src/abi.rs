//! The flat native boundary.
//!
//! Nothing structured crosses it: every entry point takes and returns
//! 32-bit integers, which are either plain values, addresses inside the
//! shared linear memory, or opaque handles.

#![allow(non_camel_case_types)]
#![allow(missing_docs)]

use crate::Error;

pub type hb_bool_t = u32;
pub type hb_memory_mode_t = u32;
pub type raqm_direction_t = u32;

/// An address inside the linear memory.
pub type ptr_t = u32;

/// Size of one linear memory page.
pub const PAGE_SIZE: u32 = 65536;

pub const HB_MEMORY_MODE_DUPLICATE: hb_memory_mode_t = 0;
pub const HB_MEMORY_MODE_READONLY: hb_memory_mode_t = 1;
pub const HB_MEMORY_MODE_WRITABLE: hb_memory_mode_t = 2;
pub const HB_MEMORY_MODE_READONLY_MAY_MAKE_WRITABLE: hb_memory_mode_t = 3;

pub const RAQM_DIRECTION_DEFAULT: raqm_direction_t = 0;
pub const RAQM_DIRECTION_RTL: raqm_direction_t = 1;
pub const RAQM_DIRECTION_LTR: raqm_direction_t = 2;
pub const RAQM_DIRECTION_TTB: raqm_direction_t = 3;

/// Number of 32-bit words in one `raqm_glyph_t`.
pub const GLYPH_RECORD_WORDS: u32 = 7;

/// Size of one `raqm_glyph_t` in bytes.
pub const GLYPH_RECORD_SIZE: u32 = GLYPH_RECORD_WORDS * 4;

/// A `raqm_glyph_t` as laid out in linear memory.
///
/// All fields are little-endian.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct raqm_glyph_t {
    pub index: u32,
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
    pub cluster: u32,
    pub font: u32,
}

unsafe impl bytemuck::Zeroable for raqm_glyph_t {}
unsafe impl bytemuck::Pod for raqm_glyph_t {}

impl raqm_glyph_t {
    /// Converts between the linear memory byte order and the host one.
    ///
    /// The conversion is its own inverse.
    pub fn swap_le(self) -> Self {
        raqm_glyph_t {
            index: u32::from_le(self.index),
            x_advance: i32::from_le(self.x_advance),
            y_advance: i32::from_le(self.y_advance),
            x_offset: i32::from_le(self.x_offset),
            y_offset: i32::from_le(self.y_offset),
            cluster: u32::from_le(self.cluster),
            font: u32::from_le(self.font),
        }
    }
}

/// The exported entry points of a raqm/harfbuzz build with a shared linear memory.
///
/// Handles returned by the `*_create` functions are opaque non-zero
/// integers; zero means failure. Functions returning [`hb_bool_t`]
/// return zero on failure.
///
/// Memory views are borrowed for the duration of one call only: any entry
/// point may grow the memory, which invalidates a previously taken slice.
/// The borrow checker enforces this since every entry point takes `&mut self`.
#[allow(missing_docs)]
pub trait NativeModule {
    /// Returns the current linear memory.
    fn memory(&self) -> &[u8];

    /// Returns the current linear memory for writing.
    fn memory_mut(&mut self) -> &mut [u8];

    /// Grows the linear memory by `pages`.
    ///
    /// Returns the previous size in pages or `None` when the memory cannot grow.
    /// Previously issued addresses stay valid.
    fn memory_grow(&mut self, pages: u32) -> Option<u32>;

    fn malloc(&mut self, size: u32) -> Result<ptr_t, Error>;
    fn free(&mut self, ptr: ptr_t) -> Result<(), Error>;

    fn hb_blob_create(
        &mut self,
        data: ptr_t,
        length: u32,
        mode: hb_memory_mode_t,
        user_data: ptr_t,
        destroy: ptr_t,
    ) -> Result<u32, Error>;
    fn hb_blob_destroy(&mut self, blob: u32) -> Result<(), Error>;

    fn hb_face_create(&mut self, blob: u32, index: u32) -> Result<u32, Error>;
    fn hb_face_get_glyph_count(&mut self, face: u32) -> Result<u32, Error>;
    fn hb_face_get_upem(&mut self, face: u32) -> Result<u32, Error>;
    fn hb_face_destroy(&mut self, face: u32) -> Result<(), Error>;

    fn hb_font_create(&mut self, face: u32) -> Result<u32, Error>;
    fn hb_font_set_scale(&mut self, font: u32, x_scale: i32, y_scale: i32) -> Result<(), Error>;
    fn hb_font_destroy(&mut self, font: u32) -> Result<(), Error>;

    fn raqm_create(&mut self) -> Result<u32, Error>;
    fn raqm_destroy(&mut self, rq: u32) -> Result<(), Error>;
    fn raqm_set_text_utf8(&mut self, rq: u32, text: ptr_t, len: u32) -> Result<hb_bool_t, Error>;
    fn raqm_set_harfbuzz_font_range(
        &mut self,
        rq: u32,
        font: u32,
        start: u32,
        len: u32,
    ) -> Result<hb_bool_t, Error>;
    fn raqm_set_par_direction(&mut self, rq: u32, dir: raqm_direction_t) -> Result<hb_bool_t, Error>;
    fn raqm_set_language(
        &mut self,
        rq: u32,
        lang: ptr_t,
        start: u32,
        len: u32,
    ) -> Result<hb_bool_t, Error>;
    fn raqm_layout(&mut self, rq: u32) -> Result<hb_bool_t, Error>;
    fn raqm_get_glyphs(&mut self, rq: u32, length: ptr_t) -> Result<ptr_t, Error>;
}
