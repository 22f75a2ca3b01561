use core::marker::PhantomData;
use core::num::NonZeroU32;

use crate::abi::NativeModule;
use crate::memory::Allocation;
use crate::{Error, MemoryMode, Result, Shaper};

/// A font binary copied into linear memory.
///
/// Blobs, faces, fonts and sessions created from it borrow it, so it can
/// only be released after all of them are destroyed.
#[derive(Debug)]
pub struct FontData {
    key: String,
    allocation: Allocation,
}

impl FontData {
    /// Returns the caller's key for this font.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the address of the font bytes.
    #[inline]
    pub fn ptr(&self) -> u32 {
        self.allocation.ptr()
    }

    /// Returns the length of the font binary.
    #[inline]
    pub fn len(&self) -> u32 {
        self.allocation.len()
    }

    /// Checks that the font binary is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocation.is_empty()
    }
}

/// A native blob handle over [`FontData`].
#[derive(Debug)]
pub struct Blob<'a> {
    raw: NonZeroU32,
    mode: MemoryMode,
    data: &'a FontData,
}

impl Blob<'_> {
    /// Returns the memory mode the blob was created with.
    #[inline]
    pub fn mode(&self) -> MemoryMode {
        self.mode
    }
}

/// A native face handle.
#[derive(Debug)]
pub struct Face<'a> {
    raw: NonZeroU32,
    glyph_count: u32,
    units_per_em: u32,
    data: &'a FontData,
}

impl Face<'_> {
    /// Returns the number of glyphs in the face.
    #[inline]
    pub fn glyph_count(&self) -> u32 {
        self.glyph_count
    }

    /// Returns the face's units per em.
    #[inline]
    pub fn units_per_em(&self) -> u32 {
        self.units_per_em
    }

    /// Returns the key of the font the face was created from.
    #[inline]
    pub fn key(&self) -> &str {
        self.data.key()
    }
}

/// The identity of a native font handle.
///
/// Stays comparable after the [`Font`] itself is destroyed, which is how
/// decoded glyph records are mapped back to the caller's fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(pub(crate) u32);

impl FontId {
    /// Returns the raw handle value.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

/// A native font handle: a face bound to a scale.
#[derive(Debug)]
pub struct Font<'a> {
    raw: NonZeroU32,
    scale: Option<(i32, i32)>,
    marker: PhantomData<&'a FontData>,
}

impl Font<'_> {
    /// Returns the handle identity.
    #[inline]
    pub fn id(&self) -> FontId {
        FontId(self.raw.get())
    }

    /// Returns the scale set on the font, `None` for the native default of units per em.
    #[inline]
    pub fn scale(&self) -> Option<(i32, i32)> {
        self.scale
    }
}

impl<M: NativeModule> Shaper<M> {
    /// Copies a font binary into linear memory.
    pub fn upload_font(&mut self, key: &str, bytes: &[u8]) -> Result<FontData> {
        let allocation = self.memory.allocate_bytes(bytes)?;
        log::trace!("font '{}' uploaded to {:#x} ({} bytes)", key, allocation.ptr(), bytes.len());
        Ok(FontData {
            key: key.to_string(),
            allocation,
        })
    }

    /// Releases the linear memory holding a font binary.
    pub fn release_font_data(&mut self, data: FontData) -> Result<()> {
        log::trace!("font '{}' released", data.key);
        self.memory.free(data.allocation)
    }

    /// Creates a blob over a font binary.
    pub fn create_blob<'a>(&mut self, data: &'a FontData, mode: MemoryMode) -> Result<Blob<'a>> {
        let raw = self.memory.native()?.hb_blob_create(data.ptr(), data.len(), mode.to_raw(), 0, 0)?;
        let raw = NonZeroU32::new(raw).ok_or(Error::NativeCallFailed("hb_blob_create"))?;
        log::trace!("hb_blob_create('{}', {:?}) -> {:#x}", data.key, mode, raw);
        Ok(Blob { raw, mode, data })
    }

    /// Destroys a blob handle.
    ///
    /// Legal as soon as a face was created from it: the face keeps its own
    /// reference to the blob.
    pub fn destroy_blob(&mut self, blob: Blob<'_>) -> Result<()> {
        log::trace!("hb_blob_destroy({:#x})", blob.raw);
        self.memory.native()?.hb_blob_destroy(blob.raw.get())
    }

    /// Creates a face from a blob.
    ///
    /// `index` selects the face inside a font collection.
    pub fn create_face<'a>(&mut self, blob: &Blob<'a>, index: u32) -> Result<Face<'a>> {
        let invalid = || Error::InvalidFont { key: blob.data.key().to_string() };

        let native = self.memory.native()?;
        let raw = NonZeroU32::new(native.hb_face_create(blob.raw.get(), index)?).ok_or_else(invalid)?;
        let face = Face {
            raw,
            glyph_count: native.hb_face_get_glyph_count(raw.get())?,
            units_per_em: native.hb_face_get_upem(raw.get())?,
            data: blob.data,
        };

        // harfbuzz hands out an empty face instead of null for unparsable data.
        if face.glyph_count == 0 {
            log::warn!("font '{}' has no glyphs", face.key());
            self.destroy_face(face)?;
            return Err(invalid());
        }

        log::trace!("hb_face_create({:#x}, {}) -> {:#x}", blob.raw, index, raw);
        Ok(face)
    }

    /// Destroys a face handle.
    ///
    /// Legal as soon as every font needed from it was created: fonts keep
    /// their own reference to the face.
    pub fn destroy_face(&mut self, face: Face<'_>) -> Result<()> {
        log::trace!("hb_face_destroy({:#x})", face.raw);
        self.memory.native()?.hb_face_destroy(face.raw.get())
    }

    /// Creates a face from a font binary.
    ///
    /// The intermediate blob is destroyed before returning, on success and on failure.
    pub fn load_face<'a>(&mut self, data: &'a FontData, index: u32) -> Result<Face<'a>> {
        let mode = self.options.memory_mode;
        let blob = self.create_blob(data, mode)?;
        let face = self.create_face(&blob, index);
        let destroyed = self.destroy_blob(blob);
        let face = face?;
        if let Err(e) = destroyed {
            self.destroy_face(face)?;
            return Err(e);
        }

        Ok(face)
    }

    /// Creates a font from a face.
    ///
    /// Without an explicit `scale`, the configured default scale is used and
    /// then the native default of units per em.
    pub fn create_font<'a>(&mut self, face: &Face<'a>, scale: Option<(i32, i32)>) -> Result<Font<'a>> {
        let scale = scale.or(self.options.default_scale);

        let native = self.memory.native()?;
        let raw = native.hb_font_create(face.raw.get())?;
        let raw = NonZeroU32::new(raw).ok_or(Error::NativeCallFailed("hb_font_create"))?;
        let font = Font { raw, scale, marker: PhantomData };
        if let Some((x, y)) = scale {
            if let Err(e) = native.hb_font_set_scale(raw.get(), x, y) {
                self.destroy_font(font)?;
                return Err(e);
            }
        }

        log::trace!("hb_font_create({:#x}) -> {:#x} scale {:?}", face.raw, raw, scale);
        Ok(font)
    }

    /// Destroys a font handle.
    ///
    /// Legal as soon as the font was assigned to every session range it is
    /// needed for: sessions keep their own reference to the font.
    pub fn destroy_font(&mut self, font: Font<'_>) -> Result<()> {
        log::trace!("hb_font_destroy({:#x})", font.raw);
        self.memory.native()?.hb_font_destroy(font.raw.get())
    }

    pub(crate) fn font_raw(font: &Font<'_>) -> u32 {
        font.raw.get()
    }
}
