use core::ops::Range;

use crate::abi::NativeModule;
use crate::glyph::GlyphEntry;
use crate::host::HostModule;
use crate::memory::LinearMemory;
use crate::resource::{Face, Font, FontData, FontId};
use crate::session::Session;
use crate::{Direction, Error, MemoryMode, Result};

/// Shaper configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaperOptions {
    /// Pages to grow the linear memory by before the first request.
    pub reserve_pages: u32,
    /// How blobs reference the uploaded font bytes.
    pub memory_mode: MemoryMode,
    /// Scale for fonts created without one. `None` keeps the native
    /// default of units per em.
    pub default_scale: Option<(i32, i32)>,
}

impl Default for ShaperOptions {
    fn default() -> Self {
        ShaperOptions {
            reserve_pages: 0,
            memory_mode: MemoryMode::Writable,
            default_scale: None,
        }
    }
}

/// A font taking part in a shaping request.
#[derive(Debug, Clone)]
pub struct FontSpec<'a> {
    /// Identifies the font in errors. Specs with the same key share the
    /// uploaded data and, for the same face index, the face.
    pub key: &'a str,
    /// The font binary.
    pub data: &'a [u8],
    /// Face index inside a font collection.
    pub face_index: u32,
    /// Font scale. See [`ShaperOptions::default_scale`].
    pub scale: Option<(i32, i32)>,
    /// Text bytes rendered with this font. `None` covers the whole text.
    pub range: Option<Range<usize>>,
}

impl<'a> FontSpec<'a> {
    /// Creates a spec covering the whole text with face 0.
    pub fn new(key: &'a str, data: &'a [u8]) -> Self {
        FontSpec {
            key,
            data,
            face_index: 0,
            scale: None,
            range: None,
        }
    }

    /// Sets the face index.
    pub fn with_face_index(mut self, index: u32) -> Self {
        self.face_index = index;
        self
    }

    /// Sets the font scale.
    pub fn with_scale(mut self, x: i32, y: i32) -> Self {
        self.scale = Some((x, y));
        self
    }

    /// Restricts the font to a byte range of the text.
    pub fn with_range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

/// Shapes text through a native raqm/harfbuzz module.
///
/// Each request is fully synchronous and releases everything it allocated
/// before returning, on success and on failure. The lower level
/// building blocks ([`upload_font`](Self::upload_font),
/// [`load_face`](Self::load_face), [`create_session`](Self::create_session),
/// ...) can be used directly to reuse faces across requests.
pub struct Shaper<M = HostModule> {
    pub(crate) memory: LinearMemory<M>,
    pub(crate) options: ShaperOptions,
}

impl<M: NativeModule> Shaper<M> {
    /// Creates a shaper with default options.
    pub fn new(module: M) -> Result<Self> {
        Self::with_options(module, ShaperOptions::default())
    }

    /// Creates a shaper.
    ///
    /// Fails with [`Error::OutOfMemory`] when the reserved pages cannot be grown.
    pub fn with_options(module: M, options: ShaperOptions) -> Result<Self> {
        let mut memory = LinearMemory::new(module);
        if options.reserve_pages > 0 {
            memory.grow(options.reserve_pages)?;
        }

        Ok(Shaper { memory, options })
    }

    /// Returns the linear memory bridge.
    #[inline]
    pub fn memory(&self) -> &LinearMemory<M> {
        &self.memory
    }

    /// Returns the native module.
    #[inline]
    pub fn native(&self) -> &M {
        self.memory.module()
    }

    /// Returns the options.
    #[inline]
    pub fn options(&self) -> &ShaperOptions {
        &self.options
    }

    /// Returns the number of allocations not yet freed.
    #[inline]
    pub fn outstanding_allocations(&self) -> usize {
        self.memory.outstanding_allocations()
    }

    /// Returns the glyph count and units per em of a face.
    pub fn face_info(&self, face: &Face<'_>) -> (u32, u32) {
        (face.glyph_count(), face.units_per_em())
    }

    /// Shapes `text` with a single font.
    ///
    /// An empty `language` keeps the native default.
    pub fn shape(
        &mut self,
        text: &str,
        font: &[u8],
        language: &str,
        direction: Direction,
    ) -> Result<Vec<GlyphEntry>> {
        self.shape_multi(text, &[FontSpec::new("font", font)], language, direction)
    }

    /// Shapes `text` with several fonts.
    ///
    /// Ranges are assigned in the order of `fonts`, and the decoded
    /// [`GlyphEntry::font_index`] refers to a position in `fonts`.
    pub fn shape_multi(
        &mut self,
        text: &str,
        fonts: &[FontSpec<'_>],
        language: &str,
        direction: Direction,
    ) -> Result<Vec<GlyphEntry>> {
        let outstanding = self.outstanding_allocations();

        let mut uploads = Vec::new();
        let mut result = self
            .upload_all(fonts, &mut uploads)
            .and_then(|()| self.shape_uploaded(text, fonts, &uploads, language, direction));

        for data in uploads {
            result = keep_first(result, self.release_font_data(data));
        }

        debug_assert!(self.memory.is_poisoned() || self.outstanding_allocations() == outstanding);
        result
    }

    fn upload_all(&mut self, specs: &[FontSpec<'_>], uploads: &mut Vec<FontData>) -> Result<()> {
        for spec in specs {
            if !uploads.iter().any(|data| data.key() == spec.key) {
                uploads.push(self.upload_font(spec.key, spec.data)?);
            }
        }

        Ok(())
    }

    fn shape_uploaded<'a>(
        &mut self,
        text: &str,
        specs: &[FontSpec<'_>],
        uploads: &'a [FontData],
        language: &str,
        direction: Direction,
    ) -> Result<Vec<GlyphEntry>> {
        let mut faces = Vec::new();
        let mut fonts = Vec::with_capacity(specs.len());
        let mut result = self.create_fonts(specs, uploads, &mut faces, &mut fonts);

        // Every font holds its own face reference.
        for (_, _, face) in faces {
            result = keep_first(result, self.destroy_face(face));
        }

        let mut glyphs = result.and_then(|()| self.run_session(text, specs, &mut fonts, language, direction));

        // Left over when the session was never configured.
        for font in fonts {
            glyphs = keep_first(glyphs, self.destroy_font(font));
        }

        glyphs
    }

    fn create_fonts<'a>(
        &mut self,
        specs: &[FontSpec<'_>],
        uploads: &'a [FontData],
        faces: &mut Vec<(&'a str, u32, Face<'a>)>,
        fonts: &mut Vec<Font<'a>>,
    ) -> Result<()> {
        for spec in specs {
            let Some(data) = uploads.iter().find(|data| data.key() == spec.key) else {
                return Err(Error::InvalidFont { key: spec.key.to_string() });
            };

            let shared = faces
                .iter()
                .position(|(key, index, _)| *key == data.key() && *index == spec.face_index);
            let i = match shared {
                Some(i) => i,
                None => {
                    let face = self.load_face(data, spec.face_index)?;
                    faces.push((data.key(), spec.face_index, face));
                    faces.len() - 1
                }
            };

            fonts.push(self.create_font(&faces[i].2, spec.scale)?);
        }

        Ok(())
    }

    fn run_session<'a>(
        &mut self,
        text: &str,
        specs: &[FontSpec<'_>],
        fonts: &mut Vec<Font<'a>>,
        language: &str,
        direction: Direction,
    ) -> Result<Vec<GlyphEntry>> {
        let ids: Vec<FontId> = fonts.iter().map(Font::id).collect();

        let mut session = self.create_session()?;
        let glyphs = self
            .configure(&mut session, text, specs, fonts, language, direction)
            .and_then(|()| {
                let glyphs = self.layout(&mut session)?;
                self.decode(&glyphs, &ids, text)
            });

        keep_first(glyphs, self.destroy_session(session))
    }

    fn configure<'a>(
        &mut self,
        session: &mut Session<'a>,
        text: &str,
        specs: &[FontSpec<'_>],
        fonts: &mut Vec<Font<'a>>,
        language: &str,
        direction: Direction,
    ) -> Result<()> {
        self.set_text(session, text)?;

        for (spec, font) in specs.iter().zip(fonts.iter()) {
            let range = spec.range.clone().unwrap_or(0..text.len());
            let Some(len) = range.end.checked_sub(range.start) else {
                return Err(Error::InvalidRange {
                    start: u32::try_from(range.start).unwrap_or(u32::MAX),
                    len: 0,
                    text_len: u32::try_from(text.len()).unwrap_or(u32::MAX),
                });
            };

            self.assign_font_range(session, font, range.start, len)?;
        }

        // The session holds its own font references now.
        let mut result = Ok(());
        for font in fonts.drain(..) {
            result = keep_first(result, self.destroy_font(font));
        }
        result?;

        self.set_direction(session, direction)?;
        self.set_language(session, language)
    }
}

// Keeps the first error. Cleanup errors after a failure are only logged.
fn keep_first<T>(result: Result<T>, cleanup: Result<()>) -> Result<T> {
    match (result, cleanup) {
        (Err(e), Err(cleanup)) => {
            log::warn!("cleanup after an error failed: {}", cleanup);
            Err(e)
        }
        (Ok(_), Err(e)) => Err(e),
        (result, Ok(())) => result,
    }
}
