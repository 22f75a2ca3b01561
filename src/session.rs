use core::marker::PhantomData;
use core::num::NonZeroU32;

use smallvec::SmallVec;

use crate::abi::{self, NativeModule};
use crate::memory::Allocation;
use crate::resource::{Font, FontData, FontId};
use crate::{Direction, Error, Result, Shaper};

/// A font assigned to a byte range of the session text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontRange {
    /// The assigned font.
    pub font: FontId,
    /// First byte of the range.
    pub start: u32,
    /// Length of the range in bytes.
    pub len: u32,
}

/// One shaping request on the native side.
///
/// Lifecycle: create, set text, assign fonts, set direction and language,
/// lay out, read the glyphs, destroy.
#[derive(Debug)]
pub struct Session<'a> {
    raw: NonZeroU32,
    text: Option<(Allocation, String)>,
    ranges: SmallVec<[FontRange; 4]>,
    fonts: SmallVec<[FontId; 4]>,
    direction: Direction,
    language: Option<String>,
    marker: PhantomData<&'a FontData>,
}

impl Session<'_> {
    /// Returns the session text.
    pub fn text(&self) -> Option<&str> {
        self.text.as_ref().map(|(_, text)| text.as_str())
    }

    /// Returns the assigned ranges in call order.
    pub fn ranges(&self) -> &[FontRange] {
        &self.ranges
    }

    /// Returns the distinct assigned fonts in the order of their first assignment.
    pub fn fonts(&self) -> &[FontId] {
        &self.fonts
    }

    /// Returns the paragraph direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the language tag.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Returns the raw session handle.
    pub fn to_raw(&self) -> u32 {
        self.raw.get()
    }

    fn text_len(&self) -> Result<u32> {
        match self.text {
            Some((ref allocation, _)) => Ok(allocation.len()),
            None => Err(Error::TextNotSet),
        }
    }
}

/// The glyph array produced by a layout.
///
/// The array is owned by the native session and borrows the [`Session`],
/// so it cannot be read once the session is destroyed.
#[derive(Debug, Clone, Copy)]
pub struct GlyphArray<'s> {
    pub(crate) ptr: u32,
    pub(crate) count: u32,
    marker: PhantomData<&'s ()>,
}

impl GlyphArray<'_> {
    /// Returns the address of the first record.
    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    /// Returns the number of records.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Checks that there are no records.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<M: NativeModule> Shaper<M> {
    /// Creates an empty native session.
    pub fn create_session<'a>(&mut self) -> Result<Session<'a>> {
        let raw = self.memory.native()?.raqm_create()?;
        let raw = NonZeroU32::new(raw).ok_or(Error::NativeCallFailed("raqm_create"))?;
        log::trace!("raqm_create() -> {:#x}", raw);
        Ok(Session {
            raw,
            text: None,
            ranges: SmallVec::new(),
            fonts: SmallVec::new(),
            direction: Direction::Default,
            language: None,
            marker: PhantomData,
        })
    }

    /// Copies `text` into linear memory and hands it to the session.
    ///
    /// The buffer is owned by the session until [`destroy_session`](Self::destroy_session).
    pub fn set_text(&mut self, session: &mut Session<'_>, text: &str) -> Result<()> {
        if session.text.is_some() {
            return Err(Error::TextAlreadySet);
        }

        let allocation = self.memory.allocate_bytes(text.as_bytes())?;
        let status = self
            .memory
            .native()
            .and_then(|native| native.raqm_set_text_utf8(session.raw.get(), allocation.ptr(), allocation.len()));

        match status {
            Ok(0) => {
                self.memory.free(allocation)?;
                Err(Error::NativeCallFailed("raqm_set_text_utf8"))
            }
            Ok(_) => {
                session.text = Some((allocation, text.to_string()));
                Ok(())
            }
            Err(e) => {
                self.release_after_error(allocation);
                Err(e)
            }
        }
    }

    /// Assigns `font` to `len` bytes of the text starting at `start`.
    ///
    /// Ranges are forwarded in call order; when they overlap, the native
    /// component decides which assignment wins.
    pub fn assign_font_range<'a>(
        &mut self,
        session: &mut Session<'a>,
        font: &Font<'a>,
        start: usize,
        len: usize,
    ) -> Result<()> {
        let text_len = session.text_len()?;
        let text = session.text().unwrap_or_default();
        let invalid = Error::InvalidRange {
            start: u32::try_from(start).unwrap_or(u32::MAX),
            len: u32::try_from(len).unwrap_or(u32::MAX),
            text_len,
        };

        let end = match start.checked_add(len) {
            Some(end) if end <= text.len() => end,
            _ => return Err(invalid),
        };

        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return Err(invalid);
        }

        let raw = Self::font_raw(font);
        let status = self
            .memory
            .native()?
            .raqm_set_harfbuzz_font_range(session.raw.get(), raw, start as u32, len as u32)?;
        if status == 0 {
            log::warn!("raqm_set_harfbuzz_font_range({:#x}, {}, {}) failed", raw, start, len);
            return Err(invalid);
        }

        // The session now holds its own reference to the font.
        session.ranges.push(FontRange {
            font: font.id(),
            start: start as u32,
            len: len as u32,
        });
        if !session.fonts.contains(&font.id()) {
            session.fonts.push(font.id());
        }

        Ok(())
    }

    /// Sets the paragraph direction.
    pub fn set_direction(&mut self, session: &mut Session<'_>, direction: Direction) -> Result<()> {
        let status = self
            .memory
            .native()?
            .raqm_set_par_direction(session.raw.get(), direction.to_raw())?;
        if status == 0 {
            return Err(Error::NativeCallFailed("raqm_set_par_direction"));
        }

        session.direction = direction;
        Ok(())
    }

    /// Sets the language of the whole text.
    ///
    /// The tag is copied into linear memory only for the duration of this call.
    /// An empty tag keeps the native default.
    pub fn set_language(&mut self, session: &mut Session<'_>, language: &str) -> Result<()> {
        let text_len = session.text_len()?;
        if language.is_empty() {
            return Ok(());
        }

        // The native side reads a NUL-terminated string.
        let tag = self.memory.allocate_c_str(language)?;
        let status = self
            .memory
            .native()
            .and_then(|native| native.raqm_set_language(session.raw.get(), tag.ptr(), 0, text_len));
        match status {
            Ok(status) => {
                self.memory.free(tag)?;
                if status == 0 {
                    return Err(Error::NativeCallFailed("raqm_set_language"));
                }
            }
            Err(e) => {
                self.release_after_error(tag);
                return Err(e);
            }
        }

        session.language = Some(language.to_string());
        Ok(())
    }

    /// Runs the native layout and returns the resulting glyph array.
    ///
    /// The array belongs to the session and must not be freed. A new layout
    /// replaces the native buffer, so the array keeps the session mutably
    /// borrowed and a second layout is rejected while it is alive:
    ///
    /// ```compile_fail
    /// use rustyraqm::{host::HostModule, Shaper};
    ///
    /// let mut shaper = Shaper::new(HostModule::new()).unwrap();
    /// let mut session = shaper.create_session().unwrap();
    /// shaper.set_text(&mut session, "ab").unwrap();
    /// let first = shaper.layout(&mut session).unwrap();
    /// let second = shaper.layout(&mut session).unwrap();
    /// shaper.decode(&first, &[], "ab").unwrap();
    /// ```
    pub fn layout<'s>(&mut self, session: &'s mut Session<'_>) -> Result<GlyphArray<'s>> {
        session.text_len()?;

        let rq = session.raw.get();
        if self.memory.native()?.raqm_layout(rq)? == 0 {
            return Err(Error::LayoutFailed("raqm_layout returned false".to_string()));
        }

        // The glyph count comes back through a 4-byte out-parameter.
        let count_ptr = self.memory.allocate(4)?;
        self.memory.write_bytes(count_ptr.ptr(), &0u32.to_le_bytes())?;
        let glyphs = self
            .memory
            .native()
            .and_then(|native| native.raqm_get_glyphs(rq, count_ptr.ptr()))
            .and_then(|ptr| Ok((ptr, self.memory.read_u32(count_ptr.ptr())?)));
        self.memory.free(count_ptr)?;
        let (ptr, count) = glyphs?;

        if count > i32::MAX as u32 {
            return Err(Error::LayoutFailed(format!("negative glyph count {}", count as i32)));
        }

        if count > 0 {
            if ptr == 0 {
                return Err(Error::LayoutFailed(format!("null glyph array for {} glyphs", count)));
            }

            let end = u64::from(ptr) + u64::from(count) * u64::from(abi::GLYPH_RECORD_SIZE);
            if end > self.memory.size() as u64 {
                return Err(Error::LayoutFailed(format!(
                    "{} glyphs at {:#x} overflow the linear memory",
                    count, ptr
                )));
            }
        }

        log::debug!("raqm_layout({:#x}) -> {} glyph(s) at {:#x}", rq, count, ptr);
        Ok(GlyphArray {
            ptr,
            count,
            marker: PhantomData,
        })
    }

    /// Destroys the native session and releases the text buffer.
    ///
    /// The session's font references are dropped by the native side here.
    pub fn destroy_session(&mut self, session: Session<'_>) -> Result<()> {
        log::trace!("raqm_destroy({:#x})", session.raw);
        let destroyed = self
            .memory
            .native()
            .and_then(|native| native.raqm_destroy(session.raw.get()));

        let released = match session.text {
            Some((allocation, _)) => self.memory.free(allocation),
            None => Ok(()),
        };

        destroyed.and(released)
    }

    // Best effort release on a path that already failed.
    pub(crate) fn release_after_error(&mut self, allocation: Allocation) {
        if let Err(e) = self.memory.free(allocation) {
            log::warn!("failed to release an allocation after an error: {}", e);
        }
    }
}
