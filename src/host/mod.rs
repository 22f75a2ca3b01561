//! An in-process implementation of the native boundary.
//!
//! `HostModule` behaves like a raqm/harfbuzz build running inside its own
//! linear memory: objects are reference counted the same way, handles are
//! addresses inside the memory, and the allocator grows the memory on
//! demand up to a page limit. Layout maps characters to nominal glyphs and
//! default advances and reorders bidi runs; it applies no GSUB/GPOS.

mod heap;
mod layout;

use std::collections::HashMap;

use crate::abi::{self, hb_bool_t, hb_memory_mode_t, ptr_t, raqm_direction_t, raqm_glyph_t, NativeModule};
use crate::{Direction, Error, MemoryMode};
use self::heap::Heap;
use self::layout::LayoutFont;

// Addresses below this are never handed out, so zero stays a null pointer.
const STATIC_DATA_END: u32 = 1024;

// Every object handle is backed by a block of this size.
const OBJECT_SIZE: u32 = 16;

const INITIAL_PAGES: u32 = 2;

/// The largest memory a 32-bit linear memory can address.
pub const MAX_PAGES: u32 = 65536;

struct Blob {
    data: ptr_t,
    len: u32,
    // Set when the blob holds a private copy.
    owned: bool,
    refs: u32,
}

struct Face {
    blob: u32,
    index: u32,
    upem: u16,
    glyph_count: u16,
    refs: u32,
}

struct Font {
    face: u32,
    x_scale: i32,
    y_scale: i32,
    refs: u32,
}

#[derive(Default)]
struct Session {
    text: String,
    // One entry per character, zero when unassigned.
    fonts: Vec<u32>,
    languages: Vec<Option<String>>,
    direction: Direction,
    glyphs: Option<(ptr_t, u32)>,
}

enum Object {
    Blob(Blob),
    Face(Face),
    Font(Font),
    Session(Session),
}

/// An in-process native module.
pub struct HostModule {
    memory: Vec<u8>,
    max_pages: u32,
    heap: Heap,
    objects: HashMap<u32, Object>,
}

impl Default for HostModule {
    fn default() -> Self {
        Self::new()
    }
}

impl HostModule {
    /// Creates a module with the largest possible page limit.
    pub fn new() -> Self {
        Self::with_max_pages(MAX_PAGES)
    }

    /// Creates a module whose memory never grows past `max_pages`.
    pub fn with_max_pages(max_pages: u32) -> Self {
        let max_pages = max_pages.clamp(1, MAX_PAGES);
        let pages = INITIAL_PAGES.min(max_pages);
        let size = pages as usize * abi::PAGE_SIZE as usize;
        HostModule {
            memory: vec![0; size],
            max_pages,
            heap: Heap::new(STATIC_DATA_END, size as u32),
            objects: HashMap::new(),
        }
    }

    /// Returns the current memory size in pages.
    pub fn pages(&self) -> u32 {
        (self.memory.len() / abi::PAGE_SIZE as usize) as u32
    }

    /// Returns the number of live blob, face, font and session objects.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Returns the number of bytes held by live heap blocks.
    ///
    /// This includes object handles and native-owned buffers.
    pub fn heap_in_use(&self) -> usize {
        self.heap.in_use()
    }

    /// Returns the number of live heap blocks.
    pub fn heap_blocks(&self) -> usize {
        self.heap.live_blocks()
    }

    /// Returns the language assigned to the character at byte `offset` of a session's text.
    pub fn session_language(&self, rq: u32, offset: usize) -> Option<&str> {
        let session = self.session(rq)?;
        let index = session.text.char_indices().position(|(i, _)| i == offset)?;
        session.languages.get(index)?.as_deref()
    }

    fn grow(&mut self, pages: u32) -> Option<u32> {
        let previous = self.pages();
        let total = previous.checked_add(pages)?;
        if total > self.max_pages {
            return None;
        }

        let size = total as usize * abi::PAGE_SIZE as usize;
        self.memory.resize(size, 0);
        self.heap.extend(size.min(u32::MAX as usize) as u32);
        Some(previous)
    }

    // Like sbrk-backed allocators, grows the memory when the heap is exhausted.
    fn alloc(&mut self, size: u32) -> Option<ptr_t> {
        if let Some(ptr) = self.heap.alloc(size) {
            return Some(ptr);
        }

        let needed = size.checked_add(heap::ALIGN)? as u64;
        let pages = needed.div_ceil(abi::PAGE_SIZE as u64) as u32;
        self.grow(pages)?;
        log::trace!("host heap grown by {} page(s)", pages);
        self.heap.alloc(size)
    }

    fn dealloc(&mut self, ptr: ptr_t) {
        if !self.heap.free(ptr) {
            log::error!("free of an unknown pointer {:#x}", ptr);
        }
    }

    fn bytes(&self, ptr: ptr_t, len: u32) -> Option<&[u8]> {
        let start = ptr as usize;
        self.memory.get(start..start + len as usize)
    }

    fn c_str(&self, ptr: ptr_t) -> Option<&str> {
        let tail = self.memory.get(ptr as usize..)?;
        let end = tail.iter().position(|b| *b == 0)?;
        std::str::from_utf8(&tail[..end]).ok()
    }

    fn insert(&mut self, object: Object) -> u32 {
        match self.alloc(OBJECT_SIZE) {
            Some(handle) => {
                self.objects.insert(handle, object);
                handle
            }
            None => 0,
        }
    }

    fn remove(&mut self, handle: u32) -> Option<Object> {
        let object = self.objects.remove(&handle)?;
        self.dealloc(handle);
        Some(object)
    }

    fn blob_mut(&mut self, handle: u32) -> Option<&mut Blob> {
        match self.objects.get_mut(&handle) {
            Some(Object::Blob(blob)) => Some(blob),
            _ => None,
        }
    }

    fn face(&self, handle: u32) -> Option<&Face> {
        match self.objects.get(&handle) {
            Some(Object::Face(face)) => Some(face),
            _ => None,
        }
    }

    fn face_mut(&mut self, handle: u32) -> Option<&mut Face> {
        match self.objects.get_mut(&handle) {
            Some(Object::Face(face)) => Some(face),
            _ => None,
        }
    }

    fn font(&self, handle: u32) -> Option<&Font> {
        match self.objects.get(&handle) {
            Some(Object::Font(font)) => Some(font),
            _ => None,
        }
    }

    fn font_mut(&mut self, handle: u32) -> Option<&mut Font> {
        match self.objects.get_mut(&handle) {
            Some(Object::Font(font)) => Some(font),
            _ => None,
        }
    }

    fn session(&self, handle: u32) -> Option<&Session> {
        match self.objects.get(&handle) {
            Some(Object::Session(session)) => Some(session),
            _ => None,
        }
    }

    fn session_mut(&mut self, handle: u32) -> Option<&mut Session> {
        match self.objects.get_mut(&handle) {
            Some(Object::Session(session)) => Some(session),
            _ => None,
        }
    }

    fn release_blob(&mut self, handle: u32) {
        let Some(blob) = self.blob_mut(handle) else {
            log::error!("hb_blob_destroy: {:#x} is not a blob", handle);
            return;
        };

        blob.refs -= 1;
        if blob.refs > 0 {
            return;
        }

        if let Some(Object::Blob(blob)) = self.remove(handle) {
            if blob.owned {
                self.dealloc(blob.data);
            }
        }
    }

    fn release_face(&mut self, handle: u32) {
        let Some(face) = self.face_mut(handle) else {
            log::error!("hb_face_destroy: {:#x} is not a face", handle);
            return;
        };

        face.refs -= 1;
        if face.refs > 0 {
            return;
        }

        if let Some(Object::Face(face)) = self.remove(handle) {
            self.release_blob(face.blob);
        }
    }

    fn release_font(&mut self, handle: u32) {
        let Some(font) = self.font_mut(handle) else {
            log::error!("hb_font_destroy: {:#x} is not a font", handle);
            return;
        };

        font.refs -= 1;
        if font.refs > 0 {
            return;
        }

        if let Some(Object::Font(font)) = self.remove(handle) {
            self.release_face(font.face);
        }
    }

    fn face_data(&self, face: &Face) -> Option<&[u8]> {
        match self.objects.get(&face.blob) {
            Some(Object::Blob(blob)) => {
                // A borrowed blob is only usable while its bytes are allocated.
                if !blob.owned && !self.heap.is_live(blob.data, blob.len) {
                    log::error!("blob data at {:#x} was freed while still referenced", blob.data);
                    return None;
                }

                self.bytes(blob.data, blob.len)
            }
            _ => None,
        }
    }

    // Character index of a byte offset, if it is a character boundary.
    fn char_index(text: &str, offset: u32) -> Option<usize> {
        let offset = offset as usize;
        if offset == text.len() {
            return Some(text.chars().count());
        }

        text.char_indices().position(|(i, _)| i == offset)
    }

    fn char_range(text: &str, start: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let end = start.checked_add(len)?;
        Some(Self::char_index(text, start)?..Self::char_index(text, end)?)
    }

    fn run_layout(&self, session: &Session) -> Option<Vec<raqm_glyph_t>> {
        let mut fonts: HashMap<u32, LayoutFont> = HashMap::new();
        for handle in &session.fonts {
            if fonts.contains_key(handle) {
                continue;
            }

            let font = self.font(*handle)?;
            let face = self.face(font.face)?;
            let data = self.face_data(face)?;
            let face = ttf_parser::Face::parse(data, face.index).ok()?;
            fonts.insert(*handle, LayoutFont {
                handle: *handle,
                face,
                x_scale: font.x_scale,
                y_scale: font.y_scale,
            });
        }

        let per_char: Option<Vec<&LayoutFont>> = session.fonts.iter().map(|h| fonts.get(h)).collect();
        Some(layout::layout(&session.text, &per_char?, session.direction))
    }
}

impl NativeModule for HostModule {
    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn memory_grow(&mut self, pages: u32) -> Option<u32> {
        self.grow(pages)
    }

    fn malloc(&mut self, size: u32) -> Result<ptr_t, Error> {
        Ok(self.alloc(size).unwrap_or(0))
    }

    fn free(&mut self, ptr: ptr_t) -> Result<(), Error> {
        if ptr != 0 {
            self.dealloc(ptr);
        }

        Ok(())
    }

    fn hb_blob_create(
        &mut self,
        data: ptr_t,
        length: u32,
        mode: hb_memory_mode_t,
        _user_data: ptr_t,
        _destroy: ptr_t,
    ) -> Result<u32, Error> {
        let Some(mode) = MemoryMode::from_raw(mode) else {
            return Ok(0);
        };

        if self.bytes(data, length).is_none() {
            return Ok(0);
        }

        let blob = if !mode.borrows_data() {
            let Some(copy) = self.alloc(length) else {
                return Ok(0);
            };

            self.memory.copy_within(data as usize..(data + length) as usize, copy as usize);
            Blob { data: copy, len: length, owned: true, refs: 1 }
        } else {
            Blob { data, len: length, owned: false, refs: 1 }
        };

        let owned_copy = blob.owned.then_some(blob.data);
        let handle = self.insert(Object::Blob(blob));
        if handle == 0 {
            if let Some(copy) = owned_copy {
                self.dealloc(copy);
            }
        }

        Ok(handle)
    }

    fn hb_blob_destroy(&mut self, blob: u32) -> Result<(), Error> {
        self.release_blob(blob);
        Ok(())
    }

    fn hb_face_create(&mut self, blob: u32, index: u32) -> Result<u32, Error> {
        let parsed = match self.objects.get(&blob) {
            Some(Object::Blob(b)) => self
                .bytes(b.data, b.len)
                .and_then(|data| ttf_parser::Face::parse(data, index).ok())
                .map(|face| (face.units_per_em(), face.number_of_glyphs())),
            _ => None,
        };

        let Some((upem, glyph_count)) = parsed else {
            return Ok(0);
        };

        let handle = self.insert(Object::Face(Face { blob, index, upem, glyph_count, refs: 1 }));
        if handle != 0 {
            if let Some(b) = self.blob_mut(blob) {
                b.refs += 1;
            }
        }

        Ok(handle)
    }

    fn hb_face_get_glyph_count(&mut self, face: u32) -> Result<u32, Error> {
        Ok(self.face(face).map(|f| u32::from(f.glyph_count)).unwrap_or(0))
    }

    fn hb_face_get_upem(&mut self, face: u32) -> Result<u32, Error> {
        Ok(self.face(face).map(|f| u32::from(f.upem)).unwrap_or(1000))
    }

    fn hb_face_destroy(&mut self, face: u32) -> Result<(), Error> {
        self.release_face(face);
        Ok(())
    }

    fn hb_font_create(&mut self, face: u32) -> Result<u32, Error> {
        let Some(upem) = self.face(face).map(|f| i32::from(f.upem)) else {
            return Ok(0);
        };

        let handle = self.insert(Object::Font(Font { face, x_scale: upem, y_scale: upem, refs: 1 }));
        if handle != 0 {
            if let Some(f) = self.face_mut(face) {
                f.refs += 1;
            }
        }

        Ok(handle)
    }

    fn hb_font_set_scale(&mut self, font: u32, x_scale: i32, y_scale: i32) -> Result<(), Error> {
        if let Some(font) = self.font_mut(font) {
            font.x_scale = x_scale;
            font.y_scale = y_scale;
        }

        Ok(())
    }

    fn hb_font_destroy(&mut self, font: u32) -> Result<(), Error> {
        self.release_font(font);
        Ok(())
    }

    fn raqm_create(&mut self) -> Result<u32, Error> {
        Ok(self.insert(Object::Session(Session::default())))
    }

    fn raqm_destroy(&mut self, rq: u32) -> Result<(), Error> {
        if self.session(rq).is_none() {
            log::error!("raqm_destroy: {:#x} is not a session", rq);
            return Ok(());
        }

        let Some(Object::Session(session)) = self.remove(rq) else {
            return Ok(());
        };

        for font in session.fonts.iter().filter(|f| **f != 0) {
            self.release_font(*font);
        }

        if let Some((ptr, _)) = session.glyphs {
            self.dealloc(ptr);
        }

        Ok(())
    }

    fn raqm_set_text_utf8(&mut self, rq: u32, text: ptr_t, len: u32) -> Result<hb_bool_t, Error> {
        let Some(text) = self.bytes(text, len).and_then(|b| std::str::from_utf8(b).ok()) else {
            return Ok(0);
        };

        let text = text.to_owned();
        let Some(session) = self.session_mut(rq) else {
            return Ok(0);
        };

        let count = text.chars().count();
        let previous = std::mem::take(&mut session.fonts);
        session.text = text;
        session.fonts = vec![0; count];
        session.languages = vec![None; count];
        for font in previous.into_iter().filter(|f| *f != 0) {
            self.release_font(font);
        }

        Ok(1)
    }

    fn raqm_set_harfbuzz_font_range(
        &mut self,
        rq: u32,
        font: u32,
        start: u32,
        len: u32,
    ) -> Result<hb_bool_t, Error> {
        if self.font(font).is_none() {
            return Ok(0);
        }

        let Some(session) = self.session_mut(rq) else {
            return Ok(0);
        };

        // Like raqm, ranges set before the text are silently ignored.
        if session.text.is_empty() || len == 0 {
            return Ok(1);
        }

        let Some(range) = Self::char_range(&session.text, start, len) else {
            return Ok(0);
        };

        let mut replaced = Vec::new();
        for slot in &mut session.fonts[range.clone()] {
            if *slot != 0 {
                replaced.push(*slot);
            }

            *slot = font;
        }

        if let Some(f) = self.font_mut(font) {
            f.refs += range.len() as u32;
        }

        for old in replaced {
            self.release_font(old);
        }

        Ok(1)
    }

    fn raqm_set_par_direction(&mut self, rq: u32, dir: raqm_direction_t) -> Result<hb_bool_t, Error> {
        let Some(direction) = Direction::from_raw(dir) else {
            return Ok(0);
        };

        match self.session_mut(rq) {
            Some(session) => {
                session.direction = direction;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn raqm_set_language(
        &mut self,
        rq: u32,
        lang: ptr_t,
        start: u32,
        len: u32,
    ) -> Result<hb_bool_t, Error> {
        let Some(lang) = self.c_str(lang).map(str::to_owned) else {
            return Ok(0);
        };

        let Some(session) = self.session_mut(rq) else {
            return Ok(0);
        };

        if session.text.is_empty() {
            return Ok(1);
        }

        let Some(range) = Self::char_range(&session.text, start, len) else {
            return Ok(0);
        };

        for slot in &mut session.languages[range] {
            *slot = Some(lang.clone());
        }

        Ok(1)
    }

    fn raqm_layout(&mut self, rq: u32) -> Result<hb_bool_t, Error> {
        let Some(session) = self.session(rq) else {
            return Ok(0);
        };

        // raqm refuses to lay out characters without a font.
        if let Some(i) = session.fonts.iter().position(|f| *f == 0) {
            log::debug!("raqm_layout: character {} has no font", i);
            return Ok(0);
        }

        let Some(glyphs) = self.run_layout(session) else {
            return Ok(0);
        };

        let previous = self.session_mut(rq).and_then(|s| s.glyphs.take());
        if let Some((ptr, _)) = previous {
            self.dealloc(ptr);
        }

        let count = glyphs.len() as u32;
        let Some(ptr) = self.alloc(count * abi::GLYPH_RECORD_SIZE) else {
            return Ok(0);
        };

        for (i, glyph) in glyphs.iter().enumerate() {
            let offset = ptr as usize + i * abi::GLYPH_RECORD_SIZE as usize;
            let record = glyph.swap_le();
            self.memory[offset..offset + abi::GLYPH_RECORD_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&record));
        }

        if let Some(session) = self.session_mut(rq) {
            session.glyphs = Some((ptr, count));
        }

        Ok(1)
    }

    fn raqm_get_glyphs(&mut self, rq: u32, length: ptr_t) -> Result<ptr_t, Error> {
        let (ptr, count) = self.session(rq).and_then(|s| s.glyphs).unwrap_or((0, 0));
        let start = length as usize;
        if let Some(out) = self.memory.get_mut(start..start + 4) {
            out.copy_from_slice(&count.to_le_bytes());
        }

        Ok(ptr)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_heap_blocks() {
        let mut module = HostModule::new();
        let rq = module.raqm_create().unwrap();
        assert_ne!(rq, 0);
        assert_eq!(module.live_objects(), 1);
        assert_eq!(module.heap_blocks(), 1);
        module.raqm_destroy(rq).unwrap();
        assert_eq!(module.live_objects(), 0);
        assert_eq!(module.heap_in_use(), 0);
    }

    #[test]
    fn null_pointer_is_never_allocated() {
        let mut module = HostModule::new();
        let ptr = module.malloc(0).unwrap();
        assert!(ptr >= STATIC_DATA_END);
        module.free(ptr).unwrap();
    }

    #[test]
    fn malloc_grows_memory() {
        let mut module = HostModule::new();
        let pages = module.pages();
        let ptr = module.malloc(3 * abi::PAGE_SIZE).unwrap();
        assert_ne!(ptr, 0);
        assert!(module.pages() > pages);
        module.free(ptr).unwrap();
    }

    #[test]
    fn malloc_respects_page_limit() {
        let mut module = HostModule::with_max_pages(2);
        assert_eq!(module.malloc(3 * abi::PAGE_SIZE).unwrap(), 0);
        assert_eq!(module.pages(), 2);
    }

    #[test]
    fn garbage_face() {
        let mut module = HostModule::new();
        let data = module.malloc(8).unwrap();
        let blob = module.hb_blob_create(data, 8, abi::HB_MEMORY_MODE_READONLY, 0, 0).unwrap();
        assert_ne!(blob, 0);
        assert_eq!(module.hb_face_create(blob, 0).unwrap(), 0);
        module.hb_blob_destroy(blob).unwrap();
        module.free(data).unwrap();
        assert_eq!(module.live_objects(), 0);
        assert_eq!(module.heap_in_use(), 0);
    }

    #[test]
    fn layout_without_font_fails() {
        let mut module = HostModule::new();
        let text = module.malloc(2).unwrap();
        module.memory_mut()[text as usize..text as usize + 2].copy_from_slice(b"ab");
        let rq = module.raqm_create().unwrap();
        assert_eq!(module.raqm_set_text_utf8(rq, text, 2).unwrap(), 1);
        assert_eq!(module.raqm_layout(rq).unwrap(), 0);
        module.raqm_destroy(rq).unwrap();
        module.free(text).unwrap();
        assert_eq!(module.heap_in_use(), 0);
    }
}
