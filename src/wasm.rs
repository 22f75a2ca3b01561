//! Hosts a raqm/harfbuzz WebAssembly build.

use wasmi::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

use crate::abi::{hb_bool_t, hb_memory_mode_t, ptr_t, raqm_direction_t, NativeModule};
use crate::Error;

struct Exports {
    malloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    hb_blob_create: TypedFunc<(u32, u32, u32, u32, u32), u32>,
    hb_blob_destroy: TypedFunc<u32, ()>,
    hb_face_create: TypedFunc<(u32, u32), u32>,
    hb_face_get_glyph_count: TypedFunc<u32, u32>,
    hb_face_get_upem: TypedFunc<u32, u32>,
    hb_face_destroy: TypedFunc<u32, ()>,
    hb_font_create: TypedFunc<u32, u32>,
    hb_font_set_scale: TypedFunc<(u32, i32, i32), ()>,
    hb_font_destroy: TypedFunc<u32, ()>,
    raqm_create: TypedFunc<(), u32>,
    raqm_destroy: TypedFunc<u32, ()>,
    raqm_set_text_utf8: TypedFunc<(u32, u32, u32), u32>,
    raqm_set_harfbuzz_font_range: TypedFunc<(u32, u32, u32, u32), u32>,
    raqm_set_par_direction: TypedFunc<(u32, u32), u32>,
    raqm_set_language: TypedFunc<(u32, u32, u32, u32), u32>,
    raqm_layout: TypedFunc<u32, u32>,
    raqm_get_glyphs: TypedFunc<(u32, u32), u32>,
}

/// A native module backed by a raqm WebAssembly binary.
///
/// The binary must export `memory`, `malloc`, `free` and the harfbuzz and
/// raqm entry points listed on [`NativeModule`].
pub struct WasmModule {
    store: Store<()>,
    memory: Memory,
    exports: Exports,
}

impl WasmModule {
    /// Compiles and instantiates a module.
    pub fn new(wasm: &[u8]) -> Result<Self, Error> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm)?;
        let mut store = Store::new(&engine, ());

        let mut linker = Linker::<()>::new(&engine);
        // Emscripten builds report growth to the embedder, nothing to do here.
        linker
            .func_wrap("env", "emscripten_notify_memory_growth", |_: u32| {})
            .map_err(|e| Error::Trap(e.to_string()))?;

        let instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;
        let memory = instance
            .get_memory(&store, "memory")
            .ok_or_else(|| Error::MissingExport("memory".to_string()))?;

        let exports = Exports {
            malloc: export(&instance, &store, "malloc")?,
            free: export(&instance, &store, "free")?,
            hb_blob_create: export(&instance, &store, "hb_blob_create")?,
            hb_blob_destroy: export(&instance, &store, "hb_blob_destroy")?,
            hb_face_create: export(&instance, &store, "hb_face_create")?,
            hb_face_get_glyph_count: export(&instance, &store, "hb_face_get_glyph_count")?,
            hb_face_get_upem: export(&instance, &store, "hb_face_get_upem")?,
            hb_face_destroy: export(&instance, &store, "hb_face_destroy")?,
            hb_font_create: export(&instance, &store, "hb_font_create")?,
            hb_font_set_scale: export(&instance, &store, "hb_font_set_scale")?,
            hb_font_destroy: export(&instance, &store, "hb_font_destroy")?,
            raqm_create: export(&instance, &store, "raqm_create")?,
            raqm_destroy: export(&instance, &store, "raqm_destroy")?,
            raqm_set_text_utf8: export(&instance, &store, "raqm_set_text_utf8")?,
            raqm_set_harfbuzz_font_range: export(&instance, &store, "raqm_set_harfbuzz_font_range")?,
            raqm_set_par_direction: export(&instance, &store, "raqm_set_par_direction")?,
            raqm_set_language: export(&instance, &store, "raqm_set_language")?,
            raqm_layout: export(&instance, &store, "raqm_layout")?,
            raqm_get_glyphs: export(&instance, &store, "raqm_get_glyphs")?,
        };

        log::debug!("raqm module instantiated with {} byte(s) of memory", memory.data(&store).len());
        Ok(WasmModule { store, memory, exports })
    }
}

fn export<P, R>(instance: &Instance, store: &Store<()>, name: &str) -> Result<TypedFunc<P, R>, Error>
where
    P: wasmi::WasmParams,
    R: wasmi::WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|_| Error::MissingExport(name.to_string()))
}

impl NativeModule for WasmModule {
    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn memory_grow(&mut self, pages: u32) -> Option<u32> {
        self.memory.grow(&mut self.store, pages).ok()
    }

    fn malloc(&mut self, size: u32) -> Result<ptr_t, Error> {
        Ok(self.exports.malloc.call(&mut self.store, size)?)
    }

    fn free(&mut self, ptr: ptr_t) -> Result<(), Error> {
        Ok(self.exports.free.call(&mut self.store, ptr)?)
    }

    fn hb_blob_create(
        &mut self,
        data: ptr_t,
        length: u32,
        mode: hb_memory_mode_t,
        user_data: ptr_t,
        destroy: ptr_t,
    ) -> Result<u32, Error> {
        let params = (data, length, mode, user_data, destroy);
        Ok(self.exports.hb_blob_create.call(&mut self.store, params)?)
    }

    fn hb_blob_destroy(&mut self, blob: u32) -> Result<(), Error> {
        Ok(self.exports.hb_blob_destroy.call(&mut self.store, blob)?)
    }

    fn hb_face_create(&mut self, blob: u32, index: u32) -> Result<u32, Error> {
        Ok(self.exports.hb_face_create.call(&mut self.store, (blob, index))?)
    }

    fn hb_face_get_glyph_count(&mut self, face: u32) -> Result<u32, Error> {
        Ok(self.exports.hb_face_get_glyph_count.call(&mut self.store, face)?)
    }

    fn hb_face_get_upem(&mut self, face: u32) -> Result<u32, Error> {
        Ok(self.exports.hb_face_get_upem.call(&mut self.store, face)?)
    }

    fn hb_face_destroy(&mut self, face: u32) -> Result<(), Error> {
        Ok(self.exports.hb_face_destroy.call(&mut self.store, face)?)
    }

    fn hb_font_create(&mut self, face: u32) -> Result<u32, Error> {
        Ok(self.exports.hb_font_create.call(&mut self.store, face)?)
    }

    fn hb_font_set_scale(&mut self, font: u32, x_scale: i32, y_scale: i32) -> Result<(), Error> {
        Ok(self.exports.hb_font_set_scale.call(&mut self.store, (font, x_scale, y_scale))?)
    }

    fn hb_font_destroy(&mut self, font: u32) -> Result<(), Error> {
        Ok(self.exports.hb_font_destroy.call(&mut self.store, font)?)
    }

    fn raqm_create(&mut self) -> Result<u32, Error> {
        Ok(self.exports.raqm_create.call(&mut self.store, ())?)
    }

    fn raqm_destroy(&mut self, rq: u32) -> Result<(), Error> {
        Ok(self.exports.raqm_destroy.call(&mut self.store, rq)?)
    }

    fn raqm_set_text_utf8(&mut self, rq: u32, text: ptr_t, len: u32) -> Result<hb_bool_t, Error> {
        Ok(self.exports.raqm_set_text_utf8.call(&mut self.store, (rq, text, len))?)
    }

    fn raqm_set_harfbuzz_font_range(
        &mut self,
        rq: u32,
        font: u32,
        start: u32,
        len: u32,
    ) -> Result<hb_bool_t, Error> {
        let params = (rq, font, start, len);
        Ok(self.exports.raqm_set_harfbuzz_font_range.call(&mut self.store, params)?)
    }

    fn raqm_set_par_direction(&mut self, rq: u32, dir: raqm_direction_t) -> Result<hb_bool_t, Error> {
        Ok(self.exports.raqm_set_par_direction.call(&mut self.store, (rq, dir))?)
    }

    fn raqm_set_language(
        &mut self,
        rq: u32,
        lang: ptr_t,
        start: u32,
        len: u32,
    ) -> Result<hb_bool_t, Error> {
        let params = (rq, lang, start, len);
        Ok(self.exports.raqm_set_language.call(&mut self.store, params)?)
    }

    fn raqm_layout(&mut self, rq: u32) -> Result<hb_bool_t, Error> {
        Ok(self.exports.raqm_layout.call(&mut self.store, rq)?)
    }

    fn raqm_get_glyphs(&mut self, rq: u32, length: ptr_t) -> Result<ptr_t, Error> {
        Ok(self.exports.raqm_get_glyphs.call(&mut self.store, (rq, length))?)
    }
}
