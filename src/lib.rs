/*!
`rustyraqm` drives a [raqm](https://github.com/HOST-Oman/libraqm)/harfbuzz text shaper
that lives inside a flat linear memory, such as a WebAssembly build.

The crate copies fonts and text into the shaper's memory, creates and
destroys the native blob, face, font and layout objects in the right order,
runs the layout and decodes the resulting glyph records.

```no_run
use rustyraqm::{Direction, Shaper, host::HostModule};

let font = std::fs::read("font.ttf").unwrap();
let mut shaper = Shaper::new(HostModule::new()).unwrap();
let glyphs = shaper.shape("Hello", &font, "en", Direction::LeftToRight).unwrap();
println!("{}", rustyraqm::serialize(&glyphs, Default::default()));
```
*/

#![doc(html_root_url = "https://docs.rs/rustyraqm/0.1.0")]
#![warn(missing_docs)]

pub mod abi;
mod common;
mod error;
mod glyph;
pub mod host;
pub mod memory;
mod resource;
mod session;
mod shaper;
#[cfg(test)]
mod test_font;
#[cfg(feature = "wasm-shaper")]
pub mod wasm;

pub use crate::abi::NativeModule;
pub use crate::common::{Direction, MemoryMode};
pub use crate::error::{Error, Result};
pub use crate::glyph::{serialize, GlyphEntry, GlyphFlags, SerializeFlags};
pub use crate::memory::{Allocation, LinearMemory};
pub use crate::resource::{Blob, Face, Font, FontData, FontId};
pub use crate::session::{FontRange, GlyphArray, Session};
pub use crate::shaper::{FontSpec, Shaper, ShaperOptions};
