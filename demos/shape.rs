use std::path::PathBuf;

use rustyraqm::host::HostModule;
use rustyraqm::{FontSpec, NativeModule, SerializeFlags, Shaper, ShaperOptions};

const HELP: &str = "\
USAGE:
    shape [OPTIONS] <FONT-FILE> [TEXT]

OPTIONS:
    -h, --help                          Show help options
        --version                       Show version number
        --font-file PATH                Set font file-name
        --face-index INDEX              Set face index [default: 0]
        --scale NUMBER                  Set font scale [default: units per em]
        --text TEXT                     Set input text
        --text-file PATH                Set input text file
    -u, --unicodes LIST                 Set comma-separated list of input Unicode codepoints
                                        Examples: 'U+0056,U+0057'
        --fallback-font PATH            Set a second font used for --fallback-range
        --fallback-range START:END      Set the text bytes rendered with the fallback font
        --direction DIRECTION           Set paragraph direction
                                        [possible values: default, ltr, rtl, ttb]
        --language LANG                 Set text language [default: LC_CTYPE]
        --memory-mode MODE              Set how blobs reference font data [default: writable]
                                        [possible values: duplicate, readonly, writable,
                                        readonly-may-make-writable]
        --reserve-pages N               Grow the linear memory by N pages up-front [default: 0]
        --wasm PATH                     Use a raqm WebAssembly build
                                        (requires the `wasm-shaper` feature)
        --no-positions                  Do not output glyph positions
        --no-advances                   Do not output glyph advances
        --no-clusters                   Do not output cluster indices
        --no-fonts                      Do not output font indices
        --ned                           No Extra Data; Do not output clusters or advances

ARGS:
    <FONT-FILE>                         A font file
    [TEXT]                              An optional text
";

struct Args {
    help: bool,
    version: bool,
    font_file: Option<PathBuf>,
    face_index: u32,
    scale: Option<i32>,
    text: Option<String>,
    text_file: Option<PathBuf>,
    unicodes: Option<String>,
    fallback_font: Option<PathBuf>,
    fallback_range: Option<std::ops::Range<usize>>,
    direction: rustyraqm::Direction,
    language: String,
    memory_mode: rustyraqm::MemoryMode,
    reserve_pages: u32,
    wasm: Option<PathBuf>,
    no_positions: bool,
    no_advances: bool,
    no_clusters: bool,
    no_fonts: bool,
    ned: bool,
    free: Vec<String>,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    let args = Args {
        help: args.contains(["-h", "--help"]),
        version: args.contains("--version"),
        font_file: args.opt_value_from_str("--font-file")?,
        face_index: args.opt_value_from_str("--face-index")?.unwrap_or(0),
        scale: args.opt_value_from_str("--scale")?,
        text: args.opt_value_from_str("--text")?,
        text_file: args.opt_value_from_str("--text-file")?,
        unicodes: args.opt_value_from_fn(["-u", "--unicodes"], parse_unicodes)?,
        fallback_font: args.opt_value_from_str("--fallback-font")?,
        fallback_range: args.opt_value_from_fn("--fallback-range", parse_range)?,
        direction: args.opt_value_from_str("--direction")?.unwrap_or_default(),
        language: args.opt_value_from_str("--language")?.unwrap_or_else(system_language),
        memory_mode: args.opt_value_from_str("--memory-mode")?.unwrap_or_default(),
        reserve_pages: args.opt_value_from_str("--reserve-pages")?.unwrap_or(0),
        wasm: args.opt_value_from_str("--wasm")?,
        no_positions: args.contains("--no-positions"),
        no_advances: args.contains("--no-advances"),
        no_clusters: args.contains("--no-clusters"),
        no_fonts: args.contains("--no-fonts"),
        ned: args.contains("--ned"),
        free: args.finish().into_iter().map(|s| s.to_string_lossy().into_owned()).collect(),
    };

    Ok(args)
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}.", e);
            std::process::exit(1);
        }
    };

    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if args.help {
        print!("{}", HELP);
        return;
    }

    let mut font_set_as_free_arg = false;
    let font_path = if let Some(ref path) = args.font_file {
        path.clone()
    } else if !args.free.is_empty() {
        font_set_as_free_arg = true;
        PathBuf::from(&args.free[0])
    } else {
        eprintln!("Error: font is not set.");
        std::process::exit(1);
    };

    let font_data = read_file(&font_path);
    let fallback_data = args.fallback_font.as_ref().map(read_file);

    let text = if let Some(ref path) = args.text_file {
        String::from_utf8_lossy(&read_file(path)).into_owned()
    } else if args.free.len() == 2 && font_set_as_free_arg {
        args.free[1].clone()
    } else if args.free.len() == 1 && !font_set_as_free_arg {
        args.free[0].clone()
    } else if let Some(ref text) = args.unicodes {
        text.clone()
    } else if let Some(ref text) = args.text {
        text.clone()
    } else {
        eprintln!("Error: text is not set.");
        std::process::exit(1);
    };

    let mut primary = FontSpec::new("primary", &font_data).with_face_index(args.face_index);
    if let Some(scale) = args.scale {
        primary = primary.with_scale(scale, scale);
    }

    let mut fonts = vec![primary];
    if let Some(ref data) = fallback_data {
        let range = args.fallback_range.clone().unwrap_or(0..text.len());
        fonts.push(FontSpec::new("fallback", data).with_range(range));
    }

    let options = ShaperOptions {
        reserve_pages: args.reserve_pages,
        memory_mode: args.memory_mode,
        default_scale: None,
    };

    let glyphs = match args.wasm {
        Some(ref path) => shape_with_wasm(path, options, &text, &fonts, &args),
        None => shape(HostModule::new(), options, &text, &fonts, &args),
    };

    let mut format_flags = SerializeFlags::default();
    if args.no_clusters || args.ned {
        format_flags |= SerializeFlags::NO_CLUSTERS;
    }

    if args.no_positions {
        format_flags |= SerializeFlags::NO_POSITIONS;
    }

    if args.no_advances || args.ned {
        format_flags |= SerializeFlags::NO_ADVANCES;
    }

    if args.no_fonts {
        format_flags |= SerializeFlags::NO_FONTS;
    }

    println!("{}", rustyraqm::serialize(&glyphs, format_flags));
}

fn shape<M: NativeModule>(
    module: M,
    options: ShaperOptions,
    text: &str,
    fonts: &[FontSpec],
    args: &Args,
) -> Vec<rustyraqm::GlyphEntry> {
    let result = Shaper::with_options(module, options)
        .and_then(|mut shaper| shaper.shape_multi(text, fonts, &args.language, args.direction));

    match result {
        Ok(glyphs) => glyphs,
        Err(e) => {
            eprintln!("Error: {}.", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "wasm-shaper")]
fn shape_with_wasm(
    path: &PathBuf,
    options: ShaperOptions,
    text: &str,
    fonts: &[FontSpec],
    args: &Args,
) -> Vec<rustyraqm::GlyphEntry> {
    match rustyraqm::wasm::WasmModule::new(&read_file(path)) {
        Ok(module) => shape(module, options, text, fonts, args),
        Err(e) => {
            eprintln!("Error: {}.", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "wasm-shaper"))]
fn shape_with_wasm(
    _: &PathBuf,
    _: ShaperOptions,
    _: &str,
    _: &[FontSpec],
    _: &Args,
) -> Vec<rustyraqm::GlyphEntry> {
    eprintln!("Error: --wasm requires the `wasm-shaper` feature.");
    std::process::exit(1);
}

fn read_file(path: &PathBuf) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}.", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn parse_unicodes(s: &str) -> Result<String, String> {
    let mut text = String::new();
    for u in s.split(',') {
        let digits = u.strip_prefix("U+").unwrap_or(u);
        let u = u32::from_str_radix(digits, 16)
            .map_err(|_| format!("'{}' is not a valid codepoint", u))?;

        let c = char::try_from(u).map_err(|_| format!("{} is not a valid codepoint", u))?;

        text.push(c);
    }

    Ok(text)
}

fn parse_range(s: &str) -> Result<std::ops::Range<usize>, String> {
    let (start, end) = s.split_once(':').ok_or_else(|| format!("'{}' is not a range", s))?;
    let start = start.parse().map_err(|_| format!("'{}' is not a number", start))?;
    let end = end.parse().map_err(|_| format!("'{}' is not a number", end))?;
    Ok(start..end)
}

// "en_US.UTF-8" becomes "en-US"; the C locale has no language.
fn system_language() -> String {
    let locale = unsafe {
        libc::setlocale(libc::LC_ALL, b"\0" as *const _ as *const libc::c_char);
        let s = libc::setlocale(libc::LC_CTYPE, std::ptr::null());
        if s.is_null() {
            return String::new();
        }

        std::ffi::CStr::from_ptr(s).to_string_lossy().into_owned()
    };

    let tag = locale.split(['.', '@']).next().unwrap_or_default();
    match tag {
        "C" | "POSIX" => String::new(),
        tag => tag.replace('_', "-"),
    }
}
