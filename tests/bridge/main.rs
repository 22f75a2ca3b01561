mod layout;
mod lifecycle;
#[path = "../../src/test_font.rs"]
mod test_font;

use rustyraqm::host::HostModule;
use rustyraqm::{Direction, FontSpec, SerializeFlags, Shaper};

struct Args {
    direction: Option<Direction>,
    language: Option<String>,
    scale: Option<i32>,
    no_clusters: bool,
    no_positions: bool,
    no_advances: bool,
    no_fonts: bool,
}

fn parse_args(args: Vec<std::ffi::OsString>) -> Result<Args, pico_args::Error> {
    let mut parser = pico_args::Arguments::from_vec(args);
    let args = Args {
        direction: parser.opt_value_from_str("--direction")?,
        language: parser.opt_value_from_str("--language")?,
        scale: parser.opt_value_from_str("--scale")?,
        no_clusters: parser.contains("--no-clusters"),
        no_positions: parser.contains("--no-positions"),
        no_advances: parser.contains("--no-advances"),
        no_fonts: parser.contains("--no-fonts"),
    };

    Ok(args)
}

fn serialize_flags(args: &Args) -> SerializeFlags {
    let mut flags = SerializeFlags::default();
    flags.set(SerializeFlags::NO_CLUSTERS, args.no_clusters);
    flags.set(SerializeFlags::NO_POSITIONS, args.no_positions);
    flags.set(SerializeFlags::NO_ADVANCES, args.no_advances);
    flags.set(SerializeFlags::NO_FONTS, args.no_fonts);
    flags
}

/// Shapes `text` with one font on a fresh shaper and serializes the result.
///
/// Also checks that the request left nothing behind.
pub fn shape(font: &[u8], text: &str, options: &str) -> String {
    let args = options
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(std::ffi::OsString::from)
        .collect();
    let args = parse_args(args).unwrap();

    let mut spec = FontSpec::new("test", font);
    if let Some(scale) = args.scale {
        spec = spec.with_scale(scale, scale);
    }

    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let glyphs = shaper
        .shape_multi(
            text,
            &[spec],
            args.language.as_deref().unwrap_or(""),
            args.direction.unwrap_or_default(),
        )
        .unwrap();

    assert_eq!(shaper.outstanding_allocations(), 0);
    assert_eq!(shaper.native().live_objects(), 0);
    assert_eq!(shaper.native().heap_in_use(), 0);

    rustyraqm::serialize(&glyphs, serialize_flags(&args))
}
