use rustyraqm::host::HostModule;
use rustyraqm::{Direction, FontSpec, GlyphFlags, SerializeFlags, Shaper};

use crate::shape;
use crate::test_font::TestFont;

fn latin() -> Vec<u8> {
    TestFont::latin(1000, 500).build()
}

#[test]
fn basic_ltr() {
    assert_eq!(shape(&latin(), "ab", "--direction=ltr"), "66=0+500#0|67=1+500#0");
}

#[test]
fn no_clusters_no_fonts() {
    assert_eq!(shape(&latin(), "ab", "--no-clusters --no-fonts"), "66+500|67+500");
}

#[test]
fn no_advances() {
    assert_eq!(shape(&latin(), "abc", "--no-advances --no-fonts"), "66=0|67=1@500,0|68=2@1000,0");
}

#[test]
fn scaled() {
    assert_eq!(shape(&latin(), "a", "--scale=2000 --no-fonts"), "66=0+1000");
}

#[test]
fn missing_glyph() {
    let font = TestFont::latin(1000, 500).without('z').build();
    // .notdef is one em wide.
    assert_eq!(shape(&font, "az", "--no-fonts"), "66=0+500|0=1+1000");
}

#[test]
fn combining_mark_has_no_advance() {
    assert_eq!(shape(&latin(), "e\u{301}", "--no-fonts"), "70=0+500|97=1+0");
}

#[test]
fn rtl_reorders() {
    assert_eq!(
        shape(&latin(), "\u{5D0}\u{5D1}\u{5D2}", "--direction=rtl --no-fonts --no-positions"),
        "100=4|99=2|98=0"
    );
}

#[test]
fn rtl_mirrors() {
    assert_eq!(shape(&latin(), "(\u{5D0})", "--direction=rtl --no-fonts"), "9=3+500|98=1+500|10=0+500");
}

#[test]
fn mixed_ltr_paragraph() {
    assert_eq!(
        shape(&latin(), "ab \u{5D0}\u{5D1}", "--direction=ltr --no-fonts --no-positions"),
        "66=0|67=1|1=2|99=5|98=3"
    );
}

#[test]
fn default_direction_from_text() {
    assert_eq!(
        shape(&latin(), "\u{5D0}\u{5D1}", "--no-fonts --no-positions"),
        "99=2|98=0"
    );
    assert_eq!(shape(&latin(), "ab", "--no-fonts --no-positions"), "66=0|67=1");
}

#[test]
fn vertical() {
    assert_eq!(shape(&latin(), "ab", "--direction=ttb --no-fonts"), "66=0+0,-1000|67=1+0,-1000");
}

#[test]
fn ascii_round_trip() {
    let text = "Hello, World! 0123456789 ~{}";
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let mut glyphs = shaper.shape(text, &latin(), "en", Direction::LeftToRight).unwrap();
    glyphs.sort_by_key(|g| g.cluster);
    let chars: String = glyphs.iter().map(|g| g.source_char.unwrap()).collect();
    assert_eq!(chars, text);
    assert!(glyphs.iter().all(|g| g.is_resolved()));
}

#[test]
fn range_assignment() {
    let first = TestFont::latin(1000, 500).build();
    let second = TestFont::latin(1000, 600).build();
    let text = "abcdefghij";
    let specs = [
        FontSpec::new("first", &first).with_range(0..3),
        FontSpec::new("second", &second).with_range(3..10),
    ];

    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let glyphs = shaper.shape_multi(text, &specs, "", Direction::LeftToRight).unwrap();
    assert_eq!(glyphs.len(), 10);
    for glyph in &glyphs {
        if glyph.cluster < 3 {
            assert_eq!(glyph.font_index, Some(0));
            assert_eq!(glyph.x_advance, 500);
        } else {
            assert_eq!(glyph.font_index, Some(1));
            assert_eq!(glyph.x_advance, 600);
        }
    }

    assert_eq!(
        rustyraqm::serialize(&glyphs[2..4], SerializeFlags::NO_POSITIONS),
        "68=2#0|69=3#1"
    );
}

#[test]
fn later_ranges_override() {
    let first = TestFont::latin(1000, 500).build();
    let second = TestFont::latin(1000, 600).build();
    let specs = [
        FontSpec::new("first", &first),
        FontSpec::new("second", &second).with_range(1..2),
    ];

    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let glyphs = shaper.shape_multi("abc", &specs, "", Direction::LeftToRight).unwrap();
    let fonts: Vec<_> = glyphs.iter().map(|g| g.font_index).collect();
    assert_eq!(fonts, [Some(0), Some(1), Some(0)]);
}

#[test]
fn ltr_is_deterministic() {
    let font = latin();
    let text = "The quick brown fox";
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let first = shaper.shape(text, &font, "en", Direction::LeftToRight).unwrap();
    let second = shaper.shape(text, &font, "en", Direction::LeftToRight).unwrap();
    assert_eq!(first, second);
}

#[test]
fn unknown_font_handle() {
    let font = latin();
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let data = shaper.upload_font("latin", &font).unwrap();
    let face = shaper.load_face(&data, 0).unwrap();
    let handle = shaper.create_font(&face, None).unwrap();
    let mut session = shaper.create_session().unwrap();
    shaper.set_text(&mut session, "ab").unwrap();
    shaper.assign_font_range(&mut session, &handle, 0, 2).unwrap();

    let glyphs = shaper.layout(&mut session).unwrap();
    assert_eq!(glyphs.len(), 2);
    // Decoding against a list that lacks the font flags every entry.
    let entries = shaper.decode(&glyphs, &[], "ab").unwrap();
    assert!(entries.iter().all(|g| g.flags == GlyphFlags::UNRESOLVED_FONT));
    assert_eq!(rustyraqm::serialize(&entries, SerializeFlags::NO_POSITIONS), "66=0#-1|67=1#-1");

    let entries = shaper.decode(&glyphs, &[handle.id()], "ab").unwrap();
    assert!(entries.iter().all(|g| g.is_resolved()));

    shaper.destroy_session(session).unwrap();
    shaper.destroy_font(handle).unwrap();
    shaper.destroy_face(face).unwrap();
    shaper.release_font_data(data).unwrap();
    assert_eq!(shaper.native().heap_in_use(), 0);
}
