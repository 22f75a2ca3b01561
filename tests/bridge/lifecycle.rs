use rustyraqm::host::HostModule;
use rustyraqm::{Direction, Error, FontSpec, MemoryMode, Shaper, ShaperOptions};

use crate::test_font::TestFont;

fn assert_clean(shaper: &Shaper) {
    assert_eq!(shaper.outstanding_allocations(), 0);
    assert_eq!(shaper.native().live_objects(), 0);
    assert_eq!(shaper.native().heap_in_use(), 0);
}

#[test]
fn no_leak_over_requests() {
    let font = TestFont::latin(1000, 500).build();
    let broken = &font[..40];
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    for _ in 0..25 {
        shaper.shape("Hello", &font, "en", Direction::LeftToRight).unwrap();
        assert_clean(&shaper);

        assert!(shaper.shape("Hello", broken, "en", Direction::LeftToRight).is_err());
        assert_clean(&shaper);

        let gap = [FontSpec::new("latin", &font).with_range(0..2)];
        assert!(shaper.shape_multi("Hello", &gap, "", Direction::Default).is_err());
        assert_clean(&shaper);
    }
}

#[test]
fn invalid_font() {
    let font = TestFont::latin(1000, 500).build();
    let mut shaper = Shaper::new(HostModule::new()).unwrap();

    // Keep something allocated so the count is not trivially zero.
    let kept = shaper.upload_font("kept", &font).unwrap();
    let before = shaper.outstanding_allocations();

    let specs = [
        FontSpec::new("good", &font).with_range(0..2),
        FontSpec::new("truncated", &font[..40]).with_range(2..5),
    ];
    match shaper.shape_multi("Hello", &specs, "", Direction::Default) {
        Err(Error::InvalidFont { key }) => assert_eq!(key, "truncated"),
        other => panic!("unexpected result: {:?}", other),
    }

    match shaper.shape("Hello", b"", "", Direction::Default) {
        Err(Error::InvalidFont { key }) => assert_eq!(key, "font"),
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(shaper.outstanding_allocations(), before);
    shaper.release_font_data(kept).unwrap();
    assert_clean(&shaper);
}

#[test]
fn unassigned_bytes_fail_layout() {
    let font = TestFont::latin(1000, 500).build();
    let specs = [FontSpec::new("latin", &font).with_range(0..3)];
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    assert!(matches!(
        shaper.shape_multi("abcdef", &specs, "", Direction::LeftToRight),
        Err(Error::LayoutFailed(_))
    ));
    assert_clean(&shaper);
}

#[test]
fn invalid_range() {
    let font = TestFont::latin(1000, 500).build();
    let mut shaper = Shaper::new(HostModule::new()).unwrap();

    let specs = [FontSpec::new("latin", &font).with_range(0..10)];
    assert!(matches!(
        shaper.shape_multi("abc", &specs, "", Direction::Default),
        Err(Error::InvalidRange { start: 0, len: 10, text_len: 3 })
    ));
    assert_clean(&shaper);

    // Splits a two-byte character.
    let specs = [FontSpec::new("latin", &font).with_range(0..1)];
    assert!(matches!(
        shaper.shape_multi("éa", &specs, "", Direction::Default),
        Err(Error::InvalidRange { .. })
    ));
    assert_clean(&shaper);
}

#[test]
fn growth_transparency() {
    let font = TestFont::latin(1000, 500).build();
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let before = shaper.shape("Growth", &font, "en", Direction::LeftToRight).unwrap();

    let pages = shaper.memory().pages();
    let filler = vec![0; 3 * 65536];
    let held = shaper.upload_font("filler", &filler).unwrap();
    assert!(shaper.memory().pages() > pages);

    let after = shaper.shape("Growth", &font, "en", Direction::LeftToRight).unwrap();
    assert_eq!(before, after);

    shaper.release_font_data(held).unwrap();
    assert_clean(&shaper);
}

#[test]
fn allocation_failure_releases_everything() {
    let font = TestFont::latin(1000, 500).build();
    let mut shaper = Shaper::new(HostModule::with_max_pages(2)).unwrap();

    // The text does not fit.
    let text = "a".repeat(200_000);
    assert!(matches!(
        shaper.shape(&text, &font, "", Direction::LeftToRight),
        Err(Error::AllocationFailed { size: 200_000 })
    ));
    assert_clean(&shaper);

    // The text fits, the native glyph array does not.
    let text = "a".repeat(10_000);
    assert!(matches!(
        shaper.shape(&text, &font, "", Direction::LeftToRight),
        Err(Error::LayoutFailed(_))
    ));
    assert_clean(&shaper);

    let glyphs = shaper.shape("fits", &font, "", Direction::LeftToRight).unwrap();
    assert_eq!(glyphs.len(), 4);
    assert_clean(&shaper);
}

#[test]
fn reserved_pages() {
    let options = ShaperOptions { reserve_pages: 400, ..ShaperOptions::default() };
    let shaper = Shaper::with_options(HostModule::new(), options).unwrap();
    assert_eq!(shaper.native().pages(), 402);

    let options = ShaperOptions { reserve_pages: 400, ..ShaperOptions::default() };
    assert!(matches!(
        Shaper::with_options(HostModule::with_max_pages(100), options),
        Err(Error::OutOfMemory { pages: 400 })
    ));
}

#[test]
fn memory_modes() {
    let font = TestFont::latin(1000, 500).build();
    let modes = [
        MemoryMode::Duplicate,
        MemoryMode::ReadOnly,
        MemoryMode::Writable,
        MemoryMode::ReadOnlyMayMakeWritable,
    ];

    let mut results = Vec::new();
    for memory_mode in modes {
        let options = ShaperOptions { memory_mode, ..ShaperOptions::default() };
        let mut shaper = Shaper::with_options(HostModule::new(), options).unwrap();
        results.push(shaper.shape("mode", &font, "", Direction::Default).unwrap());
        assert_clean(&shaper);
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn face_reused_across_sessions() {
    let font = TestFont::latin(1000, 500).build();
    let mut shaper = Shaper::new(HostModule::new()).unwrap();
    let data = shaper.upload_font("latin", &font).unwrap();
    let face = shaper.load_face(&data, 0).unwrap();
    assert_eq!(shaper.face_info(&face), (font_glyph_count(), 1000));

    for (text, scale) in [("ab", 1000), ("cd", 2000)] {
        let handle = shaper.create_font(&face, Some((scale, scale))).unwrap();
        let mut session = shaper.create_session().unwrap();
        shaper.set_text(&mut session, text).unwrap();
        shaper.assign_font_range(&mut session, &handle, 0, text.len()).unwrap();
        let ids = [handle.id()];
        shaper.destroy_font(handle).unwrap();
        shaper.set_direction(&mut session, Direction::LeftToRight).unwrap();
        shaper.set_language(&mut session, "en").unwrap();

        let glyphs = shaper.layout(&mut session).unwrap();
        let entries = shaper.decode(&glyphs, &ids, text).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|g| g.x_advance == scale / 2 && g.font_index == Some(0)));
        shaper.destroy_session(session).unwrap();
    }

    shaper.destroy_face(face).unwrap();
    shaper.release_font_data(data).unwrap();
    assert_clean(&shaper);
}

fn font_glyph_count() -> u32 {
    u32::from(TestFont::latin(1000, 500).glyph_count())
}
