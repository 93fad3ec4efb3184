use harpnote_rs::harp::prelude::*;
use pretty_assertions::assert_eq;

const SRC: &str = "X:1\nM:4/4\nL:1/4\nK:C\nC2 z2 G2|\n";

fn rest_of(song: &Song) -> Pause {
    song.voice(1)
        .expect("voice 1 exists")
        .entities()
        .find_map(|(_, e)| match e {
            MusicEntity::Pause(p) => Some(p.clone()),
            _ => None,
        })
        .expect("a rest")
}

#[test]
fn rest_centers_between_its_neighbors() {
    let output = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);
    // Between C4 (60) and G4 (67) the rest sits on 63.
    assert_eq!(rest_of(&output.song).pitch, 63);
}

#[test]
fn rest_positioning_follows_the_configuration() {
    for (mode, expected) in [("previous", 60), ("next", 67), ("center", 63)] {
        let mut conf = defaults::stack_with_defaults();
        conf.set("restposition.default", Value::from(mode))
            .expect("path is addressable");
        let mut backend = SubsetBackend;
        let output = render_sheet_with(&mut conf, &mut backend, SRC, 0).expect("SRC must render");
        assert_eq!(rest_of(&output.song).pitch, expected, "restposition={mode}");
    }
}

#[test]
fn rest_renders_as_a_glyph_on_its_inferred_string() {
    let output = render_sheet(SRC, 0).expect("SRC must render");
    let glyph = output
        .sheet
        .drawables
        .iter()
        .find_map(|d| match d {
            Drawable::Glyph(g) => Some(g),
            _ => None,
        })
        .expect("a rest glyph");
    // A half rest on the bucket grid.
    assert_eq!(glyph.glyph, GlyphKey::Rest2);
    // Pitch 63: the x of the inferred string.
    let expected_x = (63.0 - 43.0) * 11.5 + 2.8;
    assert!((glyph.center.x - expected_x).abs() < 1e-9);
}

#[test]
fn whole_measure_rest_uses_the_meter() {
    const MEASURE_REST: &str = "X:1\nM:3/4\nK:C\nC D E|Z|F G A|\n";
    let output = render_sheet(MEASURE_REST, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);
    let rest = rest_of(&output.song);
    // Three quarters on the 64th grid.
    assert_eq!(rest.core.duration, 48);
}
