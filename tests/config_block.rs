use harpnote_rs::harp::prelude::*;
use pretty_assertions::assert_eq;

#[test]
fn embedded_block_steers_the_layout() {
    const PLAIN: &str = "X:1\nM:4/4\nK:C\nCD|\n";
    const TUNED: &str = "X:1\nM:4/4\nK:C\nCD|\n%%%%zupfnoter.config\n\
        {\"extract\": {\"0\": {\"layout\": {\"X_SPACING\": 23.0}}}}";

    let head_xs = |output: &RenderOutput| -> Vec<f64> {
        output
            .sheet
            .drawables
            .iter()
            .filter_map(|d| match d {
                Drawable::Ellipse(e) => Some(e.center.x),
                _ => None,
            })
            .collect()
    };

    let plain = render_sheet(PLAIN, 0).expect("must render");
    let tuned = render_sheet(TUNED, 0).expect("must render");
    assert_eq!(tuned.warnings, vec![]);
    let (plain_xs, tuned_xs) = (head_xs(&plain), head_xs(&tuned));
    assert_eq!(plain_xs.len(), 2);
    // Doubling the spacing widens the gap between the two strings.
    assert!((tuned_xs[1] - tuned_xs[0]) > (plain_xs[1] - plain_xs[0]));
}

#[test]
fn the_save_format_roundtrips_through_split() {
    const MUSIC: &str = "X:1\nM:4/4\nK:C\nCD|\n";
    let saved = format!("{MUSIC}{CONFIG_SEPARATOR}\n{{\"instrument\": \"21-strings-a-f\"}}");

    let (music, block) = split_source(&saved);
    assert_eq!(music, MUSIC);
    let block = block.expect("the block is present");
    assert!(block.contains("21-strings-a-f"));
}

#[test]
fn extract_selection_changes_the_footer() {
    const SRC: &str = "X:1\nM:4/4\nK:C\nCD|\n%%%%zupfnoter.config\n\
        {\"extract\": {\"1\": {\"title\": \"Melodie\"}}}";

    let footer_of = |output: &RenderOutput| -> String {
        output
            .sheet
            .drawables
            .iter()
            .filter_map(|d| match d {
                Drawable::Annotation(a) if a.style == TextStyle::Smaller => Some(a.text.clone()),
                _ => None,
            })
            .next_back()
            .expect("a footer")
    };

    let zero = render_sheet(SRC, 0).expect("must render");
    let one = render_sheet(SRC, 1).expect("must render");
    assert!(footer_of(&zero).starts_with("alles ["));
    assert!(footer_of(&one).starts_with("Melodie ["));
    // Extract 1 inherits everything else from extract 0.
    assert_eq!(zero.sheet.active_voices, one.sheet.active_voices);
}

#[test]
fn notebound_position_overrides_by_znid() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n\"!Hi\"C D|\n";

    let annotation_pos = |output: &RenderOutput| -> Point {
        output
            .sheet
            .drawables
            .iter()
            .find_map(|d| match d {
                Drawable::Annotation(a) if a.text == "Hi" => Some(a.position),
                _ => None,
            })
            .expect("the Hi annotation")
    };

    let plain = render_sheet(SRC, 0).expect("must render");
    // Find the conf key the transformer attached.
    let voice_entities = plain.song.voice(1).expect("voice 1 exists");
    let conf_key = voice_entities
        .entities()
        .find_map(|(_, e)| match e {
            MusicEntity::NoteBoundAnnotation(a) if a.text == "Hi" => a.conf_key.clone(),
            _ => None,
        })
        .expect("annotation carries a conf key");

    let mut conf = defaults::stack_with_defaults();
    conf.set(
        &format!("extract.0.{conf_key}.pos"),
        Value::list([Value::Float(0.0), Value::Float(12.0)]),
    )
    .expect("path is addressable");
    let mut backend = SubsetBackend;
    let moved = render_sheet_with(&mut conf, &mut backend, SRC, 0).expect("must render");

    let before = annotation_pos(&plain);
    let after = annotation_pos(&moved);
    assert!((after.y - before.y).abs() > 1.0, "override must move the text");
}
