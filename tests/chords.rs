use harpnote_rs::harp::prelude::*;
use pretty_assertions::assert_eq;

#[test]
fn chord_is_one_synch_point() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n[CEG]2|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);

    let voice = output.song.voice(1).expect("voice 1 exists");
    let synch = voice
        .entities()
        .find_map(|(_, e)| match e {
            MusicEntity::SynchPoint(s) => Some(s),
            _ => None,
        })
        .expect("a synch point");
    assert_eq!(synch.notes.len(), 3);
    assert_eq!(synch.core().beat, Some(0));
    assert!(synch.notes.iter().all(|n| n.core.beat == Some(0)));
}

#[test]
fn chord_heads_order_by_pitch_and_share_a_synchline() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n[CEG]2|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");

    let heads: Vec<&Ellipse> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::Ellipse(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(heads.len(), 3);
    // Same beat, ascending strings.
    assert!(heads.windows(2).all(|w| w[0].center.x < w[1].center.x));
    assert!(heads.windows(2).all(|w| (w[0].center.y - w[1].center.y).abs() < 1e-9));

    let synchlines: Vec<&FlowLine> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::FlowLine(f) if f.style == LineStyle::Dashed => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(synchlines.len(), 1);
    let line = synchlines[0];
    assert!((line.from.x - heads[0].center.x).abs() < 1e-9);
    assert!((line.to.x - heads[2].center.x).abs() < 1e-9);
}

#[test]
fn half_note_chord_draws_empty_heads() {
    const SRC: &str = "X:1\nM:4/4\nL:1/4\nK:C\n[CE]2 [FG]2|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    let heads: Vec<&Ellipse> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::Ellipse(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(heads.len(), 4);
    assert!(heads.iter().all(|e| e.fill == FillStyle::Empty));
}
