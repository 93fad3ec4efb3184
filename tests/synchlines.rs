use harpnote_rs::harp::prelude::*;
use pretty_assertions::assert_eq;

const SRC: &str = "X:1\nM:4/4\nK:C\nV:1\nCDEF|\nV:2\nGABc|\n";

#[test]
fn two_voices_pair_up_by_beat() {
    // Keep only the cross-voice synchlines dashed: voice 2 gets plain
    // flowlines for this test.
    let mut conf = defaults::stack_with_defaults();
    conf.set("extract.0.subflowlines", Value::List(Vec::new()))
        .expect("path is addressable");
    conf.set(
        "extract.0.flowlines",
        Value::list([Value::Int(1), Value::Int(2)]),
    )
    .expect("path is addressable");
    let mut backend = SubsetBackend;
    let output = render_sheet_with(&mut conf, &mut backend, SRC, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);

    let dashed: Vec<&FlowLine> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::FlowLine(f) if f.style == LineStyle::Dashed => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(dashed.len(), 4, "one synchline per shared beat");
    // Voice 1 sits left of voice 2 (lower pitches), so every synchline
    // runs to the right.
    for line in &dashed {
        assert!(line.from.x < line.to.x);
    }
}

#[test]
fn synchlines_pair_nearest_pitches_of_chords() {
    const CHORDS: &str = "X:1\nM:4/4\nL:1/4\nK:C\nV:1\n[CEG]4|\nV:2\n[ce]4|\n";

    let output = render_sheet(CHORDS, 0).expect("SRC must render");
    let cross: Vec<&FlowLine> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::FlowLine(f) if f.style == LineStyle::Dashed => Some(f),
            _ => None,
        })
        .collect();
    // Two chord synchlines plus one cross-voice line.
    assert_eq!(cross.len(), 3);
    // The cross-voice line joins G4 (67) with c5 (72): the closest pair.
    let g_x = (67.0 - 43.0) * 11.5 + 2.8;
    let c_x = (72.0 - 43.0) * 11.5 + 2.8;
    assert!(
        cross.iter().any(|line| {
            (line.from.x - g_x).abs() < 1e-9 && (line.to.x - c_x).abs() < 1e-9
        }),
        "expected a line from G to c"
    );
}

#[test]
fn voices_without_synchline_configuration_stay_apart() {
    let mut conf = defaults::stack_with_defaults();
    conf.set("extract.0.synchlines", Value::List(Vec::new()))
        .expect("path is addressable");
    conf.set("extract.0.subflowlines", Value::List(Vec::new()))
        .expect("path is addressable");
    let mut backend = SubsetBackend;
    let output = render_sheet_with(&mut conf, &mut backend, SRC, 0).expect("SRC must render");
    let dashed = output
        .sheet
        .drawables
        .iter()
        .filter(|d| matches!(d, Drawable::FlowLine(f) if f.style == LineStyle::Dashed))
        .count();
    assert_eq!(dashed, 0);
}
