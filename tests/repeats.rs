use harpnote_rs::harp::prelude::*;
use pretty_assertions::assert_eq;

fn gotos(song: &Song) -> Vec<Goto> {
    song.voice(1)
        .expect("voice 1 exists")
        .entities()
        .filter_map(|(_, e)| match e {
            MusicEntity::Goto(g) => Some(g.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn simple_repeat() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n|:CDEF:|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);

    let song = &output.song;
    let voice = song.voice(1).expect("voice 1 exists");
    let jumps = gotos(song);
    assert_eq!(jumps.len(), 1);
    assert!(jumps[0].policy.is_repeat);
    assert_eq!(jumps[0].policy.distance, 2);
    let from = voice.playable(jumps[0].from).expect("from is playable");
    let to = voice.playable(jumps[0].to).expect("to is playable");
    assert_eq!((from.pitch(), to.pitch()), (65, 60));
}

#[test]
fn jumpline_arrowhead_sits_on_the_line_end() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n|:CDEF:|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    let thick: Vec<&Path> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::Path(p) if p.meta.line_width >= 0.5 => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(thick.len(), 2, "one jump run and one arrowhead");

    let run = thick.iter().find(|p| !p.filled).expect("the jump run");
    let arrow = thick.iter().find(|p| p.filled).expect("the arrowhead");

    // Walk the relative run to its end point.
    let PathCommand::Move(start) = run.commands[0] else {
        panic!("run must start with a move");
    };
    let end = run.commands[1..]
        .iter()
        .fold(start, |at, command| match command {
            PathCommand::LineBy(delta) => at.offset(delta.x, delta.y),
            _ => at,
        });
    let PathCommand::Move(apex) = arrow.commands[0] else {
        panic!("arrowhead must start with its apex");
    };
    assert!((apex.x - end.x).abs() < 1e-9 && (apex.y - end.y).abs() < 1e-9);
}

#[test]
fn variant_endings() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n|:CD|1 EF:|2 GA|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);

    let song = &output.song;
    let voice = song.voice(1).expect("voice 1 exists");
    let pitches: Vec<u8> = voice.playables().map(|(_, p)| p.pitch()).collect();
    assert_eq!(pitches, vec![60, 62, 64, 65, 67, 69]);

    let jumps = gotos(song);
    assert_eq!(jumps.len(), 3);
    let pitch_of =
        |index: EntityIndex| voice.playable(index).expect("endpoint is playable").pitch();

    let repeat = jumps.iter().find(|g| g.policy.is_repeat).expect("the repeat jump");
    assert_eq!((pitch_of(repeat.from), pitch_of(repeat.to)), (65, 60));

    let variant_jumps: Vec<(u8, u8)> = jumps
        .iter()
        .filter(|g| !g.policy.is_repeat)
        .map(|g| (pitch_of(g.from), pitch_of(g.to)))
        .collect();
    // Both bracket openings are reached from the common close on D.
    assert!(variant_jumps.contains(&(62, 64)));
    assert!(variant_jumps.contains(&(62, 67)));

    // The variant ordinals mark the bracket openers.
    let variants: Vec<Option<u32>> = voice
        .playables()
        .map(|(_, p)| p.core().variant)
        .collect();
    assert_eq!(variants, vec![None, None, Some(1), None, Some(2), None]);

    // Each jump renders as a run plus an arrowhead.
    let thick_paths = output
        .sheet
        .drawables
        .iter()
        .filter(|d| matches!(d, Drawable::Path(p) if p.meta.line_width >= 0.5))
        .count();
    assert_eq!(thick_paths, 6);
}

#[test]
fn repeat_distance_overrides_by_conf_key() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n|:CDEF:|\n";

    let corridor_dx = |output: &RenderOutput| {
        output
            .sheet
            .drawables
            .iter()
            .find_map(|d| match d {
                Drawable::Path(p) if p.meta.line_width >= 0.5 && !p.filled => {
                    match p.commands[1] {
                        PathCommand::LineBy(delta) => Some(delta.x),
                        _ => None,
                    }
                }
                _ => None,
            })
            .expect("a jump run")
    };

    let plain = render_sheet(SRC, 0).expect("SRC must render");
    let jump = gotos(&plain.song).pop().expect("one goto");
    let conf_key = jump.policy.conf_key.expect("repeat jumps carry a conf key");

    let mut conf = defaults::stack_with_defaults();
    conf.set(
        &format!("extract.0.{conf_key}.distance"),
        Value::Int(5),
    )
    .expect("path is addressable");
    let mut backend = SubsetBackend;
    let overridden = render_sheet_with(&mut conf, &mut backend, SRC, 0).expect("SRC must render");

    assert!(
        corridor_dx(&overridden) > corridor_dx(&plain),
        "a larger distance pushes the corridor further out"
    );
}

#[test]
fn bar_annotation_overrides_repeat_distance() {
    const SRC: &str = "X:1\nM:4/4\nK:C\n|:CDEF\"@@4\":|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(output.warnings, vec![]);
    let jumps = gotos(&output.song);
    assert_eq!(jumps.len(), 1);
    assert_eq!(jumps[0].policy.distance, 4);
}
