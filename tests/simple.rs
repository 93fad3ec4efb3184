use harpnote_rs::harp::prelude::*;
use pretty_assertions::assert_eq;

#[test]
fn single_bar() {
    const SRC: &str = "X:1\nM:4/4\nK:C\nCDEF|\n";

    let RenderOutput {
        song,
        sheet,
        warnings,
        ..
    } = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(warnings, vec![]);

    let voice = song.voice(1).expect("voice 1 exists");
    let notes: Vec<(u8, Option<i64>)> = voice
        .playables()
        .map(|(_, p)| (p.pitch(), p.core().beat))
        .collect();
    assert_eq!(
        notes,
        vec![
            (60, Some(0)),
            (62, Some(24)),
            (64, Some(48)),
            (65, Some(72)),
        ]
    );

    let measure_starts = voice
        .entities()
        .filter(|(_, e)| matches!(e, MusicEntity::MeasureStart(_)))
        .count();
    assert_eq!(measure_starts, 1);

    // Flowlines connect the consecutive notes of the voice.
    let flowlines: Vec<&FlowLine> = sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::FlowLine(f) if f.style == LineStyle::Solid => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(flowlines.len(), 3);
    for line in &flowlines {
        assert!(line.from.y < line.to.y);
    }
}

#[test]
fn one_ellipse_per_note_with_origin_backrefs() {
    const SRC: &str = "X:1\nM:4/4\nK:C\nCDEF|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    let ellipses: Vec<&Ellipse> = output
        .sheet
        .drawables
        .iter()
        .filter_map(|d| match d {
            Drawable::Ellipse(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(ellipses.len(), 4);
    for ellipse in &ellipses {
        let entity_ref = ellipse.meta.origin.expect("heads point at their entity");
        assert_eq!(entity_ref.voice, 1);
    }
    // Eighth notes draw filled without a dot.
    assert!(ellipses.iter().all(|e| e.fill == FillStyle::Filled && !e.dotted));
}

#[test]
fn player_events_align_with_origins() {
    const SRC: &str = "X:1\nM:4/4\nK:C\nCDEF|\n";

    let output = render_sheet(SRC, 0).expect("SRC must render");
    assert_eq!(output.player_events.len(), 4);
    let voice = output.song.voice(1).expect("voice 1 exists");
    for event in &output.player_events {
        // Every event's char index falls inside some playable's origin.
        assert!(
            voice.playables().any(|(_, p)| {
                let origin = &p.core().origin;
                origin.start <= event.index && event.index < origin.end
            }),
            "event at char {} matches no origin",
            event.index
        );
    }
}
