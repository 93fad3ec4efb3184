//! Benchmark for the full text-to-sheet pipeline.

use criterion::{Criterion, Throughput};

use harpnote_rs::harp::render_sheet;

struct Tune {
    name: &'static str,
    source: String,
}

fn sample_tunes() -> Vec<Tune> {
    let mut long_melody = String::from("X:1\nM:4/4\nK:G\n");
    for _ in 0..48 {
        long_melody.push_str("|:GABc d2 e2|dcBA G4:|\n");
    }
    vec![
        Tune {
            name: "single_bar",
            source: "X:1\nM:4/4\nK:C\nCDEF|\n".to_owned(),
        },
        Tune {
            name: "two_voices_with_chords",
            source: "X:1\nM:4/4\nK:C\nV:1\n[CE]2 [DF]2|[EG]2 [FA]2|\nV:2\nC,2 D,2|E,2 F,2|\n"
                .to_owned(),
        },
        Tune {
            name: "long_melody_with_repeats",
            source: long_melody,
        },
    ]
}

fn bench_render_sheet(c: &mut Criterion) {
    let tunes = sample_tunes();
    let mut group = c.benchmark_group("render_sheet");

    for tune in tunes.iter() {
        group.throughput(Throughput::Bytes(tune.source.len() as u64));
        group.bench_function(tune.name, |b| {
            b.iter(|| render_sheet(std::hint::black_box(&tune.source), 0));
        });
    }

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default();
    bench_render_sheet(&mut criterion);
}
