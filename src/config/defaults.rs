//! The built-in bottom configuration layer.
//!
//! Pushed once at startup; everything the engine reads has a value here, so
//! later layers only ever override. Two entries are deferred: the string-name
//! row and the pitch offset are both derived from the active `instrument`,
//! and stay correct when a later layer switches the instrument.

use super::{ConfigError, Result, stack::ConfigStack, value::Value};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Reads the preset entry of the currently configured instrument.
fn active_preset(stack: &ConfigStack) -> Result<Value> {
    let instrument = stack
        .get("instrument")?
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default();
    stack
        .get(&format!("presets.{instrument}"))?
        .ok_or_else(|| ConfigError::DeferredFailed {
            message: format!("unknown instrument `{instrument}`"),
        })
}

/// String names of the active instrument, lowest string first,
/// space-separated: `"G G# A A# B C …"`.
fn derived_stringnames(stack: &ConfigStack) -> Result<Value> {
    let preset = active_preset(stack)?;
    let base = preset.at("base_pitch").and_then(Value::as_i64).unwrap_or(43);
    let count = preset.at("strings").and_then(Value::as_i64).unwrap_or(25);
    let names = (0..count)
        .map(|string| NOTE_NAMES[((base + string).rem_euclid(12)) as usize])
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Value::from(names))
}

/// The pitch offset placing the lowest string of the active instrument on
/// strip 0.
fn derived_pitch_offset(stack: &ConfigStack) -> Result<Value> {
    let preset = active_preset(stack)?;
    let base = preset.at("base_pitch").and_then(Value::as_i64).unwrap_or(43);
    Ok(Value::Int(-base))
}

fn preset(base_pitch: i64, strings: i64) -> Value {
    Value::table([
        ("base_pitch", Value::Int(base_pitch)),
        ("strings", Value::Int(strings)),
    ])
}

fn layout_defaults() -> Value {
    Value::table([
        ("limit_a3", Value::Bool(true)),
        ("bottomup", Value::Bool(false)),
        ("beams", Value::Bool(false)),
        ("LINE_THIN", Value::Float(0.1)),
        ("LINE_MEDIUM", Value::Float(0.3)),
        ("LINE_THICK", Value::Float(0.5)),
        ("ELLIPSE_SIZE", Value::list([Value::Float(3.5), Value::Float(1.7)])),
        ("REST_SIZE", Value::list([Value::Float(4.0), Value::Float(2.0)])),
        ("X_SPACING", Value::Float(11.5)),
        ("X_OFFSET", Value::Float(2.8)),
        ("PITCH_OFFSET", Value::lazy(derived_pitch_offset)),
        ("Y_SCALE", Value::Float(4.0)),
        ("DRAWING_AREA_SIZE", Value::list([Value::Float(400.0), Value::Float(282.0)])),
        ("jumpline_anchor", Value::list([Value::Float(3.5), Value::Float(1.0)])),
        (
            "color",
            Value::table([
                ("color_default", Value::from("black")),
                ("color_variant1", Value::from("grey")),
                ("color_variant2", Value::from("dimgrey")),
            ]),
        ),
        (
            "packer",
            Value::table([
                ("pack_method", Value::Int(0)),
                ("pack_max_spreadfactor", Value::Float(2.0)),
                ("pack_min_increment", Value::Float(0.2)),
            ]),
        ),
    ])
}

fn extract_zero() -> Value {
    Value::table([
        ("title", Value::from("alles")),
        ("voices", Value::list([1, 2, 3, 4].map(Value::Int))),
        ("flowlines", Value::list([1, 3].map(Value::Int))),
        ("subflowlines", Value::list([2, 4].map(Value::Int))),
        (
            "synchlines",
            Value::list([
                Value::list([Value::Int(1), Value::Int(2)]),
                Value::list([Value::Int(3), Value::Int(4)]),
            ]),
        ),
        ("jumplines", Value::list([1, 3].map(Value::Int))),
        ("layoutlines", Value::list([1, 2, 3, 4].map(Value::Int))),
        (
            "barnumbers",
            Value::table([
                ("voices", Value::List(Vec::new())),
                ("pos", Value::list([Value::Float(6.0), Value::Float(-4.0)])),
                ("prefix", Value::from("")),
            ]),
        ),
        (
            "countnotes",
            Value::table([
                ("voices", Value::List(Vec::new())),
                ("pos", Value::list([Value::Float(3.0), Value::Float(-2.0)])),
            ]),
        ),
        (
            "stringnames",
            Value::table([
                ("text", Value::lazy(derived_stringnames)),
                ("vpos", Value::List(Vec::new())),
                ("style", Value::from("small")),
            ]),
        ),
        ("notes", Value::Table(Default::default())),
        ("layout", layout_defaults()),
    ])
}

/// Builds the complete default layer.
#[must_use]
pub fn default_layer() -> Value {
    Value::table([
        ("instrument", Value::from("25-strings-g-g")),
        (
            "presets",
            Value::table([
                ("25-strings-g-g", preset(43, 25)),
                ("21-strings-a-f", preset(45, 21)),
                ("37-strings-g-g", preset(43, 37)),
            ]),
        ),
        ("shortest_note", Value::Int(64)),
        (
            "restposition",
            Value::table([
                ("default", Value::from("center")),
                ("repeatend", Value::from("center")),
            ]),
        ),
        (
            "defaults",
            Value::table([(
                "notebound",
                Value::table([
                    (
                        "annotation",
                        Value::table([("pos", Value::list([Value::Float(5.0), Value::Float(-7.0)]))]),
                    ),
                    (
                        "partname",
                        Value::table([("pos", Value::list([Value::Float(-4.0), Value::Float(-7.0)]))]),
                    ),
                    (
                        "variantend",
                        Value::table([("pos", Value::list([Value::Float(-4.0), Value::Float(-7.0)]))]),
                    ),
                ]),
            )]),
        ),
        (
            "annotations",
            Value::table([
                (
                    "vt",
                    Value::table([
                        ("text", Value::from("v.t.")),
                        ("pos", Value::list([Value::Float(-1.0), Value::Float(-6.0)])),
                    ]),
                ),
                (
                    "vr",
                    Value::table([
                        ("text", Value::from("v.r.")),
                        ("pos", Value::list([Value::Float(2.0), Value::Float(-3.0)])),
                    ]),
                ),
                (
                    "vl",
                    Value::table([
                        ("text", Value::from("v.l.")),
                        ("pos", Value::list([Value::Float(-4.0), Value::Float(-3.0)])),
                    ]),
                ),
            ]),
        ),
        ("extract", Value::table([("0", extract_zero())])),
    ])
}

/// A stack with the default layer already pushed.
#[must_use]
pub fn stack_with_defaults() -> ConfigStack {
    let mut stack = ConfigStack::new();
    stack
        .push(default_layer())
        .expect("the default layer is a table");
    stack
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn stringnames_follow_the_instrument() {
        let mut stack = stack_with_defaults();
        let names = stack
            .get("extract.0.stringnames.text")
            .expect("defaults resolve")
            .expect("present");
        let names = names.as_str().expect("a string");
        assert!(names.starts_with("G G# A"));
        assert_eq!(names.split(' ').count(), 25);

        stack
            .set("instrument", Value::from("21-strings-a-f"))
            .expect("path is addressable");
        let names = stack
            .get("extract.0.stringnames.text")
            .expect("defaults resolve")
            .expect("present");
        assert!(names.as_str().expect("a string").starts_with("A A# B"));
    }

    #[test]
    fn pitch_offset_tracks_the_preset() {
        let stack = stack_with_defaults();
        assert_eq!(
            stack
                .get("extract.0.layout.PITCH_OFFSET")
                .expect("defaults resolve"),
            Some(Value::Int(-43))
        );
    }
}
