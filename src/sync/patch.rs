//! Preset compatibility patching.
//!
//! Segment bounds in a preset are absolute LED indices of the strip the
//! preset was recorded on. Before pushing a preset document to another
//! device, every non-zero segment `stop` is rebased onto the target's LED
//! count. A `stop` of `0` means "to the end of the strip" and is kept.

use serde_json::Value;

/// Key of the segment array inside a preset.
pub const SEGMENTS_KEY: &str = "seg";

/// Key of the end index inside a segment.
pub const STOP_KEY: &str = "stop";

/// Rewrite every non-zero 32-bit integer `stop` in `presets` to `led_count`.
///
/// Walks `<preset id> -> "seg" -> [segment] -> "stop"`. Everything else,
/// including key order, is left as is. Returns the number of values
/// rewritten.
pub fn patch_presets(presets: &mut Value, led_count: u64) -> usize {
    let Some(presets) = presets.as_object_mut() else {
        return 0;
    };

    let mut patched = 0;
    for preset in presets.values_mut() {
        let Some(segments) = preset
            .as_object_mut()
            .and_then(|p| p.get_mut(SEGMENTS_KEY))
            .and_then(Value::as_array_mut)
        else {
            continue;
        };

        for segment in segments.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(stop) = segment.get_mut(STOP_KEY) {
                if is_nonzero_integer(stop) {
                    *stop = Value::from(led_count);
                    patched += 1;
                }
            }
        }
    }
    patched
}

/// Only values that fit an `i32` count as LED indices.
fn is_nonzero_integer(value: &Value) -> bool {
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .is_some_and(|v| v != 0)
}
