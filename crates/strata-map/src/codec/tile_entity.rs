use super::int_value;
use crate::chunk::SignEntity;

use quartz_nbt::{NbtCompound, NbtTag};
use serde_json::Value;

const SIGN_IDS: [&str; 2] = ["Sign", "minecraft:sign"];
const SIGN_TEXT_KEYS: [&str; 4] = ["Text1", "Text2", "Text3", "Text4"];

/// Collects every sign from the "TileEntities" list. Other tile entity kinds are skipped.
pub(super) fn decode_signs(level: &NbtCompound) -> Vec<SignEntity> {
    let entities = match level.inner().get("TileEntities") {
        Some(NbtTag::List(list)) => list,
        _ => return Vec::new(),
    };

    entities
        .iter()
        .filter_map(|tag| match tag {
            NbtTag::Compound(entity) => decode_sign(entity),
            _ => None,
        })
        .collect()
}

fn decode_sign(entity: &NbtCompound) -> Option<SignEntity> {
    let id = match entity.inner().get("id") {
        Some(NbtTag::String(id)) => id.as_str(),
        _ => return None,
    };
    if !SIGN_IDS.contains(&id) {
        return None;
    }

    let coord = |name: &str| entity.inner().get(name).and_then(int_value).map(|v| v as i32);
    let mut sign = SignEntity {
        x: coord("x")?,
        y: coord("y")?,
        z: coord("z")?,
        ..Default::default()
    };
    for (line, key) in sign.text.iter_mut().zip(SIGN_TEXT_KEYS) {
        if let Some(NbtTag::String(raw)) = entity.inner().get(key) {
            *line = plain_text(raw);
        }
    }
    Some(sign)
}

/// Newer saves store sign lines as JSON text components. Flattens those to the visible text; anything that does not
/// parse as JSON is taken verbatim.
pub fn plain_text(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('"') || trimmed.starts_with('[') || trimmed == "null") {
        return raw.to_owned();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => {
            let mut out = String::new();
            collect_text(&value, &mut out);
            out
        }
        Err(_) => raw.to_owned(),
    }
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(parts) => parts.iter().for_each(|p| collect_text(p, out)),
        Value::Object(component) => {
            if let Some(text) = component.get("text") {
                collect_text(text, out);
            }
            if let Some(extra) = component.get("extra") {
                collect_text(extra, out);
            }
        }
        _ => {}
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_components_flatten_to_text() {
        assert_eq!(plain_text(r#"{"text":"Spawn"}"#), "Spawn");
        assert_eq!(plain_text(r#"{"text":"","extra":[{"text":"A"},"B"]}"#), "AB");
        assert_eq!(plain_text(r#""quoted""#), "quoted");
        assert_eq!(plain_text("null"), "");
    }

    #[test]
    fn plain_lines_pass_through() {
        assert_eq!(plain_text("Welcome home"), "Welcome home");
        assert_eq!(plain_text("{broken"), "{broken");
        assert_eq!(plain_text(""), "");
    }
}
