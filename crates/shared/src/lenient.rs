//! Forgiving field decoders for generated report content. A field that is present but
//! `null` or of the wrong type decodes to its default instead of failing the whole body.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

/// Upper bound for every score the backend reports.
const MAX_SCORE: u8 = 100;

pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Accepts integers, floats and numeric strings. Anything else reads as zero.
pub fn score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
        .unwrap_or_default())
}

/// A list of strings. A lone string becomes a one-item list; nulls are dropped.
pub fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_to_text).collect(),
        other => value_to_text(other).into_iter().collect(),
    })
}

/// A whole section. Falls back to the default when it cannot be decoded.
pub fn section<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(T::deserialize(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// A list of sections. Entries that cannot be decoded are skipped.
pub fn items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries
            .into_iter()
            .filter(|entry| !entry.is_null())
            .filter_map(|entry| T::deserialize(entry).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Sample {
        #[serde(deserialize_with = "super::text")]
        title: String,
        #[serde(deserialize_with = "super::score")]
        score: u8,
        #[serde(deserialize_with = "super::text_list")]
        notes: Vec<String>,
    }

    fn decode(value: serde_json::Value) -> Sample {
        serde_json::from_value(value).expect("lenient decode")
    }

    #[test]
    fn null_fields_read_as_defaults() {
        let decoded = decode(json!({"title": null, "score": null, "notes": null}));
        assert_eq!(decoded.title, "");
        assert_eq!(decoded.score, 0);
        assert!(decoded.notes.is_empty());
    }

    #[test]
    fn scores_accept_strings_and_floats_and_clamp() {
        assert_eq!(decode(json!({"score": "72"})).score, 72);
        assert_eq!(decode(json!({"score": " 64% "})).score, 64);
        assert_eq!(decode(json!({"score": 3.6})).score, 4);
        assert_eq!(decode(json!({"score": 250})).score, 100);
        assert_eq!(decode(json!({"score": -4})).score, 0);
        assert_eq!(decode(json!({"score": "n/a"})).score, 0);
    }

    #[test]
    fn text_lists_tolerate_scalars_and_nulls() {
        assert_eq!(decode(json!({"notes": "only one"})).notes, vec!["only one"]);
        assert_eq!(
            decode(json!({"notes": ["a", null, 3]})).notes,
            vec!["a".to_string(), "3".to_string()]
        );
    }
}
