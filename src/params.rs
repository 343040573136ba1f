//! Parameter key normalisation: caller `camelCase` to wire `snake_case`.

use serde_json::{Map, Value};

/// Convert one key to snake_case.
///
/// `startDate` becomes `start_date`, `HTMLBody` becomes `html_body`; keys that
/// are already snake_case come back unchanged. Bracketed wire keys such as
/// `only[BASE][]` are passed through as they are.
pub fn to_snake_case(key: &str) -> String {
  if key.contains('[') {
    return key.to_string();
  }

  let chars: Vec<char> = key.chars().collect();
  let mut out = String::with_capacity(key.len() + 4);

  for (i, &c) in chars.iter().enumerate() {
    if c.is_uppercase() && i > 0 {
      let prev = chars[i - 1];
      let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
      let boundary = prev.is_lowercase()
        || prev.is_ascii_digit()
        || (prev.is_uppercase() && next_is_lower);
      if boundary && prev != '_' {
        out.push('_');
      }
    }
    out.extend(c.to_lowercase());
  }

  out
}

/// Rewrite every object key in `value`, recursively, to snake_case.
pub fn normalize_keys(value: Value) -> Value {
  match value {
    Value::Object(map) => Value::Object(normalize_map(map)),
    Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
    other => other,
  }
}

/// [`normalize_keys`] for a parameter map.
pub fn normalize_map(map: Map<String, Value>) -> Map<String, Value> {
  map
    .into_iter()
    .map(|(k, v)| (to_snake_case(&k), normalize_keys(v)))
    .collect()
}
