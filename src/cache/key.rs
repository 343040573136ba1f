//! Cache key derivation.

use regex_lite::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Identifies one logical resource in the persistence store.
///
/// Shape: `[<content_type_uid>_]<namespace>[_entry_<entry_uid>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  /// Derive the key for a request.
  ///
  /// The entry component comes from `explicit_entry_uid` if given, otherwise
  /// from `request_path` when it looks like `.../content_types/<ct>/entries/<uid>`.
  /// Without either the key addresses the whole collection.
  pub fn resolve(
    namespace: &str,
    content_type_uid: Option<&str>,
    explicit_entry_uid: Option<&str>,
    request_path: Option<&str>,
  ) -> Self {
    let entry_uid = explicit_entry_uid.or_else(|| request_path.and_then(entry_uid_from_path));

    let mut key = String::with_capacity(namespace.len() + 32);
    if let Some(ct) = content_type_uid {
      key.push_str(ct);
      key.push('_');
    }
    key.push_str(namespace);
    if let Some(entry) = entry_uid {
      key.push_str("_entry_");
      key.push_str(entry);
    }

    Self(key)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

fn entries_path() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"/content_types/[^/]+/entries/([^/?]+)").expect("entries path pattern is valid")
  })
}

/// Entry uid embedded in a request path, if the path addresses a single entry.
pub fn entry_uid_from_path(path: &str) -> Option<&str> {
  entries_path()
    .captures(path)
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str())
}
