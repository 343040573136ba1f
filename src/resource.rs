//! Namespace tokens for the kinds of resource a stack serves.
//!
//! The namespace roots every cache key (see [`CacheKey`](crate::cache::CacheKey)).
//! It starts from the stack root (api key, environment, branch), gains a
//! suffix for resources that would otherwise share a key with entries, and
//! gains a parameter fingerprint when the request carries filters or shaping
//! parameters.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Parameters already carried by the root token.
const AMBIENT_PARAMS: [&str; 1] = ["environment"];

/// Root token for one stack view: `<api_key>_<environment>[_<branch>]`.
///
/// Clients reading different environments or branches of a stack never
/// share cache records, even through one store.
pub fn cache_root(api_key: &str, environment: &str, branch: Option<&str>) -> String {
  let mut root = format!("{}_{}", api_key, environment);
  if let Some(branch) = branch.filter(|b| !b.is_empty()) {
    root.push('_');
    root.push_str(branch);
  }
  root
}

/// Kind of resource a read addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKey {
  /// Entries of a content type, one or many
  Entries,
  /// Content type schema
  ContentType,
  /// A single asset
  Asset { uid: String },
  /// Asset listing
  Assets,
  /// Taxonomy entry listing
  Taxonomies,
}

impl ResourceKey {
  /// Namespace token for this resource under `root` (see [`cache_root`]).
  pub fn namespace(&self, root: &str, params: &Map<String, Value>) -> String {
    let mut namespace = match self {
      Self::Entries => root.to_string(),
      Self::ContentType => format!("{}_schema", root),
      Self::Asset { uid } => format!("{}_asset_{}", root, uid),
      Self::Assets => format!("{}_assets", root),
      Self::Taxonomies => format!("{}_taxonomies", root),
    };

    if let Some(fingerprint) = params_fingerprint(params) {
      namespace.push('_');
      namespace.push_str(&fingerprint);
    }

    namespace
  }

  pub fn description(&self) -> String {
    match self {
      Self::Entries => "entries".to_string(),
      Self::ContentType => "content type".to_string(),
      Self::Asset { uid } => format!("asset {}", uid),
      Self::Assets => "assets".to_string(),
      Self::Taxonomies => "taxonomy entries".to_string(),
    }
  }
}

/// Short stable hash of the request parameters, ignoring ambient ones.
/// `None` when nothing but ambient parameters is set.
fn params_fingerprint(params: &Map<String, Value>) -> Option<String> {
  let relevant: Map<String, Value> = params
    .iter()
    .filter(|(k, _)| !AMBIENT_PARAMS.contains(&k.as_str()))
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();

  if relevant.is_empty() {
    return None;
  }

  // serde_json maps are ordered by key, so this text is canonical
  let canonical = Value::Object(relevant).to_string();

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  let digest = hex::encode(hasher.finalize());
  Some(digest[..16].to_string())
}
