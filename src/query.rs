//! Fluent query builder for entries, assets and taxonomy lookups.
//!
//! A [`Query`] only marshals parameters; running it is up to
//! [`Stack::find`](crate::Stack::find), which routes it through the cache
//! policy like any other read.
//!
//! # Example
//!
//! ```ignore
//! let query = stack
//!   .content_type("blog")
//!   .query()
//!   .equal_to("category", "rust")
//!   .greater_than("rating", 3)
//!   .descending("published_at")
//!   .limit(10);
//! let page = stack.find(query).await?;
//! ```

use serde_json::{json, Map, Value};

use crate::params::to_snake_case;
use crate::transport::Request;

/// What a query searches over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
  /// Entries of one content type
  Entries { content_type_uid: String },
  Assets,
  /// Entries of any content type, filtered by taxonomy terms
  Taxonomies,
}

impl QueryTarget {
  fn path(&self) -> String {
    match self {
      Self::Entries { content_type_uid } => format!("/content_types/{}/entries", content_type_uid),
      Self::Assets => "/assets".to_string(),
      Self::Taxonomies => "/taxonomies/entries".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
  target: QueryTarget,
  filters: Map<String, Value>,
  params: Map<String, Value>,
}

impl Query {
  pub fn new(target: QueryTarget) -> Self {
    Self {
      target,
      filters: Map::new(),
      params: Map::new(),
    }
  }

  pub fn entries(content_type_uid: impl Into<String>) -> Self {
    Self::new(QueryTarget::Entries {
      content_type_uid: content_type_uid.into(),
    })
  }

  pub fn assets() -> Self {
    Self::new(QueryTarget::Assets)
  }

  pub fn taxonomies() -> Self {
    Self::new(QueryTarget::Taxonomies)
  }

  pub fn target(&self) -> &QueryTarget {
    &self.target
  }

  /// The accumulated `query` filter document.
  pub fn filters(&self) -> &Map<String, Value> {
    &self.filters
  }

  // --------------------------------------------------------------------------
  // Field filters
  // --------------------------------------------------------------------------

  pub fn equal_to(self, field: &str, value: impl Into<Value>) -> Self {
    self.filter(field, value.into())
  }

  pub fn not_equal_to(self, field: &str, value: impl Into<Value>) -> Self {
    self.operator(field, "$ne", value.into())
  }

  pub fn contained_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
    self.operator(field, "$in", collect(values))
  }

  pub fn not_contained_in<V: Into<Value>>(
    self,
    field: &str,
    values: impl IntoIterator<Item = V>,
  ) -> Self {
    self.operator(field, "$nin", collect(values))
  }

  pub fn exists(self, field: &str) -> Self {
    self.operator(field, "$exists", Value::Bool(true))
  }

  pub fn not_exists(self, field: &str) -> Self {
    self.operator(field, "$exists", Value::Bool(false))
  }

  pub fn less_than(self, field: &str, value: impl Into<Value>) -> Self {
    self.operator(field, "$lt", value.into())
  }

  pub fn less_than_or_equal(self, field: &str, value: impl Into<Value>) -> Self {
    self.operator(field, "$lte", value.into())
  }

  pub fn greater_than(self, field: &str, value: impl Into<Value>) -> Self {
    self.operator(field, "$gt", value.into())
  }

  pub fn greater_than_or_equal(self, field: &str, value: impl Into<Value>) -> Self {
    self.operator(field, "$gte", value.into())
  }

  /// Match `field` against a regular expression; `options` such as `"i"`.
  pub fn regex(self, field: &str, pattern: &str, options: Option<&str>) -> Self {
    let mut query = self.operator(field, "$regex", Value::String(pattern.to_string()));
    if let Some(options) = options {
      query = query.operator(field, "$options", Value::String(options.to_string()));
    }
    query
  }

  /// Entries carrying any of these tags.
  pub fn tags<V: Into<String>>(self, tags: impl IntoIterator<Item = V>) -> Self {
    let tags = tags.into_iter().map(|t| Value::String(t.into())).collect();
    self.operator("tags", "$in", Value::Array(tags))
  }

  /// Entries matching any of the given sub-queries.
  pub fn or(self, queries: impl IntoIterator<Item = Query>) -> Self {
    self.combine("$or", queries)
  }

  /// Entries matching all of the given sub-queries.
  pub fn and(self, queries: impl IntoIterator<Item = Query>) -> Self {
    self.combine("$and", queries)
  }

  // --------------------------------------------------------------------------
  // Taxonomy filters
  // --------------------------------------------------------------------------

  /// Entries tagged with any of `terms` in `taxonomy`.
  pub fn taxonomy_in<V: Into<String>>(self, taxonomy: &str, terms: impl IntoIterator<Item = V>) -> Self {
    let terms = terms.into_iter().map(|t| Value::String(t.into())).collect();
    self.operator(&taxonomy_field(taxonomy), "$in", Value::Array(terms))
  }

  /// Entries tagged with exactly `term` in `taxonomy`.
  pub fn taxonomy_eq(self, taxonomy: &str, term: &str) -> Self {
    self.filter(&taxonomy_field(taxonomy), Value::String(term.to_string()))
  }

  /// Entries tagged with an ancestor of `term`, up to `levels` levels up.
  pub fn taxonomy_above(self, taxonomy: &str, term: &str, levels: Option<u32>) -> Self {
    self.hierarchy(taxonomy, "$above", term, levels)
  }

  /// Entries tagged with a descendant of `term`, down to `levels` levels.
  pub fn taxonomy_below(self, taxonomy: &str, term: &str, levels: Option<u32>) -> Self {
    self.hierarchy(taxonomy, "$below", term, levels)
  }

  /// Like [`taxonomy_above`](Self::taxonomy_above), including `term` itself.
  pub fn taxonomy_eq_above(self, taxonomy: &str, term: &str, levels: Option<u32>) -> Self {
    self.hierarchy(taxonomy, "$eq_above", term, levels)
  }

  /// Like [`taxonomy_below`](Self::taxonomy_below), including `term` itself.
  pub fn taxonomy_eq_below(self, taxonomy: &str, term: &str, levels: Option<u32>) -> Self {
    self.hierarchy(taxonomy, "$eq_below", term, levels)
  }

  // --------------------------------------------------------------------------
  // Result shaping
  // --------------------------------------------------------------------------

  pub fn limit(self, limit: u32) -> Self {
    self.param("limit", limit)
  }

  pub fn skip(self, skip: u32) -> Self {
    self.param("skip", skip)
  }

  pub fn ascending(self, field: &str) -> Self {
    self.param("asc", field)
  }

  pub fn descending(self, field: &str) -> Self {
    self.param("desc", field)
  }

  pub fn include_count(self) -> Self {
    self.param("include_count", true)
  }

  /// Resolve a reference field inline. May be called repeatedly.
  pub fn include_reference(self, field: &str) -> Self {
    self.push_param("include[]", field)
  }

  /// Return only these fields.
  pub fn only(self, field: &str) -> Self {
    self.push_param("only[BASE][]", field)
  }

  /// Return everything but these fields.
  pub fn except(self, field: &str) -> Self {
    self.push_param("except[BASE][]", field)
  }

  pub fn locale(self, locale: &str) -> Self {
    self.param("locale", locale)
  }

  /// Any other parameter; `camelCase` keys are sent as `snake_case`.
  pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.params.insert(to_snake_case(key), value.into());
    self
  }

  /// Build the request this query describes.
  pub fn into_request(self) -> Request {
    let mut request = Request::get(self.target.path());
    if let QueryTarget::Entries { content_type_uid } = &self.target {
      request.content_type_uid = Some(content_type_uid.clone());
    }
    request.params = self.params;
    if !self.filters.is_empty() {
      request
        .params
        .insert("query".to_string(), Value::Object(self.filters));
    }
    request
  }

  fn filter(mut self, field: &str, value: Value) -> Self {
    self.filters.insert(field.to_string(), value);
    self
  }

  /// Add `{op: value}` to the operator document of `field`, keeping other
  /// operators already set on it.
  fn operator(mut self, field: &str, op: &str, value: Value) -> Self {
    let slot = self
      .filters
      .entry(field.to_string())
      .or_insert_with(|| json!({}));
    if !slot.is_object() {
      *slot = json!({});
    }
    if let Value::Object(ops) = slot {
      ops.insert(op.to_string(), value);
    }
    self
  }

  fn hierarchy(self, taxonomy: &str, op: &str, term: &str, levels: Option<u32>) -> Self {
    let field = taxonomy_field(taxonomy);
    let query = self.operator(&field, op, Value::String(term.to_string()));
    match levels {
      Some(levels) => query.operator(&field, "levels", Value::from(levels)),
      None => query,
    }
  }

  fn combine(self, op: &str, queries: impl IntoIterator<Item = Query>) -> Self {
    let clauses = queries
      .into_iter()
      .map(|q| Value::Object(q.filters))
      .collect();
    self.filter(op, Value::Array(clauses))
  }

  fn push_param(mut self, key: &str, value: &str) -> Self {
    let slot = self
      .params
      .entry(key.to_string())
      .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(values) = slot {
      values.push(Value::String(value.to_string()));
    }
    self
  }
}

fn taxonomy_field(taxonomy: &str) -> String {
  format!("taxonomies.{}", taxonomy)
}

fn collect<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Value {
  Value::Array(values.into_iter().map(Into::into).collect())
}
