use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form, order-irrelevant options forwarded to read-many effects.
pub type ExtraOptions = HashMap<String, Value>;

/// Positional arguments forwarded to a read-one effect.
pub type ReadArgs = Vec<Value>;

/// Describes pagination and filtering for collection reads.
///
/// The same options are handed to the backend `read_many` effect and to the
/// cache-side `read_many_filter` effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
  /// Number of matching items to skip.
  pub skip: usize,
  /// Maximum number of items to return. `None` and `Some(0)` both mean "all".
  pub take: Option<usize>,
  /// A free-text query, interpreted by the effects.
  pub query: String,
  /// Additional backend specific options.
  pub extra: ExtraOptions,
}

impl SearchOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Options for a single page of `take` items after `skip`.
  pub fn page(skip: usize, take: usize) -> Self {
    Self {
      skip,
      take: Some(take),
      ..Self::default()
    }
  }

  /// Builds options from a loose key/value map.
  ///
  /// Integer `"skip"` and `"take"` entries are lifted into the typed fields,
  /// a string `"query"` entry becomes the query. The whole map is kept as
  /// `extra` so effects still see every key.
  pub fn from_extra(extra: ExtraOptions) -> Self {
    let skip = extra
      .get("skip")
      .and_then(Value::as_u64)
      .map_or(0, |v| v as usize);
    let take = extra.get("take").and_then(Value::as_u64).map(|v| v as usize);
    let query = extra
      .get("query")
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_owned();
    Self {
      skip,
      take,
      query,
      extra,
    }
  }

  pub fn skip(mut self, skip: usize) -> Self {
    self.skip = skip;
    self
  }

  pub fn take(mut self, take: usize) -> Self {
    self.take = Some(take);
    self
  }

  pub fn query(mut self, query: impl Into<String>) -> Self {
    self.query = query.into();
    self
  }

  /// Adds a single extra option.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.extra.insert(key.into(), value.into());
    self
  }

  /// The effective page size. A `take` of zero is treated as unset, never as
  /// "return nothing".
  pub fn limit(&self) -> Option<usize> {
    self.take.filter(|&take| take > 0)
  }

  /// Applies `skip` and `limit()` to an already filtered sequence.
  pub(crate) fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
    let iter = items.into_iter().skip(self.skip);
    match self.limit() {
      Some(take) => iter.take(take).collect(),
      None => iter.collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn zero_take_means_unbounded() {
    let options = SearchOptions::page(0, 0);
    assert_eq!(options.limit(), None);
    assert_eq!(options.paginate(vec![1, 2, 3]), vec![1, 2, 3]);
  }

  #[test]
  fn paginate_skips_then_takes() {
    let options = SearchOptions::page(1, 2);
    assert_eq!(options.paginate(vec![1, 2, 3, 4]), vec![2, 3]);
    assert_eq!(SearchOptions::page(5, 2).paginate(vec![1, 2]), Vec::<i32>::new());
  }

  #[test]
  fn from_extra_lifts_known_keys() {
    let mut extra = ExtraOptions::new();
    extra.insert("skip".into(), json!(3));
    extra.insert("take".into(), json!(10));
    extra.insert("query".into(), json!("needle"));
    extra.insert("tenant".into(), json!("acme"));

    let options = SearchOptions::from_extra(extra);
    assert_eq!(options.skip, 3);
    assert_eq!(options.take, Some(10));
    assert_eq!(options.query, "needle");
    assert_eq!(options.extra.get("tenant"), Some(&json!("acme")));
  }

  #[test]
  fn from_extra_ignores_non_integer_paging() {
    let mut extra = ExtraOptions::new();
    extra.insert("skip".into(), json!("three"));
    extra.insert("take".into(), json!(null));

    let options = SearchOptions::from_extra(extra);
    assert_eq!(options.skip, 0);
    assert_eq!(options.take, None);
  }

  #[test]
  fn deserializes_with_defaults() {
    let options: SearchOptions = serde_json::from_value(json!({ "take": 5 })).unwrap();
    assert_eq!(options, SearchOptions::new().take(5));
  }
}
