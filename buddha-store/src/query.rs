//! Query types shared by both backends.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Object properties as a JSON map.
pub type Properties = serde_json::Map<String, Value>;

/// An object returned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredObject {
    pub id: Uuid,
    pub properties: Properties,
    /// Similarity certainty in `[0, 1]`, only set by `near_text`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
}

impl StoredObject {
    pub fn str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Flatten into the properties map with the id under `uuid`.
    pub fn into_json(self) -> Value {
        let mut props = self.properties;
        props.insert("uuid".to_string(), Value::String(self.id.to_string()));
        Value::Object(props)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Property equals a value.
    Equal(String, Value),
    /// Object id equals.
    IdEqual(Uuid),
    /// All operands match.
    And(Vec<Filter>),
}

impl Filter {
    pub fn by_property(name: &str, value: impl Into<Value>) -> Self {
        Filter::Equal(name.to_string(), value.into())
    }

    pub fn by_id(id: Uuid) -> Self {
        Filter::IdEqual(id)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut operands) => {
                operands.push(other);
                Filter::And(operands)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Evaluate against an object (used by the local backend).
    pub fn matches(&self, id: &Uuid, properties: &Properties) -> bool {
        match self {
            Filter::Equal(name, value) => properties.get(name) == Some(value),
            Filter::IdEqual(want) => want == id,
            Filter::And(operands) => operands.iter().all(|f| f.matches(id, properties)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub property: String,
    pub ascending: bool,
}

impl Sort {
    pub fn by_property(property: &str, ascending: bool) -> Self {
        Self {
            property: property.to_string(),
            ascending,
        }
    }
}

/// Non-vector search parameters.
#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub limit: usize,
    pub offset: Option<usize>,
    /// Properties to return; empty means all.
    pub properties: Vec<String>,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self::new(3)
    }
}

impl FetchQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            offset: None,
            properties: Vec::new(),
            filter: None,
            sort: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_properties(mut self, properties: &[&str]) -> Self {
        self.properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Vector similarity search parameters.
#[derive(Debug, Clone)]
pub struct NearTextQuery {
    pub query: String,
    pub limit: usize,
    /// Minimum certainty; results below it are dropped.
    pub certainty: Option<f64>,
    pub filter: Option<Filter>,
    pub offset: Option<usize>,
    pub properties: Vec<String>,
}

impl NearTextQuery {
    pub fn new(query: &str, limit: usize) -> Self {
        Self {
            query: query.to_string(),
            limit,
            certainty: None,
            filter: None,
            offset: None,
            properties: Vec::new(),
        }
    }

    pub fn with_certainty(mut self, certainty: f64) -> Self {
        self.certainty = Some(certainty);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_properties(mut self, properties: &[&str]) -> Self {
        self.properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Order two optional JSON values: numbers numerically, everything else by
/// its string form; missing values sort first.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Keep only the requested properties (all of them when `wanted` is empty).
pub fn project(properties: Properties, wanted: &[String]) -> Properties {
    if wanted.is_empty() {
        return properties;
    }
    properties
        .into_iter()
        .filter(|(k, _)| wanted.iter().any(|w| w == k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Properties {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn filter_and_flattens() {
        let f = Filter::by_property("a", "x")
            .and(Filter::by_property("b", 1))
            .and(Filter::by_property("c", true));
        match f {
            Filter::And(ops) => assert_eq!(ops.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn filter_matches_properties_and_id() {
        let id = Uuid::new_v4();
        let p = props(json!({"author": "a@b.c", "order": 2}));
        assert!(Filter::by_property("author", "a@b.c").matches(&id, &p));
        assert!(!Filter::by_property("author", "x@y.z").matches(&id, &p));
        assert!(Filter::by_id(id).and(Filter::by_property("order", 2)).matches(&id, &p));
        assert!(!Filter::by_id(Uuid::new_v4()).matches(&id, &p));
    }

    #[test]
    fn compare_numbers_numerically() {
        let (a, b) = (json!(2), json!(10));
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        let (a, b) = (json!("2024-01-02T00:00:00Z"), json!("2024-01-01T00:00:00Z"));
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Greater);
        assert_eq!(compare_values(None, Some(&b)), Ordering::Less);
    }

    #[test]
    fn projection_keeps_requested_keys() {
        let p = props(json!({"title": "t", "content": "c", "author": "a"}));
        let out = project(p.clone(), &["title".to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(project(p, &[]).len(), 3);
    }

    #[test]
    fn into_json_adds_uuid() {
        let id = Uuid::new_v4();
        let obj = StoredObject {
            id,
            properties: props(json!({"name": "n"})),
            certainty: None,
        };
        let v = obj.into_json();
        assert_eq!(v["uuid"], json!(id.to_string()));
        assert_eq!(v["name"], json!("n"));
    }
}
