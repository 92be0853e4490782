use std::sync::Arc;

use serde_json::{Map, Value};

use invsync_core::{EntityKind, RemoteId};

use crate::error::RemoteError;

/// JSON object sent on create and update.
pub type Payload = Map<String, Value>;

/// Exact-match filter on entity fields, also sent as query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fields: Vec<(String, Value)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Query-string parameters. `null` filters are left out and only
    /// applied by [`Query::matches`].
    pub fn params(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(field, value)| (field.clone(), param_value(value)))
            .collect()
    }

    pub fn matches(&self, fields: &Payload) -> bool {
        self.fields.iter().all(|(field, expected)| {
            let actual = fields.get(field).unwrap_or(&Value::Null);
            loosely_equal(actual, expected)
        })
    }
}

impl core::fmt::Display for Query {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let rendered: Vec<String> = self
            .params()
            .into_iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        f.write_str(&rendered.join("&"))
    }
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality that tolerates the server rendering numbers as strings and
/// absent optional fields as empty strings.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.parse::<f64>().ok() == b.as_f64()
        }
        (a, b) => a == b,
    }
}

/// An entity as returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub id: RemoteId,
    pub fields: Payload,
}

impl RemoteObject {
    /// Reads the primary key from `pk` (or `id`).
    pub fn from_value(value: Value) -> Result<Self, RemoteError> {
        let Value::Object(fields) = value else {
            return Err(RemoteError::decode("expected a JSON object"));
        };
        let id = ["pk", "id"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_u64))
            .ok_or_else(|| RemoteError::decode("object without primary key"))?;
        Ok(Self {
            id: RemoteId(id),
            fields,
        })
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// A non-empty string field, trimmed.
    pub fn text(&self, field: &str) -> Option<String> {
        self.str(field)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn id_of(&self, field: &str) -> Option<RemoteId> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_u64().map(RemoteId),
            Value::String(s) => s.parse().ok().map(RemoteId),
            _ => None,
        }
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn f64(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// The remote inventory server's CRUD surface.
///
/// Calls are blocking. Implementations hold no per-record state.
pub trait RemoteApi: Send + Sync {
    fn create(&self, kind: EntityKind, payload: &Payload) -> Result<RemoteId, RemoteError>;

    /// Every entity of `kind` matching `query`, across all pages.
    fn list(&self, kind: EntityKind, query: &Query) -> Result<Vec<RemoteObject>, RemoteError>;

    fn update(&self, kind: EntityKind, id: RemoteId, payload: &Payload) -> Result<(), RemoteError>;

    fn delete(&self, kind: EntityKind, id: RemoteId) -> Result<(), RemoteError>;

    /// First entity matching `query` exactly; `None` when there is none.
    ///
    /// The server's own filtering is treated as a hint: results are
    /// re-checked against the query before one is picked.
    fn find(&self, kind: EntityKind, query: &Query) -> Result<Option<RemoteId>, RemoteError> {
        Ok(self
            .list(kind, query)?
            .into_iter()
            .find(|object| query.matches(&object.fields))
            .map(|object| object.id))
    }
}

impl<S> RemoteApi for Arc<S>
where
    S: RemoteApi + ?Sized,
{
    fn create(&self, kind: EntityKind, payload: &Payload) -> Result<RemoteId, RemoteError> {
        (**self).create(kind, payload)
    }

    fn list(&self, kind: EntityKind, query: &Query) -> Result<Vec<RemoteObject>, RemoteError> {
        (**self).list(kind, query)
    }

    fn update(&self, kind: EntityKind, id: RemoteId, payload: &Payload) -> Result<(), RemoteError> {
        (**self).update(kind, id, payload)
    }

    fn delete(&self, kind: EntityKind, id: RemoteId) -> Result<(), RemoteError> {
        (**self).delete(kind, id)
    }

    fn find(&self, kind: EntityKind, query: &Query) -> Result<Option<RemoteId>, RemoteError> {
        (**self).find(kind, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn query_matching_is_tolerant_of_server_rendering() {
        let query = Query::new().with("name", "Leg").with("revision", "").with("category", 4);
        assert!(query.matches(&payload(json!({"name": "Leg", "revision": null, "category": 4}))));
        assert!(query.matches(&payload(json!({"name": "Leg", "revision": "", "category": "4"}))));
        assert!(!query.matches(&payload(json!({"name": "Leg", "revision": "B", "category": 4}))));
        assert!(!query.matches(&payload(json!({"name": "leg", "revision": "", "category": 4}))));
    }

    #[test]
    fn null_parent_matches_only_roots() {
        let query = Query::new().with("name", "Warehouse1").with("parent", Value::Null);
        assert!(query.matches(&payload(json!({"name": "Warehouse1", "parent": null}))));
        assert!(query.matches(&payload(json!({"name": "Warehouse1"}))));
        assert!(!query.matches(&payload(json!({"name": "Warehouse1", "parent": 2}))));
        assert_eq!(query.to_string(), "name=Warehouse1");
    }

    #[test]
    fn objects_read_pk_or_id() {
        let object = RemoteObject::from_value(json!({"pk": 7, "name": "Acme"})).unwrap();
        assert_eq!(object.id, RemoteId(7));
        assert_eq!(object.str("name"), Some("Acme"));
        let object = RemoteObject::from_value(json!({"id": 8})).unwrap();
        assert_eq!(object.id, RemoteId(8));
        assert!(RemoteObject::from_value(json!({"name": "x"})).is_err());
        assert!(RemoteObject::from_value(json!([1])).is_err());
    }
}
