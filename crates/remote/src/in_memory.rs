use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use serde_json::Value;
use tracing::debug;

use invsync_core::{EntityKind, RemoteId};

use crate::api::{Payload, Query, RemoteApi, RemoteObject};
use crate::error::{FieldErrors, RemoteError};

/// Remote operation, for call accounting and failure injection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Create,
    Find,
    List,
    Update,
    Delete,
}

impl Op {
    pub fn is_mutating(self) -> bool {
        matches!(self, Op::Create | Op::Update | Op::Delete)
    }
}

/// Server-side rules for one entity kind.
struct Rules {
    required: &'static [&'static str],
    /// Each inner list is a set of fields that must be unique together.
    unique: &'static [&'static [&'static str]],
    /// Fields holding the id of another entity.
    refs: &'static [(&'static str, EntityKind)],
}

fn rules(kind: EntityKind) -> Rules {
    match kind {
        EntityKind::Category => Rules {
            required: &["name"],
            unique: &[&["name", "parent"]],
            refs: &[("parent", EntityKind::Category)],
        },
        EntityKind::Company => Rules {
            required: &["name"],
            unique: &[&["name"]],
            refs: &[],
        },
        EntityKind::Address => Rules {
            required: &["company", "title"],
            unique: &[&["company", "title"]],
            refs: &[("company", EntityKind::Company)],
        },
        EntityKind::Part => Rules {
            required: &["name"],
            unique: &[&["name", "revision"], &["IPN"]],
            refs: &[
                ("category", EntityKind::Category),
                ("variant_of", EntityKind::Part),
            ],
        },
        EntityKind::BomItem => Rules {
            required: &["part", "sub_part", "quantity"],
            unique: &[&["part", "sub_part"]],
            refs: &[("part", EntityKind::Part), ("sub_part", EntityKind::Part)],
        },
        EntityKind::ManufacturerPart => Rules {
            required: &["part", "manufacturer", "MPN"],
            unique: &[&["part", "manufacturer", "MPN"]],
            refs: &[
                ("part", EntityKind::Part),
                ("manufacturer", EntityKind::Company),
            ],
        },
        EntityKind::SupplierPart => Rules {
            required: &["part", "supplier", "SKU"],
            unique: &[&["supplier", "SKU"]],
            refs: &[
                ("part", EntityKind::Part),
                ("supplier", EntityKind::Company),
                ("manufacturer_part", EntityKind::ManufacturerPart),
            ],
        },
        EntityKind::PriceBreak => Rules {
            required: &["part", "quantity", "price"],
            unique: &[&["part", "quantity"]],
            refs: &[("part", EntityKind::SupplierPart)],
        },
        EntityKind::ParameterTemplate => Rules {
            required: &["name"],
            unique: &[&["name"]],
            refs: &[],
        },
        EntityKind::Parameter => Rules {
            required: &["part", "template", "data"],
            unique: &[&["part", "template"]],
            refs: &[
                ("part", EntityKind::Part),
                ("template", EntityKind::ParameterTemplate),
            ],
        },
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Unset, `null` and `""` all read as "no value" for uniqueness purposes.
fn normalized(value: Option<&Value>) -> Value {
    if is_blank(value) {
        Value::Null
    } else {
        value.cloned().unwrap_or(Value::Null)
    }
}

/// An injected failure: every matching call fails with `error`.
#[derive(Debug, Clone)]
struct Failure {
    op: Op,
    kind: EntityKind,
    when: Option<(String, Value)>,
    error: RemoteError,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    rows: BTreeMap<EntityKind, BTreeMap<RemoteId, Payload>>,
}

impl Tables {
    fn exists(&self, kind: EntityKind, id: RemoteId) -> bool {
        self.rows.get(&kind).is_some_and(|rows| rows.contains_key(&id))
    }

    fn validate(
        &self,
        kind: EntityKind,
        payload: &Payload,
        except: Option<RemoteId>,
    ) -> Result<(), RemoteError> {
        let rules = rules(kind);
        let mut fields = FieldErrors::new();

        if except.is_none() {
            for &field in rules.required {
                if is_blank(payload.get(field)) {
                    fields
                        .entry(field.to_string())
                        .or_default()
                        .push("This field is required.".to_string());
                }
            }
        }
        for &(field, target) in rules.refs {
            match payload.get(field) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    let valid = value.as_u64().is_some_and(|id| self.exists(target, RemoteId(id)));
                    if !valid {
                        fields
                            .entry(field.to_string())
                            .or_default()
                            .push(format!("Invalid pk \"{value}\" - object does not exist."));
                    }
                }
            }
        }
        if kind == EntityKind::BomItem {
            if let Some(quantity) = payload.get("quantity").and_then(Value::as_f64) {
                if quantity <= 0.0 {
                    fields
                        .entry("quantity".to_string())
                        .or_default()
                        .push("Ensure this value is greater than 0.".to_string());
                }
            }
            let assembly = payload
                .get("part")
                .and_then(Value::as_u64)
                .and_then(|id| self.get(EntityKind::Part, RemoteId(id)))
                .map(|part| part.get("assembly").and_then(Value::as_bool) == Some(true));
            // Parts are not assemblies unless flagged.
            if assembly == Some(false) {
                fields
                    .entry("part".to_string())
                    .or_default()
                    .push("Part is not an assembly.".to_string());
            }
        }
        if !fields.is_empty() {
            return Err(RemoteError::InvalidPayload { kind, fields });
        }

        let merged = match except.and_then(|id| self.get(kind, id)) {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.extend(payload.clone());
                merged
            }
            None => payload.clone(),
        };
        for &set in rules.unique {
            let key: Vec<Value> = set.iter().map(|f| normalized(merged.get(*f))).collect();
            // A unique set made only of blanks constrains nothing (e.g. no IPN).
            if set.len() == 1 && key[0].is_null() {
                continue;
            }
            let clash = self.rows.get(&kind).into_iter().flatten().any(|(id, row)| {
                Some(*id) != except
                    && set.iter().map(|f| normalized(row.get(*f))).collect::<Vec<_>>() == key
            });
            if clash {
                return Err(RemoteError::DuplicateKey {
                    kind,
                    message: format!("The fields {} must make a unique set.", set.join(", ")),
                });
            }
        }
        Ok(())
    }

    fn get(&self, kind: EntityKind, id: RemoteId) -> Option<&Payload> {
        self.rows.get(&kind).and_then(|rows| rows.get(&id))
    }

    fn insert(&mut self, kind: EntityKind, payload: Payload) -> RemoteId {
        self.next_id += 1;
        let id = RemoteId(self.next_id);
        self.rows.entry(kind).or_default().insert(id, payload);
        id
    }

    /// Removes `id` the way the server does: child categories and parts move
    /// to the parent category, everything else referencing it is deleted.
    fn remove(&mut self, kind: EntityKind, id: RemoteId) {
        let Some(removed) = self.rows.get_mut(&kind).and_then(|rows| rows.remove(&id)) else {
            return;
        };
        let reparent = if kind == EntityKind::Category {
            removed.get("parent").cloned().unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        let mut cascade = Vec::new();
        for other in EntityKind::ALL {
            for &(field, target) in rules(other).refs {
                if target != kind {
                    continue;
                }
                let Some(rows) = self.rows.get_mut(&other) else {
                    continue;
                };
                for (row_id, row) in rows.iter_mut() {
                    if row.get(field).and_then(Value::as_u64) != Some(id.get()) {
                        continue;
                    }
                    if kind == EntityKind::Category || field == "variant_of" {
                        row.insert(field.to_string(), reparent.clone());
                    } else {
                        cascade.push((other, *row_id));
                    }
                }
            }
        }
        for (other, row_id) in cascade {
            self.remove(other, row_id);
        }
    }
}

/// In-memory stand-in for the remote server.
///
/// Enforces the server's required fields, uniqueness constraints, foreign
/// keys, BOM assembly rule and "active parts cannot be deleted". Counts
/// every call and can be told to fail specific ones. Intended for tests and
/// dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    tables: RwLock<Tables>,
    calls: Mutex<BTreeMap<(Op, EntityKind), usize>>,
    failures: Mutex<Vec<Failure>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `payload` as-is, bypassing validation and call accounting.
    pub fn seed(&self, kind: EntityKind, payload: Value) -> RemoteId {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        match self.tables.write() {
            Ok(mut tables) => tables.insert(kind, payload),
            Err(poisoned) => poisoned.into_inner().insert(kind, payload),
        }
    }

    /// Makes every `op` on `kind` fail with `error`.
    pub fn fail(&self, op: Op, kind: EntityKind, error: RemoteError) {
        self.push_failure(Failure {
            op,
            kind,
            when: None,
            error,
        });
    }

    /// Makes `op` on `kind` fail with `error` when the payload (or query)
    /// has `field == value`.
    pub fn fail_when(
        &self,
        op: Op,
        kind: EntityKind,
        field: impl Into<String>,
        value: impl Into<Value>,
        error: RemoteError,
    ) {
        self.push_failure(Failure {
            op,
            kind,
            when: Some((field.into(), value.into())),
            error,
        });
    }

    fn push_failure(&self, failure: Failure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure);
        }
    }

    pub fn get(&self, kind: EntityKind, id: RemoteId) -> Option<Payload> {
        self.tables.read().ok()?.get(kind, id).cloned()
    }

    pub fn objects(&self, kind: EntityKind) -> Vec<RemoteObject> {
        let Ok(tables) = self.tables.read() else {
            return Vec::new();
        };
        tables
            .rows
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|(id, fields)| RemoteObject {
                id: *id,
                fields: fields.clone(),
            })
            .collect()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.tables
            .read()
            .map(|t| t.rows.get(&kind).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|((o, _), _)| *o == op).map(|(_, n)| n).sum())
            .unwrap_or(0)
    }

    pub fn calls_for(&self, op: Op, kind: EntityKind) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&(op, kind)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|((op, _), _)| op.is_mutating())
                    .map(|(_, n)| n)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record_call(&self, op: Op, kind: EntityKind, subject: Option<&Payload>) -> Result<(), RemoteError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry((op, kind)).or_default() += 1;
        }
        let Ok(failures) = self.failures.lock() else {
            return Ok(());
        };
        let hit = failures.iter().find(|f| {
            f.op == op
                && f.kind == kind
                && match (&f.when, subject) {
                    (None, _) => true,
                    (Some((field, value)), Some(subject)) => subject.get(field) == Some(value),
                    (Some(_), None) => false,
                }
        });
        match hit {
            Some(failure) => {
                debug!(?op, %kind, error = %failure.error, "injected failure");
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, RemoteError> {
        self.tables.write().map_err(|_| RemoteError::Server {
            status: 500,
            message: "lock poisoned".to_string(),
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, RemoteError> {
        self.tables.read().map_err(|_| RemoteError::Server {
            status: 500,
            message: "lock poisoned".to_string(),
        })
    }

    fn query_payload(query: &Query) -> Payload {
        query.fields().iter().cloned().collect()
    }
}

impl RemoteApi for InMemoryRemote {
    fn create(&self, kind: EntityKind, payload: &Payload) -> Result<RemoteId, RemoteError> {
        self.record_call(Op::Create, kind, Some(payload))?;
        let mut tables = self.write()?;
        tables.validate(kind, payload, None)?;
        let id = tables.insert(kind, payload.clone());
        debug!(%kind, %id, "created");
        Ok(id)
    }

    fn list(&self, kind: EntityKind, query: &Query) -> Result<Vec<RemoteObject>, RemoteError> {
        self.record_call(Op::List, kind, Some(&Self::query_payload(query)))?;
        let tables = self.read()?;
        Ok(tables
            .rows
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|(_, row)| query.matches(row))
            .map(|(id, row)| RemoteObject {
                id: *id,
                fields: row.clone(),
            })
            .collect())
    }

    fn find(&self, kind: EntityKind, query: &Query) -> Result<Option<RemoteId>, RemoteError> {
        self.record_call(Op::Find, kind, Some(&Self::query_payload(query)))?;
        let tables = self.read()?;
        Ok(tables
            .rows
            .get(&kind)
            .into_iter()
            .flatten()
            .find(|(_, row)| query.matches(row))
            .map(|(id, _)| *id))
    }

    fn update(&self, kind: EntityKind, id: RemoteId, payload: &Payload) -> Result<(), RemoteError> {
        self.record_call(Op::Update, kind, Some(payload))?;
        let mut tables = self.write()?;
        if !tables.exists(kind, id) {
            return Err(RemoteError::NotFound { kind, id: Some(id) });
        }
        tables.validate(kind, payload, Some(id))?;
        if let Some(row) = tables.rows.get_mut(&kind).and_then(|rows| rows.get_mut(&id)) {
            row.extend(payload.clone());
        }
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: RemoteId) -> Result<(), RemoteError> {
        let subject = self.get(kind, id);
        self.record_call(Op::Delete, kind, subject.as_ref())?;
        let mut tables = self.write()?;
        let Some(row) = tables.get(kind, id) else {
            return Err(RemoteError::NotFound { kind, id: Some(id) });
        };
        if kind == EntityKind::Part && row.get("active").and_then(Value::as_bool).unwrap_or(true) {
            return Err(RemoteError::invalid(
                kind,
                "non_field_errors",
                "Cannot delete this part as it is still active",
            ));
        }
        tables.remove(kind, id);
        debug!(%kind, %id, "deleted");
        Ok(())
    }
}
