//! Natural-key lookups against the remote server.

use serde_json::Value;
use tracing::debug;

use invsync_core::{CategoryPath, Classify, EntityKind, RemoteId};
use invsync_records::{Part, PartRef, Reference};
use invsync_remote::{Query, RemoteApi, RemoteError};
use invsync_resolver::{ExternalLookup, LookupError};

pub(crate) fn category_query(name: &str, parent: Option<RemoteId>) -> Query {
    Query::new()
        .with("name", name)
        .with("parent", parent.map_or(Value::Null, |id| Value::from(id.get())))
}

pub(crate) fn company_query(name: &str) -> Query {
    Query::new().with("name", name)
}

/// By IPN when the part has one, else by name and revision.
pub(crate) fn part_query(part: &Part) -> Query {
    match &part.ipn {
        Some(ipn) => Query::new().with("IPN", ipn.as_str()),
        None => Query::new()
            .with("name", part.key.name.as_str())
            .with("revision", part.key.revision.as_deref().unwrap_or_default()),
    }
}

/// Walks a category path from the root, one `name + parent` lookup per
/// segment.
pub(crate) fn find_category(
    remote: &dyn RemoteApi,
    path: &CategoryPath,
) -> Result<Option<RemoteId>, RemoteError> {
    let mut parent = None;
    for segment in path.segments() {
        match remote.find(EntityKind::Category, &category_query(segment, parent))? {
            Some(id) => parent = Some(id),
            None => return Ok(None),
        }
    }
    Ok(parent)
}

/// IPN first, then exact name and revision, then the only part with that
/// name when the reference carries no revision.
pub(crate) fn find_part_ref(
    remote: &dyn RemoteApi,
    part: &PartRef,
) -> Result<Option<RemoteId>, RemoteError> {
    if let Some(ipn) = &part.ipn {
        if let Some(id) = remote.find(EntityKind::Part, &Query::new().with("IPN", ipn.as_str()))? {
            return Ok(Some(id));
        }
    }
    let exact = Query::new()
        .with("name", part.name.as_str())
        .with("revision", part.revision.as_deref().unwrap_or_default());
    if let Some(id) = remote.find(EntityKind::Part, &exact)? {
        return Ok(Some(id));
    }
    if part.revision.is_some() {
        return Ok(None);
    }
    let named = remote.list(EntityKind::Part, &Query::new().with("name", part.name.as_str()))?;
    let matching: Vec<RemoteId> = named
        .iter()
        .filter(|o| o.str("name") == Some(part.name.as_str()))
        .map(|o| o.id)
        .collect();
    Ok(match matching.as_slice() {
        [only] => Some(*only),
        _ => None,
    })
}

pub(crate) fn find_reference(
    remote: &dyn RemoteApi,
    reference: &Reference,
) -> Result<Option<RemoteId>, RemoteError> {
    match reference {
        Reference::Category(path) => find_category(remote, path),
        Reference::Company(name) => remote.find(EntityKind::Company, &company_query(name)),
        Reference::Part(part) => find_part_ref(remote, part),
    }
}

/// Answers the resolver's existence checks from the remote server.
pub struct RemoteLookup<'a> {
    remote: &'a dyn RemoteApi,
}

impl<'a> RemoteLookup<'a> {
    pub fn new(remote: &'a dyn RemoteApi) -> Self {
        Self { remote }
    }
}

impl ExternalLookup for RemoteLookup<'_> {
    fn find(&self, reference: &Reference) -> Result<Option<RemoteId>, LookupError> {
        let found = find_reference(self.remote, reference)
            .map_err(|e| LookupError::new(e.kind(), e.to_string()))?;
        debug!(%reference, found = ?found, "external reference checked");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_remote::InMemoryRemote;
    use serde_json::json;

    #[test]
    fn category_paths_are_walked_from_the_root() {
        let remote = InMemoryRemote::new();
        let w1 = remote.seed(EntityKind::Category, json!({"name": "Warehouse1", "parent": null}));
        let shelf = remote.seed(EntityKind::Category, json!({"name": "ShelfA", "parent": w1.get()}));
        remote.seed(EntityKind::Category, json!({"name": "ShelfA", "parent": null}));

        let path: CategoryPath = "Warehouse1/ShelfA".parse().unwrap();
        assert_eq!(find_category(&remote, &path).unwrap(), Some(shelf));
        let missing: CategoryPath = "Warehouse2/ShelfA".parse().unwrap();
        assert_eq!(find_category(&remote, &missing).unwrap(), None);
    }

    #[test]
    fn part_refs_fall_back_to_a_unique_name() {
        let remote = InMemoryRemote::new();
        let leg_b = remote.seed(EntityKind::Part, json!({"name": "Leg", "revision": "B", "IPN": "LEG"}));
        let top = remote.seed(EntityKind::Part, json!({"name": "Top", "revision": ""}));

        assert_eq!(find_part_ref(&remote, &PartRef::named("Leg")).unwrap(), Some(leg_b));
        assert_eq!(find_part_ref(&remote, &PartRef::named("Top")).unwrap(), Some(top));
        assert_eq!(
            find_part_ref(&remote, &PartRef::named("Other").with_ipn("LEG")).unwrap(),
            Some(leg_b)
        );

        remote.seed(EntityKind::Part, json!({"name": "Leg", "revision": "C"}));
        assert_eq!(find_part_ref(&remote, &PartRef::named("Leg")).unwrap(), None);
    }
}
