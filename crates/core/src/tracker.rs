use serde_json::Value;

use crate::diff::deep_equal;
use crate::domain::entity::Approvable;
use crate::domain::value::{
    find_tracked, read_path, write_path, ChangeSet, FieldPath, FieldValue, TrackedField,
};
use crate::errors::DomainError;

/// Before/after values over every tracked path of an entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshots {
    pub previous: ChangeSet,
    pub current: ChangeSet,
}

impl Snapshots {
    /// True when the proposal would not change any tracked value.
    pub fn is_noop(&self) -> bool {
        deep_equal(&self.previous.to_nested_json(), &self.current.to_nested_json())
    }

    pub fn changed_paths(&self) -> Vec<FieldPath> {
        self.previous
            .iter()
            .filter(|(path, before)| {
                let after = self.current.get(path).map(FieldValue::to_json).unwrap_or(Value::Null);
                !deep_equal(&before.to_json(), &after)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }
}

pub fn build_snapshots<E: Approvable>(
    persisted: &E,
    incoming: &ChangeSet,
) -> Result<Snapshots, DomainError> {
    let document = serde_json::to_value(persisted)
        .map_err(|error| DomainError::InvariantViolation(format!("encode {}: {error}", E::KIND)))?;
    build_snapshots_from(E::tracked_fields(), &document, incoming)
}

/// Both snapshots carry every path in `tracked`, whatever shape `persisted` has.
///
/// A path whose incoming value is missing or unset keeps the persisted value.
pub fn build_snapshots_from(
    tracked: &[TrackedField],
    persisted: &Value,
    incoming: &ChangeSet,
) -> Result<Snapshots, DomainError> {
    if let Some(path) = incoming.paths().find(|path| find_tracked(tracked, path).is_none()) {
        return Err(DomainError::UntrackedField { path: path.to_string() });
    }

    let mut snapshots = Snapshots::default();
    for field in tracked {
        let path = field.field_path();
        let previous = match read_path(persisted, &path) {
            Some(raw) => FieldValue::from_json(field.kind, &path, raw)?,
            None => FieldValue::Absent,
        };
        let current = match incoming.get(&path) {
            Some(value) if !value.is_unset() => value.clone(),
            _ => previous.clone(),
        };
        snapshots.previous.insert(path.clone(), previous);
        snapshots.current.insert(path, current);
    }
    Ok(snapshots)
}

/// Writes every set value of `changes` into the entity's document and decodes it back.
pub fn merge_change_set<E: Approvable>(entity: &E, changes: &ChangeSet) -> Result<E, DomainError> {
    let mut document = serde_json::to_value(entity)
        .map_err(|error| DomainError::InvariantViolation(format!("encode {}: {error}", E::KIND)))?;
    for (path, value) in changes.iter().filter(|(_, value)| !value.is_unset()) {
        write_path(&mut document, path, value.to_json());
    }
    serde_json::from_value(document).map_err(|error| DomainError::MalformedField {
        path: E::KIND.to_string(),
        reason: error.to_string(),
    })
}
