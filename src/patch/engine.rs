//! Patch engine
//!
//! Applies operations to a JSON copy of the entity and re-deserializes it, so
//! field types are enforced by the entity's own serde definition and a
//! failure anywhere leaves the original untouched.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::pointer;
use super::{OpKind, PatchError, PatchOperation};
use crate::models::Role;

const OWNER_PATH: &str = "/owner";
const AUTHORIZATION_PATH: &str = "/authorization";

/// Post-patch business rule: `(original, patched, actor)`.
pub type Validator<'a, T> = dyn Fn(&T, &T, &str) -> Result<(), String> + Send + Sync + 'a;

type Preserver<'a, T> = dyn Fn(T, &T) -> T + Send + Sync + 'a;

// == Apply ==
/// Applies `operations` in order to a copy of `original`.
///
/// `test` asserts without mutating. `replace` on an absent object member
/// behaves like `add`. Unknown operation names, unresolvable paths and
/// values of the wrong type for the target field all fail.
pub fn apply_patch_operations<T>(original: &T, operations: &[PatchOperation]) -> Result<T, PatchError>
where
    T: Serialize + DeserializeOwned,
{
    let mut doc = serde_json::to_value(original).map_err(|e| PatchError::Serialization(e.to_string()))?;

    for operation in operations {
        apply_operation(&mut doc, operation)?;
    }

    serde_json::from_value(doc).map_err(|e| PatchError::TypeMismatch(e.to_string()))
}

fn apply_operation(doc: &mut Value, operation: &PatchOperation) -> Result<(), PatchError> {
    let kind: OpKind = operation.op.parse()?;
    let path = operation.path.as_str();
    let tokens = pointer::parse(path)?;
    debug!("Applying patch operation {} {}", kind, path);

    match kind {
        OpKind::Add => pointer::add(doc, &tokens, operation.value.clone(), path),
        OpKind::Replace => pointer::replace(doc, &tokens, operation.value.clone(), path),
        OpKind::Remove => pointer::remove(doc, &tokens, path),
        OpKind::Test => match pointer::get(doc, &tokens) {
            Some(current) if *current == operation.value => Ok(()),
            Some(_) => Err(PatchError::TestFailed(path.to_string())),
            None => Err(PatchError::PathNotFound(path.to_string())),
        },
    }
}

// == Privileged Paths ==
fn touches(path: &str, field: &str) -> bool {
    path.strip_prefix(field)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Classifies the operations as `(owner_changing, authorization_changing)`.
///
/// A path counts when it is the field itself or nested under it. `test`
/// operations never count.
pub fn check_ownership_changes(operations: &[PatchOperation]) -> (bool, bool) {
    operations
        .iter()
        .filter(|op| op.op != "test")
        .fold((false, false), |(owner, auth), op| {
            (
                owner || touches(&op.path, OWNER_PATH),
                auth || touches(&op.path, AUTHORIZATION_PATH),
            )
        })
}

/// Forbidden unless `role` is Owner when any operation touches `/owner` or
/// `/authorization`. Other paths are not checked here.
pub fn validate_patch_authorization(operations: &[PatchOperation], role: Role) -> Result<(), PatchError> {
    let (owner_changing, auth_changing) = check_ownership_changes(operations);
    if (owner_changing || auth_changing) && role != Role::Owner {
        return Err(PatchError::Forbidden(
            "Only the owner can change ownership or authorization".to_string(),
        ));
    }
    Ok(())
}

// == Preserve and Validate ==
/// Copies immutable fields from `original` into `patched` through `preserve`.
pub fn preserve_critical_fields<T, F>(patched: T, original: &T, preserve: F) -> T
where
    F: FnOnce(T, &T) -> T,
{
    preserve(patched, original)
}

/// Runs the optional business-rule hook. A rejection becomes ValidationFailed.
pub fn validate_patched_entity<T>(
    original: &T,
    patched: &T,
    actor: &str,
    validator: Option<&Validator<'_, T>>,
) -> Result<(), PatchError> {
    match validator {
        Some(validate) => validate(original, patched, actor).map_err(PatchError::ValidationFailed),
        None => Ok(()),
    }
}

// == Patch Pipeline ==
/// Authorize, apply, preserve and validate in the required order.
pub struct PatchPipeline<'a, T> {
    preserve: Box<Preserver<'a, T>>,
    validator: Option<Box<Validator<'a, T>>>,
}

impl<'a, T> PatchPipeline<'a, T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(preserve: impl Fn(T, &T) -> T + Send + Sync + 'a) -> Self {
        Self {
            preserve: Box::new(preserve),
            validator: None,
        }
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&T, &T, &str) -> Result<(), String> + Send + Sync + 'a,
    ) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Returns the entity to persist. Nothing is computed for an unauthorized
    /// operation list.
    pub fn run(
        &self,
        original: &T,
        operations: &[PatchOperation],
        role: Role,
        actor: &str,
    ) -> Result<T, PatchError> {
        validate_patch_authorization(operations, role)?;
        let patched = apply_patch_operations(original, operations)?;
        let patched = preserve_critical_fields(patched, original, |p, o| (self.preserve)(p, o));
        validate_patched_entity(original, &patched, actor, self.validator.as_deref())?;
        Ok(patched)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Authorization, ThreatModel};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn model() -> ThreatModel {
        let mut tm = ThreatModel::new("original", "alice");
        tm.authorization.push(Authorization::new("bob", Role::Writer));
        tm
    }

    fn preserve(mut patched: ThreatModel, original: &ThreatModel) -> ThreatModel {
        patched.id = original.id;
        patched.created_at = original.created_at;
        patched
    }

    #[test]
    fn test_replace_scalar_fields() {
        let tm = model();
        let ops = vec![
            PatchOperation::replace("/name", json!("X")),
            PatchOperation::replace("/owner", json!("newowner")),
        ];

        let patched = apply_patch_operations(&tm, &ops).unwrap();
        assert_eq!(patched.name, "X");
        assert_eq!(patched.owner, "newowner");
        assert_eq!(tm.name, "original");
    }

    #[test]
    fn test_owner_may_change_owner_writer_may_not() {
        let ops = vec![
            PatchOperation::replace("/name", json!("X")),
            PatchOperation::replace("/owner", json!("newowner")),
        ];
        assert!(validate_patch_authorization(&ops, Role::Owner).is_ok());
        assert!(matches!(
            validate_patch_authorization(&ops, Role::Writer),
            Err(PatchError::Forbidden(_))
        ));
    }

    #[test]
    fn test_replace_collection_retypes_elements() {
        let tm = model();
        let ops = vec![PatchOperation::replace(
            "/authorization",
            json!([{"principal": "carol", "role": "owner"}]),
        )];
        let patched = apply_patch_operations(&tm, &ops).unwrap();
        assert_eq!(patched.authorization, vec![Authorization::new("carol", Role::Owner)]);
    }

    #[test]
    fn test_append_and_index_into_collection() {
        let tm = model();
        let ops = vec![
            PatchOperation::add("/authorization/-", json!({"principal": "dave", "role": "reader"})),
            PatchOperation::replace("/authorization/0/role", json!("reader")),
        ];
        let patched = apply_patch_operations(&tm, &ops).unwrap();
        assert_eq!(
            patched.authorization,
            vec![
                Authorization::new("bob", Role::Reader),
                Authorization::new("dave", Role::Reader),
            ]
        );
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let tm = model();
        let ops = vec![PatchOperation::replace("/authorization/3", json!({"principal": "x", "role": "reader"}))];
        assert!(matches!(
            apply_patch_operations(&tm, &ops),
            Err(PatchError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_mistyped_value_fails() {
        let tm = model();
        let ops = vec![PatchOperation::replace("/name", json!(42))];
        assert!(matches!(
            apply_patch_operations(&tm, &ops),
            Err(PatchError::TypeMismatch(_))
        ));

        let ops = vec![PatchOperation::replace("/authorization/0/role", json!("admin"))];
        assert!(matches!(
            apply_patch_operations(&tm, &ops),
            Err(PatchError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_op_fails_and_original_is_untouched() {
        let tm = model();
        let ops = vec![
            PatchOperation::replace("/name", json!("changed")),
            PatchOperation::new("copy", "/name", json!("x")),
        ];
        assert!(matches!(
            apply_patch_operations(&tm, &ops),
            Err(PatchError::InvalidOperation(_))
        ));
        assert_eq!(tm.name, "original");
    }

    #[test]
    fn test_remove_and_add_optional_field() {
        let mut tm = model();
        tm.description = Some("d".to_string());

        let removed = apply_patch_operations(&tm, &[PatchOperation::remove("/description")]).unwrap();
        assert_eq!(removed.description, None);

        let added = apply_patch_operations(&removed, &[PatchOperation::replace("/description", json!("new"))]).unwrap();
        assert_eq!(added.description.as_deref(), Some("new"));
    }

    #[test]
    fn test_test_operation_never_mutates() {
        let tm = model();
        let ok = apply_patch_operations(&tm, &[PatchOperation::test("/name", json!("original"))]).unwrap();
        assert_eq!(ok, tm);

        assert!(matches!(
            apply_patch_operations(&tm, &[PatchOperation::test("/name", json!("other"))]),
            Err(PatchError::TestFailed(_))
        ));
    }

    #[test]
    fn test_ownership_classification() {
        let ops = vec![
            PatchOperation::test("/owner", json!("alice")),
            PatchOperation::replace("/name", json!("x")),
        ];
        assert_eq!(check_ownership_changes(&ops), (false, false));

        let ops = vec![PatchOperation::remove("/authorization/0")];
        assert_eq!(check_ownership_changes(&ops), (false, true));

        let ops = vec![PatchOperation::replace("/owner", json!("x"))];
        assert_eq!(check_ownership_changes(&ops), (true, false));

        // Prefix match alone is not enough
        let ops = vec![PatchOperation::replace("/ownership_note", json!("x"))];
        assert_eq!(check_ownership_changes(&ops), (false, false));
    }

    #[test]
    fn test_preserve_restores_immutable_fields() {
        let tm = model();
        let forged_id = uuid::Uuid::new_v4();
        let ops = vec![
            PatchOperation::replace("/id", json!(forged_id)),
            PatchOperation::replace("/created_at", json!("2001-01-01T00:00:00Z")),
        ];
        let patched = apply_patch_operations(&tm, &ops).unwrap();
        assert_eq!(patched.id, forged_id);
        assert_eq!(patched.created_at, Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());

        let preserved = preserve_critical_fields(patched, &tm, preserve);
        assert_eq!(preserved.id, tm.id);
        assert_eq!(preserved.created_at, tm.created_at);
    }

    #[test]
    fn test_validator_hook() {
        let tm = model();
        assert!(validate_patched_entity(&tm, &tm, "alice", None).is_ok());

        let reject: &Validator<'_, ThreatModel> = &|_: &ThreatModel, patched: &ThreatModel, _: &str| {
            if patched.name.is_empty() {
                Err("name is required".to_string())
            } else {
                Ok(())
            }
        };
        let mut blank = tm.clone();
        blank.name.clear();
        assert_eq!(
            validate_patched_entity(&tm, &blank, "alice", Some(reject)),
            Err(PatchError::ValidationFailed("name is required".to_string()))
        );
    }

    #[test]
    fn test_pipeline_runs_in_order() {
        let tm = model();
        let pipeline = PatchPipeline::new(preserve).with_validator(|original: &ThreatModel, patched: &ThreatModel, _| {
            // Sees the already-preserved id
            if patched.id != original.id {
                return Err("id changed".to_string());
            }
            Ok(())
        });

        let ops = vec![
            PatchOperation::replace("/id", json!(uuid::Uuid::new_v4())),
            PatchOperation::replace("/name", json!("renamed")),
        ];
        let patched = pipeline.run(&tm, &ops, Role::Writer, "bob").unwrap();
        assert_eq!(patched.id, tm.id);
        assert_eq!(patched.name, "renamed");

        let ops = vec![PatchOperation::replace("/owner", json!("bob"))];
        assert!(matches!(
            pipeline.run(&tm, &ops, Role::Writer, "bob"),
            Err(PatchError::Forbidden(_))
        ));
    }
}
