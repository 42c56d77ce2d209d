//! Key and type resolution helpers for the transform executor
//!
//! Pure decision functions: given metadata and the current transform
//! direction they compute which field keys to process, how keys map between
//! the plain and instance sides, which concrete type a discriminated field
//! resolves to, and how output structures get built.
//!
//! Copyright (c) 2026 Recast Team
//! Licensed under the Apache-2.0 license

use std::collections::HashSet;

use crate::metadata::registry::MetadataRegistry;
use crate::metadata::{ContainerKind, DeclaredType, Discriminator, ModelId};
use crate::options::{Strategy, TransformOptions};
use crate::transform::context::TypeHint;
use crate::transform::Direction;
use crate::value::{ArrayHandle, MapHandle, ObjectHandle, SetHandle, Value};

/// How one raw key maps to an internal field name and an output key.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct KeyMapping {
    /// The internal field name metadata is declared under.
    pub field_name: String,
    /// The key the value is written under in the output structure.
    pub target_key: String,
}

/// Resolve renames for one key. Going plain→instance a declared rename maps
/// the incoming plain key back to the canonical field name; in the other
/// directions only the externally visible key changes and the field is
/// still read under its internal name.
pub(crate) fn resolve_field_key_mapping(
    registry: &MetadataRegistry,
    raw_key: &str,
    target_model: Option<ModelId>,
    ignore_decorators: bool,
    direction: Direction,
) -> KeyMapping {
    let mut mapping = KeyMapping {
        field_name: raw_key.to_string(),
        target_key: raw_key.to_string(),
    };
    let Some(model) = target_model else {
        return mapping;
    };
    if ignore_decorators {
        return mapping;
    }
    match direction {
        Direction::PlainToInstance => {
            if let Some(rule) = registry.find_expose_rule_by_plain_name(model, raw_key) {
                if let Some(field) = &rule.field {
                    mapping.field_name = field.clone();
                    mapping.target_key = field.clone();
                }
            }
        }
        Direction::InstanceToPlain | Direction::InstanceToInstance => {
            if let Some(rule) = registry.find_expose_rule(model, raw_key) {
                if let Some(name) = &rule.options.name {
                    mapping.target_key = name.clone();
                }
            }
        }
    }
    mapping
}

/// Compute the definitive, de-duplicated set of field keys to process for
/// one object-like value.
pub(crate) fn select_field_keys(
    registry: &MetadataRegistry,
    options: &TransformOptions,
    target_model: Option<ModelId>,
    value: &Value,
    is_map: bool,
    depth: usize,
    direction: Direction,
) -> Vec<String> {
    let strategy = target_model
        .and_then(|model| registry.field_selection_strategy(model))
        .unwrap_or_else(|| {
            if depth > 0 {
                options
                    .nested_strategy
                    .or(options.strategy)
                    .unwrap_or(Strategy::ExposeAll)
            } else {
                options.strategy.unwrap_or(Strategy::ExposeAll)
            }
        });

    let mut keys: Vec<String> = if strategy == Strategy::ExposeAll || is_map {
        match value {
            Value::Map(handle) => handle.keys(),
            Value::Object(handle) => handle.keys(),
            _ => Vec::new(),
        }
    } else {
        Vec::new()
    };

    // expose and exclude apply to structured-object fields, never map keys
    if is_map {
        return keys;
    }

    if let Some(model) = target_model {
        if options.ignore_decorators && options.exclude_extraneous_values {
            // decorators inform which keys exist, without their selection
            // semantics
            keys = registry
                .exposed_fields(model, direction)
                .into_iter()
                .chain(registry.excluded_fields(model, direction))
                .collect();
        }

        if !options.ignore_decorators {
            let mut exposed = registry.exposed_fields(model, direction);
            if direction == Direction::PlainToInstance {
                exposed = exposed
                    .into_iter()
                    .map(|field| {
                        registry
                            .find_expose_rule(model, &field)
                            .and_then(|rule| rule.options.name.clone())
                            .unwrap_or(field)
                    })
                    .collect();
            }
            if options.exclude_extraneous_values {
                keys = exposed;
            } else {
                keys.extend(exposed);
            }

            let excluded = registry.excluded_fields(model, direction);
            if !excluded.is_empty() {
                keys.retain(|key| !excluded.contains(key));
            }

            if let Some(version) = options.version {
                keys.retain(|key| match registry.find_expose_rule(model, key) {
                    Some(rule) => check_version(rule.options.since, rule.options.until, version),
                    None => true,
                });
            }

            if options.groups.is_empty() {
                keys.retain(|key| match registry.find_expose_rule(model, key) {
                    Some(rule) => rule.options.groups.is_empty(),
                    None => true,
                });
            } else {
                keys.retain(|key| match registry.find_expose_rule(model, key) {
                    Some(rule) => check_groups(&rule.options.groups, &options.groups),
                    None => true,
                });
            }
        }
    }

    if !options.exclude_prefixes.is_empty() {
        keys.retain(|key| {
            !options
                .exclude_prefixes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
        });
    }

    let mut seen = HashSet::new();
    keys.retain(|key| seen.insert(key.clone()));
    keys
}

/// `since` is inclusive, `until` exclusive; absent bounds always pass.
pub(crate) fn check_version(since: Option<f64>, until: Option<f64>, version: f64) -> bool {
    let mut decision = true;
    if let Some(since) = since {
        decision = version >= since;
    }
    if decision {
        if let Some(until) = until {
            decision = version < until;
        }
    }
    decision
}

/// A rule declaring no groups matches every request; otherwise the declared
/// and requested group sets must intersect.
pub(crate) fn check_groups(declared: &[String], requested: &[String]) -> bool {
    if declared.is_empty() {
        return true;
    }
    requested.iter().any(|group| declared.contains(group))
}

/// Classify the runtime shape of a value as a container kind.
pub(crate) fn classify_container_kind(value: &Value) -> Option<ContainerKind> {
    match value {
        Value::Array(_) => Some(ContainerKind::Array),
        Value::Set(_) => Some(ContainerKind::Set),
        Value::Map(_) => Some(ContainerKind::Map),
        _ => None,
    }
}

/// Resolve the concrete type for a discriminated field position.
///
/// Going plain→instance the tag property in the candidate selects the
/// subtype (falling back to the declared type), and the tag is dropped from
/// the candidate unless configured to stay. Cloning instance→instance the
/// candidate's own runtime model wins. Producing plain output the matching
/// subtype's tag is stamped onto the candidate — a deliberate, minimal side
/// effect on the source value.
pub(crate) fn resolve_discriminated_type(
    discriminator: &Discriminator,
    keep_tag: bool,
    candidate: &Value,
    fallback: TypeHint,
    direction: Direction,
) -> TypeHint {
    match direction {
        Direction::PlainToInstance => {
            let tag = candidate.member(&discriminator.property);
            let matched = tag.as_str().and_then(|tag_name| {
                discriminator
                    .subtypes
                    .iter()
                    .find(|subtype| subtype.tag == tag_name)
            });
            let hint = match matched {
                Some(subtype) => TypeHint::Declared(DeclaredType::Model(subtype.model)),
                None => {
                    if candidate.is_object_like() {
                        log::debug!(
                            "discriminator '{}' unmatched; falling back to declared type",
                            discriminator.property
                        );
                    }
                    fallback
                }
            };
            if !keep_tag {
                if let Value::Object(handle) = candidate {
                    handle.remove(&discriminator.property);
                }
            }
            hint
        }
        Direction::InstanceToInstance => match candidate.model() {
            Some(model) => TypeHint::Declared(DeclaredType::Model(model)),
            None => TypeHint::None,
        },
        Direction::InstanceToPlain => {
            if let Value::Object(handle) = candidate {
                let tag = discriminator
                    .subtypes
                    .iter()
                    .find(|subtype| Some(subtype.model) == handle.model())
                    .map(|subtype| Value::String(subtype.tag.clone()))
                    .unwrap_or(Value::Undefined);
                handle.set(discriminator.property.clone(), tag);
            }
            TypeHint::None
        }
    }
}

/// Build the output container for an array-like position. Only the
/// plain→instance direction honors a declared container; a declared kind
/// that is not list-like falls back to a plain list.
pub(crate) fn create_array_like(container: Option<ContainerKind>, direction: Direction) -> Value {
    if direction == Direction::PlainToInstance {
        match container {
            Some(ContainerKind::Set) => return Value::Set(SetHandle::new()),
            Some(ContainerKind::Map) => {
                log::debug!("declared container is not list-like; using a plain list");
            }
            Some(ContainerKind::Array) | None => {}
        }
    }
    Value::Array(ArrayHandle::new())
}

pub(crate) fn append_to_array_like(out: &Value, item: Value) {
    match out {
        Value::Set(handle) => handle.insert(item),
        Value::Array(handle) => handle.push(item),
        _ => {}
    }
}

/// Build (or reuse) the destination structure for an object-like position.
/// A caller-supplied existing structure always wins; otherwise instance-
/// building directions construct a map, a model instance (through its
/// registered factory when one exists) or a plain object.
pub(crate) fn create_target_structure(
    registry: &MetadataRegistry,
    source: Option<&Value>,
    is_map: bool,
    target: &TypeHint,
    direction: Direction,
) -> Value {
    if let Some(existing) = source {
        return existing.clone();
    }
    if direction != Direction::InstanceToPlain {
        if is_map {
            return Value::Map(MapHandle::new());
        }
        if let Some(model) = target.model() {
            let handle = registry
                .model(model)
                .and_then(|decl| decl.factory.clone())
                .map(|factory| factory())
                .unwrap_or_else(|| ObjectHandle::new_instance(model));
            handle.set_model(Some(model));
            return Value::Object(handle);
        }
    }
    Value::Object(ObjectHandle::new_plain())
}

pub(crate) fn structure_member(structure: &Value, key: &str) -> Value {
    structure.member(key)
}

pub(crate) fn write_structure_member(structure: &Value, key: &str, value: Value) {
    match structure {
        Value::Map(handle) => handle.set(key, value),
        Value::Object(handle) => handle.set(key, value),
        _ => {}
    }
}

/// A computed member already present on the destination must not be
/// clobbered by incoming data, except when producing plain output.
pub(crate) fn has_conflicting_member(
    structure: &Value,
    key: &str,
    direction: Direction,
) -> bool {
    if direction == Direction::InstanceToPlain {
        return false;
    }
    match structure {
        Value::Object(handle) => matches!(handle.get(key), Some(Value::Thunk(_))),
        _ => false,
    }
}
