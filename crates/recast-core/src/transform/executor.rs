//! The recursive transform executor
//!
//! One executor exists per top-level transform invocation. Each recursive
//! step classifies its value and declared-type context once, then dispatches
//! to primitive coercion, container handling, pending-value chaining or
//! recursive field processing, applying exposure rules, discriminated
//! subtype resolution and custom field hooks along the way.
//!
//! The engine degrades gracefully: coercions that cannot produce a
//! meaningful value fall back to the platform sentinel, container
//! mismatches yield empty containers, and nothing here raises. Failures in
//! caller-supplied hooks propagate to the caller untouched.
//!
//! Copyright (c) 2026 Recast Team
//! Licensed under the Apache-2.0 license

use std::rc::{Rc, Weak};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::metadata::registry::MetadataRegistry;
use crate::metadata::{ContainerKind, DeclaredType, ModelId, ReflectedType};
use crate::options::TransformOptions;
use crate::value::Value;

use super::context::{
    NestedTransform, TransformFnParams, TransformRequest, TypeHelpContext, TypeHint,
};
use super::guard::RecursionGuard;
use super::helper;
use super::Direction;

/// Field keys that could corrupt prototype chains on the source platform;
/// never processed, wherever the data came from.
const UNSAFE_KEYS: [&str; 2] = ["__proto__", "constructor"];

pub struct TransformExecutor {
    this: Weak<TransformExecutor>,
    direction: Direction,
    options: TransformOptions,
    registry: Rc<MetadataRegistry>,
    guard: RecursionGuard,
}

impl TransformExecutor {
    pub(crate) fn new(
        direction: Direction,
        options: TransformOptions,
        registry: Rc<MetadataRegistry>,
    ) -> Rc<Self> {
        let guard = RecursionGuard::new(options.enable_circular_check);
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            direction,
            options,
            registry,
            guard,
        })
    }

    fn do_transform(&self, request: TransformRequest) -> Value {
        let TransformRequest {
            source,
            value,
            target,
            container,
            is_map_entry,
            depth,
        } = request;

        // absent values pass through; coercion never applies to them
        if value.is_null_like() {
            return value;
        }

        if container.is_none() && !is_map_entry {
            if let TypeHint::Declared(declared) = &target {
                if declared.is_primitive() {
                    return coerce_primitive(&value, *declared);
                }
            }
        }

        if value.is_array_like() {
            return self.transform_array_like(&value, source.as_ref(), &target, container, depth);
        }
        // a declared list-like container takes precedence over the runtime
        // shape: non-list input yields an empty instance of the container
        if let Some(kind @ (ContainerKind::Array | ContainerKind::Set)) = container {
            log::warn!(
                "declared {:?} container received {} input; producing an empty container",
                kind,
                value.kind_name()
            );
            return helper::create_array_like(Some(kind), self.direction);
        }

        if container.is_none() && !is_map_entry {
            if let Value::Pending(pending) = &value {
                // the one asynchronous suspension point: chain the transform
                // onto settlement of the inner value
                if let Some(executor) = self.this.upgrade() {
                    let pending = pending.clone();
                    let target = target.clone();
                    return Value::pending(async move {
                        let resolved = pending.resolve().await;
                        executor.transform(TransformRequest {
                            source: None,
                            value: resolved,
                            target,
                            container: None,
                            is_map_entry: false,
                            depth: depth + 1,
                        })
                    });
                }
            }
        }

        if !is_map_entry
            && (matches!(target, TypeHint::Declared(DeclaredType::Date))
                || matches!(value, Value::Date(_)))
        {
            return coerce_date(&value);
        }

        #[cfg(feature = "buffer")]
        if !is_map_entry
            && (matches!(target, TypeHint::Declared(DeclaredType::Bytes))
                || matches!(value, Value::Bytes(_)))
        {
            return coerce_bytes(&value);
        }

        if value.is_object_like() {
            return self.transform_object(target, &value, source.as_ref(), is_map_entry, depth);
        }

        // an already-primitive scalar with no coercion requested
        value
    }

    fn transform_array_like(
        &self,
        value: &Value,
        source: Option<&Value>,
        target: &TypeHint,
        container: Option<ContainerKind>,
        depth: usize,
    ) -> Value {
        let out = helper::create_array_like(container, self.direction);
        let items = match value {
            Value::Array(handle) => handle.items(),
            Value::Set(handle) => handle.items(),
            _ => Vec::new(),
        };
        for (index, sub_value) in items.into_iter().enumerate() {
            let sub_source = source
                .map(|existing| existing.element(index))
                .filter(|element| !element.is_undefined());

            if self.guard.contains(&sub_value) {
                // cyclic element: only cloning keeps the raw reference
                if self.direction == Direction::InstanceToInstance {
                    helper::append_to_array_like(&out, sub_value);
                }
                continue;
            }

            let element_target = match target {
                TypeHint::Rule(rule) => match &rule.options.discriminator {
                    Some(discriminator) => {
                        let help = TypeHelpContext {
                            new_object: &out,
                            object: &sub_value,
                            field: None,
                            dependencies: &self.options.dependencies,
                            nested: self,
                        };
                        let fallback = rule
                            .resolver
                            .as_ref()
                            .and_then(|resolver| resolver(&help))
                            .map(TypeHint::Declared)
                            .or(match rule.reflected {
                                Some(ReflectedType::Scalar(declared)) => {
                                    Some(TypeHint::Declared(declared))
                                }
                                _ => None,
                            })
                            .unwrap_or_default();
                        helper::resolve_discriminated_type(
                            discriminator,
                            rule.options.keep_discriminator_property,
                            &sub_value,
                            fallback,
                            self.direction,
                        )
                    }
                    None => target.clone(),
                },
                other => other.clone(),
            };

            let is_element_map =
                helper::classify_container_kind(&sub_value) == Some(ContainerKind::Map);
            let transformed = self.transform(TransformRequest {
                source: sub_source,
                value: sub_value,
                target: element_target,
                container: None,
                is_map_entry: is_element_map,
                depth: depth + 1,
            });
            helper::append_to_array_like(&out, transformed);
        }
        out
    }

    fn transform_object(
        &self,
        target: TypeHint,
        value: &Value,
        source: Option<&Value>,
        is_map: bool,
        depth: usize,
    ) -> Value {
        // with nothing declared, the value's own model wins; failing that,
        // the model of a caller-supplied existing structure
        let mut target = target;
        if matches!(target, TypeHint::None) {
            if let Some(model) = value.model() {
                target = TypeHint::Declared(DeclaredType::Model(model));
            }
        }
        if matches!(target, TypeHint::None) {
            if let Some(model) = source.and_then(|existing| existing.model()) {
                target = TypeHint::Declared(DeclaredType::Model(model));
            }
        }
        let target_model = target.model();

        self.guard.add(value);

        let keys = helper::select_field_keys(
            &self.registry,
            &self.options,
            target_model,
            value,
            is_map,
            depth,
            self.direction,
        );
        let target_structure =
            helper::create_target_structure(&self.registry, source, is_map, &target, self.direction);

        for key in keys {
            if UNSAFE_KEYS.contains(&key.as_str()) {
                continue;
            }

            let mapping = helper::resolve_field_key_mapping(
                &self.registry,
                &key,
                target_model,
                self.options.ignore_decorators,
                self.direction,
            );
            let sub_value = self.read_sub_value(value, &key);
            let sub_source = source
                .map(|existing| existing.member(&key))
                .filter(|member| !member.is_undefined());

            let rule = target_model
                .and_then(|model| self.registry.find_type_rule(model, &mapping.field_name));

            // a declared container override wins; otherwise the reflected
            // container applies only when the runtime value is a list
            let explicit_container = rule.as_ref().and_then(|rule| rule.container);
            let sub_container = match explicit_container {
                Some(ContainerKind::Map) | None => {
                    if matches!(value.member(&key), Value::Array(_)) {
                        rule.as_ref().and_then(|rule| match rule.reflected {
                            Some(ReflectedType::Container(kind)) if kind != ContainerKind::Map => {
                                Some(kind)
                            }
                            _ => None,
                        })
                    } else {
                        None
                    }
                }
                explicit => explicit,
            };

            let (sub_target, is_sub_map) = self.resolve_field_type(
                &sub_value,
                target_model,
                &target,
                is_map,
                &mapping.field_name,
                value,
                &key,
                &target_structure,
            );

            if helper::has_conflicting_member(&target_structure, &mapping.target_key, self.direction)
            {
                continue;
            }

            let transform_key = if self.direction == Direction::PlainToInstance {
                mapping.target_key.clone()
            } else {
                key.clone()
            };

            if self.guard.contains(&sub_value) {
                // cyclic field: only cloning writes anything, reusing the
                // raw reference after custom transforms
                if self.direction == Direction::InstanceToInstance {
                    let new_value = self.apply_custom_transformations(
                        sub_value,
                        target_model,
                        &key,
                        value,
                    );
                    if !new_value.is_undefined() || self.options.expose_unset_fields {
                        helper::write_structure_member(
                            &target_structure,
                            &mapping.target_key,
                            new_value,
                        );
                    }
                }
                continue;
            }

            let new_value = if self.direction == Direction::InstanceToPlain {
                // the natural read feeds the custom transforms; when they
                // change nothing, the getter-resolved sub-value is used
                let natural = value.member(&transform_key);
                let after = self.apply_custom_transformations(
                    natural.clone(),
                    target_model,
                    &transform_key,
                    value,
                );
                let pre = if natural.same(&after) { sub_value } else { after };
                self.transform(TransformRequest {
                    source: sub_source,
                    value: pre,
                    target: sub_target,
                    container: sub_container,
                    is_map_entry: is_sub_map,
                    depth: depth + 1,
                })
            } else if sub_value.is_undefined() && self.options.expose_default_values {
                // keep whatever default the fresh instance already carries
                helper::structure_member(&target_structure, &mapping.target_key)
            } else {
                let transformed = self.transform(TransformRequest {
                    source: sub_source,
                    value: sub_value,
                    target: sub_target,
                    container: sub_container,
                    is_map_entry: is_sub_map,
                    depth: depth + 1,
                });
                self.apply_custom_transformations(transformed, target_model, &transform_key, value)
            };

            if !new_value.is_undefined() || self.options.expose_unset_fields {
                helper::write_structure_member(&target_structure, &mapping.target_key, new_value);
            }
        }

        self.guard.remove(value);
        target_structure
    }

    /// Read one member of the value being transformed. Plain→instance reads
    /// are plain property reads only — callables found on untrusted plain
    /// input are never invoked. Instance reads resolve computed fields.
    fn read_sub_value(&self, value: &Value, key: &str) -> Value {
        let raw = value.member(key);
        if self.direction == Direction::PlainToInstance {
            return raw;
        }
        match raw {
            Value::Thunk(thunk) => thunk.call(),
            other => other,
        }
    }

    /// Determine the declared target type for one field, and whether the
    /// field must be treated as a nested map. The map-ness combines the
    /// declared rule with the runtime shape of the sub-value.
    #[allow(clippy::too_many_arguments)]
    fn resolve_field_type(
        &self,
        sub_value: &Value,
        target_model: Option<ModelId>,
        target: &TypeHint,
        is_map: bool,
        field_name: &str,
        value: &Value,
        raw_key: &str,
        new_structure: &Value,
    ) -> (TypeHint, bool) {
        let mut is_sub_map =
            helper::classify_container_kind(sub_value) == Some(ContainerKind::Map);

        // entries of a map uniformly take the map's declared element type
        if is_map && !matches!(target, TypeHint::None) {
            return (target.clone(), is_sub_map);
        }

        let Some(model) = target_model else {
            return (TypeHint::None, is_sub_map);
        };

        if let Some(rule) = self.registry.find_type_rule(model, field_name) {
            let help = TypeHelpContext {
                new_object: new_structure,
                object: value,
                field: Some(field_name),
                dependencies: &self.options.dependencies,
                nested: self,
            };
            let new_type = rule
                .resolver
                .as_ref()
                .and_then(|resolver| resolver(&help))
                .map(TypeHint::Declared)
                .or(match rule.reflected {
                    Some(ReflectedType::Scalar(declared)) => Some(TypeHint::Declared(declared)),
                    _ => None,
                })
                .unwrap_or_default();

            let hint = match &rule.options.discriminator {
                Some(discriminator) => {
                    if matches!(value.member(raw_key), Value::Array(_)) {
                        // defer per-element resolution to the array branch
                        TypeHint::Rule(Rc::clone(&rule))
                    } else {
                        helper::resolve_discriminated_type(
                            discriminator,
                            rule.options.keep_discriminator_property,
                            sub_value,
                            new_type,
                            self.direction,
                        )
                    }
                }
                None => new_type,
            };

            is_sub_map = is_sub_map
                || matches!(rule.reflected, Some(ReflectedType::Container(ContainerKind::Map)))
                || rule.container == Some(ContainerKind::Map);
            return (hint, is_sub_map);
        }

        if !self.options.target_maps.is_empty() {
            let mut hint = TypeHint::None;
            for map in self
                .options
                .target_maps
                .iter()
                .filter(|map| map.target == model)
            {
                if let Some(declared) = map.properties.get(field_name) {
                    hint = TypeHint::Declared(*declared);
                }
            }
            return (hint, is_sub_map);
        }

        if self.options.enable_implicit_conversion && self.direction == Direction::PlainToInstance
        {
            let hint = self
                .registry
                .reflected_field_type(model, field_name)
                .map(TypeHint::Declared)
                .unwrap_or_default();
            return (hint, is_sub_map);
        }

        (TypeHint::None, is_sub_map)
    }

    /// Thread the value through the stacked custom transforms declared for
    /// this field, filtered by the requested version and groups.
    fn apply_custom_transformations(
        &self,
        mut value: Value,
        target_model: Option<ModelId>,
        key: &str,
        obj: &Value,
    ) -> Value {
        let Some(model) = target_model else {
            return value;
        };
        let mut rules = self.registry.find_transform_rules(model, key, self.direction);

        if let Some(version) = self.options.version {
            rules.retain(|rule| {
                helper::check_version(rule.options.since, rule.options.until, version)
            });
        }
        if self.options.groups.is_empty() {
            rules.retain(|rule| rule.options.groups.is_empty());
        } else {
            rules.retain(|rule| helper::check_groups(&rule.options.groups, &self.options.groups));
        }

        for rule in rules {
            value = (rule.transform)(TransformFnParams {
                value,
                key,
                obj: obj.clone(),
                direction: self.direction,
                options: &self.options,
                dependencies: &self.options.dependencies,
                nested: self,
            });
        }
        value
    }
}

impl NestedTransform for TransformExecutor {
    fn transform(&self, request: TransformRequest) -> Value {
        match &self.options.transformation_handler {
            Some(handler) => handler(request, self),
            None => self.do_transform(request),
        }
    }

    fn transform_default(&self, request: TransformRequest) -> Value {
        self.do_transform(request)
    }
}

fn coerce_primitive(value: &Value, target: DeclaredType) -> Value {
    match target {
        DeclaredType::String => Value::String(value.to_text()),
        DeclaredType::Number => Value::Number(value.to_number()),
        DeclaredType::Boolean => Value::Bool(value.truthy()),
        DeclaredType::BigInt => coerce_bigint(value),
        _ => value.clone(),
    }
}

fn coerce_bigint(value: &Value) -> Value {
    match value {
        Value::BigInt(n) => Value::BigInt(*n),
        Value::Number(n) if n.is_finite() => Value::BigInt(*n as i128),
        Value::Bool(b) => Value::BigInt(i128::from(*b)),
        Value::String(s) => s
            .trim()
            .parse::<i128>()
            .map(Value::BigInt)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_date(value: &Value) -> Value {
    match value {
        Value::Date(existing) => Value::Date(*existing),
        Value::Number(millis) if millis.is_finite() => {
            DateTime::from_timestamp_millis(*millis as i64)
                .map(Value::Date)
                .unwrap_or(Value::Null)
        }
        Value::String(text) => parse_date(text).map(Value::Date).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

#[cfg(feature = "buffer")]
fn coerce_bytes(value: &Value) -> Value {
    match value {
        Value::Bytes(bytes) => Value::Bytes(bytes.clone()),
        Value::String(text) => Value::Bytes(text.clone().into_bytes()),
        Value::Array(items) => Value::Bytes(
            items
                .items()
                .iter()
                .map(|item| item.to_number() as u8)
                .collect(),
        ),
        other => other.clone(),
    }
}
