//! End-to-end integration tests for the transformation engine
//!
//! Each test builds a private metadata registry so scenarios stay isolated.

use std::collections::HashMap;
use std::rc::Rc;

use recast_core::{
    Dependencies, Discriminator, DiscriminatorSubtype, ExcludeRule, ExposeRule, MetadataRegistry,
    ModelDecl, ModelId, ContainerKind, DeclaredType, Strategy, TargetTypeMap, TransformOptions,
    TransformRule, Transformer, TypeRule, Value,
};
use recast_core::value::ObjectHandle;

const USER: ModelId = ModelId::new("User");
const USER_DATA: ModelId = ModelId::new("UserData");
const ADDRESS: ModelId = ModelId::new("Address");
const BASE: ModelId = ModelId::new("Base");
const CHILD: ModelId = ModelId::new("Child");
const CAT: ModelId = ModelId::new("Cat");
const DOG: ModelId = ModelId::new("Dog");

fn transformer() -> (Rc<MetadataRegistry>, Transformer) {
    let registry = Rc::new(MetadataRegistry::new());
    let transformer = Transformer::with_registry(Rc::clone(&registry));
    (registry, transformer)
}

fn options() -> TransformOptions {
    TransformOptions::default()
}

// -------------------------------------------------------------------------
// Round-trips and idempotence
// -------------------------------------------------------------------------

#[test]
fn primitive_fields_round_trip() {
    let (_registry, transformer) = transformer();
    let user = Value::instance(
        USER,
        [
            ("name", Value::from("Umed")),
            ("age", Value::from(27)),
            ("active", Value::from(true)),
        ],
    );

    let plain = transformer.instance_to_plain(&user, &options());
    assert!(plain.model().is_none());
    assert_eq!(plain.member("name"), Value::from("Umed"));

    let back = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(back, user);
}

#[test]
fn plain_to_instance_is_idempotent() {
    let (_registry, transformer) = transformer();
    let plain = Value::object([
        ("name", Value::from("Umed")),
        ("nested", Value::object([("deep", Value::from(1))])),
    ]);

    let once = transformer.plain_to_instance(USER, &plain, &options());
    let twice = transformer.plain_to_instance(USER, &once, &options());
    assert_eq!(once, twice);
}

#[test]
fn instance_to_instance_clones_into_fresh_structures() {
    let (_registry, transformer) = transformer();
    let user = Value::instance(
        USER,
        [
            ("name", Value::from("Umed")),
            ("tags", Value::array([Value::from("a"), Value::from("b")])),
        ],
    );

    let clone = transformer.instance_to_instance(&user, &options());
    assert_eq!(clone, user);
    assert!(!clone.same(&user));
    assert_eq!(clone.model(), Some(USER));
    // nested containers are cloned, not aliased
    assert!(!clone.member("tags").same(&user.member("tags")));
}

// -------------------------------------------------------------------------
// Exposure, exclusion and strategies
// -------------------------------------------------------------------------

#[test]
fn exclude_all_strategy_keeps_only_exposed_fields() {
    let (registry, transformer) = transformer();
    registry.add_exclude_rule(ExcludeRule::class(USER));
    registry.add_expose_rule(ExposeRule::field(USER, "a"));
    registry.add_expose_rule(ExposeRule::field(USER, "b"));

    let user = Value::instance(
        USER,
        [
            ("a", Value::from(1)),
            ("b", Value::from(2)),
            ("c", Value::from(3)),
        ],
    );
    let plain = transformer.instance_to_plain(&user, &options());

    assert_eq!(plain.member("a"), Value::from(1));
    assert_eq!(plain.member("b"), Value::from(2));
    assert!(plain.member("c").is_undefined());
}

#[test]
fn nested_strategy_overrides_depth_below_root() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "name"));
    registry.add_expose_rule(ExposeRule::field(USER, "data"));

    let user = Value::instance(
        USER,
        [
            ("name", Value::from("Umed")),
            ("data", Value::object([("prop1", Value::from("random"))])),
        ],
    );

    let strict = options().strategy(Strategy::ExcludeAll);
    let plain = transformer.instance_to_plain(&user, &strict);
    assert_eq!(plain.member("name"), Value::from("Umed"));
    let data = plain.member("data");
    assert!(data.as_object().is_some_and(ObjectHandle::is_empty));

    let relaxed = options()
        .strategy(Strategy::ExcludeAll)
        .nested_strategy(Strategy::ExposeAll);
    let plain = transformer.instance_to_plain(&user, &relaxed);
    assert_eq!(plain.member("data").member("prop1"), Value::from("random"));
}

#[test]
fn direction_scoped_exclusion_applies_one_way() {
    let (registry, transformer) = transformer();
    registry.add_exclude_rule(ExcludeRule::field(USER, "secret").to_plain_only());

    let user = Value::instance(
        USER,
        [("name", Value::from("U")), ("secret", Value::from("s"))],
    );
    let plain = transformer.instance_to_plain(&user, &options());
    assert!(plain.member("secret").is_undefined());

    let source = Value::object([("name", Value::from("U")), ("secret", Value::from("s"))]);
    let instance = transformer.plain_to_instance(USER, &source, &options());
    assert_eq!(instance.member("secret"), Value::from("s"));
}

#[test]
fn excluded_prefixes_drop_matching_keys() {
    let (_registry, transformer) = transformer();
    let user = Value::instance(
        USER,
        [("_internal", Value::from(1)), ("visible", Value::from(2))],
    );
    let plain =
        transformer.instance_to_plain(&user, &options().exclude_prefixes(["_"]));
    assert!(plain.member("_internal").is_undefined());
    assert_eq!(plain.member("visible"), Value::from(2));
}

#[test]
fn inherited_exposure_composes_with_own_rules() {
    let (registry, transformer) = transformer();
    registry
        .register_model(CHILD, ModelDecl::new().parent(BASE))
        .unwrap();
    registry.add_expose_rule(ExposeRule::field(BASE, "id"));
    registry.add_expose_rule(ExposeRule::field(CHILD, "name"));
    registry.add_exclude_rule(ExcludeRule::class(CHILD));

    let child = Value::instance(
        CHILD,
        [
            ("id", Value::from(7)),
            ("name", Value::from("c")),
            ("noise", Value::from("x")),
        ],
    );
    let plain = transformer.instance_to_plain(&child, &options());
    assert_eq!(plain.member("id"), Value::from(7));
    assert_eq!(plain.member("name"), Value::from("c"));
    assert!(plain.member("noise").is_undefined());
}

#[test]
fn ignore_decorators_bypasses_selection_and_renames() {
    let (registry, transformer) = transformer();
    registry.add_exclude_rule(ExcludeRule::field(USER, "secret"));
    registry.add_expose_rule(ExposeRule::field(USER, "name").renamed("fullName"));

    let user = Value::instance(
        USER,
        [("name", Value::from("U")), ("secret", Value::from("s"))],
    );
    let plain = transformer.instance_to_plain(&user, &options().ignore_decorators());
    assert_eq!(plain.member("name"), Value::from("U"));
    assert_eq!(plain.member("secret"), Value::from("s"));
    assert!(plain.member("fullName").is_undefined());
}

// -------------------------------------------------------------------------
// Renames
// -------------------------------------------------------------------------

#[test]
fn renames_apply_in_both_directions() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "first_name").renamed("firstName"));

    let user = Value::instance(USER, [("first_name", Value::from("Umed"))]);
    let plain = transformer.instance_to_plain(&user, &options());
    assert_eq!(plain.member("firstName"), Value::from("Umed"));
    assert!(plain.member("first_name").is_undefined());

    let back = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(back.member("first_name"), Value::from("Umed"));
    assert!(back.member("firstName").is_undefined());
}

// -------------------------------------------------------------------------
// Typed containers
// -------------------------------------------------------------------------

#[test]
fn declared_array_of_models_builds_typed_elements() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "name"));
    registry.add_expose_rule(ExposeRule::field(USER, "data"));
    registry.add_expose_rule(ExposeRule::field(USER_DATA, "value"));
    registry.add_type_rule(
        TypeRule::new(USER, "data")
            .container(ContainerKind::Array)
            .of_type(DeclaredType::Model(USER_DATA)),
    );

    let plain = Value::object([
        ("name", Value::from("yoo")),
        (
            "data",
            Value::array([
                Value::object([("value", Value::from("abc"))]),
                Value::object([("value", Value::from("def"))]),
            ]),
        ),
    ]);
    let instance = transformer.plain_to_instance(
        USER,
        &plain,
        &options().exclude_extraneous_values(),
    );

    let data = instance.member("data");
    match &data {
        Value::Array(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items.get(0).unwrap().model(), Some(USER_DATA));
            assert_eq!(items.get(1).unwrap().member("value"), Value::from("def"));
        }
        other => panic!("expected array, got {other:?}"),
    }
}

#[test]
fn wrong_shape_for_declared_array_yields_empty_container() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "data"));
    registry.add_type_rule(
        TypeRule::new(USER, "data")
            .container(ContainerKind::Array)
            .of_type(DeclaredType::Model(USER_DATA)),
    );

    let plain = Value::object([("data", Value::object([("value", Value::from("abc"))]))]);
    let instance = transformer.plain_to_instance(
        USER,
        &plain,
        &options().exclude_extraneous_values(),
    );

    match instance.member("data") {
        Value::Array(items) => assert!(items.is_empty()),
        other => panic!("expected empty array, got {other:?}"),
    }
}

#[test]
fn declared_set_round_trips_through_plain_arrays() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(
        TypeRule::new(USER, "data")
            .container(ContainerKind::Set)
            .of_type(DeclaredType::Model(USER_DATA)),
    );

    let plain = Value::object([(
        "data",
        Value::array([
            Value::object([("value", Value::from("abc"))]),
            Value::object([("value", Value::from("def"))]),
        ]),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());

    match instance.member("data") {
        Value::Set(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items.get(0).unwrap().model(), Some(USER_DATA));
        }
        other => panic!("expected set, got {other:?}"),
    }

    let back = transformer.instance_to_plain(&instance, &options());
    assert_eq!(back, plain);
}

#[test]
fn declared_map_of_strings_round_trips_through_plain_objects() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(
        TypeRule::new(USER, "weights")
            .container(ContainerKind::Map)
            .of_type(DeclaredType::String),
    );

    let plain = Value::object([(
        "weights",
        Value::object([("foo", Value::from("abc")), ("bar", Value::from("def"))]),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());

    match instance.member("weights") {
        Value::Map(map) => {
            assert_eq!(map.len(), 2);
            assert_eq!(map.get("foo"), Some(Value::from("abc")));
            assert_eq!(map.get("bar"), Some(Value::from("def")));
        }
        other => panic!("expected map, got {other:?}"),
    }

    let back = transformer.instance_to_plain(&instance, &options());
    assert_eq!(back, plain);
}

// -------------------------------------------------------------------------
// Primitive, date and buffer coercion
// -------------------------------------------------------------------------

#[test]
fn declared_primitives_coerce_without_failing() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "age").of_type(DeclaredType::Number));
    registry.add_type_rule(TypeRule::new(USER, "label").of_type(DeclaredType::String));
    registry.add_type_rule(TypeRule::new(USER, "flag").of_type(DeclaredType::Boolean));

    let plain = Value::object([
        ("age", Value::from("27")),
        ("label", Value::from(12)),
        ("flag", Value::from("yes")),
    ]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(instance.member("age"), Value::from(27));
    assert_eq!(instance.member("label"), Value::from("12"));
    assert_eq!(instance.member("flag"), Value::from(true));

    // unparseable numeric input degrades to NaN instead of failing
    let junk = Value::object([("age", Value::from("junk"))]);
    let instance = transformer.plain_to_instance(USER, &junk, &options());
    assert!(instance
        .member("age")
        .as_number()
        .is_some_and(f64::is_nan));
}

#[test]
fn null_and_absent_values_pass_through_untouched() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "age").of_type(DeclaredType::Number));

    let plain = Value::object([("age", Value::Null)]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(instance.member("age"), Value::Null);
    assert!(instance.member("missing").is_undefined());
}

#[test]
fn declared_dates_clone_and_parse() {
    use chrono::{TimeZone, Utc};
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "created").of_type(DeclaredType::Date));

    let moment = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let plain = Value::object([("created", Value::from("2024-05-01T12:00:00Z"))]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(instance.member("created"), Value::Date(moment));

    // an unparseable date degrades to the "no value" sentinel
    let junk = Value::object([("created", Value::from("whenever"))]);
    let instance = transformer.plain_to_instance(USER, &junk, &options());
    assert_eq!(instance.member("created"), Value::Null);
}

#[cfg(feature = "buffer")]
#[test]
fn declared_buffers_copy_construct() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "blob").of_type(DeclaredType::Bytes));

    let plain = Value::object([("blob", Value::from("hi"))]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(instance.member("blob"), Value::Bytes(vec![b'h', b'i']));
}

// -------------------------------------------------------------------------
// Groups and versions
// -------------------------------------------------------------------------

#[test]
fn group_scoped_fields_require_matching_request() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "email").groups(["admin"]));

    let user = Value::instance(
        USER,
        [("name", Value::from("U")), ("email", Value::from("u@x"))],
    );

    let plain = transformer.instance_to_plain(&user, &options());
    assert!(plain.member("email").is_undefined());

    let plain = transformer.instance_to_plain(&user, &options().groups(["user"]));
    assert!(plain.member("email").is_undefined());

    let plain = transformer.instance_to_plain(&user, &options().groups(["admin"]));
    assert_eq!(plain.member("email"), Value::from("u@x"));
}

#[test]
fn version_windows_gate_fields() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "handle").since(2.0));
    registry.add_expose_rule(ExposeRule::field(USER, "legacy").until(2.0));

    let user = Value::instance(
        USER,
        [("handle", Value::from("h")), ("legacy", Value::from("l"))],
    );

    let v1 = transformer.instance_to_plain(&user, &options().version(1.0));
    assert!(v1.member("handle").is_undefined());
    assert_eq!(v1.member("legacy"), Value::from("l"));

    let v2 = transformer.instance_to_plain(&user, &options().version(2.0));
    assert_eq!(v2.member("handle"), Value::from("h"));
    assert!(v2.member("legacy").is_undefined());

    // no requested version skips the filter entirely
    let unversioned = transformer.instance_to_plain(&user, &options());
    assert_eq!(unversioned.member("handle"), Value::from("h"));
    assert_eq!(unversioned.member("legacy"), Value::from("l"));
}

// -------------------------------------------------------------------------
// Discriminated unions
// -------------------------------------------------------------------------

fn pet_discriminator() -> Discriminator {
    Discriminator {
        property: "kind".to_string(),
        subtypes: vec![
            DiscriminatorSubtype {
                tag: "cat".to_string(),
                model: CAT,
            },
            DiscriminatorSubtype {
                tag: "dog".to_string(),
                model: DOG,
            },
        ],
    }
}

#[test]
fn discriminator_selects_subtype_and_drops_tag() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "pet").discriminator(pet_discriminator()));

    let plain = Value::object([(
        "pet",
        Value::object([("kind", Value::from("dog")), ("bark", Value::from(true))]),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());

    let pet = instance.member("pet");
    assert_eq!(pet.model(), Some(DOG));
    assert_eq!(pet.member("bark"), Value::from(true));
    assert!(pet.member("kind").is_undefined());
}

#[test]
fn discriminator_can_keep_the_tag_property() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(
        TypeRule::new(USER, "pet")
            .discriminator(pet_discriminator())
            .keep_discriminator_property(true),
    );

    let plain = Value::object([(
        "pet",
        Value::object([("kind", Value::from("cat")), ("purr", Value::from(true))]),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());
    let pet = instance.member("pet");
    assert_eq!(pet.model(), Some(CAT));
    assert_eq!(pet.member("kind"), Value::from("cat"));
}

#[test]
fn discriminator_stamps_tag_when_producing_plain() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "pet").discriminator(pet_discriminator()));

    let user = Value::instance(
        USER,
        [("pet", Value::instance(DOG, [("bark", Value::from(true))]))],
    );
    let plain = transformer.instance_to_plain(&user, &options());
    let pet = plain.member("pet");
    assert_eq!(pet.member("kind"), Value::from("dog"));
    assert_eq!(pet.member("bark"), Value::from(true));
}

#[test]
fn discriminated_arrays_resolve_per_element() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "pets").discriminator(pet_discriminator()));

    let plain = Value::object([(
        "pets",
        Value::array([
            Value::object([("kind", Value::from("cat")), ("purr", Value::from(true))]),
            Value::object([("kind", Value::from("dog")), ("bark", Value::from(true))]),
        ]),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());

    match instance.member("pets") {
        Value::Array(items) => {
            assert_eq!(items.get(0).unwrap().model(), Some(CAT));
            assert_eq!(items.get(1).unwrap().model(), Some(DOG));
        }
        other => panic!("expected array, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// Custom transforms
// -------------------------------------------------------------------------

#[test]
fn stacked_transforms_run_most_recent_first() {
    let (registry, transformer) = transformer();
    let suffix = |tag: &'static str| {
        move |params: recast_core::TransformFnParams<'_>| {
            Value::String(format!("{}{tag}", params.value.to_text()))
        }
    };
    registry.add_transform_rule(TransformRule::new(USER, "name", suffix("-first")));
    registry.add_transform_rule(TransformRule::new(USER, "name", suffix("-second")));

    let user = Value::instance(USER, [("name", Value::from("x"))]);
    let plain = transformer.instance_to_plain(&user, &options());
    // declared top-to-bottom, executed bottom-up
    assert_eq!(plain.member("name"), Value::from("x-second-first"));
}

#[test]
fn transforms_filter_by_direction_groups_and_version() {
    let (registry, transformer) = transformer();
    registry.add_transform_rule(
        TransformRule::new(USER, "a", |params| {
            Value::String(params.value.to_text().to_uppercase())
        })
        .to_plain_only(),
    );
    registry.add_transform_rule(
        TransformRule::new(USER, "b", |params| {
            Value::String(format!("{}!", params.value.to_text()))
        })
        .groups(["loud"]),
    );
    registry.add_transform_rule(
        TransformRule::new(USER, "c", |params| {
            Value::String(format!("v2:{}", params.value.to_text()))
        })
        .since(2.0),
    );

    let user = Value::instance(
        USER,
        [
            ("a", Value::from("x")),
            ("b", Value::from("y")),
            ("c", Value::from("z")),
        ],
    );

    // group-scoped rules need a matching request; versioned rules only
    // filter when a version is requested at all
    let plain = transformer.instance_to_plain(&user, &options());
    assert_eq!(plain.member("a"), Value::from("X"));
    assert_eq!(plain.member("b"), Value::from("y"));
    assert_eq!(plain.member("c"), Value::from("v2:z"));

    let plain = transformer.instance_to_plain(&user, &options().version(1.0));
    assert_eq!(plain.member("c"), Value::from("z"));
    let plain = transformer.instance_to_plain(&user, &options().version(3.0));
    assert_eq!(plain.member("c"), Value::from("v2:z"));

    let plain = transformer.instance_to_plain(&user, &options().groups(["loud"]));
    assert_eq!(plain.member("b"), Value::from("y!"));

    // the plain-only rule is filtered out going to an instance
    let source = Value::object([("a", Value::from("x"))]);
    let instance = transformer.plain_to_instance(USER, &source, &options());
    assert_eq!(instance.member("a"), Value::from("x"));
}

#[test]
fn transforms_receive_dependencies() {
    struct Prefixer {
        prefix: &'static str,
    }

    let (registry, transformer) = transformer();
    registry.add_transform_rule(TransformRule::new(USER, "name", |params| {
        let prefixer = params
            .dependencies
            .get::<Prefixer>("prefixer")
            .expect("registered dependency");
        Value::String(format!("{}{}", prefixer.prefix, params.value.to_text()))
    }));

    let user = Value::instance(USER, [("name", Value::from("x"))]);
    let deps = Dependencies::new().with("prefixer", Rc::new(Prefixer { prefix: ">" }));
    let plain = transformer.instance_to_plain(&user, &options().dependencies(deps));
    assert_eq!(plain.member("name"), Value::from(">x"));
}

// -------------------------------------------------------------------------
// Defaults, unset fields and computed members
// -------------------------------------------------------------------------

fn user_with_default_role() -> ModelDecl {
    ModelDecl::new().factory(|| {
        let handle = ObjectHandle::new_instance(USER);
        handle.set("role", Value::from("guest"));
        handle
    })
}

#[test]
fn expose_default_values_keeps_factory_defaults() {
    let (registry, transformer) = transformer();
    registry.register_model(USER, user_with_default_role()).unwrap();
    registry.add_expose_rule(ExposeRule::field(USER, "role"));

    let empty = Value::object(Vec::<(&str, Value)>::new());
    let opts = options().expose_default_values().expose_unset_fields();
    let instance = transformer.plain_to_instance(USER, &empty, &opts);
    assert_eq!(instance.member("role"), Value::from("guest"));

    // without the option an explicit unset overwrites the default
    let opts = options().expose_unset_fields();
    let instance = transformer.plain_to_instance(USER, &empty, &opts);
    assert!(instance.member("role").is_undefined());
}

#[test]
fn unset_fields_are_omitted_unless_requested() {
    let (registry, transformer) = transformer();
    registry.add_expose_rule(ExposeRule::field(USER, "nickname"));

    let empty = Value::object(Vec::<(&str, Value)>::new());
    let instance = transformer.plain_to_instance(USER, &empty, &options());
    assert!(!instance.as_object().unwrap().has("nickname"));

    let instance =
        transformer.plain_to_instance(USER, &empty, &options().expose_unset_fields());
    assert!(instance.as_object().unwrap().has("nickname"));
    assert!(instance.member("nickname").is_undefined());
}

#[test]
fn computed_members_resolve_to_plain_but_resist_overwrites() {
    let (registry, transformer) = transformer();
    registry
        .register_model(
            USER,
            ModelDecl::new().factory(|| {
                let handle = ObjectHandle::new_instance(USER);
                handle.set("display", Value::thunk(|| Value::from("computed")));
                handle
            }),
        )
        .unwrap();

    // reading an instance invokes the computed member
    let user = Value::instance(USER, [("name", Value::from("U"))]);
    user.as_object()
        .unwrap()
        .set("display", Value::thunk(|| Value::from("U (display)")));
    let plain = transformer.instance_to_plain(&user, &options());
    assert_eq!(plain.member("display"), Value::from("U (display)"));

    // incoming plain data cannot clobber the computed member
    let hostile = Value::object([("display", Value::from("evil"))]);
    let instance = transformer.plain_to_instance(USER, &hostile, &options());
    assert!(matches!(instance.member("display"), Value::Thunk(_)));
}

#[test]
fn unsafe_keys_are_never_processed() {
    let (_registry, transformer) = transformer();
    let hostile = Value::object([
        ("__proto__", Value::object([("polluted", Value::from(1))])),
        ("constructor", Value::from("x")),
        ("safe", Value::from(2)),
    ]);
    let instance = transformer.plain_to_instance(USER, &hostile, &options());
    assert!(instance.member("__proto__").is_undefined());
    assert!(instance.member("constructor").is_undefined());
    assert_eq!(instance.member("safe"), Value::from(2));
}

// -------------------------------------------------------------------------
// Circular references
// -------------------------------------------------------------------------

#[test]
fn circular_clone_terminates_and_preserves_the_reference() {
    let (_registry, transformer) = transformer();
    let handle = ObjectHandle::new_instance(USER);
    let user = Value::Object(handle.clone());
    handle.set("name", Value::from("U"));
    handle.set("this", user.clone());

    let clone =
        transformer.instance_to_instance(&user, &options().enable_circular_check());
    assert!(!clone.same(&user));
    assert_eq!(clone.member("name"), Value::from("U"));
    // the cyclic reference survives as a reference rather than recursing
    assert!(clone.member("this").same(&user));
}

#[test]
fn circular_fields_are_omitted_when_producing_plain() {
    let (_registry, transformer) = transformer();
    let handle = ObjectHandle::new_instance(USER);
    let user = Value::Object(handle.clone());
    handle.set("name", Value::from("U"));
    handle.set("this", user.clone());

    let plain = transformer.instance_to_plain(&user, &options().enable_circular_check());
    assert_eq!(plain.member("name"), Value::from("U"));
    assert!(plain.member("this").is_undefined());
}

// -------------------------------------------------------------------------
// Populating existing structures
// -------------------------------------------------------------------------

#[test]
fn plain_to_instance_into_merges_into_the_given_instance() {
    let (_registry, transformer) = transformer();
    let existing = Value::instance(
        USER,
        [("name", Value::from("old")), ("kept", Value::from(1))],
    );
    let plain = Value::object([("name", Value::from("new"))]);

    let result = transformer.plain_to_instance_into(&existing, &plain, &options());
    // the caller-supplied structure is mutated and returned
    assert!(result.same(&existing));
    assert_eq!(existing.member("name"), Value::from("new"));
    assert_eq!(existing.member("kept"), Value::from(1));
}

#[test]
fn instance_to_plain_into_fills_the_given_plain_target() {
    let (_registry, transformer) = transformer();
    let user = Value::instance(USER, [("name", Value::from("U"))]);
    let target = Value::object([("stale", Value::from(9))]);

    let result = transformer.instance_to_plain_into(&user, &target, &options());
    assert!(result.same(&target));
    assert_eq!(target.member("name"), Value::from("U"));
    assert_eq!(target.member("stale"), Value::from(9));
}

// -------------------------------------------------------------------------
// Implicit conversion and out-of-band type maps
// -------------------------------------------------------------------------

#[test]
fn implicit_conversion_uses_declared_field_types() {
    let (registry, transformer) = transformer();
    registry
        .register_model(
            USER,
            ModelDecl::new().reflected_field("age", DeclaredType::Number),
        )
        .unwrap();

    let plain = Value::object([("age", Value::from("42"))]);

    let instance = transformer.plain_to_instance(USER, &plain, &options());
    assert_eq!(instance.member("age"), Value::from("42"));

    let instance = transformer.plain_to_instance(
        USER,
        &plain,
        &options().enable_implicit_conversion(),
    );
    assert_eq!(instance.member("age"), Value::from(42));
}

#[test]
fn target_maps_declare_types_out_of_band() {
    let (_registry, transformer) = transformer();
    let mut properties = HashMap::new();
    properties.insert("address".to_string(), DeclaredType::Model(ADDRESS));
    let opts = options().target_map(TargetTypeMap {
        target: USER,
        properties,
    });

    let plain = Value::object([(
        "address",
        Value::object([("city", Value::from("Dushanbe"))]),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &opts);
    assert_eq!(instance.member("address").model(), Some(ADDRESS));
}

// -------------------------------------------------------------------------
// Dispatch override
// -------------------------------------------------------------------------

#[test]
fn transformation_handler_overrides_every_step() {
    let (_registry, transformer) = transformer();
    let handler: recast_core::transform::context::TransformHandlerFn =
        Rc::new(|request, nested| {
            if matches!(request.value, Value::String(_)) {
                Value::from("intercepted")
            } else {
                nested.transform_default(request)
            }
        });

    let user = Value::instance(
        USER,
        [("name", Value::from("x")), ("age", Value::from(1))],
    );
    let plain = transformer.instance_to_plain(
        &user,
        &options().transformation_handler(handler),
    );
    assert_eq!(plain.member("name"), Value::from("intercepted"));
    assert_eq!(plain.member("age"), Value::from(1));
}

// -------------------------------------------------------------------------
// Pending asynchronous values
// -------------------------------------------------------------------------

#[tokio::test]
async fn pending_field_values_chain_the_transform() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(
        TypeRule::new(USER, "address").of_type(DeclaredType::Model(ADDRESS)),
    );

    let plain = Value::object([(
        "address",
        Value::pending(async { Value::object([("city", Value::from("Dushanbe"))]) }),
    )]);
    let instance = transformer.plain_to_instance(USER, &plain, &options());

    match instance.member("address") {
        Value::Pending(pending) => {
            let resolved = pending.resolve().await;
            assert_eq!(resolved.model(), Some(ADDRESS));
            assert_eq!(resolved.member("city"), Value::from("Dushanbe"));
        }
        other => panic!("expected pending value, got {other:?}"),
    }
}

#[tokio::test]
async fn top_level_pending_values_resolve_transformed() {
    let (_registry, transformer) = transformer();
    let source = Value::pending(async {
        Value::instance(USER, [("name", Value::from("U"))])
    });
    let result = transformer.instance_to_plain(&source, &options());

    match result {
        Value::Pending(pending) => {
            let plain = pending.resolve().await;
            assert!(plain.model().is_none());
            assert_eq!(plain.member("name"), Value::from("U"));
        }
        other => panic!("expected pending value, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// String (de)serialization
// -------------------------------------------------------------------------

#[test]
fn serialize_applies_rules_before_encoding() {
    let (registry, transformer) = transformer();
    registry.add_exclude_rule(ExcludeRule::field(USER, "password"));
    registry.add_expose_rule(ExposeRule::field(USER, "name").renamed("fullName"));

    let user = Value::instance(
        USER,
        [
            ("name", Value::from("Umed")),
            ("password", Value::from("secret")),
        ],
    );
    let encoded = transformer.serialize(&user, &options()).unwrap();
    assert_eq!(encoded, r#"{"fullName":"Umed"}"#);
}

#[test]
fn deserialize_single_and_array_variants() {
    let (registry, transformer) = transformer();
    registry.add_type_rule(TypeRule::new(USER, "age").of_type(DeclaredType::Number));

    let single = transformer
        .deserialize(USER, r#"{"age":"27"}"#, &options())
        .unwrap();
    assert_eq!(single.model(), Some(USER));
    assert_eq!(single.member("age"), Value::from(27));

    let many = transformer
        .deserialize_array(USER, r#"[{"age":1},{"age":2}]"#, &options())
        .unwrap();
    match many {
        Value::Array(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items.get(0).unwrap().model(), Some(USER));
            assert_eq!(items.get(1).unwrap().member("age"), Value::from(2));
        }
        other => panic!("expected array, got {other:?}"),
    }

    let broken = transformer.deserialize(USER, "{not json", &options());
    assert!(broken.is_err());
}
