//! Per-model field declarations driving the transformation engine
//!
//! A declaration layer (annotations, schema loaders, hand registration) owns
//! producing these rules ahead of time; the engine only ever reads them back
//! through the [`registry::MetadataRegistry`]. Rules are keyed by model
//! identity and field name, with class-level expose/exclude markers carrying
//! no field name.

pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::transform::context::{TransformFnParams, TypeHelpContext};
use crate::transform::Direction;
use crate::value::{ObjectHandle, Value};

/// Stable identity handle for a declared model type.
///
/// Models are identified by a registered name, not by runtime reflection;
/// the handle is `Copy` so it can be threaded freely through rule lookups.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(&'static str);

impl ModelId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelId({})", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A concrete target type a field position can be declared to become.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    String,
    Number,
    Boolean,
    BigInt,
    Date,
    Bytes,
    /// A plain, model-less object.
    Object,
    Model(ModelId),
}

impl DeclaredType {
    /// True exactly for the scalar coercion targets.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            DeclaredType::String | DeclaredType::Number | DeclaredType::Boolean | DeclaredType::BigInt
        )
    }
}

/// Container shape a typed-structure declaration can impose on a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Array,
    Set,
    Map,
}

/// Best-effort type guessed from the field declaration itself, before any
/// explicit type rule options apply. May name a scalar/model or a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReflectedType {
    Scalar(DeclaredType),
    Container(ContainerKind),
}

/// Per-field custom type resolution hook.
pub type TypeResolverFn = Rc<dyn Fn(&TypeHelpContext<'_>) -> Option<DeclaredType>>;

/// Per-field custom value transformation hook.
pub type TransformFn = Rc<dyn Fn(TransformFnParams<'_>) -> Value>;

/// Factory producing a fresh instance of a model with its default field
/// values (and any computed-field thunks) in place.
pub type FactoryFn = Rc<dyn Fn() -> ObjectHandle>;

/// Tag-property driven selection of a concrete model for a polymorphic
/// field.
#[derive(Clone, Debug)]
pub struct Discriminator {
    /// Name of the tag property carried in plain data.
    pub property: String,
    pub subtypes: Vec<DiscriminatorSubtype>,
}

#[derive(Clone, Debug)]
pub struct DiscriminatorSubtype {
    pub tag: String,
    pub model: ModelId,
}

#[derive(Clone, Default)]
pub struct TypeRuleOptions {
    pub discriminator: Option<Discriminator>,
    /// Keep the tag property on the built instance instead of dropping it.
    pub keep_discriminator_property: bool,
}

/// Explicit type declaration for one field.
#[derive(Clone)]
pub struct TypeRule {
    pub owner: ModelId,
    pub field: String,
    pub reflected: Option<ReflectedType>,
    /// Explicit container declaration; takes precedence over both the
    /// reflected type and the runtime shape of the incoming value.
    pub container: Option<ContainerKind>,
    pub resolver: Option<TypeResolverFn>,
    pub options: TypeRuleOptions,
}

impl TypeRule {
    pub fn new(owner: ModelId, field: impl Into<String>) -> Self {
        Self {
            owner,
            field: field.into(),
            reflected: None,
            container: None,
            resolver: None,
            options: TypeRuleOptions::default(),
        }
    }

    pub fn reflected(mut self, reflected: ReflectedType) -> Self {
        self.reflected = Some(reflected);
        self
    }

    pub fn container(mut self, container: ContainerKind) -> Self {
        self.container = Some(container);
        self
    }

    pub fn resolver(mut self, resolver: impl Fn(&TypeHelpContext<'_>) -> Option<DeclaredType> + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    pub fn of_type(self, declared: DeclaredType) -> Self {
        self.resolver(move |_| Some(declared))
    }

    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.options.discriminator = Some(discriminator);
        self
    }

    pub fn keep_discriminator_property(mut self, keep: bool) -> Self {
        self.options.keep_discriminator_property = keep;
        self
    }
}

impl fmt::Debug for TypeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRule")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .field("reflected", &self.reflected)
            .field("container", &self.container)
            .field("resolver", &self.resolver.as_ref().map(|_| "<fn>"))
            .field("discriminator", &self.options.discriminator)
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExposeOptions {
    /// Rename on the plain side.
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub since: Option<f64>,
    pub until: Option<f64>,
    pub to_class_only: bool,
    pub to_plain_only: bool,
}

/// Marks a field (or, with no field, a whole model) as exposed.
#[derive(Clone, Debug)]
pub struct ExposeRule {
    pub owner: ModelId,
    /// `None` marks the class-level "expose all" marker.
    pub field: Option<String>,
    pub options: ExposeOptions,
}

impl ExposeRule {
    pub fn field(owner: ModelId, field: impl Into<String>) -> Self {
        Self {
            owner,
            field: Some(field.into()),
            options: ExposeOptions::default(),
        }
    }

    pub fn class(owner: ModelId) -> Self {
        Self {
            owner,
            field: None,
            options: ExposeOptions::default(),
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn groups<I: IntoIterator<Item = S>, S: Into<String>>(mut self, groups: I) -> Self {
        self.options.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn since(mut self, version: f64) -> Self {
        self.options.since = Some(version);
        self
    }

    pub fn until(mut self, version: f64) -> Self {
        self.options.until = Some(version);
        self
    }

    pub fn to_class_only(mut self) -> Self {
        self.options.to_class_only = true;
        self
    }

    pub fn to_plain_only(mut self) -> Self {
        self.options.to_plain_only = true;
        self
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExcludeOptions {
    pub to_class_only: bool,
    pub to_plain_only: bool,
}

/// Marks a field (or, with no field, a whole model) as excluded.
#[derive(Clone, Debug)]
pub struct ExcludeRule {
    pub owner: ModelId,
    /// `None` marks the class-level "exclude all" marker.
    pub field: Option<String>,
    pub options: ExcludeOptions,
}

impl ExcludeRule {
    pub fn field(owner: ModelId, field: impl Into<String>) -> Self {
        Self {
            owner,
            field: Some(field.into()),
            options: ExcludeOptions::default(),
        }
    }

    pub fn class(owner: ModelId) -> Self {
        Self {
            owner,
            field: None,
            options: ExcludeOptions::default(),
        }
    }

    pub fn to_class_only(mut self) -> Self {
        self.options.to_class_only = true;
        self
    }

    pub fn to_plain_only(mut self) -> Self {
        self.options.to_plain_only = true;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct TransformRuleOptions {
    pub groups: Vec<String>,
    pub since: Option<f64>,
    pub until: Option<f64>,
    pub to_class_only: bool,
    pub to_plain_only: bool,
}

/// A stacked custom transformation attached to one field.
#[derive(Clone)]
pub struct TransformRule {
    pub owner: ModelId,
    pub field: String,
    pub transform: TransformFn,
    pub options: TransformRuleOptions,
}

impl TransformRule {
    pub fn new(
        owner: ModelId,
        field: impl Into<String>,
        transform: impl Fn(TransformFnParams<'_>) -> Value + 'static,
    ) -> Self {
        Self {
            owner,
            field: field.into(),
            transform: Rc::new(transform),
            options: TransformRuleOptions::default(),
        }
    }

    pub fn groups<I: IntoIterator<Item = S>, S: Into<String>>(mut self, groups: I) -> Self {
        self.options.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn since(mut self, version: f64) -> Self {
        self.options.since = Some(version);
        self
    }

    pub fn until(mut self, version: f64) -> Self {
        self.options.until = Some(version);
        self
    }

    pub fn to_class_only(mut self) -> Self {
        self.options.to_class_only = true;
        self
    }

    pub fn to_plain_only(mut self) -> Self {
        self.options.to_plain_only = true;
        self
    }
}

impl fmt::Debug for TransformRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRule")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .field("options", &self.options)
            .finish()
    }
}

/// Declaration of a model: ancestry link, best-effort field types and an
/// optional default-instance factory.
#[derive(Clone, Default)]
pub struct ModelDecl {
    pub parent: Option<ModelId>,
    /// Field types known from the declaration itself, consulted only when
    /// implicit conversion is enabled and no explicit type rule matches.
    pub reflected: HashMap<String, DeclaredType>,
    pub factory: Option<FactoryFn>,
}

impl ModelDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: ModelId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn reflected_field(mut self, field: impl Into<String>, declared: DeclaredType) -> Self {
        self.reflected.insert(field.into(), declared);
        self
    }

    pub fn factory(mut self, factory: impl Fn() -> ObjectHandle + 'static) -> Self {
        self.factory = Some(Rc::new(factory));
        self
    }
}

impl fmt::Debug for ModelDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDecl")
            .field("parent", &self.parent)
            .field("reflected", &self.reflected)
            .field("factory", &self.factory.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Whether a rule's direction scoping admits the current transform
/// direction. No scoping, or contradictory scoping (both flags), always
/// matches; `to_class_only` covers both instance-building directions.
pub(crate) fn matches_direction(
    to_class_only: bool,
    to_plain_only: bool,
    direction: Direction,
) -> bool {
    if to_class_only && to_plain_only {
        return true;
    }
    if to_class_only {
        return matches!(
            direction,
            Direction::PlainToInstance | Direction::InstanceToInstance
        );
    }
    if to_plain_only {
        return direction == Direction::InstanceToPlain;
    }
    true
}
