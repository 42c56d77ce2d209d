//! Per-call transform context and extension-point contracts
//!
//! One [`TransformRequest`] describes a single recursive step. Custom hooks
//! (field transforms, type resolvers, the full dispatch override) receive a
//! read-only snapshot of their surroundings plus a [`NestedTransform`]
//! back-reference — a deliberately narrow interface for triggering nested
//! transforms rather than the whole executor surface.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::metadata::{ContainerKind, DeclaredType, ModelId, TypeRule};
use crate::options::TransformOptions;
use crate::transform::Direction;
use crate::value::Value;

/// Declared/explicit type information for one value position.
#[derive(Clone, Debug, Default)]
pub enum TypeHint {
    /// Nothing declared; the runtime shape of the value decides.
    #[default]
    None,
    Declared(DeclaredType),
    /// The full type rule, carried when per-element discriminator
    /// resolution must happen one level deeper (array-valued fields).
    Rule(Rc<TypeRule>),
}

impl TypeHint {
    pub fn model(&self) -> Option<ModelId> {
        match self {
            TypeHint::Declared(DeclaredType::Model(model)) => Some(*model),
            _ => None,
        }
    }
}

/// Arguments for one recursive transform step.
///
/// `source` carries the existing target structure to populate in place, if
/// the caller supplied one; `container` is a declared container override for
/// this position; `is_map_entry` marks positions that must be treated as
/// maps regardless of runtime shape.
#[derive(Clone, Debug)]
pub struct TransformRequest {
    pub source: Option<Value>,
    pub value: Value,
    pub target: TypeHint,
    pub container: Option<ContainerKind>,
    pub is_map_entry: bool,
    pub depth: usize,
}

impl TransformRequest {
    /// A top-level request: fresh output, no declared container, depth 0.
    pub fn root(value: Value, target: TypeHint) -> Self {
        Self {
            source: None,
            value,
            target,
            container: None,
            is_map_entry: false,
            depth: 0,
        }
    }

    pub fn populating(existing: Value, value: Value, target: TypeHint) -> Self {
        Self {
            source: Some(existing),
            ..Self::root(value, target)
        }
    }
}

/// Narrow back-reference handed to extension points so custom logic can
/// trigger nested transforms.
pub trait NestedTransform {
    /// Run a nested transform through the configured dispatch, including
    /// any full dispatch override.
    fn transform(&self, request: TransformRequest) -> Value;

    /// Run a nested transform through the built-in dispatch, bypassing the
    /// override. This is what an override itself calls to delegate.
    fn transform_default(&self, request: TransformRequest) -> Value;
}

/// Full override of the recursive dispatch: every recursive step is
/// delegated here instead of the built-in algorithm.
pub type TransformHandlerFn = Rc<dyn Fn(TransformRequest, &dyn NestedTransform) -> Value>;

/// Parameters handed to a custom field transform.
pub struct TransformFnParams<'a> {
    /// The value as produced by the previous stage.
    pub value: Value,
    /// The field key being processed.
    pub key: &'a str,
    /// The raw enclosing container the field was read from.
    pub obj: Value,
    pub direction: Direction,
    pub options: &'a TransformOptions,
    pub dependencies: &'a Dependencies,
    pub nested: &'a dyn NestedTransform,
}

/// Context handed to a per-field type resolver.
pub struct TypeHelpContext<'a> {
    /// The structure being built.
    pub new_object: &'a Value,
    /// The source container the field belongs to.
    pub object: &'a Value,
    /// The field being resolved; absent for array elements.
    pub field: Option<&'a str>,
    pub dependencies: &'a Dependencies,
    pub nested: &'a dyn NestedTransform,
}

/// Opaque bag of caller-supplied collaborators, passed through to custom
/// transform functions and type resolvers unmodified.
#[derive(Clone, Default)]
pub struct Dependencies(Rc<HashMap<String, Rc<dyn Any>>>);

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Rc<dyn Any>) -> Self {
        Rc::make_mut(&mut self.0).insert(key.into(), value);
        self
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        self.0
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
