//! Configuration accepted by every transform entry point

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{DeclaredType, ModelId};
use crate::transform::context::{Dependencies, TransformHandlerFn};

/// Default field-selection policy applied when no per-model strategy is
/// declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Start from all keys present on the input.
    ExposeAll,
    /// Start from nothing; only declared-exposed fields survive.
    ExcludeAll,
}

/// Out-of-band type declarations, an alternative to per-field type rules.
#[derive(Clone, Debug)]
pub struct TargetTypeMap {
    pub target: ModelId,
    pub properties: HashMap<String, DeclaredType>,
}

/// Options recognized by the transform entry points.
///
/// The defaults mirror the permissive behavior of plain conversion: expose
/// everything, no version/group filtering, no circular checking, omit unset
/// fields.
#[derive(Clone, Default)]
pub struct TransformOptions {
    /// Field-selection policy when no per-model strategy applies.
    pub strategy: Option<Strategy>,
    /// Policy for positions at recursion depth > 0 when no per-model
    /// strategy applies; falls back to `strategy`.
    pub nested_strategy: Option<Strategy>,
    /// Only declared-exposed fields survive; raw input keys are dropped.
    pub exclude_extraneous_values: bool,
    /// Drop any key starting with one of these prefixes.
    pub exclude_prefixes: Vec<String>,
    /// Bypass exposure/rename semantics entirely.
    pub ignore_decorators: bool,
    /// Turn on the recursion guard for cyclic data.
    pub enable_circular_check: bool,
    /// With no explicit type rule, fall back to the best-effort declared
    /// field type (plain→instance only).
    pub enable_implicit_conversion: bool,
    /// Unset incoming fields keep whatever default the freshly constructed
    /// instance already has.
    pub expose_default_values: bool,
    /// Write explicit unset fields instead of omitting the key.
    pub expose_unset_fields: bool,
    pub groups: Vec<String>,
    pub version: Option<f64>,
    pub target_maps: Vec<TargetTypeMap>,
    /// Full override of the recursive dispatch.
    pub transformation_handler: Option<TransformHandlerFn>,
    /// Opaque bag passed through to custom hooks unmodified.
    pub dependencies: Dependencies,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn nested_strategy(mut self, strategy: Strategy) -> Self {
        self.nested_strategy = Some(strategy);
        self
    }

    pub fn exclude_extraneous_values(mut self) -> Self {
        self.exclude_extraneous_values = true;
        self
    }

    pub fn exclude_prefixes<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        prefixes: I,
    ) -> Self {
        self.exclude_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn ignore_decorators(mut self) -> Self {
        self.ignore_decorators = true;
        self
    }

    pub fn enable_circular_check(mut self) -> Self {
        self.enable_circular_check = true;
        self
    }

    pub fn enable_implicit_conversion(mut self) -> Self {
        self.enable_implicit_conversion = true;
        self
    }

    pub fn expose_default_values(mut self) -> Self {
        self.expose_default_values = true;
        self
    }

    pub fn expose_unset_fields(mut self) -> Self {
        self.expose_unset_fields = true;
        self
    }

    pub fn groups<I: IntoIterator<Item = S>, S: Into<String>>(mut self, groups: I) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn version(mut self, version: f64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn target_map(mut self, map: TargetTypeMap) -> Self {
        self.target_maps.push(map);
        self
    }

    pub fn transformation_handler(mut self, handler: TransformHandlerFn) -> Self {
        self.transformation_handler = Some(handler);
        self
    }

    pub fn dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("strategy", &self.strategy)
            .field("nested_strategy", &self.nested_strategy)
            .field("exclude_extraneous_values", &self.exclude_extraneous_values)
            .field("exclude_prefixes", &self.exclude_prefixes)
            .field("ignore_decorators", &self.ignore_decorators)
            .field("enable_circular_check", &self.enable_circular_check)
            .field("enable_implicit_conversion", &self.enable_implicit_conversion)
            .field("expose_default_values", &self.expose_default_values)
            .field("expose_unset_fields", &self.expose_unset_fields)
            .field("groups", &self.groups)
            .field("version", &self.version)
            .field(
                "transformation_handler",
                &self.transformation_handler.as_ref().map(|_| "<fn>"),
            )
            .field("dependencies", &self.dependencies)
            .finish()
    }
}
