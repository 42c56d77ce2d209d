//! Transformation engine converting between plain data and model instances
//!
//! This module implements the public conversion surface: a [`Transformer`]
//! bound to a metadata registry, the [`Direction`] of a run, and the
//! executor that recursively walks input values alongside their declared
//! type metadata.
//!
//! Copyright (c) 2026 Recast Team
//! Licensed under the Apache-2.0 license

pub mod context;
pub mod executor;
pub mod guard;
pub(crate) mod helper;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::registry::MetadataRegistry;
use crate::metadata::{DeclaredType, ModelId};
use crate::options::TransformOptions;
use crate::value::{json, Value};

use context::{NestedTransform, TransformRequest, TypeHint};
use executor::TransformExecutor;

/// The direction of one transform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Plain data in, model instances out.
    PlainToInstance,
    /// Model instances in, plain data out.
    InstanceToPlain,
    /// Clone instances through the same rule set.
    InstanceToInstance,
}

impl Direction {
    /// Both plain→instance and instance→instance build instances.
    pub fn builds_instance(self) -> bool {
        matches!(self, Direction::PlainToInstance | Direction::InstanceToInstance)
    }
}

/// The public conversion API.
///
/// A transformer is bound to a [`MetadataRegistry`]; [`Transformer::new`]
/// binds the process-default registry, and private registries can be
/// injected for tests or isolated use-cases. Each entry point constructs
/// one transform request and runs the engine once.
///
/// The `*_into` family populates a caller-supplied existing structure
/// instead of constructing a new one. It mutates its target argument.
#[derive(Clone)]
pub struct Transformer {
    registry: Rc<MetadataRegistry>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    /// A transformer over the process-default registry.
    pub fn new() -> Self {
        Self {
            registry: MetadataRegistry::global(),
        }
    }

    pub fn with_registry(registry: Rc<MetadataRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Rc<MetadataRegistry> {
        &self.registry
    }

    fn execute(
        &self,
        direction: Direction,
        request: TransformRequest,
        options: &TransformOptions,
    ) -> Value {
        log::trace!("transform {direction:?} at depth {}", request.depth);
        let executor =
            TransformExecutor::new(direction, options.clone(), Rc::clone(&self.registry));
        executor.transform(request)
    }

    /// Convert an instance (or array of instances) to plain data.
    pub fn instance_to_plain(&self, value: &Value, options: &TransformOptions) -> Value {
        self.execute(
            Direction::InstanceToPlain,
            TransformRequest::root(value.clone(), TypeHint::None),
            options,
        )
    }

    /// Convert an instance to plain data, filling a caller-provided plain
    /// structure instead of creating one.
    pub fn instance_to_plain_into(
        &self,
        value: &Value,
        existing: &Value,
        options: &TransformOptions,
    ) -> Value {
        self.execute(
            Direction::InstanceToPlain,
            TransformRequest::populating(existing.clone(), value.clone(), TypeHint::None),
            options,
        )
    }

    /// Convert plain data (single object or array of objects) to instances
    /// of the given model.
    pub fn plain_to_instance(
        &self,
        model: ModelId,
        value: &Value,
        options: &TransformOptions,
    ) -> Value {
        self.execute(
            Direction::PlainToInstance,
            TransformRequest::root(
                value.clone(),
                TypeHint::Declared(DeclaredType::Model(model)),
            ),
            options,
        )
    }

    /// Convert plain data into a caller-provided existing instance.
    pub fn plain_to_instance_into(
        &self,
        existing: &Value,
        value: &Value,
        options: &TransformOptions,
    ) -> Value {
        self.execute(
            Direction::PlainToInstance,
            TransformRequest::populating(existing.clone(), value.clone(), TypeHint::None),
            options,
        )
    }

    /// Clone an instance through the same rule set.
    pub fn instance_to_instance(&self, value: &Value, options: &TransformOptions) -> Value {
        self.execute(
            Direction::InstanceToInstance,
            TransformRequest::root(value.clone(), TypeHint::None),
            options,
        )
    }

    /// Clone an instance into a caller-provided existing instance.
    pub fn instance_to_instance_into(
        &self,
        existing: &Value,
        value: &Value,
        options: &TransformOptions,
    ) -> Value {
        self.execute(
            Direction::InstanceToInstance,
            TransformRequest::populating(existing.clone(), value.clone(), TypeHint::None),
            options,
        )
    }

    /// Convert an instance to plain data and encode it as a JSON string.
    pub fn serialize(&self, value: &Value, options: &TransformOptions) -> Result<String> {
        let plain = self.instance_to_plain(value, options);
        Ok(serde_json::to_string(&json::to_json(&plain))?)
    }

    /// Decode a JSON string and convert it to an instance of the given
    /// model.
    pub fn deserialize(
        &self,
        model: ModelId,
        text: &str,
        options: &TransformOptions,
    ) -> Result<Value> {
        let decoded: serde_json::Value = serde_json::from_str(text)?;
        Ok(self.plain_to_instance(model, &json::from_json(&decoded), options))
    }

    /// Decode a JSON array string and convert each element to an instance
    /// of the given model.
    pub fn deserialize_array(
        &self,
        model: ModelId,
        text: &str,
        options: &TransformOptions,
    ) -> Result<Value> {
        self.deserialize(model, text, options)
    }
}
