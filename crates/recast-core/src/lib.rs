//! Recast Core - Metadata-driven object graph transformation
//!
//! This crate converts between plain data (object literals, arrays, maps —
//! the shape of parsed JSON) and instances of declared data-model types, and
//! clones instances through the same rule set. Conversion is driven by
//! per-field metadata registered ahead of time: exposure and exclusion
//! rules, explicit type declarations, custom transform hooks, discriminated
//! unions, and group/version scoping.
//!
//! # Main Components
//!
//! - **Value Model**: dynamic value graph with reference-semantics
//!   containers (`value`)
//! - **Metadata Registry**: per-(model, field) declarations with
//!   inheritance resolution (`metadata`)
//! - **Transform Engine**: the recursive executor and its entry points
//!   (`transform`)
//! - **Error Handling**: boundary errors using `thiserror`
//!
//! # Example
//!
//! ```
//! use recast_core::{
//!     instance_to_plain, metadata::{ExcludeRule, ExposeRule, ModelId},
//!     MetadataRegistry, TransformOptions, Value,
//! };
//!
//! const USER: ModelId = ModelId::new("User");
//!
//! let registry = MetadataRegistry::global();
//! registry.add_exclude_rule(ExcludeRule::class(USER));
//! registry.add_expose_rule(ExposeRule::field(USER, "name"));
//!
//! let user = Value::instance(USER, [
//!     ("name", Value::from("Umed")),
//!     ("password", Value::from("secret")),
//! ]);
//! let plain = instance_to_plain(&user, &TransformOptions::default());
//! assert_eq!(plain.member("name"), Value::from("Umed"));
//! assert!(plain.member("password").is_undefined());
//! # registry.clear();
//! ```

pub mod error;
pub mod metadata;
pub mod options;
pub mod transform;
pub mod value;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use metadata::registry::MetadataRegistry;
pub use metadata::{
    // Rule declarations
    ExcludeRule, ExposeRule, TransformRule, TypeRule,
    // Type vocabulary
    ContainerKind, DeclaredType, Discriminator, DiscriminatorSubtype, ModelDecl, ModelId,
    ReflectedType,
};
pub use options::{Strategy, TargetTypeMap, TransformOptions};
pub use transform::context::{
    Dependencies, NestedTransform, TransformFnParams, TransformHandlerFn, TransformRequest,
    TypeHelpContext, TypeHint,
};
pub use transform::{Direction, Transformer};
pub use value::{json, ObjectHandle, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Converts an instance (or array of instances) to plain data using the
/// process-default registry.
pub fn instance_to_plain(value: &Value, options: &TransformOptions) -> Value {
    Transformer::new().instance_to_plain(value, options)
}

/// Converts an instance to plain data, filling the given plain structure
/// with data from the instance. Mutates `existing`.
pub fn instance_to_plain_into(value: &Value, existing: &Value, options: &TransformOptions) -> Value {
    Transformer::new().instance_to_plain_into(value, existing, options)
}

/// Converts plain data (single object or array of objects) to instances of
/// the given model using the process-default registry.
pub fn plain_to_instance(model: ModelId, value: &Value, options: &TransformOptions) -> Value {
    Transformer::new().plain_to_instance(model, value, options)
}

/// Converts plain data into the given existing instance, filling it with
/// data from the plain object. Mutates `existing`.
pub fn plain_to_instance_into(existing: &Value, value: &Value, options: &TransformOptions) -> Value {
    Transformer::new().plain_to_instance_into(existing, value, options)
}

/// Clones an instance through the same rule set.
pub fn instance_to_instance(value: &Value, options: &TransformOptions) -> Value {
    Transformer::new().instance_to_instance(value, options)
}

/// Clones an instance into the given existing instance. Mutates `existing`.
pub fn instance_to_instance_into(
    existing: &Value,
    value: &Value,
    options: &TransformOptions,
) -> Value {
    Transformer::new().instance_to_instance_into(existing, value, options)
}

/// Serializes the given instance to a JSON string.
pub fn serialize(value: &Value, options: &TransformOptions) -> Result<String> {
    Transformer::new().serialize(value, options)
}

/// Deserializes the given JSON string to an instance of the given model.
pub fn deserialize(model: ModelId, text: &str, options: &TransformOptions) -> Result<Value> {
    Transformer::new().deserialize(model, text, options)
}

/// Deserializes the given JSON array string to instances of the given
/// model.
pub fn deserialize_array(model: ModelId, text: &str, options: &TransformOptions) -> Result<Value> {
    Transformer::new().deserialize_array(model, text, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Configuration {
            message: "test error".to_string(),
            source: None,
        };
        assert!(err.to_string().contains("test error"));
    }
}
