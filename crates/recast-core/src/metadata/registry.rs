//! Storage for all model metadata
//!
//! The registry is an explicit, constructible component; a process-default
//! instance exists for ergonomic parity with annotation-style declaration
//! layers, but tests and isolated use-cases can build private registries and
//! inject them into a transformer.
//!
//! Rule lookup resolves inheritance through an explicit, registry-owned
//! ancestor chain (registered parent links, computed once and cached), never
//! through runtime reflection.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::options::Strategy;
use crate::transform::Direction;
use crate::value::OrderedMap;

use super::{
    matches_direction, DeclaredType, ExcludeRule, ExposeRule, ModelDecl, ModelId, TransformRule,
    TypeRule,
};

thread_local! {
    static GLOBAL_REGISTRY: Rc<MetadataRegistry> = Rc::new(MetadataRegistry::new());
}

#[derive(Debug, Default)]
pub struct MetadataRegistry {
    type_rules: RefCell<HashMap<ModelId, HashMap<String, Rc<TypeRule>>>>,
    transform_rules: RefCell<HashMap<ModelId, HashMap<String, Vec<Rc<TransformRule>>>>>,
    expose_rules: RefCell<HashMap<ModelId, OrderedMap<Option<String>, Rc<ExposeRule>>>>,
    exclude_rules: RefCell<HashMap<ModelId, OrderedMap<Option<String>, Rc<ExcludeRule>>>>,
    models: RefCell<HashMap<ModelId, Rc<ModelDecl>>>,
    ancestors: RefCell<HashMap<ModelId, Rc<Vec<ModelId>>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-default registry for the current thread.
    pub fn global() -> Rc<MetadataRegistry> {
        GLOBAL_REGISTRY.with(Rc::clone)
    }

    // -------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------

    /// Declare a model: ancestry link, reflected field types, factory.
    /// Re-registering a model replaces its previous declaration.
    pub fn register_model(&self, id: ModelId, decl: ModelDecl) -> Result<()> {
        if decl.parent == Some(id) {
            return Err(Error::Configuration {
                message: format!("model {id} declares itself as its own ancestor"),
                source: None,
            });
        }
        self.models.borrow_mut().insert(id, Rc::new(decl));
        // ancestry may have changed for anything built on cached chains
        self.ancestors.borrow_mut().clear();
        Ok(())
    }

    pub fn model(&self, id: ModelId) -> Option<Rc<ModelDecl>> {
        self.models.borrow().get(&id).map(Rc::clone)
    }

    /// A later registration for the same (model, field) overwrites.
    pub fn add_type_rule(&self, rule: TypeRule) {
        self.type_rules
            .borrow_mut()
            .entry(rule.owner)
            .or_default()
            .insert(rule.field.clone(), Rc::new(rule));
    }

    /// Transform rules stack: appends to the per-field list.
    pub fn add_transform_rule(&self, rule: TransformRule) {
        self.transform_rules
            .borrow_mut()
            .entry(rule.owner)
            .or_default()
            .entry(rule.field.clone())
            .or_default()
            .push(Rc::new(rule));
    }

    pub fn add_expose_rule(&self, rule: ExposeRule) {
        self.expose_rules
            .borrow_mut()
            .entry(rule.owner)
            .or_default()
            .insert(rule.field.clone(), Rc::new(rule));
    }

    pub fn add_exclude_rule(&self, rule: ExcludeRule) {
        self.exclude_rules
            .borrow_mut()
            .entry(rule.owner)
            .or_default()
            .insert(rule.field.clone(), Rc::new(rule));
    }

    // -------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------

    /// Own model first, then each ancestor in chain order; first match wins.
    pub fn find_type_rule(&self, model: ModelId, field: &str) -> Option<Rc<TypeRule>> {
        let rules = self.type_rules.borrow();
        let lookup = |id: ModelId| rules.get(&id).and_then(|m| m.get(field)).map(Rc::clone);
        lookup(model).or_else(|| self.ancestors(model).iter().find_map(|&a| lookup(a)))
    }

    pub fn find_expose_rule(&self, model: ModelId, field: &str) -> Option<Rc<ExposeRule>> {
        let key = Some(field.to_string());
        let rules = self.expose_rules.borrow();
        let lookup = |id: ModelId| rules.get(&id).and_then(|m| m.get(&key)).map(Rc::clone);
        lookup(model).or_else(|| self.ancestors(model).iter().find_map(|&a| lookup(a)))
    }

    pub fn find_exclude_rule(&self, model: ModelId, field: &str) -> Option<Rc<ExcludeRule>> {
        let key = Some(field.to_string());
        let rules = self.exclude_rules.borrow();
        let lookup = |id: ModelId| rules.get(&id).and_then(|m| m.get(&key)).map(Rc::clone);
        lookup(model).or_else(|| self.ancestors(model).iter().find_map(|&a| lookup(a)))
    }

    /// Find the expose rule whose configured plain-side rename equals
    /// `name`. Used when mapping an incoming plain key back to the internal
    /// field name.
    pub fn find_expose_rule_by_plain_name(
        &self,
        model: ModelId,
        name: &str,
    ) -> Option<Rc<ExposeRule>> {
        self.exposed_rules(model)
            .into_iter()
            .find(|rule| rule.options.name.as_deref() == Some(name))
    }

    /// Gather the stacked transform rules for one field: ancestor rules
    /// before own-model rules, each segment most-recently-declared-first,
    /// filtered to rules whose direction scoping admits `direction`.
    pub fn find_transform_rules(
        &self,
        model: ModelId,
        field: &str,
        direction: Direction,
    ) -> Vec<Rc<TransformRule>> {
        let rules = self.transform_rules.borrow();
        let collect = |id: ModelId| -> Vec<Rc<TransformRule>> {
            rules
                .get(&id)
                .and_then(|m| m.get(field))
                .map(|list| list.iter().map(Rc::clone).collect())
                .unwrap_or_default()
        };

        let mut from_ancestors: Vec<Rc<TransformRule>> = self
            .ancestors(model)
            .iter()
            .flat_map(|&a| collect(a))
            .collect();
        from_ancestors.reverse();
        let mut own = collect(model);
        own.reverse();

        from_ancestors
            .into_iter()
            .chain(own)
            .filter(|rule| {
                matches_direction(rule.options.to_class_only, rule.options.to_plain_only, direction)
            })
            .collect()
    }

    /// Effective class-level field-selection strategy. Exactly one of the
    /// class-level markers selects a strategy; both or neither fall through
    /// to the caller-supplied strategy.
    pub fn field_selection_strategy(&self, model: ModelId) -> Option<Strategy> {
        let exclude = self
            .exclude_rules
            .borrow()
            .get(&model)
            .is_some_and(|m| m.contains_key(&None));
        let expose = self
            .expose_rules
            .borrow()
            .get(&model)
            .is_some_and(|m| m.contains_key(&None));
        match (exclude, expose) {
            (true, false) => Some(Strategy::ExcludeAll),
            (false, true) => Some(Strategy::ExposeAll),
            _ => None,
        }
    }

    /// Field-level expose rules, ancestor entries before own-model entries.
    pub fn exposed_rules(&self, model: ModelId) -> Vec<Rc<ExposeRule>> {
        let rules = self.expose_rules.borrow();
        let collect = |id: ModelId| -> Vec<Rc<ExposeRule>> {
            rules
                .get(&id)
                .map(|m| {
                    m.values()
                        .filter(|rule| rule.field.is_some())
                        .map(Rc::clone)
                        .collect()
                })
                .unwrap_or_default()
        };
        self.ancestors(model)
            .iter()
            .flat_map(|&a| collect(a))
            .chain(collect(model))
            .collect()
    }

    /// Field-level exclude rules, ancestor entries before own-model entries.
    pub fn excluded_rules(&self, model: ModelId) -> Vec<Rc<ExcludeRule>> {
        let rules = self.exclude_rules.borrow();
        let collect = |id: ModelId| -> Vec<Rc<ExcludeRule>> {
            rules
                .get(&id)
                .map(|m| {
                    m.values()
                        .filter(|rule| rule.field.is_some())
                        .map(Rc::clone)
                        .collect()
                })
                .unwrap_or_default()
        };
        self.ancestors(model)
            .iter()
            .flat_map(|&a| collect(a))
            .chain(collect(model))
            .collect()
    }

    pub fn exposed_fields(&self, model: ModelId, direction: Direction) -> Vec<String> {
        self.exposed_rules(model)
            .into_iter()
            .filter(|rule| {
                matches_direction(rule.options.to_class_only, rule.options.to_plain_only, direction)
            })
            .filter_map(|rule| rule.field.clone())
            .collect()
    }

    pub fn excluded_fields(&self, model: ModelId, direction: Direction) -> Vec<String> {
        self.excluded_rules(model)
            .into_iter()
            .filter(|rule| {
                matches_direction(rule.options.to_class_only, rule.options.to_plain_only, direction)
            })
            .filter_map(|rule| rule.field.clone())
            .collect()
    }

    /// Best-effort declared field type, walking the model then its
    /// ancestors. Consulted only under implicit conversion.
    pub fn reflected_field_type(&self, model: ModelId, field: &str) -> Option<DeclaredType> {
        let models = self.models.borrow();
        let lookup = |id: ModelId| {
            models
                .get(&id)
                .and_then(|decl| decl.reflected.get(field).copied())
        };
        lookup(model).or_else(|| self.ancestors(model).iter().find_map(|&a| lookup(a)))
    }

    /// The ancestor chain for a model, nearest parent first. Computed once
    /// per model by walking registered parent links and cached for the
    /// registry's lifetime.
    pub fn ancestors(&self, model: ModelId) -> Rc<Vec<ModelId>> {
        if let Some(cached) = self.ancestors.borrow().get(&model) {
            return Rc::clone(cached);
        }
        let mut chain = Vec::new();
        let mut seen: HashSet<ModelId> = HashSet::from([model]);
        let mut current = self
            .models
            .borrow()
            .get(&model)
            .and_then(|decl| decl.parent);
        while let Some(ancestor) = current {
            if !seen.insert(ancestor) {
                log::warn!("cyclic ancestry at model {ancestor}; truncating chain");
                break;
            }
            chain.push(ancestor);
            current = self
                .models
                .borrow()
                .get(&ancestor)
                .and_then(|decl| decl.parent);
        }
        let chain = Rc::new(chain);
        self.ancestors.borrow_mut().insert(model, Rc::clone(&chain));
        chain
    }

    /// Empty every store, including the ancestor-chain cache.
    pub fn clear(&self) {
        log::debug!("clearing metadata registry");
        self.type_rules.borrow_mut().clear();
        self.transform_rules.borrow_mut().clear();
        self.expose_rules.borrow_mut().clear();
        self.exclude_rules.borrow_mut().clear();
        self.models.borrow_mut().clear();
        self.ancestors.borrow_mut().clear();
    }
}
