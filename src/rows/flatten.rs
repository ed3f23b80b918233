//! Flattener: document tree into per-entity insert records
//!
//! The walk is depth first. Every parent is handed to the [`RowSink`] before
//! its children and the key the sink returns is threaded down to exactly
//! those children, so each variable's terms land under that variable.

use std::fmt::Debug;

use crate::error::{FmlError, FmlResult};
use crate::model::{FuzzySystem, FuzzyTerm, FuzzyVariable, MamdaniRuleBase, Rule};
use crate::rows::{
    ClauseArrays, RuleBaseRecord, RuleRecord, SystemRecord, TermRecord, VariableRecord,
};

/// Storage collaborator receiving the flattened entities
///
/// Keys are whatever the backing store uses to link a child to its parent
/// (a row id, an index into a staging vector, ...).
pub trait RowSink {
    type Key: Clone + Debug;

    fn insert_system(&mut self, record: SystemRecord) -> FmlResult<Self::Key>;

    fn insert_variable(&mut self, record: VariableRecord, system: &Self::Key) -> FmlResult<Self::Key>;

    fn insert_term(&mut self, record: TermRecord, variable: &Self::Key) -> FmlResult<()>;

    fn insert_rule_base(&mut self, record: RuleBaseRecord, system: &Self::Key) -> FmlResult<Self::Key>;

    fn insert_rule(&mut self, record: RuleRecord, rule_base: &Self::Key) -> FmlResult<()>;
}

/// Counts of what one flatten call wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FlattenStats {
    pub variables: usize,
    pub terms: usize,
    pub rules: usize,
}

/// Wrap a sink failure as `PersistenceFailed` for the named entity
fn persisted<T>(result: FmlResult<T>, entity: &str, name: &str) -> FmlResult<T> {
    result.map_err(|cause| FmlError::persistence_failed(entity, name).with_cause(cause.to_string()))
}

/// Validate `system` and emit it to `sink`
///
/// Nothing is rolled back here when an insert fails; the sink's owner
/// decides what happens to the records already written.
pub fn flatten<S: RowSink>(system: &FuzzySystem, sink: &mut S) -> FmlResult<FlattenStats> {
    system.validate()?;

    let mut stats = FlattenStats::default();
    let system_key = persisted(
        sink.insert_system(SystemRecord {
            name: system.name.clone(),
            network_address: system.network_address.clone(),
        }),
        "system",
        &system.name,
    )?;

    for variable in &system.knowledge_base.variables {
        let variable_key = persisted(
            sink.insert_variable(variable_record(variable), &system_key),
            "variable",
            &variable.name,
        )?;
        stats.variables += 1;

        for term in &variable.terms {
            persisted(sink.insert_term(term_record(term), &variable_key), "term", &term.name)
                .map_err(|e| e.with_context("variable", &variable.name))?;
            stats.terms += 1;
        }
    }

    if !system.rule_base.is_empty() {
        let rule_base = &system.rule_base;
        let rule_base_key = persisted(
            sink.insert_rule_base(rule_base_record(rule_base), &system_key),
            "rule_base",
            &rule_base.name,
        )?;

        for rule in &rule_base.rules {
            persisted(sink.insert_rule(rule_record(rule), &rule_base_key), "rule", &rule.name)?;
            stats.rules += 1;
        }
    }

    Ok(stats)
}

fn variable_record(variable: &FuzzyVariable) -> VariableRecord {
    VariableRecord {
        name: variable.name.clone(),
        domain_left: variable.domain_left,
        domain_right: variable.domain_right,
        scale: variable.scale.clone(),
        default_value: variable.default_value,
        accumulation: variable.accumulation.clone(),
        defuzzifier: variable.defuzzifier.clone(),
        var_type: variable.var_type.clone(),
    }
}

fn term_record(term: &FuzzyTerm) -> TermRecord {
    TermRecord {
        name: term.name.clone(),
        complement: term.complement,
        params: *term.params.slots(),
        shape: term.shape.id().to_string(),
    }
}

fn rule_base_record(rule_base: &MamdaniRuleBase) -> RuleBaseRecord {
    RuleBaseRecord {
        name: rule_base.name.clone(),
        and_method: rule_base.and_method.clone(),
        or_method: rule_base.or_method.clone(),
        activation_method: rule_base.activation_method.clone(),
    }
}

fn rule_record(rule: &Rule) -> RuleRecord {
    RuleRecord {
        name: rule.name.clone(),
        connector: rule.connector.clone(),
        or_method: rule.or_method.clone(),
        weight: rule.weight,
        and_method: rule.and_method.clone(),
        clauses: ClauseArrays::from_clauses(&rule.antecedent, &rule.consequent),
    }
}
