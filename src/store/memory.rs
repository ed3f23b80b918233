//! In-memory knowledge store
//!
//! Relations are plain vectors of `(id, parent id, record)`. Uploads are
//! flattened into a staged copy of the tables that replaces the live ones
//! only when every insert succeeded.

use tracing::{debug, info};

use super::KnowledgeStore;
use crate::error::{FmlError, FmlResult};
use crate::model::FuzzySystem;
use crate::rows::{
    flatten, FlattenStats, KnowledgeRow, RowSink, RuleBaseRecord, RuleRecord, RuleRow,
    SystemRecord, TermRecord, VariableRecord,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: usize,
    systems: Vec<(usize, SystemRecord)>,
    variables: Vec<(usize, usize, VariableRecord)>,
    terms: Vec<(usize, usize, TermRecord)>,
    rule_bases: Vec<(usize, usize, RuleBaseRecord)>,
    rules: Vec<(usize, usize, RuleRecord)>,
}

impl Tables {
    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn system(&self, name: &str) -> Option<&(usize, SystemRecord)> {
        self.systems.iter().find(|(_, s)| s.name == name)
    }

    /// Drop a system and every row hanging off it
    fn cascade_delete(&mut self, system_id: usize) {
        let variable_ids: Vec<usize> = self
            .variables
            .iter()
            .filter(|(_, parent, _)| *parent == system_id)
            .map(|(id, _, _)| *id)
            .collect();
        let rule_base_ids: Vec<usize> = self
            .rule_bases
            .iter()
            .filter(|(_, parent, _)| *parent == system_id)
            .map(|(id, _, _)| *id)
            .collect();

        self.terms.retain(|(_, parent, _)| !variable_ids.contains(parent));
        self.rules.retain(|(_, parent, _)| !rule_base_ids.contains(parent));
        self.variables.retain(|(_, parent, _)| *parent != system_id);
        self.rule_bases.retain(|(_, parent, _)| *parent != system_id);
        self.systems.retain(|(id, _)| *id != system_id);
    }
}

impl RowSink for Tables {
    type Key = usize;

    fn insert_system(&mut self, record: SystemRecord) -> FmlResult<usize> {
        if self.system(&record.name).is_some() {
            return Err(FmlError::duplicate_system(&record.name));
        }
        let id = self.next_id();
        self.systems.push((id, record));
        Ok(id)
    }

    fn insert_variable(&mut self, record: VariableRecord, system: &usize) -> FmlResult<usize> {
        let id = self.next_id();
        self.variables.push((id, *system, record));
        Ok(id)
    }

    fn insert_term(&mut self, record: TermRecord, variable: &usize) -> FmlResult<()> {
        let id = self.next_id();
        self.terms.push((id, *variable, record));
        Ok(())
    }

    fn insert_rule_base(&mut self, record: RuleBaseRecord, system: &usize) -> FmlResult<usize> {
        let id = self.next_id();
        self.rule_bases.push((id, *system, record));
        Ok(id)
    }

    fn insert_rule(&mut self, record: RuleRecord, rule_base: &usize) -> FmlResult<()> {
        let id = self.next_id();
        self.rules.push((id, *rule_base, record));
        Ok(())
    }
}

/// Knowledge store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored systems
    pub fn len(&self) -> usize {
        self.tables.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.systems.is_empty()
    }
}

fn system_columns(system: &SystemRecord) -> KnowledgeRow {
    KnowledgeRow {
        system_name: Some(system.name.clone()),
        network_address: Some(system.network_address.clone()),
        ..Default::default()
    }
}

fn with_variable(mut row: KnowledgeRow, variable: &VariableRecord) -> KnowledgeRow {
    row.variable_name = Some(variable.name.clone());
    row.domain_left = Some(variable.domain_left);
    row.domain_right = Some(variable.domain_right);
    row.scale = Some(variable.scale.clone());
    row.default_value = Some(variable.default_value);
    row.accumulation = Some(variable.accumulation.clone());
    row.defuzzifier = Some(variable.defuzzifier.clone());
    row.variable_type = Some(variable.var_type.clone());
    row
}

fn with_term(mut row: KnowledgeRow, term: &TermRecord) -> KnowledgeRow {
    row.term_name = Some(term.name.clone());
    row.complement = Some(term.complement);
    row.params = term.params;
    row.shape = Some(term.shape.clone());
    row
}

fn with_rule_base(system: &SystemRecord, rule_base: Option<&RuleBaseRecord>) -> RuleRow {
    let mut row = RuleRow {
        system_name: Some(system.name.clone()),
        network_address: Some(system.network_address.clone()),
        ..Default::default()
    };
    if let Some(rule_base) = rule_base {
        row.rule_base_name = Some(rule_base.name.clone());
        row.and_method = Some(rule_base.and_method.clone());
        row.or_method = Some(rule_base.or_method.clone());
        row.activation_method = Some(rule_base.activation_method.clone());
    }
    row
}

fn with_rule(mut row: RuleRow, rule: &RuleRecord) -> RuleRow {
    let clauses = rule.clauses.clone();
    row.rule_name = Some(rule.name.clone());
    row.connector = Some(rule.connector.clone());
    row.rule_or_method = Some(rule.or_method.clone());
    row.weight = Some(rule.weight);
    row.rule_and_method = rule.and_method.clone();
    row.antecedent_variables = Some(clauses.antecedent_variables);
    row.antecedent_terms = Some(clauses.antecedent_terms);
    row.antecedent_modifiers = Some(clauses.antecedent_modifiers);
    row.consequent_variables = Some(clauses.consequent_variables);
    row.consequent_terms = Some(clauses.consequent_terms);
    row
}

impl KnowledgeStore for MemoryStore {
    fn knowledge_rows(&self, system: &str) -> FmlResult<Vec<KnowledgeRow>> {
        let Some((system_id, record)) = self.tables.system(system) else {
            return Ok(Vec::new());
        };

        let header = system_columns(record);
        let mut rows = Vec::new();
        for (variable_id, _, variable) in self.tables.variables.iter().filter(|(_, p, _)| p == system_id) {
            let variable_row = with_variable(header.clone(), variable);
            let before = rows.len();
            rows.extend(
                self.tables
                    .terms
                    .iter()
                    .filter(|(_, p, _)| p == variable_id)
                    .map(|(_, _, term)| with_term(variable_row.clone(), term)),
            );
            if rows.len() == before {
                rows.push(variable_row);
            }
        }
        if rows.is_empty() {
            rows.push(header);
        }
        Ok(rows)
    }

    fn rule_rows(&self, system: &str) -> FmlResult<Vec<RuleRow>> {
        let Some((system_id, record)) = self.tables.system(system) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (rule_base_id, _, rule_base) in self.tables.rule_bases.iter().filter(|(_, p, _)| p == system_id) {
            let rule_base_row = with_rule_base(record, Some(rule_base));
            let before = rows.len();
            rows.extend(
                self.tables
                    .rules
                    .iter()
                    .filter(|(_, p, _)| p == rule_base_id)
                    .map(|(_, _, rule)| with_rule(rule_base_row.clone(), rule)),
            );
            if rows.len() == before {
                rows.push(rule_base_row);
            }
        }
        if rows.is_empty() {
            rows.push(with_rule_base(record, None));
        }
        Ok(rows)
    }

    fn system_names(&self) -> FmlResult<Vec<String>> {
        Ok(self.tables.systems.iter().map(|(_, s)| s.name.clone()).collect())
    }

    fn store_system(&mut self, system: &FuzzySystem) -> FmlResult<FlattenStats> {
        if self.tables.system(&system.name).is_some() {
            return Err(FmlError::duplicate_system(&system.name));
        }

        let mut staged = self.tables.clone();
        let stats = flatten(system, &mut staged)?;
        self.tables = staged;

        info!(system = %system.name, variables = stats.variables, terms = stats.terms, rules = stats.rules, "stored system");
        Ok(stats)
    }

    fn delete_system(&mut self, name: &str) -> FmlResult<bool> {
        let Some(id) = self.tables.system(name).map(|(id, _)| *id) else {
            debug!(system = name, "delete of unknown system");
            return Ok(false);
        };
        self.tables.cascade_delete(id);
        Ok(true)
    }

    fn delete_all(&mut self) -> FmlResult<usize> {
        let count = self.tables.systems.len();
        self.tables = Tables::default();
        Ok(count)
    }
}
