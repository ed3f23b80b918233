//! Row grouper: flat join rows back into the document tree
//!
//! Rows repeat their ancestors' columns once per leaf. Grouping is keyed by
//! the natural key of the immediate parent (variable name, rule base name)
//! in an insertion-ordered map, so parents come out in first-seen order and
//! leaves in row order, even when a parent's rows are not contiguous.

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::error::{FmlError, FmlResult};
use crate::model::{
    FuzzySystem, FuzzyTerm, FuzzyVariable, KnowledgeBase, MamdaniRuleBase, Rule, Shape, TermParams,
    DEFAULT_RULE_WEIGHT,
};
use crate::rows::{ClauseArrays, KnowledgeRow, RuleRow};

/// Read a required column, failing with `IncompleteRow` when it is null
fn required<T: Clone>(value: &Option<T>, row: usize, column: &str) -> FmlResult<T> {
    value
        .clone()
        .ok_or_else(|| FmlError::incomplete_row(row, column))
}

/// Rebuild one system from its knowledge rows and rule rows
///
/// Both streams empty means the system does not exist: the result is
/// [`FuzzySystem::sentinel`].
pub fn group_system(knowledge: &[KnowledgeRow], rules: &[RuleRow]) -> FmlResult<FuzzySystem> {
    let header = knowledge
        .first()
        .map(|row| (&row.system_name, &row.network_address))
        .or_else(|| rules.first().map(|row| (&row.system_name, &row.network_address)));

    let Some((name, address)) = header else {
        return Ok(FuzzySystem::sentinel());
    };

    let name = required(name, 0, "system_name")?;
    let network_address = required(address, 0, "network_address")?;

    let knowledge_headers = knowledge.iter().map(|r| (&r.system_name, &r.network_address));
    check_headers("knowledge", knowledge_headers, &name, &network_address)?;
    let rule_headers = rules.iter().map(|r| (&r.system_name, &r.network_address));
    check_headers("rule", rule_headers, &name, &network_address)?;

    let variables = group_variables(knowledge)?;
    let mut rule_bases = group_rule_bases(rules)?;
    if rule_bases.len() > 1 {
        return Err(FmlError::invalid_document(format!(
            "system '{}' has {} rule bases, expected one",
            name,
            rule_bases.len()
        ))
        .with_context("system", &name));
    }

    Ok(FuzzySystem {
        name,
        network_address,
        knowledge_base: KnowledgeBase { variables },
        rule_base: rule_bases.pop().unwrap_or_default(),
    })
}

/// Every row of one stream must carry the same system columns
fn check_headers<'a>(
    stream: &str,
    headers: impl Iterator<Item = (&'a Option<String>, &'a Option<String>)>,
    name: &str,
    network_address: &str,
) -> FmlResult<()> {
    for (index, (row_name, row_address)) in headers.enumerate() {
        if row_name.as_deref() != Some(name) || row_address.as_deref() != Some(network_address) {
            return Err(FmlError::invalid_document(format!(
                "{} row {} belongs to system '{}' at '{}', expected '{}' at '{}'",
                stream,
                index,
                row_name.as_deref().unwrap_or_default(),
                row_address.as_deref().unwrap_or_default(),
                name,
                network_address
            ))
            .with_context("system", name)
            .with_context("row", index.to_string()));
        }
    }
    Ok(())
}

/// Group system × variable × term rows into variables
pub fn group_variables(rows: &[KnowledgeRow]) -> FmlResult<Vec<FuzzyVariable>> {
    let mut variables: IndexMap<String, FuzzyVariable> = IndexMap::new();

    for (index, row) in rows.iter().enumerate() {
        let Some(key) = row.variable_name.as_ref() else {
            // system without variables
            continue;
        };

        let variable = match variables.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(variable_from_row(key, row, index)?),
        };

        if let Some(term) = term_from_row(row, index)
            .map_err(|e| e.with_context("variable", key))?
        {
            variable.terms.push(term);
        }
    }

    Ok(variables.into_values().collect())
}

fn variable_from_row(name: &str, row: &KnowledgeRow, index: usize) -> FmlResult<FuzzyVariable> {
    let with_variable = |e: FmlError| e.with_context("variable", name);
    Ok(FuzzyVariable {
        name: name.to_string(),
        domain_left: required(&row.domain_left, index, "domain_left").map_err(with_variable)?,
        domain_right: required(&row.domain_right, index, "domain_right").map_err(with_variable)?,
        scale: required(&row.scale, index, "scale").map_err(with_variable)?,
        default_value: required(&row.default_value, index, "default_value").map_err(with_variable)?,
        accumulation: required(&row.accumulation, index, "accumulation").map_err(with_variable)?,
        defuzzifier: required(&row.defuzzifier, index, "defuzzifier").map_err(with_variable)?,
        var_type: required(&row.variable_type, index, "type").map_err(with_variable)?,
        terms: Vec::new(),
    })
}

fn term_from_row(row: &KnowledgeRow, index: usize) -> FmlResult<Option<FuzzyTerm>> {
    let Some(name) = row.term_name.as_ref() else {
        // variable without terms
        return Ok(None);
    };

    let shape_id = row.shape.as_deref().ok_or_else(|| {
        FmlError::malformed_term(name, format!("term '{}' has no shape", name))
            .with_context("row", index.to_string())
    })?;
    let shape = Shape::from_id(shape_id).map_err(|e| e.with_context("term", name))?;

    let params = TermParams(row.params);
    params.check_arity(shape, name)?;

    Ok(Some(FuzzyTerm {
        name: name.clone(),
        complement: row.complement.unwrap_or(false),
        shape,
        params,
    }))
}

/// Group system × rule base × rule rows into rule bases
pub fn group_rule_bases(rows: &[RuleRow]) -> FmlResult<Vec<MamdaniRuleBase>> {
    let mut rule_bases: IndexMap<String, MamdaniRuleBase> = IndexMap::new();

    for (index, row) in rows.iter().enumerate() {
        let Some(key) = row.rule_base_name.as_ref() else {
            // system without a rule base
            continue;
        };

        let rule_base = match rule_bases.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(rule_base_from_row(key, row, index)?),
        };

        if let Some(rule) = rule_from_row(row, index)? {
            rule_base.rules.push(rule);
        }
    }

    Ok(rule_bases.into_values().collect())
}

fn rule_base_from_row(name: &str, row: &RuleRow, index: usize) -> FmlResult<MamdaniRuleBase> {
    let with_rule_base = |e: FmlError| e.with_context("rule_base", name);
    Ok(MamdaniRuleBase {
        name: name.to_string(),
        and_method: required(&row.and_method, index, "and_method").map_err(with_rule_base)?,
        or_method: required(&row.or_method, index, "or_method").map_err(with_rule_base)?,
        activation_method: required(&row.activation_method, index, "activation_method")
            .map_err(with_rule_base)?,
        rules: Vec::new(),
    })
}

fn rule_from_row(row: &RuleRow, index: usize) -> FmlResult<Option<Rule>> {
    let Some(name) = row.rule_name.as_ref() else {
        return Ok(None);
    };

    let connector = required(&row.connector, index, "connector").map_err(|e| e.with_context("rule", name))?;

    let antecedent_variables = row.antecedent_variables.clone().unwrap_or_default();
    // a null modifier column means no clause carries a modifier
    let antecedent_modifiers = row
        .antecedent_modifiers
        .clone()
        .unwrap_or_else(|| vec![None; antecedent_variables.len()]);

    let arrays = ClauseArrays {
        antecedent_variables,
        antecedent_terms: row.antecedent_terms.clone().unwrap_or_default(),
        antecedent_modifiers,
        consequent_variables: row.consequent_variables.clone().unwrap_or_default(),
        consequent_terms: row.consequent_terms.clone().unwrap_or_default(),
    };
    let (antecedent, consequent) = arrays.into_clauses(name)?;

    Ok(Some(Rule {
        name: name.clone(),
        connector,
        or_method: row.rule_or_method.clone().unwrap_or_default(),
        weight: row.weight.unwrap_or(DEFAULT_RULE_WEIGHT),
        and_method: row.rule_and_method.clone(),
        antecedent,
        consequent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn term_row(variable: &str, term: &str, shape: &str, params: &[f64]) -> KnowledgeRow {
        let mut slots = [None; 4];
        for (slot, value) in slots.iter_mut().zip(params) {
            *slot = Some(*value);
        }
        KnowledgeRow {
            system_name: Some("tipper".into()),
            network_address: Some("10.0.0.7".into()),
            variable_name: Some(variable.into()),
            domain_left: Some(0.0),
            domain_right: Some(10.0),
            scale: Some(String::new()),
            default_value: Some(0.0),
            accumulation: Some(String::new()),
            defuzzifier: Some(String::new()),
            variable_type: Some("input".into()),
            term_name: Some(term.into()),
            complement: Some(false),
            params: slots,
            shape: Some(shape.into()),
        }
    }

    fn rule_row(rule: &str) -> RuleRow {
        RuleRow {
            system_name: Some("tipper".into()),
            network_address: Some("10.0.0.7".into()),
            rule_base_name: Some("mrb".into()),
            and_method: Some("MIN".into()),
            or_method: Some("MAX".into()),
            activation_method: Some("MIN".into()),
            rule_name: Some(rule.into()),
            connector: Some("and".into()),
            rule_or_method: Some("MAX".into()),
            weight: Some(0.5),
            rule_and_method: None,
            antecedent_variables: Some(vec!["food".into(), "service".into()]),
            antecedent_terms: Some(vec!["rancid".into(), "poor".into()]),
            antecedent_modifiers: Some(vec![Some("very".into()), None]),
            consequent_variables: Some(vec!["tip".into()]),
            consequent_terms: Some(vec!["cheap".into()]),
        }
    }

    #[test]
    fn test_first_seen_order_and_regrouping() {
        let rows = vec![
            term_row("B", "b1", "piShape", &[1.0, 2.0]),
            term_row("A", "a1", "leftLinearShape", &[0.0, 1.0]),
            term_row("B", "b2", "triangularShape", &[1.0, 2.0, 3.0]),
        ];

        let variables = group_variables(&rows).unwrap();
        let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);

        let b_terms: Vec<&str> = variables[0].terms.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(b_terms, vec!["b1", "b2"]);
        assert_eq!(variables[1].terms.len(), 1);
    }

    #[test]
    fn test_empty_stream_is_sentinel() {
        let system = group_system(&[], &[]).unwrap();
        assert!(system.is_sentinel());
        assert_eq!(system.name, "");
        assert_eq!(system.network_address, "");
    }

    #[test]
    fn test_mismatched_system_columns() {
        let knowledge = vec![term_row("food", "rancid", "piShape", &[1.0, 2.0])];

        let mut other = rule_row("reg1");
        other.system_name = Some("other".into());
        let err = group_system(&knowledge, &[other]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("system"), Some("tipper"));
        assert_eq!(err.context_field("row"), Some("0"));

        let mut moved = term_row("food", "fresh", "piShape", &[3.0, 4.0]);
        moved.network_address = Some("10.0.0.8".into());
        let err = group_system(&[knowledge[0].clone(), moved], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("row"), Some("1"));

        assert!(group_system(&knowledge, &[rule_row("reg1")]).is_ok());
    }

    #[test]
    fn test_missing_network_address() {
        let mut row = term_row("food", "rancid", "piShape", &[1.0, 2.0]);
        row.network_address = None;

        let err = group_system(&[row], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompleteRow);
        assert_eq!(err.context_field("column"), Some("network_address"));
    }

    #[test]
    fn test_missing_variable_column() {
        let mut row = term_row("food", "rancid", "piShape", &[1.0, 2.0]);
        row.domain_right = None;

        let err = group_variables(&[row]).unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompleteRow);
        assert_eq!(err.context_field("variable"), Some("food"));
    }

    #[test]
    fn test_term_arity_on_decode() {
        let rows = vec![term_row("food", "ok", "triangularShape", &[1.0, 2.0, 3.0])];
        assert!(group_variables(&rows).is_ok());

        let rows = vec![term_row("food", "short", "trapezoidShape", &[1.0, 2.0, 3.0])];
        let err = group_variables(&rows).unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedTerm);
        assert_eq!(err.context_field("term"), Some("short"));
        assert_eq!(err.context_field("variable"), Some("food"));
    }

    #[test]
    fn test_unknown_shape_on_decode() {
        let rows = vec![term_row("food", "odd", "sigmoidShape", &[1.0, 2.0])];
        assert_eq!(group_variables(&rows).unwrap_err().code, ErrorCode::UnknownShape);
    }

    #[test]
    fn test_outer_join_rows() {
        let mut lonely = term_row("empty", "x", "piShape", &[0.0, 1.0]);
        lonely.term_name = None;
        lonely.shape = None;
        lonely.params = [None; 4];

        let variables = group_variables(&[lonely]).unwrap();
        assert_eq!(variables.len(), 1);
        assert!(variables[0].terms.is_empty());

        let header_only = KnowledgeRow {
            system_name: Some("bare".into()),
            network_address: Some("".into()),
            ..Default::default()
        };
        let system = group_system(&[header_only], &[]).unwrap();
        assert_eq!(system.name, "bare");
        assert!(system.knowledge_base.variables.is_empty());
        assert!(system.rule_base.is_empty());
        assert!(!system.is_sentinel());
    }

    #[test]
    fn test_rule_rows() {
        let mut second = rule_row("reg2");
        second.weight = None;
        second.antecedent_modifiers = None;

        let system = group_system(&[], &[rule_row("reg1"), second]).unwrap();
        assert_eq!(system.name, "tipper");

        let rules = &system.rule_base.rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].weight, 0.5);
        assert_eq!(rules[0].antecedent[0].modifier.as_deref(), Some("very"));
        assert_eq!(rules[1].weight, DEFAULT_RULE_WEIGHT);
        assert!(rules[1].antecedent.iter().all(|c| c.modifier.is_none()));
    }

    #[test]
    fn test_rule_rows_misaligned() {
        let mut row = rule_row("reg9");
        row.antecedent_terms = Some(vec!["rancid".into(), "poor".into(), "good".into()]);

        let err = group_rule_bases(&[row]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("rule"), Some("reg9"));
    }

    #[test]
    fn test_two_rule_bases_rejected() {
        let mut other = rule_row("reg2");
        other.rule_base_name = Some("other".into());

        let err = group_system(&[], &[rule_row("reg1"), other]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
    }
}
