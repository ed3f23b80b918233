//! Relational row forms of a fuzzy system
//!
//! Two directions meet here:
//!
//! - **read path**: the store returns denormalized join rows
//!   ([`KnowledgeRow`] for system × variable × term, [`RuleRow`] for
//!   system × rule base × rule) and the [`grouper`] rebuilds the tree;
//! - **write path**: the [`flatten`] walk emits one record per entity
//!   ([`SystemRecord`], [`VariableRecord`], [`TermRecord`],
//!   [`RuleBaseRecord`], [`RuleRecord`]) to a [`RowSink`].
//!
//! Rule clauses are stored as parallel arrays ([`ClauseArrays`]); this is
//! the only place they exist in that form.

pub mod flatten;
pub mod grouper;

pub use flatten::{flatten, FlattenStats, RowSink};
pub use grouper::{group_rule_bases, group_system, group_variables};

use serde::{Deserialize, Serialize};

use crate::error::{FmlError, FmlResult};
use crate::model::{AntecedentClause, ConsequentClause, PARAM_SLOTS};

// ============================================================================
// Read side
// ============================================================================

/// One row of the system × variable × term join
///
/// Every column is nullable; the outer join yields null variable columns for
/// a system without variables and null term columns for a variable without
/// terms.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KnowledgeRow {
    pub system_name: Option<String>,
    pub network_address: Option<String>,
    pub variable_name: Option<String>,
    pub domain_left: Option<f64>,
    pub domain_right: Option<f64>,
    pub scale: Option<String>,
    pub default_value: Option<f64>,
    pub accumulation: Option<String>,
    pub defuzzifier: Option<String>,
    pub variable_type: Option<String>,
    pub term_name: Option<String>,
    pub complement: Option<bool>,
    pub params: [Option<f64>; PARAM_SLOTS],
    pub shape: Option<String>,
}

/// One row of the system × rule base × rule join
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleRow {
    pub system_name: Option<String>,
    pub network_address: Option<String>,
    pub rule_base_name: Option<String>,
    pub and_method: Option<String>,
    pub or_method: Option<String>,
    pub activation_method: Option<String>,
    pub rule_name: Option<String>,
    pub connector: Option<String>,
    pub rule_or_method: Option<String>,
    pub weight: Option<f64>,
    pub rule_and_method: Option<String>,
    pub antecedent_variables: Option<Vec<String>>,
    pub antecedent_terms: Option<Vec<String>>,
    pub antecedent_modifiers: Option<Vec<Option<String>>>,
    pub consequent_variables: Option<Vec<String>>,
    pub consequent_terms: Option<Vec<String>>,
}

// ============================================================================
// Write side
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub name: String,
    pub network_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub name: String,
    pub domain_left: f64,
    pub domain_right: f64,
    pub scale: String,
    pub default_value: f64,
    pub accumulation: String,
    pub defuzzifier: String,
    pub var_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    pub name: String,
    pub complement: bool,
    pub params: [Option<f64>; PARAM_SLOTS],
    pub shape: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBaseRecord {
    pub name: String,
    pub and_method: String,
    pub or_method: String,
    pub activation_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub name: String,
    pub connector: String,
    pub or_method: String,
    pub weight: f64,
    pub and_method: Option<String>,
    pub clauses: ClauseArrays,
}

// ============================================================================
// Clause arrays
// ============================================================================

/// Antecedent and consequent clauses as index-aligned arrays
///
/// Index `i` of the antecedent variable, term and modifier arrays describes
/// one clause, likewise for the consequent variable and term arrays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClauseArrays {
    pub antecedent_variables: Vec<String>,
    pub antecedent_terms: Vec<String>,
    pub antecedent_modifiers: Vec<Option<String>>,
    pub consequent_variables: Vec<String>,
    pub consequent_terms: Vec<String>,
}

impl ClauseArrays {
    pub fn from_clauses(antecedent: &[AntecedentClause], consequent: &[ConsequentClause]) -> Self {
        ClauseArrays {
            antecedent_variables: antecedent.iter().map(|c| c.variable.clone()).collect(),
            antecedent_terms: antecedent.iter().map(|c| c.term.clone()).collect(),
            antecedent_modifiers: antecedent.iter().map(|c| c.modifier.clone()).collect(),
            consequent_variables: consequent.iter().map(|c| c.variable.clone()).collect(),
            consequent_terms: consequent.iter().map(|c| c.term.clone()).collect(),
        }
    }

    /// Check the alignment invariant for the rule named `rule`
    pub fn validate(&self, rule: &str) -> FmlResult<()> {
        let vars = self.antecedent_variables.len();
        let terms = self.antecedent_terms.len();
        let modifiers = self.antecedent_modifiers.len();
        if vars != terms || vars != modifiers {
            return Err(FmlError::invalid_document(format!(
                "rule '{}' antecedent arrays are misaligned: {} variables, {} terms, {} modifiers",
                rule, vars, terms, modifiers
            ))
            .with_context("rule", rule)
            .with_context("clause", vars.min(terms).min(modifiers).to_string()));
        }

        let vars = self.consequent_variables.len();
        let terms = self.consequent_terms.len();
        if vars != terms {
            return Err(FmlError::invalid_document(format!(
                "rule '{}' consequent arrays are misaligned: {} variables, {} terms",
                rule, vars, terms
            ))
            .with_context("rule", rule)
            .with_context("clause", vars.min(terms).to_string()));
        }
        Ok(())
    }

    /// Convert back to clause records, checking alignment first
    pub fn into_clauses(self, rule: &str) -> FmlResult<(Vec<AntecedentClause>, Vec<ConsequentClause>)> {
        self.validate(rule)?;

        let antecedent = self
            .antecedent_variables
            .into_iter()
            .zip(self.antecedent_terms)
            .zip(self.antecedent_modifiers)
            .map(|((variable, term), modifier)| AntecedentClause {
                variable,
                term,
                modifier,
            })
            .collect();
        let consequent = self
            .consequent_variables
            .into_iter()
            .zip(self.consequent_terms)
            .map(|(variable, term)| ConsequentClause { variable, term })
            .collect();
        Ok((antecedent, consequent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn arrays(vars: &[&str], terms: &[&str]) -> ClauseArrays {
        ClauseArrays {
            antecedent_variables: vars.iter().map(|s| s.to_string()).collect(),
            antecedent_terms: terms.iter().map(|s| s.to_string()).collect(),
            antecedent_modifiers: vec![None; vars.len()],
            consequent_variables: vec!["tip".into()],
            consequent_terms: vec!["cheap".into()],
        }
    }

    #[test]
    fn test_misaligned_antecedent_names_rule() {
        let clauses = arrays(&["food", "service"], &["rancid", "poor", "good"]);

        let err = clauses.validate("reg7").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("rule"), Some("reg7"));
        assert!(err.message.contains("reg7"));
    }

    #[test]
    fn test_misaligned_consequent() {
        let mut clauses = arrays(&["food"], &["rancid"]);
        clauses.consequent_terms.push("generous".into());
        assert_eq!(clauses.validate("r").unwrap_err().code, ErrorCode::InvalidDocument);
    }

    #[test]
    fn test_clause_conversion_keeps_positions() {
        let antecedent = vec![
            AntecedentClause { variable: "food".into(), term: "rancid".into(), modifier: Some("very".into()) },
            AntecedentClause { variable: "service".into(), term: "poor".into(), modifier: None },
        ];
        let consequent = vec![ConsequentClause { variable: "tip".into(), term: "cheap".into() }];

        let arrays = ClauseArrays::from_clauses(&antecedent, &consequent);
        assert_eq!(arrays.antecedent_modifiers, vec![Some("very".to_string()), None]);
        assert_eq!(arrays.antecedent_terms, vec!["rancid", "poor"]);

        let (a, c) = arrays.into_clauses("reg1").unwrap();
        assert_eq!(a, antecedent);
        assert_eq!(c, consequent);
    }
}
