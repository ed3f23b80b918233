//! FML document model
//!
//! The in-memory form of a fuzzy system: a knowledge base of variables and
//! terms plus a Mamdani rule base. The tree is owned top-down from
//! [`FuzzySystem`]; nothing holds a reference back to its parent.
//!
//! Rules keep their antecedent and consequent as lists of clause records.
//! The parallel-array layout used by the relational store only exists at
//! the row boundary (see [`crate::rows`]).

pub mod shape;

pub use shape::{arity_of, Shape, TermParams, PARAM_SLOTS};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, FmlError, FmlResult};
use crate::fml_ensure;

/// Weight a rule carries when none is given
pub const DEFAULT_RULE_WEIGHT: f64 = 1.0;

/// Default value of a variable when none is given
pub const DEFAULT_VARIABLE_VALUE: f64 = 0.0;

/// A complete fuzzy system
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FuzzySystem {
    pub name: String,
    pub network_address: String,
    pub knowledge_base: KnowledgeBase,
    pub rule_base: MamdaniRuleBase,
}

/// The variables of one system
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub variables: Vec<FuzzyVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyVariable {
    pub name: String,
    pub domain_left: f64,
    pub domain_right: f64,
    pub scale: String,
    pub default_value: f64,
    pub accumulation: String,
    pub defuzzifier: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub terms: Vec<FuzzyTerm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyTerm {
    pub name: String,
    pub complement: bool,
    pub shape: Shape,
    pub params: TermParams,
}

/// Rule evaluation settings and the ordered rules of one system
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MamdaniRuleBase {
    pub name: String,
    pub and_method: String,
    pub or_method: String,
    pub activation_method: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub connector: String,
    pub or_method: String,
    pub weight: f64,
    pub and_method: Option<String>,
    pub antecedent: Vec<AntecedentClause>,
    pub consequent: Vec<ConsequentClause>,
}

/// `variable IS [modifier] term`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntecedentClause {
    pub variable: String,
    pub term: String,
    pub modifier: Option<String>,
}

/// `variable IS term`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsequentClause {
    pub variable: String,
    pub term: String,
}

// ============================================================================
// Construction
// ============================================================================

impl FuzzySystem {
    pub fn new(name: impl Into<String>, network_address: impl Into<String>) -> Self {
        FuzzySystem {
            name: name.into(),
            network_address: network_address.into(),
            knowledge_base: KnowledgeBase::default(),
            rule_base: MamdaniRuleBase::default(),
        }
    }

    /// The "not found" system: empty name, empty address, no children
    pub fn sentinel() -> Self {
        FuzzySystem::default()
    }

    /// True for the value [`FuzzySystem::sentinel`] returns
    pub fn is_sentinel(&self) -> bool {
        self.name.is_empty()
            && self.network_address.is_empty()
            && self.knowledge_base.variables.is_empty()
            && self.rule_base.is_empty()
    }

    pub fn with_variable(mut self, variable: FuzzyVariable) -> Self {
        self.knowledge_base.variables.push(variable);
        self
    }

    pub fn with_rule_base(mut self, rule_base: MamdaniRuleBase) -> Self {
        self.rule_base = rule_base;
        self
    }

    pub fn variable(&self, name: &str) -> Option<&FuzzyVariable> {
        self.knowledge_base.variables.iter().find(|v| v.name == name)
    }

    pub fn term_count(&self) -> usize {
        self.knowledge_base.variables.iter().map(|v| v.terms.len()).sum()
    }
}

impl FuzzyVariable {
    pub fn new(
        name: impl Into<String>,
        domain_left: f64,
        domain_right: f64,
        var_type: impl Into<String>,
    ) -> Self {
        FuzzyVariable {
            name: name.into(),
            domain_left,
            domain_right,
            scale: String::new(),
            default_value: DEFAULT_VARIABLE_VALUE,
            accumulation: String::new(),
            defuzzifier: String::new(),
            var_type: var_type.into(),
            terms: Vec::new(),
        }
    }

    pub fn with_scale(mut self, scale: impl Into<String>) -> Self {
        self.scale = scale.into();
        self
    }

    pub fn with_default_value(mut self, value: f64) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_accumulation(mut self, accumulation: impl Into<String>) -> Self {
        self.accumulation = accumulation.into();
        self
    }

    pub fn with_defuzzifier(mut self, defuzzifier: impl Into<String>) -> Self {
        self.defuzzifier = defuzzifier.into();
        self
    }

    pub fn with_term(mut self, term: FuzzyTerm) -> Self {
        self.terms.push(term);
        self
    }
}

impl FuzzyTerm {
    /// Build a term, checking the parameter count against the shape
    pub fn new(name: impl Into<String>, shape: Shape, values: &[f64]) -> FmlResult<Self> {
        let name = name.into();
        let params = TermParams::from_values(&name, values)?;
        params.check_arity(shape, &name)?;
        Ok(FuzzyTerm {
            name,
            complement: false,
            shape,
            params,
        })
    }

    pub fn complemented(mut self) -> Self {
        self.complement = true;
        self
    }
}

impl MamdaniRuleBase {
    pub fn new(
        name: impl Into<String>,
        and_method: impl Into<String>,
        or_method: impl Into<String>,
        activation_method: impl Into<String>,
    ) -> Self {
        MamdaniRuleBase {
            name: name.into(),
            and_method: and_method.into(),
            or_method: or_method.into(),
            activation_method: activation_method.into(),
            rules: Vec::new(),
        }
    }

    /// A rule base with no name, methods or rules; what a system stored
    /// without rules reads back as
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.and_method.is_empty()
            && self.or_method.is_empty()
            && self.activation_method.is_empty()
            && self.rules.is_empty()
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        connector: impl Into<String>,
        or_method: impl Into<String>,
    ) -> Self {
        Rule {
            name: name.into(),
            connector: connector.into(),
            or_method: or_method.into(),
            weight: DEFAULT_RULE_WEIGHT,
            and_method: None,
            antecedent: Vec::new(),
            consequent: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_and_method(mut self, and_method: impl Into<String>) -> Self {
        self.and_method = Some(and_method.into());
        self
    }

    pub fn when(mut self, variable: impl Into<String>, term: impl Into<String>) -> Self {
        self.antecedent.push(AntecedentClause {
            variable: variable.into(),
            term: term.into(),
            modifier: None,
        });
        self
    }

    pub fn when_modified(
        mut self,
        variable: impl Into<String>,
        modifier: impl Into<String>,
        term: impl Into<String>,
    ) -> Self {
        self.antecedent.push(AntecedentClause {
            variable: variable.into(),
            term: term.into(),
            modifier: Some(modifier.into()),
        });
        self
    }

    pub fn then(mut self, variable: impl Into<String>, term: impl Into<String>) -> Self {
        self.consequent.push(ConsequentClause {
            variable: variable.into(),
            term: term.into(),
        });
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl FuzzySystem {
    /// Check the whole tree, returning the first violation found
    pub fn validate(&self) -> FmlResult<()> {
        fml_ensure!(!self.name.is_empty(), ErrorCode::InvalidDocument, "fuzzy system has no name");

        let mut seen = HashSet::new();
        for variable in &self.knowledge_base.variables {
            if variable.name.is_empty() {
                return Err(FmlError::invalid_document(format!(
                    "system '{}' has a variable with no name",
                    self.name
                ))
                .with_context("system", &self.name));
            }
            if !seen.insert(variable.name.as_str()) {
                return Err(FmlError::invalid_document(format!(
                    "variable '{}' is declared more than once",
                    variable.name
                ))
                .with_context("system", &self.name)
                .with_context("variable", &variable.name));
            }
            let with_variable = |e: FmlError| {
                e.with_context("system", &self.name)
                    .with_context("variable", &variable.name)
            };
            check_finite("domainleft", variable.domain_left).map_err(with_variable)?;
            check_finite("domainright", variable.domain_right).map_err(with_variable)?;
            check_finite("defaultValue", variable.default_value).map_err(with_variable)?;
            for term in &variable.terms {
                term.params
                    .check_arity(term.shape, &term.name)
                    .map_err(with_variable)?;
                for value in term.params.values() {
                    check_finite("param", value)
                        .map_err(|e| with_variable(e.with_context("term", &term.name)))?;
                }
            }
        }

        for rule in &self.rule_base.rules {
            rule.validate().map_err(|e| e.with_context("system", &self.name))?;
        }
        Ok(())
    }
}

impl Rule {
    fn validate(&self) -> FmlResult<()> {
        if self.name.is_empty() {
            return Err(FmlError::invalid_document("rule has no name"));
        }
        check_finite("weight", self.weight).map_err(|e| e.with_context("rule", &self.name))?;
        for (index, clause) in self.antecedent.iter().enumerate() {
            self.check_clause("antecedent", index, &clause.variable, &clause.term)?;
        }
        for (index, clause) in self.consequent.iter().enumerate() {
            self.check_clause("consequent", index, &clause.variable, &clause.term)?;
        }
        Ok(())
    }

    /// Clause text is element content in FML, which readers trim
    fn check_clause(&self, part: &str, index: usize, variable: &str, term: &str) -> FmlResult<()> {
        let clause_error = |message: String| {
            FmlError::invalid_document(message)
                .with_context("rule", &self.name)
                .with_context("clause", index.to_string())
        };
        if variable.trim().is_empty() || term.trim().is_empty() {
            return Err(clause_error(format!(
                "rule '{}' {} clause {} needs both a variable and a term",
                self.name, part, index
            )));
        }
        for text in [variable, term] {
            if text.trim() != text {
                return Err(clause_error(format!(
                    "rule '{}' {} clause {} has surrounding whitespace in '{}'",
                    self.name, part, index, text
                )));
            }
        }
        Ok(())
    }
}

/// NaN and infinities do not survive a round trip through text or SQL
fn check_finite(attribute: &str, value: f64) -> FmlResult<()> {
    if value.is_finite() {
        return Ok(());
    }
    Err(FmlError::invalid_document(format!(
        "attribute '{}' must be a finite number, found {}",
        attribute, value
    ))
    .with_context("attribute", attribute))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCode;

    /// The tipper system used throughout the crate's tests
    pub(crate) fn tipper() -> FuzzySystem {
        FuzzySystem::new("tipper", "127.0.0.1")
            .with_variable(
                FuzzyVariable::new("food", 0.0, 10.0, "input")
                    .with_term(FuzzyTerm::new("rancid", Shape::Triangular, &[0.0, 2.0, 5.5]).unwrap())
                    .with_term(FuzzyTerm::new("delicious", Shape::RightGaussian, &[10.0, 1.5]).unwrap()),
            )
            .with_variable(
                FuzzyVariable::new("service", 0.0, 10.0, "input")
                    .with_scale("stars")
                    .with_term(FuzzyTerm::new("poor", Shape::LeftLinear, &[0.0, 4.0]).unwrap())
                    .with_term(
                        FuzzyTerm::new("good", Shape::Trapezoid, &[3.0, 5.0, 7.0, 9.5])
                            .unwrap()
                            .complemented(),
                    ),
            )
            .with_variable(
                FuzzyVariable::new("tip", 0.0, 20.0, "output")
                    .with_default_value(5.0)
                    .with_accumulation("MAX")
                    .with_defuzzifier("COG")
                    .with_term(FuzzyTerm::new("cheap", Shape::LeftGaussian, &[0.0, 2.0]).unwrap())
                    .with_term(FuzzyTerm::new("generous", Shape::Pi, &[15.0, 20.0]).unwrap()),
            )
            .with_rule_base(
                MamdaniRuleBase::new("mrb", "MIN", "MAX", "MIN")
                    .with_rule(
                        Rule::new("reg1", "or", "MAX")
                            .when("service", "poor")
                            .when_modified("food", "very", "rancid")
                            .then("tip", "cheap"),
                    )
                    .with_rule(
                        Rule::new("reg2", "and", "MAX")
                            .with_weight(0.75)
                            .with_and_method("PROD")
                            .when("service", "good")
                            .then("tip", "generous"),
                    ),
            )
    }

    #[test]
    fn test_tipper_is_valid() {
        let system = tipper();
        assert!(system.validate().is_ok());
        assert_eq!(system.term_count(), 6);
        assert_eq!(system.variable("service").unwrap().scale, "stars");
    }

    #[test]
    fn test_rule_defaults() {
        let rule = Rule::new("r", "and", "MAX");
        assert_eq!(rule.weight, DEFAULT_RULE_WEIGHT);
        assert_eq!(rule.and_method, None);
    }

    #[test]
    fn test_sentinel() {
        let sentinel = FuzzySystem::sentinel();
        assert!(sentinel.is_sentinel());
        assert!(!tipper().is_sentinel());
        assert_eq!(sentinel.validate().unwrap_err().code, ErrorCode::InvalidDocument);
    }

    #[test]
    fn test_validate_arity() {
        let mut system = tipper();
        system.knowledge_base.variables[1].terms[1].params = TermParams([Some(3.0), Some(5.0), Some(7.0), None]);

        let err = system.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedTerm);
        assert_eq!(err.context_field("variable"), Some("service"));
        assert_eq!(err.context_field("term"), Some("good"));
    }

    #[test]
    fn test_validate_duplicate_variable() {
        let system = tipper().with_variable(FuzzyVariable::new("food", 0.0, 1.0, "input"));
        let err = system.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("variable"), Some("food"));
    }

    #[test]
    fn test_validate_fails_fast() {
        let mut system = tipper();
        system.knowledge_base.variables[0].terms[0].params = TermParams::default();
        system.rule_base.rules[1].consequent[0].term.clear();

        // the term problem comes first in the walk
        assert_eq!(system.validate().unwrap_err().code, ErrorCode::MalformedTerm);
    }

    #[test]
    fn test_validate_empty_clause() {
        let mut system = tipper();
        system.rule_base.rules[1].consequent[0].term.clear();

        let err = system.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("rule"), Some("reg2"));
        assert_eq!(err.context_field("clause"), Some("0"));
    }

    #[test]
    fn test_validate_padded_clause_text() {
        let mut system = tipper();
        system.rule_base.rules[0].antecedent[0].term = " poor ".into();

        let err = system.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("rule"), Some("reg1"));
        assert_eq!(err.context_field("clause"), Some("0"));

        let mut system = tipper();
        system.rule_base.rules[0].consequent[0].variable = " ".into();
        let err = system.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert!(err.message.contains("needs both a variable and a term"));
    }

    #[test]
    fn test_validate_non_finite_numbers() {
        let mut system = tipper();
        system.knowledge_base.variables[0].domain_left = f64::NAN;
        let err = system.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("variable"), Some("food"));
        assert_eq!(err.context_field("attribute"), Some("domainleft"));

        let mut system = tipper();
        system.knowledge_base.variables[2].default_value = f64::INFINITY;
        assert_eq!(system.validate().unwrap_err().context_field("variable"), Some("tip"));

        let mut system = tipper();
        system.knowledge_base.variables[1].terms[1].params.0[3] = Some(f64::NEG_INFINITY);
        let err = system.validate().unwrap_err();
        assert_eq!(err.context_field("term"), Some("good"));
        assert_eq!(err.context_field("variable"), Some("service"));

        let mut system = tipper();
        system.rule_base.rules[1].weight = f64::NAN;
        let err = system.validate().unwrap_err();
        assert_eq!(err.context_field("rule"), Some("reg2"));
        assert_eq!(err.context_field("attribute"), Some("weight"));
    }

    #[test]
    fn test_validate_unnamed_system() {
        let err = FuzzySystem::sentinel().validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        let location = err.context.and_then(|c| c.location).unwrap();
        assert!(location.starts_with("src/model/mod.rs:"));
    }
}
