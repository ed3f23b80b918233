//! Membership function shape registry
//!
//! A closed catalogue of the shapes an FML term may use, with the number of
//! parameters each one takes. Shapes are a tagged union: parsing matches an
//! identifier against the enumeration instead of probing for each case.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FmlError, FmlResult};

/// Number of parameter slots a term carries regardless of its shape
pub const PARAM_SLOTS: usize = 4;

/// Membership function shape of a fuzzy term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    #[serde(rename = "leftLinearShape")]
    LeftLinear,
    #[serde(rename = "triangularShape")]
    Triangular,
    #[serde(rename = "leftGaussianShape")]
    LeftGaussian,
    #[serde(rename = "piShape")]
    Pi,
    #[serde(rename = "rightGaussianShape")]
    RightGaussian,
    #[serde(rename = "trapezoidShape")]
    Trapezoid,
}

impl Shape {
    /// Every shape, in registry order
    pub const ALL: [Shape; 6] = [
        Shape::LeftLinear,
        Shape::Triangular,
        Shape::LeftGaussian,
        Shape::Pi,
        Shape::RightGaussian,
        Shape::Trapezoid,
    ];

    /// The FML element name / stored identifier
    pub fn id(&self) -> &'static str {
        match self {
            Shape::LeftLinear => "leftLinearShape",
            Shape::Triangular => "triangularShape",
            Shape::LeftGaussian => "leftGaussianShape",
            Shape::Pi => "piShape",
            Shape::RightGaussian => "rightGaussianShape",
            Shape::Trapezoid => "trapezoidShape",
        }
    }

    /// Number of populated parameters this shape requires
    pub fn arity(&self) -> usize {
        match self {
            Shape::Triangular => 3,
            Shape::Trapezoid => 4,
            Shape::LeftLinear | Shape::LeftGaussian | Shape::Pi | Shape::RightGaussian => 2,
        }
    }

    /// Look up a shape by identifier
    pub fn from_id(id: &str) -> FmlResult<Shape> {
        Shape::ALL
            .iter()
            .copied()
            .find(|shape| shape.id() == id)
            .ok_or_else(|| FmlError::unknown_shape(id))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Arity of a shape given by identifier
pub fn arity_of(shape_id: &str) -> FmlResult<usize> {
    Shape::from_id(shape_id).map(|shape| shape.arity())
}

/// The four parameter slots of a term
///
/// Populated slots come first; the slots past the shape's arity are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TermParams(pub [Option<f64>; PARAM_SLOTS]);

impl TermParams {
    /// Build from the populated values, padding the remaining slots with `None`
    ///
    /// More than four values is a malformed term.
    pub fn from_values(term: &str, values: &[f64]) -> FmlResult<Self> {
        if values.len() > PARAM_SLOTS {
            return Err(FmlError::malformed_term(
                term,
                format!("term '{}' has {} parameters, at most {} are allowed", term, values.len(), PARAM_SLOTS),
            ));
        }
        let mut slots = [None; PARAM_SLOTS];
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = Some(*value);
        }
        Ok(TermParams(slots))
    }

    /// The raw slots
    pub fn slots(&self) -> &[Option<f64>; PARAM_SLOTS] {
        &self.0
    }

    /// Number of populated slots
    pub fn populated(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    /// The populated leading values
    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map_while(|slot| *slot).collect()
    }

    /// Check these parameters against a shape's arity
    ///
    /// Exactly `arity` leading slots must be populated and every later slot
    /// must be empty.
    pub fn check_arity(&self, shape: Shape, term: &str) -> FmlResult<()> {
        let arity = shape.arity();
        let leading = self.0.iter().take_while(|slot| slot.is_some()).count();
        if leading != arity || self.populated() != arity {
            return Err(FmlError::malformed_term(
                term,
                format!(
                    "{} term '{}' needs exactly {} leading parameters, found {} populated",
                    shape,
                    term,
                    arity,
                    self.populated()
                ),
            )
            .with_context("shape", shape.id()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_registry_arity() {
        assert_eq!(arity_of("leftLinearShape").unwrap(), 2);
        assert_eq!(arity_of("triangularShape").unwrap(), 3);
        assert_eq!(arity_of("leftGaussianShape").unwrap(), 2);
        assert_eq!(arity_of("piShape").unwrap(), 2);
        assert_eq!(arity_of("rightGaussianShape").unwrap(), 2);
        assert_eq!(arity_of("trapezoidShape").unwrap(), 4);
    }

    #[test]
    fn test_unknown_shape() {
        let err = arity_of("sigmoidShape").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownShape);
        // identifiers are case sensitive
        assert!(Shape::from_id("TrapezoidShape").is_err());
    }

    #[test]
    fn test_id_round_trip() {
        for shape in Shape::ALL {
            assert_eq!(Shape::from_id(shape.id()).unwrap(), shape);
        }
    }

    #[test]
    fn test_params_padding() {
        let params = TermParams::from_values("low", &[0.0, 5.0]).unwrap();
        assert_eq!(params.slots(), &[Some(0.0), Some(5.0), None, None]);
        assert_eq!(params.values(), vec![0.0, 5.0]);
        assert!(TermParams::from_values("x", &[1.0; 5]).is_err());
    }

    #[test]
    fn test_arity_check() {
        let three = TermParams::from_values("hot", &[1.0, 2.0, 3.0]).unwrap();
        assert!(three.check_arity(Shape::Triangular, "hot").is_ok());

        let err = three.check_arity(Shape::Trapezoid, "hot").unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedTerm);
        assert_eq!(err.context_field("term"), Some("hot"));

        // a gap before the last populated slot is not accepted
        let gapped = TermParams([Some(1.0), None, Some(3.0), None]);
        assert!(gapped.check_arity(Shape::Pi, "gap").is_err());
    }
}
