//! FML XML codec
//!
//! [`parse`] turns an FML document into a validated [`FuzzySystem`];
//! [`serialize`] writes one back out. The output of `serialize` parses back
//! to an equal value, and serializing that value again yields the same bytes.
//!
//! ```rust,ignore
//! use fmlkb::codec::{parse, serialize, CodecOptions};
//!
//! let options = CodecOptions::default();
//! let system = parse(&std::fs::read_to_string("tipper.fml")?, &options)?;
//! println!("{}", serialize(&system, &options)?);
//! ```

pub mod reader;
pub mod writer;

pub use reader::parse;
pub use writer::serialize;

use serde::{Deserialize, Serialize};

/// Element names of the FML dialect
pub(crate) mod tags {
    pub const FUZZY_SYSTEM: &str = "fuzzySystem";
    pub const KNOWLEDGE_BASE: &str = "knowledgeBase";
    pub const FUZZY_VARIABLE: &str = "fuzzyVariable";
    pub const FUZZY_TERM: &str = "fuzzyTerm";
    pub const RULE_BASE: &str = "mamdaniRuleBase";
    pub const RULE: &str = "rule";
    pub const ANTECEDENT: &str = "antecedent";
    pub const CONSEQUENT: &str = "consequent";
    pub const THEN: &str = "then";
    pub const CLAUSE: &str = "clause";
    pub const VARIABLE: &str = "variable";
    pub const TERM: &str = "term";
}

/// Knobs for parsing and serializing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Require `weight`, `scale` and `complement` when parsing
    ///
    /// When off, a missing rule weight reads as 1.0, a missing scale as the
    /// empty string and a missing complement as false.
    pub strict_parse: bool,
    /// Spaces per nesting level on output; 0 writes everything on one line
    pub indent: usize,
    /// Start the output with `<?xml version="1.0" encoding="UTF-8"?>`
    pub xml_declaration: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            strict_parse: true,
            indent: 2,
            xml_declaration: true,
        }
    }
}

impl CodecOptions {
    pub fn lenient() -> Self {
        CodecOptions {
            strict_parse: false,
            ..Default::default()
        }
    }

    pub fn compact() -> Self {
        CodecOptions {
            indent: 0,
            xml_declaration: false,
            ..Default::default()
        }
    }
}

/// Canonical text of a number
///
/// Shortest text that reads back to the same value; integral values keep a
/// trailing `.0` so they still look like reals.
pub fn format_number(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::tests::tipper;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5.0");
        assert_eq!(format_number(-3.0), "-3.0");
        assert_eq!(format_number(0.75), "0.75");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1000000000000000000000.0");
    }

    #[test]
    fn test_round_trip() {
        let options = CodecOptions::default();
        let system = tipper();

        let text = serialize(&system, &options).unwrap();
        let parsed = parse(&text, &options).unwrap();
        assert_eq!(parsed, system);

        // canonical: a second pass writes identical bytes
        assert_eq!(serialize(&parsed, &options).unwrap(), text);
    }

    #[test]
    fn test_round_trip_compact() {
        let options = CodecOptions::compact();
        let text = serialize(&tipper(), &options).unwrap();
        assert!(!text.contains('\n'));
        assert!(text.starts_with("<fuzzySystem"));
        assert_eq!(parse(&text, &options).unwrap(), tipper());
    }

    #[test]
    fn test_strict_requires_weight() {
        let text = serialize(&tipper(), &CodecOptions::default())
            .unwrap()
            .replace(r#" weight="1.0""#, "");

        let err = parse(&text, &CodecOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingAttribute);
        assert_eq!(err.context_field("attribute"), Some("weight"));
        assert_eq!(err.context_field("rule"), Some("reg1"));

        let lenient = parse(&text, &CodecOptions::lenient()).unwrap();
        assert_eq!(lenient.rule_base.rules[0].weight, 1.0);
        assert_eq!(lenient, tipper());
    }

    #[test]
    fn test_options_from_toml() {
        let options: CodecOptions = toml::from_str("indent = 4").unwrap();
        assert_eq!(options.indent, 4);
        assert!(options.strict_parse);
    }
}
