//! FML serializer

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{format_number, tags, CodecOptions};
use crate::error::{FmlError, FmlResult};
use crate::model::{
    FuzzySystem, FuzzyTerm, FuzzyVariable, MamdaniRuleBase, Rule, DEFAULT_VARIABLE_VALUE,
};

type XmlWriter = Writer<Vec<u8>>;

/// Write `system` as an FML document
///
/// The system is validated first; an invalid tree is never written.
pub fn serialize(system: &FuzzySystem, options: &CodecOptions) -> FmlResult<String> {
    system.validate()?;

    let mut writer = if options.indent > 0 {
        Writer::new_with_indent(Vec::new(), b' ', options.indent)
    } else {
        Writer::new(Vec::new())
    };

    if options.xml_declaration {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    }

    let mut root = BytesStart::new(tags::FUZZY_SYSTEM);
    root.push_attribute(("name", system.name.as_str()));
    root.push_attribute(("networkAddress", system.network_address.as_str()));
    writer.write_event(Event::Start(root))?;

    writer.write_event(Event::Start(BytesStart::new(tags::KNOWLEDGE_BASE)))?;
    for variable in &system.knowledge_base.variables {
        write_variable(&mut writer, variable)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tags::KNOWLEDGE_BASE)))?;

    if !system.rule_base.is_empty() {
        write_rule_base(&mut writer, &system.rule_base)?;
    }

    writer.write_event(Event::End(BytesEnd::new(tags::FUZZY_SYSTEM)))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| FmlError::internal(format!("serialized FML is not UTF-8: {}", e)))
}

fn write_variable(writer: &mut XmlWriter, variable: &FuzzyVariable) -> FmlResult<()> {
    let domain_left = format_number(variable.domain_left);
    let domain_right = format_number(variable.domain_right);

    let mut start = BytesStart::new(tags::FUZZY_VARIABLE);
    start.push_attribute(("name", variable.name.as_str()));
    start.push_attribute(("domainleft", domain_left.as_str()));
    start.push_attribute(("domainright", domain_right.as_str()));
    start.push_attribute(("scale", variable.scale.as_str()));
    start.push_attribute(("type", variable.var_type.as_str()));
    if variable.default_value != DEFAULT_VARIABLE_VALUE {
        start.push_attribute(("defaultValue", format_number(variable.default_value).as_str()));
    }
    if !variable.accumulation.is_empty() {
        start.push_attribute(("accumulation", variable.accumulation.as_str()));
    }
    if !variable.defuzzifier.is_empty() {
        start.push_attribute(("defuzzifier", variable.defuzzifier.as_str()));
    }

    if variable.terms.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for term in &variable.terms {
        write_term(writer, term)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tags::FUZZY_VARIABLE)))?;
    Ok(())
}

fn write_term(writer: &mut XmlWriter, term: &FuzzyTerm) -> FmlResult<()> {
    let mut start = BytesStart::new(tags::FUZZY_TERM);
    start.push_attribute(("name", term.name.as_str()));
    start.push_attribute(("complement", if term.complement { "true" } else { "false" }));
    writer.write_event(Event::Start(start))?;

    let mut shape = BytesStart::new(term.shape.id());
    for (index, value) in term.params.values().into_iter().enumerate() {
        let key = format!("param{}", index + 1);
        shape.push_attribute((key.as_str(), format_number(value).as_str()));
    }
    writer.write_event(Event::Empty(shape))?;

    writer.write_event(Event::End(BytesEnd::new(tags::FUZZY_TERM)))?;
    Ok(())
}

fn write_rule_base(writer: &mut XmlWriter, rule_base: &MamdaniRuleBase) -> FmlResult<()> {
    let mut start = BytesStart::new(tags::RULE_BASE);
    start.push_attribute(("name", rule_base.name.as_str()));
    start.push_attribute(("andMethod", rule_base.and_method.as_str()));
    start.push_attribute(("orMethod", rule_base.or_method.as_str()));
    start.push_attribute(("activationMethod", rule_base.activation_method.as_str()));
    writer.write_event(Event::Start(start))?;

    for rule in &rule_base.rules {
        write_rule(writer, rule)?;
    }

    writer.write_event(Event::End(BytesEnd::new(tags::RULE_BASE)))?;
    Ok(())
}

fn write_rule(writer: &mut XmlWriter, rule: &Rule) -> FmlResult<()> {
    let weight = format_number(rule.weight);

    let mut start = BytesStart::new(tags::RULE);
    start.push_attribute(("name", rule.name.as_str()));
    start.push_attribute(("connector", rule.connector.as_str()));
    start.push_attribute(("orMethod", rule.or_method.as_str()));
    start.push_attribute(("weight", weight.as_str()));
    if let Some(and_method) = &rule.and_method {
        start.push_attribute(("andMethod", and_method.as_str()));
    }
    writer.write_event(Event::Start(start))?;

    writer.write_event(Event::Start(BytesStart::new(tags::ANTECEDENT)))?;
    for clause in &rule.antecedent {
        let mut start = BytesStart::new(tags::CLAUSE);
        if let Some(modifier) = &clause.modifier {
            start.push_attribute(("modifier", modifier.as_str()));
        }
        write_clause(writer, start, &clause.variable, &clause.term)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tags::ANTECEDENT)))?;

    writer.write_event(Event::Start(BytesStart::new(tags::CONSEQUENT)))?;
    writer.write_event(Event::Start(BytesStart::new(tags::THEN)))?;
    for clause in &rule.consequent {
        write_clause(writer, BytesStart::new(tags::CLAUSE), &clause.variable, &clause.term)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tags::THEN)))?;
    writer.write_event(Event::End(BytesEnd::new(tags::CONSEQUENT)))?;

    writer.write_event(Event::End(BytesEnd::new(tags::RULE)))?;
    Ok(())
}

fn write_clause(writer: &mut XmlWriter, start: BytesStart<'_>, variable: &str, term: &str) -> FmlResult<()> {
    writer.write_event(Event::Start(start))?;
    write_text_element(writer, tags::VARIABLE, variable)?;
    write_text_element(writer, tags::TERM, term)?;
    writer.write_event(Event::End(BytesEnd::new(tags::CLAUSE)))?;
    Ok(())
}

fn write_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> FmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::tests::tipper;
    use crate::model::{FuzzySystem, FuzzyVariable};

    fn compact(system: &FuzzySystem) -> String {
        serialize(system, &CodecOptions::compact()).unwrap()
    }

    #[test]
    fn test_declaration_and_root() {
        let text = serialize(&tipper(), &CodecOptions::default()).unwrap();
        assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(text.contains(r#"<fuzzySystem name="tipper" networkAddress="127.0.0.1">"#));
        assert!(text.contains("\n  <knowledgeBase>"));
    }

    #[test]
    fn test_variable_attributes() {
        let text = compact(&tipper());
        assert!(text.contains(
            r#"<fuzzyVariable name="food" domainleft="0.0" domainright="10.0" scale="" type="input">"#
        ));
        assert!(text.contains(
            r#"<fuzzyVariable name="tip" domainleft="0.0" domainright="20.0" scale="" type="output" defaultValue="5.0" accumulation="MAX" defuzzifier="COG">"#
        ));
    }

    #[test]
    fn test_term_and_shape() {
        let text = compact(&tipper());
        assert!(text.contains(
            r#"<fuzzyTerm name="rancid" complement="false"><triangularShape param1="0.0" param2="2.0" param3="5.5"/></fuzzyTerm>"#
        ));
        assert!(text.contains(r#"<fuzzyTerm name="good" complement="true"><trapezoidShape param1="3.0" param2="5.0" param3="7.0" param4="9.5"/>"#));
    }

    #[test]
    fn test_rules() {
        let text = compact(&tipper());
        assert!(text.contains(
            r#"<rule name="reg1" connector="or" orMethod="MAX" weight="1.0"><antecedent><clause><variable>service</variable><term>poor</term></clause><clause modifier="very"><variable>food</variable><term>rancid</term></clause></antecedent><consequent><then><clause><variable>tip</variable><term>cheap</term></clause></then></consequent></rule>"#
        ));
        assert!(text.contains(r#"<rule name="reg2" connector="and" orMethod="MAX" weight="0.75" andMethod="PROD">"#));
    }

    #[test]
    fn test_escaping() {
        let system = FuzzySystem::new("a<b & \"c\"", "").with_variable(FuzzyVariable::new("x", 0.0, 1.0, "input"));
        let text = compact(&system);
        assert!(text.contains("a&lt;b &amp; &quot;c&quot;"));
        assert!(!text.contains("mamdaniRuleBase"));
    }

    #[test]
    fn test_invalid_not_serialized() {
        let err = serialize(&FuzzySystem::sentinel(), &CodecOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
    }

    #[test]
    fn test_values_that_cannot_read_back_are_refused() {
        let options = CodecOptions::default();

        let mut padded = tipper();
        padded.rule_base.rules[0].antecedent[0].term = " poor ".into();
        assert_eq!(serialize(&padded, &options).unwrap_err().code, ErrorCode::InvalidDocument);

        let mut blank = tipper();
        blank.rule_base.rules[0].consequent[0].variable = " ".into();
        assert_eq!(serialize(&blank, &options).unwrap_err().code, ErrorCode::InvalidDocument);

        let mut nan = tipper();
        nan.knowledge_base.variables[0].domain_left = f64::NAN;
        let err = serialize(&nan, &options).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDocument);
        assert_eq!(err.context_field("variable"), Some("food"));

        let text = serialize(&tipper(), &options).unwrap();
        assert_eq!(crate::codec::parse(&text, &options).unwrap(), tipper());
    }
}
