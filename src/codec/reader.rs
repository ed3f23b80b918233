//! FML parser
//!
//! Reading happens in two passes: `quick-xml` events are collected into a
//! small [`Element`] tree, then the tree is walked top-down into the model.
//! Every error names the element it was found on.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{tags, CodecOptions};
use crate::error::{ErrorCode, FmlError, FmlResult};
use crate::model::{
    AntecedentClause, ConsequentClause, FuzzySystem, FuzzyTerm, FuzzyVariable, KnowledgeBase,
    MamdaniRuleBase, Rule, Shape, TermParams, DEFAULT_RULE_WEIGHT, DEFAULT_VARIABLE_VALUE,
    PARAM_SLOTS,
};

// ============================================================================
// Element tree
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> FmlResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| FmlError::xml_syntax(e.to_string()).with_context("element", &name))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr.unescape_value()?.to_string();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, key: &str) -> FmlResult<&str> {
        self.attr(key)
            .ok_or_else(|| FmlError::missing_attribute(&self.name, key))
    }

    fn number(&self, key: &str) -> FmlResult<f64> {
        parse_number(key, self.required(key)?)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> FmlResult<String> {
        self.child(name)
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| FmlError::missing_attribute(&self.name, name))
    }
}

fn parse_number(key: &str, text: &str) -> FmlResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| FmlError::invalid_number(key, text))
}

/// `true`/`false` in any case; lenient parsing reads anything else as false
fn parse_flag(text: &str, options: &CodecOptions) -> FmlResult<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") || !options.strict_parse {
        Ok(false)
    } else {
        Err(FmlError::new(
            ErrorCode::InvalidNumber,
            format!("attribute 'complement' is not true or false: '{}'", text),
        )
        .with_context("attribute", "complement"))
    }
}

/// Collect the document into an element tree, returning the root
fn build_tree(text: &str) -> FmlResult<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FmlError::from(e).at(format!("byte {}", reader.buffer_position())))?;

        match event {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                // quick-xml has already matched the end name against the start
                let element = stack
                    .pop()
                    .ok_or_else(|| FmlError::xml_syntax("closing tag without an opening tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(FmlError::xml_syntax(format!("<{}> is never closed", open.name))
            .with_context("element", &open.name));
    }
    root.ok_or_else(|| FmlError::xml_syntax("document has no root element"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> FmlResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(FmlError::xml_syntax(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

// ============================================================================
// Tree walk
// ============================================================================

/// Parse an FML document into a validated system
pub fn parse(text: &str, options: &CodecOptions) -> FmlResult<FuzzySystem> {
    let root = build_tree(text)?;
    if root.name != tags::FUZZY_SYSTEM {
        return Err(FmlError::invalid_document(format!(
            "root element is <{}>, expected <{}>",
            root.name,
            tags::FUZZY_SYSTEM
        )));
    }

    let name = root.required("name")?.to_string();
    let network_address = root.required("networkAddress")?.to_string();
    let with_system = |e: FmlError| e.with_context("system", &name);

    let knowledge_base = root.child(tags::KNOWLEDGE_BASE).ok_or_else(|| {
        FmlError::invalid_document(format!("system '{}' has no <{}>", name, tags::KNOWLEDGE_BASE))
            .with_context("system", &name)
    })?;
    let variables = knowledge_base
        .children_named(tags::FUZZY_VARIABLE)
        .map(|v| read_variable(v, options))
        .collect::<FmlResult<Vec<_>>>()
        .map_err(with_system)?;

    let mut rule_bases = root.children_named(tags::RULE_BASE);
    let rule_base = match rule_bases.next() {
        Some(element) => read_rule_base(element, options).map_err(with_system)?,
        None => MamdaniRuleBase::default(),
    };
    if rule_bases.next().is_some() {
        return Err(FmlError::invalid_document(format!(
            "system '{}' has more than one <{}>",
            name,
            tags::RULE_BASE
        ))
        .with_context("system", &name));
    }

    let system = FuzzySystem {
        name,
        network_address,
        knowledge_base: KnowledgeBase { variables },
        rule_base,
    };
    system.validate()?;
    Ok(system)
}

fn read_variable(element: &Element, options: &CodecOptions) -> FmlResult<FuzzyVariable> {
    let name = element.required("name")?.to_string();
    let with_variable = |e: FmlError| e.with_context("variable", &name);

    let scale = match element.attr("scale") {
        Some(scale) => scale.to_string(),
        None if options.strict_parse => {
            return Err(with_variable(FmlError::missing_attribute(&element.name, "scale")))
        }
        None => String::new(),
    };
    let default_value = match element.attr("defaultValue") {
        Some(text) => parse_number("defaultValue", text).map_err(with_variable)?,
        None => DEFAULT_VARIABLE_VALUE,
    };

    let terms = element
        .children_named(tags::FUZZY_TERM)
        .map(|t| read_term(t, options))
        .collect::<FmlResult<Vec<_>>>()
        .map_err(with_variable)?;

    Ok(FuzzyVariable {
        domain_left: element.number("domainleft").map_err(with_variable)?,
        domain_right: element.number("domainright").map_err(with_variable)?,
        scale,
        default_value,
        accumulation: element.attr("accumulation").unwrap_or_default().to_string(),
        defuzzifier: element.attr("defuzzifier").unwrap_or_default().to_string(),
        var_type: element.required("type").map_err(with_variable)?.to_string(),
        terms,
        name,
    })
}

fn read_term(element: &Element, options: &CodecOptions) -> FmlResult<FuzzyTerm> {
    let name = element.required("name")?.to_string();
    let with_term = |e: FmlError| e.with_context("term", &name);

    let complement = match element.attr("complement") {
        Some(text) => parse_flag(text, options).map_err(with_term)?,
        None if options.strict_parse => {
            return Err(with_term(FmlError::missing_attribute(&element.name, "complement")))
        }
        None => false,
    };

    // every child of a term is a shape; anything outside the registry fails
    let shapes = element
        .children
        .iter()
        .map(|child| Shape::from_id(&child.name).map(|shape| (shape, child)))
        .collect::<FmlResult<Vec<_>>>()
        .map_err(with_term)?;

    let (shape, shape_element) = match shapes.as_slice() {
        [single] => *single,
        [] => {
            return Err(FmlError::malformed_term(&name, format!("term '{}' has no shape element", name)))
        }
        several => {
            return Err(FmlError::malformed_term(
                &name,
                format!("term '{}' has {} shape elements, expected one", name, several.len()),
            ))
        }
    };

    let params = read_params(shape_element, &name)?;
    params.check_arity(shape, &name)?;

    Ok(FuzzyTerm {
        name,
        complement,
        shape,
        params,
    })
}

/// Read `param1..param4`, also accepting `Param1..Param4`
///
/// An empty value or the literal `None` counts as an absent slot.
fn read_params(element: &Element, term: &str) -> FmlResult<TermParams> {
    let mut slots = [None; PARAM_SLOTS];
    for (index, slot) in slots.iter_mut().enumerate() {
        let lower = format!("param{}", index + 1);
        let upper = format!("Param{}", index + 1);
        let Some(text) = element.attr(&lower).or_else(|| element.attr(&upper)) else {
            continue;
        };
        if text.trim().is_empty() || text.trim() == "None" {
            continue;
        }
        *slot = Some(parse_number(&lower, text).map_err(|e| e.with_context("term", term))?);
    }
    Ok(TermParams(slots))
}

fn read_rule_base(element: &Element, options: &CodecOptions) -> FmlResult<MamdaniRuleBase> {
    let name = element.required("name")?.to_string();
    let with_rule_base = |e: FmlError| e.with_context("rule_base", &name);

    let rules = element
        .children_named(tags::RULE)
        .map(|r| read_rule(r, options))
        .collect::<FmlResult<Vec<_>>>()
        .map_err(with_rule_base)?;

    Ok(MamdaniRuleBase {
        and_method: element.required("andMethod").map_err(with_rule_base)?.to_string(),
        or_method: element.required("orMethod").map_err(with_rule_base)?.to_string(),
        activation_method: element
            .required("activationMethod")
            .map_err(with_rule_base)?
            .to_string(),
        rules,
        name,
    })
}

fn read_rule(element: &Element, options: &CodecOptions) -> FmlResult<Rule> {
    let name = element.required("name")?.to_string();
    let with_rule = |e: FmlError| e.with_context("rule", &name);

    let weight = match element.attr("weight") {
        Some(text) => parse_number("weight", text).map_err(with_rule)?,
        None if options.strict_parse => {
            return Err(with_rule(FmlError::missing_attribute(&element.name, "weight")))
        }
        None => DEFAULT_RULE_WEIGHT,
    };

    let antecedent = match element.child(tags::ANTECEDENT) {
        Some(antecedent) => antecedent
            .children_named(tags::CLAUSE)
            .enumerate()
            .map(|(index, clause)| -> FmlResult<AntecedentClause> {
                Ok(AntecedentClause {
                    variable: clause_text(clause, tags::VARIABLE, index)?,
                    term: clause_text(clause, tags::TERM, index)?,
                    modifier: clause.attr("modifier").map(str::to_string),
                })
            })
            .collect::<FmlResult<Vec<_>>>()
            .map_err(with_rule)?,
        None => Vec::new(),
    };

    let consequent = match element.child(tags::CONSEQUENT).and_then(|c| c.child(tags::THEN)) {
        Some(then) => then
            .children_named(tags::CLAUSE)
            .enumerate()
            .map(|(index, clause)| -> FmlResult<ConsequentClause> {
                Ok(ConsequentClause {
                    variable: clause_text(clause, tags::VARIABLE, index)?,
                    term: clause_text(clause, tags::TERM, index)?,
                })
            })
            .collect::<FmlResult<Vec<_>>>()
            .map_err(with_rule)?,
        None => Vec::new(),
    };

    Ok(Rule {
        connector: element.required("connector").map_err(with_rule)?.to_string(),
        or_method: element.attr("orMethod").unwrap_or_default().to_string(),
        weight,
        and_method: element.attr("andMethod").map(str::to_string),
        antecedent,
        consequent,
        name,
    })
}

fn clause_text(clause: &Element, part: &str, index: usize) -> FmlResult<String> {
    clause
        .child_text(part)
        .map_err(|e| e.with_context("clause", index.to_string()))
}
