//! Element documents.
//!
//! A document is JSON listing element templates:
//!
//! ```json
//! { "elements": [ {
//!     "path": ["Window", "Row"], "model": ["Todos"], "extends": ["Base"],
//!     "attributes": { "layout": "hbox", "width": "[this.w] + 10" },
//!     "declare": { "count": 0 },
//!     "variables": { "w": "100" },
//!     "states": [ { "when": "this.IVD-Item-Hover & !model.done",
//!                   "attributes": { "color": { "color": "#00ff00", "ease": { "ms": 200 } } },
//!                   "set": { "model.count": "model.count + 1" } } ]
//! } ] }
//! ```
//!
//! Attribute values are written as strings whose grammar depends on the
//! attribute (an expression, a property literal, a color, a key list), or as
//! an object when they need more than a value: `start`, `min`, `max`,
//! `delay`, `ease`, `key` or `clear`. Problems are collected across the
//! whole document and reported together.

mod grammar;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

pub use grammar::{parse_expression, parse_key_list, parse_position, parse_state_expression, parse_value_key};

use crate::color::Color;
use crate::element::Element;
use crate::error::{CompileError, DocumentError, ParseError};
use crate::expression::Expression;
use crate::graph::{Graph, Interpolation, Sample, Transition};
use crate::keywords::{AttributeKey, Property};
use crate::reference::{ReferenceAttribute, ReferenceAttributeSet};
use crate::state::VirtualStateKeyPrecursor;
use crate::value_key::{ScopedValueKey, ValueKeyPath, format_path};

/// Name prefix of the proxy states standing in for composite `when` clauses.
pub const GENERATED_STATE_PREFIX: &str = "generated-virtual-state-";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentSpec {
    #[serde(default)]
    elements: Vec<ElementSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementSpec {
    path: ValueKeyPath,
    #[serde(default)]
    model: ValueKeyPath,
    #[serde(default)]
    extends: Option<ValueKeyPath>,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    declare: BTreeMap<String, ExprText>,
    #[serde(default)]
    variables: BTreeMap<String, ExprText>,
    #[serde(default)]
    states: Vec<StateSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateSpec {
    when: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    declare: BTreeMap<String, ExprText>,
    #[serde(default)]
    set: BTreeMap<String, ExprText>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ExprText {
    Number(f64),
    Text(String),
}

impl ExprText {
    fn text(&self) -> String {
        match self {
            ExprText::Number(n) => n.to_string(),
            ExprText::Text(t) => t.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AttributeBody {
    #[serde(alias = "color", alias = "property", alias = "literal", alias = "expr")]
    value: Option<Value>,
    key: Option<String>,
    start: Option<ExprText>,
    min: Option<ExprText>,
    max: Option<ExprText>,
    delay: Option<u64>,
    ease: Option<EaseSpec>,
    #[serde(default)]
    clear: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EaseSpec {
    ms: u64,
    #[serde(default)]
    graph: Interpolation,
    #[serde(default)]
    samples: Vec<Sample>,
}

/// Something wrong with one value, anchored on a string of the source.
struct Problem {
    anchor: String,
    column: usize,
    message: String,
}

impl Problem {
    fn new(anchor: impl Into<String>, message: impl Into<String>) -> Self {
        Self { anchor: anchor.into(), column: 0, message: message.into() }
    }

    fn parse(anchor: &str, err: ParseError) -> Self {
        Self { anchor: anchor.to_string(), column: err.column, message: err.message }
    }
}

/// Line, caret column and line text of the first occurrence of `anchor` as a
/// JSON string.
fn locate<'s>(source: &'s str, anchor: &str) -> Option<(usize, usize, &'s str)> {
    let quoted = serde_json::to_string(anchor).ok()?;
    let at = source.find(&quoted)?;
    let line_start = source[..at].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[at..].find('\n').map_or(source.len(), |i| at + i);
    let line = source[..at].matches('\n').count() + 1;
    let column = source[line_start..at].chars().count() + 2;
    Some((line, column, &source[line_start..line_end]))
}

struct Compiler<'s> {
    source: &'s str,
    errors: Vec<CompileError>,
    generated: usize,
}

impl<'s> Compiler<'s> {
    fn report(&mut self, problem: Problem) {
        let error = match locate(self.source, &problem.anchor) {
            Some((line, column, text)) => CompileError {
                line,
                column: column + problem.column,
                source_line: text.to_string(),
                message: problem.message,
            },
            None => CompileError { line: 0, column: 0, source_line: String::new(), message: problem.message },
        };
        self.errors.push(error);
    }

    fn expression(&mut self, text: &ExprText) -> Option<Expression> {
        let text = text.text();
        parse_expression(&text).map_err(|err| self.report(Problem::parse(&text, err))).ok()
    }

    fn element(&mut self, stamp: usize, spec: &ElementSpec) -> Element {
        if spec.path.is_empty() {
            self.report(Problem::new("path", "element path must not be empty"));
        }
        let mut element = Element::new(stamp, spec.path.clone());
        element.set_model_path(spec.model.clone());
        self.attributes(element.default_set_mut(), &spec.attributes);
        for (name, text) in &spec.declare {
            if let Some(expr) = self.expression(text) {
                element.default_set_mut().insert_declare_modifier(name.as_str(), expr);
            }
        }
        for (name, text) in &spec.variables {
            if let Some(expr) = self.expression(text) {
                element.set_initial_expression(name.as_str(), expr);
            }
        }
        for state in &spec.states {
            self.state(&mut element, state);
        }
        element
    }

    /// Plain keys attach the layer directly; composite clauses go through a
    /// generated proxy state.
    fn state(&mut self, element: &mut Element, spec: &StateSpec) {
        let expr = match parse_state_expression(&spec.when) {
            Ok(expr) => expr,
            Err(err) => return self.report(Problem::parse(&spec.when, err)),
        };
        let proxy = match expr.as_plain_key() {
            Some(key) => key.clone(),
            None => {
                let proxy = ScopedValueKey::element(format!("{GENERATED_STATE_PREFIX}{}", self.generated));
                self.generated += 1;
                element.add_virtual_key(VirtualStateKeyPrecursor { proxy: proxy.clone(), expr });
                proxy
            }
        };

        let layer = element.set_for_state_mut(&proxy);
        self.attributes(layer, &spec.attributes);
        for (name, text) in &spec.declare {
            if let Some(expr) = self.expression(text) {
                layer.insert_declare_modifier(name.as_str(), expr);
            }
        }
        for (target, text) in &spec.set {
            let key = match parse_value_key(target) {
                Ok(key) => key,
                Err(err) => {
                    self.report(Problem::parse(target, err));
                    continue;
                }
            };
            if let Some(expr) = self.expression(text) {
                layer.insert_set_modifier(key, expr);
            }
        }
    }

    fn attributes(&mut self, set: &mut ReferenceAttributeSet, attributes: &Map<String, Value>) {
        for (name, value) in attributes {
            let keys: Vec<AttributeKey> = match AttributeKey::from_literal(name) {
                Some(key) => vec![key],
                None => match AttributeKey::expand_shorthand(name) {
                    Some(keys) => keys.to_vec(),
                    None => {
                        self.report(Problem::new(name.as_str(), format!("unknown attribute '{name}'")));
                        continue;
                    }
                },
            };
            let Some(&first) = keys.first() else { continue };
            match attribute(first, value) {
                Ok(attr) => {
                    for key in keys {
                        set.insert(key, attr.clone());
                    }
                }
                Err(problem) => self.report(problem),
            }
        }
    }
}

fn attribute(key: AttributeKey, value: &Value) -> Result<ReferenceAttribute, Problem> {
    let mut attr = ReferenceAttribute { active: true, ..ReferenceAttribute::default() };
    let Value::Object(_) = value else {
        fill_body(key, &mut attr, value)?;
        return Ok(attr);
    };

    let body: AttributeBody = serde_json::from_value(value.clone())
        .map_err(|err| Problem::new(key.literal(), format!("malformed {key} attribute: {err}")))?;
    if let Some(value) = &body.value {
        fill_body(key, &mut attr, value)?;
    }
    if let Some(text) = &body.key {
        if !key.takes_single_key() {
            return Err(Problem::new(text.as_str(), format!("{key} cannot be bound to a key")));
        }
        attr.single_key = Some(parse_value_key(text).map_err(|err| Problem::parse(text, err))?);
    }
    let bounds = [(&body.start, &mut attr.starting), (&body.min, &mut attr.min), (&body.max, &mut attr.max)];
    for (text, slot) in bounds {
        let Some(text) = text else { continue };
        if !key.is_scalar() {
            return Err(Problem::new(key.literal(), format!("{key} takes no start, min or max")));
        }
        let text = text.text();
        *slot = Some(Rc::new(parse_expression(&text).map_err(|err| Problem::parse(&text, err))?));
    }
    attr.delay = body.delay;
    attr.ease = body
        .ease
        .map(|ease| Rc::new(Transition::new(ease.ms, Graph::new(ease.graph).with_samples(ease.samples))));
    attr.clear = body.clear;
    Ok(attr)
}

fn fill_body(key: AttributeKey, attr: &mut ReferenceAttribute, value: &Value) -> Result<(), Problem> {
    match value {
        Value::String(text) => fill_text(key, attr, text),
        Value::Number(n) if key.is_scalar() => {
            attr.expr = Some(Rc::new(Expression::constant(n.as_f64().unwrap_or_default())));
            Ok(())
        }
        Value::Bool(flag) if key.valid_properties().contains(&Property::Enable) => {
            attr.property = Some(if *flag { Property::Enable } else { Property::Disable });
            Ok(())
        }
        Value::Array(items) if key.is_state_list() || key.takes_token_list() => {
            let mut words = Vec::with_capacity(items.len());
            for item in items {
                let Value::String(word) = item else {
                    return Err(Problem::new(key.literal(), format!("{key} lists must hold strings")));
                };
                words.push(word.as_str());
            }
            fill_text(key, attr, &words.join(" "))
        }
        other => Err(Problem::new(key.literal(), format!("{key} does not accept {other}"))),
    }
}

fn fill_text(key: AttributeKey, attr: &mut ReferenceAttribute, text: &str) -> Result<(), Problem> {
    let parse = |err| Problem::parse(text, err);
    if key == AttributeKey::PositionWithin {
        attr.single_key = Some(parse_position(text).map_err(parse)?);
    } else if key.is_property() {
        let property = Property::from_literal(text)
            .filter(|p| key.valid_properties().contains(p))
            .ok_or_else(|| Problem::new(text, format!("'{text}' is not a valid value for {key}")))?;
        attr.property = Some(property);
    } else if key.is_scalar() {
        attr.expr = Some(Rc::new(parse_expression(text).map_err(parse)?));
    } else if key.is_color() {
        let color = Color::parse(text).ok_or_else(|| Problem::new(text, format!("'{text}' is not a color")))?;
        attr.color = Some(color);
    } else if key.is_state_list() {
        attr.keys = parse_key_list(text).map_err(parse)?;
    } else if key.takes_token_list() {
        attr.literal_list = text.split_whitespace().map(str::to_string).collect();
    } else {
        attr.literal = Some(text.to_string());
    }
    Ok(())
}

/// Compiled element templates plus their lookup indexes.
#[derive(Debug, Default)]
pub struct Document {
    elements: Vec<Element>,
    by_path: HashMap<ValueKeyPath, usize>,
    by_model: HashMap<ValueKeyPath, Vec<usize>>,
}

impl Document {
    pub fn load(path: &Path) -> Result<Document, DocumentError> {
        let source = std::fs::read_to_string(path)
            .map_err(|source| DocumentError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Result<Document, DocumentError> {
        let spec: DocumentSpec = serde_json::from_str(source).map_err(|err| DocumentError::Syntax {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        })?;

        let mut compiler = Compiler { source, errors: Vec::new(), generated: 0 };
        let mut document = Document::default();
        for (stamp, element_spec) in spec.elements.iter().enumerate() {
            let element = compiler.element(stamp, element_spec);
            if document.by_path.insert(element.path().clone(), stamp).is_some() {
                let anchor = element.path().last().cloned().unwrap_or_default();
                compiler.report(Problem::new(anchor, format!("element {} is declared twice", element.name())));
            }
            if !element.is_static() {
                document.by_model.entry(element.model_path().clone()).or_default().push(stamp);
            }
            document.elements.push(element);
        }

        for (stamp, element_spec) in spec.elements.iter().enumerate() {
            let Some(parent_path) = &element_spec.extends else { continue };
            match document.by_path.get(parent_path) {
                Some(&parent) if parent < stamp => {
                    let parent = document.elements[parent].clone();
                    document.elements[stamp].derive_from(&parent);
                }
                _ => {
                    let name = format_path(parent_path);
                    let anchor = parent_path.last().cloned().unwrap_or_default();
                    compiler.report(Problem::new(anchor, format!("cannot extend {name}: no element declared before")));
                }
            }
        }

        if !compiler.errors.is_empty() {
            return Err(DocumentError::Compile(compiler.errors));
        }
        debug!(elements = document.elements.len(), "element document compiled");
        Ok(document)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, stamp: usize) -> Option<&Element> {
        self.elements.get(stamp)
    }

    pub fn element_for_path(&self, path: &[String]) -> Option<&Element> {
        self.by_path.get(path).and_then(|&stamp| self.elements.get(stamp))
    }

    /// Elements instantiated once per item of the model at `model_path`.
    pub fn elements_for_model(&self, model_path: &[String]) -> impl Iterator<Item = &Element> + '_ {
        self.by_model.get(model_path).into_iter().flatten().filter_map(|&stamp| self.elements.get(stamp))
    }

    pub fn static_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements.iter().filter(|e| e.is_static())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadStatus;

    const TODOS: &str = r##"{ "elements": [
  { "path": ["Window"],
    "attributes": { "layout": "vbox", "title-text": "Todos", "margin": "4" } },
  { "path": ["Window", "Row"], "model": ["Todos"],
    "attributes": { "width": "[this.w] + 10", "color": "#ff0000",
                    "text": { "key": "model.title" }, "position-within": "Window" },
    "declare": { "count": 0 },
    "variables": { "w": "100" },
    "states": [
      { "when": "this.IVD-Item-Hover & !model.done",
        "attributes": { "color": { "color": "#00ff00", "ease": { "ms": 200, "graph": "smooth" } } },
        "set": { "model.count": "model.count + 1" } },
      { "when": "this.selected", "attributes": { "toggle-state": ["this.open", "::flag"] } }
    ] }
] }"##;

    #[test]
    fn test_compiles_elements_and_indexes() {
        let doc = Document::parse(TODOS).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.static_elements().count(), 1);
        let row = doc.element_for_path(&["Window".into(), "Row".into()]).unwrap();
        assert_eq!(doc.elements_for_model(&["Todos".into()]).count(), 1);

        let defaults = row.default_set();
        let width = defaults.get(AttributeKey::SizeA);
        assert!(width.expr.as_ref().is_some_and(|e| e.contains_weak()));
        assert_eq!(defaults.get(AttributeKey::ElementColor).color, Color::parse("#ff0000"));
        assert_eq!(defaults.get(AttributeKey::Text).single_key, Some(ScopedValueKey::model("title")));
        assert!(defaults.declare_modifiers.contains_key("count"));
        assert!(row.variable_initial_expressions().contains_key("w"));

        let window = doc.element_for_path(&["Window".into()]).unwrap();
        for key in [AttributeKey::MarginAdjIn, AttributeKey::MarginOppOut] {
            assert!(window.default_set().get(key).expr.is_some());
        }
    }

    #[test]
    fn test_composite_when_gets_a_proxy() {
        let doc = Document::parse(TODOS).unwrap();
        let row = doc.element_for_path(&["Window".into(), "Row".into()]).unwrap();
        let proxy = ScopedValueKey::element(format!("{GENERATED_STATE_PREFIX}0"));
        assert_eq!(row.virtual_keys().len(), 1);
        assert_eq!(row.virtual_keys()[0].proxy, proxy);

        let layers: Vec<_> = row.keyed_layers().collect();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].0, &proxy);
        let hover = &layers[0].1.set;
        let color = hover.get(AttributeKey::ElementColor);
        assert_eq!(color.ease.as_ref().map(|t| t.milliseconds), Some(200));
        assert!(hover.set_modifiers.contains_key(&ScopedValueKey::model("count")));
        assert_eq!(layers[1].0, &ScopedValueKey::element("selected"));
        assert_eq!(layers[1].1.set.get(AttributeKey::ToggleState).keys.len(), 2);
    }

    #[test]
    fn test_errors_are_collected_with_carets() {
        let source = r#"{ "elements": [ { "path": ["A"],
  "attributes": { "width": "10 +", "layout": "sideways", "bogus": "1" } } ] }"#;
        let Err(DocumentError::Compile(errors)) = Document::parse(source) else {
            panic!("expected compile errors");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.line == 2));
        let width = errors.iter().find(|e| e.message == "expected a term").unwrap();
        assert_eq!(&width.source_line[width.column - 1..width.column], "\"");
    }

    #[test]
    fn test_extends_inherits_unset_attributes() {
        let source = r#"{ "elements": [
  { "path": ["Base"], "attributes": { "width": "5", "color": "red" } },
  { "path": ["Child"], "extends": ["Base"], "attributes": { "width": "7" } },
  { "path": ["Orphan"], "extends": ["Later"] },
  { "path": ["Later"] }
] }"#;
        let Err(DocumentError::Compile(errors)) = Document::parse(source) else {
            panic!("extending a later element must fail");
        };
        assert_eq!(errors.len(), 1);

        let source = source.replace(r#"{ "path": ["Orphan"], "extends": ["Later"] },"#, "");
        let doc = Document::parse(&source).unwrap();
        let child = doc.element_for_path(&["Child".into()]).unwrap();
        assert!(child.default_set().get(AttributeKey::ElementColor).color.is_some());
        let width = child.default_set().get(AttributeKey::SizeA).expr.clone().unwrap();
        let source = crate::expression::tests::MapSource::default();
        assert_eq!(width.solve(&source, crate::display_item::ItemId::from_raw(1)), 7.0);
    }

    #[test]
    fn test_syntax_and_io_errors() {
        let err = Document::parse("{ \"elements\": [ }").unwrap_err();
        assert!(matches!(err, DocumentError::Syntax { line: 1, .. }));
        assert_eq!(err.status(), LoadStatus::CompileError);

        let err = Document::load(Path::new("/definitely/not/here.ivd.json")).unwrap_err();
        assert_eq!(err.status(), LoadStatus::FileNotFound);
    }
}
