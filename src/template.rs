//! Pointer templates: JSON Pointers with `{variable}` segments.
//!
//! A template segment in braces matches every property name or array index
//! at that level; a trailing `{variable}#` additionally exposes the matched
//! key. A relative template prefixes the whole thing with a relative
//! pointer origin, so one mapping entry can describe relations on an
//! ancestor or sibling of the current location. `~2` and `~3` escape
//! literal `{` and `}` in fixed segments.

use std::fmt;

use serde_json::Value;

use crate::error::PointerError;
use crate::pointer::{JsonPointer, RelativePointer};

/// One parsed template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Fixed(String),
    Variable(String),
}

/// One concrete match produced by template evaluation.
#[derive(Debug, Clone)]
pub struct TemplateMatch<'a> {
    /// Absolute pointer (from the document root) of the matched value.
    pub pointer: JsonPointer,
    /// The matched value.
    pub value: &'a Value,
    /// Variable bindings in match order.
    pub variables: Vec<(String, String)>,
    /// The matched key, when the template requested it with `#`.
    pub key: Option<String>,
}

/// A pointer template without an origin adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerTemplate {
    segments: Vec<Segment>,
    key_of: bool,
    text: String,
}

impl PointerTemplate {
    pub fn parse(input: &str) -> Result<Self, PointerError> {
        let invalid = || PointerError::InvalidTemplate {
            input: input.to_string(),
        };
        if input.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
                key_of: false,
                text: String::new(),
            });
        }
        if !input.starts_with('/') {
            return Err(invalid());
        }

        let raw: Vec<&str> = input.split('/').skip(1).collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut key_of = false;
        for (i, seg) in raw.iter().enumerate() {
            let last = i == raw.len() - 1;
            if let Some(var) = seg.strip_prefix('{') {
                if let Some(name) = var.strip_suffix("}#") {
                    if !last {
                        return Err(invalid());
                    }
                    validate_variable(name).map_err(|_| invalid())?;
                    segments.push(Segment::Variable(name.to_string()));
                    key_of = true;
                } else if let Some(name) = var.strip_suffix('}') {
                    validate_variable(name).map_err(|_| invalid())?;
                    segments.push(Segment::Variable(name.to_string()));
                } else {
                    return Err(invalid());
                }
            } else {
                segments.push(Segment::Fixed(
                    unescape_template_token(seg).map_err(|_| invalid())?,
                ));
            }
        }

        Ok(Self {
            segments,
            key_of,
            text: input.to_string(),
        })
    }

    /// Number of fixed segments; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Fixed(_)))
            .count()
    }

    /// True if any segment is a variable.
    pub fn has_variables(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Variable(_)))
    }

    /// The first segment, if it is fixed.
    pub fn leading_fixed(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Fixed(s)) => Some(s),
            _ => None,
        }
    }

    /// Evaluate against `value`, reporting matched pointers relative to
    /// `base` (the pointer of `value` within its document).
    pub fn evaluate<'a>(&self, value: &'a Value, base: &JsonPointer) -> Vec<TemplateMatch<'a>> {
        let mut out = Vec::new();
        self.walk(0, value, base.clone(), Vec::new(), &mut out);
        out
    }

    /// Whether a concrete pointer (relative to the template origin) is
    /// matched exactly by this template.
    pub fn matches_pointer(&self, pointer: &JsonPointer) -> bool {
        if pointer.len() != self.segments.len() || self.key_of {
            return false;
        }
        self.segments
            .iter()
            .zip(pointer.tokens())
            .all(|(seg, token)| match seg {
                Segment::Fixed(s) => s == token,
                Segment::Variable(_) => true,
            })
    }

    fn walk<'a>(
        &self,
        index: usize,
        value: &'a Value,
        pointer: JsonPointer,
        variables: Vec<(String, String)>,
        out: &mut Vec<TemplateMatch<'a>>,
    ) {
        let Some(segment) = self.segments.get(index) else {
            let key = if self.key_of {
                variables.last().map(|(_, v)| v.clone())
            } else {
                None
            };
            out.push(TemplateMatch {
                pointer,
                value,
                variables,
                key,
            });
            return;
        };

        match segment {
            Segment::Fixed(token) => {
                let child = match value {
                    Value::Object(map) => map.get(token),
                    Value::Array(items) => {
                        token.parse::<usize>().ok().and_then(|i| items.get(i))
                    }
                    _ => None,
                };
                if let Some(child) = child {
                    self.walk(index + 1, child, pointer.child(token.clone()), variables, out);
                }
            }
            Segment::Variable(name) => match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let mut vars = variables.clone();
                        vars.push((name.clone(), key.clone()));
                        self.walk(index + 1, child, pointer.child(key.clone()), vars, out);
                    }
                }
                Value::Array(items) => {
                    for (i, child) in items.iter().enumerate() {
                        let mut vars = variables.clone();
                        vars.push((name.clone(), i.to_string()));
                        self.walk(index + 1, child, pointer.child(i.to_string()), vars, out);
                    }
                }
                _ => {}
            },
        }
    }
}

impl fmt::Display for PointerTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A relative pointer template: origin adjustment plus template path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeTemplate {
    origin: RelativePointer,
    template: Option<PointerTemplate>,
    text: String,
}

impl RelativeTemplate {
    pub fn parse(input: &str) -> Result<Self, PointerError> {
        let invalid = || PointerError::InvalidTemplate {
            input: input.to_string(),
        };

        match input.find('/') {
            Some(slash) => {
                let origin = RelativePointer::parse(&input[..slash]).map_err(|_| invalid())?;
                if origin.key_of {
                    // '#' in the origin cannot combine with a template path
                    return Err(invalid());
                }
                let template = PointerTemplate::parse(&input[slash..])?;
                Ok(Self {
                    origin,
                    template: Some(template),
                    text: input.to_string(),
                })
            }
            None => {
                let origin = RelativePointer::parse(input).map_err(|_| invalid())?;
                Ok(Self {
                    origin,
                    template: None,
                    text: input.to_string(),
                })
            }
        }
    }

    pub fn specificity(&self) -> usize {
        self.template.as_ref().map_or(0, PointerTemplate::specificity)
    }

    pub fn has_variables(&self) -> bool {
        self.template.as_ref().is_some_and(PointerTemplate::has_variables)
    }

    /// Default relation name: the first fixed segment of the template.
    pub fn leading_fixed(&self) -> Option<&str> {
        self.template.as_ref().and_then(PointerTemplate::leading_fixed)
    }

    /// True when the template descends from the current location itself
    /// (no steps up) — only such templates address descendants.
    pub fn is_descendant(&self) -> bool {
        self.origin.up == 0 && self.origin.over == 0
    }

    /// Whether `pointer` (relative to the current location) is matched
    /// exactly; only meaningful for descendant templates.
    pub fn matches_pointer(&self, pointer: &JsonPointer) -> bool {
        self.is_descendant()
            && self
                .template
                .as_ref()
                .is_some_and(|t| t.matches_pointer(pointer))
    }

    /// Evaluate at location `at` within `root`.
    ///
    /// Returns an empty vector when the origin or any fixed segment is
    /// absent; errors only for an origin stepping above the root.
    pub fn evaluate<'a>(
        &self,
        root: &'a Value,
        at: &JsonPointer,
    ) -> Result<Vec<TemplateMatch<'a>>, PointerError> {
        let origin_ptr = at.join(&RelativePointer {
            up: self.origin.up,
            over: self.origin.over,
            path: JsonPointer::root(),
            key_of: false,
        })?;
        let Some(origin_value) = origin_ptr.evaluate(root) else {
            return Ok(Vec::new());
        };

        match &self.template {
            Some(template) => Ok(template.evaluate(origin_value, &origin_ptr)),
            None => {
                let key = if self.origin.key_of {
                    origin_ptr.last().map(str::to_string)
                } else {
                    None
                };
                Ok(vec![TemplateMatch {
                    pointer: origin_ptr,
                    value: origin_value,
                    variables: Vec::new(),
                    key,
                }])
            }
        }
    }
}

impl fmt::Display for RelativeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn validate_variable(name: &str) -> Result<(), ()> {
    if name.contains(['{', '}', '/']) {
        return Err(());
    }
    Ok(())
}

fn unescape_template_token(token: &str) -> Result<String, ()> {
    if token.contains(['{', '}']) {
        return Err(());
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            Some('2') => out.push('{'),
            Some('3') => out.push('}'),
            _ => return Err(()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval<'a>(template: &str, root: &'a Value, at: &str) -> Vec<TemplateMatch<'a>> {
        let template = RelativeTemplate::parse(template).unwrap();
        let at = JsonPointer::parse(at).unwrap();
        template.evaluate(root, &at).unwrap()
    }

    #[test]
    fn fixed_template_matches_single_path() {
        let doc = json!({"info": {"title": "t"}});
        let matches = eval("0/info/title", &doc, "");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pointer.to_string(), "/info/title");
        assert_eq!(matches[0].value, &json!("t"));
    }

    #[test]
    fn missing_path_yields_no_matches() {
        let doc = json!({"info": {}});
        assert!(eval("0/servers", &doc, "").is_empty());
    }

    #[test]
    fn variable_matches_every_property_in_order() {
        let doc = json!({"paths": {"/a": 1, "/b": 2}});
        let matches = eval("0/paths/{path}", &doc, "");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].pointer.to_string(), "/paths/~1a");
        assert_eq!(matches[0].variables, vec![("path".to_string(), "/a".to_string())]);
        assert_eq!(matches[1].pointer.to_string(), "/paths/~1b");
    }

    #[test]
    fn variable_matches_array_indices() {
        let doc = json!({"servers": [{"url": "a"}, {"url": "b"}]});
        let matches = eval("0/servers/{i}", &doc, "");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].pointer.to_string(), "/servers/1");
        assert_eq!(matches[1].variables[0].1, "1");
    }

    #[test]
    fn trailing_hash_exposes_matched_key() {
        let doc = json!({"variables": {"user": {}, "port": {}}});
        let matches = eval("0/variables/{name}#", &doc, "");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].key.as_deref(), Some("user"));
        assert_eq!(matches[1].key.as_deref(), Some("port"));
    }

    #[test]
    fn steps_up_evaluates_on_ancestor() {
        let doc = json!({"paths": {"/a": {"get": {"tags": ["x"]}}}});
        let matches = eval("2/~1a/get/tags/{i}", &doc, "/paths/~1a/get");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, &json!("x"));

        // A missing fixed segment under the origin is not an error.
        let matches = eval("1/parameters/{i}", &doc, "/paths/~1a/get");
        assert!(matches.is_empty());
    }

    #[test]
    fn bare_origin_yields_value_itself() {
        let doc = json!({"a": {"b": 5}});
        let matches = eval("0", &doc, "/a/b");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, &json!(5));
        assert!(matches[0].key.is_none());
    }

    #[test]
    fn bare_origin_hash_yields_key() {
        let doc = json!({"a": {"b": 5}});
        let matches = eval("1#", &doc, "/a/b");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key.as_deref(), Some("a"));
    }

    #[test]
    fn specificity_counts_fixed_segments() {
        let t = RelativeTemplate::parse("0/components/schemas/{name}").unwrap();
        assert_eq!(t.specificity(), 2);
        let catch_all = RelativeTemplate::parse("0/{name}").unwrap();
        assert_eq!(catch_all.specificity(), 0);
    }

    #[test]
    fn matches_pointer_respects_fixed_and_variable_segments() {
        let t = RelativeTemplate::parse("0/components/schemas/{name}").unwrap();
        let hit = JsonPointer::parse("/components/schemas/Pet").unwrap();
        let miss = JsonPointer::parse("/components/responses/Err").unwrap();
        assert!(t.matches_pointer(&hit));
        assert!(!t.matches_pointer(&miss));
        // Depth must match exactly.
        let deeper = JsonPointer::parse("/components/schemas/Pet/type").unwrap();
        assert!(!t.matches_pointer(&deeper));
    }

    #[test]
    fn invalid_templates_rejected() {
        assert!(RelativeTemplate::parse("0/{unclosed").is_err());
        assert!(RelativeTemplate::parse("#/x").is_err());
        assert!(RelativeTemplate::parse("0#/x").is_err());
        assert!(RelativeTemplate::parse("x/y").is_err());
    }

    #[test]
    fn escaped_braces_in_fixed_segments() {
        let doc = json!({"{id}": 1});
        let matches = eval("0/~2id~3", &doc, "");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, &json!(1));
    }
}
