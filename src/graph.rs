//! The semantic graph: append-only triple set, type conflict records,
//! and validation diagnostics.
//!
//! Triples use plain string IRIs for subjects and predicates; objects are
//! either IRIs or typed literals. The plain-line rendering emits one
//! triple per line as `<subject> <relation> <object> .`, with literal
//! kind tags only for non-string scalars.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// rdf:type predicate.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
const XSD_ANY_URI: &str = "http://www.w3.org/2001/XMLSchema#anyURI";

/// Scalar kind of a literal object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    String,
    Boolean,
    Number,
    Uri,
}

impl LiteralKind {
    /// Datatype IRI; `None` for plain strings, which carry no tag.
    pub fn datatype(&self) -> Option<&'static str> {
        match self {
            Self::String => None,
            Self::Boolean => Some(XSD_BOOLEAN),
            Self::Number => Some(XSD_DECIMAL),
            Self::Uri => Some(XSD_ANY_URI),
        }
    }
}

/// Object position of a triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Node(String),
    Literal { value: String, kind: LiteralKind },
}

impl Term {
    pub fn node(iri: impl Into<String>) -> Self {
        Self::Node(iri.into())
    }

    pub fn literal(value: impl Into<String>, kind: LiteralKind) -> Self {
        Self::Literal {
            value: value.into(),
            kind,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(iri) => write!(f, "<{iri}>"),
            Self::Literal { value, kind } => {
                write!(f, "\"{}\"", escape_literal(value))?;
                if let Some(datatype) = kind.datatype() {
                    write!(f, "^^<{datatype}>")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Append-only triple set; no triple is ever retracted during a run.
#[derive(Debug, Default)]
pub struct TripleSet {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
}

impl TripleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, ignoring exact duplicates. Returns whether it was new.
    pub fn insert(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Term,
    ) -> bool {
        let triple = Triple {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        };
        if self.seen.contains(&triple) {
            return false;
        }
        self.seen.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// True if the set contains `(subject, predicate, object)`.
    pub fn contains(&self, subject: &str, predicate: &str, object: &Term) -> bool {
        self.seen.contains(&Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.clone(),
        })
    }

    /// Objects of all triples with the given subject and predicate.
    pub fn objects<'a>(
        &'a self,
        subject: &'a str,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Term> {
        self.triples
            .iter()
            .filter(move |t| t.subject == subject && t.predicate == predicate)
            .map(|t| &t.object)
    }

    /// Plain-line rendering; `sorted` produces environment-independent
    /// output for repeatable testing.
    pub fn render(&self, sorted: bool) -> String {
        let mut lines: Vec<String> = self.triples.iter().map(Triple::to_string).collect();
        if sorted {
            lines.sort();
        }
        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn escape_literal(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Severity of a collected diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    /// Absolute identifier of the offending location.
    pub location: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{severity}[{}]: {} - {}",
            self.code, self.location, self.message
        )
    }
}

/// A location assigned more than one disagreeing semantic type.
///
/// Created lazily the first time a second, disagreeing assertion is about
/// to be made; no processing model has authority to pick a winner, so all
/// implied types are recorded side by side.
#[derive(Debug, Clone, Serialize)]
pub struct TypeConflict {
    /// Absolute identifier of the conflicted location.
    pub location: String,
    /// Type implied by the parent context, if the containing document is
    /// a well-formed root of a known type.
    pub context_type: Option<String>,
    /// Reference source location (or conflicted parent) to implied type.
    pub implied: Vec<(String, String)>,
}

impl TypeConflict {
    /// Record another implied type for the same source, ignoring exact
    /// repeats.
    pub fn add(&mut self, source: impl Into<String>, implied_type: impl Into<String>) {
        let entry = (source.into(), implied_type.into());
        if !self.implied.contains(&entry) {
            self.implied.push(entry);
        }
    }

    /// All distinct types implied for this location.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .context_type
            .iter()
            .map(String::as_str)
            .chain(self.implied.iter().map(|(_, t)| t.as_str()))
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

impl fmt::Display for TypeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type conflict at {}: {}",
            self.location,
            self.types().join(" vs "),
        )
    }
}
