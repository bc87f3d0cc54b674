//! Identity registry: the bijection between retrieval locations (URLs)
//! and logical identifiers (URIs) for every document in the set.
//!
//! The registry performs no filesystem or network access; it is handed
//! already-parsed trees by the loader. Documents are arena-indexed by
//! [`DocId`] so that cyclic reference graphs never need owned links
//! between nodes.

use std::collections::HashMap;

use serde_json::Value;
use url::Url;

use crate::error::IdentityError;
use crate::pointer::JsonPointer;

/// Arena index of a registered document.
pub type DocId = usize;

/// Suffixes stripped from a URL to derive a URI when none is assigned.
pub const DEFAULT_STRIP_SUFFIXES: &[&str] = &[".json", ".yaml", ".yml"];

/// One node of one document's tree: the universal addressing unit for
/// reference targets and graph subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub doc: DocId,
    pub ptr: JsonPointer,
}

impl Location {
    pub fn root(doc: DocId) -> Self {
        Self {
            doc,
            ptr: JsonPointer::root(),
        }
    }

    pub fn new(doc: DocId, ptr: JsonPointer) -> Self {
        Self { doc, ptr }
    }

    pub fn child(&self, token: impl Into<String>) -> Self {
        Self {
            doc: self.doc,
            ptr: self.ptr.child(token),
        }
    }
}

/// One parsed unit of input.
#[derive(Debug)]
pub struct Document {
    pub id: DocId,
    /// Retrieval location.
    pub url: Url,
    /// Logical identifier used for reference resolution.
    pub uri: Url,
    /// Declared semantic type of the root, e.g. `"Schema"`. A document
    /// with no declared type and no reference reaching it stays inert.
    pub declared_type: Option<String>,
    pub tree: Value,
}

impl Document {
    /// Last path segment of the retrieval location, if any.
    pub fn filename(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
struct PrefixRule {
    location_prefix: String,
    identifier_prefix: String,
}

/// The document set for one run.
#[derive(Debug, Default)]
pub struct Registry {
    docs: Vec<Document>,
    by_uri: HashMap<String, DocId>,
    by_url: HashMap<String, DocId>,
    strip_suffixes: Vec<String>,
    prefixes: Vec<PrefixRule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_strip_suffixes(
            DEFAULT_STRIP_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// A registry with custom (possibly empty) suffix-stripping rules.
    pub fn with_strip_suffixes(strip_suffixes: Vec<String>) -> Self {
        Self {
            docs: Vec::new(),
            by_uri: HashMap::new(),
            by_url: HashMap::new(),
            strip_suffixes,
            prefixes: Vec::new(),
        }
    }

    pub fn strip_suffixes(&self) -> &[String] {
        &self.strip_suffixes
    }

    /// Add a location-prefix to identifier-prefix rewrite rule, applied
    /// when registering documents without an explicit URI. Both prefixes
    /// must have a path ending in `/`.
    pub fn add_prefix(
        &mut self,
        location_prefix: &str,
        identifier_prefix: &str,
    ) -> Result<(), IdentityError> {
        for prefix in [location_prefix, identifier_prefix] {
            let parsed = Url::parse(prefix).map_err(|_| IdentityError::RelativeIdentifier {
                value: prefix.to_string(),
            })?;
            if !parsed.path().ends_with('/') {
                return Err(IdentityError::MalformedPrefix {
                    prefix: prefix.to_string(),
                });
            }
            if parsed.fragment().is_some() || parsed.query().is_some() {
                return Err(IdentityError::MalformedPrefix {
                    prefix: prefix.to_string(),
                });
            }
        }
        self.prefixes.push(PrefixRule {
            location_prefix: location_prefix.to_string(),
            identifier_prefix: identifier_prefix.to_string(),
        });
        // First match wins, so longer (more specific) prefixes go first.
        self.prefixes
            .sort_by(|a, b| b.location_prefix.len().cmp(&a.location_prefix.len()));
        Ok(())
    }

    /// Register a parsed document under its retrieval location, with an
    /// optional explicit logical identifier and declared root type.
    pub fn register(
        &mut self,
        tree: Value,
        url: &str,
        uri: Option<&str>,
        declared_type: Option<&str>,
    ) -> Result<DocId, IdentityError> {
        let url = parse_absolute(url)?;
        let uri = match uri {
            Some(explicit) => parse_absolute(explicit)?,
            None => self.derive_uri(&url)?,
        };

        if self.by_uri.contains_key(uri.as_str()) {
            return Err(IdentityError::DuplicateIdentifier {
                uri: uri.to_string(),
            });
        }
        if self.by_url.contains_key(url.as_str()) {
            return Err(IdentityError::DuplicateLocation {
                url: url.to_string(),
            });
        }

        let id = self.docs.len();
        tracing::info!(url = %url, uri = %uri, "registering document");
        self.by_uri.insert(uri.as_str().to_string(), id);
        self.by_url.insert(url.as_str().to_string(), id);
        self.docs.push(Document {
            id,
            url,
            uri,
            declared_type: declared_type.map(str::to_string),
            tree,
        });
        Ok(id)
    }

    /// URI for a document registered without one: prefix rewrite rules
    /// first (most specific wins), then suffix stripping.
    fn derive_uri(&self, url: &Url) -> Result<Url, IdentityError> {
        let url_str = url.as_str();
        let rewritten = self
            .prefixes
            .iter()
            .find_map(|rule| {
                url_str
                    .strip_prefix(&rule.location_prefix)
                    .map(|rest| format!("{}{}", rule.identifier_prefix, rest))
            })
            .unwrap_or_else(|| url_str.to_string());

        let stripped = self
            .strip_suffixes
            .iter()
            .find_map(|suffix| rewritten.strip_suffix(suffix.as_str()))
            .unwrap_or(&rewritten);
        parse_absolute(stripped)
    }

    /// Look up a document by its logical identifier.
    pub fn resolve(&self, uri: &str) -> Result<&Document, IdentityError> {
        self.lookup_uri(uri)
            .map(|id| &self.docs[id])
            .ok_or_else(|| IdentityError::UnknownDocument {
                uri: uri.to_string(),
            })
    }

    pub fn lookup_uri(&self, uri: &str) -> Option<DocId> {
        self.by_uri.get(uri).copied()
    }

    /// Whether `uri` plus one of the configured stripping suffixes names
    /// a registered document; used to report suffix mismatches instead of
    /// silently repairing them.
    pub fn probe_suffix(&self, uri: &str) -> Option<(&Document, &str)> {
        for suffix in DEFAULT_STRIP_SUFFIXES {
            if let Some(id) = self.by_uri.get(&format!("{uri}{suffix}")) {
                return Some((&self.docs[*id], suffix));
            }
        }
        None
    }

    pub fn get(&self, id: DocId) -> &Document {
        &self.docs[id]
    }

    pub fn docs(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Absolute identifier of a location: document URI plus pointer
    /// fragment for non-root locations.
    pub fn uri_of(&self, location: &Location) -> String {
        let doc = &self.docs[location.doc];
        if location.ptr.is_empty() {
            doc.uri.to_string()
        } else {
            format!("{}#{}", doc.uri, location.ptr.uri_fragment())
        }
    }

    /// The value addressed by a location, if present.
    pub fn value_at<'a>(&'a self, location: &Location) -> Option<&'a Value> {
        location.ptr.evaluate(&self.docs[location.doc].tree)
    }
}

fn parse_absolute(input: &str) -> Result<Url, IdentityError> {
    let url = Url::parse(input).map_err(|_| IdentityError::RelativeIdentifier {
        value: input.to_string(),
    })?;
    if url.fragment().is_some() {
        return Err(IdentityError::FragmentInIdentifier {
            uri: input.to_string(),
        });
    }
    Ok(url)
}
