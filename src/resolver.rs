//! Reference resolution: lexical reference value at a location to a
//! resolved target [`Location`], under an explicit processing model.
//!
//! The two historical models disagree about how much of a referenced
//! document is parsed before resolving into it. Reference-driven
//! resolution reaches only the target pointer and takes the reference
//! context as authoritative for unknown ancestor context;
//! document-driven resolution scans the whole target document, so
//! context-setting fields anywhere in it (identifier redefinitions,
//! dialect defaults, dynamic anchors) take effect. The model is an
//! explicit enum consulted at each step; schema-typed content always
//! forces document-driven handling.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;
use url::Url;

use crate::catalog::TypeCatalog;
use crate::error::ResolveError;
use crate::pointer::JsonPointer;
use crate::registry::{DocId, Location, Registry};

/// How much of a referenced document must be parsed before resolving
/// into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Only the resolved target pointer is considered reached.
    #[default]
    ReferenceDriven,
    /// The whole target document is parsed first; its context-setting
    /// fields apply to all descendants that do not override them.
    DocumentDriven,
}

/// Anchors found by a whole-document scan.
#[derive(Debug, Default, Clone)]
struct DocAnchors {
    anchors: HashMap<String, JsonPointer>,
    dynamic: HashMap<String, JsonPointer>,
    has_dynamic_reference: bool,
}

pub struct Resolver<'a> {
    registry: &'a Registry,
    catalog: &'a TypeCatalog,
    mode: ProcessingMode,
    anchors: RefCell<HashMap<DocId, DocAnchors>>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry, catalog: &'a TypeCatalog, mode: ProcessingMode) -> Self {
        Self {
            registry,
            catalog,
            mode,
            anchors: RefCell::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// The run-wide mode, except that schema-typed content is always
    /// document-driven.
    pub fn effective_mode(&self, schema_context: bool) -> ProcessingMode {
        if schema_context {
            ProcessingMode::DocumentDriven
        } else {
            self.mode
        }
    }

    /// Base URI in effect at a location.
    ///
    /// Document-driven: every identifier-redefinition field on the path
    /// from the document root to the location has taken effect, each
    /// resolved against the base current at its own position.
    /// Reference-driven: ancestor context is unknown, so the reference
    /// context (the document's registered identifier) is authoritative.
    pub fn base_uri(&self, location: &Location, mode: ProcessingMode) -> Url {
        let doc = self.registry.get(location.doc);
        let mut base = doc.uri.clone();
        if mode == ProcessingMode::ReferenceDriven {
            return base;
        }
        let Some(base_field) = self.catalog.context().base.as_deref() else {
            return base;
        };

        for depth in 0..=location.ptr.len() {
            let prefix = location.ptr.prefix(depth);
            let Some(Value::Object(map)) = prefix.evaluate(&doc.tree) else {
                continue;
            };
            if let Some(Value::String(redefined)) = map.get(base_field) {
                match base.join(redefined) {
                    Ok(new_base) => base = new_base,
                    Err(_) => {
                        tracing::warn!(
                            value = %redefined,
                            at = %self.registry.uri_of(&Location::new(location.doc, prefix)),
                            "ignoring unparseable identifier redefinition",
                        );
                    }
                }
            }
        }
        base
    }

    /// Resolve a lexical reference value occurring at `source`.
    pub fn resolve(
        &self,
        source: &Location,
        reference: &str,
        schema_context: bool,
    ) -> Result<Location, ResolveError> {
        let mode = self.effective_mode(schema_context);
        let base = self.base_uri(source, mode);
        let target = base
            .join(reference)
            .map_err(|e| ResolveError::InvalidReference {
                location: self.registry.uri_of(source),
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

        let fragment = target.fragment().map(str::to_string);
        let mut absolute = target;
        absolute.set_fragment(None);

        let doc = match self.registry.lookup_uri(absolute.as_str()) {
            Some(doc) => doc,
            None if reference.starts_with('#') => source.doc,
            None => {
                if let Some((registered, suffix)) =
                    self.registry.probe_suffix(absolute.as_str())
                {
                    return Err(ResolveError::SuffixMismatch {
                        location: self.registry.uri_of(source),
                        reference: reference.to_string(),
                        registered: registered.uri.to_string(),
                        suffix: suffix.to_string(),
                    });
                }
                return Err(ResolveError::UnresolvableReference {
                    location: self.registry.uri_of(source),
                    reference: reference.to_string(),
                });
            }
        };

        let ptr = self.fragment_pointer(doc, fragment.as_deref(), source, reference)?;
        let resolved = Location::new(doc, ptr);
        if self.registry.value_at(&resolved).is_none() {
            return Err(ResolveError::UnresolvableReference {
                location: self.registry.uri_of(source),
                reference: reference.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Resolve a dynamic reference by scanning every whole document along
    /// the evaluation path, outermost first, for the earliest matching
    /// dynamic anchor.
    pub fn resolve_dynamic(
        &self,
        source: &Location,
        reference: &str,
        schema_context: bool,
        evaluation_path: &[DocId],
    ) -> Result<Location, ResolveError> {
        if self.effective_mode(schema_context) == ProcessingMode::ReferenceDriven {
            // The anchor may never be observed in a partially-traversed
            // document; this is a misconfiguration, not a resolution.
            return Err(ResolveError::DynamicScopeRequiresDocument {
                location: self.registry.uri_of(source),
                reference: reference.to_string(),
            });
        }
        let name = reference.trim_start_matches('#');

        for &doc in evaluation_path {
            let ptr = self.with_anchors(doc, |a| a.dynamic.get(name).cloned());
            if let Some(ptr) = ptr {
                return Ok(Location::new(doc, ptr));
            }
        }
        Err(ResolveError::UnresolvableReference {
            location: self.registry.uri_of(source),
            reference: reference.to_string(),
        })
    }

    /// Whether a document contains dynamic anchors or dynamic references.
    ///
    /// Reference-driven processing of such a document is a detectable
    /// misconfiguration: a partial traversal may never observe them.
    pub fn has_dynamic_content(&self, doc: DocId) -> bool {
        self.with_anchors(doc, |a| {
            !a.dynamic.is_empty() || a.has_dynamic_reference
        })
    }

    fn fragment_pointer(
        &self,
        doc: DocId,
        fragment: Option<&str>,
        source: &Location,
        reference: &str,
    ) -> Result<JsonPointer, ResolveError> {
        let Some(fragment) = fragment else {
            return Ok(JsonPointer::root());
        };
        if fragment.is_empty() {
            return Ok(JsonPointer::root());
        }
        if fragment.starts_with('/') || fragment.starts_with("%2F") {
            return JsonPointer::parse_uri_fragment(fragment).map_err(|e| {
                ResolveError::InvalidReference {
                    location: self.registry.uri_of(source),
                    reference: reference.to_string(),
                    message: e.to_string(),
                }
            });
        }
        // Plain-name fragment: a static anchor within the target document.
        self.with_anchors(doc, |a| a.anchors.get(fragment).cloned())
            .ok_or_else(|| ResolveError::UnresolvableReference {
                location: self.registry.uri_of(source),
                reference: reference.to_string(),
            })
    }

    fn with_anchors<T>(&self, doc: DocId, f: impl FnOnce(&DocAnchors) -> T) -> T {
        let mut cache = self.anchors.borrow_mut();
        let anchors = cache.entry(doc).or_insert_with(|| {
            let mut collected = DocAnchors::default();
            scan_anchors(
                &self.registry.get(doc).tree,
                JsonPointer::root(),
                self.catalog,
                &mut collected,
            );
            collected
        });
        f(anchors)
    }
}

fn scan_anchors(
    value: &Value,
    ptr: JsonPointer,
    catalog: &TypeCatalog,
    out: &mut DocAnchors,
) {
    let context = catalog.context();
    match value {
        Value::Object(map) => {
            if let Some(field) = context.anchor.as_deref() {
                if let Some(Value::String(name)) = map.get(field) {
                    // First occurrence in document order wins.
                    out.anchors.entry(name.clone()).or_insert_with(|| ptr.clone());
                }
            }
            if let Some(field) = context.dynamic_anchor.as_deref() {
                if let Some(Value::String(name)) = map.get(field) {
                    out.dynamic.entry(name.clone()).or_insert_with(|| ptr.clone());
                }
            }
            if let Some(field) = context.dynamic_reference.as_deref() {
                if map.get(field).is_some() {
                    out.has_dynamic_reference = true;
                }
            }
            for (key, child) in map {
                scan_anchors(child, ptr.child(key.clone()), catalog, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                scan_anchors(child, ptr.child(i.to_string()), catalog, out);
            }
        }
        _ => {}
    }
}
