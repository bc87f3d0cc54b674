//! Semantic graph builder: drives traversal of every typed document
//! under the type mapping catalog, emits triples, and records type
//! conflicts and validation diagnostics.
//!
//! The builder is a generic interpreter over catalog entries; it has no
//! per-type logic. Primary resolution (the reference closure) always
//! completes before secondary resolution (name-based correlations), and
//! example validation runs last against the set primary resolution
//! established.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;

use crate::catalog::{RefConflictPolicy, TypeCatalog, TypeMapping, ANY_TYPE};
use crate::error::{DocumentError, ResolveError};
use crate::graph::{Diagnostic, LiteralKind, Severity, Term, TripleSet, TypeConflict, RDF_TYPE};
use crate::pointer::escape_token;
use crate::registry::{DocId, Location, Registry};
use crate::resolver::{ProcessingMode, Resolver};
use crate::schema::{dialect_for, validate_instance};
use crate::template::RelativeTemplate;

/// Semantic type marking schema-typed content, which always resolves
/// document-driven.
const SCHEMA_TYPE: &str = "Schema";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub mode: ProcessingMode,
    /// Unrecognized fields on non-extensible types become errors.
    pub strict: bool,
    pub validate_examples: bool,
    /// Omit environment-specific triples and sort serialized output.
    pub test_mode: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::ReferenceDriven,
            strict: false,
            validate_examples: true,
            test_mode: false,
        }
    }
}

/// Immutable result of one build pass.
#[derive(Debug)]
pub struct BuildOutput {
    pub triples: TripleSet,
    pub conflicts: Vec<TypeConflict>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildOutput {
    /// Overall pass/fail: no error diagnostics and no type conflicts.
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
            && !self
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

#[derive(Debug, Clone)]
enum Origin {
    Root,
    Parent(Location),
    Reference(Location),
}

#[derive(Debug)]
struct WorkItem {
    loc: Location,
    type_name: String,
    origin: Origin,
    evaluation_path: Vec<DocId>,
}

struct PendingImplicit {
    source: Location,
    relation: String,
    target_type: String,
    field: RelativeTemplate,
    template_var: bool,
    required: bool,
    value: String,
}

struct PendingExample {
    instance: Location,
    schema: Location,
}

/// Build the semantic graph for a registered document set.
pub fn build(
    registry: &Registry,
    catalog: &TypeCatalog,
    options: BuildOptions,
) -> Result<BuildOutput, DocumentError> {
    GraphBuilder::new(registry, catalog, options).run()
}

struct GraphBuilder<'a> {
    registry: &'a Registry,
    catalog: &'a TypeCatalog,
    resolver: Resolver<'a>,
    options: BuildOptions,
    triples: TripleSet,
    diagnostics: Vec<Diagnostic>,
    conflicts: Vec<TypeConflict>,
    conflict_index: HashMap<String, usize>,
    asserted: HashMap<Location, String>,
    visited: HashSet<Location>,
    reached: Vec<(Location, String)>,
    non_schema_docs: HashSet<DocId>,
    pending_implicit: Vec<PendingImplicit>,
    pending_examples: Vec<PendingExample>,
    queue: VecDeque<WorkItem>,
}

impl<'a> GraphBuilder<'a> {
    fn new(registry: &'a Registry, catalog: &'a TypeCatalog, options: BuildOptions) -> Self {
        Self {
            registry,
            catalog,
            resolver: Resolver::new(registry, catalog, options.mode),
            options,
            triples: TripleSet::new(),
            diagnostics: Vec::new(),
            conflicts: Vec::new(),
            conflict_index: HashMap::new(),
            asserted: HashMap::new(),
            visited: HashSet::new(),
            reached: Vec::new(),
            non_schema_docs: HashSet::new(),
            pending_implicit: Vec::new(),
            pending_examples: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    fn run(mut self) -> Result<BuildOutput, DocumentError> {
        self.emit_resources();
        self.select_entry_points()?;

        while let Some(item) = self.queue.pop_front() {
            self.visit(item);
        }
        self.check_dynamic_misconfiguration();
        self.resolve_implicit();
        self.validate_pending_examples();

        Ok(BuildOutput {
            triples: self.triples,
            conflicts: self.conflicts,
            diagnostics: self.diagnostics,
        })
    }

    fn rel(&self, name: &str) -> String {
        self.catalog.relation_iri(name)
    }

    fn error(&mut self, code: &str, location: String, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: code.to_string(),
            location,
            message,
        });
    }

    fn warning(&mut self, code: &str, location: String, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            code: code.to_string(),
            location,
            message,
        });
    }

    /// `locatedAt` and `filename` triples per document; suppressed in
    /// test mode because they change with the environment.
    fn emit_resources(&mut self) {
        if self.options.test_mode {
            return;
        }
        for doc in self.registry.docs() {
            self.triples.insert(
                doc.uri.as_str(),
                self.rel("locatedAt"),
                Term::node(doc.url.as_str()),
            );
            if let Some(filename) = doc.filename() {
                let filename = filename.to_string();
                self.triples.insert(
                    doc.uri.as_str(),
                    self.rel("filename"),
                    Term::literal(filename, LiteralKind::String),
                );
            }
        }
    }

    /// Entry points: declared root types, plus every document whose root
    /// carries a supported `openapi` field. Documents with neither stay
    /// inert until a reference reaches them.
    fn select_entry_points(&mut self) -> Result<(), DocumentError> {
        let mut version_errors = false;
        for doc in self.registry.docs() {
            let type_name = if let Some(declared) = &doc.declared_type {
                Some(declared.clone())
            } else if let Some(Value::String(version)) = doc.tree.get("openapi") {
                if version.starts_with("3.0.") {
                    Some("OpenAPI".to_string())
                } else if version.starts_with("3.1.") || version.starts_with("2.") {
                    version_errors = true;
                    self.error(
                        "E001",
                        doc.uri.to_string(),
                        DocumentError::UnsupportedVersion {
                            version: version.clone(),
                        }
                        .to_string(),
                    );
                    None
                } else {
                    version_errors = true;
                    self.error(
                        "E001",
                        doc.uri.to_string(),
                        DocumentError::InvalidVersion {
                            version: version.clone(),
                        }
                        .to_string(),
                    );
                    None
                }
            } else {
                None
            };

            if let Some(type_name) = type_name {
                self.queue.push_back(WorkItem {
                    loc: Location::root(doc.id),
                    type_name,
                    origin: Origin::Root,
                    evaluation_path: vec![doc.id],
                });
            }
        }
        if self.queue.is_empty() && !version_errors {
            return Err(DocumentError::NoEntryDocument);
        }
        Ok(())
    }

    fn visit(&mut self, item: WorkItem) {
        let WorkItem {
            loc,
            type_name,
            origin,
            evaluation_path,
        } = item;

        if type_name == ANY_TYPE {
            // Reached, but with no expected shape to interpret it under.
            self.reached.push((loc, type_name));
            return;
        }

        let uri = self.registry.uri_of(&loc);
        match self.asserted.get(&loc) {
            None => {
                self.asserted.insert(loc.clone(), type_name.clone());
                self.triples
                    .insert(&uri, RDF_TYPE, Term::node(self.rel(&type_name)));
                self.triples
                    .insert(&uri, RDF_TYPE, Term::node(self.rel("ParsedStructure")));
            }
            Some(existing) if *existing == type_name => {}
            Some(_) => {
                // Disagreeing assertion: record the conflict instead of
                // overwriting, and annotate alongside the earlier triple.
                self.triples.insert(
                    &uri,
                    self.rel("conflictingType"),
                    Term::node(self.rel(&type_name)),
                );
                self.record_conflict(&loc, &uri, &origin, &type_name);
                return;
            }
        }

        if !self.visited.insert(loc.clone()) {
            return;
        }
        self.reached.push((loc.clone(), type_name.clone()));

        let schema_context = type_name == SCHEMA_TYPE;
        if !schema_context {
            self.non_schema_docs.insert(loc.doc);
        }

        let entry = match self.catalog.lookup(&type_name) {
            Ok(entry) => entry.clone(),
            Err(e) => {
                self.error("E006", uri, e.to_string());
                return;
            }
        };

        let Some(value) = self.registry.value_at(&loc) else {
            return;
        };
        let value = value.clone();
        let tree = self.registry.get(loc.doc).tree.clone();

        let suppressed =
            self.emit_references(&entry, &loc, &tree, &value, schema_context, &evaluation_path);
        if suppressed {
            return;
        }
        if schema_context {
            self.emit_dynamic_reference(&loc, &uri, &value, &evaluation_path);
        }
        self.emit_children(&entry, &loc, &uri, &tree, &evaluation_path);
        self.emit_literals(&entry, &loc, &uri, &tree);
        self.collect_implicit(&entry, &loc, &tree);
        self.collect_examples(&entry, &loc, &tree);
        self.check_unique_keys(&entry, &loc, &tree);
        self.check_extensibility(&entry, &loc, &uri, &value, schema_context);
    }

    fn record_conflict(&mut self, loc: &Location, uri: &str, origin: &Origin, new_type: &str) {
        let source = match origin {
            Origin::Root => self.registry.uri_of(loc),
            Origin::Parent(parent) => self.registry.uri_of(parent),
            Origin::Reference(source) => self.registry.uri_of(source),
        };
        let index = *self.conflict_index.entry(uri.to_string()).or_insert_with(|| {
            let context_type = match self.asserted.get(loc) {
                // The first assertion from parent context, if any, is the
                // context-implied type; reference-implied firsts go in
                // the source map when they disagree later.
                Some(existing) => Some(existing.clone()),
                None => None,
            };
            self.conflicts.push(TypeConflict {
                location: uri.to_string(),
                context_type,
                implied: Vec::new(),
            });
            self.conflicts.len() - 1
        });
        self.conflicts[index].add(source, new_type);
    }

    /// Reference relations. Returns true when sibling content at this
    /// location is suppressed by the reference-conflict policy.
    fn emit_references(
        &mut self,
        entry: &TypeMapping,
        loc: &Location,
        tree: &Value,
        value: &Value,
        schema_context: bool,
        evaluation_path: &[DocId],
    ) -> bool {
        let mut suppress = false;
        for reference in &entry.references {
            let matches = match reference.template.evaluate(tree, &loc.ptr) {
                Ok(matches) => matches,
                Err(_) => continue,
            };
            for m in matches {
                let Value::String(lexical) = m.value else {
                    self.error(
                        "E002",
                        self.registry.uri_of(&Location::new(loc.doc, m.pointer.clone())),
                        "reference value must be a string".to_string(),
                    );
                    continue;
                };
                let source = Location::new(loc.doc, m.pointer.clone());
                let reference_value = match &reference.name_prefix {
                    Some(prefix) if is_plain_name(lexical) => {
                        format!("{prefix}{}", escape_token(lexical))
                    }
                    _ => lexical.clone(),
                };

                // A reference directly on this object engages the
                // conflict policy when siblings are present.
                let own_ref = m.pointer.parent().as_ref() == Some(&loc.ptr);
                if own_ref {
                    let siblings = value.as_object().is_some_and(|map| map.len() > 1);
                    if siblings {
                        match entry.ref_conflict {
                            RefConflictPolicy::Invalid => {
                                self.error(
                                    "E007",
                                    self.registry.uri_of(&source),
                                    "reference must not have sibling content".to_string(),
                                );
                                suppress = true;
                            }
                            RefConflictPolicy::IgnoreSiblings => suppress = true,
                            RefConflictPolicy::Merge | RefConflictPolicy::AllOf => {}
                        }
                    } else {
                        // Nothing but the reference here; no siblings to
                        // interpret either way.
                        suppress = true;
                    }
                }

                match self.resolver.resolve(&source, &reference_value, schema_context) {
                    Ok(target) => {
                        let target_uri = self.registry.uri_of(&target);
                        self.triples.insert(
                            self.registry.uri_of(&source),
                            self.rel(&reference.relation),
                            Term::node(target_uri),
                        );
                        let mut path = evaluation_path.to_vec();
                        if !path.contains(&target.doc) {
                            path.push(target.doc);
                        }
                        self.queue.push_back(WorkItem {
                            loc: target,
                            type_name: reference.target.clone(),
                            origin: Origin::Reference(source),
                            evaluation_path: path,
                        });
                    }
                    Err(e) => self.resolution_error(&source, e),
                }
            }
        }
        suppress
    }

    fn resolution_error(&mut self, source: &Location, e: ResolveError) {
        let code = match &e {
            ResolveError::SuffixMismatch { .. } => "E003",
            ResolveError::DialectUndeclared { .. } => "E004",
            ResolveError::DynamicScopeRequiresDocument { .. } => "E005",
            _ => "E002",
        };
        let location = self.registry.uri_of(source);
        tracing::warn!(%location, error = %e, "reference chain left unresolved");
        self.error(code, location, e.to_string());
    }

    /// `$dynamicRef`-equivalent fields on schema-typed content.
    fn emit_dynamic_reference(
        &mut self,
        loc: &Location,
        uri: &str,
        value: &Value,
        evaluation_path: &[DocId],
    ) {
        let Some(field) = self.catalog.context().dynamic_reference.clone() else {
            return;
        };
        let Some(Value::String(reference)) = value.get(&field) else {
            return;
        };
        let source = loc.child(field);
        match self
            .resolver
            .resolve_dynamic(&source, reference, true, evaluation_path)
        {
            Ok(target) => {
                let target_uri = self.registry.uri_of(&target);
                self.triples.insert(
                    uri,
                    self.rel("dynamicReferences"),
                    Term::node(target_uri),
                );
                let mut path = evaluation_path.to_vec();
                if !path.contains(&target.doc) {
                    path.push(target.doc);
                }
                self.queue.push_back(WorkItem {
                    loc: target,
                    type_name: SCHEMA_TYPE.to_string(),
                    origin: Origin::Reference(source),
                    evaluation_path: path,
                });
            }
            Err(e) => self.resolution_error(&source, e),
        }
    }

    fn emit_children(
        &mut self,
        entry: &TypeMapping,
        loc: &Location,
        uri: &str,
        tree: &Value,
        evaluation_path: &[DocId],
    ) {
        // Children are sorted most-specific first; a pointer claimed by a
        // more specific template is not re-matched by a catch-all.
        let mut claimed = HashSet::new();
        for child in &entry.children {
            let matches = match child.template.evaluate(tree, &loc.ptr) {
                Ok(matches) => matches,
                Err(_) => continue,
            };
            for m in matches {
                if !claimed.insert(m.pointer.clone()) {
                    continue;
                }
                let child_loc = Location::new(loc.doc, m.pointer);
                let child_uri = self.registry.uri_of(&child_loc);
                self.triples
                    .insert(uri, self.rel(&child.relation), Term::node(&child_uri));
                self.triples
                    .insert(child_uri, self.rel("parent"), Term::node(uri));
                self.queue.push_back(WorkItem {
                    loc: child_loc,
                    type_name: child.target.clone(),
                    origin: Origin::Parent(loc.clone()),
                    evaluation_path: evaluation_path.to_vec(),
                });
            }
        }
    }

    fn emit_literals(&mut self, entry: &TypeMapping, loc: &Location, uri: &str, tree: &Value) {
        for literal in &entry.literals {
            let matches = match literal.template.evaluate(tree, &loc.ptr) {
                Ok(matches) => matches,
                Err(_) => continue,
            };
            for m in matches {
                let term = match m.value {
                    Value::String(s) => Term::literal(
                        s.clone(),
                        literal.kind_hint.unwrap_or(LiteralKind::String),
                    ),
                    Value::Bool(b) => Term::literal(b.to_string(), LiteralKind::Boolean),
                    Value::Number(n) => Term::literal(n.to_string(), LiteralKind::Number),
                    // Structured values are not literals.
                    _ => continue,
                };
                self.triples.insert(uri, self.rel(&literal.relation), term);
            }
        }
    }

    fn collect_implicit(&mut self, entry: &TypeMapping, loc: &Location, tree: &Value) {
        for implicit in &entry.implicit {
            let matches = match implicit.template.evaluate(tree, &loc.ptr) {
                Ok(matches) => matches,
                Err(_) => continue,
            };
            for m in matches {
                let value = match (&m.key, m.value) {
                    (Some(key), _) => key.clone(),
                    (None, Value::String(s)) => s.clone(),
                    _ => continue,
                };
                self.pending_implicit.push(PendingImplicit {
                    source: Location::new(loc.doc, m.pointer),
                    relation: implicit.relation.clone(),
                    target_type: implicit.target_type.clone(),
                    field: implicit.field.clone(),
                    template_var: implicit.template_var,
                    required: implicit.required,
                    value,
                });
            }
        }
    }

    fn collect_examples(&mut self, entry: &TypeMapping, loc: &Location, tree: &Value) {
        for example in &entry.examples {
            let matches = match example.template.evaluate(tree, &loc.ptr) {
                Ok(matches) => matches,
                Err(_) => continue,
            };
            for m in matches {
                let instance = Location::new(loc.doc, m.pointer);
                let schemas = match example.schema.evaluate(tree, &instance.ptr) {
                    Ok(schemas) => schemas,
                    Err(_) => continue,
                };
                if let Some(schema) = schemas.first() {
                    self.pending_examples.push(PendingExample {
                        instance,
                        schema: Location::new(loc.doc, schema.pointer.clone()),
                    });
                }
            }
        }
    }

    fn check_unique_keys(&mut self, entry: &TypeMapping, loc: &Location, tree: &Value) {
        for unique in &entry.unique_keys {
            let elements = match unique.scope.evaluate(tree, &loc.ptr) {
                Ok(elements) => elements,
                Err(_) => continue,
            };
            let mut seen: HashMap<Vec<String>, Location> = HashMap::new();
            for element in elements {
                let mut key = Vec::with_capacity(unique.fields.len());
                let mut complete = true;
                for field in &unique.fields {
                    let values = field
                        .evaluate(tree, &element.pointer)
                        .unwrap_or_default();
                    match values.first() {
                        Some(v) => key.push(v.value.to_string()),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    continue;
                }
                let element_loc = Location::new(loc.doc, element.pointer);
                if let Some(first) = seen.get(&key) {
                    let first_uri = self.registry.uri_of(first);
                    let location = self.registry.uri_of(&element_loc);
                    self.error(
                        "E009",
                        location,
                        format!("duplicate key {key:?}; first declared at {first_uri}"),
                    );
                } else {
                    seen.insert(key, element_loc);
                }
            }
        }
    }

    /// Fields not consumed by any relation template: annotation triples
    /// on extensible types, diagnostics on non-extensible ones.
    fn check_extensibility(
        &mut self,
        entry: &TypeMapping,
        loc: &Location,
        uri: &str,
        value: &Value,
        schema_context: bool,
    ) {
        let Value::Object(map) = value else {
            return;
        };
        let consumed = self.consumed_keys(entry, map, schema_context);

        for key in map.keys() {
            if consumed.contains(key.as_str()) {
                continue;
            }
            if entry.extensible {
                self.triples.insert(
                    uri,
                    self.rel("extensionField"),
                    Term::literal(key.clone(), LiteralKind::String),
                );
            } else if self.options.strict {
                let location = self.registry.uri_of(&loc.child(key.clone()));
                self.error(
                    "E012",
                    location,
                    format!("field {key:?} is not allowed on {}", entry.name),
                );
            } else {
                let location = self.registry.uri_of(&loc.child(key.clone()));
                self.warning(
                    "W001",
                    location,
                    format!("unrecognized field {key:?} on {}", entry.name),
                );
            }
        }
    }

    fn consumed_keys(
        &self,
        entry: &TypeMapping,
        map: &serde_json::Map<String, Value>,
        schema_context: bool,
    ) -> HashSet<String> {
        let mut consumed = HashSet::new();
        let mut catch_all = false;

        let mut take = |template: &RelativeTemplate| {
            if !template.is_descendant() {
                return;
            }
            match template.leading_fixed() {
                Some(first) => {
                    consumed.insert(first.to_string());
                }
                None => catch_all = true,
            }
        };
        for child in &entry.children {
            take(&child.template);
        }
        for reference in &entry.references {
            take(&reference.template);
        }
        for literal in &entry.literals {
            take(&literal.template);
        }
        for implicit in &entry.implicit {
            take(&implicit.template);
        }
        for example in &entry.examples {
            take(&example.template);
        }

        if catch_all {
            consumed.extend(map.keys().cloned());
        }
        if schema_context {
            let context = self.catalog.context();
            for field in [
                context.base.as_deref(),
                context.dialect.as_deref(),
                context.anchor.as_deref(),
                context.dynamic_anchor.as_deref(),
                context.dynamic_reference.as_deref(),
            ]
            .into_iter()
            .flatten()
            {
                consumed.insert(field.to_string());
            }
        }
        consumed
    }

    /// A document containing dynamic anchors or references that was
    /// entered in a non-schema context under reference-driven processing
    /// may never observe its anchors: a misconfiguration, not a guess.
    fn check_dynamic_misconfiguration(&mut self) {
        if self.options.mode == ProcessingMode::DocumentDriven {
            return;
        }
        let docs: Vec<DocId> = self.non_schema_docs.iter().copied().collect();
        for doc in docs {
            if self.resolver.has_dynamic_content(doc) {
                let uri = self.registry.get(doc).uri.to_string();
                self.error(
                    "E005",
                    uri,
                    "document declares dynamic anchors but was processed \
                     reference-driven; its anchors may never be observed"
                        .to_string(),
                );
            }
        }
    }

    /// Secondary resolution: name-based correlations, strictly within
    /// the set established by primary resolution.
    fn resolve_implicit(&mut self) {
        let pending = std::mem::take(&mut self.pending_implicit);
        for p in pending {
            if p.template_var {
                self.correlate_template_var(p);
            } else {
                self.correlate_name(p);
            }
        }
    }

    /// The matched name must occur as a `{name}` variable in the string
    /// the field template addresses on the source side.
    fn correlate_template_var(&mut self, p: PendingImplicit) {
        let tree = &self.registry.get(p.source.doc).tree;
        let needle = format!("{{{}}}", p.value);
        let field_match = p
            .field
            .evaluate(tree, &p.source.ptr)
            .unwrap_or_default()
            .into_iter()
            .find(|m| matches!(m.value, Value::String(s) if s.contains(&needle)));

        match field_match {
            Some(m) => {
                let target = Location::new(p.source.doc, m.pointer);
                self.triples.insert(
                    self.registry.uri_of(&p.source),
                    self.rel(&p.relation),
                    Term::node(self.registry.uri_of(&target)),
                );
            }
            None if p.required => {
                let location = self.registry.uri_of(&p.source);
                self.error(
                    "E008",
                    location,
                    format!("variable {:?} does not occur in the templated field", p.value),
                );
            }
            None => {}
        }
    }

    fn correlate_name(&mut self, p: PendingImplicit) {
        let candidate = self
            .reached
            .iter()
            .filter(|(_, t)| *t == p.target_type)
            .find(|(loc, _)| self.field_matches(loc, &p.field, &p.value))
            .map(|(loc, _)| loc.clone());

        match candidate {
            Some(target) => {
                self.triples.insert(
                    self.registry.uri_of(&p.source),
                    self.rel(&p.relation),
                    Term::node(self.registry.uri_of(&target)),
                );
            }
            None if p.required => {
                let location = self.registry.uri_of(&p.source);
                self.error(
                    "E008",
                    location,
                    format!(
                        "no {} reached by primary resolution matches {:?}",
                        p.target_type, p.value,
                    ),
                );
            }
            None => {}
        }
    }

    fn field_matches(&self, candidate: &Location, field: &RelativeTemplate, value: &str) -> bool {
        let tree = &self.registry.get(candidate.doc).tree;
        let Ok(matches) = field.evaluate(tree, &candidate.ptr) else {
            return false;
        };
        matches.iter().any(|m| match (&m.key, m.value) {
            (Some(key), _) => key == value,
            (None, Value::String(s)) => s == value,
            _ => false,
        })
    }

    fn validate_pending_examples(&mut self) {
        if !self.options.validate_examples {
            tracing::info!("skipping example validation");
            return;
        }
        let pending = std::mem::take(&mut self.pending_examples);
        for p in pending {
            let dialect = match dialect_for(self.registry, self.catalog, &p.schema) {
                Ok(dialect) => dialect,
                Err(e) => {
                    let location = self.registry.uri_of(&p.schema);
                    self.error("E004", location, e.to_string());
                    continue;
                }
            };
            let Some(instance) = self.registry.value_at(&p.instance).cloned() else {
                continue;
            };
            let schema_uri = self.registry.uri_of(&p.schema);
            // Evaluate through a reference into the full document so the
            // schema keeps its base URI and in-document pointers.
            let wrapper = serde_json::json!({ "$ref": schema_uri });

            match validate_instance(self.registry, &wrapper, &schema_uri, &instance, dialect) {
                Ok(failures) => {
                    for failure in failures {
                        let location = self.registry.uri_of(&p.instance);
                        self.error(
                            "E011",
                            location,
                            format!(
                                "value does not satisfy {} at {}: {}",
                                schema_uri, failure.keyword_location, failure.message,
                            ),
                        );
                    }
                }
                Err(message) => {
                    let location = self.registry.uri_of(&p.schema);
                    self.error("E010", location, message);
                }
            }
        }
    }
}

fn is_plain_name(value: &str) -> bool {
    !value.contains(['/', '#', ':'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(docs: Vec<(&str, Value, Option<&str>)>, options: BuildOptions) -> BuildOutput {
        let mut registry = Registry::with_strip_suffixes(Vec::new());
        for (uri, tree, declared) in docs {
            let url = uri.replace("https://example.com/", "file:///work/");
            registry.register(tree, &url, Some(uri), declared).unwrap();
        }
        let catalog = TypeCatalog::oas30().unwrap();
        build(&registry, &catalog, options).unwrap()
    }

    fn minimal_openapi() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Pets", "version": "1.0.0"},
            "paths": {}
        })
    }

    #[test]
    fn no_entry_document_is_fatal() {
        let mut registry = Registry::with_strip_suffixes(Vec::new());
        registry
            .register(json!({"a": 1}), "file:///a.json", Some("https://example.com/a"), None)
            .unwrap();
        let catalog = TypeCatalog::oas30().unwrap();
        let err = build(&registry, &catalog, BuildOptions::default()).unwrap_err();
        assert!(matches!(err, DocumentError::NoEntryDocument));
    }

    #[test]
    fn self_contained_document_validates_cleanly() {
        let output = run(
            vec![("https://example.com/api", minimal_openapi(), None)],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);

        let ns = "https://spec.openapis.org/compliance/ontology#";
        assert!(output.triples.contains(
            "https://example.com/api",
            RDF_TYPE,
            &Term::node(format!("{ns}OpenAPI")),
        ));
        assert!(output.triples.contains(
            "https://example.com/api#/info",
            RDF_TYPE,
            &Term::node(format!("{ns}Info")),
        ));
        assert!(output.triples.contains(
            "https://example.com/api",
            format!("{ns}info").as_str(),
            &Term::node("https://example.com/api#/info"),
        ));
        assert!(output.triples.contains(
            "https://example.com/api#/info",
            format!("{ns}title").as_str(),
            &Term::literal("Pets", LiteralKind::String),
        ));
    }

    #[test]
    fn unsupported_version_reported() {
        let output = run(
            vec![
                (
                    "https://example.com/api",
                    json!({"openapi": "3.1.0", "info": {}}),
                    None,
                ),
                ("https://example.com/ok", minimal_openapi(), None),
            ],
            BuildOptions::default(),
        );
        assert!(!output.is_valid());
        assert!(output.diagnostics.iter().any(|d| d.code == "E001"));
    }

    #[test]
    fn reference_reaches_other_document_and_asserts_type() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {
                    "Pet": {"$ref": "shared#/components/schemas/Pet"}
                }
            }
        });
        let shared = json!({
            "components": {
                "schemas": {"Pet": {"type": "object"}}
            }
        });
        let output = run(
            vec![
                ("https://example.com/api", entry, None),
                ("https://example.com/shared", shared, None),
            ],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        let ns = "https://spec.openapis.org/compliance/ontology#";
        assert!(output.triples.contains(
            "https://example.com/api#/components/schemas/Pet/$ref",
            format!("{ns}references").as_str(),
            &Term::node("https://example.com/shared#/components/schemas/Pet"),
        ));
        assert!(output.triples.contains(
            "https://example.com/shared#/components/schemas/Pet",
            RDF_TYPE,
            &Term::node(format!("{ns}Schema")),
        ));
    }

    #[test]
    fn suffix_mismatch_is_fatal_for_the_chain() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {
                    "A": {"$ref": "left#/schema"},
                    "B": {"$ref": "right#/schema"}
                }
            }
        });
        let output = run(
            vec![
                ("https://example.com/api", entry, None),
                ("https://example.com/left.json", json!({"schema": {}}), None),
                ("https://example.com/right.yaml", json!({"schema": {}}), None),
            ],
            BuildOptions::default(),
        );
        assert!(!output.is_valid());
        let mismatches: Vec<_> = output
            .diagnostics
            .iter()
            .filter(|d| d.code == "E003")
            .collect();
        assert_eq!(mismatches.len(), 2);
        assert!(mismatches
            .iter()
            .any(|d| d.location == "https://example.com/api#/components/schemas/A/$ref"));
    }

    #[test]
    fn type_conflict_produces_single_record() {
        // The same empty object is reachable as a Schema (from the
        // components tree) and as a PathItem (via an explicit reference).
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {"$ref": "shared#/thing"}
            },
            "components": {
                "schemas": {"S": {"$ref": "shared#/thing"}}
            }
        });
        let shared = json!({"thing": {}});
        let output = run(
            vec![
                ("https://example.com/api", entry, None),
                ("https://example.com/shared", shared, None),
            ],
            BuildOptions::default(),
        );
        assert_eq!(output.conflicts.len(), 1);
        let conflict = &output.conflicts[0];
        assert_eq!(conflict.location, "https://example.com/shared#/thing");
        let types = conflict.types();
        assert!(types.contains(&"Schema") && types.contains(&"PathItem"), "{types:?}");
        assert!(!output.is_valid());
    }

    #[test]
    fn duplicate_parameters_reported_within_scope() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {
                    "parameters": [
                        {"name": "id", "in": "query"},
                        {"name": "id", "in": "query"},
                        {"name": "id", "in": "path"}
                    ]
                }
            }
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions::default(),
        );
        let dupes: Vec<_> = output
            .diagnostics
            .iter()
            .filter(|d| d.code == "E009")
            .collect();
        assert_eq!(dupes.len(), 1);
        assert!(dupes[0].location.ends_with("/parameters/1"));
    }

    #[test]
    fn extension_fields_annotated_not_flagged() {
        let mut doc = minimal_openapi();
        doc["x-internal"] = json!(true);
        let output = run(
            vec![("https://example.com/api", doc, None)],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        let ns = "https://spec.openapis.org/compliance/ontology#";
        assert!(output.triples.contains(
            "https://example.com/api",
            format!("{ns}extensionField").as_str(),
            &Term::literal("x-internal", LiteralKind::String),
        ));
    }

    #[test]
    fn unknown_field_on_non_extensible_type_strict_vs_lax() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {
                    "S": {"discriminator": {"propertyName": "kind", "bogus": 1}}
                }
            }
        });
        let lax = run(
            vec![("https://example.com/api", entry.clone(), None)],
            BuildOptions::default(),
        );
        assert!(lax
            .diagnostics
            .iter()
            .any(|d| d.code == "W001" && d.severity == Severity::Warning));

        let strict = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions {
                strict: true,
                ..BuildOptions::default()
            },
        );
        assert!(strict
            .diagnostics
            .iter()
            .any(|d| d.code == "E012" && d.severity == Severity::Error));
    }

    #[test]
    fn security_scheme_correlation_stays_within_reached_set() {
        // Scenario: the entry document defines both schemes; a second,
        // components-only document defines a conflicting scheme with the
        // same name but is never reached by primary resolution.
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "security": [{"api_key": []}],
            "components": {
                "securitySchemes": {
                    "api_key": {"type": "apiKey", "name": "k", "in": "header"}
                }
            }
        });
        let unreached = json!({
            "components": {
                "securitySchemes": {
                    "api_key": {"type": "http", "scheme": "basic"}
                }
            }
        });
        let output = run(
            vec![
                ("https://example.com/api", entry, None),
                ("https://example.com/extra", unreached, None),
            ],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        let ns = "https://spec.openapis.org/compliance/ontology#";
        let predicate = format!("{ns}securityScheme");
        let correlations: Vec<_> = output
            .triples
            .objects(
                "https://example.com/api#/security/0/api_key",
                &predicate,
            )
            .collect();
        assert_eq!(
            correlations,
            vec![&Term::node(
                "https://example.com/api#/components/securitySchemes/api_key",
            )],
        );
    }

    #[test]
    fn missing_required_correlation_reported() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "security": [{"undeclared": []}]
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions::default(),
        );
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.code == "E008" && d.severity == Severity::Error));
    }

    #[test]
    fn server_variable_must_appear_in_url_template() {
        let mut ok = minimal_openapi();
        ok["servers"] = json!([{
            "url": "https://{region}.example.com",
            "variables": {"region": {"default": "us"}}
        }]);
        let output = run(
            vec![("https://example.com/api", ok, None)],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);

        let mut bad = minimal_openapi();
        bad["servers"] = json!([{
            "url": "https://fixed.example.com",
            "variables": {"region": {"default": "us"}}
        }]);
        let output = run(
            vec![("https://example.com/api", bad, None)],
            BuildOptions::default(),
        );
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.code == "E008"));
    }

    #[test]
    fn operation_id_correlation_links_operation() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {
                    "get": {
                        "operationId": "getA",
                        "responses": {
                            "200": {
                                "description": "ok",
                                "links": {
                                    "self": {"operationId": "getA"}
                                }
                            }
                        }
                    }
                }
            }
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        let ns = "https://spec.openapis.org/compliance/ontology#";
        assert!(output.triples.contains(
            "https://example.com/api#/paths/~1a/get/responses/200/links/self/operationId",
            format!("{ns}operation").as_str(),
            &Term::node("https://example.com/api#/paths/~1a/get"),
        ));
    }

    #[test]
    fn example_validation_failures_collected() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {
                    "A": {"type": "string", "example": 5},
                    "B": {"type": "integer", "default": "oops"}
                }
            }
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions::default(),
        );
        let failures: Vec<_> = output
            .diagnostics
            .iter()
            .filter(|d| d.code == "E011")
            .collect();
        assert_eq!(failures.len(), 2, "{:?}", output.diagnostics);
    }

    #[test]
    fn example_validation_can_be_disabled() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {"A": {"type": "string", "example": 5}}
            }
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions {
                validate_examples: false,
                ..BuildOptions::default()
            },
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
    }

    #[test]
    fn reference_cycles_terminate() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {
                    "Node": {
                        "type": "object",
                        "properties": {
                            "next": {"$ref": "#/components/schemas/Node"}
                        }
                    }
                }
            }
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        let ns = "https://spec.openapis.org/compliance/ontology#";
        assert!(output.triples.contains(
            "https://example.com/api#/components/schemas/Node/properties/next/$ref",
            format!("{ns}references").as_str(),
            &Term::node("https://example.com/api#/components/schemas/Node"),
        ));
    }

    #[test]
    fn dynamic_anchor_doc_under_reference_driven_flagged() {
        let entry = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "$dynamicAnchor": "meta"
        });
        let output = run(
            vec![("https://example.com/api", entry, None)],
            BuildOptions::default(),
        );
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.code == "E005"));
    }

    #[test]
    fn test_mode_omits_environment_triples() {
        let output = run(
            vec![("https://example.com/api", minimal_openapi(), None)],
            BuildOptions {
                test_mode: true,
                ..BuildOptions::default()
            },
        );
        let rendered = output.triples.render(true);
        assert!(!rendered.contains("locatedAt"));
        assert!(!rendered.contains("filename"));
    }

    #[test]
    fn declared_schema_document_is_traversed_as_schema() {
        let schema_doc = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": {"name": {"type": "string"}}
        });
        let output = run(
            vec![
                ("https://example.com/api", minimal_openapi(), None),
                ("https://example.com/schema", schema_doc, Some("Schema")),
            ],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        let ns = "https://spec.openapis.org/compliance/ontology#";
        assert!(output.triples.contains(
            "https://example.com/schema#/properties/name",
            RDF_TYPE,
            &Term::node(format!("{ns}Schema")),
        ));
    }

    #[test]
    fn inert_document_is_parsed_but_never_interpreted() {
        let output = run(
            vec![
                ("https://example.com/api", minimal_openapi(), None),
                ("https://example.com/extra", json!({"whatever": 1}), None),
            ],
            BuildOptions::default(),
        );
        assert!(output.is_valid(), "{:?}", output.diagnostics);
        assert!(!output
            .triples
            .iter()
            .any(|t| t.subject.starts_with("https://example.com/extra#")));
    }
}
