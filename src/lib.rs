//! OpenAPI Description graph validator
//!
//! Validates multi-document OpenAPI Descriptions (OADs) and renders them
//! as an addressable semantic graph of triples for compliance checking.
//!
//! Documents are registered with a retrieval location (URL) and a logical
//! identifier (URI); a declarative type mapping catalog describes every
//! semantic object type; the reference resolution engine computes the
//! closure of reachable locations under an explicit processing model; the
//! graph builder interprets the catalog over that closure.
//!
//! # Example
//!
//! ```
//! use oasgraph::{build, BuildOptions, Registry, TypeCatalog};
//! use serde_json::json;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     json!({
//!         "openapi": "3.0.3",
//!         "info": {"title": "Pets", "version": "1.0.0"},
//!         "paths": {}
//!     }),
//!     "file:///work/openapi.json",
//!     Some("https://example.com/api"),
//!     None,
//! ).unwrap();
//!
//! let catalog = TypeCatalog::oas30().unwrap();
//! let output = build(&registry, &catalog, BuildOptions::default()).unwrap();
//!
//! assert!(output.is_valid());
//! assert!(output.triples.render(true).contains("ontology#OpenAPI"));
//! ```
//!
//! # Processing models
//!
//! Reference-driven resolution reaches only what references point at;
//! document-driven resolution parses whole target documents first, so
//! context-setting fields anywhere in them take effect. The model is
//! selected per run with [`BuildOptions::mode`]; schema-typed content is
//! always handled document-driven.

mod builder;
mod catalog;
mod error;
mod graph;
mod loader;
mod pointer;
mod registry;
mod resolver;
mod schema;
mod template;

pub use builder::{build, BuildOptions, BuildOutput};
pub use catalog::{
    ChildRelation, ContextFields, ExampleRelation, ImplicitRelation, LiteralRelation,
    RefConflictPolicy, ReferenceRelation, TypeCatalog, TypeMapping, UniqueKey, ANY_TYPE,
};
pub use error::{
    CatalogError, DocumentError, IdentityError, LoadError, PointerError, ResolveError,
};
pub use graph::{
    Diagnostic, LiteralKind, Severity, Term, Triple, TripleSet, TypeConflict, RDF_TYPE,
};
pub use loader::{file_url, load_file, load_json_str, load_yaml_str};
pub use pointer::{JsonPointer, RelativePointer};
pub use registry::{DocId, Document, Location, Registry, DEFAULT_STRIP_SUFFIXES};
pub use resolver::{ProcessingMode, Resolver};
pub use schema::{dialect_for, validate_instance, Dialect, SchemaFailure};
pub use template::{PointerTemplate, RelativeTemplate, TemplateMatch};
