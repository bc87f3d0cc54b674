//! Schema validation subsystem: validates schema-typed content and
//! declared example/default values against the dialect implied by
//! context.
//!
//! Evaluation reuses the `jsonschema` crate rather than reimplementing a
//! validator: the OAS 3.0 subset dialect is handled as draft-04-style
//! evaluation after rewriting its `nullable` extension, and 2020-12
//! evaluation (including dynamic-anchor scoping) is native. Reference
//! retrieval is backed by the identity registry, never the network.

use std::collections::HashMap;

use jsonschema::{Draft, Retrieve, Uri, Validator};
use serde_json::Value;

use crate::catalog::TypeCatalog;
use crate::error::ResolveError;
use crate::registry::{Location, Registry};

/// Well-known dialect identifiers.
const OAS30_DIALECT: &str = "https://spec.openapis.org/oas/v3.0/dialect/base";
const OAS31_DIALECT: &str = "https://spec.openapis.org/oas/3.1/dialect/base";
const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

/// A JSON-Schema dialect the subsystem can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// OAS 3.0 Schema Object subset (draft-04-style semantics plus
    /// `nullable` and boolean exclusive bounds).
    Oas30,
    /// JSON Schema draft 2020-12, with dynamic scoping.
    Draft202012,
}

impl Dialect {
    fn from_uri(uri: &str) -> Option<Self> {
        match uri.trim_end_matches('#') {
            OAS30_DIALECT => Some(Self::Oas30),
            OAS31_DIALECT | DRAFT_2020_12 => Some(Self::Draft202012),
            _ => None,
        }
    }
}

/// One schema evaluation failure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaFailure {
    pub instance_location: String,
    pub keyword_location: String,
    pub absolute_keyword_location: String,
    pub message: String,
}

/// Determine the dialect governing a schema-typed location.
///
/// Precedence: in-content dialect field at the schema root, then the
/// containing document's declared default, then the version default.
pub fn dialect_for(
    registry: &Registry,
    catalog: &TypeCatalog,
    location: &Location,
) -> Result<Dialect, ResolveError> {
    let doc = registry.get(location.doc);
    let undeclared = || ResolveError::DialectUndeclared {
        uri: registry.uri_of(location),
    };

    if let Some(field) = catalog.context().dialect.as_deref() {
        if let Some(Value::Object(map)) = registry.value_at(location) {
            if let Some(Value::String(uri)) = map.get(field) {
                return Dialect::from_uri(uri).ok_or_else(undeclared);
            }
        }
    }
    if let (Some(field), Value::Object(root)) =
        (catalog.context().dialect_default.as_deref(), &doc.tree)
    {
        if let Some(Value::String(uri)) = root.get(field) {
            return Dialect::from_uri(uri).ok_or_else(undeclared);
        }
    }
    if let Value::Object(root) = &doc.tree {
        if let Some(Value::String(version)) = root.get("openapi") {
            if version.starts_with("3.0.") {
                return Ok(Dialect::Oas30);
            }
            if version.starts_with("3.1.") {
                return Ok(Dialect::Draft202012);
            }
        }
    }
    Err(undeclared())
}

/// Resolves `$ref` URIs from the registry's document set; no network.
struct RegistryRetriever {
    documents_by_uri: HashMap<String, Value>,
    /// Apply the OAS 3.0 rewrite to retrieved documents so referenced
    /// schemas evaluate under the same dialect as the entry schema.
    rewrite: bool,
}

impl RegistryRetriever {
    fn new(registry: &Registry, rewrite: bool) -> Self {
        Self {
            documents_by_uri: registry
                .docs()
                .map(|d| (d.uri.as_str().to_string(), d.tree.clone()))
                .collect(),
            rewrite,
        }
    }
}

impl Retrieve for RegistryRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        self.documents_by_uri
            .get(uri_str)
            .map(|doc| if self.rewrite { rewrite_oas30(doc) } else { doc.clone() })
            .ok_or_else(|| format!("<{uri_str}> is not a registered document").into())
    }
}

/// Validate an instance against a schema under the given dialect.
///
/// Returns all failures, never just the first; `Err` means the schema
/// itself could not be compiled.
pub fn validate_instance(
    registry: &Registry,
    schema: &Value,
    schema_uri: &str,
    instance: &Value,
    dialect: Dialect,
) -> Result<Vec<SchemaFailure>, String> {
    let (schema, draft) = match dialect {
        Dialect::Oas30 => (rewrite_oas30(schema), Draft::Draft4),
        Dialect::Draft202012 => (schema.clone(), Draft::Draft202012),
    };

    let validator: Validator = jsonschema::options()
        .with_draft(draft)
        .with_retriever(RegistryRetriever::new(registry, dialect == Dialect::Oas30))
        .build(&schema)
        .map_err(|e| e.to_string())?;

    Ok(validator
        .iter_errors(instance)
        .map(|e| {
            let keyword_location = e.schema_path.to_string();
            SchemaFailure {
                instance_location: e.instance_path.to_string(),
                absolute_keyword_location: format!("{schema_uri}#{keyword_location}"),
                keyword_location,
                message: e.to_string(),
            }
        })
        .collect())
}

/// Rewrite the OAS 3.0 `nullable` extension into draft-04 terms.
///
/// `nullable: true` widens the sibling `type` to also accept null; the
/// remaining OAS extension keywords are annotations the evaluator already
/// ignores.
fn rewrite_oas30(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let nullable = matches!(map.get("nullable"), Some(Value::Bool(true)));
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                match key.as_str() {
                    "nullable" => {}
                    "type" if nullable => {
                        if let Value::String(t) = value {
                            out.insert(
                                "type".to_string(),
                                Value::Array(vec![
                                    Value::String(t.clone()),
                                    Value::String("null".to_string()),
                                ]),
                            );
                        } else {
                            out.insert(key.clone(), rewrite_oas30(value));
                        }
                    }
                    _ => {
                        out.insert(key.clone(), rewrite_oas30(value));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(rewrite_oas30).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with(docs: Vec<(&str, Value)>) -> (Registry, TypeCatalog) {
        let mut registry = Registry::with_strip_suffixes(Vec::new());
        for (uri, tree) in docs {
            let url = uri.replace("https://example.com/", "file:///work/");
            registry.register(tree, &url, Some(uri), None).unwrap();
        }
        (registry, TypeCatalog::oas30().unwrap())
    }

    #[test]
    fn dialect_defaults_to_oas30_for_30_documents() {
        let (registry, catalog) = registry_with(vec![(
            "https://example.com/api",
            json!({"openapi": "3.0.3", "components": {"schemas": {"S": {}}}}),
        )]);
        let loc = Location::root(0)
            .child("components")
            .child("schemas")
            .child("S");
        assert_eq!(
            dialect_for(&registry, &catalog, &loc).unwrap(),
            Dialect::Oas30,
        );
    }

    #[test]
    fn in_content_dialect_field_wins() {
        let (registry, catalog) = registry_with(vec![(
            "https://example.com/schema",
            json!({"$schema": "https://json-schema.org/draft/2020-12/schema"}),
        )]);
        let loc = Location::root(0);
        assert_eq!(
            dialect_for(&registry, &catalog, &loc).unwrap(),
            Dialect::Draft202012,
        );
    }

    #[test]
    fn document_default_applies_to_embedded_schemas() {
        let (registry, catalog) = registry_with(vec![(
            "https://example.com/api",
            json!({
                "jsonSchemaDialect": "https://spec.openapis.org/oas/3.1/dialect/base",
                "components": {"schemas": {"S": {}}}
            }),
        )]);
        let loc = Location::root(0)
            .child("components")
            .child("schemas")
            .child("S");
        assert_eq!(
            dialect_for(&registry, &catalog, &loc).unwrap(),
            Dialect::Draft202012,
        );
    }

    #[test]
    fn missing_dialect_is_an_error() {
        let (registry, catalog) =
            registry_with(vec![("https://example.com/schema", json!({"type": "object"}))]);
        let err = dialect_for(&registry, &catalog, &Location::root(0)).unwrap_err();
        assert!(matches!(err, ResolveError::DialectUndeclared { .. }));
    }

    #[test]
    fn validates_and_collects_all_failures() {
        let (registry, _) = registry_with(vec![("https://example.com/api", json!({}))]);
        let schema = json!({
            "type": "object",
            "required": ["name", "age"],
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"}
            }
        });
        let failures = validate_instance(
            &registry,
            &schema,
            "https://example.com/api#/components/schemas/S",
            &json!({}),
            Dialect::Oas30,
        )
        .unwrap();
        assert!(!failures.is_empty());
        assert!(failures.iter().all(|f| f
            .absolute_keyword_location
            .starts_with("https://example.com/api#")));
    }

    #[test]
    fn nullable_rewrite_accepts_null() {
        let (registry, _) = registry_with(vec![("https://example.com/api", json!({}))]);
        let schema = json!({"type": "string", "nullable": true});
        let failures = validate_instance(
            &registry,
            &schema,
            "https://example.com/api#/s",
            &json!(null),
            Dialect::Oas30,
        )
        .unwrap();
        assert!(failures.is_empty());

        let schema = json!({"type": "string"});
        let failures = validate_instance(
            &registry,
            &schema,
            "https://example.com/api#/s",
            &json!(null),
            Dialect::Oas30,
        )
        .unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn draft_2020_12_dynamic_scoping_is_native() {
        let (registry, _) = registry_with(vec![("https://example.com/api", json!({}))]);
        let schema = json!({
            "$id": "https://example.com/strict-tree",
            "$dynamicAnchor": "node",
            "$ref": "#/$defs/tree",
            "unevaluatedProperties": false,
            "$defs": {
                "tree": {
                    "type": "object",
                    "properties": {
                        "children": {
                            "type": "array",
                            "items": {"$dynamicRef": "#node"}
                        }
                    }
                }
            }
        });
        let valid = json!({"children": [{"children": []}]});
        let failures = validate_instance(
            &registry,
            &schema,
            "https://example.com/strict-tree",
            &valid,
            Dialect::Draft202012,
        )
        .unwrap();
        assert!(failures.is_empty(), "{failures:?}");

        let invalid = json!({"children": [{"daddy": true}]});
        let failures = validate_instance(
            &registry,
            &schema,
            "https://example.com/strict-tree",
            &invalid,
            Dialect::Draft202012,
        )
        .unwrap();
        assert!(!failures.is_empty());
    }

    #[test]
    fn registry_retriever_refuses_unregistered_uris() {
        let (registry, _) = registry_with(vec![("https://example.com/api", json!({}))]);
        let schema = json!({"$ref": "https://unregistered.example.com/s.json"});
        let result = validate_instance(
            &registry,
            &schema,
            "https://example.com/api#/s",
            &json!({}),
            Dialect::Draft202012,
        );
        // Either the build or the evaluation must surface the miss.
        match result {
            Ok(failures) => assert!(!failures.is_empty()),
            Err(message) => assert!(message.contains("unregistered")),
        }
    }
}
