//! Type mapping catalog: the declarative, per-object-type description of
//! child relations, reference relations, implicit references, literal
//! fields, uniqueness constraints, and extensibility rules.
//!
//! The catalog is data, not code — a table of tagged records keyed by
//! semantic type name, interpreted generically by the graph builder. It
//! is loaded once, validated as a whole, and never mutated during a run,
//! so it can be shared across concurrent runs.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::CatalogError;
use crate::graph::LiteralKind;
use crate::pointer::JsonPointer;
use crate::template::RelativeTemplate;

/// The built-in OAS 3.0 object model, shipped as data.
const OAS30_CATALOG: &str = include_str!("catalog/oas30.json");

/// Wildcard target accepted anywhere a type name is expected.
pub const ANY_TYPE: &str = "*";

/// What to do when a reference and sibling content coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefConflictPolicy {
    /// Sibling content is a validation error.
    Invalid,
    /// Sibling content is ignored, as in OAS 3.0 Reference Objects.
    #[default]
    IgnoreSiblings,
    /// Sibling content is interpreted alongside the reference.
    Merge,
    /// Sibling content combines with the target as an allOf branch.
    AllOf,
}

#[derive(Debug, Clone)]
pub struct ChildRelation {
    pub template: RelativeTemplate,
    pub relation: String,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct ReferenceRelation {
    pub template: RelativeTemplate,
    pub relation: String,
    pub target: String,
    /// Prefix applied to plain-name values (discriminator mapping allows
    /// either a component name or a URI reference).
    pub name_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImplicitRelation {
    pub template: RelativeTemplate,
    pub relation: String,
    pub target_type: String,
    /// Field on the correlation candidate (or, for template-variable
    /// correlations, on the source side) that must match, as a relative
    /// template; `0#` matches the candidate's own key.
    pub field: RelativeTemplate,
    pub qualifier: Option<RelativeTemplate>,
    /// The matched name must occur as a `{name}` template variable inside
    /// the string the `field` template addresses.
    pub template_var: bool,
    /// A missing correlation target is a validation error.
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct LiteralRelation {
    pub template: RelativeTemplate,
    pub relation: String,
    /// Overrides the scalar kind inferred from the value, e.g. URI-typed
    /// strings.
    pub kind_hint: Option<LiteralKind>,
}

#[derive(Debug, Clone)]
pub struct ExampleRelation {
    /// Where the example or default value lives.
    pub template: RelativeTemplate,
    /// The governing schema, relative to each matched example location.
    pub schema: RelativeTemplate,
}

#[derive(Debug, Clone)]
pub struct UniqueKey {
    /// Field tuple, each relative to a scope element.
    pub fields: Vec<RelativeTemplate>,
    /// Elements among which the tuple must be unique.
    pub scope: RelativeTemplate,
}

/// All mapping information for one semantic object type.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    pub name: String,
    pub children: Vec<ChildRelation>,
    pub references: Vec<ReferenceRelation>,
    pub implicit: Vec<ImplicitRelation>,
    pub literals: Vec<LiteralRelation>,
    pub examples: Vec<ExampleRelation>,
    pub unique_keys: Vec<UniqueKey>,
    pub extensible: bool,
    pub ref_conflict: RefConflictPolicy,
}

/// Context-setting field names, shared across the whole catalog.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextFields {
    /// Identifier-redefinition field (`$id`-equivalent).
    #[serde(default)]
    pub base: Option<String>,
    /// Dialect field (`$schema`-equivalent).
    #[serde(default)]
    pub dialect: Option<String>,
    /// Document-level dialect default (`jsonSchemaDialect`-equivalent).
    #[serde(default)]
    pub dialect_default: Option<String>,
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub dynamic_anchor: Option<String>,
    #[serde(default)]
    pub dynamic_reference: Option<String>,
}

#[derive(Debug)]
pub struct TypeCatalog {
    namespace: String,
    context: ContextFields,
    types: BTreeMap<String, TypeMapping>,
}

// --- Raw (serde) representation ---

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    namespace: String,
    #[serde(default)]
    context: ContextFields,
    types: BTreeMap<String, RawType>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawType {
    #[serde(default)]
    children: BTreeMap<String, RawChild>,
    #[serde(default)]
    references: BTreeMap<String, RawReference>,
    #[serde(default)]
    implicit: Vec<RawImplicit>,
    #[serde(default)]
    literals: BTreeMap<String, RawLiteral>,
    #[serde(default)]
    examples: Vec<RawExample>,
    #[serde(default)]
    unique_keys: Vec<RawUniqueKey>,
    #[serde(default)]
    extensible: bool,
    #[serde(default)]
    ref_conflict: RefConflictPolicy,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChild {
    Type(String),
    Full {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        relation: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Type(String),
    Full {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        relation: Option<String>,
        #[serde(default)]
        name_prefix: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawImplicit {
    template: String,
    relation: String,
    #[serde(rename = "type")]
    target_type: String,
    field: String,
    #[serde(default)]
    qualifier: Option<String>,
    #[serde(default)]
    template_var: bool,
    #[serde(default)]
    required: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLiteral {
    Relation(String),
    Full {
        relation: String,
        #[serde(default)]
        kind: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExample {
    template: String,
    schema: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUniqueKey {
    fields: Vec<String>,
    scope: String,
}

/// Collects template/type violations while converting one raw entry.
struct Check<'a> {
    type_name: &'a str,
    violations: &'a mut Vec<String>,
}

impl Check<'_> {
    fn template(&mut self, text: &str) -> Option<RelativeTemplate> {
        match RelativeTemplate::parse(text) {
            Ok(t) => Some(t),
            Err(_) => {
                self.violations.push(format!(
                    "type {:?}: {:?} is not a valid relative pointer template",
                    self.type_name, text,
                ));
                None
            }
        }
    }

    fn type_ref(&mut self, name: &str, known: &BTreeMap<String, RawType>) {
        if name != ANY_TYPE && !known.contains_key(name) {
            self.violations.push(format!(
                "type {:?}: references unknown semantic type {:?}",
                self.type_name, name,
            ));
        }
    }

    fn relation(&mut self, explicit: Option<&str>, template: Option<&RelativeTemplate>) -> String {
        if let Some(name) = explicit {
            return name.to_string();
        }
        if let Some(name) = template.and_then(RelativeTemplate::leading_fixed) {
            return name.to_string();
        }
        self.violations.push(format!(
            "type {:?}: template {:?} needs an explicit relation name",
            self.type_name,
            template.map(|t| t.to_string()).unwrap_or_default(),
        ));
        String::new()
    }

    fn kind(&mut self, kind: Option<&str>) -> Option<LiteralKind> {
        match kind {
            None => None,
            Some("uri") => Some(LiteralKind::Uri),
            Some("string") => Some(LiteralKind::String),
            Some("boolean") => Some(LiteralKind::Boolean),
            Some("number") => Some(LiteralKind::Number),
            Some(other) => {
                self.violations.push(format!(
                    "type {:?}: unknown literal kind {:?}",
                    self.type_name, other,
                ));
                None
            }
        }
    }
}

impl TypeCatalog {
    /// The built-in OAS 3.0 catalog.
    pub fn oas30() -> Result<Self, CatalogError> {
        Self::load(OAS30_CATALOG)
    }

    /// Parse and validate a catalog definition, reporting every violation
    /// found rather than only the first.
    pub fn load(definitions: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(definitions)?;
        let mut violations = Vec::new();
        let mut types = BTreeMap::new();

        for (name, raw_type) in &raw.types {
            let mut check = Check {
                type_name: name,
                violations: &mut violations,
            };

            let mut children = Vec::new();
            for (text, spec) in &raw_type.children {
                let template = check.template(text);
                let (type_name, relation) = match spec {
                    RawChild::Type(t) => (t.as_str(), None),
                    RawChild::Full {
                        type_name,
                        relation,
                    } => (type_name.as_str(), relation.as_deref()),
                };
                check.type_ref(type_name, &raw.types);
                if let Some(template) = template {
                    let relation = check.relation(relation, Some(&template));
                    children.push(ChildRelation {
                        template,
                        relation,
                        target: type_name.to_string(),
                    });
                }
            }

            let mut references = Vec::new();
            for (text, spec) in &raw_type.references {
                let template = check.template(text);
                let (type_name, relation, name_prefix) = match spec {
                    RawReference::Type(t) => (t.as_str(), None, None),
                    RawReference::Full {
                        type_name,
                        relation,
                        name_prefix,
                    } => (type_name.as_str(), relation.as_deref(), name_prefix.clone()),
                };
                check.type_ref(type_name, &raw.types);
                let relation = match relation {
                    Some(name) => name.to_string(),
                    None => "references".to_string(),
                };
                if let Some(template) = template {
                    references.push(ReferenceRelation {
                        template,
                        relation,
                        target: type_name.to_string(),
                        name_prefix,
                    });
                }
            }

            let mut implicit = Vec::new();
            for spec in &raw_type.implicit {
                let template = check.template(&spec.template);
                let field = check.template(&spec.field);
                let qualifier = spec.qualifier.as_deref().and_then(|q| check.template(q));
                check.type_ref(&spec.target_type, &raw.types);
                if let (Some(template), Some(field)) = (template, field) {
                    implicit.push(ImplicitRelation {
                        template,
                        relation: spec.relation.clone(),
                        target_type: spec.target_type.clone(),
                        field,
                        qualifier,
                        template_var: spec.template_var,
                        required: spec.required,
                    });
                }
            }

            let mut literals = Vec::new();
            for (text, spec) in &raw_type.literals {
                let template = check.template(text);
                let (relation, kind) = match spec {
                    RawLiteral::Relation(r) => (Some(r.as_str()), None),
                    RawLiteral::Full { relation, kind } => {
                        (Some(relation.as_str()), kind.as_deref())
                    }
                };
                let kind_hint = check.kind(kind);
                if let Some(template) = template {
                    let relation = check.relation(relation, Some(&template));
                    literals.push(LiteralRelation {
                        template,
                        relation,
                        kind_hint,
                    });
                }
            }

            let mut examples = Vec::new();
            for spec in &raw_type.examples {
                let template = check.template(&spec.template);
                let schema = check.template(&spec.schema);
                if let (Some(template), Some(schema)) = (template, schema) {
                    examples.push(ExampleRelation { template, schema });
                }
            }

            let mut unique_keys = Vec::new();
            for spec in &raw_type.unique_keys {
                let scope = check.template(&spec.scope);
                let fields: Vec<_> = spec
                    .fields
                    .iter()
                    .filter_map(|f| check.template(f))
                    .collect();
                if let Some(scope) = scope {
                    if fields.len() == spec.fields.len() {
                        unique_keys.push(UniqueKey { fields, scope });
                    }
                }
            }

            sort_by_specificity(&mut children, |c| &c.template);
            sort_by_specificity(&mut references, |r| &r.template);
            sort_by_specificity(&mut literals, |l| &l.template);

            types.insert(
                name.clone(),
                TypeMapping {
                    name: name.clone(),
                    children,
                    references,
                    implicit,
                    literals,
                    examples,
                    unique_keys,
                    extensible: raw_type.extensible,
                    ref_conflict: raw_type.ref_conflict,
                },
            );
        }

        if !violations.is_empty() {
            return Err(CatalogError::Integrity { violations });
        }
        Ok(Self {
            namespace: raw.namespace,
            context: raw.context,
            types,
        })
    }

    pub fn lookup(&self, type_name: &str) -> Result<&TypeMapping, CatalogError> {
        self.types
            .get(type_name)
            .ok_or_else(|| CatalogError::UnknownType {
                name: type_name.to_string(),
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeMapping> {
        self.types.values()
    }

    /// Semantic type of a concrete child position under `entry`, applying
    /// template-variable matching with longest-specific-match precedence
    /// over catch-all templates.
    pub fn resolve_child_type<'e>(
        &self,
        entry: &'e TypeMapping,
        pointer: &JsonPointer,
    ) -> Result<&'e str, CatalogError> {
        // Children are sorted most-specific first at load time.
        entry
            .children
            .iter()
            .find(|c| c.template.matches_pointer(pointer))
            .map(|c| c.target.as_str())
            .ok_or_else(|| CatalogError::NoChildType {
                type_name: entry.name.clone(),
                pointer: pointer.to_string(),
            })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context(&self) -> &ContextFields {
        &self.context
    }

    /// Absolute relation identifier in the catalog namespace.
    pub fn relation_iri(&self, relation: &str) -> String {
        format!("{}{}", self.namespace, relation)
    }
}

fn sort_by_specificity<T>(items: &mut [T], template: impl Fn(&T) -> &RelativeTemplate) {
    items.sort_by(|a, b| {
        let (ta, tb) = (template(a), template(b));
        tb.specificity()
            .cmp(&ta.specificity())
            .then_with(|| ta.to_string().cmp(&tb.to_string()))
    });
}
