//! Error types for document loading, identity, catalog, and resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading document files from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    InvalidYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported file type {extension:?} for {path}")]
    UnsupportedFileType { path: PathBuf, extension: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. } | Self::Read { .. } => 3,
            _ => 2, // parse errors
        }
    }
}

/// Errors registering documents or resolving identifiers.
///
/// All identity errors are fatal and abort the run before any graph
/// output is produced.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("duplicate logical identifier <{uri}>")]
    DuplicateIdentifier { uri: String },

    #[error("duplicate retrieval location <{url}>")]
    DuplicateLocation { url: String },

    #[error("no document registered for <{uri}>")]
    UnknownDocument { uri: String },

    #[error("URI prefix <{prefix}> must have a path ending in '/'")]
    MalformedPrefix { prefix: String },

    #[error("identifier <{value}> cannot be relative")]
    RelativeIdentifier { value: String },

    #[error("document identifier <{uri}> may not include a fragment")]
    FragmentInIdentifier { uri: String },
}

impl IdentityError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors loading or querying the type mapping catalog.
///
/// A malformed catalog is fatal at startup; it must not degrade into
/// partial graph construction.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Every violation found in one pass, not just the first.
    #[error("type mapping catalog is invalid:\n  {}", violations.join("\n  "))]
    Integrity { violations: Vec<String> },

    #[error("unknown semantic type {name:?}")]
    UnknownType { name: String },

    #[error("no child type mapped for pointer '{pointer}' under {type_name:?}")]
    NoChildType { type_name: String, pointer: String },

    #[error("invalid catalog data: {source}")]
    Data {
        #[from]
        source: serde_json::Error,
    },
}

impl CatalogError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Pointer and pointer-template syntax or evaluation errors.
#[derive(Debug, Error)]
pub enum PointerError {
    #[error("{input:?} is not a valid JSON pointer")]
    InvalidPointer { input: String },

    #[error("{input:?} is not a valid relative JSON pointer")]
    InvalidRelativePointer { input: String },

    #[error("{input:?} is not a valid pointer template")]
    InvalidTemplate { input: String },

    #[error("cannot step up {up} levels from '{from}'")]
    TooManyStepsUp { up: u32, from: String },

    #[error("cannot adjust non-integer index at '{pointer}'")]
    NonIntegerIndex { pointer: String },
}

/// Reference resolution errors.
///
/// Fatal for the document chain that contains the reference; independent
/// chains keep processing, but the overall run is reported as failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("reference {reference:?} at {location} does not resolve to any registered document")]
    UnresolvableReference { location: String, reference: String },

    #[error(
        "reference {reference:?} at {location} matches <{registered}> \
         only by appending {suffix:?}, and no stripping rule applies"
    )]
    SuffixMismatch {
        location: String,
        reference: String,
        registered: String,
        suffix: String,
    },

    #[error("schema target <{uri}> has no determinable dialect")]
    DialectUndeclared { uri: String },

    #[error(
        "dynamic reference {reference:?} at {location} requires \
         document-driven processing of the documents on its evaluation path"
    )]
    DynamicScopeRequiresDocument { location: String, reference: String },

    #[error("invalid reference value {reference:?} at {location}: {message}")]
    InvalidReference {
        location: String,
        reference: String,
        message: String,
    },
}

impl ResolveError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Document-level version and entry-point errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("no registered document contains an 'openapi' field")]
    NoEntryDocument,

    #[error("OAS v{version} is not supported")]
    UnsupportedVersion { version: String },

    #[error("{version:?} is not a valid OAS version string")]
    InvalidVersion { version: String },

    #[error("document <{uri}> declares v{document_version} but v{requested_version} was requested")]
    VersionConflict {
        uri: String,
        document_version: String,
        requested_version: String,
    },
}

impl DocumentError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}
