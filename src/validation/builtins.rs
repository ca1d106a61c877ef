//! Names the language provides without any declaration in the workspace.

/// Value types. Compared case-insensitively.
pub const PRIMITIVES: &[&str] = &[
    "blob", "boolean", "date", "datetime", "decimal", "double", "id", "integer", "long",
    "string", "time",
];

pub const COLLECTIONS: &[&str] = &["list", "set", "map"];

/// Built-in reference types and system namespaces.
const SYSTEM_TYPES: &[&str] = &[
    "object", "void", "sobject", "iterable", "iterator", "type", "exception", "system",
    "database", "schema", "json", "jsonparser", "jsongenerator", "math", "limits", "test",
    "userinfo", "pattern", "matcher", "url", "crypto", "encodingutil", "http", "httprequest",
    "httpresponse", "queueable", "schedulable", "comparable", "callable",
];

/// Exceptions shipped with the runtime.
const SYSTEM_EXCEPTIONS: &[&str] = &[
    "exception", "dmlexception", "queryexception", "nullpointerexception",
    "listexception", "mathexception", "typeexception", "stringexception",
    "jsonexception", "calloutexception", "limitexception", "securityexception",
    "noaccessexception", "illegalargumentexception", "unexpectedexception",
    "finalexception", "invalidparametervalueexception", "serializationexception",
    "asyncexception", "handledexception", "sobjectexception", "emailexception",
];

const SYSTEM_NAMESPACE: &str = "system.";

fn normalize(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_prefix(SYSTEM_NAMESPACE) {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

pub fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&normalize(name).as_str())
}

pub fn is_collection(name: &str) -> bool {
    COLLECTIONS.contains(&normalize(name).as_str())
}

pub fn is_builtin_exception(name: &str) -> bool {
    SYSTEM_EXCEPTIONS.contains(&normalize(name).as_str())
}

/// Whether `name` resolves without any workspace declaration.
/// `System.` qualified spellings are accepted.
pub fn is_builtin(name: &str) -> bool {
    let name = normalize(name);
    PRIMITIVES.contains(&name.as_str())
        || COLLECTIONS.contains(&name.as_str())
        || SYSTEM_TYPES.contains(&name.as_str())
        || SYSTEM_EXCEPTIONS.contains(&name.as_str())
}

/// Numeric widening: can a value of `from` be assigned to `to` without a cast?
pub fn widens_to(from: &str, to: &str) -> bool {
    let from = normalize(from);
    let to = normalize(to);
    match from.as_str() {
        "integer" => matches!(to.as_str(), "long" | "decimal" | "double"),
        "long" => matches!(to.as_str(), "decimal" | "double"),
        "decimal" => to == "double",
        _ => false,
    }
}
