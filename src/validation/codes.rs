//! Stable error codes. The surrounding server maps these to localized text.

pub const DUPLICATE_METHOD: &str = "DUPLICATE_METHOD";
pub const GLOBAL_DEPRECATED_TYPE: &str = "GLOBAL_DEPRECATED_TYPE";
pub const UNRESOLVED_TYPE: &str = "UNRESOLVED_TYPE";
pub const INVALID_CLASS: &str = "INVALID_CLASS";
pub const EXCEPTION_NAME_MISSING_SUFFIX: &str = "EXCEPTION_NAME_MISSING_SUFFIX";
pub const NON_EXCEPTION_NAME_HAS_SUFFIX: &str = "NON_EXCEPTION_NAME_HAS_SUFFIX";
pub const INNER_TYPE_NAME_CONFLICT: &str = "INNER_TYPE_NAME_CONFLICT";
pub const TYPE_SHADOWED_BY_VARIABLE: &str = "TYPE_SHADOWED_BY_VARIABLE";
pub const ILLEGAL_ASSIGNMENT: &str = "ILLEGAL_ASSIGNMENT";

pub const ALL: [&str; 9] = [
    DUPLICATE_METHOD,
    GLOBAL_DEPRECATED_TYPE,
    UNRESOLVED_TYPE,
    INVALID_CLASS,
    EXCEPTION_NAME_MISSING_SUFFIX,
    NON_EXCEPTION_NAME_HAS_SUFFIX,
    INNER_TYPE_NAME_CONFLICT,
    TYPE_SHADOWED_BY_VARIABLE,
    ILLEGAL_ASSIGNMENT,
];

/// English fallback text for a code.
pub fn describe(code: &str) -> Option<&'static str> {
    let text = match code {
        DUPLICATE_METHOD => "Method already defined",
        GLOBAL_DEPRECATED_TYPE => "Global member uses a deprecated type and must be deprecated",
        UNRESOLVED_TYPE => "Type cannot be resolved",
        INVALID_CLASS => "Type cannot be constructed",
        EXCEPTION_NAME_MISSING_SUFFIX => "Exception class names must end with 'Exception'",
        NON_EXCEPTION_NAME_HAS_SUFFIX => "Only exception classes may end with 'Exception'",
        INNER_TYPE_NAME_CONFLICT => "Inner type name conflicts with an enclosing declaration",
        TYPE_SHADOWED_BY_VARIABLE => "Type name is shadowed by a variable",
        ILLEGAL_ASSIGNMENT => "Illegal assignment",
        _ => return None,
    };
    Some(text)
}
