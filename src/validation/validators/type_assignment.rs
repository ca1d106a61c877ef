use crate::symbol::{Initializer, LiteralKind, Symbol, SymbolTable, TypeReference};
use crate::types::SymbolKind;
use crate::validation::lookup::{Hierarchy, TypeLookup, simple_name};
use crate::validation::{
    ValidationError, ValidationOptions, ValidationResult, ValidationTier, Validator, builtins,
    codes,
};
use std::fmt;

const MAX_INFERENCE_DEPTH: usize = 8;

/// Static type of one side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeDescriptor {
    Primitive(String),
    Object(String),
    Collection {
        kind: String,
        arguments: Vec<TypeDescriptor>,
    },
    Void,
    Null,
    Unresolved(String),
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(name)
            | TypeDescriptor::Object(name)
            | TypeDescriptor::Unresolved(name) => f.write_str(name),
            TypeDescriptor::Collection { kind, arguments } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{kind}<{}>", args.join(","))
            }
            TypeDescriptor::Void => f.write_str("void"),
            TypeDescriptor::Null => f.write_str("null"),
        }
    }
}

/// Variable, field and property initializers must be assignable to the
/// declared type.
///
/// The initializer's type is inferred from literals, `new` expressions,
/// identifiers and member accesses. Anything that cannot be inferred or
/// resolved is accepted.
pub struct TypeAssignmentValidator;

impl Validator for TypeAssignmentValidator {
    fn id(&self) -> &'static str {
        "type-assignment"
    }

    fn name(&self) -> &'static str {
        "Type assignment"
    }

    fn tier(&self) -> ValidationTier {
        ValidationTier::Immediate
    }

    fn priority(&self) -> u32 {
        40
    }

    fn validate(&self, table: &SymbolTable, options: &ValidationOptions) -> ValidationResult {
        let checker = AssignmentChecker {
            lookup: TypeLookup::new(table, options),
            options,
        };
        let mut result = ValidationResult::ok();

        for symbol in table.symbols().iter().filter(|s| {
            matches!(
                s.kind,
                SymbolKind::Variable | SymbolKind::Field | SymbolKind::Property
            )
        }) {
            let (Some(declared), Some(initializer)) = (&symbol.type_ref, &symbol.initializer) else {
                continue;
            };

            let target = checker.describe(declared);
            let source = checker.infer(initializer, symbol, 0);
            if checker.assignable(&target, &source) {
                continue;
            }

            result.error(ValidationError::new(
                codes::ILLEGAL_ASSIGNMENT,
                format!("Illegal assignment from {source} to {target}"),
                symbol.initializer_range.unwrap_or(symbol.location),
            ));
        }

        result
    }
}

struct AssignmentChecker<'a> {
    lookup: TypeLookup<'a>,
    options: &'a ValidationOptions,
}

impl AssignmentChecker<'_> {
    fn describe(&self, type_ref: &TypeReference) -> TypeDescriptor {
        if type_ref.is_array {
            let element = TypeReference {
                is_array: false,
                ..type_ref.clone()
            };
            return TypeDescriptor::Collection {
                kind: "list".to_string(),
                arguments: vec![self.describe(&element)],
            };
        }

        let name = type_ref.name.trim();
        if name.eq_ignore_ascii_case("void") {
            return TypeDescriptor::Void;
        }
        if builtins::is_primitive(name) {
            return TypeDescriptor::Primitive(simple_name(name).to_string());
        }
        if builtins::is_collection(name) {
            return TypeDescriptor::Collection {
                kind: simple_name(name).to_lowercase(),
                arguments: type_ref.type_arguments.iter().map(|a| self.describe(a)).collect(),
            };
        }
        if builtins::is_builtin(name) {
            return TypeDescriptor::Object(simple_name(name).to_string());
        }

        match self.lookup.find(name).or_else(|| self.namespaced(name)) {
            Some(symbol) => TypeDescriptor::Object(symbol.name),
            None => TypeDescriptor::Unresolved(name.to_string()),
        }
    }

    /// Retry an unresolved name under the namespace of the file being checked.
    fn namespaced(&self, name: &str) -> Option<Symbol> {
        let manager = self.options.cross_file()?;
        if let Some(found) = manager.find_symbol_by_fqn(name).filter(|s| s.kind.is_type()) {
            return Some(found);
        }
        let namespace = self
            .lookup
            .table()
            .symbols()
            .iter()
            .find_map(|s| s.namespace.clone())?;
        manager.find_type(&format!("{namespace}.{name}"))
    }

    fn infer(&self, initializer: &Initializer, scope: &Symbol, depth: usize) -> TypeDescriptor {
        if depth > MAX_INFERENCE_DEPTH {
            return TypeDescriptor::Unresolved("?".to_string());
        }

        match initializer {
            Initializer::Literal(kind) => match kind {
                LiteralKind::Integer => TypeDescriptor::Primitive("Integer".to_string()),
                LiteralKind::Long => TypeDescriptor::Primitive("Long".to_string()),
                LiteralKind::Decimal => TypeDescriptor::Primitive("Decimal".to_string()),
                LiteralKind::String => TypeDescriptor::Primitive("String".to_string()),
                LiteralKind::Boolean => TypeDescriptor::Primitive("Boolean".to_string()),
                LiteralKind::Null => TypeDescriptor::Null,
            },
            Initializer::New(type_ref) => self.describe(type_ref),
            Initializer::Identifier(name) => match self.variable(name, scope) {
                Some(variable) => variable
                    .type_ref
                    .as_ref()
                    .map(|t| self.describe(t))
                    .unwrap_or_else(|| TypeDescriptor::Unresolved(name.clone())),
                None => TypeDescriptor::Unresolved(name.clone()),
            },
            Initializer::MethodCall { receiver, name } => {
                let owner = match receiver {
                    Some(receiver) => self.receiver_type(receiver, scope, depth),
                    None => self.lookup.table().enclosing_type(&scope.id).cloned(),
                };
                self.member_type(owner, name, SymbolKind::is_callable, depth)
            }
            Initializer::FieldAccess { receiver, name } => {
                let owner = self.receiver_type(receiver, scope, depth);
                self.member_type(
                    owner,
                    name,
                    |k| matches!(k, SymbolKind::Field | SymbolKind::Property),
                    depth,
                )
            }
            Initializer::Unknown => TypeDescriptor::Unresolved("?".to_string()),
        }
    }

    /// Declared type of a receiver expression. A bare identifier that is not
    /// a variable is taken as a type name for static access.
    fn receiver_type(&self, receiver: &Initializer, scope: &Symbol, depth: usize) -> Option<Symbol> {
        if let Initializer::Identifier(name) = receiver
            && self.variable(name, scope).is_none()
        {
            return self.lookup.find(name);
        }
        match self.infer(receiver, scope, depth + 1) {
            TypeDescriptor::Object(type_name) => self.lookup.find(&type_name),
            _ => None,
        }
    }

    fn member_type(
        &self,
        owner: Option<Symbol>,
        name: &str,
        kind: impl Fn(&SymbolKind) -> bool,
        depth: usize,
    ) -> TypeDescriptor {
        let Some(owner) = owner else {
            return TypeDescriptor::Unresolved(name.to_string());
        };
        if depth > MAX_INFERENCE_DEPTH {
            return TypeDescriptor::Unresolved(name.to_string());
        }
        self.lookup
            .member_named(&owner, name, |m| kind(&m.kind))
            .and_then(|m| m.type_ref)
            .map(|t| self.describe(&t))
            .unwrap_or_else(|| TypeDescriptor::Unresolved(name.to_string()))
    }

    /// Nearest variable, parameter, field or property named `name` visible
    /// from `scope`.
    fn variable(&self, name: &str, scope: &Symbol) -> Option<&Symbol> {
        let table = self.lookup.table();
        let parent = scope.parent_id.as_ref()?;
        table.ancestors(parent).into_iter().find_map(|container| {
            table.children_of(&container.id).find(|s| {
                s.id != scope.id
                    && s.is_named(name)
                    && matches!(
                        s.kind,
                        SymbolKind::Variable
                            | SymbolKind::Parameter
                            | SymbolKind::Field
                            | SymbolKind::Property
                    )
            })
        })
    }

    fn assignable(&self, target: &TypeDescriptor, source: &TypeDescriptor) -> bool {
        use TypeDescriptor::*;

        match (target, source) {
            (_, Null) | (Unresolved(_), _) | (_, Unresolved(_)) => true,
            (Void, _) | (_, Void) => false,
            (Object(t), _) if t.eq_ignore_ascii_case("object") => true,
            (Primitive(t), Primitive(s)) => {
                t.eq_ignore_ascii_case(s)
                    || builtins::widens_to(s, t)
                    || (s.eq_ignore_ascii_case("string") && t.eq_ignore_ascii_case("id"))
            }
            (
                Collection {
                    kind: target_kind,
                    arguments: target_args,
                },
                Collection {
                    kind: source_kind,
                    arguments: source_args,
                },
            ) => {
                target_kind == source_kind
                    && (target_args.is_empty()
                        || source_args.is_empty()
                        || (target_args.len() == source_args.len()
                            && target_args
                                .iter()
                                .zip(source_args)
                                .all(|(t, s)| self.assignable(t, s))))
            }
            (Object(t), Object(s)) => {
                if t.eq_ignore_ascii_case(s) {
                    return true;
                }
                match self.lookup.find(s) {
                    Some(symbol) => self.lookup.inherits_from(&symbol, t) != Hierarchy::DoesNotReach,
                    None => true,
                }
            }
            _ => false,
        }
    }
}
