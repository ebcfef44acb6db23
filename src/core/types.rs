//! Type descriptors and the resolver that reconciles them at composition time.
//!
//! A [`TypeDesc`] is a plain value describing the declared input or output of a
//! node. Resolution has two halves:
//! - [`match_types`] walks a generic descriptor against a specific one and
//!   collects a [`BindingMap`] for every variable it meets
//! - [`substitute`] rewrites a generic descriptor with those bindings
//!
//! Matching is permissive by default: disagreeing shapes simply contribute no
//! bindings. Strict matching turns the same situations into
//! [`ComposeError::TypeMismatch`].

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::core::error::{ComposeError, TypeParseError};

/// Name of the parametrized descriptor used for diverging outputs.
pub const TUPLE: &str = "tuple";

/// Name of the parametrized descriptor for "one of" outputs.
pub const UNION: &str = "union";

/// Concrete descriptor of the absent value.
pub const NULL: &str = "null";

/// A recursive description of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum TypeDesc {
    Concrete(String),
    Variable(String),
    Parametrized(String, Vec<TypeDesc>),
}

/// Assignment of descriptors to type variables, keyed by variable name.
pub type BindingMap = BTreeMap<String, TypeDesc>;

impl TypeDesc {
    pub fn concrete(name: impl Into<String>) -> Self {
        TypeDesc::Concrete(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        TypeDesc::Variable(name.into())
    }

    pub fn param(name: impl Into<String>, args: Vec<TypeDesc>) -> Self {
        TypeDesc::Parametrized(name.into(), args)
    }

    pub fn tuple(items: Vec<TypeDesc>) -> Self {
        TypeDesc::Parametrized(TUPLE.to_string(), items)
    }

    pub fn null() -> Self {
        TypeDesc::Concrete(NULL.to_string())
    }

    /// One of `members`. Nested unions are flattened and duplicates dropped,
    /// keeping first-seen order; a single remaining member stands for itself.
    pub fn union(members: impl IntoIterator<Item = TypeDesc>) -> Self {
        let mut flat: Vec<TypeDesc> = Vec::new();
        for member in members {
            let nested = match member {
                TypeDesc::Parametrized(name, args) if name == UNION => args,
                other => vec![other],
            };
            for member in nested {
                if !flat.contains(&member) {
                    flat.push(member);
                }
            }
        }
        match flat.len() {
            1 => flat.remove(0),
            _ => TypeDesc::Parametrized(UNION.to_string(), flat),
        }
    }

    /// True for `null` and for unions admitting it.
    pub fn is_nullable(&self) -> bool {
        match self {
            TypeDesc::Concrete(name) => name == NULL,
            TypeDesc::Parametrized(name, args) if name == UNION => {
                args.iter().any(TypeDesc::is_nullable)
            }
            _ => false,
        }
    }

    /// True when no variable occurs anywhere in the descriptor.
    pub fn is_resolved(&self) -> bool {
        match self {
            TypeDesc::Concrete(_) => true,
            TypeDesc::Variable(_) => false,
            TypeDesc::Parametrized(_, args) => args.iter().all(TypeDesc::is_resolved),
        }
    }

    fn shape_name(&self) -> &'static str {
        match self {
            TypeDesc::Concrete(_) => "concrete",
            TypeDesc::Variable(_) => "variable",
            TypeDesc::Parametrized(..) => "parametrized",
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Concrete(name) | TypeDesc::Variable(name) => write!(f, "{name}"),
            TypeDesc::Parametrized(name, args) => {
                write!(f, "{name}[")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Matches `generic` against `specific`, returning the variable bindings that
/// make them agree.
///
/// A variable on the generic side binds to whatever it faces. Parametrized
/// descriptors with the same name and arity are matched argument-wise. A
/// variable on the specific side agrees with anything without binding.
/// Anything else is a shape disagreement: ignored when `strict` is false,
/// reported when it is true. Strict mode also rejects a variable bound to two
/// different descriptors; permissive mode keeps the later binding.
pub fn match_types(
    generic: &TypeDesc,
    specific: &TypeDesc,
    strict: bool,
) -> Result<BindingMap, ComposeError> {
    match (generic, specific) {
        (TypeDesc::Variable(name), _) => Ok(BindingMap::from([(name.clone(), specific.clone())])),
        (_, TypeDesc::Variable(_)) => Ok(BindingMap::new()),
        (TypeDesc::Concrete(a), TypeDesc::Concrete(b)) if a == b => Ok(BindingMap::new()),
        (TypeDesc::Parametrized(g_name, g_args), TypeDesc::Parametrized(s_name, s_args))
            if g_name == s_name && g_args.len() == s_args.len() =>
        {
            let mut bindings = BindingMap::new();
            for (g, s) in g_args.iter().zip(s_args) {
                for (var, bound) in match_types(g, s, strict)? {
                    if strict {
                        if let Some(previous) = bindings.get(&var).filter(|p| **p != bound) {
                            return Err(ComposeError::TypeMismatch {
                                generic: generic.clone(),
                                specific: specific.clone(),
                                reason: format!(
                                    "variable {var} bound to both {previous} and {bound}"
                                ),
                            });
                        }
                    }
                    bindings.insert(var, bound);
                }
            }
            Ok(bindings)
        }
        _ => {
            let reason = match (generic, specific) {
                (TypeDesc::Parametrized(_, g_args), TypeDesc::Parametrized(_, s_args))
                    if g_args.len() != s_args.len() =>
                {
                    format!("expected {} arguments, found {}", g_args.len(), s_args.len())
                }
                _ if generic.shape_name() == specific.shape_name() => "names differ".to_string(),
                _ => format!(
                    "{} descriptor faces a {} one",
                    generic.shape_name(),
                    specific.shape_name()
                ),
            };
            if strict {
                return Err(ComposeError::TypeMismatch {
                    generic: generic.clone(),
                    specific: specific.clone(),
                    reason,
                });
            }
            log::warn!("Ignoring type mismatch between {generic} and {specific}: {reason}");
            Ok(BindingMap::new())
        }
    }
}

/// Replaces every bound variable in `generic`. Unbound variables and concrete
/// descriptors are left as they are.
pub fn substitute(generic: &TypeDesc, bindings: &BindingMap) -> TypeDesc {
    match generic {
        TypeDesc::Variable(name) => bindings.get(name).cloned().unwrap_or_else(|| generic.clone()),
        TypeDesc::Concrete(_) => generic.clone(),
        TypeDesc::Parametrized(name, args) => TypeDesc::Parametrized(
            name.clone(),
            args.iter().map(|arg| substitute(arg, bindings)).collect(),
        ),
    }
}

/// Variables are written as one uppercase letter, optionally followed by digits.
fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase()) && chars.all(|c| c.is_ascii_digit())
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn unexpected(&self, position: usize, found: char) -> TypeParseError {
        TypeParseError::UnexpectedChar {
            input: self.input.to_string(),
            position,
            found,
        }
    }

    fn end(&self) -> TypeParseError {
        TypeParseError::UnexpectedEnd(self.input.to_string())
    }

    fn ident(&mut self) -> Result<String, TypeParseError> {
        let mut name = String::new();
        while let Some(&(position, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                name.push(c);
                self.chars.next();
            } else if name.is_empty() {
                return Err(self.unexpected(position, c));
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.end());
        }
        Ok(name)
    }

    fn desc(&mut self) -> Result<TypeDesc, TypeParseError> {
        self.skip_whitespace();
        let name = self.ident()?;
        self.skip_whitespace();
        if self.chars.next_if(|(_, c)| *c == '[').is_none() {
            return Ok(if is_variable_name(&name) {
                TypeDesc::Variable(name)
            } else {
                TypeDesc::Concrete(name)
            });
        }

        let mut args = vec![self.desc()?];
        loop {
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => args.push(self.desc()?),
                Some((_, ']')) => break,
                Some((position, found)) => return Err(self.unexpected(position, found)),
                None => return Err(self.end()),
            }
        }
        Ok(TypeDesc::Parametrized(name, args))
    }

    fn finish(mut self, desc: TypeDesc) -> Result<TypeDesc, TypeParseError> {
        self.skip_whitespace();
        match self.chars.next() {
            None => Ok(desc),
            Some((position, found)) => Err(self.unexpected(position, found)),
        }
    }
}

impl FromStr for TypeDesc {
    type Err = TypeParseError;

    /// Parses `float`, `T`, `dict[str, list[T]]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(s);
        let desc = parser.desc()?;
        parser.finish(desc)
    }
}

/// The declared contract of a node: what it accepts and what it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Signature {
    pub input: TypeDesc,
    pub output: TypeDesc,
}

impl Signature {
    pub fn new(input: TypeDesc, output: TypeDesc) -> Self {
        Self { input, output }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.input, self.output)
    }
}

impl FromStr for Signature {
    type Err = TypeParseError;

    /// Parses shorthand syntax: "float -> list[T]"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split("->").collect();
        if parts.len() != 2 {
            return Err(TypeParseError::MissingArrow(s.to_string()));
        }
        Ok(Signature {
            input: parts[0].parse()?,
            output: parts[1].parse()?,
        })
    }
}

/// Macro for rapid signature creation: signature!("float -> str")
#[macro_export]
macro_rules! signature {
    ($s:expr) => {
        $s.parse::<$crate::Signature>().expect("Invalid signature shorthand")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TypeDesc {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(t("float"), TypeDesc::concrete("float"));
        assert_eq!(t("T"), TypeDesc::var("T"));
        assert_eq!(t("T2"), TypeDesc::var("T2"));
        assert_eq!(t("Tx"), TypeDesc::concrete("Tx"));
        assert_eq!(
            t("dict[str, list[T]]"),
            TypeDesc::param(
                "dict",
                vec![TypeDesc::concrete("str"), TypeDesc::param("list", vec![TypeDesc::var("T")])]
            )
        );
        assert_eq!(t(" dict[ str ,T ] ").to_string(), "dict[str, T]");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("".parse::<TypeDesc>(), Err(TypeParseError::UnexpectedEnd(_))));
        assert!(matches!("list[int".parse::<TypeDesc>(), Err(TypeParseError::UnexpectedEnd(_))));
        assert!(matches!(
            "list]int".parse::<TypeDesc>(),
            Err(TypeParseError::UnexpectedChar { found: ']', position: 4, .. })
        ));
        assert!(matches!(
            "float".parse::<Signature>(),
            Err(TypeParseError::MissingArrow(_))
        ));
    }

    #[test]
    fn test_signature_shorthand() {
        let sig: Signature = "float -> tuple[str, T]".parse().unwrap();
        assert_eq!(sig.input, TypeDesc::concrete("float"));
        assert_eq!(sig.output.to_string(), "tuple[str, T]");
        assert_eq!(crate::signature!("T -> T").to_string(), "T -> T");
    }

    #[test]
    fn test_match_variable_binds_anything() {
        let bindings = match_types(&t("T"), &t("dict[str, int]"), true).unwrap();
        assert_eq!(bindings.get("T"), Some(&t("dict[str, int]")));
    }

    #[test]
    fn test_match_parametrized_recurses() {
        let bindings = match_types(&t("dict[K, list[V]]"), &t("dict[str, list[int]]"), true).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings["K"], t("str"));
        assert_eq!(bindings["V"], t("int"));
    }

    #[test]
    fn test_permissive_mismatch_is_empty() {
        assert!(match_types(&t("list[T]"), &t("float"), false).unwrap().is_empty());
        assert!(match_types(&t("list[T]"), &t("dict[str, int]"), false).unwrap().is_empty());
        assert!(match_types(&t("float"), &t("str"), false).unwrap().is_empty());
    }

    #[test]
    fn test_permissive_mismatch_only_drops_the_disagreeing_argument() {
        let bindings = match_types(&t("dict[T, int]"), &t("dict[str, float]"), false).unwrap();
        assert_eq!(bindings, BindingMap::from([("T".to_string(), t("str"))]));
    }

    #[test]
    fn test_strict_mismatch_errors() {
        let err = match_types(&t("list[T]"), &t("set[int]"), true).unwrap_err();
        assert!(matches!(err, ComposeError::TypeMismatch { .. }));

        let err = match_types(&t("dict[T, T]"), &t("dict[int, str]"), true).unwrap_err();
        match err {
            ComposeError::TypeMismatch { reason, .. } => assert!(reason.contains("bound to both")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_specific_variable_agrees() {
        assert!(match_types(&t("float"), &t("T"), true).unwrap().is_empty());
    }

    #[test]
    fn test_substitute_leaves_unbound() {
        let bindings = BindingMap::from([("T".to_string(), t("int"))]);
        assert_eq!(substitute(&t("dict[T, U]"), &bindings), t("dict[int, U]"));
        assert_eq!(substitute(&t("str"), &bindings), t("str"));
        assert!(!t("dict[int, U]").is_resolved());
        assert!(t("dict[int, str]").is_resolved());
    }

    #[test]
    fn test_round_trip_for_compatible_shapes() {
        let cases = [
            ("T", "float"),
            ("list[T]", "list[dict[str, int]]"),
            ("dict[K, tuple[V, K]]", "dict[str, tuple[int, str]]"),
            ("float", "float"),
        ];
        for (generic, specific) in cases {
            let (generic, specific) = (t(generic), t(specific));
            let bindings = match_types(&generic, &specific, true).unwrap();
            assert_eq!(substitute(&generic, &bindings), specific);
        }
    }

    #[test]
    fn test_union_flattens_and_dedups() {
        assert_eq!(TypeDesc::union([t("float"), t("float")]), t("float"));
        assert_eq!(
            TypeDesc::union([t("str"), t("float"), t("str")]),
            t("union[str, float]")
        );
        assert_eq!(
            TypeDesc::union([t("union[float, str]"), TypeDesc::null(), t("float")]),
            t("union[float, str, null]")
        );
    }

    #[test]
    fn test_nullable() {
        assert!(TypeDesc::null().is_nullable());
        assert!(t("union[float, null]").is_nullable());
        assert!(!t("union[float, str]").is_nullable());
        assert!(!t("list[null]").is_nullable());
        assert!(!t("T").is_nullable());
    }
}
