//! Argument and return types, and the subtype relation between them

use std::fmt;

/// A (possibly nested) schema type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Tensor,
    Int,
    SymInt,
    Float,
    Complex,
    Bool,
    Str,
    /// `Scalar`: any of int, float or complex
    Number,
    Any,
    NoneType,
    /// Every other nominal type: enums such as `ScalarType`, class types, type variables
    Named(String),
    Optional(Box<TypeKind>),
    List(Box<TypeKind>),
    Tuple(Vec<TypeKind>),
    Dict(Box<TypeKind>, Box<TypeKind>),
    Future(Box<TypeKind>),
}

impl TypeKind {
    /// Resolve a bare type identifier
    pub fn from_ident(ident: &str) -> Self {
        match ident {
            "Tensor" => TypeKind::Tensor,
            "int" => TypeKind::Int,
            "SymInt" => TypeKind::SymInt,
            "float" => TypeKind::Float,
            "complex" => TypeKind::Complex,
            "bool" => TypeKind::Bool,
            "str" => TypeKind::Str,
            "Scalar" => TypeKind::Number,
            "Any" => TypeKind::Any,
            "NoneType" => TypeKind::NoneType,
            other => TypeKind::Named(other.to_string()),
        }
    }

    pub fn optional(inner: TypeKind) -> Self {
        TypeKind::Optional(Box::new(inner))
    }

    pub fn list(elem: TypeKind) -> Self {
        TypeKind::List(Box::new(elem))
    }

    /// The type with one level of `Optional` removed
    pub fn strip_optional(&self) -> &TypeKind {
        match self {
            TypeKind::Optional(inner) => inner,
            other => other,
        }
    }

    /// Whether a value of `self` can be used wherever `other` is expected
    pub fn is_subtype_of(&self, other: &TypeKind) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (_, TypeKind::Any) => true,
            (TypeKind::NoneType, TypeKind::Optional(_)) => true,
            (TypeKind::Optional(a), TypeKind::Optional(b)) => a.is_subtype_of(b),
            (TypeKind::Optional(_), _) => false,
            (a, TypeKind::Optional(b)) => a.is_subtype_of(b),
            (TypeKind::Int | TypeKind::Float | TypeKind::Complex, TypeKind::Number) => true,
            (TypeKind::Int, TypeKind::SymInt) => true,
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype_of(y))
            }
            (TypeKind::Future(a), TypeKind::Future(b)) => a.is_subtype_of(b),
            _ => false,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Tensor => f.write_str("Tensor"),
            TypeKind::Int => f.write_str("int"),
            TypeKind::SymInt => f.write_str("SymInt"),
            TypeKind::Float => f.write_str("float"),
            TypeKind::Complex => f.write_str("complex"),
            TypeKind::Bool => f.write_str("bool"),
            TypeKind::Str => f.write_str("str"),
            TypeKind::Number => f.write_str("Scalar"),
            TypeKind::Any => f.write_str("Any"),
            TypeKind::NoneType => f.write_str("NoneType"),
            TypeKind::Named(name) => f.write_str(name),
            TypeKind::Optional(inner) => write!(f, "{}?", inner),
            TypeKind::List(elem) => write!(f, "{}[]", elem),
            TypeKind::Tuple(elems) => {
                f.write_str("(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                f.write_str(")")
            }
            TypeKind::Dict(key, value) => write!(f, "Dict({}, {})", key, value),
            TypeKind::Future(inner) => write!(f, "Future({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_widening() {
        let opt_tensor = TypeKind::optional(TypeKind::Tensor);
        assert!(TypeKind::Tensor.is_subtype_of(&opt_tensor));
        assert!(TypeKind::NoneType.is_subtype_of(&opt_tensor));
        assert!(!opt_tensor.is_subtype_of(&TypeKind::Tensor));
    }

    #[test]
    fn test_numbers() {
        assert!(TypeKind::Int.is_subtype_of(&TypeKind::Number));
        assert!(TypeKind::Float.is_subtype_of(&TypeKind::Number));
        assert!(!TypeKind::Bool.is_subtype_of(&TypeKind::Number));
        assert!(!TypeKind::Number.is_subtype_of(&TypeKind::Int));
        assert!(TypeKind::Int.is_subtype_of(&TypeKind::SymInt));
        assert!(!TypeKind::SymInt.is_subtype_of(&TypeKind::Int));
    }

    #[test]
    fn test_lists_are_invariant() {
        let ints = TypeKind::list(TypeKind::Int);
        let scalars = TypeKind::list(TypeKind::Number);
        assert!(!ints.is_subtype_of(&scalars));
        assert!(ints.is_subtype_of(&TypeKind::Any));
    }

    #[test]
    fn test_tuples_are_covariant() {
        let a = TypeKind::Tuple(vec![TypeKind::Tensor, TypeKind::Int]);
        let b = TypeKind::Tuple(vec![TypeKind::optional(TypeKind::Tensor), TypeKind::Number]);
        assert!(a.is_subtype_of(&b));
        assert!(!b.is_subtype_of(&a));
    }

    #[test]
    fn test_named_types_compare_by_name() {
        let a = TypeKind::from_ident("ScalarType");
        assert!(a.is_subtype_of(&TypeKind::Named("ScalarType".into())));
        assert!(!a.is_subtype_of(&TypeKind::Named("Layout".into())));
    }
}
