//! Type service contract.
//!
//! Type inference happens elsewhere; the reconstruction engine only asks
//! questions. [`TypeEnv`] is the interface it asks them through: the type and
//! display name of a variable, the function's return type, whether a value of
//! one type used as another needs a cast (and which kind), and how a memory
//! offset on a typed base resolves to a field.
//!
//! Implementations are shared read-only between concurrently reconstructed
//! functions, hence the `Send + Sync` bound.
//!
//! [`StaticTypeEnv`] is a table-driven implementation for tests, tools and
//! benchmarks.

mod static_env;

use std::fmt;

pub use static_env::StaticTypeEnv;

use crate::ir::Variable;

/// A type as reported by the type service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSpec {
    /// Signed 64-bit integer
    Int,
    /// Unsigned 64-bit integer
    UInt,
    /// Single precision float
    Float,
    /// Symbol
    Symbol,
    /// Root of the object hierarchy, compatible with everything
    Object,
    /// Any other named type
    Named(String),
}

impl TypeSpec {
    /// Creates a named type, mapping the built-in names to their variants.
    #[must_use]
    pub fn named(name: &str) -> Self {
        match name {
            "int" => TypeSpec::Int,
            "uint" => TypeSpec::UInt,
            "float" => TypeSpec::Float,
            "symbol" => TypeSpec::Symbol,
            "object" => TypeSpec::Object,
            other => TypeSpec::Named(other.to_string()),
        }
    }

    /// Returns `true` for `int` and `uint`.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, TypeSpec::Int | TypeSpec::UInt)
    }

    /// Returns `true` for `float`.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, TypeSpec::Float)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Int => f.write_str("int"),
            TypeSpec::UInt => f.write_str("uint"),
            TypeSpec::Float => f.write_str("float"),
            TypeSpec::Symbol => f.write_str("symbol"),
            TypeSpec::Object => f.write_str("object"),
            TypeSpec::Named(name) => f.write_str(name),
        }
    }
}

/// Kind of explicit conversion needed to use a value as another type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coercion {
    /// No cast needed
    None,
    /// Value-changing numeric conversion, rendered `(the T x)`
    Numeric,
    /// Reinterpretation of the same bits, rendered `(the-as T x)`
    Representational,
}

/// A resolved field access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    /// Field names from the base outwards
    pub path: Vec<String>,
    /// Type of the accessed field, if known
    pub ty: Option<TypeSpec>,
}

/// Questions the reconstruction engine asks about types and names.
pub trait TypeEnv: Send + Sync {
    /// Returns the declared or inferred type of `var`, if known.
    fn variable_type(&self, var: &Variable) -> Option<TypeSpec>;

    /// Returns the display name of `var`.
    fn variable_name(&self, var: &Variable) -> String;

    /// Returns the declared return type of the function, if known.
    fn return_type(&self) -> Option<TypeSpec>;

    /// Decides how a value of type `actual` must be converted to be used as `desired`.
    ///
    /// The default treats equal types and `object` targets as compatible, integer
    /// to float (and back) as numeric, and everything else as representational.
    fn coercion(&self, desired: &TypeSpec, actual: &TypeSpec) -> Coercion {
        if desired == actual || *desired == TypeSpec::Object {
            Coercion::None
        } else if (desired.is_float() && actual.is_integer())
            || (desired.is_integer() && actual.is_float())
        {
            Coercion::Numeric
        } else {
            Coercion::Representational
        }
    }

    /// Resolves `offset` bytes into a value of type `base` to a field, if possible.
    fn field_access(&self, _base: &TypeSpec, _offset: i64, _size: u8) -> Option<FieldAccess> {
        None
    }

    /// Returns the string constant stored at `label`, if the label holds one.
    fn label_string(&self, _label: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Function;

    #[test]
    fn default_coercion_rules() {
        let env = StaticTypeEnv::new(&Function::new("f"));
        assert_eq!(env.coercion(&TypeSpec::Int, &TypeSpec::Int), Coercion::None);
        assert_eq!(env.coercion(&TypeSpec::Object, &TypeSpec::Int), Coercion::None);
        assert_eq!(
            env.coercion(&TypeSpec::Int, &TypeSpec::UInt),
            Coercion::Representational
        );
        assert_eq!(env.coercion(&TypeSpec::Float, &TypeSpec::Int), Coercion::Numeric);
    }

    #[test]
    fn named_maps_builtins() {
        assert_eq!(TypeSpec::named("uint"), TypeSpec::UInt);
        assert_eq!(TypeSpec::named("pair"), TypeSpec::Named("pair".into()));
        assert_eq!(TypeSpec::named("pair").to_string(), "pair");
    }
}
