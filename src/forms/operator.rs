//! Operators of generic elements and the operator name table.

use std::collections::HashMap;

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{forms::FormId, ir::ConditionKind};

/// Built-in operators with a fixed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum FixedOperatorKind {
    // ====================================================================
    // Reinterpretation
    // ====================================================================
    #[strum(serialize = "gpr->fpr")]
    GprToFpr,
    #[strum(serialize = "fpr->gpr")]
    FprToGpr,

    // ====================================================================
    // Arithmetic
    // ====================================================================
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "mod")]
    Mod,
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "ash")]
    Ash,
    #[strum(serialize = "sqrtf")]
    Sqrt,
    #[strum(serialize = "fabs")]
    FloatAbs,
    #[strum(serialize = "fmin")]
    FloatMin,
    #[strum(serialize = "fmax")]
    FloatMax,

    // ====================================================================
    // Bitwise
    // ====================================================================
    #[strum(serialize = "logand")]
    LogAnd,
    #[strum(serialize = "logior")]
    LogIor,
    #[strum(serialize = "logxor")]
    LogXor,
    #[strum(serialize = "lognor")]
    LogNor,
    #[strum(serialize = "lognot")]
    LogNot,
    #[strum(serialize = "shl")]
    Shl,
    #[strum(serialize = "sar")]
    Sar,
    #[strum(serialize = "shr")]
    Shr,

    // ====================================================================
    // Misc
    // ====================================================================
    #[strum(serialize = "set-on-less-than")]
    SetOnLessThan,
    #[strum(serialize = "set-on-less-than-unsigned")]
    SetOnLessThanUnsigned,
    #[strum(serialize = "rtype-of")]
    TypeOf,
    #[strum(serialize = "&")]
    AddressOf,
}

/// Operator of a [`GenericElement`](crate::forms::GenericElement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericOperator {
    /// A built-in operator
    Fixed(FixedOperatorKind),
    /// A comparison used as a value
    Condition(ConditionKind),
    /// A call of the function value held in the form
    Function(FormId),
}

impl GenericOperator {
    /// Returns the fixed operator kind, if this is one.
    #[must_use]
    pub fn fixed(&self) -> Option<FixedOperatorKind> {
        match self {
            GenericOperator::Fixed(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Names used to render fixed operators.
///
/// Constructed explicitly and carried in the
/// [`EngineConfig`](crate::engine::EngineConfig), so concurrent reconstructions
/// share one immutable table instead of a process-wide registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorTable {
    names: HashMap<FixedOperatorKind, String>,
}

impl Default for OperatorTable {
    fn default() -> Self {
        let names = FixedOperatorKind::iter()
            .map(|kind| (kind, kind.to_string()))
            .collect();
        OperatorTable { names }
    }
}

impl OperatorTable {
    /// Creates the table with the built-in names.
    #[must_use]
    pub fn new() -> Self {
        OperatorTable::default()
    }

    /// Returns a copy of the table with `kind` renamed to `name`.
    #[must_use]
    pub fn with_name(mut self, kind: FixedOperatorKind, name: &str) -> Self {
        self.names.insert(kind, name.to_string());
        self
    }

    /// Returns the display name of `kind`.
    #[must_use]
    pub fn name(&self, kind: FixedOperatorKind) -> &str {
        match self.names.get(&kind) {
            Some(name) => name,
            None => <&'static str>::from(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_operator() {
        let table = OperatorTable::new();
        for kind in FixedOperatorKind::iter() {
            assert!(!table.name(kind).is_empty());
        }
        assert_eq!(table.name(FixedOperatorKind::LogIor), "logior");
        assert_eq!(FixedOperatorKind::COUNT, FixedOperatorKind::iter().count());
    }

    #[test]
    fn renamed_operator() {
        let table = OperatorTable::new().with_name(FixedOperatorKind::Shl, "sll");
        assert_eq!(table.name(FixedOperatorKind::Shl), "sll");
        assert_eq!(table.name(FixedOperatorKind::Sar), "sar");
    }
}
