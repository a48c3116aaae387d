//! Branch and comparison conditions.
//!
//! A [`ConditionKind`] names a test; [`Condition`] pairs it with its operands.
//! Kinds that compare against zero or read the float flag take fewer explicit
//! operands, see [`ConditionKind::arg_count`].

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::ir::{RegSet, Register, SimpleAtom};

/// The test performed by a branch or a materialized comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum ConditionKind {
    // ====================================================================
    // Unconditional
    // ====================================================================
    Always,
    Never,

    // ====================================================================
    // Two operands
    // ====================================================================
    Equal,
    NotEqual,
    LessThanSigned,
    GreaterThanSigned,
    LessOrEqualSigned,
    GreaterOrEqualSigned,
    LessThanUnsigned,
    GreaterThanUnsigned,
    LessOrEqualUnsigned,
    GreaterOrEqualUnsigned,

    // ====================================================================
    // One operand, implicit zero / false
    // ====================================================================
    Zero,
    NonZero,
    Truthy,
    False,
    LessThanZero,
    GreaterThanZero,
    LessOrEqualZero,
    GreaterOrEqualZero,

    // ====================================================================
    // Float compares
    // ====================================================================
    FloatEqual,
    FloatNotEqual,
    FloatLessThan,
    FloatLessOrEqual,
    FloatGreaterThan,
    FloatGreaterOrEqual,

    // ====================================================================
    // Float flag (reads fcc)
    // ====================================================================
    FloatFlagTrue,
    FloatFlagFalse,
}

impl ConditionKind {
    /// Returns the logically negated condition.
    ///
    /// `invert` is an involution: `k.invert().invert() == k` for every kind.
    #[must_use]
    pub fn invert(self) -> ConditionKind {
        use ConditionKind::*;
        match self {
            Always => Never,
            Never => Always,
            Equal => NotEqual,
            NotEqual => Equal,
            LessThanSigned => GreaterOrEqualSigned,
            GreaterOrEqualSigned => LessThanSigned,
            GreaterThanSigned => LessOrEqualSigned,
            LessOrEqualSigned => GreaterThanSigned,
            LessThanUnsigned => GreaterOrEqualUnsigned,
            GreaterOrEqualUnsigned => LessThanUnsigned,
            GreaterThanUnsigned => LessOrEqualUnsigned,
            LessOrEqualUnsigned => GreaterThanUnsigned,
            Zero => NonZero,
            NonZero => Zero,
            Truthy => False,
            False => Truthy,
            LessThanZero => GreaterOrEqualZero,
            GreaterOrEqualZero => LessThanZero,
            GreaterThanZero => LessOrEqualZero,
            LessOrEqualZero => GreaterThanZero,
            FloatEqual => FloatNotEqual,
            FloatNotEqual => FloatEqual,
            FloatLessThan => FloatGreaterOrEqual,
            FloatGreaterOrEqual => FloatLessThan,
            FloatGreaterThan => FloatLessOrEqual,
            FloatLessOrEqual => FloatGreaterThan,
            FloatFlagTrue => FloatFlagFalse,
            FloatFlagFalse => FloatFlagTrue,
        }
    }

    /// Number of explicit operands.
    #[must_use]
    pub fn arg_count(self) -> usize {
        use ConditionKind::*;
        match self {
            Always | Never | FloatFlagTrue | FloatFlagFalse => 0,
            Zero | NonZero | Truthy | False | LessThanZero | GreaterThanZero
            | LessOrEqualZero | GreaterOrEqualZero => 1,
            _ => 2,
        }
    }

    /// Returns `true` for comparisons of float operands, including the flag kinds.
    #[must_use]
    pub fn is_float(self) -> bool {
        use ConditionKind::*;
        matches!(
            self,
            FloatEqual
                | FloatNotEqual
                | FloatLessThan
                | FloatLessOrEqual
                | FloatGreaterThan
                | FloatGreaterOrEqual
                | FloatFlagTrue
                | FloatFlagFalse
        )
    }

    /// Returns `true` if the kind compares against an implicit zero.
    #[must_use]
    pub fn compares_to_zero(self) -> bool {
        use ConditionKind::*;
        matches!(
            self,
            LessThanZero | GreaterThanZero | LessOrEqualZero | GreaterOrEqualZero
        )
    }

    /// Operator used when the test is rendered.
    ///
    /// Kinds that compare against zero share the operator of their two-operand
    /// counterpart and render the zero explicitly.
    #[must_use]
    pub fn operator(self) -> &'static str {
        use ConditionKind::*;
        match self {
            Always => "#t",
            Never => "#f",
            Equal | FloatEqual => "=",
            NotEqual | FloatNotEqual => "!=",
            LessThanSigned | LessThanZero | FloatLessThan => "<",
            GreaterThanSigned | GreaterThanZero | FloatGreaterThan => ">",
            LessOrEqualSigned | LessOrEqualZero | FloatLessOrEqual => "<=",
            GreaterOrEqualSigned | GreaterOrEqualZero | FloatGreaterOrEqual => ">=",
            LessThanUnsigned => "<.u",
            GreaterThanUnsigned => ">.u",
            LessOrEqualUnsigned => "<=.u",
            GreaterOrEqualUnsigned => ">=.u",
            Zero => "zero?",
            NonZero => "nonzero?",
            Truthy => "truthy",
            False => "not",
            FloatFlagTrue => "fcc",
            FloatFlagFalse => "not-fcc",
        }
    }
}

/// A condition with its operands, as found on a branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The test
    pub kind: ConditionKind,
    /// Explicit operands, `kind.arg_count()` of them
    pub args: Vec<SimpleAtom>,
}

impl Condition {
    /// Creates a condition of `kind` over `args`.
    #[must_use]
    pub fn new(kind: ConditionKind, args: Vec<SimpleAtom>) -> Self {
        Condition { kind, args }
    }

    /// The always-true condition of an unconditional jump.
    #[must_use]
    pub fn always() -> Self {
        Condition {
            kind: ConditionKind::Always,
            args: Vec::new(),
        }
    }

    /// Returns `true` for unconditional jumps.
    #[must_use]
    pub fn is_always(&self) -> bool {
        self.kind == ConditionKind::Always
    }

    /// Returns the registers read by this condition, `fcc` included for flag kinds.
    #[must_use]
    pub fn reads(&self) -> RegSet {
        let mut set: RegSet = self
            .args
            .iter()
            .filter_map(SimpleAtom::as_var)
            .map(|v| v.reg)
            .collect();
        if matches!(
            self.kind,
            ConditionKind::FloatFlagTrue | ConditionKind::FloatFlagFalse
        ) {
            set.insert(Register::FCC);
        }
        set
    }
}
