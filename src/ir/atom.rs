//! Variables, atoms and the simple register-transfer expressions of the lifted IR.

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::ir::{RegSet, Register};

/// Whether a [`Variable`] is read or written by its instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessMode {
    /// The register value is read
    Read,
    /// The register is written
    Write,
}

/// One register access at one instruction.
///
/// The lifter assigns every operand a `Variable`; naming and typing them is the
/// job of the [`TypeEnv`](crate::types::TypeEnv).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable {
    /// Register accessed
    pub reg: Register,
    /// Read or write access
    pub mode: AccessMode,
    /// Index of the instruction performing the access
    pub idx: usize,
}

impl Variable {
    /// Creates a read access of `reg` at instruction `idx`.
    #[must_use]
    pub const fn read(reg: Register, idx: usize) -> Self {
        Variable {
            reg,
            mode: AccessMode::Read,
            idx,
        }
    }

    /// Creates a write access of `reg` at instruction `idx`.
    #[must_use]
    pub const fn write(reg: Register, idx: usize) -> Self {
        Variable {
            reg,
            mode: AccessMode::Write,
            idx,
        }
    }

    /// Returns `true` if this is a read access.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.mode == AccessMode::Read
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            AccessMode::Read => 'r',
            AccessMode::Write => 'w',
        };
        write!(f, "{}@{}{}", self.reg, self.idx, mode)
    }
}

/// An indivisible operand.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleAtom {
    /// A register variable
    Var(Variable),
    /// An integer constant
    Int(i64),
    /// A float constant
    Float(f32),
    /// Pointer to a symbol, rendered quoted (`'#t`)
    SymbolPtr(String),
    /// Value stored in a global symbol (`fact`)
    SymbolVal(String),
    /// Address of a static label in the function's data (`L345`)
    Label(String),
    /// The empty list
    EmptyList,
}

impl SimpleAtom {
    /// Symbol pointer to the false symbol.
    #[must_use]
    pub fn false_symbol() -> Self {
        SimpleAtom::SymbolPtr("#f".to_string())
    }

    /// Symbol pointer to the true symbol.
    #[must_use]
    pub fn true_symbol() -> Self {
        SimpleAtom::SymbolPtr("#t".to_string())
    }

    /// Returns the variable if this atom is one.
    #[must_use]
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            SimpleAtom::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer value if this atom is an integer constant.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SimpleAtom::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for the `'#f` symbol pointer.
    #[must_use]
    pub fn is_false(&self) -> bool {
        matches!(self, SimpleAtom::SymbolPtr(s) if s == "#f")
    }

    /// Returns `true` for the `'#t` symbol pointer.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self, SimpleAtom::SymbolPtr(s) if s == "#t")
    }

    /// Returns `true` for every atom that is not a register variable.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        !matches!(self, SimpleAtom::Var(_))
    }
}

impl From<Variable> for SimpleAtom {
    fn from(var: Variable) -> Self {
        SimpleAtom::Var(var)
    }
}

/// Operator of a [`SimpleExpression`].
///
/// The display name is the mnemonic used when the expression is rendered
/// before folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[allow(missing_docs)]
pub enum ExprKind {
    // ====================================================================
    // Moves
    // ====================================================================
    #[strum(serialize = "identity")]
    Identity,
    #[strum(serialize = "gpr->fpr")]
    GprToFpr,
    #[strum(serialize = "fpr->gpr")]
    FprToGpr,

    // ====================================================================
    // Integer arithmetic
    // ====================================================================
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    MulSigned,
    #[strum(serialize = "*.u")]
    MulUnsigned,
    #[strum(serialize = "neg")]
    Neg,

    // ====================================================================
    // Float arithmetic
    // ====================================================================
    #[strum(serialize = "+.s")]
    AddFloat,
    #[strum(serialize = "-.s")]
    SubFloat,
    #[strum(serialize = "*.s")]
    MulFloat,
    #[strum(serialize = "/.s")]
    DivFloat,
    #[strum(serialize = "min.s")]
    MinFloat,
    #[strum(serialize = "max.s")]
    MaxFloat,
    #[strum(serialize = "neg.s")]
    NegFloat,
    #[strum(serialize = "abs.s")]
    AbsFloat,
    #[strum(serialize = "sqrt.s")]
    SqrtFloat,
    #[strum(serialize = "int->float")]
    IntToFloat,
    #[strum(serialize = "float->int")]
    FloatToInt,

    // ====================================================================
    // Bitwise
    // ====================================================================
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "nor")]
    Nor,
    #[strum(serialize = "not")]
    LogNot,
    #[strum(serialize = "sll")]
    LeftShift,
    #[strum(serialize = "sra")]
    RightShiftArith,
    #[strum(serialize = "srl")]
    RightShiftLogic,

    // ====================================================================
    // Compare
    // ====================================================================
    #[strum(serialize = "slt")]
    LessThanSigned,
    #[strum(serialize = "sltu")]
    LessThanUnsigned,
}

impl ExprKind {
    /// Number of operands this kind takes.
    #[must_use]
    pub fn arg_count(self) -> usize {
        match self {
            ExprKind::Identity
            | ExprKind::GprToFpr
            | ExprKind::FprToGpr
            | ExprKind::Neg
            | ExprKind::NegFloat
            | ExprKind::AbsFloat
            | ExprKind::SqrtFloat
            | ExprKind::IntToFloat
            | ExprKind::FloatToInt
            | ExprKind::LogNot => 1,
            _ => 2,
        }
    }

    /// Returns `true` for float-domain operators.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            ExprKind::AddFloat
                | ExprKind::SubFloat
                | ExprKind::MulFloat
                | ExprKind::DivFloat
                | ExprKind::MinFloat
                | ExprKind::MaxFloat
                | ExprKind::NegFloat
                | ExprKind::AbsFloat
                | ExprKind::SqrtFloat
        )
    }
}

/// A register-transfer expression: an operator applied to atoms.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleExpression {
    /// Operator
    pub kind: ExprKind,
    /// Operands, `kind.arg_count()` of them
    pub args: Vec<SimpleAtom>,
}

impl SimpleExpression {
    /// Creates an identity expression of a single atom.
    #[must_use]
    pub fn identity(atom: impl Into<SimpleAtom>) -> Self {
        SimpleExpression {
            kind: ExprKind::Identity,
            args: vec![atom.into()],
        }
    }

    /// Creates an expression of `kind` applied to `args`.
    #[must_use]
    pub fn new(kind: ExprKind, args: Vec<SimpleAtom>) -> Self {
        SimpleExpression { kind, args }
    }

    /// Returns the single atom of an identity expression.
    #[must_use]
    pub fn as_identity(&self) -> Option<&SimpleAtom> {
        match (self.kind, self.args.as_slice()) {
            (ExprKind::Identity, [atom]) => Some(atom),
            _ => None,
        }
    }

    /// Iterates the variables read by this expression.
    pub fn vars(&self) -> impl Iterator<Item = &Variable> {
        self.args.iter().filter_map(SimpleAtom::as_var)
    }

    /// Returns the registers read by this expression.
    #[must_use]
    pub fn reads(&self) -> RegSet {
        self.vars().map(|v| v.reg).collect()
    }
}

impl From<SimpleAtom> for SimpleExpression {
    fn from(atom: SimpleAtom) -> Self {
        SimpleExpression::identity(atom)
    }
}
