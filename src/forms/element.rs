//! The expression node model.
//!
//! Every reconstructed expression or statement is one [`FormElement`], a tagged
//! sum type with a payload per variant. Children are always held as [`FormId`]s
//! (sequence wrappers), never as bare elements, which keeps "a list of
//! statements" and "one expression" interchangeable wherever a child appears.
//!
//! Elements that stand for a single lifted operation keep the instruction index
//! (`idx`) so diagnostics and idiom recognizers can reach the original
//! operation.

#![allow(missing_docs)]

use bitflags::bitflags;

use crate::{
    forms::{FormId, GenericOperator},
    ir::{ConditionKind, LoadKind, RegSet, SimpleAtom, SimpleExpression, Variable},
    types::TypeSpec,
};

bitflags! {
    /// Metadata carried by a variable assignment.
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
    pub struct SetVarInfo: u8 {
        /// Move introduced by register coloring, to be dropped by a later pass
        const ELIMINATED_COLORING_MOVE = 0x01;
        /// The assigned value is never read
        const DEAD_SET = 0x02;
        /// Dead assignment of `'#f`, part of a conditional-move idiom
        const DEAD_FALSE = 0x04;
    }
}

/// One step of a dereference chain.
#[derive(Debug, Clone, PartialEq)]
pub enum DerefToken {
    /// Constant index or offset
    IntConstant(i64),
    /// Index computed by an expression
    IntExpression(FormId),
    /// Named field
    Field(String),
    /// Unresolved step, rendered `_`
    Placeholder,
}

/// Kind of a short-circuit chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortCircuitKind {
    /// `(and ...)`: a failing test short-circuits to false
    And,
    /// `(or ...)`: a passing test short-circuits to the tested value
    Or,
}

// ============================================================================
// Values and operations
// ============================================================================

/// Unfolded register-transfer expression of instruction `idx`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleExpressionElement {
    pub expr: SimpleExpression,
    pub idx: usize,
}

/// Memory load; `base + offset` is the address.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSourceElement {
    pub base: FormId,
    pub offset: i64,
    pub size: u8,
    pub kind: LoadKind,
    pub idx: usize,
}

/// Store kept verbatim because no richer form applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreElement {
    pub idx: usize,
}

/// `(set! dst src)` on a register variable.
#[derive(Debug, Clone, PartialEq)]
pub struct SetVarElement {
    pub dst: Variable,
    pub src: FormId,
    /// Evaluating the assignment must not be reordered past other sequence points
    pub sequence_point: bool,
    pub info: SetVarInfo,
}

/// `(set! dst src)` on a memory location.
#[derive(Debug, Clone, PartialEq)]
pub struct SetFormFormElement {
    pub dst: FormId,
    pub src: FormId,
}

/// Identity wrapper of an operation no fold rule applied to.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicOpElement {
    pub idx: usize,
    pub writes: RegSet,
}

/// Call not yet folded into a generic call element.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallElement {
    pub idx: usize,
    pub writes: RegSet,
}

/// Division writing both halves of the result to `hi`/`lo`.
#[derive(Debug, Clone, PartialEq)]
pub struct DivideElement {
    pub a: FormId,
    pub b: FormId,
    pub signed: bool,
    pub idx: usize,
}

/// A comparison, used either as a value or as a branch test.
///
/// `flipped` records that the low-level test was negated; rendering picks the
/// natural inverse operator instead of wrapping the test in `not`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionElement {
    pub kind: ConditionKind,
    pub src: Vec<FormId>,
    /// Registers this condition still holds open (read for the last time, not yet folded)
    pub consumed: RegSet,
    pub flipped: bool,
    pub idx: usize,
}

impl ConditionElement {
    /// The condition kind after applying the flip flag.
    #[must_use]
    pub fn effective_kind(&self) -> ConditionKind {
        if self.flipped {
            self.kind.invert()
        } else {
            self.kind
        }
    }
}

/// Branch kept verbatim, outside of any recognized control structure.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchElement {
    pub idx: usize,
    pub writes: RegSet,
}

/// `(op args...)`
#[derive(Debug, Clone, PartialEq)]
pub struct GenericElement {
    pub op: GenericOperator,
    pub args: Vec<FormId>,
}

/// `(the ty source)` when `numeric`, `(the-as ty source)` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct CastElement {
    pub ty: TypeSpec,
    pub source: FormId,
    pub numeric: bool,
}

/// `(-> base tokens...)`, or `(&-> ...)` when taking the address.
#[derive(Debug, Clone, PartialEq)]
pub struct DerefElement {
    pub base: FormId,
    pub addr_of: bool,
    pub tokens: Vec<DerefToken>,
}

// ============================================================================
// Control structures
// ============================================================================

/// Body and condition of a `while` or `until` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopElement {
    pub condition: FormId,
    pub body: FormId,
    /// The condition span has been narrowed; raw captures may be too greedy
    pub cleaned: bool,
}

/// One arm of a cond with an else arm.
#[derive(Debug, Clone, PartialEq)]
pub struct CondEntry {
    pub condition: FormId,
    pub body: FormId,
    pub cleaned: bool,
}

/// `(cond (c body)... (else else_form))`
#[derive(Debug, Clone, PartialEq)]
pub struct CondWithElseElement {
    pub entries: Vec<CondEntry>,
    pub else_form: FormId,
    pub already_rewritten: bool,
}

/// One arm of a cond without an else arm.
#[derive(Debug, Clone, PartialEq)]
pub struct CondNoElseEntry {
    pub condition: FormId,
    pub body: FormId,
    /// Register the compiler writes `'#f` to when the arm is skipped
    pub false_destination: Option<Variable>,
    /// Instruction index of the branch that skips the arm
    pub original_condition_branch: usize,
    pub cleaned: bool,
}

/// `(cond (c body)...)`; when `used_as_value` the chain's value lands in
/// `final_destination`.
#[derive(Debug, Clone, PartialEq)]
pub struct CondNoElseElement {
    pub entries: Vec<CondNoElseEntry>,
    pub final_destination: Option<Variable>,
    pub used_as_value: bool,
    pub already_rewritten: bool,
}

/// One test of a short-circuit chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortCircuitEntry {
    pub condition: FormId,
    /// Instruction index of the branch ending this entry, `None` for the last entry
    pub branch: Option<usize>,
    /// The delay slot writes the placeholder `'#f` rather than the tested value
    pub is_output_trick: bool,
    pub cleaned: bool,
}

/// `(and ...)` / `(or ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct ShortCircuitElement {
    pub kind: ShortCircuitKind,
    pub entries: Vec<ShortCircuitEntry>,
    pub final_result: Option<Variable>,
    pub used_as_value: bool,
    pub already_rewritten: bool,
}

/// `(return code)` or `(break code)`, followed by unreachable code kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitElement {
    pub code: FormId,
    pub dead_code: Option<FormId>,
    /// Instruction index of the jump
    pub idx: usize,
}

// ============================================================================
// Idioms
// ============================================================================

/// `(abs source)`
#[derive(Debug, Clone, PartialEq)]
pub struct AbsElement {
    pub source: FormId,
    pub consumed: RegSet,
    pub idx: usize,
}

/// `(ash value shift_amount)`: shifts left for positive amounts, right otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct AshElement {
    pub value: FormId,
    pub shift_amount: FormId,
    /// Temporary holding the negated amount
    pub clobber: Option<Variable>,
    pub signed: bool,
    pub consumed: RegSet,
    pub idx: usize,
}

/// `(rtype-of value)`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeOfElement {
    pub value: FormId,
    pub clobber: Option<Variable>,
    pub idx: usize,
}

/// Boolean-defaulting conditional move that could not be paired with its test.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalMoveFalseElement {
    pub dest: Variable,
    pub source: Variable,
    pub on_zero: bool,
    pub idx: usize,
}

/// A reconstructed expression or statement.
#[derive(Debug, Clone, PartialEq)]
pub enum FormElement {
    // ====================================================================
    // Values and operations
    // ====================================================================
    Atom(SimpleAtom),
    StringConstant(String),
    SimpleExpression(SimpleExpressionElement),
    LoadSource(LoadSourceElement),
    Store(StoreElement),
    SetVar(SetVarElement),
    SetFormForm(SetFormFormElement),
    AtomicOp(AtomicOpElement),
    FunctionCall(FunctionCallElement),
    Divide(DivideElement),
    Condition(ConditionElement),
    Branch(BranchElement),
    Generic(GenericElement),
    Cast(CastElement),
    Deref(DerefElement),

    // ====================================================================
    // Control structures
    // ====================================================================
    While(LoopElement),
    Until(LoopElement),
    CondWithElse(CondWithElseElement),
    CondNoElse(CondNoElseElement),
    ShortCircuit(ShortCircuitElement),
    Return(ExitElement),
    Break(ExitElement),
    Empty,

    // ====================================================================
    // Idioms
    // ====================================================================
    Abs(AbsElement),
    Ash(AshElement),
    TypeOf(TypeOfElement),
    ConditionalMoveFalse(ConditionalMoveFalseElement),
}

impl FormElement {
    /// Returns the direct child forms in evaluation order.
    #[must_use]
    pub fn child_forms(&self) -> Vec<FormId> {
        let mut out = Vec::new();
        match self {
            FormElement::Atom(_)
            | FormElement::StringConstant(_)
            | FormElement::SimpleExpression(_)
            | FormElement::Store(_)
            | FormElement::AtomicOp(_)
            | FormElement::FunctionCall(_)
            | FormElement::Branch(_)
            | FormElement::Empty
            | FormElement::ConditionalMoveFalse(_) => {}
            FormElement::Abs(e) => out.push(e.source),
            FormElement::Ash(e) => {
                out.push(e.value);
                out.push(e.shift_amount);
            }
            FormElement::LoadSource(e) => out.push(e.base),
            FormElement::SetVar(e) => out.push(e.src),
            FormElement::SetFormForm(e) => {
                out.push(e.src);
                out.push(e.dst);
            }
            FormElement::Divide(e) => {
                out.push(e.a);
                out.push(e.b);
            }
            FormElement::Condition(e) => out.extend(e.src.iter().copied()),
            FormElement::Generic(e) => {
                if let GenericOperator::Function(head) = e.op {
                    out.push(head);
                }
                out.extend(e.args.iter().copied());
            }
            FormElement::Cast(e) => out.push(e.source),
            FormElement::Deref(e) => {
                out.push(e.base);
                for token in &e.tokens {
                    if let DerefToken::IntExpression(f) = token {
                        out.push(*f);
                    }
                }
            }
            FormElement::While(e) => {
                out.push(e.condition);
                out.push(e.body);
            }
            FormElement::Until(e) => {
                out.push(e.body);
                out.push(e.condition);
            }
            FormElement::CondWithElse(e) => {
                for entry in &e.entries {
                    out.push(entry.condition);
                    out.push(entry.body);
                }
                out.push(e.else_form);
            }
            FormElement::CondNoElse(e) => {
                for entry in &e.entries {
                    out.push(entry.condition);
                    out.push(entry.body);
                }
            }
            FormElement::ShortCircuit(e) => out.extend(e.entries.iter().map(|x| x.condition)),
            FormElement::Return(e) | FormElement::Break(e) => {
                out.push(e.code);
                out.extend(e.dead_code);
            }
            FormElement::TypeOf(e) => out.push(e.value),
        }
        out
    }

    /// Returns `true` if evaluating this element alone is an order-sensitive effect.
    ///
    /// Pure value producers (constants, arithmetic, casts, comparisons, loads)
    /// are not sequence points; assignments carry an explicit flag.
    #[must_use]
    pub fn is_sequence_point(&self) -> bool {
        match self {
            FormElement::SetVar(e) => e.sequence_point,
            FormElement::Atom(_)
            | FormElement::StringConstant(_)
            | FormElement::SimpleExpression(_)
            | FormElement::LoadSource(_)
            | FormElement::Condition(_)
            | FormElement::Cast(_)
            | FormElement::Deref(_)
            | FormElement::Abs(_)
            | FormElement::Ash(_)
            | FormElement::TypeOf(_)
            | FormElement::Empty => false,
            FormElement::Generic(e) => matches!(e.op, GenericOperator::Function(_)),
            _ => true,
        }
    }

    /// Returns `true` for the control-structure variants.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            FormElement::While(_)
                | FormElement::Until(_)
                | FormElement::CondWithElse(_)
                | FormElement::CondNoElse(_)
                | FormElement::ShortCircuit(_)
                | FormElement::Return(_)
                | FormElement::Break(_)
        )
    }

    /// Returns the assignment payload if this is a `set!` of a variable.
    #[must_use]
    pub fn as_set_var(&self) -> Option<&SetVarElement> {
        match self {
            FormElement::SetVar(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the atom if this is an atom element.
    #[must_use]
    pub fn as_atom(&self) -> Option<&SimpleAtom> {
        match self {
            FormElement::Atom(a) => Some(a),
            _ => None,
        }
    }
}
