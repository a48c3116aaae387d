//! Rendering of element trees to s-expressions.
//!
//! The engine itself only guarantees a well-formed tree; [`Renderer`] is the
//! textual view used by tools, tests and diagnostics. Every element has a value
//! rendering, and conditions additionally have a condition-context rendering
//! ([`Renderer::render_condition`]) that drops value-producing wrappers such as
//! `truthy`.

use std::fmt;

use crate::{
    forms::{
        DerefToken, ElementId, FixedOperatorKind, FormElement, FormId, FormPool, GenericOperator,
        OperatorTable, ShortCircuitKind,
    },
    ir::{AtomicOp, ConditionKind, Function, LoadKind, SimpleAtom, SimpleExpression, StoreKind},
    types::TypeEnv,
};

/// An s-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    /// A symbol, number or string literal
    Atom(String),
    /// A parenthesized list
    List(Vec<Sexp>),
}

impl Sexp {
    /// Creates an atom.
    pub fn atom(text: impl Into<String>) -> Self {
        Sexp::Atom(text.into())
    }

    /// Creates a list.
    #[must_use]
    pub fn list(items: Vec<Sexp>) -> Self {
        Sexp::List(items)
    }

    /// Creates a list whose head is the symbol `head`.
    pub fn call(head: impl Into<String>, args: impl IntoIterator<Item = Sexp>) -> Self {
        let mut items = vec![Sexp::atom(head)];
        items.extend(args);
        Sexp::List(items)
    }

    /// Returns the head symbol of a list.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        match self {
            Sexp::List(items) => match items.first() {
                Some(Sexp::Atom(head)) => Some(head),
                _ => None,
            },
            Sexp::Atom(_) => None,
        }
    }

    /// Renders over several lines so no line exceeds `width` where possible.
    ///
    /// Lists that fit stay on one line; otherwise the head stays on the
    /// opening line and every argument goes on its own line, indented by two.
    #[must_use]
    pub fn pretty(&self, width: usize) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0, width);
        out
    }

    fn write_pretty(&self, out: &mut String, indent: usize, width: usize) {
        let flat = self.to_string();
        if indent + flat.len() <= width {
            out.push_str(&flat);
            return;
        }
        match self {
            Sexp::Atom(text) => out.push_str(text),
            Sexp::List(items) => {
                out.push('(');
                if let Some((head, rest)) = items.split_first() {
                    head.write_pretty(out, indent + 1, width);
                    for item in rest {
                        out.push('\n');
                        out.extend(std::iter::repeat(' ').take(indent + 2));
                        item.write_pretty(out, indent + 2, width);
                    }
                }
                out.push(')');
            }
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(text) => f.write_str(text),
            Sexp::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Mnemonic of a load of `size` bytes.
#[must_use]
pub fn load_name(size: u8, kind: LoadKind) -> String {
    match (size, kind) {
        (_, LoadKind::Float) => "l.f".to_string(),
        (1, LoadKind::Signed) => "l.b".to_string(),
        (1, LoadKind::Unsigned) => "l.bu".to_string(),
        (2, LoadKind::Signed) => "l.h".to_string(),
        (2, LoadKind::Unsigned) => "l.hu".to_string(),
        (4, LoadKind::Signed) => "l.w".to_string(),
        (4, LoadKind::Unsigned) => "l.wu".to_string(),
        (8, _) => "l.d".to_string(),
        (16, _) => "l.q".to_string(),
        (n, _) => format!("l.{n}"),
    }
}

/// Mnemonic of a store of `size` bytes.
#[must_use]
pub fn store_name(size: u8, kind: StoreKind) -> String {
    match (size, kind) {
        (_, StoreKind::Float) => "s.f!".to_string(),
        (1, _) => "s.b!".to_string(),
        (2, _) => "s.h!".to_string(),
        (4, _) => "s.w!".to_string(),
        (8, _) => "s.d!".to_string(),
        (16, _) => "s.q!".to_string(),
        (n, _) => format!("s.{n}!"),
    }
}

/// Renders elements of one reconstruction.
pub struct Renderer<'a> {
    pool: &'a FormPool,
    function: &'a Function,
    env: &'a dyn TypeEnv,
    operators: &'a OperatorTable,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer over `pool`, naming variables through `env`.
    #[must_use]
    pub fn new(
        pool: &'a FormPool,
        function: &'a Function,
        env: &'a dyn TypeEnv,
        operators: &'a OperatorTable,
    ) -> Self {
        Renderer {
            pool,
            function,
            env,
            operators,
        }
    }

    /// Renders a form; several elements are wrapped in `begin`.
    #[must_use]
    pub fn render_form(&self, id: FormId) -> Sexp {
        let mut items = self.render_statements(id);
        if items.len() == 1 {
            items.remove(0)
        } else if items.is_empty() {
            Sexp::call("empty", [])
        } else {
            Sexp::call("begin", items)
        }
    }

    /// Renders the elements of a form as a statement list.
    ///
    /// Unreachable code following a `return` or `break` is spliced in after it.
    #[must_use]
    pub fn render_statements(&self, id: FormId) -> Vec<Sexp> {
        let mut out = Vec::new();
        for elt in self.pool.elements_of(id) {
            match self.pool.element(*elt) {
                FormElement::Return(e) | FormElement::Break(e) if e.dead_code.is_some() => {
                    out.push(self.render_exit(*elt));
                    if let Some(dead) = e.dead_code {
                        out.extend(self.render_statements(dead));
                    }
                }
                _ => out.push(self.render_element(*elt)),
            }
        }
        out
    }

    /// Renders a form used as a branch test.
    #[must_use]
    pub fn render_condition_form(&self, id: FormId) -> Sexp {
        let elements = self.pool.elements_of(id);
        match elements.split_last() {
            None => Sexp::call("empty", []),
            Some((last, [])) => self.render_condition(*last),
            Some((last, before)) => {
                let mut items: Vec<Sexp> = before.iter().map(|e| self.render_element(*e)).collect();
                items.push(self.render_condition(*last));
                Sexp::call("begin", items)
            }
        }
    }

    /// Renders an element used as a branch test.
    ///
    /// Differs from [`Renderer::render_element`] only for tests whose value
    /// rendering carries a wrapper: `(truthy x)` becomes `x`.
    #[must_use]
    pub fn render_condition(&self, id: ElementId) -> Sexp {
        match self.pool.element(id) {
            FormElement::Condition(e) if e.effective_kind() == ConditionKind::Truthy => {
                match e.src.first() {
                    Some(src) => self.render_form(*src),
                    None => Sexp::atom("#t"),
                }
            }
            _ => self.render_element(id),
        }
    }

    /// Renders an atom.
    #[must_use]
    pub fn render_atom(&self, atom: &SimpleAtom) -> Sexp {
        match atom {
            SimpleAtom::Var(var) => Sexp::atom(self.env.variable_name(var)),
            SimpleAtom::Int(value) => Sexp::atom(value.to_string()),
            SimpleAtom::Float(value) => Sexp::atom(format!("{value:?}")),
            SimpleAtom::SymbolPtr(name) if name.starts_with('#') => Sexp::atom(name.clone()),
            SimpleAtom::SymbolPtr(name) => Sexp::atom(format!("'{name}")),
            SimpleAtom::SymbolVal(name) | SimpleAtom::Label(name) => Sexp::atom(name.clone()),
            SimpleAtom::EmptyList => Sexp::atom("'()"),
        }
    }

    fn render_expression(&self, expr: &SimpleExpression) -> Sexp {
        match expr.as_identity() {
            Some(atom) => self.render_atom(atom),
            None => Sexp::call(
                expr.kind.to_string(),
                expr.args.iter().map(|a| self.render_atom(a)),
            ),
        }
    }

    fn fixed(&self, kind: FixedOperatorKind, args: impl IntoIterator<Item = Sexp>) -> Sexp {
        Sexp::call(self.operators.name(kind), args)
    }

    fn address(&self, base: Sexp, offset: i64) -> Sexp {
        if offset == 0 {
            base
        } else {
            self.fixed(FixedOperatorKind::Add, [base, Sexp::atom(offset.to_string())])
        }
    }

    fn render_test(&self, kind: ConditionKind, args: Vec<Sexp>) -> Sexp {
        match kind {
            ConditionKind::Always => Sexp::atom("#t"),
            ConditionKind::Never => Sexp::atom("#f"),
            k if k.compares_to_zero() => {
                let mut args = args;
                args.push(Sexp::atom("0"));
                Sexp::call(k.operator(), args)
            }
            k => Sexp::call(k.operator(), args),
        }
    }

    fn render_op(&self, op: &AtomicOp) -> Sexp {
        match op {
            AtomicOp::SetVar { dst, src } => Sexp::call(
                "set!",
                [self.render_atom(&(*dst).into()), self.render_expression(src)],
            ),
            AtomicOp::SetCondition { dst, condition } => Sexp::call(
                "set!",
                [
                    self.render_atom(&(*dst).into()),
                    self.render_test(
                        condition.kind,
                        condition.args.iter().map(|a| self.render_atom(a)).collect(),
                    ),
                ],
            ),
            AtomicOp::Load {
                dst,
                base,
                offset,
                size,
                kind,
            } => Sexp::call(
                "set!",
                [
                    self.render_atom(&(*dst).into()),
                    Sexp::call(load_name(*size, *kind), [self.address(self.render_atom(base), *offset)]),
                ],
            ),
            AtomicOp::Store {
                base,
                offset,
                value,
                size,
                kind,
            } => Sexp::call(
                store_name(*size, *kind),
                [self.address(self.render_atom(base), *offset), self.render_atom(value)],
            ),
            AtomicOp::Divide { a, b, signed } => Sexp::call(
                if *signed { "div!" } else { "divu!" },
                [self.render_atom(a), self.render_atom(b)],
            ),
            AtomicOp::FloatCompare { kind, a, b } => Sexp::call(
                "set!",
                [
                    Sexp::atom("fcc"),
                    self.render_test(*kind, vec![self.render_atom(a), self.render_atom(b)]),
                ],
            ),
            AtomicOp::Call { function, args, .. } => Sexp::call(
                "call!",
                std::iter::once(self.render_atom(&(*function).into()))
                    .chain(args.iter().map(|v| self.render_atom(&(*v).into()))),
            ),
            AtomicOp::Branch(branch) => {
                let target = match self.function.label_of(branch.target) {
                    Some(label) => Sexp::atom(label),
                    None => Sexp::atom(branch.target.to_string()),
                };
                let mut items = vec![
                    self.render_test(
                        branch.condition.kind,
                        branch.condition.args.iter().map(|a| self.render_atom(a)).collect(),
                    ),
                    target,
                ];
                if let Some(delay) = branch.delay_op() {
                    items.push(self.render_op(delay));
                }
                Sexp::call(if branch.likely { "bl!" } else { "b!" }, items)
            }
            AtomicOp::ConditionalMove {
                dst,
                src,
                test,
                on_zero,
            } => Sexp::call(
                if *on_zero { "cmovz!" } else { "cmovn!" },
                [
                    self.render_atom(&(*dst).into()),
                    self.render_atom(src),
                    self.render_atom(&(*test).into()),
                ],
            ),
            AtomicOp::Special(kind) => Sexp::call(format!("{kind}"), []),
            AtomicOp::Asm {
                mnemonic, dst, srcs, ..
            } => Sexp::call(
                format!(".{mnemonic}"),
                dst.iter()
                    .map(|v| self.render_atom(&(*v).into()))
                    .chain(srcs.iter().map(|a| self.render_atom(a))),
            ),
        }
    }

    fn render_instruction(&self, idx: usize) -> Sexp {
        match self.function.instructions.get(idx) {
            Some(instr) => self.render_op(&instr.op),
            None => Sexp::call("invalid-instruction", [Sexp::atom(idx.to_string())]),
        }
    }

    fn render_exit(&self, id: ElementId) -> Sexp {
        let (head, e) = match self.pool.element(id) {
            FormElement::Return(e) => ("return", e),
            FormElement::Break(e) => ("break", e),
            _ => return self.render_element(id),
        };
        let code = self.pool.elements_of(e.code);
        let empty = matches!(code, [only] if matches!(self.pool.element(*only), FormElement::Empty));
        if empty {
            Sexp::call(head, [])
        } else {
            Sexp::call(head, [self.render_form(e.code)])
        }
    }

    fn arm(&self, condition: FormId, body: FormId) -> Sexp {
        let mut items = vec![self.render_condition_form(condition)];
        items.extend(self.render_statements(body));
        Sexp::List(items)
    }

    /// Renders an element in value context.
    #[must_use]
    pub fn render_element(&self, id: ElementId) -> Sexp {
        match self.pool.element(id) {
            FormElement::Atom(atom) => self.render_atom(atom),
            FormElement::StringConstant(text) => Sexp::atom(format!("{text:?}")),
            FormElement::SimpleExpression(e) => self.render_expression(&e.expr),
            FormElement::LoadSource(e) => Sexp::call(
                load_name(e.size, e.kind),
                [self.address(self.render_form(e.base), e.offset)],
            ),
            FormElement::Store(e) => self.render_instruction(e.idx),
            FormElement::SetVar(e) => Sexp::call(
                "set!",
                [self.render_atom(&e.dst.into()), self.render_form(e.src)],
            ),
            FormElement::SetFormForm(e) => {
                Sexp::call("set!", [self.render_form(e.dst), self.render_form(e.src)])
            }
            FormElement::AtomicOp(e) => self.render_instruction(e.idx),
            FormElement::FunctionCall(e) => self.render_instruction(e.idx),
            FormElement::Branch(e) => self.render_instruction(e.idx),
            FormElement::Divide(e) => Sexp::call(
                if e.signed { "div!" } else { "divu!" },
                [self.render_form(e.a), self.render_form(e.b)],
            ),
            FormElement::Condition(e) => self.render_test(
                e.effective_kind(),
                e.src.iter().map(|f| self.render_form(*f)).collect(),
            ),
            FormElement::Generic(e) => {
                let args = e.args.iter().map(|f| self.render_form(*f));
                match e.op {
                    GenericOperator::Fixed(kind) => self.fixed(kind, args),
                    GenericOperator::Condition(kind) => self.render_test(kind, args.collect()),
                    GenericOperator::Function(head) => {
                        let mut items = vec![self.render_form(head)];
                        items.extend(args);
                        Sexp::List(items)
                    }
                }
            }
            FormElement::Cast(e) => Sexp::call(
                if e.numeric { "the" } else { "the-as" },
                [Sexp::atom(e.ty.to_string()), self.render_form(e.source)],
            ),
            FormElement::Deref(e) => {
                let mut items = vec![self.render_form(e.base)];
                items.extend(e.tokens.iter().map(|token| match token {
                    DerefToken::IntConstant(value) => Sexp::atom(value.to_string()),
                    DerefToken::IntExpression(form) => self.render_form(*form),
                    DerefToken::Field(name) => Sexp::atom(name.clone()),
                    DerefToken::Placeholder => Sexp::atom("_"),
                }));
                Sexp::call(if e.addr_of { "&->" } else { "->" }, items)
            }
            FormElement::While(e) | FormElement::Until(e) => {
                let head = if matches!(self.pool.element(id), FormElement::While(_)) {
                    "while"
                } else {
                    "until"
                };
                let mut items = vec![self.render_condition_form(e.condition)];
                items.extend(self.render_statements(e.body));
                Sexp::call(head, items)
            }
            FormElement::CondWithElse(e) => match e.entries.as_slice() {
                [only] => Sexp::call(
                    "if",
                    [
                        self.render_condition_form(only.condition),
                        self.render_form(only.body),
                        self.render_form(e.else_form),
                    ],
                ),
                entries => {
                    let mut items: Vec<Sexp> =
                        entries.iter().map(|x| self.arm(x.condition, x.body)).collect();
                    let mut fallback = vec![Sexp::atom("else")];
                    fallback.extend(self.render_statements(e.else_form));
                    items.push(Sexp::List(fallback));
                    Sexp::call("cond", items)
                }
            },
            FormElement::CondNoElse(e) => match e.entries.as_slice() {
                [only] => Sexp::call(
                    "if",
                    [
                        self.render_condition_form(only.condition),
                        self.render_form(only.body),
                    ],
                ),
                entries => Sexp::call(
                    "cond",
                    entries.iter().map(|x| self.arm(x.condition, x.body)),
                ),
            },
            FormElement::ShortCircuit(e) => Sexp::call(
                match e.kind {
                    ShortCircuitKind::And => "and",
                    ShortCircuitKind::Or => "or",
                },
                e.entries
                    .iter()
                    .map(|entry| self.render_condition_form(entry.condition)),
            ),
            FormElement::Return(e) | FormElement::Break(e) => match e.dead_code {
                Some(dead) => {
                    let mut items = vec![self.render_exit(id)];
                    items.extend(self.render_statements(dead));
                    Sexp::call("begin", items)
                }
                None => self.render_exit(id),
            },
            FormElement::Empty => Sexp::call("empty", []),
            FormElement::Abs(e) => self.fixed(FixedOperatorKind::Abs, [self.render_form(e.source)]),
            FormElement::Ash(e) => self.fixed(
                FixedOperatorKind::Ash,
                [
                    self.render_form(e.value),
                    self.render_form(e.shift_amount),
                ],
            ),
            FormElement::TypeOf(e) => {
                self.fixed(FixedOperatorKind::TypeOf, [self.render_form(e.value)])
            }
            FormElement::ConditionalMoveFalse(e) => Sexp::call(
                if e.on_zero {
                    "cmove-#f-zero"
                } else {
                    "cmove-#f-nonzero"
                },
                [
                    self.render_atom(&e.dest.into()),
                    self.render_atom(&e.source.into()),
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_display() {
        let sexp = Sexp::call(
            "+",
            [Sexp::atom("a"), Sexp::call("*", [Sexp::atom("b"), Sexp::atom("2")])],
        );
        assert_eq!(sexp.to_string(), "(+ a (* b 2))");
        assert_eq!(sexp.head(), Some("+"));
    }

    #[test]
    fn pretty_breaks_long_lists() {
        let sexp = Sexp::call(
            "begin",
            [
                Sexp::call("set!", [Sexp::atom("v1-0"), Sexp::atom("arg0")]),
                Sexp::call("set!", [Sexp::atom("v0-0"), Sexp::atom("v1-0")]),
            ],
        );
        assert_eq!(sexp.pretty(100), sexp.to_string());
        assert_eq!(
            sexp.pretty(20),
            "(begin\n  (set! v1-0 arg0)\n  (set! v0-0 v1-0))"
        );
    }

    #[test]
    fn memory_mnemonics() {
        assert_eq!(load_name(4, LoadKind::Unsigned), "l.wu");
        assert_eq!(load_name(8, LoadKind::Signed), "l.d");
        assert_eq!(load_name(4, LoadKind::Float), "l.f");
        assert_eq!(store_name(2, StoreKind::Integer), "s.h!");
    }
}
