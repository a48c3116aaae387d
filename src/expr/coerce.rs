//! Operand types and cast insertion.
//!
//! Types come from the [`TypeEnv`](crate::types::TypeEnv) for variables and
//! are propagated through the few element kinds whose result type follows
//! from their operands. Integer literals are untyped: they adapt to whatever
//! they are combined with and never get a cast of their own.

use crate::{
    engine::EventKind,
    expr::Folder,
    forms::{CastElement, FixedOperatorKind, FormElement, FormId, GenericOperator},
    ir::{LoadKind, SimpleAtom},
    types::{Coercion, TypeSpec},
};

impl Folder<'_> {
    /// Returns the type of the value `form` produces, if known.
    #[must_use]
    pub fn form_type(&self, form: FormId) -> Option<TypeSpec> {
        let (_, element) = self.single(form)?;
        match element {
            FormElement::Atom(atom) => match atom {
                SimpleAtom::Var(var) => self.env.variable_type(var),
                SimpleAtom::Float(_) => Some(TypeSpec::Float),
                SimpleAtom::SymbolPtr(_) => Some(TypeSpec::Symbol),
                _ => None,
            },
            FormElement::StringConstant(_) => Some(TypeSpec::named("string")),
            FormElement::Cast(cast) => Some(cast.ty.clone()),
            FormElement::Condition(_) => Some(TypeSpec::Symbol),
            FormElement::LoadSource(load) => Some(match load.kind {
                LoadKind::Signed => TypeSpec::Int,
                LoadKind::Unsigned => TypeSpec::UInt,
                LoadKind::Float => TypeSpec::Float,
            }),
            FormElement::Abs(abs) => self.form_type(abs.source),
            FormElement::Ash(ash) => self.form_type(ash.value),
            FormElement::TypeOf(_) => Some(TypeSpec::named("type")),
            FormElement::Generic(generic) => match generic.op {
                GenericOperator::Fixed(kind) => self.fixed_result_type(kind, &generic.args),
                GenericOperator::Condition(_) => Some(TypeSpec::Symbol),
                GenericOperator::Function(_) => None,
            },
            _ => None,
        }
    }

    fn fixed_result_type(&self, kind: FixedOperatorKind, args: &[FormId]) -> Option<TypeSpec> {
        use FixedOperatorKind::*;
        match kind {
            Sqrt | FloatAbs | FloatMin | FloatMax | GprToFpr => Some(TypeSpec::Float),
            SetOnLessThan | SetOnLessThanUnsigned => Some(TypeSpec::Int),
            TypeOf => Some(TypeSpec::named("type")),
            FprToGpr | AddressOf => None,
            // the result has the type of whichever operand is typed
            _ => args.iter().find_map(|arg| self.form_type(*arg)),
        }
    }

    /// Wraps `form` in a cast to `desired` if its known type needs one.
    ///
    /// Values of unknown type and values already usable as `desired` are
    /// returned unchanged, as is everything when casts are disabled.
    pub(crate) fn cast_to(&mut self, idx: usize, form: FormId, desired: &TypeSpec) -> FormId {
        if !self.config.insert_casts {
            return form;
        }
        let Some(actual) = self.form_type(form) else {
            return form;
        };
        let numeric = match self.env.coercion(desired, &actual) {
            Coercion::None => return form,
            Coercion::Numeric => true,
            Coercion::Representational => false,
        };

        let cast = self.element_form(FormElement::Cast(CastElement {
            ty: desired.clone(),
            source: form,
            numeric,
        }));
        let message = self.describe(cast);
        self.note(EventKind::CastInserted, idx, message);
        cast
    }

    /// Casts `second` to the integer type of `first` when both are typed integers
    /// of different signedness.
    pub(crate) fn match_signedness(&mut self, idx: usize, first: FormId, second: FormId) -> FormId {
        match (self.form_type(first), self.form_type(second)) {
            (Some(a), Some(b)) if a.is_integer() && b.is_integer() && a != b => {
                self.cast_to(idx, second, &a)
            }
            _ => second,
        }
    }

    /// Casts every typed operand to `int`, or `uint` when `signed` is false.
    pub(crate) fn force_integer(&mut self, idx: usize, args: Vec<FormId>, signed: bool) -> Vec<FormId> {
        let desired = if signed { TypeSpec::Int } else { TypeSpec::UInt };
        args.into_iter()
            .map(|arg| self.cast_to(idx, arg, &desired))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        engine::{EngineConfig, EventKind, EventLog},
        expr::Folder,
        forms::FormElement,
        ir::{ExprKind, FunctionBuilder, Register, SimpleAtom, Variable},
        types::{StaticTypeEnv, TypeSpec},
    };

    #[test]
    fn signedness_mismatch_casts_second_operand() {
        let mut b = FunctionBuilder::new("f");
        b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
        let function = b.finish().unwrap();
        let env = StaticTypeEnv::new(&function).with_args([TypeSpec::Int, TypeSpec::UInt]);
        let config = EngineConfig::default();
        let events = EventLog::new();
        let mut folder = Folder::new(&function, &env, &config, &events);

        let a = folder.atom_form(&Variable::read(Register::A0, 0).into());
        let b = folder.atom_form(&Variable::read(Register::A1, 0).into());
        let cast = folder.match_signedness(0, a, b);

        assert_ne!(cast, b);
        assert_eq!(folder.describe(cast), "(the-as int arg1)");
        assert_eq!(folder.match_signedness(0, a, a), a);
        assert_eq!(events.count_kind(EventKind::CastInserted), 1);
    }

    #[test]
    fn literals_and_disabled_casts_are_left_alone() {
        let function = FunctionBuilder::new("g").finish().unwrap();
        let env = StaticTypeEnv::new(&function);
        let config = EngineConfig::default().with_casts(false);
        let events = EventLog::new();
        let mut folder = Folder::new(&function, &env, &config, &events);

        let one = folder.atom_form(&SimpleAtom::Int(1));
        assert_eq!(folder.form_type(one), None);
        let f = folder.atom_form(&SimpleAtom::Float(1.5));
        assert_eq!(folder.cast_to(0, f, &TypeSpec::Int), f);
        assert!(matches!(
            folder.pool().element(folder.pool().elements_of(f)[0]),
            FormElement::Atom(_)
        ));
    }
}
