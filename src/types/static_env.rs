//! Table-driven [`TypeEnv`] implementation.

use std::collections::HashMap;

use crate::{
    ir::{AccessMode, Function, RegClass, Register, Variable},
    types::{FieldAccess, TypeEnv, TypeSpec},
};

/// A [`TypeEnv`] answering from explicit tables.
///
/// Variables are named by register and definition order: the `n`-th write to
/// `v1` in layout order is `v1-n`, and reads see the closest preceding write.
/// Reads of argument registers with no preceding write are the function's
/// arguments and are named `arg0`, `arg1`, and so on.
///
/// Types resolve in this order: explicit per-name override, argument type,
/// per-register type, and `float` for float registers.
///
/// # Examples
///
/// ```rust
/// use formscope::ir::{ExprKind, FunctionBuilder, Register};
/// use formscope::types::{StaticTypeEnv, TypeEnv, TypeSpec};
///
/// let mut b = FunctionBuilder::new("add");
/// b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
/// let function = b.finish()?;
///
/// let env = StaticTypeEnv::new(&function)
///     .with_args([TypeSpec::Int, TypeSpec::UInt])
///     .with_return_type(TypeSpec::Int);
/// assert_eq!(env.return_type(), Some(TypeSpec::Int));
/// # Ok::<(), formscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTypeEnv {
    writes: HashMap<Register, Vec<usize>>,
    arg_types: Vec<TypeSpec>,
    reg_types: HashMap<Register, TypeSpec>,
    name_types: HashMap<String, TypeSpec>,
    return_type: Option<TypeSpec>,
    fields: HashMap<(String, i64), FieldAccess>,
    strings: HashMap<String, String>,
}

impl StaticTypeEnv {
    /// Creates an environment for `function` with no type information.
    #[must_use]
    pub fn new(function: &Function) -> Self {
        let mut writes: HashMap<Register, Vec<usize>> = HashMap::new();
        for (idx, instr) in function.instructions.iter().enumerate() {
            for reg in instr.op.writes().iter() {
                writes.entry(reg).or_default().push(idx);
            }
        }

        StaticTypeEnv {
            writes,
            ..Default::default()
        }
    }

    /// Declares the argument types, in argument register order.
    #[must_use]
    pub fn with_args(mut self, types: impl IntoIterator<Item = TypeSpec>) -> Self {
        self.arg_types = types.into_iter().collect();
        self
    }

    /// Declares the return type.
    #[must_use]
    pub fn with_return_type(mut self, ty: TypeSpec) -> Self {
        self.return_type = Some(ty);
        self
    }

    /// Gives every variable held in `reg` the type `ty`.
    #[must_use]
    pub fn with_register_type(mut self, reg: Register, ty: TypeSpec) -> Self {
        self.reg_types.insert(reg, ty);
        self
    }

    /// Gives the variable named `name` (for example `v0-0`) the type `ty`.
    #[must_use]
    pub fn with_var_type(mut self, name: &str, ty: TypeSpec) -> Self {
        self.name_types.insert(name.to_string(), ty);
        self
    }

    /// Declares that `offset` into a `base` names `field` of type `ty`.
    #[must_use]
    pub fn with_field(mut self, base: &TypeSpec, offset: i64, field: &str, ty: Option<TypeSpec>) -> Self {
        self.fields.insert(
            (base.to_string(), offset),
            FieldAccess {
                path: vec![field.to_string()],
                ty,
            },
        );
        self
    }

    /// Declares that `label` holds the string constant `value`.
    #[must_use]
    pub fn with_string(mut self, label: &str, value: &str) -> Self {
        self.strings.insert(label.to_string(), value.to_string());
        self
    }

    // ordinal of the definition `var` refers to, `None` for function inputs
    fn version(&self, var: &Variable) -> Option<usize> {
        let writes = self.writes.get(&var.reg)?;
        match var.mode {
            AccessMode::Write => writes.iter().position(|w| *w == var.idx),
            AccessMode::Read => writes.iter().rposition(|w| *w < var.idx),
        }
    }

    fn arg_position(&self, var: &Variable) -> Option<usize> {
        if self.version(var).is_some() {
            return None;
        }
        var.reg.arg_index()
    }
}

impl TypeEnv for StaticTypeEnv {
    fn variable_type(&self, var: &Variable) -> Option<TypeSpec> {
        if let Some(ty) = self.name_types.get(&self.variable_name(var)) {
            return Some(ty.clone());
        }
        if let Some(ty) = self.arg_position(var).and_then(|n| self.arg_types.get(n)) {
            return Some(ty.clone());
        }
        if let Some(ty) = self.reg_types.get(&var.reg) {
            return Some(ty.clone());
        }
        match var.reg.class() {
            RegClass::Fpr => Some(TypeSpec::Float),
            _ => None,
        }
    }

    fn variable_name(&self, var: &Variable) -> String {
        match self.version(var) {
            Some(n) => format!("{}-{}", var.reg, n),
            None => match var.reg.arg_index() {
                Some(n) => format!("arg{n}"),
                None => var.reg.to_string(),
            },
        }
    }

    fn return_type(&self) -> Option<TypeSpec> {
        self.return_type.clone()
    }

    fn field_access(&self, base: &TypeSpec, offset: i64, _size: u8) -> Option<FieldAccess> {
        self.fields.get(&(base.to_string(), offset)).cloned()
    }

    fn label_string(&self, label: &str) -> Option<String> {
        self.strings.get(label).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ExprKind, FunctionBuilder, Operand};

    fn sample() -> Function {
        let mut b = FunctionBuilder::new("names");
        b.mov(Register::V1, Register::A0)
            .set(Register::V1, ExprKind::Add, [Register::V1.into(), Operand::Int(1)])
            .mov(Register::V0, Register::V1);
        b.finish().unwrap()
    }

    #[test]
    fn names_follow_definition_order() {
        let function = sample();
        let env = StaticTypeEnv::new(&function);

        assert_eq!(env.variable_name(&Variable::read(Register::A0, 0)), "arg0");
        assert_eq!(env.variable_name(&Variable::write(Register::V1, 0)), "v1-0");
        assert_eq!(env.variable_name(&Variable::read(Register::V1, 1)), "v1-0");
        assert_eq!(env.variable_name(&Variable::write(Register::V1, 1)), "v1-1");
        assert_eq!(env.variable_name(&Variable::read(Register::V1, 2)), "v1-1");
        assert_eq!(env.variable_name(&Variable::read(Register::S6, 2)), "s6");
    }

    #[test]
    fn type_resolution_order() {
        let function = sample();
        let env = StaticTypeEnv::new(&function)
            .with_args([TypeSpec::UInt])
            .with_register_type(Register::V1, TypeSpec::Int)
            .with_var_type("v1-1", TypeSpec::Symbol);

        assert_eq!(
            env.variable_type(&Variable::read(Register::A0, 0)),
            Some(TypeSpec::UInt)
        );
        assert_eq!(
            env.variable_type(&Variable::write(Register::V1, 0)),
            Some(TypeSpec::Int)
        );
        assert_eq!(
            env.variable_type(&Variable::write(Register::V1, 1)),
            Some(TypeSpec::Symbol)
        );
        assert_eq!(env.variable_type(&Variable::read(Register::V0, 2)), None);
        assert_eq!(
            env.variable_type(&Variable::read(Register::fpr(3).unwrap(), 2)),
            Some(TypeSpec::Float)
        );
    }

    #[test]
    fn fields_and_strings() {
        let env = StaticTypeEnv::new(&sample())
            .with_field(&TypeSpec::named("type"), 4, "parent", None)
            .with_string("L343", "~f~%");
        let access = env.field_access(&TypeSpec::named("type"), 4, 4).unwrap();
        assert_eq!(access.path, vec!["parent".to_string()]);
        assert!(env.field_access(&TypeSpec::named("type"), 8, 4).is_none());
        assert_eq!(env.label_string("L343").as_deref(), Some("~f~%"));
    }
}
