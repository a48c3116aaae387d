//! The per-function reconstruction pipeline and the parallel batch driver.

use dashmap::{mapref::one::Ref, DashMap};
use rayon::prelude::*;

use crate::{
    engine::{EngineConfig, EventKind, EventLog},
    expr::{Folder, FormStack},
    forms::{FormElement, FormId, FormPool, OperatorTable, Renderer, Sexp},
    ir::{AccessMode, Function, RegSet, Register, SimpleAtom, Variable},
    structure::{Region, Structurer},
    types::{StaticTypeEnv, TypeEnv},
    Error, Result,
};

/// The finished element tree of one function.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pool: FormPool,
    root: FormId,
}

impl Reconstruction {
    /// The arena holding every element of the function.
    #[must_use]
    pub fn pool(&self) -> &FormPool {
        &self.pool
    }

    /// The top-level form.
    #[must_use]
    pub fn root(&self) -> FormId {
        self.root
    }

    /// Renders the tree.
    #[must_use]
    pub fn render(&self, function: &Function, env: &dyn TypeEnv, operators: &OperatorTable) -> Sexp {
        Renderer::new(&self.pool, function, env, operators).render_form(self.root)
    }

    /// Renders the tree as indented text, wrapped at the configured width.
    #[must_use]
    pub fn to_pretty(&self, function: &Function, env: &dyn TypeEnv, config: &EngineConfig) -> String {
        self.render(function, env, &config.operators)
            .pretty(config.render_width)
    }

    /// Runs the stack protocol over every form of the finished tree again.
    ///
    /// Each `set!` pops the values of the registers its operands read for the
    /// last time, under the same rules the folder applies while building.
    /// Returns `true` if anything changed. Folding is idempotent: a tree
    /// produced by [`Reconstructor::reconstruct`] is left as is, and so is a
    /// tree that was refolded once.
    pub fn refold(&mut self, function: &Function) -> bool {
        let mut changed = false;
        let mut pending = vec![self.root];
        while let Some(form) = pending.pop() {
            let elements = self.pool.elements_of(form).to_vec();
            let mut stack = FormStack::new();
            for elt in &elements {
                let src = match self.pool.element(*elt) {
                    FormElement::SetVar(set) => set.src,
                    _ => {
                        stack.push_form_element(*elt, true);
                        continue;
                    }
                };
                changed |= self.fold_operands(function, src, &mut stack);
                stack.push_set_var(&self.pool, *elt);
            }
            let rewritten = stack.rewrite(&mut self.pool);
            for elt in &rewritten {
                pending.extend(self.pool.element(*elt).child_forms());
            }
            if rewritten != elements {
                self.pool.set_elements(form, rewritten);
                changed = true;
            }
        }
        changed
    }

    // pops consumed operands of `src` off `stack` and splices them in place
    fn fold_operands(&mut self, function: &Function, src: FormId, stack: &mut FormStack) -> bool {
        let operands = self.operand_slots(src);
        let regs: Vec<Register> = operands.iter().map(|(_, var)| var.reg).collect();
        let mut changed = false;

        for (i, (slot, var)) in operands.iter().enumerate().rev() {
            let consumed = function
                .instruction(var.idx)
                .map_or(false, |instr| instr.consumed.contains(var.reg));
            if !consumed || regs.iter().filter(|r| **r == var.reg).count() > 1 {
                continue;
            }
            let barrier: RegSet = regs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, r)| *r)
                .collect();
            if let Some(value) = stack.pop_reg(&self.pool, var.reg, &barrier, true) {
                let folded = self.pool.elements_of(value).to_vec();
                self.pool.set_elements(*slot, folded);
                changed = true;
            }
        }
        changed
    }

    // register reads that `src` or its direct operands consist of
    fn operand_slots(&self, src: FormId) -> Vec<(FormId, Variable)> {
        let read_of = |form: FormId| match self.pool.try_as_single_element(form).map(|elt| self.pool.element(elt)) {
            Some(FormElement::Atom(SimpleAtom::Var(var))) if var.mode == AccessMode::Read => Some(*var),
            _ => None,
        };
        if let Some(var) = read_of(src) {
            return vec![(src, var)];
        }
        let Some(elt) = self.pool.try_as_single_element(src) else {
            return Vec::new();
        };
        let element = self.pool.element(elt);
        if element.is_control() || matches!(element, FormElement::Condition(_)) {
            return Vec::new();
        }
        element
            .child_forms()
            .into_iter()
            .filter_map(|child| read_of(child).map(|var| (child, var)))
            .collect()
    }

    /// Checks that every element reachable from the root links back to its parent.
    fn check_links(&self) -> Result<()> {
        let mut pending = vec![self.root];
        while let Some(form) = pending.pop() {
            for elt in self.pool.elements_of(form) {
                if self.pool.parent_form(*elt) != Some(form) {
                    return Err(Error::InvalidHandle(format!("{elt} is not linked to {form}")));
                }
                for child in self.pool.element(*elt).child_forms() {
                    if self.pool.parent_element(child) != Some(*elt) {
                        return Err(Error::InvalidHandle(format!("{child} is not linked to {elt}")));
                    }
                    pending.push(child);
                }
            }
        }
        Ok(())
    }
}

/// One function of a batch.
pub struct FunctionJob {
    /// The lifted function
    pub function: Function,
    /// Its block grouping
    pub region: Region,
    /// Types and names of its variables
    pub env: Box<dyn TypeEnv>,
}

impl FunctionJob {
    /// Creates a job.
    pub fn new(function: Function, region: Region, env: impl TypeEnv + 'static) -> Self {
        FunctionJob {
            function,
            region,
            env: Box::new(env),
        }
    }

    /// Creates a job that folds `function` block by block with default types.
    #[must_use]
    pub fn linear(function: Function) -> Self {
        let region = Region::linear(&function);
        let env = StaticTypeEnv::new(&function);
        FunctionJob::new(function, region, env)
    }
}

/// Results of [`Reconstructor::reconstruct_batch`], one per job.
///
/// Entries are keyed by job position, so jobs sharing a function name keep
/// separate results.
#[derive(Default)]
pub struct BatchReport {
    results: DashMap<usize, (String, Result<Reconstruction>)>,
}

impl BatchReport {
    /// The result of the first job named `function`.
    #[must_use]
    pub fn get(&self, function: &str) -> Option<Ref<'_, usize, (String, Result<Reconstruction>)>> {
        let index = self
            .results
            .iter()
            .filter(|entry| entry.value().0 == function)
            .map(|entry| *entry.key())
            .min()?;
        self.results.get(&index)
    }

    /// The function name and result of job `index`.
    #[must_use]
    pub fn get_job(&self, index: usize) -> Option<Ref<'_, usize, (String, Result<Reconstruction>)>> {
        self.results.get(&index)
    }

    /// Number of jobs in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Names of the functions that were reconstructed, sorted.
    #[must_use]
    pub fn succeeded(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .results
            .iter()
            .filter(|entry| entry.value().1.is_ok())
            .map(|entry| entry.value().0.clone())
            .collect();
        out.sort();
        out
    }

    /// Failed functions with their errors, sorted by name.
    #[must_use]
    pub fn failed(&self) -> Vec<(String, Error)> {
        let mut out: Vec<(String, Error)> = self
            .results
            .iter()
            .filter_map(|entry| match &entry.value().1 {
                Err(err) => Some((entry.value().0.clone(), err.clone())),
                Ok(_) => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Rebuilds expression and control trees from lifted functions.
///
/// A reconstructor holds an immutable configuration and a shared event log.
/// Each call owns its own arena and stacks, so functions can be processed
/// concurrently through `&self`.
///
/// # Examples
///
/// ```rust
/// use formscope::prelude::*;
///
/// let mut b = FunctionBuilder::new("add");
/// b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
/// let function = b.finish()?;
/// let env = StaticTypeEnv::new(&function);
///
/// let engine = Reconstructor::new(EngineConfig::default());
/// let out = engine.reconstruct(&function, &Region::linear(&function), &env)?;
/// let text = out.render(&function, &env, &engine.config().operators).to_string();
/// assert_eq!(text, "(+ arg0 arg1)");
/// # Ok::<(), formscope::Error>(())
/// ```
pub struct Reconstructor {
    config: EngineConfig,
    events: EventLog,
}

impl Reconstructor {
    /// Creates a reconstructor with an empty event log.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Reconstructor {
            config,
            events: EventLog::new(),
        }
    }

    /// The configuration shared by every function.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Events recorded so far, across all functions.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Reconstructs one function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reconstruction`] naming the function and the failing
    /// instruction when the input is malformed, a region does not have the
    /// branch layout of its kind, or a fold hits an inconsistent consumed set.
    pub fn reconstruct(&self, function: &Function, region: &Region, env: &dyn TypeEnv) -> Result<Reconstruction> {
        self.events
            .record(EventKind::FunctionStarted)
            .function(&function.name);

        match self.run(function, region, env) {
            Ok(result) => {
                self.events
                    .record(EventKind::FunctionCompleted)
                    .function(&function.name)
                    .message(format!("{} elements", result.pool.element_count()));
                Ok(result)
            }
            Err(err) => {
                let err = err.in_function(&function.name);
                self.events
                    .record(EventKind::FunctionFailed)
                    .function(&function.name)
                    .at(err.instruction().unwrap_or(0))
                    .message(err.to_string());
                Err(err)
            }
        }
    }

    fn run(&self, function: &Function, region: &Region, env: &dyn TypeEnv) -> Result<Reconstruction> {
        function.validate()?;
        region.validate(function, self.config.max_region_depth)?;

        let mut folder = Folder::new(function, env, &self.config, &self.events);
        let root = Structurer::new(&mut folder).build(region)?;
        if self.config.strip_return_value {
            strip_return_value(&mut folder, root);
        }

        let result = Reconstruction {
            pool: folder.into_pool(),
            root,
        };
        result.check_links()?;
        Ok(result)
    }

    /// Reconstructs every job in parallel.
    ///
    /// A failing function never affects the others: its error is stored in
    /// the report and a [`EventKind::FunctionFailed`] event is recorded.
    pub fn reconstruct_batch(&self, jobs: &[FunctionJob]) -> BatchReport {
        let report = BatchReport::default();
        jobs.par_iter().enumerate().for_each(|(index, job)| {
            let result = self.reconstruct(&job.function, &job.region, job.env.as_ref());
            report.results.insert(index, (job.function.name.clone(), result));
        });
        report
    }
}

/// Turns a trailing `(set! <return-reg> x)` of the root into `x`.
fn strip_return_value(folder: &mut Folder<'_>, root: FormId) {
    let return_register = folder.function().return_register;
    let Some(&last) = folder.pool().elements_of(root).last() else {
        return;
    };
    let (src, idx) = match folder.pool().element(last) {
        FormElement::SetVar(set) if set.dst.reg == return_register => (set.src, set.dst.idx),
        _ => return,
    };

    let value = match folder.env().return_type() {
        Some(ty) => folder.cast_to(idx, src, &ty),
        None => src,
    };
    let pool = folder.pool_mut();
    let mut elements = pool.elements_of(root).to_vec();
    elements.pop();
    elements.extend_from_slice(pool.elements_of(value));
    pool.set_elements(root, elements);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        forms::{FixedOperatorKind, GenericElement, GenericOperator, SetVarElement, SetVarInfo},
        ir::{ExprKind, FunctionBuilder, Operand, StoreKind},
        types::TypeSpec,
        DiagnosticTag,
    };

    fn add() -> Function {
        let mut b = FunctionBuilder::new("add");
        b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
        b.finish().unwrap()
    }

    #[test]
    fn return_value_is_stripped() {
        let function = add();
        let env = StaticTypeEnv::new(&function);
        let engine = Reconstructor::new(EngineConfig::default());
        let out = engine.reconstruct(&function, &Region::linear(&function), &env).unwrap();
        let text = out.render(&function, &env, &engine.config().operators).to_string();
        assert_eq!(text, "(+ arg0 arg1)");
        assert!(engine.events().has(EventKind::FunctionCompleted));
    }

    #[test]
    fn return_value_is_kept_on_request() {
        let function = add();
        let env = StaticTypeEnv::new(&function);
        let mut config = EngineConfig::default();
        config.strip_return_value = false;
        let engine = Reconstructor::new(config);
        let out = engine.reconstruct(&function, &Region::linear(&function), &env).unwrap();
        let text = out.render(&function, &env, &engine.config().operators).to_string();
        assert_eq!(text, "(set! v0-0 (+ arg0 arg1))");
    }

    #[test]
    fn return_value_is_cast_to_the_declared_type() {
        let function = add();
        let env = StaticTypeEnv::new(&function)
            .with_args([TypeSpec::Int, TypeSpec::Int])
            .with_return_type(TypeSpec::named("pair"));
        let engine = Reconstructor::new(EngineConfig::default());
        let out = engine.reconstruct(&function, &Region::linear(&function), &env).unwrap();
        let text = out.render(&function, &env, &engine.config().operators).to_string();
        assert_eq!(text, "(the-as pair (+ arg0 arg1))");
    }

    #[test]
    fn failure_is_scoped_to_the_function() {
        let function = add();
        let env = StaticTypeEnv::new(&function);
        let engine = Reconstructor::new(EngineConfig::default());
        let err = engine
            .reconstruct(&function, &Region::Loop(vec![Region::block(0)]), &env)
            .unwrap_err();
        match &err {
            Error::Reconstruction { function, tag, .. } => {
                assert_eq!(function, "add");
                assert_eq!(*tag, DiagnosticTag::UnrecognizedBranchShape);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(engine.events().count_kind(EventKind::FunctionFailed), 1);
    }

    #[test]
    fn refold_is_a_no_op() {
        let mut b = FunctionBuilder::new("chain");
        b.mov(Register::V1, Register::A0)
            .set(Register::T0, ExprKind::Add, [Register::V1.into(), Operand::Int(4)])
            .store(Register::A1, 0, Register::T0, 4, StoreKind::Integer)
            .mov(Register::V0, Register::T0);
        let function = b.finish().unwrap();
        let env = StaticTypeEnv::new(&function);
        let engine = Reconstructor::new(EngineConfig::default());
        let mut out = engine.reconstruct(&function, &Region::linear(&function), &env).unwrap();

        let before = out.render(&function, &env, &engine.config().operators).to_string();
        assert!(!out.refold(&function));
        let after = out.render(&function, &env, &engine.config().operators).to_string();
        assert_eq!(before, after);
    }

    #[test]
    fn refold_folds_a_pending_assignment() {
        let mut b = FunctionBuilder::new("sum");
        b.mov(Register::V1, Register::A0)
            .set(Register::V0, ExprKind::Add, [Register::V1.into(), Register::A1.into()]);
        let function = b.finish().unwrap();
        let env = StaticTypeEnv::new(&function);
        let operators = OperatorTable::default();

        // (set! v1-0 arg0) (set! v0-0 (+ v1-0 arg1)), as left by verbatim folding
        let mut pool = FormPool::new();
        let a0 = pool.alloc_single_element_form(FormElement::Atom(SimpleAtom::Var(Variable::read(Register::A0, 0))));
        let set_v1 = pool.alloc_element(FormElement::SetVar(SetVarElement {
            dst: Variable::write(Register::V1, 0),
            src: a0,
            sequence_point: false,
            info: SetVarInfo::empty(),
        }));
        let v1 = pool.alloc_single_element_form(FormElement::Atom(SimpleAtom::Var(Variable::read(Register::V1, 1))));
        let a1 = pool.alloc_single_element_form(FormElement::Atom(SimpleAtom::Var(Variable::read(Register::A1, 1))));
        let sum = pool.alloc_single_element_form(FormElement::Generic(GenericElement {
            op: GenericOperator::Fixed(FixedOperatorKind::Add),
            args: vec![v1, a1],
        }));
        let set_v0 = pool.alloc_element(FormElement::SetVar(SetVarElement {
            dst: Variable::write(Register::V0, 1),
            src: sum,
            sequence_point: false,
            info: SetVarInfo::empty(),
        }));
        let root = pool.alloc_sequence_form(vec![set_v1, set_v0]);
        let mut out = Reconstruction { pool, root };

        assert!(out.refold(&function));
        assert_eq!(out.render(&function, &env, &operators).to_string(), "(set! v0-0 (+ arg0 arg1))");
        assert!(out.check_links().is_ok());
        assert!(!out.refold(&function));
    }

    #[test]
    fn batch_keeps_going_after_a_failure() {
        let mut bad = FunctionBuilder::new("bad");
        bad.mov(Register::V0, Operand::Int(1));
        let bad = bad.finish().unwrap();
        let bad_region = Region::ShortCircuit(vec![Region::block(0)]);

        let jobs = vec![
            FunctionJob::linear(add()),
            FunctionJob::new(bad.clone(), bad_region, StaticTypeEnv::new(&bad)),
        ];
        let engine = Reconstructor::new(EngineConfig::default());
        let report = engine.reconstruct_batch(&jobs);

        assert_eq!(report.len(), 2);
        assert_eq!(report.succeeded(), vec!["add".to_string()]);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "bad");
        assert_eq!(engine.events().count_kind(EventKind::FunctionFailed), 1);
    }

    #[test]
    fn batch_keeps_jobs_with_the_same_name_apart() {
        let mut bad = FunctionBuilder::new("add");
        bad.mov(Register::V0, Operand::Int(1));
        let bad = bad.finish().unwrap();
        let bad_region = Region::ShortCircuit(vec![Region::block(0)]);

        let jobs = vec![
            FunctionJob::linear(add()),
            FunctionJob::new(bad.clone(), bad_region, StaticTypeEnv::new(&bad)),
            FunctionJob::linear(add()),
        ];
        let engine = Reconstructor::new(EngineConfig::default());
        let report = engine.reconstruct_batch(&jobs);

        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded(), vec!["add".to_string(), "add".to_string()]);
        assert_eq!(report.failed().len(), 1);
        assert!(report.get_job(1).is_some_and(|entry| entry.value().1.is_err()));
        assert!(report.get("add").is_some_and(|entry| *entry.key() == 0));
    }

    #[test]
    fn batch_reports_a_block_past_the_end_as_malformed() {
        let mut broken = add();
        broken.blocks[0].end = 5;

        let jobs = vec![
            FunctionJob::new(broken.clone(), Region::block(0), StaticTypeEnv::new(&broken)),
            FunctionJob::linear(add()),
        ];
        let engine = Reconstructor::new(EngineConfig::default());
        let report = engine.reconstruct_batch(&jobs);

        assert_eq!(report.len(), 2);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].1.tag(), DiagnosticTag::MalformedInput);
        assert!(report.get_job(1).is_some_and(|entry| entry.value().1.is_ok()));
    }
}
