//! Expression reconstruction integration tests.
//!
//! These tests drive the complete pipeline through the public API:
//! 1. Build a lifted function with `FunctionBuilder`
//! 2. Describe its types with `StaticTypeEnv`
//! 3. Run the `Reconstructor` over a linear region
//! 4. Render the result and inspect the element tree and the event log

use formscope::{
    forms::visit::{apply_form, count_elements},
    ir::SpecialKind,
    prelude::*,
};

/// Reconstructs `function` as one straight-line region and renders it.
fn render_linear(engine: &Reconstructor, function: &Function, env: &StaticTypeEnv) -> Result<String> {
    let out = engine.reconstruct(function, &Region::linear(function), env)?;
    Ok(out.render(function, env, &engine.config().operators).to_string())
}

/// Counts the elements reachable from the root that satisfy `pick`.
fn count_reachable(out: &Reconstruction, pick: impl Fn(&FormElement) -> bool) -> usize {
    let mut found = 0;
    apply_form(out.pool(), out.root(), &mut |pool: &FormPool, elt: ElementId| {
        if pick(pool.element(elt)) {
            found += 1;
        }
    });
    found
}

#[test]
fn test_add_without_casts() -> Result<()> {
    // v1 <- a0 ; v0 <- v1 + a1
    let mut b = FunctionBuilder::new("sum");
    b.mov(Register::V1, Register::A0)
        .set(Register::V0, ExprKind::Add, [Register::V1.into(), Register::A1.into()]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function)
        .with_args([TypeSpec::Int, TypeSpec::Int])
        .with_return_type(TypeSpec::Int);

    let engine = Reconstructor::new(EngineConfig::default());
    assert_eq!(render_linear(&engine, &function, &env)?, "(+ arg0 arg1)");
    assert!(!engine.events().has(EventKind::CastInserted));
    assert_eq!(engine.events().count_kind(EventKind::FunctionCompleted), 1);
    Ok(())
}

#[test]
fn test_add_with_signedness_cast() -> Result<()> {
    let mut b = FunctionBuilder::new("mixed-sum");
    b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function).with_args([TypeSpec::Int, TypeSpec::UInt]);

    let engine = Reconstructor::new(EngineConfig::default());
    assert_eq!(
        render_linear(&engine, &function, &env)?,
        "(+ arg0 (the-as int arg1))"
    );
    assert_eq!(engine.events().count_kind(EventKind::CastInserted), 1);
    Ok(())
}

#[test]
fn test_casts_can_be_disabled() -> Result<()> {
    let mut b = FunctionBuilder::new("mixed-sum");
    b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function).with_args([TypeSpec::Int, TypeSpec::UInt]);

    let engine = Reconstructor::new(EngineConfig::default().with_casts(false));
    assert_eq!(render_linear(&engine, &function, &env)?, "(+ arg0 arg1)");
    assert!(!engine.events().has(EventKind::CastInserted));
    Ok(())
}

#[test]
fn test_boolean_materialization_is_one_condition() -> Result<()> {
    // v1 <- a0 < a1 ; v0 <- #t ; v0 <- #f unless v1
    let mut b = FunctionBuilder::new("less?");
    b.set(Register::V1, ExprKind::LessThanSigned, [Register::A0.into(), Register::A1.into()])
        .mov(Register::V0, Operand::symbol("#t"))
        .cmove(Register::V0, Operand::symbol("#f"), Register::V1, true);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function);

    let engine = Reconstructor::new(EngineConfig::default());
    let out = engine.reconstruct(&function, &Region::linear(&function), &env)?;
    let text = out.render(&function, &env, &engine.config().operators).to_string();

    assert_eq!(text, "(< arg0 arg1)");
    assert_eq!(count_reachable(&out, |e| matches!(e, FormElement::Condition(_))), 1);
    assert!(engine.events().has(EventKind::IdiomRecognized));
    Ok(())
}

#[test]
fn test_condition_in_value_and_test_position() -> Result<()> {
    // The same comparison renders as a value when stored and as a test when branched on.
    let mut b = FunctionBuilder::new("as-value");
    b.set_condition(
        Register::V0,
        ConditionKind::LessThanSigned,
        [Register::A0.into(), Register::A1.into()],
    );
    let as_value = b.finish()?;
    let env = StaticTypeEnv::new(&as_value);
    let engine = Reconstructor::new(EngineConfig::default());
    assert_eq!(render_linear(&engine, &as_value, &env)?, "(< arg0 arg1)");

    let mut b = FunctionBuilder::new("as-test");
    b.branch(
        ConditionKind::GreaterOrEqualSigned,
        [Register::A0.into(), Register::A1.into()],
        "end",
    )
    .call(Register::T9, &[Register::A0])
    .label("end");
    let as_test = b.finish()?;
    let env = StaticTypeEnv::new(&as_test);
    let region = Region::conditional(vec![CondArm::new(Region::block(0), Region::block(1))], None);
    let out = engine.reconstruct(&as_test, &region, &env)?;
    let text = out.render(&as_test, &env, &engine.config().operators).to_string();
    assert!(text.starts_with("(if (< arg0 arg1) "), "{text}");
    Ok(())
}

#[test]
fn test_fold_never_crosses_a_store() -> Result<()> {
    // t0 <- [a0] ; [a0] <- a1 ; v0 <- t0 + 1
    let mut b = FunctionBuilder::new("swap-in");
    b.load(Register::T0, Register::A0, 0, 4, LoadKind::Signed)
        .store(Register::A0, 0, Register::A1, 4, StoreKind::Integer)
        .set(Register::V0, ExprKind::Add, [Register::T0.into(), Operand::Int(1)]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function);

    let engine = Reconstructor::new(EngineConfig::default());
    assert_eq!(
        render_linear(&engine, &function, &env)?,
        "(begin (set! t0-0 (l.w arg0)) (set! (l.w arg0) arg1) (+ t0-0 1))"
    );
    Ok(())
}

#[test]
fn test_load_folds_when_nothing_intervenes() -> Result<()> {
    let mut b = FunctionBuilder::new("next");
    b.load(Register::T0, Register::A0, 8, 4, LoadKind::Signed)
        .set(Register::V0, ExprKind::Add, [Register::T0.into(), Operand::Int(1)]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function);

    let engine = Reconstructor::new(EngineConfig::default());
    assert_eq!(render_linear(&engine, &function, &env)?, "(+ (l.w (+ arg0 8)) 1)");
    Ok(())
}

#[test]
fn test_field_access_through_the_type_env() -> Result<()> {
    let mut b = FunctionBuilder::new("parent-of");
    b.load(Register::V0, Register::A0, 4, 4, LoadKind::Signed);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function)
        .with_args([TypeSpec::named("type")])
        .with_field(&TypeSpec::named("type"), 4, "parent", None);

    let engine = Reconstructor::new(EngineConfig::default());
    assert_eq!(render_linear(&engine, &function, &env)?, "(-> arg0 parent)");

    let literal = Reconstructor::new(EngineConfig::default().with_idioms(IdiomSet::empty()));
    assert_eq!(render_linear(&literal, &function, &env)?, "(l.w (+ arg0 4))");
    Ok(())
}

#[test]
fn test_opaque_operations_are_kept_as_wrappers() -> Result<()> {
    let mut b = FunctionBuilder::new("vector-op");
    b.special(SpecialKind::Suspend)
        .asm("pextlw", Some(Register::V0), [Register::A0.into(), Register::A1.into()]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function);

    let engine = Reconstructor::new(EngineConfig::default());
    let out = engine.reconstruct(&function, &Region::linear(&function), &env)?;
    let text = out.render(&function, &env, &engine.config().operators).to_string();

    assert_eq!(text, "(begin (suspend) (.pextlw v0-0 arg0 arg1))");
    assert_eq!(count_elements(out.pool(), out.root()), 2);
    assert_eq!(engine.events().count_kind(EventKind::OpaqueOperation), 2);
    Ok(())
}

#[test]
fn test_refold_changes_nothing() -> Result<()> {
    let mut b = FunctionBuilder::new("chain");
    b.mov(Register::V1, Register::A0)
        .set(Register::T0, ExprKind::Add, [Register::V1.into(), Operand::Int(4)])
        .store(Register::A1, 0, Register::T0, 4, StoreKind::Integer)
        .set(Register::V0, ExprKind::Sub, [Register::T0.into(), Register::A2.into()]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function);

    let engine = Reconstructor::new(EngineConfig::default());
    let mut out = engine.reconstruct(&function, &Region::linear(&function), &env)?;
    let before = out.render(&function, &env, &engine.config().operators);
    let elements = out.pool().element_count();

    assert!(!out.refold(&function));
    assert!(!out.refold(&function));
    assert_eq!(out.render(&function, &env, &engine.config().operators), before);
    assert_eq!(out.pool().element_count(), elements);
    Ok(())
}

#[test]
fn test_rendering_is_deterministic() -> Result<()> {
    let mut b = FunctionBuilder::new("poly");
    b.set(Register::T0, ExprKind::MulSigned, [Register::A0.into(), Register::A0.into()])
        .set(Register::T1, ExprKind::MulSigned, [Register::A1.into(), Operand::Int(3)])
        .set(Register::V0, ExprKind::Add, [Register::T0.into(), Register::T1.into()]);
    let function = b.finish()?;
    let env = StaticTypeEnv::new(&function);

    let first = Reconstructor::new(EngineConfig::default());
    let second = Reconstructor::new(EngineConfig::default());
    let a = render_linear(&first, &function, &env)?;
    let b = render_linear(&second, &function, &env)?;
    assert_eq!(a, b);

    let out = first.reconstruct(&function, &Region::linear(&function), &env)?;
    assert_eq!(
        out.to_pretty(&function, &env, first.config()),
        out.to_pretty(&function, &env, first.config())
    );
    Ok(())
}

#[test]
fn test_malformed_region_is_reported_per_function() -> Result<()> {
    let function = FunctionBuilder::new("empty").finish()?;
    let env = StaticTypeEnv::new(&function);
    let engine = Reconstructor::new(EngineConfig::default());

    let err = match engine.reconstruct(&function, &Region::block(3), &env) {
        Err(err) => err,
        Ok(_) => panic!("a region naming a missing block must fail"),
    };
    assert_eq!(err.tag(), DiagnosticTag::InvalidHandle);
    assert!(matches!(&err, Error::Reconstruction { function, .. } if function == "empty"));
    assert_eq!(engine.events().count_kind(EventKind::FunctionFailed), 1);
    assert!(!engine.events().has(EventKind::FunctionCompleted));
    Ok(())
}

#[test]
fn test_batch_reports_each_function() -> Result<()> {
    let mut good = FunctionBuilder::new("good");
    good.set(Register::V0, ExprKind::Add, [Register::A0.into(), Operand::Int(1)]);
    let mut also_good = FunctionBuilder::new("also-good");
    also_good.mov(Register::V0, Register::A1);
    let mut bad = FunctionBuilder::new("bad");
    bad.mov(Register::V0, Operand::Int(1));
    let bad = bad.finish()?;

    let jobs = vec![
        FunctionJob::linear(good.finish()?),
        FunctionJob::new(bad.clone(), Region::Loop(vec![Region::block(0)]), StaticTypeEnv::new(&bad)),
        FunctionJob::linear(also_good.finish()?),
    ];
    let engine = Reconstructor::new(EngineConfig::default());
    let report = engine.reconstruct_batch(&jobs);

    assert_eq!(report.len(), 3);
    assert_eq!(
        report.succeeded(),
        vec!["also-good".to_string(), "good".to_string()]
    );
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "bad");
    assert_eq!(failed[0].1.tag(), DiagnosticTag::UnrecognizedBranchShape);

    assert_eq!(engine.events().count_kind(EventKind::FunctionStarted), 3);
    assert_eq!(engine.events().count_kind(EventKind::FunctionCompleted), 2);
    assert_eq!(engine.events().count_kind(EventKind::FunctionFailed), 1);
    assert!(engine.events().filter_function("bad").count() >= 2);
    Ok(())
}
