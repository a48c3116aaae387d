//! Control-structure reconstruction integration tests.
//!
//! Each test builds a small function whose blocks are grouped by hand into a
//! [`Region`] tree, the way a structuring pass would hand them over, and
//! checks the rendered control element:
//! 1. Loops with the test at the top, at the bottom and after the body
//! 2. Conditionals with and without an else arm, as statements and as values
//! 3. Short-circuit chains
//! 4. Early exits with their unreachable code

use formscope::prelude::*;

/// Reconstructs `function` over `region` and renders the root.
fn render(engine: &Reconstructor, function: &Function, region: &Region) -> Result<String> {
    let env = StaticTypeEnv::new(function);
    let out = engine.reconstruct(function, region, &env)?;
    Ok(out.render(function, &env, &engine.config().operators).to_string())
}

fn engine() -> Reconstructor {
    Reconstructor::new(EngineConfig::default())
}

fn engine_keeping_return_value() -> Reconstructor {
    let mut config = EngineConfig::default();
    config.strip_return_value = false;
    Reconstructor::new(config)
}

/// `if a0 { v0 = 1 } else if a1 { v0 = 2 } else { v0 = 3 }`
fn three_way_with_else() -> Result<(Function, Region)> {
    let mut b = FunctionBuilder::new("pick");
    b.branch(ConditionKind::NonZero, [Register::A0.into()], "second")
        .mov(Register::V0, Operand::Int(1))
        .jump("end")
        .label("second")
        .branch(ConditionKind::NonZero, [Register::A1.into()], "third")
        .mov(Register::V0, Operand::Int(2))
        .jump("end")
        .label("third")
        .mov(Register::V0, Operand::Int(3))
        .label("end");
    let function = b.finish()?;
    let region = Region::conditional(
        vec![
            CondArm::new(Region::block(0), Region::block(1)),
            CondArm::new(Region::block(2), Region::block(3)),
        ],
        Some(Region::block(4)),
    );
    Ok((function, region))
}

#[test]
fn test_while_loop() -> Result<()> {
    let mut b = FunctionBuilder::new("count-down");
    b.jump("test")
        .label("body")
        .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
        .label("test")
        .branch(ConditionKind::NonZero, [Register::A0.into()], "body");
    let function = b.finish()?;
    let region = Region::Loop(vec![Region::block(0), Region::block(1), Region::block(2)]);

    let engine = engine();
    assert_eq!(
        render(&engine, &function, &region)?,
        "(while (nonzero? a0-0) (set! a0-0 (- arg0 1)))"
    );
    assert_eq!(engine.events().count_kind(EventKind::ControlStructureRecognized), 1);
    Ok(())
}

#[test]
fn test_until_loop() -> Result<()> {
    let mut b = FunctionBuilder::new("count-down");
    b.label("top")
        .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
        .label("test")
        .branch(ConditionKind::NonZero, [Register::A0.into()], "top");
    let function = b.finish()?;
    let region = Region::Loop(vec![Region::block(0), Region::block(1)]);

    assert_eq!(
        render(&engine(), &function, &region)?,
        "(until (zero? a0-0) (set! a0-0 (- arg0 1)))"
    );
    Ok(())
}

#[test]
fn test_loop_inside_a_sequence() -> Result<()> {
    let mut b = FunctionBuilder::new("drain");
    b.mov(Register::V0, Operand::Int(0))
        .label("top")
        .branch(ConditionKind::Zero, [Register::A0.into()], "done")
        .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
        .jump("top")
        .label("done")
        .mov(Register::V1, Operand::Int(7));
    let function = b.finish()?;
    let region = Region::Sequence(vec![
        Region::block(0),
        Region::Loop(vec![Region::block(1), Region::block(2)]),
        Region::block(3),
    ]);

    assert_eq!(
        render(&engine(), &function, &region)?,
        "(begin (set! v0-0 0) (while (nonzero? arg0) (set! a0-0 (- arg0 1))) (set! v1-0 7))"
    );
    Ok(())
}

#[test]
fn test_cond_with_else_as_return_value() -> Result<()> {
    let (function, region) = three_way_with_else()?;

    assert_eq!(
        render(&engine(), &function, &region)?,
        "(cond ((zero? arg0) 1) ((zero? arg1) 2) (else 3))"
    );
    assert_eq!(
        render(&engine_keeping_return_value(), &function, &region)?,
        "(set! v0-2 (cond ((zero? arg0) 1) ((zero? arg1) 2) (else 3)))"
    );
    Ok(())
}

#[test]
fn test_cond_without_else_from_false_defaults() -> Result<()> {
    let mut b = FunctionBuilder::new("pick-or-false");
    b.branch_with_delay(
        ConditionKind::NonZero,
        [Register::A0.into()],
        "second",
        Delay::set_false(Register::V0),
    )
    .mov(Register::V0, Operand::Int(1))
    .jump("end")
    .label("second")
    .branch_with_delay(
        ConditionKind::NonZero,
        [Register::A1.into()],
        "end",
        Delay::set_false(Register::V0),
    )
    .mov(Register::V0, Operand::Int(2))
    .label("end");
    let function = b.finish()?;
    let region = Region::conditional(
        vec![
            CondArm::new(Region::block(0), Region::block(1)),
            CondArm::new(Region::block(2), Region::block(3)),
        ],
        None,
    );

    assert_eq!(
        render(&engine_keeping_return_value(), &function, &region)?,
        "(set! v0-3 (cond ((zero? arg0) 1) ((zero? arg1) 2)))"
    );
    Ok(())
}

#[test]
fn test_branch_layout_mismatch_fails_only_that_function() -> Result<()> {
    let mut b = FunctionBuilder::new("broken");
    b.branch(ConditionKind::NonZero, [Register::A0.into()], "else")
        .mov(Register::V0, Operand::Int(1))
        .label("else")
        .mov(Register::V0, Operand::Int(2));
    let broken = b.finish()?;
    let broken_region = Region::conditional(
        vec![CondArm::new(Region::block(0), Region::block(1))],
        Some(Region::block(2)),
    );
    let (pick, pick_region) = three_way_with_else()?;

    let jobs = vec![
        FunctionJob::new(broken.clone(), broken_region, StaticTypeEnv::new(&broken)),
        FunctionJob::new(pick.clone(), pick_region, StaticTypeEnv::new(&pick)),
    ];
    let engine = engine();
    let report = engine.reconstruct_batch(&jobs);

    assert_eq!(report.succeeded(), vec!["pick".to_string()]);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1.tag(), DiagnosticTag::UnrecognizedBranchShape);
    assert!(failed[0].1.to_string().contains("broken"));
    Ok(())
}

#[test]
fn test_short_circuit_chains() -> Result<()> {
    let mut b = FunctionBuilder::new("both");
    b.mov(Register::V0, Register::A0)
        .branch(ConditionKind::False, [Register::V0.into()], "end")
        .mov(Register::V0, Register::A1)
        .label("end");
    let both = b.finish()?;

    let mut b = FunctionBuilder::new("either");
    b.mov(Register::V0, Register::A0)
        .branch(ConditionKind::Truthy, [Register::V0.into()], "end")
        .mov(Register::V0, Register::A1)
        .label("end");
    let either = b.finish()?;

    let region = Region::ShortCircuit(vec![Region::block(0), Region::block(1)]);
    let engine = engine();
    assert_eq!(render(&engine, &both, &region)?, "(and arg0 arg1)");
    assert_eq!(render(&engine, &either, &region)?, "(or arg0 arg1)");
    assert_eq!(engine.events().count_kind(EventKind::ControlStructureRecognized), 2);
    Ok(())
}

#[test]
fn test_return_keeps_unreachable_code() -> Result<()> {
    let mut b = FunctionBuilder::new("early");
    b.mov(Register::V0, Operand::Int(1))
        .ret()
        .mov(Register::V1, Operand::Int(2));
    let function = b.finish()?;
    let region = Region::exit(Region::block(0), Some(Region::block(1)));

    assert_eq!(
        render(&engine(), &function, &region)?,
        "(begin (return 1) (set! v1-0 2))"
    );
    Ok(())
}

#[test]
fn test_region_depth_limit() -> Result<()> {
    let mut b = FunctionBuilder::new("deep");
    b.mov(Register::V0, Operand::Int(1));
    let function = b.finish()?;

    let mut region = Region::block(0);
    for _ in 0..8 {
        region = Region::Sequence(vec![region]);
    }
    let engine = Reconstructor::new(EngineConfig::default().with_max_region_depth(4));
    let err = match render(&engine, &function, &region) {
        Err(err) => err,
        Ok(text) => panic!("expected the depth limit to trip, got {text}"),
    };
    assert_eq!(err.tag(), DiagnosticTag::RecursionLimit);
    Ok(())
}
