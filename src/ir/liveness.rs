//! Register liveness, used to derive consumed-register sets.
//!
//! A register is *live* at a program point if some path from that point reads
//! it before writing it. An instruction *consumes* a register it reads when the
//! value it reads is dead afterwards.
//!
//! # Algorithm
//!
//! Backward data flow over the basic blocks:
//!
//! - `USE[B]` = registers read in B before any write
//! - `DEF[B]` = registers written in B
//! - `OUT[B]` = ∪{IN[S] | S is a successor of B}, the return register for exits
//! - `IN[B]` = USE[B] ∪ (OUT[B] - DEF[B])
//!
//! Delay-slot effects are attributed to their branch instruction.

use crate::ir::{Function, RegSet};

/// Per-block liveness solution.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLiveness {
    /// Registers live on entry of each block
    pub live_in: Vec<RegSet>,
    /// Registers live on exit of each block
    pub live_out: Vec<RegSet>,
}

/// Solves block-level liveness for `function`.
///
/// Blocks without successors keep the function's return register live.
/// Block ranges past the end of the instruction list contribute nothing; use
/// [`Function::validate`] to reject them.
#[must_use]
pub fn solve(function: &Function) -> BlockLiveness {
    let count = function.blocks.len();
    let mut use_sets = Vec::with_capacity(count);
    let mut def_sets = Vec::with_capacity(count);

    for block in &function.blocks {
        let mut uses = RegSet::new();
        let mut defs = RegSet::new();
        for instr in function.instructions.get(block.range()).unwrap_or_default() {
            uses.union_with(&instr.op.reads().difference(defs));
            defs.union_with(&instr.op.writes());
        }
        use_sets.push(uses);
        def_sets.push(defs);
    }

    let exit = RegSet::of(function.return_register);
    let mut live_in = vec![RegSet::new(); count];
    let mut live_out = vec![RegSet::new(); count];

    let mut changed = true;
    while changed {
        changed = false;
        for (b, block) in function.blocks.iter().enumerate().rev() {
            let out = if block.successors.is_empty() {
                exit
            } else {
                block
                    .successors
                    .iter()
                    .filter_map(|s| live_in.get(s.index()))
                    .fold(RegSet::new(), |acc, s| acc.union(*s))
            };
            let inp = use_sets[b].union(out.difference(def_sets[b]));
            if out != live_out[b] || inp != live_in[b] {
                live_out[b] = out;
                live_in[b] = inp;
                changed = true;
            }
        }
    }

    BlockLiveness { live_in, live_out }
}

/// Computes the consumed-register set of every instruction.
///
/// The result is indexed like `function.instructions`.
#[must_use]
pub fn compute_consumed(function: &Function) -> Vec<RegSet> {
    walk(function).0
}

/// Computes the registers live immediately after every instruction.
///
/// The result is indexed like `function.instructions`.
#[must_use]
pub fn live_after(function: &Function) -> Vec<RegSet> {
    walk(function).1
}

// backward walk of every block, yielding (consumed, live after) per instruction
fn walk(function: &Function) -> (Vec<RegSet>, Vec<RegSet>) {
    let liveness = solve(function);
    let mut consumed = vec![RegSet::new(); function.instructions.len()];
    let mut after = vec![RegSet::new(); function.instructions.len()];

    for (position, block) in function.blocks.iter().enumerate() {
        let mut live = liveness.live_out[position];
        for idx in block.range().rev() {
            let Some(instr) = function.instructions.get(idx) else {
                continue;
            };
            let op = &instr.op;
            let reads = op.reads();
            let writes = op.writes();
            after[idx] = live;
            let live_after = live.difference(writes);
            consumed[idx] = reads.difference(live_after);
            live = live_after.union(reads);
        }
    }

    (consumed, after)
}

/// Recomputes and stores the consumed sets of every instruction in `function`.
pub fn annotate(function: &mut Function) {
    let consumed = compute_consumed(function);
    for (instr, set) in function.instructions.iter_mut().zip(consumed) {
        instr.consumed = set;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ExprKind, FunctionBuilder, Operand, Register};

    #[test]
    fn straight_line_consumption() {
        let mut b = FunctionBuilder::new("add");
        b.set(Register::V1, ExprKind::Add, [Register::A0.into(), Register::A1.into()])
            .mov(Register::V0, Register::V1);
        let function = b.finish().unwrap();

        let consumed = compute_consumed(&function);
        assert!(consumed[0].contains(Register::A0));
        assert!(consumed[0].contains(Register::A1));
        assert!(consumed[1].contains(Register::V1));
        // v0 is the return value and stays live
        assert!(!consumed[1].contains(Register::V0));
    }

    #[test]
    fn loop_keeps_registers_live() {
        let mut b = FunctionBuilder::new("count");
        b.label("top")
            .set(Register::V1, ExprKind::Add, [Register::V1.into(), Operand::Int(1)])
            .branch(
                crate::ir::ConditionKind::NotEqual,
                [Register::V1.into(), Register::A0.into()],
                "top",
            )
            .mov(Register::V0, Register::V1);
        let function = b.finish().unwrap();

        let consumed = compute_consumed(&function);
        // v1 and a0 are read again on the next iteration
        assert!(!consumed[1].contains(Register::V1));
        assert!(!consumed[1].contains(Register::A0));
        assert!(consumed[2].contains(Register::V1));
    }

    #[test]
    fn block_past_the_end_is_skipped() {
        let mut b = FunctionBuilder::new("overrun");
        b.mov(Register::V0, Register::A0);
        let mut function = b.finish().unwrap();
        function.blocks[0].end = 9;

        let consumed = compute_consumed(&function);
        assert_eq!(consumed.len(), function.instructions.len());
        assert!(consumed[0].contains(Register::A0));
    }

    #[test]
    fn live_after_tracks_dead_writes() {
        let mut b = FunctionBuilder::new("dead");
        b.mov(Register::V1, Operand::Int(1))
            .mov(Register::V0, Operand::Int(2));
        let function = b.finish().unwrap();

        let after = live_after(&function);
        assert!(!after[0].contains(Register::V1));
        assert!(after[1].contains(Register::V0));
    }
}
