use kiln_ir::BinaryOp;
use kiln_lir::BlockId;
use pretty_assertions::assert_eq;

use super::liveness::compute_liveness;
use super::{build_intervals, linear_scan, remove_fallthrough_jumps, Interval, Location, Rewriter};
use crate::machine::{Convention, MInst, MachineBlock, Operand, Reg, VReg};
use crate::test_helpers::tight;

fn v(n: u32) -> Operand {
    Operand::Virtual(VReg::new(n))
}

fn block(id: u32, insts: Vec<MInst>) -> MachineBlock {
    MachineBlock {
        id: BlockId::new(id),
        insts,
    }
}

fn add(dst: Operand, lhs: Operand, rhs: Operand) -> MInst {
    MInst::Binary {
        op: BinaryOp::Add,
        dst,
        lhs,
        rhs,
    }
}

/// `v2` counts up to `v0`:
///
/// ```text
/// bb0: mov v1, #0; pmov v2 <- v1; jmp bb1
/// bb1: blt v2, v0, bb2, bb3
/// bb2: addi v3, v2, #1; pmov v2 <- v3; jmp bb1
/// bb3: ret v2
/// ```
fn counting_loop() -> Vec<MachineBlock> {
    vec![
        block(
            0,
            vec![
                MInst::Mov {
                    dst: v(1),
                    src: Operand::Imm(0),
                },
                MInst::ParallelMove {
                    moves: vec![(v(2), v(1))],
                },
                MInst::Jump {
                    target: BlockId::new(1),
                },
            ],
        ),
        block(
            1,
            vec![MInst::CompareBranch {
                op: BinaryOp::Lt,
                lhs: v(2),
                rhs: v(0),
                then_block: BlockId::new(2),
                else_block: BlockId::new(3),
            }],
        ),
        block(
            2,
            vec![
                add(v(3), v(2), Operand::Imm(1)),
                MInst::ParallelMove {
                    moves: vec![(v(2), v(3))],
                },
                MInst::Jump {
                    target: BlockId::new(1),
                },
            ],
        ),
        block(3, vec![MInst::Ret { value: Some(v(2)) }]),
    ]
}

fn vregs(ns: &[u32]) -> Vec<VReg> {
    ns.iter().map(|n| VReg::new(*n)).collect()
}

fn sorted(set: &super::liveness::LiveSet) -> Vec<VReg> {
    let mut out: Vec<_> = set.iter().copied().collect();
    out.sort();
    out
}

#[test]
fn liveness_flows_around_the_back_edge() {
    let liveness = compute_liveness(&counting_loop());
    assert_eq!(sorted(&liveness.live_in[0]), vregs(&[0]));
    assert_eq!(sorted(&liveness.live_in[1]), vregs(&[0, 2]));
    assert_eq!(sorted(&liveness.live_out[2]), vregs(&[0, 2]));
    assert_eq!(sorted(&liveness.live_in[2]), vregs(&[0, 2]));
    assert_eq!(sorted(&liveness.live_in[3]), vregs(&[2]));
    assert!(liveness.live_out[3].is_empty());
}

#[test]
fn intervals_span_the_whole_loop() {
    let intervals = build_intervals(&counting_loop(), &[v(0)], 4);
    let spans: Vec<_> = intervals
        .iter()
        .map(|iv| (iv.vreg.raw(), iv.start, iv.end))
        .collect();
    // Positions: bb0 0..=2, bb1 3, bb2 4..=6, bb3 7.
    assert_eq!(spans, [(0, 0, 6), (1, 0, 1), (2, 1, 7), (3, 4, 5)]);
}

#[test]
fn the_furthest_interval_is_spilled() {
    let interval = |n, start, end| Interval {
        vreg: VReg::new(n),
        start,
        end,
    };
    // One allocatable register.
    let locations = linear_scan(
        vec![interval(0, 0, 10), interval(1, 1, 2), interval(2, 2, 3)],
        &tight(3),
    );
    assert_eq!(
        locations,
        [Location::Spill(0), Location::Reg(Reg(0)), Location::Spill(0)]
    );
}

#[test]
fn expired_registers_are_reused_lowest_first() {
    let interval = |n, start, end| Interval {
        vreg: VReg::new(n),
        start,
        end,
    };
    let locations = linear_scan(
        vec![interval(0, 0, 1), interval(1, 0, 4), interval(2, 2, 3)],
        &tight(4),
    );
    assert_eq!(
        locations,
        [
            Location::Reg(Reg(0)),
            Location::Reg(Reg(1)),
            Location::Reg(Reg(0))
        ]
    );
}

fn rewriter_text(locations: &[Location], words: &[u64], inst: MInst) -> Vec<String> {
    let rewriter = Rewriter {
        locations,
        vreg_words: words,
        scratch: [Reg(14), Reg(15)],
    };
    rewriter.rewrite(inst).iter().map(ToString::to_string).collect()
}

#[test]
fn spilled_operands_go_through_scratch_registers() {
    let locations = [Location::Spill(0), Location::Spill(8), Location::Reg(Reg(0))];
    let words = [1, 1, 1];

    assert_eq!(
        rewriter_text(&locations, &words, add(v(2), v(0), v(1))),
        ["ld r14, [fp+0]", "ld r15, [fp+8]", "add r0, r14, r15"]
    );
    assert_eq!(
        rewriter_text(&locations, &words, add(v(0), v(2), v(2))),
        ["add r14, r0, r0", "st [fp+0], r14"]
    );
    assert_eq!(
        rewriter_text(&locations, &words, add(v(2), v(1), v(1))),
        ["ld r14, [fp+8]", "add r0, r14, r14"]
    );
}

#[test]
fn spilled_call_arguments_are_passed_in_place() {
    let locations = [Location::Spill(0), Location::Reg(Reg(3))];
    let call = MInst::Call {
        callee: "f".to_owned(),
        conv: Convention::Native,
        args: vec![v(0), v(1), Operand::Imm(2)],
        dst: Some(v(0)),
    };
    assert_eq!(
        rewriter_text(&locations, &[1, 1], call),
        ["call @f([fp+0], r3, #2) -> r14", "st [fp+0], r14"]
    );
}

#[test]
fn spilled_vectors_reload_whole() {
    let locations = [Location::Spill(16), Location::Reg(Reg(1))];
    let inst = MInst::VBinary {
        op: BinaryOp::Mul,
        dst: v(1),
        lhs: v(0),
        rhs: v(0),
        width: 4,
    };
    assert_eq!(
        rewriter_text(&locations, &[4, 4], inst),
        ["vld.4 r14, [fp+16]", "vmul.4 r1, r14, r14"]
    );
}

#[test]
fn jumps_to_the_next_block_fall_through() {
    let mut blocks = counting_loop();
    remove_fallthrough_jumps(&mut blocks);
    assert!(!matches!(blocks[0].insts.last(), Some(MInst::Jump { .. })));
    assert!(matches!(blocks[2].insts.last(), Some(MInst::Jump { .. })));
}
