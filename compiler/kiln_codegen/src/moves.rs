//! Sequentialising parallel moves.
//!
//! A parallel move reads every source before writing any destination. It
//! becomes a sequence by emitting, while any remain, a move whose
//! destination no pending move still reads. When every pending move sits
//! on a cycle, the destination of one is first parked in a scratch
//! register and the moves reading it are redirected there, which breaks
//! the cycle.

use crate::machine::{Addr, MInst, Operand, Reg};

/// One allocated move. `dst` is a register or a spill slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Move {
    pub dst: Operand,
    pub src: Operand,
    pub words: u64,
}

/// `park` holds a cycle's displaced value; `via` carries memory to memory
/// moves. The two must differ.
pub(crate) fn sequentialize(moves: &[Move], park: Reg, via: Reg) -> Vec<MInst> {
    let mut pending: Vec<Move> = moves.iter().copied().filter(|m| m.dst != m.src).collect();
    let mut out = Vec::with_capacity(pending.len() + 1);

    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|m| !pending.iter().any(|other| other.src == m.dst));
        if let Some(i) = ready {
            let m = pending.remove(i);
            emit(&mut out, m, via);
            continue;
        }

        let displaced = pending[0].dst;
        let words = pending[0].words;
        emit(
            &mut out,
            Move {
                dst: Operand::Reg(park),
                src: displaced,
                words,
            },
            via,
        );
        for m in &mut pending {
            if m.src == displaced {
                m.src = Operand::Reg(park);
            }
        }
    }
    out
}

fn emit(out: &mut Vec<MInst>, m: Move, via: Reg) {
    let Move { dst, src, words } = m;
    let vector = words > 1;
    let width = u32::try_from(words).unwrap_or(u32::MAX);
    match (dst, src) {
        (Operand::Frame(to), Operand::Frame(from)) if vector => out.push(MInst::Copy {
            dst: Addr::Frame(to),
            src: Addr::Frame(from),
            words,
        }),
        (Operand::Frame(to), Operand::Frame(from)) => {
            out.push(MInst::Load {
                dst: Operand::Reg(via),
                addr: Addr::Frame(from),
            });
            out.push(MInst::Store {
                addr: Addr::Frame(to),
                src: Operand::Reg(via),
            });
        }
        (Operand::Frame(to), src) if vector => out.push(MInst::VStore {
            addr: Addr::Frame(to),
            src,
            width,
        }),
        (Operand::Frame(to), src) => out.push(MInst::Store {
            addr: Addr::Frame(to),
            src,
        }),
        (dst, Operand::Frame(from)) if vector => out.push(MInst::VLoad {
            dst,
            addr: Addr::Frame(from),
            width,
        }),
        (dst, Operand::Frame(from)) => out.push(MInst::Load {
            dst,
            addr: Addr::Frame(from),
        }),
        (dst, src) => out.push(MInst::Mov { dst, src }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PARK: Reg = Reg(14);
    const VIA: Reg = Reg(15);

    fn mv(dst: Operand, src: Operand) -> Move {
        Move { dst, src, words: 1 }
    }

    fn r(n: u8) -> Operand {
        Operand::Reg(Reg(n))
    }

    fn text(insts: &[MInst]) -> Vec<String> {
        insts.iter().map(ToString::to_string).collect()
    }

    /// Run `insts` over registers and frame words, returning the final
    /// value of each destination.
    fn run(moves: &[Move], insts: &[MInst]) -> Vec<i64> {
        use rustc_hash::FxHashMap;
        let mut regs: FxHashMap<u8, i64> = (0..16).map(|r| (r, 100 + i64::from(r))).collect();
        let mut frame: FxHashMap<u32, i64> = (0..8).map(|w| (w * 8, 200 + i64::from(w))).collect();
        let read = |regs: &FxHashMap<u8, i64>, frame: &FxHashMap<u32, i64>, op: Operand| match op {
            Operand::Reg(r) => regs[&r.0],
            Operand::Frame(o) => frame[&o],
            Operand::Imm(n) => n,
            other => panic!("unexpected operand {other}"),
        };
        for inst in insts {
            match inst {
                MInst::Mov { dst: Operand::Reg(d), src } => {
                    let value = read(&regs, &frame, *src);
                    regs.insert(d.0, value);
                }
                MInst::Load {
                    dst: Operand::Reg(d),
                    addr: Addr::Frame(o),
                } => {
                    regs.insert(d.0, frame[o]);
                }
                MInst::Store {
                    addr: Addr::Frame(o),
                    src,
                } => {
                    let value = read(&regs, &frame, *src);
                    frame.insert(*o, value);
                }
                other => panic!("unexpected instruction {other}"),
            }
        }
        moves.iter().map(|m| read(&regs, &frame, m.dst)).collect()
    }

    /// Sources as they were before any move ran.
    fn expected(moves: &[Move]) -> Vec<i64> {
        moves
            .iter()
            .map(|m| match m.src {
                Operand::Reg(r) => 100 + i64::from(r.0),
                Operand::Frame(o) => 200 + i64::from(o / 8),
                Operand::Imm(n) => n,
                other => panic!("unexpected operand {other}"),
            })
            .collect()
    }

    #[test]
    fn independent_moves_keep_their_order() {
        let moves = [mv(r(0), r(3)), mv(r(1), Operand::Imm(7))];
        let insts = sequentialize(&moves, PARK, VIA);
        assert_eq!(text(&insts), ["mov r0, r3", "mov r1, #7"]);
    }

    #[test]
    fn chains_run_back_to_front() {
        let moves = [mv(r(1), r(0)), mv(r(2), r(1))];
        let insts = sequentialize(&moves, PARK, VIA);
        assert_eq!(text(&insts), ["mov r2, r1", "mov r1, r0"]);
        assert_eq!(run(&moves, &insts), expected(&moves));
    }

    #[test]
    fn swaps_park_one_value() {
        let moves = [mv(r(0), r(1)), mv(r(1), r(0))];
        let insts = sequentialize(&moves, PARK, VIA);
        assert_eq!(
            text(&insts),
            ["mov r14, r0", "mov r0, r1", "mov r1, r14"]
        );
        assert_eq!(run(&moves, &insts), expected(&moves));
    }

    #[test]
    fn rotations_through_memory_resolve() {
        let moves = [
            mv(r(0), Operand::Frame(8)),
            mv(Operand::Frame(8), Operand::Frame(16)),
            mv(Operand::Frame(16), r(0)),
            mv(r(3), r(0)),
            mv(r(4), r(4)),
        ];
        let insts = sequentialize(&moves, PARK, VIA);
        assert!(!text(&insts).iter().any(|line| line.contains("r4")));
        assert_eq!(run(&moves, &insts), expected(&moves));
    }

    #[test]
    fn two_disjoint_cycles_share_the_park_register() {
        let moves = [
            mv(r(0), r(1)),
            mv(r(1), r(0)),
            mv(r(2), r(3)),
            mv(r(3), r(2)),
        ];
        let insts = sequentialize(&moves, PARK, VIA);
        assert_eq!(insts.len(), 6);
        assert_eq!(run(&moves, &insts), expected(&moves));
    }
}
