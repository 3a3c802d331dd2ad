//! Code generation for Kiln: optimised IR to abstract machine code.
//!
//! - **Target** ([`TargetMachine`]): register count, scratch registers and
//!   vector width.
//! - **Instruction selection**: IR to [`MInst`]s over virtual registers,
//!   with immediate operands and fused compare-and-branch.
//! - **Register allocation**: dataflow liveness, linear scan over block
//!   ordered positions, spill code through the scratch registers and
//!   sequentialised parallel moves for block arguments.
//! - **Output** ([`ObjectModule`]): machine functions plus a symbol table
//!   of defined functions, globals, string data and external symbols.
//!
//! # Crate Dependencies
//!
//! `kiln_codegen` consumes `kiln_lir` programs. It never sees source text;
//! source positions reach it only as the spans recorded on IR
//! instructions.

mod error;
mod isel;
pub mod machine;
mod moves;
mod regalloc;
mod target;

#[cfg(test)]
mod test_helpers;

use std::fmt::Write;

use kiln_ir::StringInterner;
use kiln_lir::Program;
use kiln_types::ConstValue;
use tracing::debug;

pub use error::CodegenError;
pub use machine::{
    Addr, Convention, MInst, MachineBlock, MachineFunction, ObjectModule, Operand, Reg, Symbol,
    SymbolKind, VReg,
};
pub use target::{TargetMachine, SCRATCH_REGS};

use isel::{DataTable, ModuleContext};

/// Generate machine code for every function of `program`.
///
/// Every function is attempted; all errors are returned together.
pub fn generate(
    program: &Program,
    target: &TargetMachine,
    interner: &StringInterner,
    module: &str,
) -> Result<ObjectModule, Vec<CodegenError>> {
    target.validate().map_err(|e| vec![e])?;

    let cx = ModuleContext {
        target,
        interner,
        program,
    };
    let mut data = DataTable::default();
    let mut functions = Vec::with_capacity(program.functions.len());
    let mut errors = Vec::new();
    for func in &program.functions {
        match isel::select(func, &cx, &mut data) {
            Ok(selected) => functions.push(regalloc::allocate(selected, target)),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        debug!(module, errors = errors.len(), "code generation failed");
        return Err(errors);
    }

    let mut symbols: Vec<Symbol> = functions
        .iter()
        .map(|f| Symbol {
            name: f.name.clone(),
            kind: SymbolKind::Function,
        })
        .collect();
    symbols.extend(program.globals.iter().map(|g| Symbol {
        name: interner.lookup(g.name).to_owned(),
        kind: SymbolKind::Global {
            init: render_const(&g.init, interner),
        },
    }));
    symbols.extend(data.symbols);
    symbols.extend(program.externs.iter().map(|e| Symbol {
        name: interner.lookup(e.name).to_owned(),
        kind: SymbolKind::Extern {
            library: e.library.map(|lib| interner.lookup(lib).to_owned()),
        },
    }));

    debug!(
        module,
        functions = functions.len(),
        symbols = symbols.len(),
        target = target.name.as_str(),
        "generated object module"
    );
    Ok(ObjectModule {
        name: module.to_owned(),
        functions,
        symbols,
    })
}

fn render_const(value: &ConstValue, interner: &StringInterner) -> String {
    let mut out = String::new();
    write_const(&mut out, value, interner);
    out
}

fn write_const(out: &mut String, value: &ConstValue, interner: &StringInterner) {
    let _ = match value {
        ConstValue::Int(n) => write!(out, "{n}"),
        ConstValue::Frac(x) => write!(out, "{x:?}"),
        ConstValue::Bool(b) => write!(out, "{b}"),
        ConstValue::Str(s) => write!(out, "{:?}", interner.lookup(*s)),
        ConstValue::Array(items) | ConstValue::Tuple(items) => {
            let array = matches!(value, ConstValue::Array(_));
            out.push(if array { '[' } else { '(' });
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_const(out, item, interner);
            }
            out.push(if array { ']' } else { ')' });
            Ok(())
        }
    };
}
