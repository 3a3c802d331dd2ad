//! Target machine description.

use crate::error::CodegenError;
use crate::machine::Reg;

/// Scratch registers the allocator needs to reload spilled operands.
pub const SCRATCH_REGS: u8 = 2;

/// A register machine with `num_regs` general registers, the last
/// `scratch_regs` of which are reserved for spill code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetMachine {
    pub name: String,
    pub num_regs: u8,
    pub scratch_regs: u8,
    /// Lanes of the vector unit; `None` without one.
    pub vector_width: Option<u32>,
}

impl TargetMachine {
    /// Sixteen registers and 4-wide vectors.
    pub fn abstract_machine() -> Self {
        TargetMachine {
            name: "kiln-abstract".to_owned(),
            num_regs: 16,
            scratch_regs: SCRATCH_REGS,
            vector_width: Some(4),
        }
    }

    /// The abstract machine without a vector unit.
    pub fn scalar_only() -> Self {
        TargetMachine {
            name: "kiln-scalar".to_owned(),
            vector_width: None,
            ..TargetMachine::abstract_machine()
        }
    }

    /// Registers available to the allocator, lowest first.
    pub fn allocatable(&self) -> impl DoubleEndedIterator<Item = Reg> {
        (0..self.num_regs.saturating_sub(self.scratch_regs)).map(Reg)
    }

    pub fn scratch(&self) -> [Reg; 2] {
        let first = self.num_regs.saturating_sub(self.scratch_regs);
        [Reg(first), Reg(first.saturating_add(1))]
    }

    pub fn supports_vector(&self, width: u32) -> bool {
        self.vector_width == Some(width)
    }

    pub(crate) fn validate(&self) -> Result<(), CodegenError> {
        if self.scratch_regs < SCRATCH_REGS || self.num_regs <= self.scratch_regs {
            return Err(CodegenError::InvalidTarget {
                target: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl Default for TargetMachine {
    fn default() -> Self {
        TargetMachine::abstract_machine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_machine_reserves_the_top_registers() {
        let target = TargetMachine::abstract_machine();
        assert_eq!(target.allocatable().count(), 14);
        assert_eq!(target.scratch(), [Reg(14), Reg(15)]);
        assert!(target.supports_vector(4));
        assert!(!target.supports_vector(8));
        assert!(!TargetMachine::scalar_only().supports_vector(4));
    }

    #[test]
    fn targets_without_room_are_rejected() {
        let mut target = TargetMachine::abstract_machine();
        target.num_regs = 2;
        assert!(target.validate().is_err());
        target.num_regs = 3;
        assert!(target.validate().is_ok());
        target.scratch_regs = 1;
        assert!(target.validate().is_err());
    }
}
