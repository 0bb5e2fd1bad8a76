//! Contadores de pila por función.

use super::CompileError;
use crate::arch::STACK_LIMIT;

/// Profundidad actual y marca de agua de la pila de hardware.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stack {
    depth: u32,
    high_water: u32,
}

impl Stack {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Registra un `PSHA`. Superar [`STACK_LIMIT`] es fatal.
    pub fn push(&mut self) -> Result<(), CompileError> {
        let depth = self.depth + 1;
        if depth > STACK_LIMIT {
            return Err(CompileError::StackOverflow {
                depth,
                limit: STACK_LIMIT,
            });
        }

        self.depth = depth;
        self.high_water = self.high_water.max(depth);
        Ok(())
    }

    /// Registra un `PULA`.
    pub fn pull(&mut self) -> Result<(), CompileError> {
        self.depth = self
            .depth
            .checked_sub(1)
            .ok_or(CompileError::StackUnderflow)?;

        Ok(())
    }

    /// Incorpora la marca de agua de código generado por separado.
    pub fn absorb(&mut self, other: &Stack) {
        self.high_water = self.high_water.max(self.depth + other.high_water);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_high_water() {
        let mut stack = Stack::default();
        stack.push().unwrap();
        stack.push().unwrap();
        stack.pull().unwrap();
        stack.push().unwrap();
        stack.pull().unwrap();
        stack.pull().unwrap();

        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.high_water(), 2);
    }

    #[test]
    fn overflow_at_limit() {
        let mut stack = Stack::default();
        for _ in 0..STACK_LIMIT {
            stack.push().unwrap();
        }

        assert_eq!(
            stack.push(),
            Err(CompileError::StackOverflow {
                depth: STACK_LIMIT + 1,
                limit: STACK_LIMIT
            })
        );
        assert_eq!(stack.depth(), STACK_LIMIT);
    }

    #[test]
    fn underflow() {
        let mut stack = Stack::default();
        assert_eq!(stack.pull(), Err(CompileError::StackUnderflow));
    }

    #[test]
    fn absorb_keeps_maximum() {
        let mut outer = Stack::default();
        let mut inner = Stack::default();
        inner.push().unwrap();
        inner.push().unwrap();
        inner.pull().unwrap();
        inner.pull().unwrap();

        outer.absorb(&inner);
        assert_eq!(outer.high_water(), 2);
    }
}
