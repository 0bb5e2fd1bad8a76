//! Detalles específicos de la máquina FLISP.
//!
//! FLISP es un procesador educativo de 8 bits con un acumulador `A`,
//! un puntero de pila `SP` y direccionamiento relativo a este. Este
//! módulo fija el mapa de memoria y traduce cada [`Instruction`] a
//! exactamente una línea de ensamblador. [`Emitter`] acumula las
//! líneas de una región de código mientras lleva cuenta de la pila.

use crate::{
    codegen::{stack::Stack, CompileError},
    ir::{Condition, Global, Instruction, Label, Operand, Place},
};

use log::trace;
use std::{
    fmt::{self, Display},
    ops::RangeInclusive,
    rc::Rc,
};

/// Origen del área de variables globales.
pub const DATA_ORIGIN: u8 = 0x00;

/// Origen del código.
pub const CODE_ORIGIN: u8 = 0x20;

/// Las globales ocupan un byte cada una y deben caber antes del código.
pub const MAX_GLOBALS: usize = (CODE_ORIGIN - DATA_ORIGIN) as usize;

/// Profundidad máxima de `PSHA` sin liberar, en bytes.
pub const STACK_LIMIT: u32 = 32;

/// Valores representables en un operando inmediato de un byte.
pub const IMMEDIATE_RANGE: RangeInclusive<i32> = -128..=255;

/// Desplazamientos codificables en `n,SP` y `LEASP`, con signo.
pub const OFFSET_RANGE: RangeInclusive<i32> = -128..=127;

/// Emisión de una región de código.
///
/// Cada instrucción se traduce a texto en el momento en que se emite,
/// cuando la profundidad de pila es la que le corresponde.
pub struct Emitter {
    symbol: Rc<str>,
    stack: Stack,
    instructions: Vec<Instruction>,
    lines: Vec<String>,
}

impl Emitter {
    /// Crea un emisor para la función cuyo símbolo es `symbol`. Las
    /// etiquetas locales se califican con este símbolo.
    pub fn new(symbol: Rc<str>) -> Self {
        Emitter {
            symbol,
            stack: Stack::default(),
            instructions: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn depth(&self) -> u32 {
        self.stack.depth()
    }

    #[cfg(test)]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn emit(&mut self, instruction: Instruction) -> Result<(), CompileError> {
        if let Some(value) = instruction.immediate() {
            if !IMMEDIATE_RANGE.contains(&value) {
                return Err(CompileError::ImmediateOutOfRange(value));
            }
        }

        if let Some(offset) = instruction.offset() {
            if !OFFSET_RANGE.contains(&offset) {
                return Err(CompileError::OffsetOutOfRange(offset));
            }
        }

        match instruction {
            Instruction::Push => self.stack.push()?,
            Instruction::Pull => self.stack.pull()?,
            _ => (),
        }

        let line = Line {
            instruction: &instruction,
            symbol: &self.symbol,
        }
        .to_string();

        trace!("[{:2}] {}", self.stack.depth(), line);

        self.lines.push(line);
        self.instructions.push(instruction);
        Ok(())
    }

    /// Agrega código ya emitido por separado.
    pub fn append(&mut self, other: Emitter) {
        self.stack.absorb(&other.stack);
        self.instructions.extend(other.instructions);
        self.lines.extend(other.lines);
    }

    pub fn finish(self) -> (Vec<Instruction>, Vec<String>, Stack) {
        (self.instructions, self.lines, self.stack)
    }
}

/// Nombre de una etiqueta local en el listado final.
pub fn label_symbol(function: &str, Label(label): Label) -> String {
    format!("{}_L{}", function, label)
}

struct Line<'a> {
    instruction: &'a Instruction,
    symbol: &'a str,
}

impl Display for Line<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self.instruction {
            Comment(text) => write!(fmt, "\t;; {}", text),
            Load(operand) => emit!(fmt, "LDAA", "{}", operand),
            Store(place) => emit!(fmt, "STAA", "{}", place),
            Add(operand) => emit!(fmt, "ADDA", "{}", operand),
            Sub(operand) => emit!(fmt, "SUBA", "{}", operand),
            Compare(operand) => emit!(fmt, "CMPA", "{}", operand),
            Increment(place) => emit!(fmt, "INC", "{}", place),
            Decrement(place) => emit!(fmt, "DEC", "{}", place),

            Branch(condition, label) => emit!(
                fmt,
                branch_opcode(*condition),
                "{}",
                label_symbol(self.symbol, *label)
            ),

            Push => emit!(fmt, "PSHA"),
            Pull => emit!(fmt, "PULA"),
            Return => emit!(fmt, "RTS"),
            SetLabel(label) => fmt.write_str(&label_symbol(self.symbol, *label)),
            Entry(symbol) => fmt.write_str(symbol),

            Reserve(Global(label)) => {
                fmt.write_str(label)?;
                emit!(fmt, "RMB", "1")
            }

            Frame(offset) => emit!(fmt, "LEASP", "{},SP", offset),
            Origin(address) => emit!(fmt, "ORG", "${:02X}", address),
        }
    }
}

fn branch_opcode(condition: Condition) -> &'static str {
    match condition {
        Condition::Always => "BRA",
        Condition::Equal => "BEQ",
        Condition::NotEqual => "BNE",
        Condition::Greater => "BGT",
        Condition::Less => "BLT",
        Condition::GreaterOrEqual => "BGE",
        Condition::LessOrEqual => "BLE",
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Immediate(value) => write!(fmt, "#{}", value),
            Operand::Place(place) => place.fmt(fmt),
        }
    }
}

impl Display for Place {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Global(Global(label)) => fmt.write_str(label),
            Place::Frame(offset) => write!(fmt, "{},SP", offset),
        }
    }
}
