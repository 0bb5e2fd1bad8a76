//! Modelo de instrucciones.
//!
//! Conjunto cerrado de instrucciones de la máquina objetivo. El modo
//! de direccionamiento de cada operando se fija al construir la
//! instrucción y no cambia después; en particular, los desplazamientos
//! relativos a `SP` ya incluyen la profundidad de pila vigente en ese
//! punto del código.

use std::rc::Rc;

/// Etiqueta local a una función.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// Etiqueta de almacenamiento de una variable global.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Global(pub Rc<str>);

/// Ubicación en memoria de una variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Place {
    /// Dirección absoluta, por etiqueta.
    Global(Global),

    /// Desplazamiento respecto a `SP`.
    Frame(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Immediate(i32),
    Place(Place),
}

/// Condición de salto.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Comentario en el listado.
    Comment(String),

    /// `A <- operando`
    Load(Operand),

    /// `ubicación <- A`
    Store(Place),

    /// `A <- A + operando`
    Add(Operand),

    /// `A <- A - operando`
    Sub(Operand),

    /// Ajusta banderas según `A - operando`.
    Compare(Operand),

    Increment(Place),
    Decrement(Place),
    Branch(Condition, Label),

    /// Apila `A`.
    Push,

    /// Desapila hacia `A`.
    Pull,

    Return,
    SetLabel(Label),

    /// Punto de entrada de una función.
    Entry(Rc<str>),

    /// Reserva un byte etiquetado.
    Reserve(Global),

    /// Mueve `SP`; negativo reserva el marco, positivo lo libera.
    Frame(i32),

    /// Dirección de origen para lo que sigue.
    Origin(u8),
}

impl Instruction {
    /// Constante inmediata que debe caber en el operando de la instrucción.
    pub fn immediate(&self) -> Option<i32> {
        match self {
            Instruction::Load(Operand::Immediate(value))
            | Instruction::Add(Operand::Immediate(value))
            | Instruction::Sub(Operand::Immediate(value))
            | Instruction::Compare(Operand::Immediate(value)) => Some(*value),

            _ => None,
        }
    }

    /// Desplazamiento relativo a `SP` que debe caber en la instrucción.
    pub fn offset(&self) -> Option<i32> {
        use Instruction::*;

        let place = match self {
            Frame(offset) => return Some(*offset),

            Load(Operand::Place(place))
            | Add(Operand::Place(place))
            | Sub(Operand::Place(place))
            | Compare(Operand::Place(place))
            | Store(place)
            | Increment(place)
            | Decrement(place) => place,

            _ => return None,
        };

        match place {
            Place::Frame(offset) => Some(i32::try_from(*offset).unwrap_or(i32::MAX)),
            Place::Global(_) => None,
        }
    }
}
