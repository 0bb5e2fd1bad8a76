//! Compilador de C-- para el procesador FLISP.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un árbol sintáctico ([`ast`]) por medio de análisis
//! sintáctico en [`parse`]. El árbol es chequeado y decorado con
//! tipos por el análisis semántico en [`semantic`], con lo cual
//! concluyen las fases delanteras del compilador.
//!
//! # Back end
//! [`codegen`] recorre el árbol decorado función por función y lo
//! reduce a instrucciones de [`ir`], las cuales se traducen a texto
//! ensamblador FLISP conforme se emiten. El ensamblado en sí se
//! delega a herramientas externas.

#[macro_use]
mod macros;

pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod scope;
pub mod semantic;
pub mod source;

mod arch;

/// Parámetros de la máquina objetivo.
pub mod target {
    pub use crate::arch::{
        label_symbol, CODE_ORIGIN, DATA_ORIGIN, IMMEDIATE_RANGE, MAX_GLOBALS, OFFSET_RANGE,
        STACK_LIMIT,
    };
}

use error::Diagnostics;
use source::{Location, Position, Source};

/// Análisis léxico y sintáctico de un archivo completo.
///
/// Los errores léxicos se reportan todos juntos; el análisis
/// sintáctico se detiene en el primer error.
pub fn syntax_tree(name: &str, text: &str) -> Result<ast::Program, Diagnostics> {
    let source = Source::new(name, text);
    let tokens = lex::tokenize(&source, text)
        .try_exhaustive()
        .map_err(|errors| Diagnostics::from(errors).kind("Lexical error"))?;

    let start = Location::at(&source, Position::default());
    parse::parse(tokens.iter(), start)
        .map_err(|error| Diagnostics::from(error).kind("Syntax error"))
}
