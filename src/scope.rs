//! Tablas de símbolos.
//!
//! Ambas fases del back end resuelven nombres de la misma forma, por
//! lo cual comparten estas tablas parametrizadas por lo que se asocia
//! a cada nombre: tipos en el chequeo, ubicaciones en la generación.

use std::collections::HashMap;

/// Tabla de firmas de funciones, de escritura única por nombre.
#[derive(Debug)]
pub struct Signatures<T> {
    entries: HashMap<String, T>,
}

impl<T> Signatures<T> {
    pub fn new() -> Self {
        Signatures {
            entries: HashMap::new(),
        }
    }

    /// Registra un nombre. Si ya existe, la tabla no cambia y se
    /// devuelve el valor rechazado.
    pub fn insert(&mut self, name: &str, value: T) -> Result<(), T> {
        if self.entries.contains_key(name) {
            return Err(value);
        }

        self.entries.insert(name.to_owned(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }
}

impl<T> Default for Signatures<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Conflicto al enlazar un nombre.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Clash {
    /// El nombre ya es una variable global.
    Global,

    /// El nombre ya existe en el ámbito más interno.
    Local,
}

/// Variables globales más una pila de ámbitos locales.
///
/// La búsqueda consulta primero la tabla global y luego los ámbitos
/// locales del más interno al más externo.
#[derive(Debug)]
pub struct Scopes<T> {
    globals: HashMap<String, T>,
    locals: Vec<HashMap<String, T>>,
}

impl<T> Scopes<T> {
    /// Tabla vacía con un único ámbito local abierto.
    pub fn new() -> Self {
        Scopes {
            globals: HashMap::new(),
            locals: vec![HashMap::new()],
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.globals
            .get(name)
            .or_else(|| self.locals.iter().rev().find_map(|scope| scope.get(name)))
    }

    pub fn bind_global(&mut self, name: &str, value: T) -> Result<(), Clash> {
        if self.globals.contains_key(name) {
            return Err(Clash::Global);
        }

        self.globals.insert(name.to_owned(), value);
        Ok(())
    }

    /// Enlaza un nombre en el ámbito más interno.
    pub fn bind(&mut self, name: &str, value: T) -> Result<(), Clash> {
        if self.globals.contains_key(name) {
            return Err(Clash::Global);
        }

        // Siempre hay al menos un ámbito, ver `leave()`
        let innermost = self.locals.last_mut().ok_or(Clash::Local)?;
        if innermost.contains_key(name) {
            return Err(Clash::Local);
        }

        innermost.insert(name.to_owned(), value);
        Ok(())
    }

    pub fn enter(&mut self) {
        self.locals.push(HashMap::new());
    }

    /// Cierra el ámbito más interno. El ámbito base de la función
    /// nunca se cierra.
    pub fn leave(&mut self) {
        if self.locals.len() > 1 {
            self.locals.pop();
        }
    }

    /// Descarta todos los ámbitos locales, conservando las globales.
    pub fn reset_locals(&mut self) {
        self.locals.clear();
        self.locals.push(HashMap::new());
    }
}

impl<T> Default for Scopes<T> {
    fn default() -> Self {
        Self::new()
    }
}
