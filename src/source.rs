//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos que el front end construye deben llevar
//! cuenta de posiciones o rangos de ubicaciones en el código fuente
//! original, lo cual permite señalar el punto exacto en donde ocurre
//! un error léxico o sintáctico.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Ubicación de un único carácter.
    pub fn at(from: &Rc<Source>, position: Position) -> Self {
        Location {
            from: Rc::clone(from),
            position: position..position.advance(),
        }
    }

    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene el origen.
    pub fn source(&self) -> &Source {
        &self.from
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() || end.line() != start.line() {
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.max(2) - 1,
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y sus líneas.
///
/// Las líneas se conservan para que [`crate::error::Diagnostics`]
/// pueda citar el fragmento de código donde ocurrió un error.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Construye un origen a partir de su nombre y su texto completo.
    pub fn new<S: Into<String>>(name: S, text: &str) -> Rc<Self> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    /// Nombre del origen, usualmente una ruta.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoca a `callback` con el contenido de una línea (base 1).
    ///
    /// Líneas fuera de rango se presentan como vacías, lo cual ocurre
    /// para errores al final del archivo.
    pub fn with_line<R, F>(&self, line: u32, callback: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let text = (line as usize)
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        callback(text)
    }
}

/// Recorre un texto carácter por carácter junto a la posición de cada uno.
///
/// La posición que acompaña a cada carácter es la del carácter
/// siguiente, tal como la espera el lexer para cerrar rangos de tokens.
pub fn chars(text: &str) -> impl Iterator<Item = (char, Position)> + '_ {
    let mut here = Position::default();

    text.chars().map(move |c| {
        here = match c {
            '\n' => here.newline(),
            '\t' => here.tab(),
            _ => here.advance(),
        };

        (c, here)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_track_lines_and_tabs() {
        let positions: Vec<_> = chars("a\n\tb").map(|(_, position)| position).collect();

        assert_eq!(positions[0], Position { line: 1, column: 2 });
        assert_eq!(positions[1], Position { line: 2, column: 1 });
        assert_eq!(positions[2], Position { line: 2, column: 5 });
        assert_eq!(positions[3], Position { line: 2, column: 6 });
    }

    #[test]
    fn location_display() {
        let source = Source::new("main.cc", "int x;\n");
        let start = Location::at(&source, Position::default());
        let end = Location::at(&source, Position { line: 1, column: 3 });

        assert_eq!(start.to_string(), "main.cc:1:1");
        assert_eq!(Location::span(start, &end).to_string(), "main.cc:[1:1-1:3]");
    }

    #[test]
    fn out_of_range_lines_are_empty() {
        let source = Source::new("main.cc", "int x;");
        assert_eq!(source.with_line(1, str::len), 6);
        assert_eq!(source.with_line(7, str::len), 0);
    }
}
