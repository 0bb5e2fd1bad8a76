//! Reporte de errores del front end.
//!
//! Los errores léxicos y sintácticos se acompañan de su ubicación.
//! [`Diagnostics`] los presenta citando la línea original y señalando
//! la columna exacta del problema.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics {
    fn from(errors: Vec<E>) -> Self {
        let errors = errors
            .into_iter()
            .map(|error| {
                let error: Box<dyn LocatedError> = Box::new(error);
                error
            })
            .collect();

        Diagnostics {
            errors,
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;

            let digits = location.end().line().to_string().chars().count();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            // Solo se cita la primera línea; los tokens de C-- no cruzan líneas
            let line_number = location.start().line();
            location.source().with_line(line_number, |line| {
                writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
            })?;

            let from = location.start().column();
            let to = if location.end().line() == line_number {
                location.end().column().max(from + 1)
            } else {
                from + 1
            };

            let skip = (from - 1) as usize;
            let highlight = (to - from) as usize;

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, fmt)
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Position, Source};
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("Bad thing")]
    struct BadThing;

    #[test]
    fn excerpt_points_at_column() {
        let source = Source::new("test.cc", "int main() { x; }\n");
        let at = Location::at(&source, Position::default().advance().advance());
        let diagnostics = Diagnostics::from(Located::at(BadThing, at)).kind("Syntax error");

        let text = diagnostics.to_string();
        assert!(text.starts_with("Syntax error: Bad thing\n --> test.cc:1:3\n"));
        assert!(text.contains("1 | int main() { x; }\n"));
        assert!(text.contains("  |   ^\n"));
        assert!(text.ends_with("Build failed with 1 error\n"));
    }

    #[test]
    fn empty_diagnostics() {
        let diagnostics = Diagnostics::default();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.to_string(), "No errors were reported\n");
    }
}
