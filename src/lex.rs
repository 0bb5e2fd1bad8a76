//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente
//! en unidades léxicas denominadas tokens. Los espacios en blanco, los
//! comentarios y las líneas de preprocesador (`#include ...`) se descartan
//! durante esta operación. Cada token emitido está asociado a una ubicación
//! en el código fuente original, lo cual permite rastrear errores tanto en
//! los mismos como en constructos más elevados del parser.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de
//! lo que son y no incluyen lexemas. Los identificadores sí incluyen su
//! lexema original. Las constantes literales se resuelven a sus valores.
//!
//! # Errores
//! El lexer es capaz de recuperarse parcialmente de condiciones de error:
//! descarta el resto de la línea y continúa. Esto permite reportar más de
//! un error por ejecución, pero no avanzar a las demás fases.

use crate::source::{self, Located, Location, Position, Source};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Literal entero máximo.
const INT_MAX: i32 = i32::MAX;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {INT_MAX}]")]
    IntOverflow,

    /// Un comentario `/* */` no fue cerrado antes del fin del archivo.
    #[error("Unterminated block comment")]
    UnterminatedComment,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(fmt)
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i32),

    /// `=`
    Assign,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Divide,

    /// `++`
    Increment,

    /// `--`
    Decrement,

    /// `<`
    Less,

    /// `>`
    Greater,

    /// `<=`
    LessOrEqual,

    /// `>=`
    GreaterOrEqual,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `&&`
    And,

    /// `||`
    Or,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            Assign => fmt.write_str("`=`"),
            Comma => fmt.write_str("`,`"),
            Semicolon => fmt.write_str("`;`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Divide => fmt.write_str("`/`"),
            Increment => fmt.write_str("`++`"),
            Decrement => fmt.write_str("`--`"),
            Less => fmt.write_str("`<`"),
            Greater => fmt.write_str("`>`"),
            LessOrEqual => fmt.write_str("`<=`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
            Equal => fmt.write_str("`==`"),
            NotEqual => fmt.write_str("`!=`"),
            And => fmt.write_str("`&&`"),
            Or => fmt.write_str("`||`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Int,
    Bool,
    Void,
    True,
    False,
    If,
    Else,
    While,
    Return,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Int    => "int",
            Bool   => "bool",
            Void   => "void",
            True   => "true",
            False  => "false",
            If     => "if",
            Else   => "else",
            While  => "while",
            Return => "return",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("int",    Int),
            ("bool",   Bool),
            ("void",   Void),
            ("true",   True),
            ("false",  False),
            ("if",     If),
            ("else",   Else),
            ("while",  While),
            ("return", Return),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<I: Iterator<Item = (char, Position)>> {
    source: Rc<Source>,
    chars: Peekable<I>,
    state: State,
    start: Position,
    next: Position,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error.
    Error,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Primer carácter de un operador que puede tener dos caracteres.
    Operator(char),

    /// Se encontró `/`, puede ser división o inicio de comentario.
    Slash,

    /// Comentario de línea (`//` o `#`).
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    LineComment,

    /// Comentario de bloque, `/*` ya fue consumido.
    BlockComment,

    /// Se encontró `*` dentro de un comentario de bloque.
    BlockStar,

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(i32),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

/// Crea un lexer sobre el texto completo de un origen.
pub fn tokenize<'a>(
    source: &Rc<Source>,
    text: &'a str,
) -> Lexer<impl Iterator<Item = (char, Position)> + 'a> {
    Lexer::new(source, source::chars(text))
}

impl<I: Iterator<Item = (char, Position)>> Lexer<I> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    ///
    /// Cada carácter del flujo viene acompañado de la posición del
    /// carácter que le sigue, tal como lo produce [`source::chars()`].
    pub fn new(source: &Rc<Source>, chars: I) -> Self {
        Lexer {
            source: Rc::clone(source),
            chars: chars.peekable(),
            state: State::Start,
            start: Position::default(),
            next: Position::default(),
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Ubicación de fin de archivo, útil para errores de `UnexpectedEof`.
    pub fn eof(&self) -> Location {
        Location::at(&self.source, self.next)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(Token, Position)>, LexerError> {
        use {State::*, Token::*};

        let mut last_accepted = self.start;
        let token = loop {
            let next_char = self.chars.peek().map(|&(c, _)| c);

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next;
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Condiciones de error: se descarta la línea donde
                // ocurrió el error. Al llegar al final de la línea
                // el lexer se recupera y reinicia.
                (Error, None) => return Ok(None),
                (Error, Some('\n')) => self.state = Start,
                (Error, Some(_)) => (),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('#')) => self.state = LineComment,

                (Start, Some(c @ ('+' | '-' | '<' | '>' | '=' | '!' | '&' | '|'))) => {
                    self.state = Operator(c)
                }

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el dígito, ya que esta lógica ya está implementada
                // en el caso de constante entera, por lo cual la
                // constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Plus)),

                // Operadores de dos caracteres, o de uno si no sigue nada compatible
                (Operator(first), next) => match (*first, next) {
                    ('+', Some('+')) => self.state = Complete(Increment),
                    ('-', Some('-')) => self.state = Complete(Decrement),
                    ('<', Some('=')) => self.state = Complete(LessOrEqual),
                    ('>', Some('=')) => self.state = Complete(GreaterOrEqual),
                    ('=', Some('=')) => self.state = Complete(Equal),
                    ('!', Some('=')) => self.state = Complete(NotEqual),
                    ('&', Some('&')) => self.state = Complete(And),
                    ('|', Some('|')) => self.state = Complete(Or),

                    ('+', _) => break Ok(Plus),
                    ('-', _) => break Ok(Minus),
                    ('<', _) => break Ok(Less),
                    ('>', _) => break Ok(Greater),
                    ('=', _) => break Ok(Assign),
                    ('!', _) => break Err(LexerError::Expected('=')),
                    (other, _) => break Err(LexerError::Expected(other)),
                },

                // `/` solo puede ser división, `//` o `/*`
                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => self.state = BlockComment,
                (Slash, _) => break Ok(Divide),

                // Los comentarios de línea descartan la línea donde ocurren
                (LineComment, Some('\n')) => self.state = Start,
                (LineComment, Some(_)) => (),
                (LineComment, None) => self.state = Start,

                (BlockComment, Some('*')) => self.state = BlockStar,
                (BlockComment, Some(_)) => (),
                (BlockStar, Some('/')) => self.state = Start,
                (BlockStar, Some('*')) => (),
                (BlockStar, Some(_)) => self.state = BlockComment,
                (BlockComment | BlockStar, None) => break Err(LexerError::UnterminatedComment),

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit as i32 - '0' as i32;

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(integer), _) => break Ok(IntLiteral(*integer)),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word) {
                        break Ok(Keyword(keyword));
                    } else {
                        break Ok(Id(Identifier(Rc::from(word.as_str()))));
                    }
                }
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some((_, next_position)) = self.chars.next() {
                last_accepted = std::mem::replace(&mut self.next, next_position);
            }
        };

        token.map(|token| Some((token, last_accepted)))
    }
}

impl<I: Iterator<Item = (char, Position)>> Iterator for Lexer<I> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let start = Location::at(&self.source, self.start);
                let end = Location::at(&self.source, last_accepted);
                Some(Ok(Located::at(token, Location::span(start, &end))))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.eof())))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        let source = Source::new("test.cc", text);
        tokenize(&source, text)
            .try_exhaustive()
            .expect("lexical error")
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    fn errors(text: &str) -> Vec<Located<LexerError>> {
        let source = Source::new("test.cc", text);
        match tokenize(&source, text).try_exhaustive() {
            Ok(_) => panic!("expected lexical errors"),
            Err(errors) => errors,
        }
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier(Rc::from(name)))
    }

    #[test]
    fn keywords_and_identifiers() {
        use Token::*;

        assert_eq!(
            tokens("int main_2() { return x; }"),
            vec![
                Keyword(self::Keyword::Int),
                id("main_2"),
                OpenParen,
                CloseParen,
                OpenCurly,
                Keyword(self::Keyword::Return),
                id("x"),
                Semicolon,
                CloseCurly,
            ]
        );
    }

    #[test]
    fn compound_operators() {
        use Token::*;

        assert_eq!(
            tokens("x++ + --y <= 3 >= 4 == 5 != 6 && a || b < c > d = e / f * g"),
            vec![
                id("x"),
                Increment,
                Plus,
                Decrement,
                id("y"),
                LessOrEqual,
                IntLiteral(3),
                GreaterOrEqual,
                IntLiteral(4),
                Equal,
                IntLiteral(5),
                NotEqual,
                IntLiteral(6),
                And,
                id("a"),
                Or,
                id("b"),
                Less,
                id("c"),
                Greater,
                id("d"),
                Assign,
                id("e"),
                Divide,
                id("f"),
                Times,
                id("g"),
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        use Token::*;

        let text = "#include <stdio.h>\n// hola\nint /* a * b */ x; /**/ y";
        assert_eq!(
            tokens(text),
            vec![Keyword(self::Keyword::Int), id("x"), Semicolon, id("y")]
        );
    }

    #[test]
    fn token_locations() {
        let text = "int\n  count;";
        let source = Source::new("test.cc", text);
        let located = tokenize(&source, text).try_exhaustive().unwrap();

        assert_eq!(located[0].location().to_string(), "test.cc:[1:1-1:3]");
        assert_eq!(located[1].location().to_string(), "test.cc:[2:3-2:7]");
        assert_eq!(located[2].location().to_string(), "test.cc:2:8");
    }

    #[test]
    fn integer_overflow() {
        let errors = errors("int x = 99999999999;");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].as_ref(), LexerError::IntOverflow));
    }

    #[test]
    fn recovers_at_end_of_line() {
        let errors = errors("int $x;\nint y;\nbool @z & w;");
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0].as_ref(), LexerError::BadChar('$')));
        assert!(matches!(errors[1].as_ref(), LexerError::BadChar('@')));
    }

    #[test]
    fn lone_ampersand() {
        let errors = errors("a & b");
        assert!(matches!(errors[0].as_ref(), LexerError::Expected('&')));
    }

    #[test]
    fn lone_bang_is_not_an_operator() {
        let errors = errors("bool b = !a;");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].as_ref(), LexerError::Expected('=')));
    }

    #[test]
    fn unterminated_comment() {
        let errors = errors("int x; /* never closed");
        assert!(matches!(errors[0].as_ref(), LexerError::UnterminatedComment));
    }
}
