//! Árbol sintáctico de C--.
//!
//! Esta es la frontera entre el parser y las fases posteriores. El
//! árbol se produce sin tipos; [`crate::semantic`] lo decora en sitio
//! escribiendo `typ` y `widen` en cada [`Expr`]. Todos los nodos se
//! imprimen como código fuente, lo cual usa el generador de código
//! para intercalar comentarios en el ensamblador.

use std::fmt::{self, Display};

/// Tipo de una variable, parámetro, función o expresión.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Void,
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => fmt.write_str("int"),
            Type::Bool => fmt.write_str("bool"),
            Type::Void => fmt.write_str("void"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Function(Function),

    /// Declaración a nivel global. Solo una declaración de múltiples
    /// nombres es legal aquí, pero el parser acepta cualquier sentencia
    /// y deja que las fases posteriores la rechacen.
    Global(Stmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub returns: Type,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `int x, y, z;`
    Decls { typ: Type, names: Vec<String> },

    /// `int x = e;`
    Init { typ: Type, name: String, value: Expr },

    /// `e;`
    Expr(Expr),

    /// `return e;`
    Return(Expr),

    /// `while (e) s`
    While { condition: Expr, body: Box<Stmt> },

    /// `{ s* }`
    Block(Vec<Stmt>),

    /// `if (e) s else s`
    IfElse {
        condition: Expr,
        then: Box<Stmt>,
        otherwise: Box<Stmt>,
    },
}

/// Una expresión junto a sus decoraciones.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,

    /// Tipo resuelto, `None` hasta que pase el chequeo de tipos.
    pub typ: Option<Type>,

    /// Si el tipo difiere del que impone el contexto y requiere
    /// ensanchamiento. Con identidad estricta de tipos siempre es `false`.
    pub widen: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i32),
    True,
    False,
    Var(String),
    Call {
        function: String,
        arguments: Vec<Expr>,
    },

    /// `x++`
    PostIncr(String),

    /// `x--`
    PostDecr(String),

    /// `++x`
    PreIncr(String),

    /// `--x`
    PreDecr(String),

    Binary(Box<Expr>, BinOp, Box<Expr>),

    /// `x = e`
    Assign(String, Box<Expr>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Add,
    Sub,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
}

impl BinOp {
    /// Símbolo en código fuente.
    pub fn symbol(self) -> &'static str {
        use BinOp::*;

        match self {
            Mul => "*",
            Div => "/",
            Add => "+",
            Sub => "-",
            Lt => "<",
            Gt => ">",
            LtEq => "<=",
            GtEq => ">=",
            Eq => "==",
            NotEq => "!=",
            And => "&&",
            Or => "||",
        }
    }

    /// Precedencia, mayor es más fuerte.
    pub fn precedence(self) -> u8 {
        use BinOp::*;

        match self {
            Mul | Div => 12,
            Add | Sub => 11,
            Lt | Gt | LtEq | GtEq => 9,
            Eq | NotEq => 8,
            And => 4,
            Or => 3,
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            kind,
            typ: None,
            widen: false,
        }
    }

    pub fn int(value: i32) -> Self {
        Expr::new(ExprKind::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::new(if value { ExprKind::True } else { ExprKind::False })
    }

    pub fn var<S: Into<String>>(name: S) -> Self {
        Expr::new(ExprKind::Var(name.into()))
    }

    pub fn binary(lhs: Expr, op: BinOp, rhs: Expr) -> Self {
        Expr::new(ExprKind::Binary(Box::new(lhs), op, Box::new(rhs)))
    }

    pub fn assign<S: Into<String>>(name: S, value: Expr) -> Self {
        Expr::new(ExprKind::Assign(name.into(), Box::new(value)))
    }

    pub fn call<S: Into<String>>(function: S, arguments: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call {
            function: function.into(),
            arguments,
        })
    }

    /// Precedencia de la expresión, usada para decidir paréntesis al imprimir.
    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary(_, op, _) => op.precedence(),
            ExprKind::Assign(..) => 2,
            ExprKind::PreIncr(_) | ExprKind::PreDecr(_) => 14,
            ExprKind::PostIncr(_) | ExprKind::PostDecr(_) => 15,
            _ => 16,
        }
    }
}

impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for definition in &self.definitions {
            match definition {
                Definition::Function(function) => writeln!(fmt, "{}", function)?,
                Definition::Global(stmt) => writeln!(fmt, "{}", stmt)?,
            }
        }

        Ok(())
    }
}

impl Display for Function {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}(", self.returns, self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }

            write!(fmt, "{}", parameter)?;
        }

        fmt.write_str(") {")?;
        for stmt in &self.body {
            write!(fmt, " {}", stmt)?;
        }

        fmt.write_str(" }")
    }
}

impl Display for Parameter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.typ, self.name)
    }
}

impl Display for Stmt {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Decls { typ, names } => write!(fmt, "{} {};", typ, names.join(", ")),
            Stmt::Init { typ, name, value } => write!(fmt, "{} {} = {};", typ, name, value),
            Stmt::Expr(expr) => write!(fmt, "{};", expr),
            Stmt::Return(expr) => write!(fmt, "return {};", expr),
            Stmt::While { condition, body } => write!(fmt, "while ({}) {}", condition, body),

            Stmt::Block(stmts) => {
                fmt.write_str("{")?;
                for stmt in stmts {
                    write!(fmt, " {}", stmt)?;
                }

                fmt.write_str(" }")
            }

            Stmt::IfElse {
                condition,
                then,
                otherwise,
            } => write!(fmt, "if ({}) {} else {}", condition, then, otherwise),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Int(value) => write!(fmt, "{}", value),
            ExprKind::True => fmt.write_str("true"),
            ExprKind::False => fmt.write_str("false"),
            ExprKind::Var(name) => fmt.write_str(name),

            ExprKind::Call {
                function,
                arguments,
            } => {
                write!(fmt, "{}(", function)?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }

                    write!(fmt, "{}", argument)?;
                }

                fmt.write_str(")")
            }

            ExprKind::PostIncr(name) => write!(fmt, "{}++", name),
            ExprKind::PostDecr(name) => write!(fmt, "{}--", name),
            ExprKind::PreIncr(name) => write!(fmt, "++{}", name),
            ExprKind::PreDecr(name) => write!(fmt, "--{}", name),

            ExprKind::Binary(lhs, op, rhs) => {
                // Asociatividad a la izquierda: el operando derecho con la
                // misma precedencia requiere paréntesis
                let precedence = op.precedence();
                write_operand(fmt, lhs, lhs.precedence() < precedence)?;
                write!(fmt, " {} ", op.symbol())?;
                write_operand(fmt, rhs, rhs.precedence() <= precedence)
            }

            ExprKind::Assign(name, value) => write!(fmt, "{} = {}", name, value),
        }
    }
}

fn write_operand(fmt: &mut fmt::Formatter<'_>, operand: &Expr, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(fmt, "({})", operand)
    } else {
        write!(fmt, "{}", operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parenthesization_follows_precedence() {
        let sum = Expr::binary(Expr::int(1), BinOp::Add, Expr::var("x"));
        let product = Expr::binary(sum.clone(), BinOp::Mul, Expr::int(3));
        assert_eq!(product.to_string(), "(1 + x) * 3");

        let nested = Expr::binary(Expr::var("a"), BinOp::Sub, sum);
        assert_eq!(nested.to_string(), "a - (1 + x)");

        let assign = Expr::assign("y", Expr::binary(Expr::var("a"), BinOp::Lt, Expr::int(2)));
        assert_eq!(assign.to_string(), "y = a < 2");
    }

    #[test]
    fn statements_print_as_source() {
        let stmt = Stmt::IfElse {
            condition: Expr::boolean(true),
            then: Box::new(Stmt::Expr(Expr::new(ExprKind::PostIncr("i".into())))),
            otherwise: Box::new(Stmt::Block(vec![Stmt::Decls {
                typ: Type::Int,
                names: vec!["a".into(), "b".into()],
            }])),
        };

        assert_eq!(stmt.to_string(), "if (true) i++; else { int a, b; }");
    }
}
