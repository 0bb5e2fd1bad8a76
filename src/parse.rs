//! Análisis sintáctico.
//!
//! Parser de descenso recursivo para C--. Las expresiones binarias
//! se resuelven por escalada de precedencia sobre [`BinOp::precedence()`].
//! El primer error sintáctico detiene el análisis.

use std::{iter::Peekable, marker::PhantomData};
use thiserror::Error;

use crate::{
    ast::{BinOp, Definition, Expr, ExprKind, Function, Parameter, Program, Stmt, Type},
    lex::{Keyword, Token},
    source::{Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected token {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected token {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected any of `int`, `bool`, `void`")]
    ExpectedType,

    #[error("Expected an expression")]
    ExpectedExpr,

    #[error("Only a variable may be incremented or decremented")]
    ExpectedVariable,

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

/// Analiza un flujo completo de tokens.
///
/// `start` es la ubicación inicial del archivo, usada para reportar
/// errores antes de haber consumido algún token.
pub fn parse<'a, I>(tokens: I, start: Location) -> Result<Program, Located<ParserError>>
where
    I: Iterator<Item = &'a Located<Token>> + Clone,
{
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: start,
        lifetime_hack: PhantomData,
    };

    parser.program()
}

#[derive(Clone)]
struct Parser<'a, I: Iterator<Item = &'a Located<Token>> + Clone> {
    tokens: Peekable<I>,
    last_known: Location,
    lifetime_hack: PhantomData<&'a ()>,
}

type Parse<T> = Result<T, Located<ParserError>>;

impl<'a, I: Iterator<Item = &'a Located<Token>> + Clone> Parser<'a, I> {
    fn program(&mut self) -> Parse<Program> {
        let mut definitions = Vec::new();
        while self.tokens.peek().is_some() {
            definitions.push(self.definition()?);
        }

        Ok(Program { definitions })
    }

    fn definition(&mut self) -> Parse<Definition> {
        // `tipo id (` inicia una función, cualquier otra cosa es global
        let is_function = self.lookahead(|s| {
            s.typ().is_ok() && s.id().is_ok() && s.peek() == Some(&Token::OpenParen)
        });

        if is_function {
            self.function().map(Definition::Function)
        } else {
            self.statement().map(Definition::Global)
        }
    }

    fn function(&mut self) -> Parse<Function> {
        let returns = self.typ()?;
        let name = self.id()?;

        self.expect(Token::OpenParen)?;
        let parameters = self.comma_separated(Self::parameter, Token::CloseParen)?;
        self.expect(Token::CloseParen)?;

        let body = self.statement_block()?;

        Ok(Function {
            name,
            returns,
            parameters,
            body,
        })
    }

    fn parameter(&mut self) -> Parse<Parameter> {
        let typ = self.typ()?;
        let name = self.id()?;

        Ok(Parameter { name, typ })
    }

    fn statement_block(&mut self) -> Parse<Vec<Stmt>> {
        self.expect(Token::OpenCurly)?;

        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::CloseCurly) => {
                    self.next()?;
                    break Ok(statements);
                }

                _ => statements.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Parse<Stmt> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return self.fail(ParserError::UnexpectedEof),
        };

        match token {
            Token::Keyword(Keyword::Int | Keyword::Bool | Keyword::Void) => self.declaration(),
            Token::Keyword(Keyword::Return) => self.return_statement(),
            Token::Keyword(Keyword::While) => self.while_statement(),
            Token::Keyword(Keyword::If) => self.if_statement(),
            Token::OpenCurly => self.statement_block().map(Stmt::Block),

            _ => {
                let expr = self.expr()?;
                self.expect(Token::Semicolon)?;

                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn declaration(&mut self) -> Parse<Stmt> {
        let typ = self.typ()?;
        let name = self.id()?;

        if self.optional(Token::Assign)? {
            let value = self.expr()?;
            self.expect(Token::Semicolon)?;

            return Ok(Stmt::Init { typ, name, value });
        }

        let mut names = vec![name];
        while self.optional(Token::Comma)? {
            names.push(self.id()?);
        }

        self.expect(Token::Semicolon)?;
        Ok(Stmt::Decls { typ, names })
    }

    fn return_statement(&mut self) -> Parse<Stmt> {
        self.keyword(Keyword::Return)?;
        let expr = self.expr()?;
        self.expect(Token::Semicolon)?;

        Ok(Stmt::Return(expr))
    }

    fn while_statement(&mut self) -> Parse<Stmt> {
        self.keyword(Keyword::While)?;
        let condition = self.condition()?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    fn if_statement(&mut self) -> Parse<Stmt> {
        self.keyword(Keyword::If)?;
        let condition = self.condition()?;
        let then = Box::new(self.statement()?);

        self.keyword(Keyword::Else)?;
        let otherwise = Box::new(self.statement()?);

        Ok(Stmt::IfElse {
            condition,
            then,
            otherwise,
        })
    }

    fn condition(&mut self) -> Parse<Expr> {
        self.expect(Token::OpenParen)?;
        let condition = self.expr()?;
        self.expect(Token::CloseParen)?;

        Ok(condition)
    }

    fn typ(&mut self) -> Parse<Type> {
        match self.next()?.into_inner() {
            Token::Keyword(Keyword::Int) => Ok(Type::Int),
            Token::Keyword(Keyword::Bool) => Ok(Type::Bool),
            Token::Keyword(Keyword::Void) => Ok(Type::Void),
            _ => self.fail(ParserError::ExpectedType),
        }
    }

    fn expr(&mut self) -> Parse<Expr> {
        // La asignación es asociativa a la derecha y solo admite un identificador
        let is_assignment = self.lookahead(|s| {
            matches!(s.next().map(Located::into_inner), Ok(Token::Id(_)))
                && s.peek() == Some(&Token::Assign)
        });

        if is_assignment {
            let name = self.id()?;
            self.expect(Token::Assign)?;
            let value = self.expr()?;

            Ok(Expr::assign(name, value))
        } else {
            self.binary(BinOp::Or.precedence())
        }
    }

    fn binary(&mut self, min_precedence: u8) -> Parse<Expr> {
        let mut lhs = self.unary()?;

        loop {
            let op = match self.peek().and_then(binary_op) {
                Some(op) if op.precedence() >= min_precedence => op,
                _ => break Ok(lhs),
            };

            self.next()?;
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Expr::binary(lhs, op, rhs);
        }
    }

    fn unary(&mut self) -> Parse<Expr> {
        let prefix = match self.peek() {
            Some(Token::Increment) => ExprKind::PreIncr as fn(String) -> ExprKind,
            Some(Token::Decrement) => ExprKind::PreDecr,
            _ => return self.postfix(),
        };

        self.next()?;
        match self.id() {
            Ok(name) => Ok(Expr::new(prefix(name))),
            Err(_) => self.fail(ParserError::ExpectedVariable),
        }
    }

    fn postfix(&mut self) -> Parse<Expr> {
        let atom = self.atom()?;

        let postfix = match self.peek() {
            Some(Token::Increment) => ExprKind::PostIncr as fn(String) -> ExprKind,
            Some(Token::Decrement) => ExprKind::PostDecr,
            _ => return Ok(atom),
        };

        self.next()?;
        match atom.kind {
            ExprKind::Var(name) => Ok(Expr::new(postfix(name))),
            _ => self.fail(ParserError::ExpectedVariable),
        }
    }

    fn atom(&mut self) -> Parse<Expr> {
        match self.next()?.into_inner() {
            Token::IntLiteral(value) => Ok(Expr::int(value)),
            Token::Keyword(Keyword::True) => Ok(Expr::boolean(true)),
            Token::Keyword(Keyword::False) => Ok(Expr::boolean(false)),

            Token::Id(id) => {
                let name = id.as_ref().to_owned();
                if !self.optional(Token::OpenParen)? {
                    return Ok(Expr::var(name));
                }

                let arguments = self.comma_separated(Self::expr, Token::CloseParen)?;
                self.expect(Token::CloseParen)?;

                Ok(Expr::call(name, arguments))
            }

            Token::OpenParen => {
                let expr = self.expr()?;
                self.expect(Token::CloseParen)?;

                Ok(expr)
            }

            _ => self.fail(ParserError::ExpectedExpr),
        }
    }

    /// Consume `token` si es el siguiente, indicando si ocurrió.
    fn optional(&mut self, token: Token) -> Parse<bool> {
        if self.peek() == Some(&token) {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn lookahead<T, F>(&mut self, rule: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        rule(&mut self.clone())
    }

    /// Secuencia separada por comas, posiblemente vacía si sigue `end`.
    fn comma_separated<T, F>(&mut self, mut rule: F, end: Token) -> Parse<Vec<T>>
    where
        F: FnMut(&mut Self) -> Parse<T>,
    {
        if self.peek() == Some(&end) {
            return Ok(Vec::new());
        }

        let mut items = vec![rule(self)?];
        while self.optional(Token::Comma)? {
            items.push(rule(self)?);
        }

        Ok(items)
    }

    fn id(&mut self) -> Parse<String> {
        match self.next()?.into_inner() {
            Token::Id(id) => Ok(id.as_ref().to_owned()),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        if self.tokens.peek().is_none() {
            return self.fail(ParserError::MissingToken(token));
        }

        match self.next()?.into_inner() {
            found if found == token => Ok(()),
            found => self.fail(ParserError::UnexpectedToken(token, found)),
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek().map(|token| token.as_ref())
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}

fn binary_op(token: &Token) -> Option<BinOp> {
    let op = match token {
        Token::Times => BinOp::Mul,
        Token::Divide => BinOp::Div,
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Less => BinOp::Lt,
        Token::Greater => BinOp::Gt,
        Token::LessOrEqual => BinOp::LtEq,
        Token::GreaterOrEqual => BinOp::GtEq,
        Token::Equal => BinOp::Eq,
        Token::NotEqual => BinOp::NotEq,
        Token::And => BinOp::And,
        Token::Or => BinOp::Or,
        _ => return None,
    };

    Some(op)
}
