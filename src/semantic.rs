//! Análisis semántico.
//!
//! Chequeo estático de tipos sobre el árbol que produce [`crate::parse`].
//! El recorrido es único: se registran firmas, se enlazan variables por
//! ámbito y se decora cada [`Expr`] con su tipo resuelto. El primer error
//! aborta el chequeo completo; no hay recuperación.

use log::{debug, trace};
use thiserror::Error;

use crate::{
    ast::{BinOp, Definition, Expr, ExprKind, Function, Program, Stmt, Type},
    scope::{Scopes, Signatures},
};

/// Firma de una función.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<Type>,
    pub returns: Type,
}

/// Funciones predefinidas, visibles desde cualquier programa.
pub fn builtins() -> impl Iterator<Item = (&'static str, Signature)> {
    [
        (
            "printInt",
            Signature {
                parameters: vec![Type::Int],
                returns: Type::Void,
            },
        ),
        (
            "readInt",
            Signature {
                parameters: vec![],
                returns: Type::Int,
            },
        ),
    ]
    .into_iter()
}

pub type Check<T> = Result<T, TypeError>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Entrypoint not found, define `int main()`")]
    NoMain,

    #[error("`main` must return `int`, found `{0}`")]
    MainReturnType(Type),

    #[error("`main` must not take parameters")]
    MainParameters,

    #[error("Function `{0}` is already defined")]
    DuplicateFunction(String),

    #[error("Variable `{0}` is already defined")]
    DuplicateVariable(String),

    #[error("Variable `{0}` cannot have type `void`")]
    VoidVariable(String),

    #[error("Variable `{0}` is undefined")]
    Undefined(String),

    #[error("Function `{0}` is undefined")]
    UndefinedFunction(String),

    #[error("Type mismatch: expected `{expected}`, found `{found}`")]
    Mismatch { expected: Type, found: Type },

    #[error("Type mismatch: expected `int`, found `{0}`")]
    ExpectedNumber(Type),

    #[error("Operands of `{op}` must be both `int` or both `bool`, found `{lhs}` and `{rhs}`")]
    Operands {
        op: &'static str,
        lhs: Type,
        rhs: Type,
    },

    #[error("Function `{function}` expects {expected} argument(s), found {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Statement not allowed in global scope: {0}")]
    GlobalStatement(String),
}

/// Chequea un programa completo, devolviéndolo decorado.
pub fn typecheck(mut program: Program) -> Check<Program> {
    let mut context = Context {
        functions: Signatures::new(),
        scopes: Scopes::new(),
    };

    for (name, signature) in builtins() {
        context
            .functions
            .insert(name, signature)
            .map_err(|_| TypeError::DuplicateFunction(name.to_owned()))?;
    }

    for definition in &program.definitions {
        if let Definition::Function(function) = definition {
            context.declare(function)?;
        }
    }

    for definition in &mut program.definitions {
        match definition {
            Definition::Global(stmt) => context.global(stmt)?,
            Definition::Function(function) => context.function(function)?,
        }
    }

    let main = program
        .definitions
        .iter()
        .find_map(|definition| match definition {
            Definition::Function(function) if function.name == "main" => Some(function),
            _ => None,
        })
        .ok_or(TypeError::NoMain)?;

    if main.returns != Type::Int {
        return Err(TypeError::MainReturnType(main.returns));
    } else if !main.parameters.is_empty() {
        return Err(TypeError::MainParameters);
    }

    Ok(program)
}

struct Context {
    functions: Signatures<Signature>,
    scopes: Scopes<Type>,
}

impl Context {
    fn declare(&mut self, function: &Function) -> Check<()> {
        let signature = Signature {
            parameters: function.parameters.iter().map(|p| p.typ).collect(),
            returns: function.returns,
        };

        self.functions
            .insert(&function.name, signature)
            .map_err(|_| TypeError::DuplicateFunction(function.name.clone()))
    }

    fn global(&mut self, stmt: &mut Stmt) -> Check<()> {
        match stmt {
            Stmt::Decls { typ, names } => {
                for name in names.iter() {
                    self.bind_global(name, *typ)?;
                }

                Ok(())
            }

            // Se chequea aquí, pero la generación de código la rechaza
            Stmt::Init { typ, name, value } => {
                non_void(name, *typ)?;
                self.check(value, *typ)?;
                self.bind_global(name, *typ)
            }

            other => Err(TypeError::GlobalStatement(other.to_string())),
        }
    }

    fn function(&mut self, function: &mut Function) -> Check<()> {
        debug!(
            "Checking function `{}` with {} parameter(s)",
            function.name,
            function.parameters.len()
        );

        self.scopes.reset_locals();
        for parameter in &function.parameters {
            self.bind(&parameter.name, parameter.typ)?;
        }

        let returns = function.returns;
        for stmt in &mut function.body {
            self.stmt(stmt, returns)?;
        }

        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt, returns: Type) -> Check<()> {
        match stmt {
            Stmt::Decls { typ, names } => {
                for name in names.iter() {
                    self.bind(name, *typ)?;
                }
            }

            Stmt::Init { typ, name, value } => {
                non_void(name, *typ)?;

                // El inicializador no puede observar el nombre declarado
                self.check(value, *typ)?;
                self.bind(name, *typ)?;
            }

            Stmt::Expr(expr) => {
                self.infer(expr)?;
            }

            Stmt::Return(expr) => self.check(expr, returns)?,

            Stmt::While { condition, body } => {
                self.check(condition, Type::Bool)?;
                self.scoped(|this| this.stmt(body, returns))?;
            }

            Stmt::Block(stmts) => self.scoped(|this| {
                stmts.iter_mut().try_for_each(|stmt| this.stmt(stmt, returns))
            })?,

            Stmt::IfElse {
                condition,
                then,
                otherwise,
            } => {
                self.check(condition, Type::Bool)?;
                self.scoped(|this| this.stmt(then, returns))?;
                self.scoped(|this| this.stmt(otherwise, returns))?;
            }
        }

        Ok(())
    }

    /// Exige identidad de tipos.
    fn check(&mut self, expr: &mut Expr, expected: Type) -> Check<()> {
        let found = self.infer(expr)?;
        expr.widen = false;

        if found == expected {
            Ok(())
        } else {
            Err(TypeError::Mismatch { expected, found })
        }
    }

    /// Resuelve el tipo de una expresión y decora el nodo.
    fn infer(&mut self, expr: &mut Expr) -> Check<Type> {
        let typ = match &mut expr.kind {
            ExprKind::Int(_) => Type::Int,
            ExprKind::True | ExprKind::False => Type::Bool,
            ExprKind::Var(name) => self.lookup(name)?,

            ExprKind::PostIncr(name)
            | ExprKind::PostDecr(name)
            | ExprKind::PreIncr(name)
            | ExprKind::PreDecr(name) => match self.lookup(name)? {
                Type::Int => Type::Int,
                other => return Err(TypeError::ExpectedNumber(other)),
            },

            ExprKind::Call {
                function,
                arguments,
            } => {
                let signature = self
                    .functions
                    .get(function)
                    .cloned()
                    .ok_or_else(|| TypeError::UndefinedFunction(function.clone()))?;

                if signature.parameters.len() != arguments.len() {
                    return Err(TypeError::Arity {
                        function: function.clone(),
                        expected: signature.parameters.len(),
                        found: arguments.len(),
                    });
                }

                for (argument, &parameter) in arguments.iter_mut().zip(&signature.parameters) {
                    self.check(argument, parameter)?;
                }

                signature.returns
            }

            ExprKind::Binary(lhs, op, rhs) => self.binary(lhs, *op, rhs)?,

            ExprKind::Assign(name, value) => {
                let typ = self.lookup(name)?;
                self.check(value, typ)?;
                typ
            }
        };

        trace!("`{}` has type `{}`", expr, typ);

        expr.typ = Some(typ);
        expr.widen = false;
        Ok(typ)
    }

    fn binary(&mut self, lhs: &mut Expr, op: BinOp, rhs: &mut Expr) -> Check<Type> {
        use BinOp::*;

        match op {
            Mul | Div | Add | Sub => {
                self.numeric(lhs)?;
                self.numeric(rhs)?;
                Ok(Type::Int)
            }

            Lt | Gt | LtEq | GtEq => {
                self.numeric(lhs)?;
                self.numeric(rhs)?;
                Ok(Type::Bool)
            }

            // Pares `bool` o, por compatibilidad, pares `int`
            Eq | NotEq | And | Or => {
                let left = self.infer(lhs)?;
                let right = self.infer(rhs)?;

                match (left, right) {
                    (Type::Int, Type::Int) | (Type::Bool, Type::Bool) => Ok(Type::Bool),
                    (lhs, rhs) => Err(TypeError::Operands {
                        op: op.symbol(),
                        lhs,
                        rhs,
                    }),
                }
            }
        }
    }

    fn numeric(&mut self, expr: &mut Expr) -> Check<()> {
        match self.infer(expr)? {
            Type::Int => Ok(()),
            other => Err(TypeError::ExpectedNumber(other)),
        }
    }

    fn lookup(&self, name: &str) -> Check<Type> {
        self.scopes
            .lookup(name)
            .copied()
            .ok_or_else(|| TypeError::Undefined(name.to_owned()))
    }

    fn bind(&mut self, name: &str, typ: Type) -> Check<()> {
        non_void(name, typ)?;
        self.scopes
            .bind(name, typ)
            .map_err(|_| TypeError::DuplicateVariable(name.to_owned()))
    }

    fn bind_global(&mut self, name: &str, typ: Type) -> Check<()> {
        non_void(name, typ)?;
        self.scopes
            .bind_global(name, typ)
            .map_err(|_| TypeError::DuplicateVariable(name.to_owned()))
    }

    fn scoped<F>(&mut self, callback: F) -> Check<()>
    where
        F: FnOnce(&mut Self) -> Check<()>,
    {
        self.scopes.enter();
        let result = callback(self);
        self.scopes.leave();

        result
    }
}

fn non_void(name: &str, typ: Type) -> Check<()> {
    match typ {
        Type::Void => Err(TypeError::VoidVariable(name.to_owned())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> Check<Program> {
        let program = crate::syntax_tree("test.cc", text).expect("syntax error");
        typecheck(program)
    }

    fn check_main(body: &str) -> Check<Program> {
        check(&format!("int main() {{ {} return 0; }}", body))
    }

    fn all_typed(expr: &Expr) -> bool {
        let children = match &expr.kind {
            ExprKind::Binary(lhs, _, rhs) => all_typed(lhs) && all_typed(rhs),
            ExprKind::Assign(_, value) => all_typed(value),
            ExprKind::Call { arguments, .. } => arguments.iter().all(all_typed),
            _ => true,
        };

        children && matches!(expr.typ, Some(Type::Int | Type::Bool | Type::Void)) && !expr.widen
    }

    fn stmt_typed(stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Decls { .. } => true,
            Stmt::Init { value, .. } => all_typed(value),
            Stmt::Expr(expr) | Stmt::Return(expr) => all_typed(expr),
            Stmt::While { condition, body } => all_typed(condition) && stmt_typed(body),
            Stmt::Block(stmts) => stmts.iter().all(stmt_typed),
            Stmt::IfElse {
                condition,
                then,
                otherwise,
            } => all_typed(condition) && stmt_typed(then) && stmt_typed(otherwise),
        }
    }

    #[test]
    fn main_is_required() {
        assert_eq!(check("int f() { return 0; }").unwrap_err(), TypeError::NoMain);
        assert_eq!(
            check("bool main() { return true; }").unwrap_err(),
            TypeError::MainReturnType(Type::Bool)
        );
        assert_eq!(
            check("int main(int x) { return x; }").unwrap_err(),
            TypeError::MainParameters
        );
    }

    #[test]
    fn every_expression_is_decorated() {
        let program = check(
            "int g;
             int twice(int x) { return x + x; }
             int main() {
                 int a = 1;
                 bool b = a < 2 && true;
                 while (b) { a = twice(a) - 1; b = a != 3; }
                 if (b == false) printInt(a++); else { --a; }
                 return readInt();
             }",
        )
        .unwrap();

        for definition in &program.definitions {
            if let Definition::Function(function) = definition {
                assert!(function.body.iter().all(stmt_typed), "{}", function);
            }
        }
    }

    #[test]
    fn redeclaration_fails() {
        assert_eq!(
            check_main("int x; bool x;").unwrap_err(),
            TypeError::DuplicateVariable("x".into())
        );
        assert_eq!(
            check("int g; int main() { bool g; return 0; }").unwrap_err(),
            TypeError::DuplicateVariable("g".into())
        );
        assert_eq!(
            check("int g; int f(int g) { return g; } int main() { return 0; }").unwrap_err(),
            TypeError::DuplicateVariable("g".into())
        );
        assert_eq!(
            check("int g; bool g; int main() { return 0; }").unwrap_err(),
            TypeError::DuplicateVariable("g".into())
        );
    }

    #[test]
    fn shadowing_in_inner_scope() {
        assert!(check_main("int x; { bool x; x = true; } x = 1;").is_ok());
        assert!(check_main("int x; if (true) { bool x; } else { bool x; }").is_ok());
    }

    #[test]
    fn scope_ends_with_block() {
        assert_eq!(
            check_main("{ int y; } y = 1;").unwrap_err(),
            TypeError::Undefined("y".into())
        );
    }

    #[test]
    fn initializer_cannot_see_itself() {
        assert_eq!(
            check_main("int x = x + 1;").unwrap_err(),
            TypeError::Undefined("x".into())
        );
    }

    #[test]
    fn void_variables() {
        assert_eq!(
            check_main("void v;").unwrap_err(),
            TypeError::VoidVariable("v".into())
        );
        assert_eq!(
            check("int f(void p) { return 0; } int main() { return 0; }").unwrap_err(),
            TypeError::VoidVariable("p".into())
        );
        assert_eq!(
            check("void g; int main() { return 0; }").unwrap_err(),
            TypeError::VoidVariable("g".into())
        );
    }

    #[test]
    fn identity_of_types() {
        assert!(check_main("bool b; b = 1 < 2;").is_ok());
        assert_eq!(
            check_main("bool b; b = 1;").unwrap_err(),
            TypeError::Mismatch {
                expected: Type::Bool,
                found: Type::Int
            }
        );
        assert_eq!(
            check("int main() { return true; }").unwrap_err(),
            TypeError::Mismatch {
                expected: Type::Int,
                found: Type::Bool
            }
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            check_main("int x = 1 + true;").unwrap_err(),
            TypeError::ExpectedNumber(Type::Bool)
        );
        assert_eq!(
            check_main("bool b = true < false;").unwrap_err(),
            TypeError::ExpectedNumber(Type::Bool)
        );
        assert!(check_main("bool b = 1 == 2 && true != false;").is_ok());
        assert!(check_main("bool b = 1 || 0;").is_ok());
        assert_eq!(
            check_main("bool b = 1 && true;").unwrap_err(),
            TypeError::Operands {
                op: "&&",
                lhs: Type::Int,
                rhs: Type::Bool
            }
        );
        assert_eq!(
            check_main("bool b; b++;").unwrap_err(),
            TypeError::ExpectedNumber(Type::Bool)
        );
    }

    #[test]
    fn conditions_must_be_bool() {
        assert_eq!(
            check_main("while (1) { }").unwrap_err(),
            TypeError::Mismatch {
                expected: Type::Bool,
                found: Type::Int
            }
        );
    }

    #[test]
    fn calls() {
        assert!(check("int main() { return f(1); } int f(int x) { return x; }").is_ok());
        assert_eq!(
            check_main("printInt(1, 2);").unwrap_err(),
            TypeError::Arity {
                function: "printInt".into(),
                expected: 1,
                found: 2
            }
        );
        assert_eq!(
            check_main("printInt(true);").unwrap_err(),
            TypeError::Mismatch {
                expected: Type::Int,
                found: Type::Bool
            }
        );
        assert_eq!(
            check_main("nope();").unwrap_err(),
            TypeError::UndefinedFunction("nope".into())
        );
        assert_eq!(
            check("int f() { return 0; } bool f() { return true; } int main() { return 0; }")
                .unwrap_err(),
            TypeError::DuplicateFunction("f".into())
        );
        assert_eq!(
            check("int printInt() { return 0; } int main() { return 0; }").unwrap_err(),
            TypeError::DuplicateFunction("printInt".into())
        );
    }

    #[test]
    fn builtins_register_once() {
        let mut names: Vec<_> = builtins().map(|(name, _)| name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names, vec!["printInt", "readInt"]);

        assert!(check_main("printInt(readInt());").is_ok());
    }

    #[test]
    fn global_statements() {
        assert!(check("int a, b; int main() { a = b; return a; }").is_ok());
        assert!(check("int a = 3; int main() { return a; }").is_ok());
        assert_eq!(
            check("return 1; int main() { return 0; }").unwrap_err(),
            TypeError::GlobalStatement("return 1;".into())
        );
    }
}
