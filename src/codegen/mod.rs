//! Generación de código.
//!
//! Traduce un programa ya chequeado a ensamblador FLISP. Cada función
//! se genera de forma aislada: contador de etiquetas, ranuras locales
//! y contadores de pila nacen y mueren con ella. Las variables globales
//! se reservan una única vez, antes de todo el código.
//!
//! Los valores viven en el acumulador `A`. Los operadores distintos de
//! `+` preservan su operando izquierdo en la pila de hardware mientras
//! evalúan el derecho.

pub mod stack;

use bitflags::bitflags;
use log::debug;
use thiserror::Error;

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use crate::{
    arch::{Emitter, CODE_ORIGIN, DATA_ORIGIN, MAX_GLOBALS},
    ast::{BinOp, Definition, Expr, ExprKind, Function, Program, Stmt, Type},
    ir::{Condition, Global, Instruction, Label, Operand, Place},
    scope::{Scopes, Signatures},
    semantic::{self, Signature},
};

bitflags! {
    /// Opciones de emisión.
    pub struct Options: u32 {
        /// Intercala el código fuente de cada sentencia como comentario.
        const COMMENTS = 1 << 0;

        /// Emite el bloque de encabezado.
        const HEADER = 1 << 1;
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::COMMENTS | Options::HEADER
    }
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Function calls are not implemented yet: `{0}`")]
    CallNotImplemented(String),

    #[error("Operator `{0}` is not supported by the target")]
    Unsupported(&'static str),

    #[error("Statement not allowed in global scope: {0}")]
    GlobalStatement(String),

    #[error("Stack overflow: depth {depth} exceeds the limit of {limit} bytes")]
    StackOverflow { depth: u32, limit: u32 },

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Immediate value {0} does not fit in one byte")]
    ImmediateOutOfRange(i32),

    #[error("Stack offset {0} does not fit in one byte")]
    OffsetOutOfRange(i32),

    #[error("Too many global variables: {count}, at most {limit} fit before code")]
    TooManyGlobals { count: usize, limit: usize },

    #[error("Symbol `{0}` is undefined")]
    Undefined(String),

    #[error("Symbol `{0}` is defined more than once")]
    Redefinition(String),
}

pub type Lower<T> = Result<T, CompileError>;

/// Listado completo de un módulo.
#[derive(Debug)]
pub struct Assembly {
    pub module: String,
    pub header: bool,

    /// Variables globales en orden de declaración.
    pub globals: Vec<Global>,

    /// Líneas de la sección de datos, vacía si no hay globales.
    pub data: Vec<String>,

    pub functions: Vec<FunctionCode>,
}

/// Región de código de una función.
#[derive(Debug)]
pub struct FunctionCode {
    pub name: String,
    pub symbol: Rc<str>,

    /// Nombre de cada ranura local, en orden de dirección.
    pub locals: Vec<String>,

    /// Cantidad de etiquetas acuñadas.
    pub labels: u32,

    /// Marca de agua de la pila.
    pub max_stack: u32,

    pub body: Vec<Instruction>,
    pub lines: Vec<String>,
}

/// Genera el ensamblador de un módulo con opciones por defecto.
pub fn compile(module: &str, program: &Program) -> Lower<String> {
    lower(module, program, Options::default()).map(|assembly| assembly.to_string())
}

/// Genera el listado estructurado de un módulo.
pub fn lower(module: &str, program: &Program, options: Options) -> Lower<Assembly> {
    let mut unit = Unit {
        module,
        functions: Signatures::new(),
        scopes: Scopes::new(),
    };

    for (name, signature) in semantic::builtins() {
        unit.declare(name, Rc::from(name), signature)?;
    }

    for definition in &program.definitions {
        if let Definition::Function(function) = definition {
            let signature = Signature {
                parameters: function.parameters.iter().map(|p| p.typ).collect(),
                returns: function.returns,
            };

            let symbol = Rc::from(format!("{}_{}", module, function.name));
            unit.declare(&function.name, symbol, signature)?;
        }
    }

    let globals = unit.globals(program)?;

    let mut data = Emitter::new(Rc::from(module));
    if !globals.is_empty() {
        data.emit(Instruction::Origin(DATA_ORIGIN))?;
        for global in &globals {
            data.emit(Instruction::Reserve(global.clone()))?;
        }
    }

    let functions = program
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Function(function) => Some(function),
            Definition::Global(_) => None,
        })
        .enumerate()
        .map(|(index, function)| unit.function(function, index == 0, options))
        .collect::<Lower<Vec<_>>>()?;

    let (_, data, _) = data.finish();
    Ok(Assembly {
        module: module.to_owned(),
        header: options.contains(Options::HEADER),
        globals,
        data,
        functions,
    })
}

impl Display for Assembly {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.header {
            writeln!(fmt, ";;--------------------------------+")?;
            writeln!(fmt, ";; flispcc assembly output")?;
            writeln!(fmt, ";; module: {}", self.module)?;
            writeln!(fmt, ";;--------------------------------+")?;
        }

        let functions = self.functions.iter().flat_map(|function| &function.lines);
        for line in self.data.iter().chain(functions) {
            writeln!(fmt, "{}", line)?;
        }

        Ok(())
    }
}

/// Destino de una función.
struct Callee {
    symbol: Rc<str>,
    signature: Signature,
}

/// Ubicación abstracta de una variable.
#[derive(Clone)]
enum Slot {
    Global(Global),
    Local(u32),
}

/// Modo de evaluación de una expresión.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    /// El resultado reemplaza al contenido de `A`.
    Fresh,

    /// El resultado se suma al contenido de `A`.
    AccumulateInto,
}

/// Estado que persiste durante todo el módulo.
struct Unit<'a> {
    module: &'a str,
    functions: Signatures<Callee>,
    scopes: Scopes<Slot>,
}

impl Unit<'_> {
    fn declare(&mut self, name: &str, symbol: Rc<str>, signature: Signature) -> Lower<()> {
        self.functions
            .insert(name, Callee { symbol, signature })
            .map_err(|_| CompileError::Redefinition(name.to_owned()))
    }

    fn globals(&mut self, program: &Program) -> Lower<Vec<Global>> {
        let mut globals = Vec::new();

        for definition in &program.definitions {
            let stmt = match definition {
                Definition::Global(stmt) => stmt,
                Definition::Function(_) => continue,
            };

            let names = match stmt {
                Stmt::Decls { typ, names } if *typ != Type::Void => names,
                other => return Err(CompileError::GlobalStatement(other.to_string())),
            };

            for name in names {
                let global = Global(Rc::from(format!("g_{}", name)));
                self.scopes
                    .bind_global(name, Slot::Global(global.clone()))
                    .map_err(|_| CompileError::Redefinition(name.clone()))?;

                globals.push(global);
            }
        }

        if globals.len() > MAX_GLOBALS {
            return Err(CompileError::TooManyGlobals {
                count: globals.len(),
                limit: MAX_GLOBALS,
            });
        }

        debug!("Module `{}` has {} global(s)", self.module, globals.len());
        Ok(globals)
    }

    fn function(
        &mut self,
        function: &Function,
        first: bool,
        options: Options,
    ) -> Lower<FunctionCode> {
        let symbol: Rc<str> = Rc::from(format!("{}_{}", self.module, function.name));
        self.scopes.reset_locals();

        let mut cx = Context {
            functions: &self.functions,
            scopes: &mut self.scopes,
            emitter: Emitter::new(Rc::clone(&symbol)),
            options,
            labels: 0,
            locals: Vec::new(),
            exit: Label(0),
        };

        cx.exit = cx.label();

        // Los argumentos ya residen en sus ranuras del marco
        for parameter in &function.parameters {
            let slot = cx.bind(&parameter.name)?;
            cx.comment(parameter)?;
            cx.emit(Instruction::Load(Operand::Place(Place::Frame(slot))))?;
        }

        for stmt in &function.body {
            cx.stmt(stmt)?;
        }

        let Context {
            emitter: body,
            labels,
            locals,
            exit,
            ..
        } = cx;

        let frame = locals.len() as i32;
        let mut region = Emitter::new(Rc::clone(&symbol));

        if first {
            region.emit(Instruction::Origin(CODE_ORIGIN))?;
        }

        region.emit(Instruction::Entry(Rc::clone(&symbol)))?;
        region.emit(Instruction::Frame(-frame))?;
        region.append(body);
        region.emit(Instruction::SetLabel(exit))?;
        region.emit(Instruction::Frame(frame))?;
        region.emit(Instruction::Return)?;

        let (body, lines, stack) = region.finish();
        debug!(
            "Lowered `{}`: {} slot(s), {} label(s), stack high-water mark {}",
            symbol,
            locals.len(),
            labels,
            stack.high_water()
        );

        Ok(FunctionCode {
            name: function.name.clone(),
            symbol,
            locals,
            labels,
            max_stack: stack.high_water(),
            body,
            lines,
        })
    }
}

/// Estado de generación de una única función.
struct Context<'a> {
    functions: &'a Signatures<Callee>,
    scopes: &'a mut Scopes<Slot>,
    emitter: Emitter,
    options: Options,
    labels: u32,
    locals: Vec<String>,
    exit: Label,
}

impl Context<'_> {
    fn stmt(&mut self, stmt: &Stmt) -> Lower<()> {
        match stmt {
            Stmt::Decls { typ, names } => {
                self.comment(stmt)?;
                if *typ != Type::Void {
                    for name in names {
                        self.bind(name)?;
                    }
                }
            }

            Stmt::Init { name, value, .. } => {
                self.comment(stmt)?;
                self.expr(value, Mode::Fresh)?;

                let slot = self.bind(name)?;
                let place = self.frame(slot);
                self.emit(Instruction::Store(place))?;
            }

            Stmt::Expr(expr) => {
                self.comment(stmt)?;
                self.expr(expr, Mode::Fresh)?;
            }

            Stmt::Return(expr) => {
                self.comment(stmt)?;
                self.expr(expr, Mode::Fresh)?;
                self.emit(Instruction::Branch(Condition::Always, self.exit))?;
            }

            Stmt::While { condition, body } => {
                let start = self.label();
                let done = self.label();

                self.comment(format_args!("while ({})", condition))?;
                self.emit(Instruction::SetLabel(start))?;
                self.test(condition, done)?;
                self.scoped(|cx| cx.stmt(body))?;
                self.emit(Instruction::Branch(Condition::Always, start))?;
                self.emit(Instruction::SetLabel(done))?;
            }

            Stmt::Block(stmts) => {
                self.scoped(|cx| stmts.iter().try_for_each(|stmt| cx.stmt(stmt)))?;
            }

            Stmt::IfElse {
                condition,
                then,
                otherwise,
            } => {
                let otherwise_label = self.label();
                let end = self.label();

                self.comment(format_args!("if ({})", condition))?;
                self.test(condition, otherwise_label)?;
                self.scoped(|cx| cx.stmt(then))?;
                self.emit(Instruction::Branch(Condition::Always, end))?;
                self.emit(Instruction::SetLabel(otherwise_label))?;
                self.scoped(|cx| cx.stmt(otherwise))?;
                self.emit(Instruction::SetLabel(end))?;
            }
        }

        Ok(())
    }

    /// Salta a `otherwise` si la condición es falsa.
    fn test(&mut self, condition: &Expr, otherwise: Label) -> Lower<()> {
        self.expr(condition, Mode::Fresh)?;
        self.emit(Instruction::Compare(Operand::Immediate(0)))?;
        self.emit(Instruction::Branch(Condition::Equal, otherwise))
    }

    fn expr(&mut self, expr: &Expr, mode: Mode) -> Lower<()> {
        match &expr.kind {
            ExprKind::Int(value) => self.leaf(Operand::Immediate(*value), mode),
            ExprKind::True => self.leaf(Operand::Immediate(1), mode),
            ExprKind::False => self.leaf(Operand::Immediate(0), mode),

            ExprKind::Var(name) => {
                let place = self.place(name)?;
                self.leaf(Operand::Place(place), mode)
            }

            // Cadenas de sumas sobre el mismo acumulador
            ExprKind::Binary(lhs, BinOp::Add, rhs) => {
                self.expr(lhs, mode)?;
                self.expr(rhs, Mode::AccumulateInto)
            }

            _ => match mode {
                Mode::Fresh => self.compound(expr),

                Mode::AccumulateInto => {
                    self.emit(Instruction::Push)?;
                    self.compound(expr)?;
                    self.emit(Instruction::Add(Operand::Place(Place::Frame(0))))?;
                    self.emit(Instruction::Store(Place::Frame(0)))?;
                    self.emit(Instruction::Pull)
                }
            },
        }
    }

    fn leaf(&mut self, operand: Operand, mode: Mode) -> Lower<()> {
        match mode {
            Mode::Fresh => self.emit(Instruction::Load(operand)),
            Mode::AccumulateInto => self.emit(Instruction::Add(operand)),
        }
    }

    /// Expresiones que no son hojas ni sumas, siempre hacia `A`.
    fn compound(&mut self, expr: &Expr) -> Lower<()> {
        use Instruction::*;

        match &expr.kind {
            ExprKind::PreIncr(name) => {
                let place = self.place(name)?;
                self.emit(Increment(place.clone()))?;
                self.emit(Load(Operand::Place(place)))
            }

            ExprKind::PreDecr(name) => {
                let place = self.place(name)?;
                self.emit(Decrement(place.clone()))?;
                self.emit(Load(Operand::Place(place)))
            }

            ExprKind::PostIncr(name) => {
                let place = self.place(name)?;
                self.emit(Load(Operand::Place(place.clone())))?;
                self.emit(Increment(place))
            }

            ExprKind::PostDecr(name) => {
                let place = self.place(name)?;
                self.emit(Load(Operand::Place(place.clone())))?;
                self.emit(Decrement(place))
            }

            ExprKind::Assign(name, value) => {
                self.expr(value, Mode::Fresh)?;
                let place = self.place(name)?;
                self.emit(Store(place))
            }

            ExprKind::Call { function, .. } => match self.functions.get(function) {
                Some(callee) => {
                    debug!(
                        "Call to `{}` with {} argument(s) cannot be lowered",
                        callee.symbol,
                        callee.signature.parameters.len()
                    );

                    Err(CompileError::CallNotImplemented(function.clone()))
                }

                None => Err(CompileError::Undefined(function.clone())),
            },

            ExprKind::Binary(lhs, op, rhs) => match op {
                BinOp::Mul | BinOp::Div => Err(CompileError::Unsupported(op.symbol())),
                BinOp::Sub => self.subtract(lhs, rhs),
                BinOp::Or => self.short_circuit(lhs, rhs, true),
                BinOp::And => self.short_circuit(lhs, rhs, false),
                _ => self.compare(lhs, *op, rhs),
            },

            // Hojas y sumas se resuelven en `expr()`
            _ => self.expr(expr, Mode::Fresh),
        }
    }

    /// Deja ambos operandos en la pila: izquierdo en `1,SP`, derecho en `0,SP`.
    fn operands(&mut self, lhs: &Expr, rhs: &Expr) -> Lower<()> {
        self.expr(lhs, Mode::Fresh)?;
        self.emit(Instruction::Push)?;
        self.expr(rhs, Mode::Fresh)?;
        self.emit(Instruction::Push)
    }

    /// Toma el resultado de `1,SP` y libera ambos operandos.
    fn drop_operands(&mut self) -> Lower<()> {
        self.emit(Instruction::Store(Place::Frame(1)))?;
        self.emit(Instruction::Pull)?;
        self.emit(Instruction::Pull)
    }

    fn subtract(&mut self, lhs: &Expr, rhs: &Expr) -> Lower<()> {
        self.operands(lhs, rhs)?;
        self.emit(Instruction::Load(Operand::Place(Place::Frame(1))))?;
        self.emit(Instruction::Sub(Operand::Place(Place::Frame(0))))?;
        self.drop_operands()
    }

    fn compare(&mut self, lhs: &Expr, op: BinOp, rhs: &Expr) -> Lower<()> {
        use Instruction::*;

        let truthy = self.label();
        let end = self.label();

        self.operands(lhs, rhs)?;
        self.emit(Load(Operand::Place(Place::Frame(1))))?;
        self.emit(Compare(Operand::Place(Place::Frame(0))))?;
        self.emit(Branch(condition(op), truthy))?;
        self.emit(Load(Operand::Immediate(0)))?;
        self.emit(Branch(Condition::Always, end))?;
        self.emit(SetLabel(truthy))?;
        self.emit(Load(Operand::Immediate(1)))?;
        self.emit(SetLabel(end))?;
        self.drop_operands()
    }

    /// `||` si `decisive` es verdadero, `&&` en otro caso.
    ///
    /// El resultado se precarga en la pila con el valor que decide la
    /// operación y solo se reemplaza si ningún operando lo alcanza.
    fn short_circuit(&mut self, lhs: &Expr, rhs: &Expr, decisive: bool) -> Lower<()> {
        use Instruction::*;

        let (decided, otherwise, on_decisive) = if decisive {
            (1, 0, Condition::NotEqual)
        } else {
            (0, 1, Condition::Equal)
        };

        let done = self.label();

        self.emit(Load(Operand::Immediate(decided)))?;
        self.emit(Push)?;

        for operand in [lhs, rhs] {
            self.expr(operand, Mode::Fresh)?;
            self.emit(Compare(Operand::Immediate(0)))?;
            self.emit(Branch(on_decisive, done))?;
        }

        self.emit(Load(Operand::Immediate(otherwise)))?;
        self.emit(Store(Place::Frame(0)))?;
        self.emit(SetLabel(done))?;
        self.emit(Pull)
    }

    fn place(&self, name: &str) -> Lower<Place> {
        match self.scopes.lookup(name) {
            Some(Slot::Global(global)) => Ok(Place::Global(global.clone())),
            Some(Slot::Local(slot)) => Ok(self.frame(*slot)),
            None => Err(CompileError::Undefined(name.to_owned())),
        }
    }

    /// Desplazamiento de una ranura local a la profundidad actual.
    fn frame(&self, slot: u32) -> Place {
        Place::Frame(slot + self.emitter.depth())
    }

    /// Asigna la siguiente ranura local.
    fn bind(&mut self, name: &str) -> Lower<u32> {
        let slot = self.locals.len() as u32;
        self.scopes
            .bind(name, Slot::Local(slot))
            .map_err(|_| CompileError::Redefinition(name.to_owned()))?;

        self.locals.push(name.to_owned());
        Ok(slot)
    }

    fn label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;
        label
    }

    fn comment<D: Display>(&mut self, source: D) -> Lower<()> {
        if self.options.contains(Options::COMMENTS) {
            self.emit(Instruction::Comment(source.to_string()))?;
        }

        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) -> Lower<()> {
        self.emitter.emit(instruction)
    }

    fn scoped<F>(&mut self, callback: F) -> Lower<()>
    where
        F: FnOnce(&mut Self) -> Lower<()>,
    {
        self.scopes.enter();
        let result = callback(self);
        self.scopes.leave();

        result
    }
}

fn condition(op: BinOp) -> Condition {
    match op {
        BinOp::Eq => Condition::Equal,
        BinOp::NotEq => Condition::NotEqual,
        BinOp::Gt => Condition::Greater,
        BinOp::Lt => Condition::Less,
        BinOp::GtEq => Condition::GreaterOrEqual,
        BinOp::LtEq => Condition::LessOrEqual,
        _ => Condition::Always,
    }
}
