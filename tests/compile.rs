use flispcc::{
    ast::Program,
    codegen::{self, Assembly, CompileError, Options},
    ir::{Condition, Instruction, Label},
    semantic::{self, TypeError},
};

fn parse(source: &str) -> Program {
    flispcc::syntax_tree("test.cc", source).expect("syntax error")
}

fn check(source: &str) -> Result<Program, TypeError> {
    semantic::typecheck(parse(source))
}

fn lower(source: &str) -> Result<Assembly, CompileError> {
    let program = check(source).expect("type error");
    codegen::lower("prog", &program, Options::empty())
}

fn compile(source: &str) -> String {
    let program = check(source).expect("type error");
    codegen::compile("prog", &program).expect("compilation failed")
}

/// Posición de cada etiqueta dentro de la región de una función.
fn label_position(body: &[Instruction], label: Label) -> usize {
    body.iter()
        .position(|instruction| *instruction == Instruction::SetLabel(label))
        .expect("label never set")
}

#[test]
fn counter_program_end_to_end() {
    let text = compile(
        "// Cuenta hasta diez\n\
         int count;\n\
         int main() {\n\
         \x20   int limit = 10;\n\
         \x20   while (count < limit) {\n\
         \x20       count++;\n\
         \x20   }\n\
         \x20   return count;\n\
         }\n",
    );

    assert!(text.contains("\tORG     $00\ng_count\tRMB     1\n"));
    assert!(text.contains("\tORG     $20\nprog_main\n\tLEASP   -1,SP\n"));
    assert!(text.contains("\t;; int limit = 10;\n"));
    assert!(text.contains("\t;; while (count < limit)\n"));
    assert!(text.contains("\tINC     g_count\n"));
    assert!(text.ends_with("prog_main_L0\n\tLEASP   1,SP\n\tRTS\n"));
}

#[test]
fn syntax_errors_are_located() {
    let diagnostics = flispcc::syntax_tree("bad.cc", "int main() {\n  return 1\n}\n").unwrap_err();
    let report = diagnostics.to_string();

    assert!(report.starts_with("Syntax error: Expected token `;`, found `}` instead\n"));
    assert!(report.contains(" --> bad.cc:3:1\n"));
    assert!(report.ends_with("Build failed with 1 error\n"));
}

#[test]
fn lexical_errors_are_batched() {
    let diagnostics = flispcc::syntax_tree("bad.cc", "int $a;\nint @b;\n").unwrap_err();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.to_string().starts_with("Lexical error: "));
}

#[test]
fn missing_main_fails() {
    assert_eq!(
        check("int helper() { return 1; }").unwrap_err(),
        TypeError::NoMain
    );
    assert_eq!(
        check("void main() { }").unwrap_err(),
        TypeError::MainReturnType(flispcc::ast::Type::Void)
    );
}

#[test]
fn bool_assignment_examples() {
    assert!(check("int main() { bool b; b = 1 < 2; return 0; }").is_ok());
    assert!(matches!(
        check("int main() { bool b; b = 1; return 0; }"),
        Err(TypeError::Mismatch { .. })
    ));
}

#[test]
fn globals_are_emitted_once_before_functions() {
    let assembly = lower(
        "int a, b;\n\
         int f() { a = 1; b = a; return b; }\n\
         int main() { a = 2; return a; }\n",
    )
    .unwrap();

    let text = assembly.to_string();
    assert_eq!(text.matches("RMB").count(), 2);
    assert_eq!(text.matches("ORG     $00").count(), 1);
    assert_eq!(text.matches("ORG     $20").count(), 1);

    let data = text.find("g_a\tRMB").unwrap();
    let code = text.find("prog_f\n").unwrap();
    assert!(data < code);
}

#[test]
fn if_true_branches_past_else() {
    let assembly = lower("int main() { int x; if (true) { x = 1; } else { x = 2; } return x; }")
        .unwrap();
    let body = &assembly.functions[0].body;

    // La prueba salta al `else` y el `then` termina saltando al final
    let (test, otherwise) = body
        .iter()
        .enumerate()
        .find_map(|(i, instruction)| match instruction {
            Instruction::Branch(Condition::Equal, label) => Some((i, *label)),
            _ => None,
        })
        .unwrap();

    let otherwise_at = label_position(body, otherwise);
    let (skip, end) = body[test..otherwise_at]
        .iter()
        .enumerate()
        .find_map(|(i, instruction)| match instruction {
            Instruction::Branch(Condition::Always, label) => Some((test + i, *label)),
            _ => None,
        })
        .unwrap();

    let end_at = label_position(body, end);
    assert!(test < skip && skip < otherwise_at && otherwise_at < end_at);

    // El `then` está entre la prueba y el salto incondicional
    assert!(body[test..skip].contains(&Instruction::Load(flispcc::ir::Operand::Immediate(1))));
    assert!(body[otherwise_at..end_at]
        .contains(&Instruction::Load(flispcc::ir::Operand::Immediate(2))));
}

#[test]
fn while_false_has_no_body_before_test() {
    let assembly = lower("int main() { int i; while (false) { i++; } return 0; }").unwrap();
    let body = &assembly.functions[0].body;

    let start = Label(1);
    let done = Label(2);
    let start_at = label_position(body, start);
    let done_at = label_position(body, done);

    assert_eq!(
        &body[start_at..start_at + 4],
        &[
            Instruction::SetLabel(start),
            Instruction::Load(flispcc::ir::Operand::Immediate(0)),
            Instruction::Compare(flispcc::ir::Operand::Immediate(0)),
            Instruction::Branch(Condition::Equal, done),
        ]
    );
    assert_eq!(
        body[done_at - 1],
        Instruction::Branch(Condition::Always, start)
    );
}

#[test]
fn labels_restart_per_function() {
    let assembly = lower(
        "int f(int x) { if (x == 0) return 1; else return 2; }\n\
         int main() { while (false) { } return 0; }\n",
    )
    .unwrap();

    let f = &assembly.functions[0];
    let main = &assembly.functions[1];
    assert_eq!(f.labels, 5);
    assert_eq!(main.labels, 3);

    let text = assembly.to_string();
    assert!(text.contains("\nprog_f_L1\n"));
    assert!(text.contains("\nprog_main_L1\n"));
}

#[test]
fn stack_high_water_mark() {
    let assembly = lower("int main() { int x; x = x - (x - (x - 1)); return x; }").unwrap();
    assert_eq!(assembly.functions[0].max_stack, 4);
}

#[test]
fn nested_subtraction_overflows() {
    let mut expr = String::from("0");
    for _ in 0..20 {
        expr = format!("1 - (2 - ({}))", expr);
    }

    let source = format!("int main() {{ int x; x = {}; return x; }}", expr);
    match lower(&source) {
        Err(CompileError::StackOverflow { depth, limit }) => {
            assert_eq!(limit, flispcc::target::STACK_LIMIT);
            assert_eq!(depth, limit + 1);
        }

        other => panic!("expected stack overflow, got {:?}", other),
    }
}

#[test]
fn too_many_globals() {
    let names: Vec<_> = (0..40).map(|i| format!("v{}", i)).collect();
    let source = format!("int {};\nint main() {{ return 0; }}", names.join(", "));

    assert_eq!(
        lower(&source).unwrap_err(),
        CompileError::TooManyGlobals {
            count: 40,
            limit: flispcc::target::MAX_GLOBALS
        }
    );
}
