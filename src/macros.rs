/// Escribe una línea de instrucción: tabulador, mnemónico alineado y operandos.
macro_rules! emit {
    ($output:expr, $opcode:expr) => {
        write!($output, "\t{}", $opcode)
    };

    ($output:expr, $opcode:expr, $($format:tt)*) => {{
        write!($output, "\t{:8}", $opcode)?;
        write!($output, $($format)*)
    }};
}
