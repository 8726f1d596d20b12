use compiler::utils::args::{Mode, Params};
use compiler::utils::logger::print_error_and_exit;
use compiler::{build_ir, emit_riscv_text, CompilerError};
use koopa::back::KoopaGenerator;

fn main() {
    if let Err(e) = run() {
        print_error_and_exit(&e, 1);
    }
}

fn run() -> Result<(), CompilerError> {
    let params = Params::from_args()?;
    let input = std::fs::read_to_string(&params.input)?;

    match params.mode {
        Mode::Koopa => {
            let program = build_ir(&input)?;
            KoopaGenerator::from_path(&params.output)?
                .generate_on(&program)
                .map_err(|e| {
                    CompilerError::CodeGenerationError(format!("Failed to write Koopa IR: {}", e))
                })?;
        }
        // -riscv 与 -perf 行为一致
        Mode::Riscv | Mode::Perf => {
            let asm = emit_riscv_text(&input)?;
            std::fs::write(&params.output, asm)?;
        }
    }
    Ok(())
}
