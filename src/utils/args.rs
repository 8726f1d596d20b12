use std::env::args;

use crate::CompilerError;

/// 输出模式。-perf 的行为与 -riscv 相同，保留给后续优化。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Koopa,
    Riscv,
    Perf,
}

/// 命令行参数：`compiler <-koopa|-riscv|-perf> <输入文件> -o <输出文件>`
#[derive(Debug, Clone)]
pub struct Params {
    pub input: String,
    pub output: String,
    pub mode: Mode,
}

impl Params {
    pub fn from_args() -> Result<Self, CompilerError> {
        Self::parse(args().skip(1))
    }

    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, CompilerError> {
        let mut input = None;
        let mut output = None;
        let mut mode = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-koopa" => set_mode(&mut mode, Mode::Koopa)?,
                "-riscv" => set_mode(&mut mode, Mode::Riscv)?,
                "-perf" => set_mode(&mut mode, Mode::Perf)?,
                "-o" => match args.next() {
                    Some(path) => output = Some(path),
                    None => {
                        return Err(CompilerError::ArgsError(
                            "Output file not specified after -o".to_string(),
                        ))
                    }
                },
                _ if input.is_none() => input = Some(arg),
                _ => {
                    return Err(CompilerError::ArgsError(
                        "Multiple input files are not supported".to_string(),
                    ))
                }
            }
        }

        Ok(Params {
            input: input.ok_or_else(|| {
                CompilerError::ArgsError("Input file not specified".to_string())
            })?,
            output: output.ok_or_else(|| {
                CompilerError::ArgsError("Output file not specified".to_string())
            })?,
            mode: mode.ok_or_else(|| {
                CompilerError::ArgsError(
                    "No output format specified (-koopa, -riscv or -perf)".to_string(),
                )
            })?,
        })
    }
}

fn set_mode(slot: &mut Option<Mode>, mode: Mode) -> Result<(), CompilerError> {
    if slot.is_some() {
        return Err(CompilerError::ArgsError(
            "Multiple output formats specified; please choose only one".to_string(),
        ));
    }
    *slot = Some(mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Params, CompilerError> {
        Params::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn accepts_each_mode() {
        let params = parse(&["-koopa", "in.c", "-o", "out.koopa"]).unwrap();
        assert_eq!(params.mode, Mode::Koopa);
        assert_eq!(params.input, "in.c");
        assert_eq!(params.output, "out.koopa");
        assert_eq!(parse(&["-riscv", "in.c", "-o", "out.S"]).unwrap().mode, Mode::Riscv);
        assert_eq!(parse(&["-perf", "in.c", "-o", "out.S"]).unwrap().mode, Mode::Perf);
    }

    #[test]
    fn flag_order_does_not_matter() {
        let params = parse(&["in.c", "-o", "out.S", "-riscv"]).unwrap();
        assert_eq!(params.mode, Mode::Riscv);
        assert_eq!(params.input, "in.c");
    }

    #[test]
    fn rejects_incomplete_or_conflicting_args() {
        // 缺输入 / 缺输出 / 缺模式
        assert!(parse(&["-koopa", "-o", "out"]).is_err());
        assert!(parse(&["-koopa", "in.c"]).is_err());
        assert!(parse(&["in.c", "-o", "out"]).is_err());
        // 模式互斥
        assert!(parse(&["-koopa", "-riscv", "in.c", "-o", "out"]).is_err());
        // 多个输入文件
        assert!(parse(&["-koopa", "a.c", "b.c", "-o", "out"]).is_err());
        // -o 悬空
        assert!(parse(&["-koopa", "in.c", "-o"]).is_err());
    }
}
