use std::fmt;

/// 语义错误：出错原因加上可选的源码位置。
///
/// 位置以 (行, 列) 结构化保存，渲染推迟到 Display，
/// 这样上层既能打印也能在测试里检查出错点。
#[derive(Debug)]
pub struct SemanticError {
    pub message: String,
    pub location: Option<(usize, usize)>,
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.location {
            Some((line, col)) => write!(f, "{} at line {}, column {}", self.message, line, col),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug)]
pub enum CompilerError {
    // I/O 错误
    IoError(std::io::Error),
    // 解析错误
    ParseError(String),
    // 前端语义错误
    Semantic(SemanticError),
    // 汇编生成错误
    CodeGenerationError(String),
    // 命令行参数错误
    ArgsError(String),
    // 其他错误
    Other(String),
}

impl CompilerError {
    /// 无位置信息的语义错误
    pub fn semantic(message: impl Into<String>) -> Self {
        CompilerError::Semantic(SemanticError {
            message: message.into(),
            location: None,
        })
    }

    /// 带行列定位的语义错误
    pub fn semantic_at(message: impl Into<String>, line: usize, col: usize) -> Self {
        CompilerError::Semantic(SemanticError {
            message: message.into(),
            location: Some((line, col)),
        })
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::IoError(e) => write!(f, "I/O error: {}", e),
            CompilerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CompilerError::Semantic(e) => write!(f, "Semantic error: {}", e),
            CompilerError::CodeGenerationError(msg) => write!(f, "Code generation error: {}", msg),
            CompilerError::ArgsError(msg) => write!(f, "Argument error: {}", msg),
            CompilerError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CompilerError {}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::IoError(err)
    }
}

// 前端以字符串描述无处可定位的语义错误，允许隐式转换
impl From<String> for CompilerError {
    fn from(msg: String) -> Self {
        CompilerError::semantic(msg)
    }
}

impl From<&str> for CompilerError {
    fn from(msg: &str) -> Self {
        CompilerError::semantic(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_errors_render_their_location() {
        let err = CompilerError::semantic_at("`x` not found", 3, 7);
        assert_eq!(
            err.to_string(),
            "Semantic error: `x` not found at line 3, column 7"
        );
    }

    #[test]
    fn semantic_errors_without_location_stay_bare() {
        let err = CompilerError::semantic("break used outside of loop");
        assert_eq!(err.to_string(), "Semantic error: break used outside of loop");
    }
}
