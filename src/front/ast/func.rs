use super::{Block, DataType, Decl, Expr, Span};

// FuncFParam ::= "int" IDENT ["[" "]" {"[" ConstExp "]"}];
#[derive(Debug, Clone, PartialEq)]
pub struct FuncFParam {
    pub ty: DataType,
    pub name: String,
    pub is_array: bool,
    /// 省略的首维不计入，这里只有显式写出的各维长度
    pub dims: Vec<Expr>,
    pub span: Span,
}

// FuncDef ::= ("int" | "void") IDENT "(" [FuncFParams] ")" Block;
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub ty: DataType,
    pub name: String,
    pub params: Vec<FuncFParam>,
    pub body: Block,
    pub span: Span,
}

// CompUnit ::= {Decl | FuncDef};
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalItem {
    Decl(Decl),
    FuncDef(FuncDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompUnit {
    pub items: Vec<GlobalItem>,
}
