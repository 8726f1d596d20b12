use std::collections::HashMap;

use koopa::ir::{Function, Type, Value};

/// 编译期符号。
///
/// 标量常量只活在符号表里，不产生任何 IR；常量数组需要真实存储，
/// 与变量一样携带 alloc 句柄，靠 `is_const` 拒绝赋值。
#[derive(Debug, Clone)]
pub enum Symbol {
    Const {
        internal_name: String,
        value: i32,
    },
    Var {
        internal_name: String,
        /// 声明类型：标量为 i32，数组为数组类型，数组形参为指针类型
        ty: Type,
        /// 对应的 alloc / global alloc 句柄
        value: Value,
        is_const: bool,
    },
    Func {
        internal_name: String,
        func: Function,
    },
}

impl Symbol {
    pub fn internal_name(&self) -> &str {
        match self {
            Symbol::Const { internal_name, .. }
            | Symbol::Var { internal_name, .. }
            | Symbol::Func { internal_name, .. } => internal_name,
        }
    }
}

/// 作用域符号表。
///
/// 全局作用域是栈底（深度 1），进块压栈、出块弹栈，查找自顶向下。
/// 变量与常量的内部名按 `<原名>_<深度>_<使用次数>` 重整，
/// 使用次数按 (原名, 深度) 单调递增，因此内部名在整个编译单元内唯一。
/// 函数名不重整。
pub struct SymbolTable {
    globals: HashMap<String, Symbol>,
    locals: Vec<HashMap<String, Symbol>>,
    use_count: HashMap<(String, usize), u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            globals: HashMap::new(),
            locals: Vec::new(),
            use_count: HashMap::new(),
        }
    }

    /// 当前作用域深度，全局为 1
    pub fn depth(&self) -> usize {
        1 + self.locals.len()
    }

    pub fn push(&mut self) {
        self.locals.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.locals.pop();
    }

    fn mangle(&mut self, raw: &str) -> String {
        let depth = self.depth();
        let count = self
            .use_count
            .entry((raw.to_string(), depth))
            .or_insert(0);
        *count += 1;
        format!("{}_{}_{}", raw, depth, count)
    }

    fn define(&mut self, raw: &str, symbol: Symbol) {
        // 同一作用域内重复声明直接覆盖
        match self.locals.last_mut() {
            Some(scope) => scope.insert(raw.to_string(), symbol),
            None => self.globals.insert(raw.to_string(), symbol),
        };
    }

    /// 登记标量常量，返回重整后的内部名
    pub fn insert_const(&mut self, raw: &str, value: i32) -> String {
        let internal_name = self.mangle(raw);
        self.define(
            raw,
            Symbol::Const {
                internal_name: internal_name.clone(),
                value,
            },
        );
        internal_name
    }

    /// 登记变量或常量数组，返回重整后的内部名
    pub fn insert_var(&mut self, raw: &str, ty: Type, value: Value, is_const: bool) -> String {
        let internal_name = self.mangle(raw);
        self.define(
            raw,
            Symbol::Var {
                internal_name: internal_name.clone(),
                ty,
                value,
                is_const,
            },
        );
        internal_name
    }

    /// 登记函数。函数名保持原名，库函数同样走这里
    pub fn insert_func(&mut self, raw: &str, func: Function) -> String {
        let internal_name = raw.to_string();
        self.define(
            raw,
            Symbol::Func {
                internal_name: internal_name.clone(),
                func,
            },
        );
        internal_name
    }

    /// 自顶向下查找，返回第一个命中的符号
    pub fn lookup(&self, raw: &str) -> Option<&Symbol> {
        for scope in self.locals.iter().rev() {
            if let Some(symbol) = scope.get(raw) {
                return Some(symbol);
            }
        }
        self.globals.get(raw)
    }

    /// 名字的最顶层出现是否位于全局作用域
    pub fn is_global(&self, raw: &str) -> bool {
        self.locals.iter().all(|scope| !scope.contains_key(raw)) && self.globals.contains_key(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_with_depth_and_use_count() {
        let mut table = SymbolTable::new();
        assert_eq!(table.insert_const("a", 1), "a_1_1");
        table.push();
        assert_eq!(table.insert_const("a", 2), "a_2_1");
        // 同一作用域内再次声明同名符号：计数增加，绑定被覆盖
        assert_eq!(table.insert_const("a", 3), "a_2_2");
        match table.lookup("a") {
            Some(Symbol::Const { value, .. }) => assert_eq!(*value, 3),
            other => panic!("unexpected symbol: {:?}", other),
        }
        table.pop();
        table.push();
        // 弹出再进入兄弟作用域，计数继续递增而不回退
        assert_eq!(table.insert_const("a", 4), "a_2_3");
    }

    #[test]
    fn lookup_prefers_innermost_scope() {
        let mut table = SymbolTable::new();
        table.insert_const("x", 10);
        table.push();
        table.insert_const("x", 20);
        match table.lookup("x") {
            Some(Symbol::Const { value, .. }) => assert_eq!(*value, 20),
            other => panic!("unexpected symbol: {:?}", other),
        }
        table.pop();
        match table.lookup("x") {
            Some(Symbol::Const { value, .. }) => assert_eq!(*value, 10),
            other => panic!("unexpected symbol: {:?}", other),
        }
    }

    #[test]
    fn is_global_tracks_topmost_occurrence() {
        let mut table = SymbolTable::new();
        table.insert_const("g", 1);
        assert!(table.is_global("g"));
        table.push();
        assert!(table.is_global("g"));
        table.insert_const("g", 2);
        assert!(!table.is_global("g"));
        table.pop();
        assert!(table.is_global("g"));
        assert!(!table.is_global("missing"));
    }

    #[test]
    fn function_names_are_not_mangled() {
        let mut table = SymbolTable::new();
        let mut program = koopa::ir::Program::new();
        let f = program.new_func(koopa::ir::FunctionData::new(
            "@getint".to_string(),
            Vec::new(),
            koopa::ir::Type::get_i32(),
        ));
        assert_eq!(table.insert_func("getint", f), "getint");
        assert!(matches!(table.lookup("getint"), Some(Symbol::Func { .. })));
    }
}
