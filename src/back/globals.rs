use std::collections::HashMap;

use koopa::ir::Value;

/// 全局 alloc 到汇编符号名的映射
pub struct GlobalNames {
    names: HashMap<Value, String>,
}

impl GlobalNames {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn insert(&mut self, value: Value, name: String) {
        self.names.insert(value, name);
    }

    pub fn contains(&self, value: Value) -> bool {
        self.names.contains_key(&value)
    }

    pub fn get(&self, value: Value) -> Option<&str> {
        self.names.get(&value).map(|s| s.as_str())
    }
}
