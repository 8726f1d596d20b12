use std::collections::HashMap;

use koopa::ir::Value;

use crate::CompilerError;

/// 栈帧规划。
///
/// 低区放第 9 个及之后的出参，中区给每个有名字的 IR 值一个槽
/// （alloc 槽按被分配类型的大小），高区固定 4 字节保存返回地址。
/// 总大小向上对齐到 16 字节。
///
/// ```text
/// +------------------+ <- sp + rounded_size
/// |  返回地址 (upper) |
/// +------------------+ <- offset_upper
/// |  值槽   (middle)  |
/// +------------------+ <- lower
/// |  出参   (lower)   |
/// +------------------+ <- sp
/// ```
pub struct StackFrame {
    lower: usize,
    upper: usize,
    middle: usize,
    offsets: HashMap<Value, usize>,
}

impl StackFrame {
    pub fn new() -> Self {
        Self {
            lower: 0,
            upper: 0,
            middle: 0,
            offsets: HashMap::new(),
        }
    }

    /// 开始处理一个函数前调用
    pub fn clear(&mut self) {
        self.lower = 0;
        self.upper = 0;
        self.middle = 0;
        self.offsets.clear();
    }

    /// 在中区登记一个值；重复登记是无害的
    pub fn alloc(&mut self, value: Value, size: usize) {
        if self.offsets.contains_key(&value) {
            return;
        }
        self.offsets.insert(value, self.middle);
        self.middle += size;
    }

    /// 预留低区出参空间
    pub fn alloc_lower(&mut self, size: usize) {
        self.lower = size;
    }

    /// 预留高区返回地址空间
    pub fn alloc_upper(&mut self, size: usize) {
        self.upper = size;
    }

    pub fn contains(&self, value: Value) -> bool {
        self.offsets.contains_key(&value)
    }

    /// 值槽相对 sp 的偏移
    pub fn offset(&self, value: Value) -> Result<i32, CompilerError> {
        self.offsets
            .get(&value)
            .map(|o| (self.lower + o) as i32)
            .ok_or_else(|| {
                CompilerError::CodeGenerationError(format!("No stack slot for value {:?}", value))
            })
    }

    /// 低区（出参）起始偏移，恒为 0
    pub fn offset_lower(&self) -> i32 {
        0
    }

    /// 高区（返回地址）起始偏移
    pub fn offset_upper(&self) -> i32 {
        (self.lower + self.middle) as i32
    }

    pub fn size(&self) -> usize {
        self.lower + self.middle + self.upper
    }

    /// 对齐到 16 字节后的帧大小
    pub fn rounded_size(&self) -> i32 {
        ((self.size() + 15) / 16 * 16) as i32
    }
}

#[cfg(test)]
mod tests {
    use koopa::ir::builder_traits::*;
    use koopa::ir::{FunctionData, Program, Type};

    use super::*;

    fn test_values(n: usize) -> Vec<Value> {
        let mut program = Program::new();
        let f = program.new_func(FunctionData::new(
            "@frame_test".to_string(),
            Vec::new(),
            Type::get_unit(),
        ));
        let dfg = program.func_mut(f).dfg_mut();
        (0..n).map(|i| dfg.new_value().integer(i as i32)).collect()
    }

    #[test]
    fn middle_slots_stack_after_lower_area() {
        let values = test_values(3);
        let mut frame = StackFrame::new();
        frame.alloc_upper(4);
        frame.alloc(values[0], 4);
        frame.alloc(values[1], 12); // 数组槽
        frame.alloc(values[2], 4);
        frame.alloc_lower(8);

        assert_eq!(frame.offset(values[0]).unwrap(), 8);
        assert_eq!(frame.offset(values[1]).unwrap(), 12);
        assert_eq!(frame.offset(values[2]).unwrap(), 24);
        assert_eq!(frame.offset_lower(), 0);
        assert_eq!(frame.offset_upper(), 28);
        assert_eq!(frame.size(), 32);
        assert_eq!(frame.rounded_size(), 32);
    }

    #[test]
    fn size_rounds_up_to_sixteen() {
        let values = test_values(1);
        let mut frame = StackFrame::new();
        frame.alloc_upper(4);
        frame.alloc(values[0], 4);
        assert_eq!(frame.size(), 8);
        assert_eq!(frame.rounded_size(), 16);

        frame.clear();
        assert_eq!(frame.rounded_size(), 0);
    }

    #[test]
    fn double_alloc_is_ignored() {
        let values = test_values(1);
        let mut frame = StackFrame::new();
        frame.alloc(values[0], 4);
        frame.alloc(values[0], 4);
        assert_eq!(frame.offset(values[0]).unwrap(), 0);
        assert_eq!(frame.size(), 4);
    }

    #[test]
    fn missing_slot_is_an_error() {
        let values = test_values(1);
        let frame = StackFrame::new();
        assert!(frame.offset(values[0]).is_err());
    }
}
