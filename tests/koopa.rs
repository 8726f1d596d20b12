//! 前端集成测试：SysY 片段 → Koopa IR 文本。
//!
//! 每个用例生成的 IR 都会重新喂给 koopa 的 Driver 解析一遍，
//! 这同时验证了基本块终结、类型一致等结构性质。

use compiler::{emit_koopa_text, parse_koopa_text};

fn koopa(src: &str) -> String {
    let text = emit_koopa_text(src).expect("front end failed");
    parse_koopa_text(text.clone()).expect("emitted IR must re-parse");
    text
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("`{}` not found in:\n{}", needle, haystack))
}

#[test]
fn minimal_program() {
    let ir = koopa("int main() { return 0; }");
    assert!(ir.contains("fun @main(): i32"));
    assert!(ir.contains("%main_entry:"));
    assert!(ir.contains("ret 0"));
}

#[test]
fn library_functions_are_declared() {
    let ir = koopa("int main() { return 0; }");
    for decl in [
        "decl @getint(): i32",
        "decl @getch(): i32",
        "decl @getarray(*i32): i32",
        "decl @putint(i32)",
        "decl @putch(i32)",
        "decl @putarray(i32, *i32)",
        "decl @starttime()",
        "decl @stoptime()",
    ] {
        assert!(ir.contains(decl), "missing `{}` in:\n{}", decl, ir);
    }
}

#[test]
fn constant_expressions_fold_inline() {
    let ir = koopa("int main() { return 1 + 2 * 3 - 4; }");
    assert!(ir.contains("ret 3"), "folded return expected in:\n{}", ir);
    assert!(!ir.contains("add"), "no runtime arithmetic expected in:\n{}", ir);

    let ir = koopa("const int N = 10; int main() { return N * 2 + 1; }");
    assert!(ir.contains("ret 21"));
}

#[test]
fn scalar_constants_produce_no_storage() {
    let ir = koopa("int main() { const int c = 7; return c; }");
    assert!(!ir.contains("alloc"), "const scalar must not alloc in:\n{}", ir);
    assert!(ir.contains("ret 7"));
}

#[test]
fn variables_load_and_store() {
    let ir = koopa("int main() { int a = 5; a = a + 1; return a; }");
    // 函数体块深度为 3，首个同名变量计数为 1
    assert!(ir.contains("@a_3_1 = alloc i32"));
    assert!(ir.contains("store 5, @a_3_1"));
    assert!(ir.contains("load @a_3_1"));
}

#[test]
fn shadowing_gets_distinct_internal_names() {
    let ir = koopa(
        "int main() {
           int a = 1;
           { int a = 2; a = a + 1; }
           { int a = 3; }
           return a;
         }",
    );
    assert!(ir.contains("@a_3_1"));
    assert!(ir.contains("@a_4_1"));
    // 兄弟作用域：深度相同，计数递增
    assert!(ir.contains("@a_4_2"));
}

#[test]
fn if_else_builds_branch_blocks() {
    let ir = koopa("int main() { int a = 1; if (a) return 1; else return 2; return 3; }");
    assert!(ir.contains("br "));
    assert!(ir.contains("%if_1:"));
    assert!(ir.contains("%else_1:"));
    assert!(ir.contains("ret 1"));
    assert!(ir.contains("ret 2"));
}

#[test]
fn while_builds_loop_header_and_body() {
    let ir = koopa(
        "int main() {
           int i = 0; int s = 0;
           while (i < 10) { s = s + i; i = i + 1; }
           return s;
         }",
    );
    assert!(ir.contains("%while_1:"));
    assert!(ir.contains("%while_body_1:"));
    assert!(ir.contains("jump %while_1"));
}

#[test]
fn break_and_continue_jump_to_loop_bounds() {
    let ir = koopa(
        "int main() {
           int i = 0;
           while (1) {
             i = i + 1;
             if (i == 5) break;
             continue;
           }
           return i;
         }",
    );
    assert!(ir.contains("jump %while_1"));
    // break 跳向循环的汇合块
    let join = position(&ir, "%while_body_1:");
    assert!(join > 0);
}

#[test]
fn logical_and_short_circuits() {
    let ir = koopa("int main() { int a = 0; int b = a && getint(); return b; }");
    let rhs_block = position(&ir, "%land_1:");
    let sc_block = position(&ir, "%land_sc_1:");
    let call = position(&ir, "call @getint");
    // 右操作数的求值只出现在 land 块内
    assert!(rhs_block < call && call < sc_block, "call outside land block:\n{}", ir);
}

#[test]
fn logical_or_short_circuits() {
    let ir = koopa("int main() { int a = 1; int b = a || getint(); return b; }");
    let rhs_block = position(&ir, "%lor_1:");
    let call = position(&ir, "call @getint");
    assert!(rhs_block < call, "call outside lor block:\n{}", ir);
}

#[test]
fn folded_logical_ops_emit_no_blocks() {
    let ir = koopa("int main() { return 1 && 0; }");
    assert!(ir.contains("ret 0"));
    assert!(!ir.contains("%land_1"), "folded && must not branch:\n{}", ir);
}

#[test]
fn global_variables_and_arrays() {
    let ir = koopa(
        "int g = 42;
         int z;
         int a[3] = {1, 2, 3};
         int b[4];
         int main() { return g + a[0] + b[1] + z; }",
    );
    assert!(ir.contains("global @g_1_1 = alloc i32, 42"));
    assert!(ir.contains("global @z_1_1 = alloc i32, zeroinit"));
    assert!(ir.contains("global @a_1_1 = alloc [i32, 3], {1, 2, 3}"));
    assert!(ir.contains("global @b_1_1 = alloc [i32, 4], zeroinit"));
}

#[test]
fn global_const_array_keeps_aggregate() {
    let ir = koopa(
        "const int a[2][3] = {{1, 2, 3}, {4, 5, 6}};
         int main() { return a[1][2]; }",
    );
    assert!(ir.contains("global @a_1_1 = alloc [[i32, 3], 2]"));
    assert!(ir.contains("{4, 5, 6}"));
    assert!(ir.contains("getelemptr"));
}

#[test]
fn local_arrays_initialize_element_wise() {
    let ir = koopa("int main() { int a[2][2] = {{1}, 2, 3}; return a[1][0]; }");
    assert!(ir.contains("alloc [[i32, 2], 2]"));
    assert!(ir.contains("getelemptr"));
    // 展平结果 [1, 0, 2, 3]：补零也要写入
    assert!(ir.contains("store 1,"));
    assert!(ir.contains("store 0,"));
    assert!(ir.contains("store 2,"));
    assert!(ir.contains("store 3,"));
}

#[test]
fn array_parameters_use_pointer_types() {
    let ir = koopa(
        "int f(int a[], int n) { return a[n]; }
         int g(int m[][3]) { return m[1][2]; }
         int main() { int x[2][3]; return f(x[0], 1) + g(x); }",
    );
    assert!(ir.contains("fun @f(@a: *i32, @n: i32): i32"));
    assert!(ir.contains("fun @g(@m: *[i32, 3]): i32"));
    // 指针形参：先 load 指针再 getptr
    assert!(ir.contains("getptr"));
    // 数组实参退化：getelemptr …, 0
    assert!(ir.contains(", 0"));
}

#[test]
fn functions_can_call_forward() {
    let ir = koopa(
        "int main() { return f(7); }
         int f(int x) { return x * x; }",
    );
    assert!(ir.contains("call @f(7)"));
    assert!(ir.contains("fun @f(@x: i32): i32"));
}

#[test]
fn void_functions_get_synthetic_ret() {
    let ir = koopa("void f() { putint(1); } int main() { f(); return 0; }");
    assert!(ir.contains("fun @f()"));
    assert!(ir.contains("call @putint(1)"));
    assert!(ir.contains("call @f()"));
}

#[test]
fn statements_after_return_stay_in_fresh_block() {
    // return 之后的语句进入新的顺序块，程序仍然结构合法
    let ir = koopa("int main() { return 1; return 2; }");
    assert!(ir.contains("ret 1"));
    assert!(ir.contains("ret 2"));
    assert!(ir.contains("%seq_"));
}

#[test]
fn semantic_errors_are_fatal() {
    assert!(emit_koopa_text("int main() { return x; }").is_err());
    assert!(emit_koopa_text("int main() { const int c = 1; c = 2; return 0; }").is_err());
    assert!(emit_koopa_text("int main() { break; return 0; }").is_err());
    assert!(emit_koopa_text("int main() { continue; return 0; }").is_err());
    assert!(emit_koopa_text("int main() { return f(); }").is_err());
    assert!(emit_koopa_text("int main() { putint(); return 0; }").is_err());
    // 初始化列表没有对齐到维度边界
    assert!(emit_koopa_text("int main() { int a[2][2] = {1, {2}}; return 0; }").is_err());
    // 全局变量的初始化必须是常量表达式
    assert!(emit_koopa_text("int g = getint(); int main() { return g; }").is_err());
}

#[test]
fn parse_errors_are_reported_with_location() {
    let err = emit_koopa_text("int main() { return 0 }").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("line"), "location missing in: {}", msg);
}
