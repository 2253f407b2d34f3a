//! 端到端测试：整段源码从编译到执行，校验程序输出

use qi::i18n::Locale;
use qi::vm::InterpretResult;
use qi::VM;

fn run(source: &str) -> (InterpretResult, String) {
    let mut vm = VM::with_output(Vec::new());
    vm.set_locale(Locale::Zh);
    let result = vm.interpret(source);
    let output = String::from_utf8_lossy(vm.output()).to_string();
    (result, output)
}

fn assert_output(source: &str, expected: &str) {
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok, "执行失败：\n{}", source);
    assert_eq!(output, expected, "输出不符：\n{}", source);
}

fn assert_runtime_error(source: &str) {
    let (result, _) = run(source);
    assert_eq!(result, InterpretResult::RuntimeError, "应当运行失败：\n{}", source);
}

fn assert_compile_error(source: &str) {
    let (result, _) = run(source);
    assert_eq!(result, InterpretResult::CompileError, "应当编译失败：\n{}", source);
}

#[test]
fn interned_strings_compare_equal() {
    assert_output("变量 甲 = \"你好\"; 变量 乙 = \"你好\"; 打印 甲 == 乙;", "true\n");
}

#[test]
fn sort_orders_list_in_place() {
    assert_output("变量 李 = [3, 1, 2]; 李.排序(); 打印 李;", "[1, 2, 3]\n");
}

#[test]
fn counters_capture_independent_state() {
    let source = "
        功能 造计数器() {
            变量 数 = 0;
            功能 数数() { 数 = 数 + 1; 返回 数; }
            返回 数数;
        }
        变量 甲 = 造计数器();
        变量 乙 = 造计数器();
        打印 甲();
        打印 甲();
        打印 乙();
    ";
    assert_output(source, "1\n2\n1\n");
}

#[test]
fn super_calls_overridden_method() {
    let source = "
        类 甲 { 函() { 返回 1; } }
        类 乙 < 甲 { 函() { 返回 超.函() + 1; } }
        打印 乙().函();
    ";
    assert_output(source, "2\n");
}

#[test]
fn substring_with_negative_indices() {
    assert_output("打印 \"abcdef\".子串(1, -1);", "bcde\n");
}

#[test]
fn arity_mismatch_raises_runtime_error() {
    assert_runtime_error("功能 双(甲, 乙) { 返回 甲 + 乙; } 双(1);");
}

#[test]
fn deep_recursion_overflows_frames() {
    assert_runtime_error("功能 无底() { 返回 无底(); } 无底();");
}

#[test]
fn static_instance_field_write_fails() {
    let mut vm = VM::with_output(Vec::new());
    vm.set_locale(Locale::Zh);
    let class = vm.new_class("常量");
    let instance = vm.new_instance(class, true);
    vm.define_property("值", qi::vm::Value::Number(1.0), instance);
    vm.define_native_instance("常量", instance);

    assert_eq!(vm.interpret("打印 常量.值;"), InterpretResult::Ok);
    assert_eq!(vm.interpret("常量.值 = 2;"), InterpretResult::RuntimeError);
}

#[test]
fn calling_non_callable_fails() {
    assert_runtime_error("变量 甲 = 真; 甲();");
}

#[test]
fn fibonacci_end_to_end() {
    let source = "
        功能 斐(甲) {
            如果 (甲 < 2) { 返回 甲; }
            返回 斐(甲 - 1) + 斐(甲 - 2);
        }
        打印 斐(15);
    ";
    assert_output(source, "610\n");
}

#[test]
fn class_hierarchy_with_fields_and_methods() {
    let source = "
        类 动物 {
            初始化(名) { 这.名 = 名; }
            叫() { 返回 这.名 + \"出声\"; }
        }
        类 狗 < 动物 {
            叫() { 返回 超.叫() + \"：汪\"; }
        }
        变量 旺 = 狗(\"旺财\");
        打印 旺.叫();
    ";
    assert_output(source, "旺财出声：汪\n");
}

#[test]
fn inherited_methods_are_copied_down() {
    let source = "
        类 甲 { 问() { 返回 \"甲答\"; } }
        类 乙 < 甲 {}
        打印 乙().问();
    ";
    assert_output(source, "甲答\n");
}

#[test]
fn list_pipeline_filter_then_sort() {
    let source = "
        功能 正(数) { 返回 数 > 0; }
        功能 降(甲, 乙) { 返回 乙 - 甲; }
        变量 李 = [3, 0 - 1, 5, 0, 2];
        变量 筛 = 李.过滤(正);
        筛.排序(降);
        打印 筛;
    ";
    assert_output(source, "[5, 3, 2]\n");
}

#[test]
fn closures_over_loop_variable_share_capture() {
    let source = "
        变量 存 = [0, 0];
        {
            变量 数 = 10;
            功能 加() { 数 = 数 + 1; 返回 数; }
            存[0] = 加;
            存[1] = 加;
        }
        存[0]();
        打印 存[1]();
    ";
    assert_output(source, "12\n");
}

#[test]
fn string_methods_compose() {
    let source = "
        变量 句 = \"  气-语-言  \";
        变量 净 = 句.修剪();
        变量 段 = 净.拆分(\"-\");
        打印 段.长度();
        打印 段[0] + 段[1] + 段[2];
    ";
    assert_output(source, "3\n气语言\n");
}

#[test]
fn while_loop_with_compound_assignment() {
    let source = "
        变量 和 = 0;
        变量 甲 = 1;
        当 (甲 <= 100) {
            和 += 甲;
            甲++;
        }
        打印 和;
    ";
    assert_output(source, "5050\n");
}

#[test]
fn for_loop_builds_list() {
    let source = "
        变量 方 = [];
        循环 (变量 甲 = 1; 甲 <= 5; 甲 = 甲 + 1) {
            方.推(甲 * 甲);
        }
        打印 方;
    ";
    assert_output(source, "[1, 4, 9, 16, 25]\n");
}

#[test]
fn bitwise_pipeline() {
    assert_output("打印 (1 << 3) | (1 << 1);", "10\n");
    assert_output("打印 255 & 15;", "15\n");
    assert_output("打印 5 ^ 3;", "6\n");
    assert_output("打印 ~5;", "-6\n");
}

#[test]
fn gc_survives_allocation_heavy_program() {
    let source = "
        功能 造串(次) {
            变量 串 = \"基\";
            循环 (变量 甲 = 0; 甲 < 次; 甲 = 甲 + 1) {
                串 = 串 + \"段\";
            }
            返回 串;
        }
        变量 们 = [];
        循环 (变量 乙 = 0; 乙 < 20; 乙 = 乙 + 1) {
            们.推(造串(50));
        }
        打印 们.长度();
        打印 们[19].长度();
    ";
    assert_output(source, "20\n51\n");
}

#[test]
fn runtime_error_in_callee_reports_and_resets() {
    let mut vm = VM::with_output(Vec::new());
    vm.set_locale(Locale::Zh);
    let source = "
        功能 里() { 返回 1 + \"二\"; }
        功能 外() { 返回 里(); }
        外();
    ";
    assert_eq!(vm.interpret(source), InterpretResult::RuntimeError);
    // 错误后虚拟机可以继续使用
    assert_eq!(vm.interpret("打印 \"恢复\";"), InterpretResult::Ok);
    let output = String::from_utf8_lossy(vm.output()).to_string();
    assert_eq!(output, "恢复\n");
}

#[test]
fn compile_errors_reported_per_statement() {
    assert_compile_error("变量 = 1;");
    assert_compile_error("如果 真 { }");
    assert_compile_error("功能 坏( { }");
    assert_compile_error("返回 1;");
}

#[test]
fn type_errors_at_runtime() {
    assert_runtime_error("打印 1 + \"串\";");
    assert_runtime_error("打印 -\"串\";");
    assert_runtime_error("打印 \"串\" < \"串\";");
    assert_runtime_error("打印 1 & \"串\";");
    assert_runtime_error("打印 空[0];");
}

#[test]
fn print_number_formatting() {
    assert_output("打印 1.0;", "1\n");
    assert_output("打印 0.5;", "0.5\n");
    assert_output("打印 1 / 3 * 3;", "1\n");
}
