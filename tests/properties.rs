//! 性质测试：对语言语义的定律做随机化验证

use proptest::prelude::*;

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

/// 执行一段应当打印 true 的程序
fn assert_prints_true(source: &str) -> Result<(), TestCaseError> {
    let (result, output) = run(source);
    prop_assert_eq!(result, InterpretResult::Ok, "执行失败：{}", source);
    prop_assert_eq!(output.as_str(), "true\n", "不成立：{}", source);
    Ok(())
}

/// 数字字面量：保证往返解析精确
fn lit(n: f64) -> String {
    // 用十进制小数完整写出，避免科学计数法
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{:.17}", n)
    }
}

/// 有限且大小适中的数字，运算不会溢出到无穷
fn arb_number() -> impl Strategy<Value = f64> {
    (-1.0e8..1.0e8f64).prop_filter("有限", |n| n.is_finite())
}

/// 仅含安全字符的字符串（不含引号和转义）
fn arb_text() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z0-9甲乙丙丁东南西北]{0,8}").unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 加法交换律
    #[test]
    fn addition_commutes(a in arb_number(), b in arb_number()) {
        let source = format!("打印 {} + {} == {} + {};", lit(a), lit(b), lit(b), lit(a));
        assert_prints_true(&source)?;
    }

    /// 乘法交换律
    #[test]
    fn multiplication_commutes(a in arb_number(), b in arb_number()) {
        let source = format!("打印 {} * {} == {} * {};", lit(a), lit(b), lit(b), lit(a));
        assert_prints_true(&source)?;
    }

    /// x - x == 0
    #[test]
    fn self_subtraction_is_zero(a in arb_number()) {
        let source = format!("打印 {} - {} == 0;", lit(a), lit(a));
        assert_prints_true(&source)?;
    }

    /// x / 1 == x
    #[test]
    fn division_by_one_is_identity(a in arb_number()) {
        let source = format!("打印 {} / 1 == {};", lit(a), lit(a));
        assert_prints_true(&source)?;
    }

    /// 字符串连接结合律，且驻留保证内容相等即对象相等
    #[test]
    fn concat_associates(a in arb_text(), b in arb_text(), c in arb_text()) {
        let source = format!(
            "打印 (\"{}\" + \"{}\") + \"{}\" == \"{}\" + (\"{}\" + \"{}\");",
            a, b, c, a, b, c
        );
        assert_prints_true(&source)?;
    }

    /// 驻留：相同字面量处处是同一对象
    #[test]
    fn equal_literals_are_identical(a in arb_text()) {
        let source = format!("变量 甲 = \"{}\"; 变量 乙 = \"{}\"; 打印 甲 == 乙;", a, a);
        assert_prints_true(&source)?;
    }

    /// 负索引回绕：李[-k] == 李[长 - k]
    #[test]
    fn negative_index_wraps(items in proptest::collection::vec(-100i64..100, 1..12), k in 1usize..12) {
        let k = (k % items.len()) + 1;
        let list = items
            .iter()
            .map(|n| {
                if *n < 0 {
                    format!("0 - {}", -n)
                } else {
                    n.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let source = format!(
            "变量 李 = [{}]; 打印 李[0 - {}] == 李[{} - {}];",
            list, k, items.len(), k
        );
        assert_prints_true(&source)?;
    }

    /// 排序后列表有序且长度不变
    #[test]
    fn sort_produces_ordered_list(items in proptest::collection::vec(-1000i64..1000, 0..16)) {
        let list = items
            .iter()
            .map(|n| {
                if *n < 0 {
                    format!("0 - {}", -n)
                } else {
                    n.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let source = format!(
            "变量 李 = [{}];
             李.排序();
             变量 有序 = 真;
             循环 (变量 甲 = 1; 甲 < 李.长度(); 甲 = 甲 + 1) {{
                 如果 (李[甲 - 1] > 李[甲]) {{ 有序 = 假; }}
             }}
             打印 有序 和 李.长度() == {};",
            list,
            items.len()
        );
        assert_prints_true(&source)?;
    }

    /// 子串往返：任意合法区间都能取出，长度正确
    #[test]
    fn substring_length_matches_range(text in "[a-z甲乙丙]{1,10}", begin in 0usize..10, end in 0usize..11) {
        let len = text.chars().count();
        let begin = begin % len;
        let end = begin + (end % (len - begin + 1));
        let source = format!(
            "打印 \"{}\".子串({}, {}).长度() == {};",
            text, begin, end, end - begin
        );
        assert_prints_true(&source)?;
    }

    /// 计数器闭包独立计数
    #[test]
    fn counters_are_independent(first in 1usize..6, second in 1usize..6) {
        let mut source = String::from(
            "功能 造() { 变量 数 = 0; 功能 加() { 数 = 数 + 1; 返回 数; } 返回 加; }
             变量 甲 = 造(); 变量 乙 = 造(); 变量 终 = 0;",
        );
        for _ in 0..first {
            source.push_str("终 = 甲();");
        }
        for _ in 0..second {
            source.push_str("乙();");
        }
        source.push_str(&format!("打印 终 == {} 和 乙() == {};", first, second + 1));
        assert_prints_true(&source)?;
    }
}
