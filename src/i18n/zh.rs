//! 中文消息

use super::messages::*;

/// 获取中文消息
pub fn get(key: &str) -> &'static str {
    match key {
        // 词法错误
        ERR_SCAN_UNEXPECTED_CHAR => "意外的字符「{}」。",
        ERR_SCAN_UNTERMINATED_STRING => "未闭合的字符串。",
        ERR_SCAN_INVALID_NUMBER => "无效的数字「{}」。",

        // 编译错误
        ERR_COMPILE_EXPECTED_TOKEN => "期望「{}」。",
        ERR_COMPILE_EXPECTED_EXPRESSION => "期望表达式。",
        ERR_COMPILE_EXPECTED_IDENTIFIER => "期望{}名。",
        ERR_COMPILE_DUPLICATE_VARIABLE => "变量「{}」在当前作用域已定义。",
        ERR_COMPILE_READ_OWN_INITIALIZER => "不能在变量自身的初始化式中读取它。",
        ERR_COMPILE_TOO_MANY_CONSTANTS => "单个代码块中的常量过多。",
        ERR_COMPILE_TOO_MANY_LOCALS => "功能中的局部变量过多。",
        ERR_COMPILE_TOO_MANY_UPVALUES => "功能中捕获的变量过多。",
        ERR_COMPILE_TOO_MANY_ARGS => "参数不能超过 255 个。",
        ERR_COMPILE_TOO_MANY_PARAMS => "形参不能超过 255 个。",
        ERR_COMPILE_TOO_MANY_LIST_ITEMS => "列表字面量中的元素不能超过 255 个。",
        ERR_COMPILE_JUMP_TOO_LARGE => "跳转跨度过大。",
        ERR_COMPILE_LOOP_TOO_LARGE => "循环体过大。",
        ERR_COMPILE_INVALID_ASSIGNMENT => "无效的赋值目标。",
        ERR_COMPILE_INVALID_INCREMENT => "自增自减的目标必须是变量。",
        ERR_COMPILE_RETURN_TOP_LEVEL => "不能从顶层代码返回。",
        ERR_COMPILE_RETURN_FROM_INIT => "不能从初始化方法返回值。",
        ERR_COMPILE_THIS_OUTSIDE_CLASS => "不能在类外使用「这」。",
        ERR_COMPILE_SUPER_OUTSIDE_CLASS => "不能在类外使用「超」。",
        ERR_COMPILE_SUPER_NO_SUPERCLASS => "不能在没有超类的类中使用「超」。",
        ERR_COMPILE_SELF_INHERIT => "类不能继承自身。",

        // 运行时错误
        ERR_RUNTIME_ARITY => "需要 {} 个参数，但得到 {}。",
        ERR_RUNTIME_ARITY_RANGE => "需要 {} 到 {} 个参数，但得到 {}。",
        ERR_RUNTIME_STACK_OVERFLOW => "堆栈溢出。",
        ERR_RUNTIME_NOT_CALLABLE => "只能调用功能和类。",
        ERR_RUNTIME_UNDEFINED_VARIABLE => "未定义的变量「{}」。",
        ERR_RUNTIME_UNDEFINED_PROPERTY => "未定义的属性「{}」。",
        ERR_RUNTIME_OPERANDS_NUMBERS => "操作数必须是数字。",
        ERR_RUNTIME_OPERANDS_ADD => "操作数必须是两个数字或两个字符串。",
        ERR_RUNTIME_ONLY_INSTANCES_PROPS => "只有实例有属性。",
        ERR_RUNTIME_ONLY_INSTANCES_FIELDS => "只有实例有字段。",
        ERR_RUNTIME_STATIC_FIELD => "不能修改常量属性。",
        ERR_RUNTIME_SUPERCLASS_NOT_CLASS => "超类必须是个类。",
        ERR_RUNTIME_ONLY_METHODS => "只有实例、字符串和列表有方法。",
        ERR_RUNTIME_ARG_TYPE => "参数 {}（{}）的类型必须是「{}」，而不是「{}」。",
        ERR_RUNTIME_STRING_INDEX_NAN => "字符串索引不是数字。",
        ERR_RUNTIME_STRING_INDEX_RANGE => "字符串索引超出范围。",
        ERR_RUNTIME_LIST_INDEX_NAN => "列表索引不是数字。",
        ERR_RUNTIME_LIST_INDEX_RANGE => "列表索引超出范围。",
        ERR_RUNTIME_INVALID_INDEX_TARGET => "只有字符串和列表可以索引。",
        ERR_RUNTIME_STRING_IMMUTABLE => "字符串不可变。",
        ERR_RUNTIME_STORE_TARGET => "无法存储值：目标不是列表。",
        ERR_RUNTIME_INVALID_ARG_INDEX => "参数 {} 不是有效索引。",
        ERR_RUNTIME_SUBSTRING_ORDER => "结束索引不能在开始索引之前。",
        ERR_RUNTIME_POP_EMPTY => "无法从空列表中弹出。",
        ERR_RUNTIME_CALLBACK_ARITY => "输入功能需要 {} 个参数，但得到 {}。",
        ERR_RUNTIME_SORT_NUMBERS => "没有比较功能时，列表元素必须是数字。",
        ERR_RUNTIME_SORT_CMP_NUMBER => "比较功能必须返回数字。",
        ERR_RUNTIME_CHUNK_END => "字节码意外结束。",

        // 诊断格式
        MSG_DIAG_LINE => "【行 {}】{}",
        MSG_DIAG_AT => "错误于「{}」：{}",
        MSG_DIAG_AT_END => "文件末尾错误：{}",
        MSG_TRACE_LINE => "【行 {}】在 {}",
        MSG_TRACE_SCRIPT => "脚本",
        MSG_TRACE_FUN => "{}（）",

        // CLI 消息
        MSG_CLI_USAGE => "用法：{} [脚本]",
        MSG_CLI_CANNOT_READ_FILE => "无法读取文件「{}」：{}",
        MSG_CLI_REPL_BANNER => "{} 语言 {}（输入 Ctrl-D 退出）",

        _ => "未知的消息键",
    }
}
