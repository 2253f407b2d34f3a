//! 核心模块
//!
//! 在执行开始前把内建的本机功能装进全局名。
//! 字符串和列表的方法不在这里：它们走虚拟机的调用派发。

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::vm::{NativeCtx, Value, VM};

/// 安装核心全局：打印、时钟
pub fn install<W: Write>(vm: &mut VM<W>) {
    vm.define_native_global("打印", native_print, 1);
    vm.define_native_global("时钟", native_clock, 0);
}

/// 打印一个值并换行
fn native_print(ctx: &mut NativeCtx<'_>, args: &[Value]) -> Result<Value, String> {
    let text = ctx.heap.format_value(args[0]);
    writeln!(ctx.out, "{}", text).map_err(|e| e.to_string())?;
    Ok(Value::Nil)
}

/// Unix 纪元以来的秒数
fn native_clock(_ctx: &mut NativeCtx<'_>, _args: &[Value]) -> Result<Value, String> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| Value::Number(d.as_secs_f64()))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::InterpretResult;

    #[test]
    fn test_print_writes_to_output() {
        let mut vm = VM::with_output(Vec::new());
        assert_eq!(vm.interpret("打印 \"你好，世界\";"), InterpretResult::Ok);
        let output = String::from_utf8_lossy(vm.output()).to_string();
        assert_eq!(output, "你好，世界\n");
    }

    #[test]
    fn test_print_formats_values() {
        let mut vm = VM::with_output(Vec::new());
        assert_eq!(
            vm.interpret("打印 [1, \"二\", 真, 空, [3]];"),
            InterpretResult::Ok
        );
        let output = String::from_utf8_lossy(vm.output()).to_string();
        assert_eq!(output, "[1, 二, true, nil, [3]]\n");
    }
}
