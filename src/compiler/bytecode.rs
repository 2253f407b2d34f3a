//! 字节码定义
//!
//! 定义虚拟机执行的字节码指令与代码块

use crate::vm::Value;

/// 操作码
///
/// 所有指令都是 1 字节操作码，后跟 0 到 2 个立即数字节。
/// `k` 为常量池索引，`s` 为槽位索引，`n` 为数量，跳转偏移为大端 16 位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// 从常量池加载值到栈。操作数：k
    Constant = 0,
    /// 压入空
    Nil = 1,
    /// 压入真
    True = 2,
    /// 压入假
    False = 3,

    // ============ 栈操作 ============
    /// 弹出栈顶
    Pop = 4,
    /// 复制栈顶值
    Dup = 5,
    /// 复制栈顶两个值
    DoubleDup = 6,

    // ============ 变量 ============
    /// 获取局部变量。操作数：s
    GetLocal = 7,
    /// 设置局部变量（不弹栈）。操作数：s
    SetLocal = 8,
    /// 获取全局变量。操作数：k
    GetGlobal = 9,
    /// 定义全局变量。操作数：k
    DefineGlobal = 10,
    /// 设置已定义的全局变量（不弹栈）。操作数：k
    SetGlobal = 11,
    /// 获取 upvalue。操作数：s
    GetUpvalue = 12,
    /// 设置 upvalue（不弹栈）。操作数：s
    SetUpvalue = 13,

    // ============ 对象 ============
    /// 获取属性。操作数：k
    GetProperty = 14,
    /// 设置属性。操作数：k
    SetProperty = 15,
    /// 从栈顶的超类绑定方法。操作数：k
    GetSuper = 16,

    // ============ 集合 ============
    /// 从栈顶 n 个值创建列表。操作数：n
    BuildList = 17,
    /// 下标读取：[对象, 索引] -> [值]
    IndexSubscr = 18,
    /// 下标写入：[对象, 索引, 值] -> [值]
    StoreSubscr = 19,

    // ============ 算术与逻辑 ============
    /// 等于
    Equal = 20,
    /// 大于
    Greater = 21,
    /// 小于
    Less = 22,
    /// 加法（数字相加或字符串连接）
    Add = 23,
    /// 减法
    Subtract = 24,
    /// 乘法
    Multiply = 25,
    /// 除法
    Divide = 26,
    /// 取模（浮点余数，符号随被除数）
    Modulo = 27,
    /// 逻辑非
    Not = 28,
    /// 取负
    Negate = 29,
    /// 加一
    Increment = 30,
    /// 减一
    Decrement = 31,

    // ============ 位运算 ============
    /// 按位取反
    BitwiseNot = 32,
    /// 按位与
    BitwiseAnd = 33,
    /// 按位或
    BitwiseOr = 34,
    /// 按位异或
    BitwiseXor = 35,
    /// 左移
    BitwiseLeftShift = 36,
    /// 右移
    BitwiseRightShift = 37,

    // ============ 控制流 ============
    /// 无条件前跳。操作数：o16
    Jump = 38,
    /// 栈顶为假则前跳（不弹栈）。操作数：o16
    JumpIfFalse = 39,
    /// 后跳（循环）。操作数：o16
    Loop = 40,
    /// 调用。操作数：n
    Call = 41,
    /// 方法调用融合。操作数：k n
    Invoke = 42,
    /// 超类方法调用融合。操作数：k n
    SuperInvoke = 43,
    /// 返回
    Return = 44,

    // ============ 闭包与类 ============
    /// 创建闭包。操作数：k，后跟每个 upvalue 的 (is_local, index) 字节对
    Closure = 45,
    /// 关闭栈顶的 upvalue 并弹出
    CloseUpvalue = 46,
    /// 创建类。操作数：k
    Class = 47,
    /// 继承：把超类方法复制到子类
    Inherit = 48,
    /// 定义方法。操作数：k
    Method = 49,

    /// 代码块结束标记（仅供反汇编，正常执行不可达）
    End = 50,
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value {
            0 => OpCode::Constant,
            1 => OpCode::Nil,
            2 => OpCode::True,
            3 => OpCode::False,
            4 => OpCode::Pop,
            5 => OpCode::Dup,
            6 => OpCode::DoubleDup,
            7 => OpCode::GetLocal,
            8 => OpCode::SetLocal,
            9 => OpCode::GetGlobal,
            10 => OpCode::DefineGlobal,
            11 => OpCode::SetGlobal,
            12 => OpCode::GetUpvalue,
            13 => OpCode::SetUpvalue,
            14 => OpCode::GetProperty,
            15 => OpCode::SetProperty,
            16 => OpCode::GetSuper,
            17 => OpCode::BuildList,
            18 => OpCode::IndexSubscr,
            19 => OpCode::StoreSubscr,
            20 => OpCode::Equal,
            21 => OpCode::Greater,
            22 => OpCode::Less,
            23 => OpCode::Add,
            24 => OpCode::Subtract,
            25 => OpCode::Multiply,
            26 => OpCode::Divide,
            27 => OpCode::Modulo,
            28 => OpCode::Not,
            29 => OpCode::Negate,
            30 => OpCode::Increment,
            31 => OpCode::Decrement,
            32 => OpCode::BitwiseNot,
            33 => OpCode::BitwiseAnd,
            34 => OpCode::BitwiseOr,
            35 => OpCode::BitwiseXor,
            36 => OpCode::BitwiseLeftShift,
            37 => OpCode::BitwiseRightShift,
            38 => OpCode::Jump,
            39 => OpCode::JumpIfFalse,
            40 => OpCode::Loop,
            41 => OpCode::Call,
            42 => OpCode::Invoke,
            43 => OpCode::SuperInvoke,
            44 => OpCode::Return,
            45 => OpCode::Closure,
            46 => OpCode::CloseUpvalue,
            47 => OpCode::Class,
            48 => OpCode::Inherit,
            49 => OpCode::Method,
            50 => OpCode::End,
            _ => panic!("unknown opcode {}", value),
        }
    }
}

impl OpCode {
    /// 指令助记名（反汇编用）
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "CONSTANT",
            OpCode::Nil => "NIL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::DoubleDup => "DOUBLE_DUP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::DefineGlobal => "DEFINE_GLOBAL",
            OpCode::SetGlobal => "SET_GLOBAL",
            OpCode::GetUpvalue => "GET_UPVALUE",
            OpCode::SetUpvalue => "SET_UPVALUE",
            OpCode::GetProperty => "GET_PROPERTY",
            OpCode::SetProperty => "SET_PROPERTY",
            OpCode::GetSuper => "GET_SUPER",
            OpCode::BuildList => "BUILD_LIST",
            OpCode::IndexSubscr => "INDEX_SUBSCR",
            OpCode::StoreSubscr => "STORE_SUBSCR",
            OpCode::Equal => "EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::Less => "LESS",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Modulo => "MODULO",
            OpCode::Not => "NOT",
            OpCode::Negate => "NEGATE",
            OpCode::Increment => "INCREMENT",
            OpCode::Decrement => "DECREMENT",
            OpCode::BitwiseNot => "BITWISE_NOT",
            OpCode::BitwiseAnd => "BITWISE_AND",
            OpCode::BitwiseOr => "BITWISE_OR",
            OpCode::BitwiseXor => "BITWISE_XOR",
            OpCode::BitwiseLeftShift => "BITWISE_LEFT_SHIFT",
            OpCode::BitwiseRightShift => "BITWISE_RIGHT_SHIFT",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::Loop => "LOOP",
            OpCode::Call => "CALL",
            OpCode::Invoke => "INVOKE",
            OpCode::SuperInvoke => "SUPER_INVOKE",
            OpCode::Return => "RETURN",
            OpCode::Closure => "CLOSURE",
            OpCode::CloseUpvalue => "CLOSE_UPVALUE",
            OpCode::Class => "CLASS",
            OpCode::Inherit => "INHERIT",
            OpCode::Method => "METHOD",
            OpCode::End => "END",
        }
    }
}

/// 代码块
///
/// 并行数组：代码字节、每字节对应的源码行号、常量池。
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// 代码字节
    pub code: Vec<u8>,
    /// 每个代码字节的源码行号
    pub lines: Vec<usize>,
    /// 常量池
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个字节
    pub fn write(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// 写入一条操作码
    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.write(op as u8, line);
    }

    /// 追加常量，返回常量池索引
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }
}

/// 反汇编整个代码块
pub fn disassemble_chunk(chunk: &Chunk, name: &str, heap: &crate::vm::gc::Heap) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (line, next) = disassemble_instruction(chunk, offset, heap);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// 反汇编单条指令，返回 (文本, 下一条指令偏移)
pub fn disassemble_instruction(
    chunk: &Chunk,
    offset: usize,
    heap: &crate::vm::gc::Heap,
) -> (String, usize) {
    let mut text = format!("{:04} ", offset);
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        text.push_str("   | ");
    } else {
        text.push_str(&format!("{:4} ", chunk.lines[offset]));
    }

    let op = OpCode::from(chunk.code[offset]);
    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => {
            let k = chunk.code[offset + 1] as usize;
            text.push_str(&format!(
                "{:<20} {:4} '{}'",
                op.name(),
                k,
                heap.format_value(chunk.constants[k])
            ));
            (text, offset + 2)
        }
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call
        | OpCode::BuildList => {
            let s = chunk.code[offset + 1];
            text.push_str(&format!("{:<20} {:4}", op.name(), s));
            (text, offset + 2)
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
            let hi = chunk.code[offset + 1] as usize;
            let lo = chunk.code[offset + 2] as usize;
            let jump = (hi << 8) | lo;
            let target = if op == OpCode::Loop {
                offset + 3 - jump
            } else {
                offset + 3 + jump
            };
            text.push_str(&format!("{:<20} {:4} -> {}", op.name(), offset, target));
            (text, offset + 3)
        }
        OpCode::Invoke | OpCode::SuperInvoke => {
            let k = chunk.code[offset + 1] as usize;
            let argc = chunk.code[offset + 2];
            text.push_str(&format!(
                "{:<20} ({} 参数) {:4} '{}'",
                op.name(),
                argc,
                k,
                heap.format_value(chunk.constants[k])
            ));
            (text, offset + 3)
        }
        OpCode::Closure => {
            let k = chunk.code[offset + 1] as usize;
            text.push_str(&format!(
                "{:<20} {:4} '{}'",
                op.name(),
                k,
                heap.format_value(chunk.constants[k])
            ));
            let mut next = offset + 2;
            if let Value::Obj(key) = chunk.constants[k] {
                let upvalue_count = heap.function(key).upvalue_count;
                for _ in 0..upvalue_count {
                    let is_local = chunk.code[next];
                    let index = chunk.code[next + 1];
                    text.push_str(&format!(
                        "\n{:04}    |                      {} {}",
                        next,
                        if is_local == 1 { "局部" } else { "上值" },
                        index
                    ));
                    next += 2;
                }
            }
            (text, next)
        }
        _ => {
            text.push_str(op.name());
            (text, offset + 1)
        }
    }
}
