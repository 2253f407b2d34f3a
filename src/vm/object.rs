//! 堆对象定义
//!
//! 所有由 GC 管理的对象变体。对象存放在类型化竞技场里，
//! `ObjKey` 是进入竞技场的小索引，代替了带标签的指针。

use std::io::Write;
use std::rc::Rc;

use slotmap::new_key_type;

use super::gc::Heap;
use super::table::Table;
use super::value::Value;
use crate::compiler::bytecode::Chunk;

new_key_type! {
    /// 堆对象索引
    pub struct ObjKey;
}

/// 本机功能的执行环境：堆与输出流
pub struct NativeCtx<'a> {
    pub heap: &'a mut Heap,
    pub out: &'a mut (dyn Write + 'a),
}

/// 本机功能指针
///
/// 返回 `Err` 时消息会变成一条运行时错误。
pub type NativeFn = fn(&mut NativeCtx<'_>, &[Value]) -> Result<Value, String>;

/// 堆对象变体
#[derive(Debug, Clone)]
pub enum Obj {
    /// 驻留字符串
    String(QiStr),
    /// 编译产物：函数
    Function(Function),
    /// 闭包
    Closure(Closure),
    /// 上值
    Upvalue(Upvalue),
    /// 本机功能
    Native(Native),
    /// 类
    Class(Class),
    /// 实例
    Instance(Instance),
    /// 绑定方法
    BoundMethod(BoundMethod),
    /// 列表
    List(List),
}

/// 字符串对象
///
/// UTF-8 文本，缓存 Unicode 标量个数与 FNV-1a 哈希。
/// 索引、子串等操作都以标量为单位。
#[derive(Debug, Clone)]
pub struct QiStr {
    pub text: String,
    pub char_len: usize,
    pub hash: u32,
}

impl QiStr {
    pub fn new(text: String) -> Self {
        let char_len = text.chars().count();
        let hash = super::table::hash_string(&text);
        Self { text, char_len, hash }
    }
}

/// 函数对象：元信息加一块字节码
#[derive(Debug, Clone)]
pub struct Function {
    /// 参数个数
    pub arity: u8,
    /// 捕获的 upvalue 个数
    pub upvalue_count: usize,
    /// 字节码块（编译后不再变化）
    pub chunk: Rc<Chunk>,
    /// 函数名（顶层脚本没有名字）
    pub name: Option<ObjKey>,
}

/// 闭包：函数加上值句柄
#[derive(Debug, Clone)]
pub struct Closure {
    pub function: ObjKey,
    pub upvalues: Vec<ObjKey>,
}

/// 上值
///
/// 开放时指向栈上的活动槽位；槽位离栈时转为封闭，值搬进对象自身。
#[derive(Debug, Clone, Copy)]
pub enum Upvalue {
    /// 指向值栈的槽位
    Open(usize),
    /// 自带存储
    Closed(Value),
}

/// 本机功能对象
#[derive(Debug, Clone)]
pub struct Native {
    pub function: NativeFn,
    /// 参数个数，-1 表示不检查
    pub arity: i32,
}

/// 类：名字加方法表
#[derive(Debug, Clone)]
pub struct Class {
    pub name: ObjKey,
    pub methods: Table,
}

/// 实例：类、字段表、静态标记
///
/// 静态实例的字段在创建后冻结，写入是运行时错误。
#[derive(Debug, Clone)]
pub struct Instance {
    pub class: ObjKey,
    pub fields: Table,
    pub is_static: bool,
}

/// 绑定方法：接收者加方法（闭包或本机功能）
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: ObjKey,
}

/// 列表
#[derive(Debug, Clone, Default)]
pub struct List {
    pub items: Vec<Value>,
}

impl Obj {
    /// 对象占用的近似字节数（GC 记账用）
    pub fn size_estimate(&self) -> usize {
        let payload = match self {
            Obj::String(s) => s.text.capacity(),
            Obj::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.lines.capacity() * std::mem::size_of::<usize>()
                    + f.chunk.constants.capacity() * std::mem::size_of::<Value>()
            }
            Obj::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<ObjKey>(),
            Obj::Upvalue(_) => 0,
            Obj::Native(_) => 0,
            Obj::Class(c) => c.methods.byte_size(),
            Obj::Instance(i) => i.fields.byte_size(),
            Obj::BoundMethod(_) => 0,
            Obj::List(l) => l.items.capacity() * std::mem::size_of::<Value>(),
        };
        std::mem::size_of::<Obj>() + payload
    }

    /// 类型名（诊断消息用）
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "字符串",
            Obj::Function(_) => "功能",
            Obj::Closure(_) => "关闭",
            Obj::Upvalue(_) => "上值",
            Obj::Native(_) => "本机功能",
            Obj::Class(_) => "类",
            Obj::Instance(_) => "实例",
            Obj::BoundMethod(_) => "方法",
            Obj::List(_) => "列表",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qistr_char_len() {
        let s = QiStr::new("你好ab".to_string());
        assert_eq!(s.char_len, 4);
        assert_eq!(s.text.len(), 8);
    }

    #[test]
    fn test_qistr_hash_stable() {
        let a = QiStr::new("甲乙丙".to_string());
        let b = QiStr::new("甲乙丙".to_string());
        assert_eq!(a.hash, b.hash);
    }
}
