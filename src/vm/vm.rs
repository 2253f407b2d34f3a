//! 虚拟机
//!
//! 指令分发循环、调用与方法派发、upvalue 捕获与关闭、
//! 字符串与列表的内建方法，以及运行时错误的回溯打印。

use std::io::{self, Write};
use std::rc::Rc;

use super::gc::Heap;
use super::object::{
    BoundMethod, Class, Closure, Instance, List, Native, NativeCtx, NativeFn, Obj, ObjKey,
    Upvalue,
};
use super::table::Table;
use super::value::Value;
use crate::compiler::bytecode::{disassemble_instruction, Chunk, OpCode};
use crate::compiler::compile;
use crate::config;
use crate::i18n::{format_message, messages, Locale};

/// 调用帧上限；超过即堆栈溢出
const FRAMES_MAX: usize = 64;
/// 值栈预分配容量
const STACK_SIZE: usize = FRAMES_MAX * 256;

/// 一次解释执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// 回溯中的一帧
#[derive(Debug, Clone)]
struct TraceFrame {
    line: usize,
    /// None 表示顶层脚本
    name: Option<String>,
}

/// 运行时错误：消息加从最内层帧向外的回溯
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    trace: Vec<TraceFrame>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// 调用帧
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    /// 被执行的闭包
    closure: ObjKey,
    /// 挂起时的指令指针
    ip: usize,
    /// 帧基址：0 号槽位对应被调用者
    slots: usize,
    /// 帧返回时退出分发循环，把控制权交还给内建方法
    returns_to_host: bool,
}

macro_rules! rt_error {
    ($vm:expr, $ip:expr, $key:expr) => {{
        $vm.flush_ip($ip);
        return Err($vm.error($key, &[]));
    }};
    ($vm:expr, $ip:expr, $key:expr, $($arg:expr),+) => {{
        $vm.flush_ip($ip);
        return Err($vm.error($key, &[$($arg),+]));
    }};
}

/// 两个数字操作数的二元运算
macro_rules! binary_op {
    ($vm:expr, $ip:expr, $wrap:expr, $op:tt) => {{
        if !$vm.peek(0).is_number() || !$vm.peek(1).is_number() {
            rt_error!($vm, $ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
        }
        let b = $vm.pop().as_number().unwrap();
        let a = $vm.pop().as_number().unwrap();
        $vm.push($wrap(a $op b));
    }};
}

/// 位运算：两个操作数都截断成 32 位有符号整数
macro_rules! bitwise_op {
    ($vm:expr, $ip:expr, $op:tt) => {{
        if !$vm.peek(0).is_number() || !$vm.peek(1).is_number() {
            rt_error!($vm, $ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
        }
        let b = $vm.pop().as_number().unwrap() as i32;
        let a = $vm.pop().as_number().unwrap() as i32;
        $vm.push(Value::Number((a $op b) as f64));
    }};
}

macro_rules! read_byte {
    ($chunk:expr, $ip:expr) => {{
        let byte = $chunk.code[$ip];
        $ip += 1;
        byte
    }};
}

macro_rules! read_short {
    ($chunk:expr, $ip:expr) => {{
        let hi = $chunk.code[$ip] as usize;
        let lo = $chunk.code[$ip + 1] as usize;
        $ip += 2;
        (hi << 8) | lo
    }};
}

macro_rules! read_constant {
    ($chunk:expr, $ip:expr) => {{
        let index = read_byte!($chunk, $ip) as usize;
        $chunk.constants[index]
    }};
}

macro_rules! read_string {
    ($chunk:expr, $ip:expr) => {{
        match read_constant!($chunk, $ip) {
            Value::Obj(key) => key,
            _ => unreachable!("constant is not a string"),
        }
    }};
}

/// 虚拟机
///
/// 对输出流泛型化，测试里可以把程序输出收进内存。
pub struct VM<W: Write = io::Stdout> {
    pub(crate) heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// 全局变量表
    globals: Table,
    /// 开放 upvalue，按栈槽位升序
    open_upvalues: Vec<ObjKey>,
    /// 初始化方法名，虚拟机生命周期内常驻
    init_string: ObjKey,
    locale: Locale,
    out: W,
}

impl VM<io::Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for VM<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> VM<W> {
    /// 创建虚拟机并安装核心模块。
    /// 引导期间回收保持关闭，半成品对象不会被误收。
    pub fn with_output(out: W) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("初始化");
        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(STACK_SIZE),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            locale: Locale::from_env(),
            out,
        };
        crate::stdlib::install(&mut vm);
        vm.heap.set_enabled(true);
        vm
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    /// 程序输出流
    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    // ============ 对外注册接口（核心模块等协作者使用） ============

    /// 在全局名下安装一个本机功能
    pub fn define_native_global(&mut self, name: &str, function: NativeFn, arity: i32) {
        let name_key = self.intern(name);
        self.push(Value::Obj(name_key));
        let native = self.alloc(Obj::Native(Native { function, arity }));
        self.push(Value::Obj(native));
        let hash = self.heap.string(name_key).hash;
        self.globals.set(name_key, hash, Value::Obj(native));
        self.pop();
        self.pop();
    }

    /// 把本机功能装进类的方法表
    pub fn define_native(&mut self, name: &str, function: NativeFn, arity: i32, class: ObjKey) {
        let name_key = self.intern(name);
        self.push(Value::Obj(name_key));
        let native = self.alloc(Obj::Native(Native { function, arity }));
        self.push(Value::Obj(native));
        let hash = self.heap.string(name_key).hash;
        self.heap
            .class_mut(class)
            .methods
            .set(name_key, hash, Value::Obj(native));
        self.pop();
        self.pop();
    }

    /// 把现成的实例装进全局名
    pub fn define_native_instance(&mut self, name: &str, instance: ObjKey) {
        let name_key = self.intern(name);
        self.push(Value::Obj(name_key));
        self.push(Value::Obj(instance));
        let hash = self.heap.string(name_key).hash;
        self.globals.set(name_key, hash, Value::Obj(instance));
        self.pop();
        self.pop();
    }

    /// 设置实例的字段
    pub fn define_property(&mut self, name: &str, value: Value, instance: ObjKey) {
        let name_key = self.intern(name);
        self.push(Value::Obj(name_key));
        self.push(value);
        let hash = self.heap.string(name_key).hash;
        self.heap
            .instance_mut(instance)
            .fields
            .set(name_key, hash, value);
        self.pop();
        self.pop();
    }

    pub fn new_class(&mut self, name: &str) -> ObjKey {
        let name_key = self.intern(name);
        self.push(Value::Obj(name_key));
        let class = self.alloc(Obj::Class(Class { name: name_key, methods: Table::new() }));
        self.pop();
        class
    }

    pub fn new_instance(&mut self, class: ObjKey, is_static: bool) -> ObjKey {
        self.push(Value::Obj(class));
        let instance = self.alloc(Obj::Instance(Instance {
            class,
            fields: Table::new(),
            is_static,
        }));
        self.pop();
        instance
    }

    // ============ 入口 ============

    /// 编译并执行一段源码
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        // 编译期间不回收：编译器手里的半成品没有根
        self.heap.set_enabled(false);
        let function = compile(source, &mut self.heap, self.locale);
        self.heap.set_enabled(true);

        let function = match function {
            Some(function) => function,
            None => return InterpretResult::CompileError,
        };

        self.push(Value::Obj(function));
        let closure = self.alloc(Obj::Closure(Closure { function, upvalues: Vec::new() }));
        self.pop();
        self.push(Value::Obj(closure));
        if let Err(error) = self.call_closure(closure, 0) {
            self.report_runtime_error(&error);
            return InterpretResult::RuntimeError;
        }

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(error) => {
                self.report_runtime_error(&error);
                InterpretResult::RuntimeError
            }
        }
    }

    /// 打印运行时错误和回溯，然后清空执行状态
    fn report_runtime_error(&mut self, error: &RuntimeError) {
        eprintln!("{}", error.message);
        for frame in &error.trace {
            let name = match &frame.name {
                Some(name) => {
                    format_message(messages::MSG_TRACE_FUN, self.locale, &[name.as_str()])
                }
                None => format_message(messages::MSG_TRACE_SCRIPT, self.locale, &[]),
            };
            let line = frame.line.to_string();
            eprintln!(
                "{}",
                format_message(messages::MSG_TRACE_LINE, self.locale, &[&line, &name])
            );
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // ============ 栈 ============

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap()
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// 内建方法收尾：弹掉接收者和参数，压入结果
    fn finish_builtin(&mut self, argc: usize, result: Value) {
        let new_len = self.stack.len() - argc - 1;
        self.stack.truncate(new_len);
        self.push(result);
    }

    /// 第 i 个参数（从 0 起）
    fn arg(&self, argc: usize, i: usize) -> Value {
        self.peek(argc - 1 - i)
    }

    // ============ 分配（带回收检查） ============

    fn alloc(&mut self, obj: Obj) -> ObjKey {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    fn intern(&mut self, text: &str) -> ObjKey {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(text)
    }

    /// 标记根集并执行一轮回收
    fn collect_garbage(&mut self) {
        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_object(upvalue);
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark_object(self.init_string);
        self.heap.collect();
    }

    // ============ 错误 ============

    fn flush_ip(&mut self, ip: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = ip;
        }
    }

    fn error(&self, key: &str, args: &[&str]) -> RuntimeError {
        self.runtime_error(format_message(key, self.locale, args))
    }

    /// 由消息构造带回溯的运行时错误。
    /// 行号从各帧挂起的指令指针取，所以错误路径必须先回写 ip。
    fn runtime_error(&self, message: String) -> RuntimeError {
        let mut trace = Vec::new();
        for frame in self.frames.iter().rev() {
            let closure = self.heap.closure(frame.closure);
            let function = self.heap.function(closure.function);
            let instruction = frame.ip.saturating_sub(1);
            let line = function.chunk.lines.get(instruction).copied().unwrap_or(0);
            let name = function.name.map(|n| self.heap.string(n).text.clone());
            trace.push(TraceFrame { line, name });
        }
        RuntimeError { message, trace }
    }

    // ============ 调用 ============

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), RuntimeError> {
        if let Value::Obj(key) = callee {
            enum Plan {
                Closure,
                Class,
                Native,
                Bound(Value, ObjKey),
                NotCallable,
            }
            let plan = match self.heap.get(key) {
                Obj::Closure(_) => Plan::Closure,
                Obj::Class(_) => Plan::Class,
                Obj::Native(_) => Plan::Native,
                Obj::BoundMethod(b) => Plan::Bound(b.receiver, b.method),
                _ => Plan::NotCallable,
            };
            match plan {
                Plan::Closure => return self.call_closure(key, argc),
                Plan::Class => return self.call_class(key, argc),
                Plan::Native => return self.call_native(key, argc),
                Plan::Bound(receiver, method) => {
                    // 接收者顶替被调用者槽位，方法体里 0 号槽就是「这」
                    let callee_slot = self.stack.len() - argc - 1;
                    self.stack[callee_slot] = receiver;
                    let is_closure = matches!(self.heap.get(method), Obj::Closure(_));
                    return if is_closure {
                        self.call_closure(method, argc)
                    } else {
                        self.call_native(method, argc)
                    };
                }
                Plan::NotCallable => {}
            }
        }
        Err(self.error(messages::ERR_RUNTIME_NOT_CALLABLE, &[]))
    }

    fn call_closure(&mut self, closure: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let arity = self.heap.function(self.heap.closure(closure).function).arity as usize;
        if argc != arity {
            return Err(self.error(
                messages::ERR_RUNTIME_ARITY,
                &[&arity.to_string(), &argc.to_string()],
            ));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.error(messages::ERR_RUNTIME_STACK_OVERFLOW, &[]));
        }
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots: self.stack.len() - argc - 1,
            returns_to_host: false,
        });
        Ok(())
    }

    fn call_class(&mut self, class: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let instance = self.alloc(Obj::Instance(Instance {
            class,
            fields: Table::new(),
            is_static: false,
        }));
        let callee_slot = self.stack.len() - argc - 1;
        self.stack[callee_slot] = Value::Obj(instance);

        let init_hash = self.heap.string(self.init_string).hash;
        match self.heap.class(class).methods.get(self.init_string, init_hash) {
            Some(Value::Obj(initializer)) => self.call_closure(initializer, argc),
            Some(_) => unreachable!("initializer is not an object"),
            None if argc != 0 => {
                Err(self.error(messages::ERR_RUNTIME_ARITY, &["0", &argc.to_string()]))
            }
            None => Ok(()),
        }
    }

    /// 内联执行本机功能：消耗被调用者和参数，压入返回值
    fn call_native(&mut self, native: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let Obj::Native(native) = self.heap.get(native).clone() else {
            unreachable!("not a native")
        };
        if native.arity >= 0 && argc != native.arity as usize {
            return Err(self.error(
                messages::ERR_RUNTIME_ARITY,
                &[&native.arity.to_string(), &argc.to_string()],
            ));
        }
        let args: Vec<Value> = self.stack[self.stack.len() - argc..].to_vec();
        let result = {
            let mut ctx = NativeCtx { heap: &mut self.heap, out: &mut self.out };
            (native.function)(&mut ctx, &args)
        };
        match result {
            Ok(value) => {
                self.finish_builtin(argc, value);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    /// 内建方法里回调脚本闭包：装一个交还控制权的帧，
    /// 重入分发循环，对应的返回指令执行后回到这里
    fn run_closure(&mut self, closure: ObjKey, args: &[Value]) -> Result<Value, RuntimeError> {
        self.push(Value::Obj(closure));
        for &arg in args {
            self.push(arg);
        }
        self.call_closure(closure, args.len())?;
        self.frames.last_mut().unwrap().returns_to_host = true;
        self.run()?;
        // 返回指令已把栈截到闭包原来的位置，结果在栈顶
        Ok(self.pop())
    }

    // ============ 方法派发 ============

    fn invoke(&mut self, name: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let receiver = self.peek(argc);

        enum Recv {
            Instance,
            Str,
            List,
            Other,
        }
        let kind = match receiver {
            Value::Obj(key) => match self.heap.get(key) {
                Obj::Instance(_) => Recv::Instance,
                Obj::String(_) => Recv::Str,
                Obj::List(_) => Recv::List,
                _ => Recv::Other,
            },
            _ => Recv::Other,
        };

        let rkey = match receiver {
            Value::Obj(key) => key,
            _ => return Err(self.error(messages::ERR_RUNTIME_ONLY_METHODS, &[])),
        };
        match kind {
            Recv::Instance => self.invoke_instance(rkey, name, argc),
            Recv::Str => self.invoke_string(rkey, name, argc),
            Recv::List => self.invoke_list(rkey, name, argc),
            Recv::Other => Err(self.error(messages::ERR_RUNTIME_ONLY_METHODS, &[])),
        }
    }

    fn invoke_instance(&mut self, rkey: ObjKey, name: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let class = self.heap.instance(rkey).class;
        let name_hash = self.heap.string(name).hash;

        // 字段优先于方法：可调用的字段也能这样调
        if let Some(field) = self.heap.instance(rkey).fields.get(name, name_hash) {
            let callee_slot = self.stack.len() - argc - 1;
            self.stack[callee_slot] = field;
            return self.call_value(field, argc);
        }

        self.invoke_from_class(class, name, argc)
    }

    /// 从类的方法表派发：脚本方法是闭包，静态方法是本机功能
    fn invoke_from_class(&mut self, class: ObjKey, name: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let name_hash = self.heap.string(name).hash;
        let method = match self.heap.class(class).methods.get(name, name_hash) {
            Some(Value::Obj(method)) => method,
            _ => {
                let text = self.heap.string(name).text.clone();
                return Err(self.error(messages::ERR_RUNTIME_UNDEFINED_PROPERTY, &[&text]));
            }
        };
        let is_closure = matches!(self.heap.get(method), Obj::Closure(_));
        if is_closure {
            self.call_closure(method, argc)
        } else {
            self.call_native(method, argc)
        }
    }

    /// 从类绑定方法到栈顶的接收者
    fn bind_method(&mut self, class: ObjKey, name: ObjKey) -> Result<(), RuntimeError> {
        let name_hash = self.heap.string(name).hash;
        let method = match self.heap.class(class).methods.get(name, name_hash) {
            Some(Value::Obj(method)) => method,
            _ => {
                let text = self.heap.string(name).text.clone();
                return Err(self.error(messages::ERR_RUNTIME_UNDEFINED_PROPERTY, &[&text]));
            }
        };
        let bound = self.alloc(Obj::BoundMethod(BoundMethod {
            receiver: self.peek(0),
            method,
        }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    // ============ Upvalue ============

    /// 捕获栈槽位：每个槽位至多一个开放 upvalue
    fn capture_upvalue(&mut self, slot: usize) -> ObjKey {
        let mut insert_at = self.open_upvalues.len();
        while insert_at > 0 {
            let key = self.open_upvalues[insert_at - 1];
            let existing = match *self.heap.upvalue(key) {
                Upvalue::Open(s) => s,
                Upvalue::Closed(_) => unreachable!("closed upvalue in open list"),
            };
            if existing == slot {
                return key;
            }
            if existing < slot {
                break;
            }
            insert_at -= 1;
        }
        let created = self.alloc(Obj::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// 关闭槽位不低于 last 的所有开放 upvalue
    fn close_upvalues(&mut self, last: usize) {
        while let Some(&key) = self.open_upvalues.last() {
            let slot = match *self.heap.upvalue(key) {
                Upvalue::Open(s) => s,
                Upvalue::Closed(_) => unreachable!("closed upvalue in open list"),
            };
            if slot < last {
                break;
            }
            let value = self.stack[slot];
            *self.heap.upvalue_mut(key) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }

    // ============ 分发循环 ============

    fn run(&mut self) -> Result<(), RuntimeError> {
        let mut chunk = self.current_chunk();
        let mut ip = self.frames.last().unwrap().ip;

        loop {
            if config::trace_exec() {
                let line = disassemble_instruction(&chunk, ip, &self.heap).0;
                eprintln!("{}", line);
            }

            let op = OpCode::from(read_byte!(chunk, ip));
            match op {
                OpCode::Constant => {
                    let constant = read_constant!(chunk, ip);
                    self.push(constant);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Dup => self.push(self.peek(0)),
                OpCode::DoubleDup => {
                    let a = self.peek(1);
                    let b = self.peek(0);
                    self.push(a);
                    self.push(b);
                }

                OpCode::GetLocal => {
                    let slot = read_byte!(chunk, ip) as usize;
                    let base = self.frames.last().unwrap().slots;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = read_byte!(chunk, ip) as usize;
                    let base = self.frames.last().unwrap().slots;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = read_string!(chunk, ip);
                    let hash = self.heap.string(name).hash;
                    match self.globals.get(name, hash) {
                        Some(value) => self.push(value),
                        None => {
                            let text = self.heap.string(name).text.clone();
                            rt_error!(self, ip, messages::ERR_RUNTIME_UNDEFINED_VARIABLE, &text);
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = read_string!(chunk, ip);
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = read_string!(chunk, ip);
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    if self.globals.set(name, hash, value) {
                        // 新键说明变量本不存在：撤销并报错
                        self.globals.delete(name, hash);
                        let text = self.heap.string(name).text.clone();
                        rt_error!(self, ip, messages::ERR_RUNTIME_UNDEFINED_VARIABLE, &text);
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = read_byte!(chunk, ip) as usize;
                    let closure = self.frames.last().unwrap().closure;
                    let upvalue = self.heap.closure(closure).upvalues[slot];
                    let value = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(stack_slot) => self.stack[stack_slot],
                        Upvalue::Closed(value) => value,
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = read_byte!(chunk, ip) as usize;
                    let closure = self.frames.last().unwrap().closure;
                    let upvalue = self.heap.closure(closure).upvalues[slot];
                    let value = self.peek(0);
                    match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(stack_slot) => self.stack[stack_slot] = value,
                        Upvalue::Closed(_) => {
                            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value);
                        }
                    }
                }

                OpCode::GetProperty => {
                    let name = read_string!(chunk, ip);
                    let receiver = self.peek(0);
                    let rkey = match receiver {
                        Value::Obj(key) if matches!(self.heap.get(key), Obj::Instance(_)) => key,
                        _ => rt_error!(self, ip, messages::ERR_RUNTIME_ONLY_INSTANCES_PROPS),
                    };
                    let hash = self.heap.string(name).hash;
                    if let Some(value) = self.heap.instance(rkey).fields.get(name, hash) {
                        self.pop();
                        self.push(value);
                    } else {
                        let class = self.heap.instance(rkey).class;
                        self.flush_ip(ip);
                        self.bind_method(class, name)?;
                    }
                }
                OpCode::SetProperty => {
                    let name = read_string!(chunk, ip);
                    let target = self.peek(1);
                    let rkey = match target {
                        Value::Obj(key) if matches!(self.heap.get(key), Obj::Instance(_)) => key,
                        _ => rt_error!(self, ip, messages::ERR_RUNTIME_ONLY_INSTANCES_FIELDS),
                    };
                    if self.heap.instance(rkey).is_static {
                        rt_error!(self, ip, messages::ERR_RUNTIME_STATIC_FIELD);
                    }
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.heap.instance_mut(rkey).fields.set(name, hash, value);
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = read_string!(chunk, ip);
                    let superclass = match self.pop() {
                        Value::Obj(key) => key,
                        _ => unreachable!("superclass slot is not an object"),
                    };
                    self.flush_ip(ip);
                    self.bind_method(superclass, name)?;
                }

                OpCode::BuildList => {
                    let count = read_byte!(chunk, ip) as usize;
                    let start = self.stack.len() - count;
                    let items = self.stack[start..].to_vec();
                    let list = self.alloc(Obj::List(List { items }));
                    self.stack.truncate(start);
                    self.push(Value::Obj(list));
                }
                OpCode::IndexSubscr => {
                    let index = self.pop();
                    let target = self.pop();
                    self.index_subscript(target, index, &mut ip)?;
                }
                OpCode::StoreSubscr => {
                    let item = self.pop();
                    let index = self.pop();
                    let target = self.pop();
                    self.store_subscript(target, index, item, &mut ip)?;
                }

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => binary_op!(self, ip, Value::Bool, >),
                OpCode::Less => binary_op!(self, ip, Value::Bool, <),
                OpCode::Add => {
                    let b = self.peek(0);
                    let a = self.peek(1);
                    match (a, b) {
                        (Value::Number(x), Value::Number(y)) => {
                            self.pop();
                            self.pop();
                            self.push(Value::Number(x + y));
                        }
                        (Value::Obj(ka), Value::Obj(kb))
                            if matches!(self.heap.get(ka), Obj::String(_))
                                && matches!(self.heap.get(kb), Obj::String(_)) =>
                        {
                            // 操作数留在栈上作为根，连接结果驻留后再弹
                            let text = format!(
                                "{}{}",
                                self.heap.string(ka).text,
                                self.heap.string(kb).text
                            );
                            let result = self.intern(&text);
                            self.pop();
                            self.pop();
                            self.push(Value::Obj(result));
                        }
                        _ => rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_ADD),
                    }
                }
                OpCode::Subtract => binary_op!(self, ip, Value::Number, -),
                OpCode::Multiply => binary_op!(self, ip, Value::Number, *),
                OpCode::Divide => binary_op!(self, ip, Value::Number, /),
                OpCode::Modulo => binary_op!(self, ip, Value::Number, %),
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    if !self.peek(0).is_number() {
                        rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
                    }
                    let n = self.pop().as_number().unwrap();
                    self.push(Value::Number(-n));
                }
                OpCode::Increment => {
                    if !self.peek(0).is_number() {
                        rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
                    }
                    let n = self.pop().as_number().unwrap();
                    self.push(Value::Number(n + 1.0));
                }
                OpCode::Decrement => {
                    if !self.peek(0).is_number() {
                        rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
                    }
                    let n = self.pop().as_number().unwrap();
                    self.push(Value::Number(n - 1.0));
                }

                OpCode::BitwiseNot => {
                    if !self.peek(0).is_number() {
                        rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
                    }
                    let n = self.pop().as_number().unwrap() as i32;
                    self.push(Value::Number(!n as f64));
                }
                OpCode::BitwiseAnd => bitwise_op!(self, ip, &),
                OpCode::BitwiseOr => bitwise_op!(self, ip, |),
                OpCode::BitwiseXor => bitwise_op!(self, ip, ^),
                OpCode::BitwiseLeftShift => {
                    if !self.peek(0).is_number() || !self.peek(1).is_number() {
                        rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
                    }
                    let b = self.pop().as_number().unwrap() as i32;
                    let a = self.pop().as_number().unwrap() as i32;
                    self.push(Value::Number(a.wrapping_shl(b as u32) as f64));
                }
                OpCode::BitwiseRightShift => {
                    if !self.peek(0).is_number() || !self.peek(1).is_number() {
                        rt_error!(self, ip, messages::ERR_RUNTIME_OPERANDS_NUMBERS);
                    }
                    let b = self.pop().as_number().unwrap() as i32;
                    let a = self.pop().as_number().unwrap() as i32;
                    self.push(Value::Number(a.wrapping_shr(b as u32) as f64));
                }

                OpCode::Jump => {
                    let offset = read_short!(chunk, ip);
                    ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_short!(chunk, ip);
                    if self.peek(0).is_falsey() {
                        ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = read_short!(chunk, ip);
                    ip -= offset;
                }

                OpCode::Call => {
                    let argc = read_byte!(chunk, ip) as usize;
                    self.flush_ip(ip);
                    self.call_value(self.peek(argc), argc)?;
                    let frame = self.frames.last().unwrap();
                    chunk = self.chunk_of(frame.closure);
                    ip = frame.ip;
                }
                OpCode::Invoke => {
                    let name = read_string!(chunk, ip);
                    let argc = read_byte!(chunk, ip) as usize;
                    self.flush_ip(ip);
                    self.invoke(name, argc)?;
                    let frame = self.frames.last().unwrap();
                    chunk = self.chunk_of(frame.closure);
                    ip = frame.ip;
                }
                OpCode::SuperInvoke => {
                    let name = read_string!(chunk, ip);
                    let argc = read_byte!(chunk, ip) as usize;
                    self.flush_ip(ip);
                    let superclass = match self.pop() {
                        Value::Obj(key) => key,
                        _ => unreachable!("superclass slot is not an object"),
                    };
                    self.invoke_from_class(superclass, name, argc)?;
                    let frame = self.frames.last().unwrap();
                    chunk = self.chunk_of(frame.closure);
                    ip = frame.ip;
                }

                OpCode::Closure => {
                    let function = read_string!(chunk, ip);
                    let upvalue_count = self.heap.function(function).upvalue_count;
                    let closure = self.alloc(Obj::Closure(Closure {
                        function,
                        upvalues: Vec::with_capacity(upvalue_count),
                    }));
                    self.push(Value::Obj(closure));
                    for _ in 0..upvalue_count {
                        let is_local = read_byte!(chunk, ip);
                        let index = read_byte!(chunk, ip) as usize;
                        let upvalue = if is_local == 1 {
                            let base = self.frames.last().unwrap().slots;
                            self.capture_upvalue(base + index)
                        } else {
                            let enclosing = self.frames.last().unwrap().closure;
                            self.heap.closure(enclosing).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    self.close_upvalues(frame.slots);

                    if self.frames.is_empty() {
                        // 弹掉脚本闭包，执行结束
                        self.pop();
                        return Ok(());
                    }

                    self.stack.truncate(frame.slots);
                    self.push(result);
                    if frame.returns_to_host {
                        return Ok(());
                    }
                    let frame = self.frames.last().unwrap();
                    chunk = self.chunk_of(frame.closure);
                    ip = frame.ip;
                }

                OpCode::Class => {
                    let name = read_string!(chunk, ip);
                    let class = self.alloc(Obj::Class(Class { name, methods: Table::new() }));
                    self.push(Value::Obj(class));
                }
                OpCode::Inherit => {
                    let superclass = self.peek(1);
                    let skey = match superclass {
                        Value::Obj(key) if matches!(self.heap.get(key), Obj::Class(_)) => key,
                        _ => rt_error!(self, ip, messages::ERR_RUNTIME_SUPERCLASS_NOT_CLASS),
                    };
                    let subclass = match self.peek(0) {
                        Value::Obj(key) => key,
                        _ => unreachable!("subclass slot is not an object"),
                    };
                    // 超类方法先复制进来，子类随后定义的方法覆盖同名项
                    let super_methods = self.heap.class(skey).methods.clone();
                    super_methods.add_all_to(&mut self.heap.class_mut(subclass).methods);
                    self.pop();
                }
                OpCode::Method => {
                    let name = read_string!(chunk, ip);
                    let method = self.peek(0);
                    let class = match self.peek(1) {
                        Value::Obj(key) => key,
                        _ => unreachable!("class slot is not an object"),
                    };
                    let hash = self.heap.string(name).hash;
                    self.heap.class_mut(class).methods.set(name, hash, method);
                    self.pop();
                }

                OpCode::End => {
                    rt_error!(self, ip, messages::ERR_RUNTIME_CHUNK_END);
                }
            }
        }
    }

    fn current_chunk(&self) -> Rc<Chunk> {
        self.chunk_of(self.frames.last().unwrap().closure)
    }

    fn chunk_of(&self, closure: ObjKey) -> Rc<Chunk> {
        self.heap
            .function(self.heap.closure(closure).function)
            .chunk
            .clone()
    }

    // ============ 下标 ============

    fn index_subscript(
        &mut self,
        target: Value,
        index: Value,
        ip: &mut usize,
    ) -> Result<(), RuntimeError> {
        let key = match target {
            Value::Obj(key) => key,
            _ => rt_error!(self, *ip, messages::ERR_RUNTIME_INVALID_INDEX_TARGET),
        };
        enum Kind {
            Str,
            List,
            Other,
        }
        let kind = match self.heap.get(key) {
            Obj::String(_) => Kind::Str,
            Obj::List(_) => Kind::List,
            _ => Kind::Other,
        };
        match kind {
            Kind::Str => {
                let n = match index {
                    Value::Number(n) => n,
                    _ => rt_error!(self, *ip, messages::ERR_RUNTIME_STRING_INDEX_NAN),
                };
                let len = self.heap.string(key).char_len as i64;
                let mut i = n as i64;
                if i < 0 {
                    i += len;
                }
                if i < 0 || i >= len {
                    rt_error!(self, *ip, messages::ERR_RUNTIME_STRING_INDEX_RANGE);
                }
                let ch = self
                    .heap
                    .string(key)
                    .text
                    .chars()
                    .nth(i as usize)
                    .unwrap()
                    .to_string();
                let result = self.intern(&ch);
                self.push(Value::Obj(result));
                Ok(())
            }
            Kind::List => {
                let n = match index {
                    Value::Number(n) => n,
                    _ => rt_error!(self, *ip, messages::ERR_RUNTIME_LIST_INDEX_NAN),
                };
                let len = self.heap.list(key).items.len() as i64;
                let mut i = n as i64;
                if i < 0 {
                    i += len;
                }
                if i < 0 || i >= len {
                    rt_error!(self, *ip, messages::ERR_RUNTIME_LIST_INDEX_RANGE);
                }
                let value = self.heap.list(key).items[i as usize];
                self.push(value);
                Ok(())
            }
            Kind::Other => rt_error!(self, *ip, messages::ERR_RUNTIME_INVALID_INDEX_TARGET),
        }
    }

    fn store_subscript(
        &mut self,
        target: Value,
        index: Value,
        item: Value,
        ip: &mut usize,
    ) -> Result<(), RuntimeError> {
        let key = match target {
            Value::Obj(key) => key,
            _ => rt_error!(self, *ip, messages::ERR_RUNTIME_STORE_TARGET),
        };
        match self.heap.get(key) {
            // 字符串驻留共享存储，就地修改会破坏驻留不变式
            Obj::String(_) => rt_error!(self, *ip, messages::ERR_RUNTIME_STRING_IMMUTABLE),
            Obj::List(_) => {}
            _ => rt_error!(self, *ip, messages::ERR_RUNTIME_STORE_TARGET),
        }
        let n = match index {
            Value::Number(n) => n,
            _ => rt_error!(self, *ip, messages::ERR_RUNTIME_LIST_INDEX_NAN),
        };
        let len = self.heap.list(key).items.len() as i64;
        let mut i = n as i64;
        if i < 0 {
            i += len;
        }
        if i < 0 || i >= len {
            rt_error!(self, *ip, messages::ERR_RUNTIME_LIST_INDEX_RANGE);
        }
        self.heap.list_mut(key).items[i as usize] = item;
        self.push(item);
        Ok(())
    }

    // ============ 字符串内建方法 ============

    fn arity_error(&self, expected: usize, argc: usize) -> RuntimeError {
        self.error(
            messages::ERR_RUNTIME_ARITY,
            &[&expected.to_string(), &argc.to_string()],
        )
    }

    fn arg_type_error(&self, index: usize, param: &str, expected: &str, actual: Value) -> RuntimeError {
        self.error(
            messages::ERR_RUNTIME_ARG_TYPE,
            &[
                &index.to_string(),
                param,
                expected,
                self.heap.type_name(actual),
            ],
        )
    }

    fn string_arg(&self, argc: usize, i: usize, param: &str) -> Result<ObjKey, RuntimeError> {
        let value = self.arg(argc, i);
        match value {
            Value::Obj(key) if matches!(self.heap.get(key), Obj::String(_)) => Ok(key),
            _ => Err(self.arg_type_error(i + 1, param, "字符串", value)),
        }
    }

    fn number_arg(&self, argc: usize, i: usize, param: &str) -> Result<f64, RuntimeError> {
        let value = self.arg(argc, i);
        match value {
            Value::Number(n) => Ok(n),
            _ => Err(self.arg_type_error(i + 1, param, "数字", value)),
        }
    }

    fn closure_arg(&self, argc: usize, i: usize, param: &str) -> Result<ObjKey, RuntimeError> {
        let value = self.arg(argc, i);
        match value {
            Value::Obj(key) if matches!(self.heap.get(key), Obj::Closure(_)) => Ok(key),
            _ => Err(self.arg_type_error(i + 1, param, "关闭", value)),
        }
    }

    fn invoke_string(&mut self, rkey: ObjKey, name: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let method = self.heap.string(name).text.clone();
        match method.as_str() {
            "长度" => {
                if argc != 0 {
                    return Err(self.arity_error(0, argc));
                }
                let len = self.heap.string(rkey).char_len as f64;
                self.finish_builtin(argc, Value::Number(len));
                Ok(())
            }
            "指数" => {
                if argc != 1 {
                    return Err(self.arity_error(1, argc));
                }
                let search = self.string_arg(argc, 0, "搜索")?;
                let haystack: Vec<char> = self.heap.string(rkey).text.chars().collect();
                let needle: Vec<char> = self.heap.string(search).text.chars().collect();
                let index = char_index_of(&haystack, &needle, 0)
                    .map(|i| i as f64)
                    .unwrap_or(-1.0);
                self.finish_builtin(argc, Value::Number(index));
                Ok(())
            }
            "计数" => {
                if argc != 1 {
                    return Err(self.arity_error(1, argc));
                }
                let search = self.string_arg(argc, 0, "搜索")?;
                let haystack: Vec<char> = self.heap.string(rkey).text.chars().collect();
                let needle: Vec<char> = self.heap.string(search).text.chars().collect();
                // 重叠的出现也计数：每次从上个匹配点后一位接着找
                let mut count = 0.0;
                if !needle.is_empty() {
                    let mut from = 0usize;
                    while let Some(found) = char_index_of(&haystack, &needle, from) {
                        count += 1.0;
                        from = found + 1;
                    }
                }
                self.finish_builtin(argc, Value::Number(count));
                Ok(())
            }
            "拆分" => {
                if argc != 1 {
                    return Err(self.arity_error(1, argc));
                }
                let search = self.string_arg(argc, 0, "分隔")?;
                let text = self.heap.string(rkey).text.clone();
                let delimiters: Vec<char> = self.heap.string(search).text.chars().collect();

                // 分隔符是字符集合，空白段丢弃
                let list = self.alloc(Obj::List(List::default()));
                self.push(Value::Obj(list));
                let mut piece = String::new();
                for ch in text.chars() {
                    if !delimiters.is_empty() && delimiters.contains(&ch) {
                        if !piece.is_empty() {
                            let s = self.intern(&piece);
                            self.heap.list_mut(list).items.push(Value::Obj(s));
                            piece.clear();
                        }
                    } else {
                        piece.push(ch);
                    }
                }
                if !piece.is_empty() {
                    let s = self.intern(&piece);
                    self.heap.list_mut(list).items.push(Value::Obj(s));
                }
                self.pop();
                self.finish_builtin(argc, Value::Obj(list));
                Ok(())
            }
            "替换" => {
                if argc != 2 {
                    return Err(self.arity_error(2, argc));
                }
                let old = self.string_arg(argc, 0, "旧")?;
                let new = self.string_arg(argc, 1, "新")?;
                let old_text = self.heap.string(old).text.clone();
                if old_text.is_empty() {
                    self.finish_builtin(argc, Value::Obj(rkey));
                    return Ok(());
                }
                let replaced = self
                    .heap
                    .string(rkey)
                    .text
                    .replace(&old_text, &self.heap.string(new).text.clone());
                let result = self.intern(&replaced);
                self.finish_builtin(argc, Value::Obj(result));
                Ok(())
            }
            "修剪" | "修剪始" | "修剪端" => {
                if argc > 1 {
                    return Err(self.error(
                        messages::ERR_RUNTIME_ARITY_RANGE,
                        &["0", "1", &argc.to_string()],
                    ));
                }
                let set: Option<Vec<char>> = if argc == 1 {
                    let chars = self.string_arg(argc, 0, "字符")?;
                    Some(self.heap.string(chars).text.chars().collect())
                } else {
                    None
                };
                let in_set = |c: char| match &set {
                    Some(chars) => chars.contains(&c),
                    None => c.is_whitespace(),
                };
                let text = self.heap.string(rkey).text.clone();
                let trimmed = match method.as_str() {
                    "修剪" => text.trim_matches(in_set),
                    "修剪始" => text.trim_start_matches(in_set),
                    _ => text.trim_end_matches(in_set),
                };
                let result = self.intern(trimmed);
                self.finish_builtin(argc, Value::Obj(result));
                Ok(())
            }
            "大写" | "小写" => {
                if argc != 0 {
                    return Err(self.arity_error(0, argc));
                }
                let text = self.heap.string(rkey).text.clone();
                let converted = if method == "大写" {
                    text.to_uppercase()
                } else {
                    text.to_lowercase()
                };
                let result = self.intern(&converted);
                self.finish_builtin(argc, Value::Obj(result));
                Ok(())
            }
            "子串" => {
                if argc != 2 {
                    return Err(self.arity_error(2, argc));
                }
                let begin = self.number_arg(argc, 0, "开头")? as i64;
                let end = self.number_arg(argc, 1, "结尾")? as i64;
                let len = self.heap.string(rkey).char_len as i64;

                let begin = if begin < 0 { begin + len } else { begin };
                let end = if end < 0 { end + len } else { end };

                if begin < 0 || begin >= len {
                    return Err(self.error(messages::ERR_RUNTIME_INVALID_ARG_INDEX, &["1"]));
                }
                // 结尾是开区间，允许等于长度
                if end > len {
                    return Err(self.error(messages::ERR_RUNTIME_INVALID_ARG_INDEX, &["2"]));
                }
                if end < begin {
                    return Err(self.error(messages::ERR_RUNTIME_SUBSTRING_ORDER, &[]));
                }

                let piece: String = self
                    .heap
                    .string(rkey)
                    .text
                    .chars()
                    .skip(begin as usize)
                    .take((end - begin) as usize)
                    .collect();
                let result = self.intern(&piece);
                self.finish_builtin(argc, Value::Obj(result));
                Ok(())
            }
            _ => Err(self.error(messages::ERR_RUNTIME_UNDEFINED_PROPERTY, &[&method])),
        }
    }

    // ============ 列表内建方法 ============

    fn invoke_list(&mut self, rkey: ObjKey, name: ObjKey, argc: usize) -> Result<(), RuntimeError> {
        let method = self.heap.string(name).text.clone();
        match method.as_str() {
            "推" => {
                if argc != 1 {
                    return Err(self.arity_error(1, argc));
                }
                let item = self.arg(argc, 0);
                self.heap.list_mut(rkey).items.push(item);
                self.finish_builtin(argc, Value::Nil);
                Ok(())
            }
            "弹" => {
                if argc != 0 {
                    return Err(self.arity_error(0, argc));
                }
                if self.heap.list(rkey).items.is_empty() {
                    return Err(self.error(messages::ERR_RUNTIME_POP_EMPTY, &[]));
                }
                self.heap.list_mut(rkey).items.pop();
                self.finish_builtin(argc, Value::Nil);
                Ok(())
            }
            "插" => {
                if argc != 2 {
                    return Err(self.arity_error(2, argc));
                }
                let index = self.number_arg(argc, 0, "索引")? as i64;
                let item = self.arg(argc, 1);
                let len = self.heap.list(rkey).items.len() as i64;
                let index = if index < 0 { index + len } else { index };
                if index < 0 || index >= len {
                    return Err(self.error(messages::ERR_RUNTIME_INVALID_ARG_INDEX, &["1"]));
                }
                self.heap.list_mut(rkey).items.insert(index as usize, item);
                self.finish_builtin(argc, Value::Nil);
                Ok(())
            }
            "删" => {
                if argc != 1 {
                    return Err(self.arity_error(1, argc));
                }
                let index = self.number_arg(argc, 0, "索引")? as i64;
                let len = self.heap.list(rkey).items.len() as i64;
                let index = if index < 0 { index + len } else { index };
                if index < 0 || index >= len {
                    return Err(self.error(messages::ERR_RUNTIME_INVALID_ARG_INDEX, &["1"]));
                }
                self.heap.list_mut(rkey).items.remove(index as usize);
                self.finish_builtin(argc, Value::Nil);
                Ok(())
            }
            "长度" => {
                if argc != 0 {
                    return Err(self.arity_error(0, argc));
                }
                let len = self.heap.list(rkey).items.len() as f64;
                self.finish_builtin(argc, Value::Number(len));
                Ok(())
            }
            "过滤" => {
                if argc != 1 {
                    return Err(self.arity_error(1, argc));
                }
                let predicate = self.closure_arg(argc, 0, "测试")?;
                let arity = self
                    .heap
                    .function(self.heap.closure(predicate).function)
                    .arity;
                if arity != 1 {
                    return Err(self.error(
                        messages::ERR_RUNTIME_CALLBACK_ARITY,
                        &["1", &arity.to_string()],
                    ));
                }

                let filtered = self.alloc(Obj::List(List::default()));
                self.push(Value::Obj(filtered));
                let mut i = 0;
                while i < self.heap.list(rkey).items.len() {
                    let item = self.heap.list(rkey).items[i];
                    let keep = !self.run_closure(predicate, &[item])?.is_falsey();
                    if keep {
                        self.heap.list_mut(filtered).items.push(item);
                    }
                    i += 1;
                }
                self.pop();
                self.finish_builtin(argc, Value::Obj(filtered));
                Ok(())
            }
            "排序" => {
                if argc > 1 {
                    return Err(self.error(
                        messages::ERR_RUNTIME_ARITY_RANGE,
                        &["0", "1", &argc.to_string()],
                    ));
                }
                let comparator = if argc == 1 {
                    let closure = self.closure_arg(argc, 0, "比较")?;
                    let arity = self
                        .heap
                        .function(self.heap.closure(closure).function)
                        .arity;
                    if arity != 2 {
                        return Err(self.error(
                            messages::ERR_RUNTIME_CALLBACK_ARITY,
                            &["2", &arity.to_string()],
                        ));
                    }
                    Some(closure)
                } else {
                    None
                };
                let hi = self.heap.list(rkey).items.len() as i64 - 1;
                self.sort_list(rkey, 0, hi, comparator)?;
                self.finish_builtin(argc, Value::Obj(rkey));
                Ok(())
            }
            _ => Err(self.error(messages::ERR_RUNTIME_UNDEFINED_PROPERTY, &[&method])),
        }
    }

    /// 快速排序；比较函数可以是脚本闭包
    fn sort_list(
        &mut self,
        list: ObjKey,
        lo: i64,
        hi: i64,
        comparator: Option<ObjKey>,
    ) -> Result<(), RuntimeError> {
        if lo >= hi {
            return Ok(());
        }
        let pivot = self.heap.list(list).items[hi as usize];
        let mut i = lo - 1;
        for j in lo..hi {
            let item = self.heap.list(list).items[j as usize];
            if self.compare_for_sort(item, pivot, comparator)? < 0.0 {
                i += 1;
                self.heap.list_mut(list).items.swap(i as usize, j as usize);
            }
        }
        self.heap
            .list_mut(list)
            .items
            .swap((i + 1) as usize, hi as usize);
        self.sort_list(list, lo, i, comparator)?;
        self.sort_list(list, i + 2, hi, comparator)
    }

    /// 负数表示第一个参数排在前面
    fn compare_for_sort(
        &mut self,
        a: Value,
        b: Value,
        comparator: Option<ObjKey>,
    ) -> Result<f64, RuntimeError> {
        match comparator {
            Some(closure) => match self.run_closure(closure, &[a, b])? {
                Value::Number(n) => Ok(n),
                _ => Err(self.error(messages::ERR_RUNTIME_SORT_CMP_NUMBER, &[])),
            },
            None => match (a, b) {
                (Value::Number(x), Value::Number(y)) => Ok(x - y),
                _ => Err(self.error(messages::ERR_RUNTIME_SORT_NUMBERS, &[])),
            },
        }
    }
}

/// 在字符序列里从 from 起找子序列，返回字符索引
fn char_index_of(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return if from <= haystack.len() { Some(from) } else { None };
    }
    if haystack.len() < needle.len() {
        return None;
    }
    for i in from..=haystack.len() - needle.len() {
        if haystack[i..i + needle.len()] == *needle {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (InterpretResult, String) {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        let result = vm.interpret(source);
        let output = String::from_utf8_lossy(vm.output()).to_string();
        (result, output)
    }

    fn run_ok(source: &str) -> String {
        let (result, output) = run(source);
        assert_eq!(result, InterpretResult::Ok, "执行失败：{}", source);
        output
    }

    fn run_err(source: &str) {
        let (result, _) = run(source);
        assert_eq!(result, InterpretResult::RuntimeError, "应当运行失败：{}", source);
    }

    #[test]
    fn test_arithmetic_and_print() {
        assert_eq!(run_ok("打印 1 + 2 * 3;"), "7\n");
        assert_eq!(run_ok("打印 (1 + 2) * 3;"), "9\n");
        assert_eq!(run_ok("打印 10 / 4;"), "2.5\n");
        assert_eq!(run_ok("打印 0 - 5;"), "-5\n");
        assert_eq!(run_ok("打印 -5;"), "-5\n");
    }

    #[test]
    fn test_modulo_sign_follows_dividend() {
        assert_eq!(run_ok("打印 7 % 3;"), "1\n");
        assert_eq!(run_ok("打印 -7 % 3;"), "-1\n");
        assert_eq!(run_ok("打印 7.5 % 2;"), "1.5\n");
    }

    #[test]
    fn test_bitwise_through_i32() {
        assert_eq!(run_ok("打印 6 & 3;"), "2\n");
        assert_eq!(run_ok("打印 6 | 3;"), "7\n");
        assert_eq!(run_ok("打印 6 ^ 3;"), "5\n");
        assert_eq!(run_ok("打印 ~0;"), "-1\n");
        assert_eq!(run_ok("打印 1 << 4;"), "16\n");
        assert_eq!(run_ok("打印 16 >> 2;"), "4\n");
        // 位运算先截断成 32 位有符号整数
        assert_eq!(run_ok("打印 2.9 & 3;"), "2\n");
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(run_ok("打印 !空;"), "true\n");
        assert_eq!(run_ok("打印 !假;"), "true\n");
        assert_eq!(run_ok("打印 !0;"), "false\n");
        assert_eq!(run_ok("打印 !\"\";"), "false\n");
    }

    #[test]
    fn test_comparison_and_equality() {
        assert_eq!(run_ok("打印 1 < 2;"), "true\n");
        assert_eq!(run_ok("打印 2 <= 1;"), "false\n");
        assert_eq!(run_ok("打印 1 == 1;"), "true\n");
        assert_eq!(run_ok("打印 1 != 2;"), "true\n");
        assert_eq!(run_ok("打印 空 == 空;"), "true\n");
        assert_eq!(run_ok("打印 1 == \"1\";"), "false\n");
    }

    #[test]
    fn test_string_concat_and_interning() {
        assert_eq!(run_ok("打印 \"你\" + \"好\";"), "你好\n");
        // 驻留：内容相等即对象相等
        assert_eq!(run_ok("打印 \"你\" + \"好\" == \"你好\";"), "true\n");
    }

    #[test]
    fn test_globals_and_locals() {
        assert_eq!(run_ok("变量 甲 = 1; 甲 = 甲 + 1; 打印 甲;"), "2\n");
        assert_eq!(run_ok("{ 变量 甲 = 10; { 变量 乙 = 甲 * 2; 打印 乙; } }"), "20\n");
    }

    #[test]
    fn test_undefined_variable_errors() {
        run_err("打印 不存在;");
        run_err("不存在 = 1;");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(run_ok("如果 (1 < 2) { 打印 1; } 否则 { 打印 2; }"), "1\n");
        assert_eq!(run_ok("如果 (1 > 2) { 打印 1; } 否则 { 打印 2; }"), "2\n");
        assert_eq!(
            run_ok("变量 甲 = 0; 当 (甲 < 3) { 打印 甲; 甲 = 甲 + 1; }"),
            "0\n1\n2\n"
        );
        assert_eq!(
            run_ok("循环 (变量 甲 = 0; 甲 < 3; 甲 = 甲 + 1) { 打印 甲; }"),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn test_logic_short_circuit() {
        assert_eq!(run_ok("打印 假 和 不存在;"), "false\n");
        assert_eq!(run_ok("打印 真 或 不存在;"), "true\n");
        assert_eq!(run_ok("打印 1 和 2;"), "2\n");
        assert_eq!(run_ok("打印 空 或 3;"), "3\n");
    }

    #[test]
    fn test_functions_and_returns() {
        assert_eq!(
            run_ok("功能 加(甲, 乙) { 返回 甲 + 乙; } 打印 加(1, 2);"),
            "3\n"
        );
        assert_eq!(run_ok("功能 无() {} 打印 无();"), "nil\n");
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            run_ok("功能 阶乘(甲) { 如果 (甲 <= 1) { 返回 1; } 返回 甲 * 阶乘(甲 - 1); } 打印 阶乘(10);"),
            "3628800\n"
        );
    }

    #[test]
    fn test_call_frame_depth_boundary() {
        // 顶层脚本占一帧，再嵌套 63 层正好到上限
        assert_eq!(
            run_ok("功能 深(甲) { 如果 (甲 > 1) { 返回 深(甲 - 1); } 返回 0; } 打印 深(63);"),
            "0\n"
        );
        run_err("功能 深(甲) { 如果 (甲 > 1) { 返回 深(甲 - 1); } 返回 0; } 打印 深(64);");
    }

    #[test]
    fn test_arity_mismatch_is_runtime_error() {
        run_err("功能 双(甲, 乙) { 返回 甲; } 双(1);");
    }

    #[test]
    fn test_calling_non_callable_errors() {
        run_err("变量 甲 = 1; 甲();");
        run_err("\"文字\"();");
    }

    #[test]
    fn test_closures_capture_independently() {
        let source = "
            功能 造计数器() {
                变量 数 = 0;
                功能 增() { 数 = 数 + 1; 返回 数; }
                返回 增;
            }
            变量 甲 = 造计数器();
            变量 乙 = 造计数器();
            打印 甲();
            打印 甲();
            打印 乙();
        ";
        assert_eq!(run_ok(source), "1\n2\n1\n");
    }

    #[test]
    fn test_sibling_closures_share_upvalue() {
        let source = "
            功能 造() {
                变量 数 = 0;
                功能 增() { 数 = 数 + 1; }
                功能 读() { 返回 数; }
                变量 李 = [增, 读];
                返回 李;
            }
            变量 对 = 造();
            对[0]();
            对[0]();
            打印 对[1]();
        ";
        assert_eq!(run_ok(source), "2\n");
    }

    #[test]
    fn test_upvalue_closed_after_scope_exit() {
        let source = "
            变量 取;
            {
                变量 局 = \"里面\";
                功能 读() { 返回 局; }
                取 = 读;
            }
            打印 取();
        ";
        assert_eq!(run_ok(source), "里面\n");
    }

    #[test]
    fn test_classes_methods_and_fields() {
        let source = "
            类 点 {
                初始化(横, 纵) { 这.横 = 横; 这.纵 = 纵; }
                和() { 返回 这.横 + 这.纵; }
            }
            变量 甲 = 点(3, 4);
            打印 甲.和();
            甲.横 = 10;
            打印 甲.和();
        ";
        assert_eq!(run_ok(source), "7\n14\n");
    }

    #[test]
    fn test_fields_shadow_methods() {
        let source = "
            类 甲 { 读() { 返回 1; } }
            变量 对 = 甲();
            功能 替() { 返回 2; }
            对.读 = 替;
            打印 对.读();
        ";
        assert_eq!(run_ok(source), "2\n");
    }

    #[test]
    fn test_inheritance_and_super() {
        let source = "
            类 甲 { 方法() { 返回 1; } }
            类 乙 < 甲 { 方法() { 返回 超.方法() + 1; } }
            打印 乙().方法();
        ";
        assert_eq!(run_ok(source), "2\n");
    }

    #[test]
    fn test_bound_method_as_value() {
        let source = "
            类 甲 { 初始化() { 这.数 = 7; } 读() { 返回 这.数; } }
            变量 方 = 甲().读;
            打印 方();
        ";
        assert_eq!(run_ok(source), "7\n");
    }

    #[test]
    fn test_class_initializer_arity() {
        run_err("类 甲 {} 甲(1);");
        run_err("类 甲 { 初始化(乙) {} } 甲();");
    }

    #[test]
    fn test_property_on_non_instance_errors() {
        run_err("变量 甲 = 1; 打印 甲.字段;");
        run_err("变量 甲 = 1; 甲.字段 = 2;");
    }

    #[test]
    fn test_lists_and_subscripts() {
        assert_eq!(run_ok("变量 李 = [1, 2, 3]; 打印 李[0];"), "1\n");
        assert_eq!(run_ok("变量 李 = [1, 2, 3]; 打印 李[-1];"), "3\n");
        assert_eq!(run_ok("变量 李 = [1, 2, 3]; 李[1] = 9; 打印 李;"), "[1, 9, 3]\n");
        run_err("变量 李 = [1]; 打印 李[5];");
        run_err("变量 李 = [1]; 打印 李[\"零\"];");
    }

    #[test]
    fn test_string_subscript() {
        assert_eq!(run_ok("打印 \"你好啊\"[1];"), "好\n");
        assert_eq!(run_ok("打印 \"你好啊\"[-1];"), "啊\n");
        run_err("打印 \"你好\"[5];");
        // 字符串不可变
        run_err("变量 串 = \"你好\"; 串[0] = \"再\";");
    }

    #[test]
    fn test_compound_assignment_and_increment() {
        assert_eq!(run_ok("变量 甲 = 10; 甲 += 5; 打印 甲;"), "15\n");
        assert_eq!(run_ok("变量 甲 = 10; 甲 %= 3; 打印 甲;"), "1\n");
        assert_eq!(run_ok("变量 甲 = 1; 打印 甲++; 打印 甲;"), "1\n2\n");
        assert_eq!(run_ok("变量 甲 = 1; 打印 ++甲; 打印 甲;"), "2\n2\n");
        assert_eq!(run_ok("变量 甲 = 1; 打印 甲--; 打印 甲;"), "1\n0\n");
        assert_eq!(run_ok("变量 李 = [1, 2]; 李[0] += 10; 打印 李;"), "[11, 2]\n");
        assert_eq!(
            run_ok("类 甲 {} 变量 对 = 甲(); 对.数 = 1; 对.数++; 打印 对.数;"),
            "2\n"
        );
    }

    #[test]
    fn test_list_methods() {
        assert_eq!(run_ok("变量 李 = [1]; 李.推(2); 打印 李;"), "[1, 2]\n");
        assert_eq!(run_ok("变量 李 = [1, 2]; 李.弹(); 打印 李;"), "[1]\n");
        assert_eq!(run_ok("变量 李 = [1, 3]; 李.插(1, 2); 打印 李;"), "[1, 2, 3]\n");
        assert_eq!(run_ok("变量 李 = [1, 2, 3]; 李.删(0); 打印 李;"), "[2, 3]\n");
        assert_eq!(run_ok("打印 [1, 2, 3].长度();"), "3\n");
        run_err("[].弹();");
        run_err("[1].插(5, 0);");
    }

    #[test]
    fn test_list_sort_and_filter() {
        assert_eq!(run_ok("变量 李 = [3, 1, 2]; 李.排序(); 打印 李;"), "[1, 2, 3]\n");
        assert_eq!(
            run_ok("变量 李 = [3, 1, 2]; 打印 李.排序();"),
            "[1, 2, 3]\n"
        );
        assert_eq!(
            run_ok("功能 逆(甲, 乙) { 返回 乙 - 甲; } 变量 李 = [1, 3, 2]; 李.排序(逆); 打印 李;"),
            "[3, 2, 1]\n"
        );
        assert_eq!(
            run_ok("功能 偶(甲) { 返回 甲 % 2 == 0; } 打印 [1, 2, 3, 4].过滤(偶);"),
            "[2, 4]\n"
        );
        run_err("[1, \"二\"].排序();");
        run_err("功能 一(甲) { 返回 甲; } [1].排序(一);");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(run_ok("打印 \"你好啊\".长度();"), "3\n");
        assert_eq!(run_ok("打印 \"abcabc\".指数(\"bc\");"), "1\n");
        assert_eq!(run_ok("打印 \"abc\".指数(\"x\");"), "-1\n");
        assert_eq!(run_ok("打印 \"aaa\".计数(\"aa\");"), "2\n");
        assert_eq!(run_ok("打印 \"一,二,三\".拆分(\",\");"), "[一, 二, 三]\n");
        assert_eq!(run_ok("打印 \"a,b;c\".拆分(\",;\");"), "[a, b, c]\n");
        assert_eq!(run_ok("打印 \"香蕉\".替换(\"蕉\", \"瓜\");"), "香瓜\n");
        assert_eq!(run_ok("打印 \"  你好  \".修剪();"), "你好\n");
        assert_eq!(run_ok("打印 \"xx你好xx\".修剪(\"x\");"), "你好\n");
        assert_eq!(run_ok("打印 \"  你好  \".修剪始() + \"|\";"), "你好  |\n");
        assert_eq!(run_ok("打印 \"|\" + \"  你好  \".修剪端();"), "|  你好\n");
        assert_eq!(run_ok("打印 \"abc\".大写();"), "ABC\n");
        assert_eq!(run_ok("打印 \"ABC\".小写();"), "abc\n");
    }

    #[test]
    fn test_substring() {
        assert_eq!(run_ok("打印 \"abcdef\".子串(1, 3);"), "bc\n");
        assert_eq!(run_ok("打印 \"abcdef\".子串(1, -1);"), "bcde\n");
        // 结尾允许等于长度
        assert_eq!(run_ok("打印 \"abcdef\".子串(2, 6);"), "cdef\n");
        assert_eq!(run_ok("打印 \"你好世界\".子串(-2, 4);"), "世界\n");
        run_err("\"abc\".子串(5, 6);");
        run_err("\"abc\".子串(0, 9);");
        run_err("\"abc\".子串(2, 1);");
        run_err("\"abc\".子串(\"零\", 1);");
    }

    #[test]
    fn test_string_method_arity_and_types() {
        run_err("\"abc\".长度(1);");
        run_err("\"abc\".指数();");
        run_err("\"abc\".指数(5);");
        run_err("\"abc\".没有的方法();");
        run_err("1 .没有的方法();");
    }

    #[test]
    fn test_callable_field_through_invoke() {
        let source = "
            类 盒 {}
            变量 盒子 = 盒();
            功能 喊() { 返回 \"喊声\"; }
            盒子.喊 = 喊;
            打印 盒子.喊();
        ";
        assert_eq!(run_ok(source), "喊声\n");
    }

    #[test]
    fn test_stack_is_empty_after_run() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        assert_eq!(vm.interpret("变量 甲 = 1; 打印 甲 + 1;"), InterpretResult::Ok);
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        assert!(vm.open_upvalues.is_empty());
    }

    #[test]
    fn test_stack_reset_after_error_allows_reuse() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        assert_eq!(vm.interpret("打印 没有的;"), InterpretResult::RuntimeError);
        assert!(vm.stack.is_empty());
        assert_eq!(vm.interpret("打印 1;"), InterpretResult::Ok);
    }

    #[test]
    fn test_gc_under_pressure_keeps_reachable_values() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        // 压低水位线，让回收在循环里反复发生
        vm.heap.set_next_gc(1);
        let source = "
            变量 串 = \"种\";
            循环 (变量 甲 = 0; 甲 < 200; 甲 = 甲 + 1) {
                串 = 串 + \"子\";
            }
            打印 串.长度();
        ";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
        let output = String::from_utf8_lossy(vm.output()).to_string();
        assert_eq!(output, "201\n");
    }

    #[test]
    fn test_gc_collects_cyclic_garbage() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        vm.heap.set_next_gc(1);
        // 列表自引用成环，离开作用域后整个环都应能回收
        let source = "
            循环 (变量 甲 = 0; 甲 < 100; 甲 = 甲 + 1) {
                变量 环 = [空];
                环[0] = 环;
            }
            打印 \"完\";
        ";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
        let live = vm.heap.object_count();
        // 环都死了：存活对象数与程序规模无关
        assert!(live < 100, "存活对象过多：{}", live);
    }

    #[test]
    fn test_static_instance_rejects_field_write() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        let class = vm.new_class("数学");
        let instance = vm.new_instance(class, true);
        vm.define_property("圆周率", Value::Number(3.14159), instance);
        vm.define_native_instance("数学", instance);

        assert_eq!(vm.interpret("打印 数学.圆周率;"), InterpretResult::Ok);
        assert_eq!(vm.interpret("数学.圆周率 = 1;"), InterpretResult::RuntimeError);
    }

    fn native_double(ctx: &mut NativeCtx<'_>, args: &[Value]) -> Result<Value, String> {
        let _ = ctx;
        match args[0] {
            Value::Number(n) => Ok(Value::Number(n * 2.0)),
            _ => Err("参数必须是数字。".to_string()),
        }
    }

    #[test]
    fn test_static_native_method_dispatch() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        let class = vm.new_class("数学");
        vm.define_native("翻倍", native_double, 1, class);
        let instance = vm.new_instance(class, true);
        vm.define_native_instance("数学", instance);

        assert_eq!(vm.interpret("打印 数学.翻倍(21);"), InterpretResult::Ok);
        let output = String::from_utf8_lossy(vm.output()).to_string();
        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_native_error_becomes_runtime_error() {
        let mut vm = VM::with_output(Vec::new());
        vm.set_locale(Locale::Zh);
        let class = vm.new_class("数学");
        vm.define_native("翻倍", native_double, 1, class);
        let instance = vm.new_instance(class, true);
        vm.define_native_instance("数学", instance);

        assert_eq!(vm.interpret("数学.翻倍(\"二\");"), InterpretResult::RuntimeError);
        assert_eq!(vm.interpret("数学.翻倍(1, 2);"), InterpretResult::RuntimeError);
    }

    #[test]
    fn test_clock_native_returns_number() {
        assert_eq!(run_ok("打印 时钟() >= 0;"), "true\n");
    }

    #[test]
    fn test_char_index_of() {
        let hay: Vec<char> = "abcbc".chars().collect();
        let needle: Vec<char> = "bc".chars().collect();
        assert_eq!(char_index_of(&hay, &needle, 0), Some(1));
        assert_eq!(char_index_of(&hay, &needle, 2), Some(3));
        assert_eq!(char_index_of(&hay, &needle, 4), None);
        assert_eq!(char_index_of(&hay, &[], 0), Some(0));
    }
}
