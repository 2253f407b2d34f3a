//! 单遍编译器
//!
//! Pratt 风格表达式解析加语句编译，边解析边产出字节码。
//! 每个正在编译的函数对应一个编译上下文；上下文之间用外层链
//! 连接，标识符解析沿链向外查找局部变量和 upvalue。

use std::rc::Rc;

use super::bytecode::{Chunk, OpCode};
use crate::config;
use crate::i18n::{format_message, messages, Locale};
use crate::lexer::{Scanner, Token, TokenKind};
use crate::vm::gc::Heap;
use crate::vm::object::{Function, Obj, ObjKey};
use crate::vm::Value;

/// 单个函数的局部变量上限（槽位索引是一个字节）
const MAX_LOCALS: usize = 256;
/// 单个函数捕获的 upvalue 上限
const MAX_UPVALUES: usize = 256;

/// 编译一段源码，返回顶层脚本函数；有任何错误时返回 None
pub fn compile(source: &str, heap: &mut Heap, locale: Locale) -> Option<ObjKey> {
    let scanner = Scanner::new(source, locale);
    let mut compiler = Compiler::new(scanner, heap, locale);

    compiler.advance();
    while !compiler.matches(&TokenKind::Eof) {
        compiler.declaration();
    }

    let (function, _) = compiler.end_context();
    if compiler.had_error {
        None
    } else {
        Some(function)
    }
}

/// 正在编译的函数种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FnKind {
    /// 顶层脚本
    Script,
    /// 普通功能
    Function,
    /// 类方法
    Method,
    /// 初始化方法
    Initializer,
}

/// 局部变量
#[derive(Debug)]
struct Local {
    name: String,
    /// 所在作用域深度；-1 表示声明了但初始化式还没编译完
    depth: i32,
    /// 是否被内层闭包捕获
    is_captured: bool,
}

/// 编译期的 upvalue 描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpvalueMeta {
    index: u8,
    /// true 捕获外层局部变量，false 捕获外层 upvalue
    is_local: bool,
}

enum ResolveErr {
    OwnInitializer,
    TooManyUpvalues,
}

/// 一个函数的编译上下文
struct FnCtx {
    enclosing: Option<Box<FnCtx>>,
    kind: FnKind,
    name: String,
    chunk: Chunk,
    arity: u8,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueMeta>,
    scope_depth: i32,
}

impl FnCtx {
    fn new(kind: FnKind, name: String) -> Self {
        // 0 号槽位留给被调用者：方法里是接收者「这」，普通功能里不可见
        let slot_zero = Local {
            name: if matches!(kind, FnKind::Method | FnKind::Initializer) {
                "这".to_string()
            } else {
                String::new()
            },
            depth: 0,
            is_captured: false,
        };
        Self {
            enclosing: None,
            kind,
            name,
            chunk: Chunk::new(),
            arity: 0,
            locals: vec![slot_zero],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }

    /// 在本上下文解析局部变量。Err 表示在自身初始化式中读取
    fn resolve_local(&self, name: &str) -> Result<Option<u8>, ()> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth < 0 {
                    return Err(());
                }
                return Ok(Some(i as u8));
            }
        }
        Ok(None)
    }

    /// 追加 upvalue，重复的合并
    fn add_upvalue(&mut self, index: u8, is_local: bool) -> Result<u8, ResolveErr> {
        let meta = UpvalueMeta { index, is_local };
        for (i, existing) in self.upvalues.iter().enumerate() {
            if *existing == meta {
                return Ok(i as u8);
            }
        }
        if self.upvalues.len() >= MAX_UPVALUES {
            return Err(ResolveErr::TooManyUpvalues);
        }
        self.upvalues.push(meta);
        Ok((self.upvalues.len() - 1) as u8)
    }

    /// 沿外层链解析 upvalue：外层局部变量标记被捕获，
    /// 更外层的 upvalue 逐层向内转接
    fn resolve_upvalue(&mut self, name: &str) -> Result<Option<u8>, ResolveErr> {
        if self.enclosing.is_none() {
            return Ok(None);
        }

        let local = {
            let enclosing = self.enclosing.as_deref_mut().unwrap();
            match enclosing.resolve_local(name) {
                Err(()) => return Err(ResolveErr::OwnInitializer),
                Ok(Some(slot)) => {
                    enclosing.locals[slot as usize].is_captured = true;
                    Some(slot)
                }
                Ok(None) => None,
            }
        };
        if let Some(slot) = local {
            return self.add_upvalue(slot, true).map(Some);
        }

        let upvalue = {
            let enclosing = self.enclosing.as_deref_mut().unwrap();
            enclosing.resolve_upvalue(name)?
        };
        if let Some(index) = upvalue {
            return self.add_upvalue(index, false).map(Some);
        }
        Ok(None)
    }
}

/// 类编译上下文（嵌套类声明构成栈）
struct ClassCtx {
    has_superclass: bool,
}

/// 运算符优先级，从低到高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Comparison,
    Shift,
    Term,
    Factor,
    Unary,
    Call,
}

impl Precedence {
    /// 左结合二元运算符的右操作数优先级
    fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Shift,
            Precedence::Shift => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Call,
        }
    }
}

/// 中缀运算符的优先级；不是中缀运算符时返回 None 级
fn infix_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::Pipe => Precedence::BitOr,
        TokenKind::Caret => Precedence::BitXor,
        TokenKind::Amp => Precedence::BitAnd,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual => Precedence::Comparison,
        TokenKind::LessLess | TokenKind::GreaterGreater => Precedence::Shift,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::LeftParen | TokenKind::Dot | TokenKind::LeftBracket => Precedence::Call,
        _ => Precedence::None,
    }
}

struct Compiler<'h> {
    scanner: Scanner,
    heap: &'h mut Heap,
    locale: Locale,
    previous: Token,
    current: Token,
    had_error: bool,
    panic_mode: bool,
    ctx: Box<FnCtx>,
    classes: Vec<ClassCtx>,
}

impl<'h> Compiler<'h> {
    fn new(scanner: Scanner, heap: &'h mut Heap, locale: Locale) -> Self {
        Self {
            scanner,
            heap,
            locale,
            previous: Token::synthetic(),
            current: Token::synthetic(),
            had_error: false,
            panic_mode: false,
            ctx: Box::new(FnCtx::new(FnKind::Script, String::new())),
            classes: Vec::new(),
        }
    }

    // ============ Token 流 ============

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::synthetic());
        loop {
            self.current = self.scanner.scan_token();
            match &self.current.kind {
                TokenKind::Error(msg) => {
                    let msg = msg.clone();
                    self.report_at(true, &msg);
                }
                _ => break,
            }
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current.is(kind)
    }

    fn check_identifier(&self) -> bool {
        matches!(self.current.kind, TokenKind::Identifier(_))
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, expected: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(messages::ERR_COMPILE_EXPECTED_TOKEN, &[expected]);
        }
    }

    /// 消费一个标识符；what 用于错误消息（变量、功能、类……）
    fn consume_identifier(&mut self, what: &str) {
        if self.check_identifier() {
            self.advance();
        } else {
            self.error_at_current(messages::ERR_COMPILE_EXPECTED_IDENTIFIER, &[what]);
        }
    }

    // ============ 错误报告 ============

    fn error(&mut self, key: &str, args: &[&str]) {
        let msg = format_message(key, self.locale, args);
        self.report_at(false, &msg);
    }

    fn error_at_current(&mut self, key: &str, args: &[&str]) {
        let msg = format_message(key, self.locale, args);
        self.report_at(true, &msg);
    }

    fn report_at(&mut self, at_current: bool, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let token = if at_current { &self.current } else { &self.previous };
        let body = if token.is_eof() {
            format_message(messages::MSG_DIAG_AT_END, self.locale, &[message])
        } else if token.is_error() {
            message.to_string()
        } else {
            format_message(messages::MSG_DIAG_AT, self.locale, &[&token.lexeme, message])
        };
        let line = token.span.line.to_string();
        eprintln!(
            "{}",
            format_message(messages::MSG_DIAG_LINE, self.locale, &[&line, &body])
        );
    }

    /// 恐慌模式同步：跳到语句边界再继续
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.current.is_eof() {
            if self.previous.is(&TokenKind::Semicolon) {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ============ 字节码输出 ============

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.span.line;
        self.ctx.chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_with_operand(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.ctx.chunk.add_constant(value);
        if index > u8::MAX as usize {
            self.error(messages::ERR_COMPILE_TOO_MANY_CONSTANTS, &[]);
            return 0;
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_with_operand(OpCode::Constant, index);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let key = self.heap.intern(name);
        self.make_constant(Value::Obj(key))
    }

    /// 发出带占位偏移的前跳指令，返回待回填位置
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.ctx.chunk.code.len() - 2
    }

    /// 回填跳转偏移（大端 16 位）
    fn patch_jump(&mut self, offset: usize) {
        let jump = self.ctx.chunk.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error(messages::ERR_COMPILE_JUMP_TOO_LARGE, &[]);
        }
        self.ctx.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        self.ctx.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.ctx.chunk.code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error(messages::ERR_COMPILE_LOOP_TOO_LARGE, &[]);
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn emit_return(&mut self) {
        if self.ctx.kind == FnKind::Initializer {
            // 初始化方法隐式返回接收者
            self.emit_with_operand(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    // ============ 编译上下文 ============

    fn begin_context(&mut self, kind: FnKind, name: String) {
        let new_ctx = Box::new(FnCtx::new(kind, name));
        let enclosing = std::mem::replace(&mut self.ctx, new_ctx);
        self.ctx.enclosing = Some(enclosing);
    }

    /// 结束当前上下文，产出函数对象
    fn end_context(&mut self) -> (ObjKey, Vec<UpvalueMeta>) {
        self.emit_return();
        self.ctx.chunk.write_op(OpCode::End, self.previous.span.line);

        let placeholder = Box::new(FnCtx::new(FnKind::Script, String::new()));
        let ctx = std::mem::replace(&mut self.ctx, placeholder);
        let FnCtx { enclosing, kind, name, chunk, arity, upvalues, .. } = *ctx;
        if let Some(enclosing) = enclosing {
            self.ctx = enclosing;
        }

        let name_key = if kind == FnKind::Script {
            None
        } else {
            Some(self.heap.intern(&name))
        };
        let function = self.heap.alloc(Obj::Function(Function {
            arity,
            upvalue_count: upvalues.len(),
            chunk: Rc::new(chunk),
            name: name_key,
        }));

        if config::trace_exec() && !self.had_error {
            let title = if name.is_empty() { "脚本" } else { name.as_str() };
            eprintln!(
                "{}",
                super::bytecode::disassemble_chunk(
                    &self.heap.function(function).chunk,
                    title,
                    self.heap
                )
            );
        }

        (function, upvalues)
    }

    fn begin_scope(&mut self) {
        self.ctx.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.ctx.scope_depth -= 1;
        loop {
            let captured = match self.ctx.locals.last() {
                Some(local) if local.depth > self.ctx.scope_depth => local.is_captured,
                _ => break,
            };
            self.ctx.locals.pop();
            if captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
        }
    }

    // ============ 变量 ============

    fn declare_variable(&mut self, name: &str) {
        if self.ctx.scope_depth == 0 {
            return;
        }
        let mut duplicate = false;
        for local in self.ctx.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.ctx.scope_depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error(messages::ERR_COMPILE_DUPLICATE_VARIABLE, &[name]);
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: &str) {
        if self.ctx.locals.len() >= MAX_LOCALS {
            self.error(messages::ERR_COMPILE_TOO_MANY_LOCALS, &[]);
            return;
        }
        self.ctx.locals.push(Local {
            name: name.to_string(),
            depth: -1,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        if self.ctx.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.ctx.locals.last_mut() {
            local.depth = self.ctx.scope_depth;
        }
    }

    /// 解析变量声明名，返回全局名常量索引（局部变量返回 0）
    fn parse_variable(&mut self, what: &str) -> u8 {
        self.consume_identifier(what);
        let name = self.previous.lexeme.clone();
        self.declare_variable(&name);
        if self.ctx.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(&name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.ctx.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_with_operand(OpCode::DefineGlobal, global);
    }

    /// 解析一个名字的读写指令对
    fn resolve_variable(&mut self, name: &str) -> (OpCode, OpCode, u8) {
        match self.ctx.resolve_local(name) {
            Err(()) => {
                self.error(messages::ERR_COMPILE_READ_OWN_INITIALIZER, &[]);
            }
            Ok(Some(slot)) => return (OpCode::GetLocal, OpCode::SetLocal, slot),
            Ok(None) => match self.ctx.resolve_upvalue(name) {
                Err(ResolveErr::OwnInitializer) => {
                    self.error(messages::ERR_COMPILE_READ_OWN_INITIALIZER, &[]);
                }
                Err(ResolveErr::TooManyUpvalues) => {
                    self.error(messages::ERR_COMPILE_TOO_MANY_UPVALUES, &[]);
                }
                Ok(Some(index)) => return (OpCode::GetUpvalue, OpCode::SetUpvalue, index),
                Ok(None) => {}
            },
        }
        let constant = self.identifier_constant(name);
        (OpCode::GetGlobal, OpCode::SetGlobal, constant)
    }

    /// 复合赋值符对应的算术指令
    fn match_compound_op(&mut self) -> Option<OpCode> {
        let op = match self.current.kind {
            TokenKind::PlusEqual => OpCode::Add,
            TokenKind::MinusEqual => OpCode::Subtract,
            TokenKind::StarEqual => OpCode::Multiply,
            TokenKind::SlashEqual => OpCode::Divide,
            TokenKind::PercentEqual => OpCode::Modulo,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn check_assignment_op(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
        )
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (get_op, set_op, arg) = self.resolve_variable(name);

        if can_assign && self.matches(&TokenKind::Equal) {
            self.expression();
            self.emit_with_operand(set_op, arg);
            return;
        }
        if can_assign {
            if let Some(binop) = self.match_compound_op() {
                self.emit_with_operand(get_op, arg);
                self.expression();
                self.emit_op(binop);
                self.emit_with_operand(set_op, arg);
                return;
            }
        }
        if self.matches(&TokenKind::PlusPlus) {
            self.postfix_increment(get_op, set_op, arg, OpCode::Increment);
            return;
        }
        if self.matches(&TokenKind::MinusMinus) {
            self.postfix_increment(get_op, set_op, arg, OpCode::Decrement);
            return;
        }
        self.emit_with_operand(get_op, arg);
    }

    /// 后缀自增自减：留下旧值
    fn postfix_increment(&mut self, get_op: OpCode, set_op: OpCode, arg: u8, step: OpCode) {
        self.emit_with_operand(get_op, arg);
        self.emit_op(OpCode::Dup);
        self.emit_op(step);
        self.emit_with_operand(set_op, arg);
        self.emit_op(OpCode::Pop);
    }

    /// 前缀自增自减：留下新值，目标必须是变量名
    fn prefix_increment(&mut self, step: OpCode) {
        if !self.check_identifier() {
            self.error_at_current(messages::ERR_COMPILE_INVALID_INCREMENT, &[]);
            return;
        }
        self.advance();
        let name = self.previous.lexeme.clone();
        let (get_op, set_op, arg) = self.resolve_variable(&name);
        self.emit_with_operand(get_op, arg);
        self.emit_op(step);
        self.emit_with_operand(set_op, arg);
    }

    // ============ 表达式 ============

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix(can_assign) {
            self.error(messages::ERR_COMPILE_EXPECTED_EXPRESSION, &[]);
            return;
        }

        while precedence <= infix_precedence(&self.current.kind) {
            self.advance();
            self.infix(can_assign);
        }

        if can_assign && self.check_assignment_op() {
            self.advance();
            self.error(messages::ERR_COMPILE_INVALID_ASSIGNMENT, &[]);
        }
    }

    /// 前缀规则。返回 false 表示此处没有表达式
    fn prefix(&mut self, can_assign: bool) -> bool {
        match self.previous.kind.clone() {
            TokenKind::Number(n) => self.emit_constant(Value::Number(n)),
            TokenKind::String(s) => {
                let key = self.heap.intern(&s);
                self.emit_constant(Value::Obj(key));
            }
            TokenKind::Identifier(_) => {
                let name = self.previous.lexeme.clone();
                self.named_variable(&name, can_assign);
            }
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::LeftParen => {
                self.expression();
                self.consume(&TokenKind::RightParen, ")");
            }
            TokenKind::LeftBracket => self.list_literal(),
            TokenKind::Minus => {
                self.parse_precedence(Precedence::Unary);
                self.emit_op(OpCode::Negate);
            }
            TokenKind::Bang => {
                self.parse_precedence(Precedence::Unary);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Tilde => {
                self.parse_precedence(Precedence::Unary);
                self.emit_op(OpCode::BitwiseNot);
            }
            TokenKind::PlusPlus => self.prefix_increment(OpCode::Increment),
            TokenKind::MinusMinus => self.prefix_increment(OpCode::Decrement),
            TokenKind::This => self.this_expression(),
            TokenKind::Super => self.super_expression(),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, can_assign: bool) {
        match self.previous.kind.clone() {
            TokenKind::Plus => self.binary(Precedence::Term, &[OpCode::Add]),
            TokenKind::Minus => self.binary(Precedence::Term, &[OpCode::Subtract]),
            TokenKind::Star => self.binary(Precedence::Factor, &[OpCode::Multiply]),
            TokenKind::Slash => self.binary(Precedence::Factor, &[OpCode::Divide]),
            TokenKind::Percent => self.binary(Precedence::Factor, &[OpCode::Modulo]),
            TokenKind::EqualEqual => self.binary(Precedence::Equality, &[OpCode::Equal]),
            TokenKind::BangEqual => {
                self.binary(Precedence::Equality, &[OpCode::Equal, OpCode::Not])
            }
            TokenKind::Greater => self.binary(Precedence::Comparison, &[OpCode::Greater]),
            TokenKind::GreaterEqual => {
                self.binary(Precedence::Comparison, &[OpCode::Less, OpCode::Not])
            }
            TokenKind::Less => self.binary(Precedence::Comparison, &[OpCode::Less]),
            TokenKind::LessEqual => {
                self.binary(Precedence::Comparison, &[OpCode::Greater, OpCode::Not])
            }
            TokenKind::Amp => self.binary(Precedence::BitAnd, &[OpCode::BitwiseAnd]),
            TokenKind::Pipe => self.binary(Precedence::BitOr, &[OpCode::BitwiseOr]),
            TokenKind::Caret => self.binary(Precedence::BitXor, &[OpCode::BitwiseXor]),
            TokenKind::LessLess => {
                self.binary(Precedence::Shift, &[OpCode::BitwiseLeftShift])
            }
            TokenKind::GreaterGreater => {
                self.binary(Precedence::Shift, &[OpCode::BitwiseRightShift])
            }
            TokenKind::And => self.and_expression(),
            TokenKind::Or => self.or_expression(),
            TokenKind::LeftParen => {
                let argc = self.argument_list();
                self.emit_with_operand(OpCode::Call, argc);
            }
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::LeftBracket => self.subscript(can_assign),
            _ => unreachable!("no infix rule"),
        }
    }

    fn binary(&mut self, precedence: Precedence, ops: &[OpCode]) {
        self.parse_precedence(precedence.next());
        for &op in ops {
            self.emit_op(op);
        }
    }

    /// 短路与：左值为假时跳过右侧
    fn and_expression(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And.next());
        self.patch_jump(end_jump);
    }

    /// 短路或：左值为真时跳过右侧
    fn or_expression(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or.next());
        self.patch_jump(end_jump);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error(messages::ERR_COMPILE_TOO_MANY_ARGS, &[]);
                } else {
                    count += 1;
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, ")");
        count as u8
    }

    fn list_literal(&mut self) {
        let mut count: usize = 0;
        if !self.check(&TokenKind::RightBracket) {
            loop {
                self.expression();
                if count == 255 {
                    self.error(messages::ERR_COMPILE_TOO_MANY_LIST_ITEMS, &[]);
                } else {
                    count += 1;
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightBracket, "]");
        self.emit_with_operand(OpCode::BuildList, count as u8);
    }

    fn subscript(&mut self, can_assign: bool) {
        self.expression();
        self.consume(&TokenKind::RightBracket, "]");

        if can_assign && self.matches(&TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::StoreSubscr);
            return;
        }
        if can_assign {
            if let Some(binop) = self.match_compound_op() {
                self.emit_op(OpCode::DoubleDup);
                self.emit_op(OpCode::IndexSubscr);
                self.expression();
                self.emit_op(binop);
                self.emit_op(OpCode::StoreSubscr);
                return;
            }
        }
        if can_assign && self.matches(&TokenKind::PlusPlus) {
            self.emit_op(OpCode::DoubleDup);
            self.emit_op(OpCode::IndexSubscr);
            self.emit_op(OpCode::Increment);
            self.emit_op(OpCode::StoreSubscr);
            self.emit_op(OpCode::Decrement);
            return;
        }
        if can_assign && self.matches(&TokenKind::MinusMinus) {
            self.emit_op(OpCode::DoubleDup);
            self.emit_op(OpCode::IndexSubscr);
            self.emit_op(OpCode::Decrement);
            self.emit_op(OpCode::StoreSubscr);
            self.emit_op(OpCode::Increment);
            return;
        }
        self.emit_op(OpCode::IndexSubscr);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume_identifier("属性");
        let lexeme = self.previous.lexeme.clone();
        let name = self.identifier_constant(&lexeme);

        if can_assign && self.matches(&TokenKind::Equal) {
            self.expression();
            self.emit_with_operand(OpCode::SetProperty, name);
            return;
        }
        if can_assign {
            if let Some(binop) = self.match_compound_op() {
                self.emit_op(OpCode::Dup);
                self.emit_with_operand(OpCode::GetProperty, name);
                self.expression();
                self.emit_op(binop);
                self.emit_with_operand(OpCode::SetProperty, name);
                return;
            }
        }
        if can_assign && self.matches(&TokenKind::PlusPlus) {
            self.emit_op(OpCode::Dup);
            self.emit_with_operand(OpCode::GetProperty, name);
            self.emit_op(OpCode::Increment);
            self.emit_with_operand(OpCode::SetProperty, name);
            self.emit_op(OpCode::Decrement);
            return;
        }
        if can_assign && self.matches(&TokenKind::MinusMinus) {
            self.emit_op(OpCode::Dup);
            self.emit_with_operand(OpCode::GetProperty, name);
            self.emit_op(OpCode::Decrement);
            self.emit_with_operand(OpCode::SetProperty, name);
            self.emit_op(OpCode::Increment);
            return;
        }
        if self.matches(&TokenKind::LeftParen) {
            // 属性访问后紧跟调用：融合成方法调用，省一次绑定方法分配
            let argc = self.argument_list();
            self.emit_with_operand(OpCode::Invoke, name);
            self.emit_byte(argc);
            return;
        }
        self.emit_with_operand(OpCode::GetProperty, name);
    }

    fn this_expression(&mut self) {
        if self.classes.is_empty() {
            self.error(messages::ERR_COMPILE_THIS_OUTSIDE_CLASS, &[]);
            return;
        }
        self.named_variable("这", false);
    }

    fn super_expression(&mut self) {
        if self.classes.is_empty() {
            self.error(messages::ERR_COMPILE_SUPER_OUTSIDE_CLASS, &[]);
        } else if !self.classes.last().map(|c| c.has_superclass).unwrap_or(false) {
            self.error(messages::ERR_COMPILE_SUPER_NO_SUPERCLASS, &[]);
        }

        self.consume(&TokenKind::Dot, ".");
        self.consume_identifier("方法");
        let lexeme = self.previous.lexeme.clone();
        let name = self.identifier_constant(&lexeme);

        self.named_variable("这", false);
        if self.matches(&TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("超", false);
            self.emit_with_operand(OpCode::SuperInvoke, name);
            self.emit_byte(argc);
        } else {
            self.named_variable("超", false);
            self.emit_with_operand(OpCode::GetSuper, name);
        }
    }

    // ============ 语句 ============

    fn declaration(&mut self) {
        if self.matches(&TokenKind::Class) {
            self.class_declaration();
        } else if self.matches(&TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(&TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("变量");
        if self.matches(&TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(&TokenKind::Semicolon, ";");
        self.define_variable(global);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("功能");
        // 允许递归：函数体编译前就视为已初始化
        self.mark_initialized();
        self.function(FnKind::Function);
        self.define_variable(global);
    }

    /// 编译一个函数体并发出创建闭包的指令
    fn function(&mut self, kind: FnKind) {
        let name = self.previous.lexeme.clone();
        self.begin_context(kind, name);
        self.begin_scope();

        self.consume(&TokenKind::LeftParen, "(");
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.ctx.arity == u8::MAX {
                    self.error_at_current(messages::ERR_COMPILE_TOO_MANY_PARAMS, &[]);
                } else {
                    self.ctx.arity += 1;
                }
                let param = self.parse_variable("形参");
                self.define_variable(param);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, ")");
        self.consume(&TokenKind::LeftBrace, "{");
        self.block();

        let (function, upvalues) = self.end_context();
        let constant = self.make_constant(Value::Obj(function));
        self.emit_with_operand(OpCode::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index);
        }
    }

    fn class_declaration(&mut self) {
        self.consume_identifier("类");
        let class_name = self.previous.lexeme.clone();
        let name_constant = self.identifier_constant(&class_name);
        self.declare_variable(&class_name);

        self.emit_with_operand(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassCtx { has_superclass: false });

        if self.matches(&TokenKind::Less) {
            self.consume_identifier("超类");
            let superclass_name = self.previous.lexeme.clone();
            self.named_variable(&superclass_name, false);
            if class_name == superclass_name {
                self.error(messages::ERR_COMPILE_SELF_INHERIT, &[]);
            }

            // 超类存进一个合成局部变量，方法体里通过 upvalue 取到
            self.begin_scope();
            self.declare_variable("超");
            self.define_variable(0);

            self.named_variable(&class_name, false);
            self.emit_op(OpCode::Inherit);
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(&class_name, false);
        self.consume(&TokenKind::LeftBrace, "{");
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.method();
        }
        self.consume(&TokenKind::RightBrace, "}");
        self.emit_op(OpCode::Pop);

        if self.classes.last().map(|c| c.has_superclass).unwrap_or(false) {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume_identifier("方法");
        let lexeme = self.previous.lexeme.clone();
        let constant = self.identifier_constant(&lexeme);
        let kind = if lexeme == "初始化" {
            FnKind::Initializer
        } else {
            FnKind::Method
        };
        self.function(kind);
        self.emit_with_operand(OpCode::Method, constant);
    }

    fn statement(&mut self) {
        if self.matches(&TokenKind::Print) {
            self.print_statement();
        } else if self.matches(&TokenKind::If) {
            self.if_statement();
        } else if self.matches(&TokenKind::While) {
            self.while_statement();
        } else if self.matches(&TokenKind::For) {
            self.for_statement();
        } else if self.matches(&TokenKind::Return) {
            self.return_statement();
        } else if self.matches(&TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.declaration();
        }
        self.consume(&TokenKind::RightBrace, "}");
    }

    /// 打印语句降级为对全局本机功能「打印」的调用
    fn print_statement(&mut self) {
        let print_fn = self.identifier_constant("打印");
        self.emit_with_operand(OpCode::GetGlobal, print_fn);
        self.expression();
        self.consume(&TokenKind::Semicolon, ";");
        self.emit_with_operand(OpCode::Call, 1);
        self.emit_op(OpCode::Pop);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(&TokenKind::Semicolon, ";");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(&TokenKind::LeftParen, "(");
        self.expression();
        self.consume(&TokenKind::RightParen, ")");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.matches(&TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.ctx.chunk.code.len();
        self.consume(&TokenKind::LeftParen, "(");
        self.expression();
        self.consume(&TokenKind::RightParen, ")");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    /// C 风格三段循环
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(&TokenKind::LeftParen, "(");

        if self.matches(&TokenKind::Semicolon) {
            // 没有初始化子句
        } else if self.matches(&TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.ctx.chunk.code.len();
        let mut exit_jump = None;
        if !self.matches(&TokenKind::Semicolon) {
            self.expression();
            self.consume(&TokenKind::Semicolon, ";");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(&TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.ctx.chunk.code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(&TokenKind::RightParen, ")");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.ctx.kind == FnKind::Script {
            self.error(messages::ERR_COMPILE_RETURN_TOP_LEVEL, &[]);
        }

        if self.matches(&TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.ctx.kind == FnKind::Initializer {
                self.error(messages::ERR_COMPILE_RETURN_FROM_INIT, &[]);
            }
            self.expression();
            self.consume(&TokenKind::Semicolon, ";");
            self.emit_op(OpCode::Return);
        }
    }
}
