//! 垃圾回收器
//!
//! 三色标记清除。对象保存在类型化竞技场（slotmap）里，每个条目带
//! 标记位和字节数估计；清扫遍历竞技场，等价于原始设计里串起全部
//! 对象的侵入式链表。分配量越过水位线时由虚拟机标记根集并触发回收。

use humansize::{format_size, BINARY};
use slotmap::SlotMap;

use super::object::{Obj, ObjKey, QiStr};
use super::table::Table;
use super::value::Value;
use crate::config;

/// 首次触发回收的分配水位线
const FIRST_GC_AT: usize = 1024 * 1024;

struct HeapEntry {
    marked: bool,
    size: usize,
    obj: Obj,
}

/// 对象堆
pub struct Heap {
    objects: SlotMap<ObjKey, HeapEntry>,
    /// 字符串驻留表（键即字符串对象，值恒为空）
    strings: Table,
    /// 灰色工作列表
    gray: Vec<ObjKey>,
    bytes_allocated: usize,
    next_gc: usize,
    /// 回收开关。编译期与虚拟机引导期间关闭，
    /// 避免尚未扎根的半成品对象被回收。
    enabled: bool,
    log_gc: bool,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
            strings: Table::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: FIRST_GC_AT,
            enabled: false,
            log_gc: config::log_gc(),
        }
    }

    /// 打开或关闭回收
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// 分配量是否越过水位线
    pub fn should_collect(&self) -> bool {
        self.enabled && self.bytes_allocated > self.next_gc
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// 存活对象个数
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub(crate) fn set_next_gc(&mut self, bytes: usize) {
        self.next_gc = bytes;
    }

    // ============ 分配 ============

    /// 分配一个对象
    pub fn alloc(&mut self, obj: Obj) -> ObjKey {
        let size = obj.size_estimate();
        self.bytes_allocated += size;
        let key = self.objects.insert(HeapEntry { marked: false, size, obj });
        if self.log_gc {
            eprintln!(
                "gc: 分配 {}（{}）",
                format_size(size, BINARY),
                self.objects[key].obj.type_name()
            );
        }
        key
    }

    /// 驻留一个字符串
    ///
    /// 先按哈希加内容探测驻留表；命中时丢弃新文本返回旧对象，
    /// 否则分配新对象并登记。内容相等的活动字符串必定同一对象。
    pub fn intern(&mut self, text: &str) -> ObjKey {
        let hash = super::table::hash_string(text);
        let objects = &self.objects;
        if let Some(existing) = self
            .strings
            .find_key(hash, |key| match &objects[key].obj {
                Obj::String(s) => s.text == text,
                _ => false,
            })
        {
            return existing;
        }

        let key = self.alloc(Obj::String(QiStr::new(text.to_string())));
        self.strings.set(key, hash, Value::Nil);
        key
    }

    // ============ 访问器 ============

    pub fn get(&self, key: ObjKey) -> &Obj {
        &self.objects[key].obj
    }

    pub fn get_mut(&mut self, key: ObjKey) -> &mut Obj {
        &mut self.objects[key].obj
    }

    pub fn string(&self, key: ObjKey) -> &QiStr {
        match &self.objects[key].obj {
            Obj::String(s) => s,
            _ => unreachable!("not a string"),
        }
    }

    pub fn function(&self, key: ObjKey) -> &super::object::Function {
        match &self.objects[key].obj {
            Obj::Function(f) => f,
            _ => unreachable!("not a function"),
        }
    }

    pub fn closure(&self, key: ObjKey) -> &super::object::Closure {
        match &self.objects[key].obj {
            Obj::Closure(c) => c,
            _ => unreachable!("not a closure"),
        }
    }

    pub fn closure_mut(&mut self, key: ObjKey) -> &mut super::object::Closure {
        match &mut self.objects[key].obj {
            Obj::Closure(c) => c,
            _ => unreachable!("not a closure"),
        }
    }

    pub fn upvalue(&self, key: ObjKey) -> &super::object::Upvalue {
        match &self.objects[key].obj {
            Obj::Upvalue(u) => u,
            _ => unreachable!("not an upvalue"),
        }
    }

    pub fn upvalue_mut(&mut self, key: ObjKey) -> &mut super::object::Upvalue {
        match &mut self.objects[key].obj {
            Obj::Upvalue(u) => u,
            _ => unreachable!("not an upvalue"),
        }
    }

    pub fn class(&self, key: ObjKey) -> &super::object::Class {
        match &self.objects[key].obj {
            Obj::Class(c) => c,
            _ => unreachable!("not a class"),
        }
    }

    pub fn class_mut(&mut self, key: ObjKey) -> &mut super::object::Class {
        match &mut self.objects[key].obj {
            Obj::Class(c) => c,
            _ => unreachable!("not a class"),
        }
    }

    pub fn instance(&self, key: ObjKey) -> &super::object::Instance {
        match &self.objects[key].obj {
            Obj::Instance(i) => i,
            _ => unreachable!("not an instance"),
        }
    }

    pub fn instance_mut(&mut self, key: ObjKey) -> &mut super::object::Instance {
        match &mut self.objects[key].obj {
            Obj::Instance(i) => i,
            _ => unreachable!("not an instance"),
        }
    }

    pub fn list(&self, key: ObjKey) -> &super::object::List {
        match &self.objects[key].obj {
            Obj::List(l) => l,
            _ => unreachable!("not a list"),
        }
    }

    pub fn list_mut(&mut self, key: ObjKey) -> &mut super::object::List {
        match &mut self.objects[key].obj {
            Obj::List(l) => l,
            _ => unreachable!("not a list"),
        }
    }

    /// 值的类型名（诊断消息用）
    pub fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::Nil => "空",
            Value::Bool(_) => "布尔",
            Value::Number(_) => "数字",
            Value::Obj(key) => self.get(key).type_name(),
        }
    }

    /// 值的显示文本
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(key) => match self.get(key) {
                Obj::String(s) => s.text.clone(),
                Obj::Function(f) => self.format_function_name(f.name),
                Obj::Closure(c) => {
                    self.format_function_name(self.function(c.function).name)
                }
                Obj::Upvalue(_) => "上值".to_string(),
                Obj::Native(_) => "<本机功能>".to_string(),
                Obj::Class(c) => self.string(c.name).text.clone(),
                Obj::Instance(i) => {
                    format!("{} 实例", self.string(self.class(i.class).name).text)
                }
                Obj::BoundMethod(b) => self.format_value(Value::Obj(b.method)),
                Obj::List(l) => {
                    let items: Vec<String> =
                        l.items.iter().map(|&v| self.format_value(v)).collect();
                    format!("[{}]", items.join(", "))
                }
            },
        }
    }

    fn format_function_name(&self, name: Option<ObjKey>) -> String {
        match name {
            Some(n) => format!("<功能 {}>", self.string(n).text),
            None => "<脚本>".to_string(),
        }
    }

    // ============ 标记 ============

    /// 标记一个对象为根或可达
    pub fn mark_object(&mut self, key: ObjKey) {
        let entry = &mut self.objects[key];
        if entry.marked {
            return;
        }
        entry.marked = true;
        self.gray.push(key);
    }

    /// 标记一个值
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(key) = value {
            self.mark_object(key);
        }
    }

    /// 标记一张表的所有键和值
    pub fn mark_table(&mut self, table: &Table) {
        for (key, _, value) in table.iter() {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// 判断对象是否已标记
    pub fn is_marked(&self, key: ObjKey) -> bool {
        self.objects[key].marked
    }

    /// 根集标记完成后执行：追踪、清理驻留表、清扫
    pub fn collect(&mut self) {
        let before = self.bytes_allocated;
        if self.log_gc {
            eprintln!("gc: 开始回收");
        }

        self.trace_references();

        // 清扫前先把未标记的键从驻留表里摘掉，
        // 否则它们会在下个周期被驻留表复活。
        let objects = &self.objects;
        self.strings.remove_unmarked(|key| objects[key].marked);

        self.sweep();

        self.next_gc = self.bytes_allocated * config::GC_HEAP_GROW_FACTOR;
        if self.log_gc {
            eprintln!(
                "gc: 回收 {}（{} -> {}），下次水位线 {}",
                format_size(before - self.bytes_allocated, BINARY),
                format_size(before, BINARY),
                format_size(self.bytes_allocated, BINARY),
                format_size(self.next_gc, BINARY),
            );
        }
    }

    /// 处理灰色工作列表直到为空
    fn trace_references(&mut self) {
        while let Some(key) = self.gray.pop() {
            self.blacken(key);
        }
    }

    /// 按对象变体标记其子引用
    fn blacken(&mut self, key: ObjKey) {
        let mut child_objs: Vec<ObjKey> = Vec::new();
        let mut child_vals: Vec<Value> = Vec::new();

        match &self.objects[key].obj {
            Obj::String(_) | Obj::Native(_) => {}
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    child_objs.push(name);
                }
                child_vals.extend(f.chunk.constants.iter().copied());
            }
            Obj::Closure(c) => {
                child_objs.push(c.function);
                child_objs.extend(c.upvalues.iter().copied());
            }
            Obj::Upvalue(u) => {
                if let super::object::Upvalue::Closed(v) = u {
                    child_vals.push(*v);
                }
            }
            Obj::Class(c) => {
                child_objs.push(c.name);
                for (k, _, v) in c.methods.iter() {
                    child_objs.push(k);
                    child_vals.push(v);
                }
            }
            Obj::Instance(i) => {
                child_objs.push(i.class);
                for (k, _, v) in i.fields.iter() {
                    child_objs.push(k);
                    child_vals.push(v);
                }
            }
            Obj::BoundMethod(b) => {
                child_vals.push(b.receiver);
                child_objs.push(b.method);
            }
            Obj::List(l) => {
                child_vals.extend(l.items.iter().copied());
            }
        }

        for k in child_objs {
            self.mark_object(k);
        }
        for v in child_vals {
            self.mark_value(v);
        }
    }

    /// 清扫：释放未标记对象，存活对象清掉标记进入下个周期
    fn sweep(&mut self) {
        let log_gc = self.log_gc;
        let mut freed_bytes = 0usize;
        self.objects.retain(|_, entry| {
            if entry.marked {
                entry.marked = false;
                true
            } else {
                freed_bytes += entry.size;
                if log_gc {
                    eprintln!("gc: 释放 {}", entry.obj.type_name());
                }
                false
            }
        });
        self.bytes_allocated -= freed_bytes;
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// 按 C 的 %g 风格格式化数字：整数值不带小数点
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if n == n.trunc() && n.abs() < 1e16 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::object::List;

    #[test]
    fn test_intern_dedup() {
        let mut heap = Heap::new();
        let a = heap.intern("你好");
        let b = heap.intern("你好");
        let c = heap.intern("再见");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.string(a).text, "你好");
        assert_eq!(heap.string(a).char_len, 2);
    }

    #[test]
    fn test_collect_frees_unreachable() {
        let mut heap = Heap::new();
        heap.set_enabled(true);

        let kept = heap.intern("留下");
        let _doomed = heap.intern("丢弃");
        assert_eq!(heap.object_count(), 2);

        heap.mark_object(kept);
        heap.collect();

        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.string(kept).text, "留下");
        // 驻留表同步收缩：重新驻留会得到新对象
        let again = heap.intern("丢弃");
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.string(again).text, "丢弃");
    }

    #[test]
    fn test_collect_traces_children() {
        let mut heap = Heap::new();
        heap.set_enabled(true);

        let s = heap.intern("元素");
        let list = heap.alloc(Obj::List(List { items: vec![Value::Obj(s)] }));

        heap.mark_object(list);
        heap.collect();

        // 列表和它引用的字符串都存活
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.string(s).text, "元素");
    }

    #[test]
    fn test_bytes_accounting() {
        let mut heap = Heap::new();
        heap.set_enabled(true);
        let before = heap.bytes_allocated();
        heap.intern("一些文本");
        assert!(heap.bytes_allocated() > before);

        heap.collect();
        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.bytes_allocated(), before);
    }

    #[test]
    fn test_interned_survivor_still_deduplicates() {
        let mut heap = Heap::new();
        heap.set_enabled(true);
        let a = heap.intern("共享");
        heap.mark_object(a);
        heap.collect();
        let b = heap.intern("共享");
        assert_eq!(a, b);
    }
}
