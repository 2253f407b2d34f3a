//! 哈希表
//!
//! 开放寻址加线性探测，负载因子不超过 3/4，删除留墓碑。
//! 键是驻留字符串的对象索引，比较标识即可；哈希随键一起存放。
//! 空桶：无键加空值；墓碑：无键加真值。

use super::object::ObjKey;
use super::value::Value;

const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

/// FNV-1a 哈希（对 UTF-8 字节）
pub fn hash_string(s: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Debug, Clone)]
struct Entry {
    key: Option<ObjKey>,
    hash: u32,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Entry { key: None, hash: 0, value: Value::Nil }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && matches!(self.value, Value::Bool(true))
    }
}

/// 字符串键哈希表
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// 已用桶数（含墓碑）
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// 活跃键值对个数
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.key.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 近似占用字节数
    pub fn byte_size(&self) -> usize {
        self.entries.capacity() * std::mem::size_of::<Entry>()
    }

    /// 查找键对应的值
    pub fn get(&self, key: ObjKey, hash: u32) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.find_slot(key, hash)?;
        Some(self.entries[index].value)
    }

    /// 插入或覆盖。返回 true 表示是新键
    pub fn set(&mut self, key: ObjKey, hash: u32, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DEN > self.entries.len() * MAX_LOAD_NUM {
            self.grow();
        }

        let index = self.probe(key, hash);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        // 复用墓碑时桶数不增加
        if is_new && !entry.is_tombstone() {
            self.count += 1;
        }
        *entry = Entry { key: Some(key), hash, value };
        is_new
    }

    /// 删除键。返回 true 表示键存在
    pub fn delete(&mut self, key: ObjKey, hash: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        match self.find_slot(key, hash) {
            Some(index) => {
                // 留下墓碑
                self.entries[index] = Entry { key: None, hash: 0, value: Value::Bool(true) };
                true
            }
            None => false,
        }
    }

    /// 把本表的所有键值对复制到另一个表（继承用）
    pub fn add_all_to(&self, target: &mut Table) {
        for entry in &self.entries {
            if let Some(key) = entry.key {
                target.set(key, entry.hash, entry.value);
            }
        }
    }

    /// 遍历活跃键值对
    pub fn iter(&self) -> impl Iterator<Item = (ObjKey, u32, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.hash, e.value)))
    }

    /// 按哈希和内容谓词查找键（字符串驻留探测用）
    pub fn find_key<F: Fn(ObjKey) -> bool>(&self, hash: u32, eq: F) -> Option<ObjKey> {
        if self.entries.is_empty() {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    // 真正的空桶结束探测，墓碑继续
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key) => {
                    if entry.hash == hash && eq(key) {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// 删除所有未通过存活判断的键（GC 清扫前对驻留表调用）
    pub fn remove_unmarked<F: Fn(ObjKey) -> bool>(&mut self, is_marked: F) {
        for index in 0..self.entries.len() {
            if let Some(key) = self.entries[index].key {
                if !is_marked(key) {
                    self.entries[index] =
                        Entry { key: None, hash: 0, value: Value::Bool(true) };
                }
            }
        }
    }

    /// 已有键的探测：返回槽位索引
    fn find_slot(&self, key: ObjKey, hash: u32) -> Option<usize> {
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(k) if k == key => return Some(index),
                Some(_) => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// 插入位置探测：返回匹配键的槽位或第一个可用槽位
    fn probe(&self, key: ObjKey, hash: u32) -> usize {
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if entry.is_tombstone() {
                        if tombstone.is_none() {
                            tombstone = Some(index);
                        }
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(k) if k == key => return index,
                Some(_) => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// 扩容并重哈希（丢弃墓碑）
    fn grow(&mut self) {
        let new_cap = if self.entries.is_empty() { 8 } else { self.entries.len() * 2 };
        let old = std::mem::replace(&mut self.entries, vec![Entry::empty(); new_cap]);
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let mask = self.entries.len() - 1;
                let mut index = entry.hash as usize & mask;
                while self.entries[index].key.is_some() {
                    index = (index + 1) & mask;
                }
                self.entries[index] = Entry { key: Some(key), hash: entry.hash, value: entry.value };
                self.count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> (SlotMap<ObjKey, ()>, Vec<ObjKey>) {
        let mut arena: SlotMap<ObjKey, ()> = SlotMap::with_key();
        let keys: Vec<ObjKey> = (0..n).map(|_| arena.insert(())).collect();
        (arena, keys)
    }

    #[test]
    fn test_set_get_delete() {
        let (_arena, ks) = keys(3);
        let mut table = Table::new();

        assert!(table.set(ks[0], 1, Value::Number(10.0)));
        assert!(table.set(ks[1], 2, Value::Number(20.0)));
        // 覆盖不是新键
        assert!(!table.set(ks[0], 1, Value::Number(11.0)));

        assert_eq!(table.get(ks[0], 1), Some(Value::Number(11.0)));
        assert_eq!(table.get(ks[1], 2), Some(Value::Number(20.0)));
        assert_eq!(table.get(ks[2], 3), None);

        assert!(table.delete(ks[0], 1));
        assert!(!table.delete(ks[0], 1));
        assert_eq!(table.get(ks[0], 1), None);
        assert_eq!(table.get(ks[1], 2), Some(Value::Number(20.0)));
    }

    #[test]
    fn test_tombstone_reuse_after_delete() {
        let (_arena, ks) = keys(2);
        let mut table = Table::new();

        // 同一哈希强制探测链经过墓碑
        table.set(ks[0], 7, Value::Number(1.0));
        table.set(ks[1], 7, Value::Number(2.0));
        table.delete(ks[0], 7);
        assert_eq!(table.get(ks[1], 7), Some(Value::Number(2.0)));

        table.set(ks[0], 7, Value::Number(3.0));
        assert_eq!(table.get(ks[0], 7), Some(Value::Number(3.0)));
        assert_eq!(table.get(ks[1], 7), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_growth_keeps_entries() {
        let (_arena, ks) = keys(100);
        let mut table = Table::new();
        for (i, &k) in ks.iter().enumerate() {
            table.set(k, i as u32, Value::Number(i as f64));
        }
        for (i, &k) in ks.iter().enumerate() {
            assert_eq!(table.get(k, i as u32), Some(Value::Number(i as f64)));
        }
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn test_add_all_to() {
        let (_arena, ks) = keys(4);
        let mut from = Table::new();
        let mut to = Table::new();
        from.set(ks[0], 1, Value::Number(1.0));
        from.set(ks[1], 2, Value::Number(2.0));
        to.set(ks[1], 2, Value::Number(9.0));

        from.add_all_to(&mut to);
        assert_eq!(to.get(ks[0], 1), Some(Value::Number(1.0)));
        // 复制覆盖目标表的已有值
        assert_eq!(to.get(ks[1], 2), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_remove_unmarked() {
        let (_arena, ks) = keys(3);
        let mut table = Table::new();
        for (i, &k) in ks.iter().enumerate() {
            table.set(k, i as u32, Value::Nil);
        }
        let keep = ks[1];
        table.remove_unmarked(|k| k == keep);
        assert_eq!(table.get(ks[0], 0), None);
        assert_eq!(table.get(ks[1], 1), Some(Value::Nil));
        assert_eq!(table.get(ks[2], 2), None);
    }

    proptest! {
        /// 与标准哈希表对照的模型测试
        #[test]
        fn prop_behaves_like_hashmap(ops in proptest::collection::vec((0u8..3, 0usize..16, any::<f64>()), 0..200)) {
            let (_arena, ks) = keys(16);
            let mut table = Table::new();
            let mut model: std::collections::HashMap<ObjKey, Value> = std::collections::HashMap::new();

            for (op, slot, num) in ops {
                let key = ks[slot];
                // 哈希刻意取模 4，制造大量碰撞
                let hash = (slot % 4) as u32;
                match op {
                    0 => {
                        let value = Value::Number(if num.is_nan() { 0.0 } else { num });
                        table.set(key, hash, value);
                        model.insert(key, value);
                    }
                    1 => {
                        table.delete(key, hash);
                        model.remove(&key);
                    }
                    _ => {
                        prop_assert_eq!(table.get(key, hash), model.get(&key).copied());
                    }
                }
            }

            for (slot, &key) in ks.iter().enumerate() {
                let hash = (slot % 4) as u32;
                prop_assert_eq!(table.get(key, hash), model.get(&key).copied());
            }
            prop_assert_eq!(table.len(), model.len());
        }
    }

    #[test]
    fn test_hash_string_known_values() {
        // FNV-1a 基准：空串得到偏移基数
        assert_eq!(hash_string(""), 2166136261);
        assert_ne!(hash_string("甲"), hash_string("乙"));
    }
}
