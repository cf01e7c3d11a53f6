//! 环形缓冲区 sink：满了覆盖最旧记录，用于崩溃转储

use crate::logger::LogSink;
use crate::record::Record;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Inner {
    records: VecDeque<Record>,
    capacity: usize,
    dropped: usize,
}

/// 环形缓冲区（克隆得到共享同一缓冲区的句柄）
#[derive(Clone)]
pub struct LogRingBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl LogRingBuffer {
    /// 创建容量为 `capacity` 的缓冲区
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
                dropped: 0,
            })),
        }
    }

    /// 导出所有记录（从旧到新）
    pub fn dump_records(&self) -> Vec<Record> {
        self.lock().records.iter().cloned().collect()
    }

    /// 导出为多行文本
    pub fn dump(&self) -> String {
        self.dump_records()
            .iter()
            .map(Record::format)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 清空缓冲区
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.records.clear();
        inner.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// 被覆盖的记录数
    pub fn dropped_count(&self) -> usize {
        self.lock().dropped
    }

    /// 持锁线程 panic 后记录仍然有效
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for LogRingBuffer {
    fn write(&self, record: &Record) {
        let mut inner = self.lock();
        if inner.records.len() == inner.capacity {
            inner.records.pop_front();
            inner.dropped += 1;
        }
        inner.records.push_back(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;

    #[test]
    fn test_overwrite_oldest() {
        let ring = LogRingBuffer::new(2);
        for i in 0..3 {
            ring.write(&Record::new(Level::Info, "t", format!("m{i}")));
        }
        let records = ring.dump_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "m1");
        assert_eq!(records[1].message, "m2");
        assert_eq!(ring.dropped_count(), 1);
    }

    #[test]
    fn test_poisoned_lock_keeps_records() {
        let ring = LogRingBuffer::new(4);
        ring.write(&Record::new(Level::Error, "t", "before"));

        let inner = Arc::clone(&ring.inner);
        let poisoner = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("writer died");
        });
        assert!(poisoner.join().is_err());
        assert!(ring.inner.is_poisoned());

        ring.write(&Record::new(Level::Error, "t", "after"));
        let messages: Vec<_> = ring.dump_records().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["before", "after"]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_clones_share_storage() {
        let ring = LogRingBuffer::new(4);
        let handle = ring.clone();
        handle.write(&Record::new(Level::Warn, "t", "shared"));
        assert_eq!(ring.len(), 1);
        ring.clear();
        assert!(handle.is_empty());
    }
}
