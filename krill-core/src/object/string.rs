//! 字符串对象：不可变字节序列，末尾带 NUL 以便与 C 接口交互

/// 字符串对象
#[derive(Debug)]
pub struct StringObj {
    // 内容 + 结尾的 '\0'
    data: Box<str>,
}

impl StringObj {
    pub fn new(s: &str) -> Self {
        let mut data = String::with_capacity(s.len() + 1);
        data.push_str(s);
        data.push('\0');
        Self {
            data: data.into_boxed_str(),
        }
    }

    /// 字节长度（不含结尾 NUL）
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.data[..self.len()]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }

    /// 含结尾 NUL 的字节
    #[inline]
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        self.data.as_bytes()
    }
}
