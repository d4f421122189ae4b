//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象。此处提供版本号 `Version`，
//! 用于乐观并发控制：信封版本从 1 起连续递增，0 表示全新实体。
//!

use serde::{Deserialize, Serialize};

/// 版本号（用于乐观锁和并发控制）
///
/// 提供类型安全的版本号操作，避免直接使用 usize 导致的语义不明确问题。
///
/// # 示例
///
/// ```
/// use esrun::value_object::Version;
///
/// let v1 = Version::new();
/// assert_eq!(v1.value(), 0);
/// assert!(v1.is_new());
///
/// let v2 = v1.next();
/// assert_eq!(v2.value(), 1);
/// assert!(!v2.is_new());
///
/// assert!(v2 > v1);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(usize);

impl Version {
    /// 创建初始版本（版本号为 0）
    pub const fn new() -> Self {
        Self(0)
    }

    /// 从值创建版本号
    ///
    /// # 示例
    ///
    /// ```
    /// use esrun::value_object::Version;
    ///
    /// let v = Version::from_value(5);
    /// assert_eq!(v.value(), 5);
    /// ```
    pub const fn from_value(value: usize) -> Self {
        Self(value)
    }

    /// 获取下一个版本号
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 前进 `n` 个版本（一批事件持久化成功后提交）
    ///
    /// # 示例
    ///
    /// ```
    /// use esrun::value_object::Version;
    ///
    /// let v = Version::from_value(2).advance(3);
    /// assert_eq!(v.value(), 5);
    /// ```
    pub fn advance(&self, n: usize) -> Self {
        Self(self.0 + n)
    }

    /// 获取版本号的值
    pub const fn value(&self) -> usize {
        self.0
    }

    /// 检查是否为初始版本
    pub fn is_new(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::Version;

    #[test]
    fn version_ordering_and_advance() {
        let v0 = Version::new();
        assert!(v0.is_new());

        let v1 = v0.next();
        let v4 = v1.advance(3);
        assert_eq!(v4.value(), 4);
        assert!(v4 > v1 && v1 > v0);
        assert_eq!(Version::from_value(4), v4);
    }
}
