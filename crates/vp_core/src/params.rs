// crates/vp_core/src/params.rs

//! 类型化键值参数表
//!
//! 每个子系统（FFT、求解器、负载均衡器）各持有一份
//! [`ParameterList`]，在初始化时校验。语义约定：
//!
//! - `add`: 新增或覆盖一个键
//! - `update`: 按另一份参数表更新，遇到本表不存在的键报错
//! - `merge`: 合并另一份参数表，冲突时覆盖本表
//!
//! 识别的键与取值见各子系统的 `default_parameters`。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 参数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// 布尔
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点
    Float(f64),
    /// 字符串
    Str(String),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}
impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}
impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}
impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// 可从参数值取出的类型
pub trait FromParam: Sized {
    /// 类型名（用于错误信息）
    const TYPE_NAME: &'static str;

    /// 尝试转换
    fn from_param(value: &ParamValue) -> Option<Self>;
}

impl FromParam for bool {
    const TYPE_NAME: &'static str = "bool";
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromParam for i64 {
    const TYPE_NAME: &'static str = "int";
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromParam for usize {
    const TYPE_NAME: &'static str = "usize";
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }
}

impl FromParam for f64 {
    const TYPE_NAME: &'static str = "float";
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Float(x) => Some(*x),
            // 整数到浮点的宽化是安全的
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromParam for String {
    const TYPE_NAME: &'static str = "string";
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// 类型化参数表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterList {
    entries: BTreeMap<String, ParamValue>,
}

impl ParameterList {
    /// 创建空参数表
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增或覆盖一个键
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// 是否包含键
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 取出键值，缺失或类型不符时报错
    pub fn get<T: FromParam>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self.entries.get(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })?;
        T::from_param(value).ok_or(ConfigError::WrongType {
            key: key.to_string(),
            expected: T::TYPE_NAME,
        })
    }

    /// 取出键值，缺失时返回默认值
    pub fn get_or<T: FromParam>(&self, key: &str, default: T) -> T {
        self.entries
            .get(key)
            .and_then(T::from_param)
            .unwrap_or(default)
    }

    /// 按另一份参数表更新本表
    ///
    /// 另一份表中的每个键都必须已存在于本表，否则报
    /// [`ConfigError::UnknownKey`]。
    pub fn update(&mut self, other: &ParameterList) -> Result<(), ConfigError> {
        for key in other.entries.keys() {
            if !self.entries.contains_key(key) {
                return Err(ConfigError::UnknownKey { key: key.clone() });
            }
        }
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    /// 合并另一份参数表，冲突时以另一份为准
    pub fn merge(&mut self, other: &ParameterList) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_get() {
        let mut p = ParameterList::new();
        p.add("use_pencils", true)
            .add("r2c_direction", 0usize)
            .add("tolerance", 1e-10)
            .add("comm", "p2p_pl");

        assert!(p.get::<bool>("use_pencils").unwrap());
        assert_eq!(p.get::<usize>("r2c_direction").unwrap(), 0);
        assert!((p.get::<f64>("tolerance").unwrap() - 1e-10).abs() < 1e-20);
        assert_eq!(p.get::<String>("comm").unwrap(), "p2p_pl");
    }

    #[test]
    fn test_missing_key() {
        let p = ParameterList::new();
        let err = p.get::<bool>("nope").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn test_wrong_type() {
        let mut p = ParameterList::new();
        p.add("flag", true);
        let err = p.get::<f64>("flag").unwrap_err();
        assert!(matches!(err, ConfigError::WrongType { .. }));
    }

    #[test]
    fn test_int_widens_to_float() {
        let mut p = ParameterList::new();
        p.add("alpha", 2i64);
        assert_eq!(p.get::<f64>("alpha").unwrap(), 2.0);
    }

    #[test]
    fn test_update_rejects_unknown() {
        let mut base = ParameterList::new();
        base.add("threshold", 1.0);

        let mut patch = ParameterList::new();
        patch.add("threshold", 1.5);
        assert!(base.update(&patch).is_ok());
        assert_eq!(base.get::<f64>("threshold").unwrap(), 1.5);

        let mut bad = ParameterList::new();
        bad.add("unknown_key", 1.0);
        assert!(matches!(
            base.update(&bad),
            Err(ConfigError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut base = ParameterList::new();
        base.add("a", 1i64);

        let mut other = ParameterList::new();
        other.add("a", 2i64).add("b", 3i64);

        base.merge(&other);
        assert_eq!(base.get::<i64>("a").unwrap(), 2);
        assert_eq!(base.get::<i64>("b").unwrap(), 3);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut p = ParameterList::new();
        p.add("output_type", "SOL_AND_GRAD").add("use_reorder", false);
        let json = serde_json::to_string(&p).unwrap();
        let back: ParameterList = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
