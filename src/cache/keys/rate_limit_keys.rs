use std::fmt;

/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 请求方身份，用于划分限流桶
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    /// 已认证用户
    User(String),
    /// 未认证请求的网络地址
    Address(String),
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::User(id) => write!(f, "user:{}", id),
            Caller::Address(addr) => write!(f, "ip:{}", addr),
        }
    }
}

impl Caller {
    pub fn kind(&self) -> &'static str {
        match self {
            Caller::User(_) => "user",
            Caller::Address(_) => "ip",
        }
    }
}

/// 限流键，格式为 `<caller>:<namespace>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(caller: &Caller, namespace: &str) -> Self {
        Self(format!("{}:{}", caller, namespace))
    }

    /// 直接使用调用方给出的唯一标识
    pub fn from_token(unique_token: impl Into<String>) -> Self {
        Self(unique_token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 生成计数器在存储中的键
pub fn rate_limit_key(key: &RateLimitKey) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, key.as_str())
}
