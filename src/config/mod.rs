use std::{env, str::FromStr, time::Duration};

use crate::{cache::RateLimitPolicy, cache::StoreOptions, error::ConfigError};

/// 受限流保护的路由类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicies {
    pub ai: RateLimitPolicy,
    pub updates: RateLimitPolicy,
    pub payment: RateLimitPolicy,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// 接口前缀，为空时挂在根路径
    pub api_base_uri: String,
    pub redis_url: String,
    pub redis_command_timeout_ms: u64,
    pub redis_connect_timeout_ms: u64,
    pub redis_connect_retries: u32,
    pub redis_cooldown_secs: u64,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    /// 信任 X-Real-IP / X-Forwarded-For，只应在可信反向代理之后开启
    pub trust_proxy_headers: bool,
    pub policies: RoutePolicies,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意变量来源读取配置，缺省项使用默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Config {
            server_host: string_or("SERVER_HOST", "0.0.0.0"),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            api_base_uri: base_uri(&string_or("API_BASE_URI", "/api")),
            redis_url: string_or("REDIS_URL", "redis://localhost:6379"),
            redis_command_timeout_ms: parse_or(&lookup, "REDIS_COMMAND_TIMEOUT_MS", 250)?,
            redis_connect_timeout_ms: parse_or(&lookup, "REDIS_CONNECT_TIMEOUT_MS", 500)?,
            redis_connect_retries: parse_or(&lookup, "REDIS_CONNECT_RETRIES", 3)?,
            redis_cooldown_secs: parse_or(&lookup, "REDIS_COOLDOWN_SECS", 5)?,
            jwt_secret: lookup("AUTH_JWT_SECRET").unwrap_or_default(),
            jwt_audience: lookup("AUTH_JWT_AUDIENCE").filter(|v| !v.trim().is_empty()),
            trust_proxy_headers: parse_or(&lookup, "TRUST_PROXY_HEADERS", false)?,
            policies: RoutePolicies {
                ai: policy(&lookup, "AI_RATE_LIMIT_REQUESTS", 10, "AI_RATE_LIMIT_WINDOW", 60)?,
                updates: policy(
                    &lookup,
                    "UPDATES_RATE_LIMIT_REQUESTS",
                    30,
                    "UPDATES_RATE_LIMIT_WINDOW",
                    60,
                )?,
                payment: policy(
                    &lookup,
                    "PAYMENT_RATE_LIMIT_REQUESTS",
                    5,
                    "PAYMENT_RATE_LIMIT_WINDOW",
                    60,
                )?,
            },
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            command_timeout: Duration::from_millis(self.redis_command_timeout_ms),
            connect_timeout: Duration::from_millis(self.redis_connect_timeout_ms),
            connect_retries: self.redis_connect_retries,
            cooldown: Duration::from_secs(self.redis_cooldown_secs),
        }
    }
}

/// 统一为 `/segment` 形式，根路径为空串
fn base_uri(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

/// 窗口时长，允许 `120s` 这种写法
fn parse_window<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => {
            let trimmed = raw.trim();
            trimmed
                .strip_suffix('s')
                .unwrap_or(trimmed)
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value: raw })
        }
    }
}

fn policy<F>(
    lookup: &F,
    requests_var: &'static str,
    default_requests: u32,
    window_var: &'static str,
    default_window: u64,
) -> Result<RateLimitPolicy, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    RateLimitPolicy::new(
        parse_or(lookup, requests_var, default_requests)?,
        parse_window(lookup, window_var, default_window)?,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.policies.ai, RateLimitPolicy::new(10, 60).unwrap());
        assert_eq!(config.policies.payment.limit(), 5);
        assert!(!config.trust_proxy_headers);
        assert!(config.jwt_audience.is_none());
    }

    #[test]
    fn route_policies_are_read() {
        let config = config_from(&[
            ("AI_RATE_LIMIT_REQUESTS", "3"),
            ("AI_RATE_LIMIT_WINDOW", "120s"),
            ("UPDATES_RATE_LIMIT_REQUESTS", "0"),
        ])
        .unwrap();
        assert_eq!(config.policies.ai, RateLimitPolicy::new(3, 120).unwrap());
        assert_eq!(config.policies.updates.limit(), 0);
    }

    #[test]
    fn base_uri_is_normalized() {
        assert_eq!(config_from(&[("API_BASE_URI", "v1/")]).unwrap().api_base_uri, "/v1");
        assert_eq!(config_from(&[("API_BASE_URI", "/")]).unwrap().api_base_uri, "");
        assert_eq!(config_from(&[]).unwrap().api_base_uri, "/api");
    }

    #[test]
    fn zero_window_fails_at_startup() {
        let err = config_from(&[("PAYMENT_RATE_LIMIT_WINDOW", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy(_)));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = config_from(&[("SERVER_PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "SERVER_PORT",
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn seconds_suffix_only_applies_to_windows() {
        let err = config_from(&[("SERVER_PORT", "3000s")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "SERVER_PORT",
                value: "3000s".into()
            }
        );

        let err = config_from(&[("REDIS_CONNECT_RETRIES", "3s")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "REDIS_CONNECT_RETRIES", .. }));

        let err = config_from(&[("AI_RATE_LIMIT_WINDOW", "ten")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "AI_RATE_LIMIT_WINDOW",
                value: "ten".into()
            }
        );
    }

    #[test]
    fn proxy_headers_are_opt_in() {
        assert!(config_from(&[("TRUST_PROXY_HEADERS", "true")]).unwrap().trust_proxy_headers);
        assert!(!config_from(&[("TRUST_PROXY_HEADERS", "false")]).unwrap().trust_proxy_headers);
    }
}
