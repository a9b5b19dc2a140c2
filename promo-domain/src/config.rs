//! 投递配置（DispatchConfig）
//!
//! 加载顺序：默认值 → 可选 TOML 文件 → `PROMO_*` 环境变量，最后统一校验。
//!
use crate::dispatch::{
    DispatchEngineConfig, EligibilityPolicy, PROMOTION_BINDING_PATTERN, PROMOTION_ROUTING_KEY,
};
use crate::error::{DomainError, DomainResult as Result};
use crate::messaging::{ExponentialBackoff, TopicPattern};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// broker 地址；内置传输只支持 `memory://`
    pub broker_url: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub binding_pattern: String,
    pub poll_interval_ms: u64,
    pub eligibility: EligibilityPolicy,
    pub reconnect: ReconnectConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            broker_url: "memory://local".to_string(),
            exchange: "promotion.topic".to_string(),
            queue: "promotion.email".to_string(),
            routing_key: PROMOTION_ROUTING_KEY.to_string(),
            binding_pattern: PROMOTION_BINDING_PATTERN.to_string(),
            poll_interval_ms: 60_000,
            eligibility: EligibilityPolicy::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// 重连退避配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl DispatchConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 从可选文件与进程环境变量加载
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    DomainError::invalid_config(format!("reading {}: {e}", path.display()))
                })?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 用 `lookup` 提供的 `PROMO_*` 变量覆盖对应字段
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PROMO_BROKER_URL") {
            self.broker_url = v;
        }
        if let Some(v) = lookup("PROMO_EXCHANGE") {
            self.exchange = v;
        }
        if let Some(v) = lookup("PROMO_QUEUE") {
            self.queue = v;
        }
        if let Some(v) = lookup("PROMO_ROUTING_KEY") {
            self.routing_key = v;
        }
        if let Some(v) = lookup("PROMO_BINDING_PATTERN") {
            self.binding_pattern = v;
        }
        if let Some(v) = lookup("PROMO_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v.trim().parse()?;
        }
        if let Some(v) = lookup("PROMO_ELIGIBILITY") {
            self.eligibility = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(DomainError::invalid_config("poll_interval_ms must be > 0"));
        }
        for (name, value) in [
            ("broker_url", &self.broker_url),
            ("exchange", &self.exchange),
            ("queue", &self.queue),
            ("routing_key", &self.routing_key),
            ("binding_pattern", &self.binding_pattern),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::invalid_config(format!("{name} must not be empty")));
            }
        }
        if !TopicPattern::new(&self.binding_pattern).matches(&self.routing_key) {
            return Err(DomainError::invalid_config(format!(
                "binding pattern {} does not match routing key {}, every publish would be rejected",
                self.binding_pattern, self.routing_key
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect.initial_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
            self.reconnect.multiplier,
        )
    }

    pub fn engine_config(&self) -> DispatchEngineConfig {
        DispatchEngineConfig {
            poll_interval: self.poll_interval(),
            binding_pattern: self.binding_pattern.clone(),
        }
    }
}
