use crate::error::DomainError;
use crate::model::Promotion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 投递资格策略
///
/// 默认只看 `sent` 标记；`ActiveWindow` 额外要求当前时间处于促销生效区间内。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityPolicy {
    #[default]
    SentFlagOnly,
    ActiveWindow,
}

impl EligibilityPolicy {
    pub fn admits(&self, promotion: &Promotion, now: DateTime<Utc>) -> bool {
        if promotion.sent() {
            return false;
        }
        match self {
            Self::SentFlagOnly => true,
            Self::ActiveWindow => promotion.is_active_at(now),
        }
    }
}

impl FromStr for EligibilityPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sent_flag_only" => Ok(Self::SentFlagOnly),
            "active_window" => Ok(Self::ActiveWindow),
            other => Err(DomainError::invalid_value(format!(
                "unknown eligibility policy: {other}"
            ))),
        }
    }
}
