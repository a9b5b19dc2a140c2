use crate::error::DomainResult as Result;
use crate::value_object::EmailAddress;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// 邮件发送通道
///
/// 返回 `Err(DomainError::SendTransport)` 表示发送失败；本层不对单次发送施加超时。
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipients: &[EmailAddress], subject: &str, body: &str) -> Result<()>;
}

/// 只写日志、总是成功的发送实现
#[derive(Debug, Default)]
pub struct LoggingEmailSender {
    sent: AtomicUsize,
}

impl LoggingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已“发送”的邮件批次数
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, recipients: &[EmailAddress], subject: &str, body: &str) -> Result<()> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(
            recipients = recipients.len(),
            subject,
            body_len = body.len(),
            "promotion email sent"
        );
        Ok(())
    }
}
