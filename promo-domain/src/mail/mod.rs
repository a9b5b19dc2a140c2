//! 邮件（mail）
//!
//! - `EmailSender`：发送通道协议（SMTP 或其他实现由上层注入）；
//! - `render_promotion_email`：促销内容 + 餐厅信息渲染为邮件；
//! - `LoggingEmailSender`：只记录日志的发送实现，用于本地运行。
//!
mod sender;
mod template;

pub use sender::{EmailSender, LoggingEmailSender};
pub use template::{EmailContent, render_promotion_email};
