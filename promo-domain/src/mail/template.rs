use crate::model::{Promotion, Restaurant};
use std::fmt::Write as _;

/// 渲染后的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    subject: String,
    body: String,
}

impl EmailContent {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// 促销内容加餐厅信息渲染为纯文本邮件
pub fn render_promotion_email(promotion: &Promotion, restaurant: &Restaurant) -> EmailContent {
    let subject = format!("{} | {}", restaurant.name(), promotion.name());

    let mut body = String::new();
    let _ = writeln!(body, "{}", restaurant.name());
    let _ = writeln!(body, "{}", promotion.name());
    if !promotion.promotion_type().is_empty() {
        let _ = writeln!(body, "[{}]", promotion.promotion_type());
    }
    body.push('\n');

    for section in [promotion.description(), promotion.content()] {
        if !section.is_empty() {
            let _ = writeln!(body, "{section}\n");
        }
    }

    let _ = writeln!(
        body,
        "Valid from {} to {}.",
        promotion.start_date().format("%Y-%m-%d"),
        promotion.end_date().format("%Y-%m-%d")
    );

    let contacts = [
        restaurant.address(),
        restaurant.phone(),
        restaurant.email(),
        restaurant.website(),
    ];
    let contacts: Vec<&str> = contacts.into_iter().flatten().collect();
    if !contacts.is_empty() {
        body.push('\n');
        for line in contacts {
            let _ = writeln!(body, "{line}");
        }
    }

    EmailContent { subject, body }
}
