//! topic 绑定模式
//!
//! 路由键与模式都以 `.` 分隔为单词；`*` 匹配恰好一个单词，`#` 匹配零或多个单词，
//! 其余单词按字面精确匹配。
//!
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Word {
    Literal(String),
    Star,
    Hash,
}

/// 已解析的 topic 模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    words: Vec<Word>,
}

impl TopicPattern {
    pub fn new(pattern: &str) -> Self {
        let words = pattern
            .split('.')
            .map(|w| match w {
                "*" => Word::Star,
                "#" => Word::Hash,
                other => Word::Literal(other.to_string()),
            })
            .collect();

        Self {
            raw: pattern.to_string(),
            words,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let key: Vec<&str> = routing_key.split('.').collect();
        matches_words(&self.words, &key)
    }
}

fn matches_words(pattern: &[Word], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((Word::Hash, rest)) => {
            // `#` 依次尝试吞掉 0..=len 个单词
            (0..=key.len()).any(|skip| key.get(skip..).is_some_and(|tail| matches_words(rest, tail)))
        }
        Some((Word::Star, rest)) => key
            .split_first()
            .is_some_and(|(_, tail)| matches_words(rest, tail)),
        Some((Word::Literal(expected), rest)) => match key.split_first() {
            Some((word, tail)) if *word == expected.as_str() => matches_words(rest, tail),
            _ => false,
        },
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
