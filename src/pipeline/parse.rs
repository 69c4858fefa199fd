//! Classifier response parsing.
//!
//! The model replies with `标签: 值` lines per the prompt contract. Parsing
//! is tolerant: every recognized label is tested against every line, labels
//! may appear in any order, absent labels leave their field at its default,
//! and unrecognized lines are ignored.

use crate::pipeline::types::{Classification, Priority};

const CATEGORY_LABELS: &[&str] = &["类型"];
const PRIORITY_LABELS: &[&str] = &["重要级"];
const SENDER_LABELS: &[&str] = &["发件人"];
const RECIPIENT_LABELS: &[&str] = &["收件人"];
const SUMMARY_LABELS: &[&str] = &["总结"];
const SCHEDULE_LABELS: &[&str] = &["日程（如果有）", "日程(如果有)", "日程"];

/// Parse raw response text into a typed classification.
///
/// Never fails; a response with nothing recognizable yields the default
/// record (empty fields, priority unknown, no schedule).
pub fn parse(raw: &str) -> Classification {
    let mut result = Classification::default();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = match_labels(line, CATEGORY_LABELS) {
            result.category = value.to_string();
        }
        if let Some(value) = match_labels(line, PRIORITY_LABELS) {
            result.priority = Priority::parse(value);
        }
        if let Some(value) = match_labels(line, SENDER_LABELS) {
            result.sender = value.to_string();
        }
        if let Some(value) = match_labels(line, RECIPIENT_LABELS) {
            result.recipient = value.to_string();
        }
        if let Some(value) = match_labels(line, SUMMARY_LABELS) {
            result.summary = value.to_string();
        }
        if let Some(value) = match_labels(line, SCHEDULE_LABELS) {
            if !value.is_empty() {
                result.schedule = Some(value.to_string());
            }
        }
    }

    result
}

fn match_labels<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    labels.iter().find_map(|label| strip_label(line, label))
}

/// Strip `label` plus a following ASCII or full-width colon, returning the
/// trimmed remainder. Lines where the label is a prefix of a longer word
/// (no colon follows) do not match.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(label)?;
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?;
    Some(rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_response_parses() {
        let c = parse("类型: A\n重要级: 必须完成\n总结: S\n");
        assert_eq!(c.category, "A");
        assert_eq!(c.priority, Priority::MustComplete);
        assert_eq!(c.summary, "S");
        assert_eq!(c.schedule, None);
    }

    #[test]
    fn schedule_line_keeps_trailing_text_verbatim() {
        let c = parse("日程: 2024-11-06 13:00 X");
        assert_eq!(c.schedule.as_deref(), Some("2024-11-06 13:00 X"));
    }

    #[test]
    fn schedule_with_qualifier_label() {
        let c = parse("日程（如果有）: 2024年11月6日 13:00 在主楼举办讲座");
        assert_eq!(
            c.schedule.as_deref(),
            Some("2024年11月6日 13:00 在主楼举办讲座")
        );
    }

    #[test]
    fn labels_out_of_order() {
        let c = parse("总结: 总结在前\n类型: 学术信息\n重要级: 重要通知");
        assert_eq!(c.category, "学术信息");
        assert_eq!(c.priority, Priority::Important);
        assert_eq!(c.summary, "总结在前");
    }

    #[test]
    fn full_width_colon_accepted() {
        let c = parse("类型：活动宣传\n重要级：一般通知");
        assert_eq!(c.category, "活动宣传");
        assert_eq!(c.priority, Priority::General);
    }

    #[test]
    fn whitespace_around_lines_and_values_trimmed() {
        let c = parse("  类型:   日常通知  \n\n  重要级: 回复必要 ");
        assert_eq!(c.category, "日常通知");
        assert_eq!(c.priority, Priority::ReplyNeeded);
    }

    #[test]
    fn unrecognized_lines_ignored() {
        let c = parse("好的，以下是分类结果：\n类型: 垃圾邮件\n以上。");
        assert_eq!(c.category, "垃圾邮件");
        assert_eq!(c.summary, "");
    }

    #[test]
    fn unknown_priority_text_defaults_to_unknown() {
        let c = parse("重要级: 特别重要");
        assert_eq!(c.priority, Priority::Unknown);
    }

    #[test]
    fn sender_and_recipient_lines_parse() {
        let c = parse("发件人: 教务处 <jwc@univ.edu>\n收件人: 全体学生");
        assert_eq!(c.sender, "教务处 <jwc@univ.edu>");
        assert_eq!(c.recipient, "全体学生");
    }

    #[test]
    fn empty_response_yields_defaults() {
        let c = parse("");
        assert_eq!(c.category, "");
        assert_eq!(c.priority, Priority::Unknown);
        assert_eq!(c.schedule, None);
    }

    #[test]
    fn label_prefix_of_longer_word_does_not_match() {
        // no colon directly after the label
        let c = parse("类型描述 something");
        assert_eq!(c.category, "");
    }

    #[test]
    fn empty_schedule_value_stays_absent() {
        let c = parse("日程:");
        assert_eq!(c.schedule, None);
    }
}
