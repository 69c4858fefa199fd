//! Email classification via the LLM.
//!
//! One fixed prompt contract: the system message carries the classification
//! policy (type taxonomy, priority taxonomy, reply summary, schedule
//! extraction, output format), the user message carries the rendered
//! headers block and body. The response text feeds `parse::parse`.

use std::sync::Arc;

use tracing::debug;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{ClassificationRequest, ParsedMessage};

/// Max tokens for the classification call (runs on every message).
const CLASSIFY_MAX_TOKENS: u32 = 512;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Fixed classification policy sent as the system message. The output
/// format section defines the label set the response parser recognizes.
const CLASSIFY_SYSTEM_PROMPT: &str = "\
你是一个日程智能助理，下面是一封邮件，请根据邮件的内容进行以下分类和判断：\n\n\
1. 判断邮件的类型（活动宣传、学校事务、学术信息、垃圾邮件、日常通知等）。\n\
2. 评估邮件的重要级别，包括以下几类：“必须完成”、“重要通知”、“一般通知”、“回复必要”等。\
对于如下情况：选课提醒、学术指导、体育测试、考试信息等，标记为“必须完成”；\
对课程讲座、项目宣讲、活动宣传等邮件，标记为“重要通知”或“一般通知”视内容重要性而定；\
对于娱乐性质的活动，如音乐会、社团宣传等，标记为“一般通知”。\n\n\
3. 如果邮件需要回复，请总结回复的关键点。\n\
4. 提取日程信息，包括日期和时间（例如：xx月xx日 xx时-xx时），以及活动的地点和主题\
（例如，2024年11月6日 13:00 在xxx举办xxx活动）。\n\n\
输出格式如下：\n\n\
类型: xxxx\n\
重要级: xxx\n\
总结: 总结邮件内容，用几句话描述邮件的主要内容。\n\
日程（如果有）: (例如：2024年11月6日 13:00 在xxx举办 xxx活动)";

/// Classifier adapter — renders requests and calls the provider.
pub struct EmailClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl EmailClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Render a decoded message into the classifier payload.
    ///
    /// Header lines use the labels the prompt contract expects; an absent
    /// date renders as an empty value.
    pub fn render_request(message: &ParsedMessage) -> ClassificationRequest {
        let date = message.date.map(|d| d.to_rfc2822()).unwrap_or_default();
        let headers = format!(
            "发件人: {}\n收件人: {}\n抄送: {}\n主题: {}\n日期: {}",
            message.from, message.to, message.cc, message.subject, date
        );
        ClassificationRequest {
            headers,
            body: message.body.clone(),
        }
    }

    /// Send one classification request, returning the raw response text.
    pub async fn classify(&self, request: &ClassificationRequest) -> Result<String, LlmError> {
        let user_content = format!("{}\n\n{}", request.headers, request.body);

        let completion = CompletionRequest::new(vec![
            ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
            ChatMessage::user(user_content),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(completion).await?;
        debug!(model = self.llm.model_name(), raw = %response.content, "Classifier response");
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::CompletionResponse;

    struct CannedProvider {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl CannedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn sample_message() -> ParsedMessage {
        ParsedMessage {
            from: "教务处 <jwc@univ.edu>".into(),
            to: "student@univ.edu".into(),
            cc: "".into(),
            subject: "选课提醒".into(),
            date: chrono::DateTime::from_timestamp(1_730_898_000, 0),
            body: "请在本周五前完成选课。".into(),
        }
    }

    #[test]
    fn rendered_request_carries_all_header_lines() {
        let request = EmailClassifier::render_request(&sample_message());
        assert!(request.headers.contains("发件人: 教务处 <jwc@univ.edu>"));
        assert!(request.headers.contains("收件人: student@univ.edu"));
        assert!(request.headers.contains("抄送: "));
        assert!(request.headers.contains("主题: 选课提醒"));
        assert!(request.headers.contains("日期: "));
        assert_eq!(request.body, "请在本周五前完成选课。");
    }

    #[test]
    fn absent_date_renders_empty() {
        let mut message = sample_message();
        message.date = None;
        let request = EmailClassifier::render_request(&message);
        assert!(request.headers.ends_with("日期: "));
    }

    #[tokio::test]
    async fn classify_sends_policy_and_content() {
        let provider = Arc::new(CannedProvider::new("类型: 学校事务"));
        let classifier = EmailClassifier::new(provider.clone());

        let request = EmailClassifier::render_request(&sample_message());
        let raw = classifier.classify(&request).await.unwrap();
        assert_eq!(raw, "类型: 学校事务");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let sent = &seen[0];
        assert_eq!(sent.temperature, Some(CLASSIFY_TEMPERATURE));
        assert_eq!(sent.max_tokens, Some(CLASSIFY_MAX_TOKENS));
        assert_eq!(sent.messages.len(), 2);
        assert!(sent.messages[0].content.contains("输出格式如下"));
        assert!(sent.messages[1].content.contains("主题: 选课提醒"));
        assert!(sent.messages[1].content.contains("请在本周五前完成选课。"));
    }
}
