use serde_json::{json, Value};

use inteliome_core::context::LlmContext;
use inteliome_core::messages::ChatMessage;
use inteliome_core::provider::StreamOptions;

/// Build the chat-completions request body.
///
/// System blocks collapse into a single leading `system` message, followed
/// by the transcript in order.
pub fn build_request_body(context: &LlmContext, options: &StreamOptions, model: &str) -> Value {
    let mut body = json!({
        "model": model,
        "stream": true,
        "stream_options": { "include_usage": true },
        "messages": convert_messages(context),
    });

    if let Some(temp) = options.temperature {
        body["temperature"] = json!(temp);
    }
    if let Some(max) = options.max_tokens {
        body["max_tokens"] = json!(max);
    }
    if !options.stop_sequences.is_empty() {
        body["stop"] = json!(options.stop_sequences);
    }

    body
}

fn convert_messages(context: &LlmContext) -> Vec<Value> {
    let mut out = Vec::with_capacity(context.messages.len() + 1);
    if let Some(system) = context.system_prompt() {
        out.push(json!({ "role": "system", "content": system }));
    }
    out.extend(context.messages.iter().map(convert_message));
    out
}

fn convert_message(msg: &ChatMessage) -> Value {
    json!({ "role": msg.role.as_str(), "content": msg.content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inteliome_core::context::{SystemBlock, SystemBlockLabel};

    fn context() -> LlmContext {
        LlmContext {
            messages: vec![
                ChatMessage::user("What is profit?"),
                ChatMessage::assistant("Profit is revenue minus cost."),
                ChatMessage::user("And margin?"),
            ],
            system_blocks: vec![
                SystemBlock::new(SystemBlockLabel::Catalog, "profit, Return Sales Quantity"),
                SystemBlock::new(SystemBlockLabel::RunningSummary, "user asked about profit"),
            ],
        }
    }

    #[test]
    fn system_blocks_become_one_leading_message() {
        let body = build_request_body(&context(), &StreamOptions::default(), "gpt-4o-mini");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(
            messages[0]["content"],
            "profit, Return Sales Quantity\n\nuser asked about profit"
        );
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "And margin?");
    }

    #[test]
    fn no_system_message_without_blocks() {
        let ctx = LlmContext {
            messages: vec![ChatMessage::user("hi")],
            system_blocks: vec![],
        };
        let body = build_request_body(&ctx, &StreamOptions::default(), "gpt-4o-mini");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn options_are_forwarded() {
        let opts = StreamOptions {
            max_tokens: Some(256),
            temperature: Some(0.0),
            stop_sequences: vec!["\n\n".into()],
        };
        let body = build_request_body(&context(), &opts, "gpt-4o");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stop"][0], "\n\n");
    }

    #[test]
    fn unset_options_are_omitted() {
        let body = build_request_body(&context(), &StreamOptions::default(), "gpt-4o-mini");
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("stop").is_none());
    }
}
