use serde::Deserialize;
use serde_json::Value;

/// Events from the Claude CLI's stream-json output format.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User {},

    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        usage: Option<Usage>,
    },

    #[serde(rename = "system")]
    System { subtype: String },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },
}

/// Token usage reported on the final result event.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Everything the controller needs from one agent turn's stdout.
#[derive(Debug, Default)]
pub struct CollectedOutput {
    /// Final result text if the CLI emitted one, else accumulated text.
    pub text: String,
    /// Assistant text blocks only (no tool noise, no non-JSON lines).
    pub assistant_text: String,
    pub is_error: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Fold a complete stream-json transcript into a [`CollectedOutput`].
///
/// Lines that fail to parse as events are treated as plain output and
/// accumulated, so the same path handles agents that do not speak the
/// stream protocol at all.
pub fn collect_output(stdout: &str) -> CollectedOutput {
    let mut accumulated = String::new();
    let mut assistant_text = String::new();
    let mut final_result: Option<String> = None;
    let mut is_error = false;
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;

    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(StreamEvent::Assistant { message, .. }) => {
                for block in message.content {
                    if let ContentBlock::Text { text } = block {
                        accumulated.push_str(&text);
                        accumulated.push('\n');
                        assistant_text.push_str(&text);
                        assistant_text.push('\n');
                    }
                }
            }
            Ok(StreamEvent::Result {
                result,
                is_error: err,
                usage,
                ..
            }) => {
                final_result = result;
                is_error = err;
                if let Some(usage) = usage {
                    input_tokens = usage.input_tokens;
                    output_tokens = usage.output_tokens;
                }
            }
            Ok(StreamEvent::User {}) | Ok(StreamEvent::System { .. }) => {}
            Err(_) => {
                // Non-protocol agents: raw lines count as assistant text too.
                accumulated.push_str(line);
                accumulated.push('\n');
                assistant_text.push_str(line);
                assistant_text.push('\n');
            }
        }
    }

    CollectedOutput {
        text: final_result.unwrap_or(accumulated),
        assistant_text: assistant_text.trim_end().to_string(),
        is_error,
        input_tokens,
        output_tokens,
    }
}
