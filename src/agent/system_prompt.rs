//! System prompt builder
//!
//! The persona sections are static for the agent's lifetime; only the emotion
//! value changes between turns.

use super::providers::Message;
use super::transcript::Turn;

/// Render the system prompt for the next request.
///
/// Empty descriptions drop their section entirely.
#[allow(clippy::vec_init_then_push)]
pub fn render_system_prompt(agent_description: &str, user_description: &str, emotion: i32) -> String {
    let mut lines = Vec::new();

    lines.push(
        "You are a character in an ongoing conversation. Stay in character and reply naturally."
            .to_string(),
    );
    lines.push(String::new());

    if !agent_description.is_empty() {
        lines.push("## Your Character".to_string());
        lines.push(agent_description.to_string());
        lines.push(String::new());
    }

    if !user_description.is_empty() {
        lines.push("## The User".to_string());
        lines.push(user_description.to_string());
        lines.push(String::new());
    }

    lines.push("## Current Emotion".to_string());
    lines.push(format!("Your current emotion value is {}.", emotion));
    lines.push(
        "The scale runs from -100 (very negative) through 0 (neutral) to 100 (very positive). \
         Let it shape the tone of your reply without mentioning the number."
            .to_string(),
    );

    lines.join("\n")
}

/// Flatten turns into alternating user/assistant messages.
pub fn turns_to_messages(turns: &[Turn]) -> Vec<Message> {
    turns
        .iter()
        .flat_map(|t| {
            [
                Message::user(t.user_message.clone()),
                Message::assistant(t.assistant_message.clone()),
            ]
        })
        .collect()
}

/// Full message list: system prompt, windowed history, then the new input.
pub fn build_messages(system_prompt: String, history: &[Turn], user_input: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(Message::system(system_prompt));
    messages.extend(turns_to_messages(history));
    messages.push(Message::user(user_input));
    messages
}
