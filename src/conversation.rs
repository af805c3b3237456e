use crate::message::{Message, ToolCall};

/// Append-only transcript for one run.
///
/// Always opens with the persona and the request, and only grows by whole tool
/// exchanges (call immediately followed by its result) or assistant turns.
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_message: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_message), Message::user(input)],
        }
    }

    /// Extra system message carrying prior context.
    pub fn push_context(&mut self, context: impl Into<String>) {
        self.messages.push(Message::system(context));
    }

    pub fn push_tool_exchange(&mut self, call: ToolCall, result: impl Into<String>) {
        let call_id = call.id.clone();
        let name = call.name.clone();
        self.messages.push(Message::tool_calls(vec![call]));
        self.messages.push(Message::tool(call_id, name, result));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn opens_with_persona_and_request() {
        let conversation = Conversation::new("persona", "question");
        let roles: Vec<Role> = conversation.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(conversation.messages()[1].content, "question");
    }

    #[test]
    fn tool_exchange_pairs_call_with_result() {
        let mut conversation = Conversation::new("persona", "question");
        conversation.push_tool_exchange(
            ToolCall::new("calculator", r#"{"a":1}"#).with_id("call_0"),
            r#"{"result":1}"#,
        );

        assert_eq!(conversation.len(), 4);
        let call = &conversation.messages()[2];
        let result = &conversation.messages()[3];
        assert_eq!(call.role, Role::Assistant);
        assert_eq!(call.tool_calls[0].id, "call_0");
        assert_eq!(result.role, Role::Tool);

        let tool_result = result.tool_result.as_ref().unwrap();
        assert_eq!(tool_result.call_id, "call_0");
        assert_eq!(tool_result.name, "calculator");
        assert_eq!(tool_result.content, r#"{"result":1}"#);
    }
}
