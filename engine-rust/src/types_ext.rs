use crate::{
    AssistantMessage, FilePart, ImagePart, Message, Part, ReasoningPart, RefusalPart, TextPart,
    ToolCallPart, ToolMessage, ToolResultPart, UserMessage,
};
use serde_json::Value;

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            annotations: None,
        }
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: Vec<crate::Annotation>) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

impl From<&str> for TextPart {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TextPart {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl ImagePart {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id: None,
        }
    }
}

impl FilePart {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            filename: None,
        }
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPart::new(text))
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image(ImagePart::new(url))
    }

    pub fn file(file_id: impl Into<String>) -> Self {
        Self::File(FilePart::new(file_id))
    }

    pub fn tool_call(call_id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self::ToolCall(ToolCallPart {
            call_id: call_id.into(),
            name: name.into(),
            args,
        })
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: Vec<Self>,
    ) -> Self {
        Self::ToolResult(ToolResultPart {
            call_id: call_id.into(),
            name: name.into(),
            content,
            is_error: None,
        })
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning(ReasoningPart {
            text: text.into(),
            signature: None,
        })
    }

    pub fn refusal(refusal: impl Into<String>) -> Self {
        Self::Refusal(RefusalPart {
            refusal: refusal.into(),
        })
    }
}

impl Message {
    #[must_use]
    pub fn user(content: Vec<Part>) -> Self {
        Self::User(UserMessage { content })
    }

    #[must_use]
    pub fn assistant(content: Vec<Part>) -> Self {
        Self::Assistant(AssistantMessage { content })
    }

    #[must_use]
    pub fn tool(content: Vec<Part>) -> Self {
        Self::Tool(ToolMessage { content })
    }

    #[must_use]
    pub fn content(&self) -> &[Part] {
        match self {
            Self::User(message) => &message.content,
            Self::Assistant(message) => &message.content,
            Self::Tool(message) => &message.content,
        }
    }
}
