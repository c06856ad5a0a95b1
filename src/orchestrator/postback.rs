//! Button-click (postback) routing.

/// Known button payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostbackAction {
    /// "Get Started" on a new conversation.
    GetStarted,
    /// Browse the catalog.
    ViewCatalog,
    /// Request a design consultation.
    BookConsultation,
    /// Hand off to a human agent.
    TalkToHuman,
    /// Any other payload; answered by the generator.
    Custom(String),
}

impl PostbackAction {
    /// Classify a raw payload. Matching is case-insensitive.
    #[must_use]
    pub fn parse(payload: &str) -> Self {
        match payload.trim().to_ascii_uppercase().as_str() {
            "GET_STARTED" => Self::GetStarted,
            "VIEW_CATALOG" => Self::ViewCatalog,
            "BOOK_CONSULTATION" => Self::BookConsultation,
            "TALK_TO_HUMAN" => Self::TalkToHuman,
            _ => Self::Custom(payload.trim().to_owned()),
        }
    }

    /// Canned reply for known payloads. May contain `||WAIT:<ms>||` markers.
    #[must_use]
    pub fn canned_reply(&self) -> Option<&'static str> {
        match self {
            Self::GetStarted => Some(
                "Hi and welcome! I'm here to help you find the perfect furniture for your home.\
                 ||WAIT:1500||What are you shopping for today?",
            ),
            Self::ViewCatalog => Some(
                "We carry sofas, beds, tables, chairs, storage, kitchen, lighting and decor.\
                 ||WAIT:1500||Which category would you like to explore first?",
            ),
            Self::BookConsultation => Some(
                "I'd love to set up a free design consultation for you!\
                 ||WAIT:1500||Which day and time work best for you?",
            ),
            Self::TalkToHuman => Some(
                "Of course. I've let our team know and someone will reply here shortly.",
            ),
            Self::Custom(_) => None,
        }
    }

    /// Prompt handed to the generator for payloads without a canned reply.
    #[must_use]
    pub fn prompt(&self, title: Option<&str>) -> String {
        match (self, title) {
            (_, Some(title)) if !title.trim().is_empty() => title.trim().to_owned(),
            (Self::Custom(payload), _) => payload.replace('_', " ").to_lowercase(),
            _ => String::new(),
        }
    }
}
