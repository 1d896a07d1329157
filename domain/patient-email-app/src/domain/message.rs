use crate::domain::address::EmailAddress;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content,
        }
    }
}

/// A single outbound email, built right before dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: EmailAddress,
    /// Overrides the transport's configured sender when set.
    pub from: Option<EmailAddress>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    pub fn new(to: EmailAddress, subject: impl Into<String>, text_body: impl Into<String>) -> Self {
        Self {
            to,
            from: None,
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_from(mut self, from: Option<EmailAddress>) -> Self {
        self.from = from;
        self
    }

    pub fn with_html(mut self, html_body: Option<String>) -> Self {
        self.html_body = html_body;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}
