use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::domain::message::EmailMessage;

pub trait EmailPort {
    fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("failed to send email: {0}")]
    Send(String),
}

/// Records every message instead of delivering it. Fails every send while
/// `failure` is set.
#[derive(Clone, Default)]
pub struct MockEmailPort {
    pub sent_messages: Arc<Mutex<Vec<EmailMessage>>>,
    pub failure: Arc<Mutex<Option<TransportError>>>,
}

#[allow(unused)]
impl MockEmailPort {
    pub fn failing(error: TransportError) -> Self {
        let port = Self::default();
        *port.failure.lock().unwrap() = Some(error);
        port
    }

    pub fn get_messages(&self) -> Vec<EmailMessage> {
        self.sent_messages.lock().unwrap().clone()
    }
}

impl EmailPort for MockEmailPort {
    fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent_messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}
