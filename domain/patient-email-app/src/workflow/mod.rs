pub mod bulk;
pub mod notifications;
pub mod profile;
pub mod send_email;
pub mod templates;
