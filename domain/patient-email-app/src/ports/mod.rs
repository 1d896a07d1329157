pub mod email;
pub mod patient;
