// Shared services used by the workflow effect dispatcher

pub mod email;

pub use email::EmailService;
