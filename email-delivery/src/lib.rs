pub mod sendgrid;
pub mod smtp;

pub use sendgrid::{SendGridConfig, SendGridDelivery};
pub use smtp::{SmtpConfig, SmtpDelivery};
