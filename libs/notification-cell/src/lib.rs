pub mod mailer;
pub mod models;
pub mod templates;

pub use mailer::{mailer_from_config, Mailer, NoopMailer, SmtpMailer};
#[cfg(any(test, feature = "mock"))]
pub use mailer::MockMailer;
pub use models::{EmailAttachment, EmailMessage};
