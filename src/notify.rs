//! Alert email rendering and fire-and-forget delivery.
//!
//! Alert creation must never fail because mail could not be sent: the
//! service enqueues onto a bounded channel and returns. A spawned worker
//! drains the queue and hands each message to a [`Mailer`]; failures are
//! logged and dropped, independent of the persisted alert row. There is
//! no retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Queue depth for pending alert emails.
const MAIL_CHANNEL_SIZE: usize = 64;

/// Everything the alert notification template interpolates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEmail {
    pub recipient_name: String,
    pub recipient_email: String,
    pub author_name: String,
    pub task_name: String,
    pub message: String,
    pub task_url: String,
}

impl AlertEmail {
    /// Render the single HTML notification template.
    pub fn render_html(&self) -> String {
        format!(
            "<html>\n<body>\n\
             <p>Hi {recipient},</p>\n\
             <p>{author} sent you an alert about the task\n\
             <a href=\"{url}\">{task}</a>:</p>\n\
             <blockquote>{message}</blockquote>\n\
             <p><a href=\"{url}\">View the task</a></p>\n\
             </body>\n</html>",
            recipient = self.recipient_name,
            author = self.author_name,
            task = self.task_name,
            url = self.task_url,
            message = self.message,
        )
    }

    pub fn subject(&self) -> String {
        format!("New alert on task {}", self.task_name)
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport failure: {0}")]
    Transport(String),
}

/// Delivery backend. Real transport configuration is out of scope; the
/// default backend logs the rendered message.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &AlertEmail) -> Result<(), MailError>;
}

/// Logs each outgoing mail instead of sending it.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &AlertEmail) -> Result<(), MailError> {
        tracing::info!(
            recipient = %email.recipient_email,
            subject = %email.subject(),
            "Alert mail (log transport)"
        );
        tracing::debug!(body = %email.render_html(), "Rendered alert mail");
        Ok(())
    }
}

/// Sink the alert service hands emails to. Implementations must not block
/// the caller or surface delivery errors.
pub trait AlertNotifier {
    fn notify(&self, email: AlertEmail);
}

/// Drops every notification. Useful where alert mail is disabled.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl AlertNotifier for NullNotifier {
    fn notify(&self, _email: AlertEmail) {}
}

/// Bounded queue in front of a [`Mailer`], drained by a spawned worker.
///
/// Must be created inside a tokio runtime. A full queue drops the message
/// with a warning rather than applying backpressure to the request path.
pub struct MailQueue {
    tx: mpsc::Sender<AlertEmail>,
}

impl MailQueue {
    pub fn start(mailer: Arc<dyn Mailer>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertEmail>(MAIL_CHANNEL_SIZE);
        tokio::spawn(async move {
            while let Some(email) = rx.recv().await {
                if let Err(e) = mailer.send(&email) {
                    tracing::warn!(
                        recipient = %email.recipient_email,
                        error = %e,
                        "Alert mail delivery failed"
                    );
                }
            }
        });
        Self { tx }
    }
}

impl AlertNotifier for MailQueue {
    fn notify(&self, email: AlertEmail) {
        if let Err(e) = self.tx.try_send(email) {
            tracing::warn!(error = %e, "Alert mail queue full or closed; dropping notification");
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::cell::RefCell;

    use super::{AlertEmail, AlertNotifier};

    /// Collects notifications in memory for assertions.
    #[derive(Default)]
    pub struct MemoryNotifier {
        pub sent: RefCell<Vec<AlertEmail>>,
    }

    impl AlertNotifier for MemoryNotifier {
        fn notify(&self, email: AlertEmail) {
            self.sent.borrow_mut().push(email);
        }
    }
}
