//! Delivery notification seam.

use async_trait::async_trait;
use parking_lot::Mutex;

use evtag_core::{EvtagError, ExportRequestId, Result};

/// The one email sent for a delivered export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEmail {
    pub to: String,
    pub request: ExportRequestId,
    pub url: String,
    /// Expiry rendered in the request's time zone.
    pub expires: String,
}

impl ExportEmail {
    pub fn subject(&self) -> &'static str {
        "Your evidence export is ready"
    }

    pub fn body(&self) -> String {
        format!(
            "Your export is ready to download:\n\n{}\n\nThe link expires {}.",
            self.url, self.expires
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ExportEmail) -> Result<()>;
}

/// Keeps sent mail in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<ExportEmail>>,
    fail: Mutex<bool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn sent(&self) -> Vec<ExportEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &ExportEmail) -> Result<()> {
        if *self.fail.lock() {
            return Err(EvtagError::Storage(format!(
                "mail to {} rejected",
                email.to
            )));
        }
        self.sent.lock().push(email.clone());
        tracing::debug!(to = %email.to, request_id = %email.request, "export email recorded");
        Ok(())
    }
}

/// Writes the email to the log instead of sending it. Used when no mail
/// transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ExportEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            request_id = %email.request,
            subject = email.subject(),
            url = %email.url,
            "export email"
        );
        Ok(())
    }
}
