//! Notifications pushed to the UI layer.
//!
//! Wire shapes:
//! - `{"type": "ERROR_NOTIFICATION", "error": {...}}` for critical errors
//! - `{"type": "COOKIE_VALIDATION_FAILURE", "error": {...}}` for cookies rejected during import

use crate::errors::manager::ErrorRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of undelivered notifications kept per subscriber.
const DEFAULT_CAPACITY: usize = 64;

/// Details of a cookie rejected by the validator during import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub cookie_name: Option<String>,
    pub domain: Option<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "ERROR_NOTIFICATION")]
    Error { error: ErrorRecord },
    #[serde(rename = "COOKIE_VALIDATION_FAILURE")]
    CookieValidationFailure { error: ValidationFailure },
}

/// Fan-out channel from the core to any number of UI listeners.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Push a notification. Having no listeners is not an error.
    pub fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification dropped: no listeners");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wire_shape() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify(Notification::CookieValidationFailure {
            error: ValidationFailure {
                cookie_name: Some("sid".into()),
                domain: None,
                errors: vec!["Missing required field: path".into()],
            },
        });

        let received = rx.recv().await.unwrap();
        let json = serde_json::to_value(&received).unwrap();
        assert_eq!(json["type"], "COOKIE_VALIDATION_FAILURE");
        assert_eq!(json["error"]["cookieName"], "sid");
    }

    #[test]
    fn test_notify_without_listeners() {
        Notifier::new(1).notify(Notification::CookieValidationFailure {
            error: ValidationFailure {
                cookie_name: None,
                domain: None,
                errors: vec![],
            },
        });
    }
}
