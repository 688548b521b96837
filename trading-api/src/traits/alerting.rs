use crate::model::notification::Notification;

/// Operator channel. Implementations must return without waiting for acknowledgment.
pub trait AlertSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}
