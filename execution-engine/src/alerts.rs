//! Operator channel implementations. None of them wait for the receiver.

use log::{error, info, warn};
use tokio::sync::mpsc;
use trading::{AlertSink, Notification, Severity};

/// Writes every notification to the log at a level matching its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, notification: &Notification) {
        match notification.severity() {
            Severity::Info => info!("[alert] {}", notification),
            Severity::Warning => warn!("[alert] {}", notification),
            Severity::Fatal => error!("[alert] {}", notification),
        }
    }
}

/// Forwards notifications to an unbounded channel. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&self, notification: &Notification) {
        let _ = self.tx.send(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::ComponentId;

    #[test]
    fn channel_sink_never_blocks() {
        let (sink, mut rx) = ChannelAlertSink::new();
        let death = Notification::ComponentDeath {
            component: ComponentId::ExecutionAdapter,
            timestamp: 5,
        };
        sink.notify(&death);
        assert_eq!(rx.try_recv().unwrap(), death);

        drop(rx);
        sink.notify(&death);
    }
}
