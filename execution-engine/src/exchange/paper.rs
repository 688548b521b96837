use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use trading::{
    BrokerGateway, GatewayError, GatewayEvent, GatewayFill, InstrumentId, OrderRequest,
};

/// In-process paper broker. Fills every order in full at the latest known price.
pub struct PaperGateway {
    prices: Mutex<BTreeMap<InstrumentId, f64>>,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<GatewayEvent>>,
    connected: AtomicBool,
    duplicate_fills: bool,
    failing_connects: AtomicU32,
    next_fill: AtomicU64,
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperGateway {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            prices: Mutex::new(BTreeMap::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            connected: AtomicBool::new(false),
            duplicate_fills: false,
            failing_connects: AtomicU32::new(0),
            next_fill: AtomicU64::new(1),
        }
    }

    /// Sends every fill notification twice, like an at-least-once venue.
    pub fn with_duplicate_fills(mut self) -> Self {
        self.duplicate_fills = true;
        self
    }

    /// Makes the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn set_price(&self, instrument_id: InstrumentId, price: f64) {
        self.prices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(instrument_id, price);
    }

    /// Drops the session as a venue would.
    pub fn disconnect(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(GatewayEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    fn price_for(&self, order: &OrderRequest) -> Option<f64> {
        order.limit_price().or_else(|| {
            self.prices
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(order.instrument_id())
                .copied()
        })
    }
}

#[async_trait]
impl BrokerGateway for PaperGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(GatewayError::Network("paper venue unavailable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<(), GatewayError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected);
        }
        let price = self.price_for(order).ok_or_else(|| {
            GatewayError::Rejected(format!("no price for {}", order.instrument_id()))
        })?;
        let n = self.next_fill.fetch_add(1, Ordering::SeqCst);
        let fill = GatewayFill {
            order_id: order.id(),
            fill_id: Some(format!("PAPER-{}", n)),
            quantity: order.quantity(),
            price,
            fee: None,
            timestamp: Utc::now().timestamp_millis(),
        };
        debug!("Paper fill {} for order {}", n, order.id());
        if self.duplicate_fills {
            let _ = self.events_tx.send(GatewayEvent::Fill(fill.clone()));
        }
        let _ = self.events_tx.send(GatewayEvent::Fill(fill));
        Ok(())
    }

    async fn next_event(&self) -> Option<GatewayEvent> {
        self.events_rx.lock().await.recv().await
    }
}
