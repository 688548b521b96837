use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use trading::{OrderFill, Side};

pub const JOURNAL_FILE: &str = "transactions.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account: String,
    pub amount: f64,
}

/// One applied fill as a double-entry transaction over cash, position and fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The fill id, so replays journal identical rows.
    pub id: String,
    pub timestamp: i64,
    pub description: String,
    pub entries: Vec<LedgerEntry>,
}

impl Transaction {
    pub fn from_fill(fill: &OrderFill) -> Self {
        let notional = fill.notional();
        let (position, cash) = match fill.side {
            Side::Buy => (notional, -notional - fill.fee),
            Side::Sell => (-notional, notional - fill.fee),
        };
        Self {
            id: fill.fill_id.to_string(),
            timestamp: fill.fill_timestamp,
            description: format!(
                "{} {} {} @ {} (order {})",
                fill.side, fill.filled_quantity, fill.instrument_id, fill.fill_price, fill.order_id
            ),
            entries: vec![
                LedgerEntry {
                    account: format!("position:{}", fill.instrument_id),
                    amount: position,
                },
                LedgerEntry {
                    account: "cash".into(),
                    amount: cash,
                },
                LedgerEntry {
                    account: "fees".into(),
                    amount: fill.fee,
                },
            ],
        }
    }

    /// Entries of a transaction must sum to zero.
    pub fn is_balanced(&self) -> bool {
        let sum: f64 = self.entries.iter().map(|e| e.amount).sum();
        sum.abs() < 1e-6
    }
}

/// Appends transactions to `<dir>/transactions.csv`. A disabled journal only counts.
#[derive(Debug, Default)]
pub struct TradeJournal {
    file_path: Option<PathBuf>,
    recorded: u64,
}

impl TradeJournal {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            file_path: Some(dir.join(JOURNAL_FILE)),
            recorded: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn record(&mut self, fill: &OrderFill) -> std::io::Result<Transaction> {
        let transaction = Transaction::from_fill(fill);
        self.recorded += 1;
        let Some(path) = &self.file_path else {
            return Ok(transaction);
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let fresh = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if fresh {
            writeln!(file, "date,description,account,amount,tx_id")?;
        }

        let date = chrono::DateTime::from_timestamp_millis(transaction.timestamp)
            .unwrap_or_default()
            .to_rfc3339();
        for entry in &transaction.entries {
            writeln!(
                file,
                "{},{},{},{:.4},{}",
                date, transaction.description, entry.account, entry.amount, transaction.id
            )?;
        }
        Ok(transaction)
    }
}
