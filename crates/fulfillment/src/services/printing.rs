//! Kitchen ticket printing collaborator and its implementations.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::Order;
use thiserror::Error;

/// Result of a successful print.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PrintReceipt {
    /// Where the rendered ticket was written, when the printer spools to disk.
    pub rendered_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("Ticket spool I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device or spooler refused the job.
    #[error("Printer rejected the ticket: {0}")]
    Rejected(String),
}

/// Renders and prints kitchen tickets.
///
/// The core treats the printer as opaque and only records success or failure.
#[async_trait]
pub trait TicketPrinter: Send + Sync {
    async fn render_and_print(&self, order: &Order, reprint: bool)
    -> Result<PrintReceipt, PrintError>;
}

/// Renders the plain-text kitchen ticket for an order.
///
/// Names and size labels come from the order lines, so a ticket printed
/// after a product was renamed still shows what the customer ordered.
pub fn render_ticket(order: &Order, reprint: bool, printed_at: DateTime<Utc>) -> String {
    let record = order.record();
    let mut out = String::new();

    if reprint {
        let _ = writeln!(out, "*** REPRINT ***");
    }
    let _ = writeln!(out, "ORDER #{}", short_id(order.id()));
    match record.table_id {
        Some(table) => {
            let _ = writeln!(out, "Table: {}", table);
        }
        None => {
            let _ = writeln!(out, "Takeout");
        }
    }
    if let Some(name) = &record.customer.name {
        let _ = writeln!(out, "Customer: {name}");
    }
    let _ = writeln!(out, "Printed: {}", printed_at.format("%Y-%m-%d %H:%M"));
    if let Some(minutes) = record.estimated_prep_minutes {
        let _ = writeln!(out, "Prep: {minutes} min");
    }
    let _ = writeln!(out, "{}", "-".repeat(32));

    for item in order.items() {
        match &item.size_label {
            Some(size) => {
                let _ = writeln!(out, "{} x {} ({})", item.quantity, item.product_name, size);
            }
            None => {
                let _ = writeln!(out, "{} x {}", item.quantity, item.product_name);
            }
        }
        for modifier in &item.modifiers {
            let _ = writeln!(out, "    + {}", modifier.name);
        }
        if let Some(note) = &item.note {
            let _ = writeln!(out, "    ! {note}");
        }
    }

    let _ = writeln!(out, "{}", "-".repeat(32));
    let _ = writeln!(out, "Items: {}", order.total_quantity());
    out
}

fn short_id(id: OrderId) -> String {
    id.to_string().chars().take(8).collect()
}

/// Spools rendered tickets as text files for the print daemon.
#[derive(Debug, Clone)]
pub struct FileTicketPrinter {
    spool_dir: PathBuf,
}

impl FileTicketPrinter {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }
}

#[async_trait]
impl TicketPrinter for FileTicketPrinter {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn render_and_print(
        &self,
        order: &Order,
        reprint: bool,
    ) -> Result<PrintReceipt, PrintError> {
        let now = Utc::now();
        let ticket = render_ticket(order, reprint, now);

        tokio::fs::create_dir_all(&self.spool_dir).await?;
        let suffix = if reprint { "-reprint" } else { "" };
        let path = self.spool_dir.join(format!(
            "{}-{}{}.txt",
            order.id(),
            now.format("%Y%m%dT%H%M%S%.6f"),
            suffix
        ));
        tokio::fs::write(&path, ticket).await?;

        tracing::debug!(path = %path.display(), "Ticket spooled");
        Ok(PrintReceipt {
            rendered_path: Some(path),
        })
    }
}

/// A ticket captured by [`InMemoryTicketPrinter`].
#[derive(Debug, Clone)]
pub struct PrintedTicket {
    pub order_id: OrderId,
    pub reprint: bool,
    pub content: String,
}

#[derive(Debug, Default)]
struct InMemoryPrinterState {
    printed: Vec<PrintedTicket>,
    fail: bool,
}

/// In-memory printer for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketPrinter {
    state: Arc<RwLock<InMemoryPrinterState>>,
}

impl InMemoryTicketPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every print fail until reset.
    pub fn set_fail(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail = fail;
    }

    pub fn printed(&self) -> Vec<PrintedTicket> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .printed
            .clone()
    }

    /// Number of tickets printed for an order.
    pub fn count_for(&self, order_id: OrderId) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .printed
            .iter()
            .filter(|t| t.order_id == order_id)
            .count()
    }
}

#[async_trait]
impl TicketPrinter for InMemoryTicketPrinter {
    async fn render_and_print(
        &self,
        order: &Order,
        reprint: bool,
    ) -> Result<PrintReceipt, PrintError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(PrintError::Rejected("printer offline".to_string()));
        }
        state.printed.push(PrintedTicket {
            order_id: order.id(),
            reprint,
            content: render_ticket(order, reprint, Utc::now()),
        });
        Ok(PrintReceipt::default())
    }
}
