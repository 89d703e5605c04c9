//! Kitchen ticket printing.

use async_trait::async_trait;
use common::SideEffectKind;
use store::UnitOfWork;

use crate::coordinator::{EffectContext, Performed, SideEffect};
use crate::error::FulfillmentError;
use crate::services::PrintReceipt;

/// Records the print marker of an order's kitchen ticket.
///
/// The printer is never called while a unit of work is open. A staged ticket
/// is dispatched to the printer after commit, so a jammed printer can never
/// roll back the inventory deduction committed alongside it. A reprint is
/// printed first and only its receipt is recorded here.
pub struct KitchenTicket {
    receipt: Option<PrintReceipt>,
}

impl KitchenTicket {
    pub fn staged() -> Self {
        Self { receipt: None }
    }

    /// A ticket that already came out of the printer.
    pub fn printed(receipt: PrintReceipt) -> Self {
        Self {
            receipt: Some(receipt),
        }
    }
}

#[async_trait]
impl SideEffect for KitchenTicket {
    /// `None` when the ticket was staged.
    type Output = Option<PrintReceipt>;

    fn kind(&self) -> SideEffectKind {
        SideEffectKind::PrintTicket
    }

    async fn perform(
        &self,
        _uow: &mut dyn UnitOfWork,
        _ctx: &EffectContext<'_>,
    ) -> Result<Performed<Option<PrintReceipt>>, FulfillmentError> {
        let Some(receipt) = &self.receipt else {
            return Ok(Performed::new(None).with_detail(serde_json::json!({ "staged": true })));
        };

        let path = receipt
            .rendered_path
            .as_ref()
            .map(|p| p.display().to_string());
        Ok(Performed::new(Some(receipt.clone()))
            .with_detail(serde_json::json!({ "staged": false, "rendered_path": path })))
    }
}
