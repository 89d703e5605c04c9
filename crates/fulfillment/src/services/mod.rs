//! Collaborator traits and their implementations.

pub mod notification;
pub mod printing;

pub use notification::{BroadcastNotifier, InMemoryNotifier, NotifyError, Notifier};
pub use printing::{
    FileTicketPrinter, InMemoryTicketPrinter, PrintError, PrintReceipt, PrintedTicket,
    TicketPrinter, render_ticket,
};
