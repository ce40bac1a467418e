//! Pass-through payment calls: cloning payment methods onto connected accounts,
//! customers, direct charges and independent charges.

mod client;
mod types;

pub use client::{PaymentsClient, API_VERSION};
pub use types::{Account, ChargeRequest, ClonedPaymentMethod, Customer, PaymentIntent, PaymentMethod};
