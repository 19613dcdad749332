//! Data models for charges-service.

mod charge;
mod payment;

pub use charge::{
    Charge, ChargeStatistics, ChargeStatus, CreateCharge, ListChargesFilter,
};
pub use payment::{
    CreateResidentPayment, PaymentMethod, ResidentPayment, ResidentPaymentStatus,
};
