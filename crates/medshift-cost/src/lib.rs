// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request pricing and credit ledger bookkeeping.
//!
//! This crate provides:
//! - **Pricing**: the credit cost of an urgent request from its urgency tier
//!   and visibility flags
//! - **Ledger**: construction and consistency checks for credit ledger entries

pub mod ledger;
pub mod pricing;

pub use ledger::{LedgerReason, LedgerSummary};
pub use pricing::{price_request, PriceBreakdown, PricingTable};
