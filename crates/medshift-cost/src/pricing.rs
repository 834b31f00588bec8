// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit pricing for urgent requests.
//!
//! Stable pricing contract:
//!
//! | component       | credits |
//! |-----------------|---------|
//! | base            | 10      |
//! | urgency normal  | +0      |
//! | urgency high    | +5      |
//! | urgency critical| +10     |
//! | urgency emergency| +20    |
//! | priority boost  | +15     |
//! | featured        | +25     |

use medshift_config::model::PricingConfig;
use medshift_core::Urgency;
use serde::Serialize;

/// Credit amounts for each pricing component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingTable {
    pub base: u32,
    pub normal: u32,
    pub high: u32,
    pub critical: u32,
    pub emergency: u32,
    pub priority_boost: u32,
    pub featured: u32,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::from(&PricingConfig::default())
    }
}

impl From<&PricingConfig> for PricingTable {
    fn from(config: &PricingConfig) -> Self {
        Self {
            base: config.base,
            normal: config.normal,
            high: config.high,
            critical: config.critical,
            emergency: config.emergency,
            priority_boost: config.priority_boost,
            featured: config.featured,
        }
    }
}

/// Itemized cost of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub base: u32,
    pub urgency: u32,
    pub priority_boost: u32,
    pub featured: u32,
}

impl PriceBreakdown {
    pub fn total(&self) -> u32 {
        self.base + self.urgency + self.priority_boost + self.featured
    }
}

impl PricingTable {
    /// Surcharge for one urgency tier.
    pub fn urgency_surcharge(&self, urgency: Urgency) -> u32 {
        match urgency {
            Urgency::Normal => self.normal,
            Urgency::High => self.high,
            Urgency::Critical => self.critical,
            Urgency::Emergency => self.emergency,
        }
    }

    /// Itemize the cost of a request with the given tier and flags.
    pub fn breakdown(&self, urgency: Urgency, priority_boost: bool, featured: bool) -> PriceBreakdown {
        PriceBreakdown {
            base: self.base,
            urgency: self.urgency_surcharge(urgency),
            priority_boost: if priority_boost { self.priority_boost } else { 0 },
            featured: if featured { self.featured } else { 0 },
        }
    }

    /// Total credit cost of a request with the given tier and flags.
    pub fn price(&self, urgency: Urgency, priority_boost: bool, featured: bool) -> u32 {
        self.breakdown(urgency, priority_boost, featured).total()
    }
}

/// Price a request against the default pricing table.
pub fn price_request(urgency: Urgency, priority_boost: bool, featured: bool) -> u32 {
    PricingTable::default().price(urgency, priority_boost, featured)
}
