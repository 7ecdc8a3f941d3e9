//! Credit balances, ledger rows and purchasable packages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ledger entry kind, stored as text in `credit_transactions.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Purchase,
    Usage,
    Refund,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Usage => "usage",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }
}

/// One row of the credit ledger
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    /// Positive for purchases and refunds, negative for usage
    pub amount: i64,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `GET /api/credits`
#[derive(Debug, Clone, Serialize)]
pub struct CreditBalance {
    pub balance: i64,
    pub transactions: Vec<CreditTransaction>,
}

/// A bundle of credits sold through Stripe Checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub id: String,
    pub credits: i64,
    /// Price in the smallest currency unit
    pub amount_cents: i64,
}

impl CreditPackage {
    /// Parse `id:credits:amount_cents` entries separated by commas,
    /// e.g. `starter:10:900,growth:50:3900`
    pub fn parse_list(list: &str) -> Result<Vec<Self>, String> {
        let mut packages: Vec<Self> = Vec::new();

        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [id, credits, amount] = parts.as_slice() else {
                return Err(format!(
                    "invalid package '{}', expected id:credits:amount_cents",
                    entry
                ));
            };

            let credits: i64 = credits
                .parse()
                .map_err(|e| format!("invalid credits in '{}': {}", entry, e))?;
            let amount_cents: i64 = amount
                .parse()
                .map_err(|e| format!("invalid amount in '{}': {}", entry, e))?;
            if id.is_empty() || credits <= 0 || amount_cents <= 0 {
                return Err(format!(
                    "package '{}' needs an id and positive credits and amount",
                    entry
                ));
            }
            if packages.iter().any(|p| p.id == *id) {
                return Err(format!("duplicate package id '{}'", id));
            }

            packages.push(Self {
                id: id.to_string(),
                credits,
                amount_cents,
            });
        }

        Ok(packages)
    }
}
