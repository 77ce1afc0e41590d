use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_common::Decimal;
use thiserror::Error;

use crate::db_types::Money;

//--------------------------------------     Card processor     --------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum CardProcessorError {
    #[error("Card processor is not configured: {0}")]
    NotConfigured(String),
    #[error("Card processor request failed: {0}")]
    RequestFailed(String),
    #[error("Card processor rejected the request. Status {status}. {message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected card processor response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardIntentRequest {
    pub order_uuid: String,
    pub amount: Money,
    /// ISO 4217 code of `amount`
    pub currency: String,
    pub receipt_email: Option<String>,
    /// Use the processor's sandbox credentials
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardIntentStatus {
    RequiresPayment,
    Processing,
    Succeeded,
    Canceled,
}

/// A card payment processor that works with payment intents: the server creates an intent, the storefront completes
/// it with the returned client secret, and the processor reports the outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CardProcessor: Send + Sync {
    async fn create_intent(&self, request: CardIntentRequest) -> Result<CardIntent, CardProcessorError>;

    async fn fetch_intent_status(&self, intent_id: &str, test_mode: bool)
        -> Result<CardIntentStatus, CardProcessorError>;

    async fn cancel_intent(&self, intent_id: &str, test_mode: bool) -> Result<(), CardProcessorError>;
}

//--------------------------------------     Chain explorer     --------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ExplorerError {
    #[error("Explorer request failed: {0}")]
    RequestFailed(String),
    #[error("Explorer request timed out")]
    Timeout,
    #[error("Unexpected explorer response: {0}")]
    InvalidResponse(String),
}

/// An incoming transfer as reported by a chain explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub tx_id: String,
    pub from: String,
    pub to: String,
    /// Integer amount in the token's smallest unit, as a decimal string
    pub value: String,
    /// `None` for the chain's native coin
    pub token_contract: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainExplorer: Send + Sync {
    /// All recent incoming transfers to `address`.
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>, ExplorerError>;
}

//--------------------------------------       Rate source      --------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum RateSourceError {
    #[error("Rate request failed: {0}")]
    RequestFailed(String),
    #[error("Unexpected rate response: {0}")]
    InvalidResponse(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Exchange rates as units of each currency per one unit of `base`.
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, Decimal>, RateSourceError>;
}

//--------------------------------------         Mailer         --------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum MailerError {
    #[error("Could not deliver mail to {to}: {reason}")]
    DeliveryFailed { to: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailerError>;
}
