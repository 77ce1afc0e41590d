use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use shop_common::Decimal;

use crate::traits::{
    CardIntent,
    CardIntentRequest,
    CardIntentStatus,
    CardProcessor,
    CardProcessorError,
    ChainExplorer,
    Email,
    ExplorerError,
    Mailer,
    MailerError,
    RateSource,
    RateSourceError,
    TokenTransfer,
};

//--------------------------------------     Card processor     --------------------------------------------------------
/// A card processor that keeps its intents in memory. Intents start out as `RequiresPayment`; tests move them along
/// with [`FakeCardProcessor::set_status`].
#[derive(Debug, Default)]
pub struct FakeCardProcessor {
    intents: Mutex<Vec<(CardIntent, CardIntentRequest, CardIntentStatus)>>,
    fail_requests: AtomicBool,
}

impl FakeCardProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`CardProcessorError::RequestFailed`].
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, intent_id: &str, status: CardIntentStatus) {
        let mut intents = self.intents.lock().expect("card processor lock poisoned");
        if let Some(entry) = intents.iter_mut().find(|(intent, _, _)| intent.id == intent_id) {
            entry.2 = status;
        }
    }

    pub fn status_of(&self, intent_id: &str) -> Option<CardIntentStatus> {
        let intents = self.intents.lock().expect("card processor lock poisoned");
        intents.iter().find(|(intent, _, _)| intent.id == intent_id).map(|(_, _, status)| *status)
    }

    pub fn requests(&self) -> Vec<CardIntentRequest> {
        let intents = self.intents.lock().expect("card processor lock poisoned");
        intents.iter().map(|(_, request, _)| request.clone()).collect()
    }

    /// The id of the most recent intent created for `order_uuid`.
    pub fn intent_for(&self, order_uuid: &str) -> Option<String> {
        let intents = self.intents.lock().expect("card processor lock poisoned");
        intents.iter().rev().find(|(_, request, _)| request.order_uuid == order_uuid).map(|(i, _, _)| i.id.clone())
    }

    fn check_available(&self) -> Result<(), CardProcessorError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            Err(CardProcessorError::RequestFailed("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CardProcessor for FakeCardProcessor {
    async fn create_intent(&self, request: CardIntentRequest) -> Result<CardIntent, CardProcessorError> {
        self.check_available()?;
        let mut intents = self.intents.lock().expect("card processor lock poisoned");
        let n = intents.len() + 1;
        let intent = CardIntent { id: format!("pi_test_{n}"), client_secret: format!("pi_test_{n}_secret_{n}") };
        intents.push((intent.clone(), request, CardIntentStatus::RequiresPayment));
        Ok(intent)
    }

    async fn fetch_intent_status(
        &self,
        intent_id: &str,
        _test_mode: bool,
    ) -> Result<CardIntentStatus, CardProcessorError> {
        self.check_available()?;
        self.status_of(intent_id).ok_or_else(|| CardProcessorError::Rejected {
            status: 404,
            message: format!("No such payment intent: {intent_id}"),
        })
    }

    async fn cancel_intent(&self, intent_id: &str, _test_mode: bool) -> Result<(), CardProcessorError> {
        self.check_available()?;
        self.set_status(intent_id, CardIntentStatus::Canceled);
        Ok(())
    }
}

//--------------------------------------     Chain explorer     --------------------------------------------------------
/// A chain explorer that reports whatever transfers the test has scripted.
#[derive(Debug, Default)]
pub struct FakeExplorer {
    transfers: Mutex<HashMap<String, Vec<TokenTransfer>>>,
    calls: AtomicUsize,
}

impl FakeExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transfer of `value` smallest units of `token_contract` to `to`, timestamped now.
    pub fn pay(&self, to: &str, value: u128, token_contract: Option<&str>) {
        let mut transfers = self.transfers.lock().expect("explorer lock poisoned");
        let entry = transfers.entry(to.to_string()).or_default();
        let transfer = TokenTransfer {
            tx_id: format!("tx{}", entry.len() + 1),
            from: "TPayer".to_string(),
            to: to.to_string(),
            value: value.to_string(),
            token_contract: token_contract.map(String::from),
            timestamp: Utc::now(),
        };
        entry.push(transfer);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainExplorer for FakeExplorer {
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>, ExplorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let transfers = self.transfers.lock().expect("explorer lock poisoned");
        Ok(transfers.get(address).cloned().unwrap_or_default())
    }
}

//--------------------------------------       Rate source      --------------------------------------------------------
/// Always returns the same table.
#[derive(Debug, Clone, Default)]
pub struct FixedRates(pub HashMap<String, Decimal>);

#[async_trait]
impl RateSource for FixedRates {
    async fn fetch_rates(&self, _base: &str) -> Result<HashMap<String, Decimal>, RateSourceError> {
        Ok(self.0.clone())
    }
}

//--------------------------------------         Mailer         --------------------------------------------------------
/// Keeps every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<Email> {
        self.sent().into_iter().filter(|e| e.to == address).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        self.sent.lock().expect("mailer lock poisoned").push(email);
        Ok(())
    }
}
