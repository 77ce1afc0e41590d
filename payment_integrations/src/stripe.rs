use std::fmt::Debug;

use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Method,
};
use serde::Deserialize;
use shop_engine::traits::{CardIntent, CardIntentRequest, CardIntentStatus, CardProcessor, CardProcessorError};

use crate::{helpers::to_minor_units, IntegrationError, RestClient, StripeConfig};

#[derive(Debug, Clone, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
}

impl PaymentIntent {
    fn card_status(&self) -> CardIntentStatus {
        match self.status.as_str() {
            "succeeded" => CardIntentStatus::Succeeded,
            "processing" | "requires_capture" => CardIntentStatus::Processing,
            "canceled" => CardIntentStatus::Canceled,
            _ => CardIntentStatus::RequiresPayment,
        }
    }
}

/// Creates and follows Stripe payment intents. Live and sandbox keys are held side by side so that `card` and
/// `card_test` orders can be served by the same instance. A missing key disables that mode only.
#[derive(Clone)]
pub struct StripeCardProcessor {
    live: Option<RestClient>,
    test: Option<RestClient>,
}

impl Debug for StripeCardProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StripeCardProcessor(live: {}, test: {})", self.live.is_some(), self.test.is_some())
    }
}

impl StripeCardProcessor {
    pub fn new(config: &StripeConfig) -> Result<Self, IntegrationError> {
        let live = Self::client_for(&config.api_url, config.secret_key.reveal(), config)?;
        let test = Self::client_for(&config.api_url, config.test_secret_key.reveal(), config)?;
        if live.is_none() && test.is_none() {
            warn!("💳️ No Stripe keys are configured. Card payments will fail until one is set.");
        }
        Ok(Self { live, test })
    }

    fn client_for(url: &str, key: &str, config: &StripeConfig) -> Result<Option<RestClient>, IntegrationError> {
        if key.trim().is_empty() {
            return Ok(None);
        }
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| IntegrationError::Initialization(format!("Invalid Stripe key. {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        RestClient::new(url, headers, config.timeout).map(Some)
    }

    fn client(&self, test_mode: bool) -> Result<&RestClient, IntegrationError> {
        let client = if test_mode { self.test.as_ref() } else { self.live.as_ref() };
        client.ok_or(IntegrationError::NotConfigured(if test_mode { "stripe test" } else { "stripe" }))
    }

    async fn create(&self, request: CardIntentRequest) -> Result<CardIntent, IntegrationError> {
        let client = self.client(request.test_mode)?;
        let form = intent_form(&request)?;
        let req = client
            .request(Method::POST, "/payment_intents")
            .header("Idempotency-Key", request.order_uuid.as_str())
            .form(&form);
        let intent = client.send::<PaymentIntent>(req).await?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            IntegrationError::JsonError(format!("Intent {} came back without a client secret", intent.id))
        })?;
        debug!("💳️ Created payment intent {} for order {}", intent.id, request.order_uuid);
        Ok(CardIntent { id: intent.id, client_secret })
    }

    async fn fetch(&self, intent_id: &str, test_mode: bool) -> Result<PaymentIntent, IntegrationError> {
        let client = self.client(test_mode)?;
        client.get::<PaymentIntent>(&format!("/payment_intents/{intent_id}"), &[]).await
    }

    async fn cancel(&self, intent_id: &str, test_mode: bool) -> Result<PaymentIntent, IntegrationError> {
        let client = self.client(test_mode)?;
        client.post_form::<PaymentIntent>(&format!("/payment_intents/{intent_id}/cancel"), &[]).await
    }
}

fn intent_form(request: &CardIntentRequest) -> Result<Vec<(&'static str, String)>, IntegrationError> {
    let amount = to_minor_units(request.amount, &request.currency)?;
    let mut form = vec![
        ("amount", amount.to_string()),
        ("currency", request.currency.to_lowercase()),
        ("automatic_payment_methods[enabled]", "true".to_string()),
        ("metadata[order_uuid]", request.order_uuid.clone()),
    ];
    if let Some(email) = &request.receipt_email {
        form.push(("receipt_email", email.clone()));
    }
    Ok(form)
}

#[async_trait]
impl CardProcessor for StripeCardProcessor {
    async fn create_intent(&self, request: CardIntentRequest) -> Result<CardIntent, CardProcessorError> {
        Ok(self.create(request).await?)
    }

    async fn fetch_intent_status(
        &self,
        intent_id: &str,
        test_mode: bool,
    ) -> Result<CardIntentStatus, CardProcessorError> {
        let intent = self.fetch(intent_id, test_mode).await?;
        trace!("💳️ Intent {intent_id} is {}", intent.status);
        Ok(intent.card_status())
    }

    async fn cancel_intent(&self, intent_id: &str, test_mode: bool) -> Result<(), CardProcessorError> {
        match self.cancel(intent_id, test_mode).await {
            Ok(intent) => {
                debug!("💳️ Intent {intent_id} is now {}", intent.status);
                Ok(())
            },
            // Stripe refuses to cancel an intent that is already canceled
            Err(IntegrationError::QueryError { status: 400, message }) if message.contains("canceled") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
