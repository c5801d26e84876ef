use std::collections::HashMap;

use super::{
    CheckoutLineItem, CheckoutSession, CheckoutSessionState, CreateCheckoutSessionRequest,
    StripeEvent, StripeService, StripeServiceError,
};
use async_trait::async_trait;

pub struct LiveStripeService {
    client: stripe::Client,
    webhook_secret: String,
}

impl LiveStripeService {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        let client = stripe::Client::new(secret_key);
        Self {
            client,
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.webhook_secret.clone())
    }
}

fn map_currency(code: &str) -> Result<stripe::Currency, StripeServiceError> {
    match code.to_ascii_lowercase().as_str() {
        "usd" => Ok(stripe::Currency::USD),
        "eur" => Ok(stripe::Currency::EUR),
        "gbp" => Ok(stripe::Currency::GBP),
        other => Err(StripeServiceError::Other(format!(
            "unsupported currency: {other}"
        ))),
    }
}

fn map_line_item(
    item: &CheckoutLineItem,
) -> Result<stripe::CreateCheckoutSessionLineItems, StripeServiceError> {
    Ok(stripe::CreateCheckoutSessionLineItems {
        price_data: Some(stripe::CreateCheckoutSessionLineItemsPriceData {
            currency: map_currency(&item.currency)?,
            unit_amount: Some(item.unit_amount),
            product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                name: item.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        quantity: Some(item.quantity),
        ..Default::default()
    })
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        let line_item = map_line_item(&req.line_item)?;
        let metadata: HashMap<String, String> = req
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Payment);
        params.success_url = Some(&req.success_url);
        params.cancel_url = Some(&req.cancel_url);
        params.customer_email = Some(&req.customer_email);
        params.client_reference_id = Some(&req.client_reference_id);
        params.line_items = Some(vec![line_item]);
        params.metadata = Some(metadata.clone());
        // Carried on the intent so payment_intent.* events can find the record.
        params.payment_intent_data = Some(stripe::CreateCheckoutSessionPaymentIntentData {
            metadata: Some(metadata),
            ..Default::default()
        });

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        let payload_str =
            std::str::from_utf8(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let event =
            stripe::Webhook::construct_event(payload_str, signature_header, &self.webhook_secret)?;
        let payload =
            serde_json::to_value(&event).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        Ok(StripeEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionState, StripeServiceError> {
        let id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;
        let session = stripe::CheckoutSession::retrieve(&self.client, &id, &[]).await?;

        Ok(CheckoutSessionState {
            id: session.id.to_string(),
            payment_status: Some(session.payment_status.as_str().to_string()),
            status: session.status.map(|s| s.as_str().to_string()),
            payment_intent: session.payment_intent.as_ref().map(|pi| pi.id().to_string()),
            customer: session.customer.as_ref().map(|c| c.id().to_string()),
        })
    }
}
