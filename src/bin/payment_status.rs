//! Polls a checkout until it settles, the way the membership success page does.
//!
//! Usage: `payment-status <session-id> [--complete-upgrade]`
//! When polling runs out while the record is still pending, the processor is
//! asked once through `verify-session` before giving up.
//! The API base URL comes from `CONCIERGE_API_URL` (default `http://127.0.0.1:3000`).

use std::env;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde_json::json;

use concierge_backend::models::payment_record::{PaymentKind, PaymentRecordView, PaymentStatus};
use concierge_backend::utils::polling::{poll_until_settled, PollOutcome, PollPolicy};

async fn fetch_status(
    client: &reqwest::Client,
    base_url: &str,
    session_id: &str,
) -> Result<PaymentRecordView> {
    let url = format!(
        "{}/api/payments/status?sessionId={}",
        base_url,
        urlencoding::encode(session_id)
    );
    let resp = client.get(&url).send().await.context("status request failed")?;
    if resp.status() != StatusCode::OK {
        bail!("status endpoint returned {}", resp.status());
    }
    resp.json::<PaymentRecordView>()
        .await
        .context("unexpected status payload")
}

async fn verify_with_processor(
    client: &reqwest::Client,
    base_url: &str,
    session_id: &str,
) -> Result<PaymentRecordView> {
    let resp = client
        .post(format!("{base_url}/api/payments/verify-session"))
        .json(&json!({ "sessionId": session_id }))
        .send()
        .await
        .context("verify-session request failed")?;
    if resp.status() != StatusCode::OK {
        bail!("verify-session returned {}", resp.status());
    }
    resp.json::<PaymentRecordView>()
        .await
        .context("unexpected verify-session payload")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut args = env::args().skip(1);
    let session_id = args
        .next()
        .context("usage: payment-status <session-id> [--complete-upgrade]")?;
    let complete_upgrade = args.any(|a| a == "--complete-upgrade");

    let base_url = env::var("CONCIERGE_API_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string())
        .trim_end_matches('/')
        .to_string();
    let client = reqwest::Client::new();

    let outcome = poll_until_settled(PollPolicy::default(), || {
        fetch_status(&client, &base_url, &session_id)
    })
    .await;

    println!("{}", outcome.label());
    let view = match outcome {
        PollOutcome::Succeeded(view) => view,
        PollOutcome::TimedOut { attempts, .. } => {
            let checked = verify_with_processor(&client, &base_url, &session_id).await?;
            if checked.status != PaymentStatus::Succeeded {
                println!("{} after {attempts} checks; try again shortly", checked.status);
                return Ok(());
            }
            println!("confirmed with the payment processor");
            checked
        }
        PollOutcome::Failed(_) | PollOutcome::Expired(_) => return Ok(()),
    };

    if complete_upgrade && view.kind == PaymentKind::Upgrade {
        let resp = client
            .post(format!("{base_url}/api/payments/complete-upgrade"))
            .json(&json!({ "paymentRecordId": view.payment_record_id }))
            .send()
            .await
            .context("complete-upgrade request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            bail!("complete-upgrade returned {status}: {body}");
        }
        println!(
            "membership: {}",
            body["user"]["membership"].as_str().unwrap_or("unknown")
        );
    }

    Ok(())
}
