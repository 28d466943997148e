use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::{AuthUser, UserRole};
use amora_shared::types::event::payloads;

use crate::config::PaymentsConfig;
use crate::events::{publisher, EventSink};
use crate::models::{NewPaymentTransaction, PaymentTransaction, PAYMENT_PENDING, PAYMENT_SUCCEEDED};
use crate::services::entitlements::Sku;
use crate::store::{EntitlementStore, PaymentStore, Transactional};

type HmacSha256 = Hmac<Sha256>;

/// Provider statuses that settle a purchase. Anything else is acknowledged and ignored.
const SUCCESS_STATUSES: [&str; 3] = ["succeeded", "paid", "success"];

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BeginRequest {
    pub sku: String,
    #[validate(length(min = 1, max = 128, message = "idempotency_key is required"))]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseView {
    pub transaction_id: i64,
    pub sku: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub idempotent: bool,
}

impl PurchaseView {
    fn new(tx: &PaymentTransaction, idempotent: bool) -> Self {
        Self {
            transaction_id: tx.id,
            sku: tx.product_sku.clone(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            status: tx.status.clone(),
            idempotent,
        }
    }
}

/// Creates a PENDING transaction, or returns the one already bound to the key.
pub fn begin<C: PaymentStore>(
    conn: &mut C,
    cfg: &PaymentsConfig,
    user_id: i64,
    req: &BeginRequest,
    now: DateTime<Utc>,
) -> AppResult<PurchaseView> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let sku = Sku::parse(&req.sku)?;
    let provider = cfg.default_provider.as_str();
    let key = req.idempotency_key.trim();

    if let Some(existing) = conn.find_by_idempotency_key(provider, key)? {
        return replay(existing, user_id, sku);
    }

    let new = NewPaymentTransaction {
        user_id,
        provider: provider.to_string(),
        idempotency_key: key.to_string(),
        amount: sku.price(),
        currency: cfg.currency.clone(),
        product_sku: sku.as_str().to_string(),
        status: PAYMENT_PENDING.to_string(),
        created_at: now,
        updated_at: now,
    };
    match conn.insert_pending(&new)? {
        Some(tx) => {
            tracing::info!(transaction_id = %tx.id, user_id = %user_id, sku = %tx.product_sku, "purchase started");
            Ok(PurchaseView::new(&tx, false))
        }
        // Lost a race on the same key.
        None => match conn.find_by_idempotency_key(provider, key)? {
            Some(existing) => replay(existing, user_id, sku),
            None => Err(AppError::internal("purchase vanished after conflict")),
        },
    }
}

fn replay(existing: PaymentTransaction, user_id: i64, sku: Sku) -> AppResult<PurchaseView> {
    if existing.user_id != user_id || existing.product_sku != sku.as_str() {
        return Err(AppError::new(ErrorCode::Conflict, "idempotency key already used for another purchase"));
    }
    Ok(PurchaseView::new(&existing, true))
}

/// Checks `X-Signature`: hex HMAC-SHA256 of the raw body under the webhook secret.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> AppResult<()> {
    if secret.is_empty() {
        return Err(AppError::unauthorized("payment webhook is not configured"));
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(format!("hmac key rejected: {e}")))?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    let provided = signature.trim().to_ascii_lowercase();

    if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
        Ok(())
    } else {
        Err(AppError::unauthorized("invalid webhook signature"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WebhookPayload {
    #[validate(length(min = 1, max = 128))]
    pub provider_event_id: String,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub idempotent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
}

impl WebhookResponse {
    fn repeat(transaction_id: Option<i64>) -> Self {
        Self { ok: true, idempotent: true, transaction_id }
    }
}

/// Settles a provider notification. Each `(provider, provider_event_id)` has
/// effect at most once; repeats answer `idempotent: true`.
pub async fn webhook<C>(
    conn: &mut C,
    sink: &dyn EventSink,
    provider: &str,
    payload: &WebhookPayload,
    raw: &serde_json::Value,
    now: DateTime<Utc>,
) -> AppResult<WebhookResponse>
where
    C: PaymentStore + EntitlementStore + Transactional + Send,
{
    payload
        .validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let event_id = payload.provider_event_id.trim();

    if let Some(seen) = conn.find_by_provider_event(provider, event_id)? {
        tracing::debug!(transaction_id = %seen.id, event_id = %event_id, "duplicate payment event");
        return Ok(WebhookResponse::repeat(Some(seen.id)));
    }

    let tx = conn
        .find_by_idempotency_key(provider, payload.idempotency_key.trim())?
        .ok_or_else(|| AppError::not_found("purchase not found"))?;

    if !SUCCESS_STATUSES.contains(&payload.status.trim().to_lowercase().as_str()) {
        tracing::info!(transaction_id = %tx.id, status = %payload.status, "payment event ignored");
        return Ok(WebhookResponse { ok: true, idempotent: false, transaction_id: Some(tx.id) });
    }

    match settle(conn, sink, tx, event_id, raw, now).await? {
        Some(tx) => Ok(WebhookResponse { ok: true, idempotent: false, transaction_id: Some(tx.id) }),
        None => Ok(WebhookResponse::repeat(None)),
    }
}

/// PENDING -> SUCCEEDED and the SKU grant, in one transaction. `None` when
/// the transaction had already settled.
async fn settle<C>(
    conn: &mut C,
    sink: &dyn EventSink,
    tx: PaymentTransaction,
    event_id: &str,
    raw: &serde_json::Value,
    now: DateTime<Utc>,
) -> AppResult<Option<PaymentTransaction>>
where
    C: PaymentStore + EntitlementStore + Transactional + Send,
{
    if tx.status == PAYMENT_SUCCEEDED {
        return Ok(None);
    }
    let sku = Sku::parse(&tx.product_sku)?;

    let settled = conn.in_transaction(|c| {
        let Some(settled) = c.mark_succeeded(tx.id, event_id, raw, now)? else {
            return Ok(None);
        };
        let mut ent = c.lock_entitlement(settled.user_id, now)?;
        sku.apply(&mut ent, now);
        c.save_entitlement(&ent)?;
        Ok(Some(settled))
    })?;

    if let Some(tx) = &settled {
        tracing::info!(
            transaction_id = %tx.id,
            user_id = %tx.user_id,
            sku = %tx.product_sku,
            event_id = %event_id,
            "payment succeeded"
        );
        publisher::publish_payment_succeeded(
            sink,
            payloads::PaymentSucceeded {
                transaction_id: tx.id,
                user_id: tx.user_id,
                provider: tx.provider.clone(),
                product_sku: tx.product_sku.clone(),
                amount: tx.amount,
                currency: tx.currency.clone(),
            },
        )
        .await;
    }
    Ok(settled)
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevGrantRequest {
    pub sku: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Begin and confirm in one go, with synthetic keys. Owners may grant to
/// anyone; others only to themselves and only when dev grants are enabled.
pub async fn dev_grant<C>(
    conn: &mut C,
    sink: &dyn EventSink,
    cfg: &PaymentsConfig,
    caller: &AuthUser,
    req: &DevGrantRequest,
    now: DateTime<Utc>,
) -> AppResult<PurchaseView>
where
    C: PaymentStore + EntitlementStore + Transactional + Send,
{
    let target = req.user_id.unwrap_or(caller.id);
    let allowed = caller.role == UserRole::Owner || (cfg.dev_grants && target == caller.id);
    if !allowed {
        return Err(AppError::forbidden("dev grants are not allowed"));
    }

    let key = format!("dev:{}", Uuid::new_v4());
    let begin_req = BeginRequest { sku: req.sku.clone(), idempotency_key: key.clone() };
    let started = begin(conn, cfg, target, &begin_req, now)?;

    let tx = conn
        .find_by_idempotency_key(&cfg.default_provider, &key)?
        .ok_or_else(|| AppError::internal("dev purchase not found"))?;
    let raw = serde_json::json!({ "source": "dev_grant", "granted_by": caller.id });
    let settled = settle(conn, sink, tx, &key, &raw, now)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::Conflict, "dev purchase already settled"))?;

    tracing::info!(granted_by = %caller.id, user_id = %target, sku = %started.sku, "dev grant applied");
    Ok(PurchaseView::new(&settled, false))
}
