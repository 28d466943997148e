use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use amora_shared::errors::AppResult;

use crate::models::{NewPaymentTransaction, PaymentTransaction, PAYMENT_PENDING, PAYMENT_SUCCEEDED};
use crate::schema::payment_transactions;
use crate::store::PaymentStore;

impl PaymentStore for PgConnection {
    fn find_by_idempotency_key(&mut self, provider: &str, key: &str) -> AppResult<Option<PaymentTransaction>> {
        let tx = payment_transactions::table
            .filter(payment_transactions::provider.eq(provider))
            .filter(payment_transactions::idempotency_key.eq(key))
            .select(PaymentTransaction::as_select())
            .first(self)
            .optional()?;
        Ok(tx)
    }

    fn find_by_provider_event(&mut self, provider: &str, event_id: &str) -> AppResult<Option<PaymentTransaction>> {
        let tx = payment_transactions::table
            .filter(payment_transactions::provider.eq(provider))
            .filter(payment_transactions::provider_event_id.eq(event_id))
            .select(PaymentTransaction::as_select())
            .first(self)
            .optional()?;
        Ok(tx)
    }

    fn insert_pending(&mut self, new: &NewPaymentTransaction) -> AppResult<Option<PaymentTransaction>> {
        let tx = diesel::insert_into(payment_transactions::table)
            .values(new)
            .on_conflict((payment_transactions::provider, payment_transactions::idempotency_key))
            .do_nothing()
            .returning(PaymentTransaction::as_returning())
            .get_result(self)
            .optional()?;
        Ok(tx)
    }

    fn mark_succeeded(
        &mut self,
        transaction_id: i64,
        provider_event_id: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> AppResult<Option<PaymentTransaction>> {
        let tx = diesel::update(
            payment_transactions::table
                .find(transaction_id)
                .filter(payment_transactions::status.eq(PAYMENT_PENDING)),
        )
        .set((
            payment_transactions::status.eq(PAYMENT_SUCCEEDED),
            payment_transactions::provider_event_id.eq(Some(provider_event_id)),
            payment_transactions::result_payload.eq(Some(payload.clone())),
            payment_transactions::updated_at.eq(now),
        ))
        .returning(PaymentTransaction::as_returning())
        .get_result(self)
        .optional()?;
        Ok(tx)
    }
}
