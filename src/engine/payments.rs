use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::dispatch::DispatchCoordinator;
use crate::engine::lifecycle::BookingStateMachine;
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, PaymentMethod, PaymentStatus};
use crate::models::context::{RequestContext, Role};
use crate::models::driver::Driver;
use crate::providers::{bounded, PaymentProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Full,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOrder {
    pub order_id: String,
    pub booking_id: Uuid,
    pub booking_code: String,
    pub amount: Decimal,
    pub payment_type: PaymentType,
}

const DEFAULT_REFUND_REASON: &str = "Booking cancelled";

#[derive(Debug, Clone, Serialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount: Decimal,
    pub reason: String,
    pub booking: Booking,
}

/// Provider webhook body. Only the payment entity is read.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment: PaymentEnvelope,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEnvelope {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Captured {
        booking_id: Uuid,
        booking_code: String,
        payment_status: PaymentStatus,
    },
    Ignored {
        event: String,
    },
}

/// Online payments and cash settlement on top of the dispatch core. Every
/// provider call is bounded; booking changes still go through one commit.
pub struct PaymentDesk {
    dispatch: Arc<DispatchCoordinator>,
    provider: Arc<dyn PaymentProvider>,
    timeout: Duration,
    advance_percent: Decimal,
}

impl PaymentDesk {
    pub fn new(
        dispatch: Arc<DispatchCoordinator>,
        provider: Arc<dyn PaymentProvider>,
        timeout: Duration,
        advance_percent: Decimal,
    ) -> Self {
        Self {
            dispatch,
            provider,
            timeout,
            advance_percent,
        }
    }

    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        payment_type: PaymentType,
    ) -> Result<PaymentOrder, AppError> {
        ctx.require(Role::Customer)?;
        let booking = self.dispatch.load(booking_id).await?;
        ensure_owner(ctx, &booking)?;

        if booking.status == BookingStatus::Cancelled {
            return Err(AppError::InvalidState(format!(
                "booking {} is cancelled",
                booking.code
            )));
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(AppError::Conflict(format!(
                "booking {} is already paid",
                booking.code
            )));
        }

        let amount = match payment_type {
            PaymentType::Full => booking.estimated_fare,
            PaymentType::Partial => (booking.estimated_fare * self.advance_percent
                / Decimal::ONE_HUNDRED)
                .round_dp(2)
                .normalize(),
        };

        let order_id = bounded(
            self.timeout,
            "payment order",
            self.provider.create_order(amount, &booking.code),
        )
        .await?;

        let stored_order = order_id.clone();
        let committed = self
            .dispatch
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, _driver: Option<&mut Driver>| {
                    if booking.payment_status == PaymentStatus::Paid {
                        return Err(AppError::Conflict(format!(
                            "booking {} is already paid",
                            booking.code
                        )));
                    }
                    booking.payment_order_id = Some(stored_order);
                    booking.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        info!(booking_code = %committed.booking.code, %amount, ?payment_type, "payment order created");
        Ok(PaymentOrder {
            order_id,
            booking_id,
            booking_code: committed.booking.code,
            amount,
            payment_type,
        })
    }

    pub async fn verify(
        &self,
        ctx: &RequestContext,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<Booking, AppError> {
        let valid = bounded(
            self.timeout,
            "signature check",
            self.provider.verify_signature(order_id, payment_id, signature),
        )
        .await?;
        if !valid {
            warn!(order_id, "payment signature rejected");
            return Err(AppError::Validation("invalid payment signature".to_string()));
        }

        let booking = self.dispatch.find_by_order(order_id).await?;
        ensure_owner(ctx, &booking)?;

        let booking = self.record_capture(booking.id, payment_id).await?;
        info!(booking_code = %booking.code, payment_id, "payment verified");
        Ok(booking)
    }

    /// Records a payment the provider reports as captured. A repeated
    /// delivery for the payment already on the booking changes nothing.
    pub async fn capture(&self, order_id: &str, payment_id: &str) -> Result<Booking, AppError> {
        let booking = self.dispatch.find_by_order(order_id).await?;
        if booking.payment_id.as_deref() == Some(payment_id) {
            debug!(booking_code = %booking.code, payment_id, "payment already recorded");
            return Ok(booking);
        }

        let booking = self.record_capture(booking.id, payment_id).await?;
        info!(booking_code = %booking.code, payment_id, "payment captured");
        Ok(booking)
    }

    /// Entry point for provider webhooks. Only `payment.captured` changes a
    /// booking; failures and unknown events are acknowledged and logged.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome, AppError> {
        let valid = bounded(
            self.timeout,
            "webhook signature check",
            self.provider.verify_webhook(payload, signature),
        )
        .await?;
        if !valid {
            warn!("payment webhook signature rejected");
            return Err(AppError::Validation("invalid webhook signature".to_string()));
        }

        let WebhookEvent { event, payload } = serde_json::from_slice::<WebhookEvent>(payload)
            .map_err(|err| AppError::Validation(format!("malformed webhook payload: {err}")))?;

        match (event.as_str(), payload.map(|payload| payload.payment.entity)) {
            ("payment.captured", Some(entity)) => {
                match self.capture(&entity.order_id, &entity.id).await {
                    Ok(booking) => Ok(WebhookOutcome::Captured {
                        booking_id: booking.id,
                        booking_code: booking.code,
                        payment_status: booking.payment_status,
                    }),
                    Err(AppError::NotFound(msg)) => {
                        warn!(order_id = %entity.order_id, %msg, "captured payment for unknown order");
                        Ok(WebhookOutcome::Ignored { event: event.clone() })
                    }
                    Err(err) => Err(err),
                }
            }
            ("payment.failed", Some(entity)) => {
                info!(order_id = %entity.order_id, "payment failed, booking left open for retry");
                Ok(WebhookOutcome::Ignored { event: event.clone() })
            }
            _ => {
                debug!(%event, "payment webhook ignored");
                Ok(WebhookOutcome::Ignored { event: event.clone() })
            }
        }
    }

    async fn record_capture(&self, booking_id: Uuid, payment_id: &str) -> Result<Booking, AppError> {
        let amount_paid = bounded(
            self.timeout,
            "payment fetch",
            self.provider.fetch_payment(payment_id),
        )
        .await?;

        let payment_id = payment_id.to_string();
        let now = Utc::now();
        let committed = self
            .dispatch
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, _driver: Option<&mut Driver>| {
                    BookingStateMachine::record_payment(booking, payment_id, amount_paid, now)
                }),
            )
            .await?;

        debug!(
            booking_code = %committed.booking.code,
            %amount_paid,
            payment_status = ?committed.booking.payment_status,
            "payment recorded"
        );
        Ok(committed.booking)
    }

    /// Refunds a cancelled booking, in full unless `amount` asks for less
    /// than was captured. The booking is checked before the provider is
    /// called and again inside the commit.
    pub async fn refund(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
    ) -> Result<RefundReceipt, AppError> {
        ctx.require(Role::Admin)?;
        let booking = self.dispatch.load(booking_id).await?;

        let mut dry_run = booking.clone();
        BookingStateMachine::mark_refunded(&mut dry_run, Utc::now())?;
        let payment_id = booking.payment_id.clone().ok_or_else(|| {
            AppError::InvalidState(format!("booking {} has no recorded payment", booking.code))
        })?;

        let captured = bounded(
            self.timeout,
            "payment fetch",
            self.provider.fetch_payment(&payment_id),
        )
        .await?;
        let amount = match amount {
            None => captured,
            Some(requested) if requested <= Decimal::ZERO => {
                return Err(AppError::Validation(format!(
                    "refund amount must be positive, got {requested}"
                )));
            }
            Some(requested) if requested > captured => {
                return Err(AppError::Validation(format!(
                    "refund of {requested} exceeds the captured {captured}"
                )));
            }
            Some(requested) => requested.normalize(),
        };
        let reason = reason
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());

        let refund_id = bounded(
            self.timeout,
            "refund",
            self.provider.refund(&payment_id, amount, &reason),
        )
        .await?;

        let now = Utc::now();
        let committed = self
            .dispatch
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, _driver: Option<&mut Driver>| {
                    BookingStateMachine::mark_refunded(booking, now)
                }),
            )
            .await?;

        info!(
            booking_code = %committed.booking.code,
            %refund_id,
            %amount,
            %captured,
            %reason,
            "payment refunded"
        );
        Ok(RefundReceipt {
            refund_id,
            amount,
            reason,
            booking: committed.booking,
        })
    }

    /// Cash collected by the driver: settles a completed booking as paid.
    pub async fn record_cash_payment(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        final_fare: Option<Decimal>,
    ) -> Result<Booking, AppError> {
        ctx.require(Role::Admin)?;
        self.dispatch
            .settle(
                booking_id,
                final_fare,
                PaymentStatus::Paid,
                Some(PaymentMethod::Cash),
            )
            .await
    }
}

fn ensure_owner(ctx: &RequestContext, booking: &Booking) -> Result<(), AppError> {
    if ctx.is_admin() || booking.customer_id == ctx.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "booking {} belongs to someone else",
            booking.code
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::{PaymentDesk, PaymentType, WebhookOutcome};
    use crate::engine::dispatch::{BookingRequest, DispatchCoordinator, DispatchSettings};
    use crate::engine::fare::FareCalculator;
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::booking::{
        Booking, BookingStatus, Goods, PaymentMethod, PaymentStatus, Stop,
    };
    use crate::models::context::{RequestContext, Role};
    use crate::models::driver::DriverStatus;
    use crate::observability::metrics::Metrics;
    use crate::providers::{OfflineRoutes, PaymentProvider};
    use crate::store::memory::InMemoryStore;

    struct FakeGateway {
        captured: Decimal,
        signature_ok: bool,
        refunds: AtomicUsize,
        last_refund: Mutex<Option<(Decimal, String)>>,
    }

    #[async_trait]
    impl PaymentProvider for FakeGateway {
        async fn create_order(&self, amount: Decimal, reference: &str) -> Result<String, AppError> {
            Ok(format!("order_{reference}_{amount}"))
        }

        async fn verify_signature(&self, _order_id: &str, _payment_id: &str, _signature: &str) -> Result<bool, AppError> {
            Ok(self.signature_ok)
        }

        async fn fetch_payment(&self, _payment_id: &str) -> Result<Decimal, AppError> {
            Ok(self.captured)
        }

        async fn refund(&self, payment_id: &str, amount: Decimal, reason: &str) -> Result<String, AppError> {
            self.refunds.fetch_add(1, Ordering::SeqCst);
            *self.last_refund.lock().unwrap() = Some((amount, reason.to_string()));
            Ok(format!("rfnd_{payment_id}"))
        }

        async fn verify_webhook(&self, _payload: &[u8], signature: &str) -> Result<bool, AppError> {
            Ok(self.signature_ok && signature == "whsec")
        }
    }

    fn gateway(captured: Decimal, signature_ok: bool) -> Arc<FakeGateway> {
        Arc::new(FakeGateway {
            captured,
            signature_ok,
            refunds: AtomicUsize::new(0),
            last_refund: Mutex::new(None),
        })
    }

    fn desk(provider: Arc<dyn PaymentProvider>) -> PaymentDesk {
        let (events, _rx) = broadcast::channel(16);
        let dispatch = DispatchCoordinator::new(
            Arc::new(InMemoryStore::new()),
            FareCalculator::default(),
            Arc::new(OfflineRoutes),
            events,
            Metrics::new(),
            DispatchSettings::default(),
        );
        PaymentDesk::new(Arc::new(dispatch), provider, Duration::from_secs(1), dec!(50))
    }

    async fn book(desk: &PaymentDesk, customer: &RequestContext) -> Booking {
        let stop = |lat: f64, lng: f64| Stop {
            address: "Gachibowli".to_string(),
            location: GeoPoint::new(lat, lng),
            city: None,
        };
        desk.dispatch
            .create_booking(
                customer,
                BookingRequest {
                    pickup: stop(17.44, 78.35),
                    drop: stop(17.50, 78.40),
                    goods: Goods {
                        kind: "electronics".to_string(),
                        weight_kg: Some(200),
                        volume_cubic_ft: None,
                        image: None,
                        special_instructions: Some("fragile".to_string()),
                    },
                    scheduled_date: Utc::now(),
                },
            )
            .await
            .unwrap()
            .booking
    }

    #[tokio::test]
    async fn partial_order_is_half_of_estimate() {
        let desk = desk(gateway(dec!(0), true));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let booking = book(&desk, &customer).await;

        let order = desk
            .create_order(&customer, booking.id, PaymentType::Partial)
            .await
            .unwrap();
        assert_eq!(order.amount, booking.estimated_fare / dec!(2));

        let stored = desk.dispatch.load(booking.id).await.unwrap();
        assert_eq!(stored.payment_order_id.as_deref(), Some(order.order_id.as_str()));

        let stranger = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let err = desk
            .create_order(&stranger, booking.id, PaymentType::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn full_payment_confirms_booking() {
        let desk = desk(gateway(dec!(100000), true));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let booking = book(&desk, &customer).await;
        let order = desk
            .create_order(&customer, booking.id, PaymentType::Full)
            .await
            .unwrap();

        let paid = desk
            .verify(&customer, &order.order_id, "pay_1", "sig")
            .await
            .unwrap();
        assert_eq!(paid.status, BookingStatus::Confirmed);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.payment_method, Some(PaymentMethod::Online));

        let err = desk
            .create_order(&customer, booking.id, PaymentType::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn short_payment_is_partial() {
        let desk = desk(gateway(dec!(10), true));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let booking = book(&desk, &customer).await;
        let order = desk
            .create_order(&customer, booking.id, PaymentType::Partial)
            .await
            .unwrap();

        let paid = desk
            .verify(&customer, &order.order_id, "pay_2", "sig")
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Partial);
        assert_eq!(paid.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn bad_signature_changes_nothing() {
        let desk = desk(gateway(dec!(100000), false));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let booking = book(&desk, &customer).await;
        let order = desk
            .create_order(&customer, booking.id, PaymentType::Full)
            .await
            .unwrap();

        let err = desk
            .verify(&customer, &order.order_id, "pay_3", "forged")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stored = desk.dispatch.load(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn refund_requires_cancelled_paid_booking() {
        let gateway = gateway(dec!(100000), true);
        let desk = desk(gateway.clone());
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let admin = RequestContext::new(Uuid::new_v4(), Role::Admin);
        let booking = book(&desk, &customer).await;

        let err = desk.refund(&admin, booking.id, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let order = desk
            .create_order(&customer, booking.id, PaymentType::Full)
            .await
            .unwrap();
        desk.verify(&customer, &order.order_id, "pay_4", "sig")
            .await
            .unwrap();
        desk.dispatch.cancel(&customer, booking.id).await.unwrap();

        let receipt = desk.refund(&admin, booking.id, None, None).await.unwrap();
        assert_eq!(receipt.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(receipt.refund_id, "rfnd_pay_4");
        assert_eq!(receipt.amount, dec!(100000));
        assert_eq!(receipt.reason, "Booking cancelled");

        let err = desk.refund(&admin, booking.id, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(gateway.refunds.load(Ordering::SeqCst), 1);
    }

    async fn paid_then_cancelled(desk: &PaymentDesk, customer: &RequestContext, payment_id: &str) -> Booking {
        let booking = book(desk, customer).await;
        let order = desk
            .create_order(customer, booking.id, PaymentType::Full)
            .await
            .unwrap();
        desk.verify(customer, &order.order_id, payment_id, "sig")
            .await
            .unwrap();
        desk.dispatch.cancel(customer, booking.id).await.unwrap()
    }

    #[tokio::test]
    async fn partial_refund_passes_amount_and_reason() {
        let gateway = gateway(dec!(5000), true);
        let desk = desk(gateway.clone());
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let admin = RequestContext::new(Uuid::new_v4(), Role::Admin);
        let booking = paid_then_cancelled(&desk, &customer, "pay_5").await;

        let receipt = desk
            .refund(
                &admin,
                booking.id,
                Some(dec!(1250.50)),
                Some("truck arrived late".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(receipt.amount, dec!(1250.5));
        assert_eq!(receipt.reason, "truck arrived late");
        assert_eq!(receipt.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(
            *gateway.last_refund.lock().unwrap(),
            Some((dec!(1250.5), "truck arrived late".to_string()))
        );
    }

    #[tokio::test]
    async fn refund_above_captured_amount_is_rejected() {
        let gateway = gateway(dec!(5000), true);
        let desk = desk(gateway.clone());
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let admin = RequestContext::new(Uuid::new_v4(), Role::Admin);
        let booking = paid_then_cancelled(&desk, &customer, "pay_6").await;

        for amount in [dec!(5000.01), dec!(0), dec!(-10)] {
            let err = desk
                .refund(&admin, booking.id, Some(amount), None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "amount {amount}");
        }
        assert_eq!(gateway.refunds.load(Ordering::SeqCst), 0);

        let stored = desk.dispatch.load(booking.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    fn captured_event(order_id: &str, payment_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": { "id": payment_id, "order_id": order_id, "amount": 250000 }
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn captured_webhook_confirms_booking_once() {
        let desk = desk(gateway(dec!(100000), true));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let booking = book(&desk, &customer).await;
        let order = desk
            .create_order(&customer, booking.id, PaymentType::Full)
            .await
            .unwrap();
        let body = captured_event(&order.order_id, "pay_7");

        let outcome = desk.handle_webhook(&body, "whsec").await.unwrap();
        match outcome {
            WebhookOutcome::Captured {
                booking_id,
                payment_status,
                ..
            } => {
                assert_eq!(booking_id, booking.id);
                assert_eq!(payment_status, PaymentStatus::Paid);
            }
            other => panic!("expected capture, got {other:?}"),
        }

        let stored = desk.dispatch.load(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.payment_id.as_deref(), Some("pay_7"));

        // provider retries deliver the same event again
        let again = desk.handle_webhook(&body, "whsec").await.unwrap();
        assert!(matches!(again, WebhookOutcome::Captured { .. }));
        let after = desk.dispatch.load(booking.id).await.unwrap();
        assert_eq!(after.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn webhook_signature_is_checked_before_anything_else() {
        let desk = desk(gateway(dec!(100000), true));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let booking = book(&desk, &customer).await;
        let order = desk
            .create_order(&customer, booking.id, PaymentType::Full)
            .await
            .unwrap();

        let err = desk
            .handle_webhook(&captured_event(&order.order_id, "pay_8"), "forged")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let stored = desk.dispatch.load(booking.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);

        let err = desk.handle_webhook(b"not json", "whsec").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unrelated_webhooks_are_acknowledged() {
        let desk = desk(gateway(dec!(100000), true));

        let unknown_order = desk
            .handle_webhook(&captured_event("order_missing", "pay_9"), "whsec")
            .await
            .unwrap();
        assert!(matches!(unknown_order, WebhookOutcome::Ignored { .. }));

        let refund_event = br#"{"event":"refund.processed"}"#;
        match desk.handle_webhook(refund_event, "whsec").await.unwrap() {
            WebhookOutcome::Ignored { event } => assert_eq!(event, "refund.processed"),
            other => panic!("expected ignored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cash_payment_settles_completed_booking() {
        let desk = desk(gateway(dec!(0), true));
        let customer = RequestContext::new(Uuid::new_v4(), Role::Customer);
        let admin = RequestContext::new(Uuid::new_v4(), Role::Admin);
        let driver_ctx = RequestContext::new(Uuid::new_v4(), Role::Driver);

        let registry = desk.dispatch.registry();
        let driver = registry.register(&driver_ctx, "TS10-0001", None).await.unwrap();
        registry.verify(&admin, driver.id, true).await.unwrap();
        registry
            .set_availability(driver.id, DriverStatus::Available)
            .await
            .unwrap();

        let booking = book(&desk, &customer).await;
        let err = desk
            .record_cash_payment(&admin, booking.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        desk.dispatch.accept_booking(&driver_ctx, booking.id).await.unwrap();
        desk.dispatch
            .update_status(&driver_ctx, booking.id, BookingStatus::Completed)
            .await
            .unwrap();

        let settled = desk
            .record_cash_payment(&admin, booking.id, Some(dec!(500)))
            .await
            .unwrap();
        assert_eq!(settled.payment_method, Some(PaymentMethod::Cash));
        assert_eq!(settled.payment_status, PaymentStatus::Paid);
        assert_eq!(settled.commission, Some(dec!(100)));
        assert_eq!(settled.driver_earning, Some(dec!(400)));

        let driver = registry.driver(driver.id).await.unwrap();
        assert_eq!(driver.wallet_balance, dec!(400));
    }
}
