mod common;

use rust_decimal::Decimal;

use casebid::audit::{AuditEvent, AuditKind};
use casebid::case::{Case, CaseStatus};
use casebid::core_types::UserId;
use casebid::error::CoreError;
use casebid::offer::OfferStatus;
use casebid::payment::{PaymentStatus, WebhookOutcome};
use casebid::store::Store;

use common::*;

/// A case in PAYMENT_PENDING with L1's offer of `fee` accepted.
async fn awaiting_payment(env: &Env, fee: Decimal) -> Case {
    let o = &env.orchestrator;
    let case = published_case(env).await;
    let offer = o.submit_offer(case.id, fee, &provider(L1)).await.unwrap();
    o.accept_offer(offer.id, &client(OWNER)).await.unwrap();
    o.get_case(case.id, &client(OWNER)).await.unwrap()
}

fn succeeded_events(timeline: &[AuditEvent]) -> usize {
    timeline
        .iter()
        .filter(|e| e.event_type == AuditKind::PaymentSucceeded)
        .count()
}

fn webhook(event: &str, order_id: &str, payment_id: &str) -> Vec<u8> {
    serde_json::json!({
        "event": event,
        "payload": {"payment": {"entity": {
            "id": payment_id,
            "order_id": order_id,
            "error_description": "Insufficient funds"
        }}}
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn qa_tc_order_then_verify_is_idempotent() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(1000)).await;

    env.gateway.push_order_id("order_abc");
    let payment = o.create_order(case.id, &owner).await.unwrap();
    assert_eq!(payment.gateway_order_id, "order_abc");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.total_amount, Decimal::from(1100));
    assert_eq!(payment.receipt, format!("rcpt_{}_1", case.id));

    let sig = env.gateway.sign_checkout("order_abc", "pay_123").unwrap();
    let captured = o
        .verify_payment("order_abc", "pay_123", &sig, &owner)
        .await
        .unwrap();
    assert_eq!(captured.status, PaymentStatus::Success);
    assert_eq!(captured.gateway_payment_id.as_deref(), Some("pay_123"));

    let case_now = o.get_case(case.id, &owner).await.unwrap();
    assert_eq!(case_now.status, CaseStatus::InProgress);
    let offers = o.list_offers(case.id, &owner).await.unwrap();
    assert_eq!(offers[0].status, OfferStatus::Funded);
    let events = o.timeline(case.id, &owner).await.unwrap().len();

    // Same call again: no change, no error, no extra audit event
    let again = o
        .verify_payment("order_abc", "pay_123", &sig, &owner)
        .await
        .unwrap();
    assert_eq!(again.status, PaymentStatus::Success);
    assert_eq!(o.get_case(case.id, &owner).await.unwrap(), case_now);
    assert_eq!(o.timeline(case.id, &owner).await.unwrap().len(), events);
}

#[tokio::test]
async fn qa_tc_total_includes_rounded_commission() {
    let env = env();
    let o = &env.orchestrator;
    // 1000.55 * 1.10 = 1100.605 -> 1100.61
    let case = awaiting_payment(&env, Decimal::new(100_055, 2)).await;
    let payment = o.create_order(case.id, &client(OWNER)).await.unwrap();
    assert_eq!(payment.provider_fee, Decimal::new(100_055, 2));
    assert_eq!(payment.platform_commission, Decimal::new(10_006, 2));
    assert_eq!(payment.total_amount, Decimal::new(110_061, 2));
    assert_eq!(env.gateway.requests()[0].amount_minor, 110_061);
}

#[tokio::test]
async fn qa_tc_create_order_twice_reuses_pending() {
    let env = env();
    let o = &env.orchestrator;
    let case = awaiting_payment(&env, Decimal::from(500)).await;

    let first = o.create_order(case.id, &client(OWNER)).await.unwrap();
    let second = o.create_order(case.id, &client(OWNER)).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(env.gateway.create_calls(), 1);

    // Only the owner pays
    let err = o.create_order(case.id, &client(OTHER_CLIENT)).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization { .. }));
}

#[tokio::test]
async fn qa_tc_gateway_failure_surfaces_and_persists_nothing() {
    let env = env();
    let o = &env.orchestrator;
    let case = awaiting_payment(&env, Decimal::from(500)).await;
    env.gateway.set_fail_orders(true);

    let err = o.create_order(case.id, &client(OWNER)).await.unwrap_err();
    assert!(matches!(err, CoreError::Gateway(_)));

    env.gateway.set_fail_orders(false);
    let payment = o.create_order(case.id, &client(OWNER)).await.unwrap();
    assert_eq!(payment.receipt, format!("rcpt_{}_1", case.id));
}

#[tokio::test]
async fn qa_tc_bad_signature_fails_then_retry_succeeds() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(800)).await;
    let first = o.create_order(case.id, &owner).await.unwrap();

    let err = o
        .verify_payment(&first.gateway_order_id, "pay_1", "00ff", &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::PaymentFailed
    );
    let failed = env
        .store
        .payment_by_order(&first.gateway_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);

    // Owner retries: fresh order with the next receipt number
    o.update_status(case.id, CaseStatus::PaymentPending, &owner)
        .await
        .unwrap();
    let retry = o.create_order(case.id, &owner).await.unwrap();
    assert_ne!(retry.gateway_order_id, first.gateway_order_id);
    assert_eq!(retry.receipt, format!("rcpt_{}_2", case.id));

    let sig = env
        .gateway
        .sign_checkout(&retry.gateway_order_id, "pay_2")
        .unwrap();
    o.verify_payment(&retry.gateway_order_id, "pay_2", &sig, &owner)
        .await
        .unwrap();
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::InProgress
    );
}

#[tokio::test]
async fn qa_tc_webhook_bad_signature_changes_nothing() {
    let env = env();
    let o = &env.orchestrator;
    let case = awaiting_payment(&env, Decimal::from(800)).await;
    let payment = o.create_order(case.id, &client(OWNER)).await.unwrap();

    let body = webhook("payment.captured", &payment.gateway_order_id, "pay_9");
    let outcome = o.handle_webhook(&body, "not-a-signature").await;
    assert_eq!(outcome, WebhookOutcome::Rejected);

    let stored = env
        .store
        .payment_by_order(&payment.gateway_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(
        o.get_case(case.id, &client(OWNER)).await.unwrap().status,
        CaseStatus::PaymentPending
    );
}

#[tokio::test]
async fn qa_tc_webhook_after_verify_is_noop() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(800)).await;
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let order_id = payment.gateway_order_id.clone();

    let sig = env.gateway.sign_checkout(&order_id, "pay_7").unwrap();
    o.verify_payment(&order_id, "pay_7", &sig, &owner).await.unwrap();
    let events = o.timeline(case.id, &owner).await.unwrap().len();

    let body = webhook("payment.captured", &order_id, "pay_7");
    let header = env.gateway.sign_webhook(&body).unwrap();
    assert_eq!(o.handle_webhook(&body, &header).await, WebhookOutcome::Duplicate);
    assert_eq!(o.timeline(case.id, &owner).await.unwrap().len(), events);
}

#[tokio::test]
async fn qa_tc_webhook_capture_and_failure() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);

    // Captured via webhook alone
    let case = awaiting_payment(&env, Decimal::from(800)).await;
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let body = webhook("payment.captured", &payment.gateway_order_id, "pay_w1");
    let header = env.gateway.sign_webhook(&body).unwrap();
    assert_eq!(o.handle_webhook(&body, &header).await, WebhookOutcome::Applied);
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::InProgress
    );

    // Failed via webhook, with the gateway's reason kept
    let case = awaiting_payment(&env, Decimal::from(900)).await;
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let body = webhook("payment.failed", &payment.gateway_order_id, "pay_w2");
    let header = env.gateway.sign_webhook(&body).unwrap();
    assert_eq!(o.handle_webhook(&body, &header).await, WebhookOutcome::Applied);
    let stored = env
        .store
        .payment_by_order(&payment.gateway_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("Insufficient funds"));
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::PaymentFailed
    );

    // A late capture for a failed payment is not applied
    let body = webhook("payment.captured", &payment.gateway_order_id, "pay_w2");
    let header = env.gateway.sign_webhook(&body).unwrap();
    assert_eq!(o.handle_webhook(&body, &header).await, WebhookOutcome::Ignored);

    // Unknown events are ignored
    let body = webhook("refund.created", &payment.gateway_order_id, "pay_w2");
    let header = env.gateway.sign_webhook(&body).unwrap();
    assert_eq!(o.handle_webhook(&body, &header).await, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn qa_tc_close_counts_once_and_admin_settles() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(1200)).await;
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let order_id = payment.gateway_order_id.clone();
    let sig = env.gateway.sign_checkout(&order_id, "pay_c").unwrap();
    o.verify_payment(&order_id, "pay_c", &sig, &owner).await.unwrap();

    o.record_solution_update(case.id, "Draft agreement shared", &provider(L1))
        .await
        .unwrap();
    o.update_status(case.id, CaseStatus::Closed, &owner).await.unwrap();
    assert_eq!(o.completed_cases(UserId(L1)).await.unwrap(), 1);

    let err = o
        .update_status(case.id, CaseStatus::Closed, &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(o.completed_cases(UserId(L1)).await.unwrap(), 1);

    // Post-capture money movement is admin-only
    let payments = o.payments();
    let err = payments.settle(&order_id, &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization { .. }));
    let settled = payments.settle(&order_id, &admin()).await.unwrap();
    assert_eq!(settled.status, PaymentStatus::Settled);

    // SETTLED cannot be refunded
    let err = payments.refund(&order_id, &admin()).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn qa_tc_webhook_then_verify_is_noop() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(800)).await;
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let order_id = payment.gateway_order_id.clone();

    let body = webhook("payment.captured", &order_id, "pay_9");
    let header = env.gateway.sign_webhook(&body).unwrap();
    assert_eq!(o.handle_webhook(&body, &header).await, WebhookOutcome::Applied);
    let events = o.timeline(case.id, &owner).await.unwrap().len();

    // The late checkout confirmation returns the captured record as is
    let sig = env.gateway.sign_checkout(&order_id, "pay_9").unwrap();
    let confirmed = o.verify_payment(&order_id, "pay_9", &sig, &owner).await.unwrap();
    assert_eq!(confirmed.id, payment.id);
    assert_eq!(confirmed.status, PaymentStatus::Success);
    assert_eq!(confirmed.gateway_payment_id.as_deref(), Some("pay_9"));
    assert_eq!(confirmed.signature, None);

    let timeline = o.timeline(case.id, &owner).await.unwrap();
    assert_eq!(timeline.len(), events);
    assert_eq!(succeeded_events(&timeline), 1);
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::InProgress
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn qa_tc_concurrent_create_order_keeps_one_payment() {
    let env = env();
    let o = env.orchestrator.clone();
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(500)).await;

    // Both calls pass the reuse check before either reaches the gateway
    env.gateway.push_order_id("order_first");
    env.gateway.push_order_id("order_second");
    env.gateway.hold_orders(2);

    let (o1, o2) = (o.clone(), o.clone());
    let (owner1, owner2) = (owner.clone(), owner.clone());
    let case_id = case.id;
    let t1 = tokio::spawn(async move { o1.create_order(case_id, &owner1).await });
    let t2 = tokio::spawn(async move { o2.create_order(case_id, &owner2).await });
    let a = t1.await.unwrap().unwrap();
    let b = t2.await.unwrap().unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(a.gateway_order_id, b.gateway_order_id);
    assert_eq!(env.gateway.create_calls(), 2);

    // The losing gateway order is never persisted
    let first = env.store.payment_by_order("order_first").await.unwrap();
    let second = env.store.payment_by_order("order_second").await.unwrap();
    assert_eq!(first.is_some() as u8 + second.is_some() as u8, 1);

    let created = o
        .timeline(case.id, &owner)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.event_type == AuditKind::PaymentOrderCreated)
        .count();
    assert_eq!(created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn qa_tc_verify_races_webhook() {
    let env = env();
    let o = env.orchestrator.clone();
    let owner = client(OWNER);
    let case = awaiting_payment(&env, Decimal::from(1200)).await;
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let order_id = payment.gateway_order_id.clone();

    let sig = env.gateway.sign_checkout(&order_id, "pay_race").unwrap();
    let body = webhook("payment.captured", &order_id, "pay_race");
    let header = env.gateway.sign_webhook(&body).unwrap();

    let (o1, o2) = (o.clone(), o.clone());
    let owner1 = owner.clone();
    let order1 = order_id.clone();
    let verify = tokio::spawn(async move {
        o1.verify_payment(&order1, "pay_race", &sig, &owner1).await
    });
    let hook = tokio::spawn(async move { o2.handle_webhook(&body, &header).await });

    let verified = verify.await.unwrap().unwrap();
    assert_eq!(verified.status, PaymentStatus::Success);
    let outcome = hook.await.unwrap();
    assert!(matches!(
        outcome,
        WebhookOutcome::Applied | WebhookOutcome::Duplicate
    ));

    let timeline = o.timeline(case.id, &owner).await.unwrap();
    assert_eq!(succeeded_events(&timeline), 1);
    let stored = env.store.payment_by_order(&order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::InProgress
    );
}
