mod common;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use casebid::audit::AuditKind;
use casebid::case::CaseStatus;
use casebid::core_types::{OfferId, UserId};
use casebid::error::CoreError;
use casebid::offer::{OfferPolicy, OfferStatus};
use casebid::store::Store;

use common::*;

fn fee(v: i64) -> Decimal {
    Decimal::from(v)
}

#[tokio::test]
async fn qa_tc_bidding_to_acceptance() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);

    // Case created DRAFT, published
    let case = published_case(&env).await;
    assert_eq!(case.status, CaseStatus::Published);

    // L1 bids 1000: case moves to UNDER_REVIEW
    let offer1 = o.submit_offer(case.id, fee(1000), &provider(L1)).await.unwrap();
    assert_eq!(offer1.status, OfferStatus::Submitted);
    assert_eq!(
        o.get_case(case.id, &owner).await.unwrap().status,
        CaseStatus::UnderReview
    );

    // L2 bids 1200: still UNDER_REVIEW, two active offers
    let offer2 = o.submit_offer(case.id, fee(1200), &provider(L2)).await.unwrap();
    let offers = o.list_offers(case.id, &owner).await.unwrap();
    assert_eq!(offers.iter().filter(|x| x.status.is_active()).count(), 2);

    // Owner accepts L1: L2 is rejected, case awaits payment
    let accepted = o.accept_offer(offer1.id, &owner).await.unwrap();
    assert_eq!(accepted.status, OfferStatus::Accepted);

    let offers = o.list_offers(case.id, &owner).await.unwrap();
    let status_of = |id: OfferId| offers.iter().find(|x| x.id == id).map(|x| x.status);
    assert_eq!(status_of(offer1.id), Some(OfferStatus::Accepted));
    assert_eq!(status_of(offer2.id), Some(OfferStatus::Rejected));

    let case = o.get_case(case.id, &owner).await.unwrap();
    assert_eq!(case.status, CaseStatus::PaymentPending);
    assert_eq!(case.assigned_provider_id, Some(UserId(L1)));
    assert_eq!(case.agreed_fee, Some(fee(1000)));
}

#[tokio::test]
async fn qa_tc_unrelated_provider_cannot_accept() {
    let env = env();
    let o = &env.orchestrator;
    let case = published_case(&env).await;
    let offer = o.submit_offer(case.id, fee(900), &provider(L1)).await.unwrap();
    let before = o.get_case(case.id, &client(OWNER)).await.unwrap();

    // L3: not owner, not assigned, no family-law specialization
    let err = o.accept_offer(offer.id, &provider(L3)).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization { .. }));

    // Nothing moved
    let after = o.get_case(case.id, &client(OWNER)).await.unwrap();
    assert_eq!(before, after);
    let offers = o.list_offers(case.id, &client(OWNER)).await.unwrap();
    assert_eq!(offers[0].status, OfferStatus::Submitted);
}

#[tokio::test]
async fn qa_tc_sweep_expires_only_submitted() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);

    // Case A: accepted offer
    let case_a = published_case(&env).await;
    let accepted = o.submit_offer(case_a.id, fee(700), &provider(L1)).await.unwrap();
    o.accept_offer(accepted.id, &owner).await.unwrap();

    // Case B: offer left SUBMITTED
    let case_b = published_case(&env).await;
    let pending = o.submit_offer(case_b.id, fee(800), &provider(L2)).await.unwrap();

    // Both offers' expiry lies in the past from the sweep's point of view
    let later = Utc::now() + Duration::hours(49);
    let report = o.sweep_expired_offers(&admin(), later).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.cases, 1);

    let offers_b = o.list_offers(case_b.id, &owner).await.unwrap();
    assert_eq!(offers_b[0].id, pending.id);
    assert_eq!(offers_b[0].status, OfferStatus::Expired);

    let offers_a = o.list_offers(case_a.id, &owner).await.unwrap();
    assert_eq!(offers_a[0].status, OfferStatus::Accepted);

    // B lost its only bid so it is open again; A is untouched
    assert_eq!(
        o.get_case(case_b.id, &owner).await.unwrap().status,
        CaseStatus::Published
    );
    assert_eq!(
        o.get_case(case_a.id, &owner).await.unwrap().status,
        CaseStatus::PaymentPending
    );

    // A second sweep is a no-op
    let again = o.sweep_expired_offers(&admin(), later).await.unwrap();
    assert_eq!(again.expired, 0);

    // Only admins trigger sweeps by hand
    let err = o.sweep_expired_offers(&owner, later).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization { .. }));
}

#[tokio::test]
async fn qa_tc_concurrent_accepts_one_winner() {
    let env = env();
    let o = env.orchestrator.clone();
    let case = published_case(&env).await;
    let a = o.submit_offer(case.id, fee(1000), &provider(L1)).await.unwrap();
    let b = o.submit_offer(case.id, fee(1100), &provider(L2)).await.unwrap();

    let (o1, o2) = (o.clone(), o.clone());
    let owner = client(OWNER);
    let (owner1, owner2) = (owner.clone(), owner.clone());
    let t1 = tokio::spawn(async move { o1.accept_offer(a.id, &owner1).await });
    let t2 = tokio::spawn(async move { o2.accept_offer(b.id, &owner2).await });
    let r1 = t1.await.unwrap();
    let r2 = t2.await.unwrap();

    let wins = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one accept must commit");
    let loser = if r1.is_ok() { r2 } else { r1 };
    assert!(matches!(loser, Err(CoreError::Conflict(_))));

    // At most one ACCEPTED offer on the case
    let offers = o.list_offers(case.id, &owner).await.unwrap();
    assert_eq!(
        offers
            .iter()
            .filter(|x| x.status == OfferStatus::Accepted)
            .count(),
        1
    );
}

#[tokio::test]
async fn qa_tc_withdraw_last_offer_reopens_bidding() {
    let env = env();
    let o = &env.orchestrator;
    let case = published_case(&env).await;
    let offer = o.submit_offer(case.id, fee(500), &provider(L1)).await.unwrap();

    // Only the offer's provider may withdraw it
    let err = o.withdraw_offer(offer.id, &provider(L2)).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization { .. }));

    let withdrawn = o.withdraw_offer(offer.id, &provider(L1)).await.unwrap();
    assert_eq!(withdrawn.status, OfferStatus::Withdrawn);
    assert_eq!(
        o.get_case(case.id, &client(OWNER)).await.unwrap().status,
        CaseStatus::Published
    );
}

#[tokio::test]
async fn qa_tc_resubmit_after_withdraw_replaces_offer() {
    let env = env();
    let o = &env.orchestrator;
    let case = published_case(&env).await;
    let l1 = provider(L1);

    let first = o.submit_offer(case.id, fee(500), &l1).await.unwrap();
    // A second live offer from the same provider is a conflict
    let err = o.submit_offer(case.id, fee(450), &l1).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    o.withdraw_offer(first.id, &l1).await.unwrap();
    let second = o.submit_offer(case.id, fee(450), &l1).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status, OfferStatus::Submitted);
    assert_eq!(second.proposed_fee, fee(450));

    // The withdrawn row is gone; one slot per (case, provider)
    let offers = o.list_offers(case.id, &client(OWNER)).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].id, second.id);
}

#[tokio::test]
async fn qa_tc_sixth_active_offer_conflicts() {
    let env = env_with_policy(OfferPolicy {
        max_active_per_case: 5,
        ttl: Duration::hours(48),
    });
    let o = &env.orchestrator;
    let case = published_case(&env).await;

    for id in 20..25 {
        o.submit_offer(case.id, fee(1000 + id as i64), &provider(id))
            .await
            .unwrap();
    }
    let err = o.submit_offer(case.id, fee(999), &provider(25)).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    // Withdrawing one frees a slot
    let offers = o.list_offers(case.id, &client(OWNER)).await.unwrap();
    let mine = offers.iter().find(|x| x.provider_id == UserId(20)).unwrap();
    o.withdraw_offer(mine.id, &provider(20)).await.unwrap();
    o.submit_offer(case.id, fee(999), &provider(25)).await.unwrap();
}

#[tokio::test]
async fn qa_tc_invalid_fees_rejected() {
    let env = env();
    let o = &env.orchestrator;
    let case = published_case(&env).await;

    for bad in [Decimal::ZERO, fee(-10), Decimal::new(10_001, 3)] {
        let err = o.submit_offer(case.id, bad, &provider(L1)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)), "fee {} accepted", bad);
    }
}

#[tokio::test]
async fn qa_tc_direct_assignment_converts_to_bid() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = published_case(&env).await;

    let case = o.assign_direct(case.id, UserId(L2), &owner).await.unwrap();
    assert_eq!(case.status, CaseStatus::PendingApproval);

    // Only the directly assigned provider may bid now
    let err = o.submit_offer(case.id, fee(600), &provider(L1)).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization { .. }));

    let offer = o.submit_offer(case.id, fee(600), &provider(L2)).await.unwrap();
    let case = o.get_case(case.id, &owner).await.unwrap();
    assert_eq!(case.status, CaseStatus::UnderReview);
    assert_eq!(case.assigned_provider_id, None);

    o.accept_offer(offer.id, &owner).await.unwrap();
    let case = o.get_case(case.id, &owner).await.unwrap();
    assert_eq!(case.assigned_provider_id, Some(UserId(L2)));
}

#[tokio::test]
async fn qa_tc_every_operation_leaves_one_audit_event() {
    let env = env();
    let o = &env.orchestrator;
    let owner = client(OWNER);
    let case = published_case(&env).await;
    o.submit_offer(case.id, fee(1000), &provider(L1)).await.unwrap();

    let timeline = o.timeline(case.id, &owner).await.unwrap();
    let kinds: Vec<_> = timeline.iter().map(|e| e.event_type).collect();
    // Newest first
    assert_eq!(
        kinds,
        vec![
            AuditKind::OfferSubmitted,
            AuditKind::StatusChanged,
            AuditKind::CaseCreated
        ]
    );

    let created = timeline.last().unwrap();
    assert_eq!(created.old_status, None);
    assert_eq!(created.new_status.as_deref(), Some("DRAFT"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn qa_tc_timeline_follows_commit_order() {
    let env = env();
    let o = env.orchestrator.clone();
    let owner = client(OWNER);
    let case = published_case(&env).await;
    let offer = o.submit_offer(case.id, fee(900), &provider(L1)).await.unwrap();
    o.accept_offer(offer.id, &owner).await.unwrap();
    let payment = o.create_order(case.id, &owner).await.unwrap();
    let order_id = payment.gateway_order_id;
    let sig = env.gateway.sign_checkout(&order_id, "pay_hold").unwrap();
    o.verify_payment(&order_id, "pay_hold", &sig, &owner).await.unwrap();

    // Hold and resume race each other; only legal moves commit
    let case_id = case.id;
    let mut tasks = Vec::new();
    for i in 0..24 {
        let o = o.clone();
        let owner = owner.clone();
        let target = if i % 2 == 0 {
            CaseStatus::OnHold
        } else {
            CaseStatus::InProgress
        };
        tasks.push(tokio::spawn(async move {
            o.update_status(case_id, target, &owner).await.is_ok()
        }));
    }
    let mut committed = 0;
    for task in tasks {
        if task.await.unwrap() {
            committed += 1;
        }
    }
    assert!(committed >= 1);

    // Newest first, each move starts where the previous one ended
    let timeline = o.timeline(case.id, &owner).await.unwrap();
    let moves: Vec<_> = timeline
        .iter()
        .take_while(|e| e.event_type == AuditKind::StatusChanged)
        .collect();
    assert_eq!(moves.len(), committed);
    for pair in moves.windows(2) {
        assert_eq!(pair[0].old_status, pair[1].new_status);
    }
    assert_eq!(moves.last().unwrap().old_status.as_deref(), Some("IN_PROGRESS"));
    assert_eq!(
        moves.first().unwrap().new_status.as_deref(),
        Some(o.get_case(case.id, &owner).await.unwrap().status.as_str())
    );
}

#[tokio::test]
async fn qa_tc_audit_outage_does_not_block_work() {
    let env = env();
    let o = &env.orchestrator;
    let case = published_case(&env).await;
    env.store.fail_audit_writes(true);

    let offer = o.submit_offer(case.id, fee(1000), &provider(L1)).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Submitted);
    assert_eq!(
        env.store.case(case.id).await.unwrap().unwrap().status,
        CaseStatus::UnderReview
    );
    // Only the events from before the outage
    assert_eq!(env.store.audit_events(case.id).await.unwrap().len(), 2);
}
