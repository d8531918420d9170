//! Referral decision pipeline, end to end through ingestion

mod helpers;

use helpers::{member_phone, RecordingTransport, TestApp, MEMBER_PHONE_KEY};
use serde_json::json;
use totl_steer::db;
use totl_steer::ingest::IngestKind;
use totl_steer::models::{InteractionKind, ReferralStatus};
use totl_steer::services::engagement::MessageVariant;
use totl_steer::services::{InboundMessage, ReferralOutcome, ReferralRequest, SendOutcome};

fn mri_referral(external_id: &str, member_id: &str) -> ReferralRequest {
    ReferralRequest {
        external_id: Some(external_id.to_string()),
        member_id: member_id.to_string(),
        plan_id: Some(1),
        cpt_code: "73721".to_string(),
        provider_npi: None,
        ordering_provider_npi: Some("9999999999".to_string()),
    }
}

/// Engine over the app's pool and transport, so outcomes can be inspected
fn steerage_engine(app: &TestApp) -> totl_steer::services::SteerageEngine {
    let config = totl_common::config::TomlConfig::default();
    let ledger = app.state.ledger.clone();
    let outbound = totl_steer::services::OutboundGate::new(ledger, app.transport.clone());
    let matcher = totl_steer::services::PricingMatcher::new(
        config.policy.clone(),
        totl_steer::services::GeoService::offline(),
    );
    totl_steer::services::SteerageEngine::new(
        app.pool().clone(),
        matcher,
        config.policy,
        outbound,
        totl_steer::services::MessageCopy::default(),
    )
}

#[tokio::test]
async fn test_freestanding_mri_with_deductible_met_is_zero_cost() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    app.deductible_met("M-100").await;

    app.state
        .inbound
        .handle(&InboundMessage::text(MEMBER_PHONE_KEY, "YES"))
        .await
        .unwrap();

    let engine = steerage_engine(&app);
    let outcome = engine.process(&mri_referral("R-1", "M-100")).await.unwrap();

    let (referral_id, variant, send) = match outcome {
        ReferralOutcome::Engaged {
            referral_id,
            variant,
            send,
        } => (referral_id, variant, send),
        other => panic!("expected engagement, got {:?}", other),
    };
    assert_eq!(variant, MessageVariant::Steerage);
    assert!(matches!(send, Some(SendOutcome::Sent(_))));

    let sent = app.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, MEMBER_PHONE_KEY);
    assert!(sent[0].1.contains("QuickScan Imaging"));
    assert!(sent[0].1.contains("no out of pocket cost"));

    let mut conn = app.pool().acquire().await.unwrap();
    let referral = db::referrals::find_by_id(&mut conn, referral_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Engaged);
    assert_eq!(referral.redirected_npi.as_deref(), Some("1111111111"));
    assert_eq!(referral.redirected_allowed, Some(450.0));

    let log = db::interactions::list_for_phone(&mut conn, &member_phone())
        .await
        .unwrap();
    assert!(log
        .iter()
        .any(|e| e.kind == InteractionKind::OutboundReferralTrigger && e.referral_id == Some(referral_id)));
}

#[tokio::test]
async fn test_undelivered_steerage_logs_one_entry() {
    let app = TestApp::with_transport(RecordingTransport::rejecting()).await;
    app.seed_basic().await;
    app.deductible_met("M-100").await;
    app.state
        .inbound
        .handle(&InboundMessage::text(MEMBER_PHONE_KEY, "YES"))
        .await
        .unwrap();
    let before = app.interaction_count().await;

    let engine = steerage_engine(&app);
    let outcome = engine.process(&mri_referral("R-9", "M-100")).await.unwrap();

    let referral_id = match outcome {
        ReferralOutcome::Engaged {
            referral_id,
            send: Some(SendOutcome::Failed),
            ..
        } => referral_id,
        other => panic!("expected failed delivery, got {:?}", other),
    };
    assert_eq!(app.interaction_count().await, before + 1);

    let mut conn = app.pool().acquire().await.unwrap();
    let entries: Vec<_> = db::interactions::list_for_phone(&mut conn, &member_phone())
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.referral_id == Some(referral_id))
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, InteractionKind::Suppressed);

    let member = db::members::find_by_phone(&mut conn, &member_phone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.total_savings, 0.0);
}

#[tokio::test]
async fn test_pending_member_gets_invitation_naming_sponsor() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    app.deductible_met("M-100").await;

    let engine = steerage_engine(&app);
    let outcome = engine.process(&mri_referral("R-2", "M-100")).await.unwrap();

    assert!(matches!(
        outcome,
        ReferralOutcome::Engaged {
            variant: MessageVariant::OptInInvitation,
            ..
        }
    ));
    let sent = app.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("Acme Corp"));
    assert!(sent[0].1.contains("Reply YES"));
}

#[tokio::test]
async fn test_low_risk_without_accumulator_is_suppressed() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let engine = steerage_engine(&app);
    let outcome = engine.process(&mri_referral("R-3", "M-100")).await.unwrap();

    let referral_id = match outcome {
        ReferralOutcome::Suppressed { referral_id, .. } => referral_id,
        other => panic!("expected suppression, got {:?}", other),
    };
    assert!(app.transport.sent().is_empty());

    let mut conn = app.pool().acquire().await.unwrap();
    let referral = db::referrals::find_by_id(&mut conn, referral_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Suppressed);
    assert!(referral.redirected_npi.is_none());

    let log = db::interactions::list_for_phone(&mut conn, &member_phone())
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, InteractionKind::Suppressed);
}

#[tokio::test]
async fn test_high_risk_without_prices_engages_without_sending() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    app.ingest_ok(
        IngestKind::Eligibility,
        json!([{
            "member_id": "M-200",
            "plan_id": 1,
            "first_name": "Ben",
            "last_name": "Okafor",
            "phone_number": "555-777-8888",
            "zip_code": "60601",
            "risk_tier": "High"
        }]),
    )
    .await;
    app.state
        .inbound
        .handle(&InboundMessage::text("5557778888", "START"))
        .await
        .unwrap();
    let before = app.transport.sent().len();

    let engine = steerage_engine(&app);
    let mut request = mri_referral("R-4", "M-200");
    request.cpt_code = "70551".to_string();
    let outcome = engine.process(&request).await.unwrap();

    assert!(matches!(
        outcome,
        ReferralOutcome::Engaged {
            variant: MessageVariant::NoCandidates,
            send: None,
            ..
        }
    ));
    assert_eq!(app.transport.sent().len(), before);
}

#[tokio::test]
async fn test_duplicate_external_id_has_no_side_effects() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    app.deductible_met("M-100").await;

    let engine = steerage_engine(&app);
    let first = engine.process(&mri_referral("R-5", "M-100")).await.unwrap();
    let sent_after_first = app.transport.sent().len();
    let log_after_first = app.interaction_count().await;

    let second = engine.process(&mri_referral("R-5", "M-100")).await.unwrap();

    let first_id = match first {
        ReferralOutcome::Engaged { referral_id, .. } | ReferralOutcome::Suppressed { referral_id, .. } => {
            referral_id
        }
        other => panic!("unexpected first outcome {:?}", other),
    };
    assert_eq!(second, ReferralOutcome::Duplicate { referral_id: first_id });
    assert_eq!(app.transport.sent().len(), sent_after_first);
    assert_eq!(app.interaction_count().await, log_after_first);
}

#[tokio::test]
async fn test_savings_accrue_against_baseline_price() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    app.deductible_met("M-100").await;
    app.ingest_ok(
        IngestKind::Prices,
        json!([{
            "member_id": "HIST-2",
            "plan_id": 1,
            "date_of_service": "2024-02-01",
            "cpt_code": "73721",
            "npi": "2222222222",
            "allowed_amount": 1450.0,
            "facility_name": "Mercy General Hospital"
        }]),
    )
    .await;
    app.state
        .inbound
        .handle(&InboundMessage::text(MEMBER_PHONE_KEY, "YES"))
        .await
        .unwrap();

    let engine = steerage_engine(&app);
    let mut request = mri_referral("R-6", "M-100");
    request.provider_npi = Some("2222222222".to_string());
    engine.process(&request).await.unwrap();

    let mut conn = app.pool().acquire().await.unwrap();
    let member = db::members::find_by_phone(&mut conn, &member_phone())
        .await
        .unwrap()
        .unwrap();
    assert!((member.total_savings - 1000.0).abs() < 1e-9);
}
