//! Consent ledger and outbound gating

mod helpers;

use helpers::{member_phone, RecordingTransport, TestApp};
use totl_steer::db;
use totl_steer::models::{ConsentState, InteractionKind};
use totl_common::phone::PhoneKey;
use totl_steer::services::consent::ConsentKeyword;
use totl_steer::services::{InboundMessage, OutboundGate, SendOutcome};

async fn opt_out_sources(app: &TestApp) -> (bool, bool) {
    let mut conn = app.pool().acquire().await.unwrap();
    let record = db::consent::exists(&mut conn, &member_phone()).await.unwrap();
    let flag = db::members::find_by_phone(&mut conn, &member_phone())
        .await
        .unwrap()
        .unwrap()
        .opted_out;
    (record, flag)
}

#[tokio::test]
async fn test_opt_out_record_alone_blocks_campaign() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    // Record without the member flag: the member is still listed as pending
    let mut conn = app.pool().acquire().await.unwrap();
    db::consent::insert_if_absent(&mut conn, &member_phone(), "Carrier report")
        .await
        .unwrap();
    drop(conn);

    let report = app.state.campaign.send_onboarding(1).await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.blocked, 1);
    assert!(app.transport.sent().is_empty());
    assert_eq!(app.interaction_count().await, 0);
}

#[tokio::test]
async fn test_member_flag_alone_blocks_send() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    sqlx::query("UPDATE members SET opted_out = 1")
        .execute(app.pool())
        .await
        .unwrap();

    assert!(!app.state.ledger.may_contact(&member_phone()).await.unwrap());

    let mut conn = app.pool().acquire().await.unwrap();
    let member = db::members::find_by_phone(&mut conn, &member_phone())
        .await
        .unwrap()
        .unwrap();
    drop(conn);

    let gate = OutboundGate::new(app.state.ledger.clone(), app.transport.clone());
    let outcome = gate
        .send_to_member(&member, InteractionKind::OutboundCampaign, "hello", None, None)
        .await
        .unwrap();

    assert_eq!(outcome, SendOutcome::Blocked);
    assert!(app.transport.sent().is_empty());
    assert_eq!(app.interaction_count().await, 0);
}

#[tokio::test]
async fn test_force_then_clear_returns_member_to_pending() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    let phone = member_phone();

    app.state.ledger.force_opt_out(&phone, "Complaint").await.unwrap();
    assert_eq!(app.state.ledger.state(&phone).await.unwrap(), ConsentState::OptedOut);
    assert_eq!(opt_out_sources(&app).await, (true, true));

    assert!(app.state.ledger.clear_opt_out(&phone).await.unwrap());
    assert_eq!(app.state.ledger.state(&phone).await.unwrap(), ConsentState::Pending);
    assert_eq!(opt_out_sources(&app).await, (false, false));
    assert!(app.state.ledger.may_contact(&phone).await.unwrap());

    assert!(!app.state.ledger.clear_opt_out(&phone).await.unwrap());
}

#[tokio::test]
async fn test_stop_and_start_keep_sources_in_agreement() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let reply = app
        .state
        .inbound
        .handle(&InboundMessage::text(helpers::MEMBER_PHONE, " stop "))
        .await
        .unwrap();
    assert!(reply.reply_text.contains("You won't get more messages"));
    assert_eq!(opt_out_sources(&app).await, (true, true));

    app.state
        .inbound
        .handle(&InboundMessage::text(helpers::MEMBER_PHONE, "START"))
        .await
        .unwrap();
    assert_eq!(opt_out_sources(&app).await, (false, false));
    assert_eq!(
        app.state.ledger.state(&member_phone()).await.unwrap(),
        ConsentState::OptedIn
    );
}

#[tokio::test]
async fn test_record_inbound_updates_both_sources() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let state = app
        .state
        .ledger
        .record_inbound(&member_phone(), ConsentKeyword::Stop)
        .await
        .unwrap();
    assert_eq!(state, ConsentState::OptedOut);
    assert_eq!(opt_out_sources(&app).await, (true, true));

    let state = app
        .state
        .ledger
        .record_inbound(&member_phone(), ConsentKeyword::Start)
        .await
        .unwrap();
    assert_eq!(state, ConsentState::OptedIn);
    assert_eq!(opt_out_sources(&app).await, (false, false));
}

#[tokio::test]
async fn test_record_inbound_for_unknown_number() {
    let app = TestApp::new().await;
    let phone = PhoneKey::parse("555-303-0000");

    let state = app
        .state
        .ledger
        .record_inbound(&phone, ConsentKeyword::Stop)
        .await
        .unwrap();
    assert_eq!(state, ConsentState::OptedOut);
    assert!(!app.state.ledger.may_contact(&phone).await.unwrap());

    let state = app
        .state
        .ledger
        .record_inbound(&phone, ConsentKeyword::Start)
        .await
        .unwrap();
    assert_eq!(state, ConsentState::Pending);
    assert!(app.state.ledger.may_contact(&phone).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_consent_changes_stay_consistent() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let inbound = app.state.inbound.clone();
        let body = if i % 2 == 0 { "STOP" } else { "YES" };
        tasks.push(tokio::spawn(async move {
            inbound
                .handle(&InboundMessage::text(helpers::MEMBER_PHONE, body))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let (record, flag) = opt_out_sources(&app).await;
    assert_eq!(record, flag);
    assert_eq!(app.interaction_count().await, 20);
}

#[tokio::test]
async fn test_rejected_delivery_is_logged_as_suppressed() {
    let app = TestApp::with_transport(RecordingTransport::rejecting()).await;
    app.seed_basic().await;

    let report = app.state.campaign.send_onboarding(1).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(app.interaction_count().await, 1);

    let mut conn = app.pool().acquire().await.unwrap();
    let entries = db::interactions::list_for_phone(&mut conn, &member_phone())
        .await
        .unwrap();
    assert_eq!(entries[0].kind, InteractionKind::Suppressed);
    assert!(entries[0].content.starts_with("Delivery failed"));
}

#[tokio::test]
async fn test_campaign_for_missing_plan_is_not_found() {
    let app = TestApp::new().await;

    let err = app.state.campaign.send_onboarding(42).await.unwrap_err();
    assert!(matches!(err, totl_common::Error::NotFound(_)));
}
