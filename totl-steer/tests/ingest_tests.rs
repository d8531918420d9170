//! Best-effort batch ingestion

mod helpers;

use helpers::{member_phone, records, TestApp};
use serde_json::json;
use totl_steer::db;
use totl_steer::ingest::IngestKind;
use totl_steer::models::ConsentState;
use totl_steer::services::InboundMessage;

#[tokio::test]
async fn test_malformed_record_does_not_stop_batch() {
    let app = TestApp::new().await;
    app.ingest_ok(IngestKind::Plans, json!([{ "plan_id": 1, "name": "Acme PPO" }]))
        .await;

    let batch = records(json!([
        {
            "member_id": "M-1", "plan_id": 1, "first_name": "Ana", "last_name": "Lopez",
            "phone_number": "5550000001"
        },
        {
            "member_id": "M-2", "plan_id": 1, "first_name": "Ben",
            "phone_number": "5550000002"
        },
        {
            "member_id": "M-3", "plan_id": 1, "first_name": "Cy", "last_name": "Ng",
            "phone_number": "5550000003", "date_of_birth": "not-a-date"
        },
        {
            "member_id": "M-4", "plan_id": 1, "first_name": "Di", "last_name": "Ray",
            "phone_number": "5550000004"
        }
    ]));

    let report = app.state.ingestor.ingest(IngestKind::Eligibility, &batch).await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].starts_with("Record 2 (M-2)"));
    assert!(report.errors[0].contains("last_name"));
    assert!(report.errors[1].starts_with("Record 3 (M-3)"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_eligibility_update_keeps_identity_and_consent() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    app.state
        .ledger
        .force_opt_out(&member_phone(), "Complaint")
        .await
        .unwrap();

    app.ingest_ok(
        IngestKind::Eligibility,
        json!([{
            "member_id": "M-100",
            "plan_id": 1,
            "first_name": "Ana",
            "last_name": "Lopez-Grant",
            "phone_number": "555-201-9999",
            "risk_tier": "High"
        }]),
    )
    .await;

    let new_phone = totl_common::phone::PhoneKey::parse("555-201-9999");
    let mut conn = app.pool().acquire().await.unwrap();
    let member = db::members::find_by_phone(&mut conn, &new_phone)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.last_name, "Lopez-Grant");
    assert_eq!(member.zip_code.as_deref(), Some("60601"));
    drop(conn);

    // The opt-out follows the member to the new number
    assert_eq!(
        app.state.ledger.state(&new_phone).await.unwrap(),
        ConsentState::OptedOut
    );
}

#[tokio::test]
async fn test_member_moving_to_placeholder_number_absorbs_it() {
    let app = TestApp::new().await;
    app.seed_basic().await;
    let new_number = "555-606-1212";
    let new_phone = totl_common::phone::PhoneKey::parse(new_number);

    app.state
        .inbound
        .handle(&InboundMessage::text(new_number, "hi, who is this?"))
        .await
        .unwrap();
    app.state
        .inbound
        .handle(&InboundMessage::text(new_number, "STOP"))
        .await
        .unwrap();

    app.ingest_ok(
        IngestKind::Eligibility,
        json!([{
            "member_id": "M-100",
            "plan_id": 1,
            "first_name": "Ana",
            "last_name": "Lopez",
            "phone_number": new_number,
            "zip_code": "60601"
        }]),
    )
    .await;

    let mut conn = app.pool().acquire().await.unwrap();
    let member_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(member_rows, 1);

    let member = db::members::find_by_phone(&mut conn, &new_phone)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.member_id, "M-100");
    assert!(member.opted_out);

    let history = db::interactions::list_for_member(&mut conn, member.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    drop(conn);

    assert_eq!(
        app.state.ledger.state(&new_phone).await.unwrap(),
        ConsentState::OptedOut
    );
}

#[tokio::test]
async fn test_eligibility_rejects_phone_owned_by_other_member() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let report = app
        .state
        .ingestor
        .ingest(
            IngestKind::Eligibility,
            &records(json!([{
                "member_id": "M-999",
                "plan_id": 1,
                "first_name": "Eve",
                "last_name": "Park",
                "phone_number": helpers::MEMBER_PHONE
            }])),
        )
        .await;

    assert_eq!(report.processed, 0);
    assert!(report.errors[0].contains("already belongs to member M-100"));
}

#[tokio::test]
async fn test_eligibility_for_unknown_plan_fails() {
    let app = TestApp::new().await;

    let report = app
        .state
        .ingestor
        .ingest(
            IngestKind::Eligibility,
            &records(json!([{
                "member_id": "M-1", "plan_id": 7, "first_name": "A", "last_name": "B",
                "phone_number": "5550000001"
            }])),
        )
        .await;

    assert_eq!(report.processed, 0);
    assert!(report.errors[0].contains("plan 7 not found"));
}

#[tokio::test]
async fn test_accumulators_and_claims_require_known_member() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let report = app
        .state
        .ingestor
        .ingest(
            IngestKind::Accumulators,
            &records(json!([
                { "member_id": "M-100", "plan_id": 1, "deductible_met": "1,200.00" },
                { "member_id": "NOPE", "plan_id": 1, "deductible_met": 10 }
            ])),
        )
        .await;
    assert_eq!(report.processed, 1);
    assert!(report.errors[0].contains("NOPE"));

    let mut conn = app.pool().acquire().await.unwrap();
    let member = db::members::find_by_phone(&mut conn, &member_phone())
        .await
        .unwrap()
        .unwrap();
    let snapshot = db::accumulators::latest_for_member(&mut conn, member.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.deductible_met, 1200.0);
    assert_eq!(snapshot.deductible_limit, 3000.0);
    drop(conn);

    let report = app
        .state
        .ingestor
        .ingest(
            IngestKind::Claims,
            &records(json!([{
                "member_id": "M-100",
                "plan_id": 1,
                "date_of_service": "2024-03-01",
                "cpt_code": "80053",
                "allowed_amount": 42.5,
                "npi": "1111111111"
            }])),
        )
        .await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let mut conn = app.pool().acquire().await.unwrap();
    assert_eq!(
        db::claims::count_for_member(&mut conn, member.id).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_referral_for_unknown_member_is_reported() {
    let app = TestApp::new().await;
    app.seed_basic().await;

    let report = app
        .state
        .ingestor
        .ingest(
            IngestKind::Referrals,
            &records(json!([
                { "referral_id": "R-1", "member_id": "GHOST", "plan_id": 1, "cpt_code": "73721" },
                { "referral_id": "R-2", "member_id": "M-100", "plan_id": 1, "cpt_code": "73721" }
            ])),
        )
        .await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("GHOST"));
}

#[test]
fn test_ingest_kind_parsing() {
    assert_eq!("Eligibility".parse::<IngestKind>(), Ok(IngestKind::Eligibility));
    assert_eq!("eobs".parse::<IngestKind>(), Ok(IngestKind::Prices));
    assert!("payroll".parse::<IngestKind>().is_err());
}
