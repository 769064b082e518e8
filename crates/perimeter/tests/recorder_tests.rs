use perimeter::recorder::{self, UNKNOWN, UseDetails};
use perimeter::store::NewAccessToken;
use perimeter::testing::TestGate;
use perimeter::PerimeterError;
use sea_orm::ConnectionTrait;

#[tokio::test]
async fn test_record_with_identity() {
    let app = TestGate::new().await;
    let token = app
        .store
        .create_access_token(NewAccessToken::with_token("test_tok"))
        .await
        .unwrap();

    let usage = recorder::record_use(
        &app.db,
        &token,
        UseDetails {
            user_email: Some("hugo@example.com".to_string()),
            user_name: Some("Hugo".to_string()),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to record use");

    assert_eq!(usage.token_id, token.id);
    assert_eq!(usage.user_email, "hugo@example.com");
    assert_eq!(usage.user_name, "Hugo");
    assert_eq!(usage.client_ip, UNKNOWN);
    assert_eq!(usage.client_user_agent, UNKNOWN);

    let uses = recorder::list_uses(&app.db, token.id).await.unwrap();
    assert_eq!(uses, vec![usage]);
}

#[tokio::test]
async fn test_record_defaults_everything_to_unknown() {
    let app = TestGate::new().await;
    let token = app
        .store
        .create_access_token(NewAccessToken::default())
        .await
        .unwrap();

    let usage = recorder::record_use(
        &app.db,
        &token,
        UseDetails {
            user_email: Some(String::new()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(usage.user_email, "unknown");
    assert_eq!(usage.user_name, "unknown");
    assert_eq!(usage.client_ip, "unknown");
    assert_eq!(usage.client_user_agent, "unknown");
}

#[tokio::test]
async fn test_uses_accumulate_per_token() {
    let app = TestGate::new().await;
    let a = app
        .store
        .create_access_token(NewAccessToken::with_token("AAAA"))
        .await
        .unwrap();
    let b = app
        .store
        .create_access_token(NewAccessToken::with_token("BBBB"))
        .await
        .unwrap();

    for _ in 0..3 {
        recorder::record_use(&app.db, &a, UseDetails::default())
            .await
            .unwrap();
    }
    recorder::record_use(&app.db, &b, UseDetails::default())
        .await
        .unwrap();

    assert_eq!(recorder::list_uses(&app.db, a.id).await.unwrap().len(), 3);
    assert_eq!(recorder::list_uses(&app.db, b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recording_failure_is_surfaced() {
    let app = TestGate::new().await;
    let token = app
        .store
        .create_access_token(NewAccessToken::default())
        .await
        .unwrap();

    app.db
        .execute_unprepared("DROP TABLE access_token_uses")
        .await
        .unwrap();

    let err = recorder::record_use(&app.db, &token, UseDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PerimeterError::Recording(_)));
}
