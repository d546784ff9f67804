use std::error::Error;
use std::sync::Arc;

use mockito::{Matcher, Server};
use sessionrec::auth::StaticToken;
use sessionrec::error::ErrorKind;
use sessionrec::recordings::api::{HttpRecordingRepository, RecordingRepository, RepositoryError};
use sessionrec::recordings::models::RecordingStatus;

const RECORD: &str = r#"{
    "id": 7,
    "appointment_id": 42,
    "recording_sid": "RT123",
    "media_uri": "https://video.example.com/RT123.mp4",
    "media_external_location": null,
    "duration": 3000,
    "duration_formatted": "50:00",
    "size": 52428800,
    "size_formatted": "50.0 MB",
    "status": "completed",
    "status_display": "Completed",
    "participant_identity": "psych-3",
    "created_at": "2025-03-01T10:00:00Z",
    "completed_at": "2025-03-01T10:50:00Z",
    "patient_name": "Sam Patient",
    "psychologist_name": "Dr. Rivera"
}"#;

fn repo(server: &Server) -> HttpRecordingRepository {
    HttpRecordingRepository::new(
        reqwest::Client::new(),
        &format!("{}/api", server.url()),
        Arc::new(StaticToken::new("t")),
    )
    .expect("valid base url")
}

#[tokio::test]
async fn fetches_record_with_bearer_token() -> Result<(), Box<dyn Error>> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/appointments/42/recording/")
        .match_header("authorization", "Bearer t")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(RECORD)
        .create_async()
        .await;

    let record = repo(&server).fetch_by_appointment(42).await?;
    assert_eq!(record.id, 7);
    assert_eq!(record.status, RecordingStatus::Completed);
    assert_eq!(
        record.media_uri.as_deref(),
        Some("https://video.example.com/RT123.mp4")
    );
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn missing_recording_is_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/appointments/5/recording/")
        .with_status(404)
        .with_body(r#"{"detail": "Not found."}"#)
        .create_async()
        .await;

    let err = repo(&server).fetch_by_appointment(5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.user_message(), "No recording found for this appointment");
}

#[tokio::test]
async fn expired_token_is_unauthorized_not_transport() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/appointments/5/recording/")
        .with_status(401)
        .with_body(r#"{"detail": "Given token not valid for any token type"}"#)
        .create_async()
        .await;

    let err = repo(&server).fetch_by_appointment(5).await.unwrap_err();
    assert_eq!(
        err,
        RepositoryError::Unauthorized {
            status: Some(401),
            message: "Given token not valid for any token type".into(),
        }
    );
}

#[tokio::test]
async fn list_sends_page_and_page_size() -> Result<(), Box<dyn Error>> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/appointments/recordings/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("page_size".into(), "20".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"count": 25, "next": null, "previous": "http://x/?page=1", "results": [
                {"id": 21, "recording_sid": "RT21", "appointment_date": "2025-03-01T10:00:00Z",
                 "status": "completed", "created_at": "2025-03-01T10:00:00Z"}
            ]}"#,
        )
        .create_async()
        .await;

    let page = repo(&server).list(2, 20).await?;
    assert_eq!(page.count, 25);
    assert!(page.next.is_none());
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.completed_count(), 1);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn server_error_uses_error_field_then_fallback() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/appointments/recordings/3/download/")
        .with_status(400)
        .with_body(r#"{"error": "Recording not completed"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/appointments/recordings/4/download/")
        .with_status(502)
        .with_body("<html>bad gateway</html>")
        .create_async()
        .await;

    let repo = repo(&server);
    let err = repo.fetch_download_descriptor(3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.user_message(), "Recording not completed");

    let err = repo.fetch_download_descriptor(4).await.unwrap_err();
    assert_eq!(err.user_message(), "Failed to download recording");
}

#[tokio::test]
async fn malformed_body_is_transport() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/appointments/1/recording/")
        .with_status(200)
        .with_body("{\"id\": \"seven\"}")
        .create_async()
        .await;

    let err = repo(&server).fetch_by_appointment(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn blank_token_never_reaches_the_server() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let repo = HttpRecordingRepository::new(
        reqwest::Client::new(),
        &server.url(),
        Arc::new(StaticToken::new("  ")),
    )
    .expect("valid base url");
    let err = repo.fetch_by_appointment(1).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Unauthorized { status: None, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_server_is_transport_without_status() {
    // Nothing listens on port 1.
    let repo = HttpRecordingRepository::new(
        reqwest::Client::new(),
        "http://127.0.0.1:1/api",
        Arc::new(StaticToken::new("t")),
    )
    .expect("valid base url");

    let err = repo.list(1, 20).await.unwrap_err();
    assert!(
        matches!(err, RepositoryError::Transport { status: None, .. }),
        "got {err:?}"
    );
    assert_eq!(err.kind(), ErrorKind::Transport);
}
