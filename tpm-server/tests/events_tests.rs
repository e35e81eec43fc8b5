//! Live updates over SSE, through the full router

mod helpers;

use axum::http::StatusCode;
use serde_json::json;
use tpm_common::PracticeEvent;
use uuid::Uuid;

use helpers::{read_stream_until, signed_request, TestApp};

#[tokio::test]
async fn test_event_stream_requires_signature() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .uri("/api/events")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_event_stream_only_carries_own_practice() {
    let app = TestApp::new().await;
    let other = app.add_practice("Lakeside Therapy").await;

    let (status, mut stream) = app.open_stream(app.signed("GET", "/api/events", None)).await;
    assert_eq!(status, StatusCode::OK);
    let opened = read_stream_until(&mut stream, "connected").await;
    assert!(opened.contains("event: ConnectionStatus"), "{}", opened);

    let foreign_note = Uuid::new_v4();
    app.events.emit_lossy(PracticeEvent::SessionNoteFinalized {
        practice_id: other.id,
        note_id: foreign_note,
    });
    let own_note = Uuid::new_v4();
    app.events.emit_lossy(PracticeEvent::SessionNoteFinalized {
        practice_id: app.practice.id,
        note_id: own_note,
    });

    let seen = read_stream_until(&mut stream, &own_note.to_string()).await;
    assert!(seen.contains("event: SessionNoteFinalized"), "{}", seen);
    assert!(!seen.contains(&foreign_note.to_string()), "{}", seen);
    assert!(!seen.contains(&other.id.to_string()), "{}", seen);

    // The other practice's own stream does see it
    let (status, mut foreign_stream) = app
        .open_stream(signed_request(other, None, "GET", "/api/events", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    read_stream_until(&mut foreign_stream, "connected").await;
    app.events.emit_lossy(PracticeEvent::SessionNoteFinalized {
        practice_id: other.id,
        note_id: foreign_note,
    });
    read_stream_until(&mut foreign_stream, &foreign_note.to_string()).await;
}

#[tokio::test]
async fn test_addressed_notifications_reach_only_their_recipient() {
    let app = TestApp::new().await;
    let okafor = app.create_staff("okafor@example.com").await;
    let reyes = app.create_staff("reyes@example.com").await;

    let (_, mut okafor_stream) = app.open_stream(app.signed_as(okafor, "GET", "/api/events", None)).await;
    let (_, mut reyes_stream) = app.open_stream(app.signed_as(reyes, "GET", "/api/events", None)).await;
    let (_, mut anonymous_stream) = app.open_stream(app.signed("GET", "/api/events", None)).await;
    for stream in [&mut okafor_stream, &mut reyes_stream, &mut anonymous_stream] {
        read_stream_until(stream, "connected").await;
    }

    for (title, assignee) in [("Call insurer", okafor), ("File intake forms", reyes)] {
        let (status, body) = app
            .send(app.signed(
                "POST",
                "/api/tasks",
                Some(json!({ "title": title, "assignee_id": assignee })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    // A practice-wide event closes out every stream
    let marker = Uuid::new_v4();
    app.events.emit_lossy(PracticeEvent::NotificationCreated {
        practice_id: app.practice.id,
        notification_id: marker,
        recipient_id: None,
        message: "Practice-wide notice".to_string(),
    });

    let okafor_seen = read_stream_until(&mut okafor_stream, &marker.to_string()).await;
    assert!(okafor_seen.contains("Call insurer"), "{}", okafor_seen);
    assert!(!okafor_seen.contains("File intake forms"), "{}", okafor_seen);

    let reyes_seen = read_stream_until(&mut reyes_stream, &marker.to_string()).await;
    assert!(reyes_seen.contains("File intake forms"), "{}", reyes_seen);
    assert!(!reyes_seen.contains("Call insurer"), "{}", reyes_seen);

    let anonymous_seen = read_stream_until(&mut anonymous_stream, &marker.to_string()).await;
    assert!(!anonymous_seen.contains("Call insurer"), "{}", anonymous_seen);
    assert!(!anonymous_seen.contains("File intake forms"), "{}", anonymous_seen);
    assert!(anonymous_seen.contains("Practice-wide notice"), "{}", anonymous_seen);
}
