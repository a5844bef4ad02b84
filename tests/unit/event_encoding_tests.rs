//! Unit tests for event-stream framing and the event writer.

use progress_stream::models::step::StepData;
use progress_stream::producer::events::{encode_frame, event_channel, EventKind};

fn frame_text(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).expect("utf8 frame")
}

#[test]
fn frame_has_id_event_data_and_blank_line() {
    let frame = encode_frame(3, EventKind::Step, r#"{"a":1}"#);
    assert_eq!(frame, "id: 3\nevent: step\ndata: {\"a\":1}\n\n");
}

#[test]
fn event_labels_match_wire_names() {
    assert_eq!(EventKind::Step.as_str(), "step");
    assert_eq!(EventKind::Return.as_str(), "return");
    assert_eq!(EventKind::RequestError.as_str(), "requestError");
    assert!(!EventKind::Step.is_terminal());
    assert!(EventKind::Return.is_terminal());
    assert!(EventKind::RequestError.is_terminal());
}

#[test]
fn step_data_uses_camel_case_fields() {
    let data = StepData {
        percent: 25.0,
        average_completion_time_in_ms: 1000,
        message: "Loading".into(),
    };
    let json = serde_json::to_value(&data).expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({
            "percent": 25.0,
            "averageCompletionTimeInMs": 1000,
            "message": "Loading"
        })
    );
}

#[tokio::test]
async fn writer_numbers_frames_from_one() {
    let (mut writer, mut rx) = event_channel();
    assert_eq!(writer.last_id(), 0);

    writer.send(EventKind::Step, &serde_json::json!({"n": 1})).expect("send");
    writer.send(EventKind::Step, &serde_json::json!({"n": 2})).expect("send");

    let first = frame_text(&rx.recv().await.expect("frame 1"));
    let second = frame_text(&rx.recv().await.expect("frame 2"));
    assert!(first.starts_with("id: 1\nevent: step\n"));
    assert!(second.starts_with("id: 2\nevent: step\n"));
    assert_eq!(writer.last_id(), 2);
}

#[tokio::test]
async fn nothing_is_written_after_terminal_event() {
    let (mut writer, mut rx) = event_channel();
    writer.send(EventKind::Return, &Option::<u8>::None).expect("send");
    assert!(writer.is_finished());

    writer
        .send(EventKind::RequestError, &serde_json::json!({"message": "late"}))
        .expect("ignored");
    drop(writer);

    let only = frame_text(&rx.recv().await.expect("return frame"));
    assert_eq!(only, "id: 1\nevent: return\ndata: null\n\n");
    assert!(rx.recv().await.is_none());
}

#[test]
fn writes_to_disconnected_client_are_not_errors() {
    let (mut writer, rx) = event_channel();
    drop(rx);
    writer.send(EventKind::Step, &serde_json::json!({})).expect("no error");
    assert_eq!(writer.last_id(), 1);
}
