//! End-to-end tests of the client against a mocked backend.
//!
//! The live test at the bottom needs a running backend and is ignored by
//! default:
//!   SHADOW_CHAT_BACKEND=http://localhost:5000 cargo test -p shadow-chat-client --test backend -- --ignored

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shadow_chat_client::{ChatController, ClientConfig, ClientError, TurnOutcome, GENERIC_FAILURE_NOTICE};
use shadow_chat_core::{ChatResponse, Message, Role};

const OWNER: &str = "seller@example.com";

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: server.uri(),
        owner: Some(OWNER.to_string()),
        ..ClientConfig::default()
    }
}

fn frame_line(messages: Vec<Message>) -> String {
    format!(
        "{}\n",
        serde_json::to_string(&ChatResponse::from_messages(messages)).unwrap()
    )
}

fn citations_message() -> Message {
    Message::tool(
        json!({
            "citations": [
                {"id": "a1", "title": "Discount policy", "filepath": "policy.md", "content": "Max 15%."},
                {"id": null, "title": null, "content": null}
            ],
            "intent": "[\"discount limits\"]"
        })
        .to_string(),
    )
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn streamed_answer_replaces_snapshots() {
    let server = MockServer::start().await;

    // A pretty-printed frame spans several lines; CRLF endings are tolerated.
    let pretty = serde_json::to_string_pretty(&ChatResponse::from_messages(vec![
        citations_message(),
        Message::assistant("Up to"),
    ]))
    .unwrap()
    .replace('\n', "\r\n");
    let body = format!(
        "{}{pretty}\r\n\r\n{}",
        frame_line(vec![citations_message()]),
        frame_line(vec![citations_message(), Message::assistant("Up to 15% [doc1].")]),
    );

    Mock::given(method("POST"))
        .and(path("/conversation"))
        .and(body_json(json!({"messages": [{"role": "user", "content": "What discount can I give?"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let controller = ChatController::new(&config(&server)).unwrap();
    let outcome = controller.send("What discount can I give?").await;
    assert_eq!(outcome, TurnOutcome::Completed);

    let session = controller.session();
    let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);
    assert_eq!(session.messages()[2].content, "Up to 15% [doc1].");

    let citations = session.citations_for(2);
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].filepath.as_deref(), Some("policy.md"));
    assert_eq!(citations[1].id, "");
    assert_eq!(citations[1].display_title(), "");
}

#[tokio::test]
async fn follow_up_sends_whole_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversation"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(frame_line(vec![Message::assistant("first")])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversation"))
        .and(body_json(json!({"messages": [
            {"role": "user", "content": "one"},
            {"role": "assistant", "content": "first"},
            {"role": "user", "content": "two"}
        ]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(frame_line(vec![Message::assistant("second")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let controller = ChatController::new(&config(&server)).unwrap();
    assert_eq!(controller.send("one").await, TurnOutcome::Completed);
    assert_eq!(controller.send("two").await, TurnOutcome::Completed);
    assert_eq!(controller.session().messages().len(), 4);
}

#[tokio::test]
async fn empty_stream_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversation"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let controller = ChatController::new(&config(&server)).unwrap();
    assert_eq!(controller.send("q").await, TurnOutcome::Failed);
    assert_eq!(controller.session().messages(), &[Message::user("q")]);
    assert_eq!(controller.take_notice().as_deref(), Some(GENERIC_FAILURE_NOTICE));
}

#[tokio::test]
async fn frame_without_choices_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversation"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\": \"x\"}\n"))
        .mount(&server)
        .await;

    let controller = ChatController::new(&config(&server)).unwrap();
    assert_eq!(controller.send("q").await, TurnOutcome::Failed);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn save_posts_record_without_tool_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/saveconversation"))
        .and(body_json(json!({
            "user": OWNER,
            "title": "Discounts",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": "Up to 15% ."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let controller = ChatController::new(&ClientConfig {
        strip_citation_markers: true,
        ..config(&server)
    })
    .unwrap();
    controller.load(shadow_chat_core::Conversation {
        id: None,
        title: String::new(),
        owner: String::new(),
        messages: vec![
            Message::user("q"),
            citations_message(),
            Message::assistant("Up to 15% [doc1]."),
        ],
    });

    controller.save("Discounts").await.unwrap();
}

#[tokio::test]
async fn list_survives_malformed_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/selectconversationhistory"))
        .and(body_partial_json(json!({"user": OWNER})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "5f1c2a9e-7d4b-4c1e-9a7f-2b8e6d3c1a00", "title": "T", "user": OWNER,
             "messages": [{"role": "user", "content": "hi"}]},
            {"title": 42, "user": OWNER, "messages": [{"role": "narrator", "content": "x"}]},
            "not a record"
        ])))
        .mount(&server)
        .await;

    let controller = ChatController::new(&config(&server)).unwrap();
    let conversations = controller.list_conversations().await.unwrap();

    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].title, "T");
    assert_eq!(conversations[0].messages, vec![Message::user("hi")]);
    assert!(conversations[0].id.is_some());
    assert_eq!(conversations[1].title, "");
    assert!(conversations[1].messages.is_empty());

    controller.load(conversations[0].clone());
    assert_eq!(controller.session().messages(), &[Message::user("hi")]);
}

#[tokio::test]
async fn rejected_save_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/saveconversation"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "store offline"})))
        .mount(&server)
        .await;

    let controller = ChatController::new(&config(&server)).unwrap();
    let err = controller.save("T").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 503, ref message } if message == "store offline"));
}

// =============================================================================
// Live backend
// =============================================================================

#[tokio::test]
#[ignore = "requires a running backend"]
async fn live_backend_answers() {
    let base_url = std::env::var("SHADOW_CHAT_BACKEND")
        .unwrap_or_else(|_| "http://localhost:5000".to_string());
    let controller = ChatController::new(&ClientConfig {
        base_url,
        ..ClientConfig::default()
    })
    .unwrap();

    let outcome = controller.send("Hello").await;
    assert_eq!(outcome, TurnOutcome::Completed, "notice: {:?}", controller.take_notice());

    let session = controller.session();
    let answer = session
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .expect("assistant message");
    println!("{}", answer.content);
}
