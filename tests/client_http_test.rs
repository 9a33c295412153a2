//! HTTP-level tests for `MatchClient`
//!
//! Each test binds a one-shot responder on a local port that reads the
//! request and writes back a canned HTTP/1.1 response.

use futures::StreamExt;
use school_match::{
    CollectingHandler, CounterSessionIds, Error, FormData, MatchClient, MatchOptions,
    MatchRequest, MatchResponse, MatchUpdate, PromptData, submit_match,
};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serves exactly one connection and returns the raw request it received.
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{addr}"), server)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.expect("read request");
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn sse_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n{body}"
    )
}

fn options(base_url: &str) -> MatchOptions {
    MatchOptions::builder()
        .base_url(base_url)
        .request_timeout(5)
        .inactivity_timeout(Duration::from_secs(2))
        .session_ids(CounterSessionIds::new("http-"))
        .build()
        .unwrap()
}

fn request() -> MatchRequest {
    MatchRequest::new(
        FormData {
            student_school: "武汉大学".into(),
            grade_system: "百分制".into(),
            grade: "86".into(),
            is_current_student: true,
            target_school: "新加坡国立大学".into(),
            major: "计算机科学".into(),
            ..Default::default()
        },
        PromptData::default(),
    )
}

const SSE_BODY: &str = concat!(
    "data: {\"type\":\"start\",\"message\":\"正在分析背景\"}\n\n",
    "data: {\"type\":\"step\",\"description\":\"检索院校库\",\"status\":\"running\"}\n\n",
    "data: {\"type\":\"ai_token\",\"content\":\"推荐结果：\"}\n\n",
    "data: {\"type\":\"final_response\",\"response\":\"{\\\"matched_schools\\\":[{\\\"chinese_name\\\":\\\"新加坡国立大学\\\",\\\"school_category\\\":\\\"匹配\\\"}]}\"}\n\n",
    "data: {\"type\":\"end\"}\n\n",
);

#[tokio::test]
async fn test_stream_response_runs_to_completion() {
    let (base_url, server) = serve_once(sse_response(SSE_BODY)).await;
    let client = MatchClient::new(options(&base_url)).unwrap();

    let mut handler = CollectingHandler::new();
    client.run(&request(), &mut handler).await;

    assert_eq!(handler.progress, vec!["正在分析背景", "检索院校库"]);
    assert_eq!(handler.completions, 1);
    let result = handler.result.unwrap();
    assert!(result.response.starts_with("推荐结果："));
    assert_eq!(result.session_id, "http-1");
    assert_eq!(
        result.matched_schools.unwrap()[0].chinese_name,
        "新加坡国立大学"
    );

    let raw_request = server.await.unwrap();
    assert!(raw_request.starts_with("POST /api/school-match HTTP/1.1"));
    assert!(raw_request.to_lowercase().contains("accept: text/event-stream"));
    let body = &raw_request[raw_request.find("\r\n\r\n").unwrap() + 4..];
    let posted: Value = serde_json::from_str(body).unwrap();
    assert_eq!(posted["studentSchool"], "武汉大学");
    assert_eq!(posted["isCurrentStudent"], true);
    assert!(posted.get("languageTestType").is_none());
}

#[tokio::test]
async fn test_json_response_is_returned_as_is() {
    let document = json!({
        "success": true,
        "response": "非流式回答",
        "timestamp": "2024-06-01T08:00:00.000Z",
        "session_id": "backend-42",
        "matched_schools": [{"chinese_name": "香港中文大学", "qs_ranking": "36"}],
        "student_background": {"domestic_university": "武汉大学"},
        "recommended_projects": []
    });
    let (base_url, _server) =
        serve_once(http_response("200 OK", "application/json", &document.to_string())).await;
    let client = MatchClient::new(options(&base_url)).unwrap();

    let response = client.submit(&request()).await.unwrap();
    let MatchResponse::Json(body) = response else {
        panic!("expected a JSON response");
    };
    assert_eq!(body, document);

    let result = client.resolve_json(body);
    assert_eq!(result.response, "非流式回答");
    assert_eq!(result.session_id, "backend-42");
    assert_eq!(result.timestamp, "2024-06-01T08:00:00.000Z");
    assert_eq!(result.matched_schools.unwrap()[0].ranking(), Some(36));
    assert_eq!(result.recommended_projects, Some(vec![]));
    assert!(result.progress_messages.is_empty());
}

#[tokio::test]
async fn test_plain_text_body_is_wrapped() {
    let (base_url, _server) =
        serve_once(http_response("200 OK", "text/plain; charset=utf-8", "纯文本回答")).await;

    let result = submit_match(&request(), &options(&base_url)).await.unwrap();
    assert!(result.success);
    assert_eq!(result.response, "纯文本回答");
    assert!(!result.has_structured_data());
}

#[tokio::test]
async fn test_error_status_carries_backend_message() {
    let (base_url, _server) = serve_once(http_response(
        "500 Internal Server Error",
        "application/json",
        r#"{"error":"模型服务不可用"}"#,
    ))
    .await;
    let client = MatchClient::new(options(&base_url)).unwrap();

    let err = client.match_once(&request()).await.unwrap_err();
    assert!(matches!(err, Error::Api(_)));
    assert_eq!(
        err.to_string(),
        "API error: 500 Internal Server Error: 模型服务不可用"
    );
}

#[tokio::test]
async fn test_error_status_routes_to_on_error() {
    let (base_url, _server) =
        serve_once(http_response("502 Bad Gateway", "text/html", "upstream down")).await;
    let client = MatchClient::new(options(&base_url)).unwrap();

    let mut handler = CollectingHandler::new();
    client.run(&request(), &mut handler).await;
    assert_eq!(handler.completions, 0);
    assert_eq!(handler.errors, 1);
    assert!(handler.error.unwrap().contains("upstream down"));
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_sending() {
    let client = MatchClient::new(options("http://127.0.0.1:9")).unwrap();
    let mut incomplete = request();
    incomplete.form.grade.clear();

    let err = client.submit(&incomplete).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_updates_stream_ends_with_terminal_update() {
    let (base_url, _server) = serve_once(sse_response(SSE_BODY)).await;
    let client = MatchClient::new(options(&base_url)).unwrap();

    let updates: Vec<MatchUpdate> = client.updates(request()).collect().await;
    let (last, progress) = updates.split_last().expect("at least one update");

    assert_eq!(progress.len(), 2);
    assert!(progress.iter().all(|u| !u.is_terminal()));
    match last {
        MatchUpdate::Complete { result, raw_text } => {
            assert!(result.has_structured_data());
            assert!(raw_text.as_deref().unwrap().starts_with("推荐结果："));
        }
        other => panic!("expected completion, got {:?}", other),
    }
}
