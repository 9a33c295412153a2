//! End-to-end tests for stream consumption
//!
//! Raw body chunks go in through `consume_stream`; the tests check what the
//! caller's handler observes.

use bytes::Bytes;
use futures::{Stream, stream};
use school_match::{
    CollectingHandler, CounterSessionIds, DEFAULT_FALLBACK_MESSAGE, MatchHandler, MatchOptions,
    MatchResult, consume_stream,
};
use std::time::Duration;

type Chunk = Result<Bytes, std::io::Error>;

fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn options() -> MatchOptions {
    MatchOptions::builder()
        .base_url("http://localhost:3000")
        .inactivity_timeout(Duration::from_millis(200))
        .session_ids(CounterSessionIds::new("e2e-"))
        .build()
        .unwrap()
}

fn byte_chunks(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Chunk> + Unpin {
    stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect::<Vec<_>>())
}

fn text_chunks(parts: &[&str]) -> impl Stream<Item = Chunk> + Unpin + use<> {
    byte_chunks(parts.iter().map(|p| p.as_bytes().to_vec()).collect())
}

async fn consume(parts: &[&str]) -> CollectingHandler {
    let mut handler = CollectingHandler::new();
    consume_stream(text_chunks(parts), &options(), &mut handler).await;
    handler
}

fn completed(handler: CollectingHandler) -> MatchResult {
    assert_eq!(handler.completions, 1, "expected exactly one completion");
    assert_eq!(handler.errors, 0, "expected no error");
    handler.result.expect("completion carries a result")
}

#[tokio::test]
async fn test_start_final_end_scenario() {
    init_logging();

    let handler = consume(&[
        "data: {\"type\":\"start\",\"message\":\"beginning\"}\n\n",
        "data: {\"type\":\"final_response\",\"response\":\"Result: A\"}\n\n",
        "data: {\"type\":\"end\"}\n\n",
    ])
    .await;

    assert_eq!(handler.progress, vec!["beginning"]);
    let result = completed(handler);
    assert!(result.success);
    assert_eq!(result.response, "Result: A");
    assert_eq!(result.progress_messages, vec!["beginning"]);
}

#[tokio::test]
async fn test_empty_stream_completes_with_fallback() {
    let handler = consume(&[]).await;
    assert!(handler.progress.is_empty());
    assert!(handler.raw_text.as_deref().is_some_and(str::is_empty));

    let result = completed(handler);
    assert_eq!(result.response, DEFAULT_FALLBACK_MESSAGE);
    assert!(result.matched_schools.is_none());
    assert!(result.student_background.is_none());
    assert!(result.recommended_projects.is_none());
}

#[tokio::test]
async fn test_fenced_matched_schools_in_final_text() {
    let text = "```json\n{\"matched_schools\":[{\"chinese_name\":\"牛津大学\",\"english_name\":\"University of Oxford\",\"qs_ranking\":\"3\"}]}\n```";
    let line = format!(
        "data: {}\n",
        serde_json::json!({"type": "final_response", "response": text})
    );

    let result = completed(consume(&[line.as_str()]).await);
    let schools = result.matched_schools.expect("matched schools extracted");
    assert_eq!(schools.len(), 1);
    assert_eq!(schools[0].chinese_name, "牛津大学");
    assert_eq!(schools[0].ranking(), Some(3));
    assert_eq!(result.response, text);
}

#[tokio::test]
async fn test_second_concatenated_object_is_found() {
    let text = concat!(
        "{\"summary\":\"背景分析\",\"score\":88}",
        "{\"matched_schools\":[{\"chinese_name\":\"帝国理工学院\",\"school_category\":\"冲刺\"}]}"
    );
    let line = format!(
        "data: {}\n",
        serde_json::json!({"type": "final", "response": text})
    );

    let result = completed(consume(&[line.as_str()]).await);
    let schools = result.matched_schools.expect("second object searched");
    assert_eq!(schools.len(), 1);
    assert_eq!(schools[0].chinese_name, "帝国理工学院");
}

#[tokio::test]
async fn test_malformed_lines_are_skipped_in_order() {
    let handler = consume(&[
        "data: {\"type\":\"step\",\"description\":\"读取背景\"}\n",
        "data: {not json\n",
        "data: {\"type\":\"step\",\"description\":\"筛选院校\"}\n",
        "data: \"unterminated\n",
        ": keep-alive\n",
        "data: [DONE]\n",
        "data: {\"type\":\"step\",\"description\":\"生成报告\"}\n",
    ])
    .await;

    assert_eq!(handler.progress, vec!["读取背景", "筛选院校", "生成报告"]);
    let result = completed(handler);
    assert_eq!(result.steps.map(|s| s.len()), Some(3));
}

#[tokio::test]
async fn test_final_responses_concatenate() {
    let handler = consume(&[
        "data: {\"type\":\"final_response\",\"response\":\"foo\"}\n",
        "data: {\"type\":\"final_response\",\"response\":\"bar\"}\n",
    ])
    .await;

    assert_eq!(handler.raw_text.as_deref(), Some("foobar"));
    assert_eq!(completed(handler).response, "foobar");
}

#[tokio::test]
async fn test_structured_fields_first_write_wins() {
    let kept = consume(&[
        "data: {\"type\":\"step\",\"matched_schools\":[{\"chinese_name\":\"X\"}]}\n",
        "data: {\"type\":\"step\",\"matched_schools\":null}\n",
    ])
    .await;
    let schools = completed(kept).matched_schools.unwrap();
    assert_eq!(schools[0].chinese_name, "X");

    let filled = consume(&[
        "data: {\"type\":\"step\",\"matched_schools\":null}\n",
        "data: {\"type\":\"step\",\"matched_schools\":[{\"chinese_name\":\"Y\"}]}\n",
    ])
    .await;
    let schools = completed(filled).matched_schools.unwrap();
    assert_eq!(schools[0].chinese_name, "Y");
}

#[tokio::test]
async fn test_tokens_stream_into_answer() {
    let handler = consume(&[
        "data: {\"type\":\"ai_token\",\"content\":\"根据您的\"}\n",
        "data: {\"type\":\"ai_token\",\"content\":\"背景，\"}\n",
        "data: {\"type\":\"token\",\"content\":\"推荐如下。\"}\n",
        "data: {\"type\":\"end\"}\n",
    ])
    .await;
    assert_eq!(completed(handler).response, "根据您的背景，推荐如下。");
}

#[tokio::test]
async fn test_content_after_end_marker_is_kept() {
    let handler = consume(&[
        "data: {\"type\":\"final\",\"response\":\"part one\"}\n",
        "data: {\"type\":\"end\"}\n",
        "data: {\"type\":\"final\",\"response\":\", part two\"}\n",
    ])
    .await;
    assert_eq!(completed(handler).response, "part one, part two");
}

#[tokio::test]
async fn test_unknown_event_types_are_tolerated() {
    let handler = consume(&[
        "data: {\"type\":\"heartbeat\",\"seq\":1}\n",
        "data: {\"type\":\"final\",\"response\":\"ok\"}\n",
    ])
    .await;
    assert_eq!(completed(handler).response, "ok");
}

#[tokio::test]
async fn test_trailing_line_without_newline_is_processed() {
    let handler = consume(&["data: {\"type\":\"final\",\"response\":\"tail\"}"]).await;
    assert_eq!(completed(handler).response, "tail");
}

const CHUNKING_BODY: &str = concat!(
    "data: {\"type\":\"start\",\"message\":\"开始匹配\"}\n",
    "\n",
    "data: {\"type\":\"ai_token\",\"content\":\"推荐：牛津大学、剑桥大学 🎓\"}\r\n",
    "data: {\"type\":\"step\",\"description\":\"完成\",\"status\":\"success\"}\n",
    "data: {\"type\":\"final_response\",\"response\":\"{\\\"student_background\\\":{\\\"domestic_university\\\":\\\"复旦大学\\\"}}\"}\n",
    "data: {\"type\":\"end\"}"
);

#[tokio::test]
async fn test_chunk_boundaries_do_not_change_outcome() {
    let bytes = CHUNKING_BODY.as_bytes();

    let mut whole = CollectingHandler::new();
    consume_stream(byte_chunks(vec![bytes.to_vec()]), &options(), &mut whole).await;
    let expected_progress = whole.progress.clone();
    let expected_text = whole.raw_text.clone();
    let expected = completed(whole);
    assert_eq!(
        expected.student_background.as_ref().unwrap().domestic_university,
        "复旦大学"
    );

    // Every single split point, including ones inside multi-byte characters
    // and inside the `data: ` prefix.
    for split in 1..bytes.len() {
        let mut handler = CollectingHandler::new();
        let chunks = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];
        consume_stream(byte_chunks(chunks), &options(), &mut handler).await;

        assert_eq!(handler.progress, expected_progress, "split at {}", split);
        assert_eq!(handler.raw_text, expected_text, "split at {}", split);
        let result = completed(handler);
        assert_eq!(result.response, expected.response, "split at {}", split);
        assert_eq!(
            result.student_background, expected.student_background,
            "split at {}",
            split
        );
    }
}

#[tokio::test]
async fn test_byte_at_a_time_delivery() {
    let chunks: Vec<Vec<u8>> = CHUNKING_BODY.bytes().map(|b| vec![b]).collect();
    let mut handler = CollectingHandler::new();
    consume_stream(byte_chunks(chunks), &options(), &mut handler).await;

    assert_eq!(handler.progress, vec!["开始匹配", "完成"]);
    let result = completed(handler);
    assert!(result.response.starts_with("推荐：牛津大学、剑桥大学 🎓"));
}

#[tokio::test]
async fn test_error_before_any_byte_reports_error() {
    let failing = stream::iter(vec![Err::<Bytes, _>(std::io::Error::other(
        "connection refused",
    ))]);
    let mut handler = CollectingHandler::new();
    consume_stream(failing, &options(), &mut handler).await;

    assert_eq!(handler.completions, 0);
    assert_eq!(handler.errors, 1);
    assert!(handler.error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_error_mid_stream_keeps_received_data() {
    let chunks: Vec<Chunk> = vec![
        Ok(Bytes::from_static(
            b"data: {\"type\":\"final\",\"response\":\"partial\"}\n",
        )),
        Err(std::io::Error::other("connection reset")),
        Ok(Bytes::from_static(
            b"data: {\"type\":\"final\",\"response\":\" never read\"}\n",
        )),
    ];
    let mut handler = CollectingHandler::new();
    consume_stream(stream::iter(chunks), &options(), &mut handler).await;
    assert_eq!(completed(handler).response, "partial");
}

#[tokio::test]
async fn test_stalled_stream_completes_after_inactivity_window() {
    let first = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
        b"data: {\"type\":\"final\",\"response\":\"before stall\"}\n",
    ))]);
    let stalled = futures::StreamExt::chain(first, stream::pending());

    let mut handler = CollectingHandler::new();
    let started = std::time::Instant::now();
    consume_stream(Box::pin(stalled), &options(), &mut handler).await;

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(completed(handler).response, "before stall");
}

#[tokio::test]
async fn test_progress_never_follows_completion() {
    struct Recorder(Vec<&'static str>);

    impl MatchHandler for Recorder {
        fn on_progress(&mut self, _message: &str) {
            self.0.push("progress");
        }
        fn on_complete(&mut self, _result: MatchResult, _raw_text: Option<String>) {
            self.0.push("complete");
        }
        fn on_error(&mut self, _message: &str) {
            self.0.push("error");
        }
    }

    let mut recorder = Recorder(Vec::new());
    consume_stream(
        text_chunks(&[
            "data: {\"type\":\"start\",\"message\":\"a\"}\n",
            "data: {\"type\":\"step\",\"description\":\"b\"}",
        ]),
        &options(),
        &mut recorder,
    )
    .await;

    assert_eq!(recorder.0, vec!["progress", "progress", "complete"]);
}

#[test]
fn test_consume_from_blocking_context() {
    let mut handler = CollectingHandler::new();
    tokio_test::block_on(consume_stream(
        text_chunks(&["data: {\"type\":\"result\",\"content\":\"同步调用\"}\n"]),
        &options(),
        &mut handler,
    ));
    assert_eq!(completed(handler).response, "同步调用");
}
