//! Replay a captured event stream
//!
//! Feeds a saved SSE body through the same consumption pipeline a live
//! response goes through, in small chunks, and prints what a caller would see.
//!
//! ```text
//! cargo run --example stream_replay -- capture.sse [chunk-size]
//! ```
//!
//! Without arguments a built-in capture is replayed.

use anyhow::Context;
use bytes::Bytes;
use futures::stream;
use school_match::{Callbacks, MatchOptions, consume_stream};

const BUILT_IN_CAPTURE: &str = concat!(
    "data: {\"type\":\"start\",\"message\":\"开始分析学生背景\"}\n\n",
    "data: {\"type\":\"step\",\"description\":\"解析成绩与语言水平\",\"status\":\"running\"}\n\n",
    ": keep-alive\n\n",
    "data: {\"type\":\"tool_start\",\"message\":\"查询院校数据库\"}\n\n",
    "data: {\"type\":\"tool_end\",\"message\":\"共检索到 42 个项目\"}\n\n",
    "data: {\"type\":\"ai_token\",\"content\":\"综合您的背景，\"}\n\n",
    "data: {\"type\":\"ai_token\",\"content\":\"推荐如下：\\n\"}\n\n",
    "data: {\"type\":\"final_response\",\"response\":\"```json\\n{\\\"matched_schools\\\":[{\\\"school_category\\\":\\\"冲刺\\\",\\\"qs_ranking\\\":\\\"9\\\",\\\"chinese_name\\\":\\\"伦敦大学学院\\\",\\\"english_name\\\":\\\"UCL\\\"},{\\\"school_category\\\":\\\"匹配\\\",\\\"qs_ranking\\\":\\\"40\\\",\\\"chinese_name\\\":\\\"伦敦国王学院\\\",\\\"english_name\\\":\\\"KCL\\\"}]}\\n```\"}\n\n",
    "data: {\"type\":\"end\"}\n\n",
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let capture = match args.next() {
        Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path))?,
        None => BUILT_IN_CAPTURE.as_bytes().to_vec(),
    };
    let chunk_size = match args.next() {
        Some(raw) => raw.parse::<usize>().context("chunk size must be a number")?,
        None => 7,
    };
    anyhow::ensure!(chunk_size > 0, "chunk size must be positive");

    let chunks: Vec<Result<Bytes, std::io::Error>> = capture
        .chunks(chunk_size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    println!("Replaying {} bytes in {} chunks\n", capture.len(), chunks.len());

    let options = MatchOptions::builder()
        .base_url("http://replay.invalid")
        .build()?;

    let mut callbacks = Callbacks::new()
        .with_progress(|message| println!("progress: {}", message))
        .with_complete(|result, raw_text| {
            println!("\nanswer: {}", result.response);
            println!("raw text: {} chars", raw_text.map(|t| t.chars().count()).unwrap_or(0));
            println!("steps: {}", result.steps.map(|s| s.len()).unwrap_or(0));
            match result.matched_schools {
                Some(schools) => {
                    for school in schools {
                        println!("  {:?}: {} ({:?})", school.tier(), school.chinese_name, school.ranking());
                    }
                }
                None => println!("  no matched schools recovered"),
            }
        })
        .with_error(|message| eprintln!("error: {}", message));

    consume_stream(stream::iter(chunks), &options, &mut callbacks).await;
    Ok(())
}
