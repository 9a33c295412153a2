use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use school_match::accumulator::Accumulator;
use school_match::framer::LineFramer;
use school_match::reader::Utf8Decoder;
use school_match::{ExtractionSource, StructuredFields, extract_from_text, extract_structured};
use serde_json::json;

// Helper to build an SSE body of `tokens` token events followed by a final event
fn create_sse_body(tokens: usize) -> Vec<u8> {
    let mut body = String::new();
    body.push_str("data: {\"type\":\"start\",\"message\":\"开始匹配\"}\n\n");
    for i in 0..tokens {
        let event = json!({"type": "ai_token", "content": format!("第{}段分析，", i)});
        body.push_str(&format!("data: {}\n\n", event));
    }
    let final_event = json!({"type": "final_response", "response": create_answer(5)});
    body.push_str(&format!("data: {}\n\n", final_event));
    body.push_str("data: {\"type\":\"end\"}\n\n");
    body.into_bytes()
}

// Helper to build a fenced answer with `schools` matched schools
fn create_answer(schools: usize) -> String {
    let matched: Vec<_> = (0..schools)
        .map(|i| {
            let category = ["冲刺", "匹配", "保底"][i % 3];
            json!({
                "school_category": category,
                "qs_ranking": (i * 7 + 3).to_string(),
                "chinese_name": format!("大学{}", i),
                "english_name": format!("University {}", i),
                "recommendation_reason": "课程设置与背景高度匹配，{ 含花括号 } 的说明"
            })
        })
        .collect();
    let document = json!({
        "matched_schools": matched,
        "student_background": {"domestic_university": "同济大学", "gpa_info": "3.6/4.0"}
    });
    format!(
        "以下是匹配结果：\n```json\n{}\n```\n请结合个人情况参考。",
        serde_json::to_string_pretty(&document).unwrap()
    )
}

// Benchmark: decode, frame and accumulate a body split into fixed-size chunks
fn bench_stream_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_pipeline");
    let body = create_sse_body(500);

    for chunk_size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &body, |b, body| {
            b.iter(|| {
                let mut decoder = Utf8Decoder::new();
                let mut framer = LineFramer::new();
                let mut accumulator = Accumulator::new();
                for chunk in body.chunks(chunk_size) {
                    for line in framer.push(&decoder.decode(chunk)) {
                        accumulator.ingest_line(&line);
                    }
                }
                if let Some(line) = framer.finish() {
                    accumulator.ingest_line(&line);
                }
                black_box(accumulator.finish())
            });
        });
    }

    group.finish();
}

// Benchmark: extraction from fenced answers of growing size
fn bench_extract_fenced(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_fenced");

    for schools in [1usize, 10, 50] {
        let answer = create_answer(schools);
        group.bench_with_input(BenchmarkId::from_parameter(schools), &answer, |b, text| {
            b.iter(|| black_box(extract_from_text(text)));
        });
    }

    group.finish();
}

// Benchmark: the worst case, text that exhausts every strategy
fn bench_extract_fallthrough(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_fallthrough");

    for size in [1_000usize, 10_000] {
        let text = "{\"note\":\"无关\"} 纯文本说明 ".repeat(size / 20);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| {
                let source = ExtractionSource::from_text(text);
                black_box(extract_structured(&source, &StructuredFields::default()))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_stream_pipeline,
    bench_extract_fenced,
    bench_extract_fallthrough
);

criterion_main!(benches);
