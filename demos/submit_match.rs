//! Submit a match request
//!
//! Posts a student profile to the match service and prints progress as it
//! streams in, followed by the matched schools.
//!
//! Point it at a backend with `SCHOOL_MATCH_BASE_URL` (default
//! `http://localhost:3000`).

use futures::StreamExt;
use school_match::{
    FormData, MatchClient, MatchOptions, MatchRequest, MatchUpdate, PromptData, get_base_url,
    get_inactivity_timeout,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = MatchOptions::builder()
        .base_url(get_base_url(None))
        .inactivity_timeout(get_inactivity_timeout(Duration::from_secs(60)))
        .build()?;
    let client = MatchClient::new(options)?;

    let request = MatchRequest::new(
        FormData {
            student_school: "北京邮电大学".into(),
            grade_system: "百分制".into(),
            grade: "85".into(),
            is_current_student: true,
            target_school: "英国G5".into(),
            major: "计算机科学".into(),
            language_test_type: "IELTS".into(),
            language_test_score: "7.0".into(),
            ..Default::default()
        },
        PromptData::default(),
    );

    println!("Submitting to {}...\n", client.options().match_url());

    let mut updates = client.updates(request);
    while let Some(update) = updates.next().await {
        match update {
            MatchUpdate::Progress(message) => println!("  … {}", message),
            MatchUpdate::Complete { result, .. } => {
                println!("\n{}\n", result.response);
                for school in result.matched_schools.unwrap_or_default() {
                    println!(
                        "[{}] {} / {} (QS {})",
                        school.school_category,
                        school.chinese_name,
                        school.english_name,
                        school.qs_ranking
                    );
                }
                if let Some(background) = result.student_background {
                    println!(
                        "\nBackground: {} ({}), GPA {}",
                        background.domestic_university,
                        background.university_level,
                        background.gpa_info
                    );
                }
            }
            MatchUpdate::Failed(message) => anyhow::bail!("match failed: {}", message),
        }
    }

    Ok(())
}
