//! Extract structured fields from answer text
//!
//! Reads an answer from a file (or stdin) and reports which strategies
//! recovered which fields.
//!
//! ```text
//! cargo run --example extract_text -- answer.txt
//! echo '{"matched_schools":[]}' | cargo run --example extract_text
//! ```

use anyhow::Context;
use school_match::{ExtractionSource, StructuredFields, extract_structured};
use std::io::Read;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            text
        }
    };

    let extraction = extract_structured(&ExtractionSource::from_text(&text), &StructuredFields::default());

    if extraction.strategies.is_empty() {
        println!("Nothing recovered from {} chars of text.", text.chars().count());
        return Ok(());
    }

    let strategies: Vec<&str> = extraction.strategies.iter().map(|s| s.name()).collect();
    println!("Recovered by: {}", strategies.join(", "));
    println!("Still missing: {:?}", extraction.fields.missing());

    let fields = extraction.fields;
    if let Some(schools) = fields.matched_schools {
        println!("\nmatched_schools ({}):", schools.len());
        for school in schools {
            println!("  - {} / {}", school.chinese_name, school.english_name);
        }
    }
    if let Some(background) = fields.student_background {
        println!("\nstudent_background:\n{}", serde_json::to_string_pretty(&background)?);
    }
    if let Some(projects) = fields.recommended_projects {
        println!("\nrecommended_projects ({}):", projects.len());
        for project in projects {
            println!("  - {} {} ({})", project.school_name, project.project_name, project.duration);
        }
    }

    Ok(())
}
