use anyhow::Result;
use tracing::info;

use crate::cli::AskArgs;
use crate::config::AppConfig;
use crate::model::AskResponse;
use crate::rag::AskOutcome;

pub async fn run(config: &AppConfig, args: AskArgs) -> Result<()> {
    let pipeline = super::build_pipeline(config)?;
    info!(
        backend = config.index.backend.as_str(),
        index = %config.index.name,
        expansion_count = pipeline.settings().expansion_count,
        top_n = pipeline.settings().fusion.top_n,
        "ask requested"
    );

    let outcome = pipeline.ask(&args.query).await?;
    println!("{}", render_outcome(&outcome, args.json, args.explain)?);
    Ok(())
}

fn render_outcome(outcome: &AskOutcome, json: bool, explain: bool) -> Result<String> {
    if json {
        let rendered = if explain {
            serde_json::to_string_pretty(outcome)?
        } else {
            serde_json::to_string(&AskResponse {
                answer: outcome.answer.clone(),
            })?
        };
        return Ok(rendered);
    }

    if !explain {
        return Ok(outcome.answer.clone());
    }

    let mut lines = vec![outcome.answer.clone(), String::new(), "queries:".to_string()];
    for query in &outcome.queries {
        let marker = if outcome.skipped_queries.contains(query) {
            " (skipped)"
        } else {
            ""
        };
        lines.push(format!("  - {query:?}{marker}"));
    }
    lines.push("sources:".to_string());
    for (rank, source) in outcome.sources.iter().enumerate() {
        let id = source.document.id.as_deref().unwrap_or("-");
        lines.push(format!(
            "  {}. [{:.4}] {id}: {}",
            rank + 1,
            source.rrf_score,
            first_line(&source.document.content)
        ));
    }
    Ok(lines.join("\n"))
}

fn first_line(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}
