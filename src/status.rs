// System status display: configured providers, key counts, timing defaults.

use crate::config::Config;
use crate::moderation::credential_pool::CredentialPool;
use crate::moderation::pipeline::DecisionPipeline;

/// Display system status to the terminal.
pub fn show(config: &Config, pool: &CredentialPool, pipeline: &DecisionPipeline) {
    let stages = pipeline.stage_names();
    if stages.is_empty() {
        println!("Pipeline: no providers configured (every message fails open)");
        println!("\nSet GEMINI_KEY_1.. and/or GROQ_API_KEY in your .env file.");
    } else {
        let chain: Vec<String> = stages
            .iter()
            .map(|(stage, provider)| format!("{stage}:{provider}"))
            .chain(std::iter::once("fail-open".to_string()))
            .collect();
        println!("Pipeline: {}", chain.join(" -> "));
    }

    let status = pool.status();
    println!(
        "Gemini keys: {} configured, {} usable ({} cooling down, {} exhausted), quota {}/day",
        status.total,
        status.usable,
        status.cooling_down,
        status.exhausted,
        pool.daily_quota()
    );
    println!("  Model: {} at {}", config.gemini_model, config.gemini_api_url);

    match config.groq_api_key {
        Some(_) => println!(
            "Groq fallback: configured ({} at {})",
            config.groq_model, config.groq_api_url
        ),
        None => println!("Groq fallback: not configured"),
    }

    println!(
        "Timing: {} attempts x {}ms, secondary ceiling {}ms, total budget {}ms",
        config.max_attempts,
        config.attempt_timeout.as_millis(),
        config.secondary_ceiling.as_millis(),
        config.budget.as_millis()
    );
}
