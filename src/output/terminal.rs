// Colored terminal output for verdicts, attempt traces, and key probes.
//
// main.rs display calls delegate here so the library stays free of printing.

use colored::Colorize;

use crate::moderation::pipeline::{ModerationOutcome, Verdict, BLOCKED_MESSAGE};
use crate::moderation::traits::ProviderOutcome;
use crate::probe::{ProbeResult, ProbeStatus};

use super::preview;

/// Print the verdict for one message, optionally with every attempt.
pub fn display_verdict(original: &str, outcome: &ModerationOutcome, trace: bool) {
    let source = outcome.source.as_deref().unwrap_or("none");
    let elapsed_ms = outcome.elapsed.as_millis();

    println!("{} {}", ">".dimmed(), preview(original, 80));
    match &outcome.verdict {
        Verdict::Safe => println!(
            "  {}  (via {source}, {elapsed_ms}ms)",
            "SAFE".green().bold()
        ),
        Verdict::Rewrite(text) => {
            println!(
                "  {}  (via {source}, {elapsed_ms}ms)",
                "REWRITE".yellow().bold()
            );
            println!("  {} {}", "=>".yellow(), text);
        }
        Verdict::Block => {
            println!(
                "  {}  (via {source}, {elapsed_ms}ms)",
                "BLOCK".red().bold()
            );
            println!("  {}", BLOCKED_MESSAGE.dimmed());
        }
        Verdict::FailOpen => println!(
            "  {}  (unverified, {elapsed_ms}ms)",
            "FAIL_OPEN".bright_magenta().bold()
        ),
    }

    if trace {
        display_attempts(outcome);
    }
}

fn display_attempts(outcome: &ModerationOutcome) {
    if outcome.attempts.is_empty() {
        println!("  {}", "no provider calls".dimmed());
        return;
    }
    for (i, attempt) in outcome.attempts.iter().enumerate() {
        let credential = attempt
            .credential
            .as_ref()
            .map(|id| format!(" key={id}"))
            .unwrap_or_default();
        let result = match &attempt.outcome {
            ProviderOutcome::Ok(_) => "ok".green(),
            ProviderOutcome::RateLimited(_) => "rate limited".yellow(),
            ProviderOutcome::Timeout => "timeout".yellow(),
            ProviderOutcome::MalformedResponse => "malformed".red(),
            ProviderOutcome::NoCredential => "no credential".yellow(),
            ProviderOutcome::OtherError(detail) => format!("error: {}", preview(detail, 60)).red(),
        };
        println!(
            "  {}. {} {}{} {}ms {}",
            i + 1,
            attempt.stage.dimmed(),
            attempt.provider,
            credential,
            attempt.elapsed.as_millis(),
            result
        );
    }
}

/// Print one line per probed key.
pub fn display_probe_results(results: &[ProbeResult]) {
    if results.is_empty() {
        println!("No keys configured, nothing to probe.");
        return;
    }

    println!("\n{}", "=== Key Status ===".bold());
    for result in results {
        let status = match &result.status {
            ProbeStatus::Working(reply) => {
                format!("{} {}", "WORKING".green().bold(), preview(reply, 30).dimmed())
            }
            ProbeStatus::RateLimited => "EXHAUSTED".yellow().bold().to_string(),
            ProbeStatus::Failed(detail) => {
                format!("{} {}", "ERROR".red().bold(), preview(detail, 80))
            }
        };
        println!(
            "  {:<8} {:<12} {:<12} {}",
            result.provider, result.credential, result.masked_secret, status
        );
    }

    let working = results
        .iter()
        .filter(|r| matches!(r.status, ProbeStatus::Working(_)))
        .count();
    println!("\n  {working}/{} keys working", results.len());
}
