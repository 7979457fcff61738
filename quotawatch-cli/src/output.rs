//! Output rendering shared by the commands.

use chrono::Utc;
use quotawatch_core::{DerivedMetrics, Exhaustion, QuotaPlan, UsageSnapshot, WarningLevel};

/// Renders a snapshot plus its derived metrics as human-readable text.
pub fn render_summary(snapshot: &UsageSnapshot, plan: &QuotaPlan, metrics: &DerivedMetrics) -> String {
    let usage = &snapshot.current_usage;
    let mut out = String::new();

    out.push_str(&format!(
        "Plan:      {} ({} tokens / ${:.2} / {} messages)\n",
        plan.name, plan.token_limit, plan.cost_limit, plan.message_limit
    ));
    out.push_str(&format!(
        "Tokens:    {} / {}  ({:.1}%)\n",
        usage.total_tokens, plan.token_limit, metrics.tokens_percent
    ));
    out.push_str(&format!(
        "Cost:      ${:.2} / ${:.2}  ({:.1}%)\n",
        usage.total_cost, plan.cost_limit, metrics.cost_percent
    ));
    out.push_str(&format!(
        "Messages:  {} / {}  ({:.1}%)\n",
        usage.total_messages, plan.message_limit, metrics.messages_percent
    ));
    out.push_str(&format!(
        "Burn rate: {:.1} tokens/min\n",
        snapshot.burn_rate.tokens_per_minute
    ));

    match metrics.projected_exhaustion {
        Exhaustion::At(at) => {
            let minutes = (at - Utc::now()).num_minutes().max(0);
            out.push_str(&format!(
                "Exhausted: in {minutes} min ({})\n",
                at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        Exhaustion::Unavailable => out.push_str("Exhausted: not projected (idle)\n"),
    }
    out.push_str(&format!(
        "Resets:    {}\n",
        metrics.window_reset.format("%Y-%m-%d %H:%M UTC")
    ));

    if !snapshot.model_distribution.is_empty() {
        out.push_str("Models:\n");
        let mut models: Vec<_> = snapshot.model_distribution.iter().collect();
        models.sort_by(|a, b| b.1.tokens.cmp(&a.1.tokens));
        for (name, usage) in models {
            out.push_str(&format!(
                "  {name:<24} {:>10} tokens  ({:.1}%)\n",
                usage.tokens, usage.percentage
            ));
        }
    }

    for warning in &snapshot.warnings {
        let tag = match warning.level {
            WarningLevel::Warning => "warning",
            WarningLevel::Danger => "DANGER",
        };
        out.push_str(&format!("[{tag}] {}\n", warning.message));
    }

    out
}

/// Renders the same data as a JSON document for scripting.
///
/// # Errors
///
/// Fails when the payload cannot be serialized.
pub fn render_summary_json(
    snapshot: &UsageSnapshot,
    plan: &QuotaPlan,
    metrics: &DerivedMetrics,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&serde_json::json!({
        "plan": plan,
        "snapshot": snapshot,
        "metrics": metrics,
    }))
}

/// One-line rendering for watch mode.
pub fn render_update_line(snapshot: &UsageSnapshot, metrics: &DerivedMetrics, stale: bool) -> String {
    let usage = &snapshot.current_usage;
    let exhaustion = match metrics.projected_exhaustion {
        Exhaustion::At(at) => {
            let minutes = (at - Utc::now()).num_minutes().max(0);
            format!("exhausted in {minutes} min")
        }
        Exhaustion::Unavailable => "idle".to_string(),
    };
    let flag = if stale { "  [stale]" } else { "" };

    format!(
        "{}  tokens {} ({:.1}%)  cost ${:.2}  rate {:.1}/min  {}{}",
        Utc::now().format("%H:%M:%S"),
        usage.total_tokens,
        metrics.tokens_percent,
        usage.total_cost,
        snapshot.burn_rate.tokens_per_minute,
        exhaustion,
        flag
    )
}

// ============================================================================
// Tests
// ============================================================================
