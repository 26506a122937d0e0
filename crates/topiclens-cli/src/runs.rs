//! `runs` command handlers.

use chrono::{DateTime, Utc};
use topiclens_core::AppConfig;

fn fmt_time(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Print the most recent pipeline runs, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn list_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = topiclens_db::list_pipeline_runs(pool, limit).await?;

    if runs.is_empty() {
        println!("no pipeline runs found; start one with `run --mode all`");
        return Ok(());
    }

    println!(
        "{:<8}{:<12}{:<11}{:<18}{:<18}ERROR",
        "ID", "MODE", "STATUS", "STARTED", "COMPLETED"
    );
    for run in &runs {
        let error = run.error_message.as_deref().unwrap_or("");
        let error_display = if error.chars().count() > 60 {
            format!("{}...", error.chars().take(60).collect::<String>())
        } else {
            error.to_string()
        };
        println!(
            "{:<8}{:<12}{:<11}{:<18}{:<18}{}",
            run.id,
            run.run_type,
            run.status,
            fmt_time(Some(run.started_at)),
            fmt_time(run.completed_at),
            error_display
        );
    }

    Ok(())
}

/// Mark `running` runs with no heartbeat inside the configured window as
/// failed.
///
/// # Errors
///
/// Returns an error if the update fails.
pub(crate) async fn reap_runs(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let max_age = i64::try_from(config.stale_run_max_age_secs).unwrap_or(i64::MAX);
    let reaped = topiclens_db::reap_stale_pipeline_runs(pool, max_age).await?;

    if reaped.is_empty() {
        println!("no stale runs");
    } else {
        let ids: Vec<String> = reaped.iter().map(ToString::to_string).collect();
        println!("marked {} stale runs as failed: {}", reaped.len(), ids.join(", "));
    }
    Ok(())
}
