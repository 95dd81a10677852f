// Small maintenance utility: run a full deviation recompute for one project or every project.
//
// Usage:
//   cargo run --bin manual_recalc -- [db_path] [project_id]
//
// Runs schema setup and the legacy settings migration first, then recomputes synchronously
// (no queue).

use anyhow::{anyhow, Context};
use cabinet_risk_engine::config::{migrate_legacy_global_settings, ConfigManager};
use cabinet_risk_engine::db::{ensure_schema, open_sqlite_connection};
use cabinet_risk_engine::engine::{
    LayeredRiskSettingsResolver, RecalcTrigger, RiskOrchestrator, RiskRepositories,
};
use cabinet_risk_engine::i18n::t_with_args;
use cabinet_risk_engine::logging;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .unwrap_or_else(|| "cabinet_shop.db".to_string());
    let project_id = args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("failed to open database {}", db_path))?;
    ensure_schema(&conn).context("failed to ensure schema")?;
    let migrated = migrate_legacy_global_settings(&conn).context("legacy settings migration")?;
    if migrated > 0 {
        println!("migrated {} legacy settings key(s) into global scope", migrated);
    }
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone()).map_err(|e| anyhow!(e))?;
    let resolver = Arc::new(LayeredRiskSettingsResolver::new(Arc::new(config)));
    let orchestrator = RiskOrchestrator::new(RiskRepositories::from_connection(conn), resolver);

    let report = orchestrator
        .execute(&RecalcTrigger::Manual { project_id })
        .await?;

    for project in &report.projects {
        println!(
            "{}",
            t_with_args(
                "recalc.summary",
                &[
                    ("project", project.project_id.as_str()),
                    ("failed", project.failures.len().to_string().as_str()),
                ],
            )
        );
        for (stage, error) in &project.failures {
            println!("  {}: {}", stage.as_str(), error);
        }
    }
    println!(
        "projects={} failures={}",
        report.projects.len(),
        report.failure_count()
    );

    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{} stage(s) failed", report.failure_count()))
    }
}
