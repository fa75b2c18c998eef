//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

use arbiter_core::Plan;
use arbiter_runtime::{BatchScheduler, ProviderRegistry, RuntimeConfig};

use crate::{ConfigArgs, EvaluateArgs};

fn load_config(args: &ConfigArgs) -> Result<RuntimeConfig> {
    match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn load_plans(path: &Path) -> Result<Vec<Plan>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plans from {}", path.display()))?;
    let plans: Vec<Plan> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of plans", path.display()))?;

    let mut seen = std::collections::BTreeSet::new();
    for plan in &plans {
        if !seen.insert(plan.plan_id.as_str()) {
            bail!("Duplicate plan_id '{}' in {}", plan.plan_id, path.display());
        }
    }
    Ok(plans)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    match output {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json).context("Failed to write to stdout")
        }
    }
}

fn scheduler(config: RuntimeConfig) -> Result<BatchScheduler> {
    let registry = ProviderRegistry::with_defaults();
    tracing::debug!(?registry, "Building scheduler");
    BatchScheduler::from_config(config, &registry).context("Failed to set up judges")
}

pub async fn evaluate(args: EvaluateArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if args.dry_run {
        config.judges.primary.provider_type = "scripted".to_string();
        config.judges.secondary.provider_type = "scripted".to_string();
    }

    let plans = load_plans(&args.plans)?;
    tracing::info!(plans = plans.len(), "Submitting batch");

    let scheduler = scheduler(config)?;
    let result = scheduler.submit_batch(plans).await;

    if args.ranked {
        write_json(&result.ranked(), args.output.as_deref())
    } else {
        write_json(&result, args.output.as_deref())
    }
}

pub async fn probe(args: ConfigArgs) -> Result<()> {
    let scheduler = scheduler(load_config(&args)?)?;
    let availability = scheduler.manager().check_availability().await;
    write_json(&availability, None)?;

    if availability.values().all(|ok| !ok) {
        bail!("No judge provider is reachable");
    }
    Ok(())
}

pub fn check_config(args: ConfigArgs) -> Result<()> {
    let config = load_config(&args)?;
    let yaml = serde_yaml::to_string(&config).context("Failed to render config")?;
    print!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir()
            .join(format!("arbiter-cli-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_plans() {
        let path = temp_file(
            "plans.json",
            r#"[{"plan_id": "p1", "plan_text": "Rotate keys", "audit_context_text": "F1"},
                {"plan_id": "p2", "plan_text": "Enable MFA"}]"#,
        );
        let plans = load_plans(&path).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].audit_context_text, "");
    }

    #[test]
    fn test_duplicate_plan_ids_rejected() {
        let path = temp_file(
            "dupes.json",
            r#"[{"plan_id": "p1", "plan_text": "a"}, {"plan_id": "p1", "plan_text": "b"}]"#,
        );
        let err = load_plans(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate plan_id"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_result() {
        let plans = temp_file("dry.json", r#"[{"plan_id": "p1", "plan_text": "Patch servers"}]"#);
        let output = std::env::temp_dir()
            .join(format!("arbiter-cli-{}-out.json", std::process::id()));

        evaluate(EvaluateArgs {
            plans,
            config: ConfigArgs { config: None },
            output: Some(output.clone()),
            dry_run: true,
            ranked: false,
        })
        .await
        .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["total_plans"], 1);
        assert_eq!(written["completed"], 1);
    }
}
