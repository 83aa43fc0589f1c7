//! Application provisioning and status commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{
    ApiClient, AppliedResult, ApplicationStatus, Credentials, PredefinedRequest, Provisioned,
    ResourceRequest,
};
use crate::output::{
    color_replicas, color_status, format_timestamp, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct AppliedRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Pod")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Pod IP")]
    pod_ip: String,
    #[tabled(rename = "Host IP")]
    host_ip: String,
    #[tabled(rename = "Started")]
    started: String,
}

#[derive(Tabled)]
struct ApplicationRow {
    #[tabled(rename = "Deployment")]
    name: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "Pods")]
    pods: usize,
}

/// Read an application spec from `file` and submit it
pub async fn create_application(
    client: &ApiClient,
    file: &Path,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut spec: serde_json::Value =
        serde_json::from_str(&content).context("Application spec must be a JSON object")?;

    let object = spec
        .as_object_mut()
        .context("Application spec must be a JSON object")?;
    if let Some(ns) = namespace {
        object
            .entry("Namespace")
            .or_insert(serde_json::Value::String(ns));
    }

    let result: Provisioned = client.post("create_application", &spec).await?;
    print_applied(&result, format)
}

pub struct PredefinedArgs {
    pub name: String,
    pub external: bool,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub namespace: Option<String>,
}

/// Deploy the templated database application
pub async fn deploy_predefined(
    client: &ApiClient,
    args: PredefinedArgs,
    format: OutputFormat,
) -> Result<()> {
    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        (None, None) => None,
        _ => anyhow::bail!("--username and --password must be given together"),
    };

    let request = PredefinedRequest {
        app_name: args.name,
        external: args.external,
        resources: ResourceRequest {
            cpu: args.cpu,
            memory: args.memory,
        },
        credentials,
        namespace: args.namespace,
    };

    let result: Provisioned = client.post("deploy-predefined-app", &request).await?;
    print_applied(&result, format)
}

fn print_applied(result: &Provisioned, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            print_success(&result.message);
            print_applied_table(&result.data);
            Ok(())
        }
    }
}

fn print_applied_table(data: &AppliedResult) {
    println!(
        "Application: {}  Namespace: {}",
        data.application.cyan(),
        data.namespace.cyan()
    );
    let rows: Vec<AppliedRow> = data
        .resources
        .iter()
        .map(|r| AppliedRow {
            kind: r.kind.clone(),
            name: r.name.clone(),
            outcome: color_status(&r.outcome),
        })
        .collect();
    print_table(&rows);
}

/// Show the status of one application
pub async fn show_status(
    client: &ApiClient,
    app_name: &str,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let status: ApplicationStatus = client
        .get(
            "deployment_status",
            &[("app_name", Some(app_name)), ("namespace", namespace.as_deref())],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", status.deployment_name.bold());
            println!("{}", "=".repeat(50));
            println!(
                "Ready replicas:         {}",
                color_replicas(status.ready_replicas, status.replicas)
            );
            println!();

            if status.pods.is_empty() {
                print_warning("No pods match the workload selector");
                return Ok(());
            }

            let rows: Vec<PodRow> = status
                .pods
                .iter()
                .map(|p| PodRow {
                    name: p.name.clone(),
                    phase: color_status(&p.phase),
                    pod_ip: p.pod_ip.clone(),
                    host_ip: p.host_ip.clone(),
                    started: format_timestamp(&p.start_time),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// List every application in a namespace
pub async fn list_applications(
    client: &ApiClient,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let statuses: Vec<ApplicationStatus> = client
        .get("all_applications", &[("namespace", namespace.as_deref())])
        .await?;

    match format {
        OutputFormat::Json => print_json(&statuses)?,
        OutputFormat::Table => {
            let rows: Vec<ApplicationRow> = statuses
                .iter()
                .map(|s| ApplicationRow {
                    name: s.deployment_name.clone(),
                    ready: color_replicas(s.ready_replicas, s.replicas),
                    pods: s.pods.len(),
                })
                .collect();
            print_table(&rows);
            if !rows.is_empty() {
                print_info(&format!("{} application(s)", rows.len()));
            }
        }
    }

    Ok(())
}
