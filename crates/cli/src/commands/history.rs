//! Health history commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, HealthRecord, HistoryResponse};
use crate::output::{
    format_optional_timestamp, format_timestamp, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Target")]
    app_name: String,
    #[tabled(rename = "Success")]
    success: i32,
    #[tabled(rename = "Failure")]
    failure: i32,
    #[tabled(rename = "Last Success")]
    last_success: String,
    #[tabled(rename = "Last Failure")]
    last_failure: String,
    #[tabled(rename = "Since")]
    created_at: String,
}

impl From<&HealthRecord> for HistoryRow {
    fn from(record: &HealthRecord) -> Self {
        Self {
            app_name: record.app_name.clone(),
            success: record.success_count,
            failure: record.failure_count,
            last_success: format_optional_timestamp(record.last_success.as_deref()),
            last_failure: format_optional_timestamp(record.last_failure.as_deref()),
            created_at: format_timestamp(&record.created_at),
        }
    }
}

/// Show probe history, for one target or all of them
pub async fn show_history(
    client: &ApiClient,
    name: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let records: Vec<HealthRecord> = match &name {
        Some(name) => {
            let response: HistoryResponse = client.get(&format!("health/{}", name), &[]).await?;
            response.result
        }
        None => client.get("health", &[]).await?,
    };

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            let rows: Vec<HistoryRow> = records.iter().map(HistoryRow::from).collect();
            print_table(&rows);
        }
    }

    Ok(())
}
