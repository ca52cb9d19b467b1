// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use partita::application::AccountingService;
use partita::domain::{EntityRef, OrgId};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(AccountingService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = AccountingService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service with the default chart bootstrapped
/// for a fresh organization
pub async fn bootstrapped_service() -> Result<(AccountingService, OrgId, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    let org = Uuid::new_v4();
    service.bootstrap_chart(org).await?;
    Ok((service, org, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Helper to build an entity reference with a deterministic id per name
pub fn entity(name: &str) -> EntityRef {
    EntityRef::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()), name)
}
