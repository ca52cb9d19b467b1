mod common;

use std::collections::HashSet;

use anyhow::Result;
use common::{bootstrapped_service, entity, test_service};
use partita::domain::{AccountPath, EventMeta, SubledgerKind};
use uuid::Uuid;

fn path(s: &str) -> AccountPath {
    AccountPath::parse(s).unwrap()
}

#[tokio::test]
async fn test_sequence_starts_at_one_and_increments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Uuid::new_v4();

    assert_eq!(service.next_sequence(org, "test", "T-", 4).await?, "T-0001");
    assert_eq!(service.next_sequence(org, "test", "T-", 4).await?, "T-0002");

    // Independent sequences per name and per organization.
    assert_eq!(service.next_sequence(org, "other", "O-", 4).await?, "O-0001");
    let other_org = Uuid::new_v4();
    assert_eq!(
        service.next_sequence(other_org, "test", "T-", 4).await?,
        "T-0001"
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_sequence_draws_never_collide() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.next_sequence(org, "voucher", "JV-", 6).await
        }));
    }

    let mut drawn = HashSet::new();
    for handle in handles {
        drawn.insert(handle.await??);
    }

    assert_eq!(drawn.len(), 10);
    for n in 1..=10 {
        assert!(drawn.contains(&format!("JV-{:06}", n)));
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_commits_with_same_commit_id_write_once() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;
    let commit_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let entry = service
                .begin_entry(org, "Opening balance", EventMeta::ManualJournal)
                .debit(path("Assets:Bank"), 500000)
                .credit(path("Equity:Owner's Equity"), 500000)
                .with_commit_id(commit_id);
            service.commit(entry).await
        }));
    }

    let mut journal_ids = HashSet::new();
    for handle in handles {
        journal_ids.insert(handle.await??.id);
    }

    // Every caller saw the same journal, and the ledger holds it once.
    assert_eq!(journal_ids.len(), 1);
    assert_eq!(service.balance(org, &path("Assets:Bank")).await?, 500000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_subledger_creation_yields_one_account() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = service.clone();
        let acme = entity("Acme");
        handles.push(tokio::spawn(async move {
            service
                .resolve_or_create_subledger(org, SubledgerKind::Customer, &acme)
                .await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let account = handle.await??;
        assert_eq!(account.path.to_string(), "Assets:Accounts Receivable:Acme");
        ids.insert(account.id);
    }

    assert_eq!(ids.len(), 1);
    // Chart has its 20 defaults plus exactly one new leaf.
    assert_eq!(service.list_accounts(org, true).await?.len(), 21);

    Ok(())
}
