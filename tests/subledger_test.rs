mod common;

use anyhow::Result;
use common::{bootstrapped_service, entity, parse_date};
use partita::application::{BusinessEvent, LedgerError, TransactionFilter};
use partita::domain::{AccountPath, SubledgerKind};

fn path(s: &str) -> AccountPath {
    AccountPath::parse(s).unwrap()
}

#[tokio::test]
async fn test_first_subledger_child_gets_parent_code_suffix() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    let account = service
        .resolve_or_create_subledger(org, SubledgerKind::Customer, &entity("Acme"))
        .await?;

    assert_eq!(account.code, "130001");
    assert_eq!(account.parent_code.as_deref(), Some("1300"));
    assert_eq!(account.path.to_string(), "Assets:Accounts Receivable:Acme");
    assert!(account.is_subledger);
    assert_eq!(account.subledger_kind, Some(SubledgerKind::Customer));

    Ok(())
}

#[tokio::test]
async fn test_subsequent_children_increment_max_code() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    let first = service
        .resolve_or_create_subledger(org, SubledgerKind::Customer, &entity("Acme"))
        .await?;
    let second = service
        .resolve_or_create_subledger(org, SubledgerKind::Customer, &entity("Globex"))
        .await?;

    assert_eq!(first.code, "130001");
    assert_eq!(second.code, "130002");

    Ok(())
}

#[tokio::test]
async fn test_resolve_is_idempotent() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    let first = service
        .resolve_or_create_subledger(org, SubledgerKind::Supplier, &entity("Globex"))
        .await?;
    let again = service
        .resolve_or_create_subledger(org, SubledgerKind::Supplier, &entity("Globex"))
        .await?;

    assert_eq!(first.id, again.id);
    assert_eq!(first.code, again.code);

    Ok(())
}

#[tokio::test]
async fn test_first_invoice_auto_creates_subledger_account() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    service
        .record_event(
            org,
            parse_date("2024-01-05"),
            BusinessEvent::CustomerInvoice {
                customer: entity("Acme"),
                invoice_no: "INV-001".into(),
                net: 100000,
                tax: 0,
            },
        )
        .await?;

    let account = service
        .find_account(org, &path("Assets:Accounts Receivable:Acme"))
        .await?;
    assert_eq!(account.code, "130001");
    assert!(account.is_subledger);

    Ok(())
}

#[tokio::test]
async fn test_parent_balance_is_sum_of_children() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    for (name, net) in [("Acme", 110000), ("Globex", 40000), ("Initech", 25000)] {
        service
            .record_event(
                org,
                parse_date("2024-01-10"),
                BusinessEvent::CustomerInvoice {
                    customer: entity(name),
                    invoice_no: format!("INV-{}", name),
                    net,
                    tax: 0,
                },
            )
            .await?;
    }

    let parent = path("Assets:Accounts Receivable");
    let mut children_sum = 0;
    for name in ["Acme", "Globex", "Initech"] {
        children_sum += service
            .balance(org, &parent.child(name).unwrap())
            .await?;
    }

    assert_eq!(service.balance(org, &parent).await?, children_sum);
    assert_eq!(service.balance(org, &parent).await?, 175000);

    Ok(())
}

#[tokio::test]
async fn test_entity_name_with_separator_is_sanitized() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    let account = service
        .resolve_or_create_subledger(org, SubledgerKind::Customer, &entity("Odd:Name Ltd"))
        .await?;

    // The colon cannot survive into the path, or prefix matching would
    // see a phantom hierarchy level.
    assert_eq!(account.path.depth(), 3);
    assert_eq!(account.path.leaf(), "Odd Name Ltd");

    Ok(())
}

#[tokio::test]
async fn test_statement_lists_newest_first_with_memos() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;
    let acme = entity("Acme");

    service
        .record_event(
            org,
            parse_date("2024-01-05"),
            BusinessEvent::CustomerInvoice {
                customer: acme.clone(),
                invoice_no: "INV-001".into(),
                net: 100000,
                tax: 0,
            },
        )
        .await?;
    service
        .record_event(
            org,
            parse_date("2024-02-10"),
            BusinessEvent::CustomerPayment {
                customer: acme.clone(),
                amount: 30000,
                payment_ref: Some("PAY-1".into()),
            },
        )
        .await?;

    let statement = service
        .statement(
            org,
            SubledgerKind::Customer,
            &acme,
            &TransactionFilter::default(),
        )
        .await?;

    assert_eq!(statement.balance, 70000);
    assert_eq!(statement.transactions.len(), 2);
    // Reverse chronological: the payment first.
    assert_eq!(statement.transactions[0].memo, "Payment received from Acme");
    assert_eq!(statement.transactions[1].memo, "Invoice INV-001 for Acme");
    assert!(!statement.transactions[0].voucher_number.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_statement_date_filter_and_limit() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;
    let acme = entity("Acme");

    for (date, no) in [("2024-01-05", "1"), ("2024-02-05", "2"), ("2024-03-05", "3")] {
        service
            .record_event(
                org,
                parse_date(date),
                BusinessEvent::CustomerInvoice {
                    customer: acme.clone(),
                    invoice_no: format!("INV-{}", no),
                    net: 10000,
                    tax: 0,
                },
            )
            .await?;
    }

    let filter = TransactionFilter {
        from_date: Some(parse_date("2024-02-01")),
        to_date: None,
        limit: Some(1),
        offset: None,
    };
    let statement = service
        .statement(org, SubledgerKind::Customer, &acme, &filter)
        .await?;

    // Balance is unfiltered; the transaction list honors the filter.
    assert_eq!(statement.balance, 30000);
    assert_eq!(statement.transactions.len(), 1);
    assert_eq!(statement.transactions[0].memo, "Invoice INV-3 for Acme");

    Ok(())
}

#[tokio::test]
async fn test_statement_offset_without_limit_skips_rows() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;
    let acme = entity("Acme");

    for (date, no) in [("2024-01-05", "1"), ("2024-02-05", "2"), ("2024-03-05", "3")] {
        service
            .record_event(
                org,
                parse_date(date),
                BusinessEvent::CustomerInvoice {
                    customer: acme.clone(),
                    invoice_no: format!("INV-{}", no),
                    net: 10000,
                    tax: 0,
                },
            )
            .await?;
    }

    let filter = TransactionFilter {
        offset: Some(1),
        ..Default::default()
    };
    let statement = service
        .statement(org, SubledgerKind::Customer, &acme, &filter)
        .await?;

    // Skips the newest leg even with no limit set.
    assert_eq!(statement.transactions.len(), 2);
    assert_eq!(statement.transactions[0].memo, "Invoice INV-2 for Acme");
    assert_eq!(statement.transactions[1].memo, "Invoice INV-1 for Acme");

    Ok(())
}

#[tokio::test]
async fn test_statement_for_unknown_entity_fails() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    let result = service
        .statement(
            org,
            SubledgerKind::Customer,
            &entity("Nonexistent"),
            &TransactionFilter::default(),
        )
        .await;

    assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;

    assert_eq!(service.bootstrap_chart(org).await?, 0);
    let accounts = service.list_accounts(org, true).await?;
    assert_eq!(accounts.len(), 20);

    Ok(())
}

#[tokio::test]
async fn test_organizations_are_isolated() -> Result<()> {
    let (service, org_a, _temp) = bootstrapped_service().await?;
    let org_b = uuid::Uuid::new_v4();
    service.bootstrap_chart(org_b).await?;

    service
        .record_event(
            org_a,
            parse_date("2024-01-10"),
            BusinessEvent::CustomerInvoice {
                customer: entity("Acme"),
                invoice_no: "INV-001".into(),
                net: 50000,
                tax: 0,
            },
        )
        .await?;

    let parent = path("Assets:Accounts Receivable");
    assert_eq!(service.balance(org_a, &parent).await?, 50000);
    assert_eq!(service.balance(org_b, &parent).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_deactivated_account_rejects_postings() -> Result<()> {
    let (service, org, _temp) = bootstrapped_service().await?;
    let rent = path("Expenses:Rent Expense");

    service.deactivate_account(org, &rent).await?;

    let entry = service
        .begin_entry(org, "Rent", partita::domain::EventMeta::ManualJournal)
        .debit(rent, 10000)
        .credit(path("Assets:Bank"), 10000);

    assert!(matches!(
        service.commit(entry).await,
        Err(LedgerError::AccountInactive(_))
    ));
    Ok(())
}
