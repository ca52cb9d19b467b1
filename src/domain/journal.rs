use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountPath, Cents, OrgId, SubledgerKind};

pub type JournalId = Uuid;
pub type LegId = Uuid;

/// Which side of the ledger a leg posts to. Modeled as an enum so a leg
/// can never be both debit and credit, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Debit => "debit",
            Side::Credit => "credit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(Side::Debit),
            "credit" => Some(Side::Credit),
            _ => None,
        }
    }
}

/// A customer/supplier/employee referenced by a business event. The name
/// becomes the leaf segment of the entity's subledger account path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    pub name: String,
}

impl EntityRef {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Cross-references to the business document a journal originated from.
/// One variant per event kind, so each event's fields are statically
/// known instead of living in an open key-value bag.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventMeta {
    CustomerInvoice {
        customer_id: Uuid,
        customer_name: String,
        invoice_no: String,
    },
    CustomerPayment {
        customer_id: Uuid,
        customer_name: String,
        payment_ref: Option<String>,
    },
    SupplierBill {
        supplier_id: Uuid,
        supplier_name: String,
        bill_no: String,
    },
    SupplierPayment {
        supplier_id: Uuid,
        supplier_name: String,
        payment_ref: Option<String>,
    },
    EmployeePayroll {
        employee_id: Uuid,
        employee_name: String,
        period: String,
    },
    #[default]
    ManualJournal,
}

impl EventMeta {
    pub fn kind_str(&self) -> &'static str {
        match self {
            EventMeta::CustomerInvoice { .. } => "customer_invoice",
            EventMeta::CustomerPayment { .. } => "customer_payment",
            EventMeta::SupplierBill { .. } => "supplier_bill",
            EventMeta::SupplierPayment { .. } => "supplier_payment",
            EventMeta::EmployeePayroll { .. } => "employee_payroll",
            EventMeta::ManualJournal => "manual_journal",
        }
    }

    /// The subledger entity this event concerns, if any.
    pub fn entity(&self) -> Option<(SubledgerKind, EntityRef)> {
        match self {
            EventMeta::CustomerInvoice {
                customer_id,
                customer_name,
                ..
            }
            | EventMeta::CustomerPayment {
                customer_id,
                customer_name,
                ..
            } => Some((
                SubledgerKind::Customer,
                EntityRef::new(*customer_id, customer_name.clone()),
            )),
            EventMeta::SupplierBill {
                supplier_id,
                supplier_name,
                ..
            }
            | EventMeta::SupplierPayment {
                supplier_id,
                supplier_name,
                ..
            } => Some((
                SubledgerKind::Supplier,
                EntityRef::new(*supplier_id, supplier_name.clone()),
            )),
            EventMeta::EmployeePayroll {
                employee_id,
                employee_name,
                ..
            } => Some((
                SubledgerKind::Employee,
                EntityRef::new(*employee_id, employee_name.clone()),
            )),
            EventMeta::ManualJournal => None,
        }
    }
}

/// One committed business event: the atomic unit of the ledger.
/// Immutable once written; voiding is the only permitted mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub organization_id: OrgId,
    pub datetime: DateTime<Utc>,
    pub memo: String,
    /// Human-readable unique identifier drawn from the voucher sequence.
    pub voucher_number: String,
    /// Idempotency key: retrying a commit with the same id is a no-op.
    pub commit_id: Uuid,
    pub voided: bool,
    pub meta: EventMeta,
}

/// One debit or credit row belonging to a journal. The account is
/// referenced by path, not by id, so subledger parents roll up their
/// children by prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLeg {
    pub id: LegId,
    pub journal_id: JournalId,
    pub organization_id: OrgId,
    /// Copied from the owning journal at commit time.
    pub datetime: DateTime<Utc>,
    pub account_path: AccountPath,
    pub side: Side,
    /// Always positive; the side carries the sign.
    pub amount: Cents,
}

impl TransactionLeg {
    /// Signed contribution to a raw (debit-positive) balance.
    pub fn signed_amount(&self) -> Cents {
        match self.side {
            Side::Debit => self.amount,
            Side::Credit => -self.amount,
        }
    }
}

/// A leg joined with its journal's memo and voucher number, as returned
/// by statements and transaction listings.
#[derive(Debug, Clone, Serialize)]
pub struct LegWithJournal {
    pub leg: TransactionLeg,
    pub memo: String,
    pub voucher_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        let leg = TransactionLeg {
            id: Uuid::new_v4(),
            journal_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            datetime: Utc::now(),
            account_path: AccountPath::parse("Assets:Bank").unwrap(),
            side: Side::Debit,
            amount: 1500,
        };
        assert_eq!(leg.signed_amount(), 1500);

        let leg = TransactionLeg {
            side: Side::Credit,
            ..leg
        };
        assert_eq!(leg.signed_amount(), -1500);
    }

    #[test]
    fn test_event_meta_entity() {
        let customer = Uuid::new_v4();
        let meta = EventMeta::CustomerInvoice {
            customer_id: customer,
            customer_name: "Acme Corp".into(),
            invoice_no: "INV-001".into(),
        };
        let (kind, entity) = meta.entity().unwrap();
        assert_eq!(kind, SubledgerKind::Customer);
        assert_eq!(entity.id, customer);
        assert_eq!(entity.name, "Acme Corp");

        assert!(EventMeta::ManualJournal.entity().is_none());
    }

    #[test]
    fn test_event_meta_json_round_trip() {
        let meta = EventMeta::EmployeePayroll {
            employee_id: Uuid::new_v4(),
            employee_name: "Jo Bloggs".into(),
            period: "2024-01".into(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kind\":\"employee_payroll\""));
        let back: EventMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind_str(), "employee_payroll");
    }
}
