use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = Uuid;
pub type OrgId = Uuid;

/// Separator between path segments in the rendered form.
pub const PATH_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asset" => Some(AccountType::Asset),
            "liability" => Some(AccountType::Liability),
            "equity" => Some(AccountType::Equity),
            "revenue" => Some(AccountType::Revenue),
            "expense" => Some(AccountType::Expense),
            _ => None,
        }
    }

    /// Root of the numeric code range for this type: 1000s are assets,
    /// 2000s liabilities, 3000s equity, 4000s revenue, 5000s expenses.
    pub fn code_range_base(&self) -> u32 {
        match self {
            AccountType::Asset => 1000,
            AccountType::Liability => 2000,
            AccountType::Equity => 3000,
            AccountType::Revenue => 4000,
            AccountType::Expense => 5000,
        }
    }

    /// Which side a healthy account of this type carries its balance on.
    pub fn normal_side(&self) -> NormalSide {
        match self {
            AccountType::Asset | AccountType::Expense => NormalSide::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalSide::Credit
            }
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The side on which an account type normally carries its balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalSide {
    Debit,
    Credit,
}

/// Closed set of subtypes, scoped per account type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSubtype {
    // Asset
    CurrentAsset,
    FixedAsset,
    // Liability
    CurrentLiability,
    LongTermLiability,
    // Equity
    OwnersEquity,
    RetainedEarnings,
    // Revenue
    OperatingRevenue,
    OtherIncome,
    // Expense
    CostOfSales,
    OperatingExpense,
    Payroll,
}

impl AccountSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountSubtype::CurrentAsset => "current_asset",
            AccountSubtype::FixedAsset => "fixed_asset",
            AccountSubtype::CurrentLiability => "current_liability",
            AccountSubtype::LongTermLiability => "long_term_liability",
            AccountSubtype::OwnersEquity => "owners_equity",
            AccountSubtype::RetainedEarnings => "retained_earnings",
            AccountSubtype::OperatingRevenue => "operating_revenue",
            AccountSubtype::OtherIncome => "other_income",
            AccountSubtype::CostOfSales => "cost_of_sales",
            AccountSubtype::OperatingExpense => "operating_expense",
            AccountSubtype::Payroll => "payroll",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "current_asset" => Some(AccountSubtype::CurrentAsset),
            "fixed_asset" => Some(AccountSubtype::FixedAsset),
            "current_liability" => Some(AccountSubtype::CurrentLiability),
            "long_term_liability" => Some(AccountSubtype::LongTermLiability),
            "owners_equity" => Some(AccountSubtype::OwnersEquity),
            "retained_earnings" => Some(AccountSubtype::RetainedEarnings),
            "operating_revenue" => Some(AccountSubtype::OperatingRevenue),
            "other_income" => Some(AccountSubtype::OtherIncome),
            "cost_of_sales" => Some(AccountSubtype::CostOfSales),
            "operating_expense" => Some(AccountSubtype::OperatingExpense),
            "payroll" => Some(AccountSubtype::Payroll),
            _ => None,
        }
    }

    /// The account type this subtype belongs to.
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountSubtype::CurrentAsset | AccountSubtype::FixedAsset => AccountType::Asset,
            AccountSubtype::CurrentLiability | AccountSubtype::LongTermLiability => {
                AccountType::Liability
            }
            AccountSubtype::OwnersEquity | AccountSubtype::RetainedEarnings => AccountType::Equity,
            AccountSubtype::OperatingRevenue | AccountSubtype::OtherIncome => AccountType::Revenue,
            AccountSubtype::CostOfSales
            | AccountSubtype::OperatingExpense
            | AccountSubtype::Payroll => AccountType::Expense,
        }
    }
}

/// Kind of entity a subledger leaf account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubledgerKind {
    Customer,
    Supplier,
    Employee,
}

impl SubledgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubledgerKind::Customer => "customer",
            SubledgerKind::Supplier => "supplier",
            SubledgerKind::Employee => "employee",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(SubledgerKind::Customer),
            "supplier" => Some(SubledgerKind::Supplier),
            "employee" => Some(SubledgerKind::Employee),
            _ => None,
        }
    }
}

/// A validated hierarchical account path: a non-empty ordered list of
/// segments, rendered colon-delimited ("Assets:Bank"). Segments can never
/// contain the separator, so prefix matching needs no escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountPath {
    segments: Vec<String>,
}

impl AccountPath {
    pub fn new(segments: Vec<String>) -> Result<Self, AccountPathError> {
        if segments.is_empty() {
            return Err(AccountPathError::Empty);
        }
        for segment in &segments {
            if segment.trim().is_empty() {
                return Err(AccountPathError::EmptySegment);
            }
            if segment.contains(PATH_SEPARATOR) {
                return Err(AccountPathError::SeparatorInSegment(segment.clone()));
            }
        }
        Ok(Self { segments })
    }

    /// Parse a colon-delimited path string.
    pub fn parse(path: &str) -> Result<Self, AccountPathError> {
        Self::new(
            path.split(PATH_SEPARATOR)
                .map(|s| s.trim().to_string())
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment: the account's own display name.
    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Append a child segment, producing the child's path.
    pub fn child(&self, name: &str) -> Result<Self, AccountPathError> {
        let mut segments = self.segments.clone();
        segments.push(sanitize_segment(name));
        Self::new(segments)
    }

    /// True if `self` is strictly below `parent` in the hierarchy.
    pub fn is_descendant_of(&self, parent: &AccountPath) -> bool {
        self.segments.len() > parent.segments.len()
            && self.segments[..parent.segments.len()] == parent.segments[..]
    }

    /// SQL LIKE pattern matching every descendant of this path.
    pub fn descendants_pattern(&self) -> String {
        format!("{}{}%", self, PATH_SEPARATOR)
    }
}

impl std::fmt::Display for AccountPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join(&PATH_SEPARATOR.to_string()))
    }
}

impl std::str::FromStr for AccountPath {
    type Err = AccountPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AccountPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Entity names come from user input; strip separators and surrounding
/// whitespace so they are always valid path segments.
pub fn sanitize_segment(name: &str) -> String {
    name.replace(PATH_SEPARATOR, " ").trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountPathError {
    Empty,
    EmptySegment,
    SeparatorInSegment(String),
}

impl std::fmt::Display for AccountPathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountPathError::Empty => write!(f, "account path cannot be empty"),
            AccountPathError::EmptySegment => write!(f, "account path has an empty segment"),
            AccountPathError::SeparatorInSegment(s) => {
                write!(f, "account path segment contains separator: {}", s)
            }
        }
    }
}

impl std::error::Error for AccountPathError {}

/// One entry in the chart of accounts. Accounts are never deleted, only
/// deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub organization_id: OrgId,
    /// Numeric-string code, unique per organization, allocated within the
    /// parent's code range.
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub subtype: AccountSubtype,
    pub parent_code: Option<String>,
    pub path: AccountPath,
    pub is_subledger: bool,
    pub subledger_kind: Option<SubledgerKind>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        organization_id: OrgId,
        code: String,
        name: String,
        subtype: AccountSubtype,
        parent_code: Option<String>,
        path: AccountPath,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            code,
            account_type: subtype.account_type(),
            name,
            subtype,
            parent_code,
            path,
            is_subledger: false,
            subledger_kind: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn as_subledger(mut self, kind: SubledgerKind) -> Self {
        self.is_subledger = true;
        self.subledger_kind = Some(kind);
        self
    }
}

/// Allocate the next code under a parent: one past the highest existing
/// child code, or the parent's code with an "01" suffix for the first
/// child. Non-numeric child codes are ignored.
pub fn next_child_code(parent_code: &str, child_codes: &[String]) -> String {
    let max_child = child_codes
        .iter()
        .filter_map(|c| c.parse::<u64>().ok())
        .max();
    match max_child {
        Some(max) => (max + 1).to_string(),
        None => format!("{}01", parent_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parse_and_display() {
        let path = AccountPath::parse("Assets:Current Assets:Bank").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.leaf(), "Bank");
        assert_eq!(path.to_string(), "Assets:Current Assets:Bank");
    }

    #[test]
    fn test_path_rejects_empty_segments() {
        assert!(AccountPath::parse("").is_err());
        assert!(AccountPath::parse("Assets::Bank").is_err());
        assert!(AccountPath::parse("Assets: ").is_err());
    }

    #[test]
    fn test_path_hierarchy() {
        let parent = AccountPath::parse("Assets:Accounts Receivable").unwrap();
        let child = parent.child("Acme Corp").unwrap();
        assert!(child.is_descendant_of(&parent));
        assert!(!parent.is_descendant_of(&child));
        assert!(!parent.is_descendant_of(&parent));
        assert_eq!(child.to_string(), "Assets:Accounts Receivable:Acme Corp");
    }

    #[test]
    fn test_sanitize_segment_strips_separator() {
        assert_eq!(sanitize_segment("Acme: Corp "), "Acme  Corp");
        let parent = AccountPath::parse("Assets:AR").unwrap();
        assert!(parent.child("Evil:Name").is_ok());
    }

    #[test]
    fn test_code_ranges() {
        assert_eq!(AccountType::Asset.code_range_base(), 1000);
        assert_eq!(AccountType::Expense.code_range_base(), 5000);
    }

    #[test]
    fn test_normal_sides() {
        assert_eq!(AccountType::Asset.normal_side(), NormalSide::Debit);
        assert_eq!(AccountType::Expense.normal_side(), NormalSide::Debit);
        assert_eq!(AccountType::Liability.normal_side(), NormalSide::Credit);
        assert_eq!(AccountType::Equity.normal_side(), NormalSide::Credit);
        assert_eq!(AccountType::Revenue.normal_side(), NormalSide::Credit);
    }

    #[test]
    fn test_next_child_code_first_child() {
        assert_eq!(next_child_code("1300", &[]), "130001");
    }

    #[test]
    fn test_next_child_code_increments_max() {
        let children = vec!["130001".to_string(), "130003".to_string()];
        assert_eq!(next_child_code("1300", &children), "130004");
    }

    #[test]
    fn test_subtype_maps_to_type() {
        assert_eq!(
            AccountSubtype::CurrentAsset.account_type(),
            AccountType::Asset
        );
        assert_eq!(AccountSubtype::Payroll.account_type(), AccountType::Expense);
    }
}
