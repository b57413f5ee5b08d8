//! Rules attached to a mirrored table.
//!
//! Each tracked table carries four rules, named deterministically as
//! `TRG_<table>_<EVENT>` so that reinstalling replaces rather than
//! duplicates them.

use crate::{CaptureSpec, TableDef, TableName};
use serde::{Deserialize, Serialize};

/// Prefix shared by every installed rule name.
pub const RULE_PREFIX: &str = "TRG";

/// Longest rule name hosts keep intact, in bytes.
///
/// Postgres truncates longer identifiers, which would make the rules of a
/// table collide.
pub const MAX_RULE_NAME_LENGTH: usize = 63;

/// When a rule runs relative to the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Before,
    After,
}

/// The mutation a rule observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timing::Before => write!(f, "BEFORE"),
            Timing::After => write!(f, "AFTER"),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Insert => write!(f, "INSERT"),
            Event::Update => write!(f, "UPDATE"),
            Event::Delete => write!(f, "DELETE"),
        }
    }
}

/// The role of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    /// Assigns a uid to rows inserted without one
    AssignUid,
    CaptureInsert,
    CaptureUpdate,
    CaptureDelete,
}

impl RuleKind {
    /// All rule kinds, in the order they are installed.
    pub const ALL: [RuleKind; 4] = [
        RuleKind::AssignUid,
        RuleKind::CaptureInsert,
        RuleKind::CaptureDelete,
        RuleKind::CaptureUpdate,
    ];

    /// When the rule runs.
    pub fn timing(self) -> Timing {
        match self {
            RuleKind::AssignUid | RuleKind::CaptureDelete => Timing::Before,
            RuleKind::CaptureInsert | RuleKind::CaptureUpdate => Timing::After,
        }
    }

    /// The mutation the rule observes.
    pub fn event(self) -> Event {
        match self {
            RuleKind::AssignUid | RuleKind::CaptureInsert => Event::Insert,
            RuleKind::CaptureUpdate => Event::Update,
            RuleKind::CaptureDelete => Event::Delete,
        }
    }

    /// Event suffix used in the rule name.
    pub fn suffix(self) -> &'static str {
        match self {
            RuleKind::AssignUid => "SETUUIDBEFOREINSERT",
            RuleKind::CaptureInsert => "ONINSERT",
            RuleKind::CaptureUpdate => "ONUPDATE",
            RuleKind::CaptureDelete => "ONDELETE",
        }
    }

    /// The rule name for a table.
    pub fn name_for(self, table: &str) -> String {
        format!("{RULE_PREFIX}_{table}_{}", self.suffix())
    }
}

/// A rule bound to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
}

/// The complete set of rules of one mirrored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Table the rules are attached to
    pub table: TableName,
    /// Rules in installation order
    pub rules: Vec<Rule>,
    /// What the capture rules track
    pub capture: CaptureSpec,
}

impl RuleSet {
    /// Build the rule set of a mirrored table.
    pub fn for_table(table: &TableDef) -> Self {
        let rules = RuleKind::ALL
            .iter()
            .map(|kind| Rule {
                name: kind.name_for(&table.name),
                kind: *kind,
            })
            .collect();

        Self {
            table: table.name.clone(),
            rules,
            capture: CaptureSpec::for_table(table),
        }
    }

    /// Names of the rules, in installation order.
    pub fn names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name.clone()).collect()
    }

    /// The longest rule name, if any exceeds [`MAX_RULE_NAME_LENGTH`].
    pub fn overlong_name(&self) -> Option<&str> {
        self.rules
            .iter()
            .map(|r| r.name.as_str())
            .filter(|name| name.len() > MAX_RULE_NAME_LENGTH)
            .max_by_key(|name| name.len())
    }

    /// Whether a rule of the given kind is part of the set.
    pub fn has(&self, kind: RuleKind) -> bool {
        self.rules.iter().any(|r| r.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType};

    fn contacts() -> TableDef {
        TableDef::new(
            "zoho_Contacts",
            vec![
                ColumnDef::required("uid", ColumnType::Text),
                ColumnDef::nullable("name", ColumnType::Text),
            ],
        )
    }

    #[test]
    fn rule_names() {
        let rules = RuleSet::for_table(&contacts());
        assert_eq!(
            rules.names(),
            vec![
                "TRG_zoho_Contacts_SETUUIDBEFOREINSERT",
                "TRG_zoho_Contacts_ONINSERT",
                "TRG_zoho_Contacts_ONDELETE",
                "TRG_zoho_Contacts_ONUPDATE",
            ]
        );
    }

    #[test]
    fn timing_and_events() {
        assert_eq!(RuleKind::AssignUid.timing(), Timing::Before);
        assert_eq!(RuleKind::AssignUid.event(), Event::Insert);
        assert_eq!(RuleKind::CaptureInsert.timing(), Timing::After);
        assert_eq!(RuleKind::CaptureUpdate.timing(), Timing::After);
        assert_eq!(RuleKind::CaptureDelete.timing(), Timing::Before);
        assert_eq!(RuleKind::CaptureDelete.event(), Event::Delete);
        assert_eq!(format!("{} {}", Timing::After, Event::Update), "AFTER UPDATE");
    }

    #[test]
    fn overlong_names_are_detected() {
        assert_eq!(RuleSet::for_table(&contacts()).overlong_name(), None);

        // "TRG_" + table + "_SETUUIDBEFOREINSERT" fits in 63 bytes up to 39
        let mut table = contacts();
        table.name = "t".repeat(39);
        assert_eq!(RuleSet::for_table(&table).overlong_name(), None);

        table.name = "t".repeat(40);
        let rules = RuleSet::for_table(&table);
        assert_eq!(
            rules.overlong_name(),
            Some(RuleKind::AssignUid.name_for(&table.name).as_str())
        );
    }

    #[test]
    fn rule_set_is_deterministic() {
        assert_eq!(RuleSet::for_table(&contacts()), RuleSet::for_table(&contacts()));
        assert!(RuleSet::for_table(&contacts()).has(RuleKind::CaptureUpdate));
    }
}
