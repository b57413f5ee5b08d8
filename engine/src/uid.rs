//! UID assignment for rows about to be inserted.

use crate::{Row, Uid};
use uuid::Uuid;

/// Generate a new random uid.
///
/// Rendered lower-case and hyphenated in the 8-4-4-4-12 grouping.
pub fn generate_uid() -> Uid {
    Uuid::new_v4().hyphenated().to_string()
}

/// Give the row a uid if it has none.
///
/// Returns `true` when a uid was assigned. A row that already carries a
/// non-empty uid is left untouched.
pub fn assign_uid(row: &mut Row) -> bool {
    if row.uid().is_some() {
        return false;
    }
    row.set_uid(generate_uid());
    true
}

/// Check that a uid is in canonical lower-case hyphenated form.
pub fn is_canonical_uid(uid: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

    let mut parts = uid.split('-');
    for len in GROUPS {
        match parts.next() {
            Some(part)
                if part.len() == len
                    && part.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) => {}
            _ => return false,
        }
    }
    parts.next().is_none()
}
