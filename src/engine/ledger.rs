//! Error ledger reduction
//!
//! Error records are never overwritten; each failed attempt adds a new one.
//! The current error of a resource is the record with the highest attempt
//! count.

use std::collections::HashMap;

use crate::resource::{ErrorEntry, ResourceRow};

/// One entry per resource: strictly highest attempt count wins, the earliest
/// encountered is kept on ties. Output keeps first-seen resource order.
pub fn reduce_errors(entries: Vec<ErrorEntry>) -> Vec<ErrorEntry> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut current: Vec<ErrorEntry> = Vec::new();

    for entry in entries {
        match index.get(&entry.resource_id) {
            Some(&i) => {
                if entry.attempt_count > current[i].attempt_count {
                    current[i] = entry;
                }
            }
            None => {
                index.insert(entry.resource_id.clone(), current.len());
                current.push(entry);
            }
        }
    }

    current
}

/// Returns true if the row's attached error is the current error of its
/// resource
pub fn is_current(row: &ResourceRow, ledger: &[ErrorEntry]) -> bool {
    let Some(error) = row.has_error.as_deref() else {
        return false;
    };
    ledger
        .iter()
        .find(|e| e.resource_id == row.id)
        .is_some_and(|e| e.error_id == error)
}

/// Keep retry rows whose attached error is the current error of the resource
pub fn current_retry_rows(rows: Vec<ResourceRow>, ledger: &[ErrorEntry]) -> Vec<ResourceRow> {
    rows.into_iter().filter(|row| is_current(row, ledger)).collect()
}
