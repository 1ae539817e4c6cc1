//! Renaming extracted output columns after authoritative table metadata.
//!
//! Alignment is all-or-nothing: names are replaced positionally only when
//! the extracted column count matches the authoritative count exactly.

use compact_str::CompactString;

use super::ColumnLineage;

/// What happened when aligning against the authoritative column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Every output column was renamed; `renamed` counts names that changed
    Applied { renamed: usize },
    /// Counts differ, extracted names were kept
    ArityMismatch { extracted: usize, expected: usize },
    /// No authoritative columns were available
    Unavailable
}

/// Replace `target_column` of each edge with the column at the same index.
pub fn align_columns(columns: &mut [ColumnLineage], authoritative: &[CompactString]) -> Alignment {
    if authoritative.is_empty() {
        return Alignment::Unavailable;
    }
    if columns.len() != authoritative.len() {
        return Alignment::ArityMismatch {
            extracted: columns.len(),
            expected:  authoritative.len()
        };
    }
    let mut renamed = 0;
    for (column, name) in columns.iter_mut().zip(authoritative) {
        if column.target_column != *name {
            column.target_column = name.clone();
            renamed += 1;
        }
    }
    Alignment::Applied { renamed }
}
