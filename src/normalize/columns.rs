use crate::models::{CanonicalField, ColumnAssignment};

struct ColumnRule {
    field: CanonicalField,
    matches: fn(&str) -> bool,
}

/// Evaluated top to bottom. A rule claims the first still-unassigned source column it
/// matches, and is skipped once its field has a column. Name arguments are lowercase.
const RULES: &[ColumnRule] = &[
    ColumnRule {
        field: CanonicalField::Id,
        matches: |name| name == "id",
    },
    ColumnRule {
        field: CanonicalField::Ts,
        matches: |name| (name.contains("time") || name.starts_with("ts")) && name.contains("str"),
    },
    ColumnRule {
        field: CanonicalField::Ts,
        matches: |name| name == "ts" || name == "timestamp",
    },
    ColumnRule {
        field: CanonicalField::Ts,
        matches: |name| name.contains("timestamp"),
    },
    ColumnRule {
        field: CanonicalField::Temperature,
        matches: |name| name.contains("temp"),
    },
    ColumnRule {
        field: CanonicalField::Current,
        matches: |name| name.contains("curr"),
    },
    ColumnRule {
        field: CanonicalField::WorkOrder,
        matches: |name| name.contains("work") || name.contains("order") || name == "wo",
    },
    ColumnRule {
        field: CanonicalField::Shift,
        matches: |name| name.contains("shift"),
    },
    ColumnRule {
        field: CanonicalField::Device,
        matches: |name| name.contains("device") || name.contains("line") || name.contains("machine"),
    },
    ColumnRule {
        field: CanonicalField::Ts,
        matches: |name| name.contains("time") || has_word(name, "date"),
    },
];

/// `word` appears in `name` as a whole token between non-alphanumeric separators.
fn has_word(name: &str, word: &str) -> bool {
    name.split(|c: char| !c.is_ascii_alphanumeric()).any(|token| token == word)
}

/// Maps each source column onto at most one canonical field; each field takes at most one column.
pub fn assign(columns: &[String]) -> Vec<ColumnAssignment> {
    let lowered: Vec<String> = columns
        .iter()
        .map(|column| column.trim().to_ascii_lowercase())
        .collect();
    let mut targets: Vec<Option<CanonicalField>> = vec![None; columns.len()];

    for rule in RULES {
        if targets.contains(&Some(rule.field)) {
            continue;
        }
        let claimed = lowered
            .iter()
            .enumerate()
            .find(|(index, name)| targets[*index].is_none() && (rule.matches)(name.as_str()));
        if let Some((index, _)) = claimed {
            targets[index] = Some(rule.field);
        }
    }

    columns
        .iter()
        .zip(targets)
        .map(|(source, field)| ColumnAssignment {
            source: source.clone(),
            field,
        })
        .collect()
}

/// Source column position feeding `field`, if any.
pub fn position_of(assignments: &[ColumnAssignment], field: CanonicalField) -> Option<usize> {
    assignments
        .iter()
        .position(|assignment| assignment.field == Some(field))
}
