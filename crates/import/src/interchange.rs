use serde::{Deserialize, Serialize};
use spendmap_core::{Category, CategoryId, Mapping};
use std::collections::HashSet;
use thiserror::Error;

/// One rule in the export/import file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub pattern: String,
    pub category_id: CategoryId,
}

#[derive(Error, Debug)]
pub enum InterchangeError {
    #[error("Invalid rules JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Rules file must contain a JSON array")]
    NotAnArray,
}

pub fn export_rules(mappings: &[Mapping]) -> Result<String, InterchangeError> {
    let records: Vec<RuleRecord> = mappings
        .iter()
        .map(|m| RuleRecord {
            pattern: m.pattern.clone(),
            category_id: m.category_id.clone(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Parses a rules file. Either every entry is well-formed or nothing is
/// returned.
pub fn parse_rules(json: &str) -> Result<Vec<RuleRecord>, InterchangeError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_array() {
        return Err(InterchangeError::NotAnArray);
    }
    Ok(serde_json::from_value(value)?)
}

#[derive(Debug, Clone, Default)]
pub struct RuleMerge {
    pub added: Vec<Mapping>,
    /// Patterns already present locally, or repeated within the file.
    pub skipped_existing: Vec<String>,
    /// Rules naming a category that does not exist here.
    pub skipped_unknown_category: Vec<RuleRecord>,
}

/// Merges imported rules by exact pattern. New rules get fresh ids.
pub fn merge_rules(existing: &[Mapping], categories: &[Category], incoming: Vec<RuleRecord>) -> RuleMerge {
    let known_categories: HashSet<&CategoryId> = categories.iter().map(|c| &c.id).collect();
    let mut patterns: HashSet<String> = existing.iter().map(|m| m.pattern.clone()).collect();
    let mut merge = RuleMerge::default();

    for record in incoming {
        if patterns.contains(&record.pattern) {
            merge.skipped_existing.push(record.pattern);
            continue;
        }
        if !known_categories.contains(&record.category_id) {
            tracing::warn!(
                pattern = %record.pattern,
                category = %record.category_id,
                "skipping imported rule for unknown category"
            );
            merge.skipped_unknown_category.push(record);
            continue;
        }
        patterns.insert(record.pattern.clone());
        merge.added.push(Mapping {
            id: uuid::Uuid::new_v4().to_string(),
            pattern: record.pattern,
            category_id: record.category_id,
        });
    }

    merge
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<Category> {
        vec![
            Category::new("cat-food", "Food", "#00ff00"),
            Category::new("cat-fun", "Fun", "#0000ff"),
        ]
    }

    #[test]
    fn export_uses_camel_case_keys() {
        let json = export_rules(&[Mapping::new("m1", "RIMI", "cat-food")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["pattern"], "RIMI");
        assert_eq!(value[0]["categoryId"], "cat-food");
        assert!(value[0].get("id").is_none());
    }

    #[test]
    fn export_then_parse_preserves_rules() {
        let mappings = vec![
            Mapping::new("m1", "RIMI", "cat-food"),
            Mapping::new("m2", "CINEMA", "cat-fun"),
        ];
        let parsed = parse_rules(&export_rules(&mappings).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].pattern, "CINEMA");
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let err = parse_rules(r#"{"pattern": "RIMI", "categoryId": "cat-food"}"#).unwrap_err();
        assert!(matches!(err, InterchangeError::NotAnArray));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(parse_rules("[{"), Err(InterchangeError::Json(_))));
    }

    #[test]
    fn one_bad_entry_rejects_the_whole_file() {
        let err = parse_rules(r#"[{"pattern": "A", "categoryId": "cat-food"}, {"pattern": 5}]"#);
        assert!(err.is_err());
    }

    #[test]
    fn merge_skips_existing_patterns_and_assigns_fresh_ids() {
        let existing = vec![Mapping::new("m1", "RIMI", "cat-food")];
        let incoming = parse_rules(
            r#"[
                {"pattern": "RIMI", "categoryId": "cat-fun"},
                {"pattern": "CINEMA", "categoryId": "cat-fun"},
                {"pattern": "CINEMA", "categoryId": "cat-food"}
            ]"#,
        )
        .unwrap();

        let merge = merge_rules(&existing, &categories(), incoming);
        assert_eq!(merge.added.len(), 1);
        assert_eq!(merge.added[0].pattern, "CINEMA");
        assert_ne!(merge.added[0].id, "m1");
        assert_eq!(merge.skipped_existing, vec!["RIMI".to_string(), "CINEMA".to_string()]);
    }

    #[test]
    fn pattern_comparison_is_exact() {
        let existing = vec![Mapping::new("m1", "RIMI", "cat-food")];
        let incoming = vec![RuleRecord {
            pattern: "rimi".to_string(),
            category_id: CategoryId::new("cat-food"),
        }];
        assert_eq!(merge_rules(&existing, &categories(), incoming).added.len(), 1);
    }

    #[test]
    fn merge_skips_unknown_categories() {
        let incoming = vec![RuleRecord {
            pattern: "TAXI".to_string(),
            category_id: CategoryId::new("cat-gone"),
        }];
        let merge = merge_rules(&[], &categories(), incoming);
        assert!(merge.added.is_empty());
        assert_eq!(merge.skipped_unknown_category.len(), 1);
    }
}
