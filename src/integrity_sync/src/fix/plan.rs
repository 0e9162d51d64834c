//! JSON plan files: a scan's issues and fixes, written for review and
//! replayed later with `--apply-plan`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Fix;
use crate::{error::ReconcileError, findings::Issue};

/// On-disk report of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// When the scan finished.
    pub generated_at: DateTime<Utc>,
    /// Everything detected.
    pub issues: Vec<Issue>,
    /// Everything proposed.
    pub fixes: Vec<Fix>,
}

/// One `fixes` entry of a plan file as read back.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEntry {
    /// A fix this build knows how to apply.
    Known(Fix),
    /// An entry with an unrecognised `type` or a malformed payload.
    Rejected {
        /// The entry's `type`, if it had one.
        type_name: Option<String>,
        /// The entry's `targetId`, if it had one.
        target_id: Option<String>,
        /// Parse error.
        reason: String,
    },
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    fixes: Vec<Value>,
}

/// Writes `plan` as pretty JSON.
pub fn write_plan(path: impl AsRef<Path>, plan: &Plan) -> Result<(), ReconcileError> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(plan).map_err(|source| ReconcileError::PlanFormat {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| ReconcileError::PlanIo {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the `fixes` of a plan file.
///
/// Only an unreadable file or a document that is not a JSON object with a
/// `fixes` array is an error; individual bad entries come back as
/// [`PlanEntry::Rejected`].
pub fn load_plan(path: impl AsRef<Path>) -> Result<Vec<PlanEntry>, ReconcileError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ReconcileError::PlanIo {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawPlan = serde_json::from_str(&text).map_err(|source| ReconcileError::PlanFormat {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(raw.fixes.into_iter().map(parse_entry).collect())
}

fn parse_entry(value: Value) -> PlanEntry {
    let type_name = value.get("type").and_then(Value::as_str).map(str::to_string);
    let target_id = value
        .get("targetId")
        .and_then(Value::as_str)
        .map(str::to_string);
    match serde_json::from_value::<Fix>(value) {
        Ok(fix) => PlanEntry::Known(fix),
        Err(err) => PlanEntry::Rejected {
            type_name,
            target_id,
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::EntityKind;
    use crate::fix::FixKind;
    use serde_json::json;

    #[test]
    fn written_plan_reads_back_as_known_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plan = Plan {
            generated_at: Utc::now(),
            issues: vec![Issue::new(EntityKind::User, "u1", "Orphan user document")],
            fixes: vec![Fix::new("u1", FixKind::DeleteOrphanDoc)],
        };

        write_plan(&path, &plan).unwrap();
        let entries = load_plan(&path).unwrap();

        assert_eq!(entries, vec![PlanEntry::Known(plan.fixes[0].clone())]);
    }

    #[test]
    fn unknown_entries_are_rejected_not_coerced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let doc = json!({
            "fixes": [
                {"targetId": "u1", "priority": "medium", "type": "deleteOrphanDoc"},
                {"targetId": "u2", "priority": "high", "type": "dropCollection"},
                {"targetId": "u3", "priority": "high", "type": "syncEmail"}
            ]
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let entries = load_plan(&path).unwrap();

        assert!(matches!(entries[0], PlanEntry::Known(_)));
        assert!(matches!(
            &entries[1],
            PlanEntry::Rejected { type_name: Some(t), target_id: Some(id), .. }
                if t == "dropCollection" && id == "u2"
        ));
        assert!(matches!(&entries[2], PlanEntry::Rejected { .. }));
    }

    #[test]
    fn non_report_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            load_plan(&path),
            Err(ReconcileError::PlanFormat { .. })
        ));
    }
}
