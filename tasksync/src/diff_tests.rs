//! Unit tests for reconciliation planning

use super::*;
use crate::directive::DirectiveParser;
use crate::diff::{HashComparison, PlanSummary, TaskUpdate};
use rstest::*;
use taskbelt_core::{ScheduledTask, TaskState};
use test_case::test_case;

const FOLDER: &str = "\\Batch\\";

fn batch_file(name: &str, contents: &str) -> BatchFile {
    BatchFile::from_contents(
        format!("C:\\scripts\\{}.bat", name),
        contents,
        &DirectiveParser::default(),
    )
}

fn task(name: &str, documentation: Option<&str>) -> ScheduledTask {
    ScheduledTask {
        name: name.to_string(),
        folder: FOLDER.to_string(),
        enabled: true,
        state: TaskState::Ready,
        documentation: documentation.map(str::to_string),
    }
}

#[fixture]
fn engine() -> DiffEngine {
    DiffEngine::new()
}

#[rstest]
fn test_new_file_is_created(engine: DiffEngine) {
    let plan = engine.generate_plan(vec![batch_file("backup", ":: taskbelt DAILY 02:00")], vec![]);

    assert_eq!(plan.to_create.len(), 1);
    assert!(plan.to_update.is_empty());
    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.summary().creates, 1);
}

#[rstest]
fn test_orphan_task_is_deleted(engine: DiffEngine) {
    let plan = engine.generate_plan(vec![], vec![task("Legacy", Some("abc"))]);

    assert!(plan.to_create.is_empty());
    assert_eq!(plan.to_delete.len(), 1);
    assert_eq!(plan.to_delete[0].name, "Legacy");
}

#[rstest]
fn test_match_is_case_insensitive(engine: DiffEngine) {
    let file = batch_file("Backup", ":: taskbelt DAILY 02:00");
    let hash = file.content_hash.clone();

    let plan = engine.generate_plan(vec![file], vec![task("BACKUP", hash.as_deref())]);

    assert!(plan.to_create.is_empty());
    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.to_update.len(), 1);
    assert_eq!(plan.to_update[0].comparison, HashComparison::Same);
}

#[rstest]
fn test_unchanged_task_stays_in_update_list(engine: DiffEngine) {
    let file = batch_file("report", ":: taskbelt MONDAY 07:00");
    let hash = file.content_hash.clone();

    let plan = engine.generate_plan(vec![file], vec![task("report", hash.as_deref())]);
    let summary = plan.summary();

    assert_eq!(plan.to_update.len(), 1);
    assert_eq!(
        summary,
        PlanSummary {
            creates: 0,
            recreates: 0,
            unchanged: 1,
            deletes: 0
        }
    );
    assert!(summary.is_noop());
}

#[rstest]
fn test_changed_hash_requires_recreate(engine: DiffEngine) {
    let plan = engine.generate_plan(
        vec![batch_file("report", ":: taskbelt DAILY 08:00")],
        vec![task("report", Some("stale"))],
    );

    assert_eq!(plan.to_update[0].comparison, HashComparison::Changed);
    assert_eq!(plan.summary().recreates, 1);
    assert!(!plan.summary().is_noop());
}

#[rstest]
fn test_mixed_plan_partitions_everything(engine: DiffEngine) {
    let keep = batch_file("keep", ":: taskbelt HOURLY 5");
    let keep_hash = keep.content_hash.clone();
    let desired = vec![
        keep,
        batch_file("changed", ":: taskbelt DAILY 01:00"),
        batch_file("fresh", ":: taskbelt DAILY 03:00"),
    ];
    let existing = vec![
        task("zeta", None),
        task("keep", keep_hash.as_deref()),
        task("changed", Some("old")),
        task("Alpha", Some("x")),
    ];

    let plan = engine.generate_plan(desired, existing);

    let created: Vec<&str> = plan.to_create.iter().map(|f| f.task_name.as_str()).collect();
    let updated: Vec<&str> = plan.to_update.iter().map(|u| u.file.task_name.as_str()).collect();
    let deleted: Vec<&str> = plan.to_delete.iter().map(|t| t.name.as_str()).collect();

    assert_eq!(created, vec!["fresh"]);
    assert_eq!(updated, vec!["keep", "changed"]);
    assert_eq!(deleted, vec!["Alpha", "zeta"]);
    assert_eq!(
        plan.summary(),
        PlanSummary {
            creates: 1,
            recreates: 1,
            unchanged: 1,
            deletes: 2
        }
    );
}

#[test_case(Some("a"), Some("a"), HashComparison::Same, false ; "same")]
#[test_case(Some("a"), Some("b"), HashComparison::Changed, true ; "changed")]
#[test_case(None, Some("b"), HashComparison::StoredMissing, true ; "stored missing")]
#[test_case(Some("a"), None, HashComparison::CurrentMissing, true ; "current missing")]
#[test_case(None, None, HashComparison::BothMissing, true ; "both missing")]
fn test_hash_comparison(
    stored: Option<&str>,
    current: Option<&str>,
    expected: HashComparison,
    recreate: bool,
) {
    let comparison = HashComparison::of(stored, current);
    assert_eq!(comparison, expected);
    assert_eq!(comparison.requires_recreate(), recreate);
}

#[test]
fn test_task_update_compares_documentation() {
    let file = batch_file("job", ":: taskbelt DAILY 02:00");
    let update = TaskUpdate::new(task("job", None), file);
    assert_eq!(update.comparison, HashComparison::StoredMissing);
}

#[rstest]
fn test_plan_serializes_to_json(engine: DiffEngine) {
    let plan = engine.generate_plan(
        vec![batch_file("job", ":: taskbelt DAILY 02:00")],
        vec![task("old", None)],
    );

    let json = plan.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["to_create"][0]["task_name"], "job");
    assert_eq!(value["to_create"][0]["triggers"][0]["kind"], "daily");
    assert_eq!(value["to_delete"][0]["name"], "old");
    assert!(value["to_create"][0].get("diagnostics").is_none());
}
