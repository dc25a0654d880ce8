use super::*;
use crate::migrations::definitions::VersionScheme;
use crate::migrations::memory::MemoryDatabase;
use std::fs;
use tempfile::TempDir;

fn write_script(dir: &TempDir, file: &str, table: &str) {
    let content = format!(
        "-- +goose Up\nCREATE TABLE {table} (id INT);\n\n-- +goose Down\nDROP TABLE {table};\n"
    );
    fs::write(dir.path().join(file), content).unwrap();
}

/// Three reversible scripts creating `t1`, `t2` and `t3`
fn three_scripts() -> (TempDir, Migrator<MemoryDatabase>) {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "00001_create_t1.sql", "t1");
    write_script(&dir, "00002_create_t2.sql", "t2");
    write_script(&dir, "00003_create_t3.sql", "t3");
    let migrator = Migrator::new(MigrationSource::from_dir(dir.path()), MemoryDatabase::new());
    (dir, migrator)
}

async fn applied(migrator: &Migrator<MemoryDatabase>) -> Vec<i64> {
    VersionLedger::new(migrator.database())
        .applied_versions()
        .await
        .unwrap()
        .into_iter()
        .collect()
}

#[tokio::test]
async fn test_up_then_reset_restores_schema() {
    let (_dir, migrator) = three_scripts();
    let before = migrator.database().tables();

    migrator.run(MigrationCommand::Up).await.unwrap();
    assert_eq!(migrator.database().tables().len(), 3);

    migrator.run(MigrationCommand::Reset).await.unwrap();
    assert_eq!(migrator.database().tables(), before);
    assert!(applied(&migrator).await.is_empty());
}

#[tokio::test]
async fn test_up_only_script_resets_as_noop() {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "00001_create_t1.sql", "t1");
    fs::write(
        dir.path().join("00002_seed_t2.sql"),
        "-- +goose Up\nCREATE TABLE t2 (id INT);\n",
    )
    .unwrap();
    let migrator = Migrator::new(MigrationSource::from_dir(dir.path()), MemoryDatabase::new());

    migrator.run(MigrationCommand::Up).await.unwrap();
    let outcome = migrator.run(MigrationCommand::Reset).await.unwrap();

    match outcome {
        CommandOutcome::Executed(report) => assert_eq!(report.reverted, vec![2, 1]),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(applied(&migrator).await.is_empty());
    // the up-only script leaves its table behind
    assert!(migrator.database().tables().contains("t2"));
    assert!(!migrator.database().tables().contains("t1"));
}

#[tokio::test]
async fn test_version_after_apply_and_down() {
    let (_dir, migrator) = three_scripts();

    migrator.run(MigrationCommand::Up).await.unwrap();
    assert_eq!(
        migrator.run(MigrationCommand::Version).await.unwrap(),
        CommandOutcome::Version(3)
    );

    migrator.run(MigrationCommand::Down).await.unwrap();
    assert_eq!(migrator.version().await.unwrap(), 2);
    assert!(!migrator.database().tables().contains("t3"));
}

#[tokio::test]
async fn test_up_to_unknown_version_leaves_ledger_unchanged() {
    let (_dir, migrator) = three_scripts();
    migrator.run(MigrationCommand::UpByOne).await.unwrap();
    let ledger_before = migrator.database().state().ledger;

    let err = migrator.run(MigrationCommand::UpTo(99)).await.unwrap_err();

    assert!(matches!(err, MigrateError::Plan(ref msg) if msg == "no migration with version 99"));
    assert_eq!(migrator.database().state().ledger, ledger_before);
    assert!(!migrator.database().is_locked());
}

#[tokio::test]
async fn test_up_at_top_executes_nothing() {
    let (_dir, migrator) = three_scripts();
    migrator.run(MigrationCommand::Up).await.unwrap();
    let executed = migrator.database().executed();

    let outcome = migrator.run(MigrationCommand::Up).await.unwrap();

    match outcome {
        CommandOutcome::Executed(report) => assert!(report.is_noop()),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(migrator.database().executed(), executed);
}

#[tokio::test]
async fn test_failing_script_keeps_prior_versions() {
    let (dir, migrator) = three_scripts();
    fs::write(
        dir.path().join("00004_broken.sql"),
        "-- +goose Up\nCREATE TABLE t4 (id INT);\nSELECT fail();\n\n-- +goose Down\nDROP TABLE t4;\n",
    )
    .unwrap();

    let err = migrator.run(MigrationCommand::Up).await.unwrap_err();

    assert_eq!(err.version(), Some(4));
    assert_eq!(applied(&migrator).await, vec![1, 2, 3]);
    assert!(!migrator.database().tables().contains("t4"));
    assert!(!migrator.database().is_locked());
}

#[tokio::test]
async fn test_lock_held_for_each_migrating_command() {
    let (_dir, migrator) = three_scripts();

    migrator.run(MigrationCommand::UpTo(2)).await.unwrap();
    migrator.run(MigrationCommand::Redo).await.unwrap();
    migrator.run(MigrationCommand::Status).await.unwrap();

    // status does not lock
    assert_eq!(migrator.database().lock_calls(), 2);
    assert!(!migrator.database().is_locked());
}

#[tokio::test]
async fn test_lock_conflict_is_ledger_error() {
    let (_dir, migrator) = three_scripts();
    migrator.database().lock().await.unwrap();

    let err = migrator.run(MigrationCommand::Up).await.unwrap_err();

    assert!(matches!(err, MigrateError::Ledger(ref msg) if msg.contains("lock")));
    assert!(migrator.database().tables().is_empty());
}

#[tokio::test]
async fn test_down_to_and_redo() {
    let (_dir, migrator) = three_scripts();
    migrator.run(MigrationCommand::Up).await.unwrap();

    migrator.run(MigrationCommand::DownTo(1)).await.unwrap();
    assert_eq!(applied(&migrator).await, vec![1]);

    let outcome = migrator.run(MigrationCommand::Redo).await.unwrap();
    match outcome {
        CommandOutcome::Executed(report) => {
            assert_eq!(report.reverted, vec![1]);
            assert_eq!(report.applied, vec![1]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(migrator.database().tables().contains("t1"));
}

#[tokio::test]
async fn test_plan_is_a_dry_run() {
    let (_dir, migrator) = three_scripts();

    let plan = migrator.plan(PlanTarget::UpTo(2)).await.unwrap();

    assert_eq!(plan.len(), 2);
    assert!(migrator.database().executed().is_empty());
    assert!(applied(&migrator).await.is_empty());
}

#[tokio::test]
async fn test_status_lists_pending_applied_and_missing() {
    let (dir, migrator) = three_scripts();
    migrator.run(MigrationCommand::UpTo(2)).await.unwrap();
    fs::remove_file(dir.path().join("00001_create_t1.sql")).unwrap();

    let report = match migrator.run(MigrationCommand::Status).await.unwrap() {
        CommandOutcome::Status(report) => report,
        other => panic!("unexpected outcome {:?}", other),
    };

    assert_eq!(report.current_version, 2);
    let versions: Vec<i64> = report.entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(report.entries[0].file, None);
    assert!(matches!(report.entries[1].status, MigrationStatus::Applied { .. }));
    assert_eq!(report.entries[2].status, MigrationStatus::Pending);
    assert_eq!(report.pending().count(), 1);
}

#[tokio::test]
async fn test_create_then_load_yields_newest_version() {
    let (_dir, migrator) = three_scripts();

    let outcome = migrator
        .run(MigrationCommand::Create {
            name: "add_users".to_string(),
            scheme: VersionScheme::Sequential,
        })
        .await
        .unwrap();

    let created = match outcome {
        CommandOutcome::Created(migration) => migration,
        other => panic!("unexpected outcome {:?}", other),
    };
    let loaded = migrator.source().load_all().unwrap();
    let newest = loaded.last().unwrap();

    assert_eq!(newest.version, 4);
    assert_eq!(newest.name, "add_users");
    assert_eq!(created.version, newest.version);
    assert!(migrator.database().executed().is_empty());
}
