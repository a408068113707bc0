//! Mount step behaviour: halting, publishing and cleanup.

mod common;

use std::path::Path;
use std::sync::Arc;

use armount::{GeneratedData, MountConfig, MountImageStep, PartitionRef, StepAction};
use armount_common::paths::TEMP_PREFIX;
use common::{MemoryReporter, RecordingExecutor};
use tokio_util::sync::CancellationToken;

fn partitions(ids: &[&str]) -> Vec<PartitionRef> {
    ids.iter().copied().map(PartitionRef::from).collect()
}

fn step(config: MountConfig) -> (MountImageStep, Arc<RecordingExecutor>, Arc<MemoryReporter>) {
    let executor = Arc::new(RecordingExecutor::new());
    let reporter = Arc::new(MemoryReporter::default());
    let step = MountImageStep::new(config, executor.clone(), reporter.clone());
    (step, executor, reporter)
}

#[test_log::test(tokio::test)]
async fn partition_count_mismatch_halts_before_mounting() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("root");
    let (mut step, executor, reporter) = step(MountConfig::new(["/"]).with_mount_path(&root));
    let mut generated = GeneratedData::new();

    let action = step
        .run(&partitions(&["/dev/p1", "/dev/p2"]), &mut generated, &CancellationToken::new())
        .await;

    assert_eq!(action, StepAction::Halt);
    assert!(executor.commands().is_empty());
    assert!(!root.exists(), "no root is created for a mismatched layout");
    assert!(generated.is_empty());
    assert!(step.artifact().is_none());

    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Partition count mismatch"), "{errors:?}");

    assert!(step.cleanup().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn duplicate_targets_halt_before_mounting() {
    let (mut step, executor, reporter) = step(MountConfig::new(["/", "/"]));
    let action = step
        .run(&partitions(&["a", "b"]), &mut GeneratedData::new(), &CancellationToken::new())
        .await;

    assert_eq!(action, StepAction::Halt);
    assert!(executor.commands().is_empty());
    assert!(reporter.errors()[0].contains("Duplicate mount target"));
}

#[test_log::test(tokio::test)]
async fn relative_target_halts_before_mounting() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("root");
    let (mut step, executor, reporter) =
        step(MountConfig::new(["/boot/efi", "boot"]).with_mount_path(&root));

    let action = step
        .run(&partitions(&["a", "b"]), &mut GeneratedData::new(), &CancellationToken::new())
        .await;

    assert_eq!(action, StepAction::Halt);
    assert!(executor.commands().is_empty());
    assert!(!root.exists());
    assert!(reporter.errors()[0].contains("Invalid mount target"), "{:?}", reporter.errors());
}

#[test_log::test(tokio::test)]
async fn publishes_root_and_generated_data() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("root");
    let config = MountConfig::new(["/boot", "/"])
        .with_mount_path(&root)
        .with_generated_data_key("ImageRoot");
    let (mut step, executor, reporter) = step(config);
    let mut generated = GeneratedData::new();

    let action = step
        .run(&partitions(&["/dev/p1", "/dev/p2"]), &mut generated, &CancellationToken::new())
        .await;
    assert_eq!(action, StepAction::Continue);

    let artifact = step.artifact().cloned().unwrap();
    assert_eq!(artifact.result_key, "mount_path");
    assert_eq!(artifact.root, root);
    assert_eq!(
        generated.get("ImageRoot"),
        Some(&serde_json::json!(root.to_string_lossy()))
    );
    assert_eq!(
        reporter.lines().first().map(String::as_str),
        Some(r#"say: partitions: ["/dev/p1", "/dev/p2"]"#)
    );

    let report = step.cleanup().await;
    assert!(report.is_clean(), "{report:?}");
    assert!(step.artifact().is_none());
    assert_eq!(executor.commands().len(), 4);
    assert!(!root.exists());
}

#[test_log::test(tokio::test)]
async fn temporary_root_when_none_configured() {
    let (mut step, _executor, _reporter) = step(MountConfig::new(["/"]));
    let action = step
        .run(&partitions(&["/dev/p1"]), &mut GeneratedData::new(), &CancellationToken::new())
        .await;
    assert_eq!(action, StepAction::Continue);

    let root = step.artifact().unwrap().root.clone();
    let name = root.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(TEMP_PREFIX), "{name}");
    assert!(root.is_dir());

    step.cleanup().await;
    assert!(!root.exists());
}

#[test_log::test(tokio::test)]
async fn overlay_archive_lands_next_to_overlay_path() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("root");
    let overlay = temp.path().join("overlay");
    let config = MountConfig::new(["/"])
        .with_mount_path(&root)
        .with_overlay(&overlay);
    let (mut step, executor, _reporter) = step(config);

    let action = step
        .run(&partitions(&["/dev/p1"]), &mut GeneratedData::new(), &CancellationToken::new())
        .await;
    assert_eq!(action, StepAction::Continue);
    assert!(
        executor
            .commands()
            .iter()
            .any(|c| c.starts_with("mount -t overlay overlay -o lowerdir="))
    );

    let report = step.cleanup().await;
    assert!(report.is_clean(), "{report:?}");
    assert!(Path::new(&format!("{}.tar.gz", overlay.display())).is_file());
}

#[test_log::test(tokio::test)]
async fn halted_step_still_cleans_up_partial_mounts() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("root");
    let executor = Arc::new(RecordingExecutor::new().failing(|line| line.starts_with("mount /dev/p2 ")));
    let reporter = Arc::new(MemoryReporter::default());
    let mut step = MountImageStep::new(
        MountConfig::new(["/", "/boot"]).with_mount_path(&root),
        executor.clone(),
        reporter.clone(),
    );

    let action = step
        .run(&partitions(&["/dev/p1", "/dev/p2"]), &mut GeneratedData::new(), &CancellationToken::new())
        .await;
    assert_eq!(action, StepAction::Halt);
    assert!(reporter.errors()[0].starts_with("Failed to mount /dev/p2"));

    let report = step.cleanup().await;
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        executor.commands().last().map(String::as_str),
        Some(format!("umount {}", root.display()).as_str())
    );
    assert!(!root.exists());
}
