mod common;

use std::{sync::Arc, time::Duration};

use arkutils::{terminate_process, SystemProcessTable};
use arkvisor::{
    config::VmConfig,
    devices::DeviceName,
    layout::VmLayout,
    orchestration::Orchestrator,
    ArkvisorError, ErrorKind,
};
use serial_test::serial;
use tempfile::tempdir;

use common::{
    privileged_test_config, spawn_artifact_server, test_config, test_config_with_settle,
    wait_for_content, write_package, FakeProcessTable,
};
use nix::errno::Errno;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
#[serial]
async fn test_create_extracts_blueprint_and_launches_helpers() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = spawn_artifact_server().await?;
    let config = test_config(dir.path(), &base)?;
    let orchestrator = Orchestrator::with_process_table(config.clone(), Arc::new(SystemProcessTable))?;

    let launched = orchestrator
        .create(VmConfig::builder().name("create-demo").memory("1024").build())
        .await?;

    let layout = VmLayout::new(&config, "create-demo");
    for file in ["vmlinux", "rootfs.ext4", "oci.ext4"] {
        let path = layout.get_blueprint().join(file);
        let len = std::fs::metadata(&path)?.len();
        assert!(len > 0, "{} is empty", path.display());
    }
    assert!(layout.archive_path(&config.get_artifacts()[0]).exists());

    let nat_pid = launched.pid_of("nat").expect("nat should have been launched");
    assert!(launched.pid_of("snapshotter").is_some());

    let snapshotter_log = launched.logs_path.join("snapshotter.log");
    let content = wait_for_content(&snapshotter_log, "--memory-size 1024").await?;
    assert!(content.contains("Starting snapshotter"));
    assert!(content.contains("--cpu-template T2A"));
    assert!(content.contains(r#""name":"kernel""#));

    let report = orchestrator.stop("create-demo").await?;
    assert_eq!(report.terminated, vec![launched.pid_of("snapshotter").unwrap_or_default()]);

    terminate_process(nat_pid)?;
    Ok(())
}

#[test_log::test(tokio::test)]
#[serial]
async fn test_create_reuses_running_nat() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = spawn_artifact_server().await?;
    let config = test_config(dir.path(), &base)?;
    let orchestrator = Orchestrator::new(config)?;

    let vm = VmConfig::builder().name("nat-demo").memory("512").build();
    let first = orchestrator.create(vm.clone()).await?;
    let nat_pid = first.pid_of("nat").expect("first create should launch nat");
    wait_for_content(&first.logs_path.join("nat.log"), "--host-interface eth0").await?;

    let second = orchestrator.create(vm).await?;
    assert_eq!(second.pid_of("nat"), None);
    assert!(second.pid_of("snapshotter").is_some());

    orchestrator.stop("nat-demo").await?;
    if let Some(pid) = first.pid_of("snapshotter") {
        let _ = terminate_process(pid);
    }
    terminate_process(nat_pid)?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_fails_on_missing_artifact() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = spawn_artifact_server().await?;
    let config = test_config(dir.path(), &format!("{base}/gone"))?;
    let orchestrator = Orchestrator::with_process_table(config.clone(), FakeProcessTable::with_entries(&[]))?;

    let err = orchestrator
        .create(VmConfig::builder().name("broken").memory("1024").build())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Artifact);
    assert!(matches!(err, ArkvisorError::DownloadFailed { .. }), "{err:?}");

    let layout = VmLayout::new(&config, "broken");
    assert!(!layout.archive_path(&config.get_artifacts()[0]).exists());
    assert!(!config.run_dir().join("nat.json").exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_rejects_invalid_request_before_side_effects() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let orchestrator = Orchestrator::with_process_table(config.clone(), FakeProcessTable::with_entries(&[]))?;

    let err = orchestrator
        .create(VmConfig::builder().name("../escape").memory("1024").build())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = orchestrator
        .create(VmConfig::builder().name("ok").memory("lots").build())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(!config.get_output_dir().exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_start_requires_package() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let orchestrator = Orchestrator::with_process_table(config, FakeProcessTable::with_entries(&[]))?;

    let err = orchestrator.start("unpackaged").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    match err {
        ArkvisorError::NotPackaged { name, missing } => {
            assert_eq!(name, "unpackaged");
            assert!(missing.ends_with(DeviceName::State.package_file()));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    Ok(())
}

#[test_log::test(tokio::test)]
#[serial]
async fn test_start_status_stop() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    write_package(&config, "start-demo")?;
    let orchestrator = Orchestrator::new(config.clone())?;

    let launched = orchestrator.start("start-demo").await?;
    let peer_pid = launched.pid_of("peer").expect("peer should have been launched");
    let forwarder_pid = launched.pid_of("forwarder").expect("forwarder should have been launched");

    let forwarder = wait_for_content(
        &launched.logs_path.join("forwarder.log"),
        r#""externalAddr":"127.0.0.1:3333""#,
    )
    .await?;
    assert!(forwarder.contains(r#""internalPort":"6379""#));

    let peer = wait_for_content(&launched.logs_path.join("peer.log"), "--laddr :1337").await?;
    assert!(peer.contains(r#""base":"#));
    assert!(peer.contains(r#""makeMigratable":true"#));
    assert_eq!(peer.matches("[peer] Starting peer").count(), 1);
    let layout = VmLayout::new(&config, "start-demo");
    assert!(peer.contains(&layout.overlay_dir().display().to_string()));

    assert!(layout.overlay_dir().is_dir());
    assert!(layout.state_dir().is_dir());

    let status = orchestrator.status("start-demo").await?;
    assert!(status.services.peer);
    assert!(status.services.forwarder);

    let mut report = orchestrator.stop("start-demo").await?;
    report.terminated.sort_unstable();
    let mut expected = vec![peer_pid, forwarder_pid];
    expected.sort_unstable();
    assert_eq!(report.terminated, expected);
    assert!(report.failed.is_empty());
    assert!(!config.run_dir().join("start-demo").join("peer.json").exists());

    let status = orchestrator.status("start-demo").await?;
    assert!(!status.services.peer);
    assert!(!status.services.forwarder);

    Ok(())
}

#[test_log::test(tokio::test)]
#[serial]
async fn test_start_queued_behind_create_checks_package_under_lock() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = spawn_artifact_server().await?;
    let config =
        test_config_with_settle(dir.path(), &format!("{base}/gone"), Duration::from_secs(1))?;
    write_package(&config, "race")?;
    let orchestrator = Arc::new(Orchestrator::new(config.clone())?);

    // The first start holds the vm lock through its settle interval.
    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.start("race").await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Queued behind it: a create that wipes the package and then fails to download,
    // followed by a second start.
    let create = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .create(VmConfig::builder().name("race").memory("1024").build())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.start("race").await }
    });

    let first = first.await?;
    let create = create.await?;
    let second = second.await?;
    orchestrator.stop("race").await?;

    assert!(first.is_ok(), "{first:?}");
    assert!(matches!(create, Err(ArkvisorError::DownloadFailed { .. })), "{create:?}");
    assert!(matches!(second, Err(ArkvisorError::NotPackaged { .. })), "{second:?}");
    Ok(())
}

#[test_log::test(tokio::test)]
#[serial]
async fn test_migrate_dials_source_and_uses_migrate_port() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let orchestrator = Orchestrator::new(config)?;

    let launched = orchestrator.migrate("migrate-demo", "10.0.0.5").await?;

    let peer = wait_for_content(&launched.logs_path.join("peer.log"), "--raddr 10.0.0.5:1337").await?;
    assert!(peer.contains("--laddr  --devices") || peer.contains("--laddr --devices"));

    wait_for_content(
        &launched.logs_path.join("forwarder.log"),
        r#""externalAddr":"127.0.0.1:3334""#,
    )
    .await?;

    let report = orchestrator.stop("migrate-demo").await?;
    assert_eq!(report.terminated.len(), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_migrate_rejects_bad_source() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let orchestrator = Orchestrator::with_process_table(config, FakeProcessTable::with_entries(&[]))?;

    let err = orchestrator.migrate("demo", "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = orchestrator.migrate("demo", "10.0.0.5; rm -rf /").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stop_only_targets_the_named_instance() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let table = FakeProcessTable::with_entries(&[
        (100, "ark-foo:drafter-peer --netns ark0 --raddr  --laddr :1337"),
        (101, "sudo ark-foo:drafter-forwarder --port-forwards []"),
        (102, "ark-foobar:drafter-peer --netns ark0"),
        (103, "drafter-nat --host-interface eth0"),
        (104, "vim notes-about-ark-foo.txt"),
    ]);
    let orchestrator = Orchestrator::with_process_table(config, table.clone())?;

    let report = orchestrator.stop("foo").await?;
    assert_eq!(report.terminated, vec![100, 101]);
    assert_eq!(table.terminated(), vec![100, 101]);

    let report = orchestrator.stop("idle").await?;
    assert!(report.terminated.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stop_reports_processes_it_cannot_signal() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let table = FakeProcessTable::with_refusals(
        &[
            (100, "ark-foo:drafter-peer --netns ark0"),
            (101, "sudo ark-foo:drafter-forwarder --port-forwards []"),
            (102, "ark-foo:drafter-peer --netns ark1"),
        ],
        &[(100, Errno::ESRCH), (101, Errno::EPERM)],
    );
    let orchestrator = Orchestrator::with_process_table(config, table.clone())?;

    let report = orchestrator.stop("foo").await?;
    assert_eq!(report.terminated, vec![102]);
    assert_eq!(
        report.failed.iter().map(|(pid, _)| *pid).collect::<Vec<_>>(),
        vec![100, 101]
    );
    assert!(!dir.path().join("bin/sudo.calls").exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_privileged_stop_falls_back_to_sudo_kill() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = privileged_test_config(dir.path(), "http://127.0.0.1:9")?;
    let table = FakeProcessTable::with_refusals(
        &[
            (101, "sudo ark-foo:drafter-forwarder --port-forwards []"),
            (103, "sudo ark-foo:drafter-peer --netns ark0"),
            (104, "ark-foo:drafter-peer --netns ark1"),
        ],
        &[(101, Errno::EPERM), (103, Errno::EPERM), (104, Errno::ESRCH)],
    );
    let orchestrator = Orchestrator::with_process_table(config, table.clone())?;

    let report = orchestrator.stop("foo").await?;
    assert_eq!(report.terminated, vec![101]);
    assert_eq!(
        report.failed.iter().map(|(pid, _)| *pid).collect::<Vec<_>>(),
        vec![103, 104]
    );
    assert!(table.terminated().is_empty());

    let calls = std::fs::read_to_string(dir.path().join("bin/sudo.calls"))?;
    assert_eq!(calls, "kill -TERM 101\nkill -TERM 103\n");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_status_ignores_vms_sharing_a_name_suffix() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let table = FakeProcessTable::with_entries(&[
        (300, "ark-bark-foo:drafter-peer --netns ark0"),
        (301, "ark-bark-foo:drafter-forwarder --port-forwards []"),
    ]);
    let orchestrator = Orchestrator::with_process_table(config, table)?;

    let status = orchestrator.status("foo").await?;
    assert!(!status.services.peer);
    assert!(!status.services.forwarder);

    let status = orchestrator.status("bark-foo").await?;
    assert!(status.services.peer);
    assert!(status.services.forwarder);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_status_matches_command_lines() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let table = FakeProcessTable::with_entries(&[
        (200, "sudo drafter-nat --host-interface eth0"),
        (201, "ark-foo:drafter-peer --netns ark0"),
        (202, "ark-bar:drafter-forwarder --port-forwards []"),
    ]);
    let orchestrator = Orchestrator::with_process_table(config, table.clone())?;

    let status = orchestrator.status("foo").await?;
    assert_eq!(status.name, "foo");
    assert!(status.services.nat);
    assert!(status.services.peer);
    assert!(!status.services.forwarder);
    assert!(!status.services.all_running());

    let status = orchestrator.status("bar").await?;
    assert!(!status.services.peer);
    assert!(status.services.forwarder);

    assert!(table.terminated().is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
#[serial]
async fn test_logs_of_latest_request() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    write_package(&config, "logs-demo")?;
    let orchestrator = Orchestrator::new(config)?;

    let err = orchestrator.logs("logs-demo", None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let launched = orchestrator.start("logs-demo").await?;
    wait_for_content(&launched.logs_path.join("forwarder.log"), "--port-forwards").await?;
    wait_for_content(&launched.logs_path.join("peer.log"), "--netns ark0").await?;

    let all = orchestrator.logs("logs-demo", None, None).await?;
    let forwarder_at = all.find("==> forwarder.log <==").expect("forwarder header");
    let peer_at = all.find("==> peer.log <==").expect("peer header");
    assert!(forwarder_at < peer_at);

    let peer = orchestrator.logs("logs-demo", Some("peer"), Some(1)).await?;
    assert_eq!(peer.lines().count(), 1);
    assert!(peer.contains("--netns ark0"));

    let err = orchestrator
        .logs("logs-demo", Some("../peer"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    orchestrator.stop("logs-demo").await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_missing_helpers() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), "http://127.0.0.1:9")?;
    let orchestrator = Orchestrator::with_process_table(config.clone(), FakeProcessTable::with_entries(&[]))?;
    assert!(orchestrator.missing_helpers().is_empty());

    std::fs::remove_file(config.get_binaries().get_peer())?;
    let missing = orchestrator.missing_helpers();
    assert_eq!(missing.len(), 1);
    assert_eq!(&missing[0].0, config.get_binaries().get_peer());
    Ok(())
}
