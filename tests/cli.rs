use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

use force_layout::protocol::{GraphSnapshot, HostEvent};

#[test]
fn layout_writes_final_positions() {
    let output_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = output_dir.path().join("tree.layout.json");

    let status = Command::new(env!("CARGO_BIN_EXE_force-layout"))
        .args([
            "layout",
            "--input",
            "tests/fixtures/tree.json",
            "--output",
            output.to_str().unwrap(),
            "--seed",
            "21",
        ])
        .status()
        .expect("Failed to execute force-layout");

    assert!(status.success(), "force-layout exited with error");

    let json = fs::read_to_string(&output).expect("Failed to read layout output");
    let snapshot: GraphSnapshot = serde_json::from_str(&json).expect("Output is not a snapshot");

    assert_eq!(snapshot.graph_id, "tree");
    assert_eq!(snapshot.tick, 100);
    assert_eq!(snapshot.nodes.len(), 4);
    // The dangling fixture link is dropped; the three child edges remain
    assert_eq!(snapshot.links.len(), 3);
    assert!(
        snapshot
            .nodes
            .iter()
            .all(|node| node.x.is_finite() && node.y.is_finite())
    );
}

#[test]
fn layout_honours_config_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_force-layout"))
        .args([
            "layout",
            "--input",
            "tests/fixtures/tree.json",
            "--config",
            "tests/fixtures/layout.yaml",
        ])
        .output()
        .expect("Failed to execute force-layout");

    assert!(output.status.success());
    let snapshot: GraphSnapshot =
        serde_json::from_slice(&output.stdout).expect("stdout is not a snapshot");
    assert_eq!(snapshot.tick, 40);
}

#[test]
fn layout_reports_missing_input() {
    let output = Command::new(env!("CARGO_BIN_EXE_force-layout"))
        .args(["layout", "--input", "tests/fixtures/does-not-exist.json"])
        .output()
        .expect("Failed to execute force-layout");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does-not-exist.json"), "stderr: {stderr}");
}

#[test]
fn worker_speaks_json_lines() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_force-layout"))
        .args(["worker", "--seed", "5"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn worker");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(
            stdin,
            r#"{{"type":"updateGraph","graphId":"g1","nodes":[{{"id":"a","children":["b"]}},{{"id":"b"}}],"forces":{{"maxTicks":12}}}}"#
        )
        .unwrap();
        writeln!(stdin, "garbage").unwrap();
        writeln!(stdin).unwrap();
    }
    drop(child.stdin.take());

    let output = child.wait_with_output().expect("worker did not exit");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let ticks: Vec<u64> = stdout
        .lines()
        .map(|line| match HostEvent::from_json(line).expect("invalid event line") {
            HostEvent::GraphData(snapshot) => {
                assert_eq!(snapshot.graph_id, "g1");
                snapshot.tick
            }
        })
        .collect();
    assert_eq!(ticks, (1..=12).collect::<Vec<_>>());
}
