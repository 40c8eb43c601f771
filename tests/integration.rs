use std::fs;
use std::process::Command;

use forcelayout::{
    EdgeInput, GraphInput, Layout, LayoutConfig, LayoutConfigPatch, LayoutError, LayoutEvent,
    LayoutState, NodeInput, StepBudget,
};
use serde_json::Value;

const GRAPH_JSON: &str = r#"{
    "nodes": [
        {"id": "a", "x": 0.0, "y": 0.0},
        {"id": "b", "x": 50.0, "y": 0.0},
        {"id": "c", "x": 0.0, "y": 50.0},
        {"id": "d"}
    ],
    "edges": [
        {"source": "a", "target": "b"},
        {"source": 1, "target": 2, "weight": 2.0},
        {"source": "c", "target": "d"}
    ]
}"#;

fn square() -> GraphInput {
    GraphInput::new(
        vec![
            NodeInput::new("a").at(-20.0, -20.0),
            NodeInput::new("b").at(20.0, -20.0),
            NodeInput::new("c").at(20.0, 20.0),
            NodeInput::new("d").at(-20.0, 20.0),
        ],
        vec![
            EdgeInput::new("a", "b"),
            EdgeInput::new("b", "c"),
            EdgeInput::new("c", "d"),
            EdgeInput::new("d", "a"),
        ],
    )
}

#[tokio::test]
async fn facade_runs_a_graph_to_convergence() {
    let config = LayoutConfig {
        max_steps: 200,
        steps: 25,
        ..Default::default()
    };
    let mut layout = Layout::from_config(&config).unwrap();
    let mut events = layout.subscribe();

    layout.init_data(&square(), &config).await.unwrap();
    assert_eq!(layout.state(), LayoutState::Ready);
    assert!(!layout.is_finished(config.max_steps));

    let report = layout.run_until_finished().await.unwrap();
    assert!(report.finished);
    assert_eq!(report.steps, 200);
    assert_eq!(layout.state(), LayoutState::Converged);
    assert!(layout.is_finished(config.max_steps));

    let positions = layout.node_positions().unwrap();
    assert_eq!(positions.len(), 8);
    assert!(positions.iter().all(|v| v.is_finite()));

    // The square keeps its winding: a left of b, d past b in y
    assert!(positions[0] < positions[2]);
    assert!(positions[7] > positions[3]);

    assert!(matches!(events.recv().await, Some(LayoutEvent::Started)));
    let mut completions = 0;
    loop {
        match events.recv().await {
            Some(LayoutEvent::StepComplete { positions, .. }) => {
                assert_eq!(positions.len(), 8);
                completions += 1;
            }
            Some(LayoutEvent::Finished) => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(completions, 8);

    layout.dispose();
    assert_eq!(layout.state(), LayoutState::Disposed);
    assert_eq!(
        layout.update(StepBudget::Steps(1)).await.unwrap_err(),
        LayoutError::Disposed
    );
}

#[tokio::test]
async fn options_apply_between_updates() {
    let config = LayoutConfig {
        max_steps: 50,
        ..Default::default()
    };
    let mut layout = Layout::from_config(&config).unwrap();
    layout.init_data(&square(), &config).await.unwrap();
    layout.update(StepBudget::Steps(10)).await.unwrap();

    layout
        .update_option(LayoutConfigPatch {
            lin_log_mode: Some(true),
            prevent_overlap: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert!(layout.config().lin_log_mode);

    let report = layout.update(StepBudget::Steps(10)).await.unwrap();
    assert_eq!(report.steps, 20);
    assert!(layout.node_positions().unwrap().iter().all(|v| v.is_finite()));
}

#[tokio::test]
async fn unknown_edge_endpoint_is_rejected() {
    let graph = GraphInput::new(
        vec![NodeInput::new("a"), NodeInput::new("b")],
        vec![EdgeInput::new("a", "z")],
    );
    let config = LayoutConfig::default();
    let mut layout = Layout::from_config(&config).unwrap();

    let err = layout.init_data(&graph, &config).await.unwrap_err();
    assert!(matches!(err, LayoutError::UnknownNode { edge: 0, .. }));
    assert_eq!(layout.state(), LayoutState::Uninitialized);
}

#[test]
fn cli_writes_positions_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("graph.json");
    let output = dir.path().join("positions.json");
    fs::write(&input, GRAPH_JSON).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
        .args([
            "run",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--steps",
            "100",
            "--seed",
            "3",
        ])
        .status()
        .expect("Failed to execute forcelayout");
    assert!(status.success(), "forcelayout exited with error");

    let json: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let positions = json["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 4);
    for p in positions {
        let xy = p.as_array().unwrap();
        assert_eq!(xy.len(), 2);
        assert!(xy.iter().all(|v| v.as_f64().unwrap().is_finite()));
    }
    assert_eq!(json["steps"], 100);
    assert!(json["globalSpeed"].as_f64().unwrap() >= 0.0);
}

#[test]
fn cli_seeded_runs_match() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("graph.json");
    fs::write(&input, GRAPH_JSON).unwrap();

    let run = || {
        let out = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
            .args(["run", "-i", input.to_str().unwrap(), "-s", "30", "--seed", "11"])
            .output()
            .expect("Failed to execute forcelayout");
        assert!(out.status.success());
        String::from_utf8(out.stdout).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn cli_fails_on_bad_edge() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("graph.json");
    fs::write(
        &input,
        r#"{"nodes": [{"id": "a"}], "edges": [{"source": 0, "target": 5}]}"#,
    )
    .unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
        .args(["run", "--input", input.to_str().unwrap()])
        .output()
        .expect("Failed to execute forcelayout");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("references node 5"), "stderr: {stderr}");
}
