#![cfg(unix)]

use std::sync::Arc;

use cairn_lib::detect::DetectError;
use cairn_lib::files;
use cairn_lib::log::RecordingLogger;
use cairn_lib::module::GroupElement;

use super::common::{self, Workspace};

const PROVIDE_NODE: &str = "printf '[[provides]]\\nname = \"node\"\\n' > \"$2\"";
const REQUIRE_NODE: &str = "printf '[[requires]]\\nname = \"node\"\\n[requires.metadata]\\nlaunch = true\\n' > \"$2\"";

const TWO_GROUPS: &str = r#"
[[order]]
[[order.group]]
id = "python"
version = "1.0"

[[order.group]]
id = "app"
version = "1.0"

[[order]]
[[order.group]]
id = "node"
version = "1.0"

[[order.group]]
id = "app"
version = "1.0"
"#;

#[tokio::test]
async fn first_passing_group_is_written() {
  let ws = Workspace::new();
  ws.buildpack("python", "1.0", "0.10", "exit 100");
  ws.buildpack("node", "1.0", "0.10", PROVIDE_NODE);
  ws.buildpack("app", "1.0", "0.9", REQUIRE_NODE);
  let logger = Arc::new(RecordingLogger::default());

  let outcome = ws.detector(&ws.order(TWO_GROUPS), logger.clone()).detect().await.unwrap();

  assert_eq!(
    outcome.group.group,
    vec![
      GroupElement::new("node", "1.0").with_api("0.10"),
      GroupElement::new("app", "1.0").with_api("0.9"),
    ]
  );
  assert_eq!(outcome.plan.entries.len(), 1);
  assert_eq!(outcome.plan.entries[0].providers, vec![GroupElement::new("node", "1.0")]);
  assert_eq!(outcome.plan.entries[0].requires[0].metadata.get("launch"), Some(&toml::Value::Boolean(true)));

  let logs = logger.all_logs();
  assert!(logs.contains("fail: python@1.0\n"), "{logs}");
  assert!(logs.ends_with("node 1.0\napp  1.0\n"), "{logs}");

  let group_path = ws.path("layers").join("group.toml");
  let plan_path = ws.path("layers").join("plan.toml");
  files::write_group(&group_path, &outcome.group).unwrap();
  files::write_plan(&plan_path, &outcome.plan).unwrap();
  assert_eq!(files::read_group(&group_path).unwrap(), outcome.group);
  assert_eq!(files::read_plan(&plan_path).unwrap(), outcome.plan);
}

#[tokio::test]
async fn probe_sees_lifecycle_environment() {
  let ws = Workspace::new();
  let root = ws.buildpack(
    "env",
    "1.0",
    "0.10",
    r#"[ "$CNB_BUILDPACK_DIR" = "$(dirname "$(dirname "$0")")" ] || exit 1
[ -n "$CNB_BUILD_PLAN_PATH" ] || exit 1
[ "$(pwd)" = "$EXPECTED_APP" ] || exit 1
echo "detected in $(basename "$(pwd)")""#,
  );
  common::write(&ws.path("platform/env/EXPECTED_APP"), &ws.path("app").display().to_string());
  let order = ws.order("[[order]]\n[[order.group]]\nid = \"env\"\nversion = \"1.0\"\n");
  let logger = Arc::new(RecordingLogger::default());

  let outcome = ws.detector(&order, logger.clone()).detect().await;

  assert!(outcome.is_ok(), "{}", logger.all_logs());
  assert!(root.join("bin/detect").exists());
}

#[tokio::test]
async fn failing_probe_output_is_logged_and_stops_detection() {
  let ws = Workspace::new();
  ws.buildpack("broken", "1.0", "0.10", "echo 'cannot read app'\nexit 3");
  ws.buildpack("node", "1.0", "0.10", PROVIDE_NODE);
  let order = ws.order(
    "[[order]]\n[[order.group]]\nid = \"broken\"\nversion = \"1.0\"\n\n[[order]]\n[[order.group]]\nid = \"node\"\nversion = \"1.0\"\n",
  );
  let logger = Arc::new(RecordingLogger::default());
  let detector = ws.detector(&order, logger.clone());

  let err = detector.detect().await.unwrap_err();

  assert!(matches!(err, DetectError::Buildpack));
  assert_eq!(err.exit_code(), 21);
  let logs = logger.all_logs();
  assert!(logs.contains("cannot read app"), "{logs}");
  assert!(logs.contains("err:  broken@1.0 (3)"), "{logs}");
  assert!(!detector.runs().contains("Buildpack node@1.0"));
}

#[tokio::test]
async fn unresolved_requirement_fails_detection() {
  let ws = Workspace::new();
  ws.buildpack("app", "1.0", "0.10", REQUIRE_NODE);
  let order = ws.order("[[order]]\n[[order.group]]\nid = \"app\"\nversion = \"1.0\"\n");

  let err = ws
    .detector(&order, Arc::new(RecordingLogger::default()))
    .detect()
    .await
    .unwrap_err();

  assert!(err.is_failed_detection());
  assert_eq!(err.exit_code(), 20);
}
