// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn worker_env_carries_the_full_contract() {
    let spec = StartSpec {
        worker_type: "notebook".to_string(),
        index: 0,
        worker_id: 42,
        db_path: "/ws/jobs.db".into(),
        workspace_path: "/ws".into(),
        log_level: "info".to_string(),
        parent_pid: 1234,
    };
    let env = worker_env(&spec);
    let get = |k: &str| {
        env.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str()).unwrap_or_default()
    };
    assert_eq!(get("WORKER_ID"), "42");
    assert_eq!(get("WORKER_TYPE"), "notebook");
    assert_eq!(get("DB_PATH"), "/ws/jobs.db");
    assert_eq!(get("WORKSPACE_PATH"), "/ws");
    assert_eq!(get("LOG_LEVEL"), "info");
    assert_eq!(get("PARENT_PID"), "1234");
}
