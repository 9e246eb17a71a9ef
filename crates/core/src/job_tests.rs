// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    pending = { JobStatus::Pending, false },
    processing = { JobStatus::Processing, false },
    completed = { JobStatus::Completed, true },
    failed = { JobStatus::Failed, true },
    cancelled = { JobStatus::Cancelled, true },
)]
fn terminal_statuses(status: JobStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[parameterized(
    claim = { JobStatus::Pending, JobStatus::Processing, true },
    cancel_pending = { JobStatus::Pending, JobStatus::Cancelled, true },
    complete = { JobStatus::Processing, JobStatus::Completed, true },
    fail = { JobStatus::Processing, JobStatus::Failed, true },
    cancel_processing = { JobStatus::Processing, JobStatus::Cancelled, true },
    skip_processing = { JobStatus::Pending, JobStatus::Completed, false },
    resurrect_cancelled = { JobStatus::Cancelled, JobStatus::Completed, false },
    resurrect_failed = { JobStatus::Failed, JobStatus::Processing, false },
    uncomplete = { JobStatus::Completed, JobStatus::Pending, false },
)]
fn monotone_transitions(from: JobStatus, to: JobStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed, "{from} -> {to}");
}

#[test]
fn status_round_trips_through_text() {
    for status in [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ] {
        assert_eq!(JobStatus::parse(&status.to_string()), Some(status));
    }
    assert_eq!(JobStatus::parse("bogus"), None);
}

#[test]
fn job_type_round_trips_unknown_kinds() {
    assert_eq!(JobType::parse("notebook"), JobType::Notebook);
    let custom = JobType::parse("mermaid");
    assert_eq!(custom, JobType::Other("mermaid".to_string()));
    assert_eq!(custom.as_str(), "mermaid");
}

#[test]
fn payload_extra_fields_survive_serialization() {
    let payload = JobPayload::new("/in/a.src", "/out/a.ipynb", "cor-1")
        .with_extra("language", serde_json::json!("en"))
        .with_extra("format", serde_json::json!("notebook"));

    let text = serde_json::to_string(&payload).unwrap();
    let back: JobPayload = serde_json::from_str(&text).unwrap();

    assert_eq!(back, payload);
    assert_eq!(back.extra["language"], serde_json::json!("en"));
}

#[test]
fn new_job_defaults() {
    let payload = JobPayload::new("/in/a.src", "/out/a.ipynb", "cor-1");
    let new = NewJob::from_payload(JobType::Notebook, "hash1", payload);
    assert_eq!(new.priority, 0);
    assert_eq!(new.max_attempts, 3);
    assert_eq!(new.input_file, PathBuf::from("/in/a.src"));

    let new = new.priority(5).max_attempts(1);
    assert_eq!(new.priority, 5);
    assert_eq!(new.max_attempts, 1);
}

#[test]
fn attempts_left_saturates() {
    let job = Job::builder().attempts(5u32).max_attempts(3u32).build();
    assert_eq!(job.attempts_left(), 0);
}
