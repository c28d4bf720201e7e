use chrono::NaiveDate;

use super::*;
use crate::config::StorageConfig;
use crate::services::activity::MemoryActivitySink;
use crate::storage::connect_adapter;

struct Fixture {
    _dir: tempfile::TempDir,
    storage: Arc<dyn StorageAdapter>,
    activity: Arc<MemoryActivitySink>,
    workflow: LeaveWorkflow,
    teacher_id: i64,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leave.db");
    let storage = connect_adapter(&StorageConfig::embedded(path.to_string_lossy()))
        .await
        .unwrap();
    let teacher_id = storage
        .execute(
            "INSERT INTO teachers (nama, mapel, nip) VALUES (?, ?, ?)",
            &["Ibu Sari".into(), "Biologi".into(), "1987".into()],
        )
        .await
        .unwrap()
        .last_insert_id
        .unwrap();
    let activity = Arc::new(MemoryActivitySink::new());
    let workflow = LeaveWorkflow::new(storage.clone()).with_activity_sink(activity.clone());
    Fixture {
        _dir: dir,
        storage,
        activity,
        workflow,
        teacher_id,
    }
}

fn admin() -> Actor {
    Actor::new(1, "Admin TU")
}

fn assignment(class_name: &str, period: &str) -> NewAssignment {
    NewAssignment {
        class_id: None,
        class_name: class_name.to_string(),
        lesson_period: period.to_string(),
        subject: "Biologi".to_string(),
        substitute_teacher: "Pak Anton".to_string(),
        substitute_teacher_id: None,
        task: "Baca bab 3".to_string(),
    }
}

fn new_leave(teacher_id: i64, assignments: Vec<NewAssignment>) -> NewLeave {
    NewLeave {
        teacher_id,
        start_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
        leave_type: LeaveType::Sick,
        reason: "medical".to_string(),
        document_number: Some("001/SK/2025".to_string()),
        document_ref: None,
        assignments,
    }
}

async fn count(storage: &Arc<dyn StorageAdapter>, table: &str) -> i64 {
    storage
        .query(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .await
        .unwrap()[0]
        .get_i64("n")
        .unwrap()
}

#[tokio::test]
async fn test_submit_persists_leave_and_assignments() {
    let f = fixture().await;
    let id = f
        .workflow
        .submit(
            new_leave(f.teacher_id, vec![assignment("X-1", "1-2"), assignment("X-2", "3-4")]),
            &admin(),
        )
        .await
        .unwrap();

    let leave = f.workflow.get_leave(id).await.unwrap();
    assert_eq!(leave.status, LeaveStatus::Pending);
    assert_eq!(leave.teacher_name, "Ibu Sari");
    assert_eq!(leave.teacher_nip.as_deref(), Some("1987"));
    assert_eq!(leave.leave_type, LeaveType::Sick);
    assert_eq!(leave.start_date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
    assert_eq!(leave.document_number.as_deref(), Some("001/SK/2025"));
    assert!(leave.created_at.is_some());
    assert_eq!(leave.assignments.len(), 2);
    assert!(leave
        .assignments
        .iter()
        .all(|a| a.status == NotificationStatus::NotNotified && a.notified_at.is_none()));
    assert_eq!(f.activity.actions(), vec!["CREATE_TEACHER_LEAVE"]);
}

#[tokio::test]
async fn test_submit_validation_happens_before_storage() {
    let f = fixture().await;
    let err = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![]), &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_eq!(count(&f.storage, "teacher_leaves").await, 0);
    assert!(f.activity.entries().is_empty());
}

#[tokio::test]
async fn test_submit_for_unknown_teacher_is_not_found() {
    let f = fixture().await;
    let err = f
        .workflow
        .submit(new_leave(424242, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { entity: "teacher", id: 424242 }));
}

#[tokio::test]
async fn test_failed_child_insert_leaves_nothing_behind() {
    let f = fixture().await;
    let mut broken = assignment("X-2", "3-4");
    // No such class: the foreign key fails after the parent row is written
    broken.class_id = Some(9999);

    let err = f
        .workflow
        .submit(
            new_leave(f.teacher_id, vec![assignment("X-1", "1-2"), broken]),
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Storage(_)));
    assert_eq!(count(&f.storage, "teacher_leaves").await, 0);
    assert_eq!(count(&f.storage, "class_assignments").await, 0);
}

#[tokio::test]
async fn test_manual_mode_falls_back_on_embedded() {
    let f = fixture().await;
    let workflow =
        LeaveWorkflow::new(f.storage.clone()).with_submit_mode(SubmitMode::ManualConnection);
    let id = workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();
    assert_eq!(workflow.get_leave(id).await.unwrap().assignments.len(), 1);
}

#[tokio::test]
async fn test_approve_records_approver() {
    let f = fixture().await;
    let id = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();

    let kepsek = Actor::new(7, "Kepala Sekolah");
    f.workflow.approve(id, &kepsek, None).await.unwrap();

    let leave = f.workflow.get_leave(id).await.unwrap();
    assert_eq!(leave.status, LeaveStatus::Approved);
    assert_eq!(leave.approver_id, Some(7));
    assert_eq!(leave.approver_name.as_deref(), Some("Kepala Sekolah"));
    assert!(leave.decided_at.is_some());
    assert_eq!(leave.note, None);
}

#[tokio::test]
async fn test_reject_requires_note() {
    let f = fixture().await;
    let id = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();

    let err = f.workflow.reject(id, &admin(), "   ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_eq!(f.workflow.get_leave(id).await.unwrap().status, LeaveStatus::Pending);

    f.workflow.reject(id, &admin(), "Jadwal ujian").await.unwrap();
    let leave = f.workflow.get_leave(id).await.unwrap();
    assert_eq!(leave.status, LeaveStatus::Rejected);
    assert_eq!(leave.note.as_deref(), Some("Jadwal ujian"));
}

#[tokio::test]
async fn test_decisions_on_decided_leave_are_illegal() {
    let f = fixture().await;
    let id = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();
    f.workflow.reject(id, &admin(), "no").await.unwrap();

    let err = f.workflow.approve(id, &admin(), None).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::IllegalTransition { ref from, action: "approve", .. } if from == "rejected"
    ));
    let err = f.workflow.reject(id, &admin(), "again").await.unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalTransition { action: "reject", .. }));
}

#[tokio::test]
async fn test_decide_unknown_leave_is_not_found() {
    let f = fixture().await;
    let err = f.workflow.approve(31337, &admin(), None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { id: 31337, .. }));
}

#[tokio::test]
async fn test_decision_is_bounded_by_deadline() {
    let f = fixture().await;
    let decided = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();
    f.workflow.reject(decided, &admin(), "no").await.unwrap();
    let pending = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-2", "1-2")]), &admin())
        .await
        .unwrap();
    let bounded = LeaveWorkflow::new(f.storage.clone()).with_config(&WorkflowConfig {
        deadline_ms: Some(150),
    });

    // Unknown and decided leaves still report why, within the deadline
    assert!(matches!(
        bounded.approve(31337, &admin(), None).await,
        Err(WorkflowError::NotFound { id: 31337, .. })
    ));
    assert!(matches!(
        bounded.approve(decided, &admin(), None).await,
        Err(WorkflowError::IllegalTransition { ref from, .. }) if from == "rejected"
    ));

    // Another writer holds the database; the decision gives up at the deadline
    let blocker = f.storage.begin().await.unwrap();
    let err = bounded.approve(pending, &admin(), None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Storage(StorageError::Timeout(_))));
    blocker.rollback().await.unwrap();
}

#[tokio::test]
async fn test_notify_pending_leave_is_illegal() {
    let f = fixture().await;
    let id = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();
    let assignment_id = f.workflow.get_leave(id).await.unwrap().assignments[0].id;

    let err = f
        .workflow
        .notify_assignment(assignment_id, &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::IllegalTransition { ref from, action: "notify", .. } if from == "pending"
    ));
    let leave = f.workflow.get_leave(id).await.unwrap();
    assert_eq!(leave.status, LeaveStatus::Pending);
    assert!(!leave.assignments[0].is_notified());
}

#[tokio::test]
async fn test_notify_unknown_assignment_is_not_found() {
    let f = fixture().await;
    let err = f.workflow.notify_assignment(5, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NotFound {
            entity: "class assignment",
            id: 5
        }
    ));
}

#[tokio::test]
async fn test_notify_escalates_on_last_assignment_and_is_idempotent() {
    let f = fixture().await;
    let id = f
        .workflow
        .submit(
            new_leave(f.teacher_id, vec![assignment("X-1", "1-2"), assignment("X-2", "3-4")]),
            &admin(),
        )
        .await
        .unwrap();
    f.workflow.approve(id, &admin(), Some("ok".to_string())).await.unwrap();
    let ids: Vec<i64> = f
        .workflow
        .get_leave(id)
        .await
        .unwrap()
        .assignments
        .iter()
        .map(|a| a.id)
        .collect();

    let first = f
        .workflow
        .notify_assignment(ids[0], &Actor::new(3, "Piket"))
        .await
        .unwrap();
    assert!(!first.already_notified && !first.escalated);
    assert_eq!(f.workflow.get_leave(id).await.unwrap().status, LeaveStatus::Approved);

    let before = f.workflow.get_leave(id).await.unwrap().assignments[0].clone();
    let again = f
        .workflow
        .notify_assignment(ids[0], &Actor::new(4, "Other"))
        .await
        .unwrap();
    assert!(again.already_notified);
    let after = f.workflow.get_leave(id).await.unwrap().assignments[0].clone();
    assert_eq!(after.notified_by.as_deref(), Some("Piket"));
    assert_eq!(before.notified_at, after.notified_at);

    let last = f
        .workflow
        .notify_assignment(ids[1], &Actor::new(3, "Piket"))
        .await
        .unwrap();
    assert!(last.escalated);
    let leave = f.workflow.get_leave(id).await.unwrap();
    assert_eq!(leave.status, LeaveStatus::Notified);
    assert!(leave.all_notified());

    assert_eq!(
        f.activity.actions(),
        vec![
            "CREATE_TEACHER_LEAVE",
            "APPROVE_TEACHER_LEAVE",
            "NOTIFY_ASSIGNMENT",
            "NOTIFY_ASSIGNMENT"
        ]
    );
}

#[tokio::test]
async fn test_list_leaves_filters() {
    let f = fixture().await;
    let other_teacher = f
        .storage
        .execute(
            "INSERT INTO teachers (nama, mapel) VALUES (?, ?)",
            &["Pak Joko".into(), "Fisika".into()],
        )
        .await
        .unwrap()
        .last_insert_id
        .unwrap();

    let a = f
        .workflow
        .submit(new_leave(f.teacher_id, vec![assignment("X-1", "1-2")]), &admin())
        .await
        .unwrap();
    let b = f
        .workflow
        .submit(new_leave(other_teacher, vec![assignment("X-2", "1-2")]), &admin())
        .await
        .unwrap();
    f.workflow.approve(b, &admin(), None).await.unwrap();

    let all = f.workflow.list_leaves(LeaveFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].id, b);
    assert!(all.iter().all(|l| l.assignments.len() == 1));

    let mine = f
        .workflow
        .list_leaves(LeaveFilter::for_teacher(f.teacher_id))
        .await
        .unwrap();
    assert_eq!(mine.iter().map(|l| l.id).collect::<Vec<_>>(), vec![a]);

    let approved = f
        .workflow
        .list_leaves(LeaveFilter {
            status: Some(LeaveStatus::Approved),
            ..LeaveFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].teacher_name, "Pak Joko");
}

#[tokio::test]
async fn test_get_unknown_leave_is_not_found() {
    let f = fixture().await;
    assert!(matches!(
        f.workflow.get_leave(77).await,
        Err(WorkflowError::NotFound { id: 77, .. })
    ));
}

#[tokio::test]
async fn test_disconnected_storage_surfaces_not_connected() {
    let f = fixture().await;
    f.storage.disconnect().await;
    let err = f.workflow.get_leave(1).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotConnected));
}
