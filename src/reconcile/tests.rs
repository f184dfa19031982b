use super::*;
use crate::models::{NewAlert, NewIncident};
use crate::store::{MemoryStore, StoreResult};
use chrono::TimeZone;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

fn incident(user: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> IncidentRecord {
    IncidentRecord::new(NewIncident {
        user: user.to_string(),
        window_start: start,
        window_end: end,
        score: 0.8,
        windows: vec![start, end],
    })
    .unwrap()
}

fn alert(user: &str, occurred_at: DateTime<Utc>, name: &str) -> AlertRecord {
    AlertRecord::new(NewAlert {
        user: user.to_string(),
        occurred_at,
        alert_name: name.to_string(),
        ..NewAlert::default()
    })
}

fn setup() -> (Arc<MemoryStore>, Reconciler<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Reconciler::new(store.clone());
    (store, reconciler)
}

async fn stored(store: &MemoryStore, id: &str) -> AlertRecord {
    store.find_alert_by_id(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_alert_inside_window_associates() {
    let (store, reconciler) = setup();
    let inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    let a = store.insert_alert(&alert("alice", at(1, 0), "login")).await.unwrap();

    let outcome = reconciler.reconcile_alert(&a.id).await.unwrap();
    assert_eq!(outcome, AlertOutcome::Associated(inc.id.clone()));

    let a = stored(&store, &a.id).await;
    assert!(a.is_under_incident);
    assert_eq!(a.incident_id.as_deref(), Some(inc.id.as_str()));
}

#[tokio::test]
async fn test_alert_outside_window_cleared() {
    let (store, reconciler) = setup();
    store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    let mut a = alert("alice", at(3, 0), "login");
    a.set_association(Association::to("stale"));
    store.insert_alert(&a).await.unwrap();

    assert_eq!(reconciler.reconcile_alert(&a.id).await.unwrap(), AlertOutcome::Cleared);
    let a = stored(&store, &a.id).await;
    assert!(!a.is_under_incident);
    assert!(a.incident_id.is_none());
}

#[tokio::test]
async fn test_window_bounds_are_inclusive() {
    let (store, reconciler) = setup();
    let inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    let first = store.insert_alert(&alert("alice", at(0, 0), "start")).await.unwrap();
    let last = store.insert_alert(&alert("alice", at(2, 0), "end")).await.unwrap();

    let report = reconciler.reconcile_incident(&inc.id).await.unwrap();
    assert_eq!(report.associated, 2);
    assert!(stored(&store, &first.id).await.is_under_incident);
    assert!(stored(&store, &last.id).await.is_under_incident);
}

#[tokio::test]
async fn test_other_users_untouched() {
    let (store, reconciler) = setup();
    let inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    let bob = store.insert_alert(&alert("bob", at(1, 0), "login")).await.unwrap();

    let report = reconciler.reconcile_incident(&inc.id).await.unwrap();
    assert_eq!(report.examined, 0);
    assert!(!stored(&store, &bob.id).await.is_under_incident);

    assert_eq!(reconciler.reconcile_alert(&bob.id).await.unwrap(), AlertOutcome::Unchanged);
}

#[tokio::test]
async fn test_incident_side_associates_and_clears() {
    let (store, reconciler) = setup();
    let inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();

    let inside = store.insert_alert(&alert("alice", at(1, 0), "a")).await.unwrap();
    let outside = store.insert_alert(&alert("alice", at(5, 0), "b")).await.unwrap();
    // points at this incident but no longer falls inside it
    let mut stale = alert("alice", at(6, 0), "c");
    stale.set_association(Association::to(&inc.id));
    store.insert_alert(&stale).await.unwrap();

    let report = reconciler.reconcile_incident(&inc.id).await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.associated, 1);
    assert_eq!(report.cleared, 1);

    assert!(stored(&store, &inside.id).await.is_under_incident);
    assert!(!stored(&store, &outside.id).await.is_under_incident);
    assert!(stored(&store, &stale.id).await.incident_id.is_none());
}

#[tokio::test]
async fn test_incident_reconciliation_idempotent() {
    let (store, reconciler) = setup();
    let inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    for (h, name) in [(0, "a"), (1, "b"), (2, "c"), (3, "d")] {
        store.insert_alert(&alert("alice", at(h, 0), name)).await.unwrap();
    }

    reconciler.reconcile_incident(&inc.id).await.unwrap();
    let before = store.find_alerts_by_user("alice").await.unwrap();

    let second = reconciler.reconcile_incident(&inc.id).await.unwrap();
    assert_eq!(second.associated + second.cleared, 0);
    assert_eq!(second.unchanged, 3);

    let after = store.find_alerts_by_user("alice").await.unwrap();
    let assoc = |list: &[AlertRecord]| list.iter().map(|a| a.association()).collect::<Vec<_>>();
    assert_eq!(assoc(&before), assoc(&after));
}

#[tokio::test]
async fn test_overlapping_incidents_tie_break() {
    let (store, reconciler) = setup();
    let early = store.insert_incident(&incident("alice", at(0, 0), at(3, 0))).await.unwrap();
    let a = store.insert_alert(&alert("alice", at(2, 0), "overlap")).await.unwrap();
    reconciler.reconcile_incident(&early.id).await.unwrap();

    // a later, overlapping incident does not take the alert away
    let late = store.insert_incident(&incident("alice", at(1, 0), at(4, 0))).await.unwrap();
    let report = reconciler.reconcile_incident(&late.id).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(stored(&store, &a.id).await.incident_id.as_deref(), Some(early.id.as_str()));

    // the alert-side path agrees
    assert_eq!(reconciler.reconcile_alert(&a.id).await.unwrap(), AlertOutcome::Unchanged);
}

#[test]
fn test_select_incident_prefers_earliest_start_then_end() {
    let incidents = vec![
        incident("alice", at(1, 0), at(5, 0)),
        incident("alice", at(0, 30), at(5, 0)),
        incident("alice", at(0, 30), at(3, 0)),
        incident("bob", at(0, 0), at(9, 0)),
    ];
    let picked = select_incident(&incidents, "alice", at(2, 0)).unwrap();
    assert_eq!(picked.window_start, at(0, 30));
    assert_eq!(picked.window_end, at(3, 0));

    assert!(select_incident(&incidents, "alice", at(6, 0)).is_none());
}

#[tokio::test]
async fn test_release_rehomes_alerts() {
    let (store, reconciler) = setup();
    let a_inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    let b_inc = store.insert_incident(&incident("alice", at(1, 0), at(3, 0))).await.unwrap();
    let in_both = store.insert_alert(&alert("alice", at(1, 30), "x")).await.unwrap();
    let only_a = store.insert_alert(&alert("alice", at(0, 30), "y")).await.unwrap();
    reconciler.reconcile_user("alice").await.unwrap();
    assert_eq!(stored(&store, &in_both.id).await.incident_id.as_deref(), Some(a_inc.id.as_str()));

    store.delete_incident(&a_inc.id).await.unwrap();
    let report = reconciler.release_incident("alice", &a_inc.id).await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.associated, 1);
    assert_eq!(report.cleared, 1);

    assert_eq!(stored(&store, &in_both.id).await.incident_id.as_deref(), Some(b_inc.id.as_str()));
    assert!(!stored(&store, &only_a.id).await.is_under_incident);
}

#[tokio::test]
async fn test_missing_records() {
    let (_store, reconciler) = setup();
    assert!(matches!(reconciler.reconcile_alert("nope").await, Err(ReconcileError::NotFound(_))));
    assert!(matches!(reconciler.reconcile_incident("nope").await, Err(ReconcileError::NotFound(_))));
}

/// Store that refuses association updates for chosen alerts
struct FlakyStore {
    inner: MemoryStore,
    broken: Vec<String>,
}

impl RecordStore for FlakyStore {
    async fn insert_alert(&self, alert: &AlertRecord) -> StoreResult<AlertRecord> {
        self.inner.insert_alert(alert).await
    }

    async fn insert_incident(&self, incident: &IncidentRecord) -> StoreResult<IncidentRecord> {
        self.inner.insert_incident(incident).await
    }

    async fn find_alert_by_id(&self, id: &str) -> StoreResult<Option<AlertRecord>> {
        self.inner.find_alert_by_id(id).await
    }

    async fn find_incident_by_id(&self, id: &str) -> StoreResult<Option<IncidentRecord>> {
        self.inner.find_incident_by_id(id).await
    }

    async fn find_alerts_by_user(&self, user: &str) -> StoreResult<Vec<AlertRecord>> {
        self.inner.find_alerts_by_user(user).await
    }

    async fn find_incidents_by_user(&self, user: &str) -> StoreResult<Vec<IncidentRecord>> {
        self.inner.find_incidents_by_user(user).await
    }

    async fn find_alerts_by_incident(&self, incident_id: &str) -> StoreResult<Vec<AlertRecord>> {
        self.inner.find_alerts_by_incident(incident_id).await
    }

    async fn update_alert(&self, alert: &AlertRecord) -> StoreResult<Option<AlertRecord>> {
        self.inner.update_alert(alert).await
    }

    async fn update_incident(&self, incident: &IncidentRecord) -> StoreResult<Option<IncidentRecord>> {
        self.inner.update_incident(incident).await
    }

    async fn update_alert_association(&self, id: &str, association: &Association) -> StoreResult<bool> {
        if self.broken.iter().any(|b| b == id) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.update_alert_association(id, association).await
    }

    async fn delete_alert(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_alert(id).await
    }

    async fn delete_incident(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_incident(id).await
    }
}

#[tokio::test]
async fn test_one_failing_alert_does_not_abort_the_rest() {
    let inner = MemoryStore::new();
    let inc = inner.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    let a = inner.insert_alert(&alert("alice", at(0, 10), "a")).await.unwrap();
    let b = inner.insert_alert(&alert("alice", at(0, 20), "b")).await.unwrap();
    let c = inner.insert_alert(&alert("alice", at(0, 30), "c")).await.unwrap();

    let store = Arc::new(FlakyStore { inner: inner.clone(), broken: vec![b.id.clone()] });
    let reconciler = Reconciler::new(store);

    let report = reconciler.reconcile_incident(&inc.id).await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.associated, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, b.id);

    assert!(stored(&inner, &a.id).await.is_under_incident);
    assert!(!stored(&inner, &b.id).await.is_under_incident);
    assert!(stored(&inner, &c.id).await.is_under_incident);
}

#[tokio::test]
async fn test_concurrent_runs_for_same_user_converge() {
    let (store, reconciler) = setup();
    let reconciler = Arc::new(reconciler);
    let inc = store.insert_incident(&incident("alice", at(0, 0), at(2, 0))).await.unwrap();
    for m in 0..20 {
        store.insert_alert(&alert("alice", at(1, m), &format!("a{}", m))).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let r = reconciler.clone();
        let id = inc.id.clone();
        handles.push(tokio::spawn(async move { r.reconcile_incident(&id).await.unwrap() }));
    }
    let mut associated = 0;
    for h in handles {
        associated += h.await.unwrap().associated;
    }

    // serialized: exactly one run performs the writes
    assert_eq!(associated, 20);
    let alerts = store.find_alerts_by_user("alice").await.unwrap();
    assert!(alerts.iter().all(|a| a.incident_id.as_deref() == Some(inc.id.as_str())));
}
