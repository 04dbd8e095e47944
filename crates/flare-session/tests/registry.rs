//! 会话目录的并发与遍历语义。

use std::{collections::HashSet, ops::ControlFlow, sync::Arc};

use flare_core::{MessageEntry, Session, SessionError, SessionId};
use flare_session::SessionRegistry;

struct StubSession(SessionId);

impl Session for StubSession {
    fn id(&self) -> SessionId {
        self.0
    }

    fn send(&self, _entry: MessageEntry) -> Result<(), SessionError> {
        Ok(())
    }

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

fn stub(raw: u64) -> Arc<dyn Session> {
    Arc::new(StubSession(SessionId::from_raw(raw)))
}

#[test]
fn get_returns_exact_session_until_removed() {
    let registry = SessionRegistry::new();
    let session = stub(1);
    registry.add(Some(Arc::clone(&session)));

    let found = registry.get(&SessionId::from_raw(1)).expect("present");
    assert!(Arc::ptr_eq(&found, &session));

    let removed = registry.remove(&SessionId::from_raw(1)).expect("removed");
    assert!(Arc::ptr_eq(&removed, &session));
    assert!(registry.get(&SessionId::from_raw(1)).is_none());
}

#[test]
fn range_visits_each_entry_once() {
    let registry = SessionRegistry::new();
    for raw in [10, 11, 12] {
        registry.insert(stub(raw));
    }

    let mut seen = Vec::new();
    registry.range(|id, session| {
        assert_eq!(*id, session.id());
        seen.push(id.as_u64());
        ControlFlow::Continue(())
    });

    seen.sort_unstable();
    assert_eq!(seen, vec![10, 11, 12]);
}

#[test]
fn range_stops_when_visitor_breaks() {
    let registry = SessionRegistry::new();
    for raw in [10, 11, 12] {
        registry.insert(stub(raw));
    }

    let mut calls = 0;
    registry.range(|_, _| {
        calls += 1;
        ControlFlow::Break(())
    });
    assert_eq!(calls, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn instance_is_created_once_under_race() {
    let handles: Vec<_> = (0..32)
        .map(|_| tokio::spawn(async { SessionRegistry::instance() }))
        .collect();

    let mut addresses = HashSet::new();
    for handle in handles {
        let registry = handle.await.expect("task");
        addresses.insert(Arc::as_ptr(&registry) as usize);
    }
    assert_eq!(addresses.len(), 1);
    assert!(Arc::ptr_eq(
        &SessionRegistry::instance(),
        &SessionRegistry::instance()
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_and_remove_stay_consistent() {
    let registry = Arc::new(SessionRegistry::new());
    let tasks: Vec<_> = (0..64u64)
        .map(|raw| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry.insert(stub(raw));
                registry.range(|_, _| ControlFlow::Continue(()));
                if raw % 2 == 0 {
                    registry.remove(&SessionId::from_raw(raw));
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task");
    }

    assert_eq!(registry.len(), 32);
    registry.range(|id, _| {
        assert_eq!(id.as_u64() % 2, 1);
        ControlFlow::Continue(())
    });
}
