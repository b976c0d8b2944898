use crate::state::BackendState;
use depsweep_protocol::{ConsoleResponse, PackageName, StatusMap, Version};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Connected operator sessions and their outgoing queues.
///
/// Sessions start unauthenticated: they receive nothing until a successful
/// login, which also delivers the full snapshot. Send failures mean the
/// client went away; the session is pruned and the message dropped
/// silently.
#[derive(Default)]
pub struct ClientRegistry {
    sessions: HashMap<Uuid, Session>,
}

struct Session {
    sender: mpsc::UnboundedSender<ConsoleResponse>,
    authenticated: bool,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, session: Uuid, sender: mpsc::UnboundedSender<ConsoleResponse>) {
        self.sessions.insert(
            session,
            Session {
                sender,
                authenticated: false,
            },
        );
        log::info!("console session {session} connected ({} total)", self.sessions.len());
    }

    pub fn disconnect(&mut self, session: Uuid) {
        if self.sessions.remove(&session).is_some() {
            log::info!("console session {session} disconnected");
        }
    }

    pub fn is_authenticated(&self, session: Uuid) -> bool {
        self.sessions
            .get(&session)
            .is_some_and(|s| s.authenticated)
    }

    /// Mark a session logged in and hand it the full snapshot.
    pub fn authenticate(
        &mut self,
        session: Uuid,
        state: &BackendState,
        ignore_list: &[PackageName],
    ) {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return;
        };
        entry.authenticated = true;
        let first = ConsoleResponse::FirstUpdate {
            snapshot: snapshot(state),
            ignore_list: ignore_list.to_vec(),
        };
        if entry.sender.send(first).is_err() {
            self.sessions.remove(&session);
        }
    }

    /// Push one record's status delta to every authenticated session.
    pub fn broadcast_record(
        &mut self,
        state: &BackendState,
        name: &PackageName,
        version: Version,
    ) {
        let Some(status) = state
            .cache
            .get(name, version)
            .and_then(|record| record.project(version))
        else {
            return;
        };
        let mut delta = StatusMap::new();
        delta.insert(name.clone(), vec![status]);
        self.send_to_authenticated(ConsoleResponse::Updates { delta });
    }

    /// Push deltas for a batch of records, grouped per package.
    pub fn broadcast_records(
        &mut self,
        state: &BackendState,
        records: &[(PackageName, Version)],
    ) {
        let mut delta = StatusMap::new();
        for (name, version) in records {
            let Some(status) = state
                .cache
                .get(name, *version)
                .and_then(|record| record.project(*version))
            else {
                continue;
            };
            delta.entry(name.clone()).or_default().push(status);
        }
        if !delta.is_empty() {
            self.send_to_authenticated(ConsoleResponse::Updates { delta });
        }
    }

    /// Re-send the (possibly empty) snapshot to every authenticated
    /// session, e.g. after a backend reset.
    pub fn broadcast_snapshot(&mut self, state: &BackendState, ignore_list: &[PackageName]) {
        let snapshot = snapshot(state);
        let sessions: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.authenticated)
            .map(|(id, _)| *id)
            .collect();
        for id in sessions {
            let message = ConsoleResponse::FirstUpdate {
                snapshot: snapshot.clone(),
                ignore_list: ignore_list.to_vec(),
            };
            if self
                .sessions
                .get(&id)
                .is_some_and(|s| s.sender.send(message).is_err())
            {
                self.sessions.remove(&id);
            }
        }
    }

    fn send_to_authenticated(&mut self, message: ConsoleResponse) {
        let dead: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.authenticated)
            .filter(|(_, session)| session.sender.send(message.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.sessions.remove(&id);
        }
    }
}

/// Project the whole cache for a newly authenticated client. `Pending`
/// records are invisible by design.
pub fn snapshot(state: &BackendState) -> StatusMap {
    let mut map = StatusMap::new();
    for (name, versions) in state.cache.iter() {
        let rows: Vec<_> = versions
            .iter()
            .filter_map(|(version, record)| record.project(*version))
            .collect();
        if !rows.is_empty() {
            map.insert(name.clone(), rows);
        }
    }
    map
}
