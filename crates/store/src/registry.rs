//! In-memory session registry.
//!
//! Source of truth for session validity checks. Sessions are created by
//! `start`, read by every other handler, and never removed while the
//! process lives. The registry can be rehydrated from the start table at
//! boot so sessions survive a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::event::EventKind;
use crate::tabular::TabularStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub employee_id: String,
    pub start_time: String,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its fresh opaque identifier.
    pub fn create(&self, employee_id: &str, start_time: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            employee_id: employee_id.to_string(),
            start_time: start_time.to_string(),
        };
        self.sessions
            .write()
            .unwrap()
            .insert(session_id.clone(), session);
        session_id
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().unwrap().contains_key(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the current session map, for the debug dump surface.
    pub fn snapshot(&self) -> HashMap<String, Session> {
        self.sessions.read().unwrap().clone()
    }

    /// Replays the start table into the registry. Returns how many sessions
    /// were loaded. Rows without a session id are skipped.
    pub fn rehydrate(&self, store: &TabularStore) -> StoreResult<usize> {
        let doc = store.dump()?;
        let Some(table) = doc.tables.get(EventKind::Start.table()) else {
            return Ok(0);
        };

        let column = |name: &str| table.header.iter().position(|c| c == name);
        let (Some(sid_col), Some(emp_col), Some(ts_col)) = (
            column("session_id"),
            column("employee_id"),
            column("timestamp"),
        ) else {
            return Ok(0);
        };

        let cell_str = |row: &[Value], idx: usize| -> Option<String> {
            row.get(idx).and_then(Value::as_str).map(str::to_string)
        };

        let mut loaded = 0;
        let mut sessions = self.sessions.write().unwrap();
        for row in &table.rows {
            let Some(session_id) = cell_str(row, sid_col) else {
                continue;
            };
            let session = Session {
                employee_id: cell_str(row, emp_col).unwrap_or_default(),
                start_time: cell_str(row, ts_col).unwrap_or_default(),
            };
            sessions.entry(session_id).or_insert(session);
            loaded += 1;
        }
        Ok(loaded)
    }
}
