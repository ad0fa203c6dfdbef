//! Mutable per-run bookkeeping shared by the match engine and the effects.

use crate::config::ActionId;
use crate::template::Vars;
use std::collections::{HashMap, HashSet};

/// Variables, oneshot suppression and match de-duplication for one session.
#[derive(Debug, Default)]
pub struct SessionState {
    vars: Vars,
    fired_once: HashSet<ActionId>,
    last_match: HashMap<ActionId, u64>,
}

impl SessionState {
    pub fn with_vars(vars: Vars) -> Self {
        SessionState {
            vars,
            ..Default::default()
        }
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    /// Bind or overwrite a variable. Variables are never removed.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        tracing::info!("Set arg {}={}", name, value);
        self.vars.insert(name, value);
    }

    pub fn has_fired(&self, id: ActionId) -> bool {
        self.fired_once.contains(&id)
    }

    pub fn mark_fired(&mut self, id: ActionId) {
        tracing::info!("Oneshot action #{} fired", id.0);
        self.fired_once.insert(id);
    }

    pub fn reset_oneshots(&mut self) {
        tracing::info!("Reset oneshots");
        self.fired_once.clear();
    }

    pub fn last_match(&self, id: ActionId) -> Option<u64> {
        self.last_match.get(&id).copied()
    }

    /// Record a match at absolute `offset`.
    ///
    /// Only a match past the action's previous one counts. A regex can report
    /// an earlier start once a longer alternative completes in a later chunk;
    /// such a match returns `false` and the recorded offset stays put, so the
    /// offsets never decrease.
    pub fn record_match(&mut self, id: ActionId, offset: u64) -> bool {
        match self.last_match.get(&id) {
            Some(&previous) if offset <= previous => false,
            _ => {
                self.last_match.insert(id, offset);
                true
            }
        }
    }
}
