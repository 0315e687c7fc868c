use serde_json::Value;

use super::{
  map_event::ListenerKind,
  session::{ListenerId, MapSession, SessionId},
};

/// Where the identify interaction currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifyState {
  #[default]
  Idle,
  /// A one-shot click listener is installed on the session.
  Armed {
    session: SessionId,
    listener: ListenerId,
  },
  /// The click happened and the point query is running.
  Querying { session: SessionId },
}

/// Result of one armed click.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifyOutcome {
  Found(Value),
  NotFound,
  Error(String),
}

impl IdentifyOutcome {
  /// The first record wins.
  #[must_use]
  pub fn from_records(records: anyhow::Result<Vec<Value>>) -> Self {
    match records {
      Ok(records) => records
        .into_iter()
        .next()
        .map_or(IdentifyOutcome::NotFound, IdentifyOutcome::Found),
      Err(e) => IdentifyOutcome::Error(e.to_string()),
    }
  }
}

/// Single-shot click identification. Must be armed again after every resolution.
#[derive(Debug, Default)]
pub struct Identify {
  state: IdentifyState,
}

impl Identify {
  #[must_use]
  pub fn state(&self) -> IdentifyState {
    self.state
  }

  #[must_use]
  pub fn is_armed(&self) -> bool {
    matches!(self.state, IdentifyState::Armed { .. })
  }

  /// Installs the one-shot listener. Returns false if not idle.
  pub fn arm(&mut self, session: &mut MapSession) -> bool {
    if self.state != IdentifyState::Idle || session.is_disposed() {
      return false;
    }
    let listener = session.once(ListenerKind::Identify);
    self.state = IdentifyState::Armed {
      session: session.id(),
      listener,
    };
    true
  }

  /// Called when the one-shot listener fired. The session already removed it.
  pub fn clicked(&mut self, session: SessionId) -> bool {
    match self.state {
      IdentifyState::Armed { session: armed, .. } if armed == session => {
        self.state = IdentifyState::Querying { session };
        true
      }
      _ => false,
    }
  }

  /// Finishes the query. Returns the outcome unless the session was replaced meanwhile.
  pub fn resolve(
    &mut self,
    session: SessionId,
    records: anyhow::Result<Vec<Value>>,
  ) -> Option<IdentifyOutcome> {
    match self.state {
      IdentifyState::Querying { session: querying } if querying == session => {
        self.state = IdentifyState::Idle;
        Some(IdentifyOutcome::from_records(records))
      }
      _ => None,
    }
  }

  /// Drops any armed listener or pending query.
  pub fn reset(&mut self, session: Option<&mut MapSession>) {
    if let (IdentifyState::Armed { listener, .. }, Some(session)) = (self.state, session) {
      session.un(listener);
    }
    self.state = IdentifyState::Idle;
  }
}
