use crate::payload::Payload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentDecision {
    Allow,
    /// The send is vetoed, with a reason for the caller.
    Deny(String),
}

/// Hook for the consent subsystem to veto a send before anything is recorded or sent.
pub trait ConsentGate: Send + Sync {
    fn check(&self, payload: &Payload) -> ConsentDecision;
}

/// Gate used when no consent subsystem is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ConsentGate for AllowAll {
    fn check(&self, _payload: &Payload) -> ConsentDecision {
        ConsentDecision::Allow
    }
}
