use std::fmt;

/// A node's lifecycle state. Transitions only ever move forward through this
/// list; `can_transition_to` is the single place that monotonicity is
/// enforced, instead of being re-derived by hand at every call site that
/// mutates a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    NotStarted,
    Runnable,
    Running,
    Progressed,
    Finished,
    Failed,
}

impl NodeState {
    /// Whether this state is one the scheduler never leaves once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Finished | NodeState::Failed)
    }

    /// Whether an actor in this state has produced at least one byte of
    /// output (finished/failed nodes that passed through `Progressed` still
    /// count, since the transition sequence is a prefix that may have
    /// already included it — callers track that separately if they need
    /// "ever progressed" rather than "currently progressed").
    pub fn is_progressed(&self) -> bool {
        matches!(self, NodeState::Progressed)
    }

    /// Validates a proposed transition against the fixed order
    /// `NotStarted -> Runnable -> Running -> Progressed* -> Finished|Failed`.
    /// `Progressed -> Progressed` is allowed (repeated first-byte events
    /// collapse to the same state); `Running -> Finished` is allowed
    /// directly for actors that never write before completing.
    pub fn can_transition_to(&self, next: NodeState) -> bool {
        use NodeState::*;
        match (*self, next) {
            (NotStarted, Runnable) => true,
            (Runnable, Running) => true,
            (Running, Progressed) => true,
            (Running, Finished) | (Running, Failed) => true,
            (Progressed, Progressed) => true,
            (Progressed, Finished) | (Progressed, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::NotStarted => "not_started",
            NodeState::Runnable => "runnable",
            NodeState::Running => "running",
            NodeState::Progressed => "progressed",
            NodeState::Finished => "finished",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sequence_is_always_legal() {
        let sequence = [
            NodeState::NotStarted,
            NodeState::Runnable,
            NodeState::Running,
            NodeState::Progressed,
            NodeState::Progressed,
            NodeState::Finished,
        ];
        for pair in sequence.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn reverse_transitions_are_rejected() {
        assert!(!NodeState::Finished.can_transition_to(NodeState::Running));
        assert!(!NodeState::Running.can_transition_to(NodeState::NotStarted));
        assert!(!NodeState::Failed.can_transition_to(NodeState::Progressed));
    }

    #[test]
    fn running_may_skip_progressed() {
        assert!(NodeState::Running.can_transition_to(NodeState::Finished));
    }
}
