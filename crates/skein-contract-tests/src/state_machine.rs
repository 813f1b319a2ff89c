use skein_core::NodeState;

/// P1 — monotonic state: asserts that `observed`, taken in order, is a
/// prefix of `not_started -> runnable -> running -> progressed* -> finished|failed`.
/// Panics with the offending pair on the first backward or skipped edge.
pub fn assert_monotonic_state_sequence(observed: &[NodeState]) {
    for pair in observed.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "observed state sequence took an illegal step: {:?} -> {:?} (full sequence: {:?})",
            pair[0],
            pair[1],
            observed,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_sequence_passes() {
        assert_monotonic_state_sequence(&[
            NodeState::NotStarted,
            NodeState::Runnable,
            NodeState::Running,
            NodeState::Progressed,
            NodeState::Progressed,
            NodeState::Finished,
        ]);
    }

    #[test]
    fn skipping_progressed_passes() {
        assert_monotonic_state_sequence(&[NodeState::Running, NodeState::Finished]);
    }

    #[test]
    #[should_panic]
    fn backward_step_fails() {
        assert_monotonic_state_sequence(&[NodeState::Finished, NodeState::Running]);
    }
}
