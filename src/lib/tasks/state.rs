use super::types::State;

impl State {
    /// States reachable from `self` in one step.
    pub fn allowed_transitions(&self) -> &'static [State] {
        match self {
            State::Pending => &[State::Scheduled],
            State::Scheduled => &[State::Scheduled, State::Running, State::Failed],
            State::Running => &[State::Running, State::Completed, State::Failed],
            State::Completed => &[],
            State::Failed => &[],
        }
    }
}

pub fn valid_state_transition(src: &State, dst: &State) -> bool {
    src.allowed_transitions().contains(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_exact() {
        use State::*;
        let allowed = [
            (Pending, Scheduled),
            (Scheduled, Scheduled),
            (Scheduled, Running),
            (Scheduled, Failed),
            (Running, Running),
            (Running, Completed),
            (Running, Failed),
        ];

        for src in State::ALL {
            for dst in State::ALL {
                assert_eq!(
                    valid_state_transition(&src, &dst),
                    allowed.contains(&(src, dst)),
                    "{src} -> {dst}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for src in [State::Completed, State::Failed] {
            assert!(src.is_terminal());
            for dst in State::ALL {
                assert!(!valid_state_transition(&src, &dst));
            }
        }
    }

    #[test]
    fn pending_cannot_complete() {
        assert!(!valid_state_transition(&State::Pending, &State::Completed));
        assert!(valid_state_transition(&State::Scheduled, &State::Running));
    }
}
