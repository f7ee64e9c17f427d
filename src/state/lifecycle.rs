//! Inject lifecycle state machine.
//!
//! Every inject carries three flags. The lifecycle operations below are the only guarded way to
//! move between flag combinations; structural edits (adding or patching an inject) bypass it.

/// Flag combination describing where an inject stands in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectLifecycle {
    /// Released to participants at least once.
    pub is_active: bool,
    /// Participants may currently submit responses.
    pub responses_open: bool,
    /// Participants cannot advance phases on their own.
    pub phase_progression_locked: bool,
}

/// Guarded operations on an inject's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Activate the inject and open it for responses.
    Release,
    /// Open or close responses.
    SetResponsesOpen(bool),
    /// Lock or unlock phase progression.
    SetPhaseProgressionLocked(bool),
}

/// Result of applying a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// At least one flag changed.
    Changed {
        /// Flags after the event.
        next: InjectLifecycle,
        /// The inject had never been active before this event.
        first_release: bool,
    },
    /// The event left every flag as it was.
    Unchanged,
}

impl InjectLifecycle {
    /// Compute the flags produced by `event`. Every event is accepted from every state; the
    /// caller decides what an [`Transition::Unchanged`] outcome means.
    pub fn apply(self, event: LifecycleEvent) -> Transition {
        let next = match event {
            LifecycleEvent::Release => Self {
                is_active: true,
                responses_open: true,
                ..self
            },
            LifecycleEvent::SetResponsesOpen(open) => Self {
                responses_open: open,
                ..self
            },
            LifecycleEvent::SetPhaseProgressionLocked(locked) => Self {
                phase_progression_locked: locked,
                ..self
            },
        };

        if next == self {
            Transition::Unchanged
        } else {
            Transition::Changed {
                next,
                first_release: !self.is_active && next.is_active,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(transition: Transition) -> InjectLifecycle {
        match transition {
            Transition::Changed { next, .. } => next,
            Transition::Unchanged => panic!("expected a change"),
        }
    }

    #[test]
    fn initial_state_is_all_false() {
        let initial = InjectLifecycle::default();
        assert!(!initial.is_active);
        assert!(!initial.responses_open);
        assert!(!initial.phase_progression_locked);
    }

    #[test]
    fn release_activates_and_opens_responses() {
        let transition = InjectLifecycle::default().apply(LifecycleEvent::Release);
        assert_eq!(
            transition,
            Transition::Changed {
                next: InjectLifecycle {
                    is_active: true,
                    responses_open: true,
                    phase_progression_locked: false,
                },
                first_release: true,
            }
        );
    }

    #[test]
    fn repeat_release_is_unchanged() {
        let released = changed(InjectLifecycle::default().apply(LifecycleEvent::Release));
        assert_eq!(released.apply(LifecycleEvent::Release), Transition::Unchanged);
    }

    #[test]
    fn release_after_closing_responses_reopens_without_first_release() {
        let released = changed(InjectLifecycle::default().apply(LifecycleEvent::Release));
        let closed = changed(released.apply(LifecycleEvent::SetResponsesOpen(false)));

        match closed.apply(LifecycleEvent::Release) {
            Transition::Changed {
                next,
                first_release,
            } => {
                assert!(next.responses_open);
                assert!(!first_release);
            }
            Transition::Unchanged => panic!("reopening responses is a change"),
        }
    }

    #[test]
    fn toggles_only_touch_their_flag() {
        let locked = changed(
            InjectLifecycle::default().apply(LifecycleEvent::SetPhaseProgressionLocked(true)),
        );
        assert_eq!(
            locked,
            InjectLifecycle {
                is_active: false,
                responses_open: false,
                phase_progression_locked: true,
            }
        );

        let open = changed(locked.apply(LifecycleEvent::SetResponsesOpen(true)));
        assert!(!open.is_active);
        assert!(open.responses_open);
        assert!(open.phase_progression_locked);
    }

    #[test]
    fn responses_can_open_on_unreleased_inject() {
        let next = changed(InjectLifecycle::default().apply(LifecycleEvent::SetResponsesOpen(true)));
        assert!(!next.is_active);
        assert!(next.responses_open);
    }

    #[test]
    fn toggling_to_current_value_is_unchanged() {
        assert_eq!(
            InjectLifecycle::default().apply(LifecycleEvent::SetResponsesOpen(false)),
            Transition::Unchanged
        );
        assert_eq!(
            InjectLifecycle::default().apply(LifecycleEvent::SetPhaseProgressionLocked(false)),
            Transition::Unchanged
        );
    }
}
