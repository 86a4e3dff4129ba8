//! View lifecycle phases.
//!
//! ```text
//! Unmounted --static render / resume--> MountedDisconnected --connect--> MountedConnected
//!     |                                                                        |
//!     +-----------------------------connect-----------------------------------+
//!                                                                              v
//!                                                                            Closed
//! ```
//!
//! A socket that recovers state from the session token starts from
//! `MountedDisconnected`; one without prior state goes straight from
//! `Unmounted` to `MountedConnected`. Only `MountedConnected` runs
//! handlers. `Closed` is terminal.

/// Where a view instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    /// Nothing has run yet.
    Unmounted,
    /// Mounted and rendered over plain HTTP; no live connection.
    MountedDisconnected,
    /// Mounted on a live socket.
    MountedConnected,
    /// The socket closed. No further handlers run.
    Closed,
}

/// What happened to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTrigger {
    /// Mount succeeded over plain HTTP, without a socket.
    StaticMount,
    /// A new socket recovered state mounted earlier, by a static render
    /// or a previous socket.
    Resume,
    /// Mount succeeded on a live socket.
    ConnectedMount,
    /// The socket closed.
    Close,
}

impl ViewPhase {
    /// The phase after `trigger`, or `None` if the transition is not
    /// allowed.
    pub const fn next(self, trigger: PhaseTrigger) -> Option<Self> {
        match (self, trigger) {
            (Self::Unmounted, PhaseTrigger::StaticMount | PhaseTrigger::Resume) => {
                Some(Self::MountedDisconnected)
            }
            (Self::Unmounted | Self::MountedDisconnected, PhaseTrigger::ConnectedMount) => {
                Some(Self::MountedConnected)
            }
            (Self::Closed, _) => None,
            (_, PhaseTrigger::Close) => Some(Self::Closed),
            _ => None,
        }
    }

    /// Whether handlers may run in this phase.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::MountedConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_render_then_connect() {
        let phase = ViewPhase::Unmounted;
        let phase = phase.next(PhaseTrigger::StaticMount);
        assert_eq!(phase, Some(ViewPhase::MountedDisconnected));
        let phase = phase.and_then(|p| p.next(PhaseTrigger::ConnectedMount));
        assert_eq!(phase, Some(ViewPhase::MountedConnected));
        assert!(phase.is_some_and(ViewPhase::is_live));
        let phase = phase.and_then(|p| p.next(PhaseTrigger::Close));
        assert_eq!(phase, Some(ViewPhase::Closed));
    }

    #[test]
    fn resumed_socket_passes_through_disconnected() {
        let phase = ViewPhase::Unmounted.next(PhaseTrigger::Resume);
        assert_eq!(phase, Some(ViewPhase::MountedDisconnected));
        assert!(!phase.is_some_and(ViewPhase::is_live));
        assert_eq!(
            phase.and_then(|p| p.next(PhaseTrigger::ConnectedMount)),
            Some(ViewPhase::MountedConnected)
        );
    }

    #[test]
    fn only_connected_phase_is_live() {
        assert!(!ViewPhase::Unmounted.is_live());
        assert!(!ViewPhase::MountedDisconnected.is_live());
        assert!(ViewPhase::MountedConnected.is_live());
        assert!(!ViewPhase::Closed.is_live());
    }

    #[test]
    fn fresh_connect_skips_disconnected() {
        assert_eq!(
            ViewPhase::Unmounted.next(PhaseTrigger::ConnectedMount),
            Some(ViewPhase::MountedConnected)
        );
    }

    #[test]
    fn closed_is_terminal() {
        for trigger in [
            PhaseTrigger::StaticMount,
            PhaseTrigger::Resume,
            PhaseTrigger::ConnectedMount,
            PhaseTrigger::Close,
        ] {
            assert_eq!(ViewPhase::Closed.next(trigger), None);
        }
    }

    #[test]
    fn cannot_mount_twice() {
        assert_eq!(ViewPhase::MountedConnected.next(PhaseTrigger::ConnectedMount), None);
        assert_eq!(ViewPhase::MountedDisconnected.next(PhaseTrigger::StaticMount), None);
        assert_eq!(ViewPhase::MountedConnected.next(PhaseTrigger::Resume), None);
    }
}
