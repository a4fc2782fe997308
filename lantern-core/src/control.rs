//! Remote-control arbitration.
//!
//! One node-wide state machine decides who may drive this desktop and
//! whose desktop this node is driving. Exclusivity is absolute: while
//! a control relationship exists, every further request is answered
//! with `Occupied`.
//!
//! # Transitions
//!
//! ```text
//! Idle            ──begin_request────────► Requesting
//! Requesting      ──on_granted───────────► Controlling
//! Requesting      ──on_occupied──────────► Idle
//! Idle            ──on_control_request───► BeingControlled   (reply Granted)
//! non-Idle        ──on_control_request───► unchanged         (reply Occupied)
//! Controlling     ──cancel───────────────► Idle              (send Break)
//! BeingControlled ──cancel───────────────► Idle              (send Break)
//! BeingControlled ──on_break─────────────► Idle              (echo Break)
//! Controlling     ──on_break─────────────► Idle              (close viewport)
//! any             ──on_disconnect(owner)─► Idle
//! ```
//!
//! Every state except `Idle` is bound to one specific connection, and
//! input injection is accepted from exactly that connection. Events
//! from any other peer never move the machine; they are answered
//! (`Occupied`) or ignored.

use crate::error::LanternError;
use crate::network::PeerAddr;
use crate::peers::PeerRole;

// ── State ─────────────────────────────────────────────────────────

/// Where this node stands in the control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    /// No control relationship and none pending.
    #[default]
    Idle,

    /// We asked `peer` for their desktop and await the verdict.
    Requesting { peer: PeerAddr },

    /// We drive `peer`'s desktop and render their frames.
    Controlling { peer: PeerAddr },

    /// `peer` drives our desktop; we stream frames to them.
    BeingControlled { peer: PeerAddr },
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlState::Idle => write!(f, "idle"),
            ControlState::Requesting { peer } => write!(f, "requesting({peer})"),
            ControlState::Controlling { peer } => write!(f, "controlling({peer})"),
            ControlState::BeingControlled { peer } => write!(f, "being-controlled({peer})"),
        }
    }
}

/// What to do after a `Break` arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakOutcome {
    /// We were the controlled side: stop streaming and echo the Break
    /// so the viewer closes too.
    StopStreamingAndEcho,

    /// We were the viewer: close the viewport.
    CloseViewport,

    /// Break from a bystander connection; nothing changes.
    Ignored,
}

// ── Arbitrator ────────────────────────────────────────────────────

/// The node-wide control arbiter.
///
/// Owned and mutated by the session dispatcher task only, so no lock
/// guards it.
#[derive(Debug, Default)]
pub struct ControlArbitrator {
    state: ControlState,
    allow_control: bool,
}

impl ControlArbitrator {
    pub fn new(allow_control: bool) -> Self {
        Self {
            state: ControlState::Idle,
            allow_control,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ControlState::Idle
    }

    /// Whether this node grants control requests at all.
    pub fn allow_control(&self) -> bool {
        self.allow_control
    }

    /// Flip the local "may be controlled" toggle. Affects future
    /// requests only; an active relationship is left alone.
    pub fn set_allow_control(&mut self, allow: bool) {
        self.allow_control = allow;
    }

    /// Role this node advertises in greetings.
    pub fn role(&self) -> PeerRole {
        if self.allow_control {
            PeerRole::Follower
        } else {
            PeerRole::Leader
        }
    }

    /// A peer asked to control us. Returns the reply to send.
    ///
    /// Granting requires the machine to be idle and the local toggle
    /// on; everything else answers `Occupied` (the wire has no richer
    /// refusal) and leaves the state untouched.
    pub fn on_control_request(&mut self, from: PeerAddr) -> ControlVerdict {
        match self.state {
            ControlState::Idle if self.allow_control => {
                self.state = ControlState::BeingControlled { peer: from };
                ControlVerdict::Granted
            }
            _ => ControlVerdict::Occupied,
        }
    }

    /// We ask `peer` for their desktop.
    pub fn begin_request(&mut self, peer: PeerAddr) -> Result<(), LanternError> {
        match self.state {
            ControlState::Idle => {
                self.state = ControlState::Requesting { peer };
                Ok(())
            }
            _ => Err(LanternError::ProtocolViolation(
                "control request while already engaged",
            )),
        }
    }

    /// The asked peer granted our request.
    pub fn on_granted(&mut self, from: PeerAddr) -> Result<(), LanternError> {
        match self.state {
            ControlState::Requesting { peer } if peer == from => {
                self.state = ControlState::Controlling { peer };
                Ok(())
            }
            _ => Err(LanternError::ProtocolViolation(
                "granted without a matching pending request",
            )),
        }
    }

    /// The asked peer is already taken.
    pub fn on_occupied(&mut self, from: PeerAddr) -> Result<(), LanternError> {
        match self.state {
            ControlState::Requesting { peer } if peer == from => {
                self.state = ControlState::Idle;
                Ok(())
            }
            _ => Err(LanternError::ProtocolViolation(
                "occupied without a matching pending request",
            )),
        }
    }

    /// A `Break` arrived from `from`.
    pub fn on_break(&mut self, from: PeerAddr) -> BreakOutcome {
        match self.state {
            ControlState::BeingControlled { peer } if peer == from => {
                self.state = ControlState::Idle;
                BreakOutcome::StopStreamingAndEcho
            }
            ControlState::Controlling { peer } if peer == from => {
                self.state = ControlState::Idle;
                BreakOutcome::CloseViewport
            }
            _ => BreakOutcome::Ignored,
        }
    }

    /// End the active relationship from this side, either direction.
    /// Returns the peer that must be sent a `Break`.
    pub fn cancel(&mut self) -> Result<PeerAddr, LanternError> {
        match self.state {
            ControlState::Controlling { peer } | ControlState::BeingControlled { peer } => {
                self.state = ControlState::Idle;
                Ok(peer)
            }
            _ => Err(LanternError::ProtocolViolation("no control session to cancel")),
        }
    }

    /// A connection died. Returns true when it owned the relationship,
    /// which then dissolves without any Break on the wire.
    pub fn on_disconnect(&mut self, peer: PeerAddr) -> bool {
        match self.state {
            ControlState::Requesting { peer: bound }
            | ControlState::Controlling { peer: bound }
            | ControlState::BeingControlled { peer: bound }
                if bound == peer =>
            {
                self.state = ControlState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Whether injected input from `from` may touch this desktop.
    /// True only for the exact connection that was granted control.
    pub fn accepts_input_from(&self, from: PeerAddr) -> bool {
        matches!(self.state, ControlState::BeingControlled { peer } if peer == from)
    }

    /// The peer whose frames we are viewing, if any.
    pub fn viewed_peer(&self) -> Option<PeerAddr> {
        match self.state {
            ControlState::Controlling { peer } => Some(peer),
            _ => None,
        }
    }

    /// The peer currently driving us, if any.
    pub fn controller(&self) -> Option<PeerAddr> {
        match self.state {
            ControlState::BeingControlled { peer } => Some(peer),
            _ => None,
        }
    }
}

/// Reply to a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerdict {
    Granted,
    Occupied,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn peer(last: u8, port: u16) -> PeerAddr {
        PeerAddr::new(IpAddr::from([192, 168, 1, last]), port)
    }

    #[test]
    fn grant_when_idle_and_allowed() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);

        assert_eq!(arb.on_control_request(alice), ControlVerdict::Granted);
        assert_eq!(arb.state(), ControlState::BeingControlled { peer: alice });
        assert_eq!(arb.controller(), Some(alice));
    }

    #[test]
    fn occupied_while_held() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);
        let bob = peer(3, 40002);

        assert_eq!(arb.on_control_request(alice), ControlVerdict::Granted);
        assert_eq!(arb.on_control_request(bob), ControlVerdict::Occupied);
        assert_eq!(arb.state(), ControlState::BeingControlled { peer: alice });
    }

    #[test]
    fn repeat_request_from_holder_is_occupied() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);

        arb.on_control_request(alice);
        assert_eq!(arb.on_control_request(alice), ControlVerdict::Occupied);
    }

    #[test]
    fn leader_never_grants() {
        let mut arb = ControlArbitrator::new(false);
        assert_eq!(arb.role(), PeerRole::Leader);
        assert_eq!(arb.on_control_request(peer(2, 1)), ControlVerdict::Occupied);
        assert!(arb.is_idle());
    }

    #[test]
    fn follower_role_matches_toggle() {
        let mut arb = ControlArbitrator::new(true);
        assert_eq!(arb.role(), PeerRole::Follower);
        arb.set_allow_control(false);
        assert_eq!(arb.role(), PeerRole::Leader);
    }

    #[test]
    fn request_granted_flow() {
        let mut arb = ControlArbitrator::new(true);
        let target = peer(9, 40009);

        arb.begin_request(target).unwrap();
        assert_eq!(arb.state(), ControlState::Requesting { peer: target });

        arb.on_granted(target).unwrap();
        assert_eq!(arb.state(), ControlState::Controlling { peer: target });
        assert_eq!(arb.viewed_peer(), Some(target));
    }

    #[test]
    fn request_occupied_flow() {
        let mut arb = ControlArbitrator::new(true);
        let target = peer(9, 40009);

        arb.begin_request(target).unwrap();
        arb.on_occupied(target).unwrap();
        assert!(arb.is_idle());
    }

    #[test]
    fn verdict_from_wrong_peer_is_violation() {
        let mut arb = ControlArbitrator::new(true);
        let target = peer(9, 40009);
        let stranger = peer(8, 40008);

        arb.begin_request(target).unwrap();
        assert!(arb.on_granted(stranger).is_err());
        assert!(arb.on_occupied(stranger).is_err());
        assert_eq!(arb.state(), ControlState::Requesting { peer: target });
    }

    #[test]
    fn verdict_without_request_is_violation() {
        let mut arb = ControlArbitrator::new(true);
        assert!(arb.on_granted(peer(9, 1)).is_err());
        assert!(arb.on_occupied(peer(9, 1)).is_err());
    }

    #[test]
    fn request_while_engaged_is_violation() {
        let mut arb = ControlArbitrator::new(true);
        arb.on_control_request(peer(2, 40001));
        assert!(arb.begin_request(peer(3, 40002)).is_err());
    }

    #[test]
    fn break_as_controlled_stops_and_echoes() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);

        arb.on_control_request(alice);
        assert_eq!(arb.on_break(alice), BreakOutcome::StopStreamingAndEcho);
        assert!(arb.is_idle());
    }

    #[test]
    fn break_as_viewer_closes_viewport() {
        let mut arb = ControlArbitrator::new(true);
        let target = peer(9, 40009);

        arb.begin_request(target).unwrap();
        arb.on_granted(target).unwrap();
        assert_eq!(arb.on_break(target), BreakOutcome::CloseViewport);
        assert!(arb.is_idle());
    }

    #[test]
    fn break_from_bystander_is_ignored() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);
        let stranger = peer(7, 40007);

        arb.on_control_request(alice);
        assert_eq!(arb.on_break(stranger), BreakOutcome::Ignored);
        assert_eq!(arb.state(), ControlState::BeingControlled { peer: alice });
    }

    #[test]
    fn cancel_returns_bound_peer() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);

        arb.on_control_request(alice);
        assert_eq!(arb.cancel().unwrap(), alice);
        assert!(arb.is_idle());
    }

    #[test]
    fn cancel_when_idle_is_violation() {
        let mut arb = ControlArbitrator::new(true);
        assert!(arb.cancel().is_err());
    }

    #[test]
    fn disconnect_of_owner_releases() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);

        arb.on_control_request(alice);
        assert!(arb.on_disconnect(alice));
        assert!(arb.is_idle());
    }

    #[test]
    fn disconnect_of_bystander_changes_nothing() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);

        arb.on_control_request(alice);
        assert!(!arb.on_disconnect(peer(7, 40007)));
        assert_eq!(arb.state(), ControlState::BeingControlled { peer: alice });
    }

    #[test]
    fn input_bound_to_granting_connection() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);
        let bob = peer(3, 40002);

        assert!(!arb.accepts_input_from(alice));
        arb.on_control_request(alice);
        assert!(arb.accepts_input_from(alice));
        assert!(!arb.accepts_input_from(bob));
    }

    #[test]
    fn occupied_then_break_then_grant() {
        let mut arb = ControlArbitrator::new(true);
        let alice = peer(2, 40001);
        let bob = peer(3, 40002);

        assert_eq!(arb.on_control_request(alice), ControlVerdict::Granted);
        assert_eq!(arb.on_control_request(bob), ControlVerdict::Occupied);

        assert_eq!(arb.on_break(alice), BreakOutcome::StopStreamingAndEcho);
        assert_eq!(arb.on_control_request(bob), ControlVerdict::Granted);
        assert_eq!(arb.controller(), Some(bob));
    }

    #[test]
    fn display_format() {
        let mut arb = ControlArbitrator::new(true);
        assert_eq!(arb.state().to_string(), "idle");
        arb.on_control_request(peer(2, 40001));
        assert_eq!(
            arb.state().to_string(),
            "being-controlled(192.168.1.2:40001)"
        );
    }
}
