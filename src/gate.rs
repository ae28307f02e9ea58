// Raffle View - Transaction pre-checks
use std::fmt;
use thiserror::Error;

use crate::raffle_state::{Raffle, RawStatus};

/// What a pre-check reads before an action is offered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateInput {
    pub connected: bool,
    /// The target raffle (or factory) currently accepts this action
    pub action_available: bool,
    /// Amount the action will pull, in token base units
    pub cost: u128,
    pub balance: u128,
    /// Allowance granted to the spending contract
    pub allowance: u128,
}

/// Why an action button is disabled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateBlock {
    NotConnected,
    ActionUnavailable,
    NothingToPay,
    InsufficientBalance { required: u128, available: u128 },
    InsufficientAllowance { required: u128, available: u128 },
}

impl GateBlock {
    /// Inline reason shown next to the disabled button
    pub fn reason(&self) -> &'static str {
        match self {
            GateBlock::NotConnected => "Connect a wallet to continue.",
            GateBlock::ActionUnavailable => "This raffle is not accepting that right now.",
            GateBlock::NothingToPay => "Choose at least one ticket.",
            GateBlock::InsufficientBalance { .. } => "Not enough balance.",
            GateBlock::InsufficientAllowance { .. } => "Approve spending first.",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateDecision {
    pub enabled: bool,
    /// An approve transaction must confirm before the action unlocks
    pub needs_approval: bool,
    pub block: Option<GateBlock>,
}

impl GateDecision {
    /// Flow event a check with this outcome produces
    pub fn flow_event(&self) -> FlowEvent {
        if self.needs_approval {
            FlowEvent::Checked {
                needs_approval: true,
            }
        } else if self.enabled {
            FlowEvent::Checked {
                needs_approval: false,
            }
        } else {
            FlowEvent::Block
        }
    }

    fn blocked(block: GateBlock) -> Self {
        Self {
            enabled: false,
            needs_approval: false,
            block: Some(block),
        }
    }
}

pub fn evaluate(input: &GateInput) -> GateDecision {
    if !input.connected {
        return GateDecision::blocked(GateBlock::NotConnected);
    }
    if !input.action_available {
        return GateDecision::blocked(GateBlock::ActionUnavailable);
    }
    if input.cost == 0 {
        return GateDecision::blocked(GateBlock::NothingToPay);
    }
    if input.balance < input.cost {
        return GateDecision::blocked(GateBlock::InsufficientBalance {
            required: input.cost,
            available: input.balance,
        });
    }
    if input.allowance < input.cost {
        return GateDecision {
            enabled: false,
            needs_approval: true,
            block: Some(GateBlock::InsufficientAllowance {
                required: input.cost,
                available: input.allowance,
            }),
        };
    }
    GateDecision {
        enabled: true,
        needs_approval: false,
        block: None,
    }
}

/// Whether `raffle` can sell `count` more tickets at `now`
pub fn accepts_tickets(raffle: &Raffle, count: u64, now: u64) -> bool {
    raffle.status == Some(RawStatus::Open)
        && !raffle.paused
        && !raffle.has_deadline_passed(now)
        && raffle.remaining_tickets().map_or(true, |left| count <= left)
}

/// Steps of a single transaction flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Checking,
    NeedsApproval,
    Ready,
    /// Checked, but the gate keeps the action disabled
    Blocked,
    Submitting,
    Confirmed,
    Rejected,
    Failed,
}

impl FlowState {
    /// Confirmed, rejected and failed flows refresh and return to idle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Confirmed | FlowState::Rejected | FlowState::Failed
        )
    }

    pub fn apply(self, event: FlowEvent) -> Result<FlowState, InvalidTransition> {
        use FlowEvent::*;
        use FlowState::*;

        let next = match (self, event) {
            (Idle, Check) | (NeedsApproval, Check) | (Ready, Check) | (Blocked, Check) => {
                Checking
            }
            (Checking, Checked { needs_approval: true }) => NeedsApproval,
            (Checking, Checked { needs_approval: false }) => Ready,
            (Checking, Block) => Blocked,
            (Checking, Fail) => Failed,
            (NeedsApproval, Submit) | (Ready, Submit) => Submitting,
            (Submitting, Confirm) => Confirmed,
            (Submitting, Reject) => Rejected,
            (Submitting, Fail) => Failed,
            (Confirmed, Reset) | (Rejected, Reset) | (Failed, Reset) => Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    Check,
    Checked { needs_approval: bool },
    /// The check found the action disabled with no approval to offer
    Block,
    Submit,
    Confirm,
    Reject,
    Fail,
    Reset,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot apply {event:?} while {from}")]
pub struct InvalidTransition {
    pub from: FlowState,
    pub event: FlowEvent,
}
