// Raffle View - Transaction flows
use tracing::{debug, error, info, warn};

use crate::abi::{self, encode_call, Token};
use crate::error::{ErrorKind, RaffleClientError, Result, UserNote};
use crate::gate::{self, FlowEvent, FlowState, GateBlock, GateDecision, GateInput};
use crate::raffle_state::{Address, Raffle};
use crate::rpc::{ChainReader, RpcTransport};
use crate::session::{TxReceipt, TxRequest, WalletConnector};
use crate::utils::{parse_units, ticket_cost};

/// Shortest raffle the factory accepts, in seconds
pub const MIN_DURATION: u64 = 10 * 60;
/// Longest raffle the factory accepts, in seconds
pub const MAX_DURATION: u64 = 365 * 24 * 60 * 60;
pub const MAX_NAME_LEN: usize = 64;

/// Emitted by the factory for each raffle it deploys, raffle address first
pub const RAFFLE_CREATED_EVENT: &str = "LotteryCreated(address,address)";

/// The raffle announced by the factory's creation event in `receipt`
pub fn created_raffle(factory: Address, receipt: &TxReceipt) -> Option<Address> {
    let topic = abi::event_topic(RAFFLE_CREATED_EVENT);
    receipt
        .logs
        .iter()
        .filter(|log| log.address == factory && log.topics.first() == Some(&topic))
        .find_map(|log| log.topics.get(1).and_then(|t| abi::decode_address(t).ok()))
}

pub fn approve(token: Address, spender: Address, amount: u128) -> TxRequest {
    TxRequest {
        to: token,
        data: encode_call(
            "approve(address,uint256)",
            &[Token::Address(spender), Token::Uint(amount)],
        ),
        value: 0,
    }
}

pub fn buy_tickets(raffle: Address, count: u64) -> TxRequest {
    TxRequest {
        to: raffle,
        data: encode_call("buyTickets(uint256)", &[Token::Uint(count as u128)]),
        value: 0,
    }
}

/// Withdraw winnings or creator proceeds
pub fn withdraw_funds(raffle: Address) -> TxRequest {
    TxRequest {
        to: raffle,
        data: encode_call("withdrawFunds()", &[]),
        value: 0,
    }
}

pub fn claim_refund(raffle: Address) -> TxRequest {
    TxRequest {
        to: raffle,
        data: encode_call("claimRefund()", &[]),
        value: 0,
    }
}

pub fn create_raffle(factory: Address, params: &CreateRaffleParams) -> TxRequest {
    TxRequest {
        to: factory,
        data: encode_call(
            "createRaffle(string,uint256,uint256,uint256,uint256,uint256)",
            &[
                Token::String(params.name.clone()),
                Token::Uint(params.ticket_price),
                Token::Uint(params.winning_pot),
                Token::Uint(params.min_tickets as u128),
                Token::Uint(params.max_tickets as u128),
                Token::Uint(params.duration_secs as u128),
            ],
        ),
        value: 0,
    }
}

/// Create-raffle form as typed by the user
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateRaffleForm {
    pub name: String,
    pub ticket_price: String,
    pub winning_pot: String,
    pub min_tickets: u64,
    /// 0 for no cap
    pub max_tickets: u64,
    pub duration_secs: u64,
}

/// Validated create-raffle arguments in token base units
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRaffleParams {
    pub name: String,
    pub ticket_price: u128,
    pub winning_pot: u128,
    pub min_tickets: u64,
    pub max_tickets: u64,
    pub duration_secs: u64,
}

impl CreateRaffleForm {
    pub fn validate(&self, decimals: u8) -> Result<CreateRaffleParams> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(RaffleClientError::InvalidInput("name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(RaffleClientError::InvalidInput(format!(
                "name is longer than {} characters",
                MAX_NAME_LEN
            )));
        }
        let ticket_price = parse_units(&self.ticket_price, decimals)?;
        if ticket_price == 0 {
            return Err(RaffleClientError::InvalidInput("ticket price must be positive".to_string()));
        }
        let winning_pot = parse_units(&self.winning_pot, decimals)?;
        if winning_pot == 0 {
            return Err(RaffleClientError::InvalidInput("prize must be positive".to_string()));
        }
        if self.max_tickets != 0 && self.min_tickets > self.max_tickets {
            return Err(RaffleClientError::InvalidInput(
                "minimum tickets exceeds the maximum".to_string(),
            ));
        }
        if !(MIN_DURATION..=MAX_DURATION).contains(&self.duration_secs) {
            return Err(RaffleClientError::InvalidInput(format!(
                "duration must be between {} and {} seconds",
                MIN_DURATION, MAX_DURATION
            )));
        }
        Ok(CreateRaffleParams {
            name: name.to_string(),
            ticket_price,
            winning_pot,
            min_tickets: self.min_tickets,
            max_tickets: self.max_tickets,
            duration_secs: self.duration_secs,
        })
    }
}

/// The user action a flow drives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowAction {
    BuyTickets { raffle: Raffle, count: u64 },
    CreateRaffle { factory: Address, params: CreateRaffleParams },
    WithdrawFunds { raffle: Address },
    ClaimRefund { raffle: Address },
}

impl FlowAction {
    /// Contract that pulls tokens, for actions that need an allowance
    fn spender(&self) -> Option<Address> {
        match self {
            FlowAction::BuyTickets { raffle, .. } => Some(raffle.id),
            FlowAction::CreateRaffle { factory, .. } => Some(*factory),
            FlowAction::WithdrawFunds { .. } | FlowAction::ClaimRefund { .. } => None,
        }
    }

    fn target(&self) -> Address {
        match self {
            FlowAction::BuyTickets { raffle, .. } => raffle.id,
            FlowAction::CreateRaffle { factory, .. } => *factory,
            FlowAction::WithdrawFunds { raffle } | FlowAction::ClaimRefund { raffle } => *raffle,
        }
    }

    fn request(&self) -> TxRequest {
        match self {
            FlowAction::BuyTickets { raffle, count } => buy_tickets(raffle.id, *count),
            FlowAction::CreateRaffle { factory, params } => create_raffle(*factory, params),
            FlowAction::WithdrawFunds { raffle } => withdraw_funds(*raffle),
            FlowAction::ClaimRefund { raffle } => claim_refund(*raffle),
        }
    }
}

/// Result of one submitted transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowOutcome {
    /// Confirmed, Rejected or Failed
    pub state: FlowState,
    pub receipt: Option<TxReceipt>,
    /// Raffle registered by a confirmed create
    pub created: Option<Address>,
    pub note: Option<UserNote>,
}

/// Drives one action through check, optional approval and submission.
/// Every terminal state is followed by a fresh check.
pub struct TransactionFlow<'a, W: WalletConnector, R: RpcTransport> {
    wallet: &'a W,
    chain: &'a ChainReader<R>,
    token: Address,
    account: Option<Address>,
    action: FlowAction,
    clock: fn() -> u64,
    state: FlowState,
    gate: Option<GateDecision>,
    claimable: Option<u128>,
}

impl<'a, W: WalletConnector, R: RpcTransport> TransactionFlow<'a, W, R> {
    pub fn new(
        wallet: &'a W,
        chain: &'a ChainReader<R>,
        token: Address,
        account: Option<Address>,
        action: FlowAction,
    ) -> Self {
        Self {
            wallet,
            chain,
            token,
            account,
            action,
            clock: crate::utils::unix_now,
            state: FlowState::Idle,
            gate: None,
            claimable: None,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn gate(&self) -> Option<GateDecision> {
        self.gate
    }

    /// Claimable amount read by the last check of a withdraw or refund flow
    pub fn claimable(&self) -> Option<u128> {
        self.claimable
    }

    pub fn action(&self) -> &FlowAction {
        &self.action
    }

    fn step(&mut self, event: FlowEvent) -> Result<()> {
        let next = self.state.apply(event)?;
        debug!(from = %self.state, to = %next, "flow transition");
        self.state = next;
        Ok(())
    }

    /// Amount the action pulls from the user
    fn cost(&self) -> Result<u128> {
        match &self.action {
            FlowAction::BuyTickets { raffle, count } => ticket_cost(raffle.ticket_price, *count),
            FlowAction::CreateRaffle { params, .. } => Ok(params.winning_pot),
            FlowAction::WithdrawFunds { .. } | FlowAction::ClaimRefund { .. } => Ok(0),
        }
    }

    async fn read_gate(&mut self, account: Address) -> Result<GateDecision> {
        let spender = match self.action.spender() {
            Some(spender) => spender,
            None => {
                let claimable = self.chain.claimable_funds(self.action.target(), account).await?;
                self.claimable = Some(claimable);
                return Ok(if claimable > 0 {
                    GateDecision {
                        enabled: true,
                        needs_approval: false,
                        block: None,
                    }
                } else {
                    GateDecision {
                        enabled: false,
                        needs_approval: false,
                        block: Some(GateBlock::ActionUnavailable),
                    }
                });
            }
        };

        let action_available = match &self.action {
            FlowAction::BuyTickets { raffle, count } => {
                gate::accepts_tickets(raffle, *count, (self.clock)())
            }
            _ => true,
        };
        let cost = self.cost()?;
        let (balance, allowance) = self
            .chain
            .balance_and_allowance(self.token, account, spender)
            .await?;
        Ok(gate::evaluate(&GateInput {
            connected: true,
            action_available,
            cost,
            balance,
            allowance,
        }))
    }

    /// Read balance, allowance or claimable funds and decide what the user
    /// may do next.
    pub async fn check(&mut self) -> Result<GateDecision> {
        if self.state.is_terminal() {
            self.step(FlowEvent::Reset)?;
        }
        self.step(FlowEvent::Check)?;

        let account = match self.account {
            Some(account) => account,
            None => {
                let decision = gate::evaluate(&GateInput::default());
                self.gate = Some(decision);
                self.step(decision.flow_event())?;
                return Ok(decision);
            }
        };

        match self.read_gate(account).await {
            Ok(decision) => {
                debug!(?decision, "gate evaluated");
                self.gate = Some(decision);
                self.step(decision.flow_event())?;
                Ok(decision)
            }
            Err(e) => {
                warn!(error = %e, "pre-check reads failed");
                self.gate = None;
                self.step(FlowEvent::Fail)?;
                Err(e)
            }
        }
    }

    /// Approve exactly the action's cost, then check again
    pub async fn approve(&mut self) -> Result<FlowOutcome> {
        if self.state != FlowState::NeedsApproval {
            return Err(gate::InvalidTransition {
                from: self.state,
                event: FlowEvent::Submit,
            }
            .into());
        }
        let spender = self
            .action
            .spender()
            .ok_or_else(|| RaffleClientError::InvalidInput("action needs no approval".to_string()))?;
        let request = approve(self.token, spender, self.cost()?);
        self.send(request).await
    }

    /// Submit the action itself, then check again
    pub async fn submit(&mut self) -> Result<FlowOutcome> {
        let enabled = self.gate.map_or(false, |g| g.enabled);
        if self.state != FlowState::Ready || !enabled {
            if let Some(GateBlock::InsufficientBalance { required, available }) =
                self.gate.and_then(|g| g.block)
            {
                return Err(RaffleClientError::Insufficient {
                    what: "balance",
                    required,
                    available,
                });
            }
            return Err(gate::InvalidTransition {
                from: self.state,
                event: FlowEvent::Submit,
            }
            .into());
        }
        let request = self.action.request();
        let mut outcome = self.send(request).await?;

        if outcome.state == FlowState::Confirmed {
            if let FlowAction::CreateRaffle { factory, .. } = &self.action {
                let logged = outcome
                    .receipt
                    .as_ref()
                    .and_then(|receipt| created_raffle(*factory, receipt));
                outcome.created = match logged {
                    Some(address) => Some(address),
                    // Another create may land first; only used without the event
                    None => {
                        debug!("no creation event in receipt, reading the registry");
                        match self.chain.latest_raffle(*factory).await {
                            Ok(created) => created,
                            Err(e) => {
                                warn!(error = %e, "could not read the new raffle address");
                                None
                            }
                        }
                    }
                };
            }
        }
        Ok(outcome)
    }

    async fn send(&mut self, request: TxRequest) -> Result<FlowOutcome> {
        self.step(FlowEvent::Submit)?;
        let target = request.to;

        let (event, receipt, note) = match self.wallet.send_and_confirm(request).await {
            Ok(receipt) if receipt.success => {
                info!(hash = %receipt.hash, to = %target, "transaction confirmed");
                (FlowEvent::Confirm, Some(receipt), None)
            }
            Ok(receipt) => {
                error!(hash = %receipt.hash, to = %target, "transaction reverted");
                let note = RaffleClientError::Reverted(receipt.hash.clone()).user_note();
                (FlowEvent::Fail, Some(receipt), Some(note))
            }
            Err(e) if e.kind() == ErrorKind::Rejected => {
                info!(to = %target, "transaction declined in wallet");
                (FlowEvent::Reject, None, Some(e.user_note()))
            }
            Err(e) => {
                error!(to = %target, error = %e, "transaction failed");
                let note = RaffleClientError::Reverted(e.to_string()).user_note();
                (FlowEvent::Fail, None, Some(note))
            }
        };
        self.step(event)?;
        let terminal = self.state;

        // Re-check; a read failure here leaves the flow in Failed for the UI
        if let Err(e) = self.check().await {
            warn!(error = %e, "re-check after transaction failed");
        }

        Ok(FlowOutcome {
            state: terminal,
            receipt,
            created: None,
            note,
        })
    }
}
