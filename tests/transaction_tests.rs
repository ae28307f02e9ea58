mod common;

use common::*;
use raffle_view::abi::selector;
use raffle_view::gate::{self, FlowEvent, FlowState, GateBlock, GateInput};
use raffle_view::rpc::ChainReader;
use raffle_view::transactions::{created_raffle, CreateRaffleForm, FlowAction, TransactionFlow};
use raffle_view::{ErrorKind, Raffle, RaffleClientError, RawStatus};

fn fixed_now() -> u64 {
    1_000
}

fn ticket_raffle() -> Raffle {
    let mut r = raffle(1, RawStatus::Open, 5_000, 10_000);
    r.ticket_price = 40;
    r
}

fn funded_chain(target: &Raffle, balance: u128, allowance: u128) -> FakeChain {
    let chain = FakeChain::with_raffles(vec![target.clone()]);
    {
        let mut state = chain.state.lock().unwrap();
        state.balances.insert(user(), balance);
        state.allowances.insert((user(), target.id), allowance);
    }
    chain
}

fn buy(target: &Raffle) -> FlowAction {
    FlowAction::BuyTickets {
        raffle: target.clone(),
        count: 2,
    }
}

// Test the approval branch: enough balance, short allowance
#[tokio::test]
async fn test_gate_needs_approval() {
    let input = GateInput {
        connected: true,
        action_available: true,
        cost: 80,
        balance: 100,
        allowance: 50,
    };
    let decision = gate::evaluate(&input);
    assert!(!decision.enabled);
    assert!(decision.needs_approval);

    let decision = gate::evaluate(&GateInput {
        allowance: 80,
        ..input
    });
    assert!(decision.enabled);
    assert!(!decision.needs_approval);
    assert_eq!(decision.block, None);
}

#[tokio::test]
async fn test_gate_blocks() {
    let base = GateInput {
        connected: true,
        action_available: true,
        cost: 80,
        balance: 100,
        allowance: 100,
    };

    let decision = gate::evaluate(&GateInput {
        connected: false,
        ..base
    });
    assert_eq!(decision.block, Some(GateBlock::NotConnected));

    let decision = gate::evaluate(&GateInput {
        action_available: false,
        ..base
    });
    assert_eq!(decision.block, Some(GateBlock::ActionUnavailable));

    let decision = gate::evaluate(&GateInput { cost: 0, ..base });
    assert_eq!(decision.block, Some(GateBlock::NothingToPay));

    // Short balance is reported before allowance, and no approval is offered
    let decision = gate::evaluate(&GateInput {
        balance: 10,
        allowance: 0,
        ..base
    });
    assert!(!decision.needs_approval);
    assert_eq!(
        decision.block,
        Some(GateBlock::InsufficientBalance {
            required: 80,
            available: 10
        })
    );
    assert_eq!(decision.block.unwrap().reason(), "Not enough balance.");
}

#[tokio::test]
async fn test_accepts_tickets() {
    let mut r = ticket_raffle();
    assert!(gate::accepts_tickets(&r, 2, 1_000));
    assert!(!gate::accepts_tickets(&r, 2, 10_001));

    r.sold = 99;
    assert!(gate::accepts_tickets(&r, 1, 1_000));
    assert!(!gate::accepts_tickets(&r, 2, 1_000));

    r.sold = 0;
    r.paused = true;
    assert!(!gate::accepts_tickets(&r, 1, 1_000));
}

#[tokio::test]
async fn test_flow_state_transitions() {
    let state = FlowState::Idle
        .apply(FlowEvent::Check)
        .and_then(|s| s.apply(FlowEvent::Checked { needs_approval: true }))
        .and_then(|s| s.apply(FlowEvent::Submit))
        .and_then(|s| s.apply(FlowEvent::Confirm))
        .unwrap();
    assert_eq!(state, FlowState::Confirmed);
    assert!(state.is_terminal());
    assert_eq!(state.apply(FlowEvent::Reset).unwrap(), FlowState::Idle);

    let blocked = FlowState::Checking.apply(FlowEvent::Block).unwrap();
    assert_eq!(blocked, FlowState::Blocked);
    assert!(blocked.apply(FlowEvent::Submit).is_err());
    assert_eq!(blocked.apply(FlowEvent::Check).unwrap(), FlowState::Checking);

    let err = FlowState::Idle.apply(FlowEvent::Submit).unwrap_err();
    assert_eq!(err.from, FlowState::Idle);
    assert_eq!(err.event, FlowEvent::Submit);
    assert!(FlowState::Submitting.apply(FlowEvent::Check).is_err());
}

// Test buying tickets: approve exactly the cost, then buy
#[tokio::test]
async fn test_buy_with_approval() {
    let target = ticket_raffle();
    let chain = funded_chain(&target, 100, 50);
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain.clone(), 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), buy(&target))
        .with_clock(fixed_now);

    let decision = flow.check().await.unwrap();
    assert!(!decision.enabled);
    assert!(decision.needs_approval);
    assert_eq!(flow.state(), FlowState::NeedsApproval);

    // Submitting before approval is refused
    assert!(flow.submit().await.is_err());

    let outcome = flow.approve().await.unwrap();
    assert_eq!(outcome.state, FlowState::Confirmed);
    assert_eq!(flow.state(), FlowState::Ready);
    assert!(flow.gate().unwrap().enabled);
    assert_eq!(
        chain.state.lock().unwrap().allowances[&(user(), target.id)],
        80
    );

    let outcome = flow.submit().await.unwrap();
    assert_eq!(outcome.state, FlowState::Confirmed);
    assert!(outcome.receipt.unwrap().success);
    assert_eq!(chain.state.lock().unwrap().balances[&user()], 20);
    assert_eq!(
        wallet.sent_selectors(),
        vec![
            selector("approve(address,uint256)"),
            selector("buyTickets(uint256)")
        ]
    );

    // The post-transaction check sees the spent balance
    assert!(!flow.gate().unwrap().enabled);
    assert_eq!(flow.state(), FlowState::Blocked);
}

// Test a declined wallet prompt is reported as canceled, not as an error
#[tokio::test]
async fn test_rejected_in_wallet() {
    let target = ticket_raffle();
    let chain = funded_chain(&target, 100, 50);
    let wallet = FakeWallet::new(chain.clone());
    wallet.set_mode(WalletMode::Reject);
    let reader = ChainReader::new(chain, 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), buy(&target))
        .with_clock(fixed_now);

    flow.check().await.unwrap();
    let outcome = flow.approve().await.unwrap();

    assert_eq!(outcome.state, FlowState::Rejected);
    let note = outcome.note.unwrap();
    assert_eq!(note.kind, ErrorKind::Rejected);
    assert_eq!(note.message, "Canceled.");
    assert_eq!(flow.state(), FlowState::NeedsApproval);
}

#[tokio::test]
async fn test_reverted_transaction() {
    let target = ticket_raffle();
    let chain = funded_chain(&target, 100, 100);
    let wallet = FakeWallet::new(chain.clone());
    wallet.set_mode(WalletMode::Revert);
    let reader = ChainReader::new(chain.clone(), 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), buy(&target))
        .with_clock(fixed_now);

    flow.check().await.unwrap();
    assert_eq!(flow.state(), FlowState::Ready);
    let outcome = flow.submit().await.unwrap();

    assert_eq!(outcome.state, FlowState::Failed);
    assert_eq!(
        outcome.note.unwrap().message,
        "Could not complete this action."
    );
    assert_eq!(chain.state.lock().unwrap().balances[&user()], 100);
    assert_eq!(flow.state(), FlowState::Ready);
}

#[tokio::test]
async fn test_insufficient_balance_blocks_submit() {
    let target = ticket_raffle();
    let chain = funded_chain(&target, 10, 1_000);
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain, 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), buy(&target))
        .with_clock(fixed_now);

    let decision = flow.check().await.unwrap();
    assert!(!decision.enabled);
    assert!(!decision.needs_approval);
    assert_eq!(flow.state(), FlowState::Blocked);

    match flow.submit().await {
        Err(RaffleClientError::Insufficient {
            required,
            available,
            ..
        }) => {
            assert_eq!(required, 80);
            assert_eq!(available, 10);
        }
        other => panic!("expected insufficient balance, got {:?}", other),
    }
    assert!(wallet.sent.lock().unwrap().is_empty());
    assert_eq!(flow.state(), FlowState::Blocked);
}

#[tokio::test]
async fn test_check_without_wallet() {
    let target = ticket_raffle();
    let chain = funded_chain(&target, 100, 100);
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain, 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), None, buy(&target));

    let decision = flow.check().await.unwrap();
    assert_eq!(decision.block, Some(GateBlock::NotConnected));
    assert_eq!(flow.state(), FlowState::Blocked);
}

// Test a failed pre-check read leaves the flow failed
#[tokio::test]
async fn test_check_read_failure() {
    let target = ticket_raffle();
    let chain = funded_chain(&target, 100, 100);
    chain.set_down(true);
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain, 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), buy(&target))
        .with_clock(fixed_now);

    let err = flow.check().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(flow.state(), FlowState::Failed);
}

#[tokio::test]
async fn test_withdraw_claimable_funds() {
    let target = raffle(1, RawStatus::Completed, 5_000, 500);
    let chain = FakeChain::with_raffles(vec![target.clone()]);
    chain
        .state
        .lock()
        .unwrap()
        .claimable
        .insert((target.id, user()), 5_000);
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain, 5, 50);
    let action = FlowAction::WithdrawFunds { raffle: target.id };
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), action);

    assert!(flow.check().await.unwrap().enabled);
    assert_eq!(flow.claimable(), Some(5_000));

    let outcome = flow.submit().await.unwrap();
    assert_eq!(outcome.state, FlowState::Confirmed);
    assert_eq!(wallet.sent_selectors(), vec![selector("withdrawFunds()")]);
}

#[tokio::test]
async fn test_refund_with_nothing_claimable() {
    let target = raffle(1, RawStatus::Canceled, 5_000, 500);
    let chain = FakeChain::with_raffles(vec![target.clone()]);
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain, 5, 50);
    let action = FlowAction::ClaimRefund { raffle: target.id };
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), action);

    let decision = flow.check().await.unwrap();
    assert_eq!(decision.block, Some(GateBlock::ActionUnavailable));
    assert_eq!(flow.state(), FlowState::Blocked);
    assert!(matches!(
        flow.submit().await,
        Err(RaffleClientError::Flow(_))
    ));
}

fn create_setup() -> (FakeChain, FlowAction) {
    let form = CreateRaffleForm {
        name: "  Weekly Pot ".to_string(),
        ticket_price: "1.5".to_string(),
        winning_pot: "100".to_string(),
        min_tickets: 10,
        max_tickets: 0,
        duration_secs: 3_600,
    };
    let params = form.validate(6).unwrap();
    assert_eq!(params.name, "Weekly Pot");
    assert_eq!(params.ticket_price, 1_500_000);
    assert_eq!(params.winning_pot, 100_000_000);

    let chain = FakeChain::with_raffles(Vec::new());
    {
        let mut state = chain.state.lock().unwrap();
        state.balances.insert(user(), 100_000_000);
        state.allowances.insert((user(), factory()), 100_000_000);
    }
    let action = FlowAction::CreateRaffle {
        factory: factory(),
        params,
    };
    (chain, action)
}

// Test creating a raffle reports the address from the factory's event
#[tokio::test]
async fn test_create_raffle() {
    let (chain, action) = create_setup();
    let wallet = FakeWallet::new(chain.clone());
    let reader = ChainReader::new(chain.clone(), 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), action);

    assert!(flow.check().await.unwrap().enabled);
    let outcome = flow.submit().await.unwrap();
    assert_eq!(outcome.state, FlowState::Confirmed);
    assert_eq!(outcome.created, Some(addr(CREATED_RAFFLE)));
    assert_eq!(
        created_raffle(factory(), outcome.receipt.as_ref().unwrap()),
        Some(addr(CREATED_RAFFLE))
    );
    assert_eq!(chain.call_count("getLotteriesCount()"), 0);
}

// Test another raffle registered right after ours does not get reported
#[tokio::test]
async fn test_create_raffle_ignores_later_registry_entry() {
    let (chain, action) = create_setup();
    let wallet = FakeWallet::new(chain.clone());
    *wallet.rival_create.lock().unwrap() = Some(addr(0x88));
    let reader = ChainReader::new(chain.clone(), 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), action);

    flow.check().await.unwrap();
    let outcome = flow.submit().await.unwrap();

    assert_eq!(reader.latest_raffle(factory()).await.unwrap(), Some(addr(0x88)));
    assert_eq!(outcome.created, Some(addr(CREATED_RAFFLE)));
}

// Test a receipt without the creation event falls back to the registry
#[tokio::test]
async fn test_create_raffle_without_event() {
    let (chain, action) = create_setup();
    let wallet = FakeWallet::new(chain.clone());
    *wallet.emit_logs.lock().unwrap() = false;
    let reader = ChainReader::new(chain.clone(), 5, 50);
    let mut flow = TransactionFlow::new(&wallet, &reader, usdc(), Some(user()), action);

    flow.check().await.unwrap();
    let outcome = flow.submit().await.unwrap();

    assert!(outcome.receipt.unwrap().logs.is_empty());
    assert_eq!(outcome.created, Some(addr(CREATED_RAFFLE)));
    assert_eq!(chain.call_count("getLotteriesCount()"), 1);
}

#[tokio::test]
async fn test_create_form_validation() {
    let valid = CreateRaffleForm {
        name: "Pot".to_string(),
        ticket_price: "1".to_string(),
        winning_pot: "10".to_string(),
        min_tickets: 1,
        max_tickets: 5,
        duration_secs: 3_600,
    };
    assert!(valid.validate(6).is_ok());

    let cases = [
        CreateRaffleForm {
            name: "   ".to_string(),
            ..valid.clone()
        },
        CreateRaffleForm {
            ticket_price: "0".to_string(),
            ..valid.clone()
        },
        CreateRaffleForm {
            winning_pot: "1.0000001".to_string(),
            ..valid.clone()
        },
        CreateRaffleForm {
            min_tickets: 6,
            ..valid.clone()
        },
        CreateRaffleForm {
            duration_secs: 60,
            ..valid.clone()
        },
    ];
    for form in cases {
        let err = form.validate(6).unwrap_err();
        assert!(matches!(err, RaffleClientError::InvalidInput(_)), "{:?}", form);
    }
}
