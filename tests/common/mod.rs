// In-memory indexer, chain and wallet used by the integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use raffle_view::abi::{self, selector};
use raffle_view::error::{RaffleClientError, Result};
use raffle_view::indexer::IndexerTransport;
use raffle_view::rpc::RpcTransport;
use raffle_view::session::{
    ConnectorKind, TxLog, TxReceipt, TxRequest, WalletAccount, WalletConnector,
};
use raffle_view::transactions::RAFFLE_CREATED_EVENT;
use raffle_view::{Address, ClientConfig, Raffle, RawStatus};

pub const CHAIN_ID: u64 = 31337;

pub fn addr(n: u8) -> Address {
    Address([n; 20])
}

pub fn factory() -> Address {
    addr(0xfa)
}

pub fn usdc() -> Address {
    addr(0xdc)
}

pub fn user() -> Address {
    addr(0x11)
}

pub fn config() -> ClientConfig {
    ClientConfig {
        factory: factory(),
        deployer: factory(),
        usdc_token: usdc(),
        ..ClientConfig::default()
    }
}

/// A raffle from the current factory with no settlement timestamps
pub fn raffle(id: u8, status: RawStatus, winning_pot: u128, deadline: u64) -> Raffle {
    Raffle {
        name: format!("Raffle {}", id),
        status: Some(status),
        creator: addr(0xc0),
        deployer: factory(),
        fee_recipient: addr(0xfe),
        usdc_token: usdc(),
        entropy_provider: addr(0xe0),
        winning_pot,
        ticket_price: 1_000_000,
        protocol_fee_percent: 5,
        max_tickets: 100,
        deadline,
        last_updated_timestamp: 0,
        ..Raffle::empty(addr(id))
    }
}

fn status_name(status: Option<RawStatus>) -> &'static str {
    match status {
        Some(RawStatus::FundingPending) => "FUNDING_PENDING",
        Some(RawStatus::Open) => "OPEN",
        Some(RawStatus::Drawing) => "DRAWING",
        Some(RawStatus::Completed) => "COMPLETED",
        Some(RawStatus::Canceled) => "CANCELED",
        None => "MYSTERY",
    }
}

/// A raffle the way the indexer serves it
pub fn indexed_json(r: &Raffle) -> Value {
    json!({
        "id": r.id.to_string(),
        "name": r.name,
        "status": status_name(r.status),
        "creator": r.creator.to_string(),
        "deployer": r.deployer.to_string(),
        "feeRecipient": r.fee_recipient.to_string(),
        "usdcToken": r.usdc_token.to_string(),
        "entropyProvider": r.entropy_provider.to_string(),
        "winner": r.winner.to_string(),
        "winningPot": r.winning_pot.to_string(),
        "ticketPrice": r.ticket_price.to_string(),
        "protocolFeePercent": r.protocol_fee_percent.to_string(),
        "sold": r.sold.to_string(),
        "minTickets": r.min_tickets.to_string(),
        "maxTickets": r.max_tickets.to_string(),
        "ticketRevenue": r.ticket_revenue.to_string(),
        "deadline": r.deadline.to_string(),
        "completedAt": r.completed_at.to_string(),
        "canceledAt": r.canceled_at.to_string(),
        "lastUpdatedTimestamp": r.last_updated_timestamp.to_string(),
        "paused": r.paused,
    })
}

pub fn indexer_list(raffles: &[Raffle]) -> Value {
    let list: Vec<Value> = raffles.iter().map(indexed_json).collect();
    json!({ "data": { "raffles": list } })
}

pub fn indexer_single(raffle: Option<&Raffle>) -> Value {
    json!({ "data": { "raffle": raffle.map(indexed_json) } })
}

#[derive(Clone)]
pub enum IndexerMode {
    Respond(Value),
    /// Serve the list a page at a time using the query's `first` and `skip`
    Pages(Vec<Raffle>),
    Fail(String),
    Hang,
}

pub struct FakeIndexer {
    mode: Mutex<IndexerMode>,
    pub calls: AtomicUsize,
}

impl FakeIndexer {
    pub fn new(mode: IndexerMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, mode: IndexerMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IndexerTransport for FakeIndexer {
    async fn post(&self, body: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            IndexerMode::Respond(value) => Ok(value),
            IndexerMode::Pages(raffles) => {
                let first = body["variables"]["first"].as_u64().unwrap() as usize;
                let skip = body["variables"]["skip"].as_u64().unwrap() as usize;
                let start = skip.min(raffles.len());
                let end = (skip + first).min(raffles.len());
                Ok(indexer_list(&raffles[start..end]))
            }
            IndexerMode::Fail(message) => Err(RaffleClientError::Transport(message)),
            IndexerMode::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct ChainState {
    pub registry: Vec<Address>,
    pub raffles: Vec<Raffle>,
    pub balances: HashMap<Address, u128>,
    pub allowances: HashMap<(Address, Address), u128>,
    pub claimable: HashMap<(Address, Address), u128>,
    pub down: bool,
}

const KNOWN_CALLS: [&str; 26] = [
    "getLotteriesCount()",
    "getLotteries(uint256,uint256)",
    "balanceOf(address)",
    "allowance(address,address)",
    "claimableFunds(address)",
    "ticketsOwned(address)",
    "name()",
    "status()",
    "creator()",
    "deployer()",
    "feeRecipient()",
    "usdcToken()",
    "entropyProvider()",
    "winner()",
    "winningPot()",
    "ticketPrice()",
    "protocolFeePercent()",
    "getSold()",
    "minTickets()",
    "maxTickets()",
    "ticketRevenue()",
    "deadline()",
    "completedAt()",
    "canceledAt()",
    "paused()",
    "approve(address,uint256)",
];

pub fn word_uint(value: u128) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn word_address(address: &Address) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[12..].copy_from_slice(&address.0);
    word
}

pub fn encode_string(text: &str) -> Vec<u8> {
    let mut out = word_uint(32);
    out.extend(word_uint(text.len() as u128));
    out.extend_from_slice(text.as_bytes());
    let padding = (32 - text.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

pub fn encode_address_array(list: &[Address]) -> Vec<u8> {
    let mut out = word_uint(32);
    out.extend(word_uint(list.len() as u128));
    for address in list {
        out.extend(word_address(address));
    }
    out
}

pub fn arg_uint(args: &[u8], index: usize) -> u128 {
    u128::from_be_bytes(args[index * 32 + 16..(index + 1) * 32].try_into().unwrap())
}

pub fn arg_address(args: &[u8], index: usize) -> Address {
    Address(args[index * 32 + 12..(index + 1) * 32].try_into().unwrap())
}

/// Chain backed by shared state so the wallet can apply transaction effects
#[derive(Clone, Default)]
pub struct FakeChain {
    pub state: Arc<Mutex<ChainState>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeChain {
    pub fn with_raffles(raffles: Vec<Raffle>) -> Self {
        let chain = FakeChain::default();
        {
            let mut state = chain.state.lock().unwrap();
            state.registry = raffles.iter().map(|r| r.id).collect();
            state.raffles = raffles;
        }
        chain
    }

    pub fn call_count(&self, signature: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| *s == signature).count()
    }

    pub fn set_down(&self, down: bool) {
        self.state.lock().unwrap().down = down;
    }

    fn handle_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let sel: [u8; 4] = data[..4].try_into().unwrap();
        let args = &data[4..];
        let signature = KNOWN_CALLS
            .iter()
            .find(|sig| selector(sig) == sel)
            .ok_or_else(|| RaffleClientError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
            })?;
        self.calls.lock().unwrap().push(signature.to_string());

        let state = self.state.lock().unwrap();
        let out = match *signature {
            "getLotteriesCount()" => word_uint(state.registry.len() as u128),
            "getLotteries(uint256,uint256)" => {
                let len = state.registry.len();
                let start = (arg_uint(args, 0) as usize).min(len);
                let end = (arg_uint(args, 1) as usize).min(len);
                encode_address_array(&state.registry[start..end])
            }
            "balanceOf(address)" => {
                word_uint(*state.balances.get(&arg_address(args, 0)).unwrap_or(&0))
            }
            "allowance(address,address)" => {
                let key = (arg_address(args, 0), arg_address(args, 1));
                word_uint(*state.allowances.get(&key).unwrap_or(&0))
            }
            "claimableFunds(address)" => {
                let key = (to, arg_address(args, 0));
                word_uint(*state.claimable.get(&key).unwrap_or(&0))
            }
            "ticketsOwned(address)" => word_uint(0),
            view => {
                let r = state
                    .raffles
                    .iter()
                    .find(|r| r.id == to)
                    .ok_or_else(|| RaffleClientError::Rpc {
                        code: 3,
                        message: "execution reverted".to_string(),
                    })?;
                match view {
                    "name()" => encode_string(&r.name),
                    "status()" => word_uint(r.status.map(u8::from).unwrap_or(9) as u128),
                    "creator()" => word_address(&r.creator),
                    "deployer()" => word_address(&r.deployer),
                    "feeRecipient()" => word_address(&r.fee_recipient),
                    "usdcToken()" => word_address(&r.usdc_token),
                    "entropyProvider()" => word_address(&r.entropy_provider),
                    "winner()" => word_address(&r.winner),
                    "winningPot()" => word_uint(r.winning_pot),
                    "ticketPrice()" => word_uint(r.ticket_price),
                    "protocolFeePercent()" => word_uint(r.protocol_fee_percent),
                    "getSold()" => word_uint(r.sold as u128),
                    "minTickets()" => word_uint(r.min_tickets as u128),
                    "maxTickets()" => word_uint(r.max_tickets as u128),
                    "ticketRevenue()" => word_uint(r.ticket_revenue),
                    "deadline()" => word_uint(r.deadline as u128),
                    "completedAt()" => word_uint(r.completed_at as u128),
                    "canceledAt()" => word_uint(r.canceled_at as u128),
                    "paused()" => word_uint(r.paused as u128),
                    _ => Vec::new(),
                }
            }
        };
        Ok(out)
    }
}

impl RpcTransport for FakeChain {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let down = self.state.lock().unwrap().down;
        if down {
            return Err(RaffleClientError::Transport("connection refused".to_string()));
        }
        match method {
            "eth_chainId" => Ok(json!("0x7a69")),
            "eth_call" => {
                let call = &params[0];
                let to: Address = call["to"].as_str().unwrap().parse().unwrap();
                let data = abi::from_hex(call["data"].as_str().unwrap()).unwrap();
                let out = self.handle_call(to, &data)?;
                Ok(json!(abi::to_hex(&out)))
            }
            other => Err(RaffleClientError::Rpc {
                code: -32601,
                message: format!("method {} not found", other),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletMode {
    Confirm,
    Reject,
    Revert,
}

/// Wallet that applies approve, buy and create effects to a `FakeChain`
pub struct FakeWallet {
    pub chain: FakeChain,
    pub account: Address,
    pub mode: Mutex<WalletMode>,
    pub connect_fails: Mutex<bool>,
    pub sent: Mutex<Vec<TxRequest>>,
    pub silent_connects: AtomicUsize,
    /// Whether receipts carry the factory's creation event
    pub emit_logs: Mutex<bool>,
    /// Registered right after our create, as if another user created one
    pub rival_create: Mutex<Option<Address>>,
}

pub const CREATED_RAFFLE: u8 = 0x77;

impl FakeWallet {
    pub fn new(chain: FakeChain) -> Self {
        Self {
            chain,
            account: user(),
            mode: Mutex::new(WalletMode::Confirm),
            connect_fails: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
            silent_connects: AtomicUsize::new(0),
            emit_logs: Mutex::new(true),
            rival_create: Mutex::new(None),
        }
    }

    pub fn set_mode(&self, mode: WalletMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn sent_selectors(&self) -> Vec<[u8; 4]> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|tx| tx.data[..4].try_into().unwrap())
            .collect()
    }

    fn apply(&self, tx: &TxRequest) -> Vec<TxLog> {
        let sel: [u8; 4] = tx.data[..4].try_into().unwrap();
        let args = &tx.data[4..];
        let mut state = self.chain.state.lock().unwrap();
        if sel == selector("approve(address,uint256)") {
            state
                .allowances
                .insert((self.account, arg_address(args, 0)), arg_uint(args, 1));
        } else if sel == selector("buyTickets(uint256)") {
            let raffle = tx.to;
            let price = state
                .raffles
                .iter()
                .find(|r| r.id == raffle)
                .map(|r| r.ticket_price)
                .unwrap_or(0);
            let cost = price * arg_uint(args, 0);
            *state.balances.entry(self.account).or_insert(0) -= cost;
            *state.allowances.entry((self.account, raffle)).or_insert(0) -= cost;
        } else if sel == selector("createRaffle(string,uint256,uint256,uint256,uint256,uint256)") {
            state.registry.push(addr(CREATED_RAFFLE));
            if let Some(rival) = *self.rival_create.lock().unwrap() {
                state.registry.push(rival);
            }
            if *self.emit_logs.lock().unwrap() {
                return vec![TxLog {
                    address: tx.to,
                    topics: vec![
                        abi::event_topic(RAFFLE_CREATED_EVENT),
                        word_address(&addr(CREATED_RAFFLE)).try_into().unwrap(),
                        word_address(&self.account).try_into().unwrap(),
                    ],
                    data: Vec::new(),
                }];
            }
        }
        Vec::new()
    }
}

impl WalletConnector for FakeWallet {
    async fn connect(&self, _kind: ConnectorKind, silent: bool) -> Result<WalletAccount> {
        if silent {
            self.silent_connects.fetch_add(1, Ordering::SeqCst);
        }
        if *self.connect_fails.lock().unwrap() {
            return Err(RaffleClientError::Transport("provider not found".to_string()));
        }
        if *self.mode.lock().unwrap() == WalletMode::Reject {
            return Err(RaffleClientError::UserRejected);
        }
        Ok(WalletAccount {
            address: self.account,
            chain_id: CHAIN_ID,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn send_and_confirm(&self, tx: TxRequest) -> Result<TxReceipt> {
        self.sent.lock().unwrap().push(tx.clone());
        let mode = *self.mode.lock().unwrap();
        match mode {
            WalletMode::Reject => Err(RaffleClientError::UserRejected),
            WalletMode::Revert => Ok(TxReceipt {
                hash: "0xdead".to_string(),
                success: false,
                logs: Vec::new(),
            }),
            WalletMode::Confirm => {
                let logs = self.apply(&tx);
                Ok(TxReceipt {
                    hash: "0xbeef".to_string(),
                    success: true,
                    logs,
                })
            }
        }
    }
}
