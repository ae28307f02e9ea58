// Raffle View - On-chain reads over JSON-RPC
use futures::future::{join_all, try_join_all};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::TryFrom;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::abi::{self, Token};
use crate::error::{RaffleClientError, Result};
use crate::raffle_state::{Address, Raffle, RawStatus};

/// Sends one JSON-RPC request and yields its `result` member
pub trait RpcTransport: Send + Sync {
    fn request(&self, method: &str, params: Value) -> impl Future<Output = Result<Value>> + Send;
}

impl<T: RpcTransport> RpcTransport for Arc<T> {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.as_ref().request(method, params).await
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Build a JSON-RPC 2.0 request body
pub fn rpc_request_body(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Unwrap a JSON-RPC response envelope
pub fn parse_rpc_response(body: Value) -> Result<Value> {
    let response: RpcResponse = serde_json::from_value(body)
        .map_err(|e| RaffleClientError::Transport(format!("malformed RPC response: {}", e)))?;
    if let Some(error) = response.error {
        return Err(RaffleClientError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| RaffleClientError::Transport("RPC response has no result".to_string()))
}

/// Registry accessors on the raffle factory
const REGISTRY_COUNT: &str = "getLotteriesCount()";
const REGISTRY_PAGE: &str = "getLotteries(uint256,uint256)";

const NO_ARGS: &[Token] = &[];

/// View functions read from every raffle contract, in record order
const RAFFLE_VIEWS: [&str; 19] = [
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
];

pub struct ChainReader<T: RpcTransport> {
    transport: T,
    batch_size: usize,
    page_size: u64,
}

impl<T: RpcTransport> ChainReader<T> {
    pub fn new(transport: T, batch_size: usize, page_size: u64) -> Self {
        Self {
            transport,
            batch_size: batch_size.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let value = self.transport.request("eth_chainId", json!([])).await?;
        let text = value
            .as_str()
            .ok_or_else(|| RaffleClientError::Decode("eth_chainId result is not a string".to_string()))?;
        u64::from_str_radix(text.trim_start_matches("0x"), 16)
            .map_err(|e| RaffleClientError::Decode(format!("bad chain id {:?}: {}", text, e)))
    }

    /// `eth_call` against the latest block
    pub async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let params = json!([{ "to": to.to_string(), "data": abi::to_hex(&data) }, "latest"]);
        let value = self.transport.request("eth_call", params).await?;
        let text = value
            .as_str()
            .ok_or_else(|| RaffleClientError::Decode("eth_call result is not a string".to_string()))?;
        abi::from_hex(text)
    }

    pub async fn call(&self, to: Address, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        self.eth_call(to, abi::encode_call(signature, args)).await
    }

    pub async fn raffle_count(&self, factory: Address) -> Result<u64> {
        let data = self.call(factory, REGISTRY_COUNT, NO_ARGS).await?;
        abi::decode_u64(&data)
    }

    /// Every raffle address the factory has registered, read page by page
    pub async fn raffle_addresses(&self, factory: Address) -> Result<Vec<Address>> {
        let count = self.raffle_count(factory).await?;
        let mut addresses = Vec::with_capacity(count.min(4096) as usize);
        let mut start = 0u64;
        while start < count {
            let end = start.saturating_add(self.page_size).min(count);
            let data = self
                .call(
                    factory,
                    REGISTRY_PAGE,
                    &[Token::Uint(start as u128), Token::Uint(end as u128)],
                )
                .await?;
            let page = abi::decode_address_array(&data)?;
            debug!(start, end, returned = page.len(), "read registry page");
            if page.is_empty() {
                break;
            }
            addresses.extend(page);
            start = end;
        }
        Ok(addresses)
    }

    /// The most recently registered raffle, if any
    pub async fn latest_raffle(&self, factory: Address) -> Result<Option<Address>> {
        let count = self.raffle_count(factory).await?;
        if count == 0 {
            return Ok(None);
        }
        let data = self
            .call(
                factory,
                REGISTRY_PAGE,
                &[Token::Uint((count - 1) as u128), Token::Uint(count as u128)],
            )
            .await?;
        Ok(abi::decode_address_array(&data)?.pop())
    }

    /// Read the fixed view set of one raffle, all calls in flight together
    pub async fn read_raffle(&self, address: Address) -> Result<Raffle> {
        let calls: Vec<_> = RAFFLE_VIEWS
            .iter()
            .copied()
            .map(|sig| self.call(address, sig, NO_ARGS))
            .collect();
        let results = try_join_all(calls).await?;
        let [
            name,
            status,
            creator,
            deployer,
            fee_recipient,
            usdc_token,
            entropy_provider,
            winner,
            winning_pot,
            ticket_price,
            protocol_fee_percent,
            sold,
            min_tickets,
            max_tickets,
            ticket_revenue,
            deadline,
            completed_at,
            canceled_at,
            paused,
        ] = <[Vec<u8>; 19]>::try_from(results)
            .map_err(|_| RaffleClientError::Decode("missing view results".to_string()))?;

        let status = match abi::decode_uint(&status)
            .and_then(|v| u8::try_from(v).map_err(|_| RaffleClientError::Decode(format!("status {}", v))))
            .and_then(RawStatus::try_from)
        {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(raffle = %address, error = %e, "could not decode raffle status");
                None
            }
        };

        let completed_at = abi::decode_u64(&completed_at)?;
        let canceled_at = abi::decode_u64(&canceled_at)?;
        // Raffle contracts keep no update stamp; the last state change stands in
        let last_updated_timestamp = completed_at.max(canceled_at);

        Ok(Raffle {
            id: address,
            name: abi::decode_string(&name)?,
            status,
            creator: abi::decode_address(&creator)?,
            deployer: abi::decode_address(&deployer)?,
            fee_recipient: abi::decode_address(&fee_recipient)?,
            usdc_token: abi::decode_address(&usdc_token)?,
            entropy_provider: abi::decode_address(&entropy_provider)?,
            winner: abi::decode_address(&winner)?,
            winning_pot: abi::decode_uint(&winning_pot)?,
            ticket_price: abi::decode_uint(&ticket_price)?,
            protocol_fee_percent: abi::decode_uint(&protocol_fee_percent)?,
            sold: abi::decode_u64(&sold)?,
            min_tickets: abi::decode_u64(&min_tickets)?,
            max_tickets: abi::decode_u64(&max_tickets)?,
            ticket_revenue: abi::decode_uint(&ticket_revenue)?,
            deadline: abi::decode_u64(&deadline)?,
            completed_at,
            canceled_at,
            last_updated_timestamp,
            paused: abi::decode_bool(&paused)?,
        })
    }

    /// Read many raffles, `batch_size` at a time. Individual failures are
    /// skipped; if every read fails the first error is returned.
    pub async fn read_raffles(&self, addresses: &[Address]) -> Result<Vec<Raffle>> {
        let mut raffles = Vec::with_capacity(addresses.len());
        let mut first_error = None;

        for batch in addresses.chunks(self.batch_size) {
            let reads: Vec<_> = batch.iter().map(|a| self.read_raffle(*a)).collect();
            let results = join_all(reads).await;
            for (address, result) in batch.iter().zip(results) {
                match result {
                    Ok(raffle) => raffles.push(raffle),
                    Err(e) => {
                        warn!(raffle = %address, error = %e, "skipping unreadable raffle");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) if raffles.is_empty() => Err(e),
            _ => Ok(raffles),
        }
    }

    pub async fn token_balance(&self, token: Address, owner: Address) -> Result<u128> {
        let data = self
            .call(token, "balanceOf(address)", &[Token::Address(owner)])
            .await?;
        abi::decode_uint(&data)
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<u128> {
        let data = self
            .call(
                token,
                "allowance(address,address)",
                &[Token::Address(owner), Token::Address(spender)],
            )
            .await?;
        abi::decode_uint(&data)
    }

    /// Balance and allowance read together
    pub async fn balance_and_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<(u128, u128)> {
        futures::try_join!(
            self.token_balance(token, owner),
            self.allowance(token, owner, spender)
        )
    }

    /// Funds `user` can currently withdraw from a raffle
    pub async fn claimable_funds(&self, raffle: Address, user: Address) -> Result<u128> {
        let data = self
            .call(raffle, "claimableFunds(address)", &[Token::Address(user)])
            .await?;
        abi::decode_uint(&data)
    }

    pub async fn tickets_of(&self, raffle: Address, user: Address) -> Result<u64> {
        let data = self
            .call(raffle, "ticketsOwned(address)", &[Token::Address(user)])
            .await?;
        abi::decode_u64(&data)
    }
}
