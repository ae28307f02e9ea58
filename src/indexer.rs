// Raffle View - Indexer (subgraph) queries
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::TryFrom;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{RaffleClientError, Result};
use crate::raffle_state::{Address, IndexedRaffle, Raffle};

/// POSTs a query document and returns the decoded JSON body
pub trait IndexerTransport: Send + Sync {
    fn post(&self, body: Value) -> impl Future<Output = Result<Value>> + Send;
}

impl<T: IndexerTransport> IndexerTransport for Arc<T> {
    async fn post(&self, body: Value) -> Result<Value> {
        self.as_ref().post(body).await
    }
}

/// Hosted subgraphs reject a `skip` above this
const MAX_SKIP: u32 = 5_000;

const RAFFLE_FIELDS: &str = "id name status creator deployer feeRecipient usdcToken entropyProvider \
     winner winningPot ticketPrice protocolFeePercent sold minTickets maxTickets ticketRevenue \
     deadline completedAt canceledAt lastUpdatedTimestamp paused";

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

pub struct IndexerClient<T: IndexerTransport> {
    transport: T,
}

impl<T: IndexerTransport> IndexerClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn query(&self, query: String, variables: Value) -> Result<Value> {
        let body = json!({ "query": query, "variables": variables });
        let raw = self.transport.post(body).await?;
        let response: GraphQlResponse = serde_json::from_value(raw)
            .map_err(|e| RaffleClientError::IndexerQuery(format!("malformed response: {}", e)))?;

        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RaffleClientError::IndexerQuery(message));
        }
        response
            .data
            .ok_or_else(|| RaffleClientError::IndexerQuery("response has no data".to_string()))
    }

    /// Run a list query page by page, `first` records at a time, until a
    /// short page comes back or the indexer's skip ceiling is reached
    async fn paged(&self, query: String, variables: Value, first: u32) -> Result<Vec<Raffle>> {
        let first = first.max(1);
        let mut raffles = Vec::new();
        let mut skip = 0u32;
        loop {
            let mut vars = variables.clone();
            vars["first"] = json!(first);
            vars["skip"] = json!(skip);
            let data = self.query(query.clone(), vars).await?;
            let (page, returned) = records_at(&data, "raffles")?;
            debug!(skip, returned, kept = page.len(), "read indexer page");
            raffles.extend(page);

            if returned < first as usize {
                break;
            }
            skip = match skip.checked_add(first) {
                Some(next) if next <= MAX_SKIP => next,
                _ => {
                    warn!(skip, "indexer skip ceiling reached, list truncated");
                    break;
                }
            };
        }
        Ok(raffles)
    }

    /// Newest-first raffles deployed by `deployer`, read `first` per page
    pub async fn fetch_raffles(&self, deployer: Address, first: u32) -> Result<Vec<Raffle>> {
        let query = format!(
            "query Raffles($first: Int!, $skip: Int!, $deployer: Bytes!) {{ \
             raffles(first: $first, skip: $skip, orderBy: lastUpdatedTimestamp, \
             orderDirection: desc, where: {{ deployer: $deployer }}) {{ {} }} }}",
            RAFFLE_FIELDS
        );
        let raffles = self
            .paged(query, json!({ "deployer": deployer.to_string() }), first)
            .await?;
        debug!(count = raffles.len(), "indexer returned raffles");
        Ok(raffles)
    }

    pub async fn fetch_raffles_by_creator(
        &self,
        deployer: Address,
        creator: Address,
        first: u32,
    ) -> Result<Vec<Raffle>> {
        let query = format!(
            "query RafflesByCreator($first: Int!, $skip: Int!, $deployer: Bytes!, $creator: Bytes!) {{ \
             raffles(first: $first, skip: $skip, orderBy: lastUpdatedTimestamp, \
             orderDirection: desc, where: {{ deployer: $deployer, creator: $creator }}) {{ {} }} }}",
            RAFFLE_FIELDS
        );
        let variables = json!({
            "deployer": deployer.to_string(),
            "creator": creator.to_string(),
        });
        self.paged(query, variables, first).await
    }

    /// A single raffle, `None` when the indexer has not seen it yet
    pub async fn fetch_raffle(&self, id: Address) -> Result<Option<Raffle>> {
        let query = format!(
            "query Raffle($id: ID!) {{ raffle(id: $id) {{ {} }} }}",
            RAFFLE_FIELDS
        );
        let data = self.query(query, json!({ "id": id.to_string() })).await?;
        match data.get("raffle") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let raw: IndexedRaffle = serde_json::from_value(value.clone())
                    .map_err(|e| RaffleClientError::IndexerQuery(format!("bad raffle: {}", e)))?;
                Raffle::try_from(raw).map(Some)
            }
        }
    }
}

/// Decode the list under `key`, dropping records that do not parse. Also
/// returns how many records the page held before dropping.
fn records_at(data: &Value, key: &str) -> Result<(Vec<Raffle>, usize)> {
    let list = data
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| RaffleClientError::IndexerQuery(format!("response has no {} list", key)))?;

    let mut raffles = Vec::with_capacity(list.len());
    for item in list {
        let parsed = serde_json::from_value::<IndexedRaffle>(item.clone())
            .map_err(|e| RaffleClientError::IndexerQuery(e.to_string()))
            .and_then(Raffle::try_from);
        match parsed {
            Ok(raffle) => raffles.push(raffle),
            Err(e) => warn!(error = %e, "dropping malformed indexer record"),
        }
    }
    Ok((raffles, list.len()))
}
