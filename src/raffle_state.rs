// Raffle View - Raffle records
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::RaffleClientError;

/// A 20-byte contract or account address
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl FromStr for Address {
    type Err = RaffleClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| RaffleClientError::InvalidRecord {
            field: "address",
            reason: format!("{}: {}", s, e),
        })?;
        let bytes: [u8; 20] =
            <[u8; 20]>::try_from(bytes.as_slice()).map_err(|_| RaffleClientError::InvalidRecord {
                field: "address",
                reason: format!("{} is not 20 bytes", s),
            })?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(de::Error::custom)
    }
}

/// Lifecycle status as stored by the raffle contract
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawStatus {
    /// Created, waiting for the prize pot to be funded
    FundingPending,
    /// Selling tickets
    Open,
    /// Randomness requested, winner not yet chosen
    Drawing,
    /// Winner paid out
    Completed,
    /// Canceled, refunds available
    Canceled,
}

impl TryFrom<u8> for RawStatus {
    type Error = RaffleClientError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(RawStatus::FundingPending),
            1 => Ok(RawStatus::Open),
            2 => Ok(RawStatus::Drawing),
            3 => Ok(RawStatus::Completed),
            4 => Ok(RawStatus::Canceled),
            _ => Err(RaffleClientError::InvalidRecord {
                field: "status",
                reason: format!("unknown status index {}", val),
            }),
        }
    }
}

impl From<RawStatus> for u8 {
    fn from(status: RawStatus) -> Self {
        match status {
            RawStatus::FundingPending => 0,
            RawStatus::Open => 1,
            RawStatus::Drawing => 2,
            RawStatus::Completed => 3,
            RawStatus::Canceled => 4,
        }
    }
}

impl FromStr for RawStatus {
    type Err = RaffleClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FUNDING_PENDING" => Ok(RawStatus::FundingPending),
            "OPEN" => Ok(RawStatus::Open),
            "DRAWING" => Ok(RawStatus::Drawing),
            "COMPLETED" => Ok(RawStatus::Completed),
            "CANCELED" | "CANCELLED" => Ok(RawStatus::Canceled),
            other => match other.parse::<u8>() {
                Ok(index) => RawStatus::try_from(index),
                Err(_) => Err(RaffleClientError::InvalidRecord {
                    field: "status",
                    reason: format!("unknown status {}", s),
                }),
            },
        }
    }
}

/// A raffle as surfaced to the UI, keyed by its contract address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raffle {
    /// Raffle contract address
    pub id: Address,
    /// Display name
    pub name: String,
    /// Contract status, `None` when it could not be read
    pub status: Option<RawStatus>,
    pub creator: Address,
    /// Factory that deployed this raffle
    pub deployer: Address,
    pub fee_recipient: Address,
    pub usdc_token: Address,
    pub entropy_provider: Address,
    /// Zero until a winner is drawn
    pub winner: Address,
    /// Prize in stable-token base units
    pub winning_pot: u128,
    /// Price per ticket in stable-token base units
    pub ticket_price: u128,
    pub protocol_fee_percent: u128,
    pub sold: u64,
    pub min_tickets: u64,
    /// 0 means unlimited
    pub max_tickets: u64,
    pub ticket_revenue: u128,
    /// Unix seconds
    pub deadline: u64,
    pub completed_at: u64,
    pub canceled_at: u64,
    pub last_updated_timestamp: u64,
    pub paused: bool,
}

impl Raffle {
    /// A record with only its key set; every other field is zeroed
    pub fn empty(id: Address) -> Self {
        Self {
            id,
            name: String::new(),
            status: None,
            creator: Address::ZERO,
            deployer: Address::ZERO,
            fee_recipient: Address::ZERO,
            usdc_token: Address::ZERO,
            entropy_provider: Address::ZERO,
            winner: Address::ZERO,
            winning_pot: 0,
            ticket_price: 0,
            protocol_fee_percent: 0,
            sold: 0,
            min_tickets: 0,
            max_tickets: 0,
            ticket_revenue: 0,
            deadline: 0,
            completed_at: 0,
            canceled_at: 0,
            last_updated_timestamp: 0,
            paused: false,
        }
    }

    /// Check if the ticket sale deadline is behind `now`
    pub fn has_deadline_passed(&self, now: u64) -> bool {
        self.deadline < now
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            Some(RawStatus::Open) | Some(RawStatus::FundingPending)
        )
    }

    /// Tickets still for sale, `None` when uncapped
    pub fn remaining_tickets(&self) -> Option<u64> {
        if self.max_tickets == 0 {
            None
        } else {
            Some(self.max_tickets.saturating_sub(self.sold))
        }
    }

    pub fn sold_within_cap(&self) -> bool {
        self.max_tickets == 0 || self.sold <= self.max_tickets
    }

    pub fn has_winner(&self) -> bool {
        !self.winner.is_zero()
    }
}

/// Raffle as returned by the indexer; numbers arrive as decimal strings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedRaffle {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    pub creator: String,
    pub deployer: String,
    #[serde(default)]
    pub fee_recipient: Option<String>,
    #[serde(default)]
    pub usdc_token: Option<String>,
    #[serde(default)]
    pub entropy_provider: Option<String>,
    #[serde(default)]
    pub winner: Option<String>,
    pub winning_pot: String,
    pub ticket_price: String,
    #[serde(default)]
    pub protocol_fee_percent: Option<String>,
    pub sold: String,
    #[serde(default)]
    pub min_tickets: Option<String>,
    #[serde(default)]
    pub max_tickets: Option<String>,
    #[serde(default)]
    pub ticket_revenue: Option<String>,
    pub deadline: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub canceled_at: Option<String>,
    #[serde(default)]
    pub last_updated_timestamp: Option<String>,
    #[serde(default)]
    pub paused: Option<bool>,
}

fn parse_u128(field: &'static str, value: &str) -> Result<u128, RaffleClientError> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|e| RaffleClientError::InvalidRecord {
            field,
            reason: format!("{:?}: {}", value, e),
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, RaffleClientError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| RaffleClientError::InvalidRecord {
            field,
            reason: format!("{:?}: {}", value, e),
        })
}

fn opt_u128(field: &'static str, value: &Option<String>) -> Result<u128, RaffleClientError> {
    match value.as_deref() {
        None | Some("") => Ok(0),
        Some(v) => parse_u128(field, v),
    }
}

fn opt_u64(field: &'static str, value: &Option<String>) -> Result<u64, RaffleClientError> {
    match value.as_deref() {
        None | Some("") => Ok(0),
        Some(v) => parse_u64(field, v),
    }
}

fn opt_address(value: &Option<String>) -> Result<Address, RaffleClientError> {
    match value.as_deref() {
        None | Some("") => Ok(Address::ZERO),
        Some(v) => v.parse(),
    }
}

impl TryFrom<IndexedRaffle> for Raffle {
    type Error = RaffleClientError;

    fn try_from(raw: IndexedRaffle) -> Result<Self, Self::Error> {
        let id: Address = raw.id.parse()?;
        let status = match raw.status.parse::<RawStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(raffle = %id, error = %e, "unrecognized raffle status");
                None
            }
        };

        Ok(Raffle {
            id,
            name: raw.name.unwrap_or_default(),
            status,
            creator: raw.creator.parse()?,
            deployer: raw.deployer.parse()?,
            fee_recipient: opt_address(&raw.fee_recipient)?,
            usdc_token: opt_address(&raw.usdc_token)?,
            entropy_provider: opt_address(&raw.entropy_provider)?,
            winner: opt_address(&raw.winner)?,
            winning_pot: parse_u128("winningPot", &raw.winning_pot)?,
            ticket_price: parse_u128("ticketPrice", &raw.ticket_price)?,
            protocol_fee_percent: opt_u128("protocolFeePercent", &raw.protocol_fee_percent)?,
            sold: parse_u64("sold", &raw.sold)?,
            min_tickets: opt_u64("minTickets", &raw.min_tickets)?,
            max_tickets: opt_u64("maxTickets", &raw.max_tickets)?,
            ticket_revenue: opt_u128("ticketRevenue", &raw.ticket_revenue)?,
            deadline: parse_u64("deadline", &raw.deadline)?,
            completed_at: opt_u64("completedAt", &raw.completed_at)?,
            canceled_at: opt_u64("canceledAt", &raw.canceled_at)?,
            last_updated_timestamp: opt_u64("lastUpdatedTimestamp", &raw.last_updated_timestamp)?,
            paused: raw.paused.unwrap_or(false),
        })
    }
}
