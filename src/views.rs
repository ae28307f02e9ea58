// Raffle View - List derivations for the home and explore pages
use std::cmp::Ordering;

use crate::config::ClientConfig;
use crate::raffle_state::{Address, Raffle, RawStatus};
use crate::status::{resolve_status, DisplayStatus};

/// Sort offered on the explore page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExploreSort {
    #[default]
    SoonestDeadline,
    LargestPrize,
    RecentlyUpdated,
}

/// Explore page filter state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExploreQuery {
    /// Case-insensitive substring of the name or address
    pub text: String,
    /// Only raffles currently displayed with this status
    pub status: Option<DisplayStatus>,
    pub sort: ExploreSort,
}

fn by_prize_desc(a: &Raffle, b: &Raffle) -> Ordering {
    b.winning_pot.cmp(&a.winning_pot).then_with(|| a.id.cmp(&b.id))
}

fn by_deadline_asc(a: &Raffle, b: &Raffle) -> Ordering {
    a.deadline.cmp(&b.deadline).then_with(|| a.id.cmp(&b.id))
}

fn by_updated_desc(a: &Raffle, b: &Raffle) -> Ordering {
    b.last_updated_timestamp
        .cmp(&a.last_updated_timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// Raffles that are open or waiting to be funded
pub fn active(raffles: &[Raffle]) -> Vec<&Raffle> {
    raffles.iter().filter(|r| r.is_active()).collect()
}

/// Largest prizes among active raffles
pub fn big_prizes(raffles: &[Raffle], limit: usize) -> Vec<&Raffle> {
    let mut list = active(raffles);
    list.sort_by(|a, b| by_prize_desc(a, b));
    list.truncate(limit);
    list
}

/// Open raffles whose deadline is nearest, including stale records still
/// reported OPEN after their deadline
pub fn ending_soon(raffles: &[Raffle], limit: usize) -> Vec<&Raffle> {
    let mut list: Vec<&Raffle> = raffles
        .iter()
        .filter(|r| r.status == Some(RawStatus::Open))
        .collect();
    list.sort_by(|a, b| by_deadline_asc(a, b));
    list.truncate(limit);
    list
}

/// The two lists on the home page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HomeLists<'a> {
    pub big_prizes: Vec<&'a Raffle>,
    pub ending_soon: Vec<&'a Raffle>,
}

/// Home page lists, each capped at the configured `list_limit`
pub fn home<'a>(raffles: &'a [Raffle], config: &ClientConfig) -> HomeLists<'a> {
    HomeLists {
        big_prizes: big_prizes(raffles, config.list_limit),
        ending_soon: ending_soon(raffles, config.list_limit),
    }
}

fn matches_text(raffle: &Raffle, needle: &str) -> bool {
    needle.is_empty()
        || raffle.name.to_lowercase().contains(needle)
        || raffle.id.to_string().contains(needle)
}

pub fn explore<'a>(raffles: &'a [Raffle], query: &ExploreQuery, now: u64) -> Vec<&'a Raffle> {
    let needle = query.text.trim().to_lowercase();
    let mut list: Vec<&Raffle> = raffles
        .iter()
        .filter(|r| matches_text(r, &needle))
        .filter(|r| query.status.map_or(true, |s| resolve_status(r, now) == s))
        .collect();

    match query.sort {
        ExploreSort::SoonestDeadline => list.sort_by(|a, b| by_deadline_asc(a, b)),
        ExploreSort::LargestPrize => list.sort_by(|a, b| by_prize_desc(a, b)),
        ExploreSort::RecentlyUpdated => list.sort_by(|a, b| by_updated_desc(a, b)),
    }
    list
}

/// Raffles `creator` launched, newest activity first
pub fn created_by(raffles: &[Raffle], creator: Address) -> Vec<&Raffle> {
    let mut list: Vec<&Raffle> = raffles.iter().filter(|r| r.creator == creator).collect();
    list.sort_by(|a, b| by_updated_desc(a, b));
    list
}

/// Completed raffles won by `account`
pub fn won_by(raffles: &[Raffle], account: Address) -> Vec<&Raffle> {
    let mut list: Vec<&Raffle> = raffles
        .iter()
        .filter(|r| r.status == Some(RawStatus::Completed) && r.winner == account)
        .collect();
    list.sort_by(|a, b| by_updated_desc(a, b));
    list
}
