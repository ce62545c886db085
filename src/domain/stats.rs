use serde::{Deserialize, Serialize};

use super::cost::Cost;
use super::period::Period;
use super::request::Request;
use super::token::Token;

/// The read-only aggregation of requests over a [`Period`], partitioned by
/// model tier (base vs. premium).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stats {
    pub period: Period,
    pub base_requests: u64,
    pub premium_requests: u64,
    pub base_tokens: Token,
    pub premium_tokens: Token,
    pub base_cost: Cost,
    pub premium_cost: Cost,
}

impl Stats {
    pub fn empty(period: Period) -> Self {
        Self {
            period,
            base_requests: 0,
            premium_requests: 0,
            base_tokens: Token::default(),
            premium_tokens: Token::default(),
            base_cost: Cost::default(),
            premium_cost: Cost::default(),
        }
    }

    /// Fold a slice of requests already known to fall within `period` into
    /// a `Stats` value, partitioning by [`Model::is_base`].
    pub fn from_requests(period: Period, requests: &[Request]) -> Self {
        let mut stats = Stats::empty(period);
        for r in requests {
            if r.model.is_base() {
                stats.base_requests += 1;
                stats.base_tokens += r.token;
                stats.base_cost += r.cost;
            } else {
                stats.premium_requests += 1;
                stats.premium_tokens += r.token;
                stats.premium_cost += r.cost;
            }
        }
        stats
    }

    pub fn total_requests(&self) -> u64 {
        self.base_requests + self.premium_requests
    }

    pub fn total_tokens(&self) -> Token {
        self.base_tokens + self.premium_tokens
    }

    pub fn total_cost(&self) -> Cost {
        self.base_cost + self.premium_cost
    }

    /// Componentwise sum, used to verify period-additivity: the caller is
    /// responsible for ensuring the two periods are disjoint and adjacent;
    /// this method does not check that (it just adds).
    pub fn combine(&self, other: &Stats, combined_period: Period) -> Stats {
        Stats {
            period: combined_period,
            base_requests: self.base_requests + other.base_requests,
            premium_requests: self.premium_requests + other.premium_requests,
            base_tokens: self.base_tokens + other.base_tokens,
            premium_tokens: self.premium_tokens + other.premium_tokens,
            base_cost: self.base_cost + other.base_cost,
            premium_cost: self.premium_cost + other.premium_cost,
        }
    }
}
