//! League review of accepted trades.
//!
//! Vote insert, counter bump and the threshold check happen in the same
//! transaction, so when N vetoes race exactly one of them sees the count reach
//! the threshold and flips the trade to VETOED.
use super::error::{AuthorizationError, StateConflictError, TradeError};
use super::history::WitnessType;
use super::outbox::{Notification, NotificationKind};
use super::service::{Committed, TradeService, is_party};
use super::state::{TradeAction, TradeStatus};
use super::store::{abort, guard};
use super::trade::{TimeStamp, Trade};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    #[n(0)]
    Approve,
    #[n(1)]
    Veto,
}

// Written once per (trade, user) and never changed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    #[n(0)]
    pub trade_id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub team_id: Option<String>,
    #[n(3)]
    pub vote_type: VoteType,
    #[n(4)]
    pub reason: Option<String>,
    #[n(5)]
    pub cast_at: TimeStamp<Utc>,
}

/// What a league member submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub user_id: String,
    pub team_id: Option<String>,
    pub vote_type: VoteType,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub vote: Vote,
    pub trade: Trade,
    /// True only for the vote that crossed the veto threshold.
    pub vetoed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub approve: u32,
    pub veto: u32,
    pub needed: u32,
}

impl Ballot {
    pub fn veto(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            team_id: None,
            vote_type: VoteType::Veto,
            reason: None,
        }
    }
    pub fn approve(user_id: &str) -> Self {
        Self {
            vote_type: VoteType::Approve,
            ..Self::veto(user_id)
        }
    }
    pub fn set_team(mut self, team_id: &str) -> Self {
        self.team_id = Some(team_id.to_string());
        self
    }
    pub fn set_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

impl TradeService {
    pub fn cast_vote(&self, trade_id: &str, ballot: Ballot) -> Result<VoteReceipt, TradeError> {
        let now = self.clock.now();
        let user_id = ballot.user_id.as_str();

        let receipt = self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;
            let policy = tx.policy(&trade.league_id)?;

            if tx.role(&trade.league_id, user_id)?.is_none() {
                return abort(AuthorizationError::NotMember {
                    user_id: user_id.to_string(),
                    league_id: trade.league_id.clone(),
                });
            }
            let own_team = ballot
                .team_id
                .as_deref()
                .is_some_and(|team| trade.involves_team(team));
            if own_team || is_party(tx, &trade, user_id)? {
                return abort(AuthorizationError::SelfVote {
                    user_id: user_id.to_string(),
                    trade_id: trade.id.clone(),
                });
            }
            if tx.vote(&trade.id, user_id)?.is_some() {
                return abort(AuthorizationError::AlreadyVoted {
                    user_id: user_id.to_string(),
                    trade_id: trade.id.clone(),
                });
            }

            match trade.status {
                TradeStatus::Accepted => {}
                status if status.is_terminal() => {
                    return abort(StateConflictError::AlreadyTerminal {
                        trade_id: trade.id.clone(),
                        status,
                    });
                }
                _ => {
                    return abort(StateConflictError::NotUnderReview {
                        trade_id: trade.id.clone(),
                    });
                }
            }
            let Some(review_ends_at) = trade.review_ends_at.clone() else {
                return abort(StateConflictError::NotUnderReview {
                    trade_id: trade.id.clone(),
                });
            };
            if !policy.voting_enabled() {
                return abort(StateConflictError::NotUnderReview {
                    trade_id: trade.id.clone(),
                });
            }
            if now > review_ends_at {
                return abort(StateConflictError::ReviewClosed {
                    trade_id: trade.id.clone(),
                });
            }

            let vote = Vote {
                trade_id: trade.id.clone(),
                user_id: user_id.to_string(),
                team_id: ballot.team_id.clone(),
                vote_type: ballot.vote_type,
                reason: ballot.reason.clone(),
                cast_at: now.clone(),
            };
            tx.put_vote(&vote)?;

            let mut vetoed = false;
            match vote.vote_type {
                VoteType::Approve => trade.approve_votes += 1,
                VoteType::Veto => {
                    trade.veto_votes += 1;
                    if trade.veto_votes >= policy.trade_votes_needed {
                        guard(trade.advance(
                            TradeAction::Veto { forced: false },
                            user_id,
                            &now,
                            WitnessType::Vetoed {
                                veto_votes: trade.veto_votes,
                            },
                        ))?;
                        tx.notify(Notification::to_parties(
                            NotificationKind::Vetoed,
                            &trade,
                            format!("league vetoed the trade with {} votes", trade.veto_votes),
                        ))?;
                        vetoed = true;
                    }
                }
            }
            tx.put_trade(&trade)?;

            Ok(Committed::Done(VoteReceipt {
                vote,
                trade,
                vetoed,
            }))
        })?;

        tracing::info!(
            trade_id = %receipt.trade.id,
            user_id = %receipt.vote.user_id,
            vote = ?receipt.vote.vote_type,
            veto_votes = receipt.trade.veto_votes,
            vetoed = receipt.vetoed,
            "vote recorded"
        );
        Ok(receipt)
    }

    pub fn votes_for(&self, trade_id: &str) -> Result<Vec<Vote>, TradeError> {
        self.stores.votes_for(trade_id)
    }

    pub fn tally(&self, trade_id: &str) -> Result<VoteTally, TradeError> {
        let trade = self.get_trade(trade_id)?;
        let policy = self.stores.get_policy(&trade.league_id)?;
        Ok(VoteTally {
            approve: trade.approve_votes,
            veto: trade.veto_votes,
            needed: policy.trade_votes_needed,
        })
    }
}
