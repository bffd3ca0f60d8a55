//! sled trees backing the engine and the transactional view over them
use super::error::TradeError;
use super::league::{LeaguePolicy, Role, Roster, Team};
use super::outbox::{Notification, OutboxRecord};
use super::trade::Trade;
use super::vote::Vote;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, Transactional,
};
use sled::{Db, Tree};
use std::sync::Arc;

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<TradeError>>;

#[derive(Clone)]
pub(crate) struct Stores {
    pub(crate) instance: Arc<Db>,
    pub(crate) trades: Tree,
    pub(crate) votes: Tree,
    pub(crate) rosters: Tree,
    pub(crate) leagues: Tree,
    pub(crate) teams: Tree,
    pub(crate) members: Tree,
    pub(crate) outbox: Tree,
}

/// Every tree, opened inside one transaction.
pub(crate) struct Tx<'a> {
    trades: &'a TransactionalTree,
    votes: &'a TransactionalTree,
    rosters: &'a TransactionalTree,
    leagues: &'a TransactionalTree,
    teams: &'a TransactionalTree,
    members: &'a TransactionalTree,
    outbox: &'a TransactionalTree,
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, TradeError> {
    minicbor::to_vec(value).map_err(|e| TradeError::Codec(e.to_string()))
}

pub(crate) fn decode<T>(bytes: &[u8]) -> Result<T, TradeError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| TradeError::Codec(e.to_string()))
}

/// Lift a domain failure into a transaction abort.
pub(crate) fn guard<T, E: Into<TradeError>>(result: Result<T, E>) -> TxResult<T> {
    result.map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

pub(crate) fn abort<T>(err: impl Into<TradeError>) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

pub(crate) fn vote_key(trade_id: &str, user_id: &str) -> Vec<u8> {
    format!("{trade_id}/{user_id}").into_bytes()
}

pub(crate) fn roster_key(team_id: &str, season: u16) -> Vec<u8> {
    format!("{team_id}/{season}").into_bytes()
}

pub(crate) fn member_key(league_id: &str, user_id: &str) -> Vec<u8> {
    format!("{league_id}/{user_id}").into_bytes()
}

fn load<T>(tree: &TransactionalTree, key: &[u8]) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => guard(decode(&bytes).map(Some)),
        None => Ok(None),
    }
}

fn store<T: minicbor::Encode<()>>(tree: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()> {
    let bytes = guard(encode(value))?;
    tree.insert(key, bytes)?;
    Ok(())
}

impl Stores {
    pub(crate) fn open(instance: Arc<Db>) -> Result<Self, TradeError> {
        Ok(Self {
            trades: instance.open_tree("trades")?,
            votes: instance.open_tree("votes")?,
            rosters: instance.open_tree("rosters")?,
            leagues: instance.open_tree("leagues")?,
            teams: instance.open_tree("teams")?,
            members: instance.open_tree("members")?,
            outbox: instance.open_tree("outbox")?,
            instance,
        })
    }

    /// Runs `f` as one serializable unit across all trees. sled re-runs the
    /// closure on conflict, so `f` must derive everything from what it reads.
    pub(crate) fn atomically<A, F>(&self, f: F) -> Result<A, TradeError>
    where
        F: Fn(&Tx<'_>) -> TxResult<A>,
    {
        (
            &self.trades,
            &self.votes,
            &self.rosters,
            &self.leagues,
            &self.teams,
            &self.members,
            &self.outbox,
        )
            .transaction(|(trades, votes, rosters, leagues, teams, members, outbox)| {
                f(&Tx {
                    trades,
                    votes,
                    rosters,
                    leagues,
                    teams,
                    members,
                    outbox,
                })
            })
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => TradeError::Storage(err),
            })
    }

    pub(crate) fn get_trade(&self, trade_id: &str) -> Result<Trade, TradeError> {
        match self.trades.get(trade_id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(TradeError::NotFound(trade_id.to_string())),
        }
    }

    pub(crate) fn get_policy(&self, league_id: &str) -> Result<LeaguePolicy, TradeError> {
        match self.leagues.get(league_id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(TradeError::LeagueNotFound(league_id.to_string())),
        }
    }

    pub(crate) fn scan_trades(&self) -> impl Iterator<Item = Result<Trade, TradeError>> + '_ {
        self.trades
            .iter()
            .map(|entry| entry.map_err(TradeError::from).and_then(|(_, v)| decode(&v)))
    }

    pub(crate) fn votes_for(&self, trade_id: &str) -> Result<Vec<Vote>, TradeError> {
        let prefix = format!("{trade_id}/");
        self.votes
            .scan_prefix(prefix.as_bytes())
            .map(|entry| entry.map_err(TradeError::from).and_then(|(_, v)| decode(&v)))
            .collect()
    }
}

impl Tx<'_> {
    pub(crate) fn trade(&self, trade_id: &str) -> TxResult<Trade> {
        match load(self.trades, trade_id.as_bytes())? {
            Some(trade) => Ok(trade),
            None => abort(TradeError::NotFound(trade_id.to_string())),
        }
    }

    pub(crate) fn put_trade(&self, trade: &Trade) -> TxResult<()> {
        store(self.trades, trade.id.as_bytes(), trade)
    }

    pub(crate) fn policy(&self, league_id: &str) -> TxResult<LeaguePolicy> {
        match load(self.leagues, league_id.as_bytes())? {
            Some(policy) => Ok(policy),
            None => abort(TradeError::LeagueNotFound(league_id.to_string())),
        }
    }

    pub(crate) fn put_policy(&self, league_id: &str, policy: &LeaguePolicy) -> TxResult<()> {
        store(self.leagues, league_id.as_bytes(), policy)
    }

    pub(crate) fn team(&self, team_id: &str) -> TxResult<Option<Team>> {
        load(self.teams, team_id.as_bytes())
    }

    pub(crate) fn put_team(&self, team: &Team) -> TxResult<()> {
        store(self.teams, team.id.as_bytes(), team)
    }

    pub(crate) fn role(&self, league_id: &str, user_id: &str) -> TxResult<Option<Role>> {
        load(self.members, &member_key(league_id, user_id))
    }

    pub(crate) fn put_role(&self, league_id: &str, user_id: &str, role: Role) -> TxResult<()> {
        store(self.members, &member_key(league_id, user_id), &role)
    }

    pub(crate) fn roster(&self, team_id: &str, season: u16) -> TxResult<Roster> {
        Ok(load(self.rosters, &roster_key(team_id, season))?.unwrap_or_default())
    }

    pub(crate) fn put_roster(&self, team_id: &str, season: u16, roster: &Roster) -> TxResult<()> {
        store(self.rosters, &roster_key(team_id, season), roster)
    }

    pub(crate) fn vote(&self, trade_id: &str, user_id: &str) -> TxResult<Option<Vote>> {
        load(self.votes, &vote_key(trade_id, user_id))
    }

    pub(crate) fn put_vote(&self, vote: &Vote) -> TxResult<()> {
        store(self.votes, &vote_key(&vote.trade_id, &vote.user_id), vote)
    }

    /// Queue a notification; it is only visible to the dispatcher once the
    /// surrounding transaction commits.
    pub(crate) fn notify(&self, notification: Notification) -> TxResult<()> {
        let id = self.outbox.generate_id()?;
        store(
            self.outbox,
            &id.to_be_bytes(),
            &OutboxRecord::new(notification),
        )
    }
}
