//! League policy, membership and rosters.
//!
//! These are owned by the wider league application; the trade engine keeps
//! them in the same sled database so that a roster swap and the trade's status
//! change commit together. [`LeagueDirectory`] is the administrative surface
//! the request layer uses to seed and inspect them.
use super::error::{TradeError, ValidationError};
use super::store::{Stores, abort, decode, member_key, roster_key};
use super::trade::{Asset, AssetSet, TimeStamp};
use chrono::Utc;
use sled::Db;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaguePolicy {
    #[n(0)]
    pub trade_deadline: TimeStamp<Utc>,
    #[n(1)]
    pub trade_votes_needed: u32, // 0 disables review
    #[n(2)]
    pub trade_review_days: u32,
    #[n(3)]
    pub season: u16,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Team {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub league_id: String,
    #[n(2)]
    pub owner_user_id: String,
    #[n(3)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    Member,
    #[n(1)]
    Commissioner,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSlot {
    #[n(0)]
    Active,
    #[n(1)]
    Bench,
    #[n(2)]
    InjuredReserve,
}

/// A team's holdings for one season, with the slot each asset occupies.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    #[n(0)]
    pub assignments: BTreeMap<Asset, RosterSlot>,
}

#[derive(Clone)]
pub struct LeagueDirectory {
    stores: Stores,
}

impl LeaguePolicy {
    pub fn voting_enabled(&self) -> bool {
        self.trade_votes_needed > 0
    }
}

impl Team {
    pub fn new(id: &str, league_id: &str, owner_user_id: &str) -> Self {
        Self {
            id: id.to_string(),
            league_id: league_id.to_string(),
            owner_user_id: owner_user_id.to_string(),
            name: id.to_string(),
        }
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl Roster {
    pub fn contains(&self, asset: &Asset) -> bool {
        self.assignments.contains_key(asset)
    }
    pub fn assets(&self) -> AssetSet {
        self.assignments.keys().cloned().collect()
    }
    pub fn insert(&mut self, asset: Asset, slot: RosterSlot) {
        self.assignments.insert(asset, slot);
    }
    pub fn remove(&mut self, asset: &Asset) -> Option<RosterSlot> {
        self.assignments.remove(asset)
    }
    pub fn len(&self) -> usize {
        self.assignments.len()
    }
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl FromIterator<Asset> for Roster {
    fn from_iter<I: IntoIterator<Item = Asset>>(iter: I) -> Self {
        Self {
            assignments: iter
                .into_iter()
                .map(|asset| (asset, RosterSlot::Active))
                .collect(),
        }
    }
}

impl LeagueDirectory {
    pub fn new(instance: Arc<Db>) -> Result<Self, TradeError> {
        Ok(Self {
            stores: Stores::open(instance)?,
        })
    }

    pub fn register_league(&self, league_id: &str, policy: LeaguePolicy) -> Result<(), TradeError> {
        self.set_policy(league_id, policy)?;
        tracing::info!(league_id, "league registered");
        Ok(())
    }

    pub fn set_policy(&self, league_id: &str, policy: LeaguePolicy) -> Result<(), TradeError> {
        self.stores
            .atomically(|tx| tx.put_policy(league_id, &policy))
    }

    pub fn get_policy(&self, league_id: &str) -> Result<LeaguePolicy, TradeError> {
        self.stores.get_policy(league_id)
    }

    /// Adds the team and makes its owner a member unless they already hold a role.
    pub fn add_team(&self, team: Team) -> Result<(), TradeError> {
        self.stores.atomically(|tx| {
            tx.policy(&team.league_id)?;
            if tx.role(&team.league_id, &team.owner_user_id)?.is_none() {
                tx.put_role(&team.league_id, &team.owner_user_id, Role::Member)?;
            }
            tx.put_team(&team)
        })
    }

    pub fn team(&self, team_id: &str) -> Result<Option<Team>, TradeError> {
        match self.stores.teams.get(team_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn add_member(&self, league_id: &str, user_id: &str, role: Role) -> Result<(), TradeError> {
        self.stores.atomically(|tx| {
            tx.policy(league_id)?;
            tx.put_role(league_id, user_id, role)
        })
    }

    pub fn role(&self, user_id: &str, league_id: &str) -> Result<Option<Role>, TradeError> {
        match self.stores.members.get(member_key(league_id, user_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_member(&self, user_id: &str, league_id: &str) -> Result<bool, TradeError> {
        Ok(self.role(user_id, league_id)?.is_some())
    }

    pub fn set_roster(
        &self,
        team_id: &str,
        season: u16,
        assets: impl IntoIterator<Item = Asset>,
    ) -> Result<(), TradeError> {
        let roster: Roster = assets.into_iter().collect();
        self.stores
            .atomically(|tx| tx.put_roster(team_id, season, &roster))
    }

    pub fn roster(&self, team_id: &str, season: u16) -> Result<Roster, TradeError> {
        match self.stores.rosters.get(roster_key(team_id, season))? {
            Some(bytes) => decode(&bytes),
            None => Ok(Roster::default()),
        }
    }

    pub fn list_assets(&self, team_id: &str, season: u16) -> Result<AssetSet, TradeError> {
        Ok(self.roster(team_id, season)?.assets())
    }

    /// Moves assets between two rosters in one transaction. Fails without
    /// touching either roster if `from` does not hold every asset.
    pub fn transfer_assets(
        &self,
        from_team_id: &str,
        to_team_id: &str,
        assets: &AssetSet,
        season: u16,
    ) -> Result<(), TradeError> {
        self.stores.atomically(|tx| {
            let mut from = tx.roster(from_team_id, season)?;
            let mut to = tx.roster(to_team_id, season)?;
            for asset in assets {
                if from.remove(asset).is_none() {
                    return abort(ValidationError::InvalidAsset {
                        team_id: from_team_id.to_string(),
                        asset: asset.clone(),
                    });
                }
                to.insert(asset.clone(), RosterSlot::Bench);
            }
            tx.put_roster(from_team_id, season, &from)?;
            tx.put_roster(to_team_id, season, &to)
        })?;
        tracing::debug!(from_team_id, to_team_id, count = assets.len(), "assets transferred");
        Ok(())
    }

    /// Releases an asset from a roster. Returns false if it was not there.
    pub fn drop_asset(
        &self,
        team_id: &str,
        season: u16,
        asset: &Asset,
    ) -> Result<bool, TradeError> {
        self.stores.atomically(|tx| {
            let mut roster = tx.roster(team_id, season)?;
            let dropped = roster.remove(asset).is_some();
            if dropped {
                tx.put_roster(team_id, season, &roster)?;
            }
            Ok(dropped)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_from_assets_starts_active() {
        let roster: Roster = [Asset::player("p1"), Asset::pick(1, 2027, "t1")]
            .into_iter()
            .collect();

        assert_eq!(roster.len(), 2);
        assert!(
            roster
                .assignments
                .values()
                .all(|slot| *slot == RosterSlot::Active)
        );
    }

    #[test]
    fn roster_encoding() {
        let mut roster = Roster::default();
        roster.insert(Asset::player("p1"), RosterSlot::InjuredReserve);

        let encoded = minicbor::to_vec(&roster).unwrap();
        let decoded: Roster = minicbor::decode(&encoded).unwrap();

        assert_eq!(roster, decoded);
    }
}
