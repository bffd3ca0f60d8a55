#![allow(dead_code)]

use league_trades::{
    Asset, AssetSet, EngineConfig, LeagueDirectory, LeaguePolicy, ManualClock, RecordingSink,
    Role, Team, TimeStamp, TradeProposal, TradeService,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const LEAGUE: &str = "L";
pub const SEASON: u16 = 2026;

/// League L with two rostered teams, two voters and a commissioner:
/// T1 (owner U1) holds P1, P2 and T2 (owner U2) holds P3, P4.
pub struct League {
    // Keeps the sled directory alive for the duration of the test.
    _dir: TempDir,
    pub db: Arc<sled::Db>,
    pub directory: LeagueDirectory,
    pub service: TradeService,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

pub fn start() -> TimeStamp<chrono::Utc> {
    TimeStamp::new_with(2026, 9, 1, 12, 0, 0).expect("valid date")
}

pub fn player(id: &str) -> Asset {
    Asset::player(id)
}

pub fn assets(ids: &[&str]) -> AssetSet {
    ids.iter().map(|id| Asset::player(*id)).collect()
}

/// Notifications are delivered inline so they can be asserted right after
/// each call.
pub fn league(votes_needed: u32) -> anyhow::Result<League> {
    let mut config = EngineConfig::default();
    config.outbox.background = false;
    league_with(votes_needed, config)
}

pub fn league_with(votes_needed: u32, config: EngineConfig) -> anyhow::Result<League> {
    let dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(dir.path().join("league.db"))?);

    let directory = LeagueDirectory::new(db.clone())?;
    directory.register_league(
        LEAGUE,
        LeaguePolicy {
            trade_deadline: TimeStamp::new_with(2026, 12, 1, 0, 0, 0).expect("valid date"),
            trade_votes_needed: votes_needed,
            trade_review_days: 2,
            season: SEASON,
        },
    )?;
    directory.add_team(Team::new("T1", LEAGUE, "U1"))?;
    directory.add_team(Team::new("T2", LEAGUE, "U2"))?;
    directory.add_member(LEAGUE, "U3", Role::Member)?;
    directory.add_member(LEAGUE, "U4", Role::Member)?;
    directory.add_member(LEAGUE, "C", Role::Commissioner)?;
    directory.set_roster("T1", SEASON, [player("P1"), player("P2")])?;
    directory.set_roster("T2", SEASON, [player("P3"), player("P4")])?;

    let clock = Arc::new(ManualClock::new(start()));
    let sink = Arc::new(RecordingSink::new());
    let service = TradeService::with_config(db.clone(), config, clock.clone())?
        .with_notifier(sink.clone())?;

    Ok(League {
        _dir: dir,
        db,
        directory,
        service,
        clock,
        sink,
    })
}

impl League {
    pub fn roster(&self, team_id: &str) -> anyhow::Result<AssetSet> {
        Ok(self.directory.list_assets(team_id, SEASON)?)
    }

    /// T1 offers P1 for P3 with a 3-day expiry.
    pub fn p1_for_p3(&self) -> TradeProposal {
        TradeProposal::new("U1", "T1", "T2")
            .give_asset(player("P1"))
            .receive_asset(player("P3"))
            .set_expiration_days(3)
    }
}
