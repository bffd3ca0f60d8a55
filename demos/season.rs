//! A short trade season: one vetoed trade, one counter-offer that goes
//! through review and executes when the sweeper runs.
//!
//!     cargo run --example season [config.toml]

use anyhow::Context;
use league_trades::{
    Asset, Ballot, CounterOffer, EngineConfig, ExpirationSweeper, LeagueDirectory, LeaguePolicy,
    ManualClock, RecordingSink, Role, Team, TimeStamp, TradeProposal, TradeService, load_config,
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => load_config(&path).with_context(|| format!("loading {path}"))?,
        None => EngineConfig::default(),
    };
    init_logging(&config.logging.level);

    let dir = tempfile::tempdir()?;
    config.storage.path = dir.path().join("season.db");
    let db = config.open_db()?;

    let season = 2026;
    let directory = LeagueDirectory::new(db.clone())?;
    directory.register_league(
        "dynasty",
        LeaguePolicy {
            trade_deadline: TimeStamp::new_with(2026, 11, 20, 0, 0, 0).context("deadline")?,
            trade_votes_needed: 2,
            trade_review_days: 2,
            season,
        },
    )?;
    directory.add_team(Team::new("wolves", "dynasty", "ana").set_name("Wolves"))?;
    directory.add_team(Team::new("hawks", "dynasty", "ben").set_name("Hawks"))?;
    for voter in ["cy", "dee"] {
        directory.add_member("dynasty", voter, Role::Member)?;
    }
    directory.add_member("dynasty", "commish", Role::Commissioner)?;
    directory.set_roster(
        "wolves",
        season,
        [Asset::player("mahomes"), Asset::player("kelce"), Asset::pick(1, 2027, "wolves")],
    )?;
    directory.set_roster(
        "hawks",
        season,
        [Asset::player("jefferson"), Asset::player("bijan")],
    )?;

    let clock = Arc::new(ManualClock::new(
        TimeStamp::new_with(2026, 10, 1, 9, 0, 0).context("start")?,
    ));
    let sink = Arc::new(RecordingSink::new());
    let service =
        TradeService::with_config(db, config, clock.clone())?.with_notifier(sink.clone())?;

    // The league shoots down a lopsided deal.
    let lopsided = service.propose_trade(
        TradeProposal::new("ana", "wolves", "hawks")
            .give_asset(Asset::pick(1, 2027, "wolves"))
            .receive_asset(Asset::player("jefferson"))
            .receive_asset(Asset::player("bijan"))
            .set_expiration_days(3),
    )?;
    service.accept_trade(&lopsided.id, "ben")?;
    service.cast_vote(&lopsided.id, Ballot::veto("cy"))?;
    let receipt = service.cast_vote(&lopsided.id, Ballot::veto("dee").set_reason("collusion"))?;
    tracing::info!(status = ?receipt.trade.status, "first trade settled");

    // A second proposal, countered and then accepted.
    let opening = service.propose_trade(
        TradeProposal::new("ana", "wolves", "hawks")
            .give_asset(Asset::player("kelce"))
            .receive_asset(Asset::player("bijan")),
    )?;
    let (_, counter) = service.counter_trade(
        &opening.id,
        "ben",
        CounterOffer::new()
            .give_asset(Asset::player("bijan"))
            .receive_asset(Asset::player("kelce"))
            .receive_asset(Asset::pick(1, 2027, "wolves"))
            .set_note("add the pick and it's done"),
    )?;
    service.accept_trade(&counter.id, "ana")?;
    service.cast_vote(&counter.id, Ballot::approve("cy"))?;

    clock.advance_days(3);
    let report = ExpirationSweeper::new(service.clone()).run_once()?;
    tracing::info!(executed = ?report.executed, "sweep done");

    for trade in service.counter_chain(&counter.id)? {
        trade.view_history();
    }
    for team in ["wolves", "hawks"] {
        let assets: Vec<String> = directory
            .list_assets(team, season)?
            .iter()
            .map(ToString::to_string)
            .collect();
        tracing::info!(team, assets = ?assets, "final roster");
    }
    // Flush whatever the dispatcher thread has not picked up yet.
    service.dispatch_notifications()?;
    tracing::info!(notifications = sink.notifications().len(), "delivered");
    Ok(())
}
