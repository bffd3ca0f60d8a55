//! Core trade record, tradable assets and timestamps
use super::error::TradeError;
use super::history::{Witness, WitnessType};
use super::state::{TradeAction, TradeStatus};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// A future draft selection. The original owner is kept because picks are
/// identified by whose slot they are, not by who currently holds them.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DraftPick {
    #[n(0)]
    pub round: u8,
    #[n(1)]
    pub year: u16,
    #[n(2)]
    pub original_owner_team_id: String,
}

/// The tradable unit held on a roster.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Asset {
    #[n(0)]
    Player(#[n(0)] String),
    #[n(1)]
    Pick(#[n(0)] DraftPick),
}

pub type AssetSet = BTreeSet<Asset>;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Persisted trade. Key is the bech32 trade id.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub league_id: String,
    #[n(2)]
    pub season: u16,
    #[n(3)]
    pub initiator_team_id: String,
    #[n(4)]
    pub partner_team_id: String,
    #[n(5)]
    pub initiator_user_id: String,
    #[n(6)]
    pub give: AssetSet, // leaves the initiator
    #[n(7)]
    pub receive: AssetSet, // leaves the partner
    #[n(8)]
    pub status: TradeStatus,
    #[n(9)]
    pub proposed_at: TimeStamp<Utc>,
    #[n(10)]
    pub expires_at: TimeStamp<Utc>,
    #[n(11)]
    pub review_ends_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub veto_votes: u32,
    #[n(13)]
    pub approve_votes: u32,
    #[n(14)]
    pub commissioner_override: bool,
    #[n(15)]
    pub override_reason: Option<String>,
    #[n(16)]
    pub parent_trade_id: Option<String>,
    #[n(17)]
    pub counter_trade_id: Option<String>,
    #[n(18)]
    pub note: Option<String>,
    #[n(19)]
    pub responded_at: Option<TimeStamp<Utc>>,
    #[n(20)]
    pub executed_at: Option<TimeStamp<Utc>>,
    #[n(21)]
    pub last_execution_error: Option<String>,
    #[n(22)]
    pub history: Vec<Witness>,
}

impl Asset {
    pub fn player(id: impl Into<String>) -> Self {
        Asset::Player(id.into())
    }
    pub fn pick(round: u8, year: u16, original_owner_team_id: impl Into<String>) -> Self {
        Asset::Pick(DraftPick {
            round,
            year,
            original_owner_team_id: original_owner_team_id.into(),
        })
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Player(id) => write!(f, "player {id}"),
            Asset::Pick(pick) => write!(
                f,
                "{} round {} pick (via {})",
                pick.year, pick.round, pick.original_owner_team_id
            ),
        }
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// `None` when the result is past what chrono or the nanosecond codec
    /// can hold.
    pub fn add_days(&self, days: u32) -> Option<Self> {
        let later = self
            .0
            .checked_add_signed(Duration::try_days(i64::from(days))?)?;
        later.timestamp_nanos_opt().map(|_| Self(later))
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Trade {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Both team ids, initiator first.
    pub fn parties(&self) -> [&str; 2] {
        [self.initiator_team_id.as_str(), self.partner_team_id.as_str()]
    }

    pub fn involves_team(&self, team_id: &str) -> bool {
        self.initiator_team_id == team_id || self.partner_team_id == team_id
    }

    /// A proposal that was not answered in time. Stays PROPOSED until something
    /// (an accept attempt or the sweeper) records the expiry.
    pub fn is_overdue_at(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == TradeStatus::Proposed && *now > self.expires_at
    }

    pub fn review_open_at(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == TradeStatus::Accepted
            && self.review_ends_at.as_ref().is_some_and(|end| now <= end)
    }

    pub fn review_lapsed_at(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == TradeStatus::Accepted
            && self.review_ends_at.as_ref().is_some_and(|end| now > end)
    }

    /// Moves the trade through the state machine and appends the witness.
    pub(crate) fn advance(
        &mut self,
        action: TradeAction,
        actor: &str,
        at: &TimeStamp<Utc>,
        kind: WitnessType,
    ) -> Result<TradeStatus, TradeError> {
        let next = self.status.apply(&self.id, action)?;
        self.status = next;
        self.record(actor, at, kind)?;
        Ok(next)
    }

    /// Append to the witness chain without changing status.
    pub(crate) fn record(
        &mut self,
        actor: &str,
        at: &TimeStamp<Utc>,
        kind: WitnessType,
    ) -> Result<(), TradeError> {
        let prev_hash = match self.history.last() {
            Some(prev) => Some(prev.digest()?),
            None => None,
        };
        self.history
            .push(Witness::new(actor.to_string(), at.clone(), kind, prev_hash));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn assets_order_players_before_picks() {
        let mut set = AssetSet::new();
        set.insert(Asset::pick(1, 2027, "team_a"));
        set.insert(Asset::player("p9"));

        let first = set.iter().next().unwrap();
        assert_eq!(*first, Asset::player("p9"));
    }

    #[test]
    fn pick_display_names_original_owner() {
        let pick = Asset::pick(2, 2027, "team_a");
        assert_eq!(pick.to_string(), "2027 round 2 pick (via team_a)");
    }

    #[test]
    fn add_days_moves_forward() {
        let start = TimeStamp::new_with(2026, 9, 1, 12, 0, 0).unwrap();
        let later = start.add_days(3).unwrap();

        assert_eq!(later, TimeStamp::new_with(2026, 9, 4, 12, 0, 0).unwrap());
    }

    #[test]
    fn add_days_refuses_unrepresentable_dates() {
        let start = TimeStamp::new_with(2026, 9, 1, 12, 0, 0).unwrap();

        assert!(start.add_days(u32::MAX).is_none());
        // Fits chrono but not the i64 nanosecond encoding.
        assert!(start.add_days(300 * 365).is_none());
        assert!(start.add_days(365).is_some());
    }

    #[test]
    fn timestamps_order_chronologically() {
        let early = TimeStamp::new_with(2026, 9, 1, 12, 0, 0).unwrap();
        let late = TimeStamp::new_with(2026, 9, 1, 12, 0, 1).unwrap();

        assert!(early < late);
        assert!(late >= early);
        assert_eq!(early.cmp(&early.clone()), Ordering::Equal);
        assert_eq!(std::cmp::max(early.clone(), late.clone()), late);
    }
}
