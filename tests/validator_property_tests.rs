//! Property-based tests for proposal asset checks and execution re-validation

use proptest::prelude::*;
use league_trades::executor::revalidate;
use league_trades::validator::check_assets;
use league_trades::{Asset, AssetSet, Roster, TradeStatus, ValidationError};
use std::collections::BTreeSet;

/// Two disjoint rosters of 1..8 players each.
fn rosters_strategy() -> impl Strategy<Value = (Vec<Asset>, Vec<Asset>)> {
    (
        prop::collection::btree_set(0u16..50, 1..8),
        prop::collection::btree_set(50u16..100, 1..8),
    )
        .prop_map(|(mine, theirs)| {
            (
                mine.into_iter().map(|n| Asset::player(format!("P{n}"))).collect(),
                theirs.into_iter().map(|n| Asset::player(format!("P{n}"))).collect(),
            )
        })
}

fn subset(assets: &[Asset], mask: &[bool]) -> AssetSet {
    assets
        .iter()
        .zip(mask.iter().cycle())
        .filter(|(_, keep)| **keep)
        .map(|(a, _)| a.clone())
        .collect()
}

proptest! {
    /// Any non-empty selection from each side's own roster is a valid proposal.
    #[test]
    fn owned_subsets_are_accepted(
        (mine, theirs) in rosters_strategy(),
        give_mask in prop::collection::vec(any::<bool>(), 1..8),
        receive_mask in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let give = subset(&mine, &give_mask);
        let receive = subset(&theirs, &receive_mask);
        prop_assume!(!give.is_empty() || !receive.is_empty());

        let initiator: Roster = mine.iter().cloned().collect();
        let partner: Roster = theirs.iter().cloned().collect();
        prop_assert!(check_assets("T1", &initiator, "T2", &partner, &give, &receive).is_ok());
    }

    /// Offering something the initiator does not hold always fails, and names
    /// the initiator.
    #[test]
    fn foreign_give_is_refused((mine, theirs) in rosters_strategy(), pick in 0usize..8) {
        let stranger = theirs[pick % theirs.len()].clone();
        let give: AssetSet = [stranger.clone()].into_iter().collect();

        let initiator: Roster = mine.iter().cloned().collect();
        let partner: Roster = theirs.iter().cloned().collect();
        let err = check_assets("T1", &initiator, "T2", &partner, &give, &AssetSet::new())
            .unwrap_err();
        prop_assert_eq!(
            err,
            ValidationError::InvalidAsset { team_id: "T1".into(), asset: stranger }
        );
    }

    /// Re-validation agrees with proposal-time ownership and fails as soon as
    /// one side loses any traded asset.
    #[test]
    fn revalidation_tracks_ownership(
        (mine, theirs) in rosters_strategy(),
        lose in 0usize..8,
    ) {
        let give: AssetSet = [mine[0].clone()].into_iter().collect();
        let receive: AssetSet = theirs.iter().cloned().collect::<BTreeSet<_>>();
        let trade = trade_with(give, receive);

        let initiator: Roster = mine.iter().cloned().collect();
        let mut partner: Roster = theirs.iter().cloned().collect();
        prop_assert!(revalidate(&trade, &initiator, &partner).is_ok());

        partner.remove(&theirs[lose % theirs.len()]);
        prop_assert!(revalidate(&trade, &initiator, &partner).is_err());
    }
}

fn trade_with(give: AssetSet, receive: AssetSet) -> league_trades::Trade {
    let at = league_trades::TimeStamp::new_with(2026, 9, 1, 0, 0, 0).unwrap();
    league_trades::Trade {
        id: "trade_p".into(),
        league_id: "L".into(),
        season: 2026,
        initiator_team_id: "T1".into(),
        partner_team_id: "T2".into(),
        initiator_user_id: "U1".into(),
        give,
        receive,
        status: TradeStatus::Accepted,
        proposed_at: at.clone(),
        expires_at: at.add_days(3).unwrap(),
        review_ends_at: None,
        veto_votes: 0,
        approve_votes: 0,
        commissioner_override: false,
        override_reason: None,
        parent_trade_id: None,
        counter_trade_id: None,
        note: None,
        responded_at: None,
        executed_at: None,
        last_execution_error: None,
        history: vec![],
    }
}
