//! Identifier generation

use bech32::{Bech32m, Hrp};
use uuid7::uuid7;

pub const TRADE_ID_PREFIX: &str = "trade_";

// time-ordered uuid7, bech32m-encoded under the given prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = Hrp::parse(hrp)?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}

pub fn new_trade_id() -> anyhow::Result<String> {
    new_uuid_to_bech32(TRADE_ID_PREFIX)
}

/// The prefix of a well-formed id, or an error if the checksum does not hold.
pub fn id_prefix(id: &str) -> anyhow::Result<String> {
    let (hrp, bytes) = bech32::decode(id)?;
    anyhow::ensure!(bytes.len() == 16, "id {id} does not carry a uuid");
    Ok(hrp.to_string())
}
