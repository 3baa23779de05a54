use xane_rollup::{Amount, Felt};

use crate::snapshot::SnapshotError;

/// Accepts `0x`-prefixed hex or a decimal string.
pub fn parse_felt(value: &str) -> Result<Felt, SnapshotError> {
    let parsed = if value.starts_with("0x") {
        Felt::from_hex(value)
    } else {
        Felt::from_dec_str(value)
    };
    parsed.map_err(|_| SnapshotError::InvalidFelt(value.to_string()))
}

pub fn format_felt(value: &Felt) -> String {
    format!("{value:#x}")
}

pub fn parse_amount(value: &str) -> Result<Amount, SnapshotError> {
    value
        .parse::<Amount>()
        .map_err(|_| SnapshotError::InvalidAmount(value.to_string()))
}
