//! Log sequence numbers as reported by the server in `X/Y` form.

use crate::error::{PgError, PgResult};

/// Parse an `X/Y` LSN, where both halves are 32-bit hex.
pub fn parse_lsn(lsn: &str) -> PgResult<u64> {
    let invalid = || PgError::InvalidLsn(lsn.to_string());
    let (high, low) = lsn.split_once('/').ok_or_else(invalid)?;
    let high = u32::from_str_radix(high, 16).map_err(|_| invalid())?;
    let low = u32::from_str_radix(low, 16).map_err(|_| invalid())?;
    Ok((u64::from(high) << 32) | u64::from(low))
}
