//! Route handlers.

pub mod port_forwards;
pub mod system;
pub mod vmnet;

use crate::error::{ApiError, Result};

/// Parses the slot number out of a `vmnet<N>` device name.
pub(crate) fn parse_slot(name: &str) -> Result<u32> {
    name.strip_prefix("vmnet")
        .and_then(|slot| slot.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid vmnet device name: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_parsing() {
        assert_eq!(parse_slot("vmnet8").unwrap(), 8);
        assert!(parse_slot("vmnet").is_err());
        assert!(parse_slot("eth0").is_err());
    }
}
