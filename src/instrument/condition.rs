// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Operation condition register decoding

use rocket_okapi::JsonSchema;
use serde::{Deserialize, Serialize};

pub const ZEROING: u16 = 1 << 0;
pub const CALIBRATING: u16 = 1 << 1;
pub const SCANNING: u16 = 1 << 2;
pub const ANALYZING: u16 = 1 << 3;
pub const ABORTING: u16 = 1 << 4;
pub const ARMED: u16 = 1 << 5;
pub const REFERENCING: u16 = 1 << 6;
pub const QUICK_REFERENCING: u16 = 1 << 7;

/// Individual flags of the 16-bit condition register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConditionBits {
    pub zeroing: bool,
    pub calibrating: bool,
    pub scanning: bool,
    pub analyzing: bool,
    pub aborting: bool,
    pub armed: bool,
    pub referencing: bool,
    pub quick_referencing: bool,
}

impl From<u16> for ConditionBits {
    fn from(register: u16) -> Self {
        Self {
            zeroing: register & ZEROING != 0,
            calibrating: register & CALIBRATING != 0,
            scanning: register & SCANNING != 0,
            analyzing: register & ANALYZING != 0,
            aborting: register & ABORTING != 0,
            armed: register & ARMED != 0,
            referencing: register & REFERENCING != 0,
            quick_referencing: register & QUICK_REFERENCING != 0,
        }
    }
}

/// Is the instrument doing nothing at all?
pub fn is_idle(register: u16) -> bool {
    register == 0
}

/// A sweep is complete once the scanning bit is cleared.
pub fn is_sweeping(register: u16) -> bool {
    register & SCANNING != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_decoding() {
        let bits = ConditionBits::from(SCANNING | ARMED);
        assert!(bits.scanning);
        assert!(bits.armed);
        assert!(!bits.zeroing);
        assert!(!bits.quick_referencing);
        assert!(is_sweeping(SCANNING | ARMED));
        assert!(!is_idle(SCANNING));
        assert!(is_idle(0));
    }
}
