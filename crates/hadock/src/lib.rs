// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HADOCK transport framing and VMU payload decoding.
//!
//! Ground receivers downlink VMU packets wrapped in preamble-delimited
//! HADOCK frames over TCP. This crate provides:
//! - [`frame`]: the frame scanner/writer (resync, checksums, fragment
//!   reassembly, optional gzip transport)
//! - [`record`]: the VMU decoder producing typed [`record::Record`]s
//!   (images and science tables) with their v1/v2 secondary headers
//! - [`time`]: GPS-epoch timestamp handling
//! - [`checksum`]: the frame and HRDL checksums

pub mod checksum;
pub mod frame;
pub mod record;
pub mod time;

pub use frame::{Frame, FrameReader, FrameWriter, ReaderMode, PREAMBLE, SYNC_WORD};
pub use record::{Channel, DecodeError, Record};

/// Logical producer identities carried in the low byte of the frame
/// version word.
pub const TEST: u8 = 0;
pub const SIM1: u8 = 1;
pub const SIM2: u8 = 2;
pub const OPS: u8 = 255;

/// Display name of an instance byte. Unassigned values map to `DATA-n`.
pub fn instance_name(i: u8) -> String {
    match i {
        TEST => "TEST".to_string(),
        SIM1 => "SIM1".to_string(),
        SIM2 => "SIM2".to_string(),
        OPS => "OPS".to_string(),
        n => format!("DATA-{}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_names() {
        assert_eq!(instance_name(TEST), "TEST");
        assert_eq!(instance_name(SIM1), "SIM1");
        assert_eq!(instance_name(SIM2), "SIM2");
        assert_eq!(instance_name(OPS), "OPS");
        assert_eq!(instance_name(7), "DATA-7");
    }
}
