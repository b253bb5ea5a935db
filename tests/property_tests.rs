//! Property-Based Tests for rsync-share
//!
//! These tests verify:
//! - Size strings parse to exact binary multiples
//! - ByteSize Display output parses back to the same size
//! - Share plans are always sector aligned and within MBR limits

use proptest::prelude::*;

use rsync_share::disk_image::SECTOR_SIZE;
use rsync_share::engine::share::{calculate_share_plan, volume_label, MAX_SHARE_SIZE, MIN_SHARE_SIZE};
use rsync_share::settings::Settings;
use rsync_share::size::{parse_size, ByteSize, SizeUnit};
use strum::IntoEnumIterator;

// =============================================================================
// Size Parsing Property Tests
// =============================================================================

/// Strategy for size unit suffixes
fn unit_strategy() -> impl Strategy<Value = SizeUnit> {
    prop::sample::select(SizeUnit::iter().collect::<Vec<_>>())
}

proptest! {
    /// "{n}M" is n MiB
    #[test]
    fn mebibyte_suffix_is_exact(n in 1u64..(1 << 20)) {
        let size = parse_size(&format!("{}M", n)).expect("Should parse");
        prop_assert_eq!(size.bytes(), n << 20);
    }

    /// Every unit suffix scales by its multiplier
    #[test]
    fn unit_suffix_scales(n in 1u64..1024, unit in unit_strategy()) {
        let size = parse_size(&format!("{}{}", n, unit)).expect("Should parse");
        prop_assert_eq!(size.bytes(), n * unit.multiplier());
    }

    /// Display → parse round-trip is identity
    #[test]
    fn bytesize_display_roundtrip(bytes in 1u64..(1 << 50)) {
        let size = ByteSize::from_bytes(bytes);
        let parsed = parse_size(&size.to_string()).expect("Should parse");
        prop_assert_eq!(parsed, size);
    }

    /// Arbitrary text never panics the parser
    #[test]
    fn parse_size_never_panics(input in ".{0,24}") {
        let _ = parse_size(&input);
    }
}

// =============================================================================
// Share Plan Property Tests
// =============================================================================

proptest! {
    /// Accepted plans are whole sectors within the MBR limits
    #[test]
    fn plan_size_is_sector_aligned(bytes in MIN_SHARE_SIZE.bytes()..(1u64 << 36)) {
        let settings = Settings::for_home("alice", "/home/alice");
        let plan = calculate_share_plan("share", &bytes.to_string(), &settings, false)
            .expect("Should plan");
        prop_assert_eq!(plan.size.bytes() % SECTOR_SIZE, 0);
        prop_assert!(plan.size.bytes() >= bytes);
        prop_assert!(plan.size.bytes() - bytes < SECTOR_SIZE);
        prop_assert!(plan.size <= MAX_SHARE_SIZE);
    }

    /// Volume labels fit FAT's 11 character limit
    #[test]
    fn volume_label_is_valid(name in "[A-Za-z0-9._-]{1,64}") {
        let label = volume_label(&name);
        prop_assert!(!label.is_empty());
        prop_assert!(label.len() <= 11);
        let upper = label.to_ascii_uppercase();
        prop_assert_eq!(label, upper);
    }
}
