#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

//! Property-based tests for register encodings and pacing math.

use platform::dma::{ti, DREQ_PWM};
use platform::mailbox::{decode_property, encode_property, RESPONSE_SUCCESS};
use platform::revision::parse_soc_ranges;
use platform::{BusAddr, ClockGenerator, ControlBlock, DmaChannel, PacingPlan};

proptest::proptest! {
    /// PacingPlan::new never panics, whatever the inputs.
    #[test]
    fn pacing_plan_never_panics(reference in 0u32..=u32::MAX, rate in 0u32..=u32::MAX) {
        let _ = PacingPlan::new(reference, rate);
    }

    /// Every accepted plan reproduces the requested rate within one divisor step.
    #[test]
    fn pacing_plan_rate_within_one_step(rate in 8_000u32..=192_000u32) {
        let plan = PacingPlan::new(500_000_000, rate).unwrap();
        let step = f64::from(rate) / f64::from(plan.divisor_raw());
        assert!((plan.actual_sample_rate_hz() - f64::from(rate)).abs() <= step,
            "rate {} gave {}", rate, plan.actual_sample_rate_hz());
    }

    /// Divisor words always carry the password and never leak into it.
    #[test]
    fn divisor_word_keeps_password(raw in 0u32..=u32::MAX) {
        let word = ClockGenerator::divisor_word(raw);
        assert_eq!(word & 0xFF00_0000, 0x5A00_0000);
        assert_eq!(word & 0x00FF_FFFF, raw & 0x00FF_FFFF);
    }

    /// Channel construction accepts exactly 0..=15.
    #[test]
    fn dma_channel_bounds(index in 0u8..=255u8) {
        assert_eq!(DmaChannel::new(index).is_ok(), index <= 15);
    }

    /// Paced blocks always keep DREQ gating and the PWM peripheral map.
    #[test]
    fn paced_block_flags(src in 0u32..=u32::MAX, dst in 0u32..=u32::MAX, next in 0u32..=u32::MAX) {
        let cb = ControlBlock::paced_write(BusAddr::new(src), BusAddr::new(dst), DREQ_PWM)
            .with_next(BusAddr::new(next));
        let words = cb.to_words();
        assert_eq!(words[0] & ti::DEST_DREQ, ti::DEST_DREQ);
        assert_eq!(words[1], src);
        assert_eq!(words[2], dst);
        assert_eq!(words[5], next);
    }

    /// soc/ranges parsing never panics on arbitrary bytes.
    #[test]
    fn soc_ranges_never_panics(bytes in proptest::collection::vec(0u8..=255u8, 0..32)) {
        let _ = parse_soc_ranges(&bytes);
    }

    /// A processed property message always yields the words the firmware wrote.
    #[test]
    fn property_message_round_trip(tag in 0u32..=u32::MAX, value in 0u32..=u32::MAX) {
        let mut msg = encode_property(tag, &[0], 1);
        msg[1] = RESPONSE_SUCCESS;
        msg[5] = value;
        assert_eq!(decode_property(tag, &msg).unwrap(), &[value]);
    }
}
