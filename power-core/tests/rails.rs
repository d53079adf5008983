//! Rail controller integration coverage: dependency and dependant checks,
//! transition ordering, and configuration read-back.

mod common;

use common::{FakeSoc, Op};
use power_core::rails::{
    ClockId, MaxLoad, PeripheralId, PowerState, RailController, RailError, RailHw, RailId,
    SourceType, VoltageLevel,
};

fn controller() -> RailController {
    RailController::default()
}

fn enable_v30(soc: &mut FakeSoc, rails: &RailController) {
    rails
        .set_rail_active(soc, RailId::V30, true, None, None)
        .unwrap();
}

#[test]
fn dcdc_rails_require_their_input_supply() {
    let rails = controller();
    for rail in [RailId::V12, RailId::V14, RailId::V18, RailId::V18P] {
        let mut soc = FakeSoc::new();
        let denied = rails.set_rail_active(
            &mut soc,
            rail,
            true,
            None,
            Some(MaxLoad::MilliAmp50),
        );
        assert_eq!(denied, Err(RailError::NotEnoughPower), "{rail:?}");

        enable_v30(&mut soc, &rails);
        rails
            .set_rail_active(&mut soc, rail, true, None, Some(MaxLoad::MilliAmp50))
            .unwrap();
        let config = rails.get_rail_config(&soc, rail, PowerState::Active).unwrap();
        assert_eq!(config.source, SourceType::DcdcHighEfficiency);
    }
}

#[test]
fn flash_rail_cascades_from_the_peripheral_rail() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V18F, true, None, None),
        Err(RailError::NotEnoughPower)
    );

    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(&mut soc, RailId::V18P, true, None, None)
        .unwrap();
    rails
        .set_rail_active(&mut soc, RailId::V18F, true, None, None)
        .unwrap();
    assert_eq!(
        rails
            .get_rail_config(&soc, RailId::V18F, PowerState::Active)
            .unwrap()
            .source,
        SourceType::PassThrough
    );
}

#[test]
fn ldo_rails_need_no_upstream_rail() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    rails
        .set_rail_active(&mut soc, RailId::V12, true, None, Some(MaxLoad::MilliAmp20))
        .unwrap();
    assert_eq!(
        rails
            .get_rail_config(&soc, RailId::V12, PowerState::Active)
            .unwrap()
            .source,
        SourceType::LdoLowRipple
    );
}

#[test]
fn active_dependants_block_disable() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(&mut soc, RailId::V12, true, None, None)
        .unwrap();

    soc.clocks_running.push(ClockId::Xtal32M);
    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V12, false, None, None),
        Err(RailError::ClockActive(ClockId::Xtal32M))
    );
    soc.clocks_running.retain(|clock| *clock != ClockId::Xtal32M);

    soc.peripherals_running.push(PeripheralId::Usb);
    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V12, false, None, None),
        Err(RailError::PeripheralActive(PeripheralId::Usb))
    );
    soc.peripherals_running.clear();

    rails
        .set_rail_active(&mut soc, RailId::V12, false, None, None)
        .unwrap();
    assert!(rails
        .get_rail_config(&soc, RailId::V12, PowerState::Active)
        .is_none());
}

#[test]
fn sleep_slot_disable_blocked_while_wake_sources_armed() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    rails
        .set_rail_sleep(
            &mut soc,
            RailId::V12,
            true,
            Some(VoltageLevel::V0_75),
            Some(MaxLoad::MicroAmp1),
        )
        .unwrap();

    soc.wakeup_armed = true;
    // The low-power oscillator is also running in the default fixture, so
    // clear it to isolate the wake-source rule.
    soc.clocks_running.clear();
    assert_eq!(
        rails.set_rail_sleep(&mut soc, RailId::V12, false, None, None),
        Err(RailError::WakeupSourceArmed)
    );

    soc.wakeup_armed = false;
    rails
        .set_rail_sleep(&mut soc, RailId::V12, false, None, None)
        .unwrap();
}

#[test]
fn peripheral_rail_disable_blocked_by_cascaded_flash_rail() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(&mut soc, RailId::V18P, true, None, None)
        .unwrap();
    rails
        .set_rail_active(&mut soc, RailId::V18F, true, None, None)
        .unwrap();

    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V18P, false, None, None),
        Err(RailError::OtherLoadsDependency)
    );

    rails
        .set_rail_active(&mut soc, RailId::V18F, false, None, None)
        .unwrap();
    rails
        .set_rail_active(&mut soc, RailId::V18P, false, None, None)
        .unwrap();
}

#[test]
fn debug_feature_pins_the_io_rail() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    soc.debug_feature = true;
    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V30, false, None, None),
        Err(RailError::DebugFeatureActive)
    );
}

#[test]
fn reapplying_the_live_configuration_is_a_no_op() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(&mut soc, RailId::V12, true, Some(VoltageLevel::V0_90), None)
        .unwrap();

    let writes_before = soc.ops.len();
    rails
        .set_rail_active(&mut soc, RailId::V12, true, Some(VoltageLevel::V0_90), None)
        .unwrap();
    assert_eq!(soc.ops.len(), writes_before);
}

#[test]
fn voltage_raise_sets_the_level_before_the_trim() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    soc.set_voltage(RailId::V12, PowerState::Active, VoltageLevel::V0_75);

    soc.ops.clear();
    rails
        .set_rail_active(&mut soc, RailId::V12, true, Some(VoltageLevel::V1_20), None)
        .unwrap();
    let level_at = soc
        .ops
        .iter()
        .position(|op| {
            matches!(
                op,
                Op::SetVoltage(RailId::V12, PowerState::Active, VoltageLevel::V1_20)
            )
        })
        .unwrap();
    let trim_at = soc
        .ops
        .iter()
        .position(|op| matches!(op, Op::Trim(RailId::V12, VoltageLevel::V1_20)))
        .unwrap();
    assert!(level_at < trim_at);
}

#[test]
fn voltage_lower_applies_the_trim_before_the_level() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(&mut soc, RailId::V12, true, Some(VoltageLevel::V1_20), None)
        .unwrap();

    soc.ops.clear();
    rails
        .set_rail_active(&mut soc, RailId::V12, true, Some(VoltageLevel::V0_75), None)
        .unwrap();
    let trim_at = soc
        .ops
        .iter()
        .position(|op| matches!(op, Op::Trim(RailId::V12, VoltageLevel::V0_75)))
        .unwrap();
    let level_at = soc
        .ops
        .iter()
        .position(|op| {
            matches!(
                op,
                Op::SetVoltage(RailId::V12, PowerState::Active, VoltageLevel::V0_75)
            )
        })
        .unwrap();
    assert!(trim_at < level_at);
}

#[test]
fn switching_sources_disables_the_previous_one() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(&mut soc, RailId::V12, true, None, Some(MaxLoad::MilliAmp20))
        .unwrap();
    rails
        .set_rail_active(&mut soc, RailId::V12, true, None, Some(MaxLoad::MilliAmp150))
        .unwrap();

    assert!(soc.source_enabled(RailId::V12, PowerState::Active, SourceType::DcdcHighEfficiency));
    assert!(!soc.source_enabled(RailId::V12, PowerState::Active, SourceType::LdoLowRipple));
}

#[test]
fn illegal_combinations_are_refused_without_register_writes() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);

    let writes_before = soc.ops.len();
    // 3.3 V is not a V12 level in any source.
    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V12, true, Some(VoltageLevel::V3_30), None),
        Err(RailError::InvalidConfig)
    );
    // No V14 source can carry 150 mA.
    assert_eq!(
        rails.set_rail_active(
            &mut soc,
            RailId::V14,
            true,
            Some(VoltageLevel::V1_40),
            Some(MaxLoad::MilliAmp150),
        ),
        Err(RailError::InvalidConfig)
    );
    assert_eq!(soc.ops.len(), writes_before);
}

#[test]
fn config_read_back_round_trips() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    enable_v30(&mut soc, &rails);
    rails
        .set_rail_active(
            &mut soc,
            RailId::V12,
            true,
            Some(VoltageLevel::V0_90),
            Some(MaxLoad::MilliAmp150),
        )
        .unwrap();

    let config = rails
        .get_rail_config(&soc, RailId::V12, PowerState::Active)
        .unwrap();
    assert_eq!(config.voltage, VoltageLevel::V0_90);
    assert_eq!(config.max_load, MaxLoad::MilliAmp150);
    assert_eq!(config.source, SourceType::DcdcHighEfficiency);

    // Re-requesting the read-back configuration resolves to the same source.
    rails
        .set_rail_active(
            &mut soc,
            RailId::V12,
            true,
            Some(config.voltage),
            Some(config.max_load),
        )
        .unwrap();
    assert_eq!(
        rails.get_rail_config(&soc, RailId::V12, PowerState::Active),
        Some(config)
    );
}

#[test]
fn a_stuck_regulator_times_out() {
    let rails = controller();
    let mut soc = FakeSoc::new();
    soc.regulator_ready = false;
    assert_eq!(
        rails.set_rail_active(&mut soc, RailId::V30, true, None, None),
        Err(RailError::RegulatorTimeout)
    );
}
