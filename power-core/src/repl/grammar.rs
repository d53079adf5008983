#![allow(clippy::module_name_repetitions)]

//! Parser for the power console grammar.
//!
//! Commands are short single-line requests, parsed with `winnow` combinators
//! straight off the input string. Keywords are lowercase; every command must
//! consume its whole line.

use winnow::ascii::{dec_uint, space1};
use winnow::combinator::{alt, eof, opt, preceded, terminated};
use winnow::prelude::*;

use crate::orchestrator::SleepMode;
use crate::rails::{MaxLoad, PowerState, RailId, VoltageLevel};

/// How long a `sleep` command may stop the core for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SleepSpan {
    /// Sleep for this many scheduler ticks.
    Ticks(u32),
    /// Sleep until an external event, no wake trigger.
    Forever,
}

/// What a `rail` command does to the addressed slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RailAction {
    On {
        voltage: Option<VoltageLevel>,
        max_load: Option<MaxLoad>,
    },
    Off,
}

/// Fully addressed rail request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RailRequest {
    pub rail: RailId,
    pub state: PowerState,
    pub action: RailAction,
}

/// One parsed console command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    /// `status`: system state, mode, and rail configuration summary.
    Status,
    /// `events`: dump the power event ring.
    Events,
    /// `sleep <ticks>|forever`: run one sleep attempt.
    Sleep(SleepSpan),
    /// `mode`: show the user and effective modes.
    ShowMode,
    /// `mode <name>`: set the user default mode.
    SetMode(SleepMode),
    /// `request <name>`: add a mode vote.
    Request(SleepMode),
    /// `release <name>`: drop a mode vote.
    Release(SleepMode),
    /// `rail <name> <state> on|off [...]`: rail transition.
    Rail(RailRequest),
    /// `defer <cycles>`: push the sleep barrier out.
    Defer(u32),
    /// `help`: command summary.
    Help,
}

/// Byte offset at which the line stopped matching the grammar.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParseFault {
    pub offset: usize,
}

/// Parses one console line.
///
/// # Errors
///
/// Returns the byte offset where the line diverged from the grammar.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseFault> {
    command.parse(line.trim()).map_err(|error| ParseFault {
        offset: error.offset(),
    })
}

fn command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    alt((
        terminated("status", eof).value(ConsoleCommand::Status),
        terminated("events", eof).value(ConsoleCommand::Events),
        sleep_command,
        mode_command,
        request_command,
        release_command,
        rail_command,
        defer_command,
        terminated("help", eof).value(ConsoleCommand::Help),
    ))
    .parse_next(input)
}

fn sleep_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    preceded(("sleep", space1), terminated(sleep_span, eof))
        .map(ConsoleCommand::Sleep)
        .parse_next(input)
}

fn sleep_span(input: &mut &str) -> ModalResult<SleepSpan> {
    alt((
        "forever".value(SleepSpan::Forever),
        dec_uint.map(SleepSpan::Ticks),
    ))
    .parse_next(input)
}

fn mode_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    preceded("mode", terminated(opt(preceded(space1, mode_name)), eof))
        .map(|mode| mode.map_or(ConsoleCommand::ShowMode, ConsoleCommand::SetMode))
        .parse_next(input)
}

fn request_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    preceded(("request", space1), terminated(mode_name, eof))
        .map(ConsoleCommand::Request)
        .parse_next(input)
}

fn release_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    preceded(("release", space1), terminated(mode_name, eof))
        .map(ConsoleCommand::Release)
        .parse_next(input)
}

fn defer_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    preceded(("defer", space1), terminated(dec_uint, eof))
        .map(ConsoleCommand::Defer)
        .parse_next(input)
}

fn rail_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    preceded(
        ("rail", space1),
        terminated(
            (
                rail_name,
                preceded(space1, state_name),
                preceded(space1, rail_action),
            ),
            eof,
        ),
    )
    .map(|(rail, state, action)| {
        ConsoleCommand::Rail(RailRequest {
            rail,
            state,
            action,
        })
    })
    .parse_next(input)
}

fn rail_action(input: &mut &str) -> ModalResult<RailAction> {
    alt((
        "off".value(RailAction::Off),
        preceded(
            "on",
            (
                opt(preceded(space1, voltage_name)),
                opt(preceded(space1, load_name)),
            ),
        )
        .map(|(voltage, max_load)| RailAction::On { voltage, max_load }),
    ))
    .parse_next(input)
}

fn mode_name(input: &mut &str) -> ModalResult<SleepMode> {
    alt((
        "active".value(SleepMode::Active),
        "idle".value(SleepMode::Idle),
        "extended".value(SleepMode::ExtendedSleep),
        "deep".value(SleepMode::DeepSleep),
        "hibernation".value(SleepMode::Hibernation),
    ))
    .parse_next(input)
}

// Longest names first; several share the "v18" prefix.
fn rail_name(input: &mut &str) -> ModalResult<RailId> {
    alt((
        "v18p".value(RailId::V18P),
        "v18f".value(RailId::V18F),
        "v18".value(RailId::V18),
        "v12".value(RailId::V12),
        "v14".value(RailId::V14),
        "v30".value(RailId::V30),
    ))
    .parse_next(input)
}

fn state_name(input: &mut &str) -> ModalResult<PowerState> {
    alt((
        "active".value(PowerState::Active),
        "sleep".value(PowerState::Sleep),
    ))
    .parse_next(input)
}

fn voltage_name(input: &mut &str) -> ModalResult<VoltageLevel> {
    alt((
        "0.75".value(VoltageLevel::V0_75),
        "0.9".value(VoltageLevel::V0_90),
        "1.2".value(VoltageLevel::V1_20),
        "1.4".value(VoltageLevel::V1_40),
        "1.8".value(VoltageLevel::V1_80),
        "3.0".value(VoltageLevel::V3_00),
        "3.3".value(VoltageLevel::V3_30),
    ))
    .parse_next(input)
}

fn load_name(input: &mut &str) -> ModalResult<MaxLoad> {
    alt((
        "150ma".value(MaxLoad::MilliAmp150),
        "50ma".value(MaxLoad::MilliAmp50),
        "20ma".value(MaxLoad::MilliAmp20),
        "1ua".value(MaxLoad::MicroAmp1),
    ))
    .parse_next(input)
}
