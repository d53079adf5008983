//! Console command execution and response rendering.
//!
//! Takes a raw console line, parses it against the grammar, applies it to a
//! [`PowerOrchestrator`], and renders the responses into bounded strings so
//! the same code serves both the firmware console and the host emulator.

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::orchestrator::{Platform, PowerOrchestrator, SleepOutcome, SystemState};
use crate::rails::{ALL_RAILS, MaxLoad, PowerState, RailConfig, RailId, SourceType, VoltageLevel};
use crate::telemetry::POWER_RING_CAPACITY;

use super::grammar::{ConsoleCommand, RailAction, SleepSpan, parse_line};

/// Longest rendered response line.
pub const MAX_RESPONSE_LEN: usize = 96;

/// Most lines one command can produce (`events` dumps the whole ring).
pub const MAX_RESPONSES: usize = POWER_RING_CAPACITY + 8;

pub type Response = String<MAX_RESPONSE_LEN>;
pub type ResponseSet = Vec<Response, MAX_RESPONSES>;

/// Parses and executes one console line against the orchestrator.
pub fn execute<P: Platform, const N: usize>(
    orchestrator: &mut PowerOrchestrator<'_, P, N>,
    line: &str,
) -> ResponseSet {
    let mut out = ResponseSet::new();
    match parse_line(line) {
        Ok(command) => dispatch(orchestrator, command, &mut out),
        Err(fault) => push_line(
            &mut out,
            format_args!("parse error at byte {}", fault.offset),
        ),
    }
    out
}

fn dispatch<P: Platform, const N: usize>(
    orchestrator: &mut PowerOrchestrator<'_, P, N>,
    command: ConsoleCommand,
    out: &mut ResponseSet,
) {
    match command {
        ConsoleCommand::Status => render_status(orchestrator, out),
        ConsoleCommand::Events => render_events(orchestrator, out),
        ConsoleCommand::Sleep(span) => {
            let requested = match span {
                SleepSpan::Ticks(ticks) => Some(ticks),
                SleepSpan::Forever => None,
            };
            match orchestrator.enter_idle(requested) {
                SleepOutcome::Aborted(reason) => {
                    push_line(out, format_args!("sleep aborted: {reason}"));
                }
                SleepOutcome::IdleOnly => {
                    push_line(out, format_args!("idled without powering down"));
                }
                SleepOutcome::Woke { slept_ticks } => {
                    push_line(out, format_args!("woke after {slept_ticks} ticks"));
                }
            }
        }
        ConsoleCommand::ShowMode => {
            push_line(
                out,
                format_args!(
                    "mode: user {} effective {}",
                    orchestrator.user_mode(),
                    orchestrator.effective_mode()
                ),
            );
        }
        ConsoleCommand::SetMode(mode) => {
            orchestrator.set_user_mode(mode);
            push_line(out, format_args!("user mode set to {mode}"));
        }
        ConsoleCommand::Request(mode) => {
            orchestrator.request_mode(mode);
            push_line(
                out,
                format_args!(
                    "requested {mode}, effective {}",
                    orchestrator.effective_mode()
                ),
            );
        }
        ConsoleCommand::Release(mode) => {
            orchestrator.release_mode(mode);
            push_line(
                out,
                format_args!(
                    "released {mode}, effective {}",
                    orchestrator.effective_mode()
                ),
            );
        }
        ConsoleCommand::Rail(request) => {
            let (enable, voltage, max_load) = match request.action {
                RailAction::On { voltage, max_load } => (true, voltage, max_load),
                RailAction::Off => (false, None, None),
            };
            match orchestrator.configure_rail(
                request.rail,
                request.state,
                enable,
                voltage,
                max_load,
            ) {
                Ok(()) => push_line(out, format_args!("ok")),
                Err(error) => push_line(out, format_args!("rail error: {error}")),
            }
        }
        ConsoleCommand::Defer(cycles) => {
            orchestrator.defer_sleep(cycles);
            push_line(out, format_args!("sleep deferred {cycles} cycles"));
        }
        ConsoleCommand::Help => render_help(out),
    }
}

fn render_status<P: Platform, const N: usize>(
    orchestrator: &mut PowerOrchestrator<'_, P, N>,
    out: &mut ResponseSet,
) {
    push_line(
        out,
        format_args!("state: {}", state_label(orchestrator.state())),
    );
    push_line(
        out,
        format_args!(
            "mode: user {} effective {}",
            orchestrator.user_mode(),
            orchestrator.effective_mode()
        ),
    );
    push_line(
        out,
        format_args!("uptime: {} cycles", orchestrator.timestamp()),
    );
    for rail in ALL_RAILS {
        let name = rail_label(rail);
        let active = orchestrator.rail_config(rail, PowerState::Active);
        let sleep = orchestrator.rail_config(rail, PowerState::Sleep);
        let mut text = Response::new();
        let _ = write!(text, "{name:<5}active ");
        write_slot(&mut text, active);
        let _ = text.push_str(" sleep ");
        write_slot(&mut text, sleep);
        let _ = out.push(text);
    }
}

fn render_events<P: Platform, const N: usize>(
    orchestrator: &PowerOrchestrator<'_, P, N>,
    out: &mut ResponseSet,
) {
    if orchestrator.events().is_empty() {
        push_line(out, format_args!("no events"));
        return;
    }
    for record in orchestrator.events().oldest_first() {
        push_line(
            out,
            format_args!("#{:04} @{} {}", record.id, record.timestamp, record.event),
        );
    }
}

fn render_help(out: &mut ResponseSet) {
    for text in [
        "status                          system, mode and rail summary",
        "events                          dump the power event ring",
        "sleep <ticks>|forever           run one sleep attempt",
        "mode [<name>]                   show or set the user mode",
        "request <name> / release <name> vote for a mode",
        "rail <id> <state> on|off [V] [load]",
        "defer <cycles>                  hold off powering down",
    ] {
        push_line(out, format_args!("{text}"));
    }
}

fn write_slot(text: &mut Response, config: Option<RailConfig>) {
    match config {
        Some(config) => {
            let _ = write!(
                text,
                "{} {} {}",
                source_label(config.source),
                voltage_label(config.voltage),
                load_label(config.max_load)
            );
        }
        None => {
            let _ = text.push_str("off");
        }
    }
}

fn push_line(out: &mut ResponseSet, args: core::fmt::Arguments<'_>) {
    let mut text = Response::new();
    // Overflow truncates the line rather than dropping it.
    let _ = text.write_fmt(args);
    let _ = out.push(text);
}

fn state_label(state: SystemState) -> &'static str {
    match state {
        SystemState::Active => "active",
        SystemState::Idle => "idle",
        SystemState::PoweredDown => "powered-down",
    }
}

fn rail_label(rail: RailId) -> &'static str {
    match rail {
        RailId::V12 => "v12",
        RailId::V14 => "v14",
        RailId::V18 => "v18",
        RailId::V18P => "v18p",
        RailId::V18F => "v18f",
        RailId::V30 => "v30",
    }
}

fn source_label(source: SourceType) -> &'static str {
    match source {
        SourceType::LdoLowRipple => "ldo",
        SourceType::DcdcHighEfficiency => "dcdc",
        SourceType::PassThrough => "pass",
        SourceType::Auto => "auto",
        SourceType::Clamp => "clamp",
    }
}

fn voltage_label(voltage: VoltageLevel) -> &'static str {
    match voltage {
        VoltageLevel::V0_75 => "0.75",
        VoltageLevel::V0_90 => "0.9",
        VoltageLevel::V1_20 => "1.2",
        VoltageLevel::V1_40 => "1.4",
        VoltageLevel::V1_80 => "1.8",
        VoltageLevel::V3_00 => "3.0",
        VoltageLevel::V3_30 => "3.3",
    }
}

fn load_label(load: MaxLoad) -> &'static str {
    match load {
        MaxLoad::MicroAmp1 => "1ua",
        MaxLoad::MilliAmp20 => "20ma",
        MaxLoad::MilliAmp50 => "50ma",
        MaxLoad::MilliAmp150 => "150ma",
    }
}
