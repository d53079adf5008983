use std::cell::RefCell;
use std::rc::Rc;

use power_core::adapters::PowerAdapter;
use power_core::orchestrator::{PowerConfig, PowerOrchestrator};
use power_core::rails::{
    ClockId, MaxLoad, PeripheralId, PowerState, RailError, RailId, VoltageLevel,
};
use power_core::repl::commands;
use power_core::timer::TimerConfig;
use power_core::watchdog::WatchdogConfig;

use crate::soc::{self, EmulatedSoc};

/// Wake-side cost the scripted UART adapter charges the sleep budget.
const UART_DRAIN_CYCLES: u32 = 16;

const EMULATOR_CONFIG: PowerConfig = PowerConfig {
    timer: TimerConfig {
        counter_mask: soc::COUNTER_MASK,
        tick_period: 320,
        guard_cycles: 3,
    },
    watchdog: WatchdogConfig {
        cycles_per_unit: 32,
        reload_value: 0x1FFF,
        idle_reset_value: 0x1FFF,
        tick_period: 320,
    },
    min_sleep_cycles: 64,
    max_defer_cycles: 1_000_000,
    base_wake_cycles: 24,
    clock_settle_cycles: 240,
};

pub const HOST_HELP: &[&str] = &[
    "host commands:",
    "  run <cycles>                advance wall time and service the tick",
    "  wake-in <cycles>            inject an external wake into the next sleep",
    "  irq [set|clear]             raise or drop the pending interrupt line",
    "  signal <name> on|off        debugger, transfer, wakeup, debug-feature, maintenance",
    "  clock <name> on|off         rclp, xtal32k, xtal32m, pll",
    "  peripheral <name> on|off    gpio, usb, otp, qspi, gpadc",
    "  adapter [veto on|off]       scripted UART adapter stats and veto switch",
    "  exit | quit                 leave the emulator",
];

#[derive(Default)]
struct UartAdapterState {
    veto: bool,
    prepares: u32,
    cancels: u32,
    wakes: u32,
    clock_readies: u32,
}

/// Scripted stand-in for a UART driver: drains its FIFO before sleep and
/// can be told to veto the next attempts from the host console.
struct UartAdapter {
    state: Rc<RefCell<UartAdapterState>>,
}

impl PowerAdapter for UartAdapter {
    fn prepare_for_sleep(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        state.prepares += 1;
        !state.veto
    }

    fn sleep_canceled(&mut self) {
        self.state.borrow_mut().cancels += 1;
    }

    fn wake_up(&mut self) {
        self.state.borrow_mut().wakes += 1;
    }

    fn clock_ready(&mut self) {
        self.state.borrow_mut().clock_readies += 1;
    }
}

pub struct Session {
    orchestrator: PowerOrchestrator<'static, EmulatedSoc>,
    uart_state: Rc<RefCell<UartAdapterState>>,
}

impl Session {
    pub fn new() -> Result<Self, RailError> {
        let mut orchestrator = PowerOrchestrator::new(EmulatedSoc::new(), EMULATOR_CONFIG);
        bring_up(&mut orchestrator)?;
        orchestrator.start();
        let uart_state = Rc::new(RefCell::new(UartAdapterState::default()));
        let adapter = Box::leak(Box::new(UartAdapter {
            state: Rc::clone(&uart_state),
        }));
        orchestrator
            .register_adapter(adapter, UART_DRAIN_CYCLES)
            .expect("register uart adapter");
        Ok(Self {
            orchestrator,
            uart_state,
        })
    }

    /// Runs one console line: host commands are handled here, everything
    /// else goes through the firmware console grammar.
    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        match self.handle_host_command(line) {
            Some(Ok(responses)) => responses,
            Some(Err(message)) => vec![message],
            None => {
                let mut responses: Vec<String> = commands::execute(&mut self.orchestrator, line)
                    .iter()
                    .map(|response| response.as_str().to_string())
                    .collect();
                if line.trim().eq_ignore_ascii_case("help") {
                    responses.extend(HOST_HELP.iter().map(|entry| (*entry).to_string()));
                }
                responses
            }
        }
    }

    fn handle_host_command(&mut self, line: &str) -> Option<Result<Vec<String>, String>> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let result = match verb {
            "run" => self.host_run(words.next()),
            "wake-in" => self.host_wake_in(words.next()),
            "irq" => self.host_irq(words.next()),
            "signal" => self.host_signal(words.next(), words.next()),
            "clock" => self.host_clock(words.next(), words.next()),
            "peripheral" => self.host_peripheral(words.next(), words.next()),
            "adapter" => self.host_adapter(words.next(), words.next()),
            _ => return None,
        };
        Some(result)
    }

    fn host_run(&mut self, cycles: Option<&str>) -> Result<Vec<String>, String> {
        let cycles = parse_cycles(cycles)?;
        self.orchestrator.hw_mut().run_for(cycles);
        self.orchestrator.tick();
        Ok(vec![format!(
            "advanced {cycles} cycles, uptime {} cycles, {} ticks serviced",
            self.orchestrator.timestamp(),
            self.orchestrator.hw().ticks_serviced
        )])
    }

    fn host_wake_in(&mut self, cycles: Option<&str>) -> Result<Vec<String>, String> {
        let cycles = parse_cycles(cycles)?;
        self.orchestrator.hw_mut().wake_event_after = Some(cycles);
        Ok(vec![format!(
            "external wake armed {cycles} cycles into the next sleep"
        )])
    }

    fn host_irq(&mut self, action: Option<&str>) -> Result<Vec<String>, String> {
        let pending = match action.unwrap_or("set") {
            "set" => true,
            "clear" => false,
            other => return Err(format!("unknown irq action `{other}`")),
        };
        self.orchestrator.hw_mut().irq_pending = pending;
        Ok(vec![format!(
            "interrupt line {}",
            if pending { "raised" } else { "cleared" }
        )])
    }

    fn host_signal(
        &mut self,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Result<Vec<String>, String> {
        let name = name.ok_or_else(|| "expected a signal name".to_string())?;
        let value = parse_switch(value)?;
        let hw = self.orchestrator.hw_mut();
        match name {
            "debugger" => hw.debugger = value,
            "transfer" => hw.transfer = value,
            "wakeup" => hw.wakeup_armed = value,
            "debug-feature" => hw.debug_feature = value,
            "maintenance" => hw.maintenance = value,
            other => return Err(format!("unknown signal `{other}`")),
        }
        Ok(vec![format!(
            "signal {name} {}",
            if value { "on" } else { "off" }
        )])
    }

    fn host_clock(
        &mut self,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Result<Vec<String>, String> {
        let name = name.ok_or_else(|| "expected a clock name".to_string())?;
        let clock = match name {
            "rclp" => ClockId::Rclp,
            "xtal32k" => ClockId::Xtal32K,
            "xtal32m" => ClockId::Xtal32M,
            "pll" => ClockId::Pll,
            other => return Err(format!("unknown clock `{other}`")),
        };
        let value = parse_switch(value)?;
        let clocks = &mut self.orchestrator.hw_mut().clocks_running;
        if value {
            if !clocks.contains(&clock) {
                clocks.push(clock);
            }
        } else {
            clocks.retain(|running| *running != clock);
        }
        Ok(vec![format!(
            "clock {name} {}",
            if value { "running" } else { "stopped" }
        )])
    }

    fn host_adapter(
        &mut self,
        action: Option<&str>,
        value: Option<&str>,
    ) -> Result<Vec<String>, String> {
        match action {
            None => {
                let state = self.uart_state.borrow();
                Ok(vec![format!(
                    "uart adapter: veto {} prepares {} cancels {} wakes {} clock-readies {}",
                    if state.veto { "on" } else { "off" },
                    state.prepares,
                    state.cancels,
                    state.wakes,
                    state.clock_readies
                )])
            }
            Some("veto") => {
                let veto = parse_switch(value)?;
                self.uart_state.borrow_mut().veto = veto;
                Ok(vec![format!(
                    "uart adapter veto {}",
                    if veto { "on" } else { "off" }
                )])
            }
            Some(other) => Err(format!("unknown adapter action `{other}`")),
        }
    }

    fn host_peripheral(
        &mut self,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Result<Vec<String>, String> {
        let name = name.ok_or_else(|| "expected a peripheral name".to_string())?;
        let peripheral = match name {
            "gpio" => PeripheralId::Gpio,
            "usb" => PeripheralId::Usb,
            "otp" => PeripheralId::Otp,
            "qspi" => PeripheralId::Qspi,
            "gpadc" => PeripheralId::Gpadc,
            other => return Err(format!("unknown peripheral `{other}`")),
        };
        let value = parse_switch(value)?;
        let peripherals = &mut self.orchestrator.hw_mut().peripherals_running;
        if value {
            if !peripherals.contains(&peripheral) {
                peripherals.push(peripheral);
            }
        } else {
            peripherals.retain(|running| *running != peripheral);
        }
        Ok(vec![format!(
            "peripheral {name} {}",
            if value { "running" } else { "stopped" }
        )])
    }
}

fn parse_cycles(word: Option<&str>) -> Result<u32, String> {
    let word = word.ok_or_else(|| "expected a cycle count".to_string())?;
    word.parse::<u32>()
        .map_err(|_| format!("invalid cycle count `{word}`"))
}

fn parse_switch(word: Option<&str>) -> Result<bool, String> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => Err(format!("expected on|off, got `{other}`")),
        None => Err("expected on|off".to_string()),
    }
}

/// Default board bring-up mirroring the firmware boot path: I/O rail,
/// core rail, and the retention slots for sleep.
fn bring_up(orchestrator: &mut PowerOrchestrator<'static, EmulatedSoc>) -> Result<(), RailError> {
    orchestrator.configure_rail(RailId::V30, PowerState::Active, true, None, None)?;
    orchestrator.configure_rail(
        RailId::V12,
        PowerState::Active,
        true,
        None,
        Some(MaxLoad::MilliAmp150),
    )?;
    orchestrator.configure_rail(RailId::V18P, PowerState::Active, true, None, None)?;
    orchestrator.configure_rail(RailId::V18F, PowerState::Active, true, None, None)?;
    orchestrator.configure_rail(
        RailId::V30,
        PowerState::Sleep,
        true,
        Some(VoltageLevel::V3_00),
        Some(MaxLoad::MicroAmp1),
    )?;
    orchestrator.configure_rail(
        RailId::V12,
        PowerState::Sleep,
        true,
        Some(VoltageLevel::V0_75),
        Some(MaxLoad::MicroAmp1),
    )?;
    orchestrator.configure_rail(RailId::V18P, PowerState::Sleep, true, None, None)?;
    orchestrator.configure_rail(RailId::V18F, PowerState::Sleep, true, None, None)?;
    Ok(())
}
