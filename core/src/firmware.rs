#![deny(unsafe_code)]
#![deny(warnings)]
//! Cycle runner
//!
//! Wires the sampler, report policy and scheduler to one board's ports.
//! The board drives it like this:
//!
//! ```text
//! reset/wake ─► Firmware::boot ─► step ─► step ─► ... ─► Step::Sleep(secs)
//!                    │                                        │
//!                    └─ Err(Restart(_)) ─► system reset        └─► deep sleep
//! ```
//!
//! The first `step` after boot runs one full measurement cycle. Later steps
//! either loop in continuous mode (`sleep_interval == 0`) or persist the
//! cycle state and ask the board to sleep. Every wait polls the serial
//! console in short slices, so configuration stays responsive even during
//! hardware retry back-off.

use core::fmt::{self, Write as _};

use embedded_hal_async::delay::DelayNs;
use embedded_io::{Read, ReadReady};
use hal_abstractions::{
    BatteryMonitor, Platform, RadioTransport, RangeSensor, TextDisplay, Uptime,
};
use heapless::String;

use crate::clock::{ElapsedClock, Millis};
use crate::config::{self, Config, ConfigStoreError, LoadedConfig};
use crate::console::{self, write_settings, LineBuffer};
use crate::policy::{ReportPolicy, Trigger};
use crate::report::{BatteryVoltage, ReportPayload};
use crate::sampler::{self, Distance};
use crate::scheduler::{self, SleepPlan, CONTINUOUS_PAUSE_MS, PUBLISH_SETTLE_MS};
use crate::state::{PersistentCycleState, RetainedStore, StateError};

/// Sensor init attempts before giving up and restarting
pub const MAX_HARDWARE_FAILURES: u8 = 20;

/// Pause between hardware init attempts
pub const HARDWARE_RETRY_MS: u32 = 5000;

/// Display supply settle time before init
pub const DISPLAY_POWER_UP_MS: u32 = 1000;

/// How long the boot measurement stays readable on the display
pub const READABLE_PAUSE_MS: u32 = 3000;

/// Console poll interval during waits
pub const CONSOLE_POLL_MS: u32 = 10;

/// The board's ports, minus retained memory
pub struct Devices<P: Platform> {
    pub sensor: P::Sensor,
    pub radio: P::Radio,
    pub display: P::Display,
    pub battery: P::Battery,
    pub store: P::Store,
    pub console: P::Console,
    pub delay: P::Delay,
    pub clock: P::Clock,
}

/// Operating mode chosen at boot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Settings valid: measure and report
    Run,
    /// Settings incomplete: only the console runs
    ConfigOnly,
}

/// What the board should do after a [`Firmware::step`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Call `step` again
    Continue,
    /// State is persisted and peripherals are off; deep sleep for this many seconds
    Sleep(u32),
}

/// Why the firmware wants a system reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RestartReason {
    /// Settings block was blank; defaults have been written
    FirstBoot,
    /// `factorydefaults=yes` on the console
    FactoryReset,
    /// Configuration-only mode received a complete configuration
    Reconfigured,
    /// Range sensor never came up
    SensorInitFailed,
    /// Display never came up
    DisplayInitFailed,
}

/// Errors surfaced to the board
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirmwareError {
    /// Reset the system and boot again
    Restart(RestartReason),
    /// Retained memory unusable
    State(StateError),
    /// Settings block unusable
    ConfigStore(ConfigStoreError),
}

impl From<StateError> for FirmwareError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

impl From<ConfigStoreError> for FirmwareError {
    fn from(e: ConfigStoreError) -> Self {
        Self::ConfigStore(e)
    }
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restart(reason) => write!(f, "Restart requested: {:?}", reason),
            Self::State(e) => write!(f, "Retained state: {}", e),
            Self::ConfigStore(e) => write!(f, "Settings: {}", e),
        }
    }
}

impl core::error::Error for FirmwareError {}

/// One cycle's measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleMeasurement {
    pub distance: Distance,
    pub present: bool,
    pub battery: BatteryVoltage,
}

/// Result of [`Firmware::run_cycle`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleOutcome {
    pub measurement: CycleMeasurement,
    /// Why a report was attempted, if one was
    pub trigger: Option<Trigger>,
    /// The radio accepted the report
    pub report_sent: bool,
    /// Sleep the scheduler would pick right now
    pub sleep: SleepPlan,
}

/// `core::fmt::Write` over the console UART
struct ConsoleWriter<'a, W>(&'a mut W);

impl<W: embedded_io::Write> fmt::Write for ConsoleWriter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// The firmware
pub struct Firmware<P: Platform> {
    dev: Devices<P>,
    retained: RetainedStore<P::Retained>,
    config: Config,
    mode: Mode,
    state: PersistentCycleState,
    policy: ReportPolicy,
    line: LineBuffer,
    display_ready: bool,
    cycles: u32,
    last_publish: Option<Millis>,
}

impl<P: Platform> Firmware<P> {
    /// Load state and settings and bring up the hardware
    pub async fn boot(mut dev: Devices<P>, retained: P::Retained) -> Result<Self, FirmwareError> {
        let mut retained = RetainedStore::new(retained)?;
        let state = retained.load();

        let (config, mode) = match config::load(&mut dev.store)? {
            LoadedConfig::Blank => {
                warn!("Settings never written, storing defaults");
                config::save(&mut dev.store, &Config::default())?;
                return Err(FirmwareError::Restart(RestartReason::FirstBoot));
            }
            LoadedConfig::Invalid(config, e) => {
                warn!("Settings incomplete: {:?}", e);
                (config, Mode::ConfigOnly)
            }
            LoadedConfig::Valid(config) => (config, Mode::Run),
        };

        let mut firmware = Self {
            dev,
            retained,
            config,
            mode,
            state,
            policy: ReportPolicy::default(),
            line: LineBuffer::new(),
            display_ready: false,
            cycles: 0,
            last_publish: None,
        };

        match mode {
            Mode::ConfigOnly => firmware.print_settings(),
            Mode::Run => {
                firmware.init_display().await?;
                firmware.init_sensor().await?;
                firmware.configure_radio().await;
            }
        }
        Ok(firmware)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &PersistentCycleState {
        &self.state
    }

    fn uptime(&self) -> Millis {
        Millis(self.dev.clock.uptime_ms())
    }

    /// Elapsed time across sleeps
    pub fn now(&self) -> Millis {
        ElapsedClock::now(self.uptime(), &self.state)
    }

    /// Advance the firmware by one unit of work
    pub async fn step(&mut self) -> Result<Step, FirmwareError> {
        self.poll_console().await?;

        if self.mode == Mode::ConfigOnly {
            self.dev.delay.delay_ms(CONSOLE_POLL_MS).await;
            return Ok(Step::Continue);
        }

        if self.cycles == 0 {
            self.run_cycle().await?;
            if self.display_ready {
                self.pause(READABLE_PAUSE_MS).await?;
            }
            return Ok(Step::Continue);
        }

        if self.config.sleep_interval_secs == 0 {
            self.run_continuous().await?;
            return Ok(Step::Continue);
        }

        self.settle_after_publish().await?;
        let secs = self.sleep_plan().secs();
        self.prepare_sleep(secs)?;
        Ok(Step::Sleep(secs))
    }

    /// Measure, decide, report and persist
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, FirmwareError> {
        let measurement = self.measure().await;

        let now = self.now();
        let trigger = self.policy.decide(&self.state, measurement.present, now);
        let report_sent = match trigger {
            Some(trigger) => {
                info!("Reporting: {}", trigger.as_str());
                self.report(&measurement).await
            }
            None => {
                info!("Nothing new to report");
                false
            }
        };

        let uptime = self.uptime();
        self.policy
            .commit(&mut self.state, measurement.present, uptime, trigger, report_sent);
        self.note_rssi();
        self.retained.save(&self.state)?;
        self.cycles = self.cycles.saturating_add(1);

        let sleep = scheduler::plan(
            self.config.sleep_interval_secs,
            self.state.next_health_report,
            self.now(),
        );
        Ok(CycleOutcome {
            measurement,
            trigger,
            report_sent,
            sleep,
        })
    }

    /// One iteration with sleeping disabled: measure, always report, pause
    pub async fn run_continuous(&mut self) -> Result<CycleOutcome, FirmwareError> {
        let measurement = self.measure().await;
        let trigger = if measurement.present {
            Trigger::PresentConfirmed
        } else {
            Trigger::AbsentConfirmed
        };
        let report_sent = self.report(&measurement).await;

        let uptime = self.uptime();
        self.policy.commit(
            &mut self.state,
            measurement.present,
            uptime,
            Some(trigger),
            report_sent,
        );
        self.note_rssi();
        self.cycles = self.cycles.saturating_add(1);

        self.pause(CONTINUOUS_PAUSE_MS).await?;
        Ok(CycleOutcome {
            measurement,
            trigger: Some(trigger),
            report_sent,
            sleep: SleepPlan::Continuous,
        })
    }

    /// Sleep the scheduler picks now, after repairing an implausible deadline
    pub fn sleep_plan(&mut self) -> SleepPlan {
        let now = self.now();
        ElapsedClock::sanitize_deadline(&mut self.state, now, self.policy.period());
        scheduler::plan(
            self.config.sleep_interval_secs,
            self.state.next_health_report,
            now,
        )
    }

    /// Persist everything needed to resume after `secs` of deep sleep and
    /// power down the peripherals
    pub fn prepare_sleep(&mut self, secs: u32) -> Result<(), FirmwareError> {
        let now = self.now();
        ElapsedClock::sanitize_deadline(&mut self.state, now, self.policy.period());

        let until = self.state.next_health_report.saturating_since(now).whole_secs();
        info!(
            "Next report in {} minutes and {} seconds",
            until / 60,
            until % 60
        );

        scheduler::advance_for_sleep(&mut self.state, now, secs);
        self.retained.save(&self.state)?;

        self.dev.sensor.power_down();
        if self.config.display_enabled {
            self.dev.display.power_down();
            self.display_ready = false;
        }
        info!("Sleeping for {} seconds", secs);
        Ok(())
    }

    /// Wait `ms`, polling the console every [`CONSOLE_POLL_MS`]
    pub async fn pause(&mut self, ms: u32) -> Result<(), FirmwareError> {
        let mut remaining = ms;
        while remaining > 0 {
            self.poll_console().await?;
            let slice = remaining.min(CONSOLE_POLL_MS);
            self.dev.delay.delay_ms(slice).await;
            remaining -= slice;
        }
        Ok(())
    }

    /// Drain pending console input and run any complete commands
    pub async fn poll_console(&mut self) -> Result<(), FirmwareError> {
        let mut buf = [0u8; 32];
        while matches!(self.dev.console.read_ready(), Ok(true)) {
            let n = match self.dev.console.read(&mut buf) {
                Ok(n) if n > 0 => n,
                _ => break,
            };
            for &byte in &buf[..n] {
                if let Some(line) = self.line.push(byte) {
                    self.handle_line(&line).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), FirmwareError> {
        if writeln!(ConsoleWriter(&mut self.dev.console), "{}", line).is_err() {
            warn!("Console echo failed");
        }

        let command = match console::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Console: {:?}", e);
                self.print_settings();
                return Ok(());
            }
        };

        let mut updated = self.config;
        let applied = match updated.apply(&command) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("Console: {:?}", e);
                self.print_settings();
                return Ok(());
            }
        };

        config::save(&mut self.dev.store, &updated)?;
        self.config = updated;

        if applied.restart {
            info!("Settings reset to factory defaults");
            return Err(FirmwareError::Restart(RestartReason::FactoryReset));
        }

        if let (Some(inverted), true) = (applied.display_rotation, self.display_ready) {
            if let Err(e) = self.dev.display.set_inverted(inverted) {
                warn!("Display rotation failed: {:?}", e);
            }
        }

        match (self.mode, self.config.validate()) {
            (Mode::ConfigOnly, Ok(())) => {
                info!("Settings complete, restarting");
                Err(FirmwareError::Restart(RestartReason::Reconfigured))
            }
            (Mode::Run, Err(e)) => {
                warn!("Settings incomplete: {:?}", e);
                self.mode = Mode::ConfigOnly;
                self.print_settings();
                Ok(())
            }
            (Mode::Run, Ok(())) if applied.radio_changed => {
                self.configure_radio().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn print_settings(&mut self) {
        let valid = self.config.validate().is_ok();
        let mut out = ConsoleWriter(&mut self.dev.console);
        if write_settings(&self.config, valid, &mut out).is_err() {
            warn!("Console write failed");
        }
    }

    fn show(&mut self, text: &str) {
        if self.display_ready {
            if let Err(e) = self.dev.display.show(text) {
                warn!("Display error: {:?}", e);
            }
        }
    }

    async fn init_display(&mut self) -> Result<(), FirmwareError> {
        if !self.config.display_enabled {
            info!("Display is disabled.");
            self.dev.display.power_down();
            return Ok(());
        }

        self.pause(DISPLAY_POWER_UP_MS).await?;
        match self.dev.display.init(self.config.invert_display) {
            Ok(()) => {
                self.display_ready = true;
                if self.config.debug {
                    self.show("Init");
                }
                Ok(())
            }
            Err(e) => {
                error!("Display init failed: {:?}", e);
                self.pause(HARDWARE_RETRY_MS).await?;
                Err(FirmwareError::Restart(RestartReason::DisplayInitFailed))
            }
        }
    }

    async fn init_sensor(&mut self) -> Result<(), FirmwareError> {
        for attempt in 1..=MAX_HARDWARE_FAILURES {
            match self.dev.sensor.init() {
                Ok(()) => {
                    if self.config.debug {
                        info!("Range sensor init OK");
                        self.show("Sensor\nOK");
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt == 1 {
                        error!("Error initializing range sensor: {:?}", e);
                        self.show("Sensor\nFailure");
                    }
                    warn!(
                        "Range sensor init failed, {} attempts left",
                        MAX_HARDWARE_FAILURES - attempt
                    );
                    self.pause(HARDWARE_RETRY_MS).await?;
                }
            }
        }
        Err(FirmwareError::Restart(RestartReason::SensorInitFailed))
    }

    async fn configure_radio(&mut self) {
        if let Err(e) = self.dev.radio.configure(&self.config.link).await {
            error!("Radio configuration failed: {:?}", e);
        }
    }

    async fn measure(&mut self) -> CycleMeasurement {
        let progress = if self.display_ready {
            Some(&mut self.dev.display)
        } else {
            None
        };
        let distance = sampler::sample(
            &mut self.dev.sensor,
            &mut self.dev.delay,
            progress,
            self.config.debug,
        )
        .await;

        let mut text: String<16> = String::new();
        if write!(text, "{} mm", distance.millimeters()).is_ok() {
            self.show(&text);
        }

        let present = self.config.is_present(distance);
        let raw = self.dev.battery.read_raw();
        let battery = BatteryVoltage::from_raw(raw);

        info!(
            "Measured {} mm, package is {}",
            distance.millimeters(),
            if present { "present" } else { "absent" }
        );
        if self.config.debug {
            info!("Last RSSI was {}", self.state.last_rssi);
            info!("Battery raw {} = {} cV", raw, battery.centivolts());
        }

        CycleMeasurement {
            distance,
            present,
            battery,
        }
    }

    async fn report(&mut self, measurement: &CycleMeasurement) -> bool {
        let payload = ReportPayload {
            distance: measurement.distance,
            battery: measurement.battery,
            is_present: measurement.present,
        };
        let encoded = match payload.encode() {
            Ok(encoded) => encoded,
            Err(_) => {
                error!("Report payload does not fit");
                return false;
            }
        };

        info!("Publishing {}", encoded.as_str());
        let target = self.config.link.target_address;
        match self.dev.radio.send(target, encoded.as_bytes()).await {
            Ok(()) => {
                self.last_publish = Some(self.uptime());
                info!("Sending data successful.");
                true
            }
            Err(e) => {
                warn!("Sending data failed: {:?}", e);
                false
            }
        }
    }

    fn note_rssi(&mut self) {
        if let Some(rssi) = self.dev.radio.last_rssi() {
            self.state.last_rssi = rssi;
        }
    }

    async fn settle_after_publish(&mut self) -> Result<(), FirmwareError> {
        if let Some(sent_at) = self.last_publish {
            let since = self.uptime().saturating_since(sent_at).as_u64();
            if let Ok(since) = u32::try_from(since) {
                if since < PUBLISH_SETTLE_MS {
                    self.pause(PUBLISH_SETTLE_MS - since).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::HEALTH_REPORT_PERIOD;
    use crate::config::CONFIG_RECORD_LEN;
    use crate::mock::{
        MockBattery, MockConsole, MockDelay, MockDisplay, MockPlatform, MockRadio, MockRetained,
        MockSensor, MockStore, SimClock,
    };
    use embassy_futures::block_on;

    const PRESENT_MM: u16 = 120;
    const ABSENT_MM: u16 = 900;

    struct Rig {
        clock: SimClock,
        sensor: MockSensor,
        radio: MockRadio,
        display: MockDisplay,
        store: MockStore,
        retained: MockRetained,
        console: MockConsole,
    }

    impl Rig {
        fn blank() -> Self {
            Self {
                clock: SimClock::new(),
                sensor: MockSensor::new(&[PRESENT_MM]),
                radio: MockRadio::new(),
                display: MockDisplay::new(),
                store: MockStore::new(CONFIG_RECORD_LEN),
                retained: MockRetained::new(64),
                console: MockConsole::new(),
            }
        }

        fn with_config(settings: Config) -> Self {
            let rig = Self::blank();
            config::save(&mut rig.store.clone(), &settings).unwrap();
            rig
        }

        fn devices(&self) -> Devices<MockPlatform> {
            Devices {
                sensor: self.sensor.clone(),
                radio: self.radio.clone(),
                display: self.display.clone(),
                battery: MockBattery(3050),
                store: self.store.clone(),
                console: self.console.clone(),
                delay: MockDelay::new(&self.clock),
                clock: self.clock.clone(),
            }
        }

        /// Reset or wake: uptime restarts, retained memory survives
        fn boot(&self) -> Result<Firmware<MockPlatform>, FirmwareError> {
            self.clock.reset();
            block_on(Firmware::boot(self.devices(), self.retained.clone()))
        }

        /// One deep-sleep wake cycle
        fn wake(&self) -> CycleOutcome {
            let mut firmware = self.boot().unwrap();
            let outcome = block_on(firmware.run_cycle()).unwrap();
            firmware.prepare_sleep(outcome.sleep.secs()).unwrap();
            outcome
        }

        fn saved_state(&self) -> PersistentCycleState {
            RetainedStore::new(self.retained.clone()).unwrap().load()
        }
    }

    fn sleeping_config() -> Config {
        Config {
            sleep_interval_secs: 60,
            display_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_boot_stores_defaults_and_restarts() {
        let rig = Rig::blank();
        assert_eq!(
            rig.boot().err(),
            Some(FirmwareError::Restart(RestartReason::FirstBoot))
        );
        assert_eq!(
            config::load(&mut rig.store.clone()),
            Ok(LoadedConfig::Valid(Config::default()))
        );
        assert_eq!(rig.boot().unwrap().mode(), Mode::Run);
    }

    #[test]
    fn test_invalid_settings_enter_config_only_mode() {
        let rig = Rig::with_config(Config {
            min_distance_mm: 500,
            ..sleeping_config()
        });
        let mut firmware = rig.boot().unwrap();

        assert_eq!(firmware.mode(), Mode::ConfigOnly);
        assert!(rig.console.take_output().contains("Settings are incomplete."));
        assert_eq!(rig.sensor.init_calls(), 0);

        assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        assert_eq!(rig.sensor.reads(), 0);
        assert!(rig.radio.sent().is_empty());
    }

    #[test]
    fn test_config_only_restarts_once_settings_complete() {
        let rig = Rig::with_config(Config {
            min_distance_mm: 500,
            ..sleeping_config()
        });
        let mut firmware = rig.boot().unwrap();

        rig.console.type_line("mindistance=10\r\n");
        assert_eq!(
            block_on(firmware.step()),
            Err(FirmwareError::Restart(RestartReason::Reconfigured))
        );
        assert!(matches!(
            config::load(&mut rig.store.clone()),
            Ok(LoadedConfig::Valid(c)) if c.min_distance_mm == 10
        ));
    }

    #[test]
    fn test_cold_boot_sends_health_report() {
        let rig = Rig::with_config(sleeping_config());
        let mut firmware = rig.boot().unwrap();
        let outcome = block_on(firmware.run_cycle()).unwrap();

        assert_eq!(outcome.trigger, Some(Trigger::HealthDeadline));
        assert!(outcome.report_sent);
        assert_eq!(outcome.measurement.distance, Distance(120));
        assert!(outcome.measurement.present);
        assert_eq!(outcome.sleep, SleepPlan::Sleep { secs: 60 });
        assert_eq!(
            rig.radio.sent(),
            vec![(
                1,
                r#"{"distance":120,"battery":3.40,"isPresent":true}"#.to_string()
            )]
        );

        let state = firmware.state();
        assert!(state.present_reported);
        assert!(!state.absent_reported);
        assert!(state.last_presence);
        assert_eq!(
            state.next_health_report,
            Millis(rig.clock.uptime_ms()) + HEALTH_REPORT_PERIOD
        );
    }

    #[test]
    fn test_steps_through_cycle_into_sleep() {
        let rig = Rig::with_config(sleeping_config());
        let mut firmware = rig.boot().unwrap();

        assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        assert_eq!(block_on(firmware.step()), Ok(Step::Sleep(60)));
        assert!(rig.sensor.powered_down());

        // 250 ms sampling plus 400 ms publish settle, then 60 s of sleep
        assert_eq!(rig.clock.uptime_ms(), 650);
        assert_eq!(rig.saved_state().clock_offset, Millis(60_650));
    }

    #[test]
    fn test_presence_confirmed_across_deep_sleep() {
        let rig = Rig::with_config(sleeping_config());
        let triggers: Vec<Option<Trigger>> = [ABSENT_MM, ABSENT_MM, PRESENT_MM, PRESENT_MM, PRESENT_MM]
            .iter()
            .map(|mm| {
                rig.sensor.set_readings(&[*mm]);
                rig.wake().trigger
            })
            .collect();

        assert_eq!(
            triggers,
            vec![
                Some(Trigger::HealthDeadline),
                None,
                None,
                Some(Trigger::PresentConfirmed),
                None,
            ]
        );
        assert_eq!(rig.radio.sent().len(), 2);

        let state = rig.saved_state();
        assert!(state.present_reported);
        assert!(!state.absent_reported);
        // Five wakes with 60 s of sleep after each
        assert!(state.clock_offset >= Millis(5 * 60_000));
    }

    #[test]
    fn test_failed_send_retried_on_next_wake() {
        let rig = Rig::with_config(sleeping_config());
        rig.sensor.set_readings(&[ABSENT_MM]);

        rig.radio.set_failing(true);
        let first = rig.wake();
        assert_eq!(first.trigger, Some(Trigger::HealthDeadline));
        assert!(!first.report_sent);
        assert_eq!(first.sleep, SleepPlan::Sleep { secs: 60 });
        let state = rig.saved_state();
        assert!(!state.absent_reported);
        assert!(!state.present_reported);
        assert!(state.next_health_report > Millis(60_000));

        rig.radio.set_failing(false);
        let second = rig.wake();
        assert_eq!(second.trigger, Some(Trigger::AbsentConfirmed));
        assert!(second.report_sent);
        assert!(rig.saved_state().absent_reported);
    }

    #[test]
    fn test_radio_outage_still_deep_sleeps() {
        let rig = Rig::with_config(Config {
            sleep_interval_secs: 300,
            ..sleeping_config()
        });
        rig.radio.set_failing(true);

        let plans: Vec<Step> = (0..5)
            .map(|_| {
                let mut firmware = rig.boot().unwrap();
                assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
                block_on(firmware.step()).unwrap()
            })
            .collect();

        assert_eq!(plans, vec![Step::Sleep(300); 5]);
        assert!(rig.radio.sent().is_empty());
        let state = rig.saved_state();
        assert!(!state.present_reported);
        assert!(!state.absent_reported);
    }

    #[test]
    fn test_health_report_due_after_an_hour_of_sleep() {
        let rig = Rig::with_config(Config {
            sleep_interval_secs: 1500,
            ..sleeping_config()
        });

        assert_eq!(rig.wake().trigger, Some(Trigger::HealthDeadline));
        let quiet = rig.wake();
        assert_eq!(quiet.trigger, None);
        assert_eq!(quiet.sleep, SleepPlan::Sleep { secs: 1500 });
        let shortened = rig.wake();
        assert_eq!(shortened.trigger, None);
        assert_eq!(shortened.sleep, SleepPlan::Sleep { secs: 599 });
        // Whole-second truncation leaves the wake 250 ms short of the deadline
        let short = rig.wake();
        assert_eq!(short.trigger, None);
        assert_eq!(short.sleep, SleepPlan::Sleep { secs: 0 });
        assert_eq!(rig.wake().trigger, Some(Trigger::HealthDeadline));
    }

    #[test]
    fn test_sensor_init_gives_up_after_retries() {
        let rig = Rig::with_config(sleeping_config());
        rig.sensor.fail_init(usize::MAX);

        assert_eq!(
            rig.boot().err(),
            Some(FirmwareError::Restart(RestartReason::SensorInitFailed))
        );
        assert_eq!(rig.sensor.init_calls(), usize::from(MAX_HARDWARE_FAILURES));
        assert_eq!(
            rig.clock.uptime_ms(),
            u64::from(MAX_HARDWARE_FAILURES) * u64::from(HARDWARE_RETRY_MS)
        );
    }

    #[test]
    fn test_sensor_init_recovers() {
        let rig = Rig::with_config(sleeping_config());
        rig.sensor.fail_init(3);
        assert!(rig.boot().is_ok());
        assert_eq!(rig.sensor.init_calls(), 4);
    }

    #[test]
    fn test_display_init_failure_restarts() {
        let rig = Rig::with_config(Config {
            display_enabled: true,
            ..sleeping_config()
        });
        rig.display.fail_init();
        assert_eq!(
            rig.boot().err(),
            Some(FirmwareError::Restart(RestartReason::DisplayInitFailed))
        );
    }

    #[test]
    fn test_display_shows_measurement() {
        let rig = Rig::with_config(Config {
            display_enabled: true,
            invert_display: true,
            ..sleeping_config()
        });
        let mut firmware = rig.boot().unwrap();
        assert_eq!(rig.display.inverted(), Some(true));

        block_on(firmware.run_cycle()).unwrap();
        assert_eq!(rig.display.progress_ticks(), crate::sampler::SAMPLE_COUNT);
        assert_eq!(rig.display.shown().last().map(|s| s.as_str()), Some("120 mm"));

        rig.console.type_line("invertdisplay=0\n");
        block_on(firmware.poll_console()).unwrap();
        assert_eq!(rig.display.inverted(), Some(false));

        firmware.prepare_sleep(60).unwrap();
        assert!(rig.display.powered_down());
    }

    #[test]
    fn test_console_command_applied_during_pause() {
        let rig = Rig::with_config(sleeping_config());
        let mut firmware = rig.boot().unwrap();
        rig.console.take_output();

        rig.console.type_line("sleeptime=120\r\n");
        block_on(firmware.pause(50)).unwrap();

        assert_eq!(firmware.config().sleep_interval_secs, 120);
        assert!(rig.console.take_output().contains("sleeptime=120"));
        assert!(matches!(
            config::load(&mut rig.store.clone()),
            Ok(LoadedConfig::Valid(c)) if c.sleep_interval_secs == 120
        ));
    }

    #[test]
    fn test_link_change_reconfigures_radio() {
        let rig = Rig::with_config(sleeping_config());
        let mut firmware = rig.boot().unwrap();
        assert_eq!(rig.radio.configured().len(), 1);

        rig.console.type_line("loRaAddress=9\n");
        block_on(firmware.poll_console()).unwrap();

        let configured = rig.radio.configured();
        assert_eq!(configured.len(), 2);
        assert_eq!(configured[1].address, 9);
    }

    #[test]
    fn test_invalid_setting_while_running_stops_reporting() {
        let rig = Rig::with_config(Config {
            sleep_interval_secs: 0,
            ..sleeping_config()
        });
        let mut firmware = rig.boot().unwrap();
        assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        assert_eq!(rig.radio.sent().len(), 1);
        rig.console.take_output();

        rig.console.type_line("loRaSpreadingFactor=99\n");
        assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        assert_eq!(firmware.mode(), Mode::ConfigOnly);
        assert!(rig.console.take_output().contains("Settings are incomplete."));

        for _ in 0..3 {
            assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        }
        assert_eq!(rig.radio.sent().len(), 1);
        assert_eq!(rig.radio.configured().len(), 1);
        assert!(matches!(
            config::load(&mut rig.store.clone()),
            Ok(LoadedConfig::Invalid(c, _)) if c.link.spreading_factor == 99
        ));

        rig.console.type_line("loRaSpreadingFactor=9\n");
        assert_eq!(
            block_on(firmware.step()),
            Err(FirmwareError::Restart(RestartReason::Reconfigured))
        );
    }

    #[test]
    fn test_factory_reset_from_console() {
        let rig = Rig::with_config(sleeping_config());
        let mut firmware = rig.boot().unwrap();

        rig.console.type_line("factorydefaults=yes\n");
        assert_eq!(
            block_on(firmware.poll_console()),
            Err(FirmwareError::Restart(RestartReason::FactoryReset))
        );
        assert_eq!(
            config::load(&mut rig.store.clone()),
            Ok(LoadedConfig::Valid(Config::default()))
        );
    }

    #[test]
    fn test_bad_command_prints_settings() {
        let rig = Rig::with_config(sleeping_config());
        let mut firmware = rig.boot().unwrap();
        rig.console.take_output();
        let writes = rig.store.writes();

        rig.console.type_line("volume=11\n");
        block_on(firmware.poll_console()).unwrap();

        let output = rig.console.take_output();
        assert!(output.contains("sleeptime=<seconds to sleep between measurements> (60)"));
        assert!(output.contains("Settings are complete."));
        assert_eq!(rig.store.writes(), writes);
    }

    #[test]
    fn test_continuous_mode_reports_every_iteration() {
        let rig = Rig::with_config(Config {
            sleep_interval_secs: 0,
            ..sleeping_config()
        });
        let mut firmware = rig.boot().unwrap();

        for _ in 0..3 {
            assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        }
        // Boot cycle plus two continuous iterations
        assert_eq!(rig.radio.sent().len(), 3);
        assert!(rig.clock.uptime_ms() >= 2 * u64::from(CONTINUOUS_PAUSE_MS));
        assert!(firmware.state().latches_consistent());
    }

    #[test]
    fn test_bogus_deadline_forces_immediate_wake() {
        let rig = Rig::with_config(sleeping_config());
        let mut store = RetainedStore::new(rig.retained.clone()).unwrap();
        store
            .save(&PersistentCycleState {
                next_health_report: Millis(u64::MAX / 2),
                clock_offset: Millis(10_000),
                last_presence: true,
                present_reported: true,
                ..Default::default()
            })
            .unwrap();

        let mut firmware = rig.boot().unwrap();
        assert_eq!(block_on(firmware.step()), Ok(Step::Continue));
        assert!(rig.radio.sent().is_empty());
        assert_eq!(block_on(firmware.step()), Ok(Step::Sleep(0)));

        let saved = rig.saved_state();
        assert!(saved.next_health_report <= saved.clock_offset);
    }

    #[test]
    fn test_rssi_kept_for_diagnostics() {
        let rig = Rig::with_config(sleeping_config());
        rig.radio.set_rssi(-61);
        rig.wake();
        assert_eq!(rig.saved_state().last_rssi, -61);
    }
}
