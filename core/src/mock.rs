//! In-memory ports for host tests
//!
//! Every mock is a cheap handle over shared state, so a test can keep a
//! clone after handing one to the firmware and inspect it later.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{
    BatteryMonitor, ConfigStore, LinkParams, Platform, RadioTransport, RangeSensor,
    RetainedMemory, TextDisplay, Uptime,
};

/// Error returned by failing mocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MockError;

/// Simulated uptime, advanced only by [`MockDelay`]
#[derive(Clone, Default)]
pub struct SimClock {
    ns: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uptime_ms(&self) -> u64 {
        self.ns.get() / 1_000_000
    }

    pub fn advance_ms(&self, ms: u64) {
        self.ns.set(self.ns.get() + ms * 1_000_000);
    }

    /// Simulate a reset: uptime restarts from zero
    pub fn reset(&self) {
        self.ns.set(0);
    }
}

impl Uptime for SimClock {
    fn uptime_ms(&self) -> u64 {
        SimClock::uptime_ms(self)
    }
}

/// Delay that completes immediately and advances the [`SimClock`]
pub struct MockDelay {
    clock: SimClock,
}

impl MockDelay {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
        }
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.ns.set(self.clock.ns.get() + u64::from(ns));
    }

    async fn delay_us(&mut self, us: u32) {
        self.clock.ns.set(self.clock.ns.get() + u64::from(us) * 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ms(u64::from(ms));
    }
}

#[derive(Default)]
struct SensorInner {
    readings: Vec<u16>,
    next: usize,
    reads: usize,
    init_failures: usize,
    init_calls: usize,
    powered_down: bool,
}

/// Range sensor replaying a fixed list of readings (the last one repeats)
#[derive(Clone, Default)]
pub struct MockSensor {
    inner: Rc<RefCell<SensorInner>>,
}

impl MockSensor {
    pub fn new(readings: &[u16]) -> Self {
        let sensor = Self::default();
        sensor.set_readings(readings);
        sensor
    }

    /// Replace the readings; the next read starts from the first one
    pub fn set_readings(&self, readings: &[u16]) {
        let mut inner = self.inner.borrow_mut();
        inner.readings = readings.to_vec();
        inner.next = 0;
    }

    /// Fail the next `count` init attempts
    pub fn fail_init(&self, count: usize) {
        self.inner.borrow_mut().init_failures = count;
    }

    pub fn reads(&self) -> usize {
        self.inner.borrow().reads
    }

    pub fn init_calls(&self) -> usize {
        self.inner.borrow().init_calls
    }

    pub fn powered_down(&self) -> bool {
        self.inner.borrow().powered_down
    }
}

impl RangeSensor for MockSensor {
    type Error = MockError;

    fn init(&mut self) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        inner.init_calls += 1;
        inner.powered_down = false;
        if inner.init_failures > 0 {
            inner.init_failures -= 1;
            return Err(MockError);
        }
        Ok(())
    }

    fn read_mm(&mut self) -> Result<u16, MockError> {
        let mut inner = self.inner.borrow_mut();
        inner.reads += 1;
        let index = inner.next.min(inner.readings.len().saturating_sub(1));
        inner.next += 1;
        inner.readings.get(index).copied().ok_or(MockError)
    }

    fn power_down(&mut self) {
        self.inner.borrow_mut().powered_down = true;
    }
}

#[derive(Default)]
struct RadioInner {
    sent: Vec<(u16, String)>,
    configured: Vec<LinkParams>,
    failing: bool,
    rssi: Option<i16>,
}

/// Radio that records frames instead of transmitting them
#[derive(Clone, Default)]
pub struct MockRadio {
    inner: Rc<RefCell<RadioInner>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail (the frame is not recorded)
    pub fn set_failing(&self, failing: bool) {
        self.inner.borrow_mut().failing = failing;
    }

    pub fn set_rssi(&self, rssi: i16) {
        self.inner.borrow_mut().rssi = Some(rssi);
    }

    pub fn sent(&self) -> Vec<(u16, String)> {
        self.inner.borrow().sent.clone()
    }

    pub fn configured(&self) -> Vec<LinkParams> {
        self.inner.borrow().configured.clone()
    }
}

impl RadioTransport for MockRadio {
    type Error = MockError;

    async fn configure(&mut self, params: &LinkParams) -> Result<(), MockError> {
        self.inner.borrow_mut().configured.push(*params);
        Ok(())
    }

    async fn send(&mut self, target: u16, payload: &[u8]) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        if inner.failing {
            return Err(MockError);
        }
        let text = std::str::from_utf8(payload).map_err(|_| MockError)?;
        inner.sent.push((target, text.to_string()));
        Ok(())
    }

    fn last_rssi(&self) -> Option<i16> {
        self.inner.borrow().rssi
    }
}

#[derive(Default)]
struct DisplayInner {
    shown: Vec<String>,
    progress: usize,
    inverted: Option<bool>,
    fail_init: bool,
    fail_drawing: bool,
    powered_down: bool,
}

/// Display that keeps a log of everything shown
#[derive(Clone, Default)]
pub struct MockDisplay {
    inner: Rc<RefCell<DisplayInner>>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_init(&self) {
        self.inner.borrow_mut().fail_init = true;
    }

    /// Make text and progress drawing fail
    pub fn fail_drawing(&self) {
        self.inner.borrow_mut().fail_drawing = true;
    }

    pub fn shown(&self) -> Vec<String> {
        self.inner.borrow().shown.clone()
    }

    pub fn progress_ticks(&self) -> usize {
        self.inner.borrow().progress
    }

    /// `None` until initialised
    pub fn inverted(&self) -> Option<bool> {
        self.inner.borrow().inverted
    }

    pub fn powered_down(&self) -> bool {
        self.inner.borrow().powered_down
    }
}

impl TextDisplay for MockDisplay {
    type Error = MockError;

    fn init(&mut self, inverted: bool) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_init {
            return Err(MockError);
        }
        inner.inverted = Some(inverted);
        inner.powered_down = false;
        Ok(())
    }

    fn show(&mut self, text: &str) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_drawing {
            return Err(MockError);
        }
        inner.shown.push(text.to_string());
        Ok(())
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<(), MockError> {
        self.inner.borrow_mut().inverted = Some(inverted);
        Ok(())
    }

    fn show_progress(&mut self, _step: usize) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_drawing {
            return Err(MockError);
        }
        inner.progress += 1;
        Ok(())
    }

    fn power_down(&mut self) {
        self.inner.borrow_mut().powered_down = true;
    }
}

/// Battery reading a fixed raw count
#[derive(Clone, Copy)]
pub struct MockBattery(pub u16);

impl BatteryMonitor for MockBattery {
    fn read_raw(&mut self) -> u16 {
        self.0
    }
}

#[derive(Default)]
struct StoreInner {
    bytes: Vec<u8>,
    fail_writes: bool,
    writes: usize,
}

/// Settings block, erased (0xFF) when created
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl MockStore {
    pub fn new(capacity: usize) -> Self {
        let store = Self::default();
        store.inner.borrow_mut().bytes = vec![0xFF; capacity];
        store
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Flip every bit of the byte at `offset`
    pub fn corrupt(&self, offset: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.bytes[offset] ^= 0xFF;
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.borrow().bytes.clone()
    }

    pub fn writes(&self) -> usize {
        self.inner.borrow().writes
    }
}

impl ConfigStore for MockStore {
    type Error = MockError;

    fn capacity(&self) -> usize {
        self.inner.borrow().bytes.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), MockError> {
        let inner = self.inner.borrow();
        let src = inner.bytes.get(..buf.len()).ok_or(MockError)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes || bytes.len() > inner.bytes.len() {
            return Err(MockError);
        }
        inner.bytes[..bytes.len()].copy_from_slice(bytes);
        inner.writes += 1;
        Ok(())
    }
}

/// Battery-backed scratch memory, zeroed when created
#[derive(Clone)]
pub struct MockRetained {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl MockRetained {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(vec![0; capacity])),
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }
}

impl RetainedMemory for MockRetained {
    fn capacity(&self) -> usize {
        self.bytes.borrow().len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        let bytes = self.bytes.borrow();
        for (i, out) in buf.iter_mut().enumerate() {
            *out = bytes.get(offset + i).copied().unwrap_or(0);
        }
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.borrow_mut();
        for (i, b) in data.iter().enumerate() {
            if let Some(slot) = bytes.get_mut(offset + i) {
                *slot = *b;
            }
        }
    }
}

#[derive(Default)]
struct ConsoleInner {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// Serial console fed from a test script
#[derive(Clone, Default)]
pub struct MockConsole {
    inner: Rc<RefCell<ConsoleInner>>,
}

impl MockConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if typed at the terminal
    pub fn type_line(&self, text: &str) {
        self.inner.borrow_mut().input.extend(text.as_bytes());
    }

    /// Everything written so far, drained
    pub fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut self.inner.borrow_mut().output);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl embedded_io::ErrorType for MockConsole {
    type Error = Infallible;
}

impl embedded_io::Read for MockConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut inner = self.inner.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match inner.input.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for MockConsole {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        Ok(!self.inner.borrow().input.is_empty())
    }
}

impl embedded_io::Write for MockConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.inner.borrow_mut().output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Test board
pub struct MockPlatform;

impl Platform for MockPlatform {
    type Sensor = MockSensor;
    type Radio = MockRadio;
    type Display = MockDisplay;
    type Battery = MockBattery;
    type Store = MockStore;
    type Retained = MockRetained;
    type Console = MockConsole;
    type Delay = MockDelay;
    type Clock = SimClock;
}
