//! # Controller Scheduler
//!
//! One cooperative tick of the handheld controller:
//!
//! 1. Poll the keypad (mode keys)
//! 2. In run mode, read both joysticks and send one control frame (the link
//!    itself limits this to one packet per link tick)
//! 3. In calibration mode, fold stick samples into the session instead;
//!    nothing is transmitted
//! 4. Step the telemetry filter and refresh the status indicator
//!
//! ## Mode keys
//!
//! - Hold `Center` in run mode: start joystick calibration
//! - `Center` click while calibrating: save the new calibration
//! - `Left` click while calibrating: discard it
//!
//! ## Usage
//!
//! ```
//! use rc_link::clock::MockClock;
//! use rc_link::config::Config;
//! use rc_link::input::SharedAnalog;
//! use rc_link::link::{LoopbackRadio, ReceiverLink};
//! use rc_link::scheduler::ControllerNode;
//! use rc_link::store::MemoryStore;
//! use rc_link::ui::LogIndicator;
//!
//! let config = Config::default();
//! let clock = MockClock::new();
//! let (tx, rx) = LoopbackRadio::pair();
//! let mut receiver = ReceiverLink::new(rx, &config.link.radio())?;
//!
//! let sticks = [(); 4].map(|_| SharedAnalog::new(512));
//! let mut node = ControllerNode::boot(
//!     MemoryStore::new(),
//!     clock.clone(),
//!     SharedAnalog::new(8),
//!     sticks,
//!     tx,
//!     &config,
//! )?;
//!
//! let mut led = LogIndicator::new();
//! node.tick(&mut led);
//! assert!(receiver.poll_frame().is_some());
//! # Ok::<(), rc_link::error::RcLinkError>(())
//! ```

use std::fmt;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::input::AnalogInput;
use crate::joystick::{raw_to_pct, AxisId, Joystick, Joysticks};
use crate::keypad::{Key, KeyThresholds, KeypadEngine};
use crate::link::{ControlFrame, ControllerLink, SendOutcome, Transceiver};
use crate::store::ParameterStore;
use crate::telemetry::LinkRecord;
use crate::ui::{
    link_indicator_color, CurvePreview, MessageOverlay, OverlaySlot, StatusIndicator, TextSink,
    INDICATOR_BRIGHTNESS_PCT,
};

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Sticks are transmitted.
    Run,
    /// Joystick calibration session; transmission paused.
    Calibrating,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub mode: Mode,
    /// Frame offered to the link (run mode only).
    pub frame: Option<ControlFrame>,
    /// Link result for that frame.
    pub outcome: Option<SendOutcome>,
    /// Smoothed telemetry if the filter stepped this tick.
    pub telemetry: Option<u8>,
}

/// Handheld controller: keypad, joysticks, link and parameter store.
pub struct ControllerNode<A, K, T, C, S> {
    keypad: KeypadEngine<K, C>,
    joysticks: Joysticks<A>,
    link: ControllerLink<T, C>,
    store: S,
    clock: C,
    mode: Mode,
    overlay: OverlaySlot,
    last_frame: ControlFrame,
}

impl<A, K, T, C, S> fmt::Debug for ControllerNode<A, K, T, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerNode")
            .field("mode", &self.mode)
            .field("last_frame", &self.last_frame)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

impl<A, K, T, C, S> ControllerNode<A, K, T, C, S>
where
    A: AnalogInput,
    K: AnalogInput,
    T: Transceiver,
    C: Clock + Clone,
    S: ParameterStore,
{
    /// Builds the controller from its inputs and loads persisted settings.
    ///
    /// # Arguments
    ///
    /// * `store` - Parameter store (records missing or corrupt fall back to defaults)
    /// * `clock` - Time source shared by keypad and link
    /// * `keypad_line` - Resistor-ladder keypad input
    /// * `sticks` - Analog lines in `lx, ly, rx, ry` order
    /// * `radio` - Controller end of the radio
    /// * `config` - Loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be configured, or if forced
    /// defaults cannot be written.
    pub fn boot(
        mut store: S,
        clock: C,
        keypad_line: K,
        sticks: [A; 4],
        radio: T,
        config: &Config,
    ) -> Result<Self> {
        let [lx, ly, rx, ry] = sticks;
        let [invert_x, invert_y] = config.joystick.inversion();
        let samples = config.joystick.adc_samples;
        let mut joysticks = Joysticks::new(
            Joystick::new(lx, ly)
                .with_inversion(invert_x, invert_y)
                .with_adc_samples(samples),
            Joystick::new(rx, ry)
                .with_inversion(invert_x, invert_y)
                .with_adc_samples(samples),
        );
        for axis in AxisId::ALL {
            joysticks.set_deadzone_axis(axis, i32::from(config.joystick.deadzone));
            joysticks.set_expo_axis(axis, config.joystick.expo);
        }

        if config.store.force_defaults {
            warn!("Forcing default calibration, deadzone, expo and key thresholds");
            joysticks.force_defaults(&mut store)?;
            KeyThresholds::default().save(&mut store)?;
        }

        joysticks.load(&mut store);
        let thresholds = KeyThresholds::load(&mut store);
        let keypad = KeypadEngine::new(keypad_line, clock.clone(), thresholds, config.keypad.timing());
        let link = ControllerLink::new(radio, clock.clone(), &config.link.radio(), config.link.timing())?;

        let mut node = Self {
            keypad,
            joysticks,
            link,
            store,
            clock,
            mode: Mode::Run,
            overlay: OverlaySlot::new(),
            last_frame: ControlFrame::default(),
        };

        info!("Controller ready, start screen {:?}", config.ui.start_screen);
        if config.ui.start_screen.starts_calibration() {
            node.begin_calibration();
        }
        Ok(node)
    }

    /// Runs one scheduler tick.
    pub fn tick(&mut self, indicator: &mut dyn StatusIndicator) -> TickReport {
        self.handle_keys();

        let (frame, outcome) = match self.mode {
            Mode::Run => {
                let frame = ControlFrame::from_axes(self.joysticks.read_all());
                self.last_frame = frame;
                (Some(frame), Some(self.link.send_frame(&frame)))
            }
            Mode::Calibrating => {
                self.joysticks.sample_calibration();
                (None, None)
            }
        };

        let telemetry = self.link.update_telemetry();
        if let Some(value) = telemetry {
            indicator.set_color(link_indicator_color(value), INDICATOR_BRIGHTNESS_PCT);
        }

        TickReport {
            mode: self.mode,
            frame,
            outcome,
            telemetry,
        }
    }

    fn handle_keys(&mut self) {
        // Consumed every tick so that stale events never leak into a mode.
        let center_hold = self.keypad.consume_long_press(Key::Center);
        let center_click = self.keypad.consume_short_click(Key::Center);
        let left_click = self.keypad.consume_short_click(Key::Left);

        match self.mode {
            Mode::Run if center_hold => self.begin_calibration(),
            Mode::Calibrating if center_click => {
                if let Err(e) = self.commit_calibration() {
                    warn!("Failed to save calibration: {}", e);
                }
            }
            Mode::Calibrating if left_click => self.discard_calibration(),
            _ => {}
        }
    }

    /// Enters calibration mode.
    pub fn begin_calibration(&mut self) {
        self.joysticks.begin_calibration();
        self.overlay.set(Box::new(MessageOverlay::new(
            "calibration",
            &["CALIBRATE JOYSTICKS", "MOVE BOTH STICKS", "CENTER: SAVE", "LEFT: CANCEL"],
        )));
        self.mode = Mode::Calibrating;
    }

    /// Applies and persists the session result, returning to run mode.
    ///
    /// # Errors
    ///
    /// Propagates store errors; the new calibration stays applied.
    pub fn commit_calibration(&mut self) -> Result<()> {
        self.mode = Mode::Run;
        self.overlay.clear();
        self.joysticks.commit_calibration(&mut self.store)
    }

    /// Restores the calibration from before the session.
    pub fn discard_calibration(&mut self) {
        self.joysticks.discard_calibration();
        self.overlay.clear();
        self.mode = Mode::Run;
    }

    /// Shows the response curve of `axis`.
    pub fn show_curve(&mut self, axis: AxisId) {
        let preview = CurvePreview::new(axis.label(), self.joysticks.curve_axis(axis));
        self.overlay.set(Box::new(preview));
    }

    pub fn hide_overlay(&mut self) {
        self.overlay.clear();
    }

    /// Draws the active overlay. Returns whether anything was drawn.
    pub fn render(&self, sink: &mut dyn TextSink) -> bool {
        self.overlay.render(sink)
    }

    /// Snapshot for the telemetry log.
    #[must_use]
    pub fn record(&self) -> LinkRecord {
        LinkRecord::capture(
            self.clock.now_ms(),
            &self.last_frame,
            self.link.last_raw_telemetry(),
            self.link.telemetry_target(),
            self.link.telemetry(),
            self.link.link_lost(),
            &self.link.stats(),
        )
    }

    /// Logs link statistics at info level.
    pub fn log_link_stats(&self) {
        let stats = self.link.stats();
        let now = self.clock.now_ms();
        info!(
            "Link: {} tx, {} acked ({}%), last ack {:?} ms ago, aux {}{}",
            stats.tx_attempts,
            stats.acks,
            stats.ack_rate_pct(),
            stats.last_ack_age(now),
            self.link.telemetry(),
            if self.link.link_lost() { " [FAILSAFE]" } else { "" }
        );
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn last_frame(&self) -> ControlFrame {
        self.last_frame
    }

    pub fn keypad(&mut self) -> &mut KeypadEngine<K, C> {
        &mut self.keypad
    }

    #[must_use]
    pub fn joysticks(&self) -> &Joysticks<A> {
        &self.joysticks
    }

    pub fn joysticks_mut(&mut self) -> &mut Joysticks<A> {
        &mut self.joysticks
    }

    #[must_use]
    pub fn link(&self) -> &ControllerLink<T, C> {
        &self.link
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Raw (inverted) stick positions in percent, for diagnostics.
    pub fn raw_stick_pct(&mut self) -> [i8; 4] {
        let mut out = [0i8; 4];
        for (slot, axis) in out.iter_mut().zip(AxisId::ALL) {
            let stick = self.joysticks.stick_mut(axis.stick());
            *slot = raw_to_pct(stick.read_raw_inverted_axis(axis.axis()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::RcLinkError;
    use crate::input::gamepad::ladder;
    use crate::input::SharedAnalog;
    use crate::joystick::AxisRange;
    use crate::link::radio::MockTransceiver;
    use crate::link::{adc_to_percent, LoopbackLink, LoopbackRadio, ReceiverLink, ReceiverNode};
    use crate::store::{layout, CalibrationRecord, MemoryStore};
    use crate::ui::{LogDisplay, LogIndicator, StartScreen};

    type Node = ControllerNode<SharedAnalog, SharedAnalog, LoopbackRadio, MockClock, MemoryStore>;

    struct Rig {
        clock: MockClock,
        keypad: SharedAnalog,
        sticks: [SharedAnalog; 4],
        aux: SharedAnalog,
        air: LoopbackLink,
        receiver: ReceiverNode<LoopbackRadio, SharedAnalog, MockClock>,
        led: LogIndicator,
        node: Node,
    }

    fn rig_with(config: &Config, store: MemoryStore) -> Rig {
        let clock = MockClock::starting_at(1000);
        let keypad = SharedAnalog::new(ladder::NONE);
        let sticks = [(); 4].map(|_| SharedAnalog::new(512));
        let aux = SharedAnalog::new(0);
        let (tx, rx) = LoopbackRadio::pair();
        let air = tx.link();

        let receiver = ReceiverNode::new(
            ReceiverLink::new(rx, &config.link.radio()).unwrap(),
            aux.clone(),
            clock.clone(),
        );
        let node = ControllerNode::boot(
            store,
            clock.clone(),
            keypad.clone(),
            sticks.clone(),
            tx,
            config,
        )
        .unwrap();

        Rig {
            clock,
            keypad,
            sticks,
            aux,
            air,
            receiver,
            led: LogIndicator::new(),
            node,
        }
    }

    fn rig() -> Rig {
        rig_with(&Config::default(), MemoryStore::new())
    }

    impl Rig {
        /// Advances 1 ms and runs one receiver and one controller tick.
        fn step(&mut self) -> TickReport {
            self.clock.advance(1);
            self.receiver.tick();
            self.node.tick(&mut self.led)
        }

        fn run(&mut self, ms: u32) -> Vec<TickReport> {
            (0..ms).map(|_| self.step()).collect()
        }

        fn hold(&mut self, level: u16, ms: u32) {
            self.keypad.set(level);
            self.run(ms);
        }

        fn click(&mut self, level: u16) {
            self.hold(level, 100);
            self.hold(ladder::NONE, 50);
        }

        fn enter_calibration(&mut self) {
            self.keypad.set(ladder::CENTER);
            for _ in 0..2000 {
                self.step();
                if self.node.mode() == Mode::Calibrating {
                    break;
                }
            }
            assert_eq!(self.node.mode(), Mode::Calibrating);
            self.hold(ladder::NONE, 50);
        }
    }

    fn raw_for_percent(pct: u8) -> u16 {
        (0..=1023u16)
            .find(|&raw| adc_to_percent(raw) == pct)
            .unwrap()
    }

    fn sent(reports: &[TickReport]) -> usize {
        reports
            .iter()
            .filter(|r| matches!(r.outcome, Some(o) if o != SendOutcome::RateLimited))
            .count()
    }

    // ==================== Transmission Tests ====================

    #[test]
    fn test_one_packet_per_tx_interval() {
        let mut r = rig();
        let reports = r.run(100);
        assert_eq!(sent(&reports), 5);
        assert_eq!(r.receiver.link().packets_received(), 5);
    }

    #[test]
    fn test_frame_carries_stick_percentages() {
        let mut r = rig();
        // X is inverted by default
        r.sticks[0].set(0);
        r.sticks[1].set(1023);
        r.run(30);
        let expected = ControlFrame::new(100, 100, 0, 0);
        assert_eq!(r.receiver.last_frame(), Some(expected));
        assert_eq!(r.node.last_frame(), expected);
        assert_eq!(r.node.record().sticks, [100, 100, 0, 0]);
    }

    #[test]
    fn test_lost_packets_counted() {
        let mut r = rig();
        r.air.set_up(false);
        let reports = r.run(100);
        assert!(reports
            .iter()
            .all(|report| report.outcome != Some(SendOutcome::Acked { telemetry: None })));
        let stats = r.node.link().stats();
        assert_eq!(stats.tx_attempts, 5);
        assert_eq!(stats.acks, 0);
        assert_eq!(stats.lost(), 5);
    }

    // ==================== Calibration Tests ====================

    #[test]
    fn test_long_press_enters_calibration_and_pauses_tx() {
        let mut r = rig();
        r.enter_calibration();
        r.receiver.tick();
        assert_eq!(r.air.pending_packets(), 0);

        let reports = r.run(200);
        assert!(reports.iter().all(|report| report.frame.is_none()));
        assert_eq!(r.air.pending_packets(), 0);
        assert_eq!(r.node.mode(), Mode::Calibrating);
    }

    #[test]
    fn test_center_click_commits_and_persists() {
        let mut r = rig();
        r.enter_calibration();

        for raw in [100, 900, 512] {
            r.sticks[0].set(raw);
            r.run(5);
        }
        r.click(ladder::CENTER);

        assert_eq!(r.node.mode(), Mode::Run);
        // Inverted samples 923 and 123
        let expected = AxisRange { min: 123, max: 923, center: 523 };
        assert_eq!(r.node.joysticks().left.calibration().x, expected);
        assert_eq!(r.node.joysticks().left.calibration().y, AxisRange::from_bounds(0, 1023));

        let stored = layout::LEFT_CALIBRATION.load(r.node.store_mut()).unwrap();
        assert_eq!((stored.min_x, stored.max_x, stored.center_x), (123, 923, 523));

        r.run(40);
        assert!(r.receiver.last_rx_age().unwrap() < 40);
    }

    #[test]
    fn test_left_click_discards() {
        let mut r = rig();
        let before = *r.node.joysticks().left.calibration();
        r.enter_calibration();

        r.sticks[0].set(300);
        r.run(5);
        r.sticks[0].set(700);
        r.run(5);
        r.click(ladder::LEFT);

        assert_eq!(r.node.mode(), Mode::Run);
        assert_eq!(*r.node.joysticks().left.calibration(), before);
        assert!(layout::LEFT_CALIBRATION.load(r.node.store_mut()).is_none());
    }

    #[test]
    fn test_center_click_in_run_mode_does_nothing() {
        let mut r = rig();
        r.click(ladder::CENTER);
        assert_eq!(r.node.mode(), Mode::Run);
        assert!(layout::LEFT_CALIBRATION.load(r.node.store_mut()).is_none());
    }

    #[test]
    fn test_calibration_start_screen() {
        let mut config = Config::default();
        config.ui.start_screen = StartScreen::DirectCalibJoy;
        let mut r = rig_with(&config, MemoryStore::new());
        assert_eq!(r.node.mode(), Mode::Calibrating);

        let mut display = LogDisplay::new();
        assert!(r.node.render(&mut display));
        assert_eq!(display.row(0), "CALIBRATE JOYSTICKS");

        r.click(ladder::LEFT);
        assert!(!r.node.render(&mut display));
    }

    // ==================== Boot Tests ====================

    #[test]
    fn test_boot_loads_stored_calibration() {
        let mut store = MemoryStore::new();
        let record = CalibrationRecord {
            min_x: 100,
            max_x: 900,
            center_x: 500,
            min_y: 50,
            max_y: 950,
            center_y: 500,
        };
        layout::LEFT_CALIBRATION.save(&mut store, &record).unwrap();

        let r = rig_with(&Config::default(), store);
        assert_eq!(r.node.joysticks().left.calibration().to_record(), record);
    }

    #[test]
    fn test_boot_force_defaults_overwrites_store() {
        let mut store = MemoryStore::new();
        let record = CalibrationRecord {
            min_x: 100,
            max_x: 900,
            center_x: 500,
            min_y: 50,
            max_y: 950,
            center_y: 500,
        };
        layout::LEFT_CALIBRATION.save(&mut store, &record).unwrap();

        let mut config = Config::default();
        config.store.force_defaults = true;
        let mut r = rig_with(&config, store);

        assert_eq!(r.node.joysticks().left.calibration().x, AxisRange::full());
        let stored = layout::LEFT_CALIBRATION.load(r.node.store_mut()).unwrap();
        assert_eq!((stored.min_x, stored.max_x), (0, 1023));
        assert!(layout::KEY_THRESHOLDS.load(r.node.store_mut()).is_some());
    }

    #[test]
    fn test_boot_applies_joystick_config() {
        let mut config = Config::default();
        config.joystick.deadzone = 120;
        config.joystick.expo = 0.5;
        let r = rig_with(&config, MemoryStore::new());
        for axis in AxisId::ALL {
            assert_eq!(r.node.joysticks().deadzone_axis(axis), 120);
            assert_eq!(r.node.joysticks().expo_axis(axis), 0.5);
        }
    }

    #[test]
    fn test_boot_fails_when_radio_rejects_config() {
        let mut radio = MockTransceiver::new();
        radio
            .expect_configure()
            .returning(|_| Err(RcLinkError::Protocol("no radio".to_string())));

        let result = ControllerNode::boot(
            MemoryStore::new(),
            MockClock::new(),
            SharedAnalog::new(ladder::NONE),
            [(); 4].map(|_| SharedAnalog::new(512)),
            radio,
            &Config::default(),
        );
        assert!(matches!(result, Err(RcLinkError::Protocol(_))));
    }

    // ==================== Telemetry Tests ====================

    #[test]
    fn test_indicator_follows_telemetry() {
        let mut r = rig();
        r.aux.set(1023);
        r.run(1000);

        let aux = r.node.link().telemetry();
        assert!(aux >= 97, "smoothed {}", aux);
        assert!(!r.node.link().link_lost());
        assert_eq!(
            r.led.current(),
            Some((link_indicator_color(aux), INDICATOR_BRIGHTNESS_PCT))
        );
    }

    #[test]
    fn test_link_loss_fades_indicator_to_zero() {
        let mut r = rig();
        r.aux.set(1023);
        r.run(500);
        r.air.set_up(false);
        r.run(600);

        assert!(r.node.link().link_lost());
        assert_eq!(r.node.link().telemetry(), 0);
        assert_eq!(r.led.current(), Some((link_indicator_color(0), INDICATOR_BRIGHTNESS_PCT)));

        let record = r.node.record();
        assert!(record.link_lost);
        assert_eq!(record.aux_smoothed, 0);
    }

    #[test]
    fn test_single_glitch_rejected_end_to_end() {
        let mut r = rig();
        let samples = [50u8, 52, 4, 51, 50];
        let mut targets = Vec::new();

        for step in 0..100usize {
            if step % 20 == 0 {
                r.aux.set(raw_for_percent(samples[step / 20]));
            }
            let report = r.step();
            if let Some(SendOutcome::Acked { telemetry }) = report.outcome {
                assert_eq!(telemetry, Some(samples[step / 20]));
                targets.push(r.node.link().telemetry_target());
            }
        }

        assert_eq!(targets, vec![50, 50, 50, 51, 50]);
    }

    // ==================== Overlay Tests ====================

    #[test]
    fn test_curve_overlay() {
        let mut r = rig();
        let mut display = LogDisplay::new();
        r.node.show_curve(AxisId::RightY);
        assert!(r.node.render(&mut display));
        assert_eq!(display.row(0), "RY EXPO 1.8 DZ 40");
        r.node.hide_overlay();
        assert!(!r.node.render(&mut display));
    }

    #[test]
    fn test_raw_stick_pct() {
        let mut r = rig();
        r.sticks[0].set(1023);
        r.sticks[1].set(1023);
        assert_eq!(r.node.raw_stick_pct(), [-100, 100, 0, 0]);
    }
}
