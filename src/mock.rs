//! Simulated register blocks for host tests

use core::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::gpio::{ConfigReg, GpioRegExt, Port};
use crate::interrupt::IrqControl;
use crate::rcc::RccRegExt;
use crate::time::Hertz;
use crate::timers::{Channel, Instance, TimRegExt};
use crate::Error;

/// Clock tree whose oscillator settles at once unless told otherwise
pub struct MockRcc {
    pub hsi: Hertz,
    pub hsi_on: bool,
    pub hsi_trim: u8,
    pub hsi_stuck: bool,
    pub pll_on: bool,
    pub pll_stuck: bool,
    pub sysclk_is_hsi: bool,
    pub refuse_switch: bool,
    pub flash_wait_states: Option<u8>,
    pub prescalers: Option<(u8, u8, u8)>,
    pub gpio_enabled: Vec<Port>,
    pub timers_enabled: Vec<Instance>,
}

impl MockRcc {
    pub fn new(hsi: Hertz) -> Self {
        MockRcc {
            hsi,
            hsi_on: false,
            hsi_trim: 0,
            hsi_stuck: false,
            pll_on: false,
            pll_stuck: false,
            sysclk_is_hsi: false,
            refuse_switch: false,
            flash_wait_states: None,
            prescalers: None,
            gpio_enabled: Vec::new(),
            timers_enabled: Vec::new(),
        }
    }
}

impl RccRegExt for MockRcc {
    fn hsi_frequency(&self) -> Hertz {
        self.hsi
    }

    fn enable_hsi(&mut self, trim: u8) {
        self.hsi_on = true;
        self.hsi_trim = trim;
    }

    fn hsi_ready(&self) -> bool {
        self.hsi_on && !self.hsi_stuck
    }

    fn disable_pll(&mut self) {
        if !self.pll_stuck {
            self.pll_on = false;
        }
    }

    fn pll_ready(&self) -> bool {
        self.pll_on
    }

    fn set_flash_latency(&mut self, wait_states: u8) {
        self.flash_wait_states = Some(wait_states);
    }

    fn select_hsi(&mut self, hpre: u8, ppre1: u8, ppre2: u8) -> Result<(), Error> {
        self.prescalers = Some((hpre, ppre1, ppre2));
        self.sysclk_is_hsi = !self.refuse_switch;
        Ok(())
    }

    fn hsi_selected(&self) -> bool {
        self.sysclk_is_hsi
    }

    fn enable_gpio(&mut self, port: Port) {
        self.gpio_enabled.push(port);
    }

    fn enable_timer(&mut self, timer: Instance) {
        self.timers_enabled.push(timer);
    }
}

/// GPIO port with an output latch but no pads
pub struct MockPort {
    pub port: Port,
    pub moder: Cell<u32>,
    pub otyper: Cell<u32>,
    pub ospeedr: Cell<u32>,
    pub pupdr: Cell<u32>,
    pub odr: Cell<u32>,
    /// Latch writes that happened while the pin was not yet an output
    pub writes_before_output: Cell<u32>,
}

impl MockPort {
    /// Port that lives for the rest of the test binary, like a register block
    pub fn leak(port: Port) -> &'static MockPort {
        Box::leak(Box::new(MockPort {
            port,
            moder: Cell::new(0),
            otyper: Cell::new(0),
            ospeedr: Cell::new(0),
            pupdr: Cell::new(0),
            odr: Cell::new(0),
            writes_before_output: Cell::new(0),
        }))
    }

    fn note_latch_write(&self, pos: u8) {
        if (self.moder.get() >> (2 * pos)) & 0b11 != 0b01 {
            self.writes_before_output
                .set(self.writes_before_output.get() + 1);
        }
    }
}

impl GpioRegExt for MockPort {
    fn port(&self) -> Port {
        self.port
    }

    fn modify(&self, reg: ConfigReg, clear: u32, set: u32) {
        let cell = match reg {
            ConfigReg::Moder => &self.moder,
            ConfigReg::Otyper => &self.otyper,
            ConfigReg::Ospeedr => &self.ospeedr,
            ConfigReg::Pupdr => &self.pupdr,
        };
        cell.set((cell.get() & !clear) | set);
    }

    fn is_set_low(&self, pos: u8) -> bool {
        self.odr.get() & (1 << pos) == 0
    }

    fn set_high(&self, pos: u8) {
        self.note_latch_write(pos);
        self.odr.set(self.odr.get() | (1 << pos));
    }

    fn set_low(&self, pos: u8) {
        self.note_latch_write(pos);
        self.odr.set(self.odr.get() & !(1 << pos));
    }
}

/// Register file and counter of a 16 bit timer
///
/// One `step` is one counter tick; the prescaler is taken as already applied.
#[derive(Default)]
pub struct SimTimer {
    pub cr1: u32,
    pub dier: u32,
    pub sr: u32,
    pub cnt: u32,
    pub psc: u32,
    pub arr: u32,
    pub ccmr: [u32; 2],
    pub ccer: u32,
    pub ccr: [u32; 4],
    pub updates: u32,
    /// Drop writes to PSC and ARR
    pub reject_time_base: bool,
    /// Drop writes to the compare registers
    pub reject_compare: bool,
}

impl SimTimer {
    fn running(&self) -> bool {
        self.cr1 & 1 != 0
    }

    fn latch_matches(&mut self) {
        for (i, ccr) in self.ccr.iter().enumerate() {
            if self.cnt == *ccr {
                self.sr |= 1 << (i + 1);
            }
        }
    }

    /// Advances the counter by one tick
    pub fn step(&mut self) {
        if !self.running() {
            return;
        }
        if self.cnt >= self.arr {
            self.cnt = 0;
            self.sr |= 1;
        } else {
            self.cnt += 1;
        }
        self.latch_matches();
    }

    /// Jumps straight to the next channel 1 match and returns the ticks that
    /// passed on the way
    pub fn skip_to_match(&mut self) -> u64 {
        let modulus = u64::from(self.arr) + 1;
        let target = u64::from(self.ccr[0]);
        let now = u64::from(self.cnt);
        let mut ticks = (target + modulus - now) % modulus;
        if ticks == 0 {
            ticks = modulus;
        }
        if now + ticks >= modulus {
            self.sr |= 1;
        }
        self.cnt = self.ccr[0];
        self.latch_matches();
        ticks
    }

    /// Interrupt line level: a flag is raised with its enable set
    pub fn irq_pending(&self) -> bool {
        self.sr & self.dier & 0x1f != 0
    }
}

/// Timer handle that shares its register file with the test
pub struct MockTim {
    instance: Instance,
    regs: Rc<RefCell<SimTimer>>,
}

impl MockTim {
    pub fn new(instance: Instance) -> (MockTim, Rc<RefCell<SimTimer>>) {
        let regs = Rc::new(RefCell::new(SimTimer {
            arr: 0xffff,
            ..SimTimer::default()
        }));
        (
            MockTim {
                instance,
                regs: regs.clone(),
            },
            regs,
        )
    }
}

fn channel_index(channel: Channel) -> usize {
    match channel {
        Channel::C1 => 0,
        Channel::C2 => 1,
        Channel::C3 => 2,
        Channel::C4 => 3,
    }
}

impl TimRegExt for MockTim {
    fn instance(&self) -> Instance {
        self.instance
    }

    fn cr1(&self) -> u32 {
        self.regs.borrow().cr1
    }

    fn set_cr1(&mut self, bits: u32) {
        self.regs.borrow_mut().cr1 = bits & 0x3ff;
    }

    fn dier(&self) -> u32 {
        self.regs.borrow().dier
    }

    fn set_dier(&mut self, bits: u32) {
        self.regs.borrow_mut().dier = bits;
    }

    fn sr(&self) -> u32 {
        self.regs.borrow().sr
    }

    fn set_sr(&mut self, bits: u32) {
        self.regs.borrow_mut().sr &= bits;
    }

    fn generate_update(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.cnt = 0;
        regs.sr |= 1;
        regs.updates += 1;
    }

    fn cnt(&self) -> u32 {
        self.regs.borrow().cnt
    }

    fn psc(&self) -> u32 {
        self.regs.borrow().psc
    }

    fn set_psc(&mut self, bits: u32) {
        let mut regs = self.regs.borrow_mut();
        if !regs.reject_time_base {
            regs.psc = bits & 0xffff;
        }
    }

    fn arr(&self) -> u32 {
        self.regs.borrow().arr
    }

    fn set_arr(&mut self, bits: u32) {
        let mut regs = self.regs.borrow_mut();
        if !regs.reject_time_base {
            regs.arr = bits & 0xffff;
        }
    }

    fn ccmr(&self, index: usize) -> u32 {
        self.regs.borrow().ccmr[index]
    }

    fn set_ccmr(&mut self, index: usize, bits: u32) {
        self.regs.borrow_mut().ccmr[index] = bits;
    }

    fn ccer(&self) -> u32 {
        self.regs.borrow().ccer
    }

    fn set_ccer(&mut self, bits: u32) {
        self.regs.borrow_mut().ccer = bits;
    }

    fn ccr(&self, channel: Channel) -> u32 {
        self.regs.borrow().ccr[channel_index(channel)]
    }

    fn set_ccr(&mut self, channel: Channel, bits: u32) {
        let mut regs = self.regs.borrow_mut();
        if !regs.reject_compare {
            regs.ccr[channel_index(channel)] = bits & 0xffff;
        }
    }
}

/// Interrupt controller that records what it was asked to do
#[derive(Default)]
pub struct MockNvic {
    pub priorities: Vec<(Instance, u8)>,
    pub unmasked: Vec<Instance>,
}

impl IrqControl for MockNvic {
    fn set_priority(&mut self, line: Instance, priority: u8) {
        self.priorities.push((line, priority));
    }

    fn unmask(&mut self, line: Instance) {
        self.unmasked.push(line);
    }
}
