//! General purpose timers in output compare mode
//!
//! A 16 bit up-counter runs freely from a prescaled kernel clock while one
//! compare channel raises an interrupt every time the counter equals the
//! channel's compare register. Nothing is driven out of the compare unit.

use crate::rcc::RccRegExt;
use crate::Error;

const CR1_CEN: u32 = 1 << 0;
const CR1_DIR: u32 = 1 << 4;
const CR1_CMS: u32 = 0b11 << 5;
const CR1_ARPE: u32 = 1 << 7;
const CR1_CKD: u32 = 0b11 << 8;

const SR_UIF: u32 = 1 << 0;

const CCMR_OCFE: u32 = 1 << 2;
const CCMR_OCM_SHIFT: u32 = 4;

/// Timer peripheral identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Tim2,
    Tim3,
}

/// Capture/compare channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    C1,
    C2,
    C3,
    C4,
}

impl Channel {
    const ALL: [Channel; 4] = [Channel::C1, Channel::C2, Channel::C3, Channel::C4];

    fn index(self) -> u32 {
        match self {
            Channel::C1 => 0,
            Channel::C2 => 1,
            Channel::C3 => 2,
            Channel::C4 => 3,
        }
    }

    /// CCxIF in SR and CCxIE in DIER share the same position
    fn flag(self) -> u32 {
        1 << (self.index() + 1)
    }

    fn ccer_enable(self) -> u32 {
        1 << (4 * self.index())
    }

    fn ccer_polarity(self) -> u32 {
        1 << (4 * self.index() + 1)
    }

    /// CCMR1 holds channels 1 and 2, CCMR2 channels 3 and 4
    fn ccmr_index(self) -> usize {
        (self.index() / 2) as usize
    }

    fn ccmr_shift(self) -> u32 {
        8 * (self.index() % 2)
    }
}

/// Counting direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CountDirection {
    Up,
    Down,
}

/// Division between the kernel clock and the dead-time / filter sampling clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivision {
    Div1,
    Div2,
    Div4,
}

/// Output compare mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OcMode {
    /// Match raises the event only, the output reference is frozen
    Timing,
    Active,
    Inactive,
    Toggle,
}

impl OcMode {
    fn bits(self) -> u32 {
        match self {
            OcMode::Timing => 0b000,
            OcMode::Active => 0b001,
            OcMode::Inactive => 0b010,
            OcMode::Toggle => 0b011,
        }
    }
}

/// Output polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// Counter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    /// Kernel clock is divided by `prescaler + 1`
    pub prescaler: u16,
    /// Auto-reload value, the counter wraps after reaching it
    pub period: u16,
    pub direction: CountDirection,
    pub clock_division: ClockDivision,
    /// Buffer period writes until the next update event
    pub auto_reload_preload: bool,
}

impl TimeBase {
    fn cr1_bits(&self) -> u32 {
        let dir = match self.direction {
            CountDirection::Up => 0,
            CountDirection::Down => CR1_DIR,
        };
        let ckd = match self.clock_division {
            ClockDivision::Div1 => 0b00 << 8,
            ClockDivision::Div2 => 0b01 << 8,
            ClockDivision::Div4 => 0b10 << 8,
        };
        let arpe = if self.auto_reload_preload { CR1_ARPE } else { 0 };
        dir | ckd | arpe
    }
}

/// Compare channel settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareChannel {
    pub channel: Channel,
    pub mode: OcMode,
    /// Initial compare value
    pub pulse: u16,
    pub polarity: Polarity,
    pub fast_mode: bool,
}

/// Everything [`OcTimer::configure`] needs in one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcConfig {
    pub time_base: TimeBase,
    pub compare: CompareChannel,
}

/// Register level access to one general purpose timer
///
/// `set_sr` follows the hardware's rc_w0 semantics: bits written as 0 clear
/// their flag, bits written as 1 leave it alone.
pub trait TimRegExt {
    fn instance(&self) -> Instance;

    fn cr1(&self) -> u32;
    fn set_cr1(&mut self, bits: u32);

    fn dier(&self) -> u32;
    fn set_dier(&mut self, bits: u32);

    fn sr(&self) -> u32;
    fn set_sr(&mut self, bits: u32);

    /// Sets EGR.UG
    fn generate_update(&mut self);

    fn cnt(&self) -> u32;

    fn psc(&self) -> u32;
    fn set_psc(&mut self, bits: u32);

    fn arr(&self) -> u32;
    fn set_arr(&mut self, bits: u32);

    fn ccmr(&self, index: usize) -> u32;
    fn set_ccmr(&mut self, index: usize, bits: u32);

    fn ccer(&self) -> u32;
    fn set_ccer(&mut self, bits: u32);

    fn ccr(&self, channel: Channel) -> u32;
    fn set_ccr(&mut self, channel: Channel, bits: u32);
}

/// Timer bound to one compare channel
pub struct OcTimer<TIM> {
    tim: TIM,
    time_base: TimeBase,
    channel: Channel,
}

impl<TIM> OcTimer<TIM>
where
    TIM: TimRegExt,
{
    /// Programs the time base and the compare channel, leaving the counter
    /// stopped and the channel interrupt disabled
    pub fn configure<R>(mut tim: TIM, config: &OcConfig, rcc: &mut R) -> Result<Self, Error>
    where
        R: RccRegExt,
    {
        let base = config.time_base;
        if base.period == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("{}: zero period", tim.instance());
            return Err(Error::TimerBaseRejected);
        }

        rcc.enable_timer(tim.instance());

        // pause, edge aligned
        let cr1 = tim.cr1() & !(CR1_CEN | CR1_DIR | CR1_CMS | CR1_CKD | CR1_ARPE);
        tim.set_cr1(cr1 | base.cr1_bits());
        tim.set_psc(u32::from(base.prescaler));
        tim.set_arr(u32::from(base.period));

        // Trigger update event to load the prescaler, then drop the flag it raised
        tim.generate_update();
        tim.set_sr(!SR_UIF);

        if tim.psc() != u32::from(base.prescaler) || tim.arr() != u32::from(base.period) {
            #[cfg(feature = "defmt")]
            defmt::warn!("{}: time base did not stick", tim.instance());
            return Err(Error::TimerBaseRejected);
        }

        let compare = config.compare;
        if compare.pulse > base.period {
            return Err(Error::ChannelRejected);
        }

        let ch = compare.channel;
        tim.set_ccer(tim.ccer() & !ch.ccer_enable());

        // CCxS = 00 (output), OCxPE = 0 (compare writes take effect at once)
        let fast = if compare.fast_mode { CCMR_OCFE } else { 0 };
        let field = (compare.mode.bits() << CCMR_OCM_SHIFT) | fast;
        let shift = ch.ccmr_shift();
        let ccmr = (tim.ccmr(ch.ccmr_index()) & !(0xff << shift)) | (field << shift);
        tim.set_ccmr(ch.ccmr_index(), ccmr);

        let ccer = tim.ccer() & !ch.ccer_polarity();
        let ccer = match compare.polarity {
            Polarity::ActiveHigh => ccer,
            Polarity::ActiveLow => ccer | ch.ccer_polarity(),
        };
        tim.set_ccer(ccer);

        tim.set_ccr(ch, u32::from(compare.pulse));
        if tim.ccr(ch) != u32::from(compare.pulse) {
            #[cfg(feature = "defmt")]
            defmt::warn!("{}: compare value did not stick", tim.instance());
            return Err(Error::ChannelRejected);
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "{}: psc {} arr {} ccr {}",
            tim.instance(),
            base.prescaler,
            base.period,
            compare.pulse
        );

        Ok(OcTimer {
            tim,
            time_base: base,
            channel: ch,
        })
    }

    /// Starts the counter with the channel's compare interrupt enabled
    pub fn start_it(&mut self) {
        let ch = self.channel;
        self.tim.set_sr(!ch.flag());
        let dier = self.tim.dier();
        self.tim.set_dier(dier | ch.flag());
        let ccer = self.tim.ccer();
        self.tim.set_ccer(ccer | ch.ccer_enable());
        let cr1 = self.tim.cr1();
        self.tim.set_cr1(cr1 | CR1_CEN);
    }

    pub fn instance(&self) -> Instance {
        self.tim.instance()
    }

    pub fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn counter(&self) -> u16 {
        (self.tim.cnt() & 0xffff) as u16
    }

    pub fn compare(&self) -> u16 {
        (self.tim.ccr(self.channel) & 0xffff) as u16
    }

    pub fn set_compare(&mut self, value: u16) {
        self.tim.set_ccr(self.channel, u32::from(value));
    }

    /// Moves the compare deadline `delta` ticks past the current one, wrapping
    /// at 16 bits, and returns the new deadline
    pub fn advance_compare(&mut self, delta: u16) -> u16 {
        let next = self.compare().wrapping_add(delta);
        self.set_compare(next);
        next
    }

    /// Lowest channel whose compare flag is raised with its interrupt enabled
    pub fn pending(&self) -> Option<Channel> {
        let active = self.tim.sr() & self.tim.dier();
        Channel::ALL
            .iter()
            .copied()
            .find(|ch| active & ch.flag() != 0)
    }

    pub fn clear_pending(&mut self, channel: Channel) {
        self.tim.set_sr(!channel.flag());
    }
}

#[cfg(feature = "device-selected")]
macro_rules! timers {
    ($($TIM:ident: $Instance:ident,)+) => {
        $(
            impl TimRegExt for crate::pac::$TIM {
                fn instance(&self) -> Instance {
                    Instance::$Instance
                }

                fn cr1(&self) -> u32 {
                    self.cr1.read().bits()
                }

                fn set_cr1(&mut self, bits: u32) {
                    self.cr1.write(|w| unsafe { w.bits(bits) });
                }

                fn dier(&self) -> u32 {
                    self.dier.read().bits()
                }

                fn set_dier(&mut self, bits: u32) {
                    self.dier.write(|w| unsafe { w.bits(bits) });
                }

                fn sr(&self) -> u32 {
                    self.sr.read().bits()
                }

                fn set_sr(&mut self, bits: u32) {
                    self.sr.write(|w| unsafe { w.bits(bits) });
                }

                fn generate_update(&mut self) {
                    self.egr.write(|w| w.ug().set_bit());
                }

                fn cnt(&self) -> u32 {
                    self.cnt.read().bits()
                }

                fn psc(&self) -> u32 {
                    self.psc.read().bits()
                }

                fn set_psc(&mut self, bits: u32) {
                    self.psc.write(|w| unsafe { w.bits(bits) });
                }

                fn arr(&self) -> u32 {
                    self.arr.read().bits()
                }

                fn set_arr(&mut self, bits: u32) {
                    self.arr.write(|w| unsafe { w.bits(bits) });
                }

                fn ccmr(&self, index: usize) -> u32 {
                    match index {
                        0 => self.ccmr1_output().read().bits(),
                        _ => self.ccmr2_output().read().bits(),
                    }
                }

                fn set_ccmr(&mut self, index: usize, bits: u32) {
                    match index {
                        0 => self.ccmr1_output().write(|w| unsafe { w.bits(bits) }),
                        _ => self.ccmr2_output().write(|w| unsafe { w.bits(bits) }),
                    }
                }

                fn ccer(&self) -> u32 {
                    self.ccer.read().bits()
                }

                fn set_ccer(&mut self, bits: u32) {
                    self.ccer.write(|w| unsafe { w.bits(bits) });
                }

                fn ccr(&self, channel: Channel) -> u32 {
                    match channel {
                        Channel::C1 => self.ccr1().read().bits(),
                        Channel::C2 => self.ccr2().read().bits(),
                        Channel::C3 => self.ccr3().read().bits(),
                        Channel::C4 => self.ccr4().read().bits(),
                    }
                }

                fn set_ccr(&mut self, channel: Channel, bits: u32) {
                    match channel {
                        Channel::C1 => self.ccr1().write(|w| unsafe { w.bits(bits) }),
                        Channel::C2 => self.ccr2().write(|w| unsafe { w.bits(bits) }),
                        Channel::C3 => self.ccr3().write(|w| unsafe { w.bits(bits) }),
                        Channel::C4 => self.ccr4().write(|w| unsafe { w.bits(bits) }),
                    }
                }
            }
        )+
    }
}

#[cfg(feature = "device-selected")]
timers! {
    TIM3: Tim3,
}

#[cfg(all(
    feature = "device-selected",
    not(any(feature = "stm32f030", feature = "stm32f070"))
))]
timers! {
    TIM2: Tim2,
}
