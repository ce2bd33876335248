//! Reset and clock control
//!
//! The blinker runs straight from the internal high speed oscillator (HSI):
//! no PLL, no external crystal. The AHB and APB prescalers default to 1 so the
//! timer kernel clock equals the oscillator frequency and the tick rate stays
//! computable from a single number.

use crate::gpio::Port;
use crate::time::Hertz;
use crate::timers::Instance;
use crate::Error;

/// HSI frequency of the STM32F0 family
pub const HSI: Hertz = Hertz(8_000_000); // Hz

/// Factory default HSI trim, the midpoint of the 5 bit HSITRIM field
pub const HSI_TRIM_DEFAULT: u8 = 16;

const HSI_TRIM_MAX: u8 = 0b1_1111;

// Status polls before an oscillator or switch step counts as refused
const READY_POLLS: u32 = 0x1_0000;

/// Register level access to the clock tree
///
/// Implemented by the constrained [`Rcc`] on hardware.
pub trait RccRegExt {
    /// Frequency of the internal high speed oscillator
    fn hsi_frequency(&self) -> Hertz;

    fn enable_hsi(&mut self, trim: u8);

    fn hsi_ready(&self) -> bool;

    fn disable_pll(&mut self);

    fn pll_ready(&self) -> bool;

    fn set_flash_latency(&mut self, wait_states: u8);

    /// Selects HSI as SYSCLK together with the encoded HPRE and PPRE fields
    fn select_hsi(&mut self, hpre: u8, ppre1: u8, ppre2: u8) -> Result<(), Error>;

    fn hsi_selected(&self) -> bool;

    /// Gates the clock of a GPIO port on
    fn enable_gpio(&mut self, port: Port);

    /// Gates the clock of a timer on and pulses its reset line
    fn enable_timer(&mut self, timer: Instance);
}

/// Clock tree descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    hsi_trim: u8,
    ahb_divider: u16,
    apb1_divider: u8,
    apb2_divider: u8,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::hsi()
    }
}

impl ClockConfig {
    /// HSI at default calibration, PLL off, every bus undivided
    pub const fn hsi() -> Self {
        ClockConfig {
            hsi_trim: HSI_TRIM_DEFAULT,
            ahb_divider: 1,
            apb1_divider: 1,
            apb2_divider: 1,
        }
    }

    pub fn hsi_trim(mut self, trim: u8) -> Self {
        self.hsi_trim = trim;
        self
    }

    pub fn ahb_divider(mut self, divider: u16) -> Self {
        self.ahb_divider = divider;
        self
    }

    pub fn apb1_divider(mut self, divider: u8) -> Self {
        self.apb1_divider = divider;
        self
    }

    pub fn apb2_divider(mut self, divider: u8) -> Self {
        self.apb2_divider = divider;
        self
    }

    /// Resolves the bus frequencies this descriptor produces from `hsi`
    /// without touching any register
    pub fn clocks(&self, hsi: Hertz) -> Result<Clocks, Error> {
        if self.hsi_trim > HSI_TRIM_MAX {
            return Err(Error::ClockRejected);
        }
        hpre_bits(self.ahb_divider).ok_or(Error::ClockRejected)?;
        ppre_bits(self.apb1_divider).ok_or(Error::ClockRejected)?;
        ppre_bits(self.apb2_divider).ok_or(Error::ClockRejected)?;
        // The F0 has a single APB, both halves of the descriptor must agree
        if self.apb1_divider != self.apb2_divider {
            return Err(Error::ClockRejected);
        }

        let sysclk = hsi.0;
        let hclk = sysclk / u32::from(self.ahb_divider);
        let pclk1 = hclk / u32::from(self.apb1_divider);
        let pclk2 = hclk / u32::from(self.apb2_divider);

        Ok(Clocks {
            sysclk: Hertz(sysclk),
            hclk: Hertz(hclk),
            pclk1: Hertz(pclk1),
            pclk2: Hertz(pclk2),
            timclk1: Hertz(timer_clock(pclk1, self.apb1_divider)),
            timclk2: Hertz(timer_clock(pclk2, self.apb2_divider)),
        })
    }

    /// Applies the descriptor to the clock tree
    ///
    /// Order: start HSI, adjust the flash wait states, switch SYSCLK over,
    /// then stop the PLL once nothing runs from it anymore.
    pub fn freeze<R>(self, rcc: &mut R) -> Result<Clocks, Error>
    where
        R: RccRegExt,
    {
        let clocks = self.clocks(rcc.hsi_frequency())?;
        let hpre = hpre_bits(self.ahb_divider).ok_or(Error::ClockRejected)?;
        let ppre1 = ppre_bits(self.apb1_divider).ok_or(Error::ClockRejected)?;
        let ppre2 = ppre_bits(self.apb2_divider).ok_or(Error::ClockRejected)?;

        rcc.enable_hsi(self.hsi_trim);
        wait_until(|| rcc.hsi_ready())?;

        rcc.set_flash_latency(flash_latency(clocks.sysclk));

        rcc.select_hsi(hpre, ppre1, ppre2)?;
        wait_until(|| rcc.hsi_selected())?;

        rcc.disable_pll();
        wait_until(|| !rcc.pll_ready())?;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "clocks frozen: sysclk {} Hz, timer clock {} Hz",
            clocks.sysclk.0,
            clocks.timclk1.0
        );

        Ok(clocks)
    }
}

fn wait_until<F>(ready: F) -> Result<(), Error>
where
    F: Fn() -> bool,
{
    for _ in 0..READY_POLLS {
        if ready() {
            return Ok(());
        }
    }

    #[cfg(feature = "defmt")]
    defmt::warn!("clock tree did not settle");

    Err(Error::ClockRejected)
}

/// Encoded HPRE field for an AHB divider
fn hpre_bits(divider: u16) -> Option<u8> {
    match divider {
        1 => Some(0b0000),
        2 => Some(0b1000),
        4 => Some(0b1001),
        8 => Some(0b1010),
        16 => Some(0b1011),
        64 => Some(0b1100),
        128 => Some(0b1101),
        256 => Some(0b1110),
        512 => Some(0b1111),
        _ => None,
    }
}

/// Encoded PPRE field for an APB divider
fn ppre_bits(divider: u8) -> Option<u8> {
    match divider {
        1 => Some(0b000),
        2 => Some(0b100),
        4 => Some(0b101),
        8 => Some(0b110),
        16 => Some(0b111),
        _ => None,
    }
}

// If pclk is prescaled from hclk, the frequency fed into the timers is doubled
fn timer_clock(pclk: u32, apb_divider: u8) -> u32 {
    if apb_divider == 1 {
        pclk
    } else {
        pclk * 2
    }
}

/// Flash wait states required at `sysclk`
pub fn flash_latency(sysclk: Hertz) -> u8 {
    if sysclk.0 <= 24_000_000 {
        0b000
    } else if sysclk.0 <= 48_000_000 {
        0b001
    } else {
        0b010
    }
}

/// Frozen clock frequencies
///
/// The existence of this value indicates that the clock configuration can no longer be changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clocks {
    sysclk: Hertz,
    hclk: Hertz,
    pclk1: Hertz,
    pclk2: Hertz,
    timclk1: Hertz,
    timclk2: Hertz,
}

impl Clocks {
    /// Returns the system (core) frequency
    pub fn sysclk(&self) -> Hertz {
        self.sysclk
    }

    /// Returns the frequency of the AHB
    pub fn hclk(&self) -> Hertz {
        self.hclk
    }

    /// Returns the frequency of APB1
    pub fn pclk1(&self) -> Hertz {
        self.pclk1
    }

    /// Returns the frequency of APB2
    pub fn pclk2(&self) -> Hertz {
        self.pclk2
    }

    /// Kernel clock of the timers hanging off APB1
    pub fn timclk1(&self) -> Hertz {
        self.timclk1
    }

    /// Kernel clock of the timers hanging off APB2
    pub fn timclk2(&self) -> Hertz {
        self.timclk2
    }
}

/// Extension trait that constrains the `RCC` peripheral
#[cfg(feature = "device-selected")]
pub trait RccExt {
    /// Constrains the `RCC` peripheral so it plays nicely with the other abstractions
    fn constrain(self, flash: crate::pac::FLASH) -> Rcc;
}

#[cfg(feature = "device-selected")]
impl RccExt for crate::pac::RCC {
    fn constrain(self, flash: crate::pac::FLASH) -> Rcc {
        Rcc { regs: self, flash }
    }
}

/// Constrained RCC peripheral
#[cfg(feature = "device-selected")]
pub struct Rcc {
    regs: crate::pac::RCC,
    flash: crate::pac::FLASH,
}

#[cfg(feature = "device-selected")]
impl RccRegExt for Rcc {
    fn hsi_frequency(&self) -> Hertz {
        HSI
    }

    fn enable_hsi(&mut self, trim: u8) {
        self.regs
            .cr
            .modify(|_, w| unsafe { w.hsion().set_bit().hsitrim().bits(trim) });
    }

    fn hsi_ready(&self) -> bool {
        self.regs.cr.read().hsirdy().bit_is_set()
    }

    fn disable_pll(&mut self) {
        self.regs.cr.modify(|_, w| w.pllon().off());
    }

    fn pll_ready(&self) -> bool {
        self.regs.cr.read().pllrdy().bit_is_set()
    }

    #[allow(unused_unsafe)]
    fn set_flash_latency(&mut self, wait_states: u8) {
        self.flash
            .acr
            .modify(|_, w| unsafe { w.latency().bits(wait_states) });
    }

    fn select_hsi(&mut self, hpre: u8, ppre1: u8, ppre2: u8) -> Result<(), Error> {
        if ppre1 != ppre2 {
            return Err(Error::ClockRejected);
        }
        self.regs
            .cfgr
            .modify(|_, w| unsafe { w.ppre().bits(ppre1).hpre().bits(hpre).sw().hsi() });
        Ok(())
    }

    fn hsi_selected(&self) -> bool {
        self.regs.cfgr.read().sws().is_hsi()
    }

    fn enable_gpio(&mut self, port: Port) {
        self.regs.ahbenr.modify(|_, w| match port {
            Port::A => w.iopaen().set_bit(),
            Port::B => w.iopben().set_bit(),
            Port::C => w.iopcen().set_bit(),
            Port::D => w.iopden().set_bit(),
            Port::F => w.iopfen().set_bit(),
        });
    }

    fn enable_timer(&mut self, timer: Instance) {
        // enable and reset peripheral to a clean slate state
        match timer {
            #[cfg(not(any(feature = "stm32f030", feature = "stm32f070")))]
            Instance::Tim2 => {
                self.regs.apb1enr.modify(|_, w| w.tim2en().set_bit());
                self.regs.apb1rstr.modify(|_, w| w.tim2rst().set_bit());
                self.regs.apb1rstr.modify(|_, w| w.tim2rst().clear_bit());
            }
            Instance::Tim3 => {
                self.regs.apb1enr.modify(|_, w| w.tim3en().set_bit());
                self.regs.apb1rstr.modify(|_, w| w.tim3rst().set_bit());
                self.regs.apb1rstr.modify(|_, w| w.tim3rst().clear_bit());
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}
