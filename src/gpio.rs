//! General Purpose Input / Output
//!
//! Only what the blinker needs survives here: one pin driven as a push pull
//! output, configured from a [`PinConfig`] descriptor.

use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_hal::digital::v2::{toggleable, OutputPin, StatefulOutputPin};

use crate::rcc::RccRegExt;
use crate::Error;

/// GPIO port identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
    D,
    F,
}

#[allow(unused)]
const GPIO_BASE: usize = 0x4800_0000;
#[allow(unused)]
const GPIO_STRIDE: usize = 0x400;

impl Port {
    #[allow(unused)]
    fn from_block(addr: usize) -> Port {
        match addr.wrapping_sub(GPIO_BASE) / GPIO_STRIDE {
            0 => Port::A,
            1 => Port::B,
            2 => Port::C,
            3 => Port::D,
            _ => Port::F,
        }
    }
}

/// Internal pull resistor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    None,
    Up,
    Down,
}

impl Pull {
    fn bits(self) -> u32 {
        match self {
            Pull::None => 0b00,
            Pull::Up => 0b01,
            Pull::Down => 0b10,
        }
    }
}

/// Output slew rate class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    Low,
    Medium,
    High,
}

impl Speed {
    fn bits(self) -> u32 {
        match self {
            Speed::Low => 0b00,
            Speed::Medium => 0b01,
            Speed::High => 0b11,
        }
    }
}

/// Logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

/// Configuration registers of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigReg {
    Moder,
    Otyper,
    Ospeedr,
    Pupdr,
}

/// Register level access to one GPIO port
pub trait GpioRegExt {
    fn port(&self) -> Port;

    /// Clears the bits in `clear`, then sets the bits in `set`
    fn modify(&self, reg: ConfigReg, clear: u32, set: u32);

    fn is_set_low(&self, pos: u8) -> bool;

    fn set_high(&self, pos: u8);

    fn set_low(&self, pos: u8);
}

/// Output mode (type state)
pub struct Output<MODE> {
    _mode: PhantomData<MODE>,
}

/// Push pull output (type state)
pub struct PushPull;

/// Pin descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub index: u8,
    pub pull: Pull,
    pub speed: Speed,
    /// Level driven before the pin switches to output mode
    pub level: Level,
}

impl PinConfig {
    /// Floating, slowest slew rate, starting low
    pub const fn new(index: u8) -> Self {
        PinConfig {
            index,
            pull: Pull::None,
            speed: Speed::Low,
            level: Level::Low,
        }
    }

    /// Enables the port clock and configures the pin as a push pull output
    pub fn into_push_pull_output<R>(
        self,
        port: &'static dyn GpioRegExt,
        rcc: &mut R,
    ) -> Result<Pin<Output<PushPull>>, Error>
    where
        R: RccRegExt,
    {
        if self.index > 15 {
            return Err(Error::PinRejected);
        }

        rcc.enable_gpio(port.port());

        match self.level {
            Level::Low => port.set_low(self.index),
            Level::High => port.set_high(self.index),
        }

        let i = u32::from(self.index);
        let offset = 2 * i;
        port.modify(ConfigReg::Pupdr, 0b11 << offset, self.pull.bits() << offset);
        port.modify(ConfigReg::Otyper, 0b1 << i, 0);
        port.modify(ConfigReg::Ospeedr, 0b11 << offset, self.speed.bits() << offset);
        port.modify(ConfigReg::Moder, 0b11 << offset, 0b01 << offset);

        #[cfg(feature = "defmt")]
        defmt::debug!("P{}{} push pull output", port.port(), self.index);

        Ok(Pin {
            i: self.index,
            port: port as *const dyn GpioRegExt,
            _mode: PhantomData,
        })
    }
}

/// Fully erased pin
pub struct Pin<MODE> {
    i: u8,
    port: *const dyn GpioRegExt,
    _mode: PhantomData<MODE>,
}

// NOTE(unsafe) The only write access is to BSRR, which is thread safe
unsafe impl<MODE> Sync for Pin<MODE> {}
// NOTE(unsafe) this only enables read access to the same pin from multiple
// threads
unsafe impl<MODE> Send for Pin<MODE> {}

impl<MODE> Pin<MODE> {
    pub fn index(&self) -> u8 {
        self.i
    }

    pub fn port(&self) -> Port {
        unsafe { (*self.port).port() }
    }
}

impl<MODE> StatefulOutputPin for Pin<Output<MODE>> {
    #[inline(always)]
    fn is_set_high(&self) -> Result<bool, Self::Error> {
        self.is_set_low().map(|v| !v)
    }

    #[inline(always)]
    fn is_set_low(&self) -> Result<bool, Self::Error> {
        Ok(unsafe { (*self.port).is_set_low(self.i) })
    }
}

impl<MODE> OutputPin for Pin<Output<MODE>> {
    type Error = Infallible;

    #[inline(always)]
    fn set_high(&mut self) -> Result<(), Self::Error> {
        unsafe { (*self.port).set_high(self.i) };
        Ok(())
    }

    #[inline(always)]
    fn set_low(&mut self) -> Result<(), Self::Error> {
        unsafe { (*self.port).set_low(self.i) }
        Ok(())
    }
}

impl<MODE> toggleable::Default for Pin<Output<MODE>> {}

/// Extension trait that hands out the register block of a GPIO port
#[cfg(feature = "device-selected")]
pub trait GpioExt {
    /// Consumes the port and returns its register block
    fn regs(self) -> &'static dyn GpioRegExt;
}

#[cfg(feature = "device-selected")]
macro_rules! gpio_trait {
    ($gpiox:ident) => {
        impl GpioRegExt for crate::pac::$gpiox::RegisterBlock {
            fn port(&self) -> Port {
                Port::from_block(self as *const _ as usize)
            }

            fn modify(&self, reg: ConfigReg, clear: u32, set: u32) {
                // NOTE(unsafe) read-modify-write, only used while initialising
                match reg {
                    ConfigReg::Moder => self
                        .moder
                        .modify(|r, w| unsafe { w.bits((r.bits() & !clear) | set) }),
                    ConfigReg::Otyper => self
                        .otyper
                        .modify(|r, w| unsafe { w.bits((r.bits() & !clear) | set) }),
                    ConfigReg::Ospeedr => self
                        .ospeedr
                        .modify(|r, w| unsafe { w.bits((r.bits() & !clear) | set) }),
                    ConfigReg::Pupdr => self
                        .pupdr
                        .modify(|r, w| unsafe { w.bits((r.bits() & !clear) | set) }),
                }
            }

            fn is_set_low(&self, pos: u8) -> bool {
                // NOTE(unsafe) atomic read with no side effects
                self.odr.read().bits() & (1 << pos) == 0
            }

            fn set_high(&self, pos: u8) {
                // NOTE(unsafe) atomic write to a stateless register
                unsafe { self.bsrr.write(|w| w.bits(1 << pos)) }
            }

            fn set_low(&self, pos: u8) {
                // NOTE(unsafe) atomic write to a stateless register
                unsafe { self.bsrr.write(|w| w.bits(1 << (pos + 16))) }
            }
        }
    };
}

#[cfg(feature = "device-selected")]
gpio_trait!(gpioa);
#[cfg(feature = "device-selected")]
gpio_trait!(gpiof);

#[cfg(feature = "device-selected")]
macro_rules! gpio {
    ($($GPIOX:ident),+) => {
        $(
            impl GpioExt for crate::pac::$GPIOX {
                fn regs(self) -> &'static dyn GpioRegExt {
                    // NOTE(unsafe) the owned peripheral is consumed, the
                    // returned block is the only handle left
                    unsafe { &*crate::pac::$GPIOX::ptr() }
                }
            }
        )+
    };
}

#[cfg(feature = "device-selected")]
gpio!(GPIOA, GPIOB, GPIOC, GPIOF);

#[cfg(any(
    feature = "stm32f030",
    feature = "stm32f051",
    feature = "stm32f058",
    feature = "stm32f070",
    feature = "stm32f071",
    feature = "stm32f072",
    feature = "stm32f078",
    feature = "stm32f091",
    feature = "stm32f098",
))]
gpio!(GPIOD);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPort, MockRcc};
    use crate::rcc::HSI;

    #[test]
    fn push_pull_output_programs_only_its_own_fields() {
        let port = MockPort::leak(Port::A);
        port.moder.set(0xffff_ffff);
        port.ospeedr.set(0xffff_ffff);
        port.pupdr.set(0xffff_ffff);
        port.otyper.set(0xffff);
        let mut rcc = MockRcc::new(HSI);

        let pin = PinConfig::new(5).into_push_pull_output(port, &mut rcc).unwrap();

        assert_eq!(pin.index(), 5);
        assert_eq!(pin.port(), Port::A);
        assert_eq!(rcc.gpio_enabled, vec![Port::A]);
        assert_eq!(port.moder.get(), !(0b10 << 10));
        assert_eq!(port.ospeedr.get(), !(0b11 << 10));
        assert_eq!(port.pupdr.get(), !(0b11 << 10));
        assert_eq!(port.otyper.get(), 0xffff & !(1 << 5));
    }

    #[test]
    fn initial_level_is_driven_before_output_mode() {
        let port = MockPort::leak(Port::B);
        port.odr.set(1 << 3);
        let mut rcc = MockRcc::new(HSI);

        let pin = PinConfig::new(3).into_push_pull_output(port, &mut rcc).unwrap();

        assert_eq!(port.odr.get(), 0);
        assert!(pin.is_set_low().unwrap());
        assert_eq!(port.writes_before_output.get(), 1);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let port = MockPort::leak(Port::A);
        let mut rcc = MockRcc::new(HSI);

        assert!(matches!(
            PinConfig::new(16).into_push_pull_output(port, &mut rcc),
            Err(Error::PinRejected)
        ));
        assert!(rcc.gpio_enabled.is_empty());
    }

    #[test]
    fn toggle_flips_the_output_latch() {
        use embedded_hal::digital::v2::ToggleableOutputPin;

        let port = MockPort::leak(Port::A);
        let mut rcc = MockRcc::new(HSI);
        let mut pin = PinConfig::new(5).into_push_pull_output(port, &mut rcc).unwrap();

        pin.toggle().unwrap();
        assert!(pin.is_set_high().unwrap());
        assert_eq!(port.odr.get(), 1 << 5);

        pin.toggle().unwrap();
        assert!(pin.is_set_low().unwrap());
        assert_eq!(port.odr.get(), 0);
    }

    #[test]
    fn register_blocks_map_to_ports() {
        assert_eq!(Port::from_block(0x4800_0000), Port::A);
        assert_eq!(Port::from_block(0x4800_0400), Port::B);
        assert_eq!(Port::from_block(0x4800_0c00), Port::D);
        assert_eq!(Port::from_block(0x4800_1400), Port::F);
    }
}
