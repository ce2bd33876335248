#![cfg_attr(not(test), no_std)]

pub use stm32f0;

#[cfg(any(feature = "stm32f030", feature = "stm32f070"))]
pub use stm32f0::stm32f0x0 as pac;

#[cfg(any(
    feature = "stm32f031",
    feature = "stm32f051",
    feature = "stm32f071",
    feature = "stm32f091"
))]
pub use stm32f0::stm32f0x1 as pac;

#[cfg(any(feature = "stm32f042", feature = "stm32f072"))]
pub use stm32f0::stm32f0x2 as pac;

#[cfg(any(
    feature = "stm32f038",
    feature = "stm32f048",
    feature = "stm32f058",
    feature = "stm32f078",
    feature = "stm32f098"
))]
pub use stm32f0::stm32f0x8 as pac;

#[cfg(not(feature = "device-selected"))]
pub mod pac {}

pub mod blinky;
pub mod gpio;
pub mod interrupt;
pub mod prelude;
pub mod rcc;
pub mod time;
pub mod timers;

#[cfg(test)]
mod mock;

pub use crate::time::U32Ext as _stm32f0xx_oc_blinky_time_U32Ext;

/// Bring-up error
///
/// Every variant is a static misconfiguration detected while initialising;
/// nothing can fail once the compare channel is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Oscillator, bus dividers or system clock switch refused
    ClockRejected,
    /// Pin index outside of the port
    PinRejected,
    /// Prescaler, period or counter mode refused by the timer
    TimerBaseRejected,
    /// Compare channel settings refused by the timer
    ChannelRejected,
}
