pub use embedded_hal::digital::v2::OutputPin as _embedded_hal_digital_v2_OutputPin;
pub use embedded_hal::digital::v2::StatefulOutputPin as _embedded_hal_digital_v2_StatefulOutputPin;
pub use embedded_hal::digital::v2::ToggleableOutputPin as _embedded_hal_digital_v2_ToggleableOutputPin;

pub use crate::interrupt::IrqControl as _stm32f0xx_oc_blinky_interrupt_IrqControl;
pub use crate::rcc::RccRegExt as _stm32f0xx_oc_blinky_rcc_RccRegExt;
pub use crate::time::U32Ext as _stm32f0xx_oc_blinky_time_U32Ext;
pub use crate::timers::TimRegExt as _stm32f0xx_oc_blinky_timers_TimRegExt;

#[cfg(feature = "device-selected")]
pub use crate::gpio::GpioExt as _stm32f0xx_oc_blinky_gpio_GpioExt;
#[cfg(feature = "device-selected")]
pub use crate::rcc::RccExt as _stm32f0xx_oc_blinky_rcc_RccExt;
