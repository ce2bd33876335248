//! Output compare driven LED blinker
//!
//! The timer counts freely at [`TICK_HZ`]. Each compare match on channel 1
//! toggles the LED and pushes the compare deadline [`HALF_PERIOD_TICKS`]
//! further out. The next edge is scheduled from the previous deadline rather
//! than from the moment the handler ran, so bounded interrupt latency never
//! accumulates into the cadence, and the 16 bit wrap of the compare register
//! mirrors the wrap of the counter.
//!
//! # Example
//!
//! ``` ignore
//! use stm32f0xx_oc_blinky as hal;
//!
//! use crate::hal::blinky;
//! use crate::hal::gpio::GpioExt;
//! use crate::hal::pac;
//! use crate::hal::rcc::RccExt;
//! use crate::hal::timers::Instance;
//!
//! let p = pac::Peripherals::take().unwrap();
//! let mut cp = cortex_m::Peripherals::take().unwrap();
//!
//! let mut rcc = p.RCC.constrain(p.FLASH);
//! let blinker = blinky::bring_up(&mut rcc, p.GPIOA.regs(), p.TIM3, &mut cp.NVIC)
//!     .unwrap_or_else(|_| blinky::fault());
//! let mut armed = blinker.arm();
//! // from the TIM3 vector:
//! armed.on_interrupt(Instance::Tim3);
//! ```

use embedded_hal::digital::v2::ToggleableOutputPin;

use crate::gpio::{GpioRegExt, Output, Pin, PinConfig, PushPull};
use crate::interrupt::IrqControl;
use crate::rcc::{ClockConfig, Clocks, RccRegExt};
use crate::time::Hertz;
use crate::timers::{
    Channel, ClockDivision, CompareChannel, CountDirection, Instance, OcConfig, OcMode,
    OcTimer, Polarity, TimRegExt, TimeBase,
};
use crate::Error;

/// Counter tick rate, one tick is 100 us
pub const TICK_HZ: u32 = 10_000;

pub const TICKS_PER_MS: u16 = (TICK_HZ / 1_000) as u16;

/// Timer kernel clock the prescaler below was chosen for
pub const REFERENCE_TIMER_CLOCK: Hertz = Hertz(72_000_000);

/// 72 MHz / (7199 + 1) = 10 kHz
pub const REFERENCE_PRESCALER: u16 = 7199;

/// Counter runs over the full 16 bit range
pub const FREE_RUNNING_PERIOD: u16 = 0xffff;

/// First compare value, 10 ms after the counter starts
pub const FIRST_DEADLINE_TICKS: u16 = 10 * TICKS_PER_MS;

/// LED half period, 500 ms
pub const HALF_PERIOD_TICKS: u16 = 500 * TICKS_PER_MS;

/// Most urgent interrupt level
pub const IRQ_PRIORITY: u8 = 0;

pub const CLOCK_CONFIG: ClockConfig = ClockConfig::hsi();

/// User LED on PA5, driven low before the channel is armed
pub const LED_PIN: PinConfig = PinConfig::new(5);

/// Prescaler that divides `timer_clock` down to [`TICK_HZ`]
///
/// The kernel clock has to be an exact multiple of the tick rate, otherwise
/// the cadence would drift.
pub fn prescaler_for(timer_clock: Hertz) -> Result<u16, Error> {
    if timer_clock.0 < TICK_HZ || timer_clock.0 % TICK_HZ != 0 {
        return Err(Error::TimerBaseRejected);
    }
    cast::u16(timer_clock.0 / TICK_HZ - 1).map_err(|_| Error::TimerBaseRejected)
}

/// Timer descriptor for the blinker running off `clocks`
pub fn blink_config(clocks: &Clocks) -> Result<OcConfig, Error> {
    Ok(OcConfig {
        time_base: TimeBase {
            prescaler: prescaler_for(clocks.timclk1())?,
            period: FREE_RUNNING_PERIOD,
            direction: CountDirection::Up,
            clock_division: ClockDivision::Div1,
            auto_reload_preload: false,
        },
        compare: CompareChannel {
            channel: Channel::C1,
            mode: OcMode::Timing,
            pulse: FIRST_DEADLINE_TICKS,
            polarity: Polarity::ActiveHigh,
            fast_mode: false,
        },
    })
}

/// Brings up clocks, the LED pin and the timer, and unmasks the timer vector
///
/// The channel is left stopped; park the result where the handler can reach
/// it before calling [`Blinker::arm`].
pub fn bring_up<R, TIM, N>(
    rcc: &mut R,
    led_port: &'static dyn GpioRegExt,
    tim: TIM,
    nvic: &mut N,
) -> Result<Blinker<TIM, Pin<Output<PushPull>>>, Error>
where
    R: RccRegExt,
    TIM: TimRegExt,
    N: IrqControl,
{
    let clocks = CLOCK_CONFIG.freeze(rcc)?;
    let led = LED_PIN.into_push_pull_output(led_port, rcc)?;
    let timer = OcTimer::configure(tim, &blink_config(&clocks)?, rcc)?;

    nvic.set_priority(timer.instance(), IRQ_PRIORITY);
    nvic.unmask(timer.instance());

    Ok(Blinker { timer, led })
}

/// Configured but not yet running blinker
pub struct Blinker<TIM, LED> {
    timer: OcTimer<TIM>,
    led: LED,
}

impl<TIM, LED> Blinker<TIM, LED>
where
    TIM: TimRegExt,
    LED: ToggleableOutputPin,
{
    /// Starts the compare channel with its interrupt enabled
    ///
    /// From here on only the interrupt handler touches the timer and the LED.
    pub fn arm(mut self) -> Armed<TIM, LED> {
        self.timer.start_it();

        #[cfg(feature = "defmt")]
        defmt::info!("blinker armed on {}", self.timer.instance());

        Armed {
            timer: self.timer,
            led: self.led,
            toggles: 0,
        }
    }
}

/// Running blinker, owned by the timer's interrupt handler
pub struct Armed<TIM, LED> {
    timer: OcTimer<TIM>,
    led: LED,
    toggles: u32,
}

impl<TIM, LED> Armed<TIM, LED>
where
    TIM: TimRegExt,
    LED: ToggleableOutputPin,
{
    /// Services a compare match raised by `source`
    ///
    /// Only a channel 1 event of the bound timer is acted upon; anything else
    /// returns `false` and leaves timer and LED untouched.
    pub fn on_interrupt(&mut self, source: Instance) -> bool {
        if source != self.timer.instance() {
            return false;
        }
        match self.timer.pending() {
            Some(Channel::C1) => {}
            _ => return false,
        }

        self.timer.clear_pending(Channel::C1);
        self.led.toggle().ok();
        self.timer.advance_compare(HALF_PERIOD_TICKS);
        self.toggles = self.toggles.wrapping_add(1);
        true
    }

    /// Serviced matches so far
    pub fn toggles(&self) -> u32 {
        self.toggles
    }

    pub fn timer(&self) -> &OcTimer<TIM> {
        &self.timer
    }

    pub fn led(&self) -> &LED {
        &self.led
    }
}

/// Non-returning error state
pub fn fault() -> ! {
    loop {
        continue;
    }
}
