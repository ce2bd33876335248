//! Blinks the user LED on PA5 at 1 Hz from TIM3 channel 1 compare matches
//!
//! Everything after bring-up happens in the TIM3 vector; the main loop only
//! sleeps.
#![no_main]
#![no_std]

use panic_halt as _;

use stm32f0xx_oc_blinky as hal;

use crate::hal::{
    blinky::{self, Armed},
    gpio::{Output, Pin, PushPull},
    interrupt::Handoff,
    pac::{self, interrupt, TIM3},
    prelude::*,
    timers::Instance,
};

use cortex_m::peripheral::Peripherals;
use cortex_m_rt::entry;

type LedBlinker = Armed<TIM3, Pin<Output<PushPull>>>;

// Handed over to the TIM3 vector on its first run
static BLINKER: Handoff<LedBlinker> = Handoff::new();

#[entry]
fn main() -> ! {
    if let (Some(p), Some(mut cp)) = (pac::Peripherals::take(), Peripherals::take()) {
        let mut rcc = p.RCC.constrain(p.FLASH);

        let blinker = blinky::bring_up(&mut rcc, p.GPIOA.regs(), p.TIM3, &mut cp.NVIC)
            .unwrap_or_else(|_| blinky::fault());

        // Nothing can fire before the blinker is parked
        cortex_m::interrupt::free(move |cs| {
            BLINKER.park(cs, blinker.arm());
        });
    }

    loop {
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn TIM3() {
    static mut LOCAL: Option<LedBlinker> = None;

    if LOCAL.is_none() {
        *LOCAL = cortex_m::interrupt::free(|cs| BLINKER.claim(cs));
    }

    if let Some(blinker) = LOCAL {
        blinker.on_interrupt(Instance::Tim3);
    }
}
