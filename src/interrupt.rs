//! Interrupt controller access and the static hand-off slot

use core::cell::RefCell;

use bare_metal::{CriticalSection, Mutex};

use crate::timers::Instance;

/// Per-vector control of the interrupt controller
pub trait IrqControl {
    /// Lower numbers are more urgent, 0 is the most urgent level
    fn set_priority(&mut self, line: Instance, priority: u8);

    fn unmask(&mut self, line: Instance);
}

#[cfg(feature = "device-selected")]
fn vector(line: Instance) -> Option<crate::pac::Interrupt> {
    match line {
        #[cfg(not(any(feature = "stm32f030", feature = "stm32f070")))]
        Instance::Tim2 => Some(crate::pac::Interrupt::TIM2),
        Instance::Tim3 => Some(crate::pac::Interrupt::TIM3),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

#[cfg(feature = "device-selected")]
impl IrqControl for cortex_m::peripheral::NVIC {
    fn set_priority(&mut self, line: Instance, priority: u8) {
        if let Some(irq) = vector(line) {
            // NOTE(unsafe) only called before the vector is unmasked
            unsafe { cortex_m::peripheral::NVIC::set_priority(self, irq, priority) };
        }
    }

    fn unmask(&mut self, line: Instance) {
        if let Some(irq) = vector(line) {
            cortex_m::peripheral::NVIC::unpend(irq);
            // NOTE(unsafe) the handler's state is parked before the channel is started
            unsafe { cortex_m::peripheral::NVIC::unmask(irq) };
        }
    }
}

/// Statically allocated slot that moves a value from the foreground into an
/// interrupt handler exactly once
///
/// The foreground parks the value inside a critical section; the handler
/// claims it on its first run and keeps it in handler-local storage from then
/// on, so no lock is taken on the hot path.
pub struct Handoff<T> {
    slot: Mutex<RefCell<Option<T>>>,
}

impl<T> Handoff<T> {
    pub const fn new() -> Self {
        Handoff {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    /// Parks `value`, returning whatever was parked before
    pub fn park(&self, cs: &CriticalSection, value: T) -> Option<T> {
        self.slot.borrow(cs).replace(Some(value))
    }

    pub fn claim(&self, cs: &CriticalSection) -> Option<T> {
        self.slot.borrow(cs).borrow_mut().take()
    }

    pub fn is_parked(&self, cs: &CriticalSection) -> bool {
        self.slot.borrow(cs).borrow().is_some()
    }
}
