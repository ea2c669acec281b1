//! Interrupt demultiplexer
//!
//! The chip has a single interrupt line. [`IrqDispatcher::handle`] is called
//! by whatever watches that line (GPIO edge thread, emulator callback) and
//! turns the `MOD_IFG` / `MOD_ERR` status into per-event handler calls.
//! Which status bit belongs to which event is defined here and only here.

use crate::error::IoError;
use crate::port::RegisterPort;
use crate::regs::{ErrFlags, IrqFlags, MOD_ERR, MOD_IE, MOD_IFG};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Logical interrupt event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqEvent {
    /// Flash operation finished
    FlashDone,
    /// Flash operation failed
    FlashError,
    /// Key state changed
    Key,
    /// Generic command finished
    GenCmdDone,
    /// Generic command failed
    GenCmdError,
}

const EVENT_COUNT: usize = 5;

struct Descriptor {
    mask: u16,
    is_error: bool,
}

impl IrqEvent {
    /// All events, in dispatch order
    pub const ALL: [IrqEvent; EVENT_COUNT] = [
        IrqEvent::FlashDone,
        IrqEvent::FlashError,
        IrqEvent::Key,
        IrqEvent::GenCmdDone,
        IrqEvent::GenCmdError,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn descriptor(self) -> Descriptor {
        match self {
            Self::FlashDone => Descriptor {
                mask: IrqFlags::FLASH.bits(),
                is_error: false,
            },
            Self::FlashError => Descriptor {
                mask: ErrFlags::FLASH.bits(),
                is_error: true,
            },
            Self::Key => Descriptor {
                mask: IrqFlags::KEY.bits(),
                is_error: false,
            },
            Self::GenCmdDone => Descriptor {
                mask: IrqFlags::GCC.bits(),
                is_error: false,
            },
            Self::GenCmdError => Descriptor {
                mask: ErrFlags::GCC.bits(),
                is_error: true,
            },
        }
    }
}

/// Handler bound to one event
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct DispatchState {
    enabled: [bool; EVENT_COUNT],
    handlers: [Option<IrqHandler>; EVENT_COUNT],
}

/// Decodes the chip's interrupt status and calls per-event handlers
pub struct IrqDispatcher {
    port: Arc<dyn RegisterPort>,
    state: Mutex<DispatchState>,
}

impl IrqDispatcher {
    /// Create a dispatcher with every event disabled and unbound
    ///
    /// Call [`init`](Self::init) before enabling anything.
    pub fn new(port: Arc<dyn RegisterPort>) -> Self {
        Self {
            port,
            state: Mutex::new(DispatchState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the chip's interrupt registers into a known state
    ///
    /// Masks every source, drains pending flags and errors, then enables
    /// the error summary bit so error events can be delivered.
    pub fn init(&self) -> Result<(), IoError> {
        log::debug!("Initializing interrupt registers");
        self.port.clear_bits(MOD_IE, 0xFFFF)?;
        self.port.read(MOD_IFG)?;
        self.port.read(MOD_ERR)?;
        self.port.set_bits(MOD_IE, IrqFlags::ERR.bits())?;
        Ok(())
    }

    /// Bind `handler` to `event`, replacing any previous one
    pub fn bind(&self, event: IrqEvent, handler: impl Fn() + Send + Sync + 'static) {
        self.lock().handlers[event.index()] = Some(Arc::new(handler));
    }

    /// Remove the handler of `event`
    pub fn unbind(&self, event: IrqEvent) {
        self.lock().handlers[event.index()] = None;
    }

    /// Remove every handler
    pub fn unbind_all(&self) {
        self.lock().handlers = Default::default();
    }

    /// Whether `event` is currently enabled
    pub fn is_enabled(&self, event: IrqEvent) -> bool {
        self.lock().enabled[event.index()]
    }

    /// Enable or disable several events with at most two `MOD_IE` writes
    ///
    /// Error events have no enable bit of their own; they only change the
    /// software mask.
    pub fn set_enabled(&self, changes: &[(IrqEvent, bool)]) -> Result<(), IoError> {
        let mut state = self.lock();
        let mut enable = 0u16;
        let mut disable = 0u16;

        for &(event, on) in changes {
            let slot = &mut state.enabled[event.index()];
            if *slot == on {
                continue;
            }
            *slot = on;

            let desc = event.descriptor();
            if desc.is_error {
                continue;
            }
            if on {
                enable |= desc.mask;
                disable &= !desc.mask;
            } else {
                disable |= desc.mask;
                enable &= !desc.mask;
            }
        }

        log::debug!(
            "Interrupt enable changes: enable={:#06x} disable={:#06x}",
            enable,
            disable
        );
        if disable != 0 {
            self.port.clear_bits(MOD_IE, disable)?;
        }
        if enable != 0 {
            self.port.set_bits(MOD_IE, enable)?;
        }
        Ok(())
    }

    /// Mask every source on the chip and in software
    pub fn mask_all(&self) -> Result<(), IoError> {
        self.lock().enabled = [false; EVENT_COUNT];
        self.port.clear_bits(MOD_IE, 0xFFFF)
    }

    /// Service one assertion of the interrupt line
    ///
    /// Returns the number of handlers called. A failed status read is logged
    /// and the interrupt dropped.
    pub fn handle(&self) -> usize {
        let ifg = match self.port.read(MOD_IFG) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Failed to read IFG register: {}", e);
                return 0;
            }
        };
        let err = if ifg & IrqFlags::ERR.bits() != 0 {
            match self.port.read(MOD_ERR) {
                Ok(v) => v,
                Err(e) => {
                    log::error!("Failed to read ERR register: {}", e);
                    return 0;
                }
            }
        } else {
            0
        };
        log::trace!("Interrupt: IFG={:#06x} ERR={:#06x}", ifg, err);

        let pending: Vec<IrqHandler> = {
            let state = self.lock();
            IrqEvent::ALL
                .iter()
                .filter(|event| state.enabled[event.index()])
                .filter(|event| {
                    let desc = event.descriptor();
                    let status = if desc.is_error { err } else { ifg };
                    status & desc.mask != 0
                })
                .filter_map(|event| state.handlers[event.index()].clone())
                .collect()
        };

        for handler in &pending {
            handler();
        }
        pending.len()
    }
}

impl core::fmt::Debug for IrqDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("IrqDispatcher")
            .field("enabled", &state.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::Access;
    use crate::testing::MockPort;
    use std::sync::Mutex as StdMutex;

    fn setup() -> (Arc<MockPort>, IrqDispatcher) {
        let port = Arc::new(MockPort::new());
        let irq = IrqDispatcher::new(port.clone());
        (port, irq)
    }

    fn recorder(irq: &IrqDispatcher) -> Arc<StdMutex<Vec<IrqEvent>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for event in IrqEvent::ALL {
            let seen = Arc::clone(&seen);
            irq.bind(event, move || seen.lock().unwrap().push(event));
        }
        seen
    }

    #[test]
    fn test_init_sequence() {
        let (port, irq) = setup();
        irq.init().unwrap();
        assert_eq!(
            port.accesses(),
            vec![
                (Access::ClearBits, MOD_IE, 0xFFFF),
                (Access::SetBits, MOD_IE, IrqFlags::ERR.bits()),
            ]
        );
        assert_eq!(port.reads(), vec![MOD_IFG, MOD_ERR]);
    }

    #[test]
    fn test_set_enabled_batches() {
        let (port, irq) = setup();
        irq.set_enabled(&[
            (IrqEvent::FlashDone, true),
            (IrqEvent::FlashError, true),
            (IrqEvent::GenCmdDone, true),
        ])
        .unwrap();
        assert_eq!(
            port.accesses(),
            vec![(
                Access::SetBits,
                MOD_IE,
                (IrqFlags::FLASH | IrqFlags::GCC).bits()
            )]
        );
        assert!(irq.is_enabled(IrqEvent::FlashError));

        // Unchanged and error-only updates touch nothing
        irq.set_enabled(&[(IrqEvent::FlashDone, true), (IrqEvent::FlashError, false)])
            .unwrap();
        assert_eq!(port.accesses().len(), 1);
    }

    #[test]
    fn test_handle_dispatches_in_order() {
        let (port, irq) = setup();
        let seen = recorder(&irq);
        irq.set_enabled(&IrqEvent::ALL.map(|e| (e, true))).unwrap();

        port.poke(
            MOD_IFG,
            (IrqFlags::GCC | IrqFlags::FLASH | IrqFlags::ERR).bits(),
        );
        port.poke(MOD_ERR, ErrFlags::GCC.bits());
        assert_eq!(irq.handle(), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                IrqEvent::FlashDone,
                IrqEvent::GenCmdDone,
                IrqEvent::GenCmdError
            ]
        );
    }

    #[test]
    fn test_err_register_read_only_when_flagged() {
        let (port, irq) = setup();
        let seen = recorder(&irq);
        irq.set_enabled(&[(IrqEvent::FlashError, true)]).unwrap();

        port.poke(MOD_IFG, IrqFlags::FLASH.bits());
        port.poke(MOD_ERR, ErrFlags::FLASH.bits());
        assert_eq!(irq.handle(), 0);
        assert_eq!(port.reads(), vec![MOD_IFG]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_and_unbound_events_skipped() {
        let (port, irq) = setup();
        let seen = recorder(&irq);
        irq.set_enabled(&[(IrqEvent::Key, true), (IrqEvent::FlashDone, true)])
            .unwrap();
        irq.unbind(IrqEvent::FlashDone);

        port.poke(
            MOD_IFG,
            (IrqFlags::FLASH | IrqFlags::KEY | IrqFlags::GCC).bits(),
        );
        assert_eq!(irq.handle(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![IrqEvent::Key]);
    }

    #[test]
    fn test_status_read_failure_drops_interrupt() {
        let (port, irq) = setup();
        let _seen = recorder(&irq);
        irq.set_enabled(&[(IrqEvent::FlashDone, true)]).unwrap();
        port.fail_on(MOD_IFG);
        assert_eq!(irq.handle(), 0);
    }

    #[test]
    fn test_mask_all() {
        let (port, irq) = setup();
        irq.set_enabled(&[(IrqEvent::Key, true)]).unwrap();
        irq.mask_all().unwrap();
        assert!(!irq.is_enabled(IrqEvent::Key));
        assert_eq!(
            port.accesses().last(),
            Some(&(Access::ClearBits, MOD_IE, 0xFFFF))
        );
    }
}
