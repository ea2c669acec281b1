//! In-memory register port for unit tests

use crate::error::IoError;
use crate::port::RegisterPort;
use crate::regs::{is_valid_register, Access, REGNO_MASK};
use std::io;
use std::sync::{Arc, Mutex};

type WriteHook = Arc<dyn Fn(u8, u16) + Send + Sync>;

#[derive(Default)]
struct Inner {
    regs: Vec<u16>,
    log: Vec<(Access, u8, u16)>,
    fail: Vec<u8>,
}

/// Register file with an access log and a hook on every write
pub(crate) struct MockPort {
    inner: Mutex<Inner>,
    hook: Mutex<Option<WriteHook>>,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                regs: vec![0; REGNO_MASK as usize + 1],
                ..Default::default()
            }),
            hook: Mutex::new(None),
        }
    }

    /// Call `hook(reg, value)` after every write, set or clear
    pub(crate) fn on_write(&self, hook: impl Fn(u8, u16) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Make every access to `reg` fail
    pub(crate) fn fail_on(&self, reg: u8) {
        self.inner.lock().unwrap().fail.push(reg);
    }

    pub(crate) fn peek(&self, reg: u8) -> u16 {
        self.inner.lock().unwrap().regs[reg as usize]
    }

    pub(crate) fn poke(&self, reg: u8, value: u16) {
        self.inner.lock().unwrap().regs[reg as usize] = value;
    }

    /// Every access except reads
    pub(crate) fn accesses(&self) -> Vec<(Access, u8, u16)> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .copied()
            .filter(|(a, _, _)| *a != Access::Read)
            .collect()
    }

    /// Registers read, in order
    pub(crate) fn reads(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(a, _, _)| *a == Access::Read)
            .map(|(_, r, _)| *r)
            .collect()
    }

    /// Plain writes only
    pub(crate) fn writes(&self) -> Vec<(u8, u16)> {
        self.accesses()
            .into_iter()
            .filter(|(a, _, _)| *a == Access::Write)
            .map(|(_, r, v)| (r, v))
            .collect()
    }

    fn access(&self, access: Access, reg: u8, value: u16) -> Result<u16, IoError> {
        if !is_valid_register(reg) {
            return Err(IoError::InvalidRegister(reg));
        }
        let result = {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail.contains(&reg) {
                return Err(IoError::transfer(
                    reg,
                    io::Error::new(io::ErrorKind::Other, "injected"),
                ));
            }
            inner.log.push((access, reg, value));
            let slot = &mut inner.regs[reg as usize];
            match access {
                Access::Read => {}
                Access::Write => *slot = value,
                Access::SetBits => *slot |= value,
                Access::ClearBits => *slot &= !value,
            }
            *slot
        };
        if access != Access::Read {
            let hook = self.hook.lock().unwrap().clone();
            if let Some(hook) = hook {
                hook(reg, value);
            }
        }
        Ok(result)
    }
}

impl RegisterPort for MockPort {
    fn read(&self, reg: u8) -> Result<u16, IoError> {
        self.access(Access::Read, reg, 0)
    }

    fn write(&self, reg: u8, value: u16) -> Result<(), IoError> {
        self.access(Access::Write, reg, value).map(|_| ())
    }

    fn set_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        self.access(Access::SetBits, reg, mask).map(|_| ())
    }

    fn clear_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        self.access(Access::ClearBits, reg, mask).map(|_| ())
    }
}
