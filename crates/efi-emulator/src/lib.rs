//! efi-emulator - In-memory EFI chip for testing
//!
//! [`EfiEmulator`] implements [`RegisterPort`] over an emulated register file
//! and flash array. Long-running operations (flash write and erase, checksum
//! check, mode switch, generic commands) are queued to a firmware thread that
//! completes them after the configured latency, latches the interrupt flags
//! and asserts the interrupt line by calling the installed sink.
//!
//! Flash operations and generic commands run on separate engines, each with
//! its own thread, as on the real chip. Test hooks allow holding an engine
//! ([`EfiEmulator::pause`]), failing register accesses and raising interrupts
//! nobody asked for.

pub mod config;
pub mod error;

pub use config::{EmulatorConfig, Mode, Region, Version};
pub use error::{EmulatorError, Result};

use efi_core::regs::*;
use efi_core::{IoError, IrqDispatcher, RegisterPort, SoftwareMode};
use std::collections::HashSet;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Called whenever the emulated interrupt line asserts
pub type IrqSink = Arc<dyn Fn() + Send + Sync>;

const REG_COUNT: usize = REGNO_MASK as usize + 1;
const IFLASH_WORDS: usize = IFLASH_WORD_COUNT as usize;

/// Bits of `FLASH_CTRL` that start an operation when they go from 0 to 1
const JOB_BITS: FlashCtrl = FlashCtrl::ESEC
    .union(FlashCtrl::FWCHK)
    .union(FlashCtrl::LDRCHK)
    .union(FlashCtrl::SWITCH);

/// Build a `words` long image whose wrapping word sum is zero
///
/// `seed` varies the content so two images differ.
pub fn checksummed_image(words: usize, seed: u16) -> Vec<u16> {
    let mut image: Vec<u16> = (0..words)
        .map(|i| (i as u16).wrapping_mul(0x9E37) ^ seed)
        .collect();
    if let Some((last, body)) = image.split_last_mut() {
        let sum = body.iter().fold(0u16, |acc, &w| acc.wrapping_add(w));
        *last = sum.wrapping_neg();
    }
    image
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Write { address: u16, value: u16 },
    Erase { address: u16 },
    Checksum(SoftwareMode),
    Switch,
    Command { command: u16, input: u16 },
}

/// Firmware engine executing a class of operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Flash write, erase, checksum and mode switch
    Flash,
    /// Generic commands
    Command,
}

impl Engine {
    const ALL: [Engine; 2] = [Engine::Flash, Engine::Command];

    fn index(self) -> usize {
        self as usize
    }
}

impl Job {
    fn engine(self) -> Engine {
        match self {
            Job::Command { .. } => Engine::Command,
            _ => Engine::Flash,
        }
    }

    fn flags(self) -> (IrqFlags, ErrFlags) {
        match self {
            Job::Command { .. } => (IrqFlags::GCC, ErrFlags::GCC),
            _ => (IrqFlags::FLASH, ErrFlags::FLASH),
        }
    }
}

struct ChipState {
    mode: SoftwareMode,
    flash: Vec<u16>,
    iflash: [u16; IFLASH_WORDS],
    ie: u16,
    ifg: u16,
    err: u16,
    flash_ctrl: u16,
    flash_addr: u16,
    iflash_addr: u16,
    gencmd_cmd: u16,
    gencmd_data: u16,
    led_test: bool,
    plain: [u16; REG_COUNT],
    faults: HashSet<u8>,
    disconnected: bool,
    pending_jobs: usize,
    writes: usize,
}

impl ChipState {
    fn new(config: &EmulatorConfig) -> Self {
        let mut flash = vec![0xFFFF; config.flash_words as usize];
        if config.valid_images {
            for (seed, region) in [(0x1D1Du16, config.loader), (0xF1F1, config.firmware)] {
                let start = region.start as usize;
                let image = checksummed_image(region.words as usize, seed);
                flash[start..start + image.len()].copy_from_slice(&image);
            }
        }

        let mut iflash = [0xFFFF; IFLASH_WORDS];
        iflash[..config.iflash.len()].copy_from_slice(&config.iflash);

        Self {
            mode: config.mode.into(),
            flash,
            iflash,
            ie: 0,
            ifg: 0,
            err: 0,
            flash_ctrl: 0,
            flash_addr: 0,
            iflash_addr: 0,
            gencmd_cmd: 0,
            gencmd_data: 0,
            led_test: false,
            plain: [0; REG_COUNT],
            faults: HashSet::new(),
            disconnected: false,
            pending_jobs: 0,
            writes: 0,
        }
    }

    fn line_asserted(&self) -> bool {
        self.ifg & self.ie != 0
    }

    fn read(&mut self, config: &EmulatorConfig, reg: u8) -> u16 {
        match reg {
            MOD_ID => config.mod_id(self.mode),
            MOD_FWV => config.firmware_version.to_raw(),
            MOD_LDRV => config.loader_version.to_raw(),
            MOD_HW => config.mod_hw(),
            MOD_IE => self.ie,
            MOD_IFG => core::mem::take(&mut self.ifg),
            MOD_ERR => core::mem::take(&mut self.err),
            FLASH_CTRL => self.flash_ctrl,
            FLASH_ADDR => self.flash_addr,
            FLASH_DATA => self
                .flash
                .get(self.flash_addr as usize)
                .copied()
                .unwrap_or(0xFFFF),
            IFLASH_ADDR => self.iflash_addr,
            IFLASH_DATA => self.iflash[self.iflash_addr as usize % IFLASH_WORDS],
            GENCMD_CMD => self.gencmd_cmd,
            GENCMD_DATA => self.gencmd_data,
            _ => self.plain[reg as usize],
        }
    }

    /// Apply a write, set or clear access and return the jobs it starts
    fn store(&mut self, config: &EmulatorConfig, access: Access, reg: u8, value: u16) -> Vec<Job> {
        let current = match reg {
            // Reading these has side effects; masks apply to the latched value
            MOD_IFG => self.ifg,
            MOD_ERR => self.err,
            _ => self.read(config, reg),
        };
        let new = match access {
            Access::Read | Access::Write => value,
            Access::SetBits => current | value,
            Access::ClearBits => current & !value,
        };

        let mut jobs = Vec::new();
        match reg {
            MOD_ID | MOD_FWV | MOD_LDRV | MOD_HW | IFLASH_DATA => {
                log::debug!("Ignoring write to read-only register {:#04x}", reg);
            }
            MOD_IE => self.ie = new,
            MOD_IFG => self.ifg = new,
            MOD_ERR => self.err = new,
            FLASH_CTRL => {
                let started = FlashCtrl::from_bits_truncate(new & !current) & JOB_BITS;
                self.flash_ctrl = new;
                if started.contains(FlashCtrl::ESEC) {
                    jobs.push(Job::Erase {
                        address: self.flash_addr,
                    });
                }
                if started.contains(FlashCtrl::FWCHK) {
                    jobs.push(Job::Checksum(SoftwareMode::Firmware));
                }
                if started.contains(FlashCtrl::LDRCHK) {
                    jobs.push(Job::Checksum(SoftwareMode::Loader));
                }
                if started.contains(FlashCtrl::SWITCH) {
                    jobs.push(Job::Switch);
                }
            }
            FLASH_ADDR => self.flash_addr = new,
            FLASH_DATA => jobs.push(Job::Write {
                address: self.flash_addr,
                value: new,
            }),
            IFLASH_ADDR => self.iflash_addr = new,
            GENCMD_DATA => self.gencmd_data = new,
            GENCMD_CMD => {
                self.gencmd_cmd = new;
                jobs.push(Job::Command {
                    command: new,
                    input: self.gencmd_data,
                });
            }
            _ => self.plain[reg as usize] = new,
        }
        jobs
    }

    fn checksum_valid(&self, config: &EmulatorConfig, mode: SoftwareMode) -> bool {
        let region = config.partition(mode);
        let words = &self.flash[region.start as usize..region.end() as usize];
        words.iter().fold(0u16, |acc, &w| acc.wrapping_add(w)) == 0
    }

    /// Flash writes and erases are refused without write enable and inside
    /// the partition the chip is running from
    fn may_modify(&self, config: &EmulatorConfig, first: u16, words: u32) -> bool {
        if self.flash_ctrl & FlashCtrl::WREN.bits() == 0 {
            log::debug!("Flash access without write enable");
            return false;
        }
        if first as u32 + words > self.flash.len() as u32 {
            log::debug!("Flash access outside flash at {:#06x}", first);
            return false;
        }
        let target = Region {
            start: first,
            words,
        };
        let active = config.partition(self.mode);
        if active.contains(target.start) || target.contains(active.start) {
            log::debug!("Flash access to active {} partition", self.mode);
            return false;
        }
        true
    }

    fn run(&mut self, config: &EmulatorConfig, job: Job) -> bool {
        match job {
            Job::Write { address, value } => {
                if !self.may_modify(config, address, 1) {
                    return false;
                }
                // Programming only clears bits
                self.flash[address as usize] &= value;
                true
            }
            Job::Erase { address } => {
                self.flash_ctrl &= !FlashCtrl::ESEC.bits();
                let segment = config.segment_words;
                let base = address & !(segment - 1);
                if !self.may_modify(config, base, segment as u32) {
                    return false;
                }
                let base = base as usize;
                self.flash[base..base + segment as usize].fill(0xFFFF);
                true
            }
            Job::Checksum(mode) => {
                let bit = match mode {
                    SoftwareMode::Loader => FlashCtrl::LDRCHK,
                    SoftwareMode::Firmware => FlashCtrl::FWCHK,
                };
                self.flash_ctrl &= !bit.bits();
                self.checksum_valid(config, mode)
            }
            Job::Switch => {
                self.flash_ctrl &= !FlashCtrl::SWITCH.bits();
                let target = match self.mode {
                    SoftwareMode::Loader => SoftwareMode::Firmware,
                    SoftwareMode::Firmware => SoftwareMode::Loader,
                };
                if !self.checksum_valid(config, target) {
                    log::debug!("Refusing switch to {}: bad checksum", target);
                    return false;
                }
                self.mode = target;
                true
            }
            Job::Command { command, input } => match command {
                CMD_LED_TEST_MODE_WRITE if input <= 1 => {
                    self.led_test = input == 1;
                    self.gencmd_data = input;
                    true
                }
                CMD_LED_TEST_MODE_READ => {
                    self.gencmd_data = u16::from(self.led_test);
                    true
                }
                _ => false,
            },
        }
    }

    /// Finish `job` and latch its interrupt; returns whether the line asserts
    fn complete(&mut self, config: &EmulatorConfig, job: Job) -> bool {
        let ok = self.run(config, job);
        log::debug!("Firmware finished {:?}: {}", job, if ok { "ok" } else { "error" });

        let (done, error) = job.flags();
        if ok {
            self.ifg |= done.bits();
        } else {
            self.err |= error.bits();
            self.ifg |= IrqFlags::ERR.bits();
        }
        self.pending_jobs = self.pending_jobs.saturating_sub(1);
        self.line_asserted()
    }
}

struct Shared {
    config: EmulatorConfig,
    state: Mutex<ChipState>,
    paused: Mutex<[bool; 2]>,
    resumed: Condvar,
    sink: Mutex<Option<IrqSink>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_resumed(&self, engine: Engine) {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        while paused[engine.index()] {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn raise_irq(&self) {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => sink(),
            None => log::trace!("Interrupt line asserted, nobody listening"),
        }
    }
}

fn firmware_loop(shared: Arc<Shared>, engine: Engine, jobs: Receiver<Job>) {
    let latency = Duration::from_millis(shared.config.latency_ms);
    for job in jobs {
        shared.wait_resumed(engine);
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        // The state lock must be released before the sink reads MOD_IFG
        let raise = shared.state().complete(&shared.config, job);
        if raise {
            shared.raise_irq();
        }
    }
    log::debug!("{:?} engine stopped", engine);
}

/// Emulated EFI chip
pub struct EfiEmulator {
    shared: Arc<Shared>,
    jobs: Mutex<Vec<Sender<Job>>>,
    workers: Vec<JoinHandle<()>>,
}

impl EfiEmulator {
    /// Create an emulator and start its firmware thread
    pub fn new(config: EmulatorConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            state: Mutex::new(ChipState::new(&config)),
            config,
            paused: Mutex::new([false; 2]),
            resumed: Condvar::new(),
            sink: Mutex::new(None),
        });

        let mut senders = Vec::new();
        let mut workers = Vec::new();
        for engine in Engine::ALL {
            let (tx, rx) = mpsc::channel();
            let shared = Arc::clone(&shared);
            let worker = thread::Builder::new()
                .name(format!("efi-{:?}", engine).to_lowercase())
                .spawn(move || firmware_loop(shared, engine, rx))?;
            senders.push(tx);
            workers.push(worker);
        }

        Ok(Self {
            shared,
            jobs: Mutex::new(senders),
            workers,
        })
    }

    /// Create an emulator with the default configuration
    pub fn new_default() -> Result<Self> {
        Self::new(EmulatorConfig::default())
    }

    /// The configuration in use
    pub fn config(&self) -> &EmulatorConfig {
        &self.shared.config
    }

    /// Install the interrupt line callback
    ///
    /// It runs on the firmware thread (or the thread calling
    /// [`raise_spurious`](Self::raise_spurious)) with no emulator lock held,
    /// so it may read registers.
    pub fn set_irq_sink(&self, sink: impl Fn() + Send + Sync + 'static) {
        *self.shared.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(sink));
    }

    /// Remove the interrupt line callback
    pub fn clear_irq_sink(&self) {
        *self.shared.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Route the interrupt line to `irq`
    ///
    /// Only a weak reference is kept, so the dispatcher (which owns a port
    /// handle to this emulator) can still be freed.
    pub fn connect(&self, irq: &Arc<IrqDispatcher>) {
        let irq = Arc::downgrade(irq);
        self.set_irq_sink(move || {
            if let Some(irq) = irq.upgrade() {
                irq.handle();
            }
        });
    }

    /// Hold `engine` before it starts its next queued operation
    pub fn pause(&self, engine: Engine) {
        self.shared.paused.lock().unwrap_or_else(PoisonError::into_inner)[engine.index()] = true;
    }

    /// Let `engine` continue
    pub fn resume(&self, engine: Engine) {
        self.shared.paused.lock().unwrap_or_else(PoisonError::into_inner)[engine.index()] = false;
        self.shared.resumed.notify_all();
    }

    /// Make the next access to `reg` fail with a transfer error
    pub fn fail_next(&self, reg: u8) {
        self.shared.state().faults.insert(reg);
    }

    /// Make every access fail with [`IoError::Disconnected`] while set
    pub fn set_disconnected(&self, disconnected: bool) {
        self.shared.state().disconnected = disconnected;
    }

    /// Latch interrupt and error flags as if the firmware had raised them,
    /// and assert the line if any of them is enabled
    pub fn raise_spurious(&self, flags: IrqFlags, errors: ErrFlags) {
        let raise = {
            let mut state = self.shared.state();
            state.ifg |= flags.bits();
            if !errors.is_empty() {
                state.err |= errors.bits();
                state.ifg |= IrqFlags::ERR.bits();
            }
            state.line_asserted()
        };
        if raise {
            self.shared.raise_irq();
        }
    }

    /// Whether the interrupt line is currently asserted
    pub fn line_asserted(&self) -> bool {
        self.shared.state().line_asserted()
    }

    /// Operations queued or running on either engine
    pub fn pending_jobs(&self) -> usize {
        self.shared.state().pending_jobs
    }

    /// Number of write, set and clear accesses so far
    pub fn write_count(&self) -> usize {
        self.shared.state().writes
    }

    /// Software mode the chip runs
    pub fn mode(&self) -> SoftwareMode {
        self.shared.state().mode
    }

    /// Word of the main flash
    pub fn flash_word(&self, address: u16) -> Option<u16> {
        self.shared.state().flash.get(address as usize).copied()
    }

    /// Whether the LED test mode is on
    pub fn led_test_mode(&self) -> bool {
        self.shared.state().led_test
    }

    fn access(&self, access: Access, reg: u8, value: u16) -> core::result::Result<u16, IoError> {
        if !is_valid_register(reg) {
            return Err(IoError::InvalidRegister(reg));
        }

        let (result, jobs) = {
            let mut state = self.shared.state();
            if state.disconnected {
                return Err(IoError::Disconnected);
            }
            if state.faults.remove(&reg) {
                log::debug!("Injected fault on register {:#04x}", reg);
                return Err(IoError::transfer(
                    reg,
                    io::Error::new(io::ErrorKind::Other, "injected fault"),
                ));
            }

            if access == Access::Read {
                let v = state.read(&self.shared.config, reg);
                log::trace!("read {:#04x} -> {:#06x}", reg, v);
                (v, Vec::new())
            } else {
                state.writes += 1;
                log::trace!("{:?} {:#04x} {:#06x}", access, reg, value);
                let jobs = state.store(&self.shared.config, access, reg, value);
                state.pending_jobs += jobs.len();
                (0, jobs)
            }
        };

        if !jobs.is_empty() {
            let senders = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            for job in jobs {
                senders
                    .get(job.engine().index())
                    .ok_or(IoError::Disconnected)?
                    .send(job)
                    .map_err(|_| IoError::Disconnected)?;
            }
        }
        Ok(result)
    }
}

impl RegisterPort for EfiEmulator {
    fn read(&self, reg: u8) -> core::result::Result<u16, IoError> {
        self.access(Access::Read, reg, 0)
    }

    fn write(&self, reg: u8, value: u16) -> core::result::Result<(), IoError> {
        self.access(Access::Write, reg, value).map(|_| ())
    }

    fn set_bits(&self, reg: u8, mask: u16) -> core::result::Result<(), IoError> {
        self.access(Access::SetBits, reg, mask).map(|_| ())
    }

    fn clear_bits(&self, reg: u8, mask: u16) -> core::result::Result<(), IoError> {
        self.access(Access::ClearBits, reg, mask).map(|_| ())
    }
}

impl Drop for EfiEmulator {
    fn drop(&mut self) {
        for engine in Engine::ALL {
            self.resume(engine);
        }
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        for worker in self.workers.drain(..) {
            // Last handle dropped from inside the interrupt sink
            if worker.thread().id() == thread::current().id() {
                continue;
            }
            if worker.join().is_err() {
                log::warn!("Firmware thread panicked");
            }
        }
    }
}

impl core::fmt::Debug for EfiEmulator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("EfiEmulator")
            .field("mode", &state.mode)
            .field("ie", &state.ie)
            .field("ifg", &state.ifg)
            .field("err", &state.err)
            .field("pending_jobs", &state.pending_jobs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::RecvTimeoutError;

    const WAIT: Duration = Duration::from_secs(5);

    /// Emulator with every interrupt enabled and the line wired to a channel
    fn wired(config: EmulatorConfig) -> (EfiEmulator, Receiver<()>) {
        let emu = EfiEmulator::new(config).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        emu.set_irq_sink(move || {
            let _ = tx.lock().unwrap().send(());
        });
        emu.write(MOD_IE, 0xFFFF).unwrap();
        (emu, rx)
    }

    #[test]
    fn test_identity_registers() {
        let emu = EfiEmulator::new_default().unwrap();
        let config = EmulatorConfig::default();
        assert_eq!(
            emu.read(MOD_ID).unwrap(),
            config.mod_id(SoftwareMode::Firmware)
        );
        assert_eq!(emu.read(MOD_FWV).unwrap(), config.firmware_version.to_raw());
        emu.write(MOD_ID, 0).unwrap();
        assert_eq!(
            emu.read(MOD_ID).unwrap(),
            config.mod_id(SoftwareMode::Firmware)
        );
    }

    #[test]
    fn test_invalid_register() {
        let emu = EfiEmulator::new_default().unwrap();
        assert!(matches!(
            emu.read(0x40),
            Err(IoError::InvalidRegister(0x40))
        ));
    }

    #[test]
    fn test_write_requires_wren() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.write(FLASH_ADDR, 0x0010).unwrap();
        emu.write(FLASH_DATA, 0x1234).unwrap();
        rx.recv_timeout(WAIT).unwrap();

        assert_eq!(emu.read(MOD_IFG).unwrap(), IrqFlags::ERR.bits());
        assert_eq!(emu.read(MOD_ERR).unwrap(), ErrFlags::FLASH.bits());
        // Read to clear
        assert_eq!(emu.read(MOD_IFG).unwrap(), 0);
        assert_eq!(emu.read(MOD_ERR).unwrap(), 0);
    }

    #[test]
    fn test_erase_and_program_inactive_partition() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.set_bits(FLASH_CTRL, FlashCtrl::WREN.bits()).unwrap();

        emu.write(FLASH_ADDR, 0x0010).unwrap();
        emu.set_bits(FLASH_CTRL, FlashCtrl::ESEC.bits()).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_IFG).unwrap(), IrqFlags::FLASH.bits());
        assert_eq!(emu.flash_word(0x0000), Some(0xFFFF));
        assert_eq!(emu.read(FLASH_CTRL).unwrap(), FlashCtrl::WREN.bits());

        emu.write(FLASH_DATA, 0x1234).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_IFG).unwrap(), IrqFlags::FLASH.bits());
        assert_eq!(emu.read(FLASH_DATA).unwrap(), 0x1234);
    }

    #[test]
    fn test_active_partition_is_protected() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.set_bits(FLASH_CTRL, FlashCtrl::WREN.bits()).unwrap();
        emu.write(FLASH_ADDR, 0x2000).unwrap();
        emu.set_bits(FLASH_CTRL, FlashCtrl::ESEC.bits()).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_ERR).unwrap(), ErrFlags::FLASH.bits());
    }

    #[test]
    fn test_checksum_and_switch() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.set_bits(FLASH_CTRL, FlashCtrl::LDRCHK.bits()).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_IFG).unwrap(), IrqFlags::FLASH.bits());

        emu.set_bits(FLASH_CTRL, FlashCtrl::SWITCH.bits()).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.mode(), SoftwareMode::Loader);
        assert_eq!(
            SoftwareMode::from_mod_id(emu.read(MOD_ID).unwrap()),
            SoftwareMode::Loader
        );
    }

    #[test]
    fn test_switch_refused_on_blank_partition() {
        let config = EmulatorConfig {
            valid_images: false,
            ..Default::default()
        };
        let (emu, rx) = wired(config);
        emu.set_bits(FLASH_CTRL, FlashCtrl::SWITCH.bits()).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_ERR).unwrap(), ErrFlags::FLASH.bits());
        assert_eq!(emu.mode(), SoftwareMode::Firmware);
    }

    #[test]
    fn test_generic_commands() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.write(GENCMD_DATA, 1).unwrap();
        emu.write(GENCMD_CMD, CMD_LED_TEST_MODE_WRITE).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_IFG).unwrap(), IrqFlags::GCC.bits());
        assert!(emu.led_test_mode());

        emu.write(GENCMD_CMD, 0x7F7F).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_ERR).unwrap(), ErrFlags::GCC.bits());
    }

    #[test]
    fn test_pause_holds_completion() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.pause(Engine::Flash);
        emu.set_bits(FLASH_CTRL, FlashCtrl::LDRCHK.bits()).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        );
        assert_eq!(emu.pending_jobs(), 1);

        // The command engine is not held
        emu.write(GENCMD_CMD, CMD_LED_TEST_MODE_READ).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.read(MOD_IFG).unwrap(), IrqFlags::GCC.bits());
        assert_eq!(emu.pending_jobs(), 1);

        emu.resume(Engine::Flash);
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(emu.pending_jobs(), 0);
    }

    #[test]
    fn test_masked_interrupt_does_not_assert() {
        let (emu, rx) = wired(EmulatorConfig::default());
        emu.write(MOD_IE, 0).unwrap();
        emu.raise_spurious(IrqFlags::KEY, ErrFlags::empty());
        assert!(!emu.line_asserted());
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
        emu.set_bits(MOD_IE, IrqFlags::KEY.bits()).unwrap();
        assert!(emu.line_asserted());
    }

    #[test]
    fn test_fault_injection() {
        let emu = EfiEmulator::new_default().unwrap();
        emu.fail_next(FLASH_ADDR);
        assert!(matches!(
            emu.write(FLASH_ADDR, 1),
            Err(IoError::Transfer { reg: FLASH_ADDR, .. })
        ));
        emu.write(FLASH_ADDR, 1).unwrap();

        emu.set_disconnected(true);
        assert!(matches!(emu.read(MOD_ID), Err(IoError::Disconnected)));
        emu.set_disconnected(false);
        assert!(emu.read(MOD_ID).is_ok());
    }

    #[test]
    fn test_checksummed_image() {
        let image = checksummed_image(100, 0x1234);
        assert_eq!(image.iter().fold(0u16, |a, &w| a.wrapping_add(w)), 0);
        assert_ne!(image, checksummed_image(100, 0x4321));
        assert!(checksummed_image(0, 0).is_empty());
    }
}
