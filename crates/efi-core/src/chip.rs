//! Chip handle
//!
//! [`EfiChip`] owns everything that exists per attached chip: the register
//! port, the interrupt dispatcher and the two operation classes. Attach wires
//! the dispatcher's completion and error events to the classes; detach (or
//! drop) takes it all down together.

use crate::error::{AttachError, IoError};
use crate::flash::FlashOps;
use crate::gencmd::GenericCommand;
use crate::info::{HardwareInfo, ModuleId, VersionInfo};
use crate::irq::{IrqDispatcher, IrqEvent};
use crate::port::RegisterPort;
use crate::regs::{MOD_FWV, MOD_HW, MOD_ID, MOD_LDRV};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Options for [`EfiChip::attach`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOptions {
    /// Refuse chips whose `MOD_ID` does not match the supported identity
    pub verify_identity: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            verify_identity: true,
        }
    }
}

/// Identity and version information read at attach time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    /// Decoded `MOD_ID`
    pub id: ModuleId,
    /// Firmware version, if it could be read
    pub firmware: Option<VersionInfo>,
    /// Loader version, if it could be read
    pub loader: Option<VersionInfo>,
    /// PCB information, if it could be read
    pub hardware: Option<HardwareInfo>,
}

/// Handle to one attached EFI chip
pub struct EfiChip {
    port: Arc<dyn RegisterPort>,
    irq: Arc<IrqDispatcher>,
    flash: FlashOps,
    gencmd: GenericCommand,
    info: ChipInfo,
    detached: AtomicBool,
}

const CLASS_EVENTS: [IrqEvent; 4] = [
    IrqEvent::FlashDone,
    IrqEvent::FlashError,
    IrqEvent::GenCmdDone,
    IrqEvent::GenCmdError,
];

fn check_identity(id: &ModuleId) -> Result<(), AttachError> {
    let expected = ModuleId::SUPPORTED;
    let fields = [
        ("platform", id.platform, expected.platform),
        ("project", id.project, expected.project),
        ("processor", id.processor, expected.processor),
    ];
    for (field, value, want) in fields {
        if value != want {
            log::error!("Unsupported {}: {}", field, value);
            return Err(AttachError::Unsupported { field, value });
        }
    }
    Ok(())
}

fn read_logged<T>(
    port: &dyn RegisterPort,
    reg: u8,
    name: &str,
    decode: fn(u16) -> T,
) -> Option<T> {
    match port.read(reg) {
        Ok(raw) => Some(decode(raw)),
        Err(e) => {
            log::warn!("Cannot read {}: {}", name, e);
            None
        }
    }
}

impl EfiChip {
    /// Attach to the chip behind `port`
    ///
    /// Reads and checks the identity, initializes the interrupt registers and
    /// enables the completion and error events of both operation classes.
    /// The caller is responsible for calling [`irq`](Self::irq)`().handle()`
    /// whenever the interrupt line asserts.
    pub fn attach(port: Arc<dyn RegisterPort>, options: AttachOptions) -> Result<Self, AttachError> {
        let id = ModuleId::from_raw(port.read(MOD_ID)?);
        if options.verify_identity {
            check_identity(&id)?;
            log::info!(
                "Detected EFI chip (platform {}, project {}, processor {})",
                id.platform,
                id.project,
                id.processor
            );
        } else {
            log::debug!("Identity check skipped: {:?}", id);
        }

        let info = ChipInfo {
            id,
            firmware: read_logged(&*port, MOD_FWV, "firmware version", VersionInfo::from_raw),
            loader: read_logged(&*port, MOD_LDRV, "loader version", VersionInfo::from_raw),
            hardware: read_logged(&*port, MOD_HW, "hardware info", HardwareInfo::from_raw),
        };
        if let Some(v) = info.firmware {
            log::info!("Firmware version: {}", v);
        }
        if let Some(v) = info.loader {
            log::info!("Loader version: {}", v);
        }
        if let Some(hw) = info.hardware {
            log::info!("PCB: {}", hw);
        }

        let irq = Arc::new(IrqDispatcher::new(port.clone()));
        irq.init()?;

        let flash = FlashOps::new(port.clone());
        let gencmd = GenericCommand::new(port.clone());

        let c = flash.class().clone();
        irq.bind(IrqEvent::FlashDone, move || c.on_complete());
        let c = flash.class().clone();
        irq.bind(IrqEvent::FlashError, move || c.on_error());
        let c = gencmd.class().clone();
        irq.bind(IrqEvent::GenCmdDone, move || c.on_complete());
        let c = gencmd.class().clone();
        irq.bind(IrqEvent::GenCmdError, move || c.on_error());

        if let Err(e) = irq.set_enabled(&CLASS_EVENTS.map(|event| (event, true))) {
            irq.unbind_all();
            if let Err(mask_err) = irq.mask_all() {
                log::warn!("Cannot mask interrupts after failed attach: {}", mask_err);
            }
            return Err(e.into());
        }

        Ok(Self {
            port,
            irq,
            flash,
            gencmd,
            info,
            detached: AtomicBool::new(false),
        })
    }

    /// Flash operations
    pub fn flash(&self) -> &FlashOps {
        &self.flash
    }

    /// Generic command execution
    pub fn gencmd(&self) -> &GenericCommand {
        &self.gencmd
    }

    /// Interrupt dispatcher; hand this to the interrupt line watcher
    pub fn irq(&self) -> Arc<IrqDispatcher> {
        Arc::clone(&self.irq)
    }

    /// Information read at attach time
    pub fn info(&self) -> &ChipInfo {
        &self.info
    }

    /// Raw register access
    pub fn port(&self) -> &Arc<dyn RegisterPort> {
        &self.port
    }

    /// Install a handler for key state change interrupts
    pub fn on_key(&self, handler: impl Fn() + Send + Sync + 'static) -> Result<(), IoError> {
        self.irq.bind(IrqEvent::Key, handler);
        self.irq.set_enabled(&[(IrqEvent::Key, true)])
    }

    /// Whether [`detach`](Self::detach) already ran
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Tear the chip handle down
    ///
    /// Both classes are closed, so callers blocked on a gate get
    /// [`OpError::Cancelled`](crate::OpError::Cancelled). An operation
    /// already in flight still runs to completion: detach blocks until its
    /// completion or error interrupt has been handled. Then every chip
    /// interrupt is masked and all handlers are unbound. Calling it again is
    /// a no-op.
    ///
    /// Must not be called by a thread that holds a [`Session`](crate::op::Session)
    /// of this chip.
    pub fn detach(&self) -> Result<(), IoError> {
        if self.detached.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::debug!("Detaching EFI chip");

        self.flash.class().close();
        self.gencmd.class().close();
        // Handlers stay bound until in-flight operations resolve
        self.flash.class().drain();
        self.gencmd.class().drain();

        // Unbind even if masking fails so no handler outlives the handle
        let masked = self.irq.mask_all();
        self.irq.unbind_all();
        masked
    }
}

impl Drop for EfiChip {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::warn!("Error while detaching EFI chip: {}", e);
        }
    }
}

impl core::fmt::Debug for EfiChip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EfiChip")
            .field("info", &self.info)
            .field("flash", &self.flash)
            .field("gencmd", &self.gencmd)
            .field("detached", &self.is_detached())
            .finish()
    }
}
