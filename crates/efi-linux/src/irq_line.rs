//! Interrupt line watcher
//!
//! The EFI chip pulls its interrupt line low until `MOD_IFG` has been read.
//! [`IrqWatcher`] runs a thread that services the line by calling
//! [`IrqDispatcher::handle`]: either driven by GPIO edge events from the
//! character device, or by polling when the line is not wired up.

use crate::error::{LinuxError, Result};

use efi_core::IrqDispatcher;
use gpiocdev::line::{Bias, EdgeDetection, Offset, Value};
use gpiocdev::request::Request;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the GPIO thread blocks before checking for shutdown
const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on back-to-back services while the line stays low
const MAX_PASSES: usize = 8;

/// Default interval of the polling watcher
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// GPIO line carrying the chip interrupt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqLineConfig {
    /// GPIO chip device path (e.g. "/dev/gpiochip0")
    pub chip: String,
    /// Line offset on that chip
    pub line: Offset,
    /// Enable the internal pull-up
    pub pull_up: bool,
}

impl IrqLineConfig {
    /// Create a configuration for `line` on `chip`
    pub fn new(chip: impl Into<String>, line: Offset) -> Self {
        Self {
            chip: chip.into(),
            line,
            pull_up: false,
        }
    }
}

/// Background thread servicing the chip interrupt
pub struct IrqWatcher {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl IrqWatcher {
    /// Watch a GPIO line for falling edges
    pub fn gpio(config: &IrqLineConfig, dispatcher: Arc<IrqDispatcher>) -> Result<Self> {
        let mut builder = Request::builder();
        builder
            .on_chip(&config.chip)
            .with_consumer("efictl")
            .with_line(config.line)
            .as_input()
            .with_edge_detection(EdgeDetection::FallingEdge);
        if config.pull_up {
            builder.with_bias(Bias::PullUp);
        }
        let request = builder
            .request()
            .map_err(|e| LinuxError::LineRequestFailed {
                chip: config.chip.clone(),
                line: config.line,
                source: e,
            })?;

        log::info!(
            "linux_i2c: Watching interrupt on {} line {}",
            config.chip,
            config.line
        );
        let line = config.line;
        Self::spawn(move |stop| gpio_loop(&request, line, &dispatcher, stop))
    }

    /// Service the chip at a fixed interval instead of waiting for the line
    pub fn polling(interval: Duration, dispatcher: Arc<IrqDispatcher>) -> Result<Self> {
        log::info!(
            "linux_i2c: No interrupt line, polling every {} ms",
            interval.as_millis()
        );
        Self::spawn(move |stop| {
            while !stop.load(Ordering::Acquire) {
                thread::sleep(interval);
                dispatcher.handle();
            }
        })
    }

    fn spawn(body: impl FnOnce(&AtomicBool) + Send + 'static) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("efi-irq".into())
            .spawn(move || body(&flag))
            .map_err(LinuxError::SpawnFailed)?;
        Ok(Self {
            stop,
            worker: Some(worker),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Interrupt watcher thread panicked");
            }
        }
    }
}

impl Drop for IrqWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn line_asserted(request: &Request, line: Offset) -> bool {
    // Active low, requested without the active-low flag
    matches!(request.value(line), Ok(Value::Inactive))
}

fn gpio_loop(request: &Request, line: Offset, dispatcher: &IrqDispatcher, stop: &AtomicBool) {
    let mut edge = false;
    while !stop.load(Ordering::Acquire) {
        let mut passes = 0;
        while passes < MAX_PASSES && (edge || line_asserted(request, line)) {
            edge = false;
            dispatcher.handle();
            passes += 1;
        }
        if passes == MAX_PASSES {
            log::warn!("Interrupt line still asserted after {} passes", passes);
        }

        match request.wait_edge_event(WAIT_TIMEOUT) {
            Ok(true) => match request.read_edge_event() {
                Ok(_) => edge = true,
                Err(e) => log::warn!("Failed to read edge event: {}", e),
            },
            Ok(false) => {}
            Err(e) => {
                log::error!("Interrupt line wait failed, watcher exiting: {}", e);
                break;
            }
        }
    }
    log::debug!("Interrupt watcher stopped");
}
