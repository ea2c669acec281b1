//! Generic command class

use crate::error::{FailureKind, OpError, Result};
use crate::op::{Completion, OperationClass};
use crate::port::RegisterPort;
use crate::regs::{CMD_LED_TEST_MODE_WRITE, GENCMD_CMD, GENCMD_DATA};
use std::sync::Arc;

/// Generic command execution
///
/// A command is a 16-bit number plus one 16-bit input word; the chip answers
/// with one output word in the same data register.
#[derive(Clone)]
pub struct GenericCommand {
    port: Arc<dyn RegisterPort>,
    class: Arc<OperationClass>,
}

impl GenericCommand {
    /// Create the generic-command class on top of `port`
    pub fn new(port: Arc<dyn RegisterPort>) -> Self {
        Self::with_class(port, Arc::new(OperationClass::new("gencmd")))
    }

    /// Create the class using an existing operation class
    pub fn with_class(port: Arc<dyn RegisterPort>, class: Arc<OperationClass>) -> Self {
        Self { port, class }
    }

    /// The underlying operation class
    pub fn class(&self) -> &Arc<OperationClass> {
        &self.class
    }

    /// Execute `command` with `input` and return the output word
    pub fn execute(&self, command: u16, input: u16) -> Result<u16> {
        log::debug!("Generic command {:#06x} input {:#06x}", command, input);
        let mut session = self.class.acquire()?;
        let completion = session.run(|| {
            self.port.write(GENCMD_DATA, input)?;
            self.port.write(GENCMD_CMD, command)
        })?;
        if completion == Completion::Failed {
            log::warn!("Generic command {:#06x} failed", command);
            return Err(OpError::OperationFailed(FailureKind::CommandFailed));
        }
        // Still under the gate, so nobody can overwrite the data register
        let output = self.port.read(GENCMD_DATA)?;
        log::debug!("Generic command {:#06x} output {:#06x}", command, output);
        Ok(output)
    }

    /// Turn the chip's LED test mode on or off
    pub fn set_led_test_mode(&self, enable: bool) -> Result<()> {
        self.execute(CMD_LED_TEST_MODE_WRITE, u16::from(enable))
            .map(|_| ())
    }
}

impl core::fmt::Debug for GenericCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GenericCommand")
            .field("class", &self.class)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;
    use crate::testing::MockPort;
    use crate::OperationState;

    fn setup() -> (Arc<MockPort>, GenericCommand) {
        let port = Arc::new(MockPort::new());
        let gc = GenericCommand::new(port.clone());
        (port, gc)
    }

    #[test]
    fn test_execute_returns_output() {
        let (port, gc) = setup();
        let class = gc.class().clone();
        let p = port.clone();
        port.on_write(move |reg, value| {
            if reg == GENCMD_CMD {
                let input = p.peek(GENCMD_DATA);
                p.poke(GENCMD_DATA, input.wrapping_add(value));
                class.on_complete();
            }
        });

        assert_eq!(gc.execute(0x0010, 5).unwrap(), 0x0015);
        assert_eq!(port.writes(), vec![(GENCMD_DATA, 5), (GENCMD_CMD, 0x0010)]);
    }

    #[test]
    fn test_execute_failure() {
        let (port, gc) = setup();
        let class = gc.class().clone();
        port.on_write(move |reg, _| {
            if reg == GENCMD_CMD {
                class.on_error();
            }
        });

        let err = gc.execute(0x7777, 0).unwrap_err();
        assert!(matches!(
            err,
            OpError::OperationFailed(FailureKind::CommandFailed)
        ));
        assert_eq!(gc.class().state(), OperationState::Idle);
    }

    #[test]
    fn test_trigger_io_error() {
        let (port, gc) = setup();
        port.fail_on(GENCMD_CMD);
        let err = gc.execute(1, 2).unwrap_err();
        assert!(matches!(
            err,
            OpError::RequestFailed {
                source: IoError::Transfer { .. }
            }
        ));
        assert_eq!(gc.class().state(), OperationState::Idle);
    }

    #[test]
    fn test_led_test_mode() {
        let (port, gc) = setup();
        let class = gc.class().clone();
        port.on_write(move |reg, _| {
            if reg == GENCMD_CMD {
                class.on_complete();
            }
        });
        gc.set_led_test_mode(true).unwrap();
        gc.set_led_test_mode(false).unwrap();
        assert_eq!(
            port.writes(),
            vec![
                (GENCMD_DATA, 1),
                (GENCMD_CMD, CMD_LED_TEST_MODE_WRITE),
                (GENCMD_DATA, 0),
                (GENCMD_CMD, CMD_LED_TEST_MODE_WRITE),
            ]
        );
    }
}
