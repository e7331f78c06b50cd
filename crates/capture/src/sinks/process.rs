//! ProcessByteSink - stdin of a child process
//!
//! The child may exit at any time; `is_alive` observes that without
//! blocking and writes fail with `SinkClosed` once the pipe is gone.

use std::io::{ErrorKind, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use contracts::{ByteSink, ContractError};
use tracing::{debug, error, warn};

use crate::error::{CaptureError, Result};

const EXIT_POLL: Duration = Duration::from_millis(20);

pub struct ProcessByteSink {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    close_timeout: Duration,
    status: Option<ExitStatus>,
}

impl ProcessByteSink {
    pub fn spawn(
        name: impl Into<String>,
        program: &str,
        args: &[String],
        close_timeout: Duration,
    ) -> Result<Self> {
        let launch_error = |source| CaptureError::Launch {
            program: program.to_string(),
            source,
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(launch_error)?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_error(std::io::Error::other("stdin was not captured")));
        };

        let name = name.into();
        debug!(sink = %name, pid = child.id(), "child process started");
        Ok(Self {
            name,
            child,
            stdin: Some(stdin),
            close_timeout,
            status: None,
        })
    }

    fn pipe_error(&self, op: &str, e: std::io::Error) -> ContractError {
        if e.kind() == ErrorKind::BrokenPipe {
            ContractError::SinkClosed {
                sink_name: self.name.clone(),
            }
        } else {
            ContractError::sink_write(&self.name, format!("{op}: {e}"))
        }
    }

    fn wait_for_exit(&mut self) -> std::result::Result<ExitStatus, ContractError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let started = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.status = Some(status);
                    return Ok(status);
                }
                Ok(None) if started.elapsed() >= self.close_timeout => {
                    warn!(sink = %self.name, timeout_s = self.close_timeout.as_secs_f64(), "child did not exit, killing");
                    let _ = self.child.kill();
                    let status = self.child.wait()?;
                    self.status = Some(status);
                    return Err(ContractError::sink_write(
                        &self.name,
                        format!(
                            "did not exit within {:.1}s and was killed",
                            self.close_timeout.as_secs_f64()
                        ),
                    ));
                }
                Ok(None) => thread::sleep(EXIT_POLL),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl ByteSink for ProcessByteSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), ContractError> {
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(bytes),
            None => {
                return Err(ContractError::SinkClosed {
                    sink_name: self.name.clone(),
                })
            }
        };
        result.map_err(|e| self.pipe_error("write", e))
    }

    fn flush(&mut self) -> std::result::Result<(), ContractError> {
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => return Ok(()),
        };
        result.map_err(|e| self.pipe_error("flush", e))
    }

    fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(sink = %self.name, %status, "child process exited");
                self.status = Some(status);
                false
            }
            Err(e) => {
                error!(sink = %self.name, error = %e, "cannot poll child process");
                false
            }
        }
    }

    fn close(&mut self) -> std::result::Result<(), ContractError> {
        // dropping stdin delivers EOF
        drop(self.stdin.take());
        let status = self.wait_for_exit()?;
        if status.success() {
            debug!(sink = %self.name, "child process finished");
            Ok(())
        } else {
            Err(ContractError::sink_write(
                &self.name,
                format!("exited with {status}"),
            ))
        }
    }
}

impl Drop for ProcessByteSink {
    fn drop(&mut self) {
        if self.status.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
