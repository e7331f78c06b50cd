//! ByteSink - raw byte stream consumer (e.g. an external encoder's stdin)

use crate::ContractError;

/// Byte stream sink.
///
/// Implementations are owned by a single capture worker thread.
pub trait ByteSink: Send {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write all bytes
    fn write(&mut self, bytes: &[u8]) -> Result<(), ContractError>;

    fn flush(&mut self) -> Result<(), ContractError>;

    /// False once the consumer has gone away
    fn is_alive(&mut self) -> bool;

    /// Close input and wait for the consumer to finish
    fn close(&mut self) -> Result<(), ContractError>;
}
