/// Buffer-growth policy for a [`crate::Pipe`].
///
/// Late-join readers always start at offset 0, so a pipe never discards
/// bytes once written regardless of this setting; a cap only throttles how
/// far the writer may run ahead of the slowest currently-attached reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeConfig {
    pub(crate) soft_cap_bytes: Option<usize>,
}

impl PipeConfig {
    /// No backpressure: `write` never suspends on reader lag.
    pub fn unbounded() -> Self {
        Self { soft_cap_bytes: None }
    }

    /// `write` suspends once the gap between the writer and the slowest
    /// attached reader would exceed `bytes`.
    pub fn capped(bytes: usize) -> Self {
        Self {
            soft_cap_bytes: Some(bytes),
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}
