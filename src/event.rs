/// Everything the engine loop reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Bytes typed by the operator, forwarded to the child untouched.
    Input(Vec<u8>),

    /// Bytes the child wrote to its terminal.
    Output(Vec<u8>),

    /// The operator's input reached end of file.
    InputClosed,

    /// The child's terminal was closed (child exited or read failed).
    OutputClosed,

    /// The operator's terminal changed size.
    Resize,

    /// A termination signal arrived.
    Terminate(&'static str),
}
