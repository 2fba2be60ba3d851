//! Events delivered to a flow and the effects it asks its host to perform.

/// Per-flow timer identity. Tokens are never reused by the same flow, so a
/// firing whose token is no longer armed is simply stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(pub u64);

/// Connection close reason reported by the socket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseType {
    TxFin,
    TxRst,
    RxFin,
    RxRst,
    ConErr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    WaitToStart,
    Started,
    Aborted,
    Done,
    FailToConnect,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FlowState::Aborted | FlowState::Done | FlowState::FailToConnect
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, FlowState::WaitToStart | FlowState::Started)
    }
}

/// Input to `FlowInstance::handle_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    Start,
    Stop,
    TimerFired(TimerToken),
    /// The oldest outstanding send finished.
    Sent,
    /// `len` bytes arrived for the outstanding receive.
    Received { len: usize },
    ConnectFailed,
    Closed(CloseType),
}

/// Output of `FlowInstance::handle_event`, applied by the host in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ArmTimer { token: TimerToken, delay_ms: u64 },
    CancelTimer { token: TimerToken },
    /// `pkt_idx` is `None` for the attack default response.
    Send { pkt_idx: Option<usize>, bytes: Vec<u8> },
    Receive { expected_len: usize },
    /// Terminal outcome; the host forwards it as `FlowDone(index, successful)`.
    Finished { successful: bool },
}
