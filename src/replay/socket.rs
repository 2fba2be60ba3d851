//! 回环连接
//!
//! 客户端流 i 与服务端流 i 之间的一条虚拟连接。只记录字节数：
//! 接收方只关心长度，内容不参与回放状态机。

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }

    pub fn is_client(self) -> bool {
        matches!(self, Side::Client)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Server => f.write_str("server"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Endpoint {
    /// 已到达但尚未交付的字节数
    buffered: usize,
    /// 正在等待的接收长度
    pending_rx: Option<usize>,
    closed: bool,
}

impl Endpoint {
    /// 缓冲够数时完成挂起的接收，返回交付长度
    fn try_complete(&mut self) -> Option<usize> {
        let expected = self.pending_rx?;
        if self.buffered < expected {
            return None;
        }
        self.buffered -= expected;
        self.pending_rx = None;
        Some(expected)
    }
}

/// 一条连接；每次重连 epoch 加一，旧连接上的在途事件据此丢弃。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackConn {
    epoch: u64,
    client: Endpoint,
    server: Endpoint,
}

impl LoopbackConn {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 重新建立连接，清空两端状态，返回新的 epoch
    pub fn reopen(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.client = Endpoint::default();
        self.server = Endpoint::default();
        self.epoch
    }

    fn end_mut(&mut self, side: Side) -> &mut Endpoint {
        match side {
            Side::Client => &mut self.client,
            Side::Server => &mut self.server,
        }
    }

    fn end(&self, side: Side) -> &Endpoint {
        match side {
            Side::Client => &self.client,
            Side::Server => &self.server,
        }
    }

    /// `side` 一端挂起一次接收；缓冲已够时立即返回交付长度。
    pub fn arm_receive(&mut self, side: Side, expected_len: usize) -> Option<usize> {
        let ep = self.end_mut(side);
        ep.pending_rx = Some(expected_len);
        ep.try_complete()
    }

    /// `len` 字节到达 `side` 一端
    pub fn deliver(&mut self, side: Side, len: usize) -> Option<usize> {
        let ep = self.end_mut(side);
        if ep.closed {
            return None;
        }
        ep.buffered = ep.buffered.saturating_add(len);
        ep.try_complete()
    }

    /// 标记 `side` 一端已关闭；返回它此前是否仍打开
    pub fn close(&mut self, side: Side) -> bool {
        let ep = self.end_mut(side);
        !std::mem::replace(&mut ep.closed, true)
    }

    pub fn is_closed(&self, side: Side) -> bool {
        self.end(side).closed
    }

    pub fn buffered(&self, side: Side) -> usize {
        self.end(side).buffered
    }
}
