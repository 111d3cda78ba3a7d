use std::time::Duration;
use tokio::time::Instant;

/// 发送间隔计时器，记录上一次发送时刻
#[derive(Debug, Clone)]
pub struct SendTimer {
    last_send: Instant,
    interval: Duration,
}

impl SendTimer {
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self { last_send: start, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_send(&self) -> Instant {
        self.last_send
    }

    /// `now - last_send >= interval` 时返回 true，不修改状态
    pub fn tick(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last_send = now;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_send)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval.saturating_sub(self.elapsed(now))
    }

    pub fn next_deadline(&self) -> Instant {
        self.last_send + self.interval
    }
}
