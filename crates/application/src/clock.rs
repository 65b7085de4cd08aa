use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use domain::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// 单调递增时钟，用于消息的 `created_at`。
///
/// 时间截断到微秒（与数据库精度一致），并且每次返回的值都严格大于上一次，
/// 系统时钟回拨时同样成立。消息顺序只由这个时间戳决定。
pub struct MonotonicClock<C = SystemClock> {
    inner: C,
    last: Mutex<Option<Timestamp>>,
}

impl<C: Clock> MonotonicClock<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

impl Default for MonotonicClock<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> Clock for MonotonicClock<C> {
    fn now(&self) -> Timestamp {
        let raw = self.inner.now();
        let mut candidate = DateTime::from_timestamp_micros(raw.timestamp_micros()).unwrap_or(raw);

        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            if candidate <= previous {
                candidate = previous + Duration::microseconds(1);
            }
        }
        *last = Some(candidate);
        candidate
    }
}
