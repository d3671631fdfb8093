//! Change-notification protocol (§4.10): the cache-coherence primitive this
//! read-only volume uses to tell the host "re-read me". State is shared
//! between the SCSI-facing calls and an alarm callback without a full
//! mutex — everything here is a single atomic word, per §5.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// SCSI sense key / ASC / ASCQ triple returned alongside a CHECK CONDITION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseCode {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseCode {
    pub const UNIT_ATTENTION_MEDIA_CHANGED: SenseCode = SenseCode { key: 0x06, asc: 0x28, ascq: 0x00 };
    pub const DATA_PROTECT: SenseCode = SenseCode { key: 0x07, asc: 0x27, ascq: 0x00 };
}

/// `NEED_DISALLOW_REMOVAL_FAIL` is set at construction (the first
/// prevent-medium-removal must fail, a Windows workaround); `NEED_UA_28H`
/// is set whenever new content should trigger a host re-read.
pub struct NotificationState {
    need_disallow_removal_fail: AtomicBool,
    need_ua: AtomicBool,
    last_ua_ms: AtomicU64,
    ua_min_delay_ms: u64,
    alarm_deadline_ms: AtomicU32,
    started: Instant,
}

const NO_ALARM: u32 = u32::MAX;

impl NotificationState {
    pub fn new(ua_min_delay_ms: u64) -> Self {
        Self {
            need_disallow_removal_fail: AtomicBool::new(true),
            need_ua: AtomicBool::new(false),
            last_ua_ms: AtomicU64::new(0),
            ua_min_delay_ms,
            alarm_deadline_ms: AtomicU32::new(NO_ALARM),
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// §4.10 `prevent/allow-medium-removal`. Only the first call while the
    /// Windows-workaround flag is set fails; every later call succeeds.
    pub fn prevent_allow_medium_removal(&self) -> bool {
        !self.need_disallow_removal_fail.swap(false, Ordering::AcqRel)
    }

    /// §4.10 `test-unit-ready`. Returns `Ok(())` when the host may proceed,
    /// `Err(sense)` when a Unit Attention must be reported first.
    pub fn test_unit_ready(&self) -> Result<(), SenseCode> {
        if !self.need_ua.load(Ordering::Acquire) {
            return Ok(());
        }

        let now = self.now_ms();
        let last = self.last_ua_ms.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.ua_min_delay_ms {
            return Ok(());
        }

        self.need_ua.store(false, Ordering::Release);
        self.last_ua_ms.store(now, Ordering::Release);
        Err(SenseCode::UNIT_ATTENTION_MEDIA_CHANGED)
    }

    /// §4.10 `content-changed`. Marks a Unit Attention pending; `hard`
    /// additionally asks the transport adapter to bounce the USB
    /// connection (an external contract this crate only flags, never
    /// performs itself).
    pub fn content_changed(&self, hard: bool) -> bool {
        self.need_ua.store(true, Ordering::Release);
        hard
    }

    /// Arms a one-shot alarm `delay_sec` from now; [`Self::poll_alarm`]
    /// fires the notification unconditionally once it elapses. Used by
    /// the stdout on-write hook (§4.9) when the immediate-notify
    /// conditions aren't met yet.
    pub fn arm_alarm(&self, delay_sec: u64) {
        let deadline = self.now_ms().saturating_add(delay_sec * 1000);
        self.alarm_deadline_ms.store(deadline.min(u64::from(NO_ALARM)) as u32, Ordering::Release);
    }

    /// Disarms any pending alarm without firing it (used once an
    /// immediate notification has already fired).
    pub fn disarm_alarm(&self) {
        self.alarm_deadline_ms.store(NO_ALARM, Ordering::Release);
    }

    /// Drives the alarm. There is no scheduler (§5) — the integrator calls
    /// this periodically from its own event loop; it is a no-op between
    /// the armed time and the deadline, and unconditionally fires the
    /// notification once the deadline has passed.
    pub fn poll_alarm(&self) {
        let deadline = self.alarm_deadline_ms.load(Ordering::Acquire);
        if deadline == NO_ALARM {
            return;
        }
        if self.now_ms() >= u64::from(deadline) {
            self.alarm_deadline_ms.store(NO_ALARM, Ordering::Release);
            self.content_changed(false);
        }
    }
}
