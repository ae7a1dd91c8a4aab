use crate::state::{ButtonLevel, DeviceState};

// Polled falling-edge detector with pull-up semantics: idle reads high,
// a press pulls the line low. One sample per scheduler tick, no ISR.
pub struct ShutterMonitor {
    debounce_ms: u64,
    last_trigger_ms: Option<u64>,
}

impl ShutterMonitor {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            last_trigger_ms: None,
        }
    }

    // Returns true exactly when a debounced falling edge is observed; the
    // caller fires one capture per trigger.
    pub fn poll(&mut self, level: ButtonLevel, now_ms: u64, state: &mut DeviceState) -> bool {
        let previous = state.last_button_level;
        state.last_button_level = level;

        if previous != ButtonLevel::High || level != ButtonLevel::Low {
            return false;
        }

        if let Some(last) = self.last_trigger_ms {
            if now_ms.saturating_sub(last) < self.debounce_ms {
                return false;
            }
        }

        self.last_trigger_ms = Some(now_ms);
        true
    }
}
