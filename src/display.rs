//! Latest vitals as shown to the user

use crate::session::SessionEvent;
use std::fmt;
use vitals_shared::link::PLACEHOLDER;
use vitals_shared::TelemetryReading;

/// Consumer-side view of the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VitalsDisplay {
    vitals: TelemetryReading,
    status: String,
}

fn shown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(PLACEHOLDER)
}

impl VitalsDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heart_rate(&self) -> &str {
        shown(&self.vitals.heart_rate)
    }

    pub fn spo2(&self) -> &str {
        shown(&self.vitals.spo2)
    }

    pub fn temperature(&self) -> &str {
        shown(&self.vitals.temperature)
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Put every vital back to the placeholder
    pub fn reset(&mut self) {
        self.vitals = TelemetryReading::default();
    }

    /// Apply one session event. Returns true when the vitals changed.
    pub fn apply(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::StatusChanged(text) => {
                self.status = text.clone();
                false
            }
            SessionEvent::Connected => false,
            SessionEvent::TelemetryUpdate(reading) => {
                self.vitals.merge(reading);
                true
            }
            SessionEvent::Disconnected { .. } | SessionEvent::Failed(_) => {
                self.reset();
                true
            }
        }
    }
}

impl fmt::Display for VitalsDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HR {} bpm | SpO2 {} % | Temp {} °C",
            self.heart_rate(),
            self.spo2(),
            self.temperature()
        )
    }
}
