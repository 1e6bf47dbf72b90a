//! Telemetry line parsing
//!
//! A line is a comma-separated list of `KEY:VALUE` fields, for example
//! `HR:72,SPO2:98,TEMP:36.6`. Values are kept verbatim; the sensor board
//! decides units and precision.

/// Field key for heart rate
pub const KEY_HEART_RATE: &str = "HR";
/// Field key for blood oxygen saturation
pub const KEY_SPO2: &str = "SPO2";
/// Field key for body temperature
pub const KEY_TEMPERATURE: &str = "TEMP";

/// A possibly partial set of vitals taken from one line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryReading {
    pub heart_rate: Option<String>,
    pub spo2: Option<String>,
    pub temperature: Option<String>,
}

impl TelemetryReading {
    /// True when no field was recognized
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none() && self.spo2.is_none() && self.temperature.is_none()
    }

    /// Overwrite fields that are present in `update`, keep the rest
    pub fn merge(&mut self, update: &TelemetryReading) {
        if let Some(ref hr) = update.heart_rate {
            self.heart_rate = Some(hr.clone());
        }
        if let Some(ref spo2) = update.spo2 {
            self.spo2 = Some(spo2.clone());
        }
        if let Some(ref temp) = update.temperature {
            self.temperature = Some(temp.clone());
        }
    }

    /// Render the present fields as a wire line, without terminator
    pub fn to_line(&self) -> String {
        let fields = [
            (KEY_HEART_RATE, &self.heart_rate),
            (KEY_SPO2, &self.spo2),
            (KEY_TEMPERATURE, &self.temperature),
        ];

        fields
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| format!("{}:{}", key, v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Normalize a field key: trimmed, upper-case, no spaces
fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase().replace(' ', "")
}

/// Parse one telemetry line
///
/// A field is only considered when it contains exactly one `:`. Fields with
/// no colon or several colons are skipped, as are unknown keys. When a key
/// repeats, the last occurrence wins.
pub fn parse(line: &str) -> TelemetryReading {
    let mut reading = TelemetryReading::default();

    for field in line.split(',') {
        let parts: Vec<&str> = field.split(':').collect();
        if parts.len() != 2 {
            continue;
        }

        let value = parts[1].trim().to_string();
        match normalize_key(parts[0]).as_str() {
            KEY_HEART_RATE => reading.heart_rate = Some(value),
            KEY_SPO2 => reading.spo2 = Some(value),
            KEY_TEMPERATURE => reading.temperature = Some(value),
            _ => {}
        }
    }

    reading
}
