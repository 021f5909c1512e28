/// Status LED: lit while a cycle is active, blinking while reconnecting
use log::debug;
use std::fs;
use std::path::PathBuf;

pub trait StatusIndicator: Send {
    fn set_active(&mut self, active: bool);

    fn is_active(&self) -> bool;

    fn toggle(&mut self) {
        let next = !self.is_active();
        self.set_active(next);
    }
}

/// LED exposed by the kernel under /sys/class/leds/<name>
pub struct SysfsLed {
    brightness: PathBuf,
    active: bool,
}

impl SysfsLed {
    pub fn new(name: &str) -> Self {
        Self::at(PathBuf::from("/sys/class/leds").join(name).join("brightness"))
    }

    pub fn at(brightness: PathBuf) -> Self {
        let mut led = Self {
            brightness,
            active: false,
        };
        led.set_active(false);
        led
    }
}

impl StatusIndicator for SysfsLed {
    fn set_active(&mut self, active: bool) {
        self.active = active;
        let value = if active { "1" } else { "0" };
        // Purely observational, a missing LED is not an error
        if let Err(e) = fs::write(&self.brightness, value) {
            debug!("LED write to {} failed: {}", self.brightness.display(), e);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Used when no LED is configured
#[derive(Default)]
pub struct NoIndicator {
    active: bool,
}

impl StatusIndicator for NoIndicator {
    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sysfs_led_writes_brightness() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brightness");

        let mut led = SysfsLed::at(path.clone());
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");

        led.set_active(true);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");

        led.toggle();
        assert!(!led.is_active());
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn missing_led_is_tolerated() {
        let mut led = SysfsLed::new("definitely-not-a-led");
        led.toggle();
        assert!(led.is_active());
    }
}
