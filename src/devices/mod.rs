//! Market-driven device models.

/// Dispatchable fuel generator.
pub mod generator;
/// Once-a-day shiftable load.
pub mod shiftable;
/// Threshold-trading battery storage.
pub mod storage;
pub mod types;

// Re-export the main types for convenience
pub use generator::{Generator, GeneratorState};
pub use shiftable::{ShiftableLoad, ShiftableState};
pub use storage::{Storage, StorageState};
pub use types::{Command, Device, DeviceClass, DeviceContext, DeviceOutput, MarketSignal};

/// The closed set of devices with their own bidding state machine.
#[derive(Debug, Clone)]
pub enum DeviceKind {
    Storage(Storage),
    Generator(Generator),
    Shiftable(ShiftableLoad),
}

impl DeviceKind {
    pub fn class(&self) -> DeviceClass {
        match self {
            DeviceKind::Storage(_) => DeviceClass::StorageDevice,
            DeviceKind::Generator(_) => DeviceClass::FreelyControlGen,
            DeviceKind::Shiftable(_) => DeviceClass::ShiftableLoad,
        }
    }
}

impl Device for DeviceKind {
    fn step(&mut self, context: &DeviceContext) -> DeviceOutput {
        match self {
            DeviceKind::Storage(d) => d.step(context),
            DeviceKind::Generator(d) => d.step(context),
            DeviceKind::Shiftable(d) => d.step(context),
        }
    }

    fn device_type(&self) -> &'static str {
        match self {
            DeviceKind::Storage(d) => d.device_type(),
            DeviceKind::Generator(d) => d.device_type(),
            DeviceKind::Shiftable(d) => d.device_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_dispatches_to_inner_device() {
        let mut kind = DeviceKind::Generator(Generator::new(4.0, 1.0, 1.0, 0.0, 0.0, 3600));
        assert_eq!(kind.device_type(), "Generator");
        assert_eq!(kind.class(), DeviceClass::FreelyControlGen);
        let out = kind.step(&DeviceContext::with_command(0, Command::On));
        assert_eq!(out.power_kw, -4.0);
    }
}
