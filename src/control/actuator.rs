use std::fmt;

/// Actuators driven by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    FeedPump,
    Heater1,
    Heater2,
    DsOutlet,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [Self::FeedPump, Self::Heater1, Self::Heater2, Self::DsOutlet];

    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::FeedPump => "cstr/in",
            Self::Heater1 => "cstr/heater1",
            Self::Heater2 => "cstr/heater2",
            Self::DsOutlet => "ds/out",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    On,
    Off,
}

impl Command {
    #[must_use]
    pub fn payload(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload())
    }
}

/// Last command successfully published per actuator; `None` until the first
/// publish since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorState([Option<Command>; 4]);

impl ActuatorState {
    #[must_use]
    pub fn get(&self, actuator: Actuator) -> Option<Command> {
        self.0[actuator.index()]
    }

    pub fn set(&mut self, actuator: Actuator, command: Command) {
        self.0[actuator.index()] = Some(command);
    }

    /// Actuators with a known command, in [`Actuator::ALL`] order.
    pub fn known(&self) -> impl Iterator<Item = (Actuator, Command)> + '_ {
        Actuator::ALL.into_iter().filter_map(|a| self.get(a).map(|c| (a, c)))
    }
}
