//! Sample storage dewar.
//!
//! The dewar holds [`Dewar::NUM_SECTORS`] sectors of three pucks each and is
//! rotated by a motor behind a virtual rotation axis. Puck presence sensors
//! live under `{Wago:1}Puck<sector><puck>-Sts`.

use mx_core::config::DewarConfig;
use mx_core::{
    pv_name, ComponentInfo, Device, DeviceCategory, Motor, MxError, MxResult, PvClient, Signal,
    SignalRO,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Puck letters within a sector.
pub const PUCK_LETTERS: [char; 3] = ['A', 'B', 'C'];

/// One puck slot with its presence sensor.
#[derive(Clone, Debug)]
pub struct Puck {
    /// Presence/status sensor (`-Sts`)
    pub status: SignalRO<u8>,
}

impl Puck {
    /// Bind a puck at `prefix`.
    pub fn new(client: Arc<dyn PvClient>, prefix: &str) -> Self {
        Self {
            status: SignalRO::new(client, "status", pv_name(prefix, "-Sts")),
        }
    }

    /// Address-map entries.
    pub fn components(&self) -> Vec<ComponentInfo> {
        vec![self.status.component()]
    }
}

/// A dewar sector holding pucks `A`, `B` and `C`.
#[derive(Clone, Debug)]
pub struct Sector {
    /// Puck A
    pub a: Puck,
    /// Puck B
    pub b: Puck,
    /// Puck C
    pub c: Puck,
}

impl Sector {
    /// Bind a sector at `prefix`; pucks sit at `prefix` + letter.
    pub fn new(client: Arc<dyn PvClient>, prefix: &str) -> Self {
        Self {
            a: Puck::new(client.clone(), &pv_name(prefix, "A")),
            b: Puck::new(client.clone(), &pv_name(prefix, "B")),
            c: Puck::new(client, &pv_name(prefix, "C")),
        }
    }

    /// Puck by letter (case-insensitive).
    pub fn puck(&self, letter: char) -> Option<&Puck> {
        match letter.to_ascii_uppercase() {
            'A' => Some(&self.a),
            'B' => Some(&self.b),
            'C' => Some(&self.c),
            _ => None,
        }
    }

    /// Pucks with their letters, in order.
    pub fn pucks(&self) -> [(char, &Puck); 3] {
        [('A', &self.a), ('B', &self.b), ('C', &self.c)]
    }

    /// Address-map entries, nested under the puck letter.
    pub fn components(&self) -> Vec<ComponentInfo> {
        self.pucks()
            .into_iter()
            .flat_map(|(letter, puck)| {
                let parent = letter.to_string();
                puck.components()
                    .into_iter()
                    .map(move |c| c.nested(&parent))
            })
            .collect()
    }
}

/// Puck address such as `7A`: sector `1..=8`, then puck letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PuckPosition {
    sector: u8,
    puck: char,
}

impl PuckPosition {
    /// Validated position.
    pub fn new(sector: u8, puck: char) -> MxResult<Self> {
        let puck = puck.to_ascii_uppercase();
        if !(1..=Dewar::NUM_SECTORS as u8).contains(&sector) || !PUCK_LETTERS.contains(&puck) {
            return Err(MxError::InvalidPuckPosition(format!("{sector}{puck}")));
        }
        Ok(Self { sector, puck })
    }

    /// Sector number, 1-based.
    pub fn sector(&self) -> u8 {
        self.sector
    }

    /// Puck letter, upper case.
    pub fn puck(&self) -> char {
        self.puck
    }
}

impl FromStr for PuckPosition {
    type Err = MxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MxError::InvalidPuckPosition(s.to_string());
        let mut chars = s.chars();
        let (Some(digit), Some(letter), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(invalid());
        };
        let sector = digit.to_digit(10).ok_or_else(invalid)?;
        Self::new(sector as u8, letter).map_err(|_| invalid())
    }
}

impl fmt::Display for PuckPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sector, self.puck)
    }
}

/// How [`Dewar::rotate`] interprets its angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    /// Rotate to the given angle
    #[default]
    Absolute,
    /// Rotate by the given angle from the current rotation
    Relative,
}

/// Sample storage dewar.
#[derive(Clone, Debug)]
pub struct Dewar {
    name: String,
    /// Virtual rotation axis (`{Dew:1-Ax:R}Virtual`)
    pub rotation: Signal<f64>,
    /// Motor behind the rotation axis (`{Dew:1-Ax:R}Mtr`)
    pub rotation_motor: Motor,
    sectors: Vec<Sector>,
    rotation_timeout: Option<Duration>,
}

impl Dewar {
    /// Sectors in the dewar.
    pub const NUM_SECTORS: usize = 8;

    /// Bind a dewar at `prefix`. Rotation waits are unbounded.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: &str) -> Self {
        let sectors = (1..=Self::NUM_SECTORS)
            .map(|i| Sector::new(client.clone(), &pv_name(prefix, &format!("{{Wago:1}}Puck{i}"))))
            .collect();
        Self {
            name: name.into(),
            rotation: Signal::new(client.clone(), "rotation", pv_name(prefix, "{Dew:1-Ax:R}Virtual"))
                .with_units("deg"),
            rotation_motor: Motor::new(client, "rotation_motor", pv_name(prefix, "{Dew:1-Ax:R}Mtr")),
            sectors,
            rotation_timeout: None,
        }
    }

    /// Bind a dewar from its configuration section.
    pub fn from_config(client: Arc<dyn PvClient>, config: &DewarConfig) -> Self {
        Self::new(client, "dewar", &config.prefix).with_rotation_timeout(config.rotation_timeout())
    }

    /// Bound each phase of a rotation wait.
    pub fn with_rotation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rotation_timeout = timeout;
        self
    }

    /// Sector by 1-based number.
    pub fn sector(&self, number: usize) -> Option<&Sector> {
        number.checked_sub(1).and_then(|i| self.sectors.get(i))
    }

    /// All sectors, in order.
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Puck at a position.
    pub fn puck(&self, position: PuckPosition) -> MxResult<&Puck> {
        self.sector(usize::from(position.sector()))
            .and_then(|sector| sector.puck(position.puck()))
            .ok_or_else(|| MxError::InvalidPuckPosition(position.to_string()))
    }

    /// Read the status sensor of the puck at `position` (e.g. `"7A"`).
    pub async fn get_puck_status(&self, position: &str) -> MxResult<u8> {
        let position: PuckPosition = position.parse()?;
        let status = self.puck(position)?.status.get().await?;
        tracing::debug!(dewar = %self.name, %position, status, "Puck status");
        Ok(status)
    }

    /// Rotate and wait for the motor to finish.
    ///
    /// Fails with [`MxError::MotorAlreadyMoving`] without writing anything if
    /// the rotation motor is busy. Otherwise writes the target to
    /// `rotation`, then waits for done-move to fall (motion started) and rise
    /// again (motion finished). Returns the motor readback.
    pub async fn rotate(&self, angle: f64, mode: RotationMode) -> MxResult<f64> {
        if !angle.is_finite() {
            return Err(MxError::InvalidValue(format!("rotation angle {angle} is not finite")));
        }

        let mut done = self.rotation_motor.motor_done_move.subscribe().await?;
        if !*done.current() {
            return Err(MxError::MotorAlreadyMoving(self.rotation_motor.name().to_string()));
        }

        let target = match mode {
            RotationMode::Absolute => angle,
            RotationMode::Relative => self.rotation.get().await? + angle,
        };
        tracing::info!(dewar = %self.name, target, ?mode, "Rotating dewar");
        self.rotation.set(target).await?;

        done.wait_for(|old, new| *old && !*new, self.rotation_timeout)
            .await?;
        done.wait_for(|old, new| !*old && *new, self.rotation_timeout)
            .await?;

        let position = self.rotation_motor.user_readback.get().await?;
        tracing::info!(dewar = %self.name, position, "Dewar rotation complete");
        Ok(position)
    }
}

impl Device for Dewar {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::SampleStorage
    }

    fn components(&self) -> Vec<ComponentInfo> {
        let mut components = vec![self.rotation.component()];
        components.extend(
            self.rotation_motor
                .components()
                .into_iter()
                .map(|c| c.nested("rotation_motor")),
        );
        for (i, sector) in self.sectors.iter().enumerate() {
            let parent = format!("sectors.sector_{}", i + 1);
            components.extend(sector.components().into_iter().map(|c| c.nested(&parent)));
        }
        components
    }
}
