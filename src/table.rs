// Control tables: symbolic register name -> (address, width)
//
// Descriptions use the same document layout as the per-model JSON files:
// { "Protocol_1": { "Control_Table": { "Goal_Position": [30, 2], ... },
//                   "Values": { "Min_Position": 0, "Max_Position": 1023, "Max_Angle": 300 } },
//   "Protocol_2": { ... } }

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DynioError, Result};
use crate::protocol::ProtocolVersion;

/// Size of a register in bytes. Only 1, 2 and 4 byte registers exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterWidth {
    One,
    Two,
    Four,
}

impl RegisterWidth {
    pub fn bytes(self) -> usize {
        match self {
            RegisterWidth::One => 1,
            RegisterWidth::Two => 2,
            RegisterWidth::Four => 4,
        }
    }

    /// Largest unsigned value the register can hold.
    pub fn max_value(self) -> u32 {
        match self {
            RegisterWidth::One => u8::MAX as u32,
            RegisterWidth::Two => u16::MAX as u32,
            RegisterWidth::Four => u32::MAX,
        }
    }

    /// Truncate a value to the register width.
    pub fn mask(self, value: u32) -> u32 {
        value & self.max_value()
    }

    /// Little-endian encoding of `value`, truncated to the register width.
    pub fn encode(self, value: u32) -> Vec<u8> {
        value.to_le_bytes()[..self.bytes()].to_vec()
    }

    /// Decode a little-endian value. `data` must hold at least `bytes()` bytes.
    pub fn decode(self, data: &[u8]) -> Option<u32> {
        let raw = data.get(..self.bytes())?;
        let mut buf = [0u8; 4];
        buf[..raw.len()].copy_from_slice(raw);
        Some(u32::from_le_bytes(buf))
    }
}

impl TryFrom<u8> for RegisterWidth {
    type Error = u8;

    fn try_from(bytes: u8) -> std::result::Result<Self, u8> {
        match bytes {
            1 => Ok(RegisterWidth::One),
            2 => Ok(RegisterWidth::Two),
            4 => Ok(RegisterWidth::Four),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub address: u16,
    pub width: RegisterWidth,
}

/// Position range and the angle it spans, for angle <-> position mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelLimits {
    pub min_position: u32,
    pub max_position: u32,
    pub max_angle: f64,
}

impl ModelLimits {
    pub fn new(min_position: u32, max_position: u32, max_angle: f64) -> Result<Self> {
        if max_position < min_position {
            return Err(DynioError::InvalidTableDescription(format!(
                "max position {max_position} is below min position {min_position}"
            )));
        }
        Ok(Self {
            min_position,
            max_position,
            max_angle,
        })
    }

    /// Number of position steps across the full range. The `+ 1` is part of
    /// the device convention and applies in both directions.
    fn span(&self) -> f64 {
        (self.max_position as f64 + 1.0) - self.min_position as f64
    }

    fn check_angle_range(&self) -> Result<()> {
        if self.max_angle == 0.0 {
            return Err(DynioError::Configuration(
                "max angle is 0, angle conversion is undefined".to_string(),
            ));
        }
        Ok(())
    }

    /// Map an angle in degrees onto the position range.
    pub fn angle_to_position(&self, angle: f64) -> Result<i64> {
        self.check_angle_range()?;
        let position = (angle / self.max_angle) * self.span() + self.min_position as f64;
        Ok(position.round() as i64)
    }

    /// Map a position back to degrees.
    pub fn position_to_angle(&self, position: i64) -> Result<f64> {
        self.check_angle_range()?;
        Ok(((position as f64 - self.min_position as f64) / self.span()) * self.max_angle)
    }
}

/// All registers of one model in one protocol dialect.
#[derive(Debug, Clone)]
pub struct RegisterTable {
    protocol: ProtocolVersion,
    registers: BTreeMap<String, Register>,
}

impl RegisterTable {
    /// Build a table, rejecting any row whose width is not 1, 2 or 4.
    pub fn from_description(desc: &DialectDescription, protocol: ProtocolVersion) -> Result<Self> {
        let mut registers = BTreeMap::new();
        for (name, &(address, width)) in &desc.control_table {
            let width = RegisterWidth::try_from(width).map_err(|w| {
                DynioError::InvalidTableDescription(format!(
                    "register {name} declares width {w}, expected 1, 2 or 4"
                ))
            })?;
            registers.insert(
                name.clone(),
                Register {
                    name: name.clone(),
                    address,
                    width,
                },
            );
        }
        Ok(Self {
            protocol,
            registers,
        })
    }

    pub fn resolve(&self, name: &str) -> Result<&Register> {
        self.registers
            .get(name)
            .ok_or_else(|| DynioError::UnknownRegister {
                name: name.to_string(),
            })
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Parsed per-model document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDescription {
    #[serde(rename = "Protocol_1", default, skip_serializing_if = "Option::is_none")]
    pub protocol_1: Option<DialectDescription>,
    #[serde(rename = "Protocol_2", default, skip_serializing_if = "Option::is_none")]
    pub protocol_2: Option<DialectDescription>,
}

impl ModelDescription {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DynioError::InvalidTableDescription(e.to_string()))
    }

    pub fn dialect(&self, protocol: ProtocolVersion) -> Result<&DialectDescription> {
        let dialect = match protocol {
            ProtocolVersion::V1 => self.protocol_1.as_ref(),
            ProtocolVersion::V2 => self.protocol_2.as_ref(),
        };
        dialect.ok_or_else(|| {
            DynioError::InvalidTableDescription(format!("no control table for {protocol}"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialectDescription {
    #[serde(rename = "Control_Table")]
    pub control_table: BTreeMap<String, (u16, u8)>,
    #[serde(rename = "Values", default, skip_serializing_if = "Option::is_none")]
    pub values: Option<LimitValues>,
}

impl DialectDescription {
    pub fn limits(&self) -> Result<Option<ModelLimits>> {
        self.values
            .as_ref()
            .map(|v| ModelLimits::new(v.min_position, v.max_position, v.max_angle))
            .transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitValues {
    #[serde(rename = "Min_Position")]
    pub min_position: u32,
    #[serde(rename = "Max_Position")]
    pub max_position: u32,
    #[serde(rename = "Max_Angle")]
    pub max_angle: f64,
}

/// Motor models with a bundled control table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Ax12,
    Mx12,
    Mx28,
    Mx64,
    Mx106,
    ThreeMxl,
}

impl Model {
    pub const ALL: [Model; 6] = [
        Model::Ax12,
        Model::Mx12,
        Model::Mx28,
        Model::Mx64,
        Model::Mx106,
        Model::ThreeMxl,
    ];

    fn document(self) -> &'static str {
        match self {
            Model::Ax12 => include_str!("../tables/AX12.json"),
            Model::Mx12 => include_str!("../tables/MX12.json"),
            Model::Mx28 => include_str!("../tables/MX28.json"),
            Model::Mx64 => include_str!("../tables/MX64.json"),
            Model::Mx106 => include_str!("../tables/MX106.json"),
            Model::ThreeMxl => include_str!("../tables/3mxl.json"),
        }
    }

    pub fn description(self) -> Result<ModelDescription> {
        ModelDescription::from_json_str(self.document())
    }

    pub fn name(self) -> &'static str {
        match self {
            Model::Ax12 => "AX-12",
            Model::Mx12 => "MX-12",
            Model::Mx28 => "MX-28",
            Model::Mx64 => "MX-64",
            Model::Mx106 => "MX-106",
            Model::ThreeMxl => "3mxl",
        }
    }
}
