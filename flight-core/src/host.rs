//! Host configuration protocol
//!
//! Requests are six bytes: instruction, address, then a little-endian
//! 32-bit data word. Replies carry four little-endian bytes.

/// Request size in bytes
pub const REQUEST_LEN: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// Request shorter than [`REQUEST_LEN`]
    Length,
    /// Unknown instruction code
    Instruction(u8),
}

#[cfg(feature = "std")]
impl core::fmt::Display for HostError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HostError::Length => write!(f, "short host request"),
            HostError::Instruction(code) => write!(f, "unknown host instruction {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HostError {}

/// Decoded host request
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostCommand {
    /// 0: reply with the register's 4 bytes
    ReadRegister { address: u8 },
    /// 1: store raw bits unless the register is read-only
    WriteRegister { address: u8, bits: u32 },
    /// 2: start a one-byte sensor register read
    SensorRead { register: u8 },
    /// 3: write one sensor register
    SensorWrite { register: u8, value: u8 },
    /// 4: reply with one storage word
    StorageRead { index: u8 },
    /// 5: program one storage word
    StorageWrite { index: u8, value: u32 },
    /// 6: erase the configuration page
    StorageErase,
}

impl HostCommand {
    pub fn parse(bytes: &[u8]) -> Result<Self, HostError> {
        if bytes.len() < REQUEST_LEN {
            return Err(HostError::Length);
        }
        let address = bytes[1];
        let data = [bytes[2], bytes[3], bytes[4], bytes[5]];
        let word = u32::from_le_bytes(data);
        let command = match bytes[0] {
            0 => HostCommand::ReadRegister { address },
            1 => HostCommand::WriteRegister { address, bits: word },
            2 => HostCommand::SensorRead { register: address },
            3 => HostCommand::SensorWrite {
                register: address,
                value: data[3],
            },
            4 => HostCommand::StorageRead { index: address },
            5 => HostCommand::StorageWrite {
                index: address,
                value: word,
            },
            6 => HostCommand::StorageErase,
            code => return Err(HostError::Instruction(code)),
        };
        Ok(command)
    }

    /// Wire form of the request
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let (code, address, data) = match *self {
            HostCommand::ReadRegister { address } => (0, address, [0; 4]),
            HostCommand::WriteRegister { address, bits } => (1, address, bits.to_le_bytes()),
            HostCommand::SensorRead { register } => (2, register, [0; 4]),
            HostCommand::SensorWrite { register, value } => (3, register, [0, 0, 0, value]),
            HostCommand::StorageRead { index } => (4, index, [0; 4]),
            HostCommand::StorageWrite { index, value } => (5, index, value.to_le_bytes()),
            HostCommand::StorageErase => (6, 0, [0; 4]),
        };
        [code, address, data[0], data[1], data[2], data[3]]
    }
}

/// Four-byte reply
pub fn reply(word: u32) -> [u8; 4] {
    word.to_le_bytes()
}
