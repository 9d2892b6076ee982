// Client command packet codec
//
// Packet format: [SOP1, SOP2, DID, CID, SEQ, DLEN, Data..., CHK]
// DLEN counts the data bytes plus the trailing checksum.

/// Start of packet, first byte
pub const SOP1: u8 = 0xFF;

/// Base value of the second start byte, before option flags are OR'd in
pub const SOP2_BASE: u8 = 0xFC;

/// Ask the device to answer with a response packet
pub const FLAG_ANSWER: u8 = 0x01;

/// Reset the device's inactivity timeout
pub const FLAG_RESET_TIMEOUT: u8 = 0x02;

/// Second start byte as sent by this client
pub const SOP2: u8 = SOP2_BASE | FLAG_ANSWER | FLAG_RESET_TIMEOUT;

/// SOP1 + SOP2 + DID + CID + SEQ + DLEN
pub const HEADER_LEN: usize = 6;

/// DLEN is a single byte and includes the checksum
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 1;

/// Errors raised while building or decoding a packet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid payload: command data must contain at least one byte")]
    EmptyPayload,

    #[error("Invalid payload: {len} bytes exceeds the {max} byte limit")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Malformed packet: {reason}")]
    Malformed { reason: String },

    #[error("Checksum mismatch: expected 0x{expected:02X}, found 0x{found:02X}")]
    ChecksumMismatch { expected: u8, found: u8 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Check that a payload can be framed
pub fn validate_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(())
}

/// Modulo-256 sum of DID, CID, SEQ, DLEN and data, bit-inverted
pub fn checksum(device_id: u8, command_id: u8, sequence: u8, data_length: u8, payload: &[u8]) -> u8 {
    let sum: u32 = payload.iter().map(|&b| b as u32).sum::<u32>()
        + device_id as u32
        + command_id as u32
        + sequence as u32
        + data_length as u32;
    ((sum & 0xFF) as u8) ^ 0xFF
}

/// One client command packet, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    device_id: u8,
    command_id: u8,
    sequence: u8,
    payload: Vec<u8>,
    checksum: u8,
}

impl CommandFrame {
    /// Build a packet, computing DLEN and the checksum
    pub fn build(device_id: u8, command_id: u8, sequence: u8, payload: &[u8]) -> Result<Self> {
        validate_payload(payload)?;
        let data_length = (payload.len() + 1) as u8;

        Ok(Self {
            device_id,
            command_id,
            sequence,
            payload: payload.to_vec(),
            checksum: checksum(device_id, command_id, sequence, data_length, payload),
        })
    }

    /// Decode a complete packet and verify its checksum
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + 2 {
            return Err(ProtocolError::Malformed {
                reason: format!("{} bytes is shorter than the smallest packet", bytes.len()),
            });
        }
        if bytes[0] != SOP1 || bytes[1] != SOP2 {
            return Err(ProtocolError::Malformed {
                reason: format!("Invalid header: {:02X?}", &bytes[..2]),
            });
        }

        let data_length = bytes[5];
        let expected_len = HEADER_LEN + data_length as usize;
        if bytes.len() != expected_len {
            return Err(ProtocolError::Malformed {
                reason: format!("DLEN {} implies {} bytes, got {}", data_length, expected_len, bytes.len()),
            });
        }

        let payload = &bytes[HEADER_LEN..expected_len - 1];
        validate_payload(payload)?;

        let frame = Self::build(bytes[2], bytes[3], bytes[4], payload)?;
        let found = bytes[expected_len - 1];
        if frame.checksum != found {
            return Err(ProtocolError::ChecksumMismatch {
                expected: frame.checksum,
                found,
            });
        }
        Ok(frame)
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn data_length(&self) -> u8 {
        (self.payload.len() + 1) as u8
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// The exact bytes to put on the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(HEADER_LEN + self.payload.len() + 1);
        packet.extend_from_slice(&[
            SOP1,
            SOP2,
            self.device_id,
            self.command_id,
            self.sequence,
            self.data_length(),
        ]);
        packet.extend_from_slice(&self.payload);
        packet.push(self.checksum);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sop2_flags() {
        assert_eq!(SOP2, 0xFF);
    }

    #[test]
    fn test_set_color_packet() {
        // DID=0x02, CID=0x20, SEQ=0, data=[0, 250, 0, 0]
        // 250 + 2 + 32 + 0 + 5 = 289, 289 & 0xFF = 0x21, 0x21 ^ 0xFF = 0xDE
        let frame = CommandFrame::build(0x02, 0x20, 0, &[0, 250, 0, 0]).unwrap();
        assert_eq!(frame.data_length(), 5);
        assert_eq!(frame.checksum(), 0xDE);
        assert_eq!(
            frame.to_bytes(),
            vec![0xFF, 0xFF, 0x02, 0x20, 0x00, 0x05, 0x00, 0xFA, 0x00, 0x00, 0xDE]
        );
    }

    #[test]
    fn test_checksum_wraps_modulo_256() {
        // 255 * 4 + 2 + 0x30 + 200 + 5 = 1275, 1275 & 0xFF = 0xFB
        let frame = CommandFrame::build(0x02, 0x30, 200, &[255, 255, 255, 255]).unwrap();
        assert_eq!(frame.checksum(), 0xFB ^ 0xFF);
    }

    #[test]
    fn test_single_byte_payload() {
        // Back LED: 2 + 0x21 + 7 + 2 + 0xFF = 299 -> 0x2B -> 0xD4
        let frame = CommandFrame::build(0x02, 0x21, 7, &[0xFF]).unwrap();
        assert_eq!(frame.data_length(), 2);
        assert_eq!(frame.to_bytes().len(), 8);
        assert_eq!(frame.checksum(), 0xD4);
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(
            CommandFrame::build(0x02, 0x30, 0, &[]),
            Err(ProtocolError::EmptyPayload)
        );
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            CommandFrame::build(0x02, 0x30, 0, &payload),
            Err(ProtocolError::PayloadTooLong { len: 255, max: 254 })
        ));
        assert!(CommandFrame::build(0x02, 0x30, 0, &payload[..MAX_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_build_is_repeatable() {
        let a = CommandFrame::build(0x02, 0x30, 42, &[100, 0, 90, 1]).unwrap();
        let b = CommandFrame::build(0x02, 0x30, 42, &[100, 0, 90, 1]).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_parse_accepts_built_packet() {
        let bytes = CommandFrame::build(0x02, 0x01, 9, &[0x01, 0x0E]).unwrap().to_bytes();
        let frame = CommandFrame::parse(&bytes).unwrap();
        assert_eq!(frame.command_id(), 0x01);
        assert_eq!(frame.sequence(), 9);
        assert_eq!(frame.payload(), &[0x01, 0x0E]);
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let mut bytes = CommandFrame::build(0x02, 0x20, 0, &[0, 250, 0, 0]).unwrap().to_bytes();
        bytes[7] = 0xFB;
        assert_eq!(
            CommandFrame::parse(&bytes),
            Err(ProtocolError::ChecksumMismatch { expected: 0xDD, found: 0xDE })
        );

        assert!(matches!(
            CommandFrame::parse(&[0xFF, 0xFE, 0x02, 0x20, 0x00, 0x02, 0x00, 0xDB]),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            CommandFrame::parse(&[0xFF, 0xFF, 0x02, 0x20, 0x00, 0x05, 0x00]),
            Err(ProtocolError::Malformed { .. })
        ));
    }
}
