use crate::constants::{
    HEADER_SIZE, LIDAR_ANS_LENGTH_DEVHEALTH, LIDAR_ANS_LENGTH_DEVINFO, LIDAR_ANS_SYNC_BYTE,
    LIDAR_CMD_SYNC_BYTE, MEASUREMENT_NODE_SIZE,
};
use crate::numeric::{q6_to_q14, to_string, to_u16};
use crate::sdk::ResultCode;
use rplidar_data::{DeviceHealth, DeviceInfo, MeasurementNode};
use std::io;
use thiserror::Error;

/// Framing problems on the serial link.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Response header must be always seven bytes. Actually {0} bytes.")]
    InvalidHeaderLength(usize),
    #[error("Header sign must start with 0xA5 0x5A. Observed = {0}.")]
    InvalidMagicNumber(String),
    #[error("Expected response length of {0} bytes but found {1} bytes.")]
    InvalidResponseLength(usize, usize),
    #[error("Expected type code {0} but obtained {1}.")]
    InvalidTypeCode(usize, usize),
    #[error("Operation timed out")]
    Timeout,
    #[error("Serial port is not open")]
    NotConnected,
    #[error(transparent)]
    Serial(#[from] serialport::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ProtocolError> for ResultCode {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Timeout => ResultCode::OperationTimeout,
            ProtocolError::InvalidHeaderLength(_)
            | ProtocolError::InvalidMagicNumber(_)
            | ProtocolError::InvalidResponseLength(_, _)
            | ProtocolError::InvalidTypeCode(_, _) => ResultCode::InvalidData,
            ProtocolError::NotConnected | ProtocolError::Serial(_) | ProtocolError::Io(_) => {
                ResultCode::OperationFail
            }
        }
    }
}

pub(crate) fn validate_response_header(
    header: &[u8],
    maybe_response_length: Option<u8>,
    type_code: u8,
) -> Result<(), ProtocolError> {
    if header.len() != HEADER_SIZE {
        return Err(ProtocolError::InvalidHeaderLength(header.len()));
    }
    if header[0..2] != [LIDAR_CMD_SYNC_BYTE, LIDAR_ANS_SYNC_BYTE] {
        return Err(ProtocolError::InvalidMagicNumber(to_string(&header[0..2])));
    }
    match maybe_response_length {
        None => (),
        Some(len) => {
            if header[2] != len {
                return Err(ProtocolError::InvalidResponseLength(
                    len.into(),
                    header[2].into(),
                ));
            }
        }
    }
    if header[6] != type_code {
        return Err(ProtocolError::InvalidTypeCode(
            type_code.into(),
            header[6].into(),
        ));
    }
    Ok(())
}

/// Request frame: sync byte, command, and for payload commands the size,
/// the payload and an XOR checksum over everything before it.
pub(crate) fn command_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![LIDAR_CMD_SYNC_BYTE, command];
    if payload.is_empty() {
        return frame;
    }
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    let checksum = frame.iter().fold(0u8, |acc, e| acc ^ e);
    frame.push(checksum);
    frame
}

pub(crate) fn parse_device_info(info: &[u8]) -> DeviceInfo {
    let mut serial_number = [0u8; 16];
    serial_number.copy_from_slice(&info[4..LIDAR_ANS_LENGTH_DEVINFO as usize]);
    DeviceInfo {
        model: info[0],
        firmware_version: to_u16(info[2], info[1]),
        hardware_version: info[3],
        serial_number,
    }
}

pub(crate) fn parse_device_health(health: &[u8]) -> DeviceHealth {
    debug_assert_eq!(health.len(), LIDAR_ANS_LENGTH_DEVHEALTH as usize);
    DeviceHealth {
        status: health[0].into(),
        error_code: to_u16(health[2], health[1]),
    }
}

/// Sync bit and its inverse must disagree, and the check bit must be set.
pub(crate) fn is_measurement_node(bytes: &[u8]) -> bool {
    let sync = bytes[0] & 0x01;
    let inverse_sync = (bytes[0] >> 1) & 0x01;
    sync != inverse_sync && bytes[1] & 0x01 == 1
}

pub(crate) fn decode_measurement_node(bytes: &[u8]) -> MeasurementNode {
    debug_assert_eq!(bytes.len(), MEASUREMENT_NODE_SIZE);
    MeasurementNode {
        angle_z_q14: q6_to_q14(to_u16(bytes[2], bytes[1])),
        dist_mm_q2: to_u16(bytes[4], bytes[3]) as u32,
        quality: bytes[0] & 0xFC,
        flag: bytes[0] & 0x01,
    }
}
