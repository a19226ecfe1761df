use crate::constants::{
    DEFAULT_DEVICE_TIMEOUT, DEFAULT_MOTOR_PWM, HEADER_SIZE, LIDAR_ANS_LENGTH_DEVHEALTH,
    LIDAR_ANS_LENGTH_DEVINFO, LIDAR_ANS_LENGTH_MEASUREMENT, LIDAR_ANS_TYPE_DEVHEALTH,
    LIDAR_ANS_TYPE_DEVINFO, LIDAR_ANS_TYPE_MEASUREMENT, LIDAR_CMD_GET_DEVICE_HEALTH,
    LIDAR_CMD_GET_DEVICE_INFO, LIDAR_CMD_SCAN, LIDAR_CMD_SET_MOTOR_PWM, LIDAR_CMD_STOP,
    MEASUREMENT_NODE_SIZE,
};
use crate::packet::{
    command_frame, decode_measurement_node, is_measurement_node, parse_device_health,
    parse_device_info, validate_response_header, ProtocolError,
};
use crate::sdk::{LidarSdk, ResultCode};
use crate::time::sleep_ms;
use rplidar_data::{DeviceHealth, DeviceInfo, MeasurementNode};
use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

fn send_data(port: &mut Box<dyn SerialPort>, data: &[u8]) -> std::io::Result<()> {
    port.write_all(data)?;
    port.flush()
}

pub(crate) fn send_command(port: &mut Box<dyn SerialPort>, command: u8) -> std::io::Result<()> {
    send_data(port, &command_frame(command, &[]))
}

fn send_command_with_payload(
    port: &mut Box<dyn SerialPort>,
    command: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    send_data(port, &command_frame(command, payload))
}

pub(crate) fn get_n_read(port: &mut Box<dyn SerialPort>) -> Result<usize, ProtocolError> {
    let n_u32: u32 = port.bytes_to_read()?;
    Ok(n_u32.try_into().unwrap_or(0))
}

pub(crate) fn flush(port: &mut Box<dyn SerialPort>) -> Result<(), ProtocolError> {
    let n_read: usize = get_n_read(port).unwrap_or(0);
    if n_read == 0 {
        return Ok(());
    }
    let mut packet: Vec<u8> = vec![0; n_read];
    port.read_exact(packet.as_mut_slice())?;
    Ok(())
}

/// Reads exactly `data_size` bytes, waiting at most `timeout` for them to arrive.
pub(crate) fn read(
    port: &mut Box<dyn SerialPort>,
    data_size: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    let deadline = Instant::now() + timeout;
    loop {
        let n_read: usize = get_n_read(port)?;
        if n_read >= data_size {
            let mut packet: Vec<u8> = vec![0; data_size];
            port.read_exact(packet.as_mut_slice())?;
            return Ok(packet);
        }
        if Instant::now() >= deadline {
            return Err(ProtocolError::Timeout);
        }
        sleep_ms(1);
    }
}

fn stop_scan_and_flush(port: &mut Box<dyn SerialPort>) -> Result<(), ProtocolError> {
    send_command(port, LIDAR_CMD_STOP)?;
    // the device needs a moment before it stops streaming
    sleep_ms(2);
    flush(port)
}

/// Splits the measurement byte stream into full rotations.
///
/// Nodes received before the first sync node are dropped, so the first
/// rotation handed out is always complete.
#[derive(Debug, Default)]
pub(crate) struct RotationAssembler {
    buffer: VecDeque<u8>,
    rotation: Vec<MeasurementNode>,
    synced: bool,
}

impl RotationAssembler {
    pub(crate) fn extend(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.rotation.clear();
        self.synced = false;
    }

    /// Returns the next complete rotation if the buffer holds one.
    pub(crate) fn next_rotation(&mut self) -> Option<Vec<MeasurementNode>> {
        while self.buffer.len() >= MEASUREMENT_NODE_SIZE {
            let bytes: Vec<u8> = self.buffer.range(..MEASUREMENT_NODE_SIZE).copied().collect();
            if !is_measurement_node(&bytes) {
                // lost alignment; slide by one byte
                self.buffer.pop_front();
                continue;
            }
            self.buffer.drain(..MEASUREMENT_NODE_SIZE);
            let node = decode_measurement_node(&bytes);

            if node.is_sync() {
                if !self.rotation.is_empty() {
                    return Some(std::mem::replace(&mut self.rotation, vec![node]));
                }
                self.synced = true;
            }
            if self.synced {
                self.rotation.push(node);
            }
        }
        None
    }
}

/// RPLiDAR serial protocol spoken directly over a serial port.
pub struct SerialLidar {
    port: Option<Box<dyn SerialPort>>,
    assembler: RotationAssembler,
    scanning: bool,
    response_timeout: Duration,
}

impl SerialLidar {
    pub fn new() -> SerialLidar {
        SerialLidar {
            port: None,
            assembler: RotationAssembler::default(),
            scanning: false,
            response_timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }

    /// Sets how long `start_scan` waits for the scan response header.
    pub fn with_response_timeout(mut self, timeout: Duration) -> SerialLidar {
        self.response_timeout = timeout;
        self
    }

    /// Wraps a port that is already open.
    pub fn with_port(port: Box<dyn SerialPort>) -> SerialLidar {
        SerialLidar {
            port: Some(port),
            ..SerialLidar::new()
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, ProtocolError> {
        self.port.as_mut().ok_or(ProtocolError::NotConnected)
    }

    fn request(
        &mut self,
        command: u8,
        response_length: u8,
        type_code: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let port = self.port()?;
        send_command(port, command)?;
        let header = read(port, HEADER_SIZE, timeout)?;
        validate_response_header(&header, Some(response_length), type_code)?;
        read(port, response_length.into(), timeout)
    }

    fn set_motor_pwm(&mut self, pwm: u16) -> Result<(), ProtocolError> {
        let port = self.port()?;
        send_command_with_payload(port, LIDAR_CMD_SET_MOTOR_PWM, &pwm.to_le_bytes())?;
        Ok(())
    }

    // A1 units drive the motor from the inverted DTR line; a pseudo terminal
    // rejects the ioctl, which is harmless.
    fn set_dtr(&mut self, level: bool) -> Result<(), ProtocolError> {
        let port = self.port()?;
        if let Err(e) = port.write_data_terminal_ready(level) {
            debug!("cannot set DTR on {:?}: {e}", port.name());
        }
        Ok(())
    }
}

impl Default for SerialLidar {
    fn default() -> Self {
        SerialLidar::new()
    }
}

impl LidarSdk for SerialLidar {
    fn connect(&mut self, path: &str, baud_rate: u32) -> Result<(), ResultCode> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                warn!("Failed to open \"{}\". Error: {}", path, e);
                ResultCode::OperationFail
            })?;
        self.port = Some(port);
        self.set_dtr(true)?;
        let port = self.port()?;
        stop_scan_and_flush(port)?;
        Ok(())
    }

    fn get_device_info(&mut self, timeout: Duration) -> Result<DeviceInfo, ResultCode> {
        let info = self.request(
            LIDAR_CMD_GET_DEVICE_INFO,
            LIDAR_ANS_LENGTH_DEVINFO,
            LIDAR_ANS_TYPE_DEVINFO,
            timeout,
        )?;
        Ok(parse_device_info(&info))
    }

    fn get_health(&mut self, timeout: Duration) -> Result<DeviceHealth, ResultCode> {
        let health = self.request(
            LIDAR_CMD_GET_DEVICE_HEALTH,
            LIDAR_ANS_LENGTH_DEVHEALTH,
            LIDAR_ANS_TYPE_DEVHEALTH,
            timeout,
        )?;
        Ok(parse_device_health(&health))
    }

    fn start_motor(&mut self) -> Result<(), ResultCode> {
        self.set_dtr(false)?;
        self.set_motor_pwm(DEFAULT_MOTOR_PWM)?;
        Ok(())
    }

    fn stop_motor(&mut self) -> Result<(), ResultCode> {
        self.set_motor_pwm(0)?;
        self.set_dtr(true)?;
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), ResultCode> {
        if self.scanning {
            self.stop_scan()?;
        }
        let timeout = self.response_timeout;
        let port = self.port()?;
        send_command(port, LIDAR_CMD_SCAN).map_err(ProtocolError::from)?;
        let header = read(port, HEADER_SIZE, timeout)?;
        validate_response_header(
            &header,
            Some(LIDAR_ANS_LENGTH_MEASUREMENT),
            LIDAR_ANS_TYPE_MEASUREMENT,
        )?;
        self.assembler.reset();
        self.scanning = true;
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), ResultCode> {
        let port = self.port()?;
        stop_scan_and_flush(port)?;
        self.assembler.reset();
        self.scanning = false;
        Ok(())
    }

    fn grab_scan_data(
        &mut self,
        nodes: &mut [MeasurementNode],
        timeout: Duration,
    ) -> Result<usize, ResultCode> {
        if !self.scanning {
            return Err(ResultCode::OperationFail);
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(rotation) = self.assembler.next_rotation() {
                let count = rotation.len().min(nodes.len());
                nodes[..count].copy_from_slice(&rotation[..count]);
                return Ok(count);
            }
            if Instant::now() >= deadline {
                return Err(ResultCode::OperationTimeout);
            }
            let port = self.port()?;
            let n_read = get_n_read(port)?;
            if n_read == 0 {
                sleep_ms(1);
                continue;
            }
            let mut data = vec![0u8; n_read];
            port.read_exact(data.as_mut_slice())
                .map_err(ProtocolError::from)?;
            self.assembler.extend(&data);
        }
    }

    fn dispose(&mut self) {
        let Some(mut port) = self.port.take() else {
            return;
        };
        if self.scanning {
            if let Err(e) = stop_scan_and_flush(&mut port) {
                warn!("failed to stop scanning while disposing: {e}");
            }
        }
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!("cannot set DTR while disposing: {e}");
        }
        self.assembler.reset();
        self.scanning = false;
    }
}
