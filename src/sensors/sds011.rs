/// SDS011 particulate sensor over a serial line
///
/// The sensor is driven in query reporting mode: every measurement is an
/// explicit request. Command frames are 19 bytes:
/// - Byte 0: Head (0xAA)
/// - Byte 1: Command ID (0xB4)
/// - Bytes 2-16: Data 1..15 (data 14/15 = 0xFFFF addresses any sensor)
/// - Byte 17: Checksum (low byte of the sum of data 1..15)
/// - Byte 18: Tail (0xAB)
///
/// Replies are 10 bytes: head, reply ID (0xC0 data, 0xC5 command ack),
/// data 1..6, checksum (low byte of the sum of data 1..6), tail.
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use super::{ParticulateSensor, SensorError};
use crate::models::ParticulateReading;

const HEAD: u8 = 0xAA;
const TAIL: u8 = 0xAB;
const COMMAND_ID: u8 = 0xB4;
const REPLY_DATA: u8 = 0xC0;
const REPLY_ACK: u8 = 0xC5;

const CMD_REPORTING_MODE: u8 = 2;
const CMD_QUERY_DATA: u8 = 4;
const CMD_SLEEP_WORK: u8 = 6;
const CMD_FIRMWARE: u8 = 7;

const BAUD_RATE: u32 = 9600;

const COMMAND_LEN: usize = 19;
const REPLY_LEN: usize = 10;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Build a command frame from its leading data bytes; remaining data bytes are zero
pub fn command_frame(data: &[u8]) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND_ID;
    for (slot, byte) in frame[2..15].iter_mut().zip(data) {
        *slot = *byte;
    }
    frame[15] = 0xFF;
    frame[16] = 0xFF;
    frame[17] = frame[2..17]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    frame[18] = TAIL;
    frame
}

/// Check a reply frame and return its reply ID and six data bytes
pub fn parse_reply(frame: &[u8; REPLY_LEN]) -> Result<(u8, [u8; 6]), SensorError> {
    if frame[0] != HEAD || frame[9] != TAIL {
        return Err(SensorError::Frame(format!(
            "bad head/tail {:02X}/{:02X}",
            frame[0], frame[9]
        )));
    }

    let mut data = [0u8; 6];
    data.copy_from_slice(&frame[2..8]);

    let checksum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if checksum != frame[8] {
        return Err(SensorError::Frame(format!(
            "checksum {:02X} != {:02X}",
            checksum, frame[8]
        )));
    }

    Ok((frame[1], data))
}

/// Decode a data reply into µg/m³ values
pub fn decode_measurement(data: &[u8; 6]) -> (f32, f32) {
    let pm25 = u16::from_le_bytes([data[0], data[1]]) as f32 / 10.0;
    let pm10 = u16::from_le_bytes([data[2], data[3]]) as f32 / 10.0;
    (pm25, pm10)
}

pub struct Sds011<S> {
    port: S,
}

impl Sds011<SerialStream> {
    /// Open the serial device at 9600 8N1
    ///
    /// The port is non-blocking, so a reply timeout never leaves a read
    /// pending that could hold up the next command. Must be called from
    /// within the tokio runtime.
    ///
    /// # Arguments
    /// * `path` - Device node, e.g. `/dev/ttyUSB0`
    pub fn open(path: &str) -> Result<Self, SensorError> {
        let port = tokio_serial::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()?;
        Ok(Self::new(port))
    }
}

impl<S> Sds011<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(port: S) -> Self {
        Self { port }
    }

    /// Wake the sensor, switch it to query reporting mode and log its firmware date
    ///
    /// Everything past the wake command is best effort.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.wake().await?;

        self.send(&[CMD_REPORTING_MODE, 1, 1]).await?;
        match self.expect_reply(REPLY_ACK, ACK_TIMEOUT).await {
            Ok(_) => info!("SDS011 set to query reporting mode"),
            Err(e) => warn!("SDS011 did not confirm reporting mode: {}", e),
        }

        self.send(&[CMD_FIRMWARE]).await?;
        match self.expect_reply(REPLY_ACK, ACK_TIMEOUT).await {
            Ok(data) => info!(
                "SDS011 firmware 20{:02}-{:02}-{:02}, id {:02X}{:02X}",
                data[1], data[2], data[3], data[4], data[5]
            ),
            Err(e) => warn!("SDS011 firmware query failed: {}", e),
        }

        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), SensorError> {
        let frame = command_frame(data);
        self.port.write_all(&frame).await?;
        self.port.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<[u8; REPLY_LEN], SensorError> {
        let mut frame = [0u8; REPLY_LEN];

        // Resynchronise on the head byte, skipping partial frames
        loop {
            self.port.read_exact(&mut frame[..1]).await?;
            if frame[0] == HEAD {
                break;
            }
        }
        self.port.read_exact(&mut frame[1..]).await?;
        Ok(frame)
    }

    /// Read replies until one with `reply_id` arrives
    async fn next_reply(&mut self, reply_id: u8) -> Result<[u8; 6], SensorError> {
        loop {
            let frame = self.read_frame().await?;
            let (id, data) = parse_reply(&frame)?;
            if id == reply_id {
                return Ok(data);
            }
            debug!("Skipping SDS011 reply {:02X}", id);
        }
    }

    async fn expect_reply(&mut self, reply_id: u8, wait: Duration) -> Result<[u8; 6], SensorError> {
        match timeout(wait, self.next_reply(reply_id)).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout),
        }
    }

    async fn set_working(&mut self, working: bool) -> Result<(), SensorError> {
        self.send(&[CMD_SLEEP_WORK, 1, working as u8]).await?;
        // A sleeping sensor may drop the ack for the wake command
        if let Err(e) = self.expect_reply(REPLY_ACK, ACK_TIMEOUT).await {
            debug!("No SDS011 ack for sleep/work command: {}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl<S> ParticulateSensor for Sds011<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn wake(&mut self) -> Result<(), SensorError> {
        self.set_working(true).await
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.set_working(false).await
    }

    async fn query_reading(&mut self) -> ParticulateReading {
        if let Err(e) = self.send(&[CMD_QUERY_DATA]).await {
            debug!("SDS011 query failed: {}", e);
            return ParticulateReading::invalid();
        }

        match self.expect_reply(REPLY_DATA, REPLY_TIMEOUT).await {
            Ok(data) => {
                let (pm25, pm10) = decode_measurement(&data);
                ParticulateReading::valid(pm25, pm10)
            }
            Err(e) => {
                debug!("Could not read values from SDS011: {}", e);
                ParticulateReading::invalid()
            }
        }
    }
}
