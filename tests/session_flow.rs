use std::collections::VecDeque;
use std::io::Cursor;

use bytes::BytesMut;
use netdaq::codec::{
    ChannelConfig, ChannelId, ChannelKind, ConfigBlock, FullTimestamp, InstrumentStatus, Reading,
    ReadingsResponse, Speed, Timestamp, VdcRange, VersionInfo,
};
use netdaq::equation::{self, evaluate};
use netdaq::protocol::{PacketReader, ReadError, encode_packet, frame};
use netdaq::session::OutgoingRequest;
use netdaq::{
    Command, Correlator, Delivery, Error, Packet, PacketFramer, Request, Response, SessionError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory instrument answering one request at a time
struct SimInstrument {
    config: ConfigBlock,
    queued: VecDeque<Reading>,
    scanning: bool,
}

impl SimInstrument {
    fn new() -> Self {
        Self {
            config: ConfigBlock::new(),
            queued: VecDeque::new(),
            scanning: false,
        }
    }

    fn answer(&mut self, request_bytes: &[u8]) -> BytesMut {
        let packet = Packet::decode(request_bytes).expect("request packet");
        let sequence_id = packet.sequence_id();
        let request = match Request::decode(packet.command_id(), packet.payload()) {
            Ok(request) => request,
            Err(_) => return Packet::error_response(sequence_id, 0x0000_0101).encode(),
        };

        let response = match request {
            Request::StatusQuery => {
                let raw = if self.scanning { InstrumentStatus::BUSY } else { 0 };
                Response::Status(InstrumentStatus::from_raw(raw))
            }
            Request::Start(_) if self.scanning => {
                return Packet::error_response(sequence_id, 0x0000_0203).encode();
            }
            Request::Start(_) => {
                self.scanning = true;
                Response::Ack
            }
            Request::Stop => {
                self.scanning = false;
                Response::Ack
            }
            Request::GetConfig => Response::Config(Box::new(self.config.clone())),
            Request::SetConfig(config) => {
                self.config = *config;
                Response::Ack
            }
            Request::GetReadings { max_readings } => {
                let take = (max_readings as usize).min(self.queued.len());
                let readings: Vec<Reading> = self.queued.drain(..take).collect();
                Response::Readings(ReadingsResponse {
                    chunk_length: 28,
                    remaining: u32::try_from(self.queued.len()).unwrap(),
                    readings,
                })
            }
            Request::GetVersionInfo => {
                Response::VersionInfo(VersionInfo::decode(b"NetDAQ 2640A\0FW 3.0\0"))
            }
            Request::GetTime => Response::Time(FullTimestamp {
                time: Timestamp::new(9, 30, 0, 3, 14, 25),
                milliseconds: 250,
            }),
            _ => Response::Ack,
        };

        let payload = response.encode_payload().expect("response payload");
        let mut dst = BytesMut::new();
        encode_packet(&Packet::new(sequence_id, 0, payload), &mut dst);
        dst
    }
}

/// Send a request and run the reply through a framer fed one byte at a time
fn round_trip(
    correlator: &mut Correlator,
    framer: &mut PacketFramer,
    instrument: &mut SimInstrument,
    request: &Request,
) -> Result<Delivery, SessionError> {
    let OutgoingRequest { bytes, .. } = correlator.send(request)?;
    let reply = instrument.answer(&bytes);

    let mut packets = Vec::new();
    for byte in reply.iter() {
        packets.extend(framer.push(std::slice::from_ref(byte))?);
    }
    assert_eq!(packets.len(), 1, "exactly one reply per request");
    correlator.on_packet(&packets[0])
}

fn response(delivery: Delivery) -> Response {
    match delivery {
        Delivery::Response { response, .. } => response,
        Delivery::Discarded { sequence_id } => panic!("request {sequence_id} was discarded"),
    }
}

#[test]
fn configure_scan_and_fetch_readings() {
    init_tracing();
    let mut correlator = Correlator::new();
    let mut framer = PacketFramer::new();
    let mut instrument = SimInstrument::new();

    // Read-modify-write the configuration
    let Response::Config(mut config) = response(
        round_trip(&mut correlator, &mut framer, &mut instrument, &Request::GetConfig).unwrap(),
    ) else {
        panic!("expected a config block");
    };
    for n in 1..=2 {
        config
            .set_channel(
                ChannelId::new(n).unwrap(),
                ChannelConfig::new(ChannelKind::Vdc { range: VdcRange::V3 }),
            )
            .unwrap();
    }
    let offset = config
        .push_equation(
            ChannelId::new(21).unwrap(),
            equation::compile("(C1 + C2) / 2").unwrap(),
        )
        .unwrap();
    assert_eq!(offset, 0);
    config.set_speed(Speed::Medium);
    assert!(!config.has_channel_gaps());

    let set_config = Request::SetConfig(config.clone());
    let delivery =
        round_trip(&mut correlator, &mut framer, &mut instrument, &set_config).unwrap();
    assert_eq!(response(delivery), Response::Ack);
    assert_eq!(instrument.config.encode().unwrap(), config.encode().unwrap());
    let c21 = ChannelId::new(21).unwrap();
    assert_eq!(instrument.config.equation(c21), config.equation(c21));

    // Start scanning; a second start is refused by the instrument
    round_trip(
        &mut correlator,
        &mut framer,
        &mut instrument,
        &Request::Start(Default::default()),
    )
    .unwrap();
    let err = round_trip(
        &mut correlator,
        &mut framer,
        &mut instrument,
        &Request::Start(Default::default()),
    )
    .unwrap_err();
    assert!(matches!(err, SessionError::InstrumentError { code: 0x203, .. }));
    assert!(!err.is_connection_fatal());

    let status = response(
        round_trip(&mut correlator, &mut framer, &mut instrument, &Request::StatusQuery).unwrap(),
    );
    assert_eq!(
        status,
        Response::Status(InstrumentStatus::from_raw(InstrumentStatus::BUSY))
    );

    let time = Timestamp::new(9, 30, 1, 3, 14, 25);
    for scan in 0..3u16 {
        let c1 = f32::from(scan);
        let c2 = 1.0;
        let program = instrument.config.equation(c21).unwrap();
        let average = evaluate(program, &[c1, c2][..]).unwrap();
        instrument
            .queued
            .push_back(Reading::new(time, scan * 100, vec![c1, c2, average]));
    }

    let Response::Readings(first) = response(
        round_trip(
            &mut correlator,
            &mut framer,
            &mut instrument,
            &Request::GetReadings { max_readings: 2 },
        )
        .unwrap(),
    ) else {
        panic!("expected readings");
    };
    assert_eq!(first.count_in_packet(), 2);
    assert_eq!(first.count_remaining_on_instrument(), 1);
    assert_eq!(first.readings[1].values, vec![1.0, 1.0, 1.0]);
    assert_eq!(first.readings[1].milliseconds, 100);

    let Response::Readings(rest) = response(
        round_trip(
            &mut correlator,
            &mut framer,
            &mut instrument,
            &Request::GetReadings {
                max_readings: netdaq::protocol::DEFAULT_MAX_READINGS,
            },
        )
        .unwrap(),
    ) else {
        panic!("expected readings");
    };
    assert_eq!(rest.readings.len(), 1);
    assert_eq!(rest.readings[0].values[2], 1.5);
    assert_eq!(rest.remaining, 0);
}

#[test]
fn packet_reader_over_concatenated_stream() {
    init_tracing();
    let mut instrument = SimInstrument::new();
    let requests = [Request::GetVersionInfo, Request::GetTime, Request::Ping];

    // Replies to three exchanges, already sitting in one buffer
    let mut stream = Vec::new();
    for (sequence_id, request) in (2u32..).zip(&requests) {
        let mut bytes = BytesMut::new();
        frame(
            sequence_id,
            request.command_id(),
            &request.encode_payload().unwrap(),
            &mut bytes,
        );
        stream.extend_from_slice(&instrument.answer(&bytes));
    }

    let mut reader = PacketReader::new(Cursor::new(stream));
    let mut correlator = Correlator::new();
    for (index, request) in requests.iter().enumerate() {
        correlator.send(request).unwrap();

        let packet = reader.read_packet().unwrap();
        let delivered = response(correlator.on_packet(&packet).unwrap());
        match (index, delivered) {
            (0, Response::VersionInfo(info)) => {
                assert_eq!(info.strings(), vec!["NetDAQ 2640A", "FW 3.0"]);
            }
            (1, Response::Time(time)) => {
                assert_eq!(time.milliseconds, 250);
                assert_eq!(time.time.month, 3);
            }
            (2, Response::Ack) => {}
            (index, other) => panic!("unexpected response {index}: {other:?}"),
        }
    }

    assert!(matches!(reader.read_packet(), Err(ReadError::Eof)));
}

#[test]
fn late_reply_after_abandon_is_dropped() {
    init_tracing();
    let mut correlator = Correlator::new();
    let mut framer = PacketFramer::new();
    let mut instrument = SimInstrument::new();

    // The caller times out on the first request
    let slow = correlator.send(&Request::GetConfig).unwrap();
    let slow_reply = instrument.answer(&slow.bytes);
    correlator.abandon();

    let ping = correlator.send(&Request::Ping).unwrap();
    let ping_reply = instrument.answer(&ping.bytes);

    // Both replies arrive back to back in one read
    let mut wire = slow_reply.to_vec();
    wire.extend_from_slice(&ping_reply);
    let packets = framer.push(&wire).unwrap();
    assert_eq!(packets.len(), 2);

    assert_eq!(
        correlator.on_packet(&packets[0]).unwrap(),
        Delivery::Discarded {
            sequence_id: slow.sequence_id
        }
    );
    assert_eq!(
        response(correlator.on_packet(&packets[1]).unwrap()),
        Response::Ack
    );
    assert!(correlator.is_idle());
}

#[test]
fn corrupted_stream_is_fatal() {
    init_tracing();
    let mut correlator = Correlator::new();
    let mut framer = PacketFramer::new();

    let outgoing = correlator.send(&Request::StatusQuery).unwrap();
    let mut reply = Packet::new(outgoing.sequence_id, 0, vec![0, 0, 0, 0]).encode();
    reply[0] = b'X';

    let err = framer.push(&reply).unwrap_err();
    assert!(matches!(err, Error::BadMagic { .. }));
    assert!(SessionError::from(err).is_connection_fatal());
    assert_eq!(framer.push(&[]).unwrap_err(), Error::Desynchronized);

    let failed = correlator.disconnect().unwrap();
    assert_eq!(failed.command_id, Command::StatusQuery.as_u32());
    assert_eq!(
        correlator.send(&Request::Ping).unwrap_err(),
        SessionError::Disconnected
    );
}

#[test]
fn malformed_request_gets_error_response() {
    init_tracing();
    let mut correlator = Correlator::new();
    let mut framer = PacketFramer::new();
    let mut instrument = SimInstrument::new();

    // QuerySpy needs a 4-byte payload
    let raw = Request::Raw {
        command_id: Command::QuerySpy.as_u32(),
        payload: bytes::Bytes::from_static(&[1, 2]),
    };
    let err = round_trip(&mut correlator, &mut framer, &mut instrument, &raw).unwrap_err();
    assert!(matches!(err, SessionError::InstrumentError { code: 0x101, .. }));
    assert!(correlator.is_idle());
}
